// crates/statecraft-actor/src/drivers.rs
// ============================================================================
// Module: Local Runtime Drivers
// Description: Tokio timer service, in-memory reminders, broadcast streams,
//              and a local entity registry.
// Purpose: Provide working host-runtime backends for tests and local hosts.
// Dependencies: statecraft-core, tokio, tokio-stream
// ============================================================================

//! ## Overview
//! These drivers implement the host-runtime interfaces on plain tokio
//! primitives so a full actor stack can run without a cluster: timers on
//! `tokio::time`, reminders as long-lived local tasks with host-side
//! delivery wiring, stream publication over a broadcast channel, and an
//! entity resolver backed by a process-local registry.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;

use statecraft_core::EntityId;
use statecraft_core::MachineTypeId;
use statecraft_core::RecordedEvent;
use statecraft_core::StreamNamespace;
use statecraft_core::TimerName;
use statecraft_core::interfaces::EntityRef;
use statecraft_core::interfaces::EntityResolver;
use statecraft_core::interfaces::EventStreamSink;
use statecraft_core::interfaces::ReminderError;
use statecraft_core::interfaces::ReminderService;
use statecraft_core::interfaces::ResolveError;
use statecraft_core::interfaces::StreamError;
use statecraft_core::interfaces::TimerCallback;
use statecraft_core::interfaces::TimerFuture;
use statecraft_core::interfaces::TimerHandle;
use statecraft_core::interfaces::TimerService;

use crate::adapter::MachineActor;

// ============================================================================
// SECTION: Tokio Timer Service
// ============================================================================

/// In-process timer service on `tokio::time`.
///
/// Timers die with the process; durable work belongs to a reminder
/// service.
#[derive(Debug, Default)]
pub struct TokioTimerService {
    /// Next raw handle id.
    next_id: AtomicU64,
    /// Running timer tasks by handle id.
    tasks: Arc<Mutex<HashMap<u64, JoinHandle<()>>>>,
}

impl TokioTimerService {
    /// Creates an empty timer service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TimerService for TokioTimerService {
    fn schedule(
        &self,
        delay: Duration,
        period: Option<Duration>,
        callback: TimerCallback,
    ) -> TimerHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let tasks = Arc::clone(&self.tasks);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback().await;
            if let Some(period) = period {
                loop {
                    tokio::time::sleep(period).await;
                    callback().await;
                }
            }
            // One-shot timers clean up their own bookkeeping.
            if let Ok(mut tasks) = tasks.lock() {
                tasks.remove(&id);
            }
        });
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.insert(id, task);
        }
        TimerHandle::new(id)
    }

    fn cancel(&self, handle: TimerHandle) {
        if let Ok(mut tasks) = self.tasks.lock()
            && let Some(task) = tasks.remove(&handle.id())
        {
            task.abort();
        }
    }
}

// ============================================================================
// SECTION: In-Memory Reminder Service
// ============================================================================

/// Handler the host wires per entity to deliver due reminders.
pub type ReminderHandler = Arc<dyn Fn(TimerName) -> TimerFuture + Send + Sync>;

/// Reminder service running on local tasks with host-side delivery.
///
/// Registrations survive adapter deactivation (the tasks outlive the
/// actor); delivery requires the host to attach a handler for the entity,
/// mirroring how a cluster delivers reminders to a fresh activation.
#[derive(Default)]
pub struct InMemoryReminderService {
    /// Running reminder tasks keyed by `(entity, name)`.
    tasks: Arc<Mutex<HashMap<(String, String), JoinHandle<()>>>>,
    /// Delivery handlers keyed by entity.
    handlers: Arc<Mutex<HashMap<String, ReminderHandler>>>,
}

impl InMemoryReminderService {
    /// Creates an empty reminder service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches the delivery handler for an entity, replacing any previous
    /// one. Typically wired with
    /// [`MachineActor::reminder_handler`](crate::adapter::MachineActor::reminder_handler).
    pub fn attach(&self, entity: &EntityId, handler: ReminderHandler) {
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.insert(entity.as_str().to_string(), handler);
        }
    }

    /// Detaches the delivery handler for an entity.
    pub fn detach(&self, entity: &EntityId) {
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.remove(entity.as_str());
        }
    }
}

#[async_trait]
impl ReminderService for InMemoryReminderService {
    async fn register(
        &self,
        entity: &EntityId,
        name: &TimerName,
        due: Duration,
        period: Option<Duration>,
    ) -> Result<(), ReminderError> {
        let key = (entity.as_str().to_string(), name.as_str().to_string());
        let handlers = Arc::clone(&self.handlers);
        let entity_key = entity.as_str().to_string();
        let timer_name = name.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(due).await;
            loop {
                let handler = handlers
                    .lock()
                    .ok()
                    .and_then(|handlers| handlers.get(&entity_key).cloned());
                if let Some(handler) = handler {
                    handler(timer_name.clone()).await;
                }
                match period {
                    Some(period) => tokio::time::sleep(period).await,
                    None => break,
                }
            }
        });
        let mut tasks = self
            .tasks
            .lock()
            .map_err(|_| ReminderError::Register("reminder registry poisoned".to_string()))?;
        if let Some(previous) = tasks.insert(key, task) {
            previous.abort();
        }
        Ok(())
    }

    async fn unregister(&self, entity: &EntityId, name: &TimerName) -> Result<(), ReminderError> {
        let key = (entity.as_str().to_string(), name.as_str().to_string());
        let mut tasks = self
            .tasks
            .lock()
            .map_err(|_| ReminderError::Unregister("reminder registry poisoned".to_string()))?;
        if let Some(task) = tasks.remove(&key) {
            task.abort();
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Broadcast Stream Sink
// ============================================================================

/// One published event with its stream coordinates.
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    /// Stream namespace.
    pub namespace: StreamNamespace,
    /// Entity the event belongs to.
    pub entity: EntityId,
    /// Confirmed event record.
    pub record: RecordedEvent,
}

/// Stream sink fanning confirmed events out over a broadcast channel.
#[derive(Debug)]
pub struct BroadcastStreamSink {
    /// Broadcast sender; subscribers receive every published event.
    sender: broadcast::Sender<PublishedEvent>,
}

impl BroadcastStreamSink {
    /// Creates a sink buffering up to `capacity` undelivered events per
    /// subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
        }
    }

    /// Subscribes to every event published through this sink.
    #[must_use]
    pub fn subscribe(&self) -> BroadcastStream<PublishedEvent> {
        BroadcastStream::new(self.sender.subscribe())
    }
}

impl Default for BroadcastStreamSink {
    fn default() -> Self {
        Self::new(1_024)
    }
}

#[async_trait]
impl EventStreamSink for BroadcastStreamSink {
    async fn publish(
        &self,
        namespace: &StreamNamespace,
        entity: &EntityId,
        event: &RecordedEvent,
    ) -> Result<(), StreamError> {
        // A send only fails when no subscriber exists; publication is
        // fire-and-forget either way.
        let _ = self.sender.send(PublishedEvent {
            namespace: namespace.clone(),
            entity: entity.clone(),
            record: event.clone(),
        });
        Ok(())
    }
}

// ============================================================================
// SECTION: Local Entity Registry
// ============================================================================

/// Process-local entity resolver over registered actors.
#[derive(Default)]
pub struct LocalEntityRegistry {
    /// Registered actors keyed by `(machine_type, entity)`.
    actors: Mutex<HashMap<(String, String), MachineActor>>,
}

impl LocalEntityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an actor under its machine type and entity id.
    pub fn register(&self, machine_type: &MachineTypeId, actor: MachineActor) {
        if let Ok(mut actors) = self.actors.lock() {
            actors.insert(
                (machine_type.as_str().to_string(), actor.entity().as_str().to_string()),
                actor,
            );
        }
    }

    /// Removes an actor from the registry.
    pub fn unregister(&self, machine_type: &MachineTypeId, entity: &EntityId) {
        if let Ok(mut actors) = self.actors.lock() {
            actors.remove(&(machine_type.as_str().to_string(), entity.as_str().to_string()));
        }
    }
}

#[async_trait]
impl EntityResolver for LocalEntityRegistry {
    async fn resolve(
        &self,
        machine_type: &MachineTypeId,
        entity: &EntityId,
    ) -> Result<Arc<dyn EntityRef>, ResolveError> {
        let actors = self
            .actors
            .lock()
            .map_err(|_| ResolveError::Backend("entity registry poisoned".to_string()))?;
        actors
            .get(&(machine_type.as_str().to_string(), entity.as_str().to_string()))
            .map(|actor| Arc::new(actor.clone()) as Arc<dyn EntityRef>)
            .ok_or_else(|| ResolveError::Unknown {
                machine_type: machine_type.clone(),
                entity: entity.clone(),
            })
    }
}
