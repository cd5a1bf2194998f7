// crates/statecraft-actor/src/adapter.rs
// ============================================================================
// Module: Machine Actor Adapter
// Description: Event-sourced binding of one machine instance to one entity.
// Purpose: Serialize fires, confirm events, replay on activation, and keep
//          timers and streams consistent with the durable log.
// Dependencies: statecraft-core, tokio, tokio-util
// ============================================================================

//! ## Overview
//! The adapter binds one [`Machine`] to one entity id. Facets are
//! configured, not inherited: persistence, snapshotting, idempotency,
//! stream publication, and state timeouts all hang off one builder.
//!
//! Invariants maintained here:
//! - at most one `fire` in flight per entity: a per-entity async mutex is
//!   held across guards, hooks, persistence, stream publication, dedupe
//!   updates, and timer re-binding;
//! - in auto-confirm mode the engine's current state always equals the last
//!   confirmed event's `to`; a failed append rolls the in-memory state back;
//! - pure reads never suspend; they snapshot state through a read-write
//!   lock refreshed after every committed transition;
//! - stream publication happens strictly after durable confirmation, and a
//!   publication failure never fails the transition.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;
use std::sync::Weak;
use std::time::Instant;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use statecraft_core::CanFire;
use statecraft_core::CorrelationId;
use statecraft_core::DedupeKey;
use statecraft_core::DefinitionVersion;
use statecraft_core::EntityId;
use statecraft_core::EntitySnapshot;
use statecraft_core::FirePlan;
use statecraft_core::Machine;
use statecraft_core::MachineDefinition;
use statecraft_core::MachineTypeId;
use statecraft_core::RecordedEvent;
use statecraft_core::StateId;
use statecraft_core::StateTransitionEvent;
use statecraft_core::TimerName;
use statecraft_core::Timestamp;
use statecraft_core::TransitionError;
use statecraft_core::TriggerArgs;
use statecraft_core::TriggerId;
use statecraft_core::core::REGION_METADATA_KEY;
use statecraft_core::interfaces::Clock;
use statecraft_core::interfaces::EntityRef;
use statecraft_core::interfaces::EventStore;
use statecraft_core::interfaces::EventStoreError;
use statecraft_core::interfaces::EventStreamSink;
use statecraft_core::interfaces::FireError;
use statecraft_core::interfaces::FireReceipt;
use statecraft_core::interfaces::ReminderService;
use statecraft_core::interfaces::SnapshotStore;
use statecraft_core::interfaces::SnapshotStoreError;
use statecraft_core::interfaces::TimerFuture;
use statecraft_core::interfaces::TimerHandle;
use statecraft_core::interfaces::TimerService;
use statecraft_core::machine::in_hook_scope;
use statecraft_core::runtime::SystemClock;

use crate::dedupe::DedupeWindow;
use crate::options::EventSourcingOptions;
use crate::telemetry::ActorTelemetry;
use crate::telemetry::NoopTelemetry;
use crate::timers::StateTimeoutConfig;

// ============================================================================
// SECTION: Activation Errors
// ============================================================================

/// Activation failures. Replay failures are fatal for the activation; the
/// host may retry activation.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActivationError {
    /// No event store was configured.
    #[error("actor requires an event store")]
    MissingEventStore,
    /// Stream publication was enabled without a sink and namespace.
    #[error("stream publication enabled without a sink and namespace")]
    StreamMisconfigured,
    /// The snapshot could not be loaded.
    #[error(transparent)]
    Snapshot(#[from] SnapshotStoreError),
    /// The event log could not be read.
    #[error(transparent)]
    Events(#[from] EventStoreError),
    /// The snapshot state does not fit the definition.
    #[error(transparent)]
    Restore(#[from] TransitionError),
    /// A replayed event contradicts the rebuilt state.
    #[error("replay failed at seq {seq}: {detail}")]
    Replay {
        /// Sequence number of the offending event.
        seq: u64,
        /// Failure detail.
        detail: String,
    },
}

// ============================================================================
// SECTION: Fire Request
// ============================================================================

/// One fire call with its optional facets.
#[derive(Debug, Clone)]
pub struct FireRequest {
    /// Trigger to fire.
    pub trigger: TriggerId,
    /// Positional arguments.
    pub args: TriggerArgs,
    /// Optional at-most-once key.
    pub dedupe_key: Option<DedupeKey>,
    /// Optional cancellation token; cancellation before confirmation aborts
    /// the call, cancellation after confirmation does not roll back.
    pub cancellation: Option<CancellationToken>,
}

impl FireRequest {
    /// Creates a request with no arguments.
    #[must_use]
    pub fn new(trigger: impl Into<TriggerId>) -> Self {
        Self {
            trigger: trigger.into(),
            args: TriggerArgs::none(),
            dedupe_key: None,
            cancellation: None,
        }
    }

    /// Attaches positional arguments.
    #[must_use]
    pub fn with_args(mut self, args: TriggerArgs) -> Self {
        self.args = args;
        self
    }

    /// Attaches an at-most-once dedupe key.
    #[must_use]
    pub fn with_dedupe(mut self, key: impl Into<DedupeKey>) -> Self {
        self.dedupe_key = Some(key.into());
        self
    }

    /// Attaches a cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

// ============================================================================
// SECTION: Machine Info
// ============================================================================

/// Read-only snapshot of the entity and its definition.
#[derive(Debug, Clone)]
pub struct MachineInfo {
    /// Entity id.
    pub entity: EntityId,
    /// Machine type of the definition.
    pub machine_type: MachineTypeId,
    /// Definition version.
    pub definition_version: DefinitionVersion,
    /// Leaf state per region in declared region order.
    pub region_states: Vec<StateId>,
    /// Confirmed region-transition count.
    pub transition_count: u64,
    /// Timestamp of the last confirmed transition.
    pub last_transition_at: Timestamp,
    /// Every state declared by the definition.
    pub states: BTreeSet<StateId>,
    /// Every trigger declared by the definition.
    pub triggers: BTreeSet<TriggerId>,
}

// ============================================================================
// SECTION: Internal State
// ============================================================================

/// View refreshed after every committed transition; read without the
/// per-entity mutex.
#[derive(Debug, Clone)]
struct StateView {
    /// Leaf state per region.
    region_states: Vec<StateId>,
    /// Confirmed region-transition count.
    transition_count: u64,
    /// Timestamp of the last confirmed transition.
    last_transition_at: Timestamp,
}

/// State guarded by the per-entity mutex.
struct MutableState {
    /// Live evaluation engine.
    machine: Machine,
    /// Last confirmed sequence number in the store.
    last_seq: u64,
    /// Confirmed region-transition count.
    transition_count: u64,
    /// Timestamp of the last confirmed transition.
    last_transition_at: Timestamp,
    /// Confirmed events since the last snapshot.
    events_since_snapshot: u64,
    /// Correlation id stamped onto subsequent events.
    correlation: Option<CorrelationId>,
    /// Recently seen dedupe keys.
    dedupe: DedupeWindow,
    /// Transitions awaiting confirmation (batch-confirm mode).
    pending: Vec<StateTransitionEvent>,
    /// Armed in-process timers by name.
    active_timers: HashMap<TimerName, TimerHandle>,
    /// Registered durable reminders by name.
    active_reminders: HashMap<TimerName, StateTimeoutConfig>,
}

/// Shared adapter internals.
struct ActorInner {
    /// Entity id this adapter owns.
    entity: EntityId,
    /// Shared machine definition.
    definition: Arc<MachineDefinition>,
    /// Event-sourcing configuration.
    options: EventSourcingOptions,
    /// Durable event log.
    events: Arc<dyn EventStore>,
    /// Optional snapshot slot.
    snapshots: Option<Arc<dyn SnapshotStore>>,
    /// Optional stream sink for confirmed events.
    stream: Option<Arc<dyn EventStreamSink>>,
    /// Optional in-process timer service.
    timer_service: Option<Arc<dyn TimerService>>,
    /// Optional durable reminder service.
    reminder_service: Option<Arc<dyn ReminderService>>,
    /// Registered state timeouts.
    timeouts: Vec<StateTimeoutConfig>,
    /// Time source for event timestamps.
    clock: Arc<dyn Clock>,
    /// Observation sink.
    telemetry: Arc<dyn ActorTelemetry>,
    /// Per-entity serialization mutex.
    state: tokio::sync::Mutex<MutableState>,
    /// Lock-free read view.
    view: RwLock<StateView>,
}

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Builder wiring an actor's facets before activation.
pub struct MachineActorBuilder {
    /// Entity id to bind.
    entity: EntityId,
    /// Machine definition to run.
    definition: Arc<MachineDefinition>,
    /// Event-sourcing configuration.
    options: EventSourcingOptions,
    /// Durable event log.
    events: Option<Arc<dyn EventStore>>,
    /// Optional snapshot slot.
    snapshots: Option<Arc<dyn SnapshotStore>>,
    /// Optional stream sink.
    stream: Option<Arc<dyn EventStreamSink>>,
    /// Optional timer service.
    timer_service: Option<Arc<dyn TimerService>>,
    /// Optional reminder service.
    reminder_service: Option<Arc<dyn ReminderService>>,
    /// Registered state timeouts.
    timeouts: Vec<StateTimeoutConfig>,
    /// Time source.
    clock: Arc<dyn Clock>,
    /// Observation sink.
    telemetry: Arc<dyn ActorTelemetry>,
}

impl MachineActorBuilder {
    /// Sets the event-sourcing options.
    #[must_use]
    pub fn options(mut self, options: EventSourcingOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the durable event log (required).
    #[must_use]
    pub fn event_store(mut self, store: Arc<dyn EventStore>) -> Self {
        self.events = Some(store);
        self
    }

    /// Sets the snapshot slot.
    #[must_use]
    pub fn snapshot_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.snapshots = Some(store);
        self
    }

    /// Sets the stream sink used when publication is enabled.
    #[must_use]
    pub fn stream_sink(mut self, sink: Arc<dyn EventStreamSink>) -> Self {
        self.stream = Some(sink);
        self
    }

    /// Sets the in-process timer service.
    #[must_use]
    pub fn timer_service(mut self, service: Arc<dyn TimerService>) -> Self {
        self.timer_service = Some(service);
        self
    }

    /// Sets the durable reminder service.
    #[must_use]
    pub fn reminder_service(mut self, service: Arc<dyn ReminderService>) -> Self {
        self.reminder_service = Some(service);
        self
    }

    /// Sets the time source.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the observation sink.
    #[must_use]
    pub fn telemetry(mut self, telemetry: Arc<dyn ActorTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Registers a state timeout.
    #[must_use]
    pub fn state_timeout(mut self, config: StateTimeoutConfig) -> Self {
        self.timeouts.push(config);
        self
    }

    /// Activates the actor: loads the snapshot, rebuilds the engine at the
    /// restored state, replays the event suffix, rebuilds the dedupe
    /// window, and re-arms timers and reminders.
    ///
    /// # Errors
    ///
    /// Returns [`ActivationError`] when configuration is incomplete or
    /// replay fails; replay failures are fatal for this activation.
    pub async fn activate(self) -> Result<MachineActor, ActivationError> {
        let events = self.events.ok_or(ActivationError::MissingEventStore)?;
        if self.options.publish_to_stream
            && (self.stream.is_none() || self.options.stream_namespace.is_none())
        {
            return Err(ActivationError::StreamMisconfigured);
        }

        let replay_started = Instant::now();
        let snapshot = match &self.snapshots {
            Some(store) => store.load(&self.entity).await?,
            None => None,
        };

        let mut dedupe = DedupeWindow::new(self.options.max_dedupe_keys_in_memory);
        let (mut machine, mut last_seq, mut transition_count, mut last_transition_at) =
            match &snapshot {
                Some(snapshot) => (
                    Machine::restored(Arc::clone(&self.definition), &snapshot.current_states)?,
                    snapshot.last_seq,
                    snapshot.transition_count,
                    snapshot.last_transition_at,
                ),
                None => (
                    Machine::new(Arc::clone(&self.definition)),
                    0,
                    0,
                    Timestamp::EPOCH,
                ),
            };

        // The dedupe window spans events the snapshot has already folded
        // away; rebuild it from the log inside the window's capacity so
        // retries keep deduplicating across reactivation.
        if self.options.enable_idempotency && last_seq > 0 {
            let capacity = self.options.max_dedupe_keys_in_memory as u64;
            let floor = last_seq.saturating_sub(capacity) + 1;
            let window = events.read(&self.entity, floor, Some(last_seq)).await?;
            for record in window {
                if let Some(key) = &record.event.dedupe_key {
                    dedupe.insert(key.clone());
                }
            }
        }

        let suffix = events.read(&self.entity, last_seq + 1, None).await?;
        let replayed = suffix.len() as u64;
        for record in suffix {
            Self::replay_event(&mut machine, &self.definition, &record)?;
            if let Some(key) = &record.event.dedupe_key {
                dedupe.insert(key.clone());
            }
            last_seq = record.seq;
            transition_count += 1;
            last_transition_at = record.event.timestamp;
        }

        let view = StateView {
            region_states: machine.region_states().to_vec(),
            transition_count,
            last_transition_at,
        };
        let mut active_reminders = HashMap::new();
        if let Some(snapshot) = &snapshot {
            for persisted in &snapshot.active_reminders {
                let config = StateTimeoutConfig::from_persisted(persisted);
                active_reminders.insert(config.name.clone(), config);
            }
        }

        let inner = Arc::new(ActorInner {
            entity: self.entity,
            definition: self.definition,
            options: self.options,
            events,
            snapshots: self.snapshots,
            stream: self.stream,
            timer_service: self.timer_service,
            reminder_service: self.reminder_service,
            timeouts: self.timeouts,
            clock: self.clock,
            telemetry: self.telemetry,
            state: tokio::sync::Mutex::new(MutableState {
                machine,
                last_seq,
                transition_count,
                last_transition_at,
                events_since_snapshot: last_seq.saturating_sub(
                    snapshot.as_ref().map_or(0, |snapshot| snapshot.last_seq),
                ),
                correlation: None,
                dedupe,
                pending: Vec::new(),
                active_timers: HashMap::new(),
                active_reminders,
            }),
            view: RwLock::new(view),
        });

        let actor = MachineActor {
            inner,
        };
        actor.arm_initial_timers().await;
        actor.inner.telemetry.replay_completed(
            &actor.inner.entity,
            replayed,
            replay_started.elapsed(),
        );
        Ok(actor)
    }

    /// Applies one replayed event to the rebuilding machine without
    /// running hooks.
    fn replay_event(
        machine: &mut Machine,
        definition: &Arc<MachineDefinition>,
        record: &RecordedEvent,
    ) -> Result<(), ActivationError> {
        let region_index = match record.event.region() {
            Some(region_id) => definition
                .regions()
                .iter()
                .position(|region| region.id.as_str() == region_id)
                .ok_or_else(|| ActivationError::Replay {
                    seq: record.seq,
                    detail: format!("unknown region {region_id}"),
                })?,
            None => definition
                .regions()
                .iter()
                .position(|region| region.declares(&record.event.from))
                .ok_or_else(|| ActivationError::Replay {
                    seq: record.seq,
                    detail: format!("no region declares state {}", record.event.from),
                })?,
        };
        let current = machine.region_states()[region_index].clone();
        if current != record.event.from {
            return Err(ActivationError::Replay {
                seq: record.seq,
                detail: format!(
                    "event departs {} but region is at {current}",
                    record.event.from
                ),
            });
        }
        let mut states = machine.region_states().to_vec();
        states[region_index] = record.event.to.clone();
        *machine = Machine::restored(Arc::clone(definition), &states)?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Machine Actor
// ============================================================================

/// Clonable handle to one entity's event-sourced state machine.
#[derive(Clone)]
pub struct MachineActor {
    /// Shared adapter internals.
    inner: Arc<ActorInner>,
}

impl MachineActor {
    /// Starts a builder binding `entity` to `definition`.
    #[must_use]
    pub fn builder(
        entity: impl Into<EntityId>,
        definition: Arc<MachineDefinition>,
    ) -> MachineActorBuilder {
        MachineActorBuilder {
            entity: entity.into(),
            definition,
            options: EventSourcingOptions::default(),
            events: None,
            snapshots: None,
            stream: None,
            timer_service: None,
            reminder_service: None,
            timeouts: Vec::new(),
            clock: Arc::new(SystemClock),
            telemetry: Arc::new(NoopTelemetry),
        }
    }

    /// Returns the entity id.
    #[must_use]
    pub fn entity(&self) -> &EntityId {
        &self.inner.entity
    }

    /// Fires a trigger with no arguments.
    ///
    /// # Errors
    ///
    /// Returns [`FireError`] when the transition is refused or fails to
    /// confirm.
    pub async fn fire(&self, trigger: impl Into<TriggerId>) -> Result<FireReceipt, FireError> {
        self.fire_with(FireRequest::new(trigger)).await
    }

    /// Fires a trigger with the full request surface.
    ///
    /// # Errors
    ///
    /// Returns [`FireError`] when the transition is refused, cancelled
    /// before confirmation, or fails to confirm.
    pub async fn fire_with(&self, request: FireRequest) -> Result<FireReceipt, FireError> {
        if in_hook_scope() {
            return Err(FireError::Transition(TransitionError::ReentrancyViolation {
                trigger: request.trigger.clone(),
            }));
        }
        if request.cancellation.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Err(FireError::Cancelled);
        }
        let mut state = self.inner.state.lock().await;
        self.fire_locked(&mut state, &request, None).await
    }

    /// Shared fire path; `expected_state` is the timer race re-check.
    async fn fire_locked(
        &self,
        state: &mut MutableState,
        request: &FireRequest,
        expected_state: Option<&StateId>,
    ) -> Result<FireReceipt, FireError> {
        if let Some(expected) = expected_state
            && !state
                .machine
                .region_states()
                .iter()
                .any(|leaf| self.inner.definition.is_in(leaf, expected))
        {
            // The timer raced a user-initiated transition; drop the fire.
            return Err(FireError::Transition(TransitionError::NoTransition {
                trigger: request.trigger.clone(),
                from: state.machine.current().clone(),
            }));
        }

        // Idempotency window: a seen key is a no-op returning current state.
        if self.inner.options.enable_idempotency
            && let Some(key) = &request.dedupe_key
            && state.dedupe.contains(key)
        {
            let current = state.machine.current().clone();
            return Ok(FireReceipt {
                from: current.clone(),
                to: current,
                deduplicated: true,
                fired_at: state.last_transition_at,
            });
        }

        let before = state.machine.region_states().to_vec();
        let plan = state.machine.plan(&request.trigger, &request.args)?;
        if request.cancellation.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Err(FireError::Cancelled);
        }
        state.machine.apply(&plan)?;

        let fired_at = self.inner.clock.now();
        let events = self.build_events(state, &plan, request, fired_at);

        if self.inner.options.auto_confirm_events {
            let confirmed = self
                .inner
                .events
                .append(&self.inner.entity, &events, state.last_seq)
                .await;
            let confirmed = match confirmed {
                Ok(confirmed) => confirmed,
                Err(err) => {
                    // Abort: restore the pre-fire leaves so the engine state
                    // matches the last confirmed event.
                    if let Ok(restored) =
                        Machine::restored(Arc::clone(&self.inner.definition), &before)
                    {
                        state.machine = restored;
                    }
                    return Err(FireError::Storage(err.to_string()));
                }
            };
            let first_seq = state.last_seq + 1;
            state.last_seq = confirmed;
            state.events_since_snapshot += events.len() as u64;
            for (offset, event) in events.iter().enumerate() {
                self.inner.telemetry.transition_recorded(&self.inner.entity, &RecordedEvent {
                    seq: first_seq + offset as u64,
                    event: event.clone(),
                });
            }
            self.publish_confirmed(&events, first_seq).await;
            self.maybe_snapshot(state).await;
        } else {
            state.pending.extend(events.iter().cloned());
        }

        if let Some(key) = &request.dedupe_key
            && self.inner.options.enable_idempotency
        {
            state.dedupe.insert(key.clone());
        }
        state.transition_count += events.len() as u64;
        state.last_transition_at = fired_at;
        self.rebind_timers(state, &plan).await;
        self.refresh_view(state);

        let primary = plan.primary();
        Ok(FireReceipt {
            from: primary.from.clone(),
            to: primary.to.clone(),
            deduplicated: false,
            fired_at,
        })
    }

    /// Builds the per-region events for one applied plan.
    fn build_events(
        &self,
        state: &MutableState,
        plan: &FirePlan,
        request: &FireRequest,
        fired_at: Timestamp,
    ) -> Vec<StateTransitionEvent> {
        let multi_region = self.inner.definition.regions().len() > 1;
        plan.regions
            .iter()
            .map(|region_plan| {
                let mut metadata = BTreeMap::new();
                if multi_region {
                    metadata.insert(
                        REGION_METADATA_KEY.to_string(),
                        region_plan.region.as_str().to_string(),
                    );
                }
                StateTransitionEvent {
                    from: region_plan.from.clone(),
                    to: region_plan.to.clone(),
                    trigger: plan.trigger.clone(),
                    timestamp: fired_at,
                    correlation_id: state.correlation.clone(),
                    dedupe_key: request.dedupe_key.clone(),
                    definition_version: self.inner.definition.version(),
                    metadata,
                }
            })
            .collect()
    }

    /// Publishes confirmed events to the stream sink; failures are
    /// reported, never propagated.
    async fn publish_confirmed(&self, events: &[StateTransitionEvent], first_seq: u64) {
        if !self.inner.options.publish_to_stream {
            return;
        }
        let (Some(sink), Some(namespace)) =
            (&self.inner.stream, &self.inner.options.stream_namespace)
        else {
            return;
        };
        for (offset, event) in events.iter().enumerate() {
            let record = RecordedEvent {
                seq: first_seq + offset as u64,
                event: event.clone(),
            };
            if let Err(err) = sink.publish(namespace, &self.inner.entity, &record).await {
                self.inner
                    .telemetry
                    .stream_publish_failed(&self.inner.entity, &err.to_string());
            }
        }
    }

    /// Writes a snapshot when the cadence is due. Failures degrade to
    /// best-effort; the durable log remains authoritative.
    async fn maybe_snapshot(&self, state: &mut MutableState) {
        if !self.inner.options.enable_snapshots {
            return;
        }
        let Some(store) = &self.inner.snapshots else {
            return;
        };
        if state.events_since_snapshot < self.inner.options.snapshot_interval {
            return;
        }
        let snapshot = Self::snapshot_of(state, self.inner.definition.version());
        match store.save(&self.inner.entity, &snapshot).await {
            Ok(()) => {
                state.events_since_snapshot = 0;
                self.inner.telemetry.snapshot_written(&self.inner.entity, state.last_seq);
            }
            Err(err) => {
                self.inner.telemetry.snapshot_failed(&self.inner.entity, &err.to_string());
            }
        }
    }

    /// Captures the persistent snapshot form of the current state.
    fn snapshot_of(state: &MutableState, version: DefinitionVersion) -> EntitySnapshot {
        EntitySnapshot {
            current_states: state.machine.region_states().to_vec(),
            last_transition_at: state.last_transition_at,
            transition_count: state.transition_count,
            last_seq: state.last_seq,
            definition_version: version,
            active_reminders: state
                .active_reminders
                .values()
                .map(StateTimeoutConfig::to_persisted)
                .collect(),
        }
    }

    /// Refreshes the lock-free read view after a committed change.
    fn refresh_view(&self, state: &MutableState) {
        if let Ok(mut view) = self.inner.view.write() {
            view.region_states = state.machine.region_states().to_vec();
            view.transition_count = state.transition_count;
            view.last_transition_at = state.last_transition_at;
        }
    }

    // ------------------------------------------------------------------
    // Pure reads: view snapshot, never suspends.
    // ------------------------------------------------------------------

    /// Returns the primary region's leaf state.
    #[must_use]
    pub fn current_state(&self) -> StateId {
        self.read_view().region_states[0].clone()
    }

    /// Returns the leaf state per region in declared region order.
    #[must_use]
    pub fn region_states(&self) -> Vec<StateId> {
        self.read_view().region_states
    }

    /// Returns `true` iff any region's leaf equals `state` or sits below
    /// it in the hierarchy.
    #[must_use]
    pub fn is_in(&self, state: &StateId) -> bool {
        self.read_view()
            .region_states
            .iter()
            .any(|leaf| self.inner.definition.is_in(leaf, state))
    }

    /// Probes whether `trigger` would fire with `args` right now.
    #[must_use]
    pub fn can_fire(&self, trigger: &TriggerId, args: &TriggerArgs) -> CanFire {
        let view = self.read_view();
        match Machine::restored(Arc::clone(&self.inner.definition), &view.region_states) {
            Ok(machine) => machine.can_fire(trigger, args),
            Err(_) => CanFire::rejected(Vec::new()),
        }
    }

    /// Returns the triggers that would currently fire with `args`.
    #[must_use]
    pub fn permitted(&self, args: &TriggerArgs) -> BTreeSet<TriggerId> {
        let view = self.read_view();
        Machine::restored(Arc::clone(&self.inner.definition), &view.region_states)
            .map(|machine| machine.permitted(args))
            .unwrap_or_default()
    }

    /// Returns a read-only snapshot of the entity and its definition.
    #[must_use]
    pub fn info(&self) -> MachineInfo {
        let view = self.read_view();
        MachineInfo {
            entity: self.inner.entity.clone(),
            machine_type: self.inner.definition.machine_type().clone(),
            definition_version: self.inner.definition.version(),
            region_states: view.region_states,
            transition_count: view.transition_count,
            last_transition_at: view.last_transition_at,
            states: self.inner.definition.states(),
            triggers: self.inner.definition.triggers(),
        }
    }

    /// Reads the current view, tolerating a poisoned lock by falling back
    /// to the poisoned value.
    fn read_view(&self) -> StateView {
        match self.inner.view.read() {
            Ok(view) => view.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    // ------------------------------------------------------------------
    // Correlation, checkpoint, deactivation.
    // ------------------------------------------------------------------

    /// Stamps subsequent events with `correlation` (or clears it).
    pub async fn set_correlation(&self, correlation: Option<CorrelationId>) {
        let mut state = self.inner.state.lock().await;
        state.correlation = correlation;
    }

    /// Confirms pending transitions (batch-confirm mode) and returns the
    /// confirmed version.
    ///
    /// # Errors
    ///
    /// Returns [`FireError::Storage`] when the append fails; pending events
    /// stay buffered for a later checkpoint.
    pub async fn checkpoint(&self) -> Result<u64, FireError> {
        let mut state = self.inner.state.lock().await;
        self.flush_pending(&mut state).await
    }

    /// Flushes the pending buffer under the entity mutex.
    async fn flush_pending(&self, state: &mut MutableState) -> Result<u64, FireError> {
        if state.pending.is_empty() {
            return Ok(state.last_seq);
        }
        let events: Vec<StateTransitionEvent> = state.pending.clone();
        let confirmed = self
            .inner
            .events
            .append(&self.inner.entity, &events, state.last_seq)
            .await
            .map_err(|err| FireError::Storage(err.to_string()))?;
        let first_seq = state.last_seq + 1;
        state.pending.clear();
        state.last_seq = confirmed;
        state.events_since_snapshot += events.len() as u64;
        for (offset, event) in events.iter().enumerate() {
            self.inner.telemetry.transition_recorded(&self.inner.entity, &RecordedEvent {
                seq: first_seq + offset as u64,
                event: event.clone(),
            });
        }
        self.publish_confirmed(&events, first_seq).await;
        self.maybe_snapshot(state).await;
        Ok(confirmed)
    }

    /// Deactivates the entity: confirms pending events, optionally writes
    /// a final snapshot, and cancels in-process timers. Durable reminders
    /// stay registered so they survive the deactivation.
    ///
    /// # Errors
    ///
    /// Returns [`FireError::Storage`] when the final flush fails.
    pub async fn deactivate(&self) -> Result<(), FireError> {
        let mut state = self.inner.state.lock().await;
        self.flush_pending(&mut state).await?;
        if self.inner.options.enable_snapshots
            && let Some(store) = &self.inner.snapshots
        {
            let snapshot = Self::snapshot_of(&state, self.inner.definition.version());
            match store.save(&self.inner.entity, &snapshot).await {
                Ok(()) => {
                    state.events_since_snapshot = 0;
                    self.inner.telemetry.snapshot_written(&self.inner.entity, state.last_seq);
                }
                Err(err) => {
                    self.inner.telemetry.snapshot_failed(&self.inner.entity, &err.to_string());
                }
            }
        }
        if let Some(service) = &self.inner.timer_service {
            for (_, handle) in state.active_timers.drain() {
                service.cancel(handle);
            }
        } else {
            state.active_timers.clear();
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Timers and reminders.
    // ------------------------------------------------------------------

    /// Arms timers for the states active at activation time and
    /// re-registers durable reminders restored from the snapshot.
    async fn arm_initial_timers(&self) {
        let mut state = self.inner.state.lock().await;
        let mut entered: Vec<StateId> = Vec::new();
        for leaf in state.machine.region_states() {
            for ancestor in self.inner.definition.ancestors(leaf) {
                if !entered.contains(&ancestor) {
                    entered.push(ancestor);
                }
            }
        }
        let restored: Vec<StateTimeoutConfig> = state.active_reminders.values().cloned().collect();
        for config in restored {
            self.register_reminder(&mut state, &config).await;
        }
        self.start_timers_for(&mut state, &entered).await;
    }

    /// Cancels timers for exited states and arms timers for entered ones.
    async fn rebind_timers(&self, state: &mut MutableState, plan: &FirePlan) {
        let mut exited: Vec<StateId> = Vec::new();
        let mut entered: Vec<StateId> = Vec::new();
        for region_plan in &plan.regions {
            exited.extend(region_plan.exit_chain.iter().cloned());
            entered.extend(region_plan.entry_chain.iter().cloned());
        }
        if exited.is_empty() && entered.is_empty() {
            return;
        }

        // Cancel, then clear: never mutate the active maps mid-iteration.
        let mut cancelled_timers: Vec<TimerName> = Vec::new();
        let mut cancelled_reminders: Vec<TimerName> = Vec::new();
        for config in &self.inner.timeouts {
            if !exited.contains(&config.state) {
                continue;
            }
            if config.is_durable() && state.active_reminders.contains_key(&config.name) {
                if let Some(service) = &self.inner.reminder_service
                    && let Err(err) = service.unregister(&self.inner.entity, &config.name).await
                {
                    self.inner.telemetry.timer_error(
                        &self.inner.entity,
                        &config.name,
                        &err.to_string(),
                    );
                }
                cancelled_reminders.push(config.name.clone());
            } else if !config.is_durable()
                && let Some(handle) = state.active_timers.get(&config.name)
            {
                if let Some(service) = &self.inner.timer_service {
                    service.cancel(*handle);
                }
                cancelled_timers.push(config.name.clone());
            }
        }
        for name in cancelled_timers {
            state.active_timers.remove(&name);
        }
        for name in cancelled_reminders {
            state.active_reminders.remove(&name);
        }

        self.start_timers_for(state, &entered).await;
    }

    /// Arms every timeout bound to one of `states`.
    async fn start_timers_for(&self, state: &mut MutableState, states: &[StateId]) {
        let configs: Vec<StateTimeoutConfig> = self
            .inner
            .timeouts
            .iter()
            .filter(|config| states.contains(&config.state))
            .cloned()
            .collect();
        for config in configs {
            if config.is_durable() {
                self.register_reminder(state, &config).await;
            } else {
                self.start_in_memory_timer(state, &config);
            }
        }
    }

    /// Registers one durable reminder, best-effort.
    async fn register_reminder(&self, state: &mut MutableState, config: &StateTimeoutConfig) {
        let Some(service) = &self.inner.reminder_service else {
            self.inner.telemetry.timer_error(
                &self.inner.entity,
                &config.name,
                "no reminder service configured",
            );
            return;
        };
        let period = config.repeating.then_some(config.timeout);
        match service.register(&self.inner.entity, &config.name, config.timeout, period).await {
            Ok(()) => {
                state.active_reminders.insert(config.name.clone(), config.clone());
            }
            Err(err) => {
                self.inner.telemetry.timer_error(
                    &self.inner.entity,
                    &config.name,
                    &err.to_string(),
                );
            }
        }
    }

    /// Arms one in-process timer, best-effort.
    fn start_in_memory_timer(&self, state: &mut MutableState, config: &StateTimeoutConfig) {
        let Some(service) = &self.inner.timer_service else {
            self.inner.telemetry.timer_error(
                &self.inner.entity,
                &config.name,
                "no timer service configured",
            );
            return;
        };
        let weak: Weak<ActorInner> = Arc::downgrade(&self.inner);
        let callback_config = config.clone();
        let callback = Arc::new(move || -> TimerFuture {
            let weak = weak.clone();
            let config = callback_config.clone();
            Box::pin(async move {
                if let Some(inner) = weak.upgrade() {
                    let actor = MachineActor {
                        inner,
                    };
                    actor.timer_elapsed(&config).await;
                }
            })
        });
        let period = config.repeating.then_some(config.timeout);
        let handle = service.schedule(config.timeout, period, callback);
        state.active_timers.insert(config.name.clone(), handle);
    }

    /// Handles an elapsed in-process timer: re-checks the bound state under
    /// the entity mutex and fires from outside any hook.
    async fn timer_elapsed(&self, config: &StateTimeoutConfig) {
        let mut state = self.inner.state.lock().await;
        let still_in_state = state
            .machine
            .region_states()
            .iter()
            .any(|leaf| self.inner.definition.is_in(leaf, &config.state));
        if !still_in_state {
            // The entity left the state before the timer fired; repeating
            // timers are cancelled so they stop re-arming.
            if let Some(handle) = state.active_timers.remove(&config.name)
                && config.repeating
                && let Some(service) = &self.inner.timer_service
            {
                service.cancel(handle);
            }
            self.inner.telemetry.timer_dropped(&self.inner.entity, &config.name);
            return;
        }
        if !config.repeating {
            state.active_timers.remove(&config.name);
        }
        let request = FireRequest::new(config.trigger.clone());
        match self.fire_locked(&mut state, &request, Some(&config.state)).await {
            Ok(_) => self.inner.telemetry.timer_fired(&self.inner.entity, &config.name),
            Err(FireError::Transition(_)) => {
                self.inner.telemetry.timer_dropped(&self.inner.entity, &config.name);
            }
            Err(err) => {
                self.inner.telemetry.timer_error(
                    &self.inner.entity,
                    &config.name,
                    &err.to_string(),
                );
            }
        }
    }

    /// Handles an inbound durable reminder from the host.
    ///
    /// Unknown names and stale reminders are dropped quietly; transition
    /// refusals are swallowed and reported through telemetry.
    pub async fn handle_reminder(&self, name: &TimerName) {
        let mut state = self.inner.state.lock().await;
        let Some(config) = state.active_reminders.get(name).cloned() else {
            self.inner.telemetry.timer_dropped(&self.inner.entity, name);
            return;
        };
        let still_in_state = state
            .machine
            .region_states()
            .iter()
            .any(|leaf| self.inner.definition.is_in(leaf, &config.state));
        if !still_in_state {
            self.inner.telemetry.timer_dropped(&self.inner.entity, name);
            return;
        }
        if !config.repeating {
            state.active_reminders.remove(name);
            if let Some(service) = &self.inner.reminder_service
                && let Err(err) = service.unregister(&self.inner.entity, name).await
            {
                self.inner.telemetry.timer_error(&self.inner.entity, name, &err.to_string());
            }
        }
        let request = FireRequest::new(config.trigger.clone());
        match self.fire_locked(&mut state, &request, Some(&config.state)).await {
            Ok(_) => self.inner.telemetry.timer_fired(&self.inner.entity, name),
            Err(FireError::Transition(_)) => {
                self.inner.telemetry.timer_dropped(&self.inner.entity, name);
            }
            Err(err) => {
                self.inner.telemetry.timer_error(&self.inner.entity, name, &err.to_string());
            }
        }
    }

    /// Returns a handler closure the host wires into its reminder
    /// delivery, forwarding `on_reminder` callbacks to this adapter.
    #[must_use]
    pub fn reminder_handler(&self) -> Arc<dyn Fn(TimerName) -> TimerFuture + Send + Sync> {
        let weak: Weak<ActorInner> = Arc::downgrade(&self.inner);
        Arc::new(move |name: TimerName| -> TimerFuture {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(inner) = weak.upgrade() {
                    let actor = MachineActor {
                        inner,
                    };
                    actor.handle_reminder(&name).await;
                }
            })
        })
    }
}

// ============================================================================
// SECTION: Entity Reference
// ============================================================================

#[async_trait]
impl EntityRef for MachineActor {
    async fn fire(
        &self,
        trigger: &TriggerId,
        args: &TriggerArgs,
        correlation: Option<&CorrelationId>,
        dedupe: Option<&DedupeKey>,
    ) -> Result<FireReceipt, FireError> {
        if let Some(correlation) = correlation {
            self.set_correlation(Some(correlation.clone())).await;
        }
        let mut request = FireRequest::new(trigger.clone()).with_args(args.clone());
        if let Some(key) = dedupe {
            request = request.with_dedupe(key.clone());
        }
        self.fire_with(request).await
    }

    async fn current_state(&self) -> Result<StateId, FireError> {
        Ok(MachineActor::current_state(self))
    }
}
