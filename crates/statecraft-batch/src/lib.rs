// crates/statecraft-batch/src/lib.rs
// ============================================================================
// Module: Statecraft Batch
// Description: Bounded-parallelism trigger fan-out across entities.
// Purpose: Dispatch many trigger requests with retries and aggregation.
// Dependencies: statecraft-core, tokio, tokio-util
// ============================================================================

//! ## Overview
//! `statecraft-batch` dispatches trigger requests to many entities at once
//! under a counting semaphore: optional priority ordering, per-operation
//! retries with exponential backoff, per-item isolation, hard overall
//! deadlines, and an aggregated result preserving submission order.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod dispatcher;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use dispatcher::BATCH_ITEM_WIRE_ID;
pub use dispatcher::BATCH_REQUEST_WIRE_ID;
pub use dispatcher::BATCH_RESULT_WIRE_ID;
pub use dispatcher::BatchItemResult;
pub use dispatcher::BatchOptions;
pub use dispatcher::BatchRequest;
pub use dispatcher::BatchResult;
pub use dispatcher::SKIPPED_ERROR_KIND;
pub use dispatcher::execute_batch;
