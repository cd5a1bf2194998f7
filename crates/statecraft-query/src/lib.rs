// crates/statecraft-query/src/lib.rs
// ============================================================================
// Module: Statecraft Query
// Description: History query engine over per-entity event logs.
// Purpose: Filter, order, page, and aggregate transition history.
// Dependencies: statecraft-core, time
// ============================================================================

//! ## Overview
//! `statecraft-query` reads an entity's durable transition history through
//! the core storage interface and shapes it: temporal and content filters,
//! time ordering with pagination, terminal forms (list/first/count/any),
//! and aggregations over states, triggers, and calendar buckets. The
//! engine is strictly read-only.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod aggregate;
pub mod buckets;
pub mod query;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use aggregate::StateResidency;
pub use aggregate::TriggerStats;
pub use aggregate::group_by_period;
pub use aggregate::group_by_state;
pub use aggregate::group_by_trigger;
pub use buckets::Period;
pub use buckets::bucket_start;
pub use query::HistoryQuery;
pub use query::QueryError;
pub use query::TimeOrder;
