// crates/statecraft-saga/src/graph.rs
// ============================================================================
// Module: Execution Graph
// Description: Validated DAG with Kahn-style execution levels.
// Purpose: Derive parallel levels and graph statistics before any step runs.
// Dependencies: statecraft-core, crate::builder, thiserror
// ============================================================================

//! ## Overview
//! The execution graph validates a workflow before the first step runs:
//! every dependency names an existing step, the dependency relation is
//! acyclic, and orphan steps are reported as warnings. Kahn-style peeling
//! derives execution levels: level *n* holds the steps whose dependencies
//! all sit in levels below *n*; one level runs concurrently. Statistics
//! (critical path, max parallelism, complexity) exist for observability
//! only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use thiserror::Error;

use statecraft_core::StepName;

use crate::builder::WorkflowConfig;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Graph validation errors. Fatal; nothing executes when one is returned.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// Two steps share a name.
    #[error("duplicate step name: {0}")]
    DuplicateStep(StepName),
    /// A dependency names a step that does not exist.
    #[error("step {step} depends on unknown step {dependency}")]
    UnknownDependency {
        /// Step declaring the dependency.
        step: StepName,
        /// Missing dependency name.
        dependency: StepName,
    },
    /// The dependency relation contains a cycle through these steps.
    #[error("dependency cycle involving: {}", involved.iter().map(|step| step.as_str()).collect::<Vec<_>>().join(", "))]
    Cycle {
        /// Steps that could not be scheduled.
        involved: Vec<StepName>,
    },
    /// The workflow declares no steps.
    #[error("workflow declares no steps")]
    Empty,
}

// ============================================================================
// SECTION: Statistics
// ============================================================================

/// Observability statistics for one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphStats {
    /// Total step count.
    pub step_count: usize,
    /// Total dependency edge count.
    pub edge_count: usize,
    /// Length of the longest dependency chain (equals the level count).
    pub critical_path_length: usize,
    /// Largest level cardinality.
    pub max_parallelism: usize,
    /// Rough complexity score: steps + edges + levels.
    pub complexity_score: usize,
}

// ============================================================================
// SECTION: Execution Graph
// ============================================================================

/// Validated workflow DAG with derived execution levels.
#[derive(Debug, Clone)]
pub struct ExecutionGraph {
    /// Execution levels in order; steps within one level run concurrently.
    pub levels: Vec<Vec<StepName>>,
    /// Non-fatal findings (orphan steps).
    pub warnings: Vec<String>,
    /// Graph statistics.
    pub stats: GraphStats,
}

impl ExecutionGraph {
    /// Validates the workflow and derives execution levels.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError`] on duplicate steps, unknown dependencies, or
    /// cycles.
    pub fn build(config: &WorkflowConfig) -> Result<Self, GraphError> {
        if config.steps.is_empty() {
            return Err(GraphError::Empty);
        }

        let mut dependencies: BTreeMap<&StepName, BTreeSet<&StepName>> = BTreeMap::new();
        for step in &config.steps {
            if dependencies.insert(&step.name, step.depends_on.iter().collect()).is_some() {
                return Err(GraphError::DuplicateStep(step.name.clone()));
            }
        }
        let mut edge_count = 0usize;
        for step in &config.steps {
            for dependency in &step.depends_on {
                if !dependencies.contains_key(dependency) {
                    return Err(GraphError::UnknownDependency {
                        step: step.name.clone(),
                        dependency: dependency.clone(),
                    });
                }
                edge_count += 1;
            }
        }

        // Kahn-style peeling: each round takes every step whose remaining
        // dependencies are already scheduled.
        let mut scheduled: BTreeSet<&StepName> = BTreeSet::new();
        let mut levels: Vec<Vec<StepName>> = Vec::new();
        while scheduled.len() < dependencies.len() {
            let mut level: Vec<StepName> = Vec::new();
            for step in &config.steps {
                if scheduled.contains(&step.name) {
                    continue;
                }
                let ready = step.depends_on.iter().all(|dependency| {
                    scheduled.contains(dependency)
                });
                if ready {
                    level.push(step.name.clone());
                }
            }
            if level.is_empty() {
                let involved: Vec<StepName> = config
                    .steps
                    .iter()
                    .map(|step| step.name.clone())
                    .filter(|name| !scheduled.contains(name))
                    .collect();
                return Err(GraphError::Cycle {
                    involved,
                });
            }
            for name in &level {
                // Borrow the canonical key owned by the dependency map.
                if let Some((key, _)) = dependencies.get_key_value(name) {
                    scheduled.insert(*key);
                }
            }
            levels.push(level);
        }

        // Orphans: disconnected steps in a workflow that otherwise has
        // edges. They run, but the declaration is suspicious.
        let mut warnings = Vec::new();
        if edge_count > 0 {
            let depended_upon: BTreeSet<&StepName> =
                config.steps.iter().flat_map(|step| step.depends_on.iter()).collect();
            for step in &config.steps {
                if step.depends_on.is_empty() && !depended_upon.contains(&step.name) {
                    warnings.push(format!(
                        "step {} has no dependencies and no dependents",
                        step.name
                    ));
                }
            }
        }

        let max_parallelism = levels.iter().map(Vec::len).max().unwrap_or(0);
        let stats = GraphStats {
            step_count: config.steps.len(),
            edge_count,
            critical_path_length: levels.len(),
            max_parallelism,
            complexity_score: config.steps.len() + edge_count + levels.len(),
        };
        Ok(Self {
            levels,
            warnings,
            stats,
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions and helpers are permitted."
)]
mod tests {
    use statecraft_core::StepName;

    use super::ExecutionGraph;
    use super::GraphError;
    use crate::builder::SagaBuilder;
    use crate::step::StepOutcome;
    use crate::step::step;

    fn noop() -> std::sync::Arc<dyn crate::step::StepHandler> {
        step(|_| async { StepOutcome::done() })
    }

    #[test]
    fn diamond_peels_into_three_levels() {
        let config = SagaBuilder::new("diamond")
            .step("A", noop())
            .step_with("B", noop(), |options| options.depends_on("A"))
            .step_with("C", noop(), |options| options.depends_on("A"))
            .step_with("D", noop(), |options| options.depends_on("B").depends_on("C"))
            .build();
        let graph = ExecutionGraph::build(&config).expect("build graph");
        assert_eq!(graph.levels.len(), 3);
        assert_eq!(graph.levels[0], vec![StepName::new("A")]);
        assert_eq!(graph.levels[1], vec![StepName::new("B"), StepName::new("C")]);
        assert_eq!(graph.levels[2], vec![StepName::new("D")]);
        assert_eq!(graph.stats.critical_path_length, 3);
        assert_eq!(graph.stats.max_parallelism, 2);
        assert_eq!(graph.stats.edge_count, 4);
    }

    #[test]
    fn unknown_dependencies_are_fatal() {
        let config = SagaBuilder::new("broken")
            .step_with("A", noop(), |options| options.depends_on("Ghost"))
            .build();
        assert!(matches!(
            ExecutionGraph::build(&config),
            Err(GraphError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn cycles_are_fatal() {
        let config = SagaBuilder::new("cycle")
            .step_with("A", noop(), |options| options.depends_on("B"))
            .step_with("B", noop(), |options| options.depends_on("A"))
            .build();
        assert!(matches!(ExecutionGraph::build(&config), Err(GraphError::Cycle { .. })));
    }

    #[test]
    fn duplicate_steps_are_fatal() {
        let config = SagaBuilder::new("dupe").step("A", noop()).step("A", noop()).build();
        assert!(matches!(
            ExecutionGraph::build(&config),
            Err(GraphError::DuplicateStep(_))
        ));
    }

    #[test]
    fn orphans_warn_but_do_not_fail() {
        let config = SagaBuilder::new("orphan")
            .step("A", noop())
            .step_with("B", noop(), |options| options.depends_on("A"))
            .step("Lonely", noop())
            .build();
        let graph = ExecutionGraph::build(&config).expect("build graph");
        assert_eq!(graph.warnings.len(), 1);
        assert!(graph.warnings[0].contains("Lonely"));
    }
}
