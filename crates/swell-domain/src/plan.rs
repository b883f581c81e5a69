//! The persisted wave plan document.
//!
//! The on-disk shape is authoritative and bit-exact (stable field order,
//! pretty-printed): a top-level `execution_plan` object holding the phase
//! id, creation timestamp, and ordered waves. Unknown keys are tolerated on
//! read and never emitted on write.

use std::collections::BTreeSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};

/// Top-level wrapper matching the on-disk document.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct PlanDocument {
    /// The plan itself.
    pub execution_plan: Plan,
}

/// A full execution plan for one phase.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Plan {
    /// Phase identifier.
    pub phase_id: String,
    /// ISO-8601 creation timestamp; stable within a single orchestration.
    pub created_at: String,
    /// Waves in execution order.
    pub waves: Vec<Wave>,
}

/// Execution strategy tag for a wave. Advisory: the executor never spawns
/// parallel workers itself.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WaveStrategy {
    /// Every task has a non-empty, pairwise-disjoint file-write set.
    Parallel,
    /// Tasks should be handed to workers one at a time.
    Sequential,
}

impl WaveStrategy {
    /// Stable display label, matching the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            WaveStrategy::Parallel => "PARALLEL",
            WaveStrategy::Sequential => "SEQUENTIAL",
        }
    }
}

/// A contiguous group of tasks with no mutual dependencies or file
/// conflicts.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Wave {
    /// 1-based, contiguous wave index.
    pub wave_id: u32,
    /// Advisory execution strategy.
    pub strategy: WaveStrategy,
    /// Human-readable rationale for the grouping.
    pub rationale: String,
    /// Tasks in ingestion order.
    pub tasks: Vec<PlannedTask>,
    /// What the checkpoint gate runs after this wave.
    pub checkpoint_after: CheckpointPolicy,
}

/// A task as recorded in the plan.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct PlannedTask {
    /// Task id.
    pub task_id: String,
    /// Assigned-role hint for the worker.
    pub agent_role: String,
    /// Instruction text handed to the worker.
    pub instruction: String,
    /// File paths the task will write.
    pub file_locks: Vec<String>,
    /// Rule tags to validate this task's outputs against.
    pub constitution_rules: Vec<String>,
    /// Predecessor task ids.
    pub dependencies: Vec<String>,
}

/// Checkpoint policy attached to a wave.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(default)]
pub struct CheckpointPolicy {
    /// Whether the gate runs at all.
    pub enabled: bool,
    /// Re-parse the task list and verify every task is checked off.
    pub verify_completion: bool,
    /// Run rule validation on changed files.
    pub validate_constitution: bool,
    /// Create the checkpoint commit.
    pub git_commit: bool,
    /// Regenerate the progress artifact.
    pub update_progress: bool,
}

impl Default for CheckpointPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            verify_completion: true,
            validate_constitution: true,
            git_commit: true,
            update_progress: true,
        }
    }
}

impl PlanDocument {
    /// Validate the structural invariants of the plan.
    ///
    /// - wave ids are 1..N contiguous;
    /// - task ids are unique across the plan;
    /// - every dependency names a task in the plan, placed in a strictly
    ///   earlier wave;
    /// - no two tasks in the same wave share a file-write path.
    pub fn validate(&self) -> DomainResult<()> {
        let plan = &self.execution_plan;

        for (idx, wave) in plan.waves.iter().enumerate() {
            let expected = (idx + 1) as u32;
            if wave.wave_id != expected {
                return Err(DomainError::InvalidPlan(format!(
                    "wave ids must be contiguous from 1; found {} at position {}",
                    wave.wave_id,
                    idx + 1
                )));
            }
        }

        let mut wave_of: std::collections::BTreeMap<&str, u32> = Default::default();
        for wave in &plan.waves {
            for task in &wave.tasks {
                if wave_of.insert(task.task_id.as_str(), wave.wave_id).is_some() {
                    return Err(DomainError::InvalidPlan(format!(
                        "duplicate task id '{}'",
                        task.task_id
                    )));
                }
            }
        }

        for wave in &plan.waves {
            let mut claimed: BTreeSet<&str> = BTreeSet::new();
            for task in &wave.tasks {
                for dep in &task.dependencies {
                    match wave_of.get(dep.as_str()) {
                        None => {
                            return Err(DomainError::UnknownPredecessor {
                                task_id: task.task_id.clone(),
                                predecessor: dep.clone(),
                            });
                        }
                        Some(dep_wave) if *dep_wave >= wave.wave_id => {
                            return Err(DomainError::InvalidPlan(format!(
                                "task '{}' in wave {} depends on '{}' in wave {}",
                                task.task_id, wave.wave_id, dep, dep_wave
                            )));
                        }
                        Some(_) => {}
                    }
                }
                for file in &task.file_locks {
                    if !claimed.insert(file.as_str()) {
                        return Err(DomainError::InvalidPlan(format!(
                            "wave {} has two tasks writing '{}'",
                            wave.wave_id, file
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    /// Serialize to the canonical on-disk form (pretty JSON, stable field
    /// order, trailing newline).
    pub fn to_canonical_json(&self) -> String {
        let mut out = serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string());
        out.push('\n');
        out
    }
}
