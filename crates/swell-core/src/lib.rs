//! Core engine for Swell.
//!
//! The closed loop lives here: the plan store persists what the planner
//! produced, the wave executor drives the schedule and blocks on the
//! task-list handshake, the checkpoint gate verifies completion and rule
//! compliance before committing, and the watchdog owns authoritative
//! knowledge of which task processes are alive. All authoritative state is
//! on disk in human-readable forms; every progression step is verified
//! against that state before work may advance.

#![warn(missing_docs)]

/// Append-only activity log with size-bounded rotation.
pub mod activity;

/// The checkpoint gate.
pub mod checkpoint;

/// Context-budget monitoring and the pre-compaction hook.
pub mod context;

/// Core error taxonomy.
pub mod errors;

/// The wave executor.
pub mod executor;

/// Narrow version-control adapter.
pub mod git;

/// Plan document persistence.
pub mod plan_store;

/// Process execution boundary.
pub mod process;

/// Rule validation engine.
pub mod rule_engine;

/// Session snapshots and recall.
pub mod snapshot;

/// The process supervisor.
pub mod watchdog;
