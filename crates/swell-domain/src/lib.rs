//! Domain models for Swell.
//!
//! This crate holds the typed core the rest of the workspace agrees on:
//! the task model and task-list ingestor, the dependency-and-wave planner,
//! the persisted plan document, and the rule-document model. It performs no
//! I/O beyond what callers hand it as strings; persistence lives in
//! `swell-core`.

#![warn(missing_docs)]

/// Domain error taxonomy.
pub mod errors;

/// Wave plan document model and invariants.
pub mod plan;

/// Dependency graph construction and wave assignment.
pub mod planner;

/// Rule-document model, parser, and quality scoring.
pub mod rules;

/// Task model and task-list ingestion.
pub mod tasks;
