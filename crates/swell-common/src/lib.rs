//! Shared utilities used across Swell crates.
//!
//! `swell-common` is intentionally small and boring: it contains foundational
//! building blocks that are reused across the workspace but do not encode
//! domain-specific behavior.
//!
//! Most crates should depend on these helpers instead of duplicating ad-hoc
//! path construction, locking, and I/O glue.

#![warn(missing_docs)]

/// File-system abstraction used to make I/O testable.
pub mod fs;

/// Convenience wrappers around common file I/O operations.
pub mod io;

/// Advisory file-lock primitives.
pub mod lock;

/// Canonical `.swell/` path builders.
pub mod paths;
