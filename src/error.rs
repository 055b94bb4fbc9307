// src/error.rs

//! Crate-wide error type and `Result` alias.
//!
//! One `Error` enum, derived with `thiserror`, carries every failure weft can
//! surface. Each variant's shape is exactly what the call sites construct and
//! match on elsewhere in the crate.

use crate::solver::ResolverError;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Every way a weft operation can fail.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A bundle id or `(name, version)` identity was already registered.
    #[error("duplicate bundle {symbolic_name} {version}: {reason}")]
    DuplicateBundle {
        symbolic_name: String,
        version: String,
        reason: String,
    },

    /// An artifact descriptor could not be turned into a manifest.
    #[error("malformed descriptor {name}: {reason}")]
    MalformedDescriptor { name: String, reason: String },

    /// A root module's dependencies could not be satisfied.
    #[error("unable to satisfy dependencies for {symbolic_name} {version}: {description}")]
    UnableToSatisfyDependencies {
        symbolic_name: String,
        version: String,
        description: String,
        errors: Vec<ResolverError>,
    },

    /// A commit could not proceed because preconditions were not met.
    #[error("commit blocked: {0}")]
    CommitBlocked(String),

    /// The installer rejected a module.
    #[error("install failed at {location}: {reason}")]
    Install { location: String, reason: String },

    /// A region edge is not supported (self-loop or duplicate edge).
    #[error("unsupported edge from '{tail}' to '{head}': {reason}")]
    UnsupportedEdge {
        tail: String,
        head: String,
        reason: String,
    },

    /// The named region does not exist.
    #[error("no such region: {0}")]
    NoSuchRegion(String),

    /// The requested operation is not valid in the current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A version string could not be parsed.
    #[error("invalid version '{input}': {reason}")]
    InvalidVersion { input: String, reason: String },

    /// A version range string could not be parsed.
    #[error("invalid version range '{input}': {reason}")]
    InvalidVersionRange { input: String, reason: String },
}
