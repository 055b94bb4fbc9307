// src/dump.rs

//! Diagnostic dump sink
//!
//! Resolution failures emit one dump each through this fire-and-forget
//! boundary. The on-disk format and storage belong to the collaborator;
//! the core only attaches context under well-known keys.

use std::collections::BTreeMap;

/// Context key under which the rendered solver state is attached
pub const STATE_CONTEXT_KEY: &str = "solver.state";

/// Sink for resolution failure dumps
///
/// Implementations must not fail the caller: dump generation is best-effort
/// and its errors are logged, never propagated.
pub trait DumpSink {
    fn generate_dump(&self, kind: &str, context: &BTreeMap<String, String>);
}

/// A sink that discards every dump
#[derive(Debug, Default)]
pub struct NoopDumpSink;

impl DumpSink for NoopDumpSink {
    fn generate_dump(&self, _kind: &str, _context: &BTreeMap<String, String>) {}
}
