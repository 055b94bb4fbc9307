// src/lib.rs

//! Weft: module dependency resolution and region isolation
//!
//! Given a set of root modules with declared imports/exports, weft discovers
//! the transitive closure of additional modules needed to satisfy their
//! constraints from a repository, feeds candidates to an external constraint
//! solver, isolates module groups into namespace-partitioned regions, and
//! diagnoses exactly why a module could not be wired when resolution fails.
//!
//! # Architecture
//!
//! - Quasi resolution: candidate bundles stage in a scratch coregion and
//!   nothing touches the running system until `commit`
//! - Opaque collaborators: the constraint solver, repository, installer,
//!   and dump sink sit behind narrow traits
//! - Region digraph: filtered edges make modules selectively visible across
//!   isolation boundaries, with hard no-duplicate invariants
//! - Deterministic outcomes: satisfiers and closures are ordered by
//!   (symbolic name, version) so repeated runs agree

pub mod calculator;
pub mod detective;
pub mod dump;
mod error;
pub mod module;
pub mod quasi;
pub mod region;
pub mod repository;
pub mod solver;
pub mod version;

pub use calculator::DependencyCalculator;
pub use detective::{NoopUsesAnalyser, ResolutionFailureDetective, UsesConflictAnalyser};
pub use dump::{DumpSink, NoopDumpSink, STATE_CONTEXT_KEY};
pub use error::{Error, Result};
pub use module::{
    BundleId, BundleIdAllocator, Constraint, FragmentHostSpec, ImportPackageSpec,
    ModuleDescription, ModuleIdentity, ModuleManifest, ModuleWiring, PackageExport,
    RequireBundleSpec, Resolution,
};
pub use quasi::{InstallHandle, Installer, QuasiFramework, QuasiResolutionFailure};
pub use region::{Region, RegionDigraph, RegionFilter, RegionFilterBuilder};
pub use repository::{
    ArtifactDescriptor, MemoryRepository, PropertyFilter, RepositoryQuery,
};
pub use solver::{ConstraintSolver, ResolverError, ResolverErrorKind, SolverState};
pub use version::{Version, VersionRange};
