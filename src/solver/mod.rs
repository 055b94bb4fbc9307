// src/solver/mod.rs

//! Constraint solver boundary
//!
//! The actual wiring algorithm is an external collaborator behind the
//! [`ConstraintSolver`] trait: it accepts the shared mutable [`SolverState`],
//! attempts resolution, and reports structured unsatisfied-constraint errors.
//! The state is destructively mutated by resolution; callers pass a
//! disposable copy, never live production state.

use crate::error::{Error, Result};
use crate::module::{BundleId, Constraint, ModuleDescription};
use crate::version::Version;
use std::collections::BTreeMap;
use strum_macros::Display;

/// Classification of a resolver failure
///
/// The renderer matches exhaustively; `Unknown` stays as the safety net for
/// solver versions that report kinds this crate does not know yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ResolverErrorKind {
    MissingImportPackage,
    MissingRequireBundle,
    MissingFragmentHost,
    FragmentConflict,
    ImportPackageUsesConflict,
    SingletonSelection,
    ImportPermissionDenied,
    ExportPermissionDenied,
    PlatformFilterMismatch,
    MissingExecutionEnvironment,
    MissingGenericCapability,
    NativeCodeMismatch,
    DisabledBundle,
    Unknown,
}

/// A classified resolution failure reported by the solver
///
/// Immutable and short-lived: produced by a resolve cycle, consumed by the
/// failure detective within the same cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolverError {
    pub module: BundleId,
    pub kind: ResolverErrorKind,
    /// The unsatisfied constraint, when the failure is constraint-specific
    pub constraint: Option<Constraint>,
    /// Free-text diagnostic data attached by the solver
    pub data: Option<String>,
}

impl ResolverError {
    pub fn new(module: BundleId, kind: ResolverErrorKind) -> Self {
        Self {
            module,
            kind,
            constraint: None,
            data: None,
        }
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraint = Some(constraint);
        self
    }

    pub fn with_data(mut self, data: &str) -> Self {
        self.data = Some(data.to_string());
        self
    }
}

/// The shared mutable resolution state
///
/// An ordered map of bundle id → module description. Ids are allocated
/// monotonically, so iteration order is insertion order; the detective's
/// first-found tie-breaking depends on that.
#[derive(Debug, Clone, Default)]
pub struct SolverState {
    modules: BTreeMap<BundleId, ModuleDescription>,
}

impl SolverState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module
    ///
    /// Fails with [`Error::DuplicateBundle`] when the id or the
    /// (name, version) identity is already registered.
    pub fn add_module(&mut self, module: ModuleDescription) -> Result<()> {
        if self.modules.contains_key(&module.id) {
            return Err(Error::DuplicateBundle {
                symbolic_name: module.identity.symbolic_name.clone(),
                version: module.identity.version.to_string(),
                reason: format!("bundle id {} is already registered", module.id),
            });
        }
        if self
            .modules
            .values()
            .any(|existing| existing.identity == module.identity)
        {
            return Err(Error::DuplicateBundle {
                symbolic_name: module.identity.symbolic_name.clone(),
                version: module.identity.version.to_string(),
                reason: "identity is already registered".to_string(),
            });
        }
        self.modules.insert(module.id, module);
        Ok(())
    }

    pub fn get(&self, id: BundleId) -> Option<&ModuleDescription> {
        self.modules.get(&id)
    }

    pub fn get_mut(&mut self, id: BundleId) -> Option<&mut ModuleDescription> {
        self.modules.get_mut(&id)
    }

    pub fn remove_module(&mut self, id: BundleId) -> Option<ModuleDescription> {
        self.modules.remove(&id)
    }

    pub fn modules(&self) -> impl Iterator<Item = &ModuleDescription> {
        self.modules.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = BundleId> + '_ {
        self.modules.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Every registered module with the given symbolic name
    pub fn bundles_by_name(&self, symbolic_name: &str) -> Vec<&ModuleDescription> {
        self.modules
            .values()
            .filter(|m| m.identity.symbolic_name == symbolic_name)
            .collect()
    }

    pub fn is_resolved(&self, id: BundleId) -> bool {
        self.modules.get(&id).is_some_and(|m| m.resolved)
    }

    pub fn unresolved_modules(&self) -> Vec<BundleId> {
        self.modules
            .values()
            .filter(|m| !m.resolved)
            .map(|m| m.id)
            .collect()
    }

    /// Every package export in the state, with its version and exporter
    pub fn exported_packages(&self) -> Vec<(String, Version, BundleId)> {
        self.modules
            .values()
            .flat_map(|m| {
                m.exports
                    .iter()
                    .map(|e| (e.package.clone(), e.version.clone(), m.id))
            })
            .collect()
    }
}

/// Opaque boundary to the external constraint solver
pub trait ConstraintSolver {
    /// Attempt to resolve the target modules against everything registered
    /// in the state; mutates wiring and returns the newly resolved delta.
    fn resolve(&mut self, state: &mut SolverState, targets: &[BundleId]) -> Vec<BundleId>;

    /// Errors pertaining to a module; valid after a `resolve` call
    fn resolver_errors(&self, state: &SolverState, module: BundleId) -> Vec<ResolverError>;

    /// Constraints with no candidate at all, scoped to the given modules
    ///
    /// Distinct from constraints whose candidate lost a uses-conflict.
    fn unsatisfied_leaves(
        &self,
        state: &SolverState,
        modules: &[BundleId],
    ) -> Vec<(BundleId, Constraint)>;
}
