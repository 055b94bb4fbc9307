// src/quasi/mod.rs

//! Quasi framework orchestration
//!
//! The quasi framework stages candidate modules in a scratch "coregion",
//! resolves them together with their transitively provisioned dependencies,
//! and only commits to physical installation once the whole batch is
//! conflict-free. Resolution failures come back as data, not errors; commit
//! failures roll back every installation made in that pass.
//!
//! Per-instance state machine: Empty → Bundles-Installed →
//! Resolved(with-dependencies) → Committed, or Resolved(with-failures) and
//! back to Bundles-Installed after the batch is discarded.

mod failure;

pub use failure::QuasiResolutionFailure;

use crate::calculator::DependencyCalculator;
use crate::detective::{ResolutionFailureDetective, UsesConflictAnalyser};
use crate::dump::{DumpSink, NoopDumpSink};
use crate::error::{Error, Result};
use crate::module::{
    BundleId, BundleIdAllocator, ModuleDescription, ModuleIdentity, ModuleManifest,
};
use crate::region::RegionDigraph;
use crate::repository::RepositoryQuery;
use crate::solver::{ConstraintSolver, SolverState};
use crate::version::Version;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Opaque handle to a physically installed bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallHandle {
    pub id: u64,
    pub location: String,
}

/// Physical installation collaborator
///
/// Installs, starts, and uninstalls bundles in the running system. All side
/// effects live behind this boundary; the framework only sequences them.
pub trait Installer {
    fn install(&mut self, location: &str, manifest: &ModuleManifest) -> Result<InstallHandle>;
    fn start(&mut self, handle: &InstallHandle) -> Result<()>;
    fn uninstall(&mut self, handle: &InstallHandle) -> Result<()>;
}

struct FrameworkInner {
    state: SolverState,
    digraph: RegionDigraph,
    solver: Box<dyn ConstraintSolver + Send>,
    installer: Box<dyn Installer + Send>,
    calculator: DependencyCalculator,
    detective: Arc<ResolutionFailureDetective>,
    ids: Arc<BundleIdAllocator>,
    coregion: Option<String>,
    roots: Vec<BundleId>,
    cached_deps: Option<Vec<BundleId>>,
}

/// Orchestrates install → resolve → commit for one batch of modules
///
/// One monitor serializes every operation; the solver state is exclusively
/// owned scratch space and never shared with a live system.
pub struct QuasiFramework {
    inner: Mutex<FrameworkInner>,
}

impl QuasiFramework {
    pub fn new(
        solver: Box<dyn ConstraintSolver + Send>,
        repository: Box<dyn RepositoryQuery + Send + Sync>,
        installer: Box<dyn Installer + Send>,
    ) -> Self {
        Self::with_collaborators(
            solver,
            repository,
            installer,
            Box::new(NoopDumpSink),
            None,
        )
    }

    pub fn with_collaborators(
        solver: Box<dyn ConstraintSolver + Send>,
        repository: Box<dyn RepositoryQuery + Send + Sync>,
        installer: Box<dyn Installer + Send>,
        dump: Box<dyn DumpSink + Send + Sync>,
        uses: Option<Box<dyn UsesConflictAnalyser + Send + Sync>>,
    ) -> Self {
        let detective = Arc::new(match uses {
            Some(analyser) => ResolutionFailureDetective::with_uses_analyser(analyser),
            None => ResolutionFailureDetective::new(),
        });
        let ids = Arc::new(BundleIdAllocator::new());
        let calculator =
            DependencyCalculator::new(repository, dump, detective.clone(), ids.clone());

        Self {
            inner: Mutex::new(FrameworkInner {
                state: SolverState::new(),
                digraph: RegionDigraph::new(),
                solver,
                installer,
                calculator,
                detective,
                ids,
                coregion: None,
                roots: Vec::new(),
                cached_deps: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FrameworkInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a candidate root module in the coregion
    ///
    /// The manifest is pre-parsed; this allocates a bundle id, creates the
    /// description, and stages it for the next `resolve`.
    pub fn install(&self, location: &str, manifest: ModuleManifest) -> Result<BundleId> {
        let mut inner = self.lock();

        let coregion = match inner.coregion.clone() {
            Some(name) => name,
            None => {
                let name = "quasi.coregion".to_string();
                inner.digraph.add_region(&name);
                inner.coregion = Some(name.clone());
                name
            }
        };

        let id = inner.ids.next_id();
        let identity = manifest.identity.clone();
        inner
            .state
            .add_module(ModuleDescription::from_manifest(id, location, manifest))?;
        inner.digraph.add_bundle(&coregion, id, &identity)?;
        inner.roots.push(id);
        inner.cached_deps = None;

        info!(bundle = id, module = %identity, location, "installed quasi bundle");
        Ok(id)
    }

    /// Resolve the installed batch against the repository
    ///
    /// Success caches the computed dependency set for `commit` and returns
    /// an empty list. Ordinary resolution failure returns the structured
    /// failure records; structural failures degrade to the plain resolve
    /// path rather than propagating.
    pub fn resolve(&self) -> Vec<QuasiResolutionFailure> {
        let mut inner = self.lock();
        Self::resolve_locked(&mut inner)
    }

    fn resolve_locked(inner: &mut FrameworkInner) -> Vec<QuasiResolutionFailure> {
        let roots = inner.roots.clone();
        let Some(coregion) = inner.coregion.clone() else {
            return Vec::new();
        };
        if roots.is_empty() {
            return Vec::new();
        }

        let result = inner.calculator.calculate_dependencies(
            inner.solver.as_mut(),
            &mut inner.state,
            &inner.digraph,
            &coregion,
            &roots,
        );

        match result {
            Ok(deps) => {
                if roots.iter().all(|r| inner.state.is_resolved(*r)) {
                    info!(dependencies = deps.len(), "quasi resolution succeeded");
                    inner.cached_deps = Some(deps);
                    Vec::new()
                } else {
                    // The calculator swallowed a collision and calculated
                    // nothing; report per-root failures instead.
                    warn!("no dependencies calculated; reporting per-root failures");
                    inner.cached_deps = None;
                    Self::plain_resolve_failures(inner, &roots)
                }
            }
            Err(Error::UnableToSatisfyDependencies {
                symbolic_name,
                version,
                description,
                errors,
            }) => {
                inner.cached_deps = None;
                let failing = inner
                    .state
                    .modules()
                    .find(|m| {
                        m.identity.symbolic_name == symbolic_name
                            && m.identity.version.to_string() == version
                    })
                    .map(|m| m.id);
                match failing {
                    Some(id) => {
                        inner
                            .detective
                            .classify(&inner.state, id, &errors, &description)
                    }
                    None => vec![QuasiResolutionFailure::Generic {
                        module: ModuleIdentity::new(
                            &symbolic_name,
                            Version::parse(&version).unwrap_or_default(),
                        ),
                        description,
                    }],
                }
            }
            Err(e) => {
                warn!(error = %e, "structural failure during dependency calculation");
                inner.cached_deps = None;
                Self::plain_resolve_failures(inner, &roots)
            }
        }
    }

    /// Fallback path: plain solver resolve, one detective pass per
    /// unresolved root
    fn plain_resolve_failures(
        inner: &mut FrameworkInner,
        roots: &[BundleId],
    ) -> Vec<QuasiResolutionFailure> {
        let FrameworkInner {
            solver,
            state,
            detective,
            ..
        } = inner;
        solver.resolve(state, roots);

        let mut failures = Vec::new();
        for &root in roots {
            if !state.is_resolved(root) {
                let mut errors = Vec::new();
                let description = detective.generate_failure_description(
                    &**solver, state, root, &mut errors,
                );
                failures.extend(detective.classify(state, root, &errors, &description));
            }
        }
        failures
    }

    /// Ad hoc diagnosis of a single bundle, independent of cached state
    pub fn diagnose(&self, bundle: BundleId) -> Vec<QuasiResolutionFailure> {
        let mut inner = self.lock();
        let FrameworkInner {
            solver,
            state,
            detective,
            ..
        } = &mut *inner;

        solver.resolve(state, &[bundle]);
        if state.is_resolved(bundle) {
            return Vec::new();
        }

        let mut errors = Vec::new();
        let description =
            detective.generate_failure_description(&**solver, state, bundle, &mut errors);
        detective.classify(state, bundle, &errors, &description)
    }

    /// Physically install the resolved batch
    ///
    /// Re-runs `resolve` when no dependency set is cached and fails with
    /// [`Error::CommitBlocked`] if that reports failures. Installs every
    /// root and dependency, starts each non-fragment bundle, and uninstalls
    /// everything installed in this pass if any step fails; the original
    /// error is rethrown unchanged.
    pub fn commit(&self) -> Result<()> {
        let mut inner = self.lock();

        let deps = match inner.cached_deps.take() {
            Some(deps) => deps,
            None => {
                // Stale-cache protection
                let failures = Self::resolve_locked(&mut inner);
                if !failures.is_empty() {
                    return Err(Error::CommitBlocked(format!(
                        "resolution reported {} failure(s); first: {}",
                        failures.len(),
                        failures[0].description()
                    )));
                }
                inner.cached_deps.take().ok_or_else(|| {
                    Error::CommitBlocked("no dependency set was calculated".to_string())
                })?
            }
        };

        let batch: Vec<BundleId> = inner.roots.iter().chain(deps.iter()).copied().collect();
        let mut installed: Vec<(InstallHandle, bool)> = Vec::new();

        for id in batch {
            let Some(module) = inner.state.get(id) else {
                continue;
            };
            let location = module.location.clone();
            let manifest = module.manifest();
            let is_fragment = module.is_fragment();

            match inner.installer.install(&location, &manifest) {
                Ok(handle) => {
                    debug!(bundle = id, location = %location, "installed");
                    installed.push((handle, is_fragment));
                }
                Err(e) => {
                    Self::rollback(&mut *inner.installer, &installed);
                    return Err(e);
                }
            }
        }

        for (handle, is_fragment) in &installed {
            if *is_fragment {
                continue;
            }
            if let Err(e) = inner.installer.start(handle) {
                Self::rollback(&mut *inner.installer, &installed);
                return Err(e);
            }
        }

        info!(bundles = installed.len(), "commit complete");
        Ok(())
    }

    /// Best-effort uninstall of everything installed in a failed commit
    /// pass; failures are logged, never propagated
    fn rollback(installer: &mut dyn Installer, installed: &[(InstallHandle, bool)]) {
        warn!(bundles = installed.len(), "rolling back failed commit");
        for (handle, _) in installed.iter().rev() {
            if let Err(e) = installer.uninstall(handle) {
                warn!(location = %handle.location, error = %e, "rollback uninstall failed");
            }
        }
    }

    /// Tear down the coregion and discard the staged batch
    pub fn destroy(&self) {
        let mut inner = self.lock();
        if let Some(coregion) = inner.coregion.take() {
            let members: Vec<BundleId> = inner
                .digraph
                .region(&coregion)
                .map(|r| r.members().collect())
                .unwrap_or_default();
            for id in members {
                inner.state.remove_module(id);
            }
            inner.digraph.remove_region(&coregion);
            info!(region = %coregion, "destroyed coregion");
        }
        inner.roots.clear();
        inner.cached_deps = None;
    }

    /// Snapshot of the staged root bundle ids
    pub fn installed_roots(&self) -> Vec<BundleId> {
        self.lock().roots.clone()
    }
}
