// src/calculator/mod.rs

//! Transitive dependency calculation
//!
//! Given a set of root modules and a disposable solver state, discover the
//! transitive set of additional modules that must be provisioned from the
//! repository to satisfy every declared constraint, resolve, and return the
//! dependency closure. One unresolved root aborts the whole calculation;
//! there is no partial success.
//!
//! Discovery runs over an explicit worklist with a "seen" set keyed by
//! (name, version), so termination does not depend on the shape of the
//! dependency graph and stack depth does not grow with chain length.

use crate::detective::ResolutionFailureDetective;
use crate::dump::{DumpSink, STATE_CONTEXT_KEY};
use crate::error::{Error, Result};
use crate::module::{
    BundleId, BundleIdAllocator, Constraint, ModuleDescription, ModuleIdentity, ModuleManifest,
};
use crate::region::RegionDigraph;
use crate::repository::{
    ArtifactDescriptor, PropertyFilter, RepositoryQuery, ATTR_BUNDLE_SYMBOLIC_NAME,
    ATTR_EXPORT_PACKAGE, ATTR_FRAGMENT_HOST,
};
use crate::solver::{ConstraintSolver, SolverState};
use crate::version::Version;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Computes the transitive dependency set for a batch of root modules
///
/// One instance per resolution session. `calculate_dependencies` is
/// serialized through the instance monitor because it destructively mutates
/// the caller's solver state.
pub struct DependencyCalculator {
    repository: Box<dyn RepositoryQuery + Send + Sync>,
    dump: Box<dyn DumpSink + Send + Sync>,
    detective: Arc<ResolutionFailureDetective>,
    ids: Arc<BundleIdAllocator>,
    monitor: Mutex<()>,
}

impl DependencyCalculator {
    pub fn new(
        repository: Box<dyn RepositoryQuery + Send + Sync>,
        dump: Box<dyn DumpSink + Send + Sync>,
        detective: Arc<ResolutionFailureDetective>,
        ids: Arc<BundleIdAllocator>,
    ) -> Self {
        Self {
            repository,
            dump,
            detective,
            ids,
            monitor: Mutex::new(()),
        }
    }

    /// Provision satisfiers for the roots' constraints, resolve, and return
    /// the transitive dependency closure sorted by (name, version)
    ///
    /// A duplicate-bundle collision while provisioning is swallowed: the
    /// calculation returns an empty set and the caller is expected to fall
    /// back to a plain resolve, which reports per-bundle failures.
    pub fn calculate_dependencies(
        &self,
        solver: &mut dyn ConstraintSolver,
        state: &mut SolverState,
        digraph: &RegionDigraph,
        region: &str,
        roots: &[BundleId],
    ) -> Result<Vec<BundleId>> {
        let _serial = self.monitor.lock().unwrap_or_else(|e| e.into_inner());
        info!(region, roots = roots.len(), "calculating dependencies");

        let mut added: BTreeSet<BundleId> = BTreeSet::new();
        if !self.satisfy_constraints(solver, state, digraph, region, roots, &mut added)? {
            return Ok(Vec::new());
        }

        let delta = solver.resolve(state, roots);
        debug!(newly_resolved = delta.len(), "solver pass complete");

        for &root in roots {
            if !state.is_resolved(root) {
                return Err(self.fail_root(solver, state, root));
            }
        }

        let mut new_modules: BTreeSet<BundleId> = added;
        new_modules.extend(delta);
        let closure = self.dependency_closure(state, roots, &new_modules);
        info!(dependencies = closure.len(), "dependency calculation complete");
        Ok(closure)
    }

    /// Worklist pass: provision satisfiers until no module has an
    /// unprovisioned constraint left
    ///
    /// Returns `false` when a duplicate-bundle collision was swallowed and
    /// the calculation must yield an empty result.
    fn satisfy_constraints(
        &self,
        solver: &mut dyn ConstraintSolver,
        state: &mut SolverState,
        digraph: &RegionDigraph,
        region: &str,
        roots: &[BundleId],
        added: &mut BTreeSet<BundleId>,
    ) -> Result<bool> {
        let mut worklist: VecDeque<BundleId> = roots.iter().copied().collect();
        let mut seen: BTreeSet<ModuleIdentity> = BTreeSet::new();

        while let Some(id) = worklist.pop_front() {
            let Some(module) = state.get(id) else {
                continue;
            };
            if !module.provisioning {
                // Opted out: still resolved later, never triggers search
                debug!(module = %module.identity, "provisioning disabled; skipping");
                continue;
            }
            let identity = module.identity.clone();

            let mut pending: Vec<ModuleManifest> = Vec::new();
            for (_, constraint) in solver.unsatisfied_leaves(state, &[id]) {
                for descriptor in self.candidates_for(&constraint) {
                    self.collect_candidate(&descriptor, &mut pending);
                }
            }
            // Fragments attach to hosts without any ordinary import
            // constraint, so they are discovered proactively.
            for descriptor in
                self.repository
                    .query(ATTR_FRAGMENT_HOST, &identity.symbolic_name, &[])
            {
                self.collect_candidate(&descriptor, &mut pending);
            }
            pending.retain(|manifest| match &manifest.fragment_host {
                Some(host) if host.host_symbolic_name == identity.symbolic_name => {
                    host.version_range.includes(&identity.version)
                }
                _ => true,
            });

            pending.sort_by(|a, b| a.identity.cmp(&b.identity));

            for manifest in pending {
                if digraph.is_visible(region, &manifest.identity) {
                    continue;
                }
                if !seen.insert(manifest.identity.clone()) {
                    continue;
                }

                let new_id = self.ids.next_id();
                let satisfier_identity = manifest.identity.clone();
                let location = format!("repository:{}", satisfier_identity.symbolic_name);
                debug!(
                    satisfier = %satisfier_identity,
                    bundle = new_id,
                    requested_by = %identity,
                    "provisioning satisfier"
                );
                match state.add_module(ModuleDescription::from_manifest(
                    new_id, &location, manifest,
                )) {
                    Ok(()) => {}
                    Err(Error::DuplicateBundle {
                        symbolic_name,
                        version,
                        ..
                    }) => {
                        warn!(
                            %symbolic_name,
                            %version,
                            "duplicate bundle while provisioning; no dependencies calculated"
                        );
                        return Ok(false);
                    }
                    Err(e) => return Err(e),
                }
                digraph.add_bundle(region, new_id, &satisfier_identity)?;
                added.insert(new_id);
                worklist.push_back(new_id);
            }
        }
        Ok(true)
    }

    /// Repository candidates for one unsatisfied constraint
    fn candidates_for(&self, constraint: &Constraint) -> Vec<ArtifactDescriptor> {
        match constraint {
            Constraint::ImportPackage(spec) => {
                let mut candidates = match spec.version_range.as_exact() {
                    // Point range: push the version match down into the query
                    Some(version) => self.repository.query(
                        ATTR_EXPORT_PACKAGE,
                        &spec.package,
                        &[PropertyFilter::new("version", &version.to_string())],
                    ),
                    None => {
                        let mut unfiltered =
                            self.repository.query(ATTR_EXPORT_PACKAGE, &spec.package, &[]);
                        unfiltered.retain(|d| {
                            let exported = d
                                .exported_package_version(&spec.package)
                                .unwrap_or_else(Version::default);
                            spec.version_range.includes(&exported)
                        });
                        unfiltered
                    }
                };
                if let Some(ref bundle_name) = spec.bundle_symbolic_name {
                    candidates.retain(|d| {
                        d.name == *bundle_name
                            && spec.bundle_version_range.includes(&d.version)
                    });
                }
                candidates
            }
            Constraint::RequireBundle(spec) => {
                let mut candidates =
                    self.repository
                        .query(ATTR_BUNDLE_SYMBOLIC_NAME, &spec.symbolic_name, &[]);
                candidates.retain(|d| spec.version_range.includes(&d.version));
                candidates
            }
            Constraint::FragmentHost(spec) => {
                let mut candidates = self.repository.query(
                    ATTR_BUNDLE_SYMBOLIC_NAME,
                    &spec.host_symbolic_name,
                    &[],
                );
                candidates.retain(|d| spec.version_range.includes(&d.version));
                candidates
            }
        }
    }

    /// Convert a descriptor and queue it; malformed descriptors are skipped
    fn collect_candidate(&self, descriptor: &ArtifactDescriptor, pending: &mut Vec<ModuleManifest>) {
        match descriptor.to_manifest() {
            Ok(manifest) => {
                if !pending.contains(&manifest) {
                    pending.push(manifest);
                }
            }
            Err(e) => {
                warn!(descriptor = %descriptor.name, error = %e, "skipping malformed descriptor");
            }
        }
    }

    /// Build the failure for an unresolved root: dump, describe, abort
    fn fail_root(
        &self,
        solver: &dyn ConstraintSolver,
        state: &SolverState,
        root: BundleId,
    ) -> Error {
        let identity = state
            .get(root)
            .map(|m| m.identity.clone())
            .unwrap_or_else(|| ModuleIdentity::new("unknown", Version::default()));

        let mut context = BTreeMap::new();
        context.insert(
            STATE_CONTEXT_KEY.to_string(),
            format!(
                "{} modules, {} unresolved",
                state.len(),
                state.unresolved_modules().len()
            ),
        );
        self.dump.generate_dump("resolution-failure", &context);

        let mut errors = Vec::new();
        let description =
            self.detective
                .generate_failure_description(solver, state, root, &mut errors);
        warn!(module = %identity, "unable to satisfy dependencies");

        Error::UnableToSatisfyDependencies {
            symbolic_name: identity.symbolic_name,
            version: identity.version.to_string(),
            description,
            errors,
        }
    }

    /// Frontier walk over resolved wiring, restricted to newly added
    /// modules; the result-set insert prunes already-expanded nodes
    fn dependency_closure(
        &self,
        state: &SolverState,
        roots: &[BundleId],
        new_modules: &BTreeSet<BundleId>,
    ) -> Vec<BundleId> {
        let mut result: BTreeSet<BundleId> = BTreeSet::new();
        let mut frontier: Vec<BundleId> = roots.to_vec();

        while let Some(id) = frontier.pop() {
            let Some(module) = state.get(id) else {
                continue;
            };
            for dep in module.wiring.wired_bundles() {
                if new_modules.contains(&dep) && result.insert(dep) {
                    frontier.push(dep);
                }
            }
        }

        let mut closure: Vec<BundleId> = result.into_iter().collect();
        closure.sort_by(|a, b| {
            let left = state.get(*a).map(|m| &m.identity);
            let right = state.get(*b).map(|m| &m.identity);
            left.cmp(&right)
        });
        closure
    }
}
