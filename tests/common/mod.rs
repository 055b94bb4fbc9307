// tests/common/mod.rs

//! Shared test utilities for end-to-end resolution tests.
//!
//! `FirstFitSolver` is a deliberately simple wiring solver implementing the
//! [`ConstraintSolver`] boundary: imports wire to the lowest-id in-range
//! exporter, requires and fragment hosts to the lowest-id in-range bundle.
//! No uses analysis, no backtracking. Good enough to drive the calculator
//! and framework through real provisioning flows.

use std::sync::{Arc, Mutex};
use weft::{
    BundleId, Constraint, ConstraintSolver, Error, ImportPackageSpec, InstallHandle, Installer,
    ModuleManifest, ModuleWiring, Resolution, ResolverError, ResolverErrorKind, SolverState,
    Version, VersionRange,
};

pub fn v(s: &str) -> Version {
    Version::parse(s).unwrap()
}

/// First-fit reference solver for integration tests
#[derive(Debug, Default)]
pub struct FirstFitSolver;

impl FirstFitSolver {
    fn exporter_for(state: &SolverState, spec: &ImportPackageSpec) -> Option<BundleId> {
        state.modules().find_map(|m| {
            m.exports
                .iter()
                .any(|e| e.package == spec.package && spec.version_range.includes(&e.version))
                .then_some(m.id)
        })
    }

    fn bundle_for(state: &SolverState, name: &str, range: &VersionRange) -> Option<BundleId> {
        state.modules().find_map(|m| {
            (m.identity.symbolic_name == name && range.includes(&m.identity.version))
                .then_some(m.id)
        })
    }
}

impl ConstraintSolver for FirstFitSolver {
    fn resolve(&mut self, state: &mut SolverState, _targets: &[BundleId]) -> Vec<BundleId> {
        let mut delta = Vec::new();
        loop {
            let mut progressed = false;
            let ids: Vec<BundleId> = state.ids().collect();
            for id in ids {
                if state.is_resolved(id) {
                    continue;
                }
                let module = state.get(id).unwrap().clone();
                let mut wiring = ModuleWiring::default();
                let mut satisfied = true;

                for spec in &module.imports {
                    match Self::exporter_for(state, spec) {
                        Some(exporter) => {
                            wiring.resolved_imports.push((spec.package.clone(), exporter));
                        }
                        None if spec.resolution == Resolution::Optional => {}
                        None => satisfied = false,
                    }
                }
                for spec in &module.requires {
                    match Self::bundle_for(state, &spec.symbolic_name, &spec.version_range) {
                        Some(required) => wiring.resolved_requires.push(required),
                        None if spec.resolution == Resolution::Optional => {}
                        None => satisfied = false,
                    }
                }
                if let Some(spec) = &module.fragment_host {
                    match Self::bundle_for(state, &spec.host_symbolic_name, &spec.version_range) {
                        Some(host) => wiring.hosts.push(host),
                        None => satisfied = false,
                    }
                }

                if satisfied {
                    let hosts = wiring.hosts.clone();
                    let target = state.get_mut(id).unwrap();
                    target.wiring = wiring;
                    target.resolved = true;
                    for host in hosts {
                        if let Some(h) = state.get_mut(host) {
                            h.wiring.fragments.push(id);
                        }
                    }
                    delta.push(id);
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }
        delta
    }

    fn resolver_errors(&self, state: &SolverState, module: BundleId) -> Vec<ResolverError> {
        let Some(m) = state.get(module) else {
            return Vec::new();
        };
        let mut errors = Vec::new();
        for spec in &m.imports {
            if spec.resolution == Resolution::Mandatory && Self::exporter_for(state, spec).is_none()
            {
                errors.push(
                    ResolverError::new(module, ResolverErrorKind::MissingImportPackage)
                        .with_constraint(Constraint::ImportPackage(spec.clone())),
                );
            }
        }
        for spec in &m.requires {
            if spec.resolution == Resolution::Mandatory
                && Self::bundle_for(state, &spec.symbolic_name, &spec.version_range).is_none()
            {
                errors.push(
                    ResolverError::new(module, ResolverErrorKind::MissingRequireBundle)
                        .with_constraint(Constraint::RequireBundle(spec.clone())),
                );
            }
        }
        if let Some(spec) = &m.fragment_host {
            if Self::bundle_for(state, &spec.host_symbolic_name, &spec.version_range).is_none() {
                errors.push(
                    ResolverError::new(module, ResolverErrorKind::MissingFragmentHost)
                        .with_constraint(Constraint::FragmentHost(spec.clone())),
                );
            }
        }
        errors
    }

    fn unsatisfied_leaves(
        &self,
        state: &SolverState,
        modules: &[BundleId],
    ) -> Vec<(BundleId, Constraint)> {
        let mut leaves = Vec::new();
        for &id in modules {
            let Some(m) = state.get(id) else { continue };
            for spec in &m.imports {
                if Self::exporter_for(state, spec).is_none() {
                    leaves.push((id, Constraint::ImportPackage(spec.clone())));
                }
            }
            for spec in &m.requires {
                if Self::bundle_for(state, &spec.symbolic_name, &spec.version_range).is_none() {
                    leaves.push((id, Constraint::RequireBundle(spec.clone())));
                }
            }
            if let Some(spec) = &m.fragment_host {
                if Self::bundle_for(state, &spec.host_symbolic_name, &spec.version_range).is_none()
                {
                    leaves.push((id, Constraint::FragmentHost(spec.clone())));
                }
            }
        }
        leaves
    }
}

/// Shared record of physical installer activity
#[derive(Debug, Default)]
pub struct InstallerLog {
    pub installs: Vec<String>,
    pub started: Vec<u64>,
    pub uninstalled: Vec<u64>,
}

/// Installer that records into a shared log; can fail the nth install
pub struct RecordingInstaller {
    pub fail_install_at: Option<usize>,
    pub log: Arc<Mutex<InstallerLog>>,
    counter: usize,
}

impl RecordingInstaller {
    pub fn new(log: Arc<Mutex<InstallerLog>>) -> Self {
        Self {
            fail_install_at: None,
            log,
            counter: 0,
        }
    }

    pub fn failing_at(log: Arc<Mutex<InstallerLog>>, nth: usize) -> Self {
        Self {
            fail_install_at: Some(nth),
            log,
            counter: 0,
        }
    }
}

impl Installer for RecordingInstaller {
    fn install(&mut self, location: &str, _manifest: &ModuleManifest) -> weft::Result<InstallHandle> {
        self.counter += 1;
        if self.fail_install_at == Some(self.counter) {
            return Err(Error::Install {
                location: location.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        self.log.lock().unwrap().installs.push(location.to_string());
        Ok(InstallHandle {
            id: self.counter as u64,
            location: location.to_string(),
        })
    }

    fn start(&mut self, handle: &InstallHandle) -> weft::Result<()> {
        self.log.lock().unwrap().started.push(handle.id);
        Ok(())
    }

    fn uninstall(&mut self, handle: &InstallHandle) -> weft::Result<()> {
        self.log.lock().unwrap().uninstalled.push(handle.id);
        Ok(())
    }
}
