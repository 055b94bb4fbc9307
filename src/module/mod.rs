// src/module/mod.rs

//! Module descriptions, identities, and declared constraints
//!
//! A module (bundle) is a deployable unit with a symbolic name + version
//! identity, declared imports/exports, and a mutable resolution state owned
//! by the solver state. Constraints come in three concrete kinds: imported
//! packages, required bundles, and fragment-host attachments.

use crate::version::{Version, VersionRange};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// Identifier for an installed or provisioned bundle
pub type BundleId = u64;

/// Allocates bundle ids for one resolution session
///
/// A plain monotonic counter; ids are unique per allocator instance and
/// carry no meaning beyond identity.
#[derive(Debug)]
pub struct BundleIdAllocator {
    next: AtomicU64,
}

impl BundleIdAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> BundleId {
        self.next.fetch_add(1, AtomicOrdering::Relaxed)
    }
}

impl Default for BundleIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// A module's (symbolic name, version) identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleIdentity {
    pub symbolic_name: String,
    pub version: Version,
}

impl ModuleIdentity {
    pub fn new(symbolic_name: &str, version: Version) -> Self {
        Self {
            symbolic_name: symbolic_name.to_string(),
            version,
        }
    }
}

impl Ord for ModuleIdentity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.symbolic_name
            .cmp(&other.symbolic_name)
            .then_with(|| self.version.cmp(&other.version))
    }
}

impl PartialOrd for ModuleIdentity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ModuleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.symbolic_name, self.version)
    }
}

/// Whether an unsatisfied constraint blocks resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    Mandatory,
    Optional,
}

/// An Import-Package style constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportPackageSpec {
    pub package: String,
    pub version_range: VersionRange,
    /// Optional restriction to a specific exporting bundle
    pub bundle_symbolic_name: Option<String>,
    pub bundle_version_range: VersionRange,
    pub resolution: Resolution,
}

impl ImportPackageSpec {
    pub fn new(package: &str, version_range: VersionRange) -> Self {
        Self {
            package: package.to_string(),
            version_range,
            bundle_symbolic_name: None,
            bundle_version_range: VersionRange::any(),
            resolution: Resolution::Mandatory,
        }
    }

    pub fn optional(mut self) -> Self {
        self.resolution = Resolution::Optional;
        self
    }

    pub fn from_bundle(mut self, symbolic_name: &str, version_range: VersionRange) -> Self {
        self.bundle_symbolic_name = Some(symbolic_name.to_string());
        self.bundle_version_range = version_range;
        self
    }
}

/// A Require-Bundle style constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequireBundleSpec {
    pub symbolic_name: String,
    pub version_range: VersionRange,
    pub resolution: Resolution,
}

impl RequireBundleSpec {
    pub fn new(symbolic_name: &str, version_range: VersionRange) -> Self {
        Self {
            symbolic_name: symbolic_name.to_string(),
            version_range,
            resolution: Resolution::Mandatory,
        }
    }

    pub fn optional(mut self) -> Self {
        self.resolution = Resolution::Optional;
        self
    }
}

/// A Fragment-Host attachment constraint
///
/// Always mandatory: a fragment without its host has no identity of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentHostSpec {
    pub host_symbolic_name: String,
    pub version_range: VersionRange,
}

impl FragmentHostSpec {
    pub fn new(host_symbolic_name: &str, version_range: VersionRange) -> Self {
        Self {
            host_symbolic_name: host_symbolic_name.to_string(),
            version_range,
        }
    }
}

/// A declared version constraint: exactly one concrete kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Constraint {
    ImportPackage(ImportPackageSpec),
    RequireBundle(RequireBundleSpec),
    FragmentHost(FragmentHostSpec),
}

impl Constraint {
    /// The name the constraint is keyed on (package or bundle symbolic name)
    pub fn name(&self) -> &str {
        match self {
            Constraint::ImportPackage(spec) => &spec.package,
            Constraint::RequireBundle(spec) => &spec.symbolic_name,
            Constraint::FragmentHost(spec) => &spec.host_symbolic_name,
        }
    }

    pub fn version_range(&self) -> &VersionRange {
        match self {
            Constraint::ImportPackage(spec) => &spec.version_range,
            Constraint::RequireBundle(spec) => &spec.version_range,
            Constraint::FragmentHost(spec) => &spec.version_range,
        }
    }

    pub fn is_mandatory(&self) -> bool {
        match self {
            Constraint::ImportPackage(spec) => spec.resolution == Resolution::Mandatory,
            Constraint::RequireBundle(spec) => spec.resolution == Resolution::Mandatory,
            Constraint::FragmentHost(_) => true,
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::ImportPackage(spec) => {
                write!(
                    f,
                    "Import-Package {} version {}",
                    spec.package, spec.version_range
                )?;
                if let Some(ref bsn) = spec.bundle_symbolic_name {
                    write!(
                        f,
                        " from bundle {} version {}",
                        bsn, spec.bundle_version_range
                    )?;
                }
                Ok(())
            }
            Constraint::RequireBundle(spec) => write!(
                f,
                "Require-Bundle {} version {}",
                spec.symbolic_name, spec.version_range
            ),
            Constraint::FragmentHost(spec) => write!(
                f,
                "Fragment-Host {} version {}",
                spec.host_symbolic_name, spec.version_range
            ),
        }
    }
}

/// A package exported by a module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageExport {
    pub package: String,
    pub version: Version,
}

impl PackageExport {
    pub fn new(package: &str, version: Version) -> Self {
        Self {
            package: package.to_string(),
            version,
        }
    }
}

/// A pre-parsed module manifest
///
/// Manifest parsing itself is external; this is the structured form handed
/// to `install` and produced from repository descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleManifest {
    pub identity: ModuleIdentity,
    pub imports: Vec<ImportPackageSpec>,
    pub requires: Vec<RequireBundleSpec>,
    pub fragment_host: Option<FragmentHostSpec>,
    pub exports: Vec<PackageExport>,
    pub singleton: bool,
}

impl ModuleManifest {
    pub fn new(symbolic_name: &str, version: Version) -> Self {
        Self {
            identity: ModuleIdentity::new(symbolic_name, version),
            imports: Vec::new(),
            requires: Vec::new(),
            fragment_host: None,
            exports: Vec::new(),
            singleton: false,
        }
    }

    pub fn import(mut self, spec: ImportPackageSpec) -> Self {
        self.imports.push(spec);
        self
    }

    pub fn require(mut self, spec: RequireBundleSpec) -> Self {
        self.requires.push(spec);
        self
    }

    pub fn fragment_of(mut self, spec: FragmentHostSpec) -> Self {
        self.fragment_host = Some(spec);
        self
    }

    pub fn export(mut self, export: PackageExport) -> Self {
        self.exports.push(export);
        self
    }
}

/// Resolved wiring of a module, populated by the solver
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleWiring {
    /// package name → exporting bundle
    pub resolved_imports: Vec<(String, BundleId)>,
    pub resolved_requires: Vec<BundleId>,
    pub fragments: Vec<BundleId>,
    pub hosts: Vec<BundleId>,
}

impl ModuleWiring {
    /// Every bundle this wiring points at, in recorded order
    pub fn wired_bundles(&self) -> impl Iterator<Item = BundleId> + '_ {
        self.fragments
            .iter()
            .chain(self.resolved_requires.iter())
            .chain(self.resolved_imports.iter().map(|(_, id)| id))
            .chain(self.hosts.iter())
            .copied()
    }
}

/// A module registered in a solver state
///
/// Identity and declarations are immutable after construction; `resolved`
/// and `wiring` belong to the solver.
#[derive(Debug, Clone)]
pub struct ModuleDescription {
    pub id: BundleId,
    pub location: String,
    pub identity: ModuleIdentity,
    pub imports: Vec<ImportPackageSpec>,
    pub requires: Vec<RequireBundleSpec>,
    pub fragment_host: Option<FragmentHostSpec>,
    pub exports: Vec<PackageExport>,
    pub singleton: bool,
    /// Whether the calculator may provision satisfiers for this module
    pub provisioning: bool,
    pub resolved: bool,
    pub wiring: ModuleWiring,
}

impl ModuleDescription {
    pub fn from_manifest(id: BundleId, location: &str, manifest: ModuleManifest) -> Self {
        Self {
            id,
            location: location.to_string(),
            identity: manifest.identity,
            imports: manifest.imports,
            requires: manifest.requires,
            fragment_host: manifest.fragment_host,
            exports: manifest.exports,
            singleton: manifest.singleton,
            provisioning: true,
            resolved: false,
            wiring: ModuleWiring::default(),
        }
    }

    pub fn is_fragment(&self) -> bool {
        self.fragment_host.is_some()
    }

    /// The declared (manifest) view of this module, without resolution state
    pub fn manifest(&self) -> ModuleManifest {
        ModuleManifest {
            identity: self.identity.clone(),
            imports: self.imports.clone(),
            requires: self.requires.clone(),
            fragment_host: self.fragment_host.clone(),
            exports: self.exports.clone(),
            singleton: self.singleton,
        }
    }

    /// Declared constraints in manifest order, fragment-host last
    pub fn constraints(&self) -> Vec<Constraint> {
        let mut out: Vec<Constraint> = Vec::new();
        for spec in &self.imports {
            out.push(Constraint::ImportPackage(spec.clone()));
        }
        for spec in &self.requires {
            out.push(Constraint::RequireBundle(spec.clone()));
        }
        if let Some(spec) = &self.fragment_host {
            out.push(Constraint::FragmentHost(spec.clone()));
        }
        out
    }
}
