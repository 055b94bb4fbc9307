// src/region/filter.rs

//! Region edge filters
//!
//! A filter is the allow-list attached to a directed edge between two
//! regions: the set of (symbolic name, version) pairs and package names
//! visible from the tail region across the edge.

use crate::module::ModuleIdentity;
use crate::version::Version;
use std::collections::BTreeSet;

/// The allow-list carried by a region connection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionFilter {
    allowed_bundles: BTreeSet<(String, Version)>,
    allowed_packages: BTreeSet<String>,
}

impl RegionFilter {
    pub fn builder() -> RegionFilterBuilder {
        RegionFilterBuilder {
            filter: RegionFilter::default(),
        }
    }

    pub fn allows_bundle(&self, symbolic_name: &str, version: &Version) -> bool {
        self.allowed_bundles
            .contains(&(symbolic_name.to_string(), version.clone()))
    }

    pub fn allows_identity(&self, identity: &ModuleIdentity) -> bool {
        self.allows_bundle(&identity.symbolic_name, &identity.version)
    }

    pub fn allows_package(&self, package: &str) -> bool {
        self.allowed_packages.contains(package)
    }

    /// Every (name, version) pair this filter allows, in sorted order
    pub fn bundle_allowances(&self) -> impl Iterator<Item = &(String, Version)> {
        self.allowed_bundles.iter()
    }

    /// The first (name, version) pair allowed by both filters, if any
    ///
    /// Two edges out of the same tail region must never share an allowance;
    /// the digraph uses this to reject ambiguous provenance.
    pub fn shared_allowance(&self, other: &RegionFilter) -> Option<&(String, Version)> {
        self.allowed_bundles
            .iter()
            .find(|pair| other.allowed_bundles.contains(*pair))
    }

    pub fn is_empty(&self) -> bool {
        self.allowed_bundles.is_empty() && self.allowed_packages.is_empty()
    }
}

/// Builder for [`RegionFilter`]
#[derive(Debug, Default)]
pub struct RegionFilterBuilder {
    filter: RegionFilter,
}

impl RegionFilterBuilder {
    pub fn allow_bundle(mut self, symbolic_name: &str, version: Version) -> Self {
        self.filter
            .allowed_bundles
            .insert((symbolic_name.to_string(), version));
        self
    }

    pub fn allow_identity(self, identity: &ModuleIdentity) -> Self {
        let version = identity.version.clone();
        self.allow_bundle(&identity.symbolic_name, version)
    }

    pub fn allow_package(mut self, package: &str) -> Self {
        self.filter.allowed_packages.insert(package.to_string());
        self
    }

    pub fn build(self) -> RegionFilter {
        self.filter
    }
}
