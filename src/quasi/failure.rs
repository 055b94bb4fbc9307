// src/quasi/failure.rs

//! Caller-facing resolution failure records
//!
//! Enriched, serializable records built by the failure detective from raw
//! resolver errors. Package-related failures carry machine-readable fields
//! next to the rendered description; everything else collapses into one
//! generic record per module.

use crate::module::ModuleIdentity;
use crate::version::VersionRange;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A structured explanation of why a module could not be resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QuasiResolutionFailure {
    /// No constraint-specific classification applied
    Generic {
        module: ModuleIdentity,
        description: String,
    },
    /// An imported package is missing
    Package {
        module: ModuleIdentity,
        description: String,
        package: String,
        version_range: VersionRange,
        bundle_symbolic_name: Option<String>,
        bundle_version_range: VersionRange,
    },
    /// An imported package lost a uses-conflict
    PackageUses {
        module: ModuleIdentity,
        description: String,
        package: String,
        version_range: VersionRange,
        bundle_symbolic_name: Option<String>,
        bundle_version_range: VersionRange,
    },
}

impl QuasiResolutionFailure {
    pub fn module(&self) -> &ModuleIdentity {
        match self {
            Self::Generic { module, .. }
            | Self::Package { module, .. }
            | Self::PackageUses { module, .. } => module,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Self::Generic { description, .. }
            | Self::Package { description, .. }
            | Self::PackageUses { description, .. } => description,
        }
    }

    /// The missing or conflicting package, for the package-related subtypes
    pub fn package(&self) -> Option<&str> {
        match self {
            Self::Generic { .. } => None,
            Self::Package { package, .. } | Self::PackageUses { package, .. } => {
                Some(package.as_str())
            }
        }
    }
}

impl fmt::Display for QuasiResolutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}
