// src/repository/mod.rs

//! Repository query boundary
//!
//! The repository is a black-box keyed query service: given an attribute
//! name and value (plus optional nested sub-property filters) it returns
//! candidate artifact descriptors. Descriptors carry a multi-valued
//! attribute map; the well-known attributes mirror manifest headers and are
//! converted into [`ModuleManifest`]s before provisioning.

use crate::error::{Error, Result};
use crate::module::{
    FragmentHostSpec, ImportPackageSpec, ModuleManifest, PackageExport, RequireBundleSpec,
    Resolution,
};
use crate::version::{Version, VersionRange};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;

/// Well-known descriptor attribute names
pub const ATTR_BUNDLE_SYMBOLIC_NAME: &str = "Bundle-SymbolicName";
pub const ATTR_EXPORT_PACKAGE: &str = "Export-Package";
pub const ATTR_IMPORT_PACKAGE: &str = "Import-Package";
pub const ATTR_REQUIRE_BUNDLE: &str = "Require-Bundle";
pub const ATTR_FRAGMENT_HOST: &str = "Fragment-Host";

/// An exact match on a nested sub-property of an attribute entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyFilter {
    pub name: String,
    pub value: String,
}

impl PropertyFilter {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

/// A module descriptor as returned by the repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    pub kind: String,
    pub name: String,
    pub version: Version,
    pub uri: String,
    pub filename: String,
    /// Multi-valued attribute map; entries are strings or objects with
    /// nested properties (`package`/`name`, `version`, ...)
    pub attributes: BTreeMap<String, Vec<Value>>,
}

impl ArtifactDescriptor {
    pub fn new(name: &str, version: Version, uri: &str) -> Self {
        Self {
            kind: "bundle".to_string(),
            name: name.to_string(),
            version,
            uri: uri.to_string(),
            filename: format!("{}.jar", name),
            attributes: BTreeMap::new(),
        }
    }

    /// Build a descriptor whose attributes mirror a module manifest
    pub fn from_manifest(manifest: &ModuleManifest, uri: &str) -> Self {
        let mut descriptor = Self::new(
            &manifest.identity.symbolic_name,
            manifest.identity.version.clone(),
            uri,
        );

        let mut bsn = json!({ "name": manifest.identity.symbolic_name });
        if manifest.singleton {
            bsn["singleton"] = json!("true");
        }
        descriptor
            .attributes
            .insert(ATTR_BUNDLE_SYMBOLIC_NAME.to_string(), vec![bsn]);

        let exports: Vec<Value> = manifest
            .exports
            .iter()
            .map(|e| json!({ "package": e.package, "version": e.version.to_string() }))
            .collect();
        if !exports.is_empty() {
            descriptor
                .attributes
                .insert(ATTR_EXPORT_PACKAGE.to_string(), exports);
        }

        let imports: Vec<Value> = manifest
            .imports
            .iter()
            .map(|i| {
                let mut entry = json!({
                    "package": i.package,
                    "version": i.version_range.to_string(),
                });
                if let Some(ref name) = i.bundle_symbolic_name {
                    entry["bundle-symbolic-name"] = json!(name);
                    entry["bundle-version"] = json!(i.bundle_version_range.to_string());
                }
                if i.resolution == Resolution::Optional {
                    entry["resolution"] = json!("optional");
                }
                entry
            })
            .collect();
        if !imports.is_empty() {
            descriptor
                .attributes
                .insert(ATTR_IMPORT_PACKAGE.to_string(), imports);
        }

        let requires: Vec<Value> = manifest
            .requires
            .iter()
            .map(|r| {
                let mut entry = json!({
                    "name": r.symbolic_name,
                    "version": r.version_range.to_string(),
                });
                if r.resolution == Resolution::Optional {
                    entry["resolution"] = json!("optional");
                }
                entry
            })
            .collect();
        if !requires.is_empty() {
            descriptor
                .attributes
                .insert(ATTR_REQUIRE_BUNDLE.to_string(), requires);
        }

        if let Some(ref host) = manifest.fragment_host {
            descriptor.attributes.insert(
                ATTR_FRAGMENT_HOST.to_string(),
                vec![json!({
                    "name": host.host_symbolic_name,
                    "version": host.version_range.to_string(),
                })],
            );
        }

        descriptor
    }

    /// Whether any entry under `attribute` matches `value` and all filters
    pub fn matches(&self, attribute: &str, value: &str, filters: &[PropertyFilter]) -> bool {
        self.attributes
            .get(attribute)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .any(|entry| {
                entry_matches(entry, value)
                    && filters
                        .iter()
                        .all(|f| entry_property(entry, &f.name).as_deref() == Some(f.value.as_str()))
            })
    }

    /// The version at which this descriptor exports a package, if it does
    pub fn exported_package_version(&self, package: &str) -> Option<Version> {
        self.attributes
            .get(ATTR_EXPORT_PACKAGE)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .find(|entry| entry_matches(entry, package))
            .and_then(|entry| entry_property(entry, "version"))
            .and_then(|s| Version::parse(&s).ok())
    }

    /// Convert the descriptor into a pre-parsed module manifest
    pub fn to_manifest(&self) -> Result<ModuleManifest> {
        let malformed = |reason: String| Error::MalformedDescriptor {
            name: self.name.clone(),
            reason,
        };

        let mut manifest = ModuleManifest::new(&self.name, self.version.clone());

        if let Some(entries) = self.attributes.get(ATTR_BUNDLE_SYMBOLIC_NAME) {
            if let Some(entry) = entries.first() {
                if let Some(name) = entry_name(entry) {
                    manifest.identity.symbolic_name = name;
                }
                manifest.singleton =
                    entry_property(entry, "singleton").as_deref() == Some("true");
            }
        }

        for entry in self.attributes.get(ATTR_EXPORT_PACKAGE).into_iter().flatten() {
            let package = entry_name(entry)
                .ok_or_else(|| malformed("export entry without a package name".to_string()))?;
            let version = match entry_property(entry, "version") {
                Some(s) => Version::parse(&s)?,
                None => Version::default(),
            };
            manifest.exports.push(PackageExport::new(&package, version));
        }

        for entry in self.attributes.get(ATTR_IMPORT_PACKAGE).into_iter().flatten() {
            let package = entry_name(entry)
                .ok_or_else(|| malformed("import entry without a package name".to_string()))?;
            let range = match entry_property(entry, "version") {
                Some(s) => VersionRange::parse(&s)?,
                None => VersionRange::any(),
            };
            let mut spec = ImportPackageSpec::new(&package, range);
            if let Some(bsn) = entry_property(entry, "bundle-symbolic-name") {
                let bundle_range = match entry_property(entry, "bundle-version") {
                    Some(s) => VersionRange::parse(&s)?,
                    None => VersionRange::any(),
                };
                spec = spec.from_bundle(&bsn, bundle_range);
            }
            if entry_property(entry, "resolution").as_deref() == Some("optional") {
                spec = spec.optional();
            }
            manifest.imports.push(spec);
        }

        for entry in self.attributes.get(ATTR_REQUIRE_BUNDLE).into_iter().flatten() {
            let name = entry_name(entry)
                .ok_or_else(|| malformed("require entry without a bundle name".to_string()))?;
            let range = match entry_property(entry, "version") {
                Some(s) => VersionRange::parse(&s)?,
                None => VersionRange::any(),
            };
            let mut spec = RequireBundleSpec::new(&name, range);
            if entry_property(entry, "resolution").as_deref() == Some("optional") {
                spec = spec.optional();
            }
            manifest.requires.push(spec);
        }

        if let Some(entry) = self
            .attributes
            .get(ATTR_FRAGMENT_HOST)
            .and_then(|entries| entries.first())
        {
            let host = entry_name(entry)
                .ok_or_else(|| malformed("fragment host entry without a name".to_string()))?;
            let range = match entry_property(entry, "version") {
                Some(s) => VersionRange::parse(&s)?,
                None => VersionRange::any(),
            };
            manifest.fragment_host = Some(FragmentHostSpec::new(&host, range));
        }

        Ok(manifest)
    }
}

/// Whether an attribute entry names the given value
fn entry_matches(entry: &Value, value: &str) -> bool {
    match entry {
        Value::String(s) => s == value,
        Value::Object(_) => entry_name(entry).as_deref() == Some(value),
        _ => false,
    }
}

/// The primary name of an attribute entry (`package` or `name` property)
fn entry_name(entry: &Value) -> Option<String> {
    match entry {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map
            .get("package")
            .or_else(|| map.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

/// A nested sub-property of an attribute entry, as a string
fn entry_property(entry: &Value, name: &str) -> Option<String> {
    entry
        .as_object()?
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Keyed query service over a pool of candidate modules
pub trait RepositoryQuery {
    /// Descriptors with an `attribute` entry matching `value` and every
    /// nested sub-property filter
    fn query(
        &self,
        attribute: &str,
        value: &str,
        filters: &[PropertyFilter],
    ) -> Vec<ArtifactDescriptor>;
}

/// In-process repository backed by a descriptor list
///
/// The reference implementation of the query contract; results come back
/// sorted by (name, version) so provisioning stays deterministic.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    descriptors: Vec<ArtifactDescriptor>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, descriptor: ArtifactDescriptor) {
        self.descriptors.push(descriptor);
    }

    pub fn add_manifest(&mut self, manifest: &ModuleManifest) {
        let uri = format!("mem:{}", manifest.identity.symbolic_name);
        self.add(ArtifactDescriptor::from_manifest(manifest, &uri));
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl RepositoryQuery for MemoryRepository {
    fn query(
        &self,
        attribute: &str,
        value: &str,
        filters: &[PropertyFilter],
    ) -> Vec<ArtifactDescriptor> {
        let mut results: Vec<ArtifactDescriptor> = self
            .descriptors
            .iter()
            .filter(|d| d.matches(attribute, value, filters))
            .cloned()
            .collect();
        results.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.version.cmp(&b.version)));
        results
    }
}
