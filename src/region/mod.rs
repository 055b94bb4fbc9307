// src/region/mod.rs

//! Isolation regions and the region digraph
//!
//! A region is a named partition of the module namespace. Regions are nodes
//! of a labelled digraph whose edges carry [`RegionFilter`] allow-lists; a
//! module is visible outside its own region only through a filtered edge.
//!
//! Two invariants keep class-space isolation sound:
//! - a bundle id belongs to at most one region;
//! - no two edges out of the same tail may allow the same (name, version)
//!   pair, and a filter may not allow a pair physically present in the tail.
//!
//! All mutation goes through one coarse lock per digraph; read operations
//! return snapshot copies so callers can iterate without holding the lock.

mod filter;

pub use filter::{RegionFilter, RegionFilterBuilder};

use crate::error::{Error, Result};
use crate::module::{BundleId, ModuleIdentity};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// A named partition of the module namespace
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Region {
    pub name: String,
    members: BTreeSet<BundleId>,
}

impl Region {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            members: BTreeSet::new(),
        }
    }

    pub fn contains(&self, bundle: BundleId) -> bool {
        self.members.contains(&bundle)
    }

    pub fn members(&self) -> impl Iterator<Item = BundleId> + '_ {
        self.members.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[derive(Debug, Default)]
struct DigraphState {
    regions: BTreeMap<String, Region>,
    /// tail region → (head region, filter), at most one entry per head
    edges: BTreeMap<String, Vec<(String, RegionFilter)>>,
    /// bundle id → (owning region, identity)
    bundles: BTreeMap<BundleId, (String, ModuleIdentity)>,
}

/// The labelled digraph of isolation regions
#[derive(Debug, Default)]
pub struct RegionDigraph {
    inner: Mutex<DigraphState>,
}

impl RegionDigraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, DigraphState> {
        // A poisoned lock still holds consistent bookkeeping: every mutation
        // validates before it writes.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create a named region with empty membership; idempotent
    pub fn add_region(&self, name: &str) {
        let mut state = self.state();
        if !state.regions.contains_key(name) {
            debug!(region = name, "adding region");
            state.regions.insert(name.to_string(), Region::new(name));
        }
    }

    /// Connect `tail` to `head` with the given filter
    ///
    /// Fails with [`Error::UnsupportedEdge`] on a self-loop or when the
    /// ordered (tail, head) pair is already connected, and with
    /// [`Error::DuplicateBundle`] when the filter's allowances collide with
    /// bundles physically present in `tail` or with another edge out of
    /// `tail`. Missing regions are created on success.
    pub fn connect(&self, tail: &str, head: &str, filter: RegionFilter) -> Result<()> {
        if tail == head {
            return Err(Error::UnsupportedEdge {
                tail: tail.to_string(),
                head: head.to_string(),
                reason: "a region may not be connected to itself".to_string(),
            });
        }

        let mut state = self.state();

        let existing = state.edges.get(tail).map(Vec::as_slice).unwrap_or(&[]);
        if existing.iter().any(|(h, _)| h == head) {
            return Err(Error::UnsupportedEdge {
                tail: tail.to_string(),
                head: head.to_string(),
                reason: "the regions are already connected".to_string(),
            });
        }

        // The filter must not allow a pair physically present in the tail
        for (region, identity) in state.bundles.values() {
            if region == tail && filter.allows_identity(identity) {
                return Err(Error::DuplicateBundle {
                    symbolic_name: identity.symbolic_name.clone(),
                    version: identity.version.to_string(),
                    reason: format!("already present in region '{}'", tail),
                });
            }
        }

        // No two edges out of the same tail may allow the same pair
        for (other_head, other_filter) in existing {
            if let Some((name, version)) = filter.shared_allowance(other_filter) {
                return Err(Error::DuplicateBundle {
                    symbolic_name: name.clone(),
                    version: version.to_string(),
                    reason: format!(
                        "already allowed on the edge from '{}' to '{}'",
                        tail, other_head
                    ),
                });
            }
        }

        if !state.regions.contains_key(tail) {
            state.regions.insert(tail.to_string(), Region::new(tail));
        }
        if !state.regions.contains_key(head) {
            state.regions.insert(head.to_string(), Region::new(head));
        }
        debug!(tail, head, "connecting regions");
        state
            .edges
            .entry(tail.to_string())
            .or_default()
            .push((head.to_string(), filter));
        Ok(())
    }

    /// Snapshot of the (head, filter) pairs for the given tail region
    pub fn edges(&self, tail: &str) -> Vec<(String, RegionFilter)> {
        self.state().edges.get(tail).cloned().unwrap_or_default()
    }

    /// Snapshot of all region names, sorted
    pub fn region_names(&self) -> Vec<String> {
        self.state().regions.keys().cloned().collect()
    }

    /// Snapshot of a region, if present
    pub fn region(&self, name: &str) -> Option<Region> {
        self.state().regions.get(name).cloned()
    }

    /// Register a bundle as a member of a region
    ///
    /// Fails with [`Error::InvalidOperation`] when the id is already claimed
    /// by a different region, and with [`Error::DuplicateBundle`] when the
    /// identity is already present in the region under another id. Adding
    /// the same id to the same region again is a no-op.
    pub fn add_bundle(&self, region: &str, bundle: BundleId, identity: &ModuleIdentity) -> Result<()> {
        let mut state = self.state();

        if !state.regions.contains_key(region) {
            return Err(Error::NoSuchRegion(region.to_string()));
        }

        if let Some((owner, _)) = state.bundles.get(&bundle) {
            if owner == region {
                return Ok(());
            }
            return Err(Error::InvalidOperation(format!(
                "bundle {} is already a member of region '{}'",
                bundle, owner
            )));
        }

        let duplicate = state
            .bundles
            .values()
            .any(|(owner, existing)| owner == region && existing == identity);
        if duplicate {
            return Err(Error::DuplicateBundle {
                symbolic_name: identity.symbolic_name.clone(),
                version: identity.version.to_string(),
                reason: format!("already present in region '{}'", region),
            });
        }

        state
            .bundles
            .insert(bundle, (region.to_string(), identity.clone()));
        if let Some(r) = state.regions.get_mut(region) {
            r.members.insert(bundle);
        }
        Ok(())
    }

    /// Whether the bundle id is a member of the named region
    pub fn contains(&self, region: &str, bundle: BundleId) -> bool {
        self.state()
            .bundles
            .get(&bundle)
            .is_some_and(|(owner, _)| owner == region)
    }

    /// The region owning a bundle id, if registered
    pub fn region_of(&self, bundle: BundleId) -> Option<String> {
        self.state().bundles.get(&bundle).map(|(r, _)| r.clone())
    }

    /// The registered identity of a bundle id
    pub fn bundle_identity(&self, bundle: BundleId) -> Option<ModuleIdentity> {
        self.state().bundles.get(&bundle).map(|(_, i)| i.clone())
    }

    /// Whether an identity is observable from a region
    ///
    /// True when a bundle with that identity is physically a member of the
    /// region, or when an outgoing edge allows the pair and the head region
    /// physically holds it.
    pub fn is_visible(&self, region: &str, identity: &ModuleIdentity) -> bool {
        let state = self.state();

        let present_in = |r: &str| {
            state
                .bundles
                .values()
                .any(|(owner, existing)| owner == r && existing == identity)
        };

        if present_in(region) {
            return true;
        }

        state
            .edges
            .get(region)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .any(|(head, filter)| filter.allows_identity(identity) && present_in(head))
    }

    /// Remove a region, its members, and every edge touching it
    pub fn remove_region(&self, name: &str) {
        let mut state = self.state();
        if state.regions.remove(name).is_none() {
            return;
        }
        debug!(region = name, "removing region");
        state.bundles.retain(|_, (owner, _)| owner.as_str() != name);
        state.edges.remove(name);
        for edges in state.edges.values_mut() {
            edges.retain(|(head, _)| head != name);
        }
    }
}
