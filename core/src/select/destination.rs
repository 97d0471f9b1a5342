use std::sync::atomic::{AtomicBool, AtomicU32, Ordering::Relaxed};
use std::sync::Arc;

use ahash::{HashMap, HashMapExt};
use arc_swap::ArcSwap;
use http::Extensions;
use tracing::debug;

/// a selectable backend within one service
///
/// the same instance stays referenced from every lookup table built
/// while the destination is a member, so availability flips apply to
/// already published tables as well
#[derive(Debug)]
pub struct Destination {
    /// destination id, unique within the owning service
    id: u32,
    /// the group this destination belongs to
    group: u32,
    /// traffic weight, 0 keeps the destination draining
    weight: AtomicU32,
    /// weight snapshot taken when the lookup table was last built
    last_weight: AtomicU32,
    /// lookup-time availability, builds ignore it
    enabled: AtomicBool,
    /// used to store some extensive data into the destination
    extension: ArcSwap<Extensions>,
}

impl Destination {
    fn new(id: u32, group: u32, weight: u32, extension: Extensions) -> Self {
        Destination {
            id,
            group,
            weight: AtomicU32::new(weight),
            last_weight: AtomicU32::new(weight),
            enabled: AtomicBool::new(true),
            extension: ArcSwap::new(Arc::new(extension)),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn group(&self) -> u32 {
        self.group
    }

    /// currently configured weight
    pub fn weight(&self) -> u32 {
        self.weight.load(Relaxed)
    }

    pub(crate) fn set_weight(&self, weight: u32) {
        self.weight.store(weight, Relaxed);
    }

    /// weight the last build scaled with
    pub fn last_weight(&self) -> u32 {
        self.last_weight.load(Relaxed)
    }

    /// freeze the configured weight for the build that is starting
    pub(crate) fn snapshot_weight(&self) -> u32 {
        let weight = self.weight.load(Relaxed);
        self.last_weight.store(weight, Relaxed);
        weight
    }

    /// check if the destination may be returned from a lookup
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Relaxed)
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Relaxed);
    }

    /// get the extensive data stored in the destination
    pub fn extension(&self) -> Arc<Extensions> {
        self.extension.load_full()
    }

    pub(crate) fn set_extension(&self, extension: Extensions) {
        self.extension.store(Arc::new(extension));
    }
}

/// ordered destination collection
///
/// insertion order is preserved, it drives the round-robin population
/// and therefore the table contents
#[derive(Debug)]
pub struct DestinationSet {
    /// destinations in insertion order
    dests: Vec<Arc<Destination>>,
    /// id index into the ordered list
    index: HashMap<u32, usize>,
}

impl DestinationSet {
    pub fn new() -> Self {
        DestinationSet {
            dests: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.dests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dests.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Destination>> {
        self.dests.iter()
    }

    /// find a destination by id
    pub fn get(&self, id: u32) -> Option<&Arc<Destination>> {
        self.index.get(&id).map(|&at| &self.dests[at])
    }

    /// add a new destination or update the existing one by id
    /// returns true when membership or weight changed
    pub fn add_or_update(&mut self, id: u32, group: u32, weight: u32, extension: Extensions) -> bool {
        if let Some(&at) = self.index.get(&id) {
            let dest = &self.dests[at];
            let mut changed = false;
            if dest.weight() != weight {
                debug!(
                    "changed weight: id={}:{}, weight: {} -> {}",
                    dest.group(),
                    id,
                    dest.weight(),
                    weight
                );
                dest.set_weight(weight);
                changed = true;
            }
            dest.set_extension(extension);
            return changed;
        }
        debug!("add destination: id={group}:{id}, weight={weight}");
        self.index.insert(id, self.dests.len());
        self.dests.push(Arc::new(Destination::new(id, group, weight, extension)));
        true
    }

    /// remove a destination by id, keeping the order of the rest
    pub fn remove(&mut self, id: u32) -> bool {
        match self.index.remove(&id) {
            Some(at) => {
                let dest = self.dests.remove(at);
                debug!("removed destination: id={}:{}", dest.group(), dest.id());
                // reindex everything that shifted down
                for (pos, moved) in self.dests.iter().enumerate().skip(at) {
                    self.index.insert(moved.id(), pos);
                }
                true
            }
            None => false,
        }
    }
}

impl Default for DestinationSet {
    fn default() -> Self {
        Self::new()
    }
}
