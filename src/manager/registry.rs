/*!
 * Chain Registry
 * Mount point keyed map of live controller chains
 */

use crate::address::{Address, MountPoint};
use crate::controller::SyncController;
use ahash::RandomState;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

pub struct Registry {
    chains: DashMap<MountPoint, Arc<SyncController>, RandomState>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            chains: DashMap::with_hasher(RandomState::new()),
        }
    }

    pub fn get(&self, mount_point: &MountPoint) -> Option<Arc<SyncController>> {
        self.chains.get(mount_point).map(|chain| Arc::clone(chain.value()))
    }

    /// Register `chain` unless another thread registered one first
    pub fn insert_or_get(&self, mount_point: MountPoint, chain: SyncController) -> Arc<SyncController> {
        match self.chains.entry(mount_point) {
            Entry::Occupied(existing) => Arc::clone(existing.get()),
            Entry::Vacant(slot) => Arc::clone(slot.insert(Arc::new(chain)).value()),
        }
    }

    pub fn remove(&self, mount_point: &MountPoint) -> Option<Arc<SyncController>> {
        self.chains.remove(mount_point).map(|(_, chain)| chain)
    }

    /// Remove a chain only while nothing outside the registry holds it
    pub fn remove_if_unreferenced(&self, mount_point: &MountPoint) -> Option<Arc<SyncController>> {
        self.chains
            .remove_if(mount_point, |_, chain| Arc::strong_count(chain) == 1)
            .map(|(_, chain)| chain)
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Every chain, descendants before ancestors
    pub fn deepest_first(&self) -> Vec<(MountPoint, Arc<SyncController>)> {
        self.collect(|_| true)
    }

    /// `root` and its registered descendants, deepest first
    pub fn subtree(&self, root: &MountPoint) -> Vec<(MountPoint, Arc<SyncController>)> {
        self.collect(|mp| mp == root || mp.is_descendant_of(root))
    }

    /// Chains backed by `address` or, when `nested` is set, by any entry below it
    pub fn backed_by(&self, address: &Address, nested: bool) -> Vec<(MountPoint, Arc<SyncController>)> {
        let hits: Vec<MountPoint> = self
            .chains
            .iter()
            .filter(|chain| {
                chain.key().parent_address().map_or(false, |backing| {
                    backing.mount_point() == address.mount_point()
                        && (backing.entry() == address.entry()
                            || (nested && address.entry().is_ancestor_of(backing.entry())))
                })
            })
            .map(|chain| chain.key().clone())
            .collect();

        let mut subtrees = Vec::new();
        for hit in hits {
            subtrees.extend(self.subtree(&hit));
        }
        sort_deepest_first(&mut subtrees);
        subtrees.dedup_by(|a, b| a.0 == b.0);
        subtrees
    }

    pub fn has_children(&self, mount_point: &MountPoint) -> bool {
        self.chains
            .iter()
            .any(|chain| chain.key().parent() == Some(mount_point))
    }

    fn collect(&self, keep: impl Fn(&MountPoint) -> bool) -> Vec<(MountPoint, Arc<SyncController>)> {
        let mut chains: Vec<_> = self
            .chains
            .iter()
            .filter(|chain| keep(chain.key()))
            .map(|chain| (chain.key().clone(), Arc::clone(chain.value())))
            .collect();
        sort_deepest_first(&mut chains);
        chains
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn sort_deepest_first<T>(chains: &mut [(MountPoint, T)]) {
    chains.sort_by(|(a, _), (b, _)| {
        b.depth()
            .cmp(&a.depth())
            .then_with(|| a.to_string().cmp(&b.to_string()))
    });
}
