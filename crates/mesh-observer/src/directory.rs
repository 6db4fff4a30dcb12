//! Active directory - identifier → in-use slot.
//!
//! Backed by a DashMap so ingestion tasks can insert/remove while the owning
//! thread takes snapshots, without an outer lock.

use std::collections::HashMap;

use dashmap::DashMap;
use dashmap::mapref::one::{Ref, RefMut};

use crate::mesh::MeshId;
use crate::pool::{MeshSlot, SlotView};

#[derive(Default)]
pub struct ActiveDirectory {
    slots: DashMap<MeshId, MeshSlot>,
}

impl ActiveDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Guarded read access. Do not hold across calls that mutate the directory.
    pub fn get(&self, id: &MeshId) -> Option<Ref<'_, MeshId, MeshSlot>> {
        self.slots.get(id)
    }

    pub fn get_mut(&self, id: &MeshId) -> Option<RefMut<'_, MeshId, MeshSlot>> {
        self.slots.get_mut(id)
    }

    pub fn contains(&self, id: &MeshId) -> bool {
        self.slots.contains_key(id)
    }

    /// Insert an active slot, returning the entry still locked.
    ///
    /// An id that is already present is refused and the slot is handed back
    /// untouched, so the caller can recycle it.
    pub fn insert(&self, id: MeshId, slot: MeshSlot) -> Result<RefMut<'_, MeshId, MeshSlot>, MeshSlot> {
        use dashmap::mapref::entry::Entry;

        match self.slots.entry(id) {
            Entry::Occupied(entry) => {
                tracing::debug!(mesh_id = %entry.key(), "Directory already holds an entry for this mesh");
                Err(slot)
            }
            Entry::Vacant(entry) => Ok(entry.insert(slot)),
        }
    }

    pub fn remove(&self, id: &MeshId) -> Option<MeshSlot> {
        self.slots.remove(id).map(|(_, slot)| slot)
    }

    /// Remove every entry, handing back ownership of the slots.
    pub fn drain(&self) -> Vec<(MeshId, MeshSlot)> {
        let ids: Vec<MeshId> = self.slots.iter().map(|e| e.key().clone()).collect();
        ids.into_iter()
            .filter_map(|id| self.slots.remove(&id))
            .collect()
    }

    /// Copy of the current membership, stable against later mutation.
    pub fn snapshot(&self) -> DirectorySnapshot {
        let entries = self
            .slots
            .iter()
            .filter_map(|entry| entry.value().view().map(|v| (entry.key().clone(), v)))
            .collect();
        DirectorySnapshot { entries }
    }

    pub fn ids(&self) -> Vec<MeshId> {
        self.slots.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Read-only copy of the directory taken at one point in time.
#[derive(Debug, Clone, Default)]
pub struct DirectorySnapshot {
    entries: HashMap<MeshId, SlotView>,
}

impl DirectorySnapshot {
    pub fn get(&self, id: &MeshId) -> Option<&SlotView> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &MeshId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MeshId, &SlotView)> {
        self.entries.iter()
    }

    pub fn views(&self) -> impl Iterator<Item = &SlotView> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_map(self) -> HashMap<MeshId, SlotView> {
        self.entries
    }
}

impl IntoIterator for DirectorySnapshot {
    type Item = (MeshId, SlotView);
    type IntoIter = std::collections::hash_map::IntoIter<MeshId, SlotView>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
