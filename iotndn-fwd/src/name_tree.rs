//! Shared, de-duplicated index of the names referenced by the FIB and PIT.
//!
//! Each entry carries at most one back-reference per table. An entry lives as
//! long as either table points at it and is released as soon as neither does.

use iotndn_core::Name;
use log::trace;

use crate::fib::FibId;
use crate::pit::PitId;
use crate::slots::{CapacityError, SlotTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NameTreeId(pub(crate) usize);

#[derive(Debug)]
pub struct NameTreeEntry {
    name: Name,
    pub(crate) fib_id: Option<FibId>,
    pub(crate) pit_id: Option<PitId>,
}

impl NameTreeEntry {
    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn fib_id(&self) -> Option<FibId> {
        self.fib_id
    }

    pub fn pit_id(&self) -> Option<PitId> {
        self.pit_id
    }

    fn is_unreferenced(&self) -> bool {
        self.fib_id.is_none() && self.pit_id.is_none()
    }
}

#[derive(Debug)]
pub struct NameTree {
    entries: SlotTable<NameTreeEntry>,
}

impl NameTree {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: SlotTable::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    /// Exact lookup
    pub fn find(&self, name: &Name) -> Option<NameTreeId> {
        self.entries.position(|entry| entry.name == *name).map(NameTreeId)
    }

    /// Exact lookup of the first `len` components of `name`
    pub fn find_prefix(&self, name: &Name, len: usize) -> Option<NameTreeId> {
        let prefix = &name.components()[..len.min(name.len())];
        self.entries
            .position(|entry| entry.name.components() == prefix)
            .map(NameTreeId)
    }

    /// Look up `name`, interning it if absent. The flag reports whether a new
    /// entry was created.
    pub fn find_or_insert(&mut self, name: &Name) -> Result<(NameTreeId, bool), CapacityError> {
        if let Some(id) = self.find(name) {
            return Ok((id, false));
        }
        let index = self.entries.insert(NameTreeEntry {
            name: name.clone(),
            fib_id: None,
            pit_id: None,
        })?;
        trace!("Name tree interned {} at {}", name, index);
        Ok((NameTreeId(index), true))
    }

    pub fn get(&self, id: NameTreeId) -> Option<&NameTreeEntry> {
        self.entries.get(id.0)
    }

    pub(crate) fn get_mut(&mut self, id: NameTreeId) -> Option<&mut NameTreeEntry> {
        self.entries.get_mut(id.0)
    }

    pub fn name(&self, id: NameTreeId) -> Option<&Name> {
        self.get(id).map(NameTreeEntry::name)
    }

    /// Free the entry if neither table references it any more
    pub fn release_if_unreferenced(&mut self, id: NameTreeId) -> bool {
        if !self.get(id).is_some_and(NameTreeEntry::is_unreferenced) {
            return false;
        }
        if let Some(entry) = self.entries.remove(id.0) {
            trace!("Name tree released {}", entry.name);
        }
        true
    }
}
