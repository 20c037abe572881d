use std::fmt;

use iotndn_core::{Data, Name};
use log::debug;

use crate::face::FaceId;
use crate::face_set::FaceSet;
use crate::forwarder::Forwarder;
use crate::name_tree::{NameTree, NameTreeId};
use crate::slots::{CapacityError, SlotTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PitId(pub(crate) usize);

pub type DataCallback = Box<dyn FnOnce(&mut Forwarder, &Data)>;
pub type TimeoutCallback = Box<dyn FnOnce(&mut Forwarder, &Name)>;

/// Callbacks of a local application waiting on an Interest.
///
/// Exactly one of them fires: `on_data` when the Interest is satisfied or
/// `on_timeout` when its PIT entry expires.
pub struct Consumer {
    pub(crate) on_data: DataCallback,
    pub(crate) on_timeout: Option<TimeoutCallback>,
}

impl Consumer {
    pub fn new<F>(on_data: F) -> Self
    where
        F: FnOnce(&mut Forwarder, &Data) + 'static,
    {
        Self {
            on_data: Box::new(on_data),
            on_timeout: None,
        }
    }

    pub fn on_timeout<F>(mut self, on_timeout: F) -> Self
    where
        F: FnOnce(&mut Forwarder, &Name) + 'static,
    {
        self.on_timeout = Some(Box::new(on_timeout));
        self
    }
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("on_timeout", &self.on_timeout.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct PitEntry {
    name_tree_id: NameTreeId,
    pub(crate) incoming: FaceSet,
    deadline_ms: u64,
    pub(crate) consumer: Option<Consumer>,
}

impl PitEntry {
    pub fn name_tree_id(&self) -> NameTreeId {
        self.name_tree_id
    }

    pub fn incoming_faces(&self) -> FaceSet {
        self.incoming
    }

    pub fn deadline_ms(&self) -> u64 {
        self.deadline_ms
    }

    pub fn has_consumer(&self) -> bool {
        self.consumer.is_some()
    }

    fn is_empty(&self) -> bool {
        self.incoming.is_empty() && self.consumer.is_none()
    }
}

/// An entry taken out of the PIT, by satisfaction or expiry
#[derive(Debug)]
pub struct RemovedEntry {
    pub name: Name,
    pub incoming: FaceSet,
    pub consumer: Option<Consumer>,
}

/// Pending Interest Table: one entry per distinct outstanding Interest name
#[derive(Debug)]
pub struct Pit {
    entries: SlotTable<PitEntry>,
}

impl Pit {
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

    /// Exact-name lookup
    pub fn find(&self, tree: &NameTree, name: &Name) -> Option<PitId> {
        tree.find(name).and_then(|id| tree.get(id)).and_then(|entry| entry.pit_id)
    }

    /// Take out the entry for `name` if its deadline is at or before `now_ms`.
    /// An overdue entry no longer aggregates Interests or accepts Data.
    pub fn take_overdue(&mut self, tree: &mut NameTree, name: &Name, now_ms: u64) -> Option<RemovedEntry> {
        let id = self.find(tree, name)?;
        if self.get(id)?.deadline_ms > now_ms {
            return None;
        }
        debug!("PIT entry for {} overdue at {}", name, now_ms);
        self.remove(tree, id)
    }

    /// Return the pending entry for `name`, or create one expiring at
    /// `deadline_ms`. The flag reports whether a new entry was created; an
    /// existing entry keeps its original deadline.
    pub fn find_or_insert(
        &mut self,
        tree: &mut NameTree,
        name: &Name,
        deadline_ms: u64,
    ) -> Result<(PitId, bool), CapacityError> {
        if let Some(id) = self.find(tree, name) {
            return Ok((id, false));
        }
        if self.entries.is_full() {
            return Err(CapacityError(self.capacity()));
        }

        let (name_tree_id, _) = tree.find_or_insert(name)?;
        let index = self.entries.insert(PitEntry {
            name_tree_id,
            incoming: FaceSet::new(),
            deadline_ms,
            consumer: None,
        })?;
        if let Some(node) = tree.get_mut(name_tree_id) {
            node.pit_id = Some(PitId(index));
        }
        debug!("Created PIT entry for {} expiring at {}", name, deadline_ms);
        Ok((PitId(index), true))
    }

    pub fn get(&self, id: PitId) -> Option<&PitEntry> {
        self.entries.get(id.0)
    }

    pub(crate) fn get_mut(&mut self, id: PitId) -> Option<&mut PitEntry> {
        self.entries.get_mut(id.0)
    }

    /// Remove an entry unconditionally and release its name tree reference
    pub fn remove(&mut self, tree: &mut NameTree, id: PitId) -> Option<RemovedEntry> {
        let entry = self.entries.remove(id.0)?;
        let name = match tree.get_mut(entry.name_tree_id) {
            Some(node) => {
                node.pit_id = None;
                node.name().clone()
            }
            None => Name::new(),
        };
        tree.release_if_unreferenced(entry.name_tree_id);
        Some(RemovedEntry {
            name,
            incoming: entry.incoming,
            consumer: entry.consumer,
        })
    }

    /// Remove the entry once it has no incoming faces and no consumer
    pub fn remove_if_empty(&mut self, tree: &mut NameTree, id: PitId) -> bool {
        if !self.get(id).is_some_and(PitEntry::is_empty) {
            return false;
        }
        self.remove(tree, id).is_some()
    }

    /// Scrub `face` from every incoming set; returns the number of entries touched
    pub fn unregister_face(&mut self, tree: &mut NameTree, face: FaceId) -> usize {
        let touched: Vec<PitId> = self
            .entries
            .iter_mut()
            .filter_map(|(index, entry)| entry.incoming.remove(face).then_some(PitId(index)))
            .collect();

        for id in &touched {
            self.remove_if_empty(tree, *id);
        }
        if !touched.is_empty() {
            debug!("Removed face {} from {} PIT entries", face, touched.len());
        }
        touched.len()
    }

    /// Take out every entry whose deadline is at or before `now_ms`, earliest
    /// deadline first
    pub fn expire(&mut self, tree: &mut NameTree, now_ms: u64) -> Vec<RemovedEntry> {
        let mut due: Vec<(u64, PitId)> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.deadline_ms <= now_ms)
            .map(|(index, entry)| (entry.deadline_ms, PitId(index)))
            .collect();
        due.sort_by_key(|(deadline, id)| (*deadline, id.0));

        due.into_iter()
            .filter_map(|(_, id)| self.remove(tree, id))
            .inspect(|removed| debug!("PIT entry expired: {}", removed.name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(uri: &str) -> Name {
        uri.parse().unwrap()
    }

    #[test]
    fn test_one_entry_per_name() {
        let mut tree = NameTree::new(4);
        let mut pit = Pit::new(4);

        let (first, created) = pit.find_or_insert(&mut tree, &name("/a"), 100).unwrap();
        assert!(created);
        let (second, created) = pit.find_or_insert(&mut tree, &name("/a"), 900).unwrap();
        assert!(!created);
        assert_eq!(first, second);
        assert_eq!(pit.get(first).unwrap().deadline_ms(), 100);
        assert_eq!(pit.len(), 1);
    }

    #[test]
    fn test_full_pit_leaves_tables_unchanged() {
        let mut tree = NameTree::new(4);
        let mut pit = Pit::new(1);
        pit.find_or_insert(&mut tree, &name("/a"), 100).unwrap();

        assert_eq!(pit.find_or_insert(&mut tree, &name("/b"), 100), Err(CapacityError(1)));
        assert_eq!(tree.len(), 1);
        assert!(pit.find(&tree, &name("/a")).is_some());
    }

    #[test]
    fn test_shares_name_tree_entry_with_fib() {
        let mut tree = NameTree::new(4);
        let mut pit = Pit::new(4);
        let (node, _) = tree.find_or_insert(&name("/a")).unwrap();
        tree.get_mut(node).unwrap().fib_id = Some(crate::fib::FibId(0));

        let (id, _) = pit.find_or_insert(&mut tree, &name("/a"), 10).unwrap();
        assert_eq!(pit.get(id).unwrap().name_tree_id(), node);
        assert_eq!(tree.len(), 1);

        let removed = pit.remove(&mut tree, id).unwrap();
        assert_eq!(removed.name, name("/a"));
        // Still referenced by the FIB
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.get(node).unwrap().pit_id(), None);
    }

    #[test]
    fn test_expire_in_deadline_order() {
        let mut tree = NameTree::new(4);
        let mut pit = Pit::new(4);
        pit.find_or_insert(&mut tree, &name("/late"), 300).unwrap();
        pit.find_or_insert(&mut tree, &name("/early"), 100).unwrap();
        pit.find_or_insert(&mut tree, &name("/future"), 5000).unwrap();

        let expired: Vec<Name> = pit.expire(&mut tree, 300).into_iter().map(|e| e.name).collect();
        assert_eq!(expired, vec![name("/early"), name("/late")]);
        assert_eq!(pit.len(), 1);
        assert_eq!(tree.len(), 1);
        assert!(pit.expire(&mut tree, 4999).is_empty());
    }

    #[test]
    fn test_take_overdue_only_past_deadline() {
        let mut tree = NameTree::new(4);
        let mut pit = Pit::new(4);
        pit.find_or_insert(&mut tree, &name("/a"), 100).unwrap();

        assert!(pit.take_overdue(&mut tree, &name("/a"), 99).is_none());
        assert!(pit.take_overdue(&mut tree, &name("/missing"), 500).is_none());
        assert_eq!(pit.len(), 1);

        let removed = pit.take_overdue(&mut tree, &name("/a"), 100).unwrap();
        assert_eq!(removed.name, name("/a"));
        assert!(pit.is_empty());
        assert!(tree.is_empty());

        let (_, created) = pit.find_or_insert(&mut tree, &name("/a"), 400).unwrap();
        assert!(created);
    }

    #[test]
    fn test_unregister_face_reclaims_emptied_entries() {
        let mut tree = NameTree::new(4);
        let mut pit = Pit::new(4);
        let (a, _) = pit.find_or_insert(&mut tree, &name("/a"), 100).unwrap();
        let (b, _) = pit.find_or_insert(&mut tree, &name("/b"), 100).unwrap();
        pit.get_mut(a).unwrap().incoming.insert(FaceId(1));
        pit.get_mut(b).unwrap().incoming.insert(FaceId(1));
        pit.get_mut(b).unwrap().incoming.insert(FaceId(2));

        assert_eq!(pit.unregister_face(&mut tree, FaceId(1)), 2);
        assert!(pit.find(&tree, &name("/a")).is_none());
        let remaining = pit.get(b).unwrap().incoming_faces();
        assert!(!remaining.contains(FaceId(1)));
        assert!(remaining.contains(FaceId(2)));
    }

    #[test]
    fn test_consumer_keeps_entry_alive() {
        let mut tree = NameTree::new(4);
        let mut pit = Pit::new(4);
        let (id, _) = pit.find_or_insert(&mut tree, &name("/a"), 100).unwrap();
        pit.get_mut(id).unwrap().consumer = Some(Consumer::new(|_, _| {}));

        assert!(!pit.remove_if_empty(&mut tree, id));
        pit.get_mut(id).unwrap().consumer = None;
        assert!(pit.remove_if_empty(&mut tree, id));
        assert!(tree.is_empty());
    }
}
