use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use iotndn_core::{Interest, Name};
use log::{debug, info};

use crate::face::FaceId;
use crate::face_set::FaceSet;
use crate::forwarder::Forwarder;
use crate::name_tree::{NameTree, NameTreeId};
use crate::slots::{CapacityError, SlotTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FibId(pub(crate) usize);

/// What the forwarder does with an Interest after a local producer has seen it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Continue with the default forwarding to the entry's nexthops
    Forward,
    /// The handler dealt with the Interest; do not forward it
    Suppress,
}

/// Local producer attached to a FIB prefix
pub trait InterestHandler {
    fn on_interest(&mut self, forwarder: &mut Forwarder, interest: &Interest, wire: &[u8]) -> Strategy;
}

impl<F> InterestHandler for F
where
    F: FnMut(&mut Forwarder, &Interest, &[u8]) -> Strategy,
{
    fn on_interest(&mut self, forwarder: &mut Forwarder, interest: &Interest, wire: &[u8]) -> Strategy {
        self(forwarder, interest, wire)
    }
}

pub type HandlerRef = Rc<RefCell<dyn InterestHandler>>;

pub struct FibEntry {
    name_tree_id: NameTreeId,
    pub(crate) nexthops: FaceSet,
    pub(crate) handler: Option<HandlerRef>,
}

impl FibEntry {
    pub fn name_tree_id(&self) -> NameTreeId {
        self.name_tree_id
    }

    pub fn nexthops(&self) -> FaceSet {
        self.nexthops
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    fn is_empty(&self) -> bool {
        self.nexthops.is_empty() && self.handler.is_none()
    }
}

impl fmt::Debug for FibEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FibEntry")
            .field("name_tree_id", &self.name_tree_id)
            .field("nexthops", &self.nexthops)
            .field("has_handler", &self.has_handler())
            .finish()
    }
}

/// Forwarding Information Base: prefix to nexthop faces and local producer
#[derive(Debug)]
pub struct Fib {
    entries: SlotTable<FibEntry>,
}

impl Fib {
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

    /// Exact lookup of a prefix
    pub fn find(&self, tree: &NameTree, prefix: &Name) -> Option<FibId> {
        tree.find(prefix).and_then(|id| tree.get(id)).and_then(|entry| entry.fib_id)
    }

    /// Return the entry for `prefix`, creating it if needed. Nothing is
    /// allocated when either the FIB or the name tree is full.
    pub fn find_or_insert(&mut self, tree: &mut NameTree, prefix: &Name) -> Result<FibId, CapacityError> {
        if let Some(id) = self.find(tree, prefix) {
            return Ok(id);
        }
        if self.entries.is_full() {
            return Err(CapacityError(self.capacity()));
        }

        let (name_tree_id, _) = tree.find_or_insert(prefix)?;
        let index = self.entries.insert(FibEntry {
            name_tree_id,
            nexthops: FaceSet::new(),
            handler: None,
        })?;
        if let Some(node) = tree.get_mut(name_tree_id) {
            node.fib_id = Some(FibId(index));
        }
        info!("Added FIB entry for prefix: {}", prefix);
        Ok(FibId(index))
    }

    pub fn get(&self, id: FibId) -> Option<&FibEntry> {
        self.entries.get(id.0)
    }

    pub(crate) fn get_mut(&mut self, id: FibId) -> Option<&mut FibEntry> {
        self.entries.get_mut(id.0)
    }

    /// Reclaim the entry, and its name tree reference, once it has neither
    /// nexthops nor a handler
    pub fn remove_if_empty(&mut self, tree: &mut NameTree, id: FibId) -> bool {
        if !self.get(id).is_some_and(FibEntry::is_empty) {
            return false;
        }
        let Some(entry) = self.entries.remove(id.0) else {
            return false;
        };
        if let Some(node) = tree.get_mut(entry.name_tree_id) {
            node.fib_id = None;
            info!("Removed FIB entry for prefix: {}", node.name());
        }
        tree.release_if_unreferenced(entry.name_tree_id);
        true
    }

    /// Clear `face` from every nexthop set; returns the number of entries touched
    pub fn unregister_face(&mut self, tree: &mut NameTree, face: FaceId) -> usize {
        let touched: Vec<FibId> = self
            .entries
            .iter_mut()
            .filter_map(|(index, entry)| entry.nexthops.remove(face).then_some(FibId(index)))
            .collect();

        for id in &touched {
            self.remove_if_empty(tree, *id);
        }
        if !touched.is_empty() {
            debug!("Removed face {} from {} FIB entries", face, touched.len());
        }
        touched.len()
    }

    /// Longest-prefix match: probe `name` and each shorter prefix down to the
    /// root `/`, returning the first FIB entry found
    pub fn longest_prefix_match(&self, tree: &NameTree, name: &Name) -> Option<FibId> {
        (0..=name.len()).rev().find_map(|len| {
            tree.find_prefix(name, len)
                .and_then(|id| tree.get(id))
                .and_then(|entry| entry.fib_id)
        })
    }
}
