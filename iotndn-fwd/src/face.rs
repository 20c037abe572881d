use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use log::{debug, info};

use crate::error::{ForwarderError, Result};
use crate::slots::SlotTable;

/// Stable identifier of a registered face: its slot in the face table
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FaceId(pub usize);

impl FaceId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for FaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FaceId({})", self.0)
    }
}

impl fmt::Display for FaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FaceError {
    #[error("Face is down")]
    Down,
    #[error("Send failed: {0}")]
    SendFailed(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Communication endpoint the forwarder can transmit packets on
pub trait Face {
    fn send(&mut self, packet: &[u8]) -> std::result::Result<(), FaceError>;
}

pub type FaceHandle = Rc<RefCell<dyn Face>>;

/// Result of registering a face
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Registered(FaceId),
    /// The same face object already holds this ID
    AlreadyRegistered(FaceId),
}

impl Registration {
    pub fn face_id(self) -> FaceId {
        match self {
            Registration::Registered(id) | Registration::AlreadyRegistered(id) => id,
        }
    }
}

/// In-memory face that queues outgoing packets for the owner to collect.
///
/// Useful for in-process applications and for observing what the forwarder
/// transmits.
#[derive(Debug, Clone, Default)]
pub struct MemoryFace {
    sent: Rc<RefCell<VecDeque<Vec<u8>>>>,
    down: Rc<Cell<bool>>,
}

impl MemoryFace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a clone as a registrable handle; the clone shares the outbound queue
    pub fn handle(&self) -> FaceHandle {
        Rc::new(RefCell::new(self.clone()))
    }

    /// Take every packet sent so far
    pub fn drain(&self) -> Vec<Vec<u8>> {
        self.sent.borrow_mut().drain(..).collect()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.borrow().len()
    }

    /// Make subsequent sends fail with [`FaceError::Down`]
    pub fn set_down(&self, down: bool) {
        self.down.set(down);
    }
}

impl Face for MemoryFace {
    fn send(&mut self, packet: &[u8]) -> std::result::Result<(), FaceError> {
        if self.down.get() {
            return Err(FaceError::Down);
        }
        self.sent.borrow_mut().push_back(packet.to_vec());
        Ok(())
    }
}

/// Registry of faces, indexed by [`FaceId`]
pub struct FaceTable {
    faces: SlotTable<FaceHandle>,
}

impl FaceTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            faces: SlotTable::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.faces.capacity()
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn register(&mut self, face: FaceHandle) -> Result<Registration> {
        if let Some(index) = self.faces.position(|existing| Rc::ptr_eq(existing, &face)) {
            debug!("Face {} already registered", index);
            return Ok(Registration::AlreadyRegistered(FaceId(index)));
        }

        let index = self
            .faces
            .insert(face)
            .map_err(|_| ForwarderError::FaceTableFull)?;
        info!("Registered face {}", index);
        Ok(Registration::Registered(FaceId(index)))
    }

    /// Free a face slot. Callers purge FIB and PIT references first.
    pub fn unregister(&mut self, id: FaceId) -> Option<FaceHandle> {
        let face = self.faces.remove(id.index());
        if face.is_some() {
            info!("Unregistered face {}", id);
        }
        face
    }

    pub fn get(&self, id: FaceId) -> Option<FaceHandle> {
        self.faces.get(id.index()).cloned()
    }

    pub fn contains(&self, id: FaceId) -> bool {
        self.faces.contains(id.index())
    }

    /// Reject IDs outside the table's range
    pub fn check_bounds(&self, id: FaceId) -> Result<()> {
        if id.index() < self.capacity() {
            Ok(())
        } else {
            Err(ForwarderError::InvalidFace(id))
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = FaceId> + '_ {
        self.faces.iter().map(|(index, _)| FaceId(index))
    }
}

impl fmt::Debug for FaceTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaceTable")
            .field("capacity", &self.capacity())
            .field("registered", &self.ids().collect::<Vec<_>>())
            .finish()
    }
}
