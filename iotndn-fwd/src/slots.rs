//! Fixed-capacity slot arena backing every forwarder table.
//!
//! Slots are allocated once at construction. Insertion takes the first empty
//! slot, so indices are recycled and always stay below the capacity.

/// Insertion failed because every slot is occupied
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("table capacity {0} exhausted")]
pub struct CapacityError(pub usize);

#[derive(Debug)]
enum Slot<T> {
    Empty,
    Occupied(T),
}

#[derive(Debug)]
pub struct SlotTable<T> {
    slots: Vec<Slot<T>>,
    occupied: usize,
}

impl<T> SlotTable<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || Slot::Empty);
        Self { slots, occupied: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.occupied
    }

    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    pub fn is_full(&self) -> bool {
        self.occupied == self.slots.len()
    }

    /// Store `value` in the first empty slot and return its index
    pub fn insert(&mut self, value: T) -> Result<usize, CapacityError> {
        let index = self
            .slots
            .iter()
            .position(|slot| matches!(slot, Slot::Empty))
            .ok_or(CapacityError(self.slots.len()))?;
        self.slots[index] = Slot::Occupied(value);
        self.occupied += 1;
        Ok(index)
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        match self.slots.get(index) {
            Some(Slot::Occupied(value)) => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        match self.slots.get_mut(index) {
            Some(Slot::Occupied(value)) => Some(value),
            _ => None,
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        self.get(index).is_some()
    }

    /// Free a slot, returning what it held
    pub fn remove(&mut self, index: usize) -> Option<T> {
        let slot = self.slots.get_mut(index)?;
        match std::mem::replace(slot, Slot::Empty) {
            Slot::Occupied(value) => {
                self.occupied -= 1;
                Some(value)
            }
            Slot::Empty => None,
        }
    }

    /// Index of the first occupied slot matching `predicate`
    pub fn position<P>(&self, mut predicate: P) -> Option<usize>
    where
        P: FnMut(&T) -> bool,
    {
        self.iter().find(|(_, value)| predicate(value)).map(|(index, _)| index)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| match slot {
            Slot::Occupied(value) => Some((index, value)),
            Slot::Empty => None,
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| match slot {
            Slot::Occupied(value) => Some((index, value)),
            Slot::Empty => None,
        })
    }
}
