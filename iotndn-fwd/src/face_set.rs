use std::fmt;

use crate::face::FaceId;

/// Number of faces a [`FaceSet`] can address
pub const FACE_SET_WIDTH: usize = 64;

/// Fixed-width bitset of face IDs, used for FIB nexthops and PIT in-records
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FaceSet(u64);

impl FaceSet {
    pub const fn new() -> Self {
        Self(0)
    }

    /// Add a face; returns false if it was already present or out of range
    pub fn insert(&mut self, face: FaceId) -> bool {
        let Some(bit) = Self::bit(face) else {
            return false;
        };
        let added = self.0 & bit == 0;
        self.0 |= bit;
        added
    }

    /// Remove a face; returns true if it was present
    pub fn remove(&mut self, face: FaceId) -> bool {
        let Some(bit) = Self::bit(face) else {
            return false;
        };
        let present = self.0 & bit != 0;
        self.0 &= !bit;
        present
    }

    pub fn contains(&self, face: FaceId) -> bool {
        Self::bit(face).is_some_and(|bit| self.0 & bit != 0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }

    /// Copy of this set with `face` removed, if any
    pub fn without(mut self, face: Option<FaceId>) -> Self {
        if let Some(face) = face {
            self.remove(face);
        }
        self
    }

    /// Faces in ascending ID order
    pub fn iter(&self) -> impl Iterator<Item = FaceId> {
        let bits = self.0;
        (0..FACE_SET_WIDTH)
            .filter(move |index| bits & (1u64 << index) != 0)
            .map(FaceId)
    }

    fn bit(face: FaceId) -> Option<u64> {
        (face.index() < FACE_SET_WIDTH).then(|| 1u64 << face.index())
    }
}

impl FromIterator<FaceId> for FaceSet {
    fn from_iter<I: IntoIterator<Item = FaceId>>(iter: I) -> Self {
        let mut set = FaceSet::new();
        for face in iter {
            set.insert(face);
        }
        set
    }
}

impl fmt::Debug for FaceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(|face| face.index())).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_remove() {
        let mut set = FaceSet::new();
        assert!(set.insert(FaceId(2)));
        assert!(!set.insert(FaceId(2)));
        assert!(set.insert(FaceId(63)));
        assert_eq!(set.len(), 2);
        assert!(set.contains(FaceId(63)));

        assert!(set.remove(FaceId(2)));
        assert!(!set.remove(FaceId(2)));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![FaceId(63)]);
    }

    #[test]
    fn test_out_of_range_face_ignored() {
        let mut set = FaceSet::new();
        assert!(!set.insert(FaceId(64)));
        assert!(!set.contains(FaceId(64)));
        assert!(set.is_empty());
    }

    #[test]
    fn test_without_excludes_incoming_face() {
        let set: FaceSet = [FaceId(1), FaceId(2), FaceId(3)].into_iter().collect();
        let out = set.without(Some(FaceId(2)));
        assert_eq!(out.iter().collect::<Vec<_>>(), vec![FaceId(1), FaceId(3)]);
        assert_eq!(set.without(None), set);
        assert_eq!(format!("{:?}", out), "{1, 3}");
    }
}
