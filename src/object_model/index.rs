use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use super::ObjectId;
use crate::util::read_u64;

/// Retained size accumulator of an index entry
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum RetainedSeed {
    Unset,
    /// Queued for the retained size summation pass
    Pending,
    Bytes(u64),
}

impl RetainedSeed {
    fn from_raw(raw: i64) -> Self {
        match raw {
            0 => RetainedSeed::Unset,
            -1 => RetainedSeed::Pending,
            n => RetainedSeed::Bytes(n as u64),
        }
    }

    /// 0 when unset, -1 when pending
    pub fn to_raw(self) -> i64 {
        match self {
            RetainedSeed::Unset => 0,
            RetainedSeed::Pending => -1,
            RetainedSeed::Bytes(n) => n as i64,
        }
    }
}

/// Per-object reachability record
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct IndexEntry {
    offset: u64,
    nearest_root_pointer: ObjectId,
    reference_count: u32,
    last_referrer: ObjectId,
    tree_object: bool,
    retained_size: i64,
}

impl IndexEntry {
    pub fn new(offset: u64) -> Self {
        IndexEntry {
            offset,
            nearest_root_pointer: 0,
            reference_count: 0,
            last_referrer: 0,
            tree_object: false,
            retained_size: 0,
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// The object one step closer to a GC root, 0 for roots and unreached
    /// objects
    pub fn nearest_root_pointer(&self) -> ObjectId {
        self.nearest_root_pointer
    }

    /// Number of distinct objects found referencing this one
    pub fn reference_count(&self) -> u32 {
        self.reference_count
    }

    pub fn has_single_parent(&self) -> bool {
        self.reference_count == 1
    }

    pub fn is_leaf(&self) -> bool {
        self.tree_object
    }

    pub fn retained_seed(&self) -> RetainedSeed {
        RetainedSeed::from_raw(self.retained_size)
    }

    /// Record `referrer` as a predecessor. All edges of one referrer must be
    /// reported back to back; repeats from the same referrer are not counted.
    ///
    /// Returns true if this made the object multi-parent.
    pub(crate) fn add_reference(&mut self, referrer: ObjectId) -> bool {
        debug_assert_ne!(referrer, 0);
        if self.last_referrer == referrer {
            return false;
        }
        self.last_referrer = referrer;
        self.reference_count = self.reference_count.saturating_add(1);
        self.reference_count == 2
    }

    pub(crate) fn set_nearest_root_pointer(&mut self, parent: ObjectId) {
        debug_assert_eq!(self.nearest_root_pointer, 0);
        self.nearest_root_pointer = parent;
    }

    pub(crate) fn set_tree_object(&mut self) {
        self.tree_object = true;
    }

    pub(crate) fn set_retained_seed(&mut self, seed: RetainedSeed) {
        self.retained_size = seed.to_raw();
    }

    fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(&self.offset.to_be_bytes())?;
        out.write_all(&self.nearest_root_pointer.to_be_bytes())?;
        out.write_all(&self.reference_count.to_be_bytes())?;
        out.write_all(&self.last_referrer.to_be_bytes())?;
        out.write_all(&[self.tree_object as u8])?;
        out.write_all(&self.retained_size.to_be_bytes())
    }

    fn read_from<R: Read>(input: &mut R) -> io::Result<Self> {
        let offset = read_u64(input)?;
        let nearest_root_pointer = read_u64(input)?;
        let mut count = [0u8; 4];
        input.read_exact(&mut count)?;
        let last_referrer = read_u64(input)?;
        let mut tree = [0u8; 1];
        input.read_exact(&mut tree)?;
        let retained_size = read_u64(input)? as i64;
        Ok(IndexEntry {
            offset,
            nearest_root_pointer,
            reference_count: u32::from_be_bytes(count),
            last_referrer,
            tree_object: tree[0] != 0,
            retained_size,
        })
    }
}

/// Maps object ids to their offset and reachability record
///
/// Only the traversal thread writes entries, and only while a computation
/// is in progress.
pub trait ObjectIndex {
    fn get(&self, id: ObjectId) -> Option<&IndexEntry>;
    fn get_mut(&mut self, id: ObjectId) -> Option<&mut IndexEntry>;
    /// Called once the traversal completed and entries will not change again
    fn flush(&mut self) -> io::Result<()>;
}

/// An `ObjectIndex` held entirely in memory, as an arena of entries
#[derive(Debug, Default)]
pub struct MemoryIndex {
    ids: Vec<ObjectId>,
    entries: Vec<IndexEntry>,
    slots: HashMap<ObjectId, usize>,
    persist_path: Option<PathBuf>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an object. Returns false, leaving the first registration in
    /// place, if the id is already known.
    pub fn insert(&mut self, id: ObjectId, offset: u64) -> bool {
        if id == 0 || self.slots.contains_key(&id) {
            return false;
        }
        self.slots.insert(id, self.entries.len());
        self.ids.push(id);
        self.entries.push(IndexEntry::new(offset));
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in registration order
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &IndexEntry)> + '_ {
        self.ids.iter().copied().zip(self.entries.iter())
    }

    /// Make `flush` write the whole index to `path`
    pub fn persist_on_flush(&mut self, path: impl AsRef<Path>) {
        self.persist_path = Some(path.as_ref().to_path_buf());
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(&(self.entries.len() as u64).to_be_bytes())?;
        for (id, entry) in self.iter() {
            out.write_all(&id.to_be_bytes())?;
            entry.write_to(out)?;
        }
        Ok(())
    }

    pub fn read_from<R: Read>(input: &mut R) -> io::Result<Self> {
        let len = read_u64(input)?;
        let mut index = MemoryIndex::new();
        for _ in 0..len {
            let id = read_u64(input)?;
            let entry = IndexEntry::read_from(input)?;
            if !index.insert(id, entry.offset) {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("duplicate index entry for object 0x{:x}", id),
                ));
            }
            if let Some(slot) = index.entries.last_mut() {
                *slot = entry;
            }
        }
        Ok(index)
    }
}

impl ObjectIndex for MemoryIndex {
    fn get(&self, id: ObjectId) -> Option<&IndexEntry> {
        self.slots.get(&id).map(|&i| &self.entries[i])
    }

    fn get_mut(&mut self, id: ObjectId) -> Option<&mut IndexEntry> {
        match self.slots.get(&id) {
            Some(&i) => Some(&mut self.entries[i]),
            None => None,
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(path) = &self.persist_path {
            info!("Persisting {} index entries to {}", self.len(), path.display());
            let mut out = BufWriter::new(File::create(path)?);
            self.write_to(&mut out)?;
            out.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_counting_ignores_repeats() {
        let mut e = IndexEntry::new(0x10);
        assert!(!e.add_reference(7));
        assert!(!e.add_reference(7));
        assert_eq!(e.reference_count(), 1);
        assert!(e.has_single_parent());
        assert!(e.add_reference(9));
        assert!(!e.add_reference(11));
        assert_eq!(e.reference_count(), 3);
        assert!(!e.has_single_parent());
    }

    #[test]
    fn test_retained_seed_encoding() {
        let mut e = IndexEntry::new(0x10);
        assert_eq!(e.retained_seed(), RetainedSeed::Unset);
        e.set_retained_seed(RetainedSeed::Pending);
        assert_eq!(e.retained_seed(), RetainedSeed::Pending);
        e.set_retained_seed(RetainedSeed::Bytes(48));
        assert_eq!(e.retained_seed(), RetainedSeed::Bytes(48));
    }

    #[test]
    fn test_insert_rejects_duplicates_and_null() {
        let mut index = MemoryIndex::new();
        assert!(index.insert(1, 0x10));
        assert!(!index.insert(1, 0x20));
        assert!(!index.insert(0, 0x30));
        assert_eq!(index.len(), 1);
        assert_eq!(index.get(1).unwrap().offset(), 0x10);
        assert!(index.get(2).is_none());
    }

    #[test]
    fn test_write_read_round_trip() {
        let mut index = MemoryIndex::new();
        index.insert(0x100, 0x10);
        index.insert(0x200, 0x28);
        {
            let e = index.get_mut(0x200).unwrap();
            e.add_reference(0x100);
            e.set_nearest_root_pointer(0x100);
            e.set_tree_object();
            e.set_retained_seed(RetainedSeed::Bytes(24));
        }
        let mut bytes = vec![];
        index.write_to(&mut bytes).unwrap();
        let restored = MemoryIndex::read_from(&mut bytes.as_slice()).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.get(0x200), index.get(0x200));
        assert_eq!(restored.get(0x100), index.get(0x100));
    }

    #[test]
    fn test_flush_persists_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.bin");
        let mut index = MemoryIndex::new();
        index.insert(0x100, 0x10);
        index.persist_on_flush(&path);
        index.flush().unwrap();
        let mut file = File::open(&path).unwrap();
        let restored = MemoryIndex::read_from(&mut file).unwrap();
        assert_eq!(restored.len(), 1);
    }
}
