//! Seeding of the retained size summation
//!
//! A leaf contributes its own size. If it has exactly one parent, that
//! parent is queued so a later pass can add the sizes of its subtree. The
//! chain deliberately stops at objects with more than one parent.
use crate::object_model::{ObjectId, ObjectIndex, RetainedSeed};
use crate::util::LongBuffer;
use crate::ReachabilityError;

/// Replay the (id, size) pairs collected during the traversal through
/// `mark_leaf`, once every reference count is final. Returns the number of
/// parents queued into `leaves`.
pub(super) fn seed_leaves<I: ObjectIndex>(
    index: &mut I,
    candidates: &mut LongBuffer,
    leaves: &mut LongBuffer,
) -> Result<u64, ReachabilityError> {
    candidates.rewind_for_reading();
    let mut queued = 0;
    while let Some(id) = candidates.next()? {
        let size = candidates.next()?.ok_or_else(|| {
            ReachabilityError::CorruptState(format!("leaf 0x{:x} recorded without a size", id))
        })?;
        if mark_leaf(index, leaves, id, size)? {
            queued += 1;
        }
    }
    candidates.reset();
    Ok(queued)
}

/// Flag `id` as a leaf of `size` bytes, and queue its parent if `id` has a
/// single parent whose seed is still unset. Returns whether the parent got
/// queued.
pub(super) fn mark_leaf<I: ObjectIndex>(
    index: &mut I,
    leaves: &mut LongBuffer,
    id: ObjectId,
    size: u64,
) -> Result<bool, ReachabilityError> {
    let entry = match index.get_mut(id) {
        Some(e) => e,
        None => return Ok(false),
    };
    entry.set_tree_object();
    entry.set_retained_seed(RetainedSeed::Bytes(size));
    if !entry.has_single_parent() {
        return Ok(false);
    }
    let parent = entry.nearest_root_pointer();
    if parent == 0 {
        return Ok(false);
    }
    match index.get_mut(parent) {
        Some(p) if p.retained_seed() == RetainedSeed::Unset => {
            p.set_retained_seed(RetainedSeed::Pending);
            leaves.append(parent)?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_model::MemoryIndex;

    fn index_with_chain() -> MemoryIndex {
        // 0x10 <- 0x20 <- 0x30, plus 0x40 referenced by both 0x10 and 0x20
        let mut index = MemoryIndex::new();
        for id in [0x10, 0x20, 0x30, 0x40] {
            index.insert(id, id * 2);
        }
        let e = index.get_mut(0x20).unwrap();
        e.add_reference(0x10);
        e.set_nearest_root_pointer(0x10);
        let e = index.get_mut(0x30).unwrap();
        e.add_reference(0x20);
        e.set_nearest_root_pointer(0x20);
        let e = index.get_mut(0x40).unwrap();
        e.add_reference(0x10);
        e.add_reference(0x20);
        e.set_nearest_root_pointer(0x10);
        index
    }

    #[test]
    fn test_single_parent_leaf_queues_parent_once() {
        let mut index = index_with_chain();
        let mut leaves = LongBuffer::new(4, None);
        assert!(mark_leaf(&mut index, &mut leaves, 0x30, 40).unwrap());
        let leaf = index.get(0x30).unwrap();
        assert!(leaf.is_leaf());
        assert_eq!(leaf.retained_seed(), RetainedSeed::Bytes(40));
        assert_eq!(
            index.get(0x20).unwrap().retained_seed(),
            RetainedSeed::Pending
        );
        // the parent is queued only once
        assert!(!mark_leaf(&mut index, &mut leaves, 0x30, 40).unwrap());
        assert_eq!(leaves.len(), 1);
    }

    #[test]
    fn test_multi_parent_leaf_stops_the_chain() {
        let mut index = index_with_chain();
        let mut leaves = LongBuffer::new(4, None);
        assert!(!mark_leaf(&mut index, &mut leaves, 0x40, 16).unwrap());
        assert!(index.get(0x40).unwrap().is_leaf());
        assert_eq!(index.get(0x10).unwrap().retained_seed(), RetainedSeed::Unset);
        assert!(leaves.is_empty());
    }

    #[test]
    fn test_root_leaf_has_nothing_to_queue() {
        let mut index = index_with_chain();
        let mut leaves = LongBuffer::new(4, None);
        assert!(!mark_leaf(&mut index, &mut leaves, 0x10, 16).unwrap());
        assert!(leaves.is_empty());
    }

    #[test]
    fn test_seed_leaves_replays_pairs() {
        let mut index = index_with_chain();
        let mut candidates = LongBuffer::new(3, None);
        for v in [0x30, 40, 0x40, 16, 0x20, 8] {
            candidates.append(v).unwrap();
        }
        let mut leaves = LongBuffer::new(3, None);
        let queued = seed_leaves(&mut index, &mut candidates, &mut leaves).unwrap();
        // 0x30 queues 0x20, 0x40 is shared, 0x20 queues 0x10
        assert_eq!(queued, 2);
        let ids: Vec<u64> = leaves.replay().map(|v| v.unwrap()).collect();
        assert_eq!(ids, vec![0x20, 0x10]);
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_odd_candidate_stream_is_corrupt() {
        let mut index = index_with_chain();
        let mut candidates = LongBuffer::new(3, None);
        candidates.append(0x30).unwrap();
        let mut leaves = LongBuffer::new(3, None);
        assert!(matches!(
            seed_leaves(&mut index, &mut candidates, &mut leaves),
            Err(ReachabilityError::CorruptState(_))
        ));
    }
}
