//! Level-synchronous breadth-first search from the GC roots
//!
//! Each level is replayed from one `LongBuffer` while the next level is
//! appended to another. Every object reached for the first time records the
//! object that reached it as its nearest root pointer, so following pointers
//! always leads back to a root along a shortest discovered path.
use std::collections::HashSet;
use std::time::Instant;

use crate::nearest_root::ReachabilityOptions;
use crate::object_model::{ClassId, HeapGraph, ObjectBody, ObjectId, ObjectIndex};
use crate::references::SpecialReferences;
use crate::util::LongBuffer;
use crate::ReachabilityError;

mod leaves;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TraversalStats {
    pub levels: u64,
    pub expanded: u64,
    pub claimed: u64,
    pub leaves: u64,
    /// Leaves whose parent got queued for retained size summation
    pub pending_parents: u64,
    pub multiple_parents: u64,
    /// Frontier offsets and references that resolve to nothing
    pub dangling: u64,
}

/// Results of a completed traversal
#[derive(Debug)]
pub struct ReachabilityOutputs {
    pub(crate) leaves: LongBuffer,
    pub(crate) multiple_parents: LongBuffer,
    pub(crate) stats: Option<TraversalStats>,
}

impl ReachabilityOutputs {
    /// Ids of objects queued for retained size summation: the single parent
    /// of every single-parent leaf, each id at most once
    pub fn leaves(&self) -> &LongBuffer {
        &self.leaves
    }

    /// Ids of objects referenced by more than one object, each id once
    pub fn multiple_parents(&self) -> &LongBuffer {
        &self.multiple_parents
    }

    /// `None` when the outputs were restored rather than computed
    pub fn stats(&self) -> Option<TraversalStats> {
        self.stats
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
enum Claim {
    /// First reference to the object, which now points back to the claimer
    Claimed,
    /// The object is a root or was reached before
    Known,
    /// Null, or not in the index
    Missing,
}

pub(crate) fn compute<G: HeapGraph, I: ObjectIndex>(
    graph: &G,
    index: &mut I,
    options: &ReachabilityOptions,
) -> Result<ReachabilityOutputs, ReachabilityError> {
    let references = SpecialReferences::locate(graph)?;
    Frontier::new(graph, index, references, options).run()
}

struct Frontier<'a, G: HeapGraph, I: ObjectIndex> {
    graph: &'a G,
    index: &'a mut I,
    references: SpecialReferences,
    read: LongBuffer,
    write: LongBuffer,
    /// (id, size) of every leaf, seeded once the traversal is done
    leaf_candidates: LongBuffer,
    leaves: LongBuffer,
    multiple_parents: LongBuffer,
    linked_classes: HashSet<ClassId>,
    stats: TraversalStats,
}

impl<'a, G: HeapGraph, I: ObjectIndex> Frontier<'a, G, I> {
    fn new(
        graph: &'a G,
        index: &'a mut I,
        references: SpecialReferences,
        options: &ReachabilityOptions,
    ) -> Self {
        let buffer = || LongBuffer::new(options.chunk_len, options.spill_dir.as_deref());
        Frontier {
            graph,
            index,
            references,
            read: buffer(),
            write: buffer(),
            leaf_candidates: buffer(),
            leaves: buffer(),
            multiple_parents: buffer(),
            linked_classes: HashSet::new(),
            stats: Default::default(),
        }
    }

    fn run(mut self) -> Result<ReachabilityOutputs, ReachabilityError> {
        let start = Instant::now();
        self.fill_zero_level()?;
        while self.write.has_pending() {
            self.switch_buffers();
            debug!(
                "Level {}: expanding {} objects",
                self.stats.levels,
                self.read.len()
            );
            self.compute_one_level()?;
            // Both halves of the level pair are drained now
            self.read.reset();
            self.stats.levels += 1;
        }
        self.stats.pending_parents =
            leaves::seed_leaves(&mut *self.index, &mut self.leaf_candidates, &mut self.leaves)?;
        self.index.flush()?;
        info!(
            "Nearest GC roots of {} objects computed in {} levels, {} ms",
            self.stats.expanded,
            self.stats.levels,
            start.elapsed().as_micros() as f64 / 1000f64
        );
        Ok(ReachabilityOutputs {
            leaves: self.leaves,
            multiple_parents: self.multiple_parents,
            stats: Some(self.stats),
        })
    }

    fn fill_zero_level(&mut self) -> Result<(), ReachabilityError> {
        let mut seeded = HashSet::new();
        for &root in self.graph.roots() {
            if !seeded.insert(root) {
                continue;
            }
            match self.index.get(root) {
                Some(entry) => {
                    let offset = entry.offset();
                    self.write.append(offset)?;
                }
                None => {
                    warn!("GC root 0x{:x} is not in the heap dump", root);
                    self.stats.dangling += 1;
                }
            }
        }
        Ok(())
    }

    fn switch_buffers(&mut self) {
        std::mem::swap(&mut self.read, &mut self.write);
        self.read.rewind_for_reading();
        self.write.reset();
    }

    fn compute_one_level(&mut self) -> Result<(), ReachabilityError> {
        while let Some(offset) = self.read.next()? {
            self.expand(offset)?;
        }
        Ok(())
    }

    fn expand(&mut self, offset: u64) -> Result<(), ReachabilityError> {
        let graph = self.graph;
        let object = match graph.object_at(offset)? {
            Some(o) => o,
            None => {
                warn!("No object at offset 0x{:x}, skipping it", offset);
                self.stats.dangling += 1;
                return Ok(());
            }
        };
        self.stats.expanded += 1;
        let mut has_values = false;
        if !matches!(object.body, ObjectBody::PrimitiveArray) {
            let mut result = Ok(());
            object.body.scan_edges(|edge| {
                if result.is_err() || self.references.is_excluded(object.class, edge.field) {
                    return;
                }
                match self.claim(object.id, edge.target) {
                    Ok(Claim::Missing) => {}
                    Ok(_) => has_values = true,
                    Err(e) => result = Err(e),
                }
            });
            result?;
            if object.body.links_class() && self.link_class(object.id, object.class)? {
                has_values = true;
            }
        }
        if !has_values {
            self.leaf_candidates.append(object.id)?;
            self.leaf_candidates.append(object.size)?;
            self.stats.leaves += 1;
        }
        Ok(())
    }

    /// The first object of each class to be expanded references the class
    /// metadata object. Only a new claim makes the edge count.
    fn link_class(&mut self, parent: ObjectId, class: ClassId) -> Result<bool, ReachabilityError> {
        if class == 0 || !self.linked_classes.insert(class) {
            return Ok(false);
        }
        Ok(self.claim(parent, class)? == Claim::Claimed)
    }

    fn claim(&mut self, parent: ObjectId, target: ObjectId) -> Result<Claim, ReachabilityError> {
        if target == 0 {
            return Ok(Claim::Missing);
        }
        let is_root = self.graph.is_root(target);
        let entry = match self.index.get_mut(target) {
            Some(entry) => entry,
            None => {
                trace!("0x{:x} references 0x{:x} outside the dump", parent, target);
                self.stats.dangling += 1;
                return Ok(Claim::Missing);
            }
        };
        let became_shared = entry.add_reference(parent);
        let claimed = entry.nearest_root_pointer() == 0 && !is_root;
        if claimed {
            entry.set_nearest_root_pointer(parent);
        }
        let offset = entry.offset();
        if became_shared {
            self.multiple_parents.append(target)?;
            self.stats.multiple_parents += 1;
        }
        if claimed {
            self.write.append(offset)?;
            self.stats.claimed += 1;
            Ok(Claim::Claimed)
        } else {
            Ok(Claim::Known)
        }
    }
}
