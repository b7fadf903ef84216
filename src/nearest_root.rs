//! Compute-once access to the nearest GC roots of a snapshot
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use once_cell::sync::OnceCell;

use crate::constants::DEFAULT_CHUNK_LEN;
use crate::object_model::{HeapGraph, ObjectId, ObjectIndex};
use crate::trace::{self, ReachabilityOutputs, TraversalStats};
use crate::util::LongBuffer;
use crate::{ReachabilityError, SharedError};

#[derive(Debug, Clone)]
pub struct ReachabilityOptions {
    /// Values kept in memory per buffer before spilling to disk
    pub chunk_len: usize,
    /// Where spilled chunks go, the system temp dir if `None`
    pub spill_dir: Option<PathBuf>,
}

impl Default for ReachabilityOptions {
    fn default() -> Self {
        ReachabilityOptions {
            chunk_len: DEFAULT_CHUNK_LEN,
            spill_dir: None,
        }
    }
}

/// Runs the traversal at most once and hands out its results
///
/// Concurrent callers of `compute_reachability` block until the single
/// computation finishes. A failure is kept as well: it is reported to every
/// caller and never retried.
pub struct NearestGcRoot<G, I> {
    graph: G,
    index: RwLock<I>,
    options: ReachabilityOptions,
    outputs: OnceCell<Result<ReachabilityOutputs, SharedError>>,
}

impl<G: HeapGraph, I: ObjectIndex> NearestGcRoot<G, I> {
    pub fn new(graph: G, index: I, options: ReachabilityOptions) -> Self {
        NearestGcRoot {
            graph,
            index: RwLock::new(index),
            options,
            outputs: OnceCell::new(),
        }
    }

    pub fn compute_reachability(&self) -> Result<&ReachabilityOutputs, SharedError> {
        self.outputs
            .get_or_init(|| {
                let mut index = self.index.write().unwrap_or_else(PoisonError::into_inner);
                trace::compute(&self.graph, &mut *index, &self.options).map_err(|e| {
                    error!("Nearest GC root computation failed: {}", e);
                    Arc::new(e)
                })
            })
            .as_ref()
            .map_err(Arc::clone)
    }

    /// Whether a computation finished successfully or was restored
    pub fn is_computed(&self) -> bool {
        matches!(self.outputs.get(), Some(Ok(_)))
    }

    pub fn leaves(&self) -> Result<&LongBuffer, SharedError> {
        Ok(self.compute_reachability()?.leaves())
    }

    pub fn multiple_parents(&self) -> Result<&LongBuffer, SharedError> {
        Ok(self.compute_reachability()?.multiple_parents())
    }

    pub fn stats(&self) -> Result<Option<TraversalStats>, SharedError> {
        Ok(self.compute_reachability()?.stats())
    }

    /// The object one step closer to a GC root. A root is its own nearest
    /// root, unreachable objects have none.
    pub fn nearest_root_pointer(&self, id: ObjectId) -> Result<Option<ObjectId>, SharedError> {
        if self.graph.is_root(id) {
            return Ok(Some(id));
        }
        self.compute_reachability()?;
        let index = self.index();
        Ok(index
            .get(id)
            .map(|e| e.nearest_root_pointer())
            .filter(|&p| p != 0))
    }

    /// `id` followed by its nearest root pointers up to and including the
    /// root, or `None` if `id` is unreachable
    pub fn path_to_root(&self, id: ObjectId) -> Result<Option<Vec<ObjectId>>, SharedError> {
        if self.graph.is_root(id) {
            return Ok(Some(vec![id]));
        }
        self.compute_reachability()?;
        let index = self.index();
        let mut path = vec![id];
        let mut current = id;
        for _ in 0..=self.graph.object_count() {
            if self.graph.is_root(current) {
                return Ok(Some(path));
            }
            match index.get(current).map(|e| e.nearest_root_pointer()) {
                Some(parent) if parent != 0 => {
                    path.push(parent);
                    current = parent;
                }
                _ => return Ok(None),
            }
        }
        Err(Arc::new(ReachabilityError::CorruptState(format!(
            "nearest root pointers of 0x{:x} do not lead to a root",
            id
        ))))
    }

    /// Shared access to the records, after the computation has run
    ///
    /// A read guard is only ever handed out once the gate is settled, so it
    /// can be held across any other call on the gate.
    pub fn index(&self) -> RwLockReadGuard<'_, I> {
        // a failure is reported by the output accessors
        let _ = self.compute_reachability();
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn graph(&self) -> &G {
        &self.graph
    }

    pub fn into_parts(self) -> (G, I) {
        let index = self
            .index
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        (self.graph, index)
    }

    /// Write the completion flag, then the leaves and multi-parent buffers
    /// if the computation completed
    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<(), ReachabilityError> {
        match self.outputs.get() {
            Some(Ok(outputs)) => {
                out.write_all(&[1])?;
                outputs.leaves.write_to(out)?;
                outputs.multiple_parents.write_to(out)?;
            }
            _ => out.write_all(&[0])?,
        }
        Ok(())
    }

    /// Restore from a stream written by `write_to`. The index must hold the
    /// records of the run that produced the stream.
    pub fn read_from<R: Read>(
        graph: G,
        index: I,
        options: ReachabilityOptions,
        input: &mut R,
    ) -> Result<Self, ReachabilityError> {
        let mut flag = [0u8; 1];
        input.read_exact(&mut flag)?;
        match flag[0] {
            0 => Ok(Self::new(graph, index, options)),
            1 => {
                let spill_dir = options.spill_dir.as_deref();
                let leaves = LongBuffer::read_from(input, spill_dir)?;
                let multiple_parents = LongBuffer::read_from(input, spill_dir)?;
                debug!(
                    "Restored {} leaves and {} multi-parent objects",
                    leaves.len(),
                    multiple_parents.len()
                );
                let outputs = ReachabilityOutputs {
                    leaves,
                    multiple_parents,
                    stats: None,
                };
                Ok(NearestGcRoot {
                    graph,
                    index: RwLock::new(index),
                    options,
                    outputs: OnceCell::with_value(Ok(outputs)),
                })
            }
            other => Err(ReachabilityError::CorruptState(format!(
                "invalid completion flag {}",
                other
            ))),
        }
    }
}
