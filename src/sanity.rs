use std::collections::HashSet;

use crate::object_model::{HeapGraph, ObjectId, ObjectIndex};
use crate::references::SpecialReferences;
use crate::ReachabilityError;

/// Reachable set by a plain depth first search, independent of the
/// breadth-first traversal and its buffers
pub fn sanity_trace<G: HeapGraph, I: ObjectIndex>(
    graph: &G,
    index: &I,
    references: &SpecialReferences,
) -> Result<HashSet<ObjectId>, ReachabilityError> {
    let mut reachable_objects: HashSet<ObjectId> = HashSet::new();
    let mut mark_stack: Vec<ObjectId> = graph.roots().to_vec();
    while let Some(o) = mark_stack.pop() {
        if o == 0 || reachable_objects.contains(&o) {
            continue;
        }
        let offset = match index.get(o) {
            Some(e) => e.offset(),
            None => continue,
        };
        let obj = match graph.object_at(offset)? {
            Some(obj) => obj,
            None => continue,
        };
        reachable_objects.insert(o);
        obj.body.scan_edges(|edge| {
            if edge.target != 0 && !references.is_excluded(obj.class, edge.field) {
                mark_stack.push(edge.target);
            }
        });
        if obj.body.links_class() && obj.class != 0 {
            mark_stack.push(obj.class);
        }
    }
    Ok(reachable_objects)
}

/// Check the records left by a traversal against `reachable`. Returns the
/// number of inconsistent objects, each of which is logged.
pub fn verify_nearest_roots<G: HeapGraph, I: ObjectIndex>(
    graph: &G,
    index: &I,
    reachable: &HashSet<ObjectId>,
) -> usize {
    let mut errors = 0;
    for &o in reachable {
        if graph.is_root(o) {
            continue;
        }
        match index.get(o).map(|e| e.nearest_root_pointer()) {
            Some(p) if p != 0 => {
                if !reachable.contains(&p) {
                    error!("0x{:x} points to unreachable 0x{:x}", o, p);
                    errors += 1;
                }
            }
            _ => {
                error!("Reachable object 0x{:x} has no nearest root pointer", o);
                errors += 1;
            }
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nearest_root::{NearestGcRoot, ReachabilityOptions};
    use crate::synthetic::{self, HeapDumpBuilder};
    use crate::HeapSnapshot;

    #[test]
    fn test_sanity_trace_agrees_with_traversal() {
        let HeapSnapshot { graph, index } = HeapSnapshot::from_heapdump(synthetic::binary_tree(5));
        let references = SpecialReferences::locate(&graph).unwrap();
        let reachable = sanity_trace(&graph, &index, &references).unwrap();
        let gate = NearestGcRoot::new(graph, index, ReachabilityOptions::default());
        let stats = gate.stats().unwrap().unwrap();
        assert_eq!(reachable.len() as u64, stats.expanded);
        assert_eq!(verify_nearest_roots(gate.graph(), &*gate.index(), &reachable), 0);
    }

    #[test]
    fn test_referents_are_not_reachable() {
        let (mut b, refs) = HeapDumpBuilder::hotspot();
        let target = b.primitive_array(8);
        let weak = b.instance(refs.weak);
        b.set_field(weak, refs.reference, "referent", target);
        b.root(weak);
        let HeapSnapshot { graph, index } = HeapSnapshot::from_heapdump(b.finish());
        let references = SpecialReferences::locate(&graph).unwrap();
        let reachable = sanity_trace(&graph, &index, &references).unwrap();
        assert!(reachable.contains(&weak));
        assert!(!reachable.contains(&target));
    }

    #[test]
    fn test_untraversed_records_are_reported() {
        let HeapSnapshot { graph, index } = HeapSnapshot::from_heapdump(synthetic::linked_list(3));
        let references = SpecialReferences::locate(&graph).unwrap();
        let reachable = sanity_trace(&graph, &index, &references).unwrap();
        // three nodes plus the Node class object
        assert_eq!(reachable.len(), 4);
        // nothing computed yet: everything but the head lacks a pointer
        assert_eq!(verify_nearest_roots(&graph, &index, &reachable), 3);
    }
}
