use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::Result;

use super::*;
use crate::constants::{DUMP_BASE_OFFSET, OBJECT_ALIGNMENT};
use crate::heapdump::{ClassDecl, HeapDump, HeapObject, ObjectKind};
use crate::util::align_up;

/// A `HeapGraph` over a decoded heap dump
///
/// Objects are laid out back to back in dump order, each at a word aligned
/// offset, so offsets behave like positions in a serialized dump.
#[derive(Debug)]
pub struct DumpGraph {
    objects: Vec<HeapObject>,
    offsets: Vec<u64>,
    roots: Vec<ObjectId>,
    root_set: HashSet<ObjectId>,
    root_kinds: HashMap<ObjectId, String>,
    classes: HashMap<ClassId, ClassDecl>,
    class_names: HashMap<String, ClassId>,
    direct_subclasses: HashMap<ClassId, Vec<ClassId>>,
}

impl DumpGraph {
    /// Build the graph and a fresh index mapping every object to its offset
    pub fn from_heapdump(heapdump: HeapDump) -> (DumpGraph, MemoryIndex) {
        let mut index = MemoryIndex::new();
        let mut offsets = Vec::with_capacity(heapdump.objects.len());
        let mut cursor = DUMP_BASE_OFFSET;
        for o in &heapdump.objects {
            if !index.insert(o.id, cursor) {
                warn!("Object 0x{:x} at offset 0x{:x} is not indexed", o.id, cursor);
            }
            offsets.push(cursor);
            cursor += align_up(o.size.max(OBJECT_ALIGNMENT), OBJECT_ALIGNMENT);
        }

        let mut roots = Vec::with_capacity(heapdump.roots.len());
        let mut root_kinds = HashMap::new();
        for r in heapdump.roots {
            if r.objref == 0 {
                continue;
            }
            roots.push(r.objref);
            root_kinds.entry(r.objref).or_insert(r.kind);
        }
        let root_set = roots.iter().copied().collect();

        let mut class_names = HashMap::new();
        let mut direct_subclasses: HashMap<ClassId, Vec<ClassId>> = HashMap::new();
        let mut classes = HashMap::new();
        for c in heapdump.classes {
            class_names.entry(c.name.clone()).or_insert(c.id);
            if c.super_class != 0 {
                direct_subclasses.entry(c.super_class).or_default().push(c.id);
            }
            classes.insert(c.id, c);
        }

        let graph = DumpGraph {
            objects: heapdump.objects,
            offsets,
            roots,
            root_set,
            root_kinds,
            classes,
            class_names,
            direct_subclasses,
        };
        (graph, index)
    }

    /// Kind of GC root `id` is, if it is one
    pub fn root_kind(&self, id: ObjectId) -> Option<&str> {
        self.root_kinds.get(&id).map(|s| s.as_str())
    }

    pub fn class_name(&self, class: ClassId) -> Option<&str> {
        self.classes.get(&class).map(|c| c.name.as_str())
    }

    /// Every object in dump order, with its offset
    pub fn objects(&self) -> impl Iterator<Item = (u64, &HeapObject)> + '_ {
        self.offsets.iter().copied().zip(self.objects.iter())
    }
}

impl HeapGraph for DumpGraph {
    fn roots(&self) -> &[ObjectId] {
        &self.roots
    }

    fn is_root(&self, id: ObjectId) -> bool {
        self.root_set.contains(&id)
    }

    fn object_at(&self, offset: u64) -> Result<Option<HeapObjectRef<'_>>, ReachabilityError> {
        let i = match self.offsets.binary_search(&offset) {
            Ok(i) => i,
            Err(_) => return Ok(None),
        };
        let o = &self.objects[i];
        let body = match ObjectKind::from_i32(o.kind) {
            Some(ObjectKind::Instance) => ObjectBody::Instance(&o.fields),
            Some(ObjectKind::ObjectArray) => ObjectBody::ObjectArray(&o.elements),
            Some(ObjectKind::PrimitiveArray) => ObjectBody::PrimitiveArray,
            Some(ObjectKind::ClassMetadata) => ObjectBody::ClassMetadata(&o.fields),
            None => {
                return Err(ReachabilityError::UnsupportedObjectKind {
                    id: o.id,
                    offset,
                    kind: o.kind,
                })
            }
        };
        Ok(Some(HeapObjectRef {
            id: o.id,
            offset,
            class: o.klass,
            size: o.size,
            body,
        }))
    }

    fn class_by_name(&self, name: &str) -> Option<ClassId> {
        self.class_names.get(name).copied()
    }

    fn declared_field(&self, class: ClassId, name: &str) -> Option<FieldRef> {
        let decl = self.classes.get(&class)?;
        decl.fields
            .iter()
            .position(|f| f.name == name)
            .map(|i| FieldRef {
                class,
                index: i as u32,
            })
    }

    fn subclasses(&self, class: ClassId) -> Vec<ClassId> {
        let mut found = vec![];
        let mut seen = HashSet::new();
        let mut stack = vec![class];
        while let Some(c) = stack.pop() {
            if let Some(children) = self.direct_subclasses.get(&c) {
                for &child in children {
                    if child != class && seen.insert(child) {
                        found.push(child);
                        stack.push(child);
                    }
                }
            }
        }
        found
    }

    fn object_count(&self) -> usize {
        self.objects.len()
    }
}

/// A heap dump loaded into memory: the object graph plus its object index
#[derive(Debug)]
pub struct HeapSnapshot {
    pub graph: DumpGraph,
    pub index: MemoryIndex,
}

impl HeapSnapshot {
    pub fn from_heapdump(heapdump: HeapDump) -> Self {
        let (graph, index) = DumpGraph::from_heapdump(heapdump);
        HeapSnapshot { graph, index }
    }

    pub fn open(p: impl AsRef<Path>) -> Result<Self> {
        let heapdump = HeapDump::from_binpb_zst(p)?;
        Ok(Self::from_heapdump(heapdump))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heapdump::{FieldDecl, FieldValue};

    fn class(id: u64, name: &str, super_class: u64, fields: &[&str]) -> ClassDecl {
        ClassDecl {
            id,
            name: name.to_string(),
            super_class,
            fields: fields
                .iter()
                .map(|f| FieldDecl {
                    name: f.to_string(),
                })
                .collect(),
            static_fields: vec![],
        }
    }

    fn dump() -> HeapDump {
        HeapDump {
            objects: vec![
                HeapObject {
                    id: 0x100,
                    klass: 0x10,
                    size: 20,
                    kind: ObjectKind::Instance as i32,
                    fields: vec![FieldValue {
                        declaring_class: 0x10,
                        index: 0,
                        objref: 0x200,
                    }],
                    elements: vec![],
                },
                HeapObject {
                    id: 0x200,
                    klass: 0x11,
                    size: 4,
                    kind: ObjectKind::PrimitiveArray as i32,
                    ..Default::default()
                },
                HeapObject {
                    id: 0x300,
                    klass: 0x10,
                    size: 16,
                    kind: 9,
                    ..Default::default()
                },
            ],
            roots: vec![],
            classes: vec![
                class(0x10, "Base", 0, &["next"]),
                class(0x11, "Mid", 0x10, &[]),
                class(0x12, "Leaf", 0x11, &["value"]),
                class(0x13, "Other", 0, &[]),
            ],
        }
    }

    #[test]
    fn test_offsets_are_aligned_and_increasing() {
        let (graph, index) = DumpGraph::from_heapdump(dump());
        assert_eq!(index.get(0x100).unwrap().offset(), DUMP_BASE_OFFSET);
        // 20 bytes rounded up to 24
        assert_eq!(index.get(0x200).unwrap().offset(), DUMP_BASE_OFFSET + 24);
        // tiny objects still take a full word
        assert_eq!(index.get(0x300).unwrap().offset(), DUMP_BASE_OFFSET + 32);
        assert_eq!(graph.object_count(), 3);
    }

    #[test]
    fn test_object_at() {
        let (graph, _) = DumpGraph::from_heapdump(dump());
        let o = graph.object_at(DUMP_BASE_OFFSET).unwrap().unwrap();
        assert_eq!(o.id, 0x100);
        let mut edges = vec![];
        o.body.scan_edges(|e| edges.push(e));
        assert_eq!(
            edges,
            vec![Edge {
                field: Some(FieldRef {
                    class: 0x10,
                    index: 0
                }),
                target: 0x200
            }]
        );
        assert!(graph.object_at(DUMP_BASE_OFFSET + 8).unwrap().is_none());
        assert!(matches!(
            graph.object_at(DUMP_BASE_OFFSET + 24).unwrap().unwrap().body,
            ObjectBody::PrimitiveArray
        ));
    }

    #[test]
    fn test_unknown_kind_is_an_error() {
        let (graph, _) = DumpGraph::from_heapdump(dump());
        let err = graph.object_at(DUMP_BASE_OFFSET + 32).unwrap_err();
        assert!(matches!(
            err,
            ReachabilityError::UnsupportedObjectKind {
                id: 0x300,
                kind: 9,
                ..
            }
        ));
    }

    #[test]
    fn test_class_hierarchy() {
        let (graph, _) = DumpGraph::from_heapdump(dump());
        assert_eq!(graph.class_by_name("Mid"), Some(0x11));
        let mut subs = graph.subclasses(0x10);
        subs.sort();
        assert_eq!(subs, vec![0x11, 0x12]);
        assert!(graph.subclasses(0x13).is_empty());
        assert_eq!(
            graph.declared_field(0x10, "next"),
            Some(FieldRef {
                class: 0x10,
                index: 0
            })
        );
        // inherited fields are declared by the superclass only
        assert_eq!(graph.declared_field(0x12, "next"), None);
    }
}
