//! Synthesized heap dumps
//!
//! Useful for trying out the traversal without a real heap dump, and for
//! building small, exact object graphs in tests.
use std::collections::HashMap;

use crate::heapdump::*;
use crate::object_model::{ClassId, FieldRef, ObjectId};

const HEADER_BYTES: u64 = 16;
const FIRST_ID: u64 = 0x1000;

/// Builds a `HeapDump` object by object
///
/// Ids are handed out in increasing order. Classes get a class metadata
/// object only when `class_object` is called for them.
#[derive(Default)]
pub struct HeapDumpBuilder {
    dump: HeapDump,
    next_id: u64,
    objects: HashMap<ObjectId, usize>,
    classes: HashMap<ClassId, usize>,
}

/// The `java.lang.ref` classes of a HotSpot heap
#[derive(Debug, Clone, Copy)]
pub struct JavaLangRef {
    pub reference: ClassId,
    pub weak: ClassId,
    pub soft: ClassId,
    pub final_ref: ClassId,
    pub phantom: ClassId,
}

impl HeapDumpBuilder {
    pub fn new() -> Self {
        HeapDumpBuilder {
            next_id: FIRST_ID,
            ..Default::default()
        }
    }

    /// A builder already holding the HotSpot reference classes
    pub fn hotspot() -> (Self, JavaLangRef) {
        let mut b = Self::new();
        let refs = b.java_lang_ref();
        (b, refs)
    }

    fn fresh_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 0x10;
        id
    }

    pub fn class(&mut self, name: &str, super_class: ClassId, fields: &[&str]) -> ClassId {
        let id = self.fresh_id();
        self.classes.insert(id, self.dump.classes.len());
        self.dump.classes.push(ClassDecl {
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
        });
        id
    }

    pub fn java_lang_ref(&mut self) -> JavaLangRef {
        let reference = self.class("java.lang.ref.Reference", 0, &["referent", "queue"]);
        JavaLangRef {
            reference,
            weak: self.class("java.lang.ref.WeakReference", reference, &[]),
            soft: self.class("java.lang.ref.SoftReference", reference, &[]),
            final_ref: self.class("java.lang.ref.FinalReference", reference, &[]),
            phantom: self.class("java.lang.ref.PhantomReference", reference, &[]),
        }
    }

    /// Instance fields of `class` in declaration order, superclass fields
    /// first
    pub fn fields_of(&self, class: ClassId) -> Vec<FieldRef> {
        let mut chain = vec![];
        let mut c = class;
        while let Some(&i) = self.classes.get(&c) {
            chain.push(i);
            c = self.dump.classes[i].super_class;
        }
        let mut fields = vec![];
        for &i in chain.iter().rev() {
            let decl = &self.dump.classes[i];
            for index in 0..decl.fields.len() {
                fields.push(FieldRef {
                    class: decl.id,
                    index: index as u32,
                });
            }
        }
        fields
    }

    fn push_object(&mut self, object: HeapObject) -> ObjectId {
        let id = object.id;
        self.objects.insert(id, self.dump.objects.len());
        self.dump.objects.push(object);
        id
    }

    fn object_mut(&mut self, id: ObjectId) -> &mut HeapObject {
        let i = self.objects[&id];
        &mut self.dump.objects[i]
    }

    /// An instance with all of its reference fields null
    pub fn instance(&mut self, class: ClassId) -> ObjectId {
        let fields: Vec<FieldValue> = self
            .fields_of(class)
            .into_iter()
            .map(|f| FieldValue {
                declaring_class: f.class,
                index: f.index,
                objref: 0,
            })
            .collect();
        let id = self.fresh_id();
        self.push_object(HeapObject {
            id,
            klass: class,
            size: HEADER_BYTES + 8 * fields.len() as u64,
            kind: ObjectKind::Instance as i32,
            fields,
            elements: vec![],
        })
    }

    /// Assign reference fields in declaration order
    pub fn set_refs(&mut self, object: ObjectId, targets: &[ObjectId]) {
        let o = self.object_mut(object);
        assert!(
            targets.len() <= o.fields.len(),
            "0x{:x} has only {} reference fields",
            object,
            o.fields.len()
        );
        for (f, t) in o.fields.iter_mut().zip(targets) {
            f.objref = *t;
        }
    }

    /// Assign the field `name` declared by `declaring`
    pub fn set_field(&mut self, object: ObjectId, declaring: ClassId, name: &str, target: ObjectId) {
        let i = self.classes[&declaring];
        let index = self.dump.classes[i]
            .fields
            .iter()
            .position(|f| f.name == name)
            .unwrap_or_else(|| panic!("no field {} in class 0x{:x}", name, declaring))
            as u32;
        let o = self.object_mut(object);
        let f = o
            .fields
            .iter_mut()
            .find(|f| f.declaring_class == declaring && f.index == index)
            .unwrap_or_else(|| panic!("0x{:x} has no field {}", object, name));
        f.objref = target;
    }

    pub fn object_array(&mut self, elements: &[ObjectId]) -> ObjectId {
        let id = self.fresh_id();
        self.push_object(HeapObject {
            id,
            klass: 0,
            size: HEADER_BYTES + 8 * elements.len() as u64,
            kind: ObjectKind::ObjectArray as i32,
            fields: vec![],
            elements: elements.to_vec(),
        })
    }

    pub fn set_elements(&mut self, array: ObjectId, elements: &[ObjectId]) {
        let o = self.object_mut(array);
        o.size = HEADER_BYTES + 8 * elements.len() as u64;
        o.elements = elements.to_vec();
    }

    pub fn primitive_array(&mut self, bytes: u64) -> ObjectId {
        let id = self.fresh_id();
        self.push_object(HeapObject {
            id,
            klass: 0,
            size: HEADER_BYTES + bytes,
            kind: ObjectKind::PrimitiveArray as i32,
            fields: vec![],
            elements: vec![],
        })
    }

    /// Materialize the class metadata object of `class`, holding `statics`
    /// as its static reference fields
    pub fn class_object(&mut self, class: ClassId, statics: &[ObjectId]) -> ObjectId {
        let i = self.classes[&class];
        self.dump.classes[i].static_fields = (0..statics.len())
            .map(|n| FieldDecl {
                name: format!("static{}", n),
            })
            .collect();
        let fields = statics
            .iter()
            .enumerate()
            .map(|(n, t)| FieldValue {
                declaring_class: class,
                index: n as u32,
                objref: *t,
            })
            .collect();
        self.push_object(HeapObject {
            id: class,
            klass: 0,
            size: HEADER_BYTES + 8 * statics.len() as u64,
            kind: ObjectKind::ClassMetadata as i32,
            fields,
            elements: vec![],
        })
    }

    /// An object of a kind no heap dump producer emits
    pub fn unsupported_object(&mut self, kind: i32) -> ObjectId {
        let id = self.fresh_id();
        self.push_object(HeapObject {
            id,
            klass: 0,
            size: HEADER_BYTES,
            kind,
            fields: vec![],
            elements: vec![],
        })
    }

    pub fn root(&mut self, object: ObjectId) {
        self.root_with_kind(object, "unknown");
    }

    pub fn root_with_kind(&mut self, object: ObjectId, kind: &str) {
        self.dump.roots.push(RootEdge {
            objref: object,
            kind: kind.to_string(),
        });
    }

    pub fn finish(self) -> HeapDump {
        self.dump
    }
}

/// `length` nodes, each pointing to the next, rooted at the head
pub fn linked_list(length: usize) -> HeapDump {
    let (mut b, _) = HeapDumpBuilder::hotspot();
    let node = b.class("Node", 0, &["next"]);
    b.class_object(node, &[]);
    let nodes: Vec<ObjectId> = (0..length).map(|_| b.instance(node)).collect();
    for pair in nodes.windows(2) {
        b.set_refs(pair[0], &[pair[1]]);
    }
    if let Some(&head) = nodes.first() {
        b.root_with_kind(head, "thread");
    }
    b.finish()
}

/// A complete binary tree whose leaves hold a small primitive array
pub fn binary_tree(depth: u32) -> HeapDump {
    let (mut b, _) = HeapDumpBuilder::hotspot();
    let node = b.class("TreeNode", 0, &["left", "right", "payload"]);
    b.class_object(node, &[]);
    let root = build_tree(&mut b, node, depth);
    b.root_with_kind(root, "thread");
    b.finish()
}

fn build_tree(b: &mut HeapDumpBuilder, node: ClassId, depth: u32) -> ObjectId {
    let o = b.instance(node);
    if depth == 0 {
        let payload = b.primitive_array(32);
        b.set_refs(o, &[0, 0, payload]);
    } else {
        let left = build_tree(b, node, depth - 1);
        let right = build_tree(b, node, depth - 1);
        b.set_refs(o, &[left, right]);
    }
    o
}

/// `width` rooted holders all pointing to one shared object
pub fn fan_in(width: usize) -> HeapDump {
    let (mut b, _) = HeapDumpBuilder::hotspot();
    let holder = b.class("Holder", 0, &["shared"]);
    b.class_object(holder, &[]);
    let shared = b.primitive_array(64);
    for _ in 0..width {
        let h = b.instance(holder);
        b.set_refs(h, &[shared]);
        b.root_with_kind(h, "jni-global");
    }
    b.finish()
}
