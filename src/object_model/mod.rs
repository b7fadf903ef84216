use crate::ReachabilityError;

mod index;
mod snapshot;
pub use index::{IndexEntry, MemoryIndex, ObjectIndex, RetainedSeed};
pub use snapshot::{DumpGraph, HeapSnapshot};

pub type ObjectId = u64;
pub type ClassId = u64;

/// A field as declared by a class
///
/// Subclasses inherit the declaring class' `FieldRef`, so the same field is
/// recognised on instances of any class below the declaring one.
#[derive(Hash, PartialEq, Eq, Clone, Copy, Debug)]
pub struct FieldRef {
    pub class: ClassId,
    pub index: u32,
}

/// One outgoing reference of an object
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct Edge {
    /// `None` for array elements
    pub field: Option<FieldRef>,
    pub target: ObjectId,
}

/// The shape of an object, as far as reachability is concerned
#[derive(Clone, Copy, Debug)]
pub enum ObjectBody<'a> {
    Instance(&'a [crate::heapdump::FieldValue]),
    ObjectArray(&'a [ObjectId]),
    PrimitiveArray,
    /// Static field values of the described class
    ClassMetadata(&'a [crate::heapdump::FieldValue]),
}

impl ObjectBody<'_> {
    /// Enumerate outgoing edges in order: array elements by index, fields by
    /// declaration order. Null references are included with target 0.
    pub fn scan_edges<F>(&self, mut callback: F)
    where
        F: FnMut(Edge),
    {
        match self {
            ObjectBody::ObjectArray(elements) => {
                for e in elements.iter() {
                    callback(Edge {
                        field: None,
                        target: *e,
                    });
                }
            }
            ObjectBody::Instance(fields) | ObjectBody::ClassMetadata(fields) => {
                for f in fields.iter() {
                    callback(Edge {
                        field: Some(FieldRef {
                            class: f.declaring_class,
                            index: f.index,
                        }),
                        target: f.objref,
                    });
                }
            }
            ObjectBody::PrimitiveArray => {}
        }
    }

    /// Whether the object carries an implicit reference to its class
    pub fn links_class(&self) -> bool {
        matches!(self, ObjectBody::Instance(_) | ObjectBody::ClassMetadata(_))
    }
}

/// An object resolved through a `HeapGraph`
#[derive(Clone, Copy, Debug)]
pub struct HeapObjectRef<'a> {
    pub id: ObjectId,
    pub offset: u64,
    pub class: ClassId,
    pub size: u64,
    pub body: ObjectBody<'a>,
}

/// Read-only view of a heap snapshot's object graph
pub trait HeapGraph {
    /// GC roots in dump order, possibly with duplicates
    fn roots(&self) -> &[ObjectId];
    fn is_root(&self, id: ObjectId) -> bool;
    /// Resolve the object stored at `offset`
    ///
    /// Returns `Ok(None)` if nothing lives there, and an error if the object
    /// is of a kind this crate does not understand.
    fn object_at(&self, offset: u64) -> Result<Option<HeapObjectRef<'_>>, ReachabilityError>;
    fn class_by_name(&self, name: &str) -> Option<ClassId>;
    /// Look up an instance field declared by `class` itself
    fn declared_field(&self, class: ClassId, name: &str) -> Option<FieldRef>;
    /// All classes transitively extending `class`, excluding `class`
    fn subclasses(&self, class: ClassId) -> Vec<ClassId>;
    fn object_count(&self) -> usize;
}
