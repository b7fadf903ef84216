#[macro_use]
extern crate log;

pub mod cli;
pub mod constants;
mod error;
pub mod export;
mod heapdump;
mod nearest_root;
mod object_model;
pub mod references;
mod sanity;
pub mod synthetic;
mod trace;
pub mod util;

pub use crate::error::{ReachabilityError, SharedError};
pub use crate::heapdump::{
    ClassDecl, FieldDecl, FieldValue, HeapDump, HeapObject, ObjectKind, RootEdge,
};
pub use crate::nearest_root::{NearestGcRoot, ReachabilityOptions};
pub use crate::object_model::{
    ClassId, DumpGraph, Edge, FieldRef, HeapGraph, HeapObjectRef, HeapSnapshot, IndexEntry,
    MemoryIndex, ObjectBody, ObjectId, ObjectIndex, RetainedSeed,
};
pub use crate::references::SpecialReferences;
pub use crate::sanity::{sanity_trace, verify_nearest_roots};
pub use crate::trace::{ReachabilityOutputs, TraversalStats};
pub use crate::util::LongBuffer;
