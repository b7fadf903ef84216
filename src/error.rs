use std::sync::Arc;

use crate::references::{HOTSPOT_REFERENCE, SVM_REFERENCE};

#[derive(Debug, thiserror::Error)]
pub enum ReachabilityError {
    #[error(
        "reference field not found: neither {}.{} nor {}.{} is in the heap dump",
        HOTSPOT_REFERENCE.class_name,
        HOTSPOT_REFERENCE.field_name,
        SVM_REFERENCE.class_name,
        SVM_REFERENCE.field_name
    )]
    ReferenceFieldNotFound,

    #[error("object 0x{id:x} at offset 0x{offset:x} has unsupported kind {kind}")]
    UnsupportedObjectKind { id: u64, offset: u64, kind: i32 },

    #[error("reachability storage I/O failed: {0}")]
    Storage(#[from] std::io::Error),

    #[error("malformed reachability state: {0}")]
    CorruptState(String),
}

/// A failed computation is shared by every caller of the memoization gate
pub type SharedError = Arc<ReachabilityError>;
