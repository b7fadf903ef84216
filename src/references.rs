//! Weak, soft, final and phantom references
//!
//! The referent of such a reference object does not keep anything alive, so
//! the traversal must not follow it. Heap dumps from HotSpot use
//! `java.lang.ref.Reference.referent`, Native Image heaps use
//! `DiscoverableReference.rawReferent`.
use std::collections::HashSet;

use crate::object_model::{ClassId, FieldRef, HeapGraph};
use crate::ReachabilityError;

pub struct ReferenceConvention {
    pub class_name: &'static str,
    pub field_name: &'static str,
    /// Classes whose instances use the field. Empty means the declaring
    /// class and its subclasses.
    pub reference_classes: &'static [&'static str],
}

pub const HOTSPOT_REFERENCE: ReferenceConvention = ReferenceConvention {
    class_name: "java.lang.ref.Reference",
    field_name: "referent",
    reference_classes: &[
        "java.lang.ref.WeakReference",
        "java.lang.ref.SoftReference",
        "java.lang.ref.FinalReference",
        "java.lang.ref.PhantomReference",
    ],
};

pub const SVM_REFERENCE: ReferenceConvention = ReferenceConvention {
    class_name: "com.oracle.svm.core.heap.heapImpl.DiscoverableReference",
    field_name: "rawReferent",
    reference_classes: &[],
};

/// The referent field and the classes whose instances must not be traced
/// through it
#[derive(Debug)]
pub struct SpecialReferences {
    referent: FieldRef,
    classes: HashSet<ClassId>,
}

impl SpecialReferences {
    /// Try the HotSpot convention first, then Native Image
    pub fn locate<G: HeapGraph>(graph: &G) -> Result<Self, ReachabilityError> {
        for convention in [&HOTSPOT_REFERENCE, &SVM_REFERENCE] {
            if let Some(refs) = Self::try_convention(graph, convention) {
                info!(
                    "Excluding {}.{} on {} reference classes",
                    convention.class_name,
                    convention.field_name,
                    refs.classes.len()
                );
                return Ok(refs);
            }
        }
        Err(ReachabilityError::ReferenceFieldNotFound)
    }

    fn try_convention<G: HeapGraph>(
        graph: &G,
        convention: &ReferenceConvention,
    ) -> Option<SpecialReferences> {
        let declaring = graph.class_by_name(convention.class_name)?;
        let referent = graph.declared_field(declaring, convention.field_name)?;
        let mut classes = HashSet::new();
        if convention.reference_classes.is_empty() {
            classes.insert(declaring);
            classes.extend(graph.subclasses(declaring));
            return Some(SpecialReferences { referent, classes });
        }
        for name in convention.reference_classes {
            if let Some(class) = graph.class_by_name(name) {
                classes.insert(class);
                classes.extend(graph.subclasses(class));
            }
        }
        if classes.len() >= convention.reference_classes.len() {
            Some(SpecialReferences { referent, classes })
        } else {
            debug!(
                "Only {} of the {} reference classes of {} are present",
                classes.len(),
                convention.reference_classes.len(),
                convention.class_name
            );
            None
        }
    }

    pub fn referent(&self) -> FieldRef {
        self.referent
    }

    pub fn is_reference_class(&self, class: ClassId) -> bool {
        self.classes.contains(&class)
    }

    /// Whether the value of `field` in an instance of `class` is a referent
    /// that must not be traced
    pub fn is_excluded(&self, class: ClassId, field: Option<FieldRef>) -> bool {
        field == Some(self.referent) && self.classes.contains(&class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::HeapDumpBuilder;
    use crate::HeapSnapshot;

    #[test]
    fn test_hotspot_convention() {
        let mut b = HeapDumpBuilder::new();
        let refs = b.java_lang_ref();
        let my_weak = b.class("com.example.MyWeak", refs.weak, &[]);
        let snapshot = HeapSnapshot::from_heapdump(b.finish());
        let special = SpecialReferences::locate(&snapshot.graph).unwrap();
        assert_eq!(special.referent().class, refs.reference);
        assert!(special.is_reference_class(refs.weak));
        assert!(special.is_reference_class(my_weak));
        assert!(special.is_reference_class(refs.phantom));
        // Reference itself is not one of the reference classes
        assert!(!special.is_reference_class(refs.reference));
        assert!(special.is_excluded(my_weak, Some(special.referent())));
        assert!(!special.is_excluded(my_weak, None));
    }

    #[test]
    fn test_svm_convention() {
        let mut b = HeapDumpBuilder::new();
        let discoverable = b.class(SVM_REFERENCE.class_name, 0, &["rawReferent"]);
        let sub = b.class("java.lang.ref.WeakReference", discoverable, &[]);
        let snapshot = HeapSnapshot::from_heapdump(b.finish());
        let special = SpecialReferences::locate(&snapshot.graph).unwrap();
        assert!(special.is_reference_class(discoverable));
        assert!(special.is_reference_class(sub));
        assert_eq!(special.referent().class, discoverable);
    }

    #[test]
    fn test_incomplete_hotspot_falls_back_to_svm() {
        let mut b = HeapDumpBuilder::new();
        let reference = b.class(HOTSPOT_REFERENCE.class_name, 0, &["referent"]);
        b.class("java.lang.ref.WeakReference", reference, &[]);
        let discoverable = b.class(SVM_REFERENCE.class_name, 0, &["rawReferent"]);
        let snapshot = HeapSnapshot::from_heapdump(b.finish());
        let special = SpecialReferences::locate(&snapshot.graph).unwrap();
        assert_eq!(special.referent().class, discoverable);
    }

    #[test]
    fn test_missing_convention_is_fatal() {
        let mut b = HeapDumpBuilder::new();
        b.class("java.lang.Object", 0, &[]);
        let snapshot = HeapSnapshot::from_heapdump(b.finish());
        assert!(matches!(
            SpecialReferences::locate(&snapshot.graph),
            Err(ReachabilityError::ReferenceFieldNotFound)
        ));
    }
}
