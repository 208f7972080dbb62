use indexmap::IndexMap;

use crate::{heap::HeapId, types::HtType, value::Value};

/// A class declaration's runtime object.
///
/// The namespace holds everything the class body declared: methods,
/// getters/setters, constructors, static members, and the field
/// declarations instantiation replays per instance.
#[derive(Debug)]
pub(crate) struct HtClass {
    pub id: String,
    /// The declared `extends` clause, before resolution.
    pub super_type: Option<HtType>,
    /// Resolved superclass, filled in at the end of the declaration.
    pub super_class: Option<HeapId>,
    pub is_abstract: bool,
    pub is_external: bool,
    pub is_enum: bool,
    pub has_user_defined_constructor: bool,
    pub namespace: HeapId,
    pub doc: Option<String>,
}

impl HtClass {
    /// The inheritance chain, most derived first.
    pub fn chain(start: HeapId, heap: &crate::heap::Heap) -> Vec<HeapId> {
        let mut chain = Vec::new();
        let mut current = Some(start);
        while let Some(class_id) = current {
            chain.push(class_id);
            current = heap.expect_class(class_id).super_class;
        }
        chain
    }
}

/// One level of an instance's field storage, paired with the class that
/// declared those fields and the namespace its methods run against.
#[derive(Debug)]
pub(crate) struct InstanceFrame {
    pub class: HeapId,
    pub class_id: String,
    pub fields: IndexMap<String, Value>,
    /// Namespace with `this` bound, whose closure is the class namespace.
    pub namespace: HeapId,
}

/// An object built by a constructor.
///
/// Member lookup walks the frames from the most derived class upward, so a
/// shadowing field wins over the inherited one while a cast can still reach
/// the ancestor's view.
#[derive(Debug)]
pub(crate) struct HtInstance {
    pub class: HeapId,
    /// Most derived first, one frame per class in the chain.
    pub frames: Vec<InstanceFrame>,
}

impl HtInstance {
    /// Index of the frame belonging to `class`, if the instance has one.
    pub fn frame_of(&self, class: HeapId) -> Option<usize> {
        self.frames.iter().position(|frame| frame.class == class)
    }
}

/// A view of an instance restricted to one class level, produced by `as`.
#[derive(Debug)]
pub(crate) struct HtCast {
    pub instance: HeapId,
    pub class: HeapId,
}
