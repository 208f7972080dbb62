use indexmap::{IndexMap, IndexSet};
use num_bigint::BigInt;

use crate::{
    namespace::HtNamespace,
    types::{HtCast, HtClass, HtFunction, HtInstance, HtStruct, HtType, StructTemplate},
    value::{Value, ValueKey},
};

/// Handle into the interpreter's arena.
///
/// All compound runtime data lives behind one of these; `Value` stays a
/// small `Copy` enum. Handles are never reused while the interpreter is
/// alive, so a stored `HeapId` cannot dangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub(crate) struct HeapId(u32);

impl HeapId {
    pub fn new(index: usize) -> Self {
        Self(u32::try_from(index).expect("heap id out of range"))
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One arena entry.
#[derive(Debug)]
pub(crate) enum HeapData {
    Str(String),
    BigInt(BigInt),
    List(Vec<Value>),
    Map(IndexMap<ValueKey, Value>),
    Set(IndexSet<ValueKey>),
    Struct(HtStruct),
    StructTemplate(StructTemplate),
    Instance(HtInstance),
    Cast(HtCast),
    Class(HtClass),
    Function(HtFunction),
    Namespace(HtNamespace),
    Type(HtType),
    Future(FutureState),
    /// Opaque handle to a host object, tagged with the host type id the
    /// encapsulation layer derived for it.
    ExternalInstance(ExternalInstance),
}

impl HeapData {
    /// Short noun used in diagnostics, e.g. "struct" or "function".
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::BigInt(_) => "bigint",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Set(_) => "set",
            Self::Struct(_) => "struct",
            Self::StructTemplate(_) => "struct declaration",
            Self::Instance(_) => "instance",
            Self::Cast(_) => "cast",
            Self::Class(_) => "class",
            Self::Function(_) => "function",
            Self::Namespace(_) => "namespace",
            Self::Type(_) => "type",
            Self::Future(_) => "future",
            Self::ExternalInstance(_) => "external instance",
        }
    }
}

/// State of a host future as seen by the loop.
#[derive(Debug)]
pub(crate) enum FutureState {
    /// Waiting on the host; the id correlates the eventual resolution.
    Pending(u32),
    Resolved(Value),
}

/// A host object the VM only holds a handle to.
#[derive(Debug, Clone)]
pub(crate) struct ExternalInstance {
    pub type_id: String,
    pub handle: u64,
}

/// Arena owning every compound runtime object.
///
/// Entries are appended and never freed individually: objects live until the
/// interpreter is dropped or reset, which is the handle-arena lifecycle that
/// sidesteps ownership cycles between namespaces, classes, and closures.
#[derive(Debug, Default)]
pub(crate) struct Heap {
    entries: Vec<HeapData>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, data: HeapData) -> HeapId {
        let id = HeapId::new(self.entries.len());
        self.entries.push(data);
        id
    }

    pub fn allocate_str(&mut self, s: impl Into<String>) -> Value {
        Value::Ref(self.allocate(HeapData::Str(s.into())))
    }

    #[inline]
    pub fn get(&self, id: HeapId) -> &HeapData {
        &self.entries[id.index()]
    }

    #[inline]
    pub fn get_mut(&mut self, id: HeapId) -> &mut HeapData {
        &mut self.entries[id.index()]
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// Drops every entry, retaining the allocation.
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    // Typed accessors. Callers use these where the loop has already
    // established the entry's kind; a mismatch is an internal invariant
    // violation, not a script-reachable condition.

    pub fn expect_str(&self, id: HeapId) -> &str {
        match self.get(id) {
            HeapData::Str(s) => s,
            other => panic!("expected string on heap, found {}", other.kind_name()),
        }
    }

    pub fn expect_namespace(&self, id: HeapId) -> &HtNamespace {
        match self.get(id) {
            HeapData::Namespace(ns) => ns,
            other => panic!("expected namespace on heap, found {}", other.kind_name()),
        }
    }

    pub fn expect_namespace_mut(&mut self, id: HeapId) -> &mut HtNamespace {
        match self.get_mut(id) {
            HeapData::Namespace(ns) => ns,
            other => panic!("expected namespace on heap, found {}", other.kind_name()),
        }
    }

    pub fn expect_class(&self, id: HeapId) -> &HtClass {
        match self.get(id) {
            HeapData::Class(class) => class,
            other => panic!("expected class on heap, found {}", other.kind_name()),
        }
    }

    pub fn expect_function(&self, id: HeapId) -> &HtFunction {
        match self.get(id) {
            HeapData::Function(function) => function,
            other => panic!("expected function on heap, found {}", other.kind_name()),
        }
    }

    pub fn expect_struct(&self, id: HeapId) -> &HtStruct {
        match self.get(id) {
            HeapData::Struct(s) => s,
            other => panic!("expected struct on heap, found {}", other.kind_name()),
        }
    }

    pub fn expect_struct_mut(&mut self, id: HeapId) -> &mut HtStruct {
        match self.get_mut(id) {
            HeapData::Struct(s) => s,
            other => panic!("expected struct on heap, found {}", other.kind_name()),
        }
    }

    pub fn expect_instance(&self, id: HeapId) -> &HtInstance {
        match self.get(id) {
            HeapData::Instance(instance) => instance,
            other => panic!("expected instance on heap, found {}", other.kind_name()),
        }
    }

    /// The string behind a value, when it is one.
    pub fn str_value(&self, value: Value) -> Option<&str> {
        match value {
            Value::Ref(id) => match self.get(id) {
                HeapData::Str(s) => Some(s),
                _ => None,
            },
            _ => None,
        }
    }
}
