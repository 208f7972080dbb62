use indexmap::IndexMap;
use num_bigint::BigInt;

use crate::{
    config::Lexicon,
    heap::{ExternalInstance, FutureState, Heap, HeapData},
    value::{Value, ValueKey, stringify},
};

/// A value that can be passed to or returned from the interpreter.
///
/// This is the public-facing type for script values. It owns all its data
/// and can be freely cloned, serialized, or stored; unlike the internal
/// value representation it does not need the interpreter's heap.
///
/// Functions, classes, types, and namespaces have no deep host form; they
/// cross the boundary as `Repr`. Resolved futures unwrap to their value;
/// pending ones cross as `Future` with the call id the host resolves.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Object {
    #[serde(alias = "null")]
    Null,
    #[serde(alias = "bool")]
    Bool(bool),
    #[serde(alias = "int")]
    Int(i64),
    /// Arbitrary-precision integer (beyond i64).
    BigInt(BigInt),
    #[serde(alias = "float")]
    Float(f64),
    #[serde(alias = "str")]
    Str(String),
    #[serde(alias = "list")]
    List(Vec<Self>),
    /// Insertion-ordered mapping; keys are restricted to hashable kinds on
    /// the way in.
    #[serde(alias = "map")]
    Map(Vec<(Self, Self)>),
    #[serde(alias = "set")]
    Set(Vec<Self>),
    /// A struct's non-internal fields in definition order.
    Struct {
        id: Option<String>,
        fields: Vec<(String, Self)>,
    },
    /// An opaque host object handle round-tripping through the VM.
    External { type_id: String, handle: u64 },
    /// A pending host future, correlated by call id.
    Future(u32),
    /// Display form of a value with no deep host mapping.
    Repr(String),
}

impl From<()> for Object {
    fn from((): ()) -> Self {
        Self::Null
    }
}

impl From<bool> for Object {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Object {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Object {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Object {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl From<String> for Object {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl Object {
    /// Converts into the runtime representation, allocating compound data
    /// on the heap.
    pub(crate) fn to_value(&self, heap: &mut Heap) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::Int(*i),
            Self::BigInt(b) => Value::Ref(heap.allocate(HeapData::BigInt(b.clone()))),
            Self::Float(f) => Value::Float(*f),
            Self::Str(s) => heap.allocate_str(s.clone()),
            Self::List(items) => {
                let values: Vec<Value> = items.iter().map(|item| item.to_value(heap)).collect();
                Value::Ref(heap.allocate(HeapData::List(values)))
            }
            Self::Map(entries) => {
                let mut map = IndexMap::new();
                for (key, item) in entries {
                    let key_value = key.to_value(heap);
                    let Ok(key) = ValueKey::from_value(key_value, heap) else {
                        continue;
                    };
                    let item = item.to_value(heap);
                    map.insert(key, item);
                }
                Value::Ref(heap.allocate(HeapData::Map(map)))
            }
            Self::Set(items) => {
                let mut set = indexmap::IndexSet::new();
                for item in items {
                    let item_value = item.to_value(heap);
                    if let Ok(key) = ValueKey::from_value(item_value, heap) {
                        set.insert(key);
                    }
                }
                Value::Ref(heap.allocate(HeapData::Set(set)))
            }
            Self::Struct { id, fields } => {
                let struct_id = crate::types::new_struct(
                    heap,
                    id.clone().unwrap_or_default(),
                    None,
                    None,
                    &Lexicon::default(),
                );
                for (key, item) in fields {
                    let item = item.to_value(heap);
                    heap.expect_struct_mut(struct_id).fields.insert(key.clone(), item);
                }
                Value::Ref(struct_id)
            }
            Self::External { type_id, handle } => Value::Ref(heap.allocate(HeapData::ExternalInstance(
                ExternalInstance {
                    type_id: type_id.clone(),
                    handle: *handle,
                },
            ))),
            Self::Future(call_id) => Value::Ref(heap.allocate(HeapData::Future(FutureState::Pending(*call_id)))),
            Self::Repr(s) => heap.allocate_str(s.clone()),
        }
    }

    /// Converts a runtime value into its host form.
    pub(crate) fn from_value(value: Value, heap: &Heap, lexicon: &Lexicon) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Int(i) => Self::Int(i),
            Value::Float(f) => Self::Float(f),
            Value::Ref(id) => match heap.get(id) {
                HeapData::Str(s) => Self::Str(s.clone()),
                HeapData::BigInt(b) => Self::BigInt(b.clone()),
                HeapData::List(items) => {
                    Self::List(items.iter().map(|item| Self::from_value(*item, heap, lexicon)).collect())
                }
                HeapData::Map(entries) => Self::Map(
                    entries
                        .iter()
                        .map(|(key, item)| (Self::from_key(key), Self::from_value(*item, heap, lexicon)))
                        .collect(),
                ),
                HeapData::Set(items) => Self::Set(items.iter().map(Self::from_key).collect()),
                HeapData::Struct(s) => Self::Struct {
                    // Synthesized literal ids are internal and stay inside.
                    id: (!s.id.is_empty() && !lexicon.is_internal(&s.id)).then(|| s.id.clone()),
                    fields: s
                        .fields
                        .iter()
                        .filter(|(key, _)| !lexicon.is_internal(key))
                        .map(|(key, item)| (key.clone(), Self::from_value(*item, heap, lexicon)))
                        .collect(),
                },
                HeapData::ExternalInstance(external) => Self::External {
                    type_id: external.type_id.clone(),
                    handle: external.handle,
                },
                HeapData::Future(FutureState::Resolved(inner)) => Self::from_value(*inner, heap, lexicon),
                HeapData::Future(FutureState::Pending(call_id)) => Self::Future(*call_id),
                _ => Self::Repr(stringify(value, heap)),
            },
        }
    }

    fn from_key(key: &ValueKey) -> Self {
        match key {
            ValueKey::Null => Self::Null,
            ValueKey::Bool(b) => Self::Bool(*b),
            ValueKey::Int(i) => Self::Int(*i),
            ValueKey::FloatBits(bits) => Self::Float(f64::from_bits(*bits)),
            ValueKey::Str(s) => Self::Str(s.clone()),
        }
    }
}
