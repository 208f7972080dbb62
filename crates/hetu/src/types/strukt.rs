use indexmap::IndexMap;

use crate::{
    config::Lexicon,
    error::{HetuError, RunResult},
    heap::{Heap, HeapData, HeapId},
    namespace::HtNamespace,
    value::Value,
};

/// A prototype-delegating dynamic object.
#[derive(Debug)]
pub(crate) struct HtStruct {
    /// Declared id, or a synthesized one for anonymous literals.
    pub id: String,
    /// Next struct in the delegation chain.
    pub prototype: Option<HeapId>,
    pub fields: IndexMap<String, Value>,
    /// Own namespace; `this` resolves to the struct itself.
    pub namespace: HeapId,
}

/// A named struct declaration. Instantiation replays the recorded field
/// definition bytes into a fresh struct.
#[derive(Debug)]
pub(crate) struct StructTemplate {
    pub id: String,
    /// Prototype id resolved lazily against the declaring namespace.
    pub prototype_id: Option<String>,
    pub module: String,
    pub def_ip: usize,
    /// The namespace the declaration closed over.
    pub namespace: HeapId,
}

/// Outcome of a struct member probe the VM acts on.
#[derive(Debug)]
pub(crate) enum StructLookup {
    Value(Value),
    /// A getter entry; the VM invokes it with the receiver bound.
    Getter(HeapId),
    NotFound,
}

/// Allocates an empty struct together with its namespace.
pub(crate) fn new_struct(
    heap: &mut Heap,
    id: String,
    prototype: Option<HeapId>,
    closure: Option<HeapId>,
    lexicon: &Lexicon,
) -> HeapId {
    let ns = HtNamespace::new(id.clone(), None, closure, heap);
    let namespace = heap.allocate(HeapData::Namespace(ns));
    let struct_id = heap.allocate(HeapData::Struct(HtStruct {
        id,
        prototype,
        fields: IndexMap::new(),
        namespace,
    }));
    let this = lexicon.this_id.clone();
    heap.expect_namespace_mut(namespace)
        .define_local(this, Value::Ref(struct_id));
    struct_id
}

/// Member probe with prototype delegation.
///
/// Order per level: the prototype sentinel, the field itself, its getter,
/// its constructor entry; then the chain continues. The receiver stays the
/// original struct, so functions found on a prototype still bind `this` to
/// the object the access started from.
pub(crate) fn struct_member_get(
    heap: &mut Heap,
    this: HeapId,
    key: &str,
    receiver: HeapId,
    from: Option<&str>,
    lexicon: &Lexicon,
) -> RunResult<StructLookup> {
    if lexicon.is_private(key) {
        let owner = heap.expect_namespace(heap.expect_struct(this).namespace).full_name.clone();
        if !from.is_some_and(|from| from.starts_with(&owner)) {
            return Err(HetuError::private_member(key));
        }
    }
    if key == lexicon.prototype_id {
        let proto = heap.expect_struct(this).prototype;
        return Ok(StructLookup::Value(proto.map_or(Value::Null, Value::Ref)));
    }
    let mut current = Some(this);
    while let Some(struct_id) = current {
        let (own, getter, ctor, prototype) = {
            let strukt = heap.expect_struct(struct_id);
            (
                strukt.fields.get(key).copied(),
                strukt.fields.get(&lexicon.getter_id(key)).copied(),
                strukt.fields.get(&lexicon.constructor_id(Some(key))).copied(),
                strukt.prototype,
            )
        };
        if let Some(value) = own {
            return Ok(StructLookup::Value(bind_receiver(heap, value, receiver)));
        }
        if let Some(getter) = getter
            && is_function(heap, getter)
            && let Value::Ref(function_id) = bind_receiver(heap, getter, receiver)
        {
            return Ok(StructLookup::Getter(function_id));
        }
        if let Some(ctor) = ctor {
            return Ok(StructLookup::Value(bind_receiver(heap, ctor, receiver)));
        }
        current = prototype;
    }
    Ok(StructLookup::NotFound)
}

fn is_function(heap: &Heap, value: Value) -> bool {
    matches!(value, Value::Ref(id) if matches!(heap.get(id), HeapData::Function(_)))
}

/// Rebinds function values to the access receiver; everything else passes
/// through unchanged.
fn bind_receiver(heap: &mut Heap, value: Value, receiver: HeapId) -> Value {
    if let Value::Ref(id) = value
        && let HeapData::Function(function) = heap.get(id)
    {
        let bound = function.bind(Value::Ref(receiver));
        return Value::Ref(heap.allocate(HeapData::Function(bound)));
    }
    value
}

/// Outcome of a struct member write.
#[derive(Debug)]
pub(crate) enum StructStore {
    Done,
    /// A setter entry to invoke with the receiver bound and the value as
    /// its single argument.
    Setter(HeapId),
}

/// Member write with prototype delegation.
///
/// An own field is overwritten in place; otherwise a setter anywhere on the
/// chain wins, then an inherited field is written where it lives, and an
/// entirely new key is defined on the receiver. Writing the prototype
/// sentinel replaces the chain.
pub(crate) fn struct_member_set(
    heap: &mut Heap,
    this: HeapId,
    key: &str,
    value: Value,
    from: Option<&str>,
    lexicon: &Lexicon,
) -> RunResult<StructStore> {
    if lexicon.is_private(key) {
        let owner = heap.expect_namespace(heap.expect_struct(this).namespace).full_name.clone();
        if !from.is_some_and(|from| from.starts_with(&owner)) {
            return Err(HetuError::private_member(key));
        }
    }
    if key == lexicon.prototype_id {
        let prototype = match value {
            Value::Null => None,
            Value::Ref(id) if matches!(heap.get(id), HeapData::Struct(_)) => Some(id),
            _ => return Err(HetuError::type_cast("prototype assignment", "struct")),
        };
        heap.expect_struct_mut(this).prototype = prototype;
        return Ok(StructStore::Done);
    }
    if heap.expect_struct(this).fields.contains_key(key) {
        heap.expect_struct_mut(this).fields.insert(key.to_owned(), value);
        return Ok(StructStore::Done);
    }
    let setter_key = lexicon.setter_id(key);
    let mut current = Some(this);
    while let Some(struct_id) = current {
        let (setter, has_field, prototype) = {
            let strukt = heap.expect_struct(struct_id);
            (
                strukt.fields.get(&setter_key).copied(),
                strukt.fields.contains_key(key),
                strukt.prototype,
            )
        };
        if let Some(setter) = setter
            && is_function(heap, setter)
            && let Value::Ref(function_id) = bind_receiver(heap, setter, this)
        {
            return Ok(StructStore::Setter(function_id));
        }
        if has_field {
            heap.expect_struct_mut(struct_id).fields.insert(key.to_owned(), value);
            return Ok(StructStore::Done);
        }
        current = prototype;
    }
    heap.expect_struct_mut(this).fields.insert(key.to_owned(), value);
    Ok(StructStore::Done)
}

/// Deep copy. Nested structs are cloned recursively; other values keep
/// their identity. Internal-prefix entries are skipped unless requested.
pub(crate) fn struct_clone(heap: &mut Heap, source: HeapId, with_internals: bool, lexicon: &Lexicon) -> HeapId {
    let (id, prototype, closure) = {
        let strukt = heap.expect_struct(source);
        let closure = heap.expect_namespace(strukt.namespace).closure;
        (strukt.id.clone(), strukt.prototype, closure)
    };
    let clone_id = new_struct(heap, id, prototype, closure, lexicon);
    let keys: Vec<String> = heap.expect_struct(source).fields.keys().cloned().collect();
    for key in keys {
        if !with_internals && lexicon.is_internal(&key) {
            continue;
        }
        let value = heap.expect_struct(source).fields[&key];
        let copied = match value {
            Value::Ref(id) if matches!(heap.get(id), HeapData::Struct(_)) => {
                Value::Ref(struct_clone(heap, id, with_internals, lexicon))
            }
            other => other,
        };
        heap.expect_struct_mut(clone_id).fields.insert(key, copied);
    }
    clone_id
}

/// Copies every non-internal key of `other` into `target`, overwriting.
pub(crate) fn struct_assign(heap: &mut Heap, target: HeapId, other: HeapId, lexicon: &Lexicon) {
    let entries: Vec<(String, Value)> = heap
        .expect_struct(other)
        .fields
        .iter()
        .filter(|(key, _)| !lexicon.is_internal(key))
        .map(|(key, value)| (key.clone(), *value))
        .collect();
    let target = heap.expect_struct_mut(target);
    for (key, value) in entries {
        target.fields.insert(key, value);
    }
}

/// Copies non-internal keys of `other` that `target` does not have yet.
pub(crate) fn struct_merge(heap: &mut Heap, target: HeapId, other: HeapId, lexicon: &Lexicon) {
    let entries: Vec<(String, Value)> = heap
        .expect_struct(other)
        .fields
        .iter()
        .filter(|(key, _)| !lexicon.is_internal(key))
        .map(|(key, value)| (key.clone(), *value))
        .collect();
    let target = heap.expect_struct_mut(target);
    for (key, value) in entries {
        target.fields.entry(key).or_insert(value);
    }
}

/// Non-internal keys in definition order.
pub(crate) fn struct_keys(heap: &Heap, this: HeapId, lexicon: &Lexicon) -> Vec<String> {
    heap.expect_struct(this)
        .fields
        .keys()
        .filter(|key| !lexicon.is_internal(key))
        .cloned()
        .collect()
}

/// Non-internal values in definition order.
pub(crate) fn struct_values(heap: &Heap, this: HeapId, lexicon: &Lexicon) -> Vec<Value> {
    heap.expect_struct(this)
        .fields
        .iter()
        .filter(|(key, _)| !lexicon.is_internal(key))
        .map(|(_, value)| *value)
        .collect()
}

/// Chain-wide key membership (`contains`) versus own keys only (`owns`).
pub(crate) fn struct_contains(heap: &Heap, this: HeapId, key: &str, own_only: bool) -> bool {
    let mut current = Some(this);
    while let Some(struct_id) = current {
        let strukt = heap.expect_struct(struct_id);
        if strukt.fields.contains_key(key) {
            return true;
        }
        if own_only {
            return false;
        }
        current = strukt.prototype;
    }
    false
}
