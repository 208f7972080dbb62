use std::fmt::Write;

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};

use crate::{
    config::{InterpreterConfig, Lexicon},
    error::{ErrorCode, HetuError, RunResult},
    heap::{FutureState, Heap, HeapData, HeapId},
    types::{FunctionType, HtType, Intrinsic, NominalType, ParameterType, StructuralType},
};

/// Primary value type flowing through registers and namespaces.
///
/// Immediate kinds are stored inline; everything compound lives in the arena
/// and is referenced via `Ref`. The enum is `Copy`, so register traffic and
/// parameter binding never touch the heap.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub(crate) enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Ref(HeapId),
}

impl Value {
    #[inline]
    pub fn is_null(self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric view used by arithmetic and ordering; `None` for
    /// non-numbers. Null maps to zero only under the conversion policy.
    pub fn as_f64(self, heap: &Heap, config: &InterpreterConfig) -> Option<f64> {
        match self {
            Self::Int(i) => Some(i as f64),
            Self::Float(f) => Some(f),
            Self::Null if config.allow_implicit_null_to_zero_conversion => Some(0.0),
            Self::Ref(id) => match heap.get(id) {
                HeapData::BigInt(b) => b.to_f64(),
                _ => None,
            },
            _ => None,
        }
    }

    /// Integer view for bitwise operations and subscripts. Floats with an
    /// integral value qualify.
    pub fn as_i64(self, heap: &Heap, config: &InterpreterConfig) -> Option<i64> {
        match self {
            Self::Int(i) => Some(i),
            Self::Float(f) if f.fract() == 0.0 => Some(f as i64),
            Self::Null if config.allow_implicit_null_to_zero_conversion => Some(0),
            Self::Ref(id) => match heap.get(id) {
                HeapData::BigInt(b) => b.to_i64(),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Hashable projection of a value, used as map and set keys.
///
/// Only immutable kinds can be keys; floats key by bit pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub(crate) enum ValueKey {
    Null,
    Bool(bool),
    Int(i64),
    FloatBits(u64),
    Str(String),
}

impl ValueKey {
    pub fn from_value(value: Value, heap: &Heap) -> RunResult<Self> {
        match value {
            Value::Null => Ok(Self::Null),
            Value::Bool(b) => Ok(Self::Bool(b)),
            Value::Int(i) => Ok(Self::Int(i)),
            Value::Float(f) => Ok(Self::FloatBits(f.to_bits())),
            Value::Ref(id) => match heap.get(id) {
                HeapData::Str(s) => Ok(Self::Str(s.clone())),
                other => Err(HetuError::sub_get_key(other.kind_name())),
            },
        }
    }

    pub fn to_value(&self, heap: &mut Heap) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::Int(*i),
            Self::FloatBits(bits) => Value::Float(f64::from_bits(*bits)),
            Self::Str(s) => heap.allocate_str(s.clone()),
        }
    }
}

/// The configurable boolean coercion policy.
///
/// Strict mode admits only the boolean `true`; the lenient policy treats
/// zero, empty collections, empty strings, the literal `'false'`, and null
/// as false and everything else as true.
pub(crate) fn truthy(value: Value, heap: &Heap, config: &InterpreterConfig) -> bool {
    if config.allow_implicit_empty_value_to_false_conversion {
        match value {
            Value::Null => false,
            Value::Bool(b) => b,
            Value::Int(i) => i != 0,
            Value::Float(f) => f != 0.0,
            Value::Ref(id) => match heap.get(id) {
                HeapData::Str(s) => !(s.is_empty() || s == "false"),
                HeapData::BigInt(b) => !b.is_zero(),
                HeapData::List(items) => !items.is_empty(),
                HeapData::Map(entries) => !entries.is_empty(),
                HeapData::Set(items) => !items.is_empty(),
                HeapData::Struct(s) => !s.fields.is_empty(),
                _ => true,
            },
        }
    } else {
        matches!(value, Value::Bool(true))
    }
}

/// Value equality: primitives and numbers by value (with int/float
/// crossover), strings and big ints by content, compound data by identity.
pub(crate) fn values_equal(left: Value, right: Value, heap: &Heap) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Float(a), Value::Float(b)) => a == b,
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (a as f64) == b,
        (Value::Ref(a), Value::Ref(b)) => {
            if a == b {
                return true;
            }
            match (heap.get(a), heap.get(b)) {
                (HeapData::Str(x), HeapData::Str(y)) => x == y,
                (HeapData::BigInt(x), HeapData::BigInt(y)) => x == y,
                _ => false,
            }
        }
        (Value::Int(i), Value::Ref(id)) | (Value::Ref(id), Value::Int(i)) => match heap.get(id) {
            HeapData::BigInt(b) => *b == BigInt::from(i),
            _ => false,
        },
        _ => false,
    }
}

/// Renders a value the way diagnostics, string interpolation, and `throw`
/// see it. Floats keep their shortest round-trip form.
pub(crate) fn stringify(value: Value, heap: &Heap) -> String {
    let mut out = String::new();
    stringify_into(&mut out, value, heap, 0);
    out
}

fn stringify_into(out: &mut String, value: Value, heap: &Heap, depth: usize) {
    if depth > 8 {
        out.push_str("...");
        return;
    }
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => {
            let _ = write!(out, "{b}");
        }
        Value::Int(i) => {
            let _ = write!(out, "{i}");
        }
        Value::Float(f) => {
            if f.is_finite() {
                let mut buffer = ryu::Buffer::new();
                out.push_str(buffer.format(f));
            } else {
                let _ = write!(out, "{f}");
            }
        }
        Value::Ref(id) => match heap.get(id) {
            HeapData::Str(s) => out.push_str(s),
            HeapData::BigInt(b) => {
                let _ = write!(out, "{b}");
            }
            HeapData::List(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    stringify_into(out, *item, heap, depth + 1);
                }
                out.push(']');
            }
            HeapData::Map(entries) => {
                out.push('{');
                for (i, (key, item)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    match key {
                        ValueKey::Str(s) => out.push_str(s),
                        ValueKey::Null => out.push_str("null"),
                        ValueKey::Bool(b) => {
                            let _ = write!(out, "{b}");
                        }
                        ValueKey::Int(n) => {
                            let _ = write!(out, "{n}");
                        }
                        ValueKey::FloatBits(bits) => {
                            let mut buffer = ryu::Buffer::new();
                            out.push_str(buffer.format(f64::from_bits(*bits)));
                        }
                    }
                    out.push_str(": ");
                    stringify_into(out, *item, heap, depth + 1);
                }
                out.push('}');
            }
            HeapData::Set(items) => {
                let _ = write!(out, "set({} items)", items.len());
            }
            HeapData::Struct(s) => {
                out.push('{');
                let mut first = true;
                for (key, item) in &s.fields {
                    if key.starts_with('$') {
                        continue;
                    }
                    if !first {
                        out.push_str(", ");
                    }
                    first = false;
                    out.push_str(key);
                    out.push_str(": ");
                    stringify_into(out, *item, heap, depth + 1);
                }
                out.push('}');
            }
            HeapData::StructTemplate(t) => {
                let _ = write!(out, "struct {}", t.id);
            }
            HeapData::Instance(instance) => {
                let class = heap.expect_class(instance.class);
                let _ = write!(out, "instance of [{}]", class.id);
            }
            HeapData::Cast(cast) => {
                let class = heap.expect_class(cast.class);
                let _ = write!(out, "instance of [{}]", class.id);
            }
            HeapData::Class(class) => {
                let _ = write!(out, "class {}", class.id);
            }
            HeapData::Function(function) => {
                let name = function.id.as_deref().unwrap_or(&function.internal_name);
                let _ = write!(out, "function {name}");
            }
            HeapData::Namespace(ns) => {
                let _ = write!(out, "namespace {}", ns.full_name);
            }
            HeapData::Type(ty) => {
                let _ = write!(out, "{ty}");
            }
            HeapData::Future(FutureState::Pending(call_id)) => {
                let _ = write!(out, "future (pending #{call_id})");
            }
            HeapData::Future(FutureState::Resolved(inner)) => {
                out.push_str("future (");
                stringify_into(out, *inner, heap, depth + 1);
                out.push(')');
            }
            HeapData::ExternalInstance(external) => {
                let _ = write!(out, "external instance of [{}]", external.type_id);
            }
        },
    }
}

/// Canonical nominal type ids the encapsulation layer tags host kinds with.
pub(crate) mod type_ids {
    pub const BOOL: &str = "bool";
    pub const INT: &str = "int";
    pub const FLOAT: &str = "float";
    pub const BIGINT: &str = "bigint";
    pub const STR: &str = "str";
    pub const LIST: &str = "List";
    pub const MAP: &str = "Map";
    pub const SET: &str = "Set";
    pub const FUTURE: &str = "Future";
}

/// The type of a value, per the encapsulation contract.
pub(crate) fn type_of(value: Value, heap: &Heap, lexicon: &Lexicon) -> HtType {
    match value {
        Value::Null => HtType::Intrinsic(Intrinsic::Null),
        Value::Bool(_) => HtType::nominal(type_ids::BOOL),
        Value::Int(_) => HtType::nominal(type_ids::INT),
        Value::Float(_) => HtType::nominal(type_ids::FLOAT),
        Value::Ref(id) => match heap.get(id) {
            HeapData::Str(_) => HtType::nominal(type_ids::STR),
            HeapData::BigInt(_) => HtType::nominal(type_ids::BIGINT),
            HeapData::List(_) => HtType::nominal(type_ids::LIST),
            HeapData::Map(_) => HtType::nominal(type_ids::MAP),
            HeapData::Set(_) => HtType::nominal(type_ids::SET),
            HeapData::Future(_) => HtType::nominal(type_ids::FUTURE),
            HeapData::Struct(s) => {
                let mut field_types = indexmap::IndexMap::new();
                for (key, field) in &s.fields {
                    if lexicon.is_internal(key) {
                        continue;
                    }
                    field_types.insert(key.clone(), type_of(*field, heap, lexicon));
                }
                HtType::Structural(StructuralType { field_types })
            }
            HeapData::StructTemplate(t) => HtType::nominal(&t.id),
            HeapData::Instance(instance) => {
                let class = heap.expect_class(instance.class);
                HtType::Nominal(NominalType {
                    id: class.id.clone(),
                    type_args: Vec::new(),
                    is_nullable: false,
                    namespaces: Vec::new(),
                    class: Some(instance.class),
                })
            }
            HeapData::Cast(cast) => {
                let class = heap.expect_class(cast.class);
                HtType::Nominal(NominalType {
                    id: class.id.clone(),
                    type_args: Vec::new(),
                    is_nullable: false,
                    namespaces: Vec::new(),
                    class: Some(cast.class),
                })
            }
            HeapData::Class(_) | HeapData::Type(_) => HtType::Intrinsic(Intrinsic::Type),
            HeapData::Function(function) => {
                let parameter_types = function
                    .params
                    .iter()
                    .map(|param| ParameterType {
                        ty: param.decl_type.clone().unwrap_or(HtType::Intrinsic(Intrinsic::Any)),
                        id: param.is_named.then(|| param.id.clone()),
                        is_optional: param.is_optional,
                        is_variadic: param.is_variadic,
                    })
                    .collect();
                HtType::Function(FunctionType {
                    parameter_types,
                    return_type: Box::new(
                        function
                            .declared_return_type
                            .clone()
                            .unwrap_or(HtType::Intrinsic(Intrinsic::Any)),
                    ),
                })
            }
            HeapData::Namespace(_) => HtType::Intrinsic(Intrinsic::Namespace),
            HeapData::ExternalInstance(external) => HtType::nominal(&external.type_id),
        },
    }
}

fn unsupported_operands(op: &str, left: Value, right: Value, heap: &Heap) -> HetuError {
    HetuError::runtime(
        ErrorCode::UnkownValueType,
        format!(
            "Unsupported operands for [{op}]: [{}] and [{}]",
            stringify(left, heap),
            stringify(right, heap)
        ),
    )
}

/// Addition: numbers add (64-bit wrap for ints, big ints exact), a string
/// on the left concatenates the stringified right operand.
pub(crate) fn add(left: Value, right: Value, heap: &mut Heap, config: &InterpreterConfig) -> RunResult<Value> {
    if let Value::Ref(id) = left
        && matches!(heap.get(id), HeapData::Str(_))
    {
        let mut s = heap.expect_str(id).to_owned();
        s.push_str(&stringify(right, heap));
        return Ok(heap.allocate_str(s));
    }
    if let Some(result) = big_int_binary(left, right, heap, |a, b| a + b) {
        return Ok(result);
    }
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(b))),
        _ => numeric_binary("+", left, right, heap, config, |a, b| a + b),
    }
}

pub(crate) fn subtract(left: Value, right: Value, heap: &mut Heap, config: &InterpreterConfig) -> RunResult<Value> {
    if let Some(result) = big_int_binary(left, right, heap, |a, b| a - b) {
        return Ok(result);
    }
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_sub(b))),
        _ => numeric_binary("-", left, right, heap, config, |a, b| a - b),
    }
}

pub(crate) fn multiply(left: Value, right: Value, heap: &mut Heap, config: &InterpreterConfig) -> RunResult<Value> {
    if let Some(result) = big_int_binary(left, right, heap, |a, b| a * b) {
        return Ok(result);
    }
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_mul(b))),
        _ => numeric_binary("*", left, right, heap, config, |a, b| a * b),
    }
}

/// `/` always produces a float, like the language's host number semantics.
pub(crate) fn divide(left: Value, right: Value, heap: &mut Heap, config: &InterpreterConfig) -> RunResult<Value> {
    numeric_binary("/", left, right, heap, config, |a, b| a / b)
}

pub(crate) fn truncating_divide(
    left: Value,
    right: Value,
    heap: &mut Heap,
    config: &InterpreterConfig,
) -> RunResult<Value> {
    if let Some(result) = big_int_checked(left, right, heap, |a, b| {
        if b.is_zero() { None } else { Some(a / b) }
    }) {
        return result.ok_or_else(|| HetuError::runtime(ErrorCode::Extern, "Integer division by zero."));
    }
    let a = left
        .as_f64(heap, config)
        .ok_or_else(|| unsupported_operands("~/", left, right, heap))?;
    let b = right
        .as_f64(heap, config)
        .ok_or_else(|| unsupported_operands("~/", left, right, heap))?;
    Ok(Value::Int((a / b).trunc() as i64))
}

pub(crate) fn modulo(left: Value, right: Value, heap: &mut Heap, config: &InterpreterConfig) -> RunResult<Value> {
    if let Some(result) = big_int_checked(left, right, heap, |a, b| {
        if b.is_zero() {
            None
        } else {
            // Euclidean-style remainder: the result takes the divisor's
            // magnitude ordering used by the host language's `%`.
            let r = a % b;
            Some(if r.is_negative() { r + b.abs() } else { r })
        }
    }) {
        return result.ok_or_else(|| HetuError::runtime(ErrorCode::Extern, "Modulo by zero."));
    }
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => {
            if b == 0 {
                Err(HetuError::runtime(ErrorCode::Extern, "Modulo by zero."))
            } else {
                Ok(Value::Int(a.rem_euclid(b)))
            }
        }
        _ => numeric_binary("%", left, right, heap, config, f64::rem_euclid),
    }
}

pub(crate) fn negate(value: Value, heap: &mut Heap) -> RunResult<Value> {
    match value {
        Value::Int(i) => Ok(Value::Int(i.wrapping_neg())),
        Value::Float(f) => Ok(Value::Float(-f)),
        Value::Ref(id) => match heap.get(id) {
            HeapData::BigInt(b) => {
                let negated = -b.clone();
                Ok(Value::Ref(heap.allocate(HeapData::BigInt(negated))))
            }
            _ => Err(unsupported_operands("-", value, Value::Null, heap)),
        },
        _ => Err(unsupported_operands("-", value, Value::Null, heap)),
    }
}

/// Ordering comparison used by the four relational opcodes.
pub(crate) fn compare(
    op: &str,
    left: Value,
    right: Value,
    heap: &Heap,
    config: &InterpreterConfig,
) -> RunResult<std::cmp::Ordering> {
    let a = left
        .as_f64(heap, config)
        .ok_or_else(|| unsupported_operands(op, left, right, heap))?;
    let b = right
        .as_f64(heap, config)
        .ok_or_else(|| unsupported_operands(op, left, right, heap))?;
    a.partial_cmp(&b)
        .ok_or_else(|| unsupported_operands(op, left, right, heap))
}

fn numeric_binary(
    op: &str,
    left: Value,
    right: Value,
    heap: &Heap,
    config: &InterpreterConfig,
    f: impl FnOnce(f64, f64) -> f64,
) -> RunResult<Value> {
    let a = left
        .as_f64(heap, config)
        .ok_or_else(|| unsupported_operands(op, left, right, heap))?;
    let b = right
        .as_f64(heap, config)
        .ok_or_else(|| unsupported_operands(op, left, right, heap))?;
    Ok(Value::Float(f(a, b)))
}

/// Applies `f` when either operand is a big int, promoting the other.
fn big_int_binary(left: Value, right: Value, heap: &mut Heap, f: impl FnOnce(&BigInt, &BigInt) -> BigInt) -> Option<Value> {
    let (a, b) = big_int_operands(left, right, heap)?;
    let result = f(&a, &b);
    Some(allocate_big_int(result, heap))
}

fn big_int_checked(
    left: Value,
    right: Value,
    heap: &mut Heap,
    f: impl FnOnce(&BigInt, &BigInt) -> Option<BigInt>,
) -> Option<Option<Value>> {
    let (a, b) = big_int_operands(left, right, heap)?;
    Some(f(&a, &b).map(|result| allocate_big_int(result, heap)))
}

fn big_int_operands(left: Value, right: Value, heap: &Heap) -> Option<(BigInt, BigInt)> {
    let as_big = |value: Value| match value {
        Value::Int(i) => Some(BigInt::from(i)),
        Value::Ref(id) => match heap.get(id) {
            HeapData::BigInt(b) => Some(b.clone()),
            _ => None,
        },
        _ => None,
    };
    let either_big = matches!(
        (left, right),
        (Value::Ref(a), _) if matches!(heap.get(a), HeapData::BigInt(_))
    ) || matches!(
        (left, right),
        (_, Value::Ref(b)) if matches!(heap.get(b), HeapData::BigInt(_))
    );
    if !either_big {
        return None;
    }
    Some((as_big(left)?, as_big(right)?))
}

/// Narrows a big-int result back to `Int` when it fits.
fn allocate_big_int(value: BigInt, heap: &mut Heap) -> Value {
    match value.to_i64() {
        Some(i) => Value::Int(i),
        None => Value::Ref(heap.allocate(HeapData::BigInt(value))),
    }
}
