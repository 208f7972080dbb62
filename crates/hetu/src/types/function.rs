use crate::{heap::HeapId, types::HtType, value::Value};

/// What a function entry is, which decides how calls bind and dispatch it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FunctionCategory {
    Normal = 0,
    Constructor = 1,
    Getter = 2,
    Setter = 3,
    Literal = 4,
    Method = 5,
}

impl FunctionCategory {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Normal),
            1 => Some(Self::Constructor),
            2 => Some(Self::Getter),
            3 => Some(Self::Setter),
            4 => Some(Self::Literal),
            5 => Some(Self::Method),
            _ => None,
        }
    }
}

/// One declared parameter.
#[derive(Debug, Clone)]
pub(crate) struct Param {
    pub id: String,
    pub decl_type: Option<HtType>,
    pub is_optional: bool,
    pub is_variadic: bool,
    pub is_named: bool,
    /// Absolute ip of the default-value expression chunk, evaluated lazily
    /// in the callee's frame when the argument is absent.
    pub default_ip: Option<usize>,
}

/// Where a function's body lives.
#[derive(Debug, Clone)]
pub(crate) struct FunctionDefinition {
    pub module: String,
    pub ip: usize,
    pub line: u16,
    pub column: u16,
}

/// Recorded `: super(...)` / `: this(...)` redirection of a constructor.
///
/// The ips point at argument expression chunks evaluated in the
/// constructor's frame before the target constructor runs.
#[derive(Debug, Clone)]
pub(crate) struct RedirectingConstructor {
    pub callee: String,
    pub key: Option<String>,
    pub positional_ips: Vec<usize>,
    pub named_ips: Vec<(String, usize)>,
}

/// Struct operations implemented by the runtime itself rather than script
/// bytecode. A function carrying one of these dispatches directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Builtin {
    StructClone,
    StructAssign,
    StructMerge,
    StructContains,
    StructOwns,
    StructToString,
}

/// A function value: script functions, host functions, methods, getters,
/// setters, constructors, and literals all share this shape.
#[derive(Debug, Clone)]
pub(crate) struct HtFunction {
    /// The mangled storage name (`$construct`, `get$x`, anonymous ids).
    pub internal_name: String,
    /// The declared public name, when there is one.
    pub id: Option<String>,
    pub class_id: Option<String>,
    /// Captured lexical scope the call namespace closes over.
    pub closure: Option<HeapId>,
    pub category: FunctionCategory,
    pub params: Vec<Param>,
    pub declared_return_type: Option<HtType>,
    pub definition: Option<FunctionDefinition>,
    pub is_async: bool,
    pub is_external: bool,
    pub is_static: bool,
    pub is_const: bool,
    pub is_field: bool,
    pub is_abstract: bool,
    pub min_arity: u8,
    pub max_arity: u8,
    pub redirecting_constructor: Option<RedirectingConstructor>,
    /// Re-wrap id: a host typedef this function is converted through when
    /// handed across the interop boundary.
    pub external_type_id: Option<String>,
    /// The receiver a member access bound, threading `this` to call time.
    pub instance: Option<Value>,
    pub builtin: Option<Builtin>,
    pub doc: Option<String>,
}

impl HtFunction {
    /// The name diagnostics refer to this function by.
    pub fn display_name(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.internal_name)
    }

    /// A copy with the receiver bound, produced by member access so `this`
    /// resolves to the object the function was retrieved from.
    pub fn bind(&self, receiver: Value) -> Self {
        let mut bound = self.clone();
        bound.instance = Some(receiver);
        bound
    }

    /// A runtime-implemented struct operation.
    pub fn builtin(name: &str, builtin: Builtin, receiver: Value) -> Self {
        Self {
            internal_name: name.to_owned(),
            id: Some(name.to_owned()),
            class_id: None,
            closure: None,
            category: FunctionCategory::Method,
            params: Vec::new(),
            declared_return_type: None,
            definition: None,
            is_async: false,
            is_external: false,
            is_static: false,
            is_const: false,
            is_field: false,
            is_abstract: false,
            min_arity: 0,
            max_arity: u8::MAX,
            redirecting_constructor: None,
            external_type_id: None,
            instance: Some(receiver),
            builtin: Some(builtin),
            doc: None,
        }
    }
}
