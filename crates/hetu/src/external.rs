use std::fmt;

use ahash::AHashMap;

use crate::{
    error::{HetuError, RunResult},
    object::Object,
};

/// Arguments of one call crossing into the host.
#[derive(Debug, Clone)]
pub struct NativeCall {
    /// Bound receiver for instance-method bindings.
    pub receiver: Option<Object>,
    pub positional: Vec<Object>,
    pub named: Vec<(String, Object)>,
}

impl NativeCall {
    /// Fetches a named argument by name.
    #[must_use]
    pub fn named(&self, name: &str) -> Option<&Object> {
        self.named.iter().find(|(id, _)| id == name).map(|(_, value)| value)
    }
}

/// What a bound host function hands back to the loop.
#[derive(Debug, Clone)]
pub enum ExternalReturn {
    Value(Object),
    /// The result is not available yet: the loop gets a pending future and
    /// the host resolves it through the suspension protocol.
    Future,
}

impl<T: Into<Object>> From<T> for ExternalReturn {
    fn from(value: T) -> Self {
        Self::Value(value.into())
    }
}

/// A host function callable from script code.
pub type NativeFunction = Box<dyn Fn(&mut NativeCall) -> RunResult<ExternalReturn>>;

/// Converts unknown host objects to a type id the binding convention can
/// dispatch on. Consulted in registration order.
pub type ExternalReflector = Box<dyn Fn(&Object) -> Option<String>>;

/// Handle to a script function passed through an external function type.
///
/// The wrapper the embedder registered receives this and returns whatever
/// host-side callable representation it wants script code to hold.
#[derive(Debug, Clone)]
pub struct FunctionReference {
    pub internal_name: String,
    pub module: String,
}

/// Wrapper invoked when a function literal declares an external type.
pub type FunctionTypeWrapper = Box<dyn Fn(FunctionReference) -> Object>;

/// Host-side view of a class whose members live outside the VM.
///
/// Static members resolve through `member_get`/`member_set`; members of
/// encapsulated host objects resolve through the instance variants with the
/// object handle supplied.
pub trait ExternalClass {
    fn type_id(&self) -> &str;

    fn member_get(&self, id: &str) -> RunResult<Object> {
        Err(HetuError::undefined_external(id))
    }

    fn member_set(&mut self, id: &str, _value: Object) -> RunResult<()> {
        Err(HetuError::undefined_external(id))
    }

    fn instance_member_get(&self, _object: &Object, id: &str) -> RunResult<Object> {
        Err(HetuError::undefined_external(id))
    }

    fn instance_member_set(&mut self, _object: &Object, id: &str, _value: Object) -> RunResult<()> {
        Err(HetuError::undefined_external(id))
    }
}

/// Everything the embedder has bound into the interpreter.
///
/// Binding ids follow the convention: top-level `name`, static member or
/// constructor `Class.name`, instance method `Class::name`.
#[derive(Default)]
pub(crate) struct ExternalRegistry {
    functions: AHashMap<String, NativeFunction>,
    function_types: AHashMap<String, FunctionTypeWrapper>,
    classes: AHashMap<String, Box<dyn ExternalClass>>,
    enums: AHashMap<String, Vec<(String, Object)>>,
    reflectors: Vec<ExternalReflector>,
}

impl fmt::Debug for ExternalRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalRegistry")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .field("function_types", &self.function_types.keys().collect::<Vec<_>>())
            .field("classes", &self.classes.keys().collect::<Vec<_>>())
            .field("enums", &self.enums.keys().collect::<Vec<_>>())
            .field("reflectors", &self.reflectors.len())
            .finish()
    }
}

impl ExternalRegistry {
    pub fn bind_function(&mut self, id: impl Into<String>, function: NativeFunction) {
        let id = id.into();
        log::debug!("binding external function [{id}]");
        self.functions.insert(id, function);
    }

    pub fn bind_function_type(&mut self, id: impl Into<String>, wrapper: FunctionTypeWrapper) {
        self.function_types.insert(id.into(), wrapper);
    }

    pub fn bind_class(&mut self, class: Box<dyn ExternalClass>) {
        log::debug!("binding external class [{}]", class.type_id());
        self.classes.insert(class.type_id().to_owned(), class);
    }

    pub fn bind_enum(&mut self, id: impl Into<String>, variants: Vec<(String, Object)>) {
        self.enums.insert(id.into(), variants);
    }

    pub fn bind_reflector(&mut self, reflector: ExternalReflector) {
        self.reflectors.push(reflector);
    }

    pub fn function(&self, id: &str) -> Option<&NativeFunction> {
        self.functions.get(id)
    }

    pub fn function_type(&self, id: &str) -> Option<&FunctionTypeWrapper> {
        self.function_types.get(id)
    }

    pub fn class(&self, id: &str) -> Option<&dyn ExternalClass> {
        self.classes.get(id).map(Box::as_ref)
    }

    pub fn class_mut(&mut self, id: &str) -> Option<&mut Box<dyn ExternalClass>> {
        self.classes.get_mut(id)
    }

    pub fn r#enum(&self, id: &str) -> Option<&[(String, Object)]> {
        self.enums.get(id).map(Vec::as_slice)
    }

    /// Derives a type id for an unknown host object via the reflectors.
    pub fn reflect(&self, object: &Object) -> Option<String> {
        self.reflectors.iter().find_map(|reflector| reflector(object))
    }
}
