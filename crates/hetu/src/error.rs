use std::fmt::{self, Display, Write};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Result type alias for operations that can produce a runtime error.
pub type RunResult<T> = Result<T, HetuError>;

/// Error codes raised by the virtual machine.
///
/// Uses strum derives for automatic `Display`, `FromStr`, and
/// `Into<&'static str>` implementations; the wire spelling is the lower
/// camel-case form used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Use of an identifier no enclosing namespace declares.
    #[strum(serialize = "undefined")]
    Undefined,
    /// Redefinition of an id without the override flag.
    #[strum(serialize = "defined")]
    Defined,
    /// Private member accessed from outside its declaring namespace.
    #[strum(serialize = "privateMember")]
    PrivateMember,
    /// Assignment to an immutable declaration.
    #[strum(serialize = "immutable")]
    Immutable,
    #[strum(serialize = "notCallable")]
    NotCallable,
    #[strum(serialize = "notNewable")]
    NotNewable,
    #[strum(serialize = "callNullObject")]
    CallNullObject,
    #[strum(serialize = "visitMemberOfNullObject")]
    VisitMemberOfNullObject,
    /// Invalid subscript key (wrong type or out of range).
    #[strum(serialize = "subGetKey")]
    SubGetKey,
    #[strum(serialize = "nullSubSetKey")]
    NullSubSetKey,
    /// `delete` applied to something that is not a struct or namespace entry.
    #[strum(serialize = "delete")]
    Delete,
    /// `as` applied to a value that is not an instance.
    #[strum(serialize = "castee")]
    Castee,
    /// `as` target type the value does not conform to.
    #[strum(serialize = "typeCast")]
    TypeCast,
    /// Instantiation or direct call of an abstract class or function.
    #[strum(serialize = "abstracted")]
    Abstracted,
    #[strum(serialize = "notSpreadableObj")]
    NotSpreadableObj,
    #[strum(serialize = "extraPositionalArg")]
    ExtraPositionalArg,
    #[strum(serialize = "extraNamedArg")]
    ExtraNamedArg,
    #[strum(serialize = "missingPositionalArg")]
    MissingPositionalArg,
    #[strum(serialize = "unknownOpCode")]
    UnknownOpCode,
    // The misspelling is part of the established diagnostic vocabulary.
    #[strum(serialize = "unkownValueType")]
    UnkownValueType,
    /// Malformed bytecode: bad magic, truncated stream, corrupt pool.
    #[strum(serialize = "bytecode")]
    Bytecode,
    /// Incompatible compiler version stamp.
    #[strum(serialize = "version")]
    Version,
    /// An error reported by a bound host function.
    #[strum(serialize = "extern")]
    Extern,
    /// A `throw` statement in script code.
    #[strum(serialize = "scriptThrows")]
    ScriptThrows,
    #[strum(serialize = "assertionFailed")]
    AssertionFailed,
    /// An external declaration with no matching host binding.
    #[strum(serialize = "undefinedExternal")]
    UndefinedExternal,
}

/// Coarse classification of an error: where in the pipeline it originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Parser or analyzer errors, produced by the external compiler.
    #[strum(serialize = "staticError")]
    Static,
    /// Errors raised while executing bytecode.
    #[strum(serialize = "runtimeError")]
    Runtime,
    /// Errors crossing the host interop boundary.
    #[strum(serialize = "externalError")]
    External,
}

/// A diagnostic raised by the interpreter.
///
/// Carries the structured fields the host needs to render or rethrow:
/// code, kind, message, optional extra payload and correction hint, and the
/// script position plus stack trace captured when the error left the loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HetuError {
    pub code: ErrorCode,
    pub kind: ErrorKind,
    pub message: String,
    pub extra: Option<String>,
    pub correction: Option<String>,
    pub filename: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    /// Script-level frames, innermost first, as `(file:line:column) in fn`.
    pub stack_trace: Vec<String>,
}

impl HetuError {
    /// An external-kind error, the shape host bindings report failures
    /// with.
    #[must_use]
    pub fn external(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Extern, ErrorKind::External, message)
    }

    /// A custom diagnostic with an explicit code and kind.
    #[must_use]
    pub fn custom(code: ErrorCode, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::new(code, kind, message)
    }

    pub(crate) fn new(code: ErrorCode, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            code,
            kind,
            message: message.into(),
            extra: None,
            correction: None,
            filename: None,
            line: None,
            column: None,
            stack_trace: Vec::new(),
        }
    }

    pub(crate) fn runtime(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, ErrorKind::Runtime, message)
    }

    /// Attaches the script position, keeping an earlier one if already set.
    pub(crate) fn with_position(mut self, filename: &str, line: u32, column: u32) -> Self {
        if self.filename.is_none() {
            self.filename = Some(filename.to_owned());
            self.line = Some(line);
            self.column = Some(column);
        }
        self
    }

    pub(crate) fn undefined(id: &str) -> Self {
        Self::runtime(ErrorCode::Undefined, format!("Undefined identifier [{id}]."))
    }

    pub(crate) fn defined(id: &str) -> Self {
        Self::runtime(ErrorCode::Defined, format!("[{id}] is already defined."))
    }

    pub(crate) fn private_member(id: &str) -> Self {
        Self::runtime(
            ErrorCode::PrivateMember,
            format!("Could not access private member [{id}]."),
        )
    }

    pub(crate) fn immutable(id: &str) -> Self {
        Self::runtime(ErrorCode::Immutable, format!("[{id}] is immutable."))
    }

    pub(crate) fn not_callable(id: &str) -> Self {
        Self::runtime(ErrorCode::NotCallable, format!("[{id}] is not callable."))
    }

    pub(crate) fn not_newable(id: &str) -> Self {
        Self::runtime(ErrorCode::NotNewable, format!("[{id}] is not newable."))
    }

    pub(crate) fn call_null_object(id: &str) -> Self {
        Self::runtime(ErrorCode::CallNullObject, format!("Calling method [{id}] on null object."))
    }

    pub(crate) fn visit_member_of_null_object(key: &str) -> Self {
        Self::runtime(
            ErrorCode::VisitMemberOfNullObject,
            format!("Visiting member [{key}] on null object."),
        )
    }

    pub(crate) fn sub_get_key(detail: impl Display) -> Self {
        Self::runtime(ErrorCode::SubGetKey, format!("Invalid subscript key [{detail}]."))
    }

    pub(crate) fn null_sub_set_key() -> Self {
        Self::runtime(ErrorCode::NullSubSetKey, "Subscript key is null.")
    }

    pub(crate) fn delete() -> Self {
        Self::runtime(ErrorCode::Delete, "Can only delete a struct or namespace member.")
    }

    pub(crate) fn castee(detail: impl Display) -> Self {
        Self::runtime(ErrorCode::Castee, format!("Illegal cast target [{detail}]."))
    }

    pub(crate) fn type_cast(value: impl Display, target: impl Display) -> Self {
        Self::runtime(
            ErrorCode::TypeCast,
            format!("[{value}] cannot be cast into type [{target}]."),
        )
    }

    pub(crate) fn abstracted(id: &str) -> Self {
        Self::runtime(ErrorCode::Abstracted, format!("Cannot instantiate abstract class [{id}]."))
    }

    pub(crate) fn not_spreadable() -> Self {
        Self::runtime(ErrorCode::NotSpreadableObj, "Spread operand is not a spreadable value.")
    }

    pub(crate) fn extra_positional_arg(id: &str) -> Self {
        Self::runtime(
            ErrorCode::ExtraPositionalArg,
            format!("Too many positional arguments passed to [{id}]."),
        )
    }

    pub(crate) fn extra_named_arg(name: &str, id: &str) -> Self {
        Self::runtime(
            ErrorCode::ExtraNamedArg,
            format!("Unknown named argument [{name}] passed to [{id}]."),
        )
    }

    pub(crate) fn missing_positional_arg(param: &str, id: &str) -> Self {
        Self::runtime(
            ErrorCode::MissingPositionalArg,
            format!("Missing argument [{param}] calling [{id}]."),
        )
    }

    pub(crate) fn unknown_op_code(byte: u8) -> Self {
        Self::runtime(ErrorCode::UnknownOpCode, format!("Unknown opcode [{byte:#04x}]."))
    }

    pub(crate) fn unknown_value_type(byte: u8) -> Self {
        Self::runtime(ErrorCode::UnkownValueType, format!("Unknown value type code [{byte}]."))
    }

    pub(crate) fn bytecode(detail: impl Display) -> Self {
        Self::runtime(ErrorCode::Bytecode, format!("Malformed bytecode: {detail}."))
    }

    pub(crate) fn version(detail: impl Display) -> Self {
        Self::runtime(ErrorCode::Version, format!("Incompatible version: {detail}."))
    }

    pub(crate) fn extern_error(detail: impl Display) -> Self {
        Self::new(ErrorCode::Extern, ErrorKind::External, format!("External error: {detail}"))
    }

    pub(crate) fn script_throws(message: impl Display) -> Self {
        Self::runtime(ErrorCode::ScriptThrows, format!("{message}"))
    }

    pub(crate) fn assertion_failed(source: &str) -> Self {
        Self::runtime(ErrorCode::AssertionFailed, format!("Assertion failed on [{source}]."))
    }

    pub(crate) fn undefined_external(id: &str) -> Self {
        Self::runtime(
            ErrorCode::UndefinedExternal,
            format!("Undefined external declaration [{id}]."),
        )
    }
}

impl Display for HetuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(extra) = &self.extra {
            write!(f, " {extra}")?;
        }
        if let Some(filename) = &self.filename {
            write!(f, " [{filename}")?;
            if let (Some(line), Some(column)) = (self.line, self.column) {
                write!(f, ":{line}:{column}")?;
            }
            f.write_char(']')?;
        }
        for frame in &self.stack_trace {
            write!(f, "\n  {frame}")?;
        }
        if let Some(correction) = &self.correction {
            write!(f, "\n  hint: {correction}")?;
        }
        Ok(())
    }
}

impl std::error::Error for HetuError {}
