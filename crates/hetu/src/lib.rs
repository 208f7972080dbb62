//! An embeddable stack-register bytecode virtual machine for a
//! dynamically-typed scripting language with classes, prototype-based
//! structs, first-class functions, async/await, and host interop.
//!
//! The compiler pipeline (lexer, parser, analyzer, code generator) lives
//! outside this crate: embedders plug theirs in through
//! [`BytecodeCompiler`], targeting [`BytecodeBuilder`] for emission. The
//! VM itself loads self-describing bytecode modules, runs them on a single
//! cooperative loop, and suspends on `await` of a pending host future so
//! the embedder can resolve it without blocking.

mod bytecode;
mod config;
mod error;
mod external;
mod heap;
mod interpreter;
mod namespace;
mod object;
mod types;
mod value;
mod vm;

pub use crate::{
    bytecode::{
        BYTECODE_MAGIC, BytecodeBuilder, BytecodeReader, CallSpec, ClassDeclSpec, ConstKind, FuncDeclSpec,
        ImportExportSpec, IntrinsicCode, LiteralKind, LoopPatches, Opcode, ParamSpec, Patch, REGISTER_COUNT,
        RedirectSpec, Register, SourceType, StructFieldSpec, TypeKind, VarDeclSpec, Version,
    },
    config::{InterpreterConfig, Lexicon},
    error::{ErrorCode, ErrorKind, HetuError, RunResult},
    external::{
        ExternalClass, ExternalReflector, ExternalReturn, FunctionReference, FunctionTypeWrapper, NativeCall,
        NativeFunction,
    },
    interpreter::{BytecodeCompiler, Hetu, Progress, ResourceContext, Suspension},
    object::Object,
};
