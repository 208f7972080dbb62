//! Bytecode surface: the instruction set, the wire-format cursor, the
//! emission backend the code generator targets, and version stamping.

pub use builder::{
    BytecodeBuilder, CallSpec, ClassDeclSpec, ConstKind, FuncDeclSpec, ImportExportSpec, LoopPatches, ParamSpec,
    Patch, RedirectSpec, StructFieldSpec, VarDeclSpec,
};
pub use op::{IntrinsicCode, LiteralKind, Opcode, REGISTER_COUNT, Register, TypeKind};
pub use reader::BytecodeReader;
pub use version::{BYTECODE_MAGIC, SourceType, Version};

mod builder;
mod op;
mod reader;
mod version;
