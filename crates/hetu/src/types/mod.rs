//! Runtime object kinds: types, classes, instances, structs, functions,
//! and loaded modules.

pub(crate) use class::{HtCast, HtClass, HtInstance, InstanceFrame};
pub(crate) use function::{
    Builtin, FunctionCategory, FunctionDefinition, HtFunction, Param, RedirectingConstructor,
};
pub(crate) use module::Module;
pub(crate) use strukt::{
    HtStruct, StructLookup, StructStore, StructTemplate, new_struct, struct_assign, struct_clone, struct_contains,
    struct_keys, struct_member_get, struct_member_set, struct_merge, struct_values,
};
pub(crate) use ty::{FunctionType, HtType, Intrinsic, NominalType, ParameterType, StructuralType};

mod class;
mod function;
mod module;
mod strukt;
mod ty;
