use std::fmt::{self, Display};

use indexmap::IndexMap;

use crate::heap::{Heap, HeapId};

/// A type value: the runtime representation `typeof`, `is`, and `as`
/// operate on.
#[derive(Debug, Clone)]
pub(crate) enum HtType {
    Intrinsic(Intrinsic),
    Nominal(NominalType),
    Function(FunctionType),
    Structural(StructuralType),
}

/// The built-in type constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Intrinsic {
    Any,
    Unknown,
    Void,
    Never,
    Type,
    Function,
    Namespace,
    Null,
}

impl Intrinsic {
    pub fn name(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Unknown => "unknown",
            Self::Void => "void",
            Self::Never => "never",
            Self::Type => "type",
            Self::Function => "function",
            Self::Namespace => "namespace",
            Self::Null => "null",
        }
    }
}

/// A named type, optionally resolved to its declaring class.
#[derive(Debug, Clone)]
pub(crate) struct NominalType {
    pub id: String,
    pub type_args: Vec<HtType>,
    pub is_nullable: bool,
    /// Enclosing namespace path of the id, outermost first.
    pub namespaces: Vec<String>,
    /// The class the id resolved to, when resolution has happened.
    pub class: Option<HeapId>,
}

#[derive(Debug, Clone)]
pub(crate) struct FunctionType {
    pub parameter_types: Vec<ParameterType>,
    pub return_type: Box<HtType>,
}

#[derive(Debug, Clone)]
pub(crate) struct ParameterType {
    pub ty: HtType,
    /// Present for named parameters.
    pub id: Option<String>,
    pub is_optional: bool,
    pub is_variadic: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct StructuralType {
    pub field_types: IndexMap<String, HtType>,
}

impl HtType {
    /// A bare nominal type by id, unresolved.
    pub fn nominal(id: &str) -> Self {
        Self::Nominal(NominalType {
            id: id.to_owned(),
            type_args: Vec::new(),
            is_nullable: false,
            namespaces: Vec::new(),
            class: None,
        })
    }

    /// The subtype check backing `is`, `as`, and declared-type conformance.
    ///
    /// `any` is the top type and `never` the bottom; nominal types walk the
    /// superclass chain; function types are contravariant in parameters and
    /// covariant in the return type; a structural type is satisfied when
    /// every field the target requires is present with a conforming type.
    pub fn is_a(&self, target: &Self, heap: &Heap) -> bool {
        if let Self::Intrinsic(Intrinsic::Any | Intrinsic::Unknown) = target {
            return true;
        }
        if let Self::Intrinsic(Intrinsic::Never) = self {
            return true;
        }
        match (self, target) {
            (Self::Intrinsic(a), Self::Intrinsic(b)) => a == b,
            (Self::Intrinsic(Intrinsic::Null), Self::Nominal(nominal)) => nominal.is_nullable,
            (Self::Nominal(a), Self::Nominal(b)) => {
                if a.id == b.id {
                    return true;
                }
                // Walk the superclass chain of the resolved class.
                let mut current = a.class;
                while let Some(class_id) = current {
                    let class = heap.expect_class(class_id);
                    if class.id == b.id {
                        return true;
                    }
                    current = class.super_class;
                }
                false
            }
            (Self::Function(_), Self::Intrinsic(Intrinsic::Function)) => true,
            (Self::Function(a), Self::Function(b)) => {
                if a.parameter_types.len() != b.parameter_types.len() {
                    return false;
                }
                for (own, other) in a.parameter_types.iter().zip(&b.parameter_types) {
                    if own.id != other.id || own.is_variadic != other.is_variadic {
                        return false;
                    }
                    // Contravariant: the target's parameter must conform to ours.
                    if !other.ty.is_a(&own.ty, heap) {
                        return false;
                    }
                }
                a.return_type.is_a(&b.return_type, heap)
            }
            (Self::Structural(a), Self::Structural(b)) => b
                .field_types
                .iter()
                .all(|(id, required)| a.field_types.get(id).is_some_and(|own| own.is_a(required, heap))),
            _ => false,
        }
    }
}

impl Display for HtType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Intrinsic(intrinsic) => f.write_str(intrinsic.name()),
            Self::Nominal(nominal) => {
                for ns in &nominal.namespaces {
                    write!(f, "{ns}.")?;
                }
                f.write_str(&nominal.id)?;
                if !nominal.type_args.is_empty() {
                    f.write_str("<")?;
                    for (i, arg) in nominal.type_args.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{arg}")?;
                    }
                    f.write_str(">")?;
                }
                if nominal.is_nullable {
                    f.write_str("?")?;
                }
                Ok(())
            }
            Self::Function(function) => {
                f.write_str("(")?;
                for (i, param) in function.parameter_types.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    if param.is_variadic {
                        f.write_str("...")?;
                    }
                    if let Some(id) = &param.id {
                        write!(f, "{id}: ")?;
                    }
                    write!(f, "{}", param.ty)?;
                }
                write!(f, ") -> {}", function.return_type)
            }
            Self::Structural(structural) => {
                f.write_str("{")?;
                for (i, (id, ty)) in structural.field_types.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{id}: {ty}")?;
                }
                f.write_str("}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_is_top_and_never_is_bottom() {
        let heap = Heap::new();
        let any = HtType::Intrinsic(Intrinsic::Any);
        let never = HtType::Intrinsic(Intrinsic::Never);
        for ty in [
            HtType::nominal("int"),
            HtType::Intrinsic(Intrinsic::Null),
            HtType::Structural(StructuralType {
                field_types: IndexMap::new(),
            }),
        ] {
            assert!(ty.is_a(&any, &heap));
            assert!(never.is_a(&ty, &heap));
        }
    }

    #[test]
    fn null_conforms_to_nullable_nominals_only() {
        let heap = Heap::new();
        let null = HtType::Intrinsic(Intrinsic::Null);
        let mut nullable = match HtType::nominal("int") {
            HtType::Nominal(n) => n,
            _ => unreachable!(),
        };
        nullable.is_nullable = true;
        assert!(null.is_a(&HtType::Nominal(nullable), &heap));
        assert!(!null.is_a(&HtType::nominal("int"), &heap));
    }

    #[test]
    fn structural_subtyping_checks_required_fields() {
        let heap = Heap::new();
        let mut wide = IndexMap::new();
        wide.insert("x".to_owned(), HtType::nominal("int"));
        wide.insert("y".to_owned(), HtType::nominal("str"));
        let mut narrow = IndexMap::new();
        narrow.insert("x".to_owned(), HtType::nominal("int"));
        let wide = HtType::Structural(StructuralType { field_types: wide });
        let narrow = HtType::Structural(StructuralType { field_types: narrow });
        assert!(wide.is_a(&narrow, &heap));
        assert!(!narrow.is_a(&wide, &heap));
    }

    #[test]
    fn function_subtyping_is_contravariant_in_parameters() {
        let heap = Heap::new();
        let any = HtType::Intrinsic(Intrinsic::Any);
        let takes_any = HtType::Function(FunctionType {
            parameter_types: vec![ParameterType {
                ty: any.clone(),
                id: None,
                is_optional: false,
                is_variadic: false,
            }],
            return_type: Box::new(HtType::nominal("int")),
        });
        let takes_int = HtType::Function(FunctionType {
            parameter_types: vec![ParameterType {
                ty: HtType::nominal("int"),
                id: None,
                is_optional: false,
                is_variadic: false,
            }],
            return_type: Box::new(any),
        });
        // A function accepting anything can stand in for one accepting int,
        // and its int return conforms to the any return.
        assert!(takes_any.is_a(&takes_int, &heap));
        assert!(!takes_int.is_a(&takes_any, &heap));
    }
}
