//! The binding surface: external functions and methods, external classes
//! and enums, function-type wrappers, and reflection.

mod common;

use common::script;
use hetu::{
    BytecodeBuilder, CallSpec, ClassDeclSpec, ErrorCode, ExternalClass, ExternalReturn, FuncDeclSpec, Hetu,
    InterpreterConfig, Object, Register, RunResult, VarDeclSpec,
};

fn external_fn_decl(b: &mut BytecodeBuilder, id: &str) {
    b.emit_func_decl(FuncDeclSpec {
        is_external: true,
        ..FuncDeclSpec::named(id)
    });
    b.end_of_stmt();
}

#[test]
fn external_functions_receive_positional_and_named_arguments() {
    let bytes = script(|b| {
        external_fn_decl(b, "combine");
        b.emit_identifier("combine", true);
        b.emit_call(
            CallSpec::default()
                .positional_arg(|b| b.emit_const_int(1))
                .named_arg("extra", |b| b.emit_const_string("x")),
        );
    });
    let mut vm = Hetu::new(InterpreterConfig::default());
    vm.bind_external_function("combine", |call| {
        let first = match call.positional.first() {
            Some(Object::Int(n)) => *n,
            other => panic!("unexpected positional {other:?}"),
        };
        let extra = match call.named("extra") {
            Some(Object::Str(s)) => s.clone(),
            other => panic!("unexpected named {other:?}"),
        };
        Ok(ExternalReturn::Value(Object::Str(format!("{first}-{extra}"))))
    });
    let progress = vm.load_bytecode(&bytes, "main", false, None, vec![], vec![]).unwrap();
    assert_eq!(progress.into_complete(), Some(Object::Str("1-x".to_owned())));
}

#[test]
fn unbound_external_declarations_fail_at_call_time() {
    let bytes = script(|b| {
        external_fn_decl(b, "missing");
        b.emit_identifier("missing", true);
        b.emit_call(CallSpec::default());
    });
    let mut vm = Hetu::new(InterpreterConfig::default());
    let error = vm
        .load_bytecode(&bytes, "main", false, None, vec![], vec![])
        .expect_err("unbound external should fail");
    assert_eq!(error.code, ErrorCode::UndefinedExternal);
}

#[test]
fn host_errors_propagate_with_the_extern_code() {
    let bytes = script(|b| {
        external_fn_decl(b, "explode");
        b.emit_identifier("explode", true);
        b.emit_call(CallSpec::default());
    });
    let mut vm = Hetu::new(InterpreterConfig::default());
    vm.bind_external_function("explode", |_call| Err(hetu::HetuError::external("kaboom")));
    let error = vm
        .load_bytecode(&bytes, "main", false, None, vec![], vec![])
        .expect_err("host error should propagate");
    assert_eq!(error.code, ErrorCode::Extern);
    assert!(error.message.contains("kaboom"));
}

#[test]
fn instance_methods_dispatch_by_the_double_colon_convention() {
    // Member calls on an encapsulated host string dispatch to `str::...`.
    let bytes = script(|b| {
        b.emit_var_decl(VarDeclSpec::mutable("s").with_initializer(|b| b.emit_const_string("hetu")));
        b.end_of_stmt();
        b.emit_identifier("s", true);
        b.register(Register::PostfixObject);
        b.emit_identifier("toUpperCase", false);
        b.register(Register::PostfixKey);
        b.emit_member_get(false);
        b.emit_call(CallSpec::default());
    });
    let mut vm = Hetu::new(InterpreterConfig::default());
    vm.bind_external_method("str::toUpperCase", |call| {
        let Some(Object::Str(receiver)) = &call.receiver else {
            panic!("expected a string receiver");
        };
        Ok(ExternalReturn::Value(Object::Str(receiver.to_uppercase())))
    });
    let progress = vm.load_bytecode(&bytes, "main", false, None, vec![], vec![]).unwrap();
    assert_eq!(progress.into_complete(), Some(Object::Str("HETU".to_owned())));
}

#[test]
fn external_classes_construct_through_the_registry() {
    // external class Point { ... }; Point() routes to the host binding.
    let bytes = script(|b| {
        b.begin_class_decl(ClassDeclSpec {
            is_external: true,
            ..ClassDeclSpec::new("Point")
        });
        b.end_class_decl();
        b.end_of_stmt();
        b.emit_identifier("Point", true);
        b.emit_call(
            CallSpec::default()
                .new_operator()
                .positional_arg(|b| b.emit_const_int(3)),
        );
    });
    let mut vm = Hetu::new(InterpreterConfig::default());
    vm.bind_external_function("Point", |call| {
        let Some(Object::Int(x)) = call.positional.first() else {
            panic!("expected the x coordinate");
        };
        Ok(ExternalReturn::Value(Object::External {
            type_id: "Point".to_owned(),
            handle: u64::try_from(*x).unwrap(),
        }))
    });
    let progress = vm.load_bytecode(&bytes, "main", false, None, vec![], vec![]).unwrap();
    assert_eq!(
        progress.into_complete(),
        Some(Object::External {
            type_id: "Point".to_owned(),
            handle: 3,
        })
    );
}

struct PointClass;

impl ExternalClass for PointClass {
    fn type_id(&self) -> &str {
        "Point"
    }

    fn member_get(&self, id: &str) -> RunResult<Object> {
        match id {
            "origin_x" => Ok(Object::Int(0)),
            other => Err(hetu::HetuError::external(format!("no static [{other}]"))),
        }
    }

    fn instance_member_get(&self, object: &Object, id: &str) -> RunResult<Object> {
        let Object::External { handle, .. } = object else {
            return Err(hetu::HetuError::external("not a Point handle"));
        };
        match id {
            "x" => Ok(Object::Int(i64::try_from(*handle).unwrap())),
            other => Err(hetu::HetuError::external(format!("no member [{other}]"))),
        }
    }
}

#[test]
fn external_instances_read_members_through_the_class_binding() {
    let bytes = script(|b| {
        external_fn_decl(b, "make_point");
        b.emit_var_decl(VarDeclSpec::mutable("p").with_initializer(|b| {
            b.emit_identifier("make_point", true);
            b.emit_call(CallSpec::default());
        }));
        b.end_of_stmt();
        b.emit_identifier("p", true);
        b.register(Register::PostfixObject);
        b.emit_identifier("x", false);
        b.register(Register::PostfixKey);
        b.emit_member_get(false);
    });
    let mut vm = Hetu::new(InterpreterConfig::default());
    vm.bind_external_class(Box::new(PointClass));
    vm.bind_external_function("make_point", |_call| {
        Ok(ExternalReturn::Value(Object::External {
            type_id: "Point".to_owned(),
            handle: 11,
        }))
    });
    let progress = vm.load_bytecode(&bytes, "main", false, None, vec![], vec![]).unwrap();
    assert_eq!(progress.into_complete(), Some(Object::Int(11)));
}

#[test]
fn external_enums_define_their_variants() {
    let bytes = script(|b| {
        b.emit_external_enum_decl("Color", true);
        b.end_of_stmt();
        b.emit_identifier("Color", true);
        b.register(Register::PostfixObject);
        b.emit_identifier("green", false);
        b.register(Register::PostfixKey);
        b.emit_member_get(false);
    });
    let mut vm = Hetu::new(InterpreterConfig::default());
    vm.bind_external_enum(
        "Color",
        vec![("red".to_owned(), Object::Int(0)), ("green".to_owned(), Object::Int(1))],
    );
    let progress = vm.load_bytecode(&bytes, "main", false, None, vec![], vec![]).unwrap();
    assert_eq!(progress.into_complete(), Some(Object::Int(1)));
}

#[test]
fn undeclared_external_enums_fail() {
    let bytes = script(|b| {
        b.emit_external_enum_decl("Ghost", true);
    });
    let mut vm = Hetu::new(InterpreterConfig::default());
    let error = vm
        .load_bytecode(&bytes, "main", false, None, vec![], vec![])
        .expect_err("unbound enum should fail");
    assert_eq!(error.code, ErrorCode::UndefinedExternal);
}

#[test]
fn function_type_wrappers_rewrap_literals() {
    let bytes = script(|b| {
        b.emit_function_literal(FuncDeclSpec {
            external_type_id: Some("Callback".to_owned()),
            body: Some(Box::new(|b: &mut BytecodeBuilder| b.emit_const_int(1))),
            ..FuncDeclSpec::literal("$cb")
        });
    });
    let mut vm = Hetu::new(InterpreterConfig::default());
    vm.bind_external_function_type(
        "Callback",
        Box::new(|reference| Object::Str(format!("wrapped:{}", reference.internal_name))),
    );
    let progress = vm.load_bytecode(&bytes, "main", false, None, vec![], vec![]).unwrap();
    assert_eq!(progress.into_complete(), Some(Object::Str("wrapped:$cb".to_owned())));
}

#[test]
fn reflectors_tag_unknown_host_objects() {
    let bytes = script(|b| {
        external_fn_decl(b, "make_widget");
        b.emit_var_decl(VarDeclSpec::mutable("w").with_initializer(|b| {
            b.emit_identifier("make_widget", true);
            b.emit_call(CallSpec::default());
        }));
        b.end_of_stmt();
        b.emit_identifier("w", true);
        b.register(Register::PostfixObject);
        b.emit_identifier("label", false);
        b.register(Register::PostfixKey);
        b.emit_member_get(false);
    });
    let mut vm = Hetu::new(InterpreterConfig::default());
    vm.bind_external_function("make_widget", |_call| {
        Ok(ExternalReturn::Value(Object::External {
            type_id: "opaque".to_owned(),
            handle: 1,
        }))
    });
    vm.bind_external_reflection(Box::new(|object| match object {
        Object::External { type_id, .. } if type_id == "opaque" => Some("Widget".to_owned()),
        _ => None,
    }));
    vm.bind_external_method("Widget::label", |_call| {
        Ok(ExternalReturn::Value(Object::Str("widget!".to_owned())))
    });
    let progress = vm.load_bytecode(&bytes, "main", false, None, vec![], vec![]).unwrap();
    assert_eq!(progress.into_complete(), Some(Object::Str("widget!".to_owned())));
}

#[test]
fn external_class_statics_resolve_via_member_get() {
    let bytes = script(|b| {
        b.begin_class_decl(ClassDeclSpec {
            is_external: true,
            ..ClassDeclSpec::new("Point")
        });
        b.end_class_decl();
        b.end_of_stmt();
        b.emit_identifier("Point", true);
        b.register(Register::PostfixObject);
        b.emit_identifier("origin_x", false);
        b.register(Register::PostfixKey);
        b.emit_member_get(false);
    });
    let mut vm = Hetu::new(InterpreterConfig::default());
    vm.bind_external_class(Box::new(PointClass));
    let progress = vm.load_bytecode(&bytes, "main", false, None, vec![], vec![]).unwrap();
    assert_eq!(progress.into_complete(), Some(Object::Int(0)));
}
