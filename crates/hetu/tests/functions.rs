//! Function declaration, parameter binding, closures, and the arity
//! errors of the binding protocol.

mod common;

use common::{binary, run, run_err};
use hetu::{
    BytecodeBuilder, CallSpec, ErrorCode, FuncDeclSpec, Object, Opcode, ParamSpec, Register, VarDeclSpec,
};

fn add3_decl(b: &mut BytecodeBuilder) {
    // fun add3(a, b, c) { return a + b + c }
    b.emit_func_decl(FuncDeclSpec {
        params: vec![
            ParamSpec::required("a"),
            ParamSpec::required("b"),
            ParamSpec::required("c"),
        ],
        body: Some(Box::new(|b: &mut BytecodeBuilder| {
            b.emit_identifier("a", true);
            binary(b, Register::AdditiveLeft, |b| b.emit_identifier("b", true), Opcode::Add);
            binary(b, Register::AdditiveLeft, |b| b.emit_identifier("c", true), Opcode::Add);
        })),
        ..FuncDeclSpec::named("add3")
    });
    b.end_of_stmt();
}

#[test]
fn positional_arguments_bind_in_order() {
    let result = run(|b| {
        add3_decl(b);
        b.emit_identifier("add3", true);
        b.emit_call(
            CallSpec::default()
                .positional_arg(|b| b.emit_const_int(1))
                .positional_arg(|b| b.emit_const_int(2))
                .positional_arg(|b| b.emit_const_int(3)),
        );
    });
    assert_eq!(result, Object::Int(6));
}

#[test]
fn missing_arguments_are_rejected() {
    let error = run_err(|b| {
        add3_decl(b);
        b.emit_identifier("add3", true);
        b.emit_call(
            CallSpec::default()
                .positional_arg(|b| b.emit_const_int(1))
                .positional_arg(|b| b.emit_const_int(2)),
        );
    });
    assert_eq!(error.code, ErrorCode::MissingPositionalArg);
}

#[test]
fn extra_arguments_are_rejected() {
    let error = run_err(|b| {
        add3_decl(b);
        b.emit_identifier("add3", true);
        b.emit_call(
            CallSpec::default()
                .positional_arg(|b| b.emit_const_int(1))
                .positional_arg(|b| b.emit_const_int(2))
                .positional_arg(|b| b.emit_const_int(3))
                .positional_arg(|b| b.emit_const_int(4)),
        );
    });
    assert_eq!(error.code, ErrorCode::ExtraPositionalArg);
}

#[test]
fn unknown_named_arguments_are_rejected() {
    let error = run_err(|b| {
        add3_decl(b);
        b.emit_identifier("add3", true);
        b.emit_call(
            CallSpec::default()
                .positional_arg(|b| b.emit_const_int(1))
                .positional_arg(|b| b.emit_const_int(2))
                .positional_arg(|b| b.emit_const_int(3))
                .named_arg("bogus", |b| b.emit_const_int(4)),
        );
    });
    assert_eq!(error.code, ErrorCode::ExtraNamedArg);
}

#[test]
fn optional_parameters_evaluate_their_defaults_lazily() {
    // fun step(n, [by = 10]) { return n + by }
    let result = run(|b| {
        b.emit_func_decl(FuncDeclSpec {
            params: vec![
                ParamSpec::required("n"),
                ParamSpec::optional("by", Some(Box::new(|b: &mut BytecodeBuilder| b.emit_const_int(10)))),
            ],
            body: Some(Box::new(|b: &mut BytecodeBuilder| {
                b.emit_identifier("n", true);
                binary(b, Register::AdditiveLeft, |b| b.emit_identifier("by", true), Opcode::Add);
            })),
            ..FuncDeclSpec::named("step")
        });
        b.end_of_stmt();
        b.emit_identifier("step", true);
        b.emit_call(CallSpec::default().positional_arg(|b| b.emit_const_int(1)));
    });
    assert_eq!(result, Object::Int(11));

    let result = run(|b| {
        b.emit_func_decl(FuncDeclSpec {
            params: vec![
                ParamSpec::required("n"),
                ParamSpec::optional("by", Some(Box::new(|b: &mut BytecodeBuilder| b.emit_const_int(10)))),
            ],
            body: Some(Box::new(|b: &mut BytecodeBuilder| {
                b.emit_identifier("n", true);
                binary(b, Register::AdditiveLeft, |b| b.emit_identifier("by", true), Opcode::Add);
            })),
            ..FuncDeclSpec::named("step")
        });
        b.end_of_stmt();
        b.emit_identifier("step", true);
        b.emit_call(
            CallSpec::default()
                .positional_arg(|b| b.emit_const_int(1))
                .positional_arg(|b| b.emit_const_int(2)),
        );
    });
    assert_eq!(result, Object::Int(3));
}

#[test]
fn named_parameters_bind_by_name() {
    // fun greet({who: 'world'}) { return 'hi ' + who }
    let result = run(|b| {
        b.emit_func_decl(FuncDeclSpec {
            params: vec![ParamSpec::named(
                "who",
                Some(Box::new(|b: &mut BytecodeBuilder| b.emit_const_string("world"))),
            )],
            body: Some(Box::new(|b: &mut BytecodeBuilder| {
                b.emit_const_string("hi ");
                binary(b, Register::AdditiveLeft, |b| b.emit_identifier("who", true), Opcode::Add);
            })),
            ..FuncDeclSpec::named("greet")
        });
        b.end_of_stmt();
        b.emit_identifier("greet", true);
        b.emit_call(CallSpec::default().named_arg("who", |b| b.emit_const_string("jim")));
    });
    assert_eq!(result, Object::Str("hi jim".to_owned()));
}

#[test]
fn variadic_parameters_collect_the_tail() {
    // fun first_and_rest(head, ... rest) { return rest }
    let result = run(|b| {
        b.emit_func_decl(FuncDeclSpec {
            params: vec![ParamSpec::required("head"), ParamSpec::variadic("rest")],
            body: Some(Box::new(|b: &mut BytecodeBuilder| b.emit_identifier("rest", true))),
            ..FuncDeclSpec::named("first_and_rest")
        });
        b.end_of_stmt();
        b.emit_identifier("first_and_rest", true);
        b.emit_call(
            CallSpec::default()
                .positional_arg(|b| b.emit_const_int(1))
                .positional_arg(|b| b.emit_const_int(2))
                .positional_arg(|b| b.emit_const_int(3)),
        );
    });
    assert_eq!(result, Object::List(vec![Object::Int(2), Object::Int(3)]));
}

#[test]
fn spread_arguments_flatten_into_positionals() {
    let result = run(|b| {
        add3_decl(b);
        b.emit_var_decl(VarDeclSpec::mutable("args").with_initializer(|b| {
            b.emit_list(vec![
                (false, Box::new(|b: &mut BytecodeBuilder| b.emit_const_int(2))),
                (false, Box::new(|b: &mut BytecodeBuilder| b.emit_const_int(3))),
            ]);
        }));
        b.end_of_stmt();
        b.emit_identifier("add3", true);
        b.emit_call(
            CallSpec::default()
                .positional_arg(|b| b.emit_const_int(1))
                .spread_arg(|b| b.emit_identifier("args", true)),
        );
    });
    assert_eq!(result, Object::Int(6));
}

#[test]
fn closures_capture_their_declaration_scope() {
    // fun make_counter() { var n = 0; return function () { n = n + 1; return n } }
    // var tick = make_counter(); tick(); tick()
    let result = run(|b| {
        b.emit_func_decl(FuncDeclSpec {
            body: Some(Box::new(|b: &mut BytecodeBuilder| {
                b.emit_var_decl(VarDeclSpec::mutable("n").with_initializer(|b| b.emit_const_int(0)));
                b.end_of_stmt();
                b.emit_function_literal(FuncDeclSpec::literal("$tick").with_body(|b| {
                    b.emit_identifier("n", false);
                    b.register(Register::LocalSymbol);
                    b.emit_identifier("n", true);
                    binary(b, Register::AdditiveLeft, |b| b.emit_const_int(1), Opcode::Add);
                    b.emit_assign();
                    b.end_of_stmt();
                    b.emit_identifier("n", true);
                }));
            })),
            ..FuncDeclSpec::named("make_counter")
        });
        b.end_of_stmt();
        b.emit_var_decl(VarDeclSpec::mutable("tick").with_initializer(|b| {
            b.emit_identifier("make_counter", true);
            b.emit_call(CallSpec::default());
        }));
        b.end_of_stmt();
        b.emit_identifier("tick", true);
        b.emit_call(CallSpec::default());
        b.end_of_stmt();
        b.emit_identifier("tick", true);
        b.emit_call(CallSpec::default());
    });
    assert_eq!(result, Object::Int(2));
}

#[test]
fn function_literals_are_first_class_values() {
    // (function (x) { return x * x })(6)
    let result = run(|b| {
        b.emit_function_literal(FuncDeclSpec {
            params: vec![ParamSpec::required("x")],
            body: Some(Box::new(|b: &mut BytecodeBuilder| {
                b.emit_identifier("x", true);
                binary(b, Register::MultiplicativeLeft, |b| b.emit_identifier("x", true), Opcode::Multiply);
            })),
            ..FuncDeclSpec::literal("$square")
        });
        b.emit_call(CallSpec::default().positional_arg(|b| b.emit_const_int(6)));
    });
    assert_eq!(result, Object::Int(36));
}

#[test]
fn calling_a_number_is_not_callable() {
    let error = run_err(|b| {
        b.emit_const_int(3);
        b.emit_call(CallSpec::default());
    });
    assert_eq!(error.code, ErrorCode::NotCallable);
}

#[test]
fn calling_null_respects_the_nullable_flag() {
    let error = run_err(|b| {
        b.emit_null();
        b.emit_call(CallSpec::default());
    });
    assert_eq!(error.code, ErrorCode::CallNullObject);

    let result = run(|b| {
        b.emit_null();
        b.emit_call(CallSpec {
            is_nullable: true,
            ..CallSpec::default()
        });
    });
    assert_eq!(result, Object::Null);
}

#[test]
fn runtime_errors_carry_a_script_stack_trace() {
    // fun inner() { throw 'bad' } fun outer() { inner() } outer()
    let error = run_err(|b| {
        b.emit_func_decl(FuncDeclSpec {
            body: Some(Box::new(|b: &mut BytecodeBuilder| {
                b.emit_const_string("bad");
                b.emit_throws();
            })),
            ..FuncDeclSpec::named("inner")
        });
        b.end_of_stmt();
        b.emit_func_decl(FuncDeclSpec {
            body: Some(Box::new(|b: &mut BytecodeBuilder| {
                b.emit_identifier("inner", true);
                b.emit_call(CallSpec::default());
            })),
            ..FuncDeclSpec::named("outer")
        });
        b.end_of_stmt();
        b.emit_identifier("outer", true);
        b.emit_call(CallSpec::default());
    });
    assert_eq!(error.code, ErrorCode::ScriptThrows);
    assert!(
        error.stack_trace.iter().any(|frame| frame.contains("inner")),
        "stack trace should name the innermost function: {:?}",
        error.stack_trace
    );
}
