//! The suspension protocol: pending host futures, exact-site resumption,
//! async function wrapping, and side-effect ordering across awaits.

mod common;

use std::{cell::RefCell, rc::Rc};

use common::{binary, script};
use hetu::{
    BytecodeBuilder, CallSpec, ErrorCode, ExternalReturn, FuncDeclSpec, Hetu, HetuError, InterpreterConfig, Object,
    Opcode, Progress, Register,
};

fn external_fn_decl(b: &mut BytecodeBuilder, id: &str) {
    b.emit_func_decl(FuncDeclSpec {
        is_external: true,
        ..FuncDeclSpec::named(id)
    });
    b.end_of_stmt();
}

#[test]
fn await_on_a_pending_future_suspends_and_resumes() {
    // fun g() async { return await fetch() * 2 }
    // g()
    let bytes = script(|b| {
        external_fn_decl(b, "fetch");
        b.emit_func_decl(FuncDeclSpec {
            is_async: true,
            body: Some(Box::new(|b: &mut BytecodeBuilder| {
                b.emit_identifier("fetch", true);
                b.emit_call(CallSpec::default());
                b.emit_awaited_value();
                binary(b, Register::MultiplicativeLeft, |b| b.emit_const_int(2), Opcode::Multiply);
            })),
            ..FuncDeclSpec::named("g")
        });
        b.end_of_stmt();
        b.emit_identifier("g", true);
        b.emit_call(CallSpec::default());
    });

    let mut vm = Hetu::new(InterpreterConfig::default());
    vm.bind_external_function("fetch", |_call| Ok(ExternalReturn::Future));
    let progress = vm.load_bytecode(&bytes, "main", false, None, vec![], vec![]).unwrap();
    let suspension = progress.into_await().expect("the pending fetch should suspend the loop");

    let progress = vm.resume(suspension, Object::Int(21)).unwrap();
    assert_eq!(progress.into_complete(), Some(Object::Int(42)));
    assert!(vm.is_idle());
}

#[test]
fn synchronous_external_results_do_not_suspend() {
    let bytes = script(|b| {
        external_fn_decl(b, "fetch");
        b.emit_identifier("fetch", true);
        b.emit_call(CallSpec::default());
        b.emit_awaited_value();
    });

    let mut vm = Hetu::new(InterpreterConfig::default());
    vm.bind_external_function("fetch", |_call| Ok(ExternalReturn::Value(Object::Int(7))));
    let progress = vm.load_bytecode(&bytes, "main", false, None, vec![], vec![]).unwrap();
    assert_eq!(progress.into_complete(), Some(Object::Int(7)));
}

#[test]
fn awaiting_a_plain_value_yields_the_value() {
    let bytes = script(|b| {
        b.emit_const_int(5);
        b.emit_awaited_value();
    });
    let mut vm = Hetu::new(InterpreterConfig::default());
    let progress = vm.load_bytecode(&bytes, "main", false, None, vec![], vec![]).unwrap();
    assert_eq!(progress.into_complete(), Some(Object::Int(5)));
}

#[test]
fn async_functions_wrap_plain_returns_in_a_resolved_future() {
    // fun g() async { return 3 }; await g()
    let bytes = script(|b| {
        b.emit_func_decl(FuncDeclSpec {
            is_async: true,
            body: Some(Box::new(|b: &mut BytecodeBuilder| b.emit_const_int(3))),
            ..FuncDeclSpec::named("g")
        });
        b.end_of_stmt();
        b.emit_identifier("g", true);
        b.emit_call(CallSpec::default());
        b.emit_awaited_value();
    });
    let mut vm = Hetu::new(InterpreterConfig::default());
    let progress = vm.load_bytecode(&bytes, "main", false, None, vec![], vec![]).unwrap();
    assert_eq!(progress.into_complete(), Some(Object::Int(3)));
}

#[test]
fn side_effects_keep_bytecode_order_across_suspension() {
    // record(1); await slow(); record(2)
    let bytes = script(|b| {
        external_fn_decl(b, "record");
        external_fn_decl(b, "slow");
        b.emit_identifier("record", true);
        b.emit_call(CallSpec::default().positional_arg(|b| b.emit_const_int(1)));
        b.end_of_stmt();
        b.emit_identifier("slow", true);
        b.emit_call(CallSpec::default());
        b.emit_awaited_value();
        b.end_of_stmt();
        b.emit_identifier("record", true);
        b.emit_call(CallSpec::default().positional_arg(|b| b.emit_const_int(2)));
        b.end_of_stmt();
    });

    let log = Rc::new(RefCell::new(Vec::new()));
    let mut vm = Hetu::new(InterpreterConfig::default());
    let sink = Rc::clone(&log);
    vm.bind_external_function("record", move |call| {
        if let Some(Object::Int(n)) = call.positional.first() {
            sink.borrow_mut().push(*n);
        }
        Ok(ExternalReturn::Value(Object::Null))
    });
    vm.bind_external_function("slow", |_call| Ok(ExternalReturn::Future));

    let progress = vm.load_bytecode(&bytes, "main", false, None, vec![], vec![]).unwrap();
    assert_eq!(*log.borrow(), vec![1], "nothing after the await may run before resolution");
    let suspension = progress.into_await().unwrap();
    vm.resume(suspension, Object::Null).unwrap();
    assert_eq!(*log.borrow(), vec![1, 2]);
}

#[test]
fn chained_suspensions_resume_one_at_a_time() {
    // await fetch() + await fetch()  (statement-level awaits, summed)
    let bytes = script(|b| {
        external_fn_decl(b, "fetch");
        // var a = nothing yet: evaluate first await into a register frame.
        b.emit_identifier("fetch", true);
        b.emit_call(CallSpec::default());
        b.emit_awaited_value();
        b.register(Register::AdditiveLeft);
        b.emit_identifier("fetch", true);
        b.emit_call(CallSpec::default());
        b.emit_awaited_value();
        b.emit(Opcode::Add);
    });

    let mut vm = Hetu::new(InterpreterConfig::default());
    vm.bind_external_function("fetch", |_call| Ok(ExternalReturn::Future));
    let progress = vm.load_bytecode(&bytes, "main", false, None, vec![], vec![]).unwrap();
    let first = progress.into_await().unwrap();
    let progress = vm.resume(first, Object::Int(40)).unwrap();
    let second = progress.into_await().expect("the second fetch should suspend again");
    let progress = vm.resume(second, Object::Int(2)).unwrap();
    assert_eq!(progress.into_complete(), Some(Object::Int(42)));
}

#[test]
fn resume_error_surfaces_as_an_external_error() {
    let bytes = script(|b| {
        external_fn_decl(b, "fetch");
        b.emit_identifier("fetch", true);
        b.emit_call(CallSpec::default());
        b.emit_awaited_value();
    });
    let mut vm = Hetu::new(InterpreterConfig::default());
    vm.bind_external_function("fetch", |_call| Ok(ExternalReturn::Future));
    let progress = vm.load_bytecode(&bytes, "main", false, None, vec![], vec![]).unwrap();
    let suspension = progress.into_await().unwrap();
    let error = vm
        .resume_error(suspension, HetuError::external("connection reset"))
        .expect_err("a failed future should raise at the await site");
    assert_eq!(error.code, ErrorCode::Extern);
    assert!(error.message.contains("connection reset"));
}

#[test]
fn invoking_an_async_function_by_name_suspends_too() {
    let bytes = script(|b| {
        external_fn_decl(b, "fetch");
        b.emit_func_decl(FuncDeclSpec {
            is_async: true,
            body: Some(Box::new(|b: &mut BytecodeBuilder| {
                b.emit_identifier("fetch", true);
                b.emit_call(CallSpec::default());
                b.emit_awaited_value();
            })),
            ..FuncDeclSpec::named("g")
        });
        b.end_of_stmt();
    });
    let mut vm = Hetu::new(InterpreterConfig::default());
    vm.bind_external_function("fetch", |_call| Ok(ExternalReturn::Future));
    vm.load_bytecode(&bytes, "main", false, None, vec![], vec![])
        .unwrap();
    let progress = vm.invoke("g", vec![], vec![]).unwrap();
    let suspension = progress.into_await().unwrap();
    let progress = vm.resume(suspension, Object::Int(9)).unwrap();
    assert_eq!(progress.into_complete(), Some(Object::Int(9)));
}

#[test]
fn loading_while_suspended_is_rejected_without_losing_state() {
    let bytes = script(|b| {
        external_fn_decl(b, "fetch");
        b.emit_identifier("fetch", true);
        b.emit_call(CallSpec::default());
        b.emit_awaited_value();
    });
    let mut vm = Hetu::new(InterpreterConfig::default());
    vm.bind_external_function("fetch", |_call| Ok(ExternalReturn::Future));
    let progress = vm.load_bytecode(&bytes, "main", false, None, vec![], vec![]).unwrap();
    let suspension = progress.into_await().unwrap();

    let other = script(|b| b.emit_const_int(1));
    let error = vm
        .load_bytecode(&other, "other", false, None, vec![], vec![])
        .expect_err("loading during a suspension must be rejected");
    assert_eq!(error.code, ErrorCode::Extern);

    // The suspension survives the rejected call and still resumes.
    let progress = vm.resume(suspension, Object::Int(3)).unwrap();
    let Progress::Complete(value) = progress else {
        panic!("expected completion");
    };
    assert_eq!(value, Object::Int(3));
}
