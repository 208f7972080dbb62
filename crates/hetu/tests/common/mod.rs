//! Shared helpers: assemble a script module with the emission backend and
//! run it on a fresh interpreter.
#![allow(dead_code)] // not every test binary uses every helper

use hetu::{BytecodeBuilder, Hetu, HetuError, InterpreterConfig, Object, Register, SourceType};

/// Assembles a one-file script module.
pub fn script(build: impl FnOnce(&mut BytecodeBuilder)) -> Vec<u8> {
    let mut builder = BytecodeBuilder::new();
    builder.begin_file("main.hts", SourceType::Script);
    build(&mut builder);
    builder.end_file();
    builder.build("main", SourceType::Script)
}

/// Runs a script module to completion on a default interpreter.
pub fn run(build: impl FnOnce(&mut BytecodeBuilder)) -> Object {
    let mut vm = Hetu::new(InterpreterConfig::default());
    run_on(&mut vm, build)
}

/// Runs a script module on the given interpreter.
pub fn run_on(vm: &mut Hetu, build: impl FnOnce(&mut BytecodeBuilder)) -> Object {
    let bytes = script(build);
    vm.load_bytecode(&bytes, "main", false, None, vec![], vec![])
        .expect("script should run")
        .into_complete()
        .expect("script should complete synchronously")
}

/// Runs a script module, expecting a runtime error.
pub fn run_err(build: impl FnOnce(&mut BytecodeBuilder)) -> HetuError {
    let mut vm = Hetu::new(InterpreterConfig::default());
    let bytes = script(build);
    vm.load_bytecode(&bytes, "main", false, None, vec![], vec![])
        .expect_err("script should fail")
}

/// Emits `left op right` for an already staged left value: copies the
/// local slot into `register`, stages the right side, then the opcode.
pub fn binary(builder: &mut BytecodeBuilder, register: Register, right: impl FnOnce(&mut BytecodeBuilder), op: hetu::Opcode) {
    builder.register(register);
    right(builder);
    builder.emit(op);
}

/// Emits `ident = <rhs>`.
pub fn assign_ident(builder: &mut BytecodeBuilder, id: &str, rhs: impl FnOnce(&mut BytecodeBuilder)) {
    builder.emit_identifier(id, false);
    builder.register(Register::LocalSymbol);
    rhs(builder);
    builder.emit_assign();
    builder.end_of_stmt();
}

/// Emits `object.key` member access for simple identifier objects.
pub fn member_get(builder: &mut BytecodeBuilder, object: &str, key: &str) {
    builder.emit_identifier(object, true);
    builder.register(Register::PostfixObject);
    builder.emit_identifier(key, false);
    builder.register(Register::PostfixKey);
    builder.emit_member_get(false);
}

/// Emits `object.key = <rhs>` for simple identifier objects.
pub fn member_set(builder: &mut BytecodeBuilder, object: &str, key: &str, rhs: impl FnOnce(&mut BytecodeBuilder)) {
    builder.emit_identifier(object, true);
    builder.register(Register::PostfixObject);
    builder.emit_identifier(key, false);
    builder.register(Register::PostfixKey);
    rhs(builder);
    builder.register(Register::AssignRight);
    builder.emit_member_set(false);
    builder.end_of_stmt();
}
