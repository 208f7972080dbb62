//! Core loop behavior: literals, registers, arithmetic, control flow,
//! assertions, and the idle invariant between host calls.

mod common;

use common::{assign_ident, binary, run, run_err, run_on};
use hetu::{
    BytecodeBuilder, ErrorCode, Hetu, InterpreterConfig, Object, Opcode, Register, SourceType, VarDeclSpec,
};

#[test]
fn variable_declaration_and_addition() {
    // var x = 40; x + 2
    let result = run(|b| {
        b.emit_var_decl(VarDeclSpec::mutable("x").with_initializer(|b| b.emit_const_int(40)));
        b.end_of_stmt();
        b.emit_identifier("x", true);
        binary(b, Register::AdditiveLeft, |b| b.emit_const_int(2), Opcode::Add);
        b.end_of_stmt();
    });
    assert_eq!(result, Object::Int(42));
}

#[test]
fn nested_expression_uses_a_scratch_frame() {
    // (1 + 2) * 3
    let result = run(|b| {
        b.create_stack_frame();
        b.emit_const_int(1);
        binary(b, Register::AdditiveLeft, |b| b.emit_const_int(2), Opcode::Add);
        b.retract_stack_frame();
        binary(b, Register::MultiplicativeLeft, |b| b.emit_const_int(3), Opcode::Multiply);
    });
    assert_eq!(result, Object::Int(9));
}

#[test]
fn division_and_truncation() {
    let result = run(|b| {
        b.emit_const_int(7);
        binary(b, Register::MultiplicativeLeft, |b| b.emit_const_int(2), Opcode::Devide);
    });
    assert_eq!(result, Object::Float(3.5));

    let result = run(|b| {
        b.emit_const_int(7);
        binary(b, Register::MultiplicativeLeft, |b| b.emit_const_int(2), Opcode::TruncatingDevide);
    });
    assert_eq!(result, Object::Int(3));
}

#[test]
fn string_concatenation_stringifies() {
    let result = run(|b| {
        b.emit_const_string("n = ");
        binary(b, Register::AdditiveLeft, |b| b.emit_const_int(7), Opcode::Add);
    });
    assert_eq!(result, Object::Str("n = 7".to_owned()));
}

#[test]
fn string_interpolation_expands_in_place() {
    let result = run(|b| {
        b.emit_string_interpolation(
            "sum is {0}, twice {1}",
            vec![
                Box::new(|b: &mut BytecodeBuilder| b.emit_const_int(3)),
                Box::new(|b: &mut BytecodeBuilder| b.emit_const_int(6)),
            ],
        );
    });
    assert_eq!(result, Object::Str("sum is 3, twice 6".to_owned()));
}

#[test]
fn comparison_and_equality() {
    let result = run(|b| {
        b.emit_const_int(2);
        binary(b, Register::RelationLeft, |b| b.emit_const_int(3), Opcode::Lesser);
    });
    assert_eq!(result, Object::Bool(true));

    let result = run(|b| {
        b.emit_const_int(40);
        binary(b, Register::EqualLeft, |b| b.emit_const_float(40.0), Opcode::Equal);
    });
    assert_eq!(result, Object::Bool(true));
}

#[test]
fn bitwise_operations() {
    let result = run(|b| {
        b.emit_const_int(0b1100);
        binary(b, Register::BitwiseAndLeft, |b| b.emit_const_int(0b1010), Opcode::BitwiseAnd);
    });
    assert_eq!(result, Object::Int(0b1000));

    let result = run(|b| {
        b.emit_const_int(1);
        binary(b, Register::BitwiseShiftLeft, |b| b.emit_const_int(4), Opcode::LeftShift);
    });
    assert_eq!(result, Object::Int(16));
}

#[test]
fn if_statement_branches_on_truthiness() {
    // if (false) { 'then' } else { 'else' }
    let result = run(|b| {
        b.emit_bool(false);
        let then_patch = b.emit_if_stmt();
        b.emit_const_string("then");
        let end_patch = b.emit_skip_forward();
        b.patch_here(then_patch);
        b.emit_const_string("else");
        b.patch_here(end_patch);
    });
    assert_eq!(result, Object::Str("else".to_owned()));
}

#[test]
fn while_loop_accumulates() {
    // var i = 0; var sum = 0; while (i < 3) { i = i + 1; sum = sum + i }; sum
    let result = run(|b| {
        b.emit_var_decl(VarDeclSpec::mutable("i").with_initializer(|b| b.emit_const_int(0)));
        b.end_of_stmt();
        b.emit_var_decl(VarDeclSpec::mutable("sum").with_initializer(|b| b.emit_const_int(0)));
        b.end_of_stmt();
        let lp = b.begin_loop();
        b.emit_identifier("i", true);
        binary(b, Register::RelationLeft, |b| b.emit_const_int(3), Opcode::Lesser);
        b.emit_while_stmt();
        assign_ident(b, "i", |b| {
            b.emit_identifier("i", true);
            binary(b, Register::AdditiveLeft, |b| b.emit_const_int(1), Opcode::Add);
        });
        assign_ident(b, "sum", |b| {
            b.emit_identifier("sum", true);
            binary(b, Register::AdditiveLeft, |b| b.emit_identifier("i", true), Opcode::Add);
        });
        b.emit_skip_to(lp.start);
        b.end_loop(lp, lp.start);
        b.emit_identifier("sum", true);
    });
    assert_eq!(result, Object::Int(6));
}

#[test]
fn do_while_runs_the_body_first() {
    // var i = 0; do { i = i + 1 } while (i < 3); i
    let result = run(|b| {
        b.emit_var_decl(VarDeclSpec::mutable("i").with_initializer(|b| b.emit_const_int(0)));
        b.end_of_stmt();
        let lp = b.begin_loop();
        assign_ident(b, "i", |b| {
            b.emit_identifier("i", true);
            binary(b, Register::AdditiveLeft, |b| b.emit_const_int(1), Opcode::Add);
        });
        let condition = b.mark();
        b.emit_identifier("i", true);
        binary(b, Register::RelationLeft, |b| b.emit_const_int(3), Opcode::Lesser);
        b.emit_do_stmt(true);
        b.end_loop(lp, condition);
        b.emit_identifier("i", true);
    });
    assert_eq!(result, Object::Int(3));
}

#[test]
fn break_leaves_the_loop_early() {
    // var i = 0; while (true) { i = i + 1; if (i == 2) { break } }; i
    let result = run(|b| {
        b.emit_var_decl(VarDeclSpec::mutable("i").with_initializer(|b| b.emit_const_int(0)));
        b.end_of_stmt();
        let lp = b.begin_loop();
        b.emit_bool(true);
        b.emit_while_stmt();
        assign_ident(b, "i", |b| {
            b.emit_identifier("i", true);
            binary(b, Register::AdditiveLeft, |b| b.emit_const_int(1), Opcode::Add);
        });
        b.emit_identifier("i", true);
        binary(b, Register::EqualLeft, |b| b.emit_const_int(2), Opcode::Equal);
        let then_patch = b.emit_if_stmt();
        b.emit_break();
        b.patch_here(then_patch);
        b.emit_skip_to(lp.start);
        b.end_loop(lp, lp.start);
        b.emit_identifier("i", true);
    });
    assert_eq!(result, Object::Int(2));
}

#[test]
fn switch_selects_the_matching_case() {
    let result = run(|b| {
        b.emit_const_int(2);
        b.emit_switch(
            true,
            vec![
                (
                    Box::new(|b: &mut BytecodeBuilder| b.emit_const_int(1)),
                    Box::new(|b: &mut BytecodeBuilder| b.emit_const_string("one")),
                ),
                (
                    Box::new(|b: &mut BytecodeBuilder| b.emit_const_int(2)),
                    Box::new(|b: &mut BytecodeBuilder| b.emit_const_string("two")),
                ),
            ],
            Some(Box::new(|b: &mut BytecodeBuilder| b.emit_const_string("other"))),
        );
    });
    assert_eq!(result, Object::Str("two".to_owned()));
}

#[test]
fn switch_falls_through_to_else() {
    let result = run(|b| {
        b.emit_const_int(9);
        b.emit_switch(
            true,
            vec![(
                Box::new(|b: &mut BytecodeBuilder| b.emit_const_int(1)),
                Box::new(|b: &mut BytecodeBuilder| b.emit_const_string("one")),
            )],
            Some(Box::new(|b: &mut BytecodeBuilder| b.emit_const_string("other"))),
        );
    });
    assert_eq!(result, Object::Str("other".to_owned()));
}

#[test]
fn logical_or_short_circuits() {
    // true || undefined_identifier — the right side must never run.
    let result = run(|b| {
        b.emit_bool(true);
        b.register(Register::OrLeft);
        b.emit_logical_or(|b| b.emit_identifier("nothing_here", true));
    });
    assert_eq!(result, Object::Bool(true));
}

#[test]
fn logical_and_evaluates_the_right_side() {
    let result = run(|b| {
        b.emit_bool(true);
        b.register(Register::AndLeft);
        b.emit_logical_and(|b| b.emit_bool(false));
    });
    assert_eq!(result, Object::Bool(false));
}

#[test]
fn if_null_takes_the_fallback() {
    let result = run(|b| {
        b.emit_null();
        b.register(Register::IfNullLeft);
        b.emit_if_null(|b| b.emit_const_int(5));
    });
    assert_eq!(result, Object::Int(5));

    let result = run(|b| {
        b.emit_const_int(1);
        b.register(Register::IfNullLeft);
        b.emit_if_null(|b| b.emit_const_int(5));
    });
    assert_eq!(result, Object::Int(1));
}

#[test]
fn assertion_failure_carries_the_source_text() {
    let error = run_err(|b| {
        b.emit_bool(false);
        b.emit_assertion("x > 0");
    });
    assert_eq!(error.code, ErrorCode::AssertionFailed);
    assert!(error.message.contains("x > 0"));
}

#[test]
fn throw_carries_the_stringified_operand() {
    let error = run_err(|b| {
        b.emit_const_string("boom");
        b.emit_throws();
    });
    assert_eq!(error.code, ErrorCode::ScriptThrows);
    assert!(error.message.contains("boom"));
}

#[test]
fn assignment_to_undefined_requires_the_policy() {
    let error = run_err(|b| {
        assign_ident(b, "ghost", |b| b.emit_const_int(1));
    });
    assert_eq!(error.code, ErrorCode::Undefined);

    let mut vm = Hetu::new(InterpreterConfig {
        allow_implicit_variable_declaration: true,
        ..InterpreterConfig::default()
    });
    let result = run_on(&mut vm, |b| {
        assign_ident(b, "ghost", |b| b.emit_const_int(1));
        b.emit_identifier("ghost", true);
    });
    assert_eq!(result, Object::Int(1));
}

#[test]
fn list_literals_support_spread() {
    // var a = [1, 2]; [0, ...a]
    let result = run(|b| {
        b.emit_var_decl(VarDeclSpec::mutable("a").with_initializer(|b| {
            b.emit_list(vec![
                (false, Box::new(|b: &mut BytecodeBuilder| b.emit_const_int(1))),
                (false, Box::new(|b: &mut BytecodeBuilder| b.emit_const_int(2))),
            ]);
        }));
        b.end_of_stmt();
        b.emit_list(vec![
            (false, Box::new(|b: &mut BytecodeBuilder| b.emit_const_int(0))),
            (true, Box::new(|b: &mut BytecodeBuilder| b.emit_identifier("a", true))),
        ]);
    });
    assert_eq!(
        result,
        Object::List(vec![Object::Int(0), Object::Int(1), Object::Int(2)])
    );
}

#[test]
fn subscripts_on_lists_and_strings() {
    let result = run(|b| {
        b.emit_var_decl(VarDeclSpec::mutable("a").with_initializer(|b| {
            b.emit_list(vec![
                (false, Box::new(|b: &mut BytecodeBuilder| b.emit_const_int(10))),
                (false, Box::new(|b: &mut BytecodeBuilder| b.emit_const_int(20))),
            ]);
        }));
        b.end_of_stmt();
        b.emit_identifier("a", true);
        b.register(Register::PostfixObject);
        b.emit_const_int(1);
        b.emit_sub_get(false);
    });
    assert_eq!(result, Object::Int(20));

    let error = run_err(|b| {
        b.emit_var_decl(VarDeclSpec::mutable("a").with_initializer(|b| {
            b.emit_list(vec![(false, Box::new(|b: &mut BytecodeBuilder| b.emit_const_int(10)))]);
        }));
        b.end_of_stmt();
        b.emit_identifier("a", true);
        b.register(Register::PostfixObject);
        b.emit_const_string("x");
        b.emit_sub_get(false);
    });
    assert_eq!(error.code, ErrorCode::SubGetKey);
}

#[test]
fn nullable_member_access_on_null_yields_null() {
    let result = run(|b| {
        b.emit_null();
        b.register(Register::PostfixObject);
        b.emit_identifier("anything", false);
        b.register(Register::PostfixKey);
        b.emit_member_get(true);
    });
    assert_eq!(result, Object::Null);

    let error = run_err(|b| {
        b.emit_null();
        b.register(Register::PostfixObject);
        b.emit_identifier("anything", false);
        b.register(Register::PostfixKey);
        b.emit_member_get(false);
    });
    assert_eq!(error.code, ErrorCode::VisitMemberOfNullObject);
}

#[test]
fn the_loop_returns_to_an_idle_state() {
    let mut vm = Hetu::new(InterpreterConfig::default());
    let result = run_on(&mut vm, |b| {
        b.emit_var_decl(VarDeclSpec::mutable("i").with_initializer(|b| b.emit_const_int(0)));
        b.end_of_stmt();
        let lp = b.begin_loop();
        b.emit_identifier("i", true);
        binary(b, Register::RelationLeft, |b| b.emit_const_int(5), Opcode::Lesser);
        b.emit_while_stmt();
        assign_ident(b, "i", |b| {
            b.emit_identifier("i", true);
            binary(b, Register::AdditiveLeft, |b| b.emit_const_int(1), Opcode::Add);
        });
        b.emit_skip_to(lp.start);
        b.end_loop(lp, lp.start);
        b.emit_identifier("i", true);
    });
    assert_eq!(result, Object::Int(5));
    assert!(vm.is_idle(), "frames and registers must be clear between host calls");
}

#[test]
fn code_blocks_scope_their_declarations() {
    // { var inner = 1 } inner — the block-scoped variable is gone.
    let error = run_err(|b| {
        b.begin_code_block("block");
        b.emit_var_decl(VarDeclSpec::mutable("inner").with_initializer(|b| b.emit_const_int(1)));
        b.end_of_stmt();
        b.end_code_block();
        b.emit_identifier("inner", true);
    });
    assert_eq!(error.code, ErrorCode::Undefined);
}

#[test]
fn unknown_opcode_is_rejected() {
    let mut builder = BytecodeBuilder::new();
    builder.begin_file("main.hts", SourceType::Script);
    builder.write_u8(0xEE);
    builder.end_file();
    let bytes = builder.build("main", SourceType::Script);
    let mut vm = Hetu::new(InterpreterConfig::default());
    let error = vm
        .load_bytecode(&bytes, "main", false, None, vec![], vec![])
        .expect_err("invalid opcode should fail");
    assert_eq!(error.code, ErrorCode::UnknownOpCode);
}
