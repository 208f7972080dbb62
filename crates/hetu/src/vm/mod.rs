//! The dispatch loop.
//!
//! One flat loop executes everything: module top level, function bodies,
//! constructor chains, getters. Script calls push a call record and keep
//! looping; `endOfFunc` pops one and routes the frame's local value into
//! the caller. Because the loop never recurses for calls, an `await` on a
//! pending host future can freeze the whole machine state in place and
//! resume it later at the exact instruction.

mod call;
mod decl;
mod import;
mod literal;
mod member;

use std::rc::Rc;

use smallvec::SmallVec;

use crate::{
    bytecode::{Opcode, REGISTER_COUNT, Register},
    error::{HetuError, RunResult},
    heap::{FutureState, HeapData, HeapId},
    interpreter::Hetu,
    value::{self, Value},
};

/// Role-indexed operand slots plus the loop and goto stacks of one frame.
#[derive(Debug, Clone)]
pub(crate) struct StackFrame {
    pub registers: [Value; REGISTER_COUNT],
    pub loops: SmallVec<[LoopRecord; 4]>,
    pub anchors: SmallVec<[usize; 4]>,
}

impl Default for StackFrame {
    fn default() -> Self {
        Self {
            registers: [Value::Null; REGISTER_COUNT],
            loops: SmallVec::new(),
            anchors: SmallVec::new(),
        }
    }
}

impl StackFrame {
    /// Whether every slot and stack is back to its initial state.
    pub(crate) fn is_clear(&self) -> bool {
        self.registers.iter().all(|value| value.is_null()) && self.loops.is_empty() && self.anchors.is_empty()
    }
}

/// One `loopPoint` record: where the body starts, where `continue` and
/// `break` land, and the namespace to restore on exit.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LoopRecord {
    pub start_ip: usize,
    pub continue_ip: usize,
    pub break_ip: usize,
    pub namespace: HeapId,
}

/// Where a returning call frame routes its result.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Completion {
    /// Into the caller frame's local value slot.
    LocalValue,
    /// The constructed instance, regardless of the body's value.
    Instance(HeapId),
    Discard,
}

/// Everything needed to come back from a script call.
#[derive(Debug)]
pub(crate) struct CallRecord {
    pub function: HeapId,
    pub return_ip: usize,
    pub return_module: String,
    pub return_file: String,
    pub return_namespace: HeapId,
    pub return_line: u16,
    pub return_column: u16,
    /// Frame stack height to restore; everything above belongs to the call.
    pub frame_depth: usize,
    pub completion: Completion,
    /// Wrap the result in a resolved future on return.
    pub is_async: bool,
}

/// The loop's position: module, file, namespace, instruction pointer, and
/// source location. Cheap to snapshot, which is what suspension does.
#[derive(Debug, Clone)]
pub(crate) struct ExecContext {
    pub module: String,
    pub file: String,
    pub namespace: HeapId,
    pub ip: usize,
    pub line: u16,
    pub column: u16,
    pub script_mode: bool,
    pub globally_import: bool,
}

/// Restore point pushed by the `file` opcode.
#[derive(Debug, Clone)]
pub(crate) struct FileRestore {
    pub file: String,
    pub namespace: HeapId,
}

/// How one `execute` run ended.
#[derive(Debug)]
pub(crate) enum LoopExit {
    Value(Value),
    /// Waiting on the host future correlated by this call id; the machine
    /// state stays frozen in the interpreter.
    Suspended(u32),
}

impl Hetu {
    pub(crate) fn current_frame(&self) -> &StackFrame {
        self.frames.last().expect("frame stack is never empty while executing")
    }

    pub(crate) fn current_frame_mut(&mut self) -> &mut StackFrame {
        self.frames.last_mut().expect("frame stack is never empty while executing")
    }

    /// The staged local value of the current frame.
    pub(crate) fn local(&self) -> Value {
        self.current_frame().registers[Register::LocalValue as usize]
    }

    pub(crate) fn set_local(&mut self, value: Value) {
        self.current_frame_mut().registers[Register::LocalValue as usize] = value;
    }

    pub(crate) fn reg(&self, register: Register) -> Value {
        self.current_frame().registers[register as usize]
    }

    /// Shared handle to the current module's bytes; cloning the handle lets
    /// the loop read code while freely mutating the heap.
    pub(crate) fn code(&self) -> Rc<[u8]> {
        Rc::clone(&self.modules[&self.ctx.module].bytes)
    }

    // --- operand fetching ---

    pub(crate) fn fetch_u8(&mut self, code: &[u8]) -> RunResult<u8> {
        let byte = *code
            .get(self.ctx.ip)
            .ok_or_else(|| HetuError::bytecode("unexpected end of instruction stream"))?;
        self.ctx.ip += 1;
        Ok(byte)
    }

    pub(crate) fn fetch_bool(&mut self, code: &[u8]) -> RunResult<bool> {
        Ok(self.fetch_u8(code)? != 0)
    }

    pub(crate) fn fetch_u16(&mut self, code: &[u8]) -> RunResult<u16> {
        let lo = self.fetch_u8(code)?;
        let hi = self.fetch_u8(code)?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    pub(crate) fn fetch_i16(&mut self, code: &[u8]) -> RunResult<i16> {
        let lo = self.fetch_u8(code)?;
        let hi = self.fetch_u8(code)?;
        Ok(i16::from_le_bytes([lo, hi]))
    }

    pub(crate) fn fetch_utf8(&mut self, code: &[u8]) -> RunResult<String> {
        let len = self.fetch_u16(code)? as usize;
        let end = self
            .ctx
            .ip
            .checked_add(len)
            .filter(|&end| end <= code.len())
            .ok_or_else(|| HetuError::bytecode("string extends past end of stream"))?;
        let s = String::from_utf8(code[self.ctx.ip..end].to_vec())
            .map_err(|_| HetuError::bytecode("invalid utf-8 string"))?;
        self.ctx.ip = end;
        Ok(s)
    }

    /// Reads a u16 length prefix and returns the chunk's start, advancing
    /// past its bytes.
    pub(crate) fn fetch_chunk(&mut self, code: &[u8]) -> RunResult<usize> {
        let len = self.fetch_u16(code)? as usize;
        let start = self.ctx.ip;
        if start + len > code.len() {
            return Err(HetuError::bytecode("expression chunk extends past end of stream"));
        }
        self.ctx.ip = start + len;
        Ok(start)
    }

    /// Evaluates an inline expression chunk in its own frame and restores
    /// the loop position afterwards. Suspension cannot cross this boundary.
    pub(crate) fn run_expr_at(&mut self, module: &str, ip: usize, namespace: HeapId) -> RunResult<Value> {
        let saved = self.ctx.clone();
        self.ctx.module = module.to_owned();
        self.ctx.ip = ip;
        self.ctx.namespace = namespace;
        self.frames.push(StackFrame::default());
        let result = self.execute(self.call_stack.len(), false);
        self.frames.pop();
        self.ctx = saved;
        match result? {
            LoopExit::Value(value) => Ok(value),
            LoopExit::Suspended(_) => Err(HetuError::extern_error(
                "await on a pending future is only supported at statement level",
            )),
        }
    }

    /// Convenience for chunks in the current module and namespace.
    pub(crate) fn run_expr(&mut self, ip: usize) -> RunResult<Value> {
        let module = self.ctx.module.clone();
        let namespace = self.ctx.namespace;
        self.run_expr_at(&module, ip, namespace)
    }

    /// Main execution loop.
    ///
    /// Runs until the stream ends (`endOfCode` / `endOfModule`), the
    /// expression base exits (`endOfExec` at `base_call_depth`), a call
    /// pushed before entry returns (`endOfFunc` dropping below the base),
    /// or an await suspends.
    pub(crate) fn execute(&mut self, base_call_depth: usize, allow_suspend: bool) -> RunResult<LoopExit> {
        let mut cached_module = self.ctx.module.clone();
        let mut code = self.code();

        loop {
            if self.ctx.module != cached_module {
                cached_module.clone_from(&self.ctx.module);
                code = self.code();
            }
            let op = Opcode::from_byte(self.fetch_u8(&code)?)?;
            match op {
                // ============================================================
                // Meta
                // ============================================================
                Opcode::LineInfo => {
                    self.ctx.line = self.fetch_u16(&code)?;
                    self.ctx.column = self.fetch_u16(&code)?;
                }
                Opcode::File => self.op_file(&code)?,
                Opcode::EndOfFile => {
                    if let Some(restore) = self.file_stack.pop() {
                        self.ctx.file = restore.file;
                        self.ctx.namespace = restore.namespace;
                    }
                }
                Opcode::CodeBlock => {
                    let id = self.fetch_utf8(&code)?;
                    let ns = crate::namespace::HtNamespace::new(id, None, Some(self.ctx.namespace), &self.heap);
                    self.ctx.namespace = self.heap.allocate(HeapData::Namespace(ns));
                }
                Opcode::EndOfCodeBlock => {
                    let closure = self.heap.expect_namespace(self.ctx.namespace).closure;
                    self.ctx.namespace = closure.expect("code block namespace always has an enclosing scope");
                }
                Opcode::EndOfStmt => {}
                Opcode::EndOfExec => {
                    debug_assert_eq!(self.call_stack.len(), base_call_depth, "endOfExec inside an open call");
                    return Ok(LoopExit::Value(self.local()));
                }
                Opcode::EndOfFunc => {
                    self.pop_call_frame();
                    if self.call_stack.len() < base_call_depth {
                        return Ok(LoopExit::Value(self.local()));
                    }
                }
                Opcode::EndOfModule => {
                    let module = self.ctx.module.clone();
                    self.resolve_module_imports(&module)?;
                    if self.ctx.globally_import
                        && let Some(entry) = self.modules[&module].entry_namespace()
                    {
                        let lexicon = self.config.lexicon.clone();
                        crate::namespace::import_into(
                            &mut self.heap,
                            self.global_namespace,
                            entry,
                            &[],
                            None,
                            &lexicon,
                        )?;
                    }
                    return Ok(LoopExit::Value(self.local()));
                }
                Opcode::EndOfCode => return Ok(LoopExit::Value(self.local())),
                Opcode::ConstIntTable => {
                    let count = self.fetch_u16(&code)? as usize;
                    let mut values = Vec::with_capacity(count);
                    for _ in 0..count {
                        let mut buf = [0u8; 8];
                        for byte in &mut buf {
                            *byte = self.fetch_u8(&code)?;
                        }
                        values.push(i64::from_le_bytes(buf));
                    }
                    self.modules[&self.ctx.module].const_ints = values;
                }
                Opcode::ConstFloatTable => {
                    let count = self.fetch_u16(&code)? as usize;
                    let mut values = Vec::with_capacity(count);
                    for _ in 0..count {
                        let mut buf = [0u8; 8];
                        for byte in &mut buf {
                            *byte = self.fetch_u8(&code)?;
                        }
                        values.push(f64::from_le_bytes(buf));
                    }
                    self.modules[&self.ctx.module].const_floats = values;
                }
                Opcode::ConstStringTable => {
                    let count = self.fetch_u16(&code)? as usize;
                    let mut values = Vec::with_capacity(count);
                    for _ in 0..count {
                        values.push(self.fetch_utf8(&code)?);
                    }
                    self.modules[&self.ctx.module].const_strings = values;
                }

                // ============================================================
                // Register traffic
                // ============================================================
                Opcode::Local => self.op_local(&code)?,
                Opcode::Register => {
                    let index = self.fetch_u8(&code)?;
                    let register = Register::from_byte(index)?;
                    let value = self.local();
                    self.current_frame_mut().registers[register as usize] = value;
                }
                Opcode::CreateStackFrame => self.frames.push(StackFrame::default()),
                Opcode::RetractStackFrame => {
                    let inner = self.local();
                    self.frames.pop();
                    self.set_local(inner);
                }

                // ============================================================
                // Control flow
                // ============================================================
                Opcode::Skip => {
                    let distance = self.fetch_i16(&code)?;
                    let ip = i64::try_from(self.ctx.ip).expect("instruction pointer exceeds i64") + i64::from(distance);
                    self.ctx.ip = usize::try_from(ip).map_err(|_| HetuError::bytecode("skip to negative ip"))?;
                }
                Opcode::Anchor => {
                    let ip = self.ctx.ip;
                    self.current_frame_mut().anchors.push(ip);
                }
                Opcode::ClearAnchor => {
                    self.current_frame_mut().anchors.pop();
                }
                Opcode::Goto => {
                    let offset = self.fetch_u16(&code)? as usize;
                    let anchor = *self
                        .current_frame()
                        .anchors
                        .last()
                        .ok_or_else(|| HetuError::bytecode("goto without an anchor"))?;
                    self.ctx.ip = anchor + offset;
                }
                Opcode::LoopPoint => {
                    let continue_len = self.fetch_u16(&code)? as usize;
                    let break_len = self.fetch_u16(&code)? as usize;
                    let start_ip = self.ctx.ip;
                    let namespace = self.ctx.namespace;
                    self.current_frame_mut().loops.push(LoopRecord {
                        start_ip,
                        continue_ip: start_ip + continue_len,
                        break_ip: start_ip + break_len,
                        namespace,
                    });
                }
                Opcode::BreakLoop => {
                    let record = self
                        .current_frame_mut()
                        .loops
                        .pop()
                        .ok_or_else(|| HetuError::bytecode("break outside a loop"))?;
                    self.ctx.ip = record.break_ip;
                    self.ctx.namespace = record.namespace;
                }
                Opcode::ContinueLoop => {
                    let record = *self
                        .current_frame()
                        .loops
                        .last()
                        .ok_or_else(|| HetuError::bytecode("continue outside a loop"))?;
                    self.ctx.ip = record.continue_ip;
                }
                Opcode::IfStmt => {
                    let then_len = self.fetch_u16(&code)? as usize;
                    if !value::truthy(self.local(), &self.heap, &self.config) {
                        self.ctx.ip += then_len;
                    }
                }
                Opcode::WhileStmt => {
                    if !value::truthy(self.local(), &self.heap, &self.config) {
                        let record = self
                            .current_frame_mut()
                            .loops
                            .pop()
                            .ok_or_else(|| HetuError::bytecode("while outside a loop"))?;
                        self.ctx.ip = record.break_ip;
                        self.ctx.namespace = record.namespace;
                    }
                }
                Opcode::DoStmt => {
                    let has_condition = self.fetch_bool(&code)?;
                    let repeat = has_condition && value::truthy(self.local(), &self.heap, &self.config);
                    if repeat {
                        let record = *self
                            .current_frame()
                            .loops
                            .last()
                            .ok_or_else(|| HetuError::bytecode("do outside a loop"))?;
                        self.ctx.ip = record.start_ip;
                    } else {
                        self.current_frame_mut().loops.pop();
                    }
                }
                Opcode::SwitchStmt => self.op_switch(&code)?,

                // ============================================================
                // Logic and arithmetic
                // ============================================================
                Opcode::LogicalOr => {
                    let left = self.reg(Register::OrLeft);
                    let chunk = self.fetch_chunk(&code)?;
                    if value::truthy(left, &self.heap, &self.config) {
                        self.set_local(Value::Bool(true));
                    } else {
                        let right = self.run_expr(chunk)?;
                        let result = value::truthy(right, &self.heap, &self.config);
                        self.set_local(Value::Bool(result));
                    }
                }
                Opcode::LogicalAnd => {
                    let left = self.reg(Register::AndLeft);
                    let chunk = self.fetch_chunk(&code)?;
                    if value::truthy(left, &self.heap, &self.config) {
                        let right = self.run_expr(chunk)?;
                        let result = value::truthy(right, &self.heap, &self.config);
                        self.set_local(Value::Bool(result));
                    } else {
                        self.set_local(Value::Bool(false));
                    }
                }
                Opcode::IfNull => {
                    let left = self.reg(Register::IfNullLeft);
                    let chunk = self.fetch_chunk(&code)?;
                    if left.is_null() {
                        let right = self.run_expr(chunk)?;
                        self.set_local(right);
                    } else {
                        self.set_local(left);
                    }
                }
                Opcode::Equal => {
                    let left = self.reg(Register::EqualLeft);
                    let result = value::values_equal(left, self.local(), &self.heap);
                    self.set_local(Value::Bool(result));
                }
                Opcode::NotEqual => {
                    let left = self.reg(Register::EqualLeft);
                    let result = !value::values_equal(left, self.local(), &self.heap);
                    self.set_local(Value::Bool(result));
                }
                Opcode::Lesser => self.relational(op)?,
                Opcode::Greater => self.relational(op)?,
                Opcode::LesserOrEqual => self.relational(op)?,
                Opcode::GreaterOrEqual => self.relational(op)?,
                Opcode::Add => {
                    let left = self.reg(Register::AdditiveLeft);
                    let result = value::add(left, self.local(), &mut self.heap, &self.config)?;
                    self.set_local(result);
                }
                Opcode::Subtract => {
                    let left = self.reg(Register::AdditiveLeft);
                    let result = value::subtract(left, self.local(), &mut self.heap, &self.config)?;
                    self.set_local(result);
                }
                Opcode::Multiply => {
                    let left = self.reg(Register::MultiplicativeLeft);
                    let result = value::multiply(left, self.local(), &mut self.heap, &self.config)?;
                    self.set_local(result);
                }
                Opcode::Devide => {
                    let left = self.reg(Register::MultiplicativeLeft);
                    let result = value::divide(left, self.local(), &mut self.heap, &self.config)?;
                    self.set_local(result);
                }
                Opcode::TruncatingDevide => {
                    let left = self.reg(Register::MultiplicativeLeft);
                    let result = value::truncating_divide(left, self.local(), &mut self.heap, &self.config)?;
                    self.set_local(result);
                }
                Opcode::Modulo => {
                    let left = self.reg(Register::MultiplicativeLeft);
                    let result = value::modulo(left, self.local(), &mut self.heap, &self.config)?;
                    self.set_local(result);
                }
                Opcode::Negative => {
                    let result = value::negate(self.local(), &mut self.heap)?;
                    self.set_local(result);
                }
                Opcode::LogicalNot => {
                    let result = !value::truthy(self.local(), &self.heap, &self.config);
                    self.set_local(Value::Bool(result));
                }
                Opcode::BitwiseNot => {
                    let operand = self
                        .local()
                        .as_i64(&self.heap, &self.config)
                        .ok_or_else(|| HetuError::runtime(crate::error::ErrorCode::UnkownValueType, "Bitwise operand is not an integer."))?;
                    self.set_local(Value::Int(!operand));
                }
                Opcode::BitwiseOr => self.bitwise(op, Register::BitwiseOrLeft)?,
                Opcode::BitwiseXor => self.bitwise(op, Register::BitwiseXorLeft)?,
                Opcode::BitwiseAnd => self.bitwise(op, Register::BitwiseAndLeft)?,
                Opcode::LeftShift => self.bitwise(op, Register::BitwiseShiftLeft)?,
                Opcode::RightShift => self.bitwise(op, Register::BitwiseShiftLeft)?,
                Opcode::UnsignedRightShift => self.bitwise(op, Register::BitwiseShiftLeft)?,

                // ============================================================
                // Type operations
                // ============================================================
                Opcode::TypeAs => self.op_type_as()?,
                Opcode::TypeIs => self.op_type_is(false)?,
                Opcode::TypeIsNot => self.op_type_is(true)?,
                Opcode::TypeValueOf => {
                    let ty = value::type_of(self.local(), &self.heap, &self.config.lexicon);
                    let handle = self.heap.allocate(HeapData::Type(ty));
                    self.set_local(Value::Ref(handle));
                }
                Opcode::DecltypeOf => self.op_decltype_of()?,

                // ============================================================
                // Member access
                // ============================================================
                Opcode::MemberGet => self.op_member_get(&code)?,
                Opcode::MemberSet => self.op_member_set(&code)?,
                Opcode::SubGet => self.op_sub_get(&code)?,
                Opcode::SubSet => self.op_sub_set(&code)?,

                // ============================================================
                // Declarations
                // ============================================================
                Opcode::ImportExportDecl => self.op_import_export_decl(&code)?,
                Opcode::TypeAliasDecl => self.op_type_alias_decl(&code)?,
                Opcode::FuncDecl => self.op_func_decl(&code)?,
                Opcode::ClassDecl => self.op_class_decl(&code)?,
                Opcode::ClassDeclEnd => self.op_class_decl_end()?,
                Opcode::ExternalEnumDecl => self.op_external_enum_decl(&code)?,
                Opcode::StructDecl => self.op_struct_decl(&code)?,
                Opcode::VarDecl => self.op_var_decl(&code)?,
                Opcode::DestructuringDecl => self.op_destructuring_decl(&code)?,
                Opcode::ConstDecl => self.op_const_decl(&code)?,
                Opcode::NamespaceDecl => self.op_namespace_decl(&code)?,
                Opcode::NamespaceDeclEnd => {
                    let closure = self.heap.expect_namespace(self.ctx.namespace).closure;
                    self.ctx.namespace = closure.expect("namespace declaration always has an enclosing scope");
                }

                // ============================================================
                // Assertions and errors
                // ============================================================
                Opcode::Assertion => {
                    let source = self.fetch_utf8(&code)?;
                    if !value::truthy(self.local(), &self.heap, &self.config) {
                        return Err(HetuError::assertion_failed(&source));
                    }
                }
                Opcode::Throws => {
                    let message = value::stringify(self.local(), &self.heap);
                    return Err(HetuError::script_throws(message));
                }
                Opcode::Delete => self.op_delete(&code)?,

                // ============================================================
                // Assignment
                // ============================================================
                Opcode::Assign => self.op_assign()?,

                // ============================================================
                // Call
                // ============================================================
                Opcode::Call => self.op_call(&code)?,

                // ============================================================
                // Async
                // ============================================================
                Opcode::AwaitedValue => {
                    let value = self.local();
                    if let Value::Ref(id) = value
                        && let HeapData::Future(state) = self.heap.get(id)
                    {
                        match state {
                            FutureState::Resolved(inner) => {
                                let inner = *inner;
                                self.set_local(inner);
                            }
                            FutureState::Pending(call_id) => {
                                let call_id = *call_id;
                                if !allow_suspend {
                                    return Err(HetuError::extern_error(
                                        "await on a pending future is only supported at statement level",
                                    ));
                                }
                                return Ok(LoopExit::Suspended(call_id));
                            }
                        }
                    }
                    // Awaiting a non-future value yields the value itself.
                }
            }
        }
    }

    fn relational(&mut self, op: Opcode) -> RunResult<()> {
        use std::cmp::Ordering;
        let left = self.reg(Register::RelationLeft);
        let (symbol, test): (&str, fn(Ordering) -> bool) = match op {
            Opcode::Lesser => ("<", |ordering| ordering == Ordering::Less),
            Opcode::Greater => (">", |ordering| ordering == Ordering::Greater),
            Opcode::LesserOrEqual => ("<=", |ordering| ordering != Ordering::Greater),
            Opcode::GreaterOrEqual => (">=", |ordering| ordering != Ordering::Less),
            _ => unreachable!("relational called with a non-relational opcode"),
        };
        let ordering = value::compare(symbol, left, self.local(), &self.heap, &self.config)?;
        self.set_local(Value::Bool(test(ordering)));
        Ok(())
    }

    fn bitwise(&mut self, op: Opcode, register: Register) -> RunResult<()> {
        let not_an_int =
            || HetuError::runtime(crate::error::ErrorCode::UnkownValueType, "Bitwise operand is not an integer.");
        let left = self.reg(register).as_i64(&self.heap, &self.config).ok_or_else(not_an_int)?;
        let right = self.local().as_i64(&self.heap, &self.config).ok_or_else(not_an_int)?;
        let result = match op {
            Opcode::BitwiseOr => left | right,
            Opcode::BitwiseXor => left ^ right,
            Opcode::BitwiseAnd => left & right,
            Opcode::LeftShift => left.wrapping_shl(u32::try_from(right.rem_euclid(64)).expect("shift amount in range")),
            Opcode::RightShift => {
                left.wrapping_shr(u32::try_from(right.rem_euclid(64)).expect("shift amount in range"))
            }
            Opcode::UnsignedRightShift => {
                let amount = u32::try_from(right.rem_euclid(64)).expect("shift amount in range");
                ((left as u64).wrapping_shr(amount)) as i64
            }
            _ => unreachable!("bitwise called with a non-bitwise opcode"),
        };
        self.set_local(Value::Int(result));
        Ok(())
    }

    /// `as`: builds a cast view after checking conformance.
    fn op_type_as(&mut self) -> RunResult<()> {
        let castee = self.reg(Register::RelationLeft);
        let target = self.expect_type_operand()?;
        let Value::Ref(castee_id) = castee else {
            return Err(HetuError::castee(value::stringify(castee, &self.heap)));
        };
        let instance_id = match self.heap.get(castee_id) {
            HeapData::Instance(_) => castee_id,
            HeapData::Cast(cast) => cast.instance,
            other => return Err(HetuError::castee(other.kind_name())),
        };
        let value_type = value::type_of(Value::Ref(instance_id), &self.heap, &self.config.lexicon);
        if !value_type.is_a(&target, &self.heap) {
            return Err(HetuError::type_cast(value::stringify(castee, &self.heap), target));
        }
        let class = self.resolve_type_class(&target)?;
        let cast = self.heap.allocate(HeapData::Cast(crate::types::HtCast {
            instance: instance_id,
            class,
        }));
        self.set_local(Value::Ref(cast));
        Ok(())
    }

    fn op_type_is(&mut self, negate: bool) -> RunResult<()> {
        let operand = self.reg(Register::RelationLeft);
        let target = self.expect_type_operand()?;
        let operand_type = value::type_of(operand, &self.heap, &self.config.lexicon);
        let mut result = operand_type.is_a(&target, &self.heap);
        if negate {
            result = !result;
        }
        self.set_local(Value::Bool(result));
        Ok(())
    }

    fn op_decltype_of(&mut self) -> RunResult<()> {
        let symbol = self.reg(Register::LocalSymbol);
        let id = self
            .heap
            .str_value(symbol)
            .ok_or_else(|| HetuError::bytecode("decltype operand is not a symbol"))?
            .to_owned();
        let Some(found) = crate::namespace::find_symbol(&self.heap, self.ctx.namespace, &id, true) else {
            return Err(HetuError::undefined(&id));
        };
        let decl = crate::namespace::declaration(&self.heap, found, &id);
        let ty = decl
            .decl_type
            .clone()
            .unwrap_or_else(|| value::type_of(decl.value, &self.heap, &self.config.lexicon));
        let handle = self.heap.allocate(HeapData::Type(ty));
        self.set_local(Value::Ref(handle));
        Ok(())
    }

    /// Reads the type value staged in the local slot, resolving nominal
    /// types against the current scope.
    pub(crate) fn expect_type_operand(&mut self) -> RunResult<crate::types::HtType> {
        let value = self.local();
        let Value::Ref(id) = value else {
            return Err(HetuError::type_cast(value::stringify(value, &self.heap), "type"));
        };
        let ty = match self.heap.get(id) {
            HeapData::Type(ty) => ty.clone(),
            HeapData::Class(class) => crate::types::HtType::Nominal(crate::types::NominalType {
                id: class.id.clone(),
                type_args: Vec::new(),
                is_nullable: false,
                namespaces: Vec::new(),
                class: Some(id),
            }),
            other => return Err(HetuError::type_cast(other.kind_name(), "type")),
        };
        Ok(self.resolve_nominal(ty))
    }

    /// Fills in the class handle of a nominal type by scope lookup.
    pub(crate) fn resolve_nominal(&self, ty: crate::types::HtType) -> crate::types::HtType {
        match ty {
            crate::types::HtType::Nominal(mut nominal) if nominal.class.is_none() => {
                if let Some(found) = crate::namespace::find_symbol(&self.heap, self.ctx.namespace, &nominal.id, true) {
                    let decl = crate::namespace::declaration(&self.heap, found, &nominal.id);
                    if let Value::Ref(class_id) = decl.value
                        && matches!(self.heap.get(class_id), HeapData::Class(_))
                    {
                        nominal.class = Some(class_id);
                    }
                }
                crate::types::HtType::Nominal(nominal)
            }
            other => other,
        }
    }

    fn resolve_type_class(&self, ty: &crate::types::HtType) -> RunResult<HeapId> {
        match ty {
            crate::types::HtType::Nominal(nominal) => nominal
                .class
                .ok_or_else(|| HetuError::type_cast(&nominal.id, "a resolvable class")),
            other => Err(HetuError::type_cast(format!("{other}"), "a nominal type")),
        }
    }

    fn op_switch(&mut self, code: &[u8]) -> RunResult<()> {
        let condition = self.local();
        let has_condition = self.fetch_bool(code)?;
        let case_count = self.fetch_u8(code)?;
        let anchor = *self
            .current_frame()
            .anchors
            .last()
            .ok_or_else(|| HetuError::bytecode("switch without an anchor"))?;
        for _ in 0..case_count {
            let chunk = self.fetch_chunk(code)?;
            let branch_offset = self.fetch_u16(code)? as usize;
            let case_value = self.run_expr(chunk)?;
            let matched = if has_condition {
                value::values_equal(condition, case_value, &self.heap)
            } else {
                value::truthy(case_value, &self.heap, &self.config)
            };
            if matched {
                self.ctx.ip = anchor + branch_offset;
                return Ok(());
            }
        }
        let has_else = self.fetch_bool(code)?;
        if has_else {
            let else_offset = self.fetch_u16(code)? as usize;
            self.ctx.ip = anchor + else_offset;
            return Ok(());
        }
        let end_offset = self.fetch_u16(code)? as usize;
        self.ctx.ip = anchor + end_offset;
        Ok(())
    }

    /// `file`: begins a new source unit, installing its namespace.
    fn op_file(&mut self, code: &[u8]) -> RunResult<()> {
        let name = self.fetch_utf8(code)?;
        let kind = crate::bytecode::SourceType::from_byte(self.fetch_u8(code)?)?;
        let namespace = if matches!(kind, crate::bytecode::SourceType::LiteralCode) {
            self.global_namespace
        } else {
            let ns = crate::namespace::HtNamespace::new(name.clone(), None, Some(self.global_namespace), &self.heap);
            self.heap.allocate(HeapData::Namespace(ns))
        };
        self.modules[&self.ctx.module].namespaces.insert(name.clone(), namespace);
        self.file_stack.push(FileRestore {
            file: self.ctx.file.clone(),
            namespace: self.ctx.namespace,
        });
        self.ctx.file = name;
        self.ctx.namespace = namespace;
        Ok(())
    }

    fn op_assign(&mut self) -> RunResult<()> {
        let symbol = self.reg(Register::LocalSymbol);
        let id = self
            .heap
            .str_value(symbol)
            .ok_or_else(|| HetuError::bytecode("assignment target is not a symbol"))?
            .to_owned();
        let value = self.local();
        match crate::namespace::find_symbol(&self.heap, self.ctx.namespace, &id, true) {
            Some(found) => {
                let is_private = self.config.lexicon.is_private(&id);
                let from = self.heap.expect_namespace(self.ctx.namespace).full_name.clone();
                crate::namespace::check_private_access(&self.heap, found, &id, Some(&from), is_private)?;
                crate::namespace::assign_symbol(&mut self.heap, found, &id, value)?;
            }
            None if self.config.allow_implicit_variable_declaration => {
                let decl = crate::namespace::Declaration::variable(value, self.config.lexicon.is_private(&id));
                crate::namespace::define(&mut self.heap, self.ctx.namespace, &id, decl, false)?;
            }
            None => return Err(HetuError::undefined(&id)),
        }
        Ok(())
    }

    fn op_delete(&mut self, code: &[u8]) -> RunResult<()> {
        let kind = self.fetch_u8(code)?;
        match kind {
            0 => {
                let id = self.fetch_utf8(code)?;
                let namespace = self.ctx.namespace;
                self.heap.expect_namespace_mut(namespace).delete(&id)
            }
            1 => {
                let key = self.fetch_utf8(code)?;
                let object = self.reg(Register::PostfixObject);
                self.delete_member(object, &key)
            }
            2 => {
                let object = self.reg(Register::PostfixObject);
                let key = self.local();
                let key = value::stringify(key, &self.heap);
                self.delete_member(object, &key)
            }
            _ => Err(HetuError::bytecode("unknown delete kind")),
        }
    }

    fn delete_member(&mut self, object: Value, key: &str) -> RunResult<()> {
        match object {
            Value::Ref(id) => match self.heap.get_mut(id) {
                HeapData::Struct(strukt) => {
                    strukt.fields.shift_remove(key);
                    Ok(())
                }
                HeapData::Namespace(namespace) => namespace.delete(key),
                _ => Err(HetuError::delete()),
            },
            _ => Err(HetuError::delete()),
        }
    }

    /// Pops one call record, routing the result per its completion role.
    pub(crate) fn pop_call_frame(&mut self) {
        let record = self.call_stack.pop().expect("endOfFunc without an open call");
        let raw_result = self.local();
        self.frames.truncate(record.frame_depth);
        self.ctx.ip = record.return_ip;
        self.ctx.module = record.return_module;
        self.ctx.file = record.return_file;
        self.ctx.namespace = record.return_namespace;
        self.ctx.line = record.return_line;
        self.ctx.column = record.return_column;
        self.stack_trace.pop();

        let mut result = match record.completion {
            Completion::LocalValue => Some(raw_result),
            Completion::Instance(instance) => Some(Value::Ref(instance)),
            Completion::Discard => None,
        };
        if record.is_async
            && let Some(inner) = result
        {
            let future = self.heap.allocate(HeapData::Future(FutureState::Resolved(inner)));
            result = Some(Value::Ref(future));
        }
        if let Some(result) = result {
            self.set_local(result);
        }
    }
}
