use crate::bytecode::{
    op::{IntrinsicCode, LiteralKind, Opcode, Register},
    version::{BYTECODE_MAGIC, SourceType, Version},
};

/// Emission backend the code generator targets.
///
/// Handles encoding opcodes and operands into raw bytes, interning
/// constants into the module pools, and patching forward jump distances.
/// `build` assembles the final module stream: header, constant tables,
/// instructions, terminator.
///
/// # Usage
///
/// ```
/// use hetu::{BytecodeBuilder, SourceType};
///
/// let mut builder = BytecodeBuilder::new();
/// builder.begin_file("main.hts", SourceType::Script);
/// builder.emit_const_int(41);
/// builder.end_of_stmt();
/// builder.end_file();
/// let bytes = builder.build("main", SourceType::Script);
/// assert!(!bytes.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct BytecodeBuilder {
    code: Vec<u8>,
    const_ints: Vec<i64>,
    const_floats: Vec<f64>,
    const_strings: Vec<String>,
}

/// A reserved u16 distance operand awaiting its target.
///
/// The stored distance is `target - base`, where `base` was fixed when the
/// operand was reserved.
#[derive(Debug, Clone, Copy)]
#[must_use]
pub struct Patch {
    pos: usize,
    base: usize,
}

/// An open loop: the reserved continue/break distances and the body start.
#[derive(Debug, Clone, Copy)]
#[must_use]
pub struct LoopPatches {
    pub continue_patch: Patch,
    pub break_patch: Patch,
    pub start: usize,
}

impl BytecodeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current instruction offset, usable as a jump target.
    #[must_use]
    pub fn mark(&self) -> usize {
        self.code.len()
    }

    pub fn emit(&mut self, op: Opcode) {
        self.code.push(op as u8);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.code.push(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.code.push(u8::from(value));
    }

    pub fn write_u16(&mut self, value: u16) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i16(&mut self, value: i16) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f64(&mut self, value: f64) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_utf8(&mut self, s: &str) {
        let len = u16::try_from(s.len()).expect("string too long for bytecode");
        self.write_u16(len);
        self.code.extend_from_slice(s.as_bytes());
    }

    // --- constant pools ---

    pub fn intern_int(&mut self, value: i64) -> u16 {
        intern(&mut self.const_ints, value)
    }

    pub fn intern_float(&mut self, value: f64) -> u16 {
        let index = self
            .const_floats
            .iter()
            .position(|&existing| existing.to_bits() == value.to_bits())
            .unwrap_or_else(|| {
                self.const_floats.push(value);
                self.const_floats.len() - 1
            });
        u16::try_from(index).expect("constant pool overflow")
    }

    pub fn intern_string(&mut self, value: &str) -> u16 {
        let index = self
            .const_strings
            .iter()
            .position(|existing| existing == value)
            .unwrap_or_else(|| {
                self.const_strings.push(value.to_owned());
                self.const_strings.len() - 1
            });
        u16::try_from(index).expect("constant pool overflow")
    }

    // --- patching ---

    /// Reserves a u16 distance whose base is the position right after it.
    pub fn reserve_u16(&mut self) -> Patch {
        let pos = self.code.len();
        self.write_u16(0);
        Patch {
            pos,
            base: self.code.len(),
        }
    }

    /// Rebases a reserved distance, for operands measured from a later
    /// point in the stream (e.g. the second operand of a loop point).
    pub fn rebase(&mut self, patch: Patch, base: usize) -> Patch {
        Patch { pos: patch.pos, base }
    }

    pub fn patch_to(&mut self, patch: Patch, target: usize) {
        let distance = u16::try_from(target - patch.base).expect("jump distance overflow");
        self.code[patch.pos..patch.pos + 2].copy_from_slice(&distance.to_le_bytes());
    }

    /// Resolves a reserved distance to the current position.
    pub fn patch_here(&mut self, patch: Patch) {
        self.patch_to(patch, self.code.len());
    }

    // --- meta ---

    pub fn line_info(&mut self, line: u16, column: u16) {
        self.emit(Opcode::LineInfo);
        self.write_u16(line);
        self.write_u16(column);
    }

    pub fn begin_file(&mut self, name: &str, kind: SourceType) {
        self.emit(Opcode::File);
        self.write_utf8(name);
        self.write_u8(kind as u8);
    }

    pub fn end_file(&mut self) {
        self.emit(Opcode::EndOfFile);
    }

    pub fn end_of_stmt(&mut self) {
        self.emit(Opcode::EndOfStmt);
    }

    pub fn begin_code_block(&mut self, id: &str) {
        self.emit(Opcode::CodeBlock);
        self.write_utf8(id);
    }

    pub fn end_code_block(&mut self) {
        self.emit(Opcode::EndOfCodeBlock);
    }

    // --- registers and literals ---

    pub fn register(&mut self, register: Register) {
        self.emit(Opcode::Register);
        self.write_u8(register as u8);
    }

    pub fn create_stack_frame(&mut self) {
        self.emit(Opcode::CreateStackFrame);
    }

    pub fn retract_stack_frame(&mut self) {
        self.emit(Opcode::RetractStackFrame);
    }

    pub fn emit_null(&mut self) {
        self.emit(Opcode::Local);
        self.write_u8(LiteralKind::Null as u8);
    }

    pub fn emit_bool(&mut self, value: bool) {
        self.emit(Opcode::Local);
        let kind = if value { LiteralKind::True } else { LiteralKind::False };
        self.write_u8(kind as u8);
    }

    pub fn emit_const_int(&mut self, value: i64) {
        let index = self.intern_int(value);
        self.emit(Opcode::Local);
        self.write_u8(LiteralKind::ConstInt as u8);
        self.write_u16(index);
    }

    pub fn emit_const_float(&mut self, value: f64) {
        let index = self.intern_float(value);
        self.emit(Opcode::Local);
        self.write_u8(LiteralKind::ConstFloat as u8);
        self.write_u16(index);
    }

    pub fn emit_const_string(&mut self, value: &str) {
        let index = self.intern_string(value);
        self.emit(Opcode::Local);
        self.write_u8(LiteralKind::ConstString as u8);
        self.write_u16(index);
    }

    pub fn emit_string(&mut self, value: &str) {
        self.emit(Opcode::Local);
        self.write_u8(LiteralKind::String as u8);
        self.write_utf8(value);
    }

    /// Interpolated string: `{0}`..`{n}` placeholders in the template are
    /// replaced with the stringified chunk results.
    pub fn emit_string_interpolation(&mut self, template: &str, chunks: Vec<Box<dyn FnOnce(&mut Self)>>) {
        self.emit(Opcode::Local);
        self.write_u8(LiteralKind::StringInterpolation as u8);
        self.write_utf8(template);
        self.write_u8(u8::try_from(chunks.len()).expect("too many interpolations"));
        for chunk in chunks {
            self.emit_chunk(chunk);
        }
    }

    /// Identifier: resolved through the current namespace when local,
    /// otherwise staged as a symbol name for a later operation.
    pub fn emit_identifier(&mut self, id: &str, is_local: bool) {
        self.emit(Opcode::Local);
        self.write_u8(LiteralKind::Identifier as u8);
        self.write_utf8(id);
        self.write_bool(is_local);
    }

    /// List literal; each item is `(is_spread, expression)`.
    pub fn emit_list(&mut self, items: Vec<(bool, Box<dyn FnOnce(&mut Self)>)>) {
        self.emit(Opcode::Local);
        self.write_u8(LiteralKind::List as u8);
        self.write_u16(u16::try_from(items.len()).expect("list literal too long"));
        for (is_spread, item) in items {
            self.write_bool(is_spread);
            self.emit_chunk(item);
        }
    }

    /// Struct literal with ordinary and spread fields.
    pub fn emit_struct(&mut self, id: Option<&str>, prototype_id: Option<&str>, fields: Vec<StructFieldSpec>) {
        self.emit(Opcode::Local);
        self.write_u8(LiteralKind::Struct as u8);
        self.write_option_utf8(id);
        self.write_option_utf8(prototype_id);
        self.write_u16(u16::try_from(fields.len()).expect("struct literal too long"));
        for field in fields {
            match field {
                StructFieldSpec::Field { key, value } => {
                    self.write_u8(0);
                    self.write_utf8(&key);
                    self.emit_chunk(value);
                }
                StructFieldSpec::Spread(value) => {
                    self.write_u8(1);
                    self.emit_chunk(value);
                }
            }
        }
    }

    /// Intrinsic type literal.
    pub fn emit_type_intrinsic(&mut self, code: IntrinsicCode) {
        self.emit(Opcode::Local);
        self.write_u8(LiteralKind::Type as u8);
        self.write_type_intrinsic(code);
    }

    /// Bare nominal type literal.
    pub fn emit_type_nominal(&mut self, id: &str, is_nullable: bool) {
        self.emit(Opcode::Local);
        self.write_u8(LiteralKind::Type as u8);
        self.write_type_nominal(id, is_nullable);
    }

    pub fn write_type_intrinsic(&mut self, code: IntrinsicCode) {
        self.write_u8(0);
        self.write_u8(code as u8);
    }

    pub fn write_type_nominal(&mut self, id: &str, is_nullable: bool) {
        self.write_u8(1);
        self.write_utf8(id);
        self.write_u8(0); // type argument count
        self.write_bool(is_nullable);
    }

    fn write_option_utf8(&mut self, value: Option<&str>) {
        match value {
            Some(value) => {
                self.write_bool(true);
                self.write_utf8(value);
            }
            None => self.write_bool(false),
        }
    }

    /// A u16 length-prefixed expression chunk terminated by `endOfExec`.
    pub fn emit_chunk(&mut self, body: impl FnOnce(&mut Self)) {
        let patch = self.reserve_u16();
        body(self);
        self.emit(Opcode::EndOfExec);
        self.patch_here(patch);
    }

    // --- control flow ---

    /// Emits `skip` jumping to a known (usually earlier) target.
    pub fn emit_skip_to(&mut self, target: usize) {
        self.emit(Opcode::Skip);
        let after = self.code.len() + 2;
        let distance = i16::try_from(target as i64 - after as i64).expect("skip distance overflow");
        self.write_i16(distance);
    }

    /// Emits a forward `skip` to patch later.
    pub fn emit_skip_forward(&mut self) -> Patch {
        self.emit(Opcode::Skip);
        self.reserve_u16()
    }

    /// Emits `anchor` and returns the base goto offsets are measured from.
    pub fn emit_anchor(&mut self) -> usize {
        self.emit(Opcode::Anchor);
        self.code.len()
    }

    pub fn emit_clear_anchor(&mut self) {
        self.emit(Opcode::ClearAnchor);
    }

    /// Emits `goto`; the reserved distance is measured from the anchor.
    pub fn emit_goto(&mut self, anchor_base: usize) -> Patch {
        self.emit(Opcode::Goto);
        let patch = self.reserve_u16();
        self.rebase(patch, anchor_base)
    }

    /// Emits `ifStmt`, returning the then-branch length to patch.
    pub fn emit_if_stmt(&mut self) -> Patch {
        self.emit(Opcode::IfStmt);
        self.reserve_u16()
    }

    /// Emits `loopPoint` with both distances reserved. Both are measured
    /// from the loop start (the position right after the operands).
    pub fn begin_loop(&mut self) -> LoopPatches {
        self.emit(Opcode::LoopPoint);
        let continue_patch = self.reserve_u16();
        let break_patch = self.reserve_u16();
        let start = self.code.len();
        LoopPatches {
            continue_patch: self.rebase(continue_patch, start),
            break_patch: self.rebase(break_patch, start),
            start,
        }
    }

    /// Closes a loop: continue jumps to `continue_target`, break falls out
    /// here.
    pub fn end_loop(&mut self, patches: LoopPatches, continue_target: usize) {
        self.patch_to(patches.continue_patch, continue_target);
        self.patch_here(patches.break_patch);
    }

    pub fn emit_while_stmt(&mut self) {
        self.emit(Opcode::WhileStmt);
    }

    pub fn emit_do_stmt(&mut self, has_condition: bool) {
        self.emit(Opcode::DoStmt);
        self.write_bool(has_condition);
    }

    pub fn emit_break(&mut self) {
        self.emit(Opcode::BreakLoop);
    }

    pub fn emit_continue(&mut self) {
        self.emit(Opcode::ContinueLoop);
    }

    /// Short-circuit right side: the operand skips the chunk when the left
    /// side decides.
    pub fn emit_logical_or(&mut self, right: impl FnOnce(&mut Self)) {
        self.emit(Opcode::LogicalOr);
        self.emit_chunk(right);
    }

    pub fn emit_logical_and(&mut self, right: impl FnOnce(&mut Self)) {
        self.emit(Opcode::LogicalAnd);
        self.emit_chunk(right);
    }

    pub fn emit_if_null(&mut self, right: impl FnOnce(&mut Self)) {
        self.emit(Opcode::IfNull);
        self.emit_chunk(right);
    }

    /// Emits a whole `switch` statement, wiring case, else, and end offsets
    /// through a surrounding anchor.
    pub fn emit_switch(
        &mut self,
        has_condition: bool,
        cases: Vec<(Box<dyn FnOnce(&mut Self)>, Box<dyn FnOnce(&mut Self)>)>,
        else_branch: Option<Box<dyn FnOnce(&mut Self)>>,
    ) {
        let anchor = self.emit_anchor();
        self.emit(Opcode::SwitchStmt);
        self.write_bool(has_condition);
        self.write_u8(u8::try_from(cases.len()).expect("too many switch cases"));
        let mut branch_patches = Vec::new();
        let mut branches = Vec::new();
        for (expr, branch) in cases {
            self.emit_chunk(expr);
            let patch = self.reserve_u16();
            branch_patches.push(self.rebase(patch, anchor));
            branches.push(branch);
        }
        let else_patch = match &else_branch {
            Some(_) => {
                self.write_bool(true);
                let patch = self.reserve_u16();
                Some(self.rebase(patch, anchor))
            }
            None => {
                self.write_bool(false);
                None
            }
        };
        let end_patch = self.reserve_u16();
        let end_patch = self.rebase(end_patch, anchor);

        let mut goto_patches = Vec::new();
        for (branch, patch) in branches.into_iter().zip(branch_patches) {
            let target = self.code.len();
            self.patch_to(patch, target);
            branch(self);
            goto_patches.push(self.emit_goto(anchor));
        }
        if let (Some(else_branch), Some(patch)) = (else_branch, else_patch) {
            let target = self.code.len();
            self.patch_to(patch, target);
            else_branch(self);
        }
        let end = self.code.len();
        self.patch_to(end_patch, end);
        for patch in goto_patches {
            self.patch_to(patch, end);
        }
        self.emit_clear_anchor();
    }

    // --- member access, assignment, calls ---

    pub fn emit_member_get(&mut self, is_nullable: bool) {
        self.emit(Opcode::MemberGet);
        self.write_u8(u8::from(is_nullable));
    }

    pub fn emit_member_set(&mut self, is_nullable: bool) {
        self.emit(Opcode::MemberSet);
        self.write_u8(u8::from(is_nullable));
    }

    pub fn emit_sub_get(&mut self, is_nullable: bool) {
        self.emit(Opcode::SubGet);
        self.write_u8(u8::from(is_nullable));
    }

    pub fn emit_sub_set(&mut self, is_nullable: bool) {
        self.emit(Opcode::SubSet);
        self.write_u8(u8::from(is_nullable));
    }

    pub fn emit_assign(&mut self) {
        self.emit(Opcode::Assign);
    }

    pub fn emit_assertion(&mut self, source_text: &str) {
        self.emit(Opcode::Assertion);
        self.write_utf8(source_text);
    }

    pub fn emit_throws(&mut self) {
        self.emit(Opcode::Throws);
    }

    /// `call` with inline argument chunks; the callee is whatever the
    /// preceding code left in the local value slot.
    pub fn emit_call(&mut self, spec: CallSpec) {
        self.emit(Opcode::Call);
        let mut flags = 0u8;
        if spec.is_nullable {
            flags |= 1;
        }
        if spec.has_new_operator {
            flags |= 2;
        }
        self.write_u8(flags);
        self.write_option_utf8(spec.callee_id.as_deref());
        self.write_u8(u8::try_from(spec.positional.len()).expect("too many arguments"));
        for (is_spread, arg) in spec.positional {
            self.write_bool(is_spread);
            self.emit_chunk(arg);
        }
        self.write_u8(u8::try_from(spec.named.len()).expect("too many arguments"));
        for (name, arg) in spec.named {
            self.write_utf8(&name);
            self.emit_chunk(arg);
        }
    }

    pub fn emit_awaited_value(&mut self) {
        self.emit(Opcode::AwaitedValue);
    }

    // --- declarations ---

    /// Variable declaration. The initializer chunk is prefixed with its
    /// source position; late declarations record it instead of running it.
    pub fn emit_var_decl(&mut self, spec: VarDeclSpec) {
        self.emit(Opcode::VarDecl);
        self.write_utf8(&spec.id);
        let mut flags = 0u8;
        if spec.is_mutable {
            flags |= 1;
        }
        if spec.is_external {
            flags |= 1 << 1;
        }
        if spec.is_static {
            flags |= 1 << 2;
        }
        if spec.is_field {
            flags |= 1 << 3;
        }
        if spec.is_late {
            flags |= 1 << 4;
        }
        if spec.is_top_level {
            flags |= 1 << 5;
        }
        self.write_u8(flags);
        match spec.type_decl {
            Some(type_decl) => {
                self.write_bool(true);
                type_decl(self);
            }
            None => self.write_bool(false),
        }
        match spec.initializer {
            Some(initializer) => {
                self.write_bool(true);
                self.write_u16(spec.line);
                self.write_u16(spec.column);
                self.emit_chunk(initializer);
            }
            None => self.write_bool(false),
        }
    }

    pub fn emit_const_decl(&mut self, id: &str, is_top_level: bool, kind: ConstKind, index: u16) {
        self.emit(Opcode::ConstDecl);
        self.write_utf8(id);
        self.write_bool(is_top_level);
        self.write_u8(kind as u8);
        self.write_u16(index);
    }

    pub fn emit_destructuring_decl(&mut self, is_mutable: bool, is_struct: bool, ids: &[&str]) {
        self.emit(Opcode::DestructuringDecl);
        self.write_bool(is_mutable);
        self.write_u8(u8::from(is_struct));
        self.write_u8(u8::try_from(ids.len()).expect("too many destructured ids"));
        for id in ids {
            self.write_utf8(id);
        }
    }

    /// Function declaration or literal; returns nothing, the record carries
    /// its own body chunk.
    pub fn emit_func_decl(&mut self, spec: FuncDeclSpec) {
        self.emit(Opcode::FuncDecl);
        self.write_func_record(spec);
    }

    /// Function literal (`local` payload), e.g. `() => expr`.
    pub fn emit_function_literal(&mut self, spec: FuncDeclSpec) {
        self.emit(Opcode::Local);
        self.write_u8(LiteralKind::Function as u8);
        self.write_func_record(spec);
    }

    fn write_func_record(&mut self, spec: FuncDeclSpec) {
        self.write_utf8(&spec.internal_name);
        self.write_option_utf8(spec.id.as_deref());
        self.write_option_utf8(spec.class_id.as_deref());
        self.write_option_utf8(spec.external_type_id.as_deref());
        self.write_u8(spec.category);
        let mut flags = 0u8;
        if spec.is_async {
            flags |= 1;
        }
        if spec.is_external {
            flags |= 1 << 1;
        }
        if spec.is_static {
            flags |= 1 << 2;
        }
        if spec.is_const {
            flags |= 1 << 3;
        }
        if spec.is_field {
            flags |= 1 << 4;
        }
        if spec.is_abstract {
            flags |= 1 << 5;
        }
        self.write_u8(flags);
        let required = spec
            .params
            .iter()
            .filter(|param| !param.is_optional && !param.is_variadic && !param.is_named)
            .count();
        let variadic = spec.params.iter().any(|param| param.is_variadic);
        let positional_total = spec.params.iter().filter(|param| !param.is_named).count();
        self.write_u8(u8::try_from(required).expect("too many parameters"));
        self.write_u8(if variadic {
            u8::MAX
        } else {
            u8::try_from(positional_total).expect("too many parameters")
        });
        self.write_u8(u8::try_from(spec.params.len()).expect("too many parameters"));
        for param in spec.params {
            self.write_utf8(&param.id);
            let mut param_flags = 0u8;
            if param.is_optional {
                param_flags |= 1;
            }
            if param.is_variadic {
                param_flags |= 1 << 1;
            }
            if param.is_named {
                param_flags |= 1 << 2;
            }
            self.write_u8(param_flags);
            match param.type_decl {
                Some(type_decl) => {
                    self.write_bool(true);
                    type_decl(self);
                }
                None => self.write_bool(false),
            }
            match param.default {
                Some(default) => {
                    self.write_bool(true);
                    self.emit_chunk(default);
                }
                None => self.write_bool(false),
            }
        }
        match spec.return_type {
            Some(return_type) => {
                self.write_bool(true);
                return_type(self);
            }
            None => self.write_bool(false),
        }
        match spec.redirecting_constructor {
            Some(redirect) => {
                self.write_bool(true);
                self.write_utf8(&redirect.callee);
                self.write_option_utf8(redirect.key.as_deref());
                self.write_u8(u8::try_from(redirect.positional.len()).expect("too many arguments"));
                for arg in redirect.positional {
                    self.emit_chunk(arg);
                }
                self.write_u8(u8::try_from(redirect.named.len()).expect("too many arguments"));
                for (name, arg) in redirect.named {
                    self.write_utf8(&name);
                    self.emit_chunk(arg);
                }
            }
            None => self.write_bool(false),
        }
        match spec.body {
            Some(body) => {
                self.write_bool(true);
                self.write_u16(spec.line);
                self.write_u16(spec.column);
                let patch = self.reserve_u16();
                body(self);
                self.emit(Opcode::EndOfFunc);
                self.patch_here(patch);
            }
            None => self.write_bool(false),
        }
    }

    /// Class declaration header; the caller emits the body and closes with
    /// `end_class_decl`.
    pub fn begin_class_decl(&mut self, spec: ClassDeclSpec) {
        self.emit(Opcode::ClassDecl);
        self.write_utf8(&spec.id);
        let mut flags = 0u8;
        if spec.is_external {
            flags |= 1;
        }
        if spec.is_abstract {
            flags |= 1 << 1;
        }
        if spec.has_user_defined_constructor {
            flags |= 1 << 2;
        }
        if spec.is_enum {
            flags |= 1 << 3;
        }
        self.write_u8(flags);
        match spec.super_type {
            Some(super_type) => {
                self.write_bool(true);
                super_type(self);
            }
            None => self.write_bool(false),
        }
    }

    pub fn end_class_decl(&mut self) {
        self.emit(Opcode::ClassDeclEnd);
    }

    /// Struct declaration: the definition chunk replays at instantiation.
    pub fn emit_struct_decl(&mut self, id: &str, prototype_id: Option<&str>, fields: Vec<StructFieldSpec>) {
        self.emit(Opcode::StructDecl);
        self.write_utf8(id);
        self.write_option_utf8(prototype_id);
        let patch = self.reserve_u16();
        self.write_u16(u16::try_from(fields.len()).expect("struct declaration too long"));
        for field in fields {
            match field {
                StructFieldSpec::Field { key, value } => {
                    self.write_u8(0);
                    self.write_utf8(&key);
                    self.emit_chunk(value);
                }
                StructFieldSpec::Spread(value) => {
                    self.write_u8(1);
                    self.emit_chunk(value);
                }
            }
        }
        self.patch_here(patch);
    }

    pub fn begin_namespace_decl(&mut self, id: &str, is_top_level: bool) {
        self.emit(Opcode::NamespaceDecl);
        self.write_utf8(id);
        self.write_bool(is_top_level);
    }

    pub fn end_namespace_decl(&mut self) {
        self.emit(Opcode::NamespaceDeclEnd);
    }

    pub fn emit_type_alias_decl(&mut self, id: &str, is_top_level: bool, type_literal: impl FnOnce(&mut Self)) {
        self.emit(Opcode::TypeAliasDecl);
        self.write_utf8(id);
        self.write_bool(is_top_level);
        type_literal(self);
    }

    pub fn emit_external_enum_decl(&mut self, id: &str, is_top_level: bool) {
        self.emit(Opcode::ExternalEnumDecl);
        self.write_utf8(id);
        self.write_bool(is_top_level);
    }

    pub fn emit_import_export_decl(&mut self, spec: ImportExportSpec) {
        self.emit(Opcode::ImportExportDecl);
        self.write_bool(spec.is_export);
        self.write_option_utf8(spec.from_path.as_deref());
        self.write_option_utf8(spec.alias.as_deref());
        self.write_u8(u8::try_from(spec.show_list.len()).expect("show list too long"));
        for id in &spec.show_list {
            self.write_utf8(id);
        }
        self.write_bool(spec.is_preloaded_module);
    }

    pub fn emit_delete_local(&mut self, id: &str) {
        self.emit(Opcode::Delete);
        self.write_u8(0);
        self.write_utf8(id);
    }

    pub fn emit_delete_member(&mut self, key: &str) {
        self.emit(Opcode::Delete);
        self.write_u8(1);
        self.write_utf8(key);
    }

    pub fn emit_delete_sub(&mut self) {
        self.emit(Opcode::Delete);
        self.write_u8(2);
    }

    // --- assembly ---

    /// Assembles the final module: header, constant pools, instructions,
    /// module terminator. The compiler version stamp defaults to this
    /// crate's version.
    #[must_use]
    pub fn build(self, module_name: &str, source_type: SourceType) -> Vec<u8> {
        self.build_with_version(module_name, source_type, &Version::current())
    }

    #[must_use]
    pub fn build_with_version(mut self, module_name: &str, source_type: SourceType, version: &Version) -> Vec<u8> {
        self.emit(Opcode::EndOfModule);
        self.emit(Opcode::EndOfCode);

        let mut out = Vec::with_capacity(self.code.len() + 64);
        out.extend_from_slice(&BYTECODE_MAGIC.to_le_bytes());
        write_version(&mut out, version);
        out.push(0); // no separate bytecode version
        write_utf8(&mut out, &chrono::Utc::now().to_rfc3339());
        write_utf8(&mut out, module_name);
        out.push(source_type as u8);

        if !self.const_ints.is_empty() {
            out.push(Opcode::ConstIntTable as u8);
            out.extend_from_slice(&u16::try_from(self.const_ints.len()).expect("pool overflow").to_le_bytes());
            for value in &self.const_ints {
                out.extend_from_slice(&value.to_le_bytes());
            }
        }
        if !self.const_floats.is_empty() {
            out.push(Opcode::ConstFloatTable as u8);
            out.extend_from_slice(&u16::try_from(self.const_floats.len()).expect("pool overflow").to_le_bytes());
            for value in &self.const_floats {
                out.extend_from_slice(&value.to_le_bytes());
            }
        }
        if !self.const_strings.is_empty() {
            out.push(Opcode::ConstStringTable as u8);
            out.extend_from_slice(&u16::try_from(self.const_strings.len()).expect("pool overflow").to_le_bytes());
            for value in &self.const_strings {
                write_utf8(&mut out, value);
            }
        }

        // Every patched operand is a relative distance, so prepending the
        // header and pools cannot invalidate the instruction stream.
        out.extend_from_slice(&self.code);
        out
    }
}

fn write_utf8(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&u16::try_from(s.len()).expect("string too long for bytecode").to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

fn write_version(out: &mut Vec<u8>, version: &Version) {
    out.push(version.major);
    out.push(version.minor);
    out.extend_from_slice(&version.patch.to_le_bytes());
    out.push(u8::try_from(version.pre.len()).expect("too many version chunks"));
    for chunk in &version.pre {
        write_utf8(out, chunk);
    }
    out.push(u8::try_from(version.build.len()).expect("too many version chunks"));
    for chunk in &version.build {
        write_utf8(out, chunk);
    }
}

fn intern(pool: &mut Vec<i64>, value: i64) -> u16 {
    let index = pool.iter().position(|&existing| existing == value).unwrap_or_else(|| {
        pool.push(value);
        pool.len() - 1
    });
    u16::try_from(index).expect("constant pool overflow")
}

/// One field of a struct literal or struct declaration body.
pub enum StructFieldSpec {
    Field {
        key: String,
        value: Box<dyn FnOnce(&mut BytecodeBuilder)>,
    },
    /// Copies the non-internal keys of the evaluated source.
    Spread(Box<dyn FnOnce(&mut BytecodeBuilder)>),
}

impl StructFieldSpec {
    pub fn field(key: &str, value: impl FnOnce(&mut BytecodeBuilder) + 'static) -> Self {
        Self::Field {
            key: key.to_owned(),
            value: Box::new(value),
        }
    }

    pub fn spread(value: impl FnOnce(&mut BytecodeBuilder) + 'static) -> Self {
        Self::Spread(Box::new(value))
    }
}

/// Arguments of an `emit_call`.
#[derive(Default)]
pub struct CallSpec {
    pub is_nullable: bool,
    pub has_new_operator: bool,
    pub callee_id: Option<String>,
    pub positional: Vec<(bool, Box<dyn FnOnce(&mut BytecodeBuilder)>)>,
    pub named: Vec<(String, Box<dyn FnOnce(&mut BytecodeBuilder)>)>,
}

impl CallSpec {
    pub fn positional_arg(mut self, arg: impl FnOnce(&mut BytecodeBuilder) + 'static) -> Self {
        self.positional.push((false, Box::new(arg)));
        self
    }

    pub fn spread_arg(mut self, arg: impl FnOnce(&mut BytecodeBuilder) + 'static) -> Self {
        self.positional.push((true, Box::new(arg)));
        self
    }

    pub fn named_arg(mut self, name: &str, arg: impl FnOnce(&mut BytecodeBuilder) + 'static) -> Self {
        self.named.push((name.to_owned(), Box::new(arg)));
        self
    }

    #[must_use]
    pub fn new_operator(mut self) -> Self {
        self.has_new_operator = true;
        self
    }
}

/// Encoded constant pool kind of a `constDecl`.
#[derive(Debug, Clone, Copy)]
#[repr(u8)]
pub enum ConstKind {
    Int = 0,
    Float = 1,
    String = 2,
}

/// A `varDecl` record.
#[derive(Default)]
pub struct VarDeclSpec {
    pub id: String,
    pub is_mutable: bool,
    pub is_external: bool,
    pub is_static: bool,
    pub is_field: bool,
    pub is_late: bool,
    pub is_top_level: bool,
    pub line: u16,
    pub column: u16,
    pub type_decl: Option<Box<dyn FnOnce(&mut BytecodeBuilder)>>,
    pub initializer: Option<Box<dyn FnOnce(&mut BytecodeBuilder)>>,
}

impl VarDeclSpec {
    pub fn mutable(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            is_mutable: true,
            ..Self::default()
        }
    }

    pub fn with_initializer(mut self, initializer: impl FnOnce(&mut BytecodeBuilder) + 'static) -> Self {
        self.initializer = Some(Box::new(initializer));
        self
    }
}

/// A `funcDecl` record (also used by function literals).
#[derive(Default)]
pub struct FuncDeclSpec {
    pub internal_name: String,
    pub id: Option<String>,
    pub class_id: Option<String>,
    pub external_type_id: Option<String>,
    /// 0 normal, 1 constructor, 2 getter, 3 setter, 4 literal, 5 method.
    pub category: u8,
    pub is_async: bool,
    pub is_external: bool,
    pub is_static: bool,
    pub is_const: bool,
    pub is_field: bool,
    pub is_abstract: bool,
    pub line: u16,
    pub column: u16,
    pub params: Vec<ParamSpec>,
    pub return_type: Option<Box<dyn FnOnce(&mut BytecodeBuilder)>>,
    pub redirecting_constructor: Option<RedirectSpec>,
    pub body: Option<Box<dyn FnOnce(&mut BytecodeBuilder)>>,
}

impl FuncDeclSpec {
    pub fn named(id: &str) -> Self {
        Self {
            internal_name: id.to_owned(),
            id: Some(id.to_owned()),
            ..Self::default()
        }
    }

    pub fn literal(internal_name: &str) -> Self {
        Self {
            internal_name: internal_name.to_owned(),
            category: 4,
            ..Self::default()
        }
    }

    pub fn with_body(mut self, body: impl FnOnce(&mut BytecodeBuilder) + 'static) -> Self {
        self.body = Some(Box::new(body));
        self
    }

    pub fn with_param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    #[must_use]
    pub fn asynchronous(mut self) -> Self {
        self.is_async = true;
        self
    }
}

/// One parameter of a `funcDecl` record.
#[derive(Default)]
pub struct ParamSpec {
    pub id: String,
    pub is_optional: bool,
    pub is_variadic: bool,
    pub is_named: bool,
    pub type_decl: Option<Box<dyn FnOnce(&mut BytecodeBuilder)>>,
    pub default: Option<Box<dyn FnOnce(&mut BytecodeBuilder)>>,
}

impl ParamSpec {
    pub fn required(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            ..Self::default()
        }
    }

    pub fn optional(id: &str, default: Option<Box<dyn FnOnce(&mut BytecodeBuilder)>>) -> Self {
        Self {
            id: id.to_owned(),
            is_optional: true,
            default,
            ..Self::default()
        }
    }

    pub fn variadic(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            is_variadic: true,
            ..Self::default()
        }
    }

    pub fn named(id: &str, default: Option<Box<dyn FnOnce(&mut BytecodeBuilder)>>) -> Self {
        Self {
            id: id.to_owned(),
            is_named: true,
            is_optional: true,
            default,
            ..Self::default()
        }
    }
}

/// A redirecting constructor record: `: super(...)` or `: this(...)`.
#[derive(Default)]
pub struct RedirectSpec {
    pub callee: String,
    pub key: Option<String>,
    pub positional: Vec<Box<dyn FnOnce(&mut BytecodeBuilder)>>,
    pub named: Vec<(String, Box<dyn FnOnce(&mut BytecodeBuilder)>)>,
}

/// A `classDecl` header.
#[derive(Default)]
pub struct ClassDeclSpec {
    pub id: String,
    pub is_external: bool,
    pub is_abstract: bool,
    pub has_user_defined_constructor: bool,
    pub is_enum: bool,
    pub super_type: Option<Box<dyn FnOnce(&mut BytecodeBuilder)>>,
}

impl ClassDeclSpec {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            ..Self::default()
        }
    }

    pub fn extending(mut self, super_id: &str) -> Self {
        let super_id = super_id.to_owned();
        self.super_type = Some(Box::new(move |builder: &mut BytecodeBuilder| {
            builder.write_type_nominal(&super_id, false);
        }));
        self
    }
}

/// An `importExportDecl` record.
#[derive(Debug, Default, Clone)]
pub struct ImportExportSpec {
    pub is_export: bool,
    pub from_path: Option<String>,
    pub alias: Option<String>,
    pub show_list: Vec<String>,
    pub is_preloaded_module: bool,
}
