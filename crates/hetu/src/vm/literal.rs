//! Decoding of the `local` opcode's literal payloads.

use indexmap::IndexMap;

use crate::{
    bytecode::{IntrinsicCode, LiteralKind, TypeKind},
    error::{HetuError, RunResult},
    heap::{HeapData, HeapId},
    interpreter::Hetu,
    types::{
        FunctionType, HtType, Intrinsic, NominalType, ParameterType, StructuralType, new_struct, struct_member_get,
        StructLookup,
    },
    value::{Value, ValueKey},
};

impl Hetu {
    pub(crate) fn op_local(&mut self, code: &[u8]) -> RunResult<()> {
        let kind = LiteralKind::from_byte(self.fetch_u8(code)?)?;
        match kind {
            LiteralKind::Null => self.set_local(Value::Null),
            LiteralKind::True => self.set_local(Value::Bool(true)),
            LiteralKind::False => self.set_local(Value::Bool(false)),
            LiteralKind::ConstInt => {
                let index = self.fetch_u16(code)? as usize;
                let value = *self.modules[&self.ctx.module]
                    .const_ints
                    .get(index)
                    .ok_or_else(|| HetuError::bytecode(format!("int constant {index} out of range")))?;
                self.set_local(Value::Int(value));
            }
            LiteralKind::ConstFloat => {
                let index = self.fetch_u16(code)? as usize;
                let value = *self.modules[&self.ctx.module]
                    .const_floats
                    .get(index)
                    .ok_or_else(|| HetuError::bytecode(format!("float constant {index} out of range")))?;
                self.set_local(Value::Float(value));
            }
            LiteralKind::ConstString => {
                let index = self.fetch_u16(code)? as usize;
                let value = self.modules[&self.ctx.module]
                    .const_strings
                    .get(index)
                    .ok_or_else(|| HetuError::bytecode(format!("string constant {index} out of range")))?
                    .clone();
                let value = self.heap.allocate_str(value);
                self.set_local(value);
            }
            LiteralKind::String => {
                let value = self.fetch_utf8(code)?;
                let value = self.heap.allocate_str(value);
                self.set_local(value);
            }
            LiteralKind::StringInterpolation => self.string_interpolation(code)?,
            LiteralKind::Identifier => self.identifier(code)?,
            LiteralKind::List => self.list_literal(code)?,
            LiteralKind::Struct => self.struct_literal(code)?,
            LiteralKind::Function => {
                let function = self.read_func_record(code)?;
                self.define_function_literal(function)?;
            }
            LiteralKind::Type => {
                let ty = self.read_type_literal(code)?;
                let ty = self.resolve_nominal(ty);
                let handle = self.heap.allocate(HeapData::Type(ty));
                self.set_local(Value::Ref(handle));
            }
        }
        Ok(())
    }

    fn string_interpolation(&mut self, code: &[u8]) -> RunResult<()> {
        let template = self.fetch_utf8(code)?;
        let count = self.fetch_u8(code)?;
        let mut rendered = template;
        for index in 0..count {
            let chunk = self.fetch_chunk(code)?;
            let value = self.run_expr(chunk)?;
            let text = crate::value::stringify(value, &self.heap);
            rendered = rendered.replace(&format!("{{{index}}}"), &text);
        }
        let value = self.heap.allocate_str(rendered);
        self.set_local(value);
        Ok(())
    }

    /// Identifier resolution. Local identifiers resolve through the scope
    /// chain (running a deferred initializer if this is the first read);
    /// non-local ones stage the id itself as a symbol name.
    fn identifier(&mut self, code: &[u8]) -> RunResult<()> {
        let id = self.fetch_utf8(code)?;
        let is_local = self.fetch_bool(code)?;
        if !is_local {
            let symbol = self.heap.allocate_str(id);
            self.set_local(symbol);
            return Ok(());
        }
        let value = self.resolve_identifier(&id)?;
        self.set_local(value);
        Ok(())
    }

    /// Scope-chain resolution with privacy, deferred initialization, and
    /// receiver binding for functions reached through a `this` scope.
    pub(crate) fn resolve_identifier(&mut self, id: &str) -> RunResult<Value> {
        let Some(found) = crate::namespace::find_symbol(&self.heap, self.ctx.namespace, id, true) else {
            return Err(HetuError::undefined(id));
        };
        let from = self.heap.expect_namespace(self.ctx.namespace).full_name.clone();
        let is_private = self.config.lexicon.is_private(id);
        crate::namespace::check_private_access(&self.heap, found, id, Some(&from), is_private)?;

        let decl = crate::namespace::declaration(&self.heap, found, id);
        if let Some(late) = decl.late_init.clone() {
            let value = self.run_expr_at(&late.module, late.ip, late.namespace)?;
            let decl = crate::namespace::declaration_mut(&mut self.heap, found, id);
            decl.value = value;
            decl.late_init = None;
            return Ok(value);
        }
        let value = decl.value;

        // A bare method name reached from inside a method body still needs
        // its receiver: thread the nearest `this` through.
        if let Value::Ref(function_id) = value
            && let HeapData::Function(function) = self.heap.get(function_id)
            && function.instance.is_none()
            && function.class_id.is_some()
        {
            let this_id = self.config.lexicon.this_id.clone();
            if let Some(this_symbol) = crate::namespace::find_symbol(&self.heap, self.ctx.namespace, &this_id, true) {
                let receiver = crate::namespace::declaration(&self.heap, this_symbol, &this_id).value;
                let bound = self.heap.expect_function(function_id).bind(receiver);
                return Ok(Value::Ref(self.heap.allocate(HeapData::Function(bound))));
            }
        }
        Ok(value)
    }

    fn list_literal(&mut self, code: &[u8]) -> RunResult<()> {
        let count = self.fetch_u16(code)?;
        let mut items = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let is_spread = self.fetch_bool(code)?;
            let chunk = self.fetch_chunk(code)?;
            let value = self.run_expr(chunk)?;
            if is_spread {
                match value {
                    Value::Ref(id) => match self.heap.get(id) {
                        HeapData::List(spread) => items.extend(spread.iter().copied()),
                        _ => return Err(HetuError::not_spreadable()),
                    },
                    _ => return Err(HetuError::not_spreadable()),
                }
            } else {
                items.push(value);
            }
        }
        let list = self.heap.allocate(HeapData::List(items));
        self.set_local(Value::Ref(list));
        Ok(())
    }

    fn struct_literal(&mut self, code: &[u8]) -> RunResult<()> {
        let id = if self.fetch_bool(code)? {
            self.fetch_utf8(code)?
        } else {
            self.next_anonymous_id += 1;
            format!("$struct{}", self.next_anonymous_id)
        };
        let prototype = if self.fetch_bool(code)? {
            let prototype_id = self.fetch_utf8(code)?;
            let value = self.resolve_identifier(&prototype_id)?;
            match value {
                Value::Ref(proto) if matches!(self.heap.get(proto), HeapData::Struct(_)) => Some(proto),
                _ => return Err(HetuError::type_cast(&prototype_id, "struct")),
            }
        } else {
            None
        };
        let field_count = self.fetch_u16(code)?;
        let lexicon = self.config.lexicon.clone();
        let struct_id = new_struct(&mut self.heap, id, prototype, Some(self.ctx.namespace), &lexicon);
        self.read_struct_fields(code, struct_id, field_count)?;
        self.set_local(Value::Ref(struct_id));
        Ok(())
    }

    /// Reads `field_count` struct fields, evaluating values inside the
    /// struct's namespace so literals capture it.
    pub(crate) fn read_struct_fields(&mut self, code: &[u8], struct_id: HeapId, field_count: u16) -> RunResult<()> {
        let struct_ns = self.heap.expect_struct(struct_id).namespace;
        let module = self.ctx.module.clone();
        for _ in 0..field_count {
            let field_kind = self.fetch_u8(code)?;
            match field_kind {
                0 => {
                    let key = self.fetch_utf8(code)?;
                    let chunk = self.fetch_chunk(code)?;
                    let value = self.run_expr_at(&module, chunk, struct_ns)?;
                    self.heap.expect_struct_mut(struct_id).fields.insert(key, value);
                }
                1 => {
                    let chunk = self.fetch_chunk(code)?;
                    let value = self.run_expr_at(&module, chunk, struct_ns)?;
                    self.spread_into_struct(struct_id, value)?;
                }
                _ => return Err(HetuError::bytecode("unknown struct field kind")),
            }
        }
        Ok(())
    }

    /// `...source` in a struct literal: copies non-internal keys of a
    /// struct (through its own member probes) or of a string-keyed map.
    fn spread_into_struct(&mut self, target: HeapId, source: Value) -> RunResult<()> {
        let Value::Ref(source_id) = source else {
            return Err(HetuError::not_spreadable());
        };
        match self.heap.get(source_id) {
            HeapData::Struct(_) => {
                let lexicon = self.config.lexicon.clone();
                let keys = crate::types::struct_keys(&self.heap, source_id, &lexicon);
                for key in keys {
                    let looked_up = struct_member_get(&mut self.heap, source_id, &key, source_id, None, &lexicon)?;
                    let value = match looked_up {
                        StructLookup::Value(value) => value,
                        StructLookup::Getter(getter) => self.invoke_function_now(getter, Vec::new(), Vec::new())?,
                        StructLookup::NotFound => Value::Null,
                    };
                    self.heap.expect_struct_mut(target).fields.insert(key, value);
                }
                Ok(())
            }
            HeapData::Map(entries) => {
                let entries: Vec<(String, Value)> = entries
                    .iter()
                    .filter_map(|(key, value)| match key {
                        ValueKey::Str(key) => Some((key.clone(), *value)),
                        _ => None,
                    })
                    .collect();
                for (key, value) in entries {
                    self.heap.expect_struct_mut(target).fields.insert(key, value);
                }
                Ok(())
            }
            _ => Err(HetuError::not_spreadable()),
        }
    }

    /// Recursive type-literal reader.
    pub(crate) fn read_type_literal(&mut self, code: &[u8]) -> RunResult<HtType> {
        let kind = TypeKind::from_byte(self.fetch_u8(code)?)?;
        match kind {
            TypeKind::Intrinsic => {
                let intrinsic = match IntrinsicCode::from_byte(self.fetch_u8(code)?)? {
                    IntrinsicCode::Any => Intrinsic::Any,
                    IntrinsicCode::Unknown => Intrinsic::Unknown,
                    IntrinsicCode::Void => Intrinsic::Void,
                    IntrinsicCode::Never => Intrinsic::Never,
                    IntrinsicCode::Type => Intrinsic::Type,
                    IntrinsicCode::Function => Intrinsic::Function,
                    IntrinsicCode::Namespace => Intrinsic::Namespace,
                    IntrinsicCode::Null => Intrinsic::Null,
                };
                Ok(HtType::Intrinsic(intrinsic))
            }
            TypeKind::Nominal => {
                let id = self.fetch_utf8(code)?;
                let arg_count = self.fetch_u8(code)?;
                let mut type_args = Vec::with_capacity(arg_count as usize);
                for _ in 0..arg_count {
                    type_args.push(self.read_type_literal(code)?);
                }
                let is_nullable = self.fetch_bool(code)?;
                Ok(HtType::Nominal(NominalType {
                    id,
                    type_args,
                    is_nullable,
                    namespaces: Vec::new(),
                    class: None,
                }))
            }
            TypeKind::Function => {
                let param_count = self.fetch_u8(code)?;
                let mut parameter_types = Vec::with_capacity(param_count as usize);
                for _ in 0..param_count {
                    let ty = self.read_type_literal(code)?;
                    let flags = self.fetch_u8(code)?;
                    parameter_types.push(ParameterType {
                        ty,
                        id: None,
                        is_optional: flags & 1 != 0,
                        is_variadic: flags & 2 != 0,
                    });
                }
                let return_type = self.read_type_literal(code)?;
                Ok(HtType::Function(FunctionType {
                    parameter_types,
                    return_type: Box::new(return_type),
                }))
            }
            TypeKind::Structural => {
                let field_count = self.fetch_u16(code)?;
                let mut field_types = IndexMap::new();
                for _ in 0..field_count {
                    let id = self.fetch_utf8(code)?;
                    let ty = self.read_type_literal(code)?;
                    field_types.insert(id, ty);
                }
                Ok(HtType::Structural(StructuralType { field_types }))
            }
        }
    }
}
