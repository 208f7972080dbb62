//! The `call` opcode and everything a call can turn into: script
//! functions, constructors, host bindings, struct templates, and the
//! runtime's own struct operations.

use indexmap::IndexMap;

use crate::{
    error::{HetuError, RunResult},
    external::{ExternalReturn, NativeCall},
    heap::{FutureState, HeapData, HeapId},
    interpreter::Hetu,
    namespace::{Declaration, DeclKind, HtNamespace},
    object::Object,
    types::{Builtin, FunctionCategory, HtCast, HtFunction, HtInstance, InstanceFrame, HtClass, new_struct},
    value::{self, Value},
    vm::{CallRecord, Completion, LoopExit, StackFrame},
};

impl Hetu {
    pub(crate) fn op_call(&mut self, code: &[u8]) -> RunResult<()> {
        let callee = self.local();
        let flags = self.fetch_u8(code)?;
        let is_nullable = flags & 1 != 0;
        let has_new_operator = flags & 2 != 0;
        let callee_id = if self.fetch_bool(code)? {
            Some(self.fetch_utf8(code)?)
        } else {
            None
        };

        // Argument expressions are read (and evaluated) either way so the
        // stream stays in sync.
        let skip_evaluation = callee.is_null() && is_nullable;
        let (positional, named) = self.read_call_arguments(code, skip_evaluation)?;

        let display = callee_id.as_deref().unwrap_or("<anonymous>");
        if callee.is_null() {
            if is_nullable {
                self.set_local(Value::Null);
                return Ok(());
            }
            return Err(HetuError::call_null_object(display));
        }

        let Value::Ref(callee_ref) = callee else {
            return Err(HetuError::not_callable(display));
        };
        match self.heap.get(callee_ref) {
            HeapData::Function(_) => {
                self.call_function_value(callee_ref, positional, named, Completion::LocalValue)
            }
            HeapData::Class(_) => self.instantiate(callee_ref, None, positional, named),
            HeapData::Type(ty) => {
                let ty = self.resolve_nominal(ty.clone());
                match ty {
                    crate::types::HtType::Nominal(nominal) => match nominal.class {
                        Some(class) => self.instantiate(class, None, positional, named),
                        None => Err(HetuError::not_newable(&nominal.id)),
                    },
                    _ => Err(HetuError::not_newable(display)),
                }
            }
            HeapData::StructTemplate(_) => self.instantiate_struct_template(callee_ref, positional, named),
            _ if has_new_operator => Err(HetuError::not_newable(display)),
            _ => Err(HetuError::not_callable(display)),
        }
    }

    /// Reads positional and named argument lists, evaluating each chunk in
    /// order. Spread items must evaluate to lists and are flattened.
    fn read_call_arguments(&mut self, code: &[u8], skip_evaluation: bool) -> RunResult<(Vec<Value>, Vec<(String, Value)>)> {
        let mut positional = Vec::new();
        let positional_count = self.fetch_u8(code)?;
        for _ in 0..positional_count {
            let is_spread = self.fetch_bool(code)?;
            let chunk = self.fetch_chunk(code)?;
            if skip_evaluation {
                continue;
            }
            let value = self.run_expr(chunk)?;
            if is_spread {
                match value {
                    Value::Ref(id) => match self.heap.get(id) {
                        HeapData::List(items) => positional.extend(items.iter().copied()),
                        _ => return Err(HetuError::not_spreadable()),
                    },
                    _ => return Err(HetuError::not_spreadable()),
                }
            } else {
                positional.push(value);
            }
        }
        let mut named = Vec::new();
        let named_count = self.fetch_u8(code)?;
        for _ in 0..named_count {
            let name = self.fetch_utf8(code)?;
            let chunk = self.fetch_chunk(code)?;
            if skip_evaluation {
                continue;
            }
            let value = self.run_expr(chunk)?;
            named.push((name, value));
        }
        Ok((positional, named))
    }

    /// Invokes a function value: builtins and host bindings complete
    /// immediately, script bodies push a call record and return to the
    /// loop.
    pub(crate) fn call_function_value(
        &mut self,
        function_id: HeapId,
        positional: Vec<Value>,
        named: Vec<(String, Value)>,
        completion: Completion,
    ) -> RunResult<()> {
        let function = self.heap.expect_function(function_id).clone();
        if function.is_abstract {
            return Err(HetuError::abstracted(function.display_name()));
        }
        if let Some(builtin) = function.builtin {
            let result = self.run_builtin(builtin, &function, &positional)?;
            if matches!(completion, Completion::LocalValue) {
                self.set_local(result);
            }
            return Ok(());
        }
        if function.is_external {
            let mut result = self.dispatch_external(&function, positional, named)?;
            let already_future =
                matches!(result, Value::Ref(id) if matches!(self.heap.get(id), HeapData::Future(_)));
            if function.is_async && !already_future {
                // An async external that answered synchronously still
                // surfaces as a resolved future.
                result = Value::Ref(self.heap.allocate(HeapData::Future(FutureState::Resolved(result))));
            }
            if matches!(completion, Completion::LocalValue) {
                self.set_local(result);
            }
            return Ok(());
        }
        if function.category == FunctionCategory::Constructor {
            // A bare constructor reference: route through instantiation of
            // its class.
            let class_id = function
                .class_id
                .as_deref()
                .ok_or_else(|| HetuError::not_callable(function.display_name()))?;
            let class = self.resolve_class_by_id(class_id)?;
            let ctor_name = function.id.clone();
            return self.instantiate(class, ctor_name.as_deref(), positional, named);
        }
        self.enter_script_function(&function, function_id, positional, named, completion, None)
    }

    /// Binds arguments into a fresh call namespace and pushes the body
    /// frame (or completes immediately for bodiless functions).
    fn enter_script_function(
        &mut self,
        function: &HtFunction,
        function_id: HeapId,
        positional: Vec<Value>,
        named: Vec<(String, Value)>,
        completion: Completion,
        instance_under_construction: Option<HeapId>,
    ) -> RunResult<()> {
        let closure = self.function_closure(function);
        let call_ns = HtNamespace::new(function.internal_name.clone(), function.class_id.clone(), Some(closure), &self.heap);
        let call_ns = self.heap.allocate(HeapData::Namespace(call_ns));

        // `super` view for methods of derived classes, resolved through
        // the receiver's own frame for the defining class.
        let super_view = if let Some(Value::Ref(receiver)) = function.instance
            && let HeapData::Instance(instance) = self.heap.get(receiver)
            && let Some(class_id) = function.class_id.as_deref()
        {
            instance
                .frames
                .iter()
                .find(|frame| frame.class_id == class_id)
                .and_then(|frame| self.heap.expect_class(frame.class).super_class)
                .map(|super_class| (receiver, super_class))
        } else {
            None
        };
        if let Some((receiver, super_class)) = super_view {
            let cast = self.heap.allocate(HeapData::Cast(HtCast {
                instance: receiver,
                class: super_class,
            }));
            let super_id = self.config.lexicon.super_id.clone();
            self.heap.expect_namespace_mut(call_ns).define_local(super_id, Value::Ref(cast));
        }

        self.bind_arguments(function, call_ns, positional, named)?;

        let Some(definition) = function.definition.clone() else {
            // Synthesized default constructors and other bodiless entries.
            let result = match completion {
                Completion::Instance(instance) => Some(Value::Ref(instance)),
                Completion::LocalValue => Some(Value::Null),
                Completion::Discard => None,
            };
            if let Some(mut result) = result {
                if function.is_async {
                    result = Value::Ref(self.heap.allocate(HeapData::Future(FutureState::Resolved(result))));
                }
                self.set_local(result);
            }
            return Ok(());
        };

        self.push_call_frame(function_id, &definition, call_ns, completion, function.is_async, function.display_name());

        // Constructor redirection runs before the body: evaluate the
        // recorded initializers, then stack the target constructor frame
        // on top so it executes first.
        if let Some(redirect) = &function.redirecting_constructor {
            let instance = instance_under_construction
                .ok_or_else(|| HetuError::bytecode("redirecting constructor outside instantiation"))?;
            let mut redirect_positional = Vec::with_capacity(redirect.positional_ips.len());
            for &ip in &redirect.positional_ips {
                redirect_positional.push(self.run_expr_at(&definition.module, ip, call_ns)?);
            }
            let mut redirect_named = Vec::with_capacity(redirect.named_ips.len());
            for (name, ip) in &redirect.named_ips {
                redirect_named.push((name.clone(), self.run_expr_at(&definition.module, *ip, call_ns)?));
            }
            let target_class = if redirect.callee == self.config.lexicon.super_id {
                let class = self.resolve_class_by_id(
                    function
                        .class_id
                        .as_deref()
                        .ok_or_else(|| HetuError::bytecode("constructor without a class"))?,
                )?;
                self.heap
                    .expect_class(class)
                    .super_class
                    .ok_or_else(|| HetuError::undefined(&self.config.lexicon.super_id.clone()))?
            } else {
                self.resolve_class_by_id(
                    function
                        .class_id
                        .as_deref()
                        .ok_or_else(|| HetuError::bytecode("constructor without a class"))?,
                )?
            };
            self.run_constructor(target_class, instance, redirect.key.as_deref(), redirect_positional, redirect_named, Completion::Discard)?;
        }
        Ok(())
    }

    /// The namespace a call closes over: the receiver's scope for bound
    /// methods, the captured closure otherwise.
    fn function_closure(&self, function: &HtFunction) -> HeapId {
        if let Some(Value::Ref(receiver)) = function.instance {
            match self.heap.get(receiver) {
                HeapData::Struct(strukt) => return strukt.namespace,
                HeapData::Instance(instance) => {
                    if let Some(class_id) = function.class_id.as_deref()
                        && let Some(frame) = instance.frames.iter().find(|frame| frame.class_id == class_id)
                    {
                        return frame.namespace;
                    }
                    if let Some(frame) = instance.frames.first() {
                        return frame.namespace;
                    }
                }
                HeapData::Cast(cast) => {
                    let instance = self.heap.expect_instance(cast.instance);
                    let level = instance.frame_of(cast.class).unwrap_or(0);
                    return instance.frames[level].namespace;
                }
                _ => {}
            }
        }
        function.closure.unwrap_or(self.global_namespace)
    }

    /// The parameter binding protocol: `this`, named parameters,
    /// positionals in order, the variadic tail, lazy defaults.
    fn bind_arguments(
        &mut self,
        function: &HtFunction,
        call_ns: HeapId,
        positional: Vec<Value>,
        named: Vec<(String, Value)>,
    ) -> RunResult<()> {
        if let Some(receiver) = function.instance {
            let this_id = self.config.lexicon.this_id.clone();
            self.heap.expect_namespace_mut(call_ns).define_local(this_id, receiver);
        }

        for (name, _) in &named {
            if !function.params.iter().any(|param| param.is_named && param.id == *name) {
                return Err(HetuError::extra_named_arg(name, function.display_name()));
            }
        }

        let module = function.definition.as_ref().map(|definition| definition.module.clone());
        let mut positional_iter = positional.into_iter();
        for param in &function.params {
            let value = if param.is_variadic {
                let rest: Vec<Value> = positional_iter.by_ref().collect();
                Value::Ref(self.heap.allocate(HeapData::List(rest)))
            } else if param.is_named {
                match named.iter().find(|(name, _)| *name == param.id) {
                    Some((_, value)) => *value,
                    None => self.parameter_default(param, module.as_deref(), call_ns)?,
                }
            } else {
                match positional_iter.next() {
                    Some(value) => value,
                    None if param.is_optional => self.parameter_default(param, module.as_deref(), call_ns)?,
                    None => {
                        return Err(HetuError::missing_positional_arg(&param.id, function.display_name()));
                    }
                }
            };
            let mut decl = Declaration::variable(value, self.config.lexicon.is_private(&param.id));
            decl.kind = DeclKind::Parameter;
            decl.decl_type = param.decl_type.clone();
            crate::namespace::define(&mut self.heap, call_ns, &param.id, decl, true)?;
        }
        if positional_iter.next().is_some() {
            return Err(HetuError::extra_positional_arg(function.display_name()));
        }
        Ok(())
    }

    fn parameter_default(
        &mut self,
        param: &crate::types::Param,
        module: Option<&str>,
        call_ns: HeapId,
    ) -> RunResult<Value> {
        match (param.default_ip, module) {
            (Some(ip), Some(module)) => self.run_expr_at(module, ip, call_ns),
            _ => Ok(Value::Null),
        }
    }

    /// Pushes one call record and jumps into the body.
    fn push_call_frame(
        &mut self,
        function: HeapId,
        definition: &crate::types::FunctionDefinition,
        call_ns: HeapId,
        completion: Completion,
        is_async: bool,
        display_name: &str,
    ) {
        self.stack_trace.push(format!(
            "({}:{}:{}) in {display_name}",
            self.ctx.file, self.ctx.line, self.ctx.column
        ));
        self.call_stack.push(CallRecord {
            function,
            return_ip: self.ctx.ip,
            return_module: self.ctx.module.clone(),
            return_file: self.ctx.file.clone(),
            return_namespace: self.ctx.namespace,
            return_line: self.ctx.line,
            return_column: self.ctx.column,
            frame_depth: self.frames.len(),
            completion,
            is_async,
        });
        self.frames.push(StackFrame::default());
        self.ctx.module = definition.module.clone();
        self.ctx.ip = definition.ip;
        self.ctx.line = definition.line;
        self.ctx.column = definition.column;
        self.ctx.namespace = call_ns;
    }

    /// Runs a function to completion right now, nested inside the current
    /// opcode. Used where a value is needed mid-operation (spread copies,
    /// host-initiated invocation); suspension cannot cross it.
    pub(crate) fn invoke_function_now(
        &mut self,
        function_id: HeapId,
        positional: Vec<Value>,
        named: Vec<(String, Value)>,
    ) -> RunResult<Value> {
        let base = self.call_stack.len();
        self.call_function_value(function_id, positional, named, Completion::LocalValue)?;
        if self.call_stack.len() > base {
            match self.execute(base + 1, false)? {
                LoopExit::Value(value) => Ok(value),
                LoopExit::Suspended(_) => Err(HetuError::extern_error(
                    "await on a pending future is only supported at statement level",
                )),
            }
        } else {
            Ok(self.local())
        }
    }

    /// `new C(...)` and plain `C(...)`: allocate the instance, run field
    /// initializers root-first, then the constructor chain.
    pub(crate) fn instantiate(
        &mut self,
        class_id: HeapId,
        ctor_name: Option<&str>,
        positional: Vec<Value>,
        named: Vec<(String, Value)>,
    ) -> RunResult<()> {
        let (class_name, is_abstract, is_external) = {
            let class = self.heap.expect_class(class_id);
            (class.id.clone(), class.is_abstract, class.is_external)
        };
        if is_abstract {
            return Err(HetuError::abstracted(&class_name));
        }
        if is_external {
            let key = match ctor_name {
                Some(name) => format!("{class_name}.{name}"),
                None => class_name,
            };
            let function = external_stub(&key, None);
            let stub = self.heap.allocate(HeapData::Function(function));
            return self.call_function_value(stub, positional, named, Completion::LocalValue);
        }

        let chain = HtClass::chain(class_id, &self.heap);
        let instance = self.heap.allocate(HeapData::Instance(HtInstance {
            class: class_id,
            frames: Vec::new(),
        }));

        // Field frames root-first so base-class state exists before
        // derived initializers read it.
        let mut frames = Vec::with_capacity(chain.len());
        for &level in chain.iter().rev() {
            let (level_id, level_ns) = {
                let class = self.heap.expect_class(level);
                (class.id.clone(), class.namespace)
            };
            let frame_ns = HtNamespace::new(level_id.clone(), Some(level_id.clone()), Some(level_ns), &self.heap);
            let frame_ns = self.heap.allocate(HeapData::Namespace(frame_ns));
            let this_id = self.config.lexicon.this_id.clone();
            self.heap.expect_namespace_mut(frame_ns).define_local(this_id, Value::Ref(instance));

            let field_decls: Vec<(String, Option<crate::namespace::LateInit>)> = self
                .heap
                .expect_namespace(level_ns)
                .symbols
                .iter()
                .filter(|(_, decl)| decl.is_field && !decl.is_static && decl.kind == DeclKind::Variable)
                .map(|(id, decl)| (id.clone(), decl.late_init.clone()))
                .collect();
            let mut fields = IndexMap::new();
            for (id, init) in field_decls {
                let value = match init {
                    Some(init) => self.run_expr_at(&init.module, init.ip, frame_ns)?,
                    None => Value::Null,
                };
                fields.insert(id, value);
            }
            frames.push(InstanceFrame {
                class: level,
                class_id: level_id,
                fields,
                namespace: frame_ns,
            });
        }
        frames.reverse();
        let HeapData::Instance(instance_data) = self.heap.get_mut(instance) else {
            unreachable!("instance allocated above");
        };
        instance_data.frames = frames;

        self.run_constructor(class_id, instance, ctor_name, positional, named, Completion::Instance(instance))
    }

    /// Locates a constructor on the chain and invokes it against the
    /// instance being built. Bodiless constructors complete immediately.
    fn run_constructor(
        &mut self,
        class_id: HeapId,
        instance: HeapId,
        ctor_name: Option<&str>,
        positional: Vec<Value>,
        named: Vec<(String, Value)>,
        completion: Completion,
    ) -> RunResult<()> {
        let ctor_key = self.config.lexicon.constructor_id(ctor_name);
        let mut found = None;
        for level in HtClass::chain(class_id, &self.heap) {
            let level_ns = self.heap.expect_class(level).namespace;
            if let Some(symbol) = crate::namespace::find_symbol(&self.heap, level_ns, &ctor_key, false) {
                found = Some(crate::namespace::declaration(&self.heap, symbol, &ctor_key).value);
                break;
            }
        }
        let Some(Value::Ref(ctor_ref)) = found else {
            return match ctor_name {
                Some(name) => Err(HetuError::undefined(name)),
                // No constructor anywhere on the chain: the instance is
                // complete as initialized.
                None => {
                    if matches!(completion, Completion::Instance(_)) {
                        self.set_local(Value::Ref(instance));
                    }
                    Ok(())
                }
            };
        };
        let ctor = self.heap.expect_function(ctor_ref).bind(Value::Ref(instance));
        let ctor_id = self.heap.allocate(HeapData::Function(ctor));
        let function = self.heap.expect_function(ctor_id).clone();
        self.enter_script_function(&function, ctor_id, positional, named, completion, Some(instance))
    }

    /// Calling a struct declaration builds a fresh struct from its
    /// recorded definition.
    fn instantiate_struct_template(
        &mut self,
        template_id: HeapId,
        positional: Vec<Value>,
        _named: Vec<(String, Value)>,
    ) -> RunResult<()> {
        let (id, prototype_id, module, def_ip, decl_ns) = {
            let HeapData::StructTemplate(template) = self.heap.get(template_id) else {
                unreachable!("template kind checked by caller");
            };
            (
                template.id.clone(),
                template.prototype_id.clone(),
                template.module.clone(),
                template.def_ip,
                template.namespace,
            )
        };
        let prototype = match prototype_id {
            Some(prototype_id) => {
                let saved_ns = self.ctx.namespace;
                self.ctx.namespace = decl_ns;
                let resolved = self.resolve_identifier(&prototype_id);
                self.ctx.namespace = saved_ns;
                match resolved? {
                    Value::Ref(proto) if matches!(self.heap.get(proto), HeapData::Struct(_)) => Some(proto),
                    _ => return Err(HetuError::type_cast(&prototype_id, "struct")),
                }
            }
            None => None,
        };
        let lexicon = self.config.lexicon.clone();
        let struct_id = new_struct(&mut self.heap, id, prototype, Some(decl_ns), &lexicon);

        // Replay the recorded field definitions.
        let saved = self.ctx.clone();
        self.ctx.module = module;
        self.ctx.ip = def_ip;
        let code = self.code();
        let field_count = self.fetch_u16(&code)?;
        let result = self.read_struct_fields(&code, struct_id, field_count);
        self.ctx = saved;
        result?;

        // A constructor entry receives the creation arguments.
        let ctor_key = lexicon.constructor_id(None);
        let ctor = self.heap.expect_struct(struct_id).fields.get(&ctor_key).copied();
        if let Some(Value::Ref(ctor)) = ctor {
            let bound = self.heap.expect_function(ctor).bind(Value::Ref(struct_id));
            let bound = self.heap.allocate(HeapData::Function(bound));
            self.invoke_function_now(bound, positional, Vec::new())?;
        }
        self.set_local(Value::Ref(struct_id));
        Ok(())
    }

    /// Host dispatch by the binding id convention; a `Future` answer
    /// allocates a pending future correlated with a fresh call id.
    fn dispatch_external(
        &mut self,
        function: &HtFunction,
        positional: Vec<Value>,
        named: Vec<(String, Value)>,
    ) -> RunResult<Value> {
        let name = function.display_name();
        let key = match (&function.class_id, function.category) {
            (Some(class_id), FunctionCategory::Constructor) => match &function.id {
                Some(id) => format!("{class_id}.{id}"),
                None => class_id.clone(),
            },
            (Some(class_id), _) if function.is_static => format!("{class_id}.{name}"),
            (Some(class_id), _) => format!("{class_id}::{name}"),
            (None, _) => name.to_owned(),
        };
        let lexicon = self.config.lexicon.clone();
        let receiver = function
            .instance
            .map(|receiver| Object::from_value(receiver, &self.heap, &lexicon));
        let mut call = NativeCall {
            receiver,
            positional: positional
                .iter()
                .map(|&value| Object::from_value(value, &self.heap, &lexicon))
                .collect(),
            named: named
                .iter()
                .map(|(name, value)| (name.clone(), Object::from_value(*value, &self.heap, &lexicon)))
                .collect(),
        };
        let Some(native) = self.externals.function(&key) else {
            return Err(HetuError::undefined_external(&key));
        };
        let result = native(&mut call)?;
        match result {
            ExternalReturn::Value(object) => Ok(object.to_value(&mut self.heap)),
            ExternalReturn::Future => {
                self.next_call_id += 1;
                let call_id = self.next_call_id;
                let future = self.heap.allocate(HeapData::Future(FutureState::Pending(call_id)));
                self.pending_futures.insert(call_id, future);
                Ok(Value::Ref(future))
            }
        }
    }

    /// The runtime-implemented struct operations.
    fn run_builtin(&mut self, builtin: Builtin, function: &HtFunction, positional: &[Value]) -> RunResult<Value> {
        let lexicon = self.config.lexicon.clone();
        let Some(Value::Ref(receiver)) = function.instance else {
            return Err(HetuError::not_callable(function.display_name()));
        };
        let other_struct = |value: Option<&Value>, heap: &crate::heap::Heap| -> RunResult<HeapId> {
            match value {
                Some(Value::Ref(id)) if matches!(heap.get(*id), HeapData::Struct(_)) => Ok(*id),
                _ => Err(HetuError::type_cast("argument", "struct")),
            }
        };
        match builtin {
            Builtin::StructClone => {
                let clone = crate::types::struct_clone(&mut self.heap, receiver, false, &lexicon);
                Ok(Value::Ref(clone))
            }
            Builtin::StructAssign => {
                let other = other_struct(positional.first(), &self.heap)?;
                crate::types::struct_assign(&mut self.heap, receiver, other, &lexicon);
                Ok(Value::Ref(receiver))
            }
            Builtin::StructMerge => {
                let other = other_struct(positional.first(), &self.heap)?;
                crate::types::struct_merge(&mut self.heap, receiver, other, &lexicon);
                Ok(Value::Ref(receiver))
            }
            Builtin::StructContains => {
                let key = positional
                    .first()
                    .and_then(|&key| self.heap.str_value(key))
                    .ok_or_else(|| HetuError::sub_get_key("contains expects a string key"))?
                    .to_owned();
                Ok(Value::Bool(crate::types::struct_contains(&self.heap, receiver, &key, false)))
            }
            Builtin::StructOwns => {
                let key = positional
                    .first()
                    .and_then(|&key| self.heap.str_value(key))
                    .ok_or_else(|| HetuError::sub_get_key("owns expects a string key"))?
                    .to_owned();
                Ok(Value::Bool(crate::types::struct_contains(&self.heap, receiver, &key, true)))
            }
            Builtin::StructToString => {
                let rendered = value::stringify(Value::Ref(receiver), &self.heap);
                Ok(self.heap.allocate_str(rendered))
            }
        }
    }

    /// Finds the class a bare id refers to in the current scope.
    pub(crate) fn resolve_class_by_id(&self, class_id: &str) -> RunResult<HeapId> {
        let Some(found) = crate::namespace::find_symbol(&self.heap, self.ctx.namespace, class_id, true) else {
            return Err(HetuError::undefined(class_id));
        };
        match crate::namespace::declaration(&self.heap, found, class_id).value {
            Value::Ref(id) if matches!(self.heap.get(id), HeapData::Class(_)) => Ok(id),
            _ => Err(HetuError::undefined(class_id)),
        }
    }
}

/// A function object standing in for an unbound external entry, used when
/// external classes are constructed by key.
fn external_stub(key: &str, class_id: Option<String>) -> HtFunction {
    HtFunction {
        internal_name: key.to_owned(),
        id: Some(key.to_owned()),
        class_id,
        closure: None,
        category: FunctionCategory::Normal,
        params: Vec::new(),
        declared_return_type: None,
        definition: None,
        is_async: false,
        is_external: true,
        is_static: false,
        is_const: false,
        is_field: false,
        is_abstract: false,
        min_arity: 0,
        max_arity: u8::MAX,
        redirecting_constructor: None,
        external_type_id: None,
        instance: None,
        builtin: None,
        doc: None,
    }
}
