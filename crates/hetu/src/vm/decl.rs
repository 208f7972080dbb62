//! Declaration opcodes: variables, constants, functions, classes,
//! structs, namespaces, type aliases, imports and exports.

use crate::{
    bytecode::ConstKind,
    error::{HetuError, RunResult},
    external::FunctionReference,
    heap::HeapData,
    interpreter::Hetu,
    namespace::{Declaration, DeclKind, HtNamespace, LateInit, UnresolvedImport},
    types::{
        FunctionCategory, FunctionDefinition, HtClass, HtFunction, Param, RedirectingConstructor, StructTemplate,
        new_struct,
    },
    value::{Value, ValueKey},
};

impl Hetu {
    pub(crate) fn op_var_decl(&mut self, code: &[u8]) -> RunResult<()> {
        let id = self.fetch_utf8(code)?;
        let flags = self.fetch_u8(code)?;
        let is_mutable = flags & 1 != 0;
        let is_external = flags & (1 << 1) != 0;
        let is_static = flags & (1 << 2) != 0;
        let is_field = flags & (1 << 3) != 0;
        let is_late = flags & (1 << 4) != 0;
        let decl_type = if self.fetch_bool(code)? {
            Some(self.read_type_literal(code)?)
        } else {
            None
        };

        let mut value = Value::Null;
        let mut late_init = None;
        if self.fetch_bool(code)? {
            let line = self.fetch_u16(code)?;
            let column = self.fetch_u16(code)?;
            let chunk = self.fetch_chunk(code)?;
            let defer = is_late || (is_field && !is_static);
            if defer {
                late_init = Some(LateInit {
                    module: self.ctx.module.clone(),
                    ip: chunk,
                    line,
                    column,
                    namespace: self.ctx.namespace,
                });
            } else {
                value = self.run_expr(chunk)?;
                if self.config.resolve_declaration_statement_value {
                    self.set_local(value);
                }
            }
        }

        let decl = Declaration {
            value,
            kind: DeclKind::Variable,
            decl_type,
            is_mutable,
            is_external,
            is_static,
            is_private: self.config.lexicon.is_private(&id),
            is_field,
            doc: None,
            late_init,
        };
        crate::namespace::define(&mut self.heap, self.ctx.namespace, &id, decl, false)
    }

    pub(crate) fn op_const_decl(&mut self, code: &[u8]) -> RunResult<()> {
        let id = self.fetch_utf8(code)?;
        let _is_top_level = self.fetch_bool(code)?;
        let kind = self.fetch_u8(code)?;
        let index = self.fetch_u16(code)? as usize;
        let module = &self.modules[&self.ctx.module];
        let value = match kind {
            k if k == ConstKind::Int as u8 => Value::Int(
                *module
                    .const_ints
                    .get(index)
                    .ok_or_else(|| HetuError::bytecode(format!("int constant {index} out of range")))?,
            ),
            k if k == ConstKind::Float as u8 => Value::Float(
                *module
                    .const_floats
                    .get(index)
                    .ok_or_else(|| HetuError::bytecode(format!("float constant {index} out of range")))?,
            ),
            k if k == ConstKind::String as u8 => {
                let s = module
                    .const_strings
                    .get(index)
                    .ok_or_else(|| HetuError::bytecode(format!("string constant {index} out of range")))?
                    .clone();
                self.heap.allocate_str(s)
            }
            other => return Err(HetuError::bytecode(format!("unknown constant kind {other}"))),
        };
        let decl = Declaration::constant(value, self.config.lexicon.is_private(&id));
        crate::namespace::define(&mut self.heap, self.ctx.namespace, &id, decl, false)?;
        if self.config.resolve_declaration_statement_value {
            self.set_local(value);
        }
        Ok(())
    }

    /// Destructuring from the staged source value: by position for list
    /// patterns, by name for struct patterns.
    pub(crate) fn op_destructuring_decl(&mut self, code: &[u8]) -> RunResult<()> {
        let is_mutable = self.fetch_bool(code)?;
        let is_struct_pattern = self.fetch_u8(code)? == 1;
        let count = self.fetch_u8(code)?;
        let source = self.local();
        for index in 0..count {
            let id = self.fetch_utf8(code)?;
            let value = self.destructured_value(source, &id, index, is_struct_pattern)?;
            let mut decl = Declaration::variable(value, self.config.lexicon.is_private(&id));
            decl.is_mutable = is_mutable;
            crate::namespace::define(&mut self.heap, self.ctx.namespace, &id, decl, false)?;
        }
        Ok(())
    }

    fn destructured_value(&mut self, source: Value, id: &str, index: u8, is_struct_pattern: bool) -> RunResult<Value> {
        let Value::Ref(source_id) = source else {
            return Err(HetuError::sub_get_key("destructuring a non-collection value"));
        };
        match self.heap.get(source_id) {
            HeapData::List(items) if !is_struct_pattern => Ok(items.get(index as usize).copied().unwrap_or(Value::Null)),
            HeapData::Map(entries) => Ok(entries.get(&ValueKey::Str(id.to_owned())).copied().unwrap_or(Value::Null)),
            HeapData::Struct(_) => {
                let lexicon = self.config.lexicon.clone();
                match crate::types::struct_member_get(&mut self.heap, source_id, id, source_id, None, &lexicon)? {
                    crate::types::StructLookup::Value(value) => Ok(value),
                    crate::types::StructLookup::Getter(getter) => self.invoke_function_now(getter, Vec::new(), Vec::new()),
                    crate::types::StructLookup::NotFound => Ok(Value::Null),
                }
            }
            other => Err(HetuError::sub_get_key(other.kind_name())),
        }
    }

    pub(crate) fn op_func_decl(&mut self, code: &[u8]) -> RunResult<()> {
        let function = self.read_func_record(code)?;
        if function.category == FunctionCategory::Literal {
            return self.define_function_literal(function);
        }
        let lexicon = &self.config.lexicon;
        let storage_id = match function.category {
            FunctionCategory::Getter => lexicon.getter_id(function.display_name()),
            FunctionCategory::Setter => lexicon.setter_id(function.display_name()),
            FunctionCategory::Constructor => lexicon.constructor_id(function.id.as_deref()),
            _ => function.display_name().to_owned(),
        };
        let is_private = self.config.lexicon.is_private(&storage_id);
        let handle = self.heap.allocate(HeapData::Function(function));
        let decl = Declaration {
            kind: DeclKind::Function,
            is_mutable: false,
            ..Declaration::variable(Value::Ref(handle), is_private)
        };
        crate::namespace::define(&mut self.heap, self.ctx.namespace, &storage_id, decl, false)?;
        self.set_local(Value::Ref(handle));
        Ok(())
    }

    /// Function literals become values; with an external type id they are
    /// re-wrapped through the registered host typedef first.
    pub(crate) fn define_function_literal(&mut self, function: HtFunction) -> RunResult<()> {
        if let Some(type_id) = function.external_type_id.clone() {
            let Some(wrapper) = self.externals.function_type(&type_id) else {
                return Err(HetuError::undefined_external(&type_id));
            };
            let object = wrapper(FunctionReference {
                internal_name: function.internal_name.clone(),
                module: self.ctx.module.clone(),
            });
            let value = object.to_value(&mut self.heap);
            self.set_local(value);
            return Ok(());
        }
        let handle = self.heap.allocate(HeapData::Function(function));
        self.set_local(Value::Ref(handle));
        Ok(())
    }

    /// Reads one function record, capturing the current namespace as the
    /// closure and recording chunk sites instead of executing them.
    pub(crate) fn read_func_record(&mut self, code: &[u8]) -> RunResult<HtFunction> {
        let internal_name = self.fetch_utf8(code)?;
        let id = if self.fetch_bool(code)? {
            Some(self.fetch_utf8(code)?)
        } else {
            None
        };
        let class_id = if self.fetch_bool(code)? {
            Some(self.fetch_utf8(code)?)
        } else {
            None
        };
        let external_type_id = if self.fetch_bool(code)? {
            Some(self.fetch_utf8(code)?)
        } else {
            None
        };
        let category = FunctionCategory::from_u8(self.fetch_u8(code)?)
            .ok_or_else(|| HetuError::bytecode("unknown function category"))?;
        let flags = self.fetch_u8(code)?;
        let is_async = flags & 1 != 0;
        let is_external = flags & (1 << 1) != 0;
        let is_static = flags & (1 << 2) != 0;
        let is_const = flags & (1 << 3) != 0;
        let is_field = flags & (1 << 4) != 0;
        let is_abstract = flags & (1 << 5) != 0;
        let min_arity = self.fetch_u8(code)?;
        let max_arity = self.fetch_u8(code)?;

        let param_count = self.fetch_u8(code)?;
        let mut params = Vec::with_capacity(param_count as usize);
        for _ in 0..param_count {
            let param_id = self.fetch_utf8(code)?;
            let param_flags = self.fetch_u8(code)?;
            let decl_type = if self.fetch_bool(code)? {
                Some(self.read_type_literal(code)?)
            } else {
                None
            };
            let default_ip = if self.fetch_bool(code)? {
                Some(self.fetch_chunk(code)?)
            } else {
                None
            };
            params.push(Param {
                id: param_id,
                decl_type,
                is_optional: param_flags & 1 != 0,
                is_variadic: param_flags & 2 != 0,
                is_named: param_flags & 4 != 0,
                default_ip,
            });
        }

        let declared_return_type = if self.fetch_bool(code)? {
            Some(self.read_type_literal(code)?)
        } else {
            None
        };

        let redirecting_constructor = if self.fetch_bool(code)? {
            let callee = self.fetch_utf8(code)?;
            let key = if self.fetch_bool(code)? {
                Some(self.fetch_utf8(code)?)
            } else {
                None
            };
            let positional_count = self.fetch_u8(code)?;
            let mut positional_ips = Vec::with_capacity(positional_count as usize);
            for _ in 0..positional_count {
                positional_ips.push(self.fetch_chunk(code)?);
            }
            let named_count = self.fetch_u8(code)?;
            let mut named_ips = Vec::with_capacity(named_count as usize);
            for _ in 0..named_count {
                let name = self.fetch_utf8(code)?;
                named_ips.push((name, self.fetch_chunk(code)?));
            }
            Some(RedirectingConstructor {
                callee,
                key,
                positional_ips,
                named_ips,
            })
        } else {
            None
        };

        let definition = if self.fetch_bool(code)? {
            let line = self.fetch_u16(code)?;
            let column = self.fetch_u16(code)?;
            let ip = self.fetch_chunk(code)?;
            Some(FunctionDefinition {
                module: self.ctx.module.clone(),
                ip,
                line,
                column,
            })
        } else {
            None
        };

        Ok(HtFunction {
            internal_name,
            id,
            class_id,
            closure: Some(self.ctx.namespace),
            category,
            params,
            declared_return_type,
            definition,
            is_async,
            is_external,
            is_static,
            is_const,
            is_field,
            is_abstract,
            min_arity,
            max_arity,
            redirecting_constructor,
            external_type_id,
            instance: None,
            builtin: None,
            doc: None,
        })
    }

    pub(crate) fn op_class_decl(&mut self, code: &[u8]) -> RunResult<()> {
        let id = self.fetch_utf8(code)?;
        let flags = self.fetch_u8(code)?;
        let is_external = flags & 1 != 0;
        let is_abstract = flags & (1 << 1) != 0;
        let has_user_defined_constructor = flags & (1 << 2) != 0;
        let is_enum = flags & (1 << 3) != 0;
        let super_type = if self.fetch_bool(code)? {
            Some(self.read_type_literal(code)?)
        } else {
            None
        };
        let class_ns = HtNamespace::new(id.clone(), Some(id.clone()), Some(self.ctx.namespace), &self.heap);
        let class_ns = self.heap.allocate(HeapData::Namespace(class_ns));
        let class = self.heap.allocate(HeapData::Class(HtClass {
            id,
            super_type,
            super_class: None,
            is_abstract,
            is_external,
            is_enum,
            has_user_defined_constructor,
            namespace: class_ns,
            doc: None,
        }));
        self.class_stack.push(class);
        self.ctx.namespace = class_ns;
        Ok(())
    }

    /// Closes a class body: resolves the superclass, synthesizes the
    /// default constructor when none was declared, and defines the class
    /// in the enclosing namespace.
    pub(crate) fn op_class_decl_end(&mut self) -> RunResult<()> {
        let class = self
            .class_stack
            .pop()
            .ok_or_else(|| HetuError::bytecode("classDeclEnd without an open class"))?;

        let (id, class_ns, super_type, is_abstract, has_user_ctor) = {
            let class = self.heap.expect_class(class);
            (
                class.id.clone(),
                class.namespace,
                class.super_type.clone(),
                class.is_abstract,
                class.has_user_defined_constructor,
            )
        };

        if let Some(super_type) = super_type {
            let resolved = self.resolve_nominal(super_type);
            let HeapData::Class(class_data) = self.heap.get_mut(class) else {
                unreachable!("class allocated in op_class_decl");
            };
            if let crate::types::HtType::Nominal(nominal) = &resolved {
                class_data.super_class = nominal.class;
            }
            class_data.super_type = Some(resolved);
        }

        if !has_user_ctor && !is_abstract {
            let ctor_key = self.config.lexicon.constructor_id(None);
            let ctor = HtFunction {
                internal_name: ctor_key.clone(),
                id: None,
                class_id: Some(id.clone()),
                closure: Some(class_ns),
                category: FunctionCategory::Constructor,
                params: Vec::new(),
                declared_return_type: None,
                definition: None,
                is_async: false,
                is_external: false,
                is_static: false,
                is_const: false,
                is_field: false,
                is_abstract: false,
                min_arity: 0,
                max_arity: 0,
                redirecting_constructor: None,
                external_type_id: None,
                instance: None,
                builtin: None,
                doc: None,
            };
            let handle = self.heap.allocate(HeapData::Function(ctor));
            let decl = Declaration {
                kind: DeclKind::Function,
                is_mutable: false,
                ..Declaration::variable(Value::Ref(handle), false)
            };
            crate::namespace::define(&mut self.heap, class_ns, &ctor_key, decl, false)?;
        }

        let enclosing = self
            .heap
            .expect_namespace(class_ns)
            .closure
            .expect("class namespace always has an enclosing scope");
        self.ctx.namespace = enclosing;
        let decl = Declaration {
            kind: DeclKind::Class,
            is_mutable: false,
            ..Declaration::variable(Value::Ref(class), self.config.lexicon.is_private(&id))
        };
        crate::namespace::define(&mut self.heap, enclosing, &id, decl, false)?;
        self.set_local(Value::Ref(class));
        Ok(())
    }

    pub(crate) fn op_struct_decl(&mut self, code: &[u8]) -> RunResult<()> {
        let id = self.fetch_utf8(code)?;
        let prototype_id = if self.fetch_bool(code)? {
            Some(self.fetch_utf8(code)?)
        } else {
            None
        };
        let def_ip = self.fetch_chunk(code)?;
        let template = StructTemplate {
            id: id.clone(),
            prototype_id,
            module: self.ctx.module.clone(),
            def_ip,
            namespace: self.ctx.namespace,
        };
        let handle = self.heap.allocate(HeapData::StructTemplate(template));
        let decl = Declaration {
            kind: DeclKind::StructDecl,
            is_mutable: false,
            ..Declaration::variable(Value::Ref(handle), self.config.lexicon.is_private(&id))
        };
        crate::namespace::define(&mut self.heap, self.ctx.namespace, &id, decl, false)
    }

    pub(crate) fn op_namespace_decl(&mut self, code: &[u8]) -> RunResult<()> {
        let id = self.fetch_utf8(code)?;
        let _is_top_level = self.fetch_bool(code)?;
        // Reopening an existing namespace continues it.
        if let Some(found) = crate::namespace::find_symbol(&self.heap, self.ctx.namespace, &id, false) {
            let decl = crate::namespace::declaration(&self.heap, found, &id);
            if decl.kind == DeclKind::Namespace
                && let Value::Ref(existing) = decl.value
            {
                self.ctx.namespace = existing;
                return Ok(());
            }
            return Err(HetuError::defined(&id));
        }
        let ns = HtNamespace::new(id.clone(), None, Some(self.ctx.namespace), &self.heap);
        let handle = self.heap.allocate(HeapData::Namespace(ns));
        let decl = Declaration {
            kind: DeclKind::Namespace,
            is_mutable: false,
            ..Declaration::variable(Value::Ref(handle), self.config.lexicon.is_private(&id))
        };
        crate::namespace::define(&mut self.heap, self.ctx.namespace, &id, decl, false)?;
        self.ctx.namespace = handle;
        Ok(())
    }

    pub(crate) fn op_type_alias_decl(&mut self, code: &[u8]) -> RunResult<()> {
        let id = self.fetch_utf8(code)?;
        let _is_top_level = self.fetch_bool(code)?;
        let ty = self.read_type_literal(code)?;
        let ty = self.resolve_nominal(ty);
        let handle = self.heap.allocate(HeapData::Type(ty));
        let decl = Declaration {
            kind: DeclKind::TypeAlias,
            is_mutable: false,
            ..Declaration::variable(Value::Ref(handle), self.config.lexicon.is_private(&id))
        };
        crate::namespace::define(&mut self.heap, self.ctx.namespace, &id, decl, false)
    }

    pub(crate) fn op_external_enum_decl(&mut self, code: &[u8]) -> RunResult<()> {
        let id = self.fetch_utf8(code)?;
        let _is_top_level = self.fetch_bool(code)?;
        let Some(variants) = self.externals.r#enum(&id).map(<[_]>::to_vec) else {
            return Err(HetuError::undefined_external(&id));
        };
        let lexicon = self.config.lexicon.clone();
        let enum_struct = new_struct(&mut self.heap, id.clone(), None, Some(self.ctx.namespace), &lexicon);
        for (variant, object) in variants {
            let value = object.to_value(&mut self.heap);
            self.heap.expect_struct_mut(enum_struct).fields.insert(variant, value);
        }
        let decl = Declaration {
            kind: DeclKind::ExternalClass,
            is_mutable: false,
            ..Declaration::variable(Value::Ref(enum_struct), false)
        };
        crate::namespace::define(&mut self.heap, self.ctx.namespace, &id, decl, false)
    }

    /// Records an import for end-of-module resolution, or adjusts the
    /// export set directly for self exports.
    pub(crate) fn op_import_export_decl(&mut self, code: &[u8]) -> RunResult<()> {
        let is_export = self.fetch_bool(code)?;
        let from_path = if self.fetch_bool(code)? {
            Some(self.fetch_utf8(code)?)
        } else {
            None
        };
        let alias = if self.fetch_bool(code)? {
            Some(self.fetch_utf8(code)?)
        } else {
            None
        };
        let show_count = self.fetch_u8(code)?;
        let mut show_list = Vec::with_capacity(show_count as usize);
        for _ in 0..show_count {
            show_list.push(self.fetch_utf8(code)?);
        }
        let is_preloaded_module = self.fetch_bool(code)?;

        if is_export && from_path.is_none() {
            let namespace = self.heap.expect_namespace_mut(self.ctx.namespace);
            if show_list.is_empty() {
                namespace.will_export_all = true;
            } else {
                for id in show_list {
                    namespace.declare_export(id);
                }
            }
            return Ok(());
        }
        let import = UnresolvedImport {
            from_path,
            alias,
            show_list,
            is_exported: is_export,
            is_preloaded_module,
        };
        if self.ctx.script_mode {
            // Script sources resolve eagerly: the dependency file already
            // ran earlier in this module's stream.
            let module = self.ctx.module.clone();
            let namespace = self.ctx.namespace;
            let mut visited = ahash::AHashSet::new();
            return self.resolve_import(&module, namespace, import, &mut visited);
        }
        self.heap.expect_namespace_mut(self.ctx.namespace).declare_import(import);
        Ok(())
    }
}
