//! Member and subscript access.

use crate::{
    bytecode::Register,
    error::{HetuError, RunResult},
    heap::{HeapData, HeapId},
    interpreter::Hetu,
    object::Object,
    types::{Builtin, HtClass, HtFunction, StructLookup, StructStore, struct_member_get, struct_member_set},
    value::{self, Value, ValueKey},
    vm::Completion,
};

impl Hetu {
    pub(crate) fn op_member_get(&mut self, code: &[u8]) -> RunResult<()> {
        let flags = self.fetch_u8(code)?;
        let nullable = flags & 1 != 0;
        let object = self.reg(Register::PostfixObject);
        let key = self.expect_key_register()?;
        self.member_get_value(object, &key, nullable)
    }

    pub(crate) fn op_member_set(&mut self, code: &[u8]) -> RunResult<()> {
        let flags = self.fetch_u8(code)?;
        let nullable = flags & 1 != 0;
        let object = self.reg(Register::PostfixObject);
        let key = self.expect_key_register()?;
        let assigned = self.reg(Register::AssignRight);
        // Stage the statement value first: a setter may push a frame, and
        // the staging must land in the caller's slot.
        self.set_local(assigned);
        self.member_set_value(object, &key, assigned, nullable)
    }

    pub(crate) fn op_sub_get(&mut self, code: &[u8]) -> RunResult<()> {
        let flags = self.fetch_u8(code)?;
        let nullable = flags & 1 != 0;
        let object = self.reg(Register::PostfixObject);
        let key = self.local();
        if object.is_null() {
            if nullable {
                self.set_local(Value::Null);
                return Ok(());
            }
            return Err(HetuError::visit_member_of_null_object(&value::stringify(key, &self.heap)));
        }
        let Value::Ref(object_id) = object else {
            return Err(HetuError::sub_get_key(value::stringify(object, &self.heap)));
        };
        match self.heap.get(object_id) {
            HeapData::List(items) => {
                let index = self.list_index(key, items.len())?;
                let item = items[index];
                self.set_local(item);
            }
            HeapData::Str(s) => {
                let index = key
                    .as_i64(&self.heap, &self.config)
                    .ok_or_else(|| HetuError::sub_get_key(value::stringify(key, &self.heap)))?;
                let ch = s
                    .chars()
                    .nth(usize::try_from(index).map_err(|_| HetuError::sub_get_key(index))?)
                    .ok_or_else(|| HetuError::sub_get_key(format!("index {index} out of range")))?;
                let value = self.heap.allocate_str(ch.to_string());
                self.set_local(value);
            }
            HeapData::Map(entries) => {
                let map_key = ValueKey::from_value(key, &self.heap)?;
                let item = entries.get(&map_key).copied().unwrap_or(Value::Null);
                self.set_local(item);
            }
            HeapData::Struct(_) => {
                let key = self
                    .heap
                    .str_value(key)
                    .ok_or_else(|| HetuError::sub_get_key(value::stringify(key, &self.heap)))?
                    .to_owned();
                self.member_get_value(object, &key, nullable)?;
            }
            other => return Err(HetuError::sub_get_key(other.kind_name())),
        }
        Ok(())
    }

    pub(crate) fn op_sub_set(&mut self, code: &[u8]) -> RunResult<()> {
        let flags = self.fetch_u8(code)?;
        let nullable = flags & 1 != 0;
        let object = self.reg(Register::PostfixObject);
        let key = self.reg(Register::PostfixKey);
        let assigned = self.reg(Register::AssignRight);
        if key.is_null() {
            return Err(HetuError::null_sub_set_key());
        }
        if object.is_null() {
            if nullable {
                self.set_local(Value::Null);
                return Ok(());
            }
            return Err(HetuError::visit_member_of_null_object(&value::stringify(key, &self.heap)));
        }
        let Value::Ref(object_id) = object else {
            return Err(HetuError::sub_get_key(value::stringify(object, &self.heap)));
        };
        match self.heap.get(object_id) {
            HeapData::List(items) => {
                let index = self.list_index(key, items.len())?;
                let HeapData::List(items) = self.heap.get_mut(object_id) else {
                    unreachable!("list kind checked above");
                };
                items[index] = assigned;
            }
            HeapData::Map(_) => {
                let map_key = ValueKey::from_value(key, &self.heap)?;
                let HeapData::Map(entries) = self.heap.get_mut(object_id) else {
                    unreachable!("map kind checked above");
                };
                entries.insert(map_key, assigned);
            }
            HeapData::Struct(_) => {
                let key = self
                    .heap
                    .str_value(key)
                    .ok_or_else(|| HetuError::sub_get_key(value::stringify(key, &self.heap)))?
                    .to_owned();
                self.set_local(assigned);
                return self.member_set_value(object, &key, assigned, nullable);
            }
            other => return Err(HetuError::sub_get_key(other.kind_name())),
        }
        self.set_local(assigned);
        Ok(())
    }

    fn expect_key_register(&self) -> RunResult<String> {
        let key = self.reg(Register::PostfixKey);
        self.heap
            .str_value(key)
            .map(str::to_owned)
            .ok_or_else(|| HetuError::bytecode("member key is not a symbol"))
    }

    fn list_index(&self, key: Value, len: usize) -> RunResult<usize> {
        let index = match key {
            Value::Int(i) => i,
            Value::Float(f) if f.fract() == 0.0 => f as i64,
            other => return Err(HetuError::sub_get_key(value::stringify(other, &self.heap))),
        };
        usize::try_from(index)
            .ok()
            .filter(|&index| index < len)
            .ok_or_else(|| HetuError::sub_get_key(format!("index {index} out of range")))
    }

    /// Member read on any value. Either stages the result directly or
    /// pushes a getter frame whose return will land in the local slot.
    pub(crate) fn member_get_value(&mut self, object: Value, key: &str, nullable: bool) -> RunResult<()> {
        if object.is_null() {
            if nullable {
                self.set_local(Value::Null);
                return Ok(());
            }
            return Err(HetuError::visit_member_of_null_object(key));
        }
        let from = self.heap.expect_namespace(self.ctx.namespace).full_name.clone();
        let lexicon = self.config.lexicon.clone();
        let Value::Ref(object_id) = object else {
            return self.external_member_get(object, key);
        };
        match self.heap.get(object_id) {
            HeapData::Struct(_) => {
                match struct_member_get(&mut self.heap, object_id, key, object_id, Some(&from), &lexicon)? {
                    StructLookup::Value(value) => {
                        self.set_local(value);
                        Ok(())
                    }
                    StructLookup::Getter(getter) => {
                        self.call_function_value(getter, Vec::new(), Vec::new(), Completion::LocalValue)
                    }
                    StructLookup::NotFound => self.struct_builtin_member(object_id, key),
                }
            }
            HeapData::Instance(_) => {
                let class = self.heap.expect_instance(object_id).class;
                self.instance_member_get(object_id, class, key, &from)
            }
            HeapData::Cast(cast) => {
                let (instance, class) = (cast.instance, cast.class);
                self.instance_member_get(instance, class, key, &from)
            }
            HeapData::Class(_) => self.class_member_get(object_id, key, &from),
            HeapData::Namespace(_) => {
                let Some(found) = crate::namespace::find_symbol(&self.heap, object_id, key, false) else {
                    return Err(HetuError::undefined(key));
                };
                crate::namespace::check_private_access(&self.heap, found, key, Some(&from), lexicon.is_private(key))?;
                let value = crate::namespace::declaration(&self.heap, found, key).value;
                self.set_local(value);
                Ok(())
            }
            HeapData::ExternalInstance(_) | HeapData::Str(_) | HeapData::List(_) | HeapData::Map(_)
            | HeapData::Set(_) | HeapData::BigInt(_) | HeapData::Future(_) => {
                self.external_member_get(object, key)
            }
            other => Err(HetuError::undefined(&format!("{key} on {}", other.kind_name()))),
        }
    }

    /// Walks the field frames (most derived first) and then the class
    /// namespaces for methods, getters, and statics.
    fn instance_member_get(&mut self, instance_id: HeapId, start_class: HeapId, key: &str, from: &str) -> RunResult<()> {
        let lexicon = self.config.lexicon.clone();
        let receiver = Value::Ref(instance_id);

        let chain = HtClass::chain(start_class, &self.heap);
        // Fields, restricted to the cast level and above.
        let found_field = {
            let instance = self.heap.expect_instance(instance_id);
            let start = instance.frame_of(start_class).unwrap_or(0);
            instance.frames[start..]
                .iter()
                .find_map(|frame| frame.fields.get(key).map(|&field| (field, frame.namespace)))
        };
        if let Some((field, owner_ns)) = found_field {
            if lexicon.is_private(key) {
                let owner = self.heap.expect_namespace(owner_ns).full_name.clone();
                if !from.starts_with(&owner) {
                    return Err(HetuError::private_member(key));
                }
            }
            self.set_local(field);
            return Ok(());
        }
        // Methods, getters, and statics on the class chain.
        let getter_key = lexicon.getter_id(key);
        for class_id in chain {
            let class_ns = self.heap.expect_class(class_id).namespace;
            if let Some(found) = crate::namespace::find_symbol(&self.heap, class_ns, key, false) {
                crate::namespace::check_private_access(&self.heap, found, key, Some(from), lexicon.is_private(key))?;
                let value = crate::namespace::declaration(&self.heap, found, key).value;
                let value = self.bind_if_function(value, receiver);
                self.set_local(value);
                return Ok(());
            }
            if let Some(found) = crate::namespace::find_symbol(&self.heap, class_ns, &getter_key, false) {
                let value = crate::namespace::declaration(&self.heap, found, &getter_key).value;
                if self.is_function_value(value)
                    && let Value::Ref(getter) = self.bind_if_function(value, receiver)
                {
                    return self.call_function_value(getter, Vec::new(), Vec::new(), Completion::LocalValue);
                }
            }
        }
        Err(HetuError::undefined(key))
    }

    fn is_function_value(&self, value: Value) -> bool {
        matches!(value, Value::Ref(id) if matches!(self.heap.get(id), HeapData::Function(_)))
    }

    /// Statics, constructors, and static getters through a class value.
    fn class_member_get(&mut self, class_id: HeapId, key: &str, from: &str) -> RunResult<()> {
        let lexicon = self.config.lexicon.clone();
        let class_ns = self.heap.expect_class(class_id).namespace;
        if let Some(found) = crate::namespace::find_symbol(&self.heap, class_ns, key, false) {
            crate::namespace::check_private_access(&self.heap, found, key, Some(from), lexicon.is_private(key))?;
            let value = crate::namespace::declaration(&self.heap, found, key).value;
            self.set_local(value);
            return Ok(());
        }
        let getter_key = lexicon.getter_id(key);
        if let Some(found) = crate::namespace::find_symbol(&self.heap, class_ns, &getter_key, false) {
            let value = crate::namespace::declaration(&self.heap, found, &getter_key).value;
            if self.is_function_value(value)
                && let Value::Ref(getter) = value
            {
                return self.call_function_value(getter, Vec::new(), Vec::new(), Completion::LocalValue);
            }
        }
        let ctor_key = lexicon.constructor_id(Some(key));
        if let Some(found) = crate::namespace::find_symbol(&self.heap, class_ns, &ctor_key, false) {
            let value = crate::namespace::declaration(&self.heap, found, &ctor_key).value;
            self.set_local(value);
            return Ok(());
        }
        // External classes surface their statics through the host binding.
        let class = self.heap.expect_class(class_id);
        if class.is_external {
            let type_id = class.id.clone();
            if let Some(binding) = self.externals.class(&type_id) {
                let result = binding.member_get(key)?;
                let value = result.to_value(&mut self.heap);
                self.set_local(value);
                return Ok(());
            }
        }
        Err(HetuError::undefined(key))
    }

    fn bind_if_function(&mut self, value: Value, receiver: Value) -> Value {
        if let Value::Ref(id) = value
            && let HeapData::Function(function) = self.heap.get(id)
            && !function.is_static
        {
            let bound = function.bind(receiver);
            return Value::Ref(self.heap.allocate(HeapData::Function(bound)));
        }
        value
    }

    /// The struct operations the runtime provides directly.
    fn struct_builtin_member(&mut self, struct_id: HeapId, key: &str) -> RunResult<()> {
        let lexicon = self.config.lexicon.clone();
        let receiver = Value::Ref(struct_id);
        let value = match key {
            "keys" => {
                let keys = crate::types::struct_keys(&self.heap, struct_id, &lexicon);
                let items: Vec<Value> = keys.into_iter().map(|key| self.heap.allocate_str(key)).collect();
                Value::Ref(self.heap.allocate(HeapData::List(items)))
            }
            "values" => {
                let items = crate::types::struct_values(&self.heap, struct_id, &lexicon);
                Value::Ref(self.heap.allocate(HeapData::List(items)))
            }
            "length" => {
                let count = crate::types::struct_keys(&self.heap, struct_id, &lexicon).len();
                Value::Int(i64::try_from(count).expect("struct size fits i64"))
            }
            "isEmpty" => {
                let count = crate::types::struct_keys(&self.heap, struct_id, &lexicon).len();
                Value::Bool(count == 0)
            }
            "isNotEmpty" => {
                let count = crate::types::struct_keys(&self.heap, struct_id, &lexicon).len();
                Value::Bool(count > 0)
            }
            "clone" => self.allocate_builtin("clone", Builtin::StructClone, receiver),
            "assign" => self.allocate_builtin("assign", Builtin::StructAssign, receiver),
            "merge" => self.allocate_builtin("merge", Builtin::StructMerge, receiver),
            "contains" => self.allocate_builtin("contains", Builtin::StructContains, receiver),
            "owns" => self.allocate_builtin("owns", Builtin::StructOwns, receiver),
            "toString" => self.allocate_builtin("toString", Builtin::StructToString, receiver),
            _ => return Err(HetuError::undefined(key)),
        };
        self.set_local(value);
        Ok(())
    }

    fn allocate_builtin(&mut self, name: &str, builtin: Builtin, receiver: Value) -> Value {
        Value::Ref(self.heap.allocate(HeapData::Function(HtFunction::builtin(name, builtin, receiver))))
    }

    /// Member access on encapsulated host values: derive the canonical
    /// type id and dispatch through the external class binding.
    fn external_member_get(&mut self, object: Value, key: &str) -> RunResult<()> {
        let type_id = self.encapsulated_type_id(object);
        let host_object = Object::from_value(object, &self.heap, &self.config.lexicon);
        let method_key = format!("{type_id}::{key}");
        if self.externals.function(&method_key).is_some() {
            let function = HtFunction {
                internal_name: method_key,
                id: Some(key.to_owned()),
                class_id: Some(type_id),
                closure: None,
                category: crate::types::FunctionCategory::Method,
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
                instance: Some(object),
                builtin: None,
                doc: None,
            };
            let value = Value::Ref(self.heap.allocate(HeapData::Function(function)));
            self.set_local(value);
            return Ok(());
        }
        if let Some(binding) = self.externals.class(&type_id) {
            let result = binding.instance_member_get(&host_object, key)?;
            let value = result.to_value(&mut self.heap);
            self.set_local(value);
            return Ok(());
        }
        Err(HetuError::undefined_external(&format!("{type_id}::{key}")))
    }

    /// The canonical type id of an encapsulated host value, consulting the
    /// registered reflectors for unknown shapes.
    pub(crate) fn encapsulated_type_id(&self, object: Value) -> String {
        use crate::value::type_ids;
        match object {
            Value::Bool(_) => type_ids::BOOL.to_owned(),
            Value::Int(_) => type_ids::INT.to_owned(),
            Value::Float(_) => type_ids::FLOAT.to_owned(),
            Value::Null => "null".to_owned(),
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::Str(_) => type_ids::STR.to_owned(),
                HeapData::BigInt(_) => type_ids::BIGINT.to_owned(),
                HeapData::List(_) => type_ids::LIST.to_owned(),
                HeapData::Map(_) => type_ids::MAP.to_owned(),
                HeapData::Set(_) => type_ids::SET.to_owned(),
                HeapData::Future(_) => type_ids::FUTURE.to_owned(),
                HeapData::ExternalInstance(external) => {
                    let host = Object::External {
                        type_id: external.type_id.clone(),
                        handle: external.handle,
                    };
                    self.externals.reflect(&host).unwrap_or_else(|| external.type_id.clone())
                }
                other => other.kind_name().to_owned(),
            },
        }
    }

    /// Member write on any value.
    pub(crate) fn member_set_value(&mut self, object: Value, key: &str, assigned: Value, nullable: bool) -> RunResult<()> {
        if object.is_null() {
            if nullable {
                return Ok(());
            }
            return Err(HetuError::visit_member_of_null_object(key));
        }
        let from = self.heap.expect_namespace(self.ctx.namespace).full_name.clone();
        let lexicon = self.config.lexicon.clone();
        let Value::Ref(object_id) = object else {
            return Err(HetuError::undefined(key));
        };
        match self.heap.get(object_id) {
            HeapData::Struct(_) => {
                match struct_member_set(&mut self.heap, object_id, key, assigned, Some(&from), &lexicon)? {
                    StructStore::Done => Ok(()),
                    StructStore::Setter(setter) => {
                        self.call_function_value(setter, vec![assigned], Vec::new(), Completion::Discard)
                    }
                }
            }
            HeapData::Instance(_) => {
                let class = self.heap.expect_instance(object_id).class;
                self.instance_member_set(object_id, class, key, assigned, &from)
            }
            HeapData::Cast(cast) => {
                let (instance, class) = (cast.instance, cast.class);
                self.instance_member_set(instance, class, key, assigned, &from)
            }
            HeapData::Class(_) => {
                let class_ns = self.heap.expect_class(object_id).namespace;
                match crate::namespace::find_symbol(&self.heap, class_ns, key, false) {
                    Some(found) => {
                        crate::namespace::check_private_access(
                            &self.heap,
                            found,
                            key,
                            Some(&from),
                            lexicon.is_private(key),
                        )?;
                        crate::namespace::assign_symbol(&mut self.heap, found, key, assigned)
                    }
                    None => Err(HetuError::undefined(key)),
                }
            }
            HeapData::Namespace(_) => match crate::namespace::find_symbol(&self.heap, object_id, key, false) {
                Some(found) => {
                    crate::namespace::check_private_access(&self.heap, found, key, Some(&from), lexicon.is_private(key))?;
                    crate::namespace::assign_symbol(&mut self.heap, found, key, assigned)
                }
                None => Err(HetuError::undefined(key)),
            },
            HeapData::ExternalInstance(external) => {
                let type_id = external.type_id.clone();
                let host_object = Object::from_value(object, &self.heap, &self.config.lexicon);
                let host_value = Object::from_value(assigned, &self.heap, &self.config.lexicon);
                match self.externals.class_mut(&type_id) {
                    Some(binding) => binding.instance_member_set(&host_object, key, host_value),
                    None => Err(HetuError::undefined_external(&format!("{type_id}::{key}"))),
                }
            }
            other => Err(HetuError::undefined(&format!("{key} on {}", other.kind_name()))),
        }
    }

    fn instance_member_set(
        &mut self,
        instance_id: HeapId,
        start_class: HeapId,
        key: &str,
        assigned: Value,
        from: &str,
    ) -> RunResult<()> {
        let lexicon = self.config.lexicon.clone();
        // Find the owning field frame at or above the cast level.
        let frame_index = {
            let instance = self.heap.expect_instance(instance_id);
            let start = instance.frame_of(start_class).unwrap_or(0);
            instance.frames[start..]
                .iter()
                .position(|frame| frame.fields.contains_key(key))
                .map(|offset| start + offset)
        };
        if let Some(index) = frame_index {
            if lexicon.is_private(key) {
                let owner = {
                    let instance = self.heap.expect_instance(instance_id);
                    self.heap.expect_namespace(instance.frames[index].namespace).full_name.clone()
                };
                if !from.starts_with(&owner) {
                    return Err(HetuError::private_member(key));
                }
            }
            let HeapData::Instance(instance) = self.heap.get_mut(instance_id) else {
                unreachable!("instance kind checked above");
            };
            instance.frames[index].fields.insert(key.to_owned(), assigned);
            return Ok(());
        }
        // A setter on the class chain.
        let setter_key = lexicon.setter_id(key);
        for class_id in HtClass::chain(start_class, &self.heap) {
            let class_ns = self.heap.expect_class(class_id).namespace;
            if let Some(found) = crate::namespace::find_symbol(&self.heap, class_ns, &setter_key, false) {
                let value = crate::namespace::declaration(&self.heap, found, &setter_key).value;
                if self.is_function_value(value)
                    && let Value::Ref(setter) = self.bind_if_function(value, Value::Ref(instance_id))
                {
                    return self.call_function_value(setter, vec![assigned], Vec::new(), Completion::Discard);
                }
            }
        }
        Err(HetuError::undefined(key))
    }
}
