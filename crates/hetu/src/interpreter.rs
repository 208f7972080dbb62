use std::rc::Rc;

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{
    bytecode::{BYTECODE_MAGIC, BytecodeReader, SourceType, Version},
    config::InterpreterConfig,
    error::{HetuError, RunResult},
    external::{
        ExternalClass, ExternalReflector, ExternalRegistry, ExternalReturn, FunctionTypeWrapper, NativeFunction,
    },
    heap::{FutureState, Heap, HeapData, HeapId},
    namespace::{Declaration, HtNamespace},
    object::Object,
    types::Module,
    value::Value,
    vm::{CallRecord, ExecContext, FileRestore, LoopExit, StackFrame},
};

/// Compiles source text to the bytecode this VM consumes.
///
/// The lexer, parser, analyzer, and code generator live outside this crate;
/// an embedder plugs its pipeline in through this trait and the
/// `BytecodeBuilder` emission backend.
pub trait BytecodeCompiler {
    fn compile(&self, source: &str, module_name: &str, config: &InterpreterConfig) -> RunResult<Vec<u8>>;
}

/// Maps resource keys to source text and JSON data for `evalFile`,
/// `require`, and JSON imports.
pub trait ResourceContext {
    fn read_source(&self, key: &str) -> RunResult<String>;

    fn read_json(&self, key: &str) -> RunResult<serde_json::Value> {
        let text = self.read_source(key)?;
        serde_json::from_str(&text).map_err(|error| HetuError::extern_error(format!("invalid json in [{key}]: {error}")))
    }
}

/// Outcome of running script code: a final value, or a pause on a pending
/// host future.
#[derive(Debug)]
pub enum Progress {
    Complete(Object),
    /// The loop stopped at an `await` on an unresolved host future. Resolve
    /// it with [`Hetu::resume`] to continue at the exact site.
    Await(Suspension),
}

impl Progress {
    /// The completed value, if execution finished.
    #[must_use]
    pub fn into_complete(self) -> Option<Object> {
        match self {
            Self::Complete(object) => Some(object),
            Self::Await(_) => None,
        }
    }

    /// The suspension, if execution paused on a future.
    #[must_use]
    pub fn into_await(self) -> Option<Suspension> {
        match self {
            Self::Await(suspension) => Some(suspension),
            Self::Complete(_) => None,
        }
    }
}

/// Token identifying one paused `await` site. The machine state stays
/// inside the interpreter; this only correlates the resolution.
#[derive(Debug)]
pub struct Suspension {
    call_id: u32,
}

impl Suspension {
    /// The call id of the pending external call being awaited.
    #[must_use]
    pub fn call_id(&self) -> u32 {
        self.call_id
    }
}

/// The virtual machine and its host surface.
///
/// One instance owns the heap, the module cache, the global namespace, and
/// every host binding. Execution is single-threaded and cooperative: the
/// only suspension point is an `await` on a pending host future, which
/// hands a [`Suspension`] back to the embedder.
///
/// # Example
///
/// ```
/// use hetu::{BytecodeBuilder, Hetu, InterpreterConfig, Object, SourceType};
///
/// let mut builder = BytecodeBuilder::new();
/// builder.begin_file("main.hts", SourceType::Script);
/// builder.emit_const_int(42);
/// builder.end_of_stmt();
/// builder.end_file();
/// let bytes = builder.build("main", SourceType::Script);
///
/// let mut vm = Hetu::new(InterpreterConfig::default());
/// let progress = vm.load_bytecode(&bytes, "main", false, None, vec![], vec![]).unwrap();
/// assert_eq!(progress.into_complete(), Some(Object::Int(42)));
/// ```
pub struct Hetu {
    pub(crate) config: InterpreterConfig,
    pub(crate) heap: Heap,
    pub(crate) global_namespace: HeapId,
    pub(crate) modules: IndexMap<String, Module>,
    pub(crate) externals: ExternalRegistry,
    compiler: Option<Box<dyn BytecodeCompiler>>,
    resources: Option<Box<dyn ResourceContext>>,
    initialized: bool,

    // Loop state. Lives here rather than in a scoped VM struct so a
    // suspension can freeze it in place between host calls.
    pub(crate) frames: Vec<StackFrame>,
    pub(crate) call_stack: Vec<CallRecord>,
    pub(crate) ctx: ExecContext,
    pub(crate) file_stack: Vec<FileRestore>,
    pub(crate) class_stack: Vec<HeapId>,
    pub(crate) stack_trace: Vec<String>,
    pub(crate) next_call_id: u32,
    pub(crate) pending_futures: AHashMap<u32, HeapId>,
    pub(crate) next_anonymous_id: u32,
    suspended: Option<u32>,
    pending_invoke: Option<(String, Vec<Object>, Vec<(String, Object)>)>,
    entry_namespace: Option<HeapId>,
}

impl std::fmt::Debug for Hetu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hetu")
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .field("heap_size", &self.heap.size())
            .field("suspended", &self.suspended)
            .finish_non_exhaustive()
    }
}

impl Default for Hetu {
    fn default() -> Self {
        Self::new(InterpreterConfig::default())
    }
}

impl Hetu {
    #[must_use]
    pub fn new(config: InterpreterConfig) -> Self {
        let mut heap = Heap::new();
        let global = HtNamespace::new(config.lexicon.global_id.clone(), None, None, &heap);
        let global_namespace = heap.allocate(HeapData::Namespace(global));
        Self {
            config,
            heap,
            global_namespace,
            modules: IndexMap::new(),
            externals: ExternalRegistry::default(),
            compiler: None,
            resources: None,
            initialized: false,
            frames: vec![StackFrame::default()],
            call_stack: Vec::new(),
            ctx: ExecContext {
                module: String::new(),
                file: String::new(),
                namespace: global_namespace,
                ip: 0,
                line: 0,
                column: 0,
                script_mode: true,
                globally_import: false,
            },
            file_stack: Vec::new(),
            class_stack: Vec::new(),
            stack_trace: Vec::new(),
            next_call_id: 0,
            pending_futures: AHashMap::new(),
            next_anonymous_id: 0,
            suspended: None,
            pending_invoke: None,
            entry_namespace: None,
        }
    }

    /// Installs the base bindings: the version constant, `this`, and
    /// `global`. Idempotent after the first success; stdlib preincludes
    /// register through the `bind_*` surface afterwards.
    pub fn init(&mut self) -> RunResult<()> {
        if self.initialized {
            return Ok(());
        }
        let version = self.heap.allocate_str(Version::current().to_string());
        let global = Value::Ref(self.global_namespace);
        let ns = self.global_namespace;
        crate::namespace::define(&mut self.heap, ns, "kHetuVersion", Declaration::constant(version, false), true)?;
        let global_id = self.config.lexicon.global_id.clone();
        crate::namespace::define(&mut self.heap, ns, &global_id, Declaration::constant(global, false), true)?;
        let this_id = self.config.lexicon.this_id.clone();
        crate::namespace::define(&mut self.heap, ns, &this_id, Declaration::constant(global, false), true)?;
        self.initialized = true;
        Ok(())
    }

    #[must_use]
    pub fn with_compiler(mut self, compiler: Box<dyn BytecodeCompiler>) -> Self {
        self.compiler = Some(compiler);
        self
    }

    #[must_use]
    pub fn with_resource_context(mut self, resources: Box<dyn ResourceContext>) -> Self {
        self.resources = Some(resources);
        self
    }

    pub(crate) fn resource_context(&self) -> Option<&dyn ResourceContext> {
        self.resources.as_deref()
    }

    #[must_use]
    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    // --- binding surface ---

    /// Binds a top-level host function under `id`.
    pub fn bind_external_function(
        &mut self,
        id: impl Into<String>,
        function: impl Fn(&mut crate::external::NativeCall) -> RunResult<ExternalReturn> + 'static,
    ) {
        self.externals.bind_function(id, Box::new(function) as NativeFunction);
    }

    /// Binds a method by the `Class::method` / `Class.method` convention.
    pub fn bind_external_method(
        &mut self,
        id: impl Into<String>,
        function: impl Fn(&mut crate::external::NativeCall) -> RunResult<ExternalReturn> + 'static,
    ) {
        self.externals.bind_function(id, Box::new(function) as NativeFunction);
    }

    pub fn bind_external_class(&mut self, class: Box<dyn ExternalClass>) {
        self.externals.bind_class(class);
    }

    /// Registers a host typedef that re-wraps function literals declared
    /// with this external type id.
    pub fn bind_external_function_type(&mut self, id: impl Into<String>, wrapper: FunctionTypeWrapper) {
        self.externals.bind_function_type(id, wrapper);
    }

    pub fn bind_external_enum(&mut self, id: impl Into<String>, variants: Vec<(String, Object)>) {
        self.externals.bind_enum(id, variants);
    }

    pub fn bind_external_reflection(&mut self, reflector: ExternalReflector) {
        self.externals.bind_reflector(reflector);
    }

    // --- execution surface ---

    /// Compiles and loads source text, optionally invoking a symbol.
    pub fn eval(
        &mut self,
        source: &str,
        module: &str,
        globally_import: bool,
        invoke: Option<&str>,
        positional: Vec<Object>,
        named: Vec<(String, Object)>,
    ) -> RunResult<Progress> {
        let bytes = self.compile(source, module)?;
        self.load_bytecode(&bytes, module, globally_import, invoke, positional, named)
    }

    /// Reads a source file through the resource context and evaluates it.
    pub fn eval_file(
        &mut self,
        key: &str,
        globally_import: bool,
        invoke: Option<&str>,
        positional: Vec<Object>,
        named: Vec<(String, Object)>,
    ) -> RunResult<Progress> {
        let Some(resources) = self.resources.as_deref() else {
            return Err(HetuError::extern_error("no resource context installed"));
        };
        let source = resources.read_source(key)?;
        self.eval(&source, key, globally_import, invoke, positional, named)
    }

    /// Reads a source file through the resource context and compiles it.
    pub fn compile_file(&self, key: &str) -> RunResult<Vec<u8>> {
        let Some(resources) = self.resources.as_deref() else {
            return Err(HetuError::extern_error("no resource context installed"));
        };
        let source = resources.read_source(key)?;
        self.compile(&source, key)
    }

    /// Compiles source text through the installed compiler.
    pub fn compile(&self, source: &str, module_name: &str) -> RunResult<Vec<u8>> {
        let Some(compiler) = self.compiler.as_deref() else {
            return Err(HetuError::extern_error("no compiler installed"));
        };
        compiler.compile(source, module_name, &self.config)
    }

    /// Installs a bytecode buffer as a module and runs its stream.
    ///
    /// Checks the header (magic, compiler version compatibility), enters
    /// the loop, resolves imports at `endOfModule`, optionally folds the
    /// module into the global namespace, and finally invokes `invoke`.
    pub fn load_bytecode(
        &mut self,
        bytes: &[u8],
        module: &str,
        globally_import: bool,
        invoke: Option<&str>,
        positional: Vec<Object>,
        named: Vec<(String, Object)>,
    ) -> RunResult<Progress> {
        if self.suspended.is_some() {
            return Err(HetuError::extern_error("the interpreter is suspended on an await"));
        }
        let result = self.load_bytecode_inner(bytes, module, globally_import, invoke, positional, named);
        self.seal(result)
    }

    fn load_bytecode_inner(
        &mut self,
        bytes: &[u8],
        module: &str,
        globally_import: bool,
        invoke: Option<&str>,
        positional: Vec<Object>,
        named: Vec<(String, Object)>,
    ) -> RunResult<Progress> {
        let mut reader = BytecodeReader::new(bytes);
        let magic = reader.read_u32()?;
        if magic != BYTECODE_MAGIC {
            return Err(HetuError::bytecode(format!("invalid signature {magic:#010x}")));
        }
        let compiler_version = reader.read_version()?;
        let own_version = Version::current();
        if !own_version.is_compatible_with(&compiler_version) {
            return Err(HetuError::version(format!(
                "compiled by {compiler_version}, this runtime is {own_version}"
            )));
        }
        let bytecode_version = if reader.read_bool()? {
            Some(reader.read_version()?)
        } else {
            None
        };
        let compiled_at = reader.read_utf8()?;
        let filename = reader.read_utf8()?;
        let source_type = SourceType::from_byte(reader.read()?)?;
        log::info!("loading module [{module}] compiled at {compiled_at} from [{filename}]");

        let shared: Rc<[u8]> = Rc::from(bytes);
        let mut record = Module::new(module.to_owned(), shared, source_type);
        record.start_ip = reader.ip();
        record.version = Some(bytecode_version.unwrap_or(compiler_version));
        record.compiled_at = Some(compiled_at);
        let start_ip = record.start_ip;
        // Reloading a cached module rebinds it to the fresh bytes.
        self.modules.insert(module.to_owned(), record);

        self.frames = vec![StackFrame::default()];
        self.call_stack.clear();
        self.stack_trace.clear();
        self.file_stack.clear();
        self.class_stack.clear();
        self.ctx = ExecContext {
            module: module.to_owned(),
            file: filename,
            namespace: self.global_namespace,
            ip: start_ip,
            line: 0,
            column: 0,
            script_mode: source_type.is_script_mode(),
            globally_import,
        };
        if let Some(invoke) = invoke {
            self.pending_invoke = Some((invoke.to_owned(), positional, named));
        }

        let exit = self.execute(0, true)?;
        self.entry_namespace = self.modules[module].entry_namespace();
        self.finish_execution(exit)
    }

    /// Dynamically loads a module and returns its top-level namespace as a
    /// map of public symbols. A cache hit skips recompilation.
    pub fn require(&mut self, path: &str) -> RunResult<Object> {
        let namespace = self.require_module(path)?;
        Ok(self.export_namespace(namespace))
    }

    /// Compile-on-demand: resolves `path` to a loaded module's entry
    /// namespace, compiling and running it through the resource context
    /// when it is not cached yet. Already-cached modules short-circuit,
    /// which is also what breaks import cycles.
    ///
    /// Callable mid-execution (import resolution reaches here for source
    /// paths that are not bundled into the current module): the running
    /// loop's state is saved around the nested load and restored after.
    pub(crate) fn require_module(&mut self, path: &str) -> RunResult<HeapId> {
        if !self.modules.contains_key(path) {
            let Some(resources) = self.resources.as_deref() else {
                return Err(HetuError::extern_error(format!(
                    "import of module [{path}] needs a resource context for compile-on-demand"
                )));
            };
            let source = resources.read_source(path)?;
            let bytes = self.compile(&source, path)?;

            let saved_frames = std::mem::take(&mut self.frames);
            let saved_calls = std::mem::take(&mut self.call_stack);
            let saved_ctx = self.ctx.clone();
            let saved_files = std::mem::take(&mut self.file_stack);
            let saved_classes = std::mem::take(&mut self.class_stack);
            let saved_trace = std::mem::take(&mut self.stack_trace);
            let saved_entry = self.entry_namespace;
            let saved_invoke = self.pending_invoke.take();

            let result = self.load_bytecode_inner(&bytes, path, false, None, Vec::new(), Vec::new());

            self.frames = saved_frames;
            self.call_stack = saved_calls;
            self.ctx = saved_ctx;
            self.file_stack = saved_files;
            self.class_stack = saved_classes;
            self.stack_trace = saved_trace;
            self.entry_namespace = saved_entry;
            self.pending_invoke = saved_invoke;

            match result? {
                Progress::Complete(_) => {}
                Progress::Await(_) => {
                    self.suspended = None;
                    return Err(HetuError::extern_error(format!(
                        "module [{path}] suspended on an await while loading"
                    )));
                }
            }
        }
        self.modules[path]
            .entry_namespace()
            .ok_or_else(|| HetuError::extern_error(format!("module [{path}] has no entry namespace")))
    }

    /// Invokes a named function and runs it to completion or suspension.
    pub fn invoke(&mut self, name: &str, positional: Vec<Object>, named: Vec<(String, Object)>) -> RunResult<Progress> {
        if self.suspended.is_some() {
            return Err(HetuError::extern_error("the interpreter is suspended on an await"));
        }
        let result = self.invoke_inner(name, positional, named);
        self.seal(result)
    }

    fn invoke_inner(
        &mut self,
        name: &str,
        positional: Vec<Object>,
        named: Vec<(String, Object)>,
    ) -> RunResult<Progress> {
        let search_ns = self.entry_namespace.unwrap_or(self.global_namespace);
        let Some(found) = crate::namespace::find_symbol(&self.heap, search_ns, name, true) else {
            return Err(HetuError::undefined(name));
        };
        let value = crate::namespace::declaration(&self.heap, found, name).value;
        let Value::Ref(function_id) = value else {
            return Err(HetuError::not_callable(name));
        };
        let positional: Vec<Value> = positional.iter().map(|object| object.to_value(&mut self.heap)).collect();
        let named: Vec<(String, Value)> = named
            .iter()
            .map(|(name, object)| (name.clone(), object.to_value(&mut self.heap)))
            .collect();
        if self.frames.is_empty() {
            self.frames.push(StackFrame::default());
        }
        self.ctx.namespace = search_ns;
        let base = self.call_stack.len();
        self.call_function_value(function_id, positional, named, crate::vm::Completion::LocalValue)?;
        let exit = if self.call_stack.len() > base {
            self.execute(base + 1, true)?
        } else {
            LoopExit::Value(self.local())
        };
        self.finish_execution(exit)
    }

    /// Resolves the future a suspension is waiting on and re-enters the
    /// loop at the saved context, with the value staged as if the await
    /// had produced it.
    pub fn resume(&mut self, suspension: Suspension, result: impl Into<ExternalReturn>) -> RunResult<Progress> {
        if self.suspended != Some(suspension.call_id) {
            return Err(HetuError::extern_error(format!(
                "no suspension pending on call {}",
                suspension.call_id
            )));
        }
        let result = self.resume_inner(suspension, result.into());
        self.seal(result)
    }

    fn resume_inner(&mut self, suspension: Suspension, result: ExternalReturn) -> RunResult<Progress> {
        let value = match result {
            ExternalReturn::Value(object) => object.to_value(&mut self.heap),
            ExternalReturn::Future => {
                return Err(HetuError::extern_error("cannot resume with another pending future"));
            }
        };
        if let Some(future) = self.pending_futures.remove(&suspension.call_id) {
            *self.heap.get_mut(future) = HeapData::Future(FutureState::Resolved(value));
        }
        self.suspended = None;
        self.set_local(value);
        let exit = self.execute(0, true)?;
        self.finish_execution(exit)
    }

    /// Fails the awaited future: the error surfaces at the suspension
    /// site as an external error.
    pub fn resume_error(&mut self, suspension: Suspension, error: HetuError) -> RunResult<Progress> {
        if self.suspended != Some(suspension.call_id) {
            return Err(HetuError::extern_error(format!(
                "no suspension pending on call {}",
                suspension.call_id
            )));
        }
        self.pending_futures.remove(&suspension.call_id);
        self.suspended = None;
        let mut wrapped = HetuError::extern_error(error.message.clone());
        wrapped.extra = error.extra;
        let result: RunResult<Progress> = Err(wrapped);
        self.seal(result)
    }

    // --- value surface ---

    /// Defines a value in the global namespace (or a module's entry
    /// namespace when `module` is given).
    pub fn define(
        &mut self,
        id: &str,
        value: Object,
        is_mutable: bool,
        override_existing: bool,
        module: Option<&str>,
    ) -> RunResult<()> {
        let namespace = self.target_namespace(module)?;
        let value = value.to_value(&mut self.heap);
        let mut decl = Declaration::variable(value, self.config.lexicon.is_private(id));
        decl.is_mutable = is_mutable;
        crate::namespace::define(&mut self.heap, namespace, id, decl, override_existing)
    }

    /// Reads a value by id, walking from the module (or global) scope.
    pub fn fetch(&self, id: &str, module: Option<&str>) -> RunResult<Object> {
        let namespace = self.target_namespace(module)?;
        let Some(found) = crate::namespace::find_symbol(&self.heap, namespace, id, true) else {
            return Err(HetuError::undefined(id));
        };
        let value = crate::namespace::declaration(&self.heap, found, id).value;
        Ok(Object::from_value(value, &self.heap, &self.config.lexicon))
    }

    /// Writes a value by id, honoring mutability.
    pub fn assign(&mut self, id: &str, value: Object, module: Option<&str>) -> RunResult<()> {
        let namespace = self.target_namespace(module)?;
        let Some(found) = crate::namespace::find_symbol(&self.heap, namespace, id, true) else {
            return Err(HetuError::undefined(id));
        };
        let value = value.to_value(&mut self.heap);
        crate::namespace::assign_symbol(&mut self.heap, found, id, value)
    }

    /// Whether the loop is at rest: one base frame, no open calls, no
    /// pending suspension. Holds after every completed host call.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.frames.len() == 1
            && self.frames[0].is_clear()
            && self.call_stack.is_empty()
            && self.suspended.is_none()
    }

    /// Names of the cached modules, in load order.
    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    #[must_use]
    pub fn has_module(&self, id: &str) -> bool {
        self.modules.contains_key(id)
    }

    /// Drops every loaded module and all runtime objects, keeping the
    /// bindings. The global namespace starts over.
    pub fn reset(&mut self) {
        self.modules.clear();
        self.heap.reset();
        let global = HtNamespace::new(self.config.lexicon.global_id.clone(), None, None, &self.heap);
        self.global_namespace = self.heap.allocate(HeapData::Namespace(global));
        self.initialized = false;
        self.entry_namespace = None;
        self.reset_vm_state();
    }

    // --- internals ---

    fn target_namespace(&self, module: Option<&str>) -> RunResult<HeapId> {
        match module {
            Some(module) => self
                .modules
                .get(module)
                .and_then(Module::entry_namespace)
                .ok_or_else(|| HetuError::undefined(module)),
            None => Ok(self.global_namespace),
        }
    }

    /// Converts one loop exit into host-facing progress, running any
    /// pending invocation once the module stream completed.
    fn finish_execution(&mut self, exit: LoopExit) -> RunResult<Progress> {
        match exit {
            LoopExit::Value(value) => {
                if let Some((name, positional, named)) = self.pending_invoke.take() {
                    return self.invoke_inner(&name, positional, named);
                }
                let object = Object::from_value(value, &self.heap, &self.config.lexicon);
                // The register bank is cleared between host calls.
                self.frames = vec![StackFrame::default()];
                Ok(Progress::Complete(object))
            }
            LoopExit::Suspended(call_id) => {
                self.suspended = Some(call_id);
                Ok(Progress::Await(Suspension { call_id }))
            }
        }
    }

    /// Error boundary of every host entry: positions, logging, loop-state
    /// cleanup.
    fn seal(&mut self, result: RunResult<Progress>) -> RunResult<Progress> {
        match result {
            Ok(progress) => Ok(progress),
            Err(mut error) => {
                error = error.with_position(&self.ctx.file, u32::from(self.ctx.line), u32::from(self.ctx.column));
                if error.stack_trace.is_empty() && !self.stack_trace.is_empty() {
                    let count = self.config.stack_trace_display_count;
                    error.stack_trace = self.stack_trace.iter().rev().take(count).cloned().collect();
                }
                if self.config.process_error {
                    log::error!("{error}");
                }
                self.reset_vm_state();
                Err(error)
            }
        }
    }

    fn reset_vm_state(&mut self) {
        self.frames = vec![StackFrame::default()];
        self.call_stack.clear();
        self.stack_trace.clear();
        self.file_stack.clear();
        self.class_stack.clear();
        self.suspended = None;
        self.pending_invoke = None;
        self.ctx.namespace = self.global_namespace;
    }

    /// A namespace's public symbols as a host map, used by `require`.
    pub(crate) fn export_namespace(&self, namespace: HeapId) -> Object {
        let lexicon = &self.config.lexicon;
        let ids = crate::namespace::exported_ids(&self.heap, namespace, lexicon);
        let entries = ids
            .into_iter()
            .filter_map(|id| {
                let decl = crate::namespace::visible_declaration(&self.heap, namespace, &id)?;
                Some((Object::Str(id), Object::from_value(decl.value, &self.heap, lexicon)))
            })
            .collect();
        Object::Map(entries)
    }
}

/// Decodes a JSON document into the host value shape.
pub(crate) fn json_to_object(json: &serde_json::Value) -> Object {
    match json {
        serde_json::Value::Null => Object::Null,
        serde_json::Value::Bool(b) => Object::Bool(*b),
        serde_json::Value::Number(number) => number
            .as_i64()
            .map_or_else(|| Object::Float(number.as_f64().unwrap_or(f64::NAN)), Object::Int),
        serde_json::Value::String(s) => Object::Str(s.clone()),
        serde_json::Value::Array(items) => Object::List(items.iter().map(json_to_object).collect()),
        // Objects decode as structs so scripts reach fields with member
        // access, not just subscripts.
        serde_json::Value::Object(entries) => Object::Struct {
            id: None,
            fields: entries
                .iter()
                .map(|(key, item)| (key.clone(), json_to_object(item)))
                .collect(),
        },
    }
}
