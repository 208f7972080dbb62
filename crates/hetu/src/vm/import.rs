//! Import resolution.
//!
//! Module-mode sources record their imports and resolve them when the
//! stream reaches `endOfModule`; script-mode sources resolve each import
//! eagerly at its declaration, since the compiler orders dependency files
//! ahead of their importers in the same module stream.

use ahash::AHashSet;

use crate::{
    error::{HetuError, RunResult},
    heap::HeapId,
    interpreter::Hetu,
    namespace::{Declaration, UnresolvedImport, import_into},
};

impl Hetu {
    /// Resolves the recorded imports of every namespace the module
    /// declared, dependencies first.
    pub(crate) fn resolve_module_imports(&mut self, module_id: &str) -> RunResult<()> {
        log::debug!("resolving imports of module [{module_id}]");
        let namespaces: Vec<HeapId> = self.modules[module_id].namespaces.values().copied().collect();
        let mut visited = AHashSet::new();
        for namespace in namespaces {
            self.resolve_namespace_imports(module_id, namespace, &mut visited)?;
        }
        Ok(())
    }

    fn resolve_namespace_imports(
        &mut self,
        module_id: &str,
        namespace: HeapId,
        visited: &mut AHashSet<HeapId>,
    ) -> RunResult<()> {
        if !visited.insert(namespace) {
            // Import cycles are broken by the first resolution winning.
            return Ok(());
        }
        let imports: Vec<UnresolvedImport> =
            std::mem::take(&mut self.heap.expect_namespace_mut(namespace).imports);
        for import in imports {
            self.resolve_import(module_id, namespace, import, visited)?;
        }
        Ok(())
    }

    /// Resolves one import record into `namespace`.
    pub(crate) fn resolve_import(
        &mut self,
        module_id: &str,
        namespace: HeapId,
        import: UnresolvedImport,
        visited: &mut AHashSet<HeapId>,
    ) -> RunResult<()> {
        let lexicon = self.config.lexicon.clone();
        let Some(path) = import.from_path.clone() else {
            return Ok(());
        };
        let imported_ids = if import.is_preloaded_module || lexicon.is_preload_path(&path) {
            // Symbols of an already cached module are copied without
            // re-executing anything.
            let key = path.strip_prefix(&lexicon.preload_scheme).unwrap_or(&path);
            let Some(source) = self.modules.get(key).and_then(crate::types::Module::entry_namespace) else {
                return Err(HetuError::undefined(key));
            };
            import_into(&mut self.heap, namespace, source, &import.show_list, import.alias.as_deref(), &lexicon)?
        } else if lexicon.is_source_path(&path) {
            if let Some(source) = self.modules[module_id].namespaces.get(&path).copied() {
                // A source file bundled in the current module: resolve its
                // own imports depth-first, then copy.
                self.resolve_namespace_imports(module_id, source, visited)?;
                import_into(&mut self.heap, namespace, source, &import.show_list, import.alias.as_deref(), &lexicon)?
            } else {
                // Not bundled: a dynamic import. Compile-on-demand loads
                // the target module (cache hits short-circuit, which also
                // breaks cycles), then the copy proceeds from its entry
                // namespace.
                let source = self.require_module(&path)?;
                import_into(&mut self.heap, namespace, source, &import.show_list, import.alias.as_deref(), &lexicon)?
            }
        } else {
            // Everything else is a JSON resource bound as a variable.
            vec![self.bind_json_resource(module_id, namespace, &path, import.alias.as_deref())?]
        };
        if import.is_exported {
            let ns = self.heap.expect_namespace_mut(namespace);
            for id in imported_ids {
                ns.declare_export(id);
            }
        }
        Ok(())
    }

    /// Binds a decoded JSON resource as an aliased constant and returns
    /// the id it was bound under.
    fn bind_json_resource(
        &mut self,
        module_id: &str,
        namespace: HeapId,
        path: &str,
        alias: Option<&str>,
    ) -> RunResult<String> {
        let json = if let Some(cached) = self.modules[module_id].json_sources.get(path) {
            cached.clone()
        } else {
            let Some(context) = self.resource_context() else {
                return Err(HetuError::extern_error(format!(
                    "import of resource [{path}] needs a resource context"
                )));
            };
            let json = context.read_json(path)?;
            self.modules[module_id].json_sources.insert(path.to_owned(), json.clone());
            json
        };
        let alias = alias.map_or_else(
            || {
                // Default alias: the file stem of the resource path.
                let stem = path.rsplit('/').next().unwrap_or(path);
                stem.split('.').next().unwrap_or(stem).to_owned()
            },
            str::to_owned,
        );
        let object = crate::interpreter::json_to_object(&json);
        let value = object.to_value(&mut self.heap);
        let decl = Declaration::constant(value, self.config.lexicon.is_private(&alias));
        crate::namespace::define(&mut self.heap, namespace, &alias, decl, true)?;
        Ok(alias)
    }
}
