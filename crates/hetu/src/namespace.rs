use ahash::AHashSet;
use indexmap::IndexMap;

use crate::{
    error::{HetuError, RunResult},
    heap::{Heap, HeapId},
    types::HtType,
    value::Value,
};

/// What a named entry in a namespace is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeclKind {
    Variable,
    Constant,
    Function,
    Class,
    StructDecl,
    TypeAlias,
    Parameter,
    ExternalClass,
    Namespace,
}

/// Deferred initializer of a late variable or an instance field: the
/// recorded site of its expression chunk plus the namespace to evaluate in.
#[derive(Debug, Clone)]
pub(crate) struct LateInit {
    pub module: String,
    pub ip: usize,
    pub line: u16,
    pub column: u16,
    pub namespace: HeapId,
}

/// A named entry: variable, constant, function, class, and so on.
#[derive(Debug, Clone)]
pub(crate) struct Declaration {
    pub value: Value,
    pub kind: DeclKind,
    pub decl_type: Option<HtType>,
    pub is_mutable: bool,
    pub is_external: bool,
    pub is_static: bool,
    /// Cache of the lexicon prefix check, which stays authoritative.
    pub is_private: bool,
    pub is_field: bool,
    pub doc: Option<String>,
    /// Present while the initializer has not run yet; first read triggers it.
    pub late_init: Option<LateInit>,
}

impl Declaration {
    pub fn variable(value: Value, is_private: bool) -> Self {
        Self {
            value,
            kind: DeclKind::Variable,
            decl_type: None,
            is_mutable: true,
            is_external: false,
            is_static: false,
            is_private,
            is_field: false,
            doc: None,
            late_init: None,
        }
    }

    pub fn constant(value: Value, is_private: bool) -> Self {
        Self {
            is_mutable: false,
            kind: DeclKind::Constant,
            ..Self::variable(value, is_private)
        }
    }
}

/// An import recorded during declaration, resolved at end of module.
#[derive(Debug, Clone)]
pub(crate) struct UnresolvedImport {
    pub from_path: Option<String>,
    pub alias: Option<String>,
    pub show_list: Vec<String>,
    pub is_exported: bool,
    pub is_preloaded_module: bool,
}

/// A named scope with symbols, deferred imports, exports, and a closure
/// chain for recursive lookup.
#[derive(Debug)]
pub(crate) struct HtNamespace {
    pub id: String,
    pub class_id: Option<String>,
    /// Enclosing namespace; lookup walks this until the chain ends.
    pub closure: Option<HeapId>,
    /// Dotted path from the root, which the privacy rule compares against.
    pub full_name: String,
    pub symbols: IndexMap<String, Declaration>,
    pub imports: Vec<UnresolvedImport>,
    pub exports: AHashSet<String>,
    pub will_export_all: bool,
    pub imported_symbols: IndexMap<String, Declaration>,
}

impl HtNamespace {
    pub fn new(id: String, class_id: Option<String>, closure: Option<HeapId>, heap: &Heap) -> Self {
        let full_name = match closure {
            Some(enclosing) => format!("{}.{id}", heap.expect_namespace(enclosing).full_name),
            None => id.clone(),
        };
        Self {
            id,
            class_id,
            closure,
            full_name,
            symbols: IndexMap::new(),
            imports: Vec::new(),
            exports: AHashSet::new(),
            will_export_all: false,
            imported_symbols: IndexMap::new(),
        }
    }

    /// Defines a mutable variable without collision checking. Used for
    /// machine-managed bindings such as `this` and parameters.
    pub fn define_local(&mut self, id: String, value: Value) {
        let is_private = id.starts_with('_');
        self.symbols.insert(id, Declaration::variable(value, is_private));
    }

    pub fn declare_import(&mut self, import: UnresolvedImport) {
        self.imports.push(import);
    }

    pub fn declare_export(&mut self, id: String) {
        self.exports.insert(id);
    }

    /// Removes a symbol, failing when it does not exist.
    pub fn delete(&mut self, id: &str) -> RunResult<()> {
        if self.symbols.shift_remove(id).is_some() {
            Ok(())
        } else {
            Err(HetuError::undefined(id))
        }
    }
}

/// Defines `decl` under `id`, rejecting collisions unless overriding.
pub(crate) fn define(heap: &mut Heap, ns: HeapId, id: &str, decl: Declaration, override_existing: bool) -> RunResult<()> {
    let namespace = heap.expect_namespace_mut(ns);
    if !override_existing && namespace.symbols.contains_key(id) {
        return Err(HetuError::defined(id));
    }
    namespace.symbols.insert(id.to_owned(), decl);
    Ok(())
}

/// Where a lookup found a symbol.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SymbolRef {
    pub owner: HeapId,
    /// Found among the owner's imported symbols rather than its own.
    pub imported: bool,
}

/// Walks the closure chain for `id`. Non-recursive lookups stop at the
/// starting namespace.
pub(crate) fn find_symbol(heap: &Heap, ns: HeapId, id: &str, recursive: bool) -> Option<SymbolRef> {
    let mut current = Some(ns);
    while let Some(owner) = current {
        let namespace = heap.expect_namespace(owner);
        if namespace.symbols.contains_key(id) {
            return Some(SymbolRef { owner, imported: false });
        }
        if namespace.imported_symbols.contains_key(id) {
            return Some(SymbolRef { owner, imported: true });
        }
        if !recursive {
            return None;
        }
        current = namespace.closure;
    }
    None
}

/// Enforces the privacy rule at the namespace a symbol was found in: a
/// private id is reachable only from scopes whose full name starts with the
/// owner's full name.
pub(crate) fn check_private_access(heap: &Heap, symbol: SymbolRef, id: &str, from: Option<&str>, private: bool) -> RunResult<()> {
    if !private {
        return Ok(());
    }
    let owner = &heap.expect_namespace(symbol.owner).full_name;
    if from.is_some_and(|from| from.starts_with(owner.as_str())) {
        Ok(())
    } else {
        Err(HetuError::private_member(id))
    }
}

/// Reads the declaration a lookup resolved to.
pub(crate) fn declaration<'heap>(heap: &'heap Heap, symbol: SymbolRef, id: &str) -> &'heap Declaration {
    let namespace = heap.expect_namespace(symbol.owner);
    if symbol.imported {
        &namespace.imported_symbols[id]
    } else {
        &namespace.symbols[id]
    }
}

pub(crate) fn declaration_mut<'heap>(heap: &'heap mut Heap, symbol: SymbolRef, id: &str) -> &'heap mut Declaration {
    let namespace = heap.expect_namespace_mut(symbol.owner);
    if symbol.imported {
        &mut namespace.imported_symbols[id]
    } else {
        &mut namespace.symbols[id]
    }
}

/// Writes a value through a resolved symbol, honoring mutability.
pub(crate) fn assign_symbol(heap: &mut Heap, symbol: SymbolRef, id: &str, value: Value) -> RunResult<()> {
    let decl = declaration_mut(heap, symbol, id);
    if !decl.is_mutable {
        return Err(HetuError::immutable(id));
    }
    decl.value = value;
    decl.late_init = None;
    Ok(())
}

/// The ids `src` exposes to importers: its explicit export set, or every
/// non-private, non-internal symbol when the namespace exports all.
///
/// Imported symbols count too: a re-exported import (`export '...' show x`
/// without an alias) lands in `imported_symbols`, and its id must surface
/// to downstream importers exactly like an own symbol.
pub(crate) fn exported_ids(heap: &Heap, src: HeapId, lexicon: &crate::config::Lexicon) -> Vec<String> {
    let namespace = heap.expect_namespace(src);
    let all_ids = namespace.symbols.keys().chain(namespace.imported_symbols.keys());
    if namespace.will_export_all || namespace.exports.is_empty() {
        all_ids
            .filter(|id| !lexicon.is_private(id) && !lexicon.is_internal(id))
            .cloned()
            .collect()
    } else {
        all_ids
            .filter(|id| namespace.exports.contains(id.as_str()))
            .cloned()
            .collect()
    }
}

/// Looks a declaration up among a namespace's own and imported symbols.
pub(crate) fn visible_declaration<'heap>(heap: &'heap Heap, src: HeapId, id: &str) -> Option<&'heap Declaration> {
    let namespace = heap.expect_namespace(src);
    namespace.symbols.get(id).or_else(|| namespace.imported_symbols.get(id))
}

/// Copies symbols from `src` into `dst` under the import rules: an optional
/// `show` filter, and an optional alias that wraps the copies in a child
/// namespace instead of merging them. Returns the ids now visible in `dst`
/// (the copied ids, or the alias), which re-export bookkeeping records.
pub(crate) fn import_into(
    heap: &mut Heap,
    dst: HeapId,
    src: HeapId,
    show_list: &[String],
    alias: Option<&str>,
    lexicon: &crate::config::Lexicon,
) -> RunResult<Vec<String>> {
    let mut ids = exported_ids(heap, src, lexicon);
    if !show_list.is_empty() {
        for wanted in show_list {
            if !ids.iter().any(|id| id == wanted) {
                return Err(HetuError::undefined(wanted));
            }
        }
        ids.retain(|id| show_list.contains(id));
    }
    let decls: Vec<(String, Declaration)> = ids
        .iter()
        .map(|id| {
            let decl = visible_declaration(heap, src, id)
                .expect("exported id resolves in its namespace")
                .clone();
            (id.clone(), decl)
        })
        .collect();
    match alias {
        Some(alias) => {
            let wrapper_ns = HtNamespace::new(alias.to_owned(), None, Some(dst), heap);
            let wrapper = heap.allocate(crate::heap::HeapData::Namespace(wrapper_ns));
            for (id, decl) in decls {
                heap.expect_namespace_mut(wrapper).symbols.insert(id, decl);
            }
            let decl = Declaration {
                kind: DeclKind::Namespace,
                is_mutable: false,
                ..Declaration::variable(Value::Ref(wrapper), false)
            };
            heap.expect_namespace_mut(dst).symbols.insert(alias.to_owned(), decl);
            Ok(vec![alias.to_owned()])
        }
        None => {
            let destination = heap.expect_namespace_mut(dst);
            for (id, decl) in decls {
                destination.imported_symbols.insert(id, decl);
            }
            Ok(ids)
        }
    }
}
