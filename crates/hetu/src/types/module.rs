use std::rc::Rc;

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{
    bytecode::{SourceType, Version},
    heap::HeapId,
};

/// A loaded bytecode module.
///
/// Owns the raw bytes (shared with the running loop), the header metadata,
/// the per-file namespaces the `file` opcode installed, any JSON resources
/// imports decoded, and the global constant pools instructions index into.
#[derive(Debug)]
pub(crate) struct Module {
    pub id: String,
    pub bytes: Rc<[u8]>,
    /// Resume point: where the instruction stream begins after the header.
    pub start_ip: usize,
    pub version: Option<Version>,
    pub compiled_at: Option<String>,
    pub source_type: SourceType,
    /// Per-file namespaces, in the order the loop encountered them.
    pub namespaces: IndexMap<String, HeapId>,
    pub json_sources: AHashMap<String, serde_json::Value>,
    pub const_ints: Vec<i64>,
    pub const_floats: Vec<f64>,
    pub const_strings: Vec<String>,
}

impl Module {
    pub fn new(id: String, bytes: Rc<[u8]>, source_type: SourceType) -> Self {
        Self {
            id,
            bytes,
            start_ip: 0,
            version: None,
            compiled_at: None,
            source_type,
            namespaces: IndexMap::new(),
            json_sources: AHashMap::new(),
            const_ints: Vec::new(),
            const_floats: Vec::new(),
            const_strings: Vec::new(),
        }
    }

    /// The namespace of the last file in the module, which by convention is
    /// the module's entry file and what an importer of the whole module sees.
    pub fn entry_namespace(&self) -> Option<HeapId> {
        self.namespaces.values().last().copied()
    }
}
