use serde::{Deserialize, Serialize};

/// Identifier policy of the language: the prefixes and sentinel names the
/// compiler and the VM agree on.
///
/// Every field has the conventional default, but embedders that compile with
/// a customized lexicon can adjust them here so the VM applies the same
/// rules at run time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lexicon {
    /// Identifiers starting with this prefix are only visible from scopes
    /// nested inside the declaring namespace.
    pub private_prefix: String,
    /// Identifiers starting with this prefix are implementation details:
    /// they are skipped by struct `keys`/`values`/`clone` and never exported.
    pub internal_prefix: String,
    /// Getter entries are stored as `get$` + id.
    pub getter_prefix: String,
    /// Setter entries are stored as `set$` + id.
    pub setter_prefix: String,
    /// Internal name of the default constructor; named constructors append
    /// `$` + name.
    pub constructor_name: String,
    /// The member id that reads or replaces a struct's prototype.
    pub prototype_id: String,
    /// The bound receiver symbol.
    pub this_id: String,
    /// The superclass receiver symbol.
    pub super_id: String,
    /// The symbol the global namespace is reachable under after `init`.
    pub global_id: String,
    /// Module paths with this prefix import from the module cache without
    /// re-executing anything.
    pub preload_scheme: String,
    /// File extensions recognized as script sources by the import resolver.
    pub source_extensions: Vec<String>,
}

impl Default for Lexicon {
    fn default() -> Self {
        Self {
            private_prefix: "_".to_owned(),
            internal_prefix: "$".to_owned(),
            getter_prefix: "get$".to_owned(),
            setter_prefix: "set$".to_owned(),
            constructor_name: "$construct".to_owned(),
            prototype_id: "prototype".to_owned(),
            this_id: "this".to_owned(),
            super_id: "super".to_owned(),
            global_id: "global".to_owned(),
            preload_scheme: "module:".to_owned(),
            source_extensions: vec![".ht".to_owned(), ".hts".to_owned()],
        }
    }
}

impl Lexicon {
    /// Whether an id is private to its declaring namespace.
    ///
    /// The prefix check is authoritative; declaration flags only cache it.
    #[must_use]
    pub fn is_private(&self, id: &str) -> bool {
        id.starts_with(&self.private_prefix)
    }

    /// Whether an id names an implementation detail (getters, constructors,
    /// synthesized ids).
    #[must_use]
    pub fn is_internal(&self, id: &str) -> bool {
        id.starts_with(&self.internal_prefix)
    }

    /// The storage id of a getter for `id`.
    #[must_use]
    pub fn getter_id(&self, id: &str) -> String {
        format!("{}{id}", self.getter_prefix)
    }

    /// The storage id of a setter for `id`.
    #[must_use]
    pub fn setter_id(&self, id: &str) -> String {
        format!("{}{id}", self.setter_prefix)
    }

    /// The storage id of a constructor, `None` meaning the default one.
    #[must_use]
    pub fn constructor_id(&self, name: Option<&str>) -> String {
        match name {
            Some(name) => format!("{}${name}", self.constructor_name),
            None => self.constructor_name.clone(),
        }
    }

    /// Whether a module path refers to an already cached module.
    #[must_use]
    pub fn is_preload_path(&self, path: &str) -> bool {
        path.starts_with(&self.preload_scheme)
    }

    /// Whether a path looks like a script source (rather than a resource).
    #[must_use]
    pub fn is_source_path(&self, path: &str) -> bool {
        self.source_extensions.iter().any(|ext| path.ends_with(ext))
    }
}

/// Construction-time policy switches of the interpreter.
///
/// Each flag corresponds to one implicit coercion or declaration rule and is
/// consulted at every opcode the rule applies to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpreterConfig {
    /// Assigning to an undefined identifier silently declares it in the
    /// current namespace instead of failing.
    pub allow_implicit_variable_declaration: bool,
    /// `null` coerces to `0` in arithmetic and ordering comparisons.
    pub allow_implicit_null_to_zero_conversion: bool,
    /// Lenient truthiness: `0`, `0.0`, empty string/list/map/struct, the
    /// literal `'false'` and `null` all count as false. When off, only the
    /// boolean `true` is truthy.
    pub allow_implicit_empty_value_to_false_conversion: bool,
    /// A variable declaration's initializer also becomes the statement's
    /// value.
    pub resolve_declaration_statement_value: bool,
    /// How many script frames an error message renders at most.
    pub stack_trace_display_count: usize,
    /// Log runtime errors through the `log` facade before returning them.
    pub process_error: bool,
    /// Identifier policy shared with the compiler.
    pub lexicon: Lexicon,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            allow_implicit_variable_declaration: false,
            allow_implicit_null_to_zero_conversion: false,
            allow_implicit_empty_value_to_false_conversion: false,
            resolve_declaration_statement_value: false,
            stack_trace_display_count: 5,
            process_error: true,
            lexicon: Lexicon::default(),
        }
    }
}
