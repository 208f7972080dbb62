//! Module loading: header validation, per-file namespaces, import
//! filtering, preloaded modules, JSON resources, and dynamic require.

mod common;

use common::script;
use hetu::{
    BYTECODE_MAGIC, BytecodeBuilder, BytecodeCompiler, ErrorCode, Hetu, HetuError, ImportExportSpec,
    InterpreterConfig, Object, ResourceContext, RunResult, SourceType, VarDeclSpec, Version,
};

fn two_file_module(show_list: Vec<String>, reference: &str) -> Vec<u8> {
    let mut b = BytecodeBuilder::new();
    b.begin_file("a.ht", SourceType::Script);
    b.emit_var_decl(VarDeclSpec::mutable("hidden").with_initializer(|b| b.emit_const_int(1)));
    b.end_of_stmt();
    b.emit_var_decl(VarDeclSpec::mutable("shown").with_initializer(|b| b.emit_const_int(2)));
    b.end_of_stmt();
    b.end_file();
    b.begin_file("b.ht", SourceType::Script);
    b.emit_import_export_decl(ImportExportSpec {
        from_path: Some("a.ht".to_owned()),
        show_list,
        ..ImportExportSpec::default()
    });
    b.end_of_stmt();
    b.emit_identifier(reference, true);
    b.end_of_stmt();
    b.end_file();
    b.build("b", SourceType::Script)
}

#[test]
fn show_filter_admits_listed_symbols() {
    let bytes = two_file_module(vec!["shown".to_owned()], "shown");
    let mut vm = Hetu::new(InterpreterConfig::default());
    let progress = vm.load_bytecode(&bytes, "b", false, None, vec![], vec![]).unwrap();
    assert_eq!(progress.into_complete(), Some(Object::Int(2)));
}

#[test]
fn symbols_outside_the_filter_stay_undefined() {
    let bytes = two_file_module(vec!["shown".to_owned()], "hidden");
    let mut vm = Hetu::new(InterpreterConfig::default());
    let error = vm
        .load_bytecode(&bytes, "b", false, None, vec![], vec![])
        .expect_err("hidden is not imported");
    assert_eq!(error.code, ErrorCode::Undefined);
}

#[test]
fn unfiltered_imports_bring_every_public_symbol() {
    let bytes = two_file_module(vec![], "shown");
    let mut vm = Hetu::new(InterpreterConfig::default());
    let progress = vm.load_bytecode(&bytes, "b", false, None, vec![], vec![]).unwrap();
    assert_eq!(progress.into_complete(), Some(Object::Int(2)));
}

#[test]
fn aliased_imports_wrap_in_a_namespace() {
    let mut b = BytecodeBuilder::new();
    b.begin_file("a.ht", SourceType::Script);
    b.emit_var_decl(VarDeclSpec::mutable("value").with_initializer(|b| b.emit_const_int(9)));
    b.end_of_stmt();
    b.end_file();
    b.begin_file("b.ht", SourceType::Script);
    b.emit_import_export_decl(ImportExportSpec {
        from_path: Some("a.ht".to_owned()),
        alias: Some("util".to_owned()),
        ..ImportExportSpec::default()
    });
    b.end_of_stmt();
    // util.value
    b.emit_identifier("util", true);
    b.register(hetu::Register::PostfixObject);
    b.emit_identifier("value", false);
    b.register(hetu::Register::PostfixKey);
    b.emit_member_get(false);
    b.end_of_stmt();
    b.end_file();
    let bytes = b.build("b", SourceType::Script);

    let mut vm = Hetu::new(InterpreterConfig::default());
    let progress = vm.load_bytecode(&bytes, "b", false, None, vec![], vec![]).unwrap();
    assert_eq!(progress.into_complete(), Some(Object::Int(9)));
}

#[test]
fn preloaded_modules_import_from_the_cache() {
    // Module m1 defines k; m2 imports it by the module scheme without
    // re-executing anything.
    let m1 = script(|b| {
        b.emit_var_decl(VarDeclSpec::mutable("k").with_initializer(|b| b.emit_const_int(7)));
        b.end_of_stmt();
    });
    let mut b = BytecodeBuilder::new();
    b.begin_file("entry.ht", SourceType::Script);
    b.emit_import_export_decl(ImportExportSpec {
        from_path: Some("module:m1".to_owned()),
        is_preloaded_module: true,
        ..ImportExportSpec::default()
    });
    b.end_of_stmt();
    b.emit_identifier("k", true);
    b.end_of_stmt();
    b.end_file();
    let m2 = b.build("m2", SourceType::Script);

    let mut vm = Hetu::new(InterpreterConfig::default());
    vm.load_bytecode(&m1, "m1", false, None, vec![], vec![]).unwrap();
    let progress = vm.load_bytecode(&m2, "m2", false, None, vec![], vec![]).unwrap();
    assert_eq!(progress.into_complete(), Some(Object::Int(7)));
}

#[test]
fn global_import_folds_the_module_into_the_global_namespace() {
    let m1 = script(|b| {
        b.emit_var_decl(VarDeclSpec::mutable("shared").with_initializer(|b| b.emit_const_int(3)));
        b.end_of_stmt();
    });
    let m2 = script(|b| {
        b.emit_identifier("shared", true);
        b.end_of_stmt();
    });
    let mut vm = Hetu::new(InterpreterConfig::default());
    vm.load_bytecode(&m1, "m1", true, None, vec![], vec![]).unwrap();
    let progress = vm.load_bytecode(&m2, "m2", false, None, vec![], vec![]).unwrap();
    assert_eq!(progress.into_complete(), Some(Object::Int(3)));
}

#[test]
fn magic_mismatch_fails_as_bytecode() {
    let mut bytes = script(|b| b.emit_const_int(1));
    let bad_magic = BYTECODE_MAGIC.wrapping_add(1).to_le_bytes();
    bytes[..4].copy_from_slice(&bad_magic);
    let mut vm = Hetu::new(InterpreterConfig::default());
    let error = vm
        .load_bytecode(&bytes, "main", false, None, vec![], vec![])
        .expect_err("bad magic should fail");
    assert_eq!(error.code, ErrorCode::Bytecode);
}

#[test]
fn compiler_version_drift_fails_as_version() {
    let mut b = BytecodeBuilder::new();
    b.begin_file("main.hts", SourceType::Script);
    b.emit_const_int(1);
    b.end_file();
    let bytes = b.build_with_version("main", SourceType::Script, &Version::new(9, 0, 0));
    let mut vm = Hetu::new(InterpreterConfig::default());
    let error = vm
        .load_bytecode(&bytes, "main", false, None, vec![], vec![])
        .expect_err("version drift should fail");
    assert_eq!(error.code, ErrorCode::Version);
}

#[test]
fn truncated_streams_fail_as_bytecode() {
    let bytes = script(|b| b.emit_const_int(1));
    let truncated = &bytes[..bytes.len() - 3];
    let mut vm = Hetu::new(InterpreterConfig::default());
    let error = vm
        .load_bytecode(truncated, "main", false, None, vec![], vec![])
        .expect_err("truncated stream should fail");
    assert_eq!(error.code, ErrorCode::Bytecode);
}

#[test]
fn invoke_after_load_calls_the_named_symbol() {
    let bytes = script(|b| {
        b.emit_func_decl(hetu::FuncDeclSpec {
            params: vec![hetu::ParamSpec::required("n")],
            body: Some(Box::new(|b: &mut BytecodeBuilder| {
                b.emit_identifier("n", true);
                b.register(hetu::Register::MultiplicativeLeft);
                b.emit_const_int(2);
                b.emit(hetu::Opcode::Multiply);
            })),
            ..hetu::FuncDeclSpec::named("double")
        });
        b.end_of_stmt();
    });
    let mut vm = Hetu::new(InterpreterConfig::default());
    let progress = vm
        .load_bytecode(&bytes, "main", false, Some("double"), vec![Object::Int(4)], vec![])
        .unwrap();
    assert_eq!(progress.into_complete(), Some(Object::Int(8)));
}

// --- compiler and resource stubs for the dynamic paths ---

/// A stand-in for the out-of-scope compiler pipeline: recognizes the few
/// sources the tests feed it and emits modules through the builder.
struct StubCompiler;

impl BytecodeCompiler for StubCompiler {
    fn compile(&self, source: &str, module_name: &str, _config: &InterpreterConfig) -> RunResult<Vec<u8>> {
        match source {
            "var util_x = 9" => Ok(script(|b| {
                b.emit_var_decl(VarDeclSpec::mutable("util_x").with_initializer(|b| b.emit_const_int(9)));
                b.end_of_stmt();
            })),
            "var x = 40; x + 2" => Ok(script(|b| {
                b.emit_var_decl(VarDeclSpec::mutable("x").with_initializer(|b| b.emit_const_int(40)));
                b.end_of_stmt();
                b.emit_identifier("x", true);
                b.register(hetu::Register::AdditiveLeft);
                b.emit_const_int(2);
                b.emit(hetu::Opcode::Add);
                b.end_of_stmt();
            })),
            other => Err(HetuError::external(format!("no fixture for [{other}] in [{module_name}]"))),
        }
    }
}

struct MapResources(Vec<(&'static str, &'static str)>);

impl ResourceContext for MapResources {
    fn read_source(&self, key: &str) -> RunResult<String> {
        self.0
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| (*v).to_owned())
            .ok_or_else(|| HetuError::external(format!("resource [{key}] not found")))
    }
}

#[test]
fn eval_compiles_through_the_installed_compiler() {
    let mut vm = Hetu::new(InterpreterConfig::default()).with_compiler(Box::new(StubCompiler));
    let progress = vm.eval("var x = 40; x + 2", "main", false, None, vec![], vec![]).unwrap();
    assert_eq!(progress.into_complete(), Some(Object::Int(42)));
}

#[test]
fn require_loads_compiles_and_exports_the_namespace() {
    let mut vm = Hetu::new(InterpreterConfig::default())
        .with_compiler(Box::new(StubCompiler))
        .with_resource_context(Box::new(MapResources(vec![("util.ht", "var util_x = 9")])));
    let exports = vm.require("util.ht").unwrap();
    let Object::Map(entries) = exports else {
        panic!("expected a namespace map, got {exports:?}");
    };
    assert!(entries.contains(&(Object::Str("util_x".to_owned()), Object::Int(9))));

    // A second require hits the module cache.
    let again = vm.require("util.ht").unwrap();
    let Object::Map(entries) = again else {
        panic!("expected a namespace map");
    };
    assert!(entries.contains(&(Object::Str("util_x".to_owned()), Object::Int(9))));
}

#[test]
fn source_imports_compile_on_demand_when_not_bundled() {
    // The import path is a source file that is neither preloaded nor
    // bundled into this module: resolution compiles and loads it through
    // the resource context, then copies from its entry namespace.
    let mut b = BytecodeBuilder::new();
    b.begin_file("main.ht", SourceType::Script);
    b.emit_import_export_decl(ImportExportSpec {
        from_path: Some("util.ht".to_owned()),
        ..ImportExportSpec::default()
    });
    b.end_of_stmt();
    b.emit_identifier("util_x", true);
    b.end_of_stmt();
    b.end_file();
    let bytes = b.build("main", SourceType::Script);

    let mut vm = Hetu::new(InterpreterConfig::default())
        .with_compiler(Box::new(StubCompiler))
        .with_resource_context(Box::new(MapResources(vec![("util.ht", "var util_x = 9")])));
    let progress = vm.load_bytecode(&bytes, "main", false, None, vec![], vec![]).unwrap();
    assert_eq!(progress.into_complete(), Some(Object::Int(9)));
    assert!(vm.has_module("util.ht"), "the dynamic load must land in the module cache");
    assert!(vm.is_idle(), "a nested load must not disturb the outer loop state");
}

#[test]
fn dynamic_imports_without_a_resource_context_fail_as_external() {
    // Without a resource context the dynamic-load path is unavailable;
    // the failure is an external-load error, not an undefined symbol.
    let mut b = BytecodeBuilder::new();
    b.begin_file("main.ht", SourceType::Script);
    b.emit_import_export_decl(ImportExportSpec {
        from_path: Some("util.ht".to_owned()),
        ..ImportExportSpec::default()
    });
    b.end_of_stmt();
    b.end_file();
    let bytes = b.build("main", SourceType::Script);

    let mut vm = Hetu::new(InterpreterConfig::default());
    let error = vm
        .load_bytecode(&bytes, "main", false, None, vec![], vec![])
        .expect_err("an unloadable module should fail");
    assert_eq!(error.code, ErrorCode::Extern);
    assert!(error.message.contains("util.ht"));
}

#[test]
fn imports_can_be_reexported_without_an_alias() {
    // a.ht declares the symbol, b.ht re-exports its import of it, c.ht
    // imports b.ht and must see the symbol b itself only imported.
    let mut b = BytecodeBuilder::new();
    b.begin_file("a.ht", SourceType::Script);
    b.emit_var_decl(VarDeclSpec::mutable("shown").with_initializer(|b| b.emit_const_int(2)));
    b.end_of_stmt();
    b.end_file();
    b.begin_file("b.ht", SourceType::Script);
    b.emit_import_export_decl(ImportExportSpec {
        is_export: true,
        from_path: Some("a.ht".to_owned()),
        show_list: vec!["shown".to_owned()],
        ..ImportExportSpec::default()
    });
    b.end_of_stmt();
    b.end_file();
    b.begin_file("c.ht", SourceType::Script);
    b.emit_import_export_decl(ImportExportSpec {
        from_path: Some("b.ht".to_owned()),
        ..ImportExportSpec::default()
    });
    b.end_of_stmt();
    b.emit_identifier("shown", true);
    b.end_of_stmt();
    b.end_file();
    let bytes = b.build("c", SourceType::Script);

    let mut vm = Hetu::new(InterpreterConfig::default());
    let progress = vm.load_bytecode(&bytes, "c", false, None, vec![], vec![]).unwrap();
    assert_eq!(progress.into_complete(), Some(Object::Int(2)));
}

#[test]
fn json_resources_bind_as_aliased_structs() {
    let mut b = BytecodeBuilder::new();
    b.begin_file("main.ht", SourceType::Script);
    b.emit_import_export_decl(ImportExportSpec {
        from_path: Some("config.json".to_owned()),
        alias: Some("config".to_owned()),
        ..ImportExportSpec::default()
    });
    b.end_of_stmt();
    // config.port
    b.emit_identifier("config", true);
    b.register(hetu::Register::PostfixObject);
    b.emit_identifier("port", false);
    b.register(hetu::Register::PostfixKey);
    b.emit_member_get(false);
    b.end_of_stmt();
    b.end_file();
    let bytes = b.build("main", SourceType::Script);

    let mut vm = Hetu::new(InterpreterConfig::default())
        .with_resource_context(Box::new(MapResources(vec![("config.json", r#"{"port": 8080}"#)])));
    let progress = vm.load_bytecode(&bytes, "main", false, None, vec![], vec![]).unwrap();
    assert_eq!(progress.into_complete(), Some(Object::Int(8080)));
}
