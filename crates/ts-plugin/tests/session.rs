//! Compilation session behaviour with both strategies.

mod common;

use camino::Utf8Path;
use common::{FakeTypeScript, Project};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use ts_plugin::{resolve_options, CompilationSession, CompilerOptions, Strategy, TsConfigSource};

fn session(
    project: &Project,
    fake: FakeTypeScript,
    strategy: Strategy,
) -> (Arc<FakeTypeScript>, CompilationSession) {
    let (fake, typescript) = fake.into_arc();
    let resolved = resolve_options(
        &CompilerOptions::default(),
        &TsConfigSource::Disabled,
        &project.root,
        typescript.as_ref(),
    )
    .unwrap();
    let session = CompilationSession::new(typescript, &resolved, strategy, &project.root).unwrap();
    (fake, session)
}

#[test]
fn test_transpile_strategy_is_stateless() {
    let project = Project::new();
    let (fake, mut session) = session(&project, FakeTypeScript::modern(), Strategy::Transpile);
    let main = project.root.join("src/main.ts");

    let first = session.compile(&main, "export const a = 1;", false).unwrap();
    let second = session.compile(&main, "export const a = 2;", false).unwrap();

    assert!(first.code.starts_with("export const a = 1;"));
    assert!(second.code.starts_with("export const a = 2;"));
    assert!(second.source_map.is_some());
    assert_eq!(fake.log.borrow().transpiled.len(), 2);
    assert_eq!(fake.log.borrow().services_created, 0);
    assert_eq!(session.file_version(&main), None);
    assert!(session.tracked_files().is_empty());
}

#[test]
fn test_unchanged_file_is_not_resnapshotted() {
    let project = Project::new();
    let (fake, mut session) = session(&project, FakeTypeScript::modern(), Strategy::LanguageService);
    let main = project.root.join("src/main.ts");

    let first = session.compile(&main, "export const a = 1;", true).unwrap();
    let version = session.file_version(&main).unwrap();

    let second = session.compile(&main, "export const a = 1; // edited", false).unwrap();

    assert_eq!(session.file_version(&main), Some(version));
    assert_eq!(second.code, first.code);
    assert!(!second.emit_skipped);

    let log = fake.log.borrow();
    assert_eq!(
        log.emitted,
        vec![(main.clone(), Some(version)), (main.clone(), Some(version))]
    );
}

#[test]
fn test_refresh_replaces_snapshot_with_new_version() {
    let project = Project::new();
    let (_fake, mut session) = session(&project, FakeTypeScript::modern(), Strategy::LanguageService);
    let main = project.root.join("src/main.ts");

    session.compile(&main, "export const a = 1;", false).unwrap();
    let before = session.file_version(&main).unwrap();

    let refreshed = session.compile(&main, "export const a = 2;", true).unwrap();
    let after = session.file_version(&main).unwrap();

    assert!(after > before);
    assert!(refreshed.code.starts_with("export const a = 2;"));
}

#[test]
fn test_emit_picks_javascript_and_map() {
    let project = Project::new();
    let (_fake, mut session) = session(&project, FakeTypeScript::modern(), Strategy::LanguageService);

    let result = session
        .compile(&project.root.join("main.ts"), "export {};", false)
        .unwrap();

    assert_eq!(result.code, "export {};\n//# sourceMappingURL=main.js.map");
    let map: serde_json::Value = serde_json::from_str(result.source_map.as_deref().unwrap()).unwrap();
    assert_eq!(map["file"], json!("main.js"));
}

#[test]
fn test_diagnostics_are_collected_from_every_source() {
    let project = Project::new();
    let (_fake, mut session) = session(&project, FakeTypeScript::modern(), Strategy::LanguageService);

    let result = session
        .compile(
            &project.root.join("main.ts"),
            "let a = 1; // @warning(6133)\nlet b: Foo; // @error(2304)\n",
            false,
        )
        .unwrap();

    let codes: Vec<u32> = result.diagnostics.iter().map(|d| d.code).collect();
    assert_eq!(codes, vec![2304, 6133]);
}

#[test]
fn test_tracked_files_grow_in_order() {
    let project = Project::new();
    let (fake, mut session) = session(&project, FakeTypeScript::modern(), Strategy::LanguageService);
    let a = project.root.join("a.ts");
    let b = project.root.join("b.ts");

    session.compile(&a, "export const a = 1;", false).unwrap();
    session.compile(&b, "export const b = 2;", false).unwrap();
    session.compile(&a, "export const a = 1;", true).unwrap();

    assert_eq!(session.tracked_files(), vec![a.as_path(), b.as_path()]);
    assert_eq!(fake.log.borrow().script_names.last().unwrap(), &vec![a.clone(), b.clone()]);
}

#[test]
fn test_relative_ids_are_made_absolute() {
    let project = Project::new();
    let (_fake, mut session) = session(&project, FakeTypeScript::modern(), Strategy::LanguageService);

    session.compile(Utf8Path::new("src/rel.ts"), "export {};", false).unwrap();
    assert!(session.file_version(&project.root.join("src/rel.ts")).is_some());
}

#[test]
fn test_ambient_types_from_node_modules() {
    let project = Project::new();
    project.write("node_modules/@types/node/index.d.ts", "");
    project.write("node_modules/@types/jest/index.d.ts", "");
    project.write("node_modules/@types/README.md", "");
    let (fake, mut session) = session(&project, FakeTypeScript::modern(), Strategy::LanguageService);

    session.compile(&project.root.join("main.ts"), "export {};", false).unwrap();

    let log = fake.log.borrow();
    assert_eq!(log.settings[0].get("types"), Some(&json!(["jest", "node"])));
}

#[test]
fn test_ambient_types_skipped_on_old_compilers() {
    let project = Project::new();
    project.write("node_modules/@types/node/index.d.ts", "");
    let (fake, mut session) = session(&project, FakeTypeScript::new("1.8.10"), Strategy::LanguageService);

    session.compile(&project.root.join("main.ts"), "export {};", false).unwrap();

    assert!(!fake.log.borrow().settings[0].contains_key("types"));
}

#[test]
fn test_explicit_types_are_respected() {
    let project = Project::new();
    project.write("node_modules/@types/node/index.d.ts", "");
    let (fake, typescript) = FakeTypeScript::modern().into_arc();
    let options = CompilerOptions::from_json(
        "overrides",
        serde_json::from_value(json!({ "types": ["mocha"] })).unwrap(),
    )
    .unwrap();
    let resolved = resolve_options(
        &options,
        &TsConfigSource::Disabled,
        &project.root,
        typescript.as_ref(),
    )
    .unwrap();
    let mut session =
        CompilationSession::new(typescript, &resolved, Strategy::LanguageService, &project.root)
            .unwrap();

    session.compile(&project.root.join("main.ts"), "export {};", false).unwrap();

    assert_eq!(fake.log.borrow().settings[0].get("types"), Some(&json!(["mocha"])));
}

#[test]
fn test_prime_declarations() {
    let project = Project::new();
    let globals = project.write("src/globals.d.ts", "declare const VERSION: string;");
    project.write("types/env.d.ts", "declare const ENV: string;");
    project.write("src/main.ts", "export {};");
    project.write("node_modules/pkg/index.d.ts", "export {};");
    let (_fake, mut session) = session(&project, FakeTypeScript::modern(), Strategy::LanguageService);

    assert_eq!(session.prime_declarations().unwrap(), 2);

    let tracked = session.tracked_files();
    assert_eq!(tracked.len(), 2);
    assert!(tracked.iter().all(|p| p.as_str().ends_with(".d.ts")));
    assert!(!tracked.iter().any(|p| p.as_str().contains("node_modules")));

    // Declarations are static: a later registration does not replace them.
    let version = session.file_version(&globals);
    session.register(&globals, "declare const VERSION: number;", false);
    assert_eq!(session.file_version(&globals), version);
}

#[test]
fn test_prime_declarations_is_noop_for_transpile() {
    let project = Project::new();
    project.write("src/globals.d.ts", "declare const VERSION: string;");
    let (_fake, mut session) = session(&project, FakeTypeScript::modern(), Strategy::Transpile);

    assert_eq!(session.prime_declarations().unwrap(), 0);
}
