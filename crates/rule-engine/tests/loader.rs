/*
 * pmilter programmable mail filter
 *
 * Copyright (C) 2003 - viridIT SAS
 * Licensed under the Elastic License 2.0
 *
 * You should have received a copy of the Elastic License 2.0 along with
 * this program. If not, see https://www.elastic.co/licensing/elastic-license.
 *
 */

mod common;

use common::{config, config_with_modules, Hook, Outcome};
use pmilter_rule_engine::{
    rhai, CompileError, FreshCompile, HandlerError, ModifiedTimeCache, RuleEngine,
    RuleEngineConfigBuilder, ScriptLoader, ScriptSource,
};

fn write_script(path: &std::path::Path, code: &str, modified: std::time::SystemTime) {
    std::fs::write(path, code).unwrap();
    std::fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(modified)
        .unwrap();
}

fn later(seconds: u64) -> std::time::SystemTime {
    std::time::SystemTime::now() + std::time::Duration::from_secs(seconds)
}

#[test]
fn fresh_compile_picks_up_edits() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("check.rhai");
    let source = ScriptSource::File(path.clone());
    let mut engine = RuleEngine::<Outcome>::from_config(config(FreshCompile));

    write_script(&path, "outcome::next()", later(0));
    let before = engine.execute(Hook::Check, &source, "ctx", ().into());

    write_script(&path, "outcome::stop()", later(0));
    let after = engine.execute(Hook::Check, &source, "ctx", ().into());

    assert_eq!(before.unwrap(), Some(Outcome::Next));
    assert_eq!(after.unwrap(), Some(Outcome::Stop));
}

#[test]
fn cache_reuses_until_modified() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("check.rhai");
    let source = ScriptSource::File(path.clone());
    let cache = ModifiedTimeCache::default();
    let engine = RuleEngineConfigBuilder::default()
        .with_standard_global_modules()
        .build()
        .engine();

    let modified = later(0);
    write_script(&path, "1", modified);
    assert!(cache.is_empty());

    let first = cache.load(&engine, &source).unwrap();
    assert_eq!(cache.len(), 1);
    assert_eq!(first.name(), path.display().to_string());

    // Same modification time, new content: the cached unit is still served.
    write_script(&path, "let = ;", modified);
    assert!(cache.load(&engine, &source).is_ok());
    assert_eq!(cache.len(), 1);

    // A newer modification time forces a compilation.
    write_script(&path, "let = ;", later(10));
    assert!(matches!(
        cache.load(&engine, &source),
        Err(CompileError::Syntax { .. })
    ));

    write_script(&path, "2", later(20));
    assert!(cache.load(&engine, &source).is_ok());
    assert_eq!(cache.len(), 1);
}

#[test]
fn cache_reports_missing_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gone.rhai");
    let cache = ModifiedTimeCache::default();
    let engine = rhai::Engine::new();

    let result = cache.load(&engine, &ScriptSource::File(path.clone()));

    let Err(CompileError::Open { path: failed, .. }) = result else {
        panic!("expected an open error, got {result:?}");
    };
    assert_eq!(failed, path);
    assert!(cache.is_empty());
}

#[test]
fn cache_does_not_keep_inline_scripts() {
    let cache = ModifiedTimeCache::default();
    let engine = rhai::Engine::new();

    let unit = cache
        .load(
            &engine,
            &ScriptSource::Inline {
                code: "40 + 2".to_string(),
            },
        )
        .unwrap();

    assert_eq!(unit.name(), pmilter_rule_engine::INLINE_SOURCE_NAME);
    assert!(cache.is_empty());
}

#[test]
fn cached_units_run_through_the_engine() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("check.rhai");
    let source = ScriptSource::File(path.clone());
    let mut engine = RuleEngine::<Outcome>::from_config(config(ModifiedTimeCache::default()));

    write_script(&path, "outcome::stop()", later(0));

    for _ in 0..3 {
        let result = engine.execute(Hook::Check, &source, "ctx", ().into());
        assert_eq!(result.unwrap(), Some(Outcome::Stop));
    }

    write_script(&path, r#"throw "edited""#, later(10));
    let result = engine.execute(Hook::Check, &source, "ctx", ().into());
    assert!(
        matches!(result, Err(HandlerError::Runtime { .. })),
        "{result:?}"
    );
}

#[rstest::rstest]
#[case::fresh_compile(false)]
#[case::cache(true)]
fn imported_module_edits(#[case] cached: bool) {
    let dir = tempfile::tempdir().unwrap();
    let module = dir.path().join("rules.rhai");
    let source = ScriptSource::Inline {
        code: r#"import "rules" as rules; rules::decide()"#.to_string(),
    };
    let template = if cached {
        config_with_modules(dir.path(), ModifiedTimeCache::default())
    } else {
        config_with_modules(dir.path(), FreshCompile)
    };
    let mut engine = RuleEngine::<Outcome>::from_config(template);

    write_script(&module, "fn decide() { outcome::stop() }", later(0));
    let before = engine.execute(Hook::Check, &source, "ctx", ().into());

    write_script(&module, "fn decide() { outcome::next() }", later(10));
    let after = engine.execute(Hook::Check, &source, "ctx", ().into());

    assert_eq!(before.unwrap(), Some(Outcome::Stop));
    // A caching loader keeps the module compiled by the first import.
    let expected = if cached { Outcome::Stop } else { Outcome::Next };
    assert_eq!(after.unwrap(), Some(expected));
}
