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

use crate::CompileError;

/// Name given to scripts that are not read from a file.
pub const INLINE_SOURCE_NAME: &str = "<inline>";

/// Where the code of a handler comes from.
///
/// In the configuration, a string is a path to a script file and a map
/// with a `code` key holds the script itself.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(untagged)]
pub enum ScriptSource {
    File(std::path::PathBuf),
    Inline { code: String },
}

impl ScriptSource {
    /// Name used to identify the script in logs and errors.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Inline { .. } => INLINE_SOURCE_NAME.to_string(),
        }
    }

    /// Make a relative file path relative to `base` instead of the working directory.
    #[must_use]
    pub fn resolved_against(self, base: &std::path::Path) -> Self {
        match self {
            Self::File(path) if path.is_relative() => Self::File(base.join(path)),
            other => other,
        }
    }
}

impl std::fmt::Display for ScriptSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

/// A compiled handler, ready to be run once by [`crate::RuleEngine::run`].
#[derive(Debug)]
pub struct ScriptUnit {
    name: String,
    ast: rhai::Shared<rhai::AST>,
}

impl ScriptUnit {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn ast(&self) -> &rhai::AST {
        &self.ast
    }
}

/// Turns a [`ScriptSource`] into a [`ScriptUnit`].
///
/// Loaders are shared by every engine spawned from the same configuration,
/// across connections.
pub trait ScriptLoader: std::fmt::Debug + Send + Sync {
    fn load(&self, engine: &rhai::Engine, source: &ScriptSource)
        -> Result<ScriptUnit, CompileError>;

    /// Whether imported modules may be kept for the life of an engine.
    fn keeps_modules(&self) -> bool {
        false
    }
}

fn read(path: &std::path::Path) -> Result<String, CompileError> {
    std::fs::read_to_string(path).map_err(|error| CompileError::Open {
        path: path.to_path_buf(),
        error,
    })
}

fn compile(engine: &rhai::Engine, name: String, code: &str) -> Result<rhai::AST, CompileError> {
    let mut ast = engine
        .compile(code)
        .map_err(|error| CompileError::Syntax {
            source_name: name.clone(),
            error,
        })?;
    ast.set_source(name);

    Ok(ast)
}

/// Read and compile the script on every call.
///
/// Edits made to a script file, or to a module it imports, apply to the very
/// next call of its handler.
#[derive(Debug, Default, Clone, Copy)]
pub struct FreshCompile;

impl ScriptLoader for FreshCompile {
    fn load(
        &self,
        engine: &rhai::Engine,
        source: &ScriptSource,
    ) -> Result<ScriptUnit, CompileError> {
        let name = source.name();
        let ast = match source {
            ScriptSource::File(path) => compile(engine, name.clone(), &read(path)?)?,
            ScriptSource::Inline { code } => compile(engine, name.clone(), code)?,
        };

        Ok(ScriptUnit {
            name,
            ast: rhai::Shared::new(ast),
        })
    }
}

/// Keep compiled script files until their modification time changes.
///
/// Inline scripts are compiled on every call. Imported modules are kept for
/// the life of the engine that resolved them.
#[derive(Debug, Default)]
pub struct ModifiedTimeCache {
    entries: std::sync::RwLock<
        std::collections::HashMap<std::path::PathBuf, (std::time::SystemTime, rhai::Shared<rhai::AST>)>,
    >,
}

impl ModifiedTimeCache {
    /// Number of scripts currently cached.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().map_or(0, |entries| entries.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cached(
        &self,
        path: &std::path::Path,
        modified: std::time::SystemTime,
    ) -> Option<rhai::Shared<rhai::AST>> {
        let entries = self.entries.read().ok()?;
        let (at, ast) = entries.get(path)?;

        (*at == modified).then(|| ast.clone())
    }
}

impl ScriptLoader for ModifiedTimeCache {
    fn load(
        &self,
        engine: &rhai::Engine,
        source: &ScriptSource,
    ) -> Result<ScriptUnit, CompileError> {
        let ScriptSource::File(path) = source else {
            return FreshCompile.load(engine, source);
        };
        let name = source.name();

        let modified = std::fs::metadata(path)
            .and_then(|metadata| metadata.modified())
            .map_err(|error| CompileError::Open {
                path: path.clone(),
                error,
            })?;

        if let Some(ast) = self.cached(path, modified) {
            tracing::trace!(script = %name, "using cached script");
            return Ok(ScriptUnit { name, ast });
        }

        let ast = rhai::Shared::new(compile(engine, name.clone(), &read(path)?)?);

        // A poisoned cache only costs a recompilation on the next call.
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(path.clone(), (modified, ast.clone()));
        }

        Ok(ScriptUnit { name, ast })
    }

    fn keeps_modules(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_are_resolved() {
        let base = std::path::Path::new("/etc/pmilter");

        assert_eq!(
            ScriptSource::File("handlers/connect.rhai".into()).resolved_against(base),
            ScriptSource::File("/etc/pmilter/handlers/connect.rhai".into())
        );
        assert_eq!(
            ScriptSource::File("/srv/connect.rhai".into()).resolved_against(base),
            ScriptSource::File("/srv/connect.rhai".into())
        );
        assert_eq!(
            ScriptSource::Inline { code: "1".into() }.resolved_against(base),
            ScriptSource::Inline { code: "1".into() }
        );
    }

    #[test]
    fn names() {
        assert_eq!(
            ScriptSource::File("/etc/pmilter/eom.rhai".into()).name(),
            "/etc/pmilter/eom.rhai"
        );
        assert_eq!(
            ScriptSource::Inline { code: "()".into() }.name(),
            INLINE_SOURCE_NAME
        );
    }

    #[test]
    fn deserialize() {
        let file: ScriptSource = serde_json::from_str(r#""/etc/pmilter/helo.rhai""#).unwrap();
        let inline: ScriptSource = serde_json::from_str(r#"{ "code": "40 + 2" }"#).unwrap();

        assert_eq!(file, ScriptSource::File("/etc/pmilter/helo.rhai".into()));
        assert!(serde_json::from_str::<ScriptSource>(r#"{ "path": "helo.rhai" }"#).is_err());
        assert!(serde_json::from_str::<ScriptSource>("42").is_err());
        assert_eq!(
            inline,
            ScriptSource::Inline {
                code: "40 + 2".into()
            }
        );
    }
}
