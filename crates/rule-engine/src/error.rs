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

/// A handler source that could not be turned into a [`crate::ScriptUnit`].
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// The script file could not be read.
    #[error("failed to open script `{}`: {error}", path.display())]
    Open {
        path: std::path::PathBuf,
        #[source]
        error: std::io::Error,
    },
    /// The script was read but could not be parsed.
    #[error("syntax error in script `{source_name}`: {error}")]
    Syntax {
        source_name: String,
        #[source]
        error: rhai::ParseError,
    },
}

/// Outcome of a failed handler call.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    /// The script compiled but raised an error while running.
    #[error("script `{source_name}` raised an error: {error}")]
    Runtime {
        source_name: String,
        error: Box<rhai::EvalAltResult>,
    },
}

impl HandlerError {
    /// Name of the script that failed.
    #[must_use]
    pub fn source_name(&self) -> std::borrow::Cow<'_, str> {
        match self {
            Self::Compile(CompileError::Open { path, .. }) => path.to_string_lossy(),
            Self::Compile(CompileError::Syntax { source_name, .. })
            | Self::Runtime { source_name, .. } => source_name.as_str().into(),
        }
    }
}
