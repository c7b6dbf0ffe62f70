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

#![allow(dead_code)]

use pmilter_rule_engine::{
    rhai, HandlerError, RuleEngineConfig, RuleEngineConfigBuilder, ScriptLoader, Stage, State,
    Status,
};
use rhai::plugin::*;

/// Build a complete path from the current cargo manifest files using a relative path.
#[macro_export]
macro_rules! from_manifest_path {
    ($path:expr) => {
        std::path::PathBuf::from_iter([env!("CARGO_MANIFEST_DIR"), $path])
    };
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Hook {
    Count,
    Check,
}

impl Stage for Hook {
    fn hook(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Check => "check",
        }
    }
}

impl std::str::FromStr for Hook {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "count" => Ok(Self::Count),
            "check" => Ok(Self::Check),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.hook())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Next,
    Stop,
    Failed,
}

impl Status for Outcome {
    fn next() -> Self {
        Self::Next
    }

    fn error(_: &HandlerError) -> Self {
        Self::Failed
    }
}

#[derive(Debug, Default)]
pub struct Counter {
    pub value: usize,
}

// Enable the user to access our statuses.
#[rhai::export_module]
pub mod outcome {
    use super::Outcome;

    pub const fn next() -> Outcome {
        Outcome::Next
    }

    pub const fn stop() -> Outcome {
        Outcome::Stop
    }
}

// Mutate the caller's state from a script.
#[rhai::export_module]
pub mod counter {
    use super::{Counter, State};

    #[rhai_fn(global, pure)]
    pub fn inc(ctx: &mut State<Counter>) {
        ctx.write(|ctx| ctx.value += 1);
    }

    #[rhai_fn(global, get = "value", pure)]
    pub fn value(ctx: &mut State<Counter>) -> rhai::INT {
        ctx.read(|ctx| rhai::INT::try_from(ctx.value).unwrap_or(rhai::INT::MAX))
    }
}

pub fn config(loader: impl ScriptLoader + 'static) -> rhai::Shared<RuleEngineConfig> {
    config_with_modules(from_manifest_path!("tests/scripts"), loader)
}

/// Same as [`config`], resolving imports from `directory`.
pub fn config_with_modules(
    directory: impl Into<std::path::PathBuf>,
    loader: impl ScriptLoader + 'static,
) -> rhai::Shared<RuleEngineConfig> {
    rhai::Shared::new(
        RuleEngineConfigBuilder::default()
            .with_standard_global_modules()
            .with_global_modules([rhai::exported_module!(counter).into()])
            .with_static_modules([("outcome".to_string(), rhai::exported_module!(outcome).into())])
            .with_script_modules()
            .with_module_resolver_path(directory)
            .with_loader(loader)
            .build(),
    )
}
