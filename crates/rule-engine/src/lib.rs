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

//! Embedding of rhai scripts run at well known stages of a service.
//!
//! A [`RuleEngineConfig`] is built once with a [`RuleEngineConfigBuilder`],
//! then each owner (a connection, the process itself) spawns its own
//! [`RuleEngine`] from it and runs one-shot [`ScriptUnit`]s with it.

/// Settings used to spawn rule engines.
mod config;
/// Failures of the compile and run steps.
mod error;
/// Handler sources, compiled units and the loaders turning the former into the latter.
mod source;
/// "Hooks" used to identify which handler is running.
mod stage;
/// Values returned by the rule engine when executing a script.
mod status;

pub use crate::config::builder::RuleEngineConfigBuilder;
pub use crate::config::RuleEngineConfig;
pub use crate::error::{CompileError, HandlerError};
pub use crate::source::{
    FreshCompile, ModifiedTimeCache, ScriptLoader, ScriptSource, ScriptUnit, INLINE_SOURCE_NAME,
};
pub use crate::stage::Stage;
pub use crate::status::Status;
pub use api::State;
pub use rhai;

/// Module containing the backend for the Rhai API.
pub mod api;

/// A runtime to execute handlers.
///
/// The engine keeps a [`rhai::Scope`] for its whole life, but every run
/// rewinds it to the size it had before the run, so values created by a
/// handler never outlive the call.
#[derive(Debug)]
pub struct RuleEngine<STATUS>
where
    STATUS: Status,
{
    /// Underlying Rhai engine.
    rhai_engine: rhai::Engine,
    /// Rule engine configuration template used to the configure
    /// the Rhai engine.
    config: rhai::Shared<RuleEngineConfig>,
    scope: rhai::Scope<'static>,
    status: std::marker::PhantomData<STATUS>,
}

impl<STATUS: Status> RuleEngine<STATUS> {
    /// Builds a rhai engine from the given configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - A sharable config. Using `[rhai::Shared]` let's us
    ///              share the template between every connection.
    #[must_use]
    pub fn from_config(config: rhai::Shared<RuleEngineConfig>) -> Self {
        Self {
            rhai_engine: config.engine(),
            config,
            scope: rhai::Scope::new(),
            status: std::marker::PhantomData,
        }
    }

    /// Compile a handler with the loader of the configuration.
    pub fn compile(&self, source: &ScriptSource) -> Result<ScriptUnit, CompileError> {
        self.config.loader().load(&self.rhai_engine, source)
    }

    /// Run a compiled handler once, with `host` bound to a variable named `binding`.
    ///
    /// Returns the status the script evaluated to, if its last expression is one.
    /// The unit is consumed, it is released when this function returns.
    pub fn run(
        &mut self,
        unit: ScriptUnit,
        binding: &str,
        host: rhai::Dynamic,
    ) -> Result<Option<STATUS>, HandlerError> {
        let watermark = self.scope.len();
        self.scope.push_dynamic(binding.to_string(), host);

        let result = self
            .rhai_engine
            .eval_ast_with_scope::<rhai::Dynamic>(&mut self.scope, unit.ast());

        self.scope.rewind(watermark);

        match result {
            Ok(value) => Ok(value.try_cast::<STATUS>()),
            Err(error) => Err(HandlerError::Runtime {
                source_name: unit.name().to_string(),
                error,
            }),
        }
    }

    /// Compile then run the handler configured for `stage`, logging failures.
    #[tracing::instrument(name = "handler", skip_all, fields(stage = stage.hook(), script = %source))]
    pub fn execute(
        &mut self,
        stage: impl Stage,
        source: &ScriptSource,
        binding: &str,
        host: rhai::Dynamic,
    ) -> Result<Option<STATUS>, HandlerError> {
        let unit = self.compile(source).map_err(|error| {
            tracing::error!(%error, "failed to compile handler");
            HandlerError::Compile(error)
        })?;

        self.run(unit, binding, host).map_err(|error| {
            tracing::error!(%error, "handler raised an error");
            error
        })
    }

    /// Number of values currently held by the engine's scope.
    #[must_use]
    pub fn scope_len(&self) -> usize {
        self.scope.len()
    }

    /// Access the underlying rhai engine.
    #[must_use]
    pub const fn engine(&self) -> &rhai::Engine {
        &self.rhai_engine
    }
}
