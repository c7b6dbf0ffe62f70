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

pub mod builder;

/// A "template" for light weight rule engines.
///
/// It stores the modules, the module resolution path and the script loader
/// used to spawn cheap rule engines, one per owner (a connection, the process).
///
/// Call the [`builder::RuleEngineConfigBuilder`] to create an instance.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug)]
pub struct RuleEngineConfig {
    pub(super) global_modules: Vec<rhai::Shared<rhai::Module>>,
    pub(super) static_modules: Vec<(String, rhai::Shared<rhai::Module>)>,
    pub(super) resolve_path: Option<std::path::PathBuf>,
    pub(super) loader: Box<dyn crate::ScriptLoader>,
}

impl RuleEngineConfig {
    /// Create a rhai engine with every module of this template registered.
    #[must_use]
    pub fn engine(&self) -> rhai::Engine {
        let mut engine = rhai::Engine::new_raw();

        for module in &self.global_modules {
            engine.register_global_module(module.clone());
        }
        for (namespace, module) in &self.static_modules {
            engine.register_static_module(namespace, module.clone());
        }

        if let Some(path) = &self.resolve_path {
            let mut resolver =
                rhai::module_resolvers::FileModuleResolver::new_with_path_and_extension(
                    path, "rhai",
                );
            resolver.enable_cache(self.loader.keeps_modules());
            engine.set_module_resolver(resolver);
        }

        engine
            .on_print(|message| tracing::info!(target: crate::api::SCRIPT_TARGET, "{message}"))
            .on_debug(|message, source, position| {
                tracing::debug!(target: crate::api::SCRIPT_TARGET, ?source, ?position, message);
            })
            .disable_symbol("eval");

        engine
    }

    #[must_use]
    pub fn loader(&self) -> &dyn crate::ScriptLoader {
        self.loader.as_ref()
    }
}
