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

use super::RuleEngineConfig;
use crate::{FreshCompile, ScriptLoader};
use rhai::packages::Package;

#[allow(clippy::module_name_repetitions)]
/// Builder to create rule engines configuration.
#[derive(Debug)]
pub struct RuleEngineConfigBuilder {
    global_modules: Vec<rhai::Shared<rhai::Module>>,
    static_modules: Vec<(String, rhai::Shared<rhai::Module>)>,
    resolve_path: Option<std::path::PathBuf>,
    loader: Box<dyn ScriptLoader>,
}

impl Default for RuleEngineConfigBuilder {
    /// Create a new builder, that compiles scripts on every call.
    fn default() -> Self {
        Self {
            global_modules: Vec::default(),
            static_modules: Vec::default(),
            resolve_path: None,
            loader: Box::new(FreshCompile),
        }
    }
}

impl RuleEngineConfigBuilder {
    /// Add global Rhai modules to the engine configuration.
    #[must_use]
    pub fn with_global_modules(
        mut self,
        modules: impl IntoIterator<Item = rhai::Shared<rhai::Module>>,
    ) -> Self {
        self.global_modules.extend(modules);
        self
    }

    /// Add standard Rhai modules to the engine configuration.
    #[must_use]
    pub fn with_standard_global_modules(mut self) -> Self {
        self.global_modules
            .push(rhai::packages::StandardPackage::new().as_shared_module());

        self
    }

    /// Add static Rhai modules to the engine configuration.
    #[must_use]
    pub fn with_static_modules(
        mut self,
        modules: impl IntoIterator<Item = (String, rhai::Shared<rhai::Module>)>,
    ) -> Self {
        self.static_modules.extend(modules);
        self
    }

    /// Add the modules declared in [`crate::api::script_modules`] to the engine configuration.
    #[must_use]
    pub fn with_script_modules(self) -> Self {
        self.with_static_modules(crate::api::script_modules())
    }

    /// Resolve `import` statements from this directory, with the `rhai` extension.
    #[must_use]
    pub fn with_module_resolver_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.resolve_path = Some(path.into());
        self
    }

    /// Replace the default [`FreshCompile`] loader.
    #[must_use]
    pub fn with_loader(mut self, loader: impl ScriptLoader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    /// Build the rule engine configuration.
    #[must_use]
    pub fn build(self) -> RuleEngineConfig {
        RuleEngineConfig {
            global_modules: self.global_modules,
            static_modules: self.static_modules,
            resolve_path: self.resolve_path,
            loader: self.loader,
        }
    }
}
