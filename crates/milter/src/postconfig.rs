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

use crate::{MilterConfig, Verdict};
use pmilter_rule_engine::{HandlerError, RuleEngine, RuleEngineConfig, Stage};

/// Name of the variable holding the configuration in the post-config handler.
pub const CONFIG_BINDING: &str = "config";

/// Handlers run outside of any connection.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, strum::EnumString, strum::Display, strum::IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum ConfigStage {
    PostConfig,
}

impl Stage for ConfigStage {
    fn hook(&self) -> &'static str {
        self.into()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PostConfigError {
    #[error("failed to serialize the configuration: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to expose the configuration to the handler: {0}")]
    Json(#[source] Box<rhai::EvalAltResult>),
    #[error(transparent)]
    Handler(#[from] HandlerError),
}

/// Runs the `postconfig` handler, with an engine owned by the process rather than a connection.
#[derive(Debug)]
pub struct ConfigHandler {
    engine: RuleEngine<Verdict>,
}

impl ConfigHandler {
    #[must_use]
    pub fn new(engine_config: rhai::Shared<RuleEngineConfig>) -> Self {
        Self {
            engine: RuleEngine::from_config(engine_config),
        }
    }

    /// Run the handler once, with the configuration bound as a map.
    ///
    /// Any failure must stop the startup of the service.
    pub fn run(&mut self, config: &MilterConfig) -> Result<(), PostConfigError> {
        let Some(source) = config.handler.config.postconfig.as_ref() else {
            return Ok(());
        };

        let json = serde_json::to_string(config)?;
        let map = self
            .engine
            .engine()
            .parse_json(json, true)
            .map_err(PostConfigError::Json)?;

        tracing::info!(script = %source, "running post-config handler");

        self.engine
            .execute(ConfigStage::PostConfig, source, CONFIG_BINDING, map.into())?;

        Ok(())
    }
}
