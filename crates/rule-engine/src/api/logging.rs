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

#[allow(unused_imports)]
use rhai::plugin::{
    mem, Dynamic, FnAccess, FnNamespace, ImmutableString, Module, NativeCallContext,
    PluginFunction, RhaiResult, TypeId,
};

/// `tracing` target of every message logged by a script.
pub const SCRIPT_TARGET: &str = "pmilter::script";

/// Logging from scripts, with syslog severities.
#[rhai::plugin::export_module]
pub mod logging {
    use pmilter_config::LogLevel;

    /// Log a message with the given severity.
    ///
    /// # Args
    ///
    /// * `level` - "emerg", "alert", "crit", "error", "warn", "notice", "info" or "debug".
    /// * `message` - the message to log.
    ///
    /// # Examples
    ///
    /// ```js
    /// log::log("notice", `connection from ${session.client_ipaddr}`);
    /// ```
    #[rhai_fn(global, name = "log")]
    #[allow(clippy::cognitive_complexity)]
    pub fn log(level: &str, message: &str) {
        let Some(severity) = LogLevel::from_name(level) else {
            tracing::warn!(
                target: super::SCRIPT_TARGET,
                "level `{}` is invalid. Message was: '{}'",
                level,
                message,
            );
            return;
        };

        match severity {
            LogLevel::Emerg | LogLevel::Alert | LogLevel::Crit | LogLevel::Error => {
                tracing::error!(target: super::SCRIPT_TARGET, severity = level, message);
            }
            LogLevel::Warn => tracing::warn!(target: super::SCRIPT_TARGET, message),
            LogLevel::Notice | LogLevel::Info => {
                tracing::info!(target: super::SCRIPT_TARGET, severity = level, message);
            }
            LogLevel::Debug => tracing::debug!(target: super::SCRIPT_TARGET, message),
        }
    }

    /// Log an error.
    #[rhai_fn(global, name = "err")]
    pub fn err(message: &str) {
        tracing::error!(target: super::SCRIPT_TARGET, message);
    }

    /// Log a warning.
    #[rhai_fn(global, name = "warn")]
    pub fn warn(message: &str) {
        tracing::warn!(target: super::SCRIPT_TARGET, message);
    }

    #[rhai_fn(global, name = "info")]
    pub fn info(message: &str) {
        tracing::info!(target: super::SCRIPT_TARGET, message);
    }

    #[rhai_fn(global, name = "debug")]
    pub fn debug(message: &str) {
        tracing::debug!(target: super::SCRIPT_TARGET, message);
    }
}
