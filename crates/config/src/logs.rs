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

use std::collections::HashMap;
use tracing_subscriber::filter::{LevelFilter, Targets};

#[derive(Debug, Default, serde::Deserialize, serde::Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Logs {
    /// Severity used for every target that is not listed in `levels`.
    #[serde(default)]
    pub level: LogLevel,
    /// Customize the log level of the different part of the program.
    ///
    /// Keys are `tracing` targets, e.g. `pmilter::dispatcher` or `pmilter::script`.
    #[serde(default)]
    pub levels: HashMap<String, LogLevel>,
}

impl Logs {
    /// Build the `tracing` filter matching this configuration.
    #[must_use]
    pub fn targets(&self) -> Targets {
        Targets::new()
            .with_targets(
                self.levels
                    .iter()
                    .map(|(target, level)| (target.clone(), level.filter())),
            )
            .with_default(self.level.filter())
    }
}

/// Syslog-like severities accepted in the configuration.
///
/// The discriminant is the numeric severity, `emerg` being the most severe.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[derive(serde::Deserialize, serde::Serialize)]
#[serde(from = "String", into = "&'static str")]
pub enum LogLevel {
    Emerg = 0,
    Alert = 1,
    Crit = 2,
    Error = 3,
    #[default]
    Warn = 4,
    Notice = 5,
    Info = 6,
    Debug = 7,
}

impl LogLevel {
    const NAMES: [(&'static str, Self); 8] = [
        ("emerg", Self::Emerg),
        ("alert", Self::Alert),
        ("crit", Self::Crit),
        ("error", Self::Error),
        ("warn", Self::Warn),
        ("notice", Self::Notice),
        ("info", Self::Info),
        ("debug", Self::Debug),
    ];

    /// Find a level by name. Unknown names yield `None`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, level)| *level)
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        Self::NAMES[self as usize].0
    }

    /// Numeric severity, from 0 (`emerg`) to 7 (`debug`).
    #[must_use]
    pub const fn severity(self) -> u8 {
        self as u8
    }

    /// The `tracing` filter that lets this severity and anything more severe through.
    #[must_use]
    pub const fn filter(self) -> LevelFilter {
        match self {
            Self::Emerg | Self::Alert | Self::Crit | Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Notice | Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
        }
    }
}

impl From<String> for LogLevel {
    fn from(value: String) -> Self {
        Self::from_name(&value).unwrap_or_else(|| {
            tracing::warn!(level = %value, "unknown log level, falling back to `warn`");
            Self::Warn
        })
    }
}

impl From<LogLevel> for &'static str {
    fn from(value: LogLevel) -> Self {
        value.name()
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severities_follow_syslog_order() {
        assert_eq!(LogLevel::Emerg.severity(), 0);
        assert_eq!(LogLevel::Warn.severity(), 4);
        assert_eq!(LogLevel::Debug.severity(), 7);
        assert!(LogLevel::Crit < LogLevel::Notice);
    }

    #[test]
    fn names_round_trip() {
        for (name, level) in LogLevel::NAMES {
            assert_eq!(LogLevel::from_name(name), Some(level));
            assert_eq!(level.name(), name);
        }
    }

    #[test]
    fn unknown_name_falls_back_to_warn() {
        assert_eq!(LogLevel::from("verbose".to_string()), LogLevel::Warn);
        assert_eq!(LogLevel::from_name("verbose"), None);
    }

    #[test]
    fn filters() {
        assert_eq!(LogLevel::Alert.filter(), LevelFilter::ERROR);
        assert_eq!(LogLevel::Notice.filter(), LevelFilter::INFO);
        assert_eq!(LogLevel::Debug.filter(), LevelFilter::DEBUG);
    }
}
