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

use crate::Phase;
use pmilter_config::{Config, ConfigError, ConfigResult, Logs};
use pmilter_rule_engine::ScriptSource;

pub mod cli;

/// Configuration of the filter.
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MilterConfig {
    /// Listener and milter runtime parameters.
    #[serde(default)]
    pub server: Server,
    /// logging configuration.
    #[serde(default)]
    pub logs: Logs,
    /// Scripts to run.
    #[serde(default)]
    pub handler: Handlers,
    #[serde(skip)]
    /// Path to the configuration script.
    pub path: std::path::PathBuf,
}

impl Config for MilterConfig {
    fn with_path(path: &impl AsRef<std::path::Path>) -> ConfigResult<Self> {
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            ..Default::default()
        })
    }

    fn on_loaded(mut self, path: &std::path::Path) -> ConfigResult<Self> {
        let base = path
            .parent()
            .ok_or_else(|| ConfigError::InvalidParentDirectory(path.into()))?;

        if self.server.timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "server.timeout",
                reason: "connections would be dropped right away".to_string(),
            });
        }
        if self.server.backlog == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.backlog",
                reason: "must be at least 1".to_string(),
            });
        }

        self.handler = self.handler.resolved_against(base);
        self.path = path.to_path_buf();

        Ok(self)
    }

    fn logs(&self) -> &Logs {
        &self.logs
    }

    fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl MilterConfig {
    /// Directory of the configuration file, from which scripts import modules.
    #[must_use]
    pub fn directory(&self) -> Option<&std::path::Path> {
        self.path.parent()
    }
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Server {
    /// Socket the MTA connects to.
    #[serde(default)]
    pub listen: ListenAddress,
    /// Time without a milter command after which a connection is dropped.
    #[serde(default = "Server::default_timeout", with = "humantime_serde")]
    pub timeout: std::time::Duration,
    /// Pending connections queue size of the listener.
    #[serde(default = "Server::default_backlog")]
    pub backlog: u32,
    /// Above 0, the symbols relevant to each phase are logged.
    #[serde(default)]
    pub debug: u8,
    /// Run the configured handlers. If `false`, every phase continues.
    #[serde(default)]
    pub scripting: bool,
    /// Reuse compiled script files until they are modified, instead of
    /// compiling them on every call.
    #[serde(default)]
    pub script_cache: bool,
}

impl Server {
    /// libmilter's default.
    const fn default_timeout() -> std::time::Duration {
        std::time::Duration::from_secs(7210)
    }

    const fn default_backlog() -> u32 {
        128
    }
}

impl Default for Server {
    fn default() -> Self {
        Self {
            listen: ListenAddress::default(),
            timeout: Self::default_timeout(),
            backlog: Self::default_backlog(),
            debug: 0,
            scripting: false,
            script_cache: false,
        }
    }
}

/// Milter socket address, in the libmilter `inet:PORT@HOST` / `unix:PATH` form.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ListenAddress {
    Inet { host: String, port: u16 },
    Inet6 { host: String, port: u16 },
    Unix(std::path::PathBuf),
}

impl Default for ListenAddress {
    fn default() -> Self {
        Self::Inet {
            host: "127.0.0.1".to_string(),
            port: 10025,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ListenAddressError {
    #[error("expected `inet:PORT@HOST`, `inet6:PORT@HOST`, `unix:PATH` or `local:PATH`, got `{0}`")]
    Format(String),
    #[error("invalid port `{0}`")]
    Port(String),
}

impl std::str::FromStr for ListenAddress {
    type Err = ListenAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = s
            .split_once(':')
            .ok_or_else(|| ListenAddressError::Format(s.to_string()))?;

        let inet = |default_host: &str| {
            let (port, host) = rest.split_once('@').unwrap_or((rest, default_host));
            let port = port
                .parse::<u16>()
                .map_err(|_| ListenAddressError::Port(port.to_string()))?;
            let host = host.trim_start_matches('[').trim_end_matches(']');

            Ok::<_, ListenAddressError>((host.to_string(), port))
        };

        match scheme {
            "inet" => inet("0.0.0.0").map(|(host, port)| Self::Inet { host, port }),
            "inet6" => inet("::").map(|(host, port)| Self::Inet6 { host, port }),
            "unix" | "local" if !rest.is_empty() => Ok(Self::Unix(rest.into())),
            _ => Err(ListenAddressError::Format(s.to_string())),
        }
    }
}

impl TryFrom<String> for ListenAddress {
    type Error = ListenAddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::fmt::Display for ListenAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inet { host, port } => write!(f, "inet:{port}@{host}"),
            Self::Inet6 { host, port } => write!(f, "inet6:{port}@{host}"),
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

impl From<ListenAddress> for String {
    fn from(value: ListenAddress) -> Self {
        value.to_string()
    }
}

/// Handlers run by the filter.
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Handlers {
    #[serde(default)]
    pub session: SessionHandlers,
    #[serde(default)]
    pub config: ConfigHandlers,
}

impl Handlers {
    fn resolved_against(self, base: &std::path::Path) -> Self {
        let resolve = |source: Option<ScriptSource>| source.map(|s| s.resolved_against(base));
        let SessionHandlers {
            connect,
            helo,
            envfrom,
            envrcpt,
            data,
            header,
            eoh,
            body,
            eom,
            abort,
            close,
            unknown,
        } = self.session;

        Self {
            session: SessionHandlers {
                connect: resolve(connect),
                helo: resolve(helo),
                envfrom: resolve(envfrom),
                envrcpt: resolve(envrcpt),
                data: resolve(data),
                header: resolve(header),
                eoh: resolve(eoh),
                body: resolve(body),
                eom: resolve(eom),
                abort: resolve(abort),
                close: resolve(close),
                unknown: resolve(unknown),
            },
            config: ConfigHandlers {
                postconfig: resolve(self.config.postconfig),
            },
        }
    }
}

/// One optional script per milter phase.
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionHandlers {
    #[serde(default)]
    pub connect: Option<ScriptSource>,
    #[serde(default)]
    pub helo: Option<ScriptSource>,
    #[serde(default)]
    pub envfrom: Option<ScriptSource>,
    #[serde(default)]
    pub envrcpt: Option<ScriptSource>,
    #[serde(default)]
    pub data: Option<ScriptSource>,
    #[serde(default)]
    pub header: Option<ScriptSource>,
    #[serde(default)]
    pub eoh: Option<ScriptSource>,
    #[serde(default)]
    pub body: Option<ScriptSource>,
    #[serde(default)]
    pub eom: Option<ScriptSource>,
    #[serde(default)]
    pub abort: Option<ScriptSource>,
    #[serde(default)]
    pub close: Option<ScriptSource>,
    #[serde(default)]
    pub unknown: Option<ScriptSource>,
}

impl SessionHandlers {
    /// The handler configured for `phase`.
    #[must_use]
    pub const fn get(&self, phase: Phase) -> Option<&ScriptSource> {
        match phase {
            Phase::Connect => self.connect.as_ref(),
            Phase::Helo => self.helo.as_ref(),
            Phase::Envfrom => self.envfrom.as_ref(),
            Phase::Envrcpt => self.envrcpt.as_ref(),
            Phase::Data => self.data.as_ref(),
            Phase::Header => self.header.as_ref(),
            Phase::Eoh => self.eoh.as_ref(),
            Phase::Body => self.body.as_ref(),
            Phase::Eom => self.eom.as_ref(),
            Phase::Abort => self.abort.as_ref(),
            Phase::Close => self.close.as_ref(),
            Phase::Unknown => self.unknown.as_ref(),
        }
    }
}

/// Handlers run once, at startup.
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigHandlers {
    /// Run after the configuration is loaded, before accepting connections.
    #[serde(default)]
    pub postconfig: Option<ScriptSource>,
}
