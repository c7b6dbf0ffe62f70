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

use pmilter::{
    config::{Handlers, Server, SessionHandlers},
    Milter, MilterConfig, PeerAddress, ProtocolContext, ProtocolError, Session, Verdict,
};
use pmilter_config::Config;
use pmilter_rule_engine::ScriptSource;

/// Build a complete path from the current cargo manifest files using a relative path.
#[macro_export]
macro_rules! from_manifest_path {
    ($path:expr) => {
        std::path::PathBuf::from_iter([env!("CARGO_MANIFEST_DIR"), $path])
    };
}

/// Stands for the MTA: fixed symbols, and every header addition is recorded.
#[derive(Debug, Default)]
pub struct Recorder {
    symbols: std::collections::HashMap<String, String>,
    headers: std::sync::Mutex<Vec<(String, String)>>,
    refuse: bool,
}

impl Recorder {
    pub fn with_symbols<'a>(symbols: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            symbols: symbols
                .into_iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    /// A MTA answering every header addition with an error.
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Default::default()
        }
    }

    pub fn headers(&self) -> Vec<(String, String)> {
        self.headers.lock().unwrap().clone()
    }
}

impl ProtocolContext for Recorder {
    fn symbol(&self, name: &str) -> Option<String> {
        self.symbols.get(name).cloned()
    }

    fn add_header(&self, name: &str, value: &str) -> Result<(), ProtocolError> {
        self.headers
            .lock()
            .unwrap()
            .push((name.to_string(), value.to_string()));

        if self.refuse {
            Err(ProtocolError::Refused("header addition disabled".to_string()))
        } else {
            Ok(())
        }
    }
}

pub fn inline(code: &str) -> Option<ScriptSource> {
    Some(ScriptSource::Inline {
        code: code.to_string(),
    })
}

/// A script of `tests/scripts`.
pub fn file(name: &str) -> Option<ScriptSource> {
    Some(ScriptSource::File(name.into()))
}

fn config(scripting: bool, session: SessionHandlers) -> MilterConfig {
    config_at(
        &from_manifest_path!("tests/scripts/pmilter.rhai"),
        scripting,
        session,
    )
}

fn config_at(path: &std::path::Path, scripting: bool, session: SessionHandlers) -> MilterConfig {
    MilterConfig {
        server: Server {
            scripting,
            ..Default::default()
        },
        handler: Handlers {
            session,
            ..Default::default()
        },
        ..Default::default()
    }
    .on_loaded(path)
    .unwrap()
}

pub fn milter(session: SessionHandlers) -> Milter {
    Milter::new(config(true, session))
}

/// A milter configured from `directory`, where its handlers import modules from.
pub fn milter_in(directory: &std::path::Path, session: SessionHandlers) -> Milter {
    Milter::new(config_at(&directory.join("pmilter.rhai"), true, session))
}

pub fn milter_without_scripting(session: SessionHandlers) -> Milter {
    Milter::new(config(false, session))
}

pub fn client() -> PeerAddress {
    PeerAddress::Inet("203.0.113.5:52100".parse().unwrap())
}

/// Connect from `203.0.113.5`, returning the connect verdict and the slot holding the session.
pub fn connect(
    milter: &Milter,
    protocol: std::sync::Arc<Recorder>,
) -> (Verdict, Option<Session>) {
    let mut slot = None;
    let verdict = milter.connect(&mut slot, "client.example.org", client(), protocol);

    (verdict, slot)
}

pub fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}
