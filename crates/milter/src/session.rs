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

use crate::{
    ConnectionInfo, Phase, ProtocolContext, ProtocolError, TransactionRecord, Verdict,
};
use pmilter_rule_engine::{RuleEngine, State, Status};

/// libmilter `MI_SUCCESS`.
pub const MI_SUCCESS: i64 = 0;
/// libmilter `MI_FAILURE`.
pub const MI_FAILURE: i64 = -1;

/// Everything the handlers of a connection share.
#[derive(Debug)]
pub struct SessionState {
    record: TransactionRecord,
    verdict: Verdict,
    verdict_set: bool,
    phase: Phase,
    protocol: std::sync::Arc<dyn ProtocolContext>,
}

impl SessionState {
    #[must_use]
    pub const fn record(&self) -> &TransactionRecord {
        &self.record
    }

    pub fn record_mut(&mut self) -> &mut TransactionRecord {
        &mut self.record
    }

    #[must_use]
    pub const fn verdict(&self) -> Verdict {
        self.verdict
    }

    /// Set the verdict of the current phase.
    ///
    /// `ALL_OPTS` only answers a negotiation and is refused here.
    pub fn set_verdict(&mut self, verdict: Verdict) {
        if verdict == Verdict::AllOpts {
            tracing::warn!(
                phase = %self.phase,
                "`all_opts` is a negotiation reply, status left unchanged"
            );
            return;
        }

        self.verdict = verdict;
        self.verdict_set = true;
    }

    /// Whether the verdict was set since the phase started.
    #[must_use]
    pub const fn verdict_set(&self) -> bool {
        self.verdict_set
    }

    /// The phase currently running, or the last one that ran.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn symbol(&self, name: &str) -> Option<String> {
        self.protocol.symbol(name)
    }
}

/// Data only valid for the duration of one phase call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CallData {
    #[default]
    None,
    Header {
        name: String,
        value: String,
    },
    Body(rhai::Blob),
    Unknown(String),
}

/// The per-connection aggregate: the script engine and the recorded data.
#[derive(Debug)]
pub struct Session {
    engine: Option<RuleEngine<Verdict>>,
    state: State<SessionState>,
}

impl Session {
    /// Create the session of a new connection.
    ///
    /// Without an engine, no handler is ever run for this connection.
    #[must_use]
    pub fn open(
        connection: ConnectionInfo,
        protocol: std::sync::Arc<dyn ProtocolContext>,
        engine: Option<RuleEngine<Verdict>>,
    ) -> Self {
        Self {
            engine,
            state: State::from(SessionState {
                record: TransactionRecord::new(connection),
                verdict: Verdict::next(),
                verdict_set: false,
                phase: Phase::Connect,
                protocol,
            }),
        }
    }

    /// Read the value of the state.
    pub fn read<O>(&self, f: impl FnOnce(&SessionState) -> O) -> O {
        self.state.read(f)
    }

    /// Write to the state.
    pub fn write<O>(&self, f: impl FnOnce(&mut SessionState) -> O) -> O {
        self.state.write(f)
    }

    #[must_use]
    pub fn verdict(&self) -> Verdict {
        self.read(SessionState::verdict)
    }

    #[must_use]
    pub const fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    /// Enter `phase`: the verdict goes back to `CONTINUE`.
    pub(crate) fn begin(&self, phase: Phase) {
        self.write(|state| {
            state.phase = phase;
            state.verdict = Verdict::next();
            state.verdict_set = false;
        });
    }

    pub(crate) fn engine_mut(&mut self) -> Option<&mut RuleEngine<Verdict>> {
        self.engine.as_mut()
    }

    /// The object bound as `session` in handlers.
    pub(crate) fn handle(&self, call: CallData) -> SessionHandle {
        SessionHandle {
            state: self.state.clone(),
            call: rhai::Shared::new(call),
        }
    }

    /// Number of live references to the shared state, this session's included.
    #[must_use]
    pub fn state_handles(&self) -> usize {
        self.state.handles()
    }
}

/// The `session` object of scripts.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    state: State<SessionState>,
    call: rhai::Shared<CallData>,
}

impl SessionHandle {
    pub fn read<O>(&self, f: impl FnOnce(&SessionState) -> O) -> O {
        self.state.read(f)
    }

    pub fn write<O>(&self, f: impl FnOnce(&mut SessionState) -> O) -> O {
        self.state.write(f)
    }

    #[must_use]
    pub fn call(&self) -> &CallData {
        &self.call
    }

    /// Ask the MTA to add a header, only possible at end of message.
    pub fn add_header(&self, name: &str, value: &str) -> Result<(), ProtocolError> {
        let (phase, protocol) = self.read(|state| (state.phase, state.protocol.clone()));

        if phase != Phase::Eom {
            return Err(ProtocolError::NotAtEndOfMessage);
        }

        protocol.add_header(name, value)
    }
}

/// Target of `session.headers[name] = value`.
#[derive(Debug, Clone)]
pub struct HeaderWriter(pub(crate) SessionHandle);
