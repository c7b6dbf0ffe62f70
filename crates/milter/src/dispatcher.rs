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
    api, CallData, ConnectionInfo, MilterConfig, PeerAddress, Phase, ProtocolContext, Session,
    Verdict,
};
use pmilter_rule_engine::{
    ModifiedTimeCache, RuleEngine, RuleEngineConfig, RuleEngineConfigBuilder, Status,
};

/// Name of the variable holding the session in handlers.
pub const SESSION_BINDING: &str = "session";

/// Capability words exchanged at negotiation.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub actions: u32,
    pub protocol: u32,
    pub reserved: [u32; 2],
}

/// Maps every milter callback of a connection to its configured handler.
///
/// The dispatcher holds no per-connection data: the [`Session`] lives in the
/// slot the runtime keeps for each connection and is passed to every call.
#[derive(Debug)]
pub struct Milter {
    config: MilterConfig,
    engine_config: Option<rhai::Shared<RuleEngineConfig>>,
}

impl Milter {
    /// Build the dispatcher. Engines are only spawned if scripting is enabled.
    #[must_use]
    pub fn new(config: MilterConfig) -> Self {
        let engine_config = config
            .server
            .scripting
            .then(|| rhai::Shared::new(Self::build_engine_config(&config)));

        Self {
            config,
            engine_config,
        }
    }

    fn build_engine_config(config: &MilterConfig) -> RuleEngineConfig {
        let mut builder = RuleEngineConfigBuilder::default()
            .with_standard_global_modules()
            .with_global_modules(api::global_modules())
            .with_static_modules(api::static_modules())
            .with_script_modules();

        if let Some(directory) = config
            .directory()
            .filter(|directory| !directory.as_os_str().is_empty())
        {
            builder = builder.with_module_resolver_path(directory);
        }

        if config.server.script_cache {
            builder = builder.with_loader(ModifiedTimeCache::default());
        }

        builder.build()
    }

    #[must_use]
    pub const fn config(&self) -> &MilterConfig {
        &self.config
    }

    /// Template of the engines, `None` if scripting is disabled.
    #[must_use]
    pub fn engine_config(&self) -> Option<&rhai::Shared<RuleEngineConfig>> {
        self.engine_config.as_ref()
    }

    /// Accept every option the MTA offers.
    #[must_use]
    pub fn negotiate(&self, offered: Capabilities) -> (Verdict, Capabilities) {
        tracing::debug!(?offered, "negotiating");
        (Verdict::AllOpts, offered)
    }

    #[tracing::instrument(skip_all, fields(phase = %Phase::Connect, %hostname))]
    pub fn connect(
        &self,
        slot: &mut Option<Session>,
        hostname: &str,
        address: PeerAddress,
        protocol: std::sync::Arc<dyn ProtocolContext>,
    ) -> Verdict {
        let daemon = protocol.symbol("{daemon_name}");

        let connection = match ConnectionInfo::new(address, hostname, daemon) {
            Ok(connection) => connection,
            Err(error) => {
                tracing::warn!(%error, "cannot open a session");
                return Verdict::Tempfail;
            }
        };

        let engine = self
            .engine_config
            .as_ref()
            .map(|config| RuleEngine::from_config(config.clone()));

        tracing::info!(
            client = connection.ipaddr(),
            peer = ?connection.address(),
            "connection accepted"
        );

        let session = slot.insert(Session::open(connection, protocol, engine));
        self.dispatch(session, Phase::Connect, CallData::None)
    }

    #[tracing::instrument(skip_all, fields(phase = %Phase::Helo))]
    pub fn helo(&self, slot: &mut Option<Session>, hostname: &str) -> Verdict {
        let Some(session) = Self::session(slot, Phase::Helo) else {
            return Verdict::Tempfail;
        };

        session.write(|state| state.record_mut().set_helo_hostname(hostname));
        self.dispatch(session, Phase::Helo, CallData::None)
    }

    #[tracing::instrument(skip_all, fields(phase = %Phase::Envfrom))]
    pub fn envfrom(&self, slot: &mut Option<Session>, args: &[String]) -> Verdict {
        let Some(session) = Self::session(slot, Phase::Envfrom) else {
            return Verdict::Tempfail;
        };

        if let Some(sender) = args.first() {
            session.write(|state| state.record_mut().set_envelope_from(sender.as_str()));
        }
        self.dispatch(session, Phase::Envfrom, CallData::None)
    }

    /// The recipient is read from the `{rcpt_addr}` symbol, or the first argument
    /// when the MTA does not send it. It replaces the previous recipient.
    #[tracing::instrument(skip_all, fields(phase = %Phase::Envrcpt))]
    pub fn envrcpt(&self, slot: &mut Option<Session>, args: &[String]) -> Verdict {
        let Some(session) = Self::session(slot, Phase::Envrcpt) else {
            return Verdict::Tempfail;
        };

        session.write(|state| {
            if let Some(recipient) = state
                .symbol("{rcpt_addr}")
                .or_else(|| args.first().cloned())
            {
                state.record_mut().set_envelope_to(recipient);
            }
        });
        self.dispatch(session, Phase::Envrcpt, CallData::None)
    }

    #[tracing::instrument(skip_all, fields(phase = %Phase::Data))]
    pub fn data(&self, slot: &mut Option<Session>) -> Verdict {
        let Some(session) = Self::session(slot, Phase::Data) else {
            return Verdict::Tempfail;
        };

        self.dispatch(session, Phase::Data, CallData::None)
    }

    #[tracing::instrument(skip_all, fields(phase = %Phase::Header, header = name))]
    pub fn header(&self, slot: &mut Option<Session>, name: &str, value: &str) -> Verdict {
        let Some(session) = Self::session(slot, Phase::Header) else {
            return Verdict::Tempfail;
        };

        let call = CallData::Header {
            name: name.to_string(),
            value: value.to_string(),
        };
        self.dispatch(session, Phase::Header, call)
    }

    #[tracing::instrument(skip_all, fields(phase = %Phase::Eoh))]
    pub fn eoh(&self, slot: &mut Option<Session>) -> Verdict {
        let Some(session) = Self::session(slot, Phase::Eoh) else {
            return Verdict::Tempfail;
        };

        self.dispatch(session, Phase::Eoh, CallData::None)
    }

    #[tracing::instrument(skip_all, fields(phase = %Phase::Body, len = chunk.len()))]
    pub fn body(&self, slot: &mut Option<Session>, chunk: &[u8]) -> Verdict {
        let Some(session) = Self::session(slot, Phase::Body) else {
            return Verdict::Tempfail;
        };

        self.dispatch(session, Phase::Body, CallData::Body(chunk.to_vec()))
    }

    #[tracing::instrument(skip_all, fields(phase = %Phase::Eom))]
    pub fn eom(&self, slot: &mut Option<Session>) -> Verdict {
        let Some(session) = Self::session(slot, Phase::Eom) else {
            return Verdict::Tempfail;
        };

        session.write(|state| {
            state
                .record_mut()
                .set_receive_time(std::time::SystemTime::now());
        });
        let verdict = self.dispatch(session, Phase::Eom, CallData::None);
        Self::cleanup(session, true);

        verdict
    }

    #[tracing::instrument(skip_all, fields(phase = %Phase::Abort))]
    pub fn abort(&self, slot: &mut Option<Session>) -> Verdict {
        let Some(session) = Self::session(slot, Phase::Abort) else {
            return Verdict::Tempfail;
        };

        let verdict = self.dispatch(session, Phase::Abort, CallData::None);
        Self::cleanup(session, false);

        verdict
    }

    /// Run the close handler then drop the session, emptying the slot.
    #[tracing::instrument(skip_all, fields(phase = %Phase::Close))]
    pub fn close(&self, slot: &mut Option<Session>) -> Verdict {
        let verdict = slot.as_mut().map_or(Verdict::Continue, |session| {
            self.dispatch(session, Phase::Close, CallData::None)
        });

        if slot.take().is_some() {
            tracing::info!("connection closed");
        }

        verdict
    }

    #[tracing::instrument(skip_all, fields(phase = %Phase::Unknown))]
    pub fn unknown(&self, slot: &mut Option<Session>, command: &str) -> Verdict {
        let Some(session) = Self::session(slot, Phase::Unknown) else {
            return Verdict::Tempfail;
        };

        self.dispatch(session, Phase::Unknown, CallData::Unknown(command.to_string()))
    }

    fn session(slot: &mut Option<Session>, phase: Phase) -> Option<&mut Session> {
        if slot.is_none() {
            tracing::warn!(%phase, "no session registered for this connection");
        }
        slot.as_mut()
    }

    /// End of a mail transaction, delivered (`ok`) or aborted.
    fn cleanup(session: &Session, ok: bool) {
        session.write(|state| {
            tracing::debug!(
                ok,
                from = state.record().envelope_from(),
                to = state.record().envelope_to(),
                "end of transaction"
            );
            state.record_mut().reset_transaction();
        });
    }

    /// Reset the verdict, then run the handler of `phase` if there is one.
    fn dispatch(&self, session: &mut Session, phase: Phase, call: CallData) -> Verdict {
        session.begin(phase);

        if self.config.server.debug > 0 {
            Self::dump_symbols(session, phase);
        }

        let Some(source) = self.config.handler.session.get(phase) else {
            return session.verdict();
        };

        let host = rhai::Dynamic::from(session.handle(call));
        let Some(engine) = session.engine_mut() else {
            return session.verdict();
        };

        match engine.execute(phase, source, SESSION_BINDING, host) {
            // An explicit `session.status` wins over the returned value.
            Ok(Some(verdict)) => session.write(|state| {
                if !state.verdict_set() {
                    state.set_verdict(verdict);
                }
            }),
            Ok(None) => {}
            Err(error) => {
                let verdict = Verdict::error(&error);
                session.write(|state| state.set_verdict(verdict));
            }
        }

        let verdict = session.verdict();
        tracing::debug!(%verdict, "handler done");

        verdict
    }

    fn dump_symbols(session: &Session, phase: Phase) {
        session.read(|state| {
            for name in phase.debug_symbols() {
                tracing::info!(
                    %phase,
                    symbol = name,
                    value = state.symbol(name).as_deref().unwrap_or("(null)"),
                    "symbol"
                );
            }
        });
    }
}
