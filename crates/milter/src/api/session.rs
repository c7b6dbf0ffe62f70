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
    session::{CallData, HeaderWriter, SessionHandle, MI_FAILURE, MI_SUCCESS},
    Verdict,
};
#[allow(unused_imports)]
use rhai::plugin::{
    mem, Dynamic, FnAccess, FnNamespace, ImmutableString, Module, NativeCallContext,
    PluginFunction, RhaiResult, TypeId,
};

fn optional(value: Option<impl Into<String>>) -> Dynamic {
    value.map_or(Dynamic::UNIT, |value| Dynamic::from(value.into()))
}

fn symbol(session: &SessionHandle, name: &str) -> Dynamic {
    optional(session.read(|state| state.symbol(name)))
}

fn add_header(session: &SessionHandle, name: &str, value: &str) -> i64 {
    match session.add_header(name, value) {
        Ok(()) => {
            tracing::debug!(name, value, "header added");
            MI_SUCCESS
        }
        Err(error) => {
            tracing::warn!(name, value, %error, "failed to add header");
            MI_FAILURE
        }
    }
}

/// The `session` object bound in every session handler.
#[rhai::plugin::export_module]
pub mod session {
    /// IP address of the client.
    #[rhai_fn(global, get = "client_ipaddr", pure)]
    pub fn client_ipaddr(session: &mut SessionHandle) -> String {
        session.read(|state| state.record().connection().ipaddr().to_string())
    }

    /// Host name of the client, as resolved by the MTA.
    #[rhai_fn(global, get = "client_hostname", pure)]
    pub fn client_hostname(session: &mut SessionHandle) -> String {
        session.read(|state| state.record().connection().hostname().to_string())
    }

    /// Name of the MTA daemon that accepted the connection.
    #[rhai_fn(global, get = "client_daemon", pure)]
    pub fn client_daemon(session: &mut SessionHandle) -> Dynamic {
        super::optional(session.read(|state| {
            state.record().connection().daemon().map(str::to_string)
        }))
    }

    /// Name of the phase running the handler, e.g. "envfrom".
    #[rhai_fn(global, get = "handler_phase_name", pure)]
    pub fn handler_phase_name(session: &mut SessionHandle) -> String {
        session.read(|state| state.phase().to_string())
    }

    #[rhai_fn(global, get = "helo_hostname", pure)]
    pub fn helo_hostname(session: &mut SessionHandle) -> Dynamic {
        super::optional(session.read(|state| state.record().helo_hostname().map(str::to_string)))
    }

    /// Argument of `MAIL FROM` for the current transaction.
    #[rhai_fn(global, get = "envelope_from", pure)]
    pub fn envelope_from(session: &mut SessionHandle) -> Dynamic {
        super::optional(session.read(|state| state.record().envelope_from().map(str::to_string)))
    }

    /// The last recipient of the current transaction.
    #[rhai_fn(global, get = "envelope_to", pure)]
    pub fn envelope_to(session: &mut SessionHandle) -> Dynamic {
        super::optional(session.read(|state| state.record().envelope_to().map(str::to_string)))
    }

    /// Seconds since the unix epoch at which the message was received, set at end of message.
    #[rhai_fn(global, get = "receive_time", pure)]
    pub fn receive_time(session: &mut SessionHandle) -> Dynamic {
        session
            .read(|state| state.record().receive_time())
            .and_then(|at| at.duration_since(std::time::UNIX_EPOCH).ok())
            .and_then(|elapsed| rhai::INT::try_from(elapsed.as_secs()).ok())
            .map_or(Dynamic::UNIT, Dynamic::from)
    }

    /// The header of the current `header` call, as a single entry map.
    #[rhai_fn(global, get = "header", pure)]
    pub fn header(session: &mut SessionHandle) -> Dynamic {
        match session.call() {
            CallData::Header { name, value } => {
                let mut header = rhai::Map::new();
                header.insert(name.as_str().into(), value.clone().into());
                header.into()
            }
            _ => Dynamic::UNIT,
        }
    }

    /// The body chunk of the current `body` call.
    #[rhai_fn(global, get = "body", pure)]
    pub fn body(session: &mut SessionHandle) -> Dynamic {
        match session.call() {
            CallData::Body(chunk) => Dynamic::from_blob(chunk.clone()),
            _ => Dynamic::UNIT,
        }
    }

    /// The command of the current `unknown` call.
    #[rhai_fn(global, get = "unknown_command", pure)]
    pub fn unknown_command(session: &mut SessionHandle) -> Dynamic {
        match session.call() {
            CallData::Unknown(command) => command.clone().into(),
            _ => Dynamic::UNIT,
        }
    }

    #[rhai_fn(global, get = "auth_type", pure)]
    pub fn auth_type(session: &mut SessionHandle) -> Dynamic {
        super::symbol(session, "{auth_type}")
    }

    #[rhai_fn(global, get = "auth_authen", pure)]
    pub fn auth_authen(session: &mut SessionHandle) -> Dynamic {
        super::symbol(session, "{auth_authen}")
    }

    #[rhai_fn(global, get = "auth_author", pure)]
    pub fn auth_author(session: &mut SessionHandle) -> Dynamic {
        super::symbol(session, "{auth_author}")
    }

    #[rhai_fn(global, get = "cipher", pure)]
    pub fn cipher(session: &mut SessionHandle) -> Dynamic {
        super::symbol(session, "{cipher}")
    }

    #[rhai_fn(global, get = "cipher_bits", pure)]
    pub fn cipher_bits(session: &mut SessionHandle) -> Dynamic {
        super::symbol(session, "{cipher_bits}")
    }

    #[rhai_fn(global, get = "cert_subject", pure)]
    pub fn cert_subject(session: &mut SessionHandle) -> Dynamic {
        super::symbol(session, "{cert_subject}")
    }

    #[rhai_fn(global, get = "cert_issuer", pure)]
    pub fn cert_issuer(session: &mut SessionHandle) -> Dynamic {
        super::symbol(session, "{cert_issuer}")
    }

    #[rhai_fn(global, get = "tls_version", pure)]
    pub fn tls_version(session: &mut SessionHandle) -> Dynamic {
        super::symbol(session, "{tls_version}")
    }

    /// Host name of the MTA.
    #[rhai_fn(global, get = "myhostname", pure)]
    pub fn myhostname(session: &mut SessionHandle) -> Dynamic {
        super::symbol(session, "j")
    }

    /// Queue identifier of the message given by the MTA.
    #[rhai_fn(global, get = "message_id", pure)]
    pub fn message_id(session: &mut SessionHandle) -> Dynamic {
        super::symbol(session, "i")
    }

    #[rhai_fn(global, get = "mail_addr", pure)]
    pub fn mail_addr(session: &mut SessionHandle) -> Dynamic {
        super::symbol(session, "{mail_addr}")
    }

    #[rhai_fn(global, get = "rcpt_addr", pure)]
    pub fn rcpt_addr(session: &mut SessionHandle) -> Dynamic {
        super::symbol(session, "{rcpt_addr}")
    }

    /// The verdict of the current phase.
    #[rhai_fn(global, get = "status", pure)]
    pub fn get_status(session: &mut SessionHandle) -> Verdict {
        session.read(crate::session::SessionState::verdict)
    }

    /// Set the verdict of the current phase. `pmilter::ALL_OPTS` is refused.
    ///
    /// # Examples
    ///
    /// ```js
    /// if session.envelope_from == "<spammer@example.com>" {
    ///     session.status = pmilter::REJECT;
    /// }
    /// ```
    #[rhai_fn(global, set = "status")]
    pub fn set_status(session: &mut SessionHandle, verdict: Verdict) {
        session.write(|state| state.set_verdict(verdict));
    }

    /// Set the verdict of the current phase with a `SMFIS_*` code.
    ///
    /// Unknown codes and `SMFIS_ALL_OPTS` are ignored.
    #[rhai_fn(global, set = "status")]
    pub fn set_status_code(session: &mut SessionHandle, code: rhai::INT) {
        match Verdict::try_from(code) {
            Ok(verdict) => session.write(|state| state.set_verdict(verdict)),
            Err(error) => tracing::warn!(%error, "status left unchanged"),
        }
    }

    /// Add a header to the message, only available at end of message.
    ///
    /// Returns `0` when the MTA accepted the header, `-1` otherwise.
    #[rhai_fn(global, pure)]
    pub fn add_header(session: &mut SessionHandle, name: &str, value: &str) -> rhai::INT {
        super::add_header(session, name, value)
    }

    /// Headers of the message, write only: `session.headers["X-Name"] = "value"`.
    #[rhai_fn(global, get = "headers", pure)]
    pub fn headers(session: &mut SessionHandle) -> HeaderWriter {
        HeaderWriter(session.clone())
    }

    /// Write-back of `session.headers[..] = ..`, the header is already sent.
    #[rhai_fn(global, set = "headers")]
    #[allow(clippy::needless_pass_by_value)]
    pub fn set_headers(_session: &mut SessionHandle, _headers: HeaderWriter) {}

    #[rhai_fn(global, index_set)]
    pub fn set_header(headers: &mut HeaderWriter, name: &str, value: &str) {
        super::add_header(&headers.0, name, value);
    }

    #[rhai_fn(global, name = "to_string", pure)]
    pub fn to_string(session: &mut SessionHandle) -> String {
        session.read(|state| {
            format!(
                "session({}, {})",
                state.record().connection().ipaddr(),
                state.phase()
            )
        })
    }

    #[rhai_fn(global, name = "to_debug", pure)]
    pub fn to_debug(session: &mut SessionHandle) -> String {
        session.read(|state| format!("{:?}", state.record()))
    }
}
