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

//! Glue between the `indymilter` runtime and the [`Milter`] dispatcher.

use crate::{
    config::ListenAddress, Capabilities, Milter, PeerAddress, ProtocolContext, ProtocolError,
    Session, Verdict, SYMBOLS,
};
use indymilter::{
    Actions, Callbacks, Context, ContextActions, EomContext, MacroStage, Macros,
    NegotiateContext, ProtoOpts, SocketInfo, Status,
};
use std::ffi::{CStr, CString};
use std::sync::Arc;

/// A header addition asked by an end-of-message handler, waiting for the MTA's answer.
#[derive(Debug)]
struct HeaderRequest {
    name: String,
    value: String,
    reply: tokio::sync::oneshot::Sender<Result<(), ProtocolError>>,
}

/// What handlers see of the milter connection.
///
/// Symbols are copied from the runtime before each callback. Header additions
/// go through a channel only open while the end-of-message callback runs.
#[derive(Debug, Default)]
pub struct IndyContext {
    symbols: std::sync::RwLock<std::collections::HashMap<String, String>>,
    headers: std::sync::Mutex<Option<tokio::sync::mpsc::Sender<HeaderRequest>>>,
}

impl IndyContext {
    fn refresh(&self, macros: &Macros) {
        let symbols = SYMBOLS
            .iter()
            .filter_map(|name| {
                let key = CString::new(*name).ok()?;
                let value = macros.get(&key)?;
                Some(((*name).to_string(), value.to_string_lossy().into_owned()))
            })
            .collect();

        *self
            .symbols
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = symbols;
    }

    fn open_headers(&self, sender: tokio::sync::mpsc::Sender<HeaderRequest>) {
        *self
            .headers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(sender);
    }

    fn close_headers(&self) {
        self.headers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
    }
}

impl ProtocolContext for IndyContext {
    fn symbol(&self, name: &str) -> Option<String> {
        self.symbols
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Blocks until the MTA answered, must be called from a blocking task.
    fn add_header(&self, name: &str, value: &str) -> Result<(), ProtocolError> {
        let sender = self
            .headers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
            .ok_or(ProtocolError::NotAtEndOfMessage)?;

        let (reply, answer) = tokio::sync::oneshot::channel();
        sender
            .blocking_send(HeaderRequest {
                name: name.to_string(),
                value: value.to_string(),
                reply,
            })
            .map_err(|_| ProtocolError::Disconnected)?;

        answer
            .blocking_recv()
            .map_err(|_| ProtocolError::Disconnected)?
    }
}

/// Per connection data kept by the runtime.
#[derive(Debug, Default)]
pub struct Connection {
    protocol: Arc<IndyContext>,
    session: Option<Session>,
}

impl From<Verdict> for Status {
    fn from(value: Verdict) -> Self {
        match value {
            Verdict::Continue => Self::Continue,
            Verdict::Reject => Self::Reject,
            Verdict::Discard => Self::Discard,
            Verdict::Accept => Self::Accept,
            Verdict::Tempfail => Self::Tempfail,
            Verdict::Skip => Self::Skip,
            Verdict::AllOpts => Self::AllOpts,
            // The runtime does not let callbacks suppress their reply.
            Verdict::Noreply => Self::Continue,
        }
    }
}

fn lossy(value: &CStr) -> String {
    value.to_string_lossy().into_owned()
}

fn args(values: &[CString]) -> Vec<String> {
    values.iter().map(|value| lossy(value)).collect()
}

/// Run a dispatcher call from an async callback, refreshing the symbols first.
fn call(
    context: &mut Context<Connection>,
    f: impl FnOnce(&mut Option<Session>) -> Verdict,
) -> Status {
    let Some(connection) = context.data.as_mut() else {
        tracing::warn!("callback without negotiation");
        return Status::Tempfail;
    };

    connection.protocol.refresh(&context.macros);
    tokio::task::block_in_place(|| f(&mut connection.session)).into()
}

/// Actions asked back from the MTA: the agreed ones, plus header additions.
fn requested_actions(agreed: &Capabilities) -> Actions {
    Actions::from_bits_truncate(agreed.actions) | Actions::ADD_HEADER
}

/// Protocol steps are left to the runtime, which enables those having a callback.
async fn negotiate(
    milter: Arc<Milter>,
    context: &mut NegotiateContext<Connection>,
    actions: Actions,
    protocol: ProtoOpts,
) -> Status {
    // The runtime does not expose the reserved words.
    let (verdict, agreed) = milter.negotiate(Capabilities {
        actions: actions.bits(),
        protocol: protocol.bits(),
        reserved: [0; 2],
    });

    context.requested_actions |= requested_actions(&agreed);
    for (stage, symbols) in [
        (MacroStage::Connect, c"{daemon_name} {if_name} {if_addr} j _"),
        (
            MacroStage::Helo,
            c"{tls_version} {cipher} {cipher_bits} {cert_subject} {cert_issuer}",
        ),
        (
            MacroStage::Mail,
            c"i {auth_type} {auth_authen} {auth_ssf} {auth_author} {mail_mailer} {mail_host} {mail_addr}",
        ),
        (MacroStage::Rcpt, c"{rcpt_mailer} {rcpt_host} {rcpt_addr}"),
        (MacroStage::Eom, c"i {msg_id}"),
    ] {
        context.requested_macros.insert(stage, symbols.into());
    }
    context.data = Some(Connection::default());

    verdict.into()
}

fn peer_address(socket: SocketInfo) -> PeerAddress {
    match socket {
        SocketInfo::Inet(address) => PeerAddress::Inet(address),
        SocketInfo::Unix(path) => PeerAddress::Unix(lossy(&path).into()),
        SocketInfo::Unknown => PeerAddress::Unknown,
    }
}

async fn connect(
    milter: Arc<Milter>,
    context: &mut Context<Connection>,
    hostname: CString,
    socket: SocketInfo,
) -> Status {
    let address = peer_address(socket);
    let hostname = lossy(&hostname);
    let protocol = context
        .data
        .as_ref()
        .map(|connection| connection.protocol.clone());

    let Some(protocol) = protocol else {
        return Status::Tempfail;
    };

    call(context, |slot| milter.connect(slot, &hostname, address, protocol))
}

/// Run the end-of-message handler on a blocking task, applying its header
/// additions as they come.
async fn eom(milter: Arc<Milter>, context: &mut EomContext<Connection>) -> Status {
    let Some(connection) = context.data.as_mut() else {
        return Status::Tempfail;
    };

    connection.protocol.refresh(&context.macros);
    let protocol = connection.protocol.clone();
    let mut slot = connection.session.take();

    let (sender, mut requests) = tokio::sync::mpsc::channel::<HeaderRequest>(1);
    protocol.open_headers(sender);

    let mut handler = tokio::task::spawn_blocking(move || {
        let verdict = milter.eom(&mut slot);
        (slot, verdict)
    });

    let joined = loop {
        tokio::select! {
            joined = &mut handler => break joined,
            Some(request) = requests.recv() => {
                let result = context
                    .actions
                    .add_header(request.name, request.value)
                    .await
                    .map_err(|error| ProtocolError::Refused(error.to_string()));

                if request.reply.send(result).is_err() {
                    tracing::warn!("handler left before the header was added");
                }
            }
        }
    };

    protocol.close_headers();

    match joined {
        Ok((slot, verdict)) => {
            if let Some(connection) = context.data.as_mut() {
                connection.session = slot;
            }
            verdict.into()
        }
        Err(error) => {
            tracing::error!(%error, "end of message handler did not complete");
            Status::Tempfail
        }
    }
}

/// The callback table of the milter.
#[must_use]
pub fn callbacks(milter: &Arc<Milter>) -> Callbacks<Connection> {
    let callbacks = Callbacks::new()
        .on_negotiate({
            let milter = milter.clone();
            move |cx, actions, opts| Box::pin(negotiate(milter.clone(), cx, actions, opts))
        })
        .on_connect({
            let milter = milter.clone();
            move |cx, hostname, socket| Box::pin(connect(milter.clone(), cx, hostname, socket))
        })
        .on_eom({
            let milter = milter.clone();
            move |cx| Box::pin(eom(milter.clone(), cx))
        });

    let milter = milter.clone();
    callbacks
        .on_helo({
            let milter = milter.clone();
            move |cx, hostname| {
                let milter = milter.clone();
                Box::pin(async move { call(cx, |slot| milter.helo(slot, &lossy(&hostname))) })
            }
        })
        .on_mail({
            let milter = milter.clone();
            move |cx, values| {
                let milter = milter.clone();
                Box::pin(async move { call(cx, |slot| milter.envfrom(slot, &args(&values))) })
            }
        })
        .on_rcpt({
            let milter = milter.clone();
            move |cx, values| {
                let milter = milter.clone();
                Box::pin(async move { call(cx, |slot| milter.envrcpt(slot, &args(&values))) })
            }
        })
        .on_data({
            let milter = milter.clone();
            move |cx| {
                let milter = milter.clone();
                Box::pin(async move { call(cx, |slot| milter.data(slot)) })
            }
        })
        .on_header({
            let milter = milter.clone();
            move |cx, name, value| {
                let milter = milter.clone();
                Box::pin(async move {
                    call(cx, |slot| milter.header(slot, &lossy(&name), &lossy(&value)))
                })
            }
        })
        .on_eoh({
            let milter = milter.clone();
            move |cx| {
                let milter = milter.clone();
                Box::pin(async move { call(cx, |slot| milter.eoh(slot)) })
            }
        })
        .on_body({
            let milter = milter.clone();
            move |cx, chunk| {
                let milter = milter.clone();
                Box::pin(async move { call(cx, |slot| milter.body(slot, chunk.as_ref())) })
            }
        })
        .on_abort({
            let milter = milter.clone();
            move |cx| {
                let milter = milter.clone();
                Box::pin(async move { call(cx, |slot| milter.abort(slot)) })
            }
        })
        .on_close({
            let milter = milter.clone();
            move |cx| {
                let milter = milter.clone();
                Box::pin(async move { call(cx, |slot| milter.close(slot)) })
            }
        })
        .on_unknown(move |cx, command| {
            let milter = milter.clone();
            Box::pin(async move { call(cx, |slot| milter.unknown(slot, &lossy(&command))) })
        })
}

#[derive(Debug, thiserror::Error)]
pub enum ListenError {
    #[error("cannot resolve `{address}`: {source}")]
    Resolve {
        address: ListenAddress,
        #[source]
        source: std::io::Error,
    },
    #[error("`{0}` does not resolve to any address")]
    NoAddress(ListenAddress),
    #[error("cannot listen on `{address}`: {source}")]
    Bind {
        address: ListenAddress,
        #[source]
        source: std::io::Error,
    },
}

/// A bound milter socket.
#[derive(Debug)]
pub enum Listener {
    Tcp(tokio::net::TcpListener),
    Unix(tokio::net::UnixListener),
}

/// Bind the milter socket. A file left at the path of a unix socket is removed first.
pub fn bind(address: &ListenAddress, backlog: u32) -> Result<Listener, ListenError> {
    let bind_error = |source| ListenError::Bind {
        address: address.clone(),
        source,
    };

    match address {
        ListenAddress::Inet { host, port } | ListenAddress::Inet6 { host, port } => {
            let socket_address = std::net::ToSocketAddrs::to_socket_addrs(&(host.as_str(), *port))
                .map_err(|source| ListenError::Resolve {
                    address: address.clone(),
                    source,
                })?
                .find(|candidate| {
                    matches!(address, ListenAddress::Inet { .. }) == candidate.is_ipv4()
                })
                .ok_or_else(|| ListenError::NoAddress(address.clone()))?;

            let socket = if socket_address.is_ipv4() {
                tokio::net::TcpSocket::new_v4()
            } else {
                tokio::net::TcpSocket::new_v6()
            }
            .map_err(bind_error)?;

            socket.set_reuseaddr(true).map_err(bind_error)?;
            socket.bind(socket_address).map_err(bind_error)?;
            socket.listen(backlog).map(Listener::Tcp).map_err(bind_error)
        }
        ListenAddress::Unix(path) => {
            match std::fs::remove_file(path) {
                Ok(()) => tracing::debug!(path = %path.display(), "removed stale socket"),
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
                Err(error) => return Err(bind_error(error)),
            }

            tokio::net::UnixListener::bind(path)
                .map(Listener::Unix)
                .map_err(bind_error)
        }
    }
}

/// Serve milter connections until `shutdown` completes.
pub async fn serve(
    milter: Arc<Milter>,
    listener: Listener,
    shutdown: impl std::future::Future + Send,
) -> std::io::Result<()> {
    let mut config = indymilter::Config::default();
    config.connection_timeout = milter.config().server.timeout;

    let callbacks = callbacks(&milter);

    match listener {
        Listener::Tcp(listener) => indymilter::run(listener, callbacks, config, shutdown).await,
        Listener::Unix(listener) => indymilter::run(listener, callbacks, config, shutdown).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_additions_need_an_open_channel() {
        let context = IndyContext::default();

        assert_eq!(
            context.add_header("X-Filtered", "yes"),
            Err(ProtocolError::NotAtEndOfMessage)
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn header_requests_are_answered_from_the_runtime() {
        let context = Arc::new(IndyContext::default());
        let (sender, mut requests) = tokio::sync::mpsc::channel(1);
        context.open_headers(sender);

        let handler = tokio::task::spawn_blocking({
            let context = context.clone();
            move || {
                (
                    context.add_header("X-Filtered", "yes"),
                    context.add_header("X-Spam", "no"),
                )
            }
        });

        let first = requests.recv().await.unwrap();
        assert_eq!((first.name.as_str(), first.value.as_str()), ("X-Filtered", "yes"));
        first.reply.send(Ok(())).unwrap();

        let second = requests.recv().await.unwrap();
        assert_eq!((second.name.as_str(), second.value.as_str()), ("X-Spam", "no"));
        second
            .reply
            .send(Err(ProtocolError::Refused("action not negotiated".to_string())))
            .unwrap();

        let (first, second) = handler.await.unwrap();
        assert_eq!(first, Ok(()));
        assert_eq!(
            second,
            Err(ProtocolError::Refused("action not negotiated".to_string()))
        );

        context.close_headers();
        assert_eq!(
            context.add_header("X-Late", "yes"),
            Err(ProtocolError::NotAtEndOfMessage)
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn header_requests_without_a_runtime_are_disconnected() {
        let context = Arc::new(IndyContext::default());
        let (sender, requests) = tokio::sync::mpsc::channel(1);
        context.open_headers(sender);
        drop(requests);

        let closed = tokio::task::spawn_blocking({
            let context = context.clone();
            move || context.add_header("X-Filtered", "yes")
        });
        assert_eq!(closed.await.unwrap(), Err(ProtocolError::Disconnected));

        let (sender, mut requests) = tokio::sync::mpsc::channel(1);
        context.open_headers(sender);

        let unanswered = tokio::task::spawn_blocking({
            let context = context.clone();
            move || context.add_header("X-Filtered", "yes")
        });
        drop(requests.recv().await.unwrap());
        assert_eq!(unanswered.await.unwrap(), Err(ProtocolError::Disconnected));
    }

    #[test]
    fn peer_addresses_from_the_runtime() {
        let inet = "192.0.2.10:25".parse().unwrap();

        assert_eq!(peer_address(SocketInfo::Inet(inet)), PeerAddress::Inet(inet));
        assert_eq!(
            peer_address(SocketInfo::Unix(CString::new("/run/mta/milter.sock").unwrap())),
            PeerAddress::Unix("/run/mta/milter.sock".into())
        );
        assert_eq!(peer_address(SocketInfo::Unknown), PeerAddress::Unknown);
    }

    #[test]
    fn agreed_actions_are_requested_with_header_additions() {
        let agreed = Capabilities {
            actions: (Actions::ADD_RCPT | Actions::REPLACE_BODY).bits(),
            ..Capabilities::default()
        };

        assert_eq!(
            requested_actions(&agreed),
            Actions::ADD_RCPT | Actions::REPLACE_BODY | Actions::ADD_HEADER
        );
        assert_eq!(
            requested_actions(&Capabilities::default()),
            Actions::ADD_HEADER
        );
    }

    #[test]
    fn verdicts_translate_to_runtime_statuses() {
        assert!(matches!(Status::from(Verdict::Reject), Status::Reject));
        assert!(matches!(Status::from(Verdict::Tempfail), Status::Tempfail));
        assert!(matches!(Status::from(Verdict::Noreply), Status::Continue));
    }

    #[tokio::test]
    async fn stale_unix_sockets_are_replaced() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("pmilter.sock");
        std::fs::write(&path, b"").unwrap();

        let listener = bind(&ListenAddress::Unix(path.clone()), 16).unwrap();

        assert!(matches!(listener, Listener::Unix(_)));
    }

    #[tokio::test]
    async fn tcp_listener_on_a_random_port() {
        let listener = bind(
            &ListenAddress::Inet {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            16,
        )
        .unwrap();

        let Listener::Tcp(listener) = listener else {
            panic!("expected a tcp listener");
        };
        assert!(listener.local_addr().unwrap().ip().is_loopback());
    }
}
