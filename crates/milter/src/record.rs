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

/// Address of the SMTP client, as reported by the MTA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerAddress {
    Inet(std::net::SocketAddr),
    Unix(std::path::PathBuf),
    Unknown,
}

/// The peer address could not be turned into an IP address.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConnectError {
    #[error("peer address `{0:?}` is not an IPv4 or IPv6 address")]
    UnsupportedAddress(PeerAddress),
}

/// Facts about the connection, fixed at `connect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    address: PeerAddress,
    ipaddr: String,
    hostname: String,
    daemon: Option<String>,
}

impl ConnectionInfo {
    pub fn new(
        address: PeerAddress,
        hostname: impl Into<String>,
        daemon: Option<String>,
    ) -> Result<Self, ConnectError> {
        let ipaddr = match &address {
            PeerAddress::Inet(socket) => socket.ip().to_string(),
            PeerAddress::Unix(_) | PeerAddress::Unknown => {
                return Err(ConnectError::UnsupportedAddress(address))
            }
        };

        Ok(Self {
            address,
            ipaddr,
            hostname: hostname.into(),
            daemon,
        })
    }

    #[must_use]
    pub const fn address(&self) -> &PeerAddress {
        &self.address
    }

    /// The IP address of the client, in its textual form.
    #[must_use]
    pub fn ipaddr(&self) -> &str {
        &self.ipaddr
    }

    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Name of the MTA daemon that accepted the connection.
    #[must_use]
    pub fn daemon(&self) -> Option<&str> {
        self.daemon.as_deref()
    }
}

/// Data recorded along the phases of a connection.
///
/// The envelope and the receive time belong to the current mail transaction
/// and are dropped by [`TransactionRecord::reset_transaction`]; the rest lives
/// as long as the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    connection: ConnectionInfo,
    helo_hostname: Option<String>,
    envelope_from: Option<String>,
    /// Only the last recipient is kept.
    envelope_to: Option<String>,
    receive_time: Option<std::time::SystemTime>,
}

impl TransactionRecord {
    #[must_use]
    pub const fn new(connection: ConnectionInfo) -> Self {
        Self {
            connection,
            helo_hostname: None,
            envelope_from: None,
            envelope_to: None,
            receive_time: None,
        }
    }

    #[must_use]
    pub const fn connection(&self) -> &ConnectionInfo {
        &self.connection
    }

    #[must_use]
    pub fn helo_hostname(&self) -> Option<&str> {
        self.helo_hostname.as_deref()
    }

    #[must_use]
    pub fn envelope_from(&self) -> Option<&str> {
        self.envelope_from.as_deref()
    }

    #[must_use]
    pub fn envelope_to(&self) -> Option<&str> {
        self.envelope_to.as_deref()
    }

    #[must_use]
    pub const fn receive_time(&self) -> Option<std::time::SystemTime> {
        self.receive_time
    }

    pub fn set_helo_hostname(&mut self, hostname: impl Into<String>) {
        self.helo_hostname = Some(hostname.into());
    }

    pub fn set_envelope_from(&mut self, sender: impl Into<String>) {
        self.envelope_from = Some(sender.into());
    }

    pub fn set_envelope_to(&mut self, recipient: impl Into<String>) {
        self.envelope_to = Some(recipient.into());
    }

    pub fn set_receive_time(&mut self, at: std::time::SystemTime) {
        self.receive_time = Some(at);
    }

    /// Forget everything about the current mail transaction.
    pub fn reset_transaction(&mut self) {
        self.envelope_from = None;
        self.envelope_to = None;
        self.receive_time = None;
    }
}
