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

/// Failures of the operations the MTA offers to the filter.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// Message modifications are only allowed at the end of the message.
    #[error("headers can only be added at end of message")]
    NotAtEndOfMessage,
    #[error("the MTA refused the modification: {0}")]
    Refused(String),
    #[error("the milter connection is gone")]
    Disconnected,
}

/// Symbols (macros) the MTA may send, with the name scripts read them by.
pub const SYMBOLS: [&str; 22] = [
    "j",
    "_",
    "i",
    "{daemon_name}",
    "{if_name}",
    "{if_addr}",
    "{tls_version}",
    "{cipher}",
    "{cipher_bits}",
    "{cert_subject}",
    "{cert_issuer}",
    "{auth_type}",
    "{auth_authen}",
    "{auth_ssf}",
    "{auth_author}",
    "{mail_mailer}",
    "{mail_host}",
    "{mail_addr}",
    "{rcpt_mailer}",
    "{rcpt_host}",
    "{rcpt_addr}",
    "{msg_id}",
];

/// The milter runtime side of a connection.
pub trait ProtocolContext: std::fmt::Debug + Send + Sync {
    /// Value of a symbol sent by the MTA, e.g. `{rcpt_addr}` or `j`.
    fn symbol(&self, name: &str) -> Option<String>;

    /// Ask the MTA to add a header to the message.
    fn add_header(&self, name: &str, value: &str) -> Result<(), ProtocolError>;
}
