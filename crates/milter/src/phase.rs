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

use pmilter_rule_engine::Stage;

/// The milter callbacks a handler can be configured for.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    strum::EnumString,
    strum::Display,
    strum::IntoStaticStr,
    strum::EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum Phase {
    Connect,
    Helo,
    Envfrom,
    Envrcpt,
    Data,
    Header,
    Eoh,
    Body,
    Eom,
    Abort,
    Close,
    Unknown,
}

impl Stage for Phase {
    fn hook(&self) -> &'static str {
        self.into()
    }
}

impl Phase {
    /// Protocol symbols worth dumping when debugging this phase.
    #[must_use]
    pub const fn debug_symbols(self) -> &'static [&'static str] {
        match self {
            Self::Connect => &["{if_name}", "{if_addr}", "j", "_"],
            Self::Helo => &[
                "{tls_version}",
                "{cipher}",
                "{cipher_bits}",
                "{cert_subject}",
                "{cert_issuer}",
            ],
            Self::Envfrom => &[
                "i",
                "{auth_type}",
                "{auth_authen}",
                "{auth_ssf}",
                "{auth_author}",
                "{mail_mailer}",
                "{mail_host}",
                "{mail_addr}",
            ],
            Self::Envrcpt => &["{rcpt_mailer}", "{rcpt_host}", "{rcpt_addr}"],
            Self::Eom => &["{msg_id}"],
            Self::Data
            | Self::Header
            | Self::Eoh
            | Self::Body
            | Self::Abort
            | Self::Close
            | Self::Unknown => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn hooks_are_the_configured_names() {
        let names = Phase::iter().map(|phase| phase.hook()).collect::<Vec<_>>();

        assert_eq!(
            names,
            [
                "connect", "helo", "envfrom", "envrcpt", "data", "header", "eoh", "body", "eom",
                "abort", "close", "unknown",
            ]
        );
        for phase in Phase::iter() {
            assert_eq!(phase.to_string(), phase.hook());
            assert_eq!(phase.hook().parse::<Phase>(), Ok(phase));
        }
    }
}
