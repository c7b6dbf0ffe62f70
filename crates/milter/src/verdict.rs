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

use pmilter_rule_engine::{HandlerError, Status};

/// Outcome of a phase, handed back to the MTA.
///
/// The discriminants are the libmilter `SMFIS_*` codes.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Verdict {
    #[default]
    Continue = 0,
    Reject = 1,
    Discard = 2,
    Accept = 3,
    Tempfail = 4,
    Noreply = 7,
    Skip = 8,
    AllOpts = 10,
}

impl Verdict {
    /// The libmilter code of this verdict.
    #[must_use]
    pub const fn code(self) -> i64 {
        self as i64
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("`{0}` is not a milter status code")]
pub struct UnknownVerdictCode(pub i64);

impl TryFrom<i64> for Verdict {
    type Error = UnknownVerdictCode;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Continue),
            1 => Ok(Self::Reject),
            2 => Ok(Self::Discard),
            3 => Ok(Self::Accept),
            4 => Ok(Self::Tempfail),
            7 => Ok(Self::Noreply),
            8 => Ok(Self::Skip),
            10 => Ok(Self::AllOpts),
            _ => Err(UnknownVerdictCode(code)),
        }
    }
}

impl Status for Verdict {
    fn next() -> Self {
        Self::Continue
    }

    fn error(_: &HandlerError) -> Self {
        Self::Tempfail
    }
}

/// libmilter `SMFIR_*` reply codes, the byte sent on the wire for each action.
pub const MUTATION_ACTIONS: [(&str, u8); 20] = [
    ("SMFIR_ADDRCPT", b'+'),
    ("SMFIR_DELRCPT", b'-'),
    ("SMFIR_ADDRCPT_PAR", b'2'),
    ("SMFIR_SHUTDOWN", b'4'),
    ("SMFIR_ACCEPT", b'a'),
    ("SMFIR_REPLBODY", b'b'),
    ("SMFIR_CONTINUE", b'c'),
    ("SMFIR_DISCARD", b'd'),
    ("SMFIR_CHGFROM", b'e'),
    ("SMFIR_CONN_FAIL", b'f'),
    ("SMFIR_ADDHEADER", b'h'),
    ("SMFIR_INSHEADER", b'i'),
    ("SMFIR_SETSYMLIST", b'l'),
    ("SMFIR_CHGHEADER", b'm'),
    ("SMFIR_PROGRESS", b'p'),
    ("SMFIR_QUARANTINE", b'q'),
    ("SMFIR_REJECT", b'r'),
    ("SMFIR_SKIP", b's'),
    ("SMFIR_TEMPFAIL", b't'),
    ("SMFIR_REPLYCODE", b'y'),
];

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn codes_round_trip() {
        for verdict in Verdict::iter() {
            assert_eq!(Verdict::try_from(verdict.code()), Ok(verdict));
        }
    }

    #[test]
    fn libmilter_codes() {
        assert_eq!(Verdict::Tempfail.code(), 4);
        assert_eq!(Verdict::Noreply.code(), 7);
        assert_eq!(Verdict::AllOpts.code(), 10);
        assert_eq!(Verdict::try_from(5), Err(UnknownVerdictCode(5)));
    }

    #[test]
    fn defaults_to_continue() {
        assert_eq!(Verdict::default(), Verdict::Continue);
        assert_eq!(<Verdict as Status>::next(), Verdict::Continue);
    }
}
