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

use crate::Verdict;
#[allow(unused_imports)]
use rhai::plugin::{
    mem, Dynamic, FnAccess, FnNamespace, ImmutableString, Module, NativeCallContext,
    PluginFunction, RhaiResult, TypeId,
};

/// Name of the filter, returned by `pmilter::name()`.
pub const NAME: &str = "pmilter";

/// Verdicts and libmilter codes.
///
/// ```js
/// session.status = pmilter::TEMPFAIL;
/// session.status = pmilter::SMFIS_REJECT;
/// ```
#[rhai::plugin::export_module]
pub mod pmilter {
    pub const CONTINUE: Verdict = Verdict::Continue;
    pub const REJECT: Verdict = Verdict::Reject;
    pub const DISCARD: Verdict = Verdict::Discard;
    pub const ACCEPT: Verdict = Verdict::Accept;
    pub const TEMPFAIL: Verdict = Verdict::Tempfail;
    pub const NOREPLY: Verdict = Verdict::Noreply;
    pub const SKIP: Verdict = Verdict::Skip;
    pub const ALL_OPTS: Verdict = Verdict::AllOpts;

    pub const SMFIS_CONTINUE: rhai::INT = 0;
    pub const SMFIS_REJECT: rhai::INT = 1;
    pub const SMFIS_DISCARD: rhai::INT = 2;
    pub const SMFIS_ACCEPT: rhai::INT = 3;
    pub const SMFIS_TEMPFAIL: rhai::INT = 4;
    pub const SMFIS_NOREPLY: rhai::INT = 7;
    pub const SMFIS_SKIP: rhai::INT = 8;
    pub const SMFIS_ALL_OPTS: rhai::INT = 10;

    pub const MI_SUCCESS: rhai::INT = crate::session::MI_SUCCESS;
    pub const MI_FAILURE: rhai::INT = crate::session::MI_FAILURE;

    #[must_use]
    pub fn name() -> ImmutableString {
        super::NAME.into()
    }
}

/// Operators of the `Verdict` type.
#[rhai::plugin::export_module]
pub mod verdict {
    /// The `SMFIS_*` code of a verdict.
    #[rhai_fn(global, get = "code", pure)]
    pub fn code(verdict: &mut Verdict) -> rhai::INT {
        verdict.code()
    }

    #[rhai_fn(global, name = "==", pure)]
    pub fn eq(verdict: &mut Verdict, other: Verdict) -> bool {
        *verdict == other
    }

    #[rhai_fn(global, name = "!=", pure)]
    pub fn neq(verdict: &mut Verdict, other: Verdict) -> bool {
        *verdict != other
    }

    #[rhai_fn(global, name = "to_string", pure)]
    pub fn to_string(verdict: &mut Verdict) -> String {
        verdict.to_string()
    }

    #[rhai_fn(global, name = "to_debug", pure)]
    pub fn to_debug(verdict: &mut Verdict) -> String {
        format!("{verdict:?}")
    }
}

/// The `SMFIR_*` action codes, registered next to the verdicts.
#[must_use]
pub fn mutation_actions() -> rhai::Module {
    let mut module = rhai::Module::new();

    for (name, code) in crate::verdict::MUTATION_ACTIONS {
        module.set_var(name, rhai::INT::from(code));
    }

    module
}
