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

//! Functions and constants available to handlers.

mod pmilter;
mod session;

pub use pmilter::NAME;

/// Modules registered in the global namespace: the `session` object and verdict operators.
#[must_use]
pub fn global_modules() -> [rhai::Shared<rhai::Module>; 2] {
    [
        rhai::exported_module!(session::session).into(),
        rhai::exported_module!(pmilter::verdict).into(),
    ]
}

/// Modules accessed with a namespace, `pmilter::REJECT` for instance.
#[must_use]
pub fn static_modules() -> [(String, rhai::Shared<rhai::Module>); 1] {
    let mut module = rhai::exported_module!(pmilter::pmilter);
    module.combine(pmilter::mutation_actions());

    [(NAME.to_string(), module.into())]
}
