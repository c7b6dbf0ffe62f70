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

mod logging;

pub use logging::SCRIPT_TARGET;

/// Error produced by Rust API function calls.
pub type Result<T> = std::result::Result<T, Box<rhai::EvalAltResult>>;

/// Data shared between a rule engine's caller and the scripts it runs.
/// This is used to easily read and write the content without boilerplate.
#[derive(Debug)]
pub struct State<T>(rhai::Shared<rhai::Locked<T>>);

// Needed because the base implementation of the `Clone` derive macro adds the trait to ALL
// generic types. (thus, forcing `T` to be clone, which is not what we want)
impl<T> Clone for State<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> From<T> for State<T> {
    fn from(value: T) -> Self {
        Self(rhai::Shared::new(rhai::Locked::new(value)))
    }
}

impl<T> State<T> {
    /// Read the value of the state.
    pub fn read<O>(&self, f: impl FnOnce(&T) -> O) -> O {
        f(&self.0.read().unwrap_or_else(std::sync::PoisonError::into_inner))
    }

    /// Write to the state.
    pub fn write<O>(&self, f: impl FnOnce(&mut T) -> O) -> O {
        f(&mut self
            .0
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner))
    }

    /// Number of handles on this state, the caller's included.
    #[must_use]
    pub fn handles(&self) -> usize {
        rhai::Shared::strong_count(&self.0)
    }
}

/// Static modules available to every script, by namespace.
#[must_use]
pub fn script_modules() -> [(String, rhai::Shared<rhai::Module>); 1] {
    [(
        "log".to_string(),
        rhai::exported_module!(logging::logging).into(),
    )]
}
