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

use crate::HandlerError;

/// Values produced by running a handler.
pub trait Status: std::fmt::Debug + Clone + PartialEq + Send + Sync + 'static {
    /// The status a stage starts with, and keeps when no handler overrides it.
    fn next() -> Self;

    /// The status to return when a handler failed to compile or raised an error.
    fn error(error: &HandlerError) -> Self;
}
