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

/// "Hooks" used to identify which handler a rule engine is running.
pub trait Stage:
    std::fmt::Debug + Copy + Clone + Eq + std::fmt::Display + std::str::FromStr + Send + Sync
{
    /// Return the name under which the handler of this stage is configured.
    fn hook(&self) -> &'static str;
}
