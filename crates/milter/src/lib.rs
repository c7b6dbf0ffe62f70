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

//! A programmable mail filter: every milter callback of a connection can run a
//! rhai handler that decides what the MTA does next.

/// Functions and constants available to handlers.
pub mod api;
/// Service configuration and command line.
pub mod config;
/// Maps milter callbacks to handlers.
pub mod dispatcher;
pub mod phase;
/// Handler run once the configuration is loaded.
pub mod postconfig;
/// What the MTA offers to handlers.
pub mod protocol;
/// Data recorded from the connection and the current transaction.
pub mod record;
/// `indymilter` integration.
pub mod runtime;
pub mod session;
pub mod verdict;

pub use config::MilterConfig;
pub use dispatcher::{Capabilities, Milter, SESSION_BINDING};
pub use phase::Phase;
pub use postconfig::{ConfigHandler, PostConfigError};
pub use protocol::{ProtocolContext, ProtocolError, SYMBOLS};
pub use record::{ConnectError, ConnectionInfo, PeerAddress, TransactionRecord};
pub use session::{CallData, Session, SessionHandle, SessionState, MI_FAILURE, MI_SUCCESS};
pub use verdict::Verdict;
