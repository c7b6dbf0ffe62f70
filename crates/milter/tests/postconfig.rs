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

mod common;

use common::inline;
use pmilter::{
    config::{ConfigHandlers, Handlers, Server},
    ConfigHandler, Milter, MilterConfig, PostConfigError,
};
use pmilter_rule_engine::{HandlerError, ScriptSource};

fn handler(postconfig: Option<ScriptSource>) -> (Milter, ConfigHandler) {
    let milter = Milter::new(MilterConfig {
        server: Server {
            scripting: true,
            backlog: 64,
            ..Default::default()
        },
        handler: Handlers {
            config: ConfigHandlers { postconfig },
            ..Default::default()
        },
        ..Default::default()
    });
    let handler = ConfigHandler::new(milter.engine_config().unwrap().clone());

    (milter, handler)
}

#[test]
fn nothing_to_run() {
    let (milter, mut handler) = handler(None);

    assert!(handler.run(milter.config()).is_ok());
}

#[test]
fn configuration_is_bound() {
    let (milter, mut handler) = handler(inline(
        r#"
        if config.server.backlog != 64 { throw "backlog" }
        if config.server.listen != "inet:10025@127.0.0.1" { throw "listen" }
        log::info(`post-config ran with ${config.server.timeout}`);
    "#,
    ));

    handler.run(milter.config()).unwrap();
}

#[test]
fn runtime_error_is_reported() {
    let (milter, mut handler) = handler(inline(r#"throw "not ready""#));

    assert!(matches!(
        handler.run(milter.config()),
        Err(PostConfigError::Handler(HandlerError::Runtime { .. }))
    ));
}

#[test]
fn compile_error_is_reported() {
    let (milter, mut handler) = handler(inline("let = ;"));

    assert!(matches!(
        handler.run(milter.config()),
        Err(PostConfigError::Handler(HandlerError::Compile(_)))
    ));
}
