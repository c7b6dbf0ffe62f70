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

use pmilter::{
    config::{cli::Args, MilterConfig},
    runtime, ConfigHandler, Milter,
};
use pmilter_config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::prelude::*;
    let args = <Args as clap::Parser>::parse();

    let config = MilterConfig::from_rhai_file(&args.config).map_err(|error| {
        eprintln!("Failed to load the configuration of pmilter: {error}");
        error
    })?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(config.logs().targets()))
        .try_init()?;

    std::panic::set_hook(Box::new(|e| {
        tracing::error!(?e, "a panic occurred");
    }));

    let milter = std::sync::Arc::new(Milter::new(config));

    // Lives as long as the process.
    let _config_handler = match milter.engine_config() {
        Some(engine_config) => {
            let mut handler = ConfigHandler::new(engine_config.clone());
            handler.run(milter.config()).map_err(|error| {
                tracing::error!(%error, "post-config handler failed");
                error
            })?;
            Some(handler)
        }
        None => None,
    };

    let listen = &milter.config().server.listen;
    let listener = runtime::bind(listen, milter.config().server.backlog).map_err(|error| {
        tracing::error!(%error, "cannot open the milter socket");
        error
    })?;

    tracing::info!(%listen, scripting = milter.config().server.scripting, "pmilter is listening");
    runtime::serve(milter.clone(), listener, tokio::signal::ctrl_c()).await?;
    tracing::info!("pmilter has stopped");

    Ok(())
}
