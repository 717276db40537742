//! Binary entrypoint: loads config, sets up logging, builds the Axum app,
//! and serves `/send`.

use std::{net::SocketAddr, sync::Arc};

use axum::{routing::any, Router};
use dotenvy::dotenv;
use tracing::{debug, info};

mod config;
mod email;
mod logger;
mod routes;

use crate::config::Config;
use crate::email::RelayState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1) Load environment (.env is optional)
    dotenv().ok();

    // 2) Configuration snapshot; the handler never touches the environment.
    let config = Config::from_env();

    // 3) Logging: compact console, optional JSON file sink
    logger::set_logger(
        &config.log_level,
        config.log_to_file,
        config.log_to_stdout,
        &config.log_dir,
        &config.log_file,
    )?;
    debug!("Mail transport: {}", config.transport);

    // 4) Build app state (secret + sender + transport) from the snapshot
    let state = Arc::new(RelayState::from_config(&config));

    // 5) Router. All methods are routed so the handler can answer the JSON
    //    405 body itself.
    let app = Router::new()
        .route("/send", any(routes::relay_mail))
        .with_state(state);

    // 6) Bind address
    let addr: SocketAddr = format!("{}:{}", config.listen_addr, config.listen_port).parse()?;

    info!("Starting server on {addr}");

    // 7) Serve
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
