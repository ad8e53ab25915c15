/*
 * SPDX-FileCopyrightText: 2024 Relay Service Contributors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Binary entrypoint: loads `Config` from the environment (§6.4), wires a
//! `common::Server`, and runs the housekeeper and HTTP/WebSocket listener
//! side by side until `ctrl_c`, at which point both are given
//! `drain_deadline` to finish in-flight work before the process exits.

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

use tokio::sync::watch;
use trc::IntoErr;
use utils::config::Config;

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    trc::init_logging(config.log_level);

    let server = common::Server::new(config.clone());

    let listener = match listener::bind(&config).await {
        Ok(listener) => listener,
        Err(err) => {
            trc::ListenerEvent::BindError
                .into_err()
                .ctx("address", format!("{}:{}", config.bind_address, config.port))
                .ctx("error", err.to_string())
                .with_location(trc::location!())
                .emit();
            std::process::exit(1);
        }
    };

    tracing::info!(
        bind_address = %config.bind_address,
        port = config.port,
        ws_path = %config.ws_path,
        "relay listening"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let housekeeper = tokio::spawn({
        let server = server.clone();
        let shutdown_rx = shutdown_rx.clone();
        async move { server.run_housekeeper(shutdown_rx).await }
    });

    let serve = tokio::spawn({
        let server = server.clone();
        async move { listener::serve(listener, server, shutdown_rx).await }
    });

    if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!("failed to install ctrl-c handler, shutting down immediately");
    }
    tracing::info!("shutdown signal received, draining in-flight connections");
    let _ = shutdown_tx.send(true);

    let drain = async {
        let _ = housekeeper.await;
        let _ = serve.await;
    };
    if tokio::time::timeout(config.drain_deadline, drain).await.is_err() {
        tracing::warn!("drain deadline elapsed before all tasks finished");
    }
}
