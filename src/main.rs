// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `wol-relay` binary: load configuration, start the HTTP control surface,
//! open the relay session and run until interrupted.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_appender::non_blocking::WorkerGuard;

use wol_relay::action::{Dispatcher, SystemActions};
use wol_relay::control::{self, ControlState};
use wol_relay::protocol::{self, Supervisor, TcpConnector};
use wol_relay::{Config, Error, logging};

/// Relay-driven Wake-on-LAN and remote shutdown agent.
#[derive(Parser, Debug)]
#[command(name = "wol-relay", version, about)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "wol-relay.toml", env = "WOL_RELAY_CONFIG")]
    config: PathBuf,

    /// Override the HTTP control port
    #[arg(long)]
    http_port: Option<u16>,

    /// Override the log filter (e.g. `debug`, `wol_relay=trace`)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logging is not up yet, so these failures go to stderr.
    let (config, _guard) = match init(&cli) {
        Ok(started) => started,
        Err(e) => {
            eprintln!("wol-relay: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            ExitCode::FAILURE
        }
    }
}

fn init(cli: &Cli) -> Result<(Config, WorkerGuard), Error> {
    let mut config = Config::load(&cli.config)?;
    if let Some(port) = cli.http_port {
        config.http.port = port;
    }
    let guard = logging::init(&config.log, cli.log_level.as_deref())?;
    Ok((config, guard))
}

async fn run(config: Config) -> Result<(), Error> {
    let table = Arc::new(config.device_table());
    for id in table.dangling_ids() {
        tracing::warn!(device = id, "Preset references an unknown device");
    }
    tracing::info!(
        devices = table.len(),
        power_on = ?table.power_on(),
        power_off = ?table.power_off(),
        "Device table loaded"
    );

    let session = config.session_config();
    let dispatcher = Arc::new(
        Dispatcher::new(
            Arc::clone(&table),
            Arc::new(config.system_actions()),
            session.topic(),
        )
        .with_match_mode(config.relay.match_mode),
    );
    let supervisor = Arc::new(Supervisor::new(TcpConnector, session));

    let http = if config.http.enabled {
        let listener = TcpListener::bind(config.http_addr()).await?;
        let state = ControlState::new(Arc::clone(&dispatcher), supervisor.watch());
        Some(tokio::spawn(async move {
            if let Err(e) = control::serve::<SystemActions>(listener, state).await {
                tracing::error!(error = %e, "HTTP control surface stopped");
            }
        }))
    } else {
        tracing::info!("HTTP control surface disabled");
        None
    };

    tokio::select! {
        generation = supervisor.connect() => {
            tracing::info!(generation, "Relay session established");
        }
        () = shutdown_signal() => {
            tracing::info!("Interrupted before the relay session was established");
            if let Some(http) = http {
                http.abort();
            }
            return Ok(());
        }
    }

    let tasks = protocol::spawn_session(
        &supervisor,
        &dispatcher,
        config.heartbeat_period(),
        config.receive_options(),
    );

    shutdown_signal().await;
    tracing::info!("Shutting down");
    tasks.abort();
    if let Some(http) = http {
        http.abort();
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
