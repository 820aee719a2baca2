use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use mukstagram_ws::auth::{create_token, ACCESS_TOKEN_TYPE, SERVICE_TOKEN_TYPE};
use mukstagram_ws::GatewayState;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod listen;

const RATE_LIMIT_PRUNE_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("mukstagram=info,tower_http=debug")),
        )
        .init();

    let args = cli::Args::parse();
    let config = config::Config::load(&args.config)?;

    match args.command.unwrap_or(cli::Command::Serve) {
        cli::Command::Serve => serve(config).await,
        cli::Command::Listen { user, token_file } => {
            let token_file = token_file.or_else(|| config.realtime.token_file.clone());
            listen::run(&config, user, token_file).await
        }
        cli::Command::Token { user_id, service } => {
            let token_type = if service {
                SERVICE_TOKEN_TYPE
            } else {
                ACCESS_TOKEN_TYPE
            };
            let token = create_token(
                &user_id,
                &config.auth.jwt_secret,
                config.auth.jwt_expiry_seconds,
                token_type,
            )?;
            println!("{token}");
            Ok(())
        }
    }
}

async fn serve(config: config::Config) -> Result<()> {
    let state = GatewayState::new(&config.auth.jwt_secret, config.gateway.limits());
    let maintenance = state.spawn_maintenance(RATE_LIMIT_PRUNE_INTERVAL);
    let app = mukstagram_ws::app(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!("Realtime gateway listening on {}", config.server.bind_address);

    let shutdown_signal = async {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!();
            tracing::info!("Shutting down (ctrl-c)...");
        }
    };

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    maintenance.abort();
    Ok(())
}
