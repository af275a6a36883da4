#![cfg_attr(not(test), deny(clippy::panic))]

use clap::Parser;
use rollhouse_server::auth::TokenValidator;
use rollhouse_server::clock::SystemClock;
use rollhouse_server::config;
use rollhouse_server::game::{FastrandRoller, GreedyPolicy, ScoreLowestPolicy};
use rollhouse_server::hub::RoomHub;
use rollhouse_server::lobby::NoopLobbyNotifier;
use rollhouse_server::logging;
use rollhouse_server::metrics::ServerMetrics;
use rollhouse_server::retry::RetryConfig;
use rollhouse_server::room::RoomDeps;
use rollhouse_server::server::{create_router, AppState};
use std::net::SocketAddr;
use std::sync::Arc;

/// Rollhouse -- hibernation-capable WebSocket session server for multiplayer dice games
#[derive(Parser, Debug)]
#[command(name = "rollhouse-server")]
#[command(about = "A hibernation-capable WebSocket session server for real-time multiplayer dice games")]
#[command(version)]
struct Cli {
    /// Validate configuration and exit without starting the server.
    /// Useful for CI/CD pipelines and pre-deployment checks.
    #[arg(long, short = 'c', conflicts_with = "print_config")]
    validate_config: bool,

    /// Print the loaded configuration to stdout (as JSON) and exit.
    /// Useful for debugging configuration loading from multiple sources.
    #[arg(long, conflicts_with = "validate_config")]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration from config.json if present; otherwise use code defaults.
    let cfg = Arc::new(config::load());

    if cli.print_config {
        let json = serde_json::to_string_pretty(&*cfg)
            .map_err(|e| anyhow::anyhow!("Failed to serialize config: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    // config::load() already validated warn-only; capture the result here to
    // provide a proper exit code for --validate-config and to fail startup.
    let validation_result = config::validate_config(&cfg);

    if cli.validate_config {
        match validation_result {
            Ok(()) => {
                println!("Configuration validation passed");
                println!();
                println!("Configuration summary:");
                println!("  Port: {}", cfg.port);
                println!("  Max players per room: {}", cfg.room.max_players);
                println!("  Reclaim window: {} ms", cfg.room.reclaim_window_ms);
                println!("  Pause timeout: {} ms", cfg.room.pause_timeout_ms);
                println!("  Invite TTL: {} ms", cfg.room.invite_ttl_ms);
                println!("  Chat backlog: {} messages", cfg.room.max_chat_messages);
                return Ok(());
            }
            Err(e) => {
                eprintln!("Configuration validation failed:\n{e}");
                std::process::exit(1);
            }
        }
    }

    validation_result?;

    logging::init_with_config(&cfg.logging);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    tracing::info!(%addr, "Starting Rollhouse server");

    let metrics = Arc::new(ServerMetrics::new());
    let deps = RoomDeps {
        config: Arc::clone(&cfg),
        clock: Arc::new(SystemClock),
        metrics: Arc::clone(&metrics),
        lobby: Arc::new(NoopLobbyNotifier),
        lobby_retry: RetryConfig::lobby_notify(),
        roller: Arc::new(FastrandRoller),
        ai_policy: Arc::new(GreedyPolicy),
        timeout_policy: Arc::new(ScoreLowestPolicy),
    };
    let hub = RoomHub::new(deps);

    let state = AppState {
        hub: Arc::clone(&hub),
        validator: TokenValidator::new(cfg.security.token_key.clone().into_bytes()),
        clock: Arc::new(SystemClock),
        metrics,
    };
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
            hub.shutdown();
        })
        .await?;

    Ok(())
}
