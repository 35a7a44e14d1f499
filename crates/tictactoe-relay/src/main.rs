// Tic-Tac-Toe relay entry point.
//
// Startup sequence:
// 1. Initialize tracing (stdout)
// 2. Load config
// 3. Open the database and clear leftover games
// 4. Spawn the hub task
// 5. Bind and spawn the WebSocket and HTTP listeners
// 6. Run until Ctrl+C or a listener fails

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info};

use tictactoe_relay::config;
use tictactoe_relay::db::Database;
use tictactoe_relay::http::{self, HttpState};
use tictactoe_relay::hub::{self, Hub};
use tictactoe_relay::ws_server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("Tic-Tac-Toe relay starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: ws={}, http={}, db={}",
        config.server.ws_addr(),
        config.server.http_addr(),
        config.database.path
    );

    // 3. Database
    let db = Arc::new(Database::open(&config.database.path).context("failed to open database")?);
    if config.games.reset_unfinished_on_start {
        let removed = db.delete_unfinished_games()?;
        info!("Removed {removed} unfinished games from a previous run");
    }
    let purged = db.purge_expired_sessions()?;
    info!("Purged {purged} expired sessions");

    // 4. Hub
    let (hub_tx, hub_rx) = mpsc::channel(1024);
    let hub_handle = tokio::spawn(hub::run(hub_rx, Hub::new(Arc::clone(&db))));

    // 5. Listeners
    let ws_listener = TcpListener::bind(config.server.ws_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.server.ws_addr()))?;
    let http_listener = TcpListener::bind(config.server.http_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.server.http_addr()))?;

    let http_state = HttpState {
        db,
        session_lifetime: config.session.lifetime(),
        default_page_size: config.games.default_page_size,
    };

    // 6. Run
    tokio::select! {
        result = ws_server::run(ws_listener, hub_tx) => {
            if let Err(e) = result {
                error!("WebSocket server error: {e:#}");
            }
        }
        result = http::serve(http_listener, http_state) => {
            if let Err(e) = result {
                error!("HTTP server error: {e:#}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    hub_handle.abort();
    info!("Tic-Tac-Toe relay shut down");
    Ok(())
}

/// Initialize tracing to stdout.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tictactoe_relay=info,warn")),
        )
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
