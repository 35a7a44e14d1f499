// Tic-Tac-Toe terminal client entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file, not terminal)
// 2. Load config
// 3. Create mpsc channels
// 4. Build the connector, profile client and sound player
// 5. Spawn app logic task
// 6. Run the TUI until the user quits
// 7. Cleanup on exit

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{error, info};

use tictactoe_client::app;
use tictactoe_client::config;
use tictactoe_client::profile::ProfileClient;
use tictactoe_client::sound;
use tictactoe_client::transport::TungsteniteConnector;
use tictactoe_client::tui;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("Tic-Tac-Toe client starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: player={}, relay={}",
        config.player.username, config.relay.ws_url
    );
    if config.credentials.session_token.is_none() {
        info!("No session token configured; the relay will ask you to log in");
    }

    // 3. Create mpsc channels
    let (transport_tx, transport_rx) = mpsc::channel(256);
    let (profile_tx, profile_rx) = mpsc::channel(4);
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (ui_tx, ui_rx) = mpsc::channel(256);

    // 4. Collaborators
    let token = config.credentials.session_token.clone();
    let connector = Arc::new(TungsteniteConnector::new(
        config.relay.ws_url.clone(),
        token.clone(),
    ));
    let profile_client = Arc::new(ProfileClient::new(&config.relay.http_url, token));
    let sound_player = sound::from_config(&config.sound);

    let app_state = app::AppState::new(
        config,
        connector,
        profile_client,
        sound_player,
        transport_tx,
        profile_tx,
    );

    // 5. Spawn app logic task
    let app_handle = tokio::spawn(async move {
        if let Err(e) = app::run(transport_rx, profile_rx, cmd_rx, ui_tx, app_state).await {
            error!("Application loop error: {}", e);
        }
    });

    // 6. Run the TUI (blocks until the user quits)
    if let Err(e) = tui::run(ui_rx, cmd_tx).await {
        error!("TUI error: {}", e);
    }

    // 7. Cleanup: give the app task a moment to close the connection
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        let _ = app_handle.await;
    })
    .await;

    info!("Tic-Tac-Toe client shut down cleanly");
    Ok(())
}

/// Initialize tracing to log to a file (the terminal belongs to the TUI).
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let base_dir = config::resolve_base_dir().context("failed to locate working directory")?;
    let log_dir = base_dir.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("tictactoe.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("tictactoe_client=info,tictactoe_core=info,warn")
        }))
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
