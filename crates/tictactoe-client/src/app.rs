// Application orchestrator: the client's single event loop.
//
// Owns the `Session`, the evaluator, the sound player and the current relay
// connection. Transport events, profile results and user commands are
// applied here one at a time, and a fresh `GameSnapshot` is pushed to the
// TUI after every change.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use tictactoe_core::{BoardEvaluator, Phase, Profile, ServerMessage, Session, SessionError, Side};

use crate::config::Config;
use crate::profile::ProfileSource;
use crate::protocol::{ConnectionStatus, GameSnapshot, UiUpdate, UserCommand};
use crate::sound::{Sound, SoundPlayer};
use crate::transport::{Connection, Connector, TransportEvent, TransportEventKind};

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Whether the profile counters have arrived yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileStatus {
    Loading,
    Loaded(Profile),
}

pub struct AppState {
    pub config: Config,
    pub session: Session,
    pub connection_status: ConnectionStatus,
    pub profile: ProfileStatus,
    /// Generation of the current (or most recently attempted) connection.
    pub generation: u64,
    evaluator: BoardEvaluator,
    sound: Box<dyn SoundPlayer>,
    connector: Arc<dyn Connector>,
    profile_source: Arc<dyn ProfileSource>,
    connection: Option<Connection>,
    transport_tx: mpsc::Sender<TransportEvent>,
    profile_tx: mpsc::Sender<Profile>,
}

impl AppState {
    /// Build the app state. `transport_tx` and `profile_tx` feed the
    /// receivers later passed to [`run`].
    pub fn new(
        config: Config,
        connector: Arc<dyn Connector>,
        profile_source: Arc<dyn ProfileSource>,
        sound: Box<dyn SoundPlayer>,
        transport_tx: mpsc::Sender<TransportEvent>,
        profile_tx: mpsc::Sender<Profile>,
    ) -> Self {
        let session = Session::new(config.player.username.clone());
        AppState {
            config,
            session,
            connection_status: ConnectionStatus::Connecting,
            profile: ProfileStatus::Loading,
            generation: 0,
            evaluator: BoardEvaluator::new(),
            sound,
            connector,
            profile_source,
            connection: None,
            transport_tx,
            profile_tx,
        }
    }

    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot::from_session(&self.session, &self.evaluator, self.connection_status)
    }

    pub fn has_connection(&self) -> bool {
        self.connection.is_some()
    }

    /// Open a new connection (generation + 1) and ask for a pairing.
    async fn connect_and_join(&mut self) -> Result<(), String> {
        self.generation += 1;
        self.connection_status = ConnectionStatus::Connecting;
        match self
            .connector
            .connect(self.generation, self.transport_tx.clone())
            .await
        {
            Ok(connection) => {
                connection.join_request();
                self.connection = Some(connection);
                self.connection_status = ConnectionStatus::Connected;
                info!(generation = self.generation, "joined matchmaking");
                Ok(())
            }
            Err(e) => {
                error!("failed to connect to relay: {e:#}");
                self.connection_status = ConnectionStatus::Disconnected;
                Err(format!("Could not connect to the relay: {e}"))
            }
        }
    }

    /// Close the current connection, if any, and wait for its tasks.
    async fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close().await;
        }
    }

    /// Fetch profile counters in the background. Failures are logged and
    /// leave the profile in its loading state.
    fn spawn_profile_fetch(&self) {
        let source = Arc::clone(&self.profile_source);
        let tx = self.profile_tx.clone();
        tokio::spawn(async move {
            match source.fetch().await {
                Ok(profile) => {
                    let _ = tx.send(profile).await;
                }
                Err(e) => warn!("profile fetch failed: {e}"),
            }
        });
    }

    /// Play the cues implied by moving from (`turn_before`, `phase_before`)
    /// to the current session state.
    fn play_transition_sounds(&mut self, turn_before: Option<Side>, phase_before: Phase) {
        let phase = self.session.phase();
        if phase == Phase::Over && phase_before != Phase::Over {
            self.sound.play(Sound::GameOver);
        } else if phase == Phase::InProgress && self.session.current_turn() != turn_before {
            self.sound.play(Sound::Click);
        }
    }
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

/// Run the application event loop until the user quits or the TUI goes away.
///
/// On start the loop connects to the relay, requests a pairing and kicks
/// off the profile fetch.
pub async fn run(
    mut transport_rx: mpsc::Receiver<TransportEvent>,
    mut profile_rx: mpsc::Receiver<Profile>,
    mut cmd_rx: mpsc::Receiver<UserCommand>,
    ui_tx: mpsc::Sender<UiUpdate>,
    mut state: AppState,
) -> anyhow::Result<()> {
    info!("Application event loop started");

    state.spawn_profile_fetch();
    if let Err(notice) = state.connect_and_join().await {
        let _ = ui_tx.send(UiUpdate::Notice(notice)).await;
    }
    push_snapshot(&state, &ui_tx).await;

    let mut profile_open = true;

    loop {
        tokio::select! {
            // --- Relay events ---
            event = transport_rx.recv() => {
                match event {
                    Some(event) => handle_transport_event(&mut state, event, &ui_tx).await,
                    None => {
                        info!("transport channel closed, shutting down");
                        break;
                    }
                }
            }

            // --- Profile results ---
            profile = profile_rx.recv(), if profile_open => {
                match profile {
                    Some(profile) => {
                        info!(?profile, "profile loaded");
                        state.profile = ProfileStatus::Loaded(profile);
                        let _ = ui_tx.send(UiUpdate::Profile(profile)).await;
                    }
                    None => profile_open = false,
                }
            }

            // --- User commands ---
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UserCommand::Quit) | None => {
                        info!("Quit requested, shutting down");
                        break;
                    }
                    Some(UserCommand::PlaceMark(cell)) => {
                        handle_place_mark(&mut state, cell, &ui_tx).await;
                    }
                    Some(UserCommand::NewGame) => {
                        handle_new_game(&mut state, &ui_tx).await;
                    }
                }
            }
        }
    }

    state.disconnect().await;
    info!("Application event loop stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Apply one transport event. Events from a superseded connection are
/// discarded without touching the session.
pub async fn handle_transport_event(
    state: &mut AppState,
    event: TransportEvent,
    ui_tx: &mpsc::Sender<UiUpdate>,
) {
    if event.generation != state.generation {
        debug!(
            stale = event.generation,
            current = state.generation,
            "dropping event from superseded connection"
        );
        return;
    }

    match event.kind {
        TransportEventKind::Closed => {
            warn!(generation = event.generation, "relay connection lost");
            // The tasks have already finished; dropping the handle is enough.
            state.connection = None;
            state.connection_status = ConnectionStatus::Disconnected;
            push_snapshot(state, ui_tx).await;
        }
        TransportEventKind::Message(message) => {
            apply_server_message(state, message, ui_tx).await;
        }
    }
}

async fn apply_server_message(
    state: &mut AppState,
    message: ServerMessage,
    ui_tx: &mpsc::Sender<UiUpdate>,
) {
    let event_name = message.event_name();
    let turn_before = state.session.current_turn();
    let phase_before = state.session.phase();

    let result: Result<(), SessionError> = match message {
        ServerMessage::GameJoined { game_id } => state.session.joined(game_id),
        ServerMessage::OpponentJoined { opponent } => state.session.opponent_joined(opponent),
        ServerMessage::GameStarted { game_id, opponent } => {
            state.session.game_started(game_id, opponent)
        }
        ServerMessage::MoveMade { position, seq } => {
            state.session.remote_move(position, seq).map(|_| ())
        }
        ServerMessage::GameOver {
            result,
            winner,
            reason,
        } => state.session.game_over(result, winner, reason),
        ServerMessage::Error { message } => {
            warn!("relay reported an error: {message}");
            let _ = ui_tx.send(UiUpdate::Notice(message)).await;
            return;
        }
    };

    if let Err(e) = result {
        warn!(event = event_name, "rejected relay event: {e}");
        return;
    }

    state.play_transition_sounds(turn_before, phase_before);
    push_snapshot(state, ui_tx).await;
}

/// A local click. Illegal clicks are ignored without feedback.
pub async fn handle_place_mark(state: &mut AppState, cell: usize, ui_tx: &mpsc::Sender<UiUpdate>) {
    let Some(connection) = state.connection.as_ref() else {
        debug!(cell, "ignoring click without a relay connection");
        return;
    };
    let Some(game_id) = state.session.id().map(str::to_string) else {
        debug!(cell, "ignoring click before a game id is known");
        return;
    };

    let turn_before = state.session.current_turn();
    let phase_before = state.session.phase();
    let Some(mv) = state.session.local_move(cell) else {
        debug!(cell, "ignoring illegal click");
        return;
    };

    connection.make_move(mv.cell, &game_id);
    state.play_transition_sounds(turn_before, phase_before);
    push_snapshot(state, ui_tx).await;
}

/// Leave a finished game: close the old connection, reset the session,
/// reconnect and ask for a new pairing.
pub async fn handle_new_game(state: &mut AppState, ui_tx: &mpsc::Sender<UiUpdate>) {
    if let Err(e) = state.session.new_game() {
        warn!("new game rejected: {e}");
        return;
    }
    info!("starting a new game");

    state.disconnect().await;
    let connect_result = state.connect_and_join().await;
    push_snapshot(state, ui_tx).await;
    if let Err(notice) = connect_result {
        let _ = ui_tx.send(UiUpdate::Notice(notice)).await;
    }

    // Counters changed with the last game.
    state.spawn_profile_fetch();
}

async fn push_snapshot(state: &AppState, ui_tx: &mpsc::Sender<UiUpdate>) {
    let _ = ui_tx
        .send(UiUpdate::Game(Box::new(state.snapshot())))
        .await;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tictactoe_core::{ClientMessage, GameOverResult};

    use crate::config::{CredentialsConfig, PlayerConfig, RelayConfig, SoundConfig};
    use crate::profile::ProfileError;

    // -- fakes ----------------------------------------------------------------

    /// Connector that hands out in-memory connections and keeps each
    /// connection's outbound receiver for inspection.
    #[derive(Default)]
    struct FakeConnector {
        outbound: Mutex<Vec<(u64, mpsc::UnboundedReceiver<ClientMessage>)>>,
        fail: bool,
    }

    impl FakeConnector {
        fn sent(&self, generation: u64) -> Vec<ClientMessage> {
            let mut guard = self.outbound.lock().unwrap();
            let (_, rx) = guard
                .iter_mut()
                .find(|(g, _)| *g == generation)
                .expect("no connection with that generation");
            let mut out = Vec::new();
            while let Ok(msg) = rx.try_recv() {
                out.push(msg);
            }
            out
        }
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn connect(
            &self,
            generation: u64,
            _events: mpsc::Sender<TransportEvent>,
        ) -> anyhow::Result<Connection> {
            if self.fail {
                anyhow::bail!("connection refused");
            }
            let (tx, rx) = mpsc::unbounded_channel();
            self.outbound.lock().unwrap().push((generation, rx));
            Ok(Connection::from_parts(generation, tx, vec![]))
        }
    }

    struct PendingProfile;

    #[async_trait]
    impl ProfileSource for PendingProfile {
        async fn fetch(&self) -> Result<Profile, ProfileError> {
            std::future::pending().await
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSound(Arc<Mutex<Vec<Sound>>>);

    impl SoundPlayer for RecordingSound {
        fn play(&mut self, sound: Sound) {
            self.0.lock().unwrap().push(sound);
        }
    }

    fn test_config(username: &str) -> Config {
        Config {
            relay: RelayConfig {
                ws_url: "ws://127.0.0.1:1".into(),
                http_url: "http://127.0.0.1:1".into(),
            },
            player: PlayerConfig {
                username: username.into(),
            },
            sound: SoundConfig { enabled: false },
            credentials: CredentialsConfig::default(),
        }
    }

    struct Harness {
        state: AppState,
        connector: Arc<FakeConnector>,
        sounds: RecordingSound,
        ui_rx: mpsc::Receiver<UiUpdate>,
        ui_tx: mpsc::Sender<UiUpdate>,
        _transport_rx: mpsc::Receiver<TransportEvent>,
        _profile_rx: mpsc::Receiver<Profile>,
    }

    fn harness_with(username: &str, connector: FakeConnector) -> Harness {
        let (transport_tx, transport_rx) = mpsc::channel(16);
        let (profile_tx, profile_rx) = mpsc::channel(4);
        let (ui_tx, ui_rx) = mpsc::channel(64);
        let connector = Arc::new(connector);
        let sounds = RecordingSound::default();
        let state = AppState::new(
            test_config(username),
            connector.clone(),
            Arc::new(PendingProfile),
            Box::new(sounds.clone()),
            transport_tx,
            profile_tx,
        );
        Harness {
            state,
            connector,
            sounds,
            ui_rx,
            ui_tx,
            _transport_rx: transport_rx,
            _profile_rx: profile_rx,
        }
    }

    async fn connected(username: &str) -> Harness {
        let mut h = harness_with(username, FakeConnector::default());
        h.state.connect_and_join().await.unwrap();
        h
    }

    fn msg(state: &AppState, message: ServerMessage) -> TransportEvent {
        TransportEvent {
            generation: state.generation,
            kind: TransportEventKind::Message(message),
        }
    }

    async fn deliver(h: &mut Harness, message: ServerMessage) {
        let event = msg(&h.state, message);
        handle_transport_event(&mut h.state, event, &h.ui_tx).await;
    }

    fn drain_ui(h: &mut Harness) -> Vec<UiUpdate> {
        let mut out = Vec::new();
        while let Ok(update) = h.ui_rx.try_recv() {
            out.push(update);
        }
        out
    }

    // -- tests ----------------------------------------------------------------

    #[tokio::test]
    async fn connecting_sends_join_request() {
        let h = connected("alice").await;
        assert_eq!(h.state.generation, 1);
        assert_eq!(h.state.connection_status, ConnectionStatus::Connected);
        assert_eq!(h.connector.sent(1), vec![ClientMessage::JoinGame {}]);
    }

    #[tokio::test]
    async fn failed_connect_reports_notice_text() {
        let mut h = harness_with(
            "alice",
            FakeConnector {
                fail: true,
                ..Default::default()
            },
        );
        let notice = h.state.connect_and_join().await.unwrap_err();
        assert!(notice.contains("connection refused"));
        assert_eq!(h.state.connection_status, ConnectionStatus::Disconnected);
        assert!(!h.state.has_connection());
    }

    #[tokio::test]
    async fn first_joiner_plays_x_and_sends_move() {
        let mut h = connected("alice").await;
        deliver(&mut h, ServerMessage::GameJoined { game_id: "g1".into() }).await;
        deliver(&mut h, ServerMessage::OpponentJoined { opponent: "bob".into() }).await;
        assert!(h.state.session.is_local_turn());
        h.connector.sent(1);

        handle_place_mark(&mut h.state, 4, &h.ui_tx).await;

        assert_eq!(h.state.session.board().get(4), Some(Side::X));
        assert_eq!(h.state.session.current_turn(), Some(Side::O));
        assert_eq!(
            h.connector.sent(1),
            vec![ClientMessage::MakeMove {
                position: 4,
                game_id: "g1".into()
            }]
        );
    }

    #[tokio::test]
    async fn out_of_turn_click_sends_nothing() {
        let mut h = connected("bob").await;
        deliver(
            &mut h,
            ServerMessage::GameStarted {
                game_id: "g1".into(),
                opponent: "alice".into(),
            },
        )
        .await;
        h.connector.sent(1);
        drain_ui(&mut h);

        handle_place_mark(&mut h.state, 0, &h.ui_tx).await;

        assert!(h.connector.sent(1).is_empty());
        assert_eq!(h.state.session.board().filled(), 0);
        assert!(drain_ui(&mut h).is_empty());
    }

    #[tokio::test]
    async fn stale_generation_events_are_dropped() {
        let mut h = connected("alice").await;
        let stale = TransportEvent {
            generation: 0,
            kind: TransportEventKind::Message(ServerMessage::GameJoined {
                game_id: "old".into(),
            }),
        };
        handle_transport_event(&mut h.state, stale, &h.ui_tx).await;
        assert!(h.state.session.id().is_none());

        let stale_close = TransportEvent {
            generation: 0,
            kind: TransportEventKind::Closed,
        };
        handle_transport_event(&mut h.state, stale_close, &h.ui_tx).await;
        assert_eq!(h.state.connection_status, ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn relay_error_becomes_notice_without_state_change() {
        let mut h = connected("alice").await;
        drain_ui(&mut h);
        deliver(
            &mut h,
            ServerMessage::Error {
                message: "You are already in a waiting or ongoing game.".into(),
            },
        )
        .await;

        assert_eq!(
            drain_ui(&mut h),
            vec![UiUpdate::Notice(
                "You are already in a waiting or ongoing game.".into()
            )]
        );
        assert_eq!(h.state.session.phase(), Phase::Waiting);
    }

    #[tokio::test]
    async fn out_of_sequence_remote_move_is_rejected() {
        let mut h = connected("alice").await;
        deliver(&mut h, ServerMessage::GameJoined { game_id: "g1".into() }).await;
        deliver(&mut h, ServerMessage::OpponentJoined { opponent: "bob".into() }).await;
        handle_place_mark(&mut h.state, 0, &h.ui_tx).await;

        deliver(
            &mut h,
            ServerMessage::MoveMade {
                position: 5,
                seq: Some(5),
            },
        )
        .await;

        assert_eq!(h.state.session.board().get(5), None);
        assert_eq!(h.state.session.moves_applied(), 1);
    }

    #[tokio::test]
    async fn sounds_follow_turns_and_game_end() {
        let mut h = connected("alice").await;
        deliver(&mut h, ServerMessage::GameJoined { game_id: "g1".into() }).await;
        deliver(&mut h, ServerMessage::OpponentJoined { opponent: "bob".into() }).await;
        handle_place_mark(&mut h.state, 0, &h.ui_tx).await;
        deliver(
            &mut h,
            ServerMessage::MoveMade {
                position: 3,
                seq: Some(2),
            },
        )
        .await;
        deliver(
            &mut h,
            ServerMessage::GameOver {
                result: GameOverResult::Win,
                winner: Some("bob".into()),
                reason: Some("opponent_disconnected".into()),
            },
        )
        .await;

        assert_eq!(
            *h.sounds.0.lock().unwrap(),
            vec![Sound::Click, Sound::Click, Sound::Click, Sound::GameOver]
        );
        assert_eq!(h.state.session.result_text().as_deref(), Some("bob won!"));
    }

    #[tokio::test]
    async fn closed_event_marks_connection_lost() {
        let mut h = connected("alice").await;
        let event = TransportEvent {
            generation: h.state.generation,
            kind: TransportEventKind::Closed,
        };
        handle_transport_event(&mut h.state, event, &h.ui_tx).await;
        assert_eq!(h.state.connection_status, ConnectionStatus::Disconnected);
        assert!(!h.state.has_connection());

        // Clicks go nowhere once the link is gone.
        handle_place_mark(&mut h.state, 0, &h.ui_tx).await;
        assert_eq!(h.state.session.board().filled(), 0);
    }

    #[tokio::test]
    async fn new_game_reconnects_with_next_generation() {
        let mut h = connected("alice").await;
        deliver(&mut h, ServerMessage::GameJoined { game_id: "g1".into() }).await;
        deliver(&mut h, ServerMessage::OpponentJoined { opponent: "bob".into() }).await;
        deliver(
            &mut h,
            ServerMessage::GameOver {
                result: GameOverResult::Draw,
                winner: None,
                reason: None,
            },
        )
        .await;

        handle_new_game(&mut h.state, &h.ui_tx).await;

        assert_eq!(h.state.generation, 2);
        assert_eq!(h.state.session.phase(), Phase::Waiting);
        assert!(h.state.session.id().is_none());
        assert_eq!(h.state.session.local_name(), "alice");
        assert_eq!(h.connector.sent(2), vec![ClientMessage::JoinGame {}]);

        // Late traffic from the first connection is ignored.
        let late = TransportEvent {
            generation: 1,
            kind: TransportEventKind::Message(ServerMessage::OpponentJoined {
                opponent: "ghost".into(),
            }),
        };
        handle_transport_event(&mut h.state, late, &h.ui_tx).await;
        assert_eq!(h.state.session.phase(), Phase::Waiting);
    }

    #[tokio::test]
    async fn new_game_before_game_over_is_ignored() {
        let mut h = connected("alice").await;
        deliver(&mut h, ServerMessage::GameJoined { game_id: "g1".into() }).await;

        handle_new_game(&mut h.state, &h.ui_tx).await;

        assert_eq!(h.state.generation, 1);
        assert_eq!(h.state.session.id(), Some("g1"));
    }

    #[tokio::test]
    async fn run_quits_on_command_and_pushes_initial_snapshot() {
        let (transport_tx, transport_rx) = mpsc::channel(16);
        let (profile_tx, profile_rx) = mpsc::channel(4);
        let (cmd_tx, cmd_rx) = mpsc::channel(4);
        let (ui_tx, mut ui_rx) = mpsc::channel(64);
        let connector = Arc::new(FakeConnector::default());
        let state = AppState::new(
            test_config("alice"),
            connector.clone(),
            Arc::new(PendingProfile),
            Box::new(RecordingSound::default()),
            transport_tx,
            profile_tx.clone(),
        );

        let handle = tokio::spawn(run(transport_rx, profile_rx, cmd_rx, ui_tx, state));

        match ui_rx.recv().await.unwrap() {
            UiUpdate::Game(snap) => {
                assert_eq!(snap.local_name, "alice");
                assert_eq!(snap.connection, ConnectionStatus::Connected);
            }
            other => panic!("expected a game snapshot, got {other:?}"),
        }

        let profile = Profile {
            game_played: 2,
            wins: 1,
            losses: 1,
            draws: 0,
        };
        profile_tx.send(profile).await.unwrap();
        assert_eq!(ui_rx.recv().await.unwrap(), UiUpdate::Profile(profile));

        cmd_tx.send(UserCommand::Quit).await.unwrap();
        handle.await.unwrap().unwrap();
        assert_eq!(connector.sent(1), vec![ClientMessage::JoinGame {}]);
    }
}
