// Relay hub: the single task that owns every connection, room and game
// decision.
//
// Connection tasks (see `ws_server`) forward parsed client messages as
// `HubEvent`s over an mpsc channel. The hub validates them against the store,
// updates it, and pushes `ServerMessage`s back through each connection's
// unbounded outbound channel.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use tictactoe_core::protocol::REASON_OPPONENT_DISCONNECTED;
use tictactoe_core::{
    BoardEvaluator, ClientMessage, GameOverResult, Outcome, ServerMessage, Side, CELL_COUNT,
};

use crate::db::{Database, GameEnd, GameRecord, GameStatus, Withdrawal};

pub type ConnId = u64;

pub const MSG_PLEASE_LOG_IN: &str = "Please log in.";
pub const MSG_ALREADY_IN_GAME: &str = "You are already in a waiting or ongoing game.";
pub const MSG_COULD_NOT_CONNECT: &str = "Could not connect. Please try again.";

/// What the hub asks a connection's writer to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Message(ServerMessage),
    /// Send a close frame and stop.
    Close,
}

/// Input to the hub from connection tasks.
#[derive(Debug)]
pub enum HubEvent {
    Connected {
        conn_id: ConnId,
        session_token: Option<String>,
        outbound: mpsc::UnboundedSender<Outbound>,
    },
    Message {
        conn_id: ConnId,
        message: ClientMessage,
    },
    /// A text frame that did not parse as a client message.
    Invalid {
        conn_id: ConnId,
        error: String,
    },
    Disconnected {
        conn_id: ConnId,
    },
}

struct Client {
    username: String,
    outbound: mpsc::UnboundedSender<Outbound>,
}

/// All live relay state. Owned by the task running [`run`].
pub struct Hub {
    db: Arc<Database>,
    evaluator: BoardEvaluator,
    clients: HashMap<ConnId, Client>,
    /// Game id -> connections seated in it.
    rooms: HashMap<String, Vec<ConnId>>,
}

/// Drive the hub until every event sender is gone.
pub async fn run(mut events: mpsc::Receiver<HubEvent>, mut hub: Hub) {
    while let Some(event) = events.recv().await {
        hub.handle(event);
    }
    info!("Hub event channel closed, stopping");
}

impl Hub {
    pub fn new(db: Arc<Database>) -> Self {
        Hub {
            db,
            evaluator: BoardEvaluator::new(),
            clients: HashMap::new(),
            rooms: HashMap::new(),
        }
    }

    pub fn handle(&mut self, event: HubEvent) {
        match event {
            HubEvent::Connected {
                conn_id,
                session_token,
                outbound,
            } => self.handle_connected(conn_id, session_token, outbound),
            HubEvent::Message { conn_id, message } => match message {
                ClientMessage::JoinGame {} => self.handle_join(conn_id),
                ClientMessage::MakeMove { position, game_id } => {
                    self.handle_move(conn_id, position, &game_id)
                }
            },
            HubEvent::Invalid { conn_id, error } => {
                warn!("Invalid message from connection {conn_id}: {error}");
                self.send(conn_id, error_message(format!("Invalid message: {error}")));
            }
            HubEvent::Disconnected { conn_id } => self.handle_disconnected(conn_id),
        }
    }

    /// Number of authenticated connections.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Number of games with seated connections.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    // ------------------------------------------------------------------
    // Connect
    // ------------------------------------------------------------------

    fn handle_connected(
        &mut self,
        conn_id: ConnId,
        session_token: Option<String>,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) {
        let username = match session_token.map(|t| self.db.session_user(&t)) {
            Some(Ok(Some(username))) => username,
            Some(Err(e)) => {
                error!("Session lookup failed for connection {conn_id}: {e:#}");
                reject(&outbound, MSG_PLEASE_LOG_IN);
                return;
            }
            Some(Ok(None)) | None => {
                info!("Connection {conn_id} has no valid session");
                reject(&outbound, MSG_PLEASE_LOG_IN);
                return;
            }
        };

        match self.db.is_player_in_game(&username) {
            Ok(false) => {}
            Ok(true) => {
                info!("{username} already has an active game, refusing connection {conn_id}");
                reject(&outbound, MSG_ALREADY_IN_GAME);
                return;
            }
            Err(e) => {
                error!("Active game lookup failed for {username}: {e:#}");
                reject(&outbound, MSG_COULD_NOT_CONNECT);
                return;
            }
        }

        info!("{username} connected as {conn_id}");
        self.clients.insert(conn_id, Client { username, outbound });
    }

    // ------------------------------------------------------------------
    // Matchmaking
    // ------------------------------------------------------------------

    fn handle_join(&mut self, conn_id: ConnId) {
        let Some(username) = self.username(conn_id) else {
            warn!("join_game from unknown connection {conn_id}");
            return;
        };

        match self.db.is_player_in_game(&username) {
            Ok(false) => {}
            Ok(true) => {
                self.send(conn_id, error_message(MSG_ALREADY_IN_GAME));
                return;
            }
            Err(e) => {
                error!("Active game lookup failed for {username}: {e:#}");
                self.send(conn_id, error_message(format!("Could not join a game: {e}")));
                return;
            }
        }

        if let Err(e) = self.pair_or_wait(conn_id, &username) {
            error!("Matchmaking failed for {username}: {e:#}");
            self.send(conn_id, error_message(format!("Could not join a game: {e}")));
        }
    }

    /// Seat the player in the oldest waiting game, or open a new one.
    fn pair_or_wait(&mut self, conn_id: ConnId, username: &str) -> anyhow::Result<()> {
        match self.oldest_live_waiting_game()? {
            Some(game) => {
                self.db.join_game(&game.id, username)?;
                info!("{username} joined game {} against {}", game.id, game.player1);

                let waiting = self.rooms.entry(game.id.clone()).or_default();
                let others = waiting.clone();
                waiting.push(conn_id);

                self.send(
                    conn_id,
                    ServerMessage::GameStarted {
                        game_id: game.id.clone(),
                        opponent: game.player1.clone(),
                    },
                );
                for other in others {
                    self.send(
                        other,
                        ServerMessage::OpponentJoined {
                            opponent: username.to_string(),
                        },
                    );
                }
            }
            None => {
                let game_id = self.db.create_game(username)?;
                info!("{username} created game {game_id}, waiting for an opponent");
                self.rooms.insert(game_id.clone(), vec![conn_id]);
                self.send(conn_id, ServerMessage::GameJoined { game_id });
            }
        }
        Ok(())
    }

    /// Oldest waiting game whose creator is still connected. Waiting games
    /// nobody is seated in (left over from an earlier run) are deleted.
    fn oldest_live_waiting_game(&self) -> anyhow::Result<Option<GameRecord>> {
        while let Some(game) = self.db.oldest_waiting_game()? {
            if self.rooms.get(&game.id).is_some_and(|m| !m.is_empty()) {
                return Ok(Some(game));
            }
            warn!(
                "Deleting waiting game {} of {}: creator not connected",
                game.id, game.player1
            );
            self.db.delete_game(&game.id)?;
        }
        Ok(None)
    }

    // ------------------------------------------------------------------
    // Moves
    // ------------------------------------------------------------------

    fn handle_move(&mut self, conn_id: ConnId, position: usize, game_id: &str) {
        let Some(username) = self.username(conn_id) else {
            warn!("make_move from unknown connection {conn_id}");
            return;
        };

        if let Err(e) = self.apply_move(conn_id, &username, position, game_id) {
            warn!("Move by {username} in game {game_id} failed: {e:#}");
            self.send(
                conn_id,
                error_message(format!("An error occurred while making the move: {e}")),
            );
        }
    }

    /// Validate and apply one move. Out-of-turn moves and occupied cells
    /// are dropped without a reply; missing games and bad positions are
    /// errors.
    fn apply_move(
        &mut self,
        conn_id: ConnId,
        username: &str,
        position: usize,
        game_id: &str,
    ) -> anyhow::Result<()> {
        let Some(game) = self.db.get_game(game_id)? else {
            anyhow::bail!("game {game_id} not found");
        };
        if position >= CELL_COUNT {
            anyhow::bail!("position {position} is outside the board");
        }

        let Some(side) = game.side_of(username) else {
            debug!("{username} is not seated in game {game_id}, ignoring move");
            return Ok(());
        };
        if game.status != GameStatus::Ongoing
            || game.current_turn.as_deref() != Some(username)
            || !game.board.is_empty_cell(position)
        {
            debug!(
                "Ignoring move {position} by {username}: status={}, turn={:?}",
                game.status.as_str(),
                game.current_turn
            );
            return Ok(());
        }

        let mut board = game.board;
        board.place(position, side)?;
        let next_turn = game.opponent_of(username).unwrap_or(username);
        self.db.record_move(game_id, &board, next_turn)?;
        debug!("{username} placed {side} at {position} in game {game_id}");

        let seq = board.filled() as u32;
        for other in self.room_members(game_id, conn_id) {
            self.send(
                other,
                ServerMessage::MoveMade {
                    position,
                    seq: Some(seq),
                },
            );
        }

        let evaluation = self.evaluator.evaluate(&board);
        match evaluation.outcome {
            Outcome::Undecided => {}
            Outcome::Draw => {
                self.db.complete_game(game_id, &GameEnd::Draw)?;
                info!("Game {game_id} ended in a draw");
                self.broadcast_and_close_room(
                    game_id,
                    ServerMessage::GameOver {
                        result: GameOverResult::Draw,
                        winner: None,
                        reason: None,
                    },
                );
            }
            Outcome::Winner(winning_side) => {
                let (winner, loser) = seats_for(&game, winning_side);
                self.db.complete_game(
                    game_id,
                    &GameEnd::Win {
                        winner: winner.clone(),
                        loser,
                        notes: None,
                    },
                )?;
                info!("Game {game_id} won by {winner}");
                self.broadcast_and_close_room(
                    game_id,
                    ServerMessage::GameOver {
                        result: GameOverResult::Win,
                        winner: Some(winner),
                        reason: None,
                    },
                );
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Disconnect
    // ------------------------------------------------------------------

    fn handle_disconnected(&mut self, conn_id: ConnId) {
        let Some(client) = self.clients.remove(&conn_id) else {
            return;
        };
        info!("{} disconnected ({conn_id})", client.username);

        let Some(game_id) = self.room_of(conn_id) else {
            return;
        };
        if let Some(members) = self.rooms.get_mut(&game_id) {
            members.retain(|&c| c != conn_id);
        }

        match self.db.withdraw_player(&client.username) {
            Ok(Withdrawal::Forfeited { game_id, winner }) => {
                info!("{} left game {game_id}; {winner} wins", client.username);
                self.broadcast_and_close_room(
                    &game_id,
                    ServerMessage::GameOver {
                        result: GameOverResult::Win,
                        winner: Some(winner),
                        reason: Some(REASON_OPPONENT_DISCONNECTED.to_string()),
                    },
                );
            }
            Ok(Withdrawal::DeletedWaiting { game_id }) => {
                info!("Deleted waiting game {game_id}");
                self.rooms.remove(&game_id);
            }
            Ok(Withdrawal::None) => {
                self.rooms.remove(&game_id);
            }
            Err(e) => {
                error!("Withdrawal of {} failed: {e:#}", client.username);
                self.rooms.remove(&game_id);
            }
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn username(&self, conn_id: ConnId) -> Option<String> {
        self.clients.get(&conn_id).map(|c| c.username.clone())
    }

    fn room_of(&self, conn_id: ConnId) -> Option<String> {
        self.rooms
            .iter()
            .find(|(_, members)| members.contains(&conn_id))
            .map(|(id, _)| id.clone())
    }

    fn room_members(&self, game_id: &str, except: ConnId) -> Vec<ConnId> {
        self.rooms
            .get(game_id)
            .map(|members| members.iter().copied().filter(|&c| c != except).collect())
            .unwrap_or_default()
    }

    fn broadcast_and_close_room(&mut self, game_id: &str, message: ServerMessage) {
        for member in self.rooms.remove(game_id).unwrap_or_default() {
            self.send(member, message.clone());
        }
    }

    fn send(&self, conn_id: ConnId, message: ServerMessage) {
        if let Some(client) = self.clients.get(&conn_id) {
            debug!("-> {conn_id}: {}", message.event_name());
            if client.outbound.send(Outbound::Message(message)).is_err() {
                debug!("Connection {conn_id} already gone");
            }
        }
    }
}

fn error_message(message: impl Into<String>) -> ServerMessage {
    ServerMessage::Error {
        message: message.into(),
    }
}

/// Tell an unregistered connection why it is refused, then close it.
fn reject(outbound: &mpsc::UnboundedSender<Outbound>, message: &str) {
    let _ = outbound.send(Outbound::Message(error_message(message)));
    let _ = outbound.send(Outbound::Close);
}

/// (winner, loser) usernames for the side that completed a line.
fn seats_for(game: &GameRecord, side: Side) -> (String, String) {
    let player2 = game.player2.clone().unwrap_or_default();
    match side {
        Side::X => (game.player1.clone(), player2),
        Side::O => (player2, game.player1.clone()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
