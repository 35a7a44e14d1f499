// SQLite persistence layer for users, login sessions, games and the
// leaderboard.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use tictactoe_core::{Board, Profile, Side};

/// Points awarded per result.
pub const WIN_POINTS: i64 = 3;
pub const DRAW_POINTS: i64 = 1;

/// Notes recorded on a game decided by a player leaving.
pub const WITHDRAWAL_NOTES: &str = "Opponent withdrew";

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Waiting,
    Ongoing,
    Completed,
}

impl GameStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GameStatus::Waiting => "waiting",
            GameStatus::Ongoing => "ongoing",
            GameStatus::Completed => "completed",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "waiting" => Some(GameStatus::Waiting),
            "ongoing" => Some(GameStatus::Ongoing),
            "completed" => Some(GameStatus::Completed),
            _ => None,
        }
    }
}

/// A full row of the `games` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameRecord {
    pub id: String,
    pub player1: String,
    pub player2: Option<String>,
    pub status: GameStatus,
    pub winner: Option<String>,
    pub loser: Option<String>,
    pub is_draw: bool,
    pub notes: Option<String>,
    pub board: Board,
    pub created_at: String,
    pub ended_at: Option<String>,
    pub current_turn: Option<String>,
}

impl GameRecord {
    /// player1 plays X, player2 plays O.
    pub fn side_of(&self, username: &str) -> Option<Side> {
        if self.player1 == username {
            Some(Side::X)
        } else if self.player2.as_deref() == Some(username) {
            Some(Side::O)
        } else {
            None
        }
    }

    pub fn opponent_of(&self, username: &str) -> Option<&str> {
        if self.player1 == username {
            self.player2.as_deref()
        } else if self.player2.as_deref() == Some(username) {
            Some(&self.player1)
        } else {
            None
        }
    }
}

/// A game as listed by the history endpoint (no board, turn or id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameSummary {
    pub player1: String,
    pub player2: Option<String>,
    pub status: GameStatus,
    pub winner: Option<String>,
    pub loser: Option<String>,
    pub is_draw: bool,
    pub notes: Option<String>,
    pub created_at: String,
    pub ended_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    pub username: String,
    pub wins: u32,
    pub draws: u32,
    pub score: i64,
}

/// How a game finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEnd {
    Draw,
    Win {
        winner: String,
        loser: String,
        notes: Option<String>,
    },
}

/// What happened to a departing player's active game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Withdrawal {
    /// The player had no waiting or ongoing game.
    None,
    /// Their waiting game was removed.
    DeletedWaiting { game_id: String },
    /// Their ongoing game was awarded to the opponent.
    Forfeited { game_id: String, winner: String },
}

const GAME_COLUMNS: &str = "id, player1, player2, status, winner, loser, is_draw, notes, board, \
                            created_at, ended_at, current_turn";

fn game_from_row(row: &Row<'_>) -> rusqlite::Result<GameRecord> {
    let status: String = row.get(3)?;
    let board_json: String = row.get(8)?;
    let status = GameStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown game status {status:?}").into(),
        )
    })?;
    let cells: Vec<String> = serde_json::from_str(&board_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let board = Board::from_strings(&cells).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(GameRecord {
        id: row.get(0)?,
        player1: row.get(1)?,
        player2: row.get(2)?,
        status,
        winner: row.get(4)?,
        loser: row.get(5)?,
        is_draw: row.get(6)?,
        notes: row.get(7)?,
        board,
        created_at: row.get(9)?,
        ended_at: row.get(10)?,
        current_turn: row.get(11)?,
    })
}

fn board_json(board: &Board) -> Result<String> {
    serde_json::to_string(&board.to_strings()).context("failed to serialize board")
}

// ---------------------------------------------------------------------------
// Password hashing
// ---------------------------------------------------------------------------

/// Salted BLAKE3 digest stored as `salt$hex`.
fn hash_password(password: &str) -> String {
    let salt = uuid::Uuid::new_v4().simple().to_string();
    let digest = salted_digest(&salt, password);
    format!("{salt}${}", digest.to_hex())
}

fn salted_digest(salt: &str, password: &str) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hasher.finalize()
}

fn verify_password(stored: &str, password: &str) -> bool {
    let Some((salt, hex)) = stored.split_once('$') else {
        return false;
    };
    match blake3::Hash::from_hex(hex) {
        // blake3::Hash equality is constant-time.
        Ok(expected) => salted_digest(salt, password) == expected,
        Err(_) => false,
    }
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

/// SQLite-backed store shared by the hub and the HTTP API.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                username      TEXT NOT NULL UNIQUE CHECK (length(username) BETWEEN 1 AND 64),
                email         TEXT NOT NULL UNIQUE CHECK (email LIKE '%_@_%'),
                password_hash TEXT NOT NULL,
                wins          INTEGER NOT NULL DEFAULT 0 CHECK (wins >= 0),
                losses        INTEGER NOT NULL DEFAULT 0 CHECK (losses >= 0),
                draws         INTEGER NOT NULL DEFAULT 0 CHECK (draws >= 0),
                game_played   INTEGER NOT NULL DEFAULT 0 CHECK (game_played >= 0),
                score         INTEGER NOT NULL DEFAULT 0,
                created_at    TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                avatar        TEXT
            );

            CREATE TABLE IF NOT EXISTS sessions (
                token      TEXT PRIMARY KEY,
                user_id    INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                expires_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS games (
                id           TEXT PRIMARY KEY,
                player1      TEXT NOT NULL,
                player2      TEXT,
                status       TEXT NOT NULL CHECK (status IN ('waiting', 'ongoing', 'completed')),
                winner       TEXT,
                loser        TEXT,
                is_draw      INTEGER NOT NULL DEFAULT 0 CHECK (is_draw IN (0, 1)),
                notes        TEXT,
                board        TEXT NOT NULL CHECK (json_valid(board) AND json_array_length(board) = 9),
                created_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                ended_at     TEXT,
                current_turn TEXT
            );

            CREATE TABLE IF NOT EXISTS leaderboard (
                user_id INTEGER NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
                wins    INTEGER NOT NULL DEFAULT 0 CHECK (wins >= 0),
                draws   INTEGER NOT NULL DEFAULT 0 CHECK (draws >= 0),
                score   INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_games_status ON games(status, created_at);
            CREATE INDEX IF NOT EXISTS idx_leaderboard_score ON leaderboard(score DESC);
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock).
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    /// Run raw SQL against the store; lets tests break the schema.
    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> Result<()> {
        self.conn().execute_batch(sql).context("raw statement failed")
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    /// Register a user along with their leaderboard row. Returns `false`
    /// when the username or email is already taken.
    pub fn create_user(&self, username: &str, email: &str, password: &str) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;

        let taken: bool = tx
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1 OR email = ?2)",
                params![username, email],
                |row| row.get(0),
            )
            .context("failed to check for existing user")?;
        if taken {
            return Ok(false);
        }

        tx.execute(
            "INSERT INTO users (username, email, password_hash) VALUES (?1, ?2, ?3)",
            params![username, email, hash_password(password)],
        )
        .context("failed to insert user")?;
        let user_id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO leaderboard (user_id) VALUES (?1)",
            params![user_id],
        )
        .context("failed to insert leaderboard row")?;

        tx.commit().context("failed to commit create_user")?;
        Ok(true)
    }

    /// Check a username/password pair.
    pub fn verify_login(&self, username: &str, password: &str) -> Result<bool> {
        let conn = self.conn();
        let stored: Option<String> = conn
            .query_row(
                "SELECT password_hash FROM users WHERE username = ?1",
                params![username],
                |row| row.get(0),
            )
            .optional()
            .context("failed to look up user")?;
        Ok(stored.is_some_and(|hash| verify_password(&hash, password)))
    }

    /// Lifetime counters for `username`, or `None` for an unknown user.
    pub fn profile(&self, username: &str) -> Result<Option<Profile>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT game_played, wins, losses, draws FROM users WHERE username = ?1",
            params![username],
            |row| {
                Ok(Profile {
                    game_played: row.get(0)?,
                    wins: row.get(1)?,
                    losses: row.get(2)?,
                    draws: row.get(3)?,
                })
            },
        )
        .optional()
        .context("failed to load profile")
    }

    // ------------------------------------------------------------------
    // Login sessions
    // ------------------------------------------------------------------

    /// Open a login session for `username` and return its token.
    pub fn create_session(&self, username: &str, lifetime: Duration) -> Result<String> {
        let conn = self.conn();
        let token = uuid::Uuid::new_v4().simple().to_string();
        let expires_at = chrono::Utc::now().timestamp() + lifetime.as_secs() as i64;
        let inserted = conn
            .execute(
                "INSERT INTO sessions (token, user_id, expires_at)
                 SELECT ?1, id, ?3 FROM users WHERE username = ?2",
                params![token, username, expires_at],
            )
            .context("failed to create session")?;
        if inserted == 0 {
            bail!("cannot create session for unknown user {username}");
        }
        Ok(token)
    }

    /// Username owning an unexpired session `token`.
    pub fn session_user(&self, token: &str) -> Result<Option<String>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT u.username FROM sessions s JOIN users u ON u.id = s.user_id
             WHERE s.token = ?1 AND s.expires_at > ?2",
            params![token, chrono::Utc::now().timestamp()],
            |row| row.get(0),
        )
        .optional()
        .context("failed to look up session")
    }

    /// Drop expired sessions. Returns how many were removed.
    pub fn purge_expired_sessions(&self) -> Result<usize> {
        let conn = self.conn();
        conn.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            params![chrono::Utc::now().timestamp()],
        )
        .context("failed to purge expired sessions")
    }

    // ------------------------------------------------------------------
    // Games
    // ------------------------------------------------------------------

    /// Create a waiting game with `player1` to move first. Returns its id.
    pub fn create_game(&self, player1: &str) -> Result<String> {
        let conn = self.conn();
        let id = uuid::Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO games (id, player1, status, board, current_turn)
             VALUES (?1, ?2, 'waiting', ?3, ?2)",
            params![id, player1, board_json(&Board::new())?],
        )
        .context("failed to create game")?;
        Ok(id)
    }

    /// The waiting game created first, if any.
    pub fn oldest_waiting_game(&self) -> Result<Option<GameRecord>> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT {GAME_COLUMNS} FROM games WHERE status = 'waiting'
                 ORDER BY created_at, rowid LIMIT 1"
            ),
            [],
            game_from_row,
        )
        .optional()
        .context("failed to find waiting game")
    }

    /// Seat `player2` in a waiting game and start it. The start time is
    /// reset and player1 moves first.
    pub fn join_game(&self, game_id: &str, player2: &str) -> Result<()> {
        let conn = self.conn();
        let updated = conn
            .execute(
                "UPDATE games SET
                    player2 = ?2,
                    status = 'ongoing',
                    created_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                    current_turn = player1
                 WHERE id = ?1 AND status = 'waiting'",
                params![game_id, player2],
            )
            .context("failed to join game")?;
        if updated == 0 {
            bail!("game {game_id} is not waiting for a player");
        }
        Ok(())
    }

    pub fn get_game(&self, game_id: &str) -> Result<Option<GameRecord>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {GAME_COLUMNS} FROM games WHERE id = ?1"),
            params![game_id],
            game_from_row,
        )
        .optional()
        .context("failed to load game")
    }

    /// Persist the board after a move and hand the turn to `next_turn`.
    pub fn record_move(&self, game_id: &str, board: &Board, next_turn: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE games SET board = ?2, current_turn = ?3 WHERE id = ?1",
            params![game_id, board_json(board)?, next_turn],
        )
        .context("failed to record move")?;
        Ok(())
    }

    /// Mark an ongoing game completed and update both players' counters in
    /// one transaction. Win: +3 score for the winner. Draw: +1 for each.
    pub fn complete_game(&self, game_id: &str, end: &GameEnd) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;

        let players: Option<(String, Option<String>)> = tx
            .query_row(
                "SELECT player1, player2 FROM games WHERE id = ?1 AND status = 'ongoing'",
                params![game_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .context("failed to load game players")?;
        let Some((player1, Some(player2))) = players else {
            bail!("game {game_id} is not ongoing");
        };

        match end {
            GameEnd::Draw => {
                tx.execute(
                    "UPDATE games SET status = 'completed', is_draw = 1, current_turn = NULL,
                        ended_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?1",
                    params![game_id],
                )
                .context("failed to complete drawn game")?;
                for player in [&player1, &player2] {
                    tx.execute(
                        "UPDATE users SET draws = draws + 1, game_played = game_played + 1,
                            score = score + ?2
                         WHERE username = ?1",
                        params![player, DRAW_POINTS],
                    )
                    .context("failed to update user draws")?;
                    tx.execute(
                        "UPDATE leaderboard SET draws = draws + 1, score = score + ?2
                         WHERE user_id = (SELECT id FROM users WHERE username = ?1)",
                        params![player, DRAW_POINTS],
                    )
                    .context("failed to update leaderboard draws")?;
                }
            }
            GameEnd::Win {
                winner,
                loser,
                notes,
            } => {
                let seated = |name: &String| *name == player1 || *name == player2;
                if !seated(winner) || !seated(loser) || winner == loser {
                    bail!("{winner} and {loser} are not the two players of game {game_id}");
                }
                tx.execute(
                    "UPDATE games SET status = 'completed', winner = ?2, loser = ?3, notes = ?4,
                        current_turn = NULL, ended_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?1",
                    params![game_id, winner, loser, notes],
                )
                .context("failed to complete won game")?;
                tx.execute(
                    "UPDATE users SET wins = wins + 1, game_played = game_played + 1,
                        score = score + ?2
                     WHERE username = ?1",
                    params![winner, WIN_POINTS],
                )
                .context("failed to update winner")?;
                tx.execute(
                    "UPDATE users SET losses = losses + 1, game_played = game_played + 1
                     WHERE username = ?1",
                    params![loser],
                )
                .context("failed to update loser")?;
                tx.execute(
                    "UPDATE leaderboard SET wins = wins + 1, score = score + ?2
                     WHERE user_id = (SELECT id FROM users WHERE username = ?1)",
                    params![winner, WIN_POINTS],
                )
                .context("failed to update leaderboard wins")?;
            }
        }

        tx.commit().context("failed to commit complete_game")?;
        Ok(())
    }

    /// The waiting or ongoing game `username` sits in.
    pub fn active_game_for(&self, username: &str) -> Result<Option<GameRecord>> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT {GAME_COLUMNS} FROM games
                 WHERE (player1 = ?1 OR player2 = ?1) AND status IN ('waiting', 'ongoing')
                 ORDER BY created_at DESC LIMIT 1"
            ),
            params![username],
            game_from_row,
        )
        .optional()
        .context("failed to find active game")
    }

    pub fn is_player_in_game(&self, username: &str) -> Result<bool> {
        let conn = self.conn();
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM games
                    WHERE (player1 = ?1 OR player2 = ?1) AND status IN ('waiting', 'ongoing'))",
                params![username],
                |row| row.get(0),
            )
            .context("failed to check active games")?;
        Ok(exists)
    }

    pub fn delete_game(&self, game_id: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute("DELETE FROM games WHERE id = ?1", params![game_id])
            .context("failed to delete game")?;
        Ok(())
    }

    /// Remove every waiting or ongoing game. Returns how many were removed.
    pub fn delete_unfinished_games(&self) -> Result<usize> {
        let conn = self.conn();
        conn.execute(
            "DELETE FROM games WHERE status IN ('waiting', 'ongoing')",
            [],
        )
        .context("failed to delete unfinished games")
    }

    /// Resolve the active game of a player who left: a waiting game is
    /// deleted and an ongoing one goes to the opponent.
    pub fn withdraw_player(&self, username: &str) -> Result<Withdrawal> {
        let Some(game) = self.active_game_for(username)? else {
            return Ok(Withdrawal::None);
        };

        match (game.status, game.opponent_of(username)) {
            (GameStatus::Ongoing, Some(opponent)) => {
                let winner = opponent.to_string();
                self.complete_game(
                    &game.id,
                    &GameEnd::Win {
                        winner: winner.clone(),
                        loser: username.to_string(),
                        notes: Some(WITHDRAWAL_NOTES.to_string()),
                    },
                )?;
                Ok(Withdrawal::Forfeited {
                    game_id: game.id,
                    winner,
                })
            }
            _ => {
                self.delete_game(&game.id)?;
                Ok(Withdrawal::DeletedWaiting { game_id: game.id })
            }
        }
    }

    // ------------------------------------------------------------------
    // Listings
    // ------------------------------------------------------------------

    /// One page (1-based) of all games, oldest first, plus the total count.
    pub fn list_games(&self, page: u32, per_page: u32) -> Result<(Vec<GameSummary>, u64)> {
        let conn = self.conn();
        let total: i64 = conn
            .query_row("SELECT COUNT(*) FROM games", [], |row| row.get(0))
            .context("failed to count games")?;

        let offset = i64::from(page.saturating_sub(1)) * i64::from(per_page);
        let mut stmt = conn
            .prepare(
                "SELECT player1, player2, status, winner, loser, is_draw, notes, created_at, ended_at
                 FROM games ORDER BY rowid LIMIT ?1 OFFSET ?2",
            )
            .context("failed to prepare list_games query")?;
        let games = stmt
            .query_map(params![per_page, offset], |row| {
                let status: String = row.get(2)?;
                Ok(GameSummary {
                    player1: row.get(0)?,
                    player2: row.get(1)?,
                    status: GameStatus::parse(&status).unwrap_or(GameStatus::Completed),
                    winner: row.get(3)?,
                    loser: row.get(4)?,
                    is_draw: row.get(5)?,
                    notes: row.get(6)?,
                    created_at: row.get(7)?,
                    ended_at: row.get(8)?,
                })
            })
            .context("failed to query games")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map game rows")?;

        Ok((games, total as u64))
    }

    /// Top `limit` players by score.
    pub fn leaderboard(&self, limit: u32) -> Result<Vec<LeaderboardEntry>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT u.username, l.wins, l.draws, l.score
                 FROM leaderboard l JOIN users u ON u.id = l.user_id
                 ORDER BY l.score DESC, u.username LIMIT ?1",
            )
            .context("failed to prepare leaderboard query")?;
        let entries = stmt
            .query_map(params![limit], |row| {
                Ok(LeaderboardEntry {
                    username: row.get(0)?,
                    wins: row.get(1)?,
                    draws: row.get(2)?,
                    score: row.get(3)?,
                })
            })
            .context("failed to query leaderboard")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map leaderboard rows")?;
        Ok(entries)
    }

    pub fn leaderboard_entry(&self, username: &str) -> Result<Option<LeaderboardEntry>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT u.username, l.wins, l.draws, l.score
             FROM leaderboard l JOIN users u ON u.id = l.user_id
             WHERE u.username = ?1",
            params![username],
            |row| {
                Ok(LeaderboardEntry {
                    username: row.get(0)?,
                    wins: row.get(1)?,
                    draws: row.get(2)?,
                    score: row.get(3)?,
                })
            },
        )
        .optional()
        .context("failed to load leaderboard entry")
    }

    /// 1 + the number of players with a strictly higher score.
    pub fn user_rank(&self, username: &str) -> Result<Option<u64>> {
        let Some(entry) = self.leaderboard_entry(username)? else {
            return Ok(None);
        };
        let conn = self.conn();
        let higher: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM leaderboard WHERE score > ?1",
                params![entry.score],
                |row| row.get(0),
            )
            .context("failed to compute rank")?;
        Ok(Some(higher as u64 + 1))
    }
}
