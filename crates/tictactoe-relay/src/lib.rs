// Tic-Tac-Toe relay: pairs players over WebSocket, forwards moves, keeps
// game records and profile counters in SQLite, and serves them over HTTP.

pub mod config;
pub mod db;
pub mod http;
pub mod hub;
pub mod ws_server;
