pub mod app;
pub mod config;
pub mod profile;
pub mod protocol;
pub mod sound;
pub mod transport;
pub mod tui;
