// Audio cues for moves and the end of a game.

use std::io::Write;

use tracing::debug;

use crate::config::SoundConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sound {
    /// The turn passed to the other player.
    Click,
    /// The game just ended.
    GameOver,
}

pub trait SoundPlayer: Send + Sync {
    fn play(&mut self, sound: Sound);
}

/// Rings the terminal bell: once for a click, twice for game over.
pub struct TerminalBell<W: Write + Send + Sync> {
    out: W,
}

impl TerminalBell<std::io::Stdout> {
    pub fn stdout() -> Self {
        TerminalBell {
            out: std::io::stdout(),
        }
    }
}

impl<W: Write + Send + Sync> TerminalBell<W> {
    pub fn new(out: W) -> Self {
        TerminalBell { out }
    }
}

impl<W: Write + Send + Sync> SoundPlayer for TerminalBell<W> {
    fn play(&mut self, sound: Sound) {
        let bells: &[u8] = match sound {
            Sound::Click => b"\x07",
            Sound::GameOver => b"\x07\x07",
        };
        if let Err(e) = self.out.write_all(bells).and_then(|_| self.out.flush()) {
            debug!("terminal bell failed: {e}");
        }
    }
}

/// Plays nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct Muted;

impl SoundPlayer for Muted {
    fn play(&mut self, _sound: Sound) {}
}

/// Pick the player configured in `[sound]`.
pub fn from_config(config: &SoundConfig) -> Box<dyn SoundPlayer> {
    if config.enabled {
        Box::new(TerminalBell::stdout())
    } else {
        Box::new(Muted)
    }
}
