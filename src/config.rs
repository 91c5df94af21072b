//! Engine configuration, loaded from `~/.cmdmux/config.toml`.
//!
//! Every field has a default so an absent or partial file is fine:
//!
//! ```toml
//! default_dialect = "powershell"
//! scrollback_chunks = 2000
//! output_queue_capacity = 256
//! terminate_grace_ms = 1500
//! default_split_ratio = 0.5
//!
//! [aliases]
//! ll = "dir"
//! ```

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::types::Dialect;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Dialect used for panes created without an explicit one.
    pub default_dialect: Dialect,
    /// Scrollback cap per pane, in output chunks. Oldest evicted first.
    pub scrollback_chunks: usize,
    /// Per-pane consumer queue capacity, in chunks. When a consumer
    /// falls this far behind, oldest chunks are dropped and a truncation
    /// marker is inserted.
    pub output_queue_capacity: usize,
    /// How long `terminate` waits before force-killing an unresponsive
    /// child process.
    pub terminate_grace_ms: u64,
    /// Ratio used by split commands that omit one.
    pub default_split_ratio: f32,
    /// Override the resolved PowerShell program (tests, portable shells).
    pub powershell_program: Option<String>,
    /// Override the resolved CMD program.
    pub cmd_program: Option<String>,
    /// Shortcut table seeded into the command dispatcher.
    pub aliases: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            default_dialect: Dialect::PowerShell,
            scrollback_chunks: 2000,
            output_queue_capacity: 256,
            terminate_grace_ms: 1500,
            default_split_ratio: 0.5,
            powershell_program: None,
            cmd_program: None,
            aliases: HashMap::new(),
        }
    }
}

impl Config {
    /// Load from the default location, falling back to defaults when the
    /// file is missing or malformed.
    pub fn load() -> Config {
        match config_path() {
            Some(path) if path.exists() => match Self::load_from(&path) {
                Ok(cfg) => cfg,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "config unreadable, using defaults");
                    Config::default()
                }
            },
            _ => Config::default(),
        }
    }

    pub fn load_from(path: &Path) -> Result<Config> {
        let text = fs::read_to_string(path)?;
        let mut cfg: Config = toml::from_str(&text)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        cfg.clamp();
        Ok(cfg)
    }

    /// Pull out-of-range values back to workable bounds rather than
    /// erroring; a bad ratio or zero-size queue would otherwise break
    /// every split and poll.
    pub fn clamp(&mut self) {
        if self.scrollback_chunks == 0 {
            warn!("scrollback_chunks of 0 raised to 1");
            self.scrollback_chunks = 1;
        }
        if self.output_queue_capacity < 2 {
            warn!("output_queue_capacity below 2 raised to 2");
            self.output_queue_capacity = 2;
        }
        if !(self.default_split_ratio > 0.0 && self.default_split_ratio < 1.0) {
            warn!(ratio = self.default_split_ratio as f64, "default_split_ratio out of (0, 1), reset to 0.5");
            self.default_split_ratio = 0.5;
        }
    }
}

fn home_dir() -> Option<String> {
    env::var("USERPROFILE").or_else(|_| env::var("HOME")).ok()
}

pub fn config_path() -> Option<PathBuf> {
    home_dir().map(|h| PathBuf::from(h).join(".cmdmux").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_workable() {
        let cfg = Config::default();
        assert_eq!(cfg.default_dialect, Dialect::PowerShell);
        assert!(cfg.output_queue_capacity >= 2);
        assert!(cfg.default_split_ratio > 0.0 && cfg.default_split_ratio < 1.0);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: Config = toml::from_str("scrollback_chunks = 10\n").unwrap();
        assert_eq!(cfg.scrollback_chunks, 10);
        assert_eq!(cfg.output_queue_capacity, Config::default().output_queue_capacity);
    }

    #[test]
    fn dialect_and_aliases_parse() {
        let text = "default_dialect = \"cmd\"\n[aliases]\nll = \"dir\"\n";
        let cfg: Config = toml::from_str(text).unwrap();
        assert_eq!(cfg.default_dialect, Dialect::Cmd);
        assert_eq!(cfg.aliases.get("ll").map(String::as_str), Some("dir"));
    }

    #[test]
    fn clamp_repairs_bad_values() {
        let mut cfg = Config::default();
        cfg.output_queue_capacity = 0;
        cfg.default_split_ratio = 1.5;
        cfg.scrollback_chunks = 0;
        cfg.clamp();
        assert_eq!(cfg.output_queue_capacity, 2);
        assert_eq!(cfg.default_split_ratio, 0.5);
        assert_eq!(cfg.scrollback_chunks, 1);
    }

    #[test]
    fn round_trips_through_toml() {
        let mut cfg = Config::default();
        cfg.aliases.insert("gs".into(), "git status".into());
        let text = toml::to_string(&cfg).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.aliases.get("gs").map(String::as_str), Some("git status"));
        assert_eq!(back.default_dialect, cfg.default_dialect);
    }
}
