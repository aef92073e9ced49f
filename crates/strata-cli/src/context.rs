//! Shared state every subcommand needs: where the repository lives, and how
//! loud to be about it.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use strata::{Repository, Result};

/// Wall-clock seconds since the epoch, for stamping CLI-constructed intents.
/// The core library never calls this itself — every timestamp it records
/// (states, transitions, lanes) is stamped internally; only intents built
/// from user input need one supplied at the call site.
#[must_use]
pub fn now_secs() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

/// Global flags threaded into every subcommand: output format and
/// verbosity.
pub struct Context {
    pub repo_override: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
    pub verbose: bool,
}

impl Context {
    /// Opens the repository by discovering `.store` upward from the
    /// override path (or the current directory).
    pub fn open(&self) -> Result<Repository> {
        let start = match &self.repo_override {
            Some(p) => p.clone(),
            None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        };
        Repository::discover(&start)
    }

    /// The directory `init` should create the repository at.
    pub fn init_root(&self) -> PathBuf {
        self.repo_override.clone().unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }

    /// Renders a hash or id: full 64 hex chars under `-v`, else a 12-char
    /// short form.
    #[must_use]
    pub fn short(&self, full: &str) -> String {
        if self.verbose || full.len() <= 12 {
            full.to_owned()
        } else {
            full[..12].to_owned()
        }
    }
}
