use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::{rlog_debug, Error, Result};

pub const DEFAULT_LIST_LIMIT: usize = 10;
pub const DEFAULT_VALIDATION_WINDOW: usize = 50;
pub const DEFAULT_COMMITTER_NAME: &str = "rewind";
pub const DEFAULT_COMMITTER_EMAIL: &str = "rewind@localhost";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Repository used when `--repo` is not given.
    pub repo: Option<String>,
    /// Commits shown by `list` when no positive count is supplied.
    pub list_limit: Option<usize>,
    /// How many commits from HEAD numeric rebase instructions may address.
    pub validation_window: Option<usize>,
    /// Reflog entries shown when no count is supplied (0 = all).
    #[serde(default)]
    pub reflog_limit: usize,
    pub committer_name: Option<String>,
    pub committer_email: Option<String>,
}

impl Config {
    pub fn rewind_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".rewind"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::rewind_dir()?.join("rewind.toml"))
    }

    pub fn repo_path(&self) -> PathBuf {
        match &self.repo {
            Some(dir) => expand_tilde(dir),
            None => PathBuf::from("."),
        }
    }

    pub fn effective_list_limit(&self) -> usize {
        self.list_limit
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_LIST_LIMIT)
    }

    pub fn effective_validation_window(&self) -> usize {
        self.validation_window
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_VALIDATION_WINDOW)
    }

    /// Signature used for rewritten commits when the repository has no `user.name`.
    pub fn fallback_committer(&self) -> (&str, &str) {
        (
            self.committer_name.as_deref().unwrap_or(DEFAULT_COMMITTER_NAME),
            self.committer_email.as_deref().unwrap_or(DEFAULT_COMMITTER_EMAIL),
        )
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        rlog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            rlog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(&path)?)?;
        rlog_debug!(
            "Config loaded: repo={:?}, list_limit={:?}, validation_window={:?}",
            config.repo,
            config.list_limit,
            config.validation_window
        );
        Ok(config)
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
