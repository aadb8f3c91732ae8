//! Per-repository CLI configuration.
//!
//! Read from `<git-dir>/gitlite.toml` when present:
//!
//! ```toml
//! branch = "master"
//!
//! [user]
//! name = "Ada"
//! email = "ada@example.com"
//!
//! [remote]
//! url = "https://example.com/project.git"
//! username = "ada"
//! timeout_secs = 30
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Name of the configuration file inside the git directory.
pub const CONFIG_FILE: &str = "gitlite.toml";

/// CLI configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Branch new repositories start on.
    pub branch: Option<String>,
    /// Commit identity.
    pub user: UserConfig,
    /// Push target.
    pub remote: RemoteConfig,
}

/// Commit identity.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct UserConfig {
    /// Author name.
    pub name: String,
    /// Author email; an unset email is written as `<>`.
    pub email: Option<String>,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            name: "gitlite".to_string(),
            email: None,
        }
    }
}

impl UserConfig {
    /// The author string recorded in commits, always `name <email>`.
    pub fn author(&self) -> String {
        format!("{} <{}>", self.name, self.email.as_deref().unwrap_or_default())
    }
}

/// Push target and HTTP settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct RemoteConfig {
    /// Repository URL, e.g. `https://host/owner/repo.git`.
    pub url: Option<String>,
    /// Basic-auth user name.
    pub username: Option<String>,
    /// Basic-auth password or token.
    pub password: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// User agent header.
    pub user_agent: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: None,
            username: None,
            password: None,
            timeout_secs: 30,
            user_agent: gitlite_git::DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl RemoteConfig {
    /// Request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Basic-auth credentials, if a user name is configured.
    pub fn credentials(&self) -> Option<gitlite_git::Credentials> {
        self.username.as_ref().map(|username| {
            gitlite_git::Credentials::new(username, self.password.clone().unwrap_or_default())
        })
    }
}

impl Config {
    /// Loads `<git-dir>/gitlite.toml`, falling back to defaults, then
    /// applies `GITLITE_*` environment overrides.
    pub fn load(git_dir: &Path) -> anyhow::Result<Self> {
        let mut config = Self::from_file(&git_dir.join(CONFIG_FILE))?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Reads a config file; a missing file yields the defaults.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let config = toml::from_str(&content)
                    .map_err(|e| anyhow::anyhow!("invalid {}: {}", path.display(), e))?;
                tracing::debug!(path = %path.display(), "loaded config");
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(anyhow::anyhow!("cannot read {}: {}", path.display(), e)),
        }
    }

    /// Overrides remote settings from `GITLITE_REMOTE`, `GITLITE_USERNAME`
    /// and `GITLITE_PASSWORD`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("GITLITE_REMOTE") {
            self.remote.url = Some(url);
        }
        if let Some(username) = lookup("GITLITE_USERNAME") {
            self.remote.username = Some(username);
        }
        if let Some(password) = lookup("GITLITE_PASSWORD") {
            self.remote.password = Some(password);
        }
    }
}
