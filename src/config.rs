//! Fetcher configuration.

use std::path::PathBuf;

use tracing::debug;

/// Organization that owns the course repositories.
pub const DEFAULT_OWNER: &str = "RedHatTraining";

/// GitHub REST API root.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Environment variables checked for an access token, in order.
const TOKEN_VARS: &[&str] = &["github_token", "GITHUB_TOKEN"];

/// Settings for the source repository fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Access token; without one only public repositories are reachable.
    pub token: Option<String>,
    pub owner: String,
    pub api_base: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            token: None,
            owner: DEFAULT_OWNER.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }
}

impl Config {
    /// Defaults plus a token from the environment or the shell config file.
    pub fn load() -> Self {
        let from_env = TOKEN_VARS
            .iter()
            .find_map(|var| std::env::var(var).ok())
            .filter(|t| !t.trim().is_empty());

        let token = from_env.or_else(|| {
            let path = shell_config_path()?;
            let contents = std::fs::read_to_string(&path).ok()?;
            debug!("reading token from {}", path.display());
            token_from_shell(&contents)
        });

        Self {
            token,
            ..Self::default()
        }
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }
}

/// `~/.weconfig/config.sh`.
pub fn shell_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".weconfig").join("config.sh"))
}

/// Last `github_token=` assignment in a shell script, quotes removed.
pub fn token_from_shell(contents: &str) -> Option<String> {
    contents
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);
            line.strip_prefix("github_token=")
        })
        .map(|value| value.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
        .filter(|value| !value.is_empty())
        .last()
}
