use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Reviewers never listed as pending on a waiting PR unless configured otherwise.
pub const DEFAULT_EXCLUDED_BOTS: [&str; 4] = [
    "coderabbitai",
    "copilot-pull-request-reviewer",
    "github-actions",
    "copilot-swe-agent",
];

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

const LOCAL_CONFIG: &str = ".daily-report.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Top-level configuration loaded from `.daily-report.toml`.
/// Every field is optional; the tool works with zero config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Organization used when `--org` is omitted
    pub default_org: Option<String>,

    /// User used when `--user` is omitted
    pub default_user: Option<String>,

    /// Extra git author identities matched alongside the username
    #[serde(default)]
    pub git_emails: Vec<String>,

    /// Reviewer handles dropped from waiting-for-review lists
    pub excluded_bots: Option<Vec<String>>,

    /// Directory scanned for local clones
    pub repos_dir: Option<PathBuf>,

    /// Per-repository `git fetch` timeout
    pub fetch_timeout_secs: Option<u64>,

    /// Explicit local clones, used when no scan directory is set
    #[serde(default)]
    pub repos: Vec<RepoConfig>,

    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub ai: AiConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubConfig {
    /// GitHub API token. If None, falls back to GITHUB_TOKEN, then GH_TOKEN.
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AiConfig {
    pub model: Option<String>,
    pub consolidate_prompt: Option<String>,
    pub summary_prompt: Option<String>,
}

/// A configured local clone. `org`/`name` are read from the origin remote
/// when omitted.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoConfig {
    pub path: PathBuf,
    pub org: Option<String>,
    pub name: Option<String>,
}

impl Config {
    /// Load configuration. An explicit path must exist; otherwise
    /// `./.daily-report.toml`, then `~/.config/daily-report/config.toml`,
    /// else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Config, ConfigError> {
        let mut config = match explicit {
            Some(path) => Self::load_from(path)?,
            None => match Self::candidate_paths().into_iter().find(|p| p.exists()) {
                Some(path) => Self::load_from(&path)?,
                None => Config::default(),
            },
        };

        if config.github.token.is_none() {
            config.github.token = env_token();
        }

        Ok(config)
    }

    /// Load from a specific path (useful for testing).
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Config = toml::from_str(&contents)?;
        config.normalize()?;
        Ok(config)
    }

    fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG)];
        if let Some(home) = std::env::var_os("HOME") {
            paths.push(
                PathBuf::from(home)
                    .join(".config")
                    .join("daily-report")
                    .join("config.toml"),
            );
        }
        paths
    }

    fn normalize(&mut self) -> Result<(), ConfigError> {
        if self.fetch_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid {
                key: "fetch_timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        self.repos_dir = self.repos_dir.as_deref().map(expand_path);
        for repo in &mut self.repos {
            repo.path = expand_path(&repo.path);
        }
        Ok(())
    }

    /// Resolve the GitHub token: config file value takes precedence,
    /// then GITHUB_TOKEN, then GH_TOKEN.
    pub fn github_token(&self) -> Option<String> {
        self.github
            .token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(env_token)
    }

    pub fn excluded_bots(&self) -> Vec<String> {
        match &self.excluded_bots {
            Some(bots) => bots.clone(),
            None => DEFAULT_EXCLUDED_BOTS.iter().map(|b| b.to_string()).collect(),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.unwrap_or(30))
    }

    pub fn model(&self) -> &str {
        self.ai.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

fn env_token() -> Option<String> {
    ["GITHUB_TOKEN", "GH_TOKEN"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|t| !t.is_empty())
}

/// Expand a leading `~` or `$VAR` component.
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    if raw == "~" || raw.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(raw.trim_start_matches('~').trim_start_matches('/'));
        }
    }
    if let Some(rest) = raw.strip_prefix('$') {
        let (var, tail) = rest.split_once('/').unwrap_or((rest, ""));
        if let Some(value) = std::env::var_os(var) {
            return PathBuf::from(value).join(tail);
        }
    }
    path.to_path_buf()
}
