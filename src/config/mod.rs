//! Playground configuration management for `quern.toml`.
//!
//! # Sections
//!
//! | Section        | Purpose                                            |
//! |----------------|----------------------------------------------------|
//! | `[playground]` | Backend selection (local or remote)                |
//! | `[remote]`     | Session service endpoint and public page URL       |
//! | `[local]`      | In-process compiler command and prelude            |
//! | `[edit]`       | Debounce quiet period, output file                 |
//!
//! A missing config file is fine - every field has a default - but unknown
//! keys in an existing file are reported, so typos don't silently disable
//! what they were meant to configure.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::cli::Cli;
use crate::log;
use crate::session::{DEFAULT_QUIET_MS, page_from_channel};

// ============================================================================
// Errors
// ============================================================================

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config file parsing error")]
    Toml(#[from] toml::de::Error),

    #[error("Config validation error: {0}")]
    Validation(String),
}

// ============================================================================
// Sections
// ============================================================================

/// Compile backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Run the compiler in-process
    Local,
    /// Delegate to a playground service over a persistent channel
    Remote,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// `[playground]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaygroundSection {
    /// Which backend compiles edits. A fixed choice per deployment;
    /// `--backend` overrides it for one run.
    pub backend: BackendKind,
}

impl Default for PlaygroundSection {
    fn default() -> Self {
        Self {
            backend: BackendKind::Local,
        }
    }
}

/// `[remote]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSection {
    /// WebSocket endpoint of the playground service
    pub url: String,
    /// Public page used when composing share links. Defaults to the channel
    /// endpoint with an http(s) scheme.
    pub page: Option<String>,
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8572/play".to_string(),
            page: None,
        }
    }
}

/// `[local]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalSection {
    /// Compiler executable, resolved on first use
    pub command: PathBuf,
    /// Snippet prepended to every source before compilation
    pub prelude: Option<PathBuf>,
}

impl Default for LocalSection {
    fn default() -> Self {
        Self {
            command: PathBuf::from("jsonnet"),
            prelude: None,
        }
    }
}

/// `[edit]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EditSection {
    /// Quiet period between a keystroke and the compile it triggers (ms)
    pub debounce_ms: u64,
    /// Where compiled output is written (default: the source file with a
    /// `.sql` extension)
    pub output: Option<PathBuf>,
}

impl Default for EditSection {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_QUIET_MS,
            output: None,
        }
    }
}

// ============================================================================
// Root configuration
// ============================================================================

/// Root configuration structure representing quern.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayConfig {
    /// Absolute path to the config file (internal use only)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Project root directory - parent of config file (internal use only)
    #[serde(skip)]
    pub root: PathBuf,

    #[serde(default)]
    pub playground: PlaygroundSection,

    #[serde(default)]
    pub remote: RemoteSection,

    #[serde(default)]
    pub local: LocalSection,

    #[serde(default)]
    pub edit: EditSection,
}

impl PlayConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration for this invocation.
    ///
    /// A missing file yields the defaults; an existing file is parsed with
    /// unknown-field detection.
    pub fn load(cli: &Cli) -> Result<Self> {
        let path = &cli.config;
        if !path.is_file() {
            crate::debug!("config"; "no {} found, using defaults", path.display());
            let mut config = Self::default();
            config.root = std::env::current_dir().unwrap_or_default();
            config.validate()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)
            .map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        let (mut config, ignored) = Self::parse_with_ignored(&content)?;
        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }

        config.config_path = path.clone();
        config.root = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>)> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })
        .map_err(ConfigError::Toml)?;
        Ok((config, ignored))
    }

    /// Print warning about unknown fields.
    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {}, ignoring:", display_path);
        for field in fields {
            eprintln!("- {}", field);
        }
    }

    /// Check the cross-field constraints that serde can't express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.edit.debounce_ms == 0 {
            return Err(ConfigError::Validation(
                "edit.debounce_ms must be positive".to_string(),
            ));
        }
        let channel = Url::parse(&self.remote.url).map_err(|e| {
            ConfigError::Validation(format!("remote.url `{}`: {}", self.remote.url, e))
        })?;
        if !matches!(channel.scheme(), "ws" | "wss") {
            return Err(ConfigError::Validation(format!(
                "remote.url `{}` must use a ws:// or wss:// scheme",
                self.remote.url
            )));
        }
        if let Some(page) = &self.remote.page {
            let page = Url::parse(page)
                .map_err(|e| ConfigError::Validation(format!("remote.page `{page}`: {e}")))?;
            if !matches!(page.scheme(), "http" | "https") {
                return Err(ConfigError::Validation(format!(
                    "remote.page `{page}` must use an http:// or https:// scheme"
                )));
            }
        }
        Ok(())
    }

    /// Parsed channel endpoint. Valid after `validate`.
    pub fn remote_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.remote.url).map_err(|e| {
            ConfigError::Validation(format!("remote.url `{}`: {}", self.remote.url, e))
        })
    }

    /// Public page for share links: `remote.page`, or derived from the
    /// channel endpoint.
    pub fn page_url(&self) -> Result<Url, ConfigError> {
        match &self.remote.page {
            Some(page) => Url::parse(page)
                .map_err(|e| ConfigError::Validation(format!("remote.page `{page}`: {e}"))),
            None => Ok(page_from_channel(&self.remote_url()?)),
        }
    }

    /// The debouncer's quiet period
    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.edit.debounce_ms)
    }
}

// ============================================================================
// Tests
// ============================================================================
