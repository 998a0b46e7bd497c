use anyhow::{anyhow, Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

/// Main configuration structure for MineAgents
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MineAgentsConfig {
    /// Identity of this agent process
    pub agent: AgentIdentityConfig,
    /// Shared coordination document settings
    pub coordination: CoordinationConfig,
    /// Action retry settings
    pub executor: ExecutorConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentIdentityConfig {
    /// In-game bot name
    pub name: String,
    /// Team role (builder, miner, generalist, ...)
    pub role: String,
    /// Unique id of this process
    pub agent_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CoordinationConfig {
    /// Path to the shared coordination document
    pub file_path: String,
    /// Path to the advisory lock file guarding the document
    pub lock_path: String,
    /// Non-blocking lock attempts before an operation fails closed
    pub lock_attempts: u32,
    /// Delay between advisory lock attempts
    pub lock_retry_delay_ms: u64,
    /// Default resource lease length
    pub lock_ttl_ms: u64,
    /// Default time to wait for a contested resource
    pub lock_wait_ms: u64,
    /// Default poll interval while waiting for a resource
    pub lock_poll_ms: u64,
    /// Default leader lease length
    pub leader_ttl_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Attempts per step, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure
    pub base_backoff_ms: u64,
    /// Upper bound on a single backoff delay
    pub max_backoff_ms: Option<u64>,
    /// Randomise each delay into [delay/2, delay]
    pub jitter: bool,
    /// Per-attempt handler timeout
    pub attempt_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level used when RUST_LOG is not set
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for AgentIdentityConfig {
    fn default() -> Self {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "localhost".to_string());
        Self {
            name: "MineAgent".to_string(),
            role: "generalist".to_string(),
            agent_id: format!("{}-{}", host, std::process::id()),
        }
    }
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            file_path: ".mineagents/coordination.json".to_string(),
            lock_path: ".mineagents/coordination.lock".to_string(),
            lock_attempts: 20,
            lock_retry_delay_ms: 25,
            lock_ttl_ms: 15_000,
            lock_wait_ms: 5_000,
            lock_poll_ms: 200,
            leader_ttl_ms: 60_000,
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 250,
            max_backoff_ms: None,
            jitter: false,
            attempt_timeout_ms: None,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: true,
        }
    }
}

impl CoordinationConfig {
    pub fn leader_ttl(&self) -> Duration {
        Duration::from_millis(self.leader_ttl_ms)
    }
}

impl MineAgentsConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (mineagents.toml, .mineagents-rc)
    /// 3. Environment variables (MINEAGENTS__SECTION__KEY)
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Same as [`MineAgentsConfig::load`] but looks for files under `dir`.
    pub fn load_from(dir: &Path) -> Result<Self> {
        let mut builder = Config::builder();

        let toml_path = dir.join("mineagents.toml");
        if toml_path.exists() {
            builder = builder.add_source(File::from(toml_path));
        }

        let rc_path = dir.join(".mineagents-rc");
        if rc_path.exists() {
            builder = builder.add_source(File::from(rc_path).format(config::FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("MINEAGENTS")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let mine_agents_config: MineAgentsConfig = config.try_deserialize()?;
        Ok(mine_agents_config)
    }

    /// Write this configuration as TOML, creating parent directories.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)
            .with_context(|| format!("writing {}", path.display()))
    }

    /// Apply a `.env` file from the working directory or its parents.
    /// Returns the file that was applied, if any.
    pub fn load_env_file() -> Result<Option<PathBuf>> {
        match dotenvy::dotenv() {
            Ok(path) => {
                tracing::debug!(path = %path.display(), "Applied .env file");
                Ok(Some(path))
            }
            Err(e) if e.not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-wide configuration: `.env`, then files in the working directory,
/// then `MINEAGENTS__*` variables. Resolved on first access.
static PROCESS_CONFIG: LazyLock<Result<MineAgentsConfig, String>> = LazyLock::new(|| {
    MineAgentsConfig::load_env_file()
        .and_then(|_| MineAgentsConfig::load())
        .map_err(|e| format!("{e:#}"))
});

pub fn config() -> Result<&'static MineAgentsConfig> {
    PROCESS_CONFIG
        .as_ref()
        .map_err(|e| anyhow!("loading MineAgents configuration: {e}"))
}
