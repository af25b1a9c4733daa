//! Configuration for postwatch.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (POSTWATCH_HOME, POSTWATCH_TELEGRAM_TOKEN,
//!    POSTWATCH_TELEGRAM_CHAT_ID, POSTWATCH_OPENAI_KEY)
//! 2. Config file (.postwatch/config.yaml)
//! 3. Defaults (~/.postwatch)
//!
//! Config file discovery:
//! - Searches current directory and parents for .postwatch/config.yaml
//! - Paths in the config file are relative to its .postwatch/ directory

pub mod paths;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::adapters::{OpenAiConfig, ScriptConfig, TelegramConfig};
use crate::core::{EngineSettings, SchedulerSettings};

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Major version of the config file schema
const SUPPORTED_CONFIG_VERSION: &str = "1";

const ENV_HOME: &str = "POSTWATCH_HOME";
const ENV_TELEGRAM_TOKEN: &str = "POSTWATCH_TELEGRAM_TOKEN";
const ENV_TELEGRAM_CHAT_ID: &str = "POSTWATCH_TELEGRAM_CHAT_ID";
const ENV_OPENAI_KEY: &str = "POSTWATCH_OPENAI_KEY";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub telegram: Option<TelegramFileConfig>,
    #[serde(default)]
    pub enrichment: Option<EnrichmentConfig>,
    #[serde(default)]
    pub platform: Option<ScriptConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .postwatch/)
    pub home: Option<String>,
    /// Store file (relative to .postwatch/)
    pub store: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkflowConfig {
    pub poll_interval_minutes: Option<u64>,
    pub lookback: Option<usize>,
    pub error_cooldown_seconds: Option<u64>,
    pub immediate_fetch: Option<bool>,
    pub retention_days: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelegramFileConfig {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    pub poll_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnrichmentConfig {
    pub backend: Option<EnrichmentBackend>,
    pub model: Option<String>,
    pub prompt: Option<String>,
    pub api_key: Option<String>,
    /// Fabric pattern name
    pub pattern: Option<String>,
    /// Fabric binary
    pub binary: Option<String>,
}

/// Which commentary generator to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentBackend {
    #[default]
    Openai,
    Fabric,
}

/// Polling and retention settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowSettings {
    pub poll_interval_minutes: u64,
    pub lookback: usize,
    pub error_cooldown_seconds: u64,
    pub immediate_fetch: bool,
    pub retention_days: Option<u32>,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            poll_interval_minutes: 10,
            lookback: 10,
            error_cooldown_seconds: 60,
            immediate_fetch: true,
            retention_days: None,
        }
    }
}

/// Commentary generator settings
#[derive(Debug, Clone)]
pub struct EnrichmentSettings {
    pub backend: EnrichmentBackend,
    pub openai: OpenAiConfig,
    pub fabric_pattern: String,
    pub fabric_binary: String,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            backend: EnrichmentBackend::default(),
            openai: OpenAiConfig::default(),
            fabric_pattern: "write_comment".to_string(),
            fabric_binary: "fabric".to_string(),
        }
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to postwatch home (state)
    pub home: PathBuf,
    /// Post store file
    pub store_path: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub workflow: WorkflowSettings,
    /// None until both token and chat id are known
    pub telegram: Option<TelegramConfig>,
    pub enrichment: EnrichmentSettings,
    pub platform: Option<ScriptConfig>,
}

impl ResolvedConfig {
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            lookback: self.workflow.lookback.max(1),
            retention: self
                .workflow
                .retention_days
                .map(|days| chrono::Duration::days(i64::from(days))),
            ..Default::default()
        }
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            poll_interval: Duration::from_secs(self.workflow.poll_interval_minutes.max(1) * 60),
            error_cooldown: Duration::from_secs(self.workflow.error_cooldown_seconds),
            immediate_fetch: self.workflow.immediate_fetch,
        }
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = paths::config_file_in(&current);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: ConfigFile = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    if let Some(version) = config.version.as_deref() {
        let major = version.split('.').next().unwrap_or_default().trim();
        if major != SUPPORTED_CONFIG_VERSION {
            anyhow::bail!(
                "Unsupported config version {:?} in {} (expected {})",
                version,
                path.display(),
                SUPPORTED_CONFIG_VERSION
            );
        }
    }

    Ok(config)
}

/// Resolve a path that may be relative to the config directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Merge file contents, environment and defaults
fn resolve(
    file: Option<(PathBuf, ConfigFile)>,
    env: impl Fn(&str) -> Option<String>,
    default_home: PathBuf,
) -> ResolvedConfig {
    let (config_file, config) = match file {
        Some((path, config)) => (Some(path), config),
        None => (None, ConfigFile::default()),
    };
    let config_dir = config_file
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf);

    let home = if let Some(env_home) = non_empty(env(ENV_HOME)) {
        PathBuf::from(env_home)
    } else {
        match (&config_dir, &config.paths.home) {
            (Some(dir), Some(home)) => resolve_path(dir, home),
            _ => default_home,
        }
    };

    let store_path = match (&config_dir, &config.paths.store) {
        (Some(dir), Some(store)) => resolve_path(dir, store),
        _ => home.join(paths::STORE_FILE),
    };

    let defaults = WorkflowSettings::default();
    let workflow = WorkflowSettings {
        poll_interval_minutes: config
            .workflow
            .poll_interval_minutes
            .unwrap_or(defaults.poll_interval_minutes),
        lookback: config.workflow.lookback.unwrap_or(defaults.lookback),
        error_cooldown_seconds: config
            .workflow
            .error_cooldown_seconds
            .unwrap_or(defaults.error_cooldown_seconds),
        immediate_fetch: config
            .workflow
            .immediate_fetch
            .unwrap_or(defaults.immediate_fetch),
        retention_days: config.workflow.retention_days,
    };

    let telegram_file = config.telegram.unwrap_or_default();
    let bot_token = non_empty(env(ENV_TELEGRAM_TOKEN)).or(non_empty(telegram_file.bot_token));
    let chat_id = non_empty(env(ENV_TELEGRAM_CHAT_ID)).or(non_empty(telegram_file.chat_id));
    let telegram = match (bot_token, chat_id) {
        (Some(bot_token), Some(chat_id)) => Some(TelegramConfig {
            bot_token,
            chat_id,
            poll_timeout_seconds: telegram_file.poll_timeout_seconds.unwrap_or(30),
        }),
        _ => None,
    };

    let enrichment_file = config.enrichment.unwrap_or_default();
    let mut enrichment = EnrichmentSettings::default();
    enrichment.backend = enrichment_file.backend.unwrap_or_default();
    enrichment.openai.api_key =
        non_empty(env(ENV_OPENAI_KEY)).or(non_empty(enrichment_file.api_key));
    if let Some(model) = non_empty(enrichment_file.model) {
        enrichment.openai.model = model;
    }
    if let Some(prompt) = non_empty(enrichment_file.prompt) {
        enrichment.openai.prompt = prompt;
    }
    if let Some(pattern) = non_empty(enrichment_file.pattern) {
        enrichment.fabric_pattern = pattern;
    }
    if let Some(binary) = non_empty(enrichment_file.binary) {
        enrichment.fabric_binary = binary;
    }

    ResolvedConfig {
        home,
        store_path,
        config_file,
        workflow,
        telegram,
        enrichment,
        platform: config.platform,
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home =
        paths::default_home(&dirs::home_dir().context("Failed to determine home directory")?);

    let file = match find_config_file() {
        Some(path) => {
            let config = load_config_file(&path)?;
            Some((path, config))
        }
        None => None,
    };

    Ok(resolve(file, |key| std::env::var(key).ok(), default_home))
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}
