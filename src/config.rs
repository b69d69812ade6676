use crate::llm::{LlmSettings, Provider, provider::DEFAULT_AZURE_API_VERSION};
use crate::memory::MemoryConfig;
use crate::session::{CommitPolicy, SessionSettings};
use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file picked up from the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "gng-memory.yaml";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// User whose memory this session uses
    #[arg(short, long, env = "GNG_USER")]
    pub user: Option<String>,

    /// Use the deterministic hashed embedder instead of downloading a model
    #[arg(long)]
    pub offline: bool,

    /// Ask for a 1-5 rating after every reply
    #[arg(long)]
    pub feedback: bool,

    /// Ask the assistant to help build self efficacy
    #[arg(long)]
    pub coaching: bool,

    /// Snapshot file loaded at start (when present) and written at exit
    #[arg(long, env = "GNG_SNAPSHOT")]
    pub snapshot: Option<PathBuf>,

    /// Minimum cosine similarity for merging into an existing node
    #[arg(long)]
    pub similarity_threshold: Option<f32>,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub memory: MemoryConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub session: SessionConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    #[default]
    Fastembed,
    Hashed,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbedderKind,
    /// fastembed model name, e.g. `all-MiniLM-L6-v2`.
    pub model: String,
    /// Output dimension; must match the model for `fastembed`.
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbedderKind::Fastembed,
            model: "all-MiniLM-L6-v2".to_string(),
            dimension: 384,
        }
    }
}

/// Endpoint details come from `LLM_*` variables, see [`load_llm_settings`].
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self { timeout_secs: 60 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SessionConfig {
    pub user: String,
    pub commit_policy: CommitPolicy,
    pub coaching: bool,
    pub feedback: bool,
    pub history_limit: usize,
    pub token_budget: Option<usize>,
    /// Seconds between background decay passes; 0 disables the task.
    pub decay_interval_secs: u64,
    pub snapshot_path: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user: "default".to_string(),
            commit_policy: CommitPolicy::BeforeGenerate,
            coaching: false,
            feedback: false,
            history_limit: 5,
            token_budget: None,
            decay_interval_secs: 30,
            snapshot_path: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TelemetryConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    pub filter: String,
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: "info,gng_memory=debug".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    /// Layering, lowest to highest: built-in defaults, config file,
    /// `GNG_` environment variables, command line.
    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder();

        // 1. Config file: explicit path must exist, the cwd fallback may not
        if let Some(path) = &cli.config {
            builder = builder.add_source(File::from(Path::new(path)).required(true));
        } else if Path::new(DEFAULT_CONFIG_FILE).exists() {
            builder = builder.add_source(File::from(Path::new(DEFAULT_CONFIG_FILE)));
        }

        // 2. Environment, e.g. GNG_MEMORY__SIMILARITY_THRESHOLD=0.7
        builder = builder.add_source(
            Environment::with_prefix("GNG")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // 3. CLI overrides
        if let Some(user) = &cli.user {
            builder = builder.set_override("session.user", user.as_str())?;
        }
        if cli.offline {
            builder = builder.set_override("embedding.provider", "hashed")?;
        }
        if cli.feedback {
            builder = builder.set_override("session.feedback", true)?;
        }
        if cli.coaching {
            builder = builder.set_override("session.coaching", true)?;
        }
        if let Some(path) = &cli.snapshot {
            builder =
                builder.set_override("session.snapshot_path", path.to_string_lossy().as_ref())?;
        }
        if let Some(threshold) = cli.similarity_threshold {
            builder = builder.set_override("memory.similarity_threshold", f64::from(threshold))?;
        }
        if cli.log_json {
            builder = builder.set_override("telemetry.json", true)?;
        }

        let cfg = builder.build()?;
        let app: Self = cfg.try_deserialize()?;
        app.memory
            .validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(app)
    }

    #[must_use]
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            commit_policy: self.session.commit_policy,
            generation_timeout: Duration::from_secs(self.llm.timeout_secs),
            coaching: self.session.coaching,
            history_limit: self.session.history_limit,
            token_budget: self.session.token_budget,
        }
    }

    /// `None` when background decay is disabled.
    #[must_use]
    pub fn decay_interval(&self) -> Option<Duration> {
        (self.session.decay_interval_secs > 0)
            .then(|| Duration::from_secs(self.session.decay_interval_secs))
    }
}

pub fn load_llm_settings() -> Result<LlmSettings, String> {
    let base_url = std::env::var("LLM_BASE_URL")
        .map_err(|_| "Missing required env var: LLM_BASE_URL".to_string())?;
    if base_url.trim().is_empty() {
        return Err("LLM_BASE_URL cannot be empty".to_string());
    }

    let model = std::env::var("LLM_MODEL")
        .map_err(|_| "Missing required env var: LLM_MODEL".to_string())?;
    if model.trim().is_empty() {
        return Err("LLM_MODEL cannot be empty".to_string());
    }

    let api_key = std::env::var("LLM_API_KEY")
        .ok()
        .filter(|s| !s.trim().is_empty());

    let mut provider = Provider::detect_from_url(&base_url);

    // Azure routes by deployment, which the URL alone does not name
    if let Provider::AzureOpenAI { .. } = &provider {
        let deployment = std::env::var("AZURE_DEPLOYMENT_NAME")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                format!("Azure endpoint {base_url} requires AZURE_DEPLOYMENT_NAME to be set")
            })?;
        provider = Provider::AzureOpenAI {
            deployment_name: deployment,
            api_version: std::env::var("AZURE_API_VERSION")
                .unwrap_or_else(|_| DEFAULT_AZURE_API_VERSION.to_string()),
        };
    }

    Ok(LlmSettings {
        base_url,
        api_key,
        model,
        provider,
    })
}
