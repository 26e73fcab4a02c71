use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_GATEWAY_PORT: u16 = 4200;
/// Default request timeout in seconds (spec.md §5 "every outbound call has a
/// configurable timeout, default 60s").
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
/// Dedup jobs get a longer deadline (spec.md §5).
pub const DEDUP_TIMEOUT_SECS: u64 = 300;

/// Top-level configuration: `backbone.toml` + `BACKBONE_*` env overrides
/// (SPEC_FULL.md ambient stack, grounded on `SkynetConfig::load`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub summary: SummaryConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Admin contact id (spec.md §4.5 step 2 admin gate). A contact whose
    /// resolved id matches this value gets intent-pass enrichment, memory
    /// lookup, and a personal mode; all others are "guest".
    pub admin_contact_id: Option<String>,
    #[serde(default)]
    pub brainlets: Vec<BrainletConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            gateway: GatewayConfig::default(),
            database: DatabaseConfig::default(),
            providers: ProvidersConfig::default(),
            ledger: LedgerConfig::default(),
            summary: SummaryConfig::default(),
            memory: MemoryConfig::default(),
            admin_contact_id: None,
            brainlets: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    pub anthropic: Option<AnthropicConfig>,
    pub openai: Option<OpenAiConfig>,
    pub ollama: Option<OllamaConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    pub api_key: String,
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    pub api_key: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,
}

/// Ledger tuning (SPEC_FULL.md supplemented feature: buffer tail window,
/// spec.md §9 Open Question made concrete).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_buffer_window")]
    pub buffer_window: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            buffer_window: default_buffer_window(),
        }
    }
}

/// Per-rollup-level token budgets (spec.md §6 `summary.{..}_max_tokens`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    #[serde(default = "default_periodic_max_tokens")]
    pub periodic_max_tokens: usize,
    #[serde(default = "default_daily_max_tokens")]
    pub daily_max_tokens: usize,
    #[serde(default = "default_weekly_max_tokens")]
    pub weekly_max_tokens: usize,
    #[serde(default = "default_monthly_max_tokens")]
    pub monthly_max_tokens: usize,
    /// Number of most recent summaries fed into a turn's system prompt
    /// (spec.md §4.5 step 7, default 4).
    #[serde(default = "default_recent_summary_count")]
    pub recent_summary_count: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            periodic_max_tokens: default_periodic_max_tokens(),
            daily_max_tokens: default_daily_max_tokens(),
            weekly_max_tokens: default_weekly_max_tokens(),
            monthly_max_tokens: default_monthly_max_tokens(),
            recent_summary_count: default_recent_summary_count(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_min_shared_keywords")]
    pub min_shared_keywords: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_min_memory_count")]
    pub min_memory_count: usize,
    #[serde(default = "default_max_clusters")]
    pub max_clusters_to_process: usize,
    #[serde(default = "default_max_groups")]
    pub max_groups_to_process: usize,
    #[serde(default = "default_max_memories_per_group")]
    pub max_memories_per_group: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            min_shared_keywords: default_min_shared_keywords(),
            similarity_threshold: default_similarity_threshold(),
            min_memory_count: default_min_memory_count(),
            max_clusters_to_process: default_max_clusters(),
            max_groups_to_process: default_max_groups(),
            max_memories_per_group: default_max_memories_per_group(),
        }
    }
}

/// A named orchestrator plug-in (spec.md §6, GLOSSARY "Brainlet").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrainletConfig {
    pub name: String,
    pub model: Option<String>,
    #[serde(default)]
    pub options: serde_json::Value,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}
fn default_gateway_port() -> u16 {
    DEFAULT_GATEWAY_PORT
}
fn default_bind() -> String {
    "127.0.0.1".to_string()
}
fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.backbone/backbone.db", home)
}
fn default_buffer_window() -> usize {
    20
}
fn default_periodic_max_tokens() -> usize {
    4096
}
fn default_daily_max_tokens() -> usize {
    4096
}
fn default_weekly_max_tokens() -> usize {
    4096
}
fn default_monthly_max_tokens() -> usize {
    4096
}
fn default_recent_summary_count() -> usize {
    4
}
fn default_min_shared_keywords() -> usize {
    2
}
fn default_similarity_threshold() -> f64 {
    0.65
}
fn default_min_memory_count() -> usize {
    2
}
fn default_max_clusters() -> usize {
    10
}
fn default_max_groups() -> usize {
    10
}
fn default_max_memories_per_group() -> usize {
    20
}

impl Config {
    /// Load config from a TOML file with `BACKBONE_*` env var overrides.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: Config = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("BACKBONE_").split("_"))
            .extract()
            .map_err(|e| crate::error::BackboneError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.backbone/backbone.toml", home)
}
