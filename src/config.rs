use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub taxonomy: TaxonomyConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub relocation: RelocationConfig,
    #[serde(default)]
    pub counters: CountersConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TaxonomyConfig {
    /// Path to the taxonomy JSON document.
    pub path: PathBuf,
    /// Path of the precomputed category vector cache.
    #[serde(default = "default_vector_cache")]
    pub vector_cache: PathBuf,
}

fn default_vector_cache() -> PathBuf {
    PathBuf::from("./data/category_vectors.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 10,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    10
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MatcherConfig {
    /// How many suggestions to return.
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
        }
    }
}

fn default_top_n() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Default-slot items per box before the box number advances.
    #[serde(default = "default_box_capacity")]
    pub box_capacity: u64,
    /// Feature-text markers routing an item to refrigerated storage.
    #[serde(default = "default_food_markers")]
    pub food_markers: Vec<String>,
    /// Markers upgrading a food item to frozen storage.
    #[serde(default = "default_frozen_markers")]
    pub frozen_markers: Vec<String>,
    /// Medium-category labels treated as the umbrella class.
    #[serde(default = "default_umbrella_labels")]
    pub umbrella_labels: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            box_capacity: default_box_capacity(),
            food_markers: default_food_markers(),
            frozen_markers: default_frozen_markers(),
            umbrella_labels: default_umbrella_labels(),
        }
    }
}

fn default_box_capacity() -> u64 {
    20
}
fn default_food_markers() -> Vec<String> {
    ["食品", "食べ物", "生もの", "弁当", "ケーキ", "飲料"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_frozen_markers() -> Vec<String> {
    ["冷凍", "アイス"].iter().map(|s| s.to_string()).collect()
}
fn default_umbrella_labels() -> Vec<String> {
    ["傘", "かさ", "umbrella"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RelocationConfig {
    /// Days an item dwells in its initial slot before the long-term move.
    #[serde(default = "default_dwell_days")]
    pub dwell_days: i64,
}

impl Default for RelocationConfig {
    fn default() -> Self {
        Self {
            dwell_days: default_dwell_days(),
        }
    }
}

fn default_dwell_days() -> i64 {
    7
}

#[derive(Debug, Deserialize, Clone)]
pub struct CountersConfig {
    /// Path of the counter state file used by the CLI.
    #[serde(default = "default_counter_state")]
    pub state_path: PathBuf,
}

impl Default for CountersConfig {
    fn default() -> Self {
        Self {
            state_path: default_counter_state(),
        }
    }
}

fn default_counter_state() -> PathBuf {
    PathBuf::from("./data/counters.json")
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.matcher.top_n == 0 {
        anyhow::bail!("matcher.top_n must be >= 1");
    }

    if config.storage.box_capacity == 0 {
        anyhow::bail!("storage.box_capacity must be >= 1");
    }

    if config.relocation.dwell_days < 0 {
        anyhow::bail!("relocation.dwell_days must be >= 0");
    }

    if config.embedding.is_enabled() {
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    Ok(config)
}
