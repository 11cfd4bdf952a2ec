//! Environment-backed runtime configuration plus a toml-backed user config file.
//!
//! `Config` is captured once at process start and treated as an immutable
//! snapshot thereafter — not a live singleton re-read on every access.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_f32(name: &str, default: f32) -> f32 {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<f32>().ok())
        .unwrap_or(default)
}

fn env_opt_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_string(name: &str, default: &str) -> String {
    env_opt_string(name).unwrap_or_else(|| default.to_string())
}

fn default_storage_path() -> String {
    "data".to_string()
}
fn default_llm_provider() -> String {
    "anthropic".to_string()
}
fn default_max_short_term() -> u64 {
    20
}
fn default_max_context_memories() -> u64 {
    5
}
fn default_proactive_interval_secs() -> u64 {
    60
}
fn default_confidence_time_decay() -> f32 {
    0.001
}
fn default_merge_similarity_threshold() -> f32 {
    0.92
}
fn default_pagerank_weight_confidence() -> f32 {
    0.5
}
fn default_pagerank_weight_rank() -> f32 {
    0.3
}
fn default_pagerank_weight_recency() -> f32 {
    0.2
}
fn default_true() -> bool {
    true
}
fn default_half() -> f32 {
    0.5
}

/// Process-wide runtime configuration, read once via [`Config::from_env`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// `PSYCHO_LLM_PROVIDER`: `anthropic` | `ollama`. Default `anthropic`.
    #[serde(default = "default_llm_provider")]
    pub llm_provider: String,
    /// `PSYCHO_STORAGE_PATH`: root directory for `data/`. Default `data`.
    #[serde(default = "default_storage_path")]
    pub storage_path: String,
    /// `PSYCHO_MAX_SHORT_TERM_MESSAGES`. Default 20.
    #[serde(default = "default_max_short_term")]
    pub max_short_term_messages: u64,
    /// `PSYCHO_MAX_CONTEXT_MEMORIES`. Default 5.
    #[serde(default = "default_max_context_memories")]
    pub max_context_memories: u64,
    /// `PSYCHO_EXTRACTION_ENABLED`. Default true.
    #[serde(default = "default_true")]
    pub extraction_enabled: bool,
    /// `PSYCHO_REFLECTION_ENABLED`. Default true.
    #[serde(default = "default_true")]
    pub reflection_enabled: bool,
    /// `PSYCHO_PROACTIVE_ENABLED`. Default true.
    #[serde(default = "default_true")]
    pub proactive_enabled: bool,
    /// `PSYCHO_PROACTIVE_SCHEDULER_INTERVAL_SECS`. Default 60.
    #[serde(default = "default_proactive_interval_secs")]
    pub proactive_scheduler_interval_secs: u64,
    /// `PSYCHO_CHECKIN_ENABLED`. Default false.
    #[serde(default)]
    pub checkin_enabled: bool,
    /// `PSYCHO_WEB_SEARCH_ENABLED`. Default false.
    #[serde(default)]
    pub web_search_enabled: bool,
    /// `PSYCHO_TTS_ENABLED`. Default false.
    #[serde(default)]
    pub tts_enabled: bool,
    /// `PSYCHO_STT_ENABLED`. Default false.
    #[serde(default)]
    pub stt_enabled: bool,
    /// Personality default trait ratio (0..=1), `PSYCHO_PERSONALITY_HUMOR`.
    #[serde(default = "default_half")]
    pub personality_humor: f32,
    /// `PSYCHO_CONFIDENCE_TIME_DECAY`. Default 0.001/day.
    #[serde(default = "default_confidence_time_decay")]
    pub confidence_time_decay: f32,
    /// `PSYCHO_MERGE_SIMILARITY_THRESHOLD`. Default 0.92.
    #[serde(default = "default_merge_similarity_threshold")]
    pub merge_similarity_threshold: f32,
    /// `PSYCHO_PAGERANK_WEIGHT_CONFIDENCE`. Default 0.5.
    #[serde(default = "default_pagerank_weight_confidence")]
    pub pagerank_weight_confidence: f32,
    /// `PSYCHO_PAGERANK_WEIGHT_RANK`. Default 0.3.
    #[serde(default = "default_pagerank_weight_rank")]
    pub pagerank_weight_rank: f32,
    /// `PSYCHO_PAGERANK_WEIGHT_RECENCY`. Default 0.2.
    #[serde(default = "default_pagerank_weight_recency")]
    pub pagerank_weight_recency: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            llm_provider: env_string("PSYCHO_LLM_PROVIDER", &default_llm_provider()),
            storage_path: env_string("PSYCHO_STORAGE_PATH", &default_storage_path()),
            max_short_term_messages: env_u64("PSYCHO_MAX_SHORT_TERM_MESSAGES", default_max_short_term()),
            max_context_memories: env_u64("PSYCHO_MAX_CONTEXT_MEMORIES", default_max_context_memories()),
            extraction_enabled: env_bool("PSYCHO_EXTRACTION_ENABLED", true),
            reflection_enabled: env_bool("PSYCHO_REFLECTION_ENABLED", true),
            proactive_enabled: env_bool("PSYCHO_PROACTIVE_ENABLED", true),
            proactive_scheduler_interval_secs: env_u64(
                "PSYCHO_PROACTIVE_SCHEDULER_INTERVAL_SECS",
                default_proactive_interval_secs(),
            ),
            checkin_enabled: env_bool("PSYCHO_CHECKIN_ENABLED", false),
            web_search_enabled: env_bool("PSYCHO_WEB_SEARCH_ENABLED", false),
            tts_enabled: env_bool("PSYCHO_TTS_ENABLED", false),
            stt_enabled: env_bool("PSYCHO_STT_ENABLED", false),
            personality_humor: env_f32("PSYCHO_PERSONALITY_HUMOR", 0.5),
            confidence_time_decay: env_f32("PSYCHO_CONFIDENCE_TIME_DECAY", default_confidence_time_decay()),
            merge_similarity_threshold: env_f32(
                "PSYCHO_MERGE_SIMILARITY_THRESHOLD",
                default_merge_similarity_threshold(),
            ),
            pagerank_weight_confidence: env_f32(
                "PSYCHO_PAGERANK_WEIGHT_CONFIDENCE",
                default_pagerank_weight_confidence(),
            ),
            pagerank_weight_rank: env_f32("PSYCHO_PAGERANK_WEIGHT_RANK", default_pagerank_weight_rank()),
            pagerank_weight_recency: env_f32(
                "PSYCHO_PAGERANK_WEIGHT_RECENCY",
                default_pagerank_weight_recency(),
            ),
        }
    }

    pub fn storage_root(&self) -> PathBuf {
        PathBuf::from(&self.storage_path)
    }

    pub fn relational_db_path(&self) -> PathBuf {
        self.storage_root().join("psycho.db")
    }

    pub fn vectors_dir(&self) -> PathBuf {
        self.storage_root().join("vectors")
    }

    pub fn graph_dir(&self) -> PathBuf {
        self.storage_root().join("graph")
    }

    pub fn journals_dir(&self) -> PathBuf {
        self.storage_root().join("journals")
    }

    pub fn personality_path(&self) -> PathBuf {
        self.storage_root().join("personality.json")
    }

    /// `true` selects the local Ollama OpenAI-compatible endpoint; anything
    /// else (including the default `anthropic`) routes through OpenRouter.
    pub fn uses_ollama(&self) -> bool {
        self.llm_provider.eq_ignore_ascii_case("ollama")
    }
}

/// User-editable settings persisted to `user_config.toml`, with env-var fallback.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserConfig {
    pub api_key: Option<String>,
    pub llm_model: Option<String>,
    pub llm_api_url: Option<String>,
    #[serde(default)]
    pub first_run_complete: bool,
}

impl UserConfig {
    pub fn load() -> Self {
        Self::load_from_path(&Self::default_path())
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from("user_config.toml")
    }

    pub fn load_from_path(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| toml::from_str(&s).ok())
            .unwrap_or_default()
    }

    pub fn save(&self) -> std::io::Result<()> {
        self.save_to_path(&Self::default_path())
    }

    pub fn save_to_path(&self, path: &Path) -> std::io::Result<()> {
        let body = toml::to_string_pretty(self).unwrap_or_default();
        std::fs::write(path, body)
    }

    pub fn set_api_key(&mut self, key: impl Into<String>) {
        self.api_key = Some(key.into());
    }

    /// Priority chain: explicit field, then environment, filtering empty strings.
    pub fn get_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
            .or_else(|| std::env::var("PSYCHO_LLM_API_KEY").ok())
            .filter(|s| !s.is_empty())
    }

    pub fn get_llm_model(&self) -> String {
        self.llm_model
            .clone()
            .or_else(|| std::env::var("PSYCHO_LLM_MODEL").ok())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "anthropic/claude-3.5-haiku".to_string())
    }

    pub fn get_llm_api_url(&self) -> String {
        self.llm_api_url
            .clone()
            .or_else(|| std::env::var("PSYCHO_LLM_API_URL").ok())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "https://openrouter.ai/api/v1/chat/completions".to_string())
    }

    pub fn is_first_run(&self) -> bool {
        !self.first_run_complete
    }

    pub fn complete_first_run(&mut self) {
        self.first_run_complete = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let c = Config::from_env();
        assert_eq!(c.max_short_term_messages, 20);
        assert!(c.extraction_enabled);
        assert!((c.merge_similarity_threshold - 0.92).abs() < 1e-6);
    }

    #[test]
    fn user_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_config.toml");
        let mut uc = UserConfig::default();
        uc.set_api_key("sk-test");
        uc.save_to_path(&path).unwrap();
        let loaded = UserConfig::load_from_path(&path);
        assert_eq!(loaded.get_api_key().as_deref(), Some("sk-test"));
    }
}
