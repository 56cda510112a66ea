use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    // HTTP listener
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    // Local store
    #[serde(default = "default_database_path")]
    pub database_path: String,

    // LLM configuration (OpenAI-compatible: Jan, Ollama, LM Studio, vLLM, etc.)
    #[serde(default = "default_llm_url")]
    pub llm_api_url: String,
    #[serde(default = "default_llm_api_key")]
    pub llm_api_key: String,
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,
    #[serde(default = "default_llm_temperature")]
    pub llm_temperature: f32,
    #[serde(default = "default_llm_max_tokens")]
    pub llm_max_tokens: u32,

    // Auction
    #[serde(default = "default_starting_price")]
    pub starting_price: i64,
    #[serde(default = "default_bid_increment")]
    pub bid_increment: i64,
    #[serde(default = "default_lord_term_hours")]
    pub lord_term_hours: i64,

    // Answer memory
    #[serde(default = "default_memory_key_chars")]
    pub memory_key_chars: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_database_path() -> String {
    "shapiro.db".to_string()
}

fn default_llm_url() -> String {
    "http://localhost:1337/v1".to_string()
}

fn default_llm_api_key() -> String {
    "bombom123".to_string()
}

fn default_llm_model() -> String {
    "Llama-3_2-1B-Instruct_IQ4_XS".to_string()
}

fn default_llm_timeout_secs() -> u64 {
    30
}

fn default_llm_temperature() -> f32 {
    0.7
}

fn default_llm_max_tokens() -> u32 {
    100
}

fn default_starting_price() -> i64 {
    50
}

fn default_bid_increment() -> i64 {
    50
}

fn default_lord_term_hours() -> i64 {
    24
}

fn default_memory_key_chars() -> usize {
    crate::memory::DEFAULT_KEY_CHARS
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            database_path: default_database_path(),
            llm_api_url: default_llm_url(),
            llm_api_key: default_llm_api_key(),
            llm_model: default_llm_model(),
            llm_timeout_secs: default_llm_timeout_secs(),
            llm_temperature: default_llm_temperature(),
            llm_max_tokens: default_llm_max_tokens(),
            starting_price: default_starting_price(),
            bid_increment: default_bid_increment(),
            lord_term_hours: default_lord_term_hours(),
            memory_key_chars: default_memory_key_chars(),
        }
    }
}

impl ServiceConfig {
    /// Get the directory containing the executable
    fn get_base_dir() -> PathBuf {
        match std::env::current_exe() {
            Ok(exe_path) => exe_path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".")),
            Err(_) => PathBuf::from("."),
        }
    }

    /// Get the path to the config file (relative to executable)
    pub fn config_path() -> PathBuf {
        Self::get_base_dir().join("shapiro_config.toml")
    }

    /// Load config from shapiro_config.toml (next to executable), then apply env overrides
    pub fn load() -> Self {
        let path = Self::config_path();

        let base = match fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str::<ServiceConfig>(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {:?}", path);
                    config
                }
                Err(e) => {
                    tracing::error!("Failed to parse {:?}: {}", path, e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::warn!("No config file found, using defaults + env vars");
                Self::default()
            }
        };

        base.with_env_overrides()
    }

    /// Overlay environment variables on top of an existing config
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(addr) = env::var("SHAPIRO_BIND") {
            if !addr.trim().is_empty() {
                self.bind_addr = addr;
            }
        }

        if let Ok(path) = env::var("SHAPIRO_DATABASE_PATH") {
            if !path.trim().is_empty() {
                self.database_path = path;
            }
        }

        if let Ok(url) = env::var("LLM_API_URL") {
            self.llm_api_url = url;
        }

        if let Ok(key) = env::var("LLM_API_KEY") {
            self.llm_api_key = key;
        }

        if let Ok(model) = env::var("LLM_MODEL") {
            self.llm_model = model;
        }

        if let Ok(timeout) = env::var("LLM_TIMEOUT_SECS") {
            if let Ok(seconds) = timeout.parse() {
                self.llm_timeout_secs = seconds;
            }
        }

        self
    }
}
