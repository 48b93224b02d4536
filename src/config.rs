use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::engine::DEFAULT_TOP_K;
use crate::providers::ollama::{DEFAULT_EMBED_MODEL, DEFAULT_LLM_MODEL, DEFAULT_OLLAMA_URL};
use crate::providers::OllamaConfig;
use crate::store::{
    StorePaths, DEFAULT_DOCUMENT_LIST_PATH, DEFAULT_PERSIST_DIR, DEFAULT_VECTOR_INDEX_PATH,
};

pub const CONFIG_FILE: &str = "nutri_rag";
pub const ENV_PREFIX: &str = "NUTRI_RAG";

/// Runtime settings shared by every subcommand.
///
/// Sources, later ones overriding earlier ones: built-in defaults, an
/// optional `nutri_rag.toml`, then `NUTRI_RAG_*` environment variables
/// (`NUTRI_RAG_SOURCES` takes a comma-separated list).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Settings {
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    #[serde(default = "default_embed_model")]
    pub embed_model: String,

    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    /// Context window requested from the generator.
    #[serde(default = "default_num_ctx")]
    pub num_ctx: u32,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_persist_dir")]
    pub persist_dir: PathBuf,

    #[serde(default = "default_vector_index_path")]
    pub vector_index_path: PathBuf,

    #[serde(default = "default_document_list_path")]
    pub document_list_path: PathBuf,

    /// CSV datasets read by `build`.
    #[serde(default = "default_sources")]
    pub sources: Vec<PathBuf>,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_max_concurrent_queries")]
    pub max_concurrent_queries: usize,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Interactive answers are streamed chunk by chunk when set.
    #[serde(default = "default_true")]
    pub streaming: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ollama_url: default_ollama_url(),
            embed_model: default_embed_model(),
            llm_model: default_llm_model(),
            num_ctx: default_num_ctx(),
            request_timeout_secs: default_request_timeout_secs(),
            top_k: default_top_k(),
            persist_dir: default_persist_dir(),
            vector_index_path: default_vector_index_path(),
            document_list_path: default_document_list_path(),
            sources: default_sources(),
            bind_addr: default_bind_addr(),
            port: default_port(),
            max_concurrent_queries: default_max_concurrent_queries(),
            log_level: default_log_level(),
            streaming: default_true(),
        }
    }
}

impl Settings {
    /// Loads `nutri_rag.{toml,json,yaml}` from the working directory if
    /// present, then applies environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        Self::build(config::File::with_name(CONFIG_FILE).required(false))
    }

    /// Same as [`Settings::load`] with an explicit, required config file.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        Self::build(config::File::from(path).required(true))
    }

    fn build<S>(file: S) -> anyhow::Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let builder = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("sources")
                    .try_parsing(true),
            );

        let settings: Settings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.bind_addr, self.port);
        Ok(addr_str.parse()?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn store_paths(&self) -> StorePaths {
        StorePaths {
            persist_dir: self.persist_dir.clone(),
            vector_index_path: self.vector_index_path.clone(),
            document_list_path: self.document_list_path.clone(),
        }
    }

    pub fn ollama_config(&self) -> OllamaConfig {
        OllamaConfig {
            base_url: self.ollama_url.clone(),
            embed_model: self.embed_model.clone(),
            llm_model: self.llm_model.clone(),
            num_ctx: self.num_ctx,
            request_timeout: self.request_timeout(),
        }
    }
}

fn default_ollama_url() -> String {
    DEFAULT_OLLAMA_URL.to_string()
}

fn default_embed_model() -> String {
    DEFAULT_EMBED_MODEL.to_string()
}

fn default_llm_model() -> String {
    DEFAULT_LLM_MODEL.to_string()
}

fn default_num_ctx() -> u32 {
    8192
}

fn default_request_timeout_secs() -> u64 {
    600
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_persist_dir() -> PathBuf {
    PathBuf::from(DEFAULT_PERSIST_DIR)
}

fn default_vector_index_path() -> PathBuf {
    PathBuf::from(DEFAULT_VECTOR_INDEX_PATH)
}

fn default_document_list_path() -> PathBuf {
    PathBuf::from(DEFAULT_DOCUMENT_LIST_PATH)
}

fn default_sources() -> Vec<PathBuf> {
    [
        "data/cleaned_nutrition_dataset_per100g.csv",
        "data/diet_recommendations_dataset.csv",
        "data/food_coded.csv",
        "data/healthy_foods_database.csv",
    ]
    .iter()
    .map(PathBuf::from)
    .collect()
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_concurrent_queries() -> usize {
    4
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}
