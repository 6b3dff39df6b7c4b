use chorus_core::{ChorusError, ConsistencyMode, DynKvStore, Result, StoreTarget, open_store};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub votes: VotesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
    #[serde(default = "default_max_batch_items")]
    pub max_batch_items: usize,
}

fn default_max_batch_items() -> usize {
    chorus_core::operations::DEFAULT_MAX_ITEMS
}

/// Store backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    #[serde(default)]
    pub namespace: Option<String>,
    pub redis: Option<RedisConfig>,
}

impl StoreConfig {
    pub fn namespace_or_default(&self) -> &str {
        self.namespace
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or("chorus")
    }

    pub fn target(&self) -> Result<StoreTarget> {
        match self.backend {
            StoreBackend::Redis => {
                let redis = self.redis.as_ref().ok_or_else(|| {
                    ChorusError::Config(
                        "redis configuration is required for redis backend".to_string(),
                    )
                })?;
                Ok(StoreTarget::Redis {
                    url: redis.url.clone(),
                })
            }
            StoreBackend::Memory => Ok(StoreTarget::Memory),
        }
    }

    pub async fn open(&self) -> Result<DynKvStore> {
        open_store(&self.target()?, self.namespace_or_default()).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    Memory,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Redis => "redis",
            StoreBackend::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VotesConfig {
    #[serde(default)]
    pub consistency: ConsistencyMode,
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let builder = ::config::Config::builder().add_source(::config::File::with_name(path));
        Self::from_sources(builder)
    }

    fn from_sources(
        builder: ::config::ConfigBuilder<::config::builder::DefaultState>,
    ) -> Result<Self> {
        let settings = builder
            .add_source(::config::Environment::with_prefix("CHORUS").separator("__"))
            .build()
            .map_err(|e| ChorusError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| ChorusError::Config(e.to_string()))?;

        Ok(config)
    }
}
