//! Application state for the HTTP host: the learning engine over an
//! in-memory store seeded from the built-in catalog and the optional TOML bank.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::clock::SystemClock;
use crate::config::{load_engine_config_from_env, EngineConfig};
use crate::engine::LearningEngine;
use crate::error::{ConfigError, StoreError};
use crate::generator::{ContentGenerator, OpenAiGenerator};
use crate::seeds::install_catalog;
use crate::store::MemoryStore;

pub struct AppState {
    pub engine: LearningEngine,
    pub generator: Option<&'static str>,
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("catalog install failed: {0}")]
    Catalog(#[from] StoreError),
}

impl AppState {
    /// Build state from env: load config, seed the catalog, init the OpenAI client.
    #[instrument(level = "info", skip_all)]
    pub async fn from_env() -> Result<Self, StartupError> {
        let cfg = load_engine_config_from_env()?;
        let generator = OpenAiGenerator::from_env(cfg.generation.clone()).map(|g| {
            info!(target: "prepcore", model = %g.model, base_url = %g.base_url, "OpenAI generation enabled");
            Arc::new(g) as Arc<dyn ContentGenerator>
        });
        if generator.is_none() {
            warn!(target: "prepcore", "OPENAI_API_KEY not set; unmatched content will get the static fallback question");
        }
        Self::build(&cfg, generator).await
    }

    pub async fn build(cfg: &EngineConfig, generator: Option<Arc<dyn ContentGenerator>>) -> Result<Self, StartupError> {
        let store = Arc::new(MemoryStore::new());
        install_catalog(&store, cfg).await?;
        let name = generator.as_ref().map(|g| g.name());
        let engine = LearningEngine::new(store, Arc::new(SystemClock), cfg, generator);
        Ok(Self { engine, generator: name })
    }
}
