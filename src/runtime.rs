use std::sync::Arc;

use anyhow::{Context, Result};

use crate::auction::{AuctionHouse, AuctionRules};
use crate::config::ServiceConfig;
use crate::database::ShapiroDatabase;
use crate::llm_client::{ChatCompletion, LlmClient};
use crate::memory::AnswerStore;
use crate::responder::Responder;

/// Services constructed once at startup and shared by every request.
pub struct BackendRuntime {
    pub config: ServiceConfig,
    pub db: Arc<ShapiroDatabase>,
    pub answers: AnswerStore,
    pub auction: AuctionHouse,
    pub responder: Arc<Responder>,
}

pub struct BackendRuntimeBuilder {
    config: ServiceConfig,
    llm: Option<Arc<dyn ChatCompletion>>,
    responder_seed: Option<u64>,
}

impl BackendRuntimeBuilder {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            llm: None,
            responder_seed: None,
        }
    }

    /// Use `llm` instead of an HTTP client built from the config.
    pub fn with_llm(mut self, llm: Arc<dyn ChatCompletion>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Seed honorific selection.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.responder_seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<BackendRuntime> {
        let config = self.config;

        let db = Arc::new(
            ShapiroDatabase::new(&config.database_path).with_context(|| {
                format!("Failed to open database at '{}'", config.database_path)
            })?,
        );

        let llm = match self.llm {
            Some(llm) => llm,
            None => {
                let client = LlmClient::from_config(&config)?;
                tracing::info!(
                    "LLM backend: {} (model {}, timeout {}s)",
                    config.llm_api_url,
                    client.model(),
                    config.llm_timeout_secs
                );
                Arc::new(client)
            }
        };

        let answers = AnswerStore::new(db.clone(), config.memory_key_chars);
        let auction = AuctionHouse::new(db.clone(), AuctionRules::from_config(&config))
            .context("Failed to initialize auction state")?;

        let responder = match self.responder_seed {
            Some(seed) => {
                use rand::SeedableRng;
                Responder::with_rng(
                    answers.clone(),
                    auction.clone(),
                    llm,
                    rand::rngs::StdRng::seed_from_u64(seed),
                )
            }
            None => Responder::new(answers.clone(), auction.clone(), llm),
        };

        Ok(BackendRuntime {
            config,
            db,
            answers,
            auction,
            responder: Arc::new(responder),
        })
    }
}

impl BackendRuntime {
    pub fn bootstrap(config: ServiceConfig) -> Result<Self> {
        BackendRuntimeBuilder::new(config).build()
    }
}
