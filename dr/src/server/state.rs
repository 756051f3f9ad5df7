//! Shared handler state

use std::sync::Arc;

use eyre::Result;
use tracing::debug;

use crate::config::Config;
use crate::llm::{Generator, create_client};
use crate::progress::ProgressHub;
use crate::prompts::PromptLoader;
use crate::research::{Orchestrator, ResearchContext, ResearchRunner};
use crate::search::create_retriever;
use crate::store::{MemoryStore, SessionStore};

/// Everything a request handler needs; cheap to clone
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub runner: ResearchRunner,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire the production collaborators described by `config`
    pub fn from_config(config: Config) -> Result<Self> {
        debug!(provider = %config.llm.provider, model = %config.llm.model, "AppState::from_config: called");
        let llm = create_client(&config.llm)?;
        let retriever = create_retriever(&config)?;
        let ctx = ResearchContext {
            generator: Generator::new(llm, &config.llm),
            retriever,
            prompts: Arc::new(PromptLoader::new(std::env::current_dir()?)),
            research: config.research.clone(),
            search: config.search.clone(),
            fetch: config.fetch.clone(),
        };
        Ok(Self::new(ctx, Arc::new(MemoryStore::spawn()), config))
    }

    /// Assemble state around an existing context and store
    pub fn new(ctx: ResearchContext, store: Arc<dyn SessionStore>, config: Config) -> Self {
        let hub = ProgressHub::new(ctx.research.progress_poll());
        let orchestrator = Orchestrator::new(store, hub, ctx);
        let runner = ResearchRunner::new(orchestrator.clone());
        Self {
            orchestrator,
            runner,
            config: Arc::new(config),
        }
    }
}
