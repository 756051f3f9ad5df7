//! Collaborators shared by every research stage

use std::sync::Arc;

use crate::config::{FetchConfig, ResearchConfig, SearchConfig};
use crate::llm::Generator;
use crate::prompts::PromptLoader;
use crate::search::WebRetriever;

#[derive(Clone)]
pub struct ResearchContext {
    pub generator: Generator,
    pub retriever: Arc<dyn WebRetriever>,
    pub prompts: Arc<PromptLoader>,
    pub research: ResearchConfig,
    pub search: SearchConfig,
    pub fetch: FetchConfig,
}
