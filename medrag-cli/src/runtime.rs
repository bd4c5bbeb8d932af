//! Building pipelines and collaborators from command-line settings.

use std::sync::Arc;

use anyhow::{Context, Result};
use medrag_pubmed::{
    Collector, LlmQueryRewriter, PubMedClient, PubMedConfig, QueryRewriter, VerbatimRewriter,
};
use medrag_rag::{
    EmbeddingProvider, HashingEmbeddingProvider, LlmFaithfulnessScorer, LlmRelevanceScorer,
    OpenAIConfig, OpenAIEmbeddingProvider, OpenAIGenerator, RagConfig, RagPipeline,
    RetrievalMode, TextGenerator,
};
use tracing::info;

use crate::args::GlobalArgs;

/// The retrieval config file, if any, with command-line overrides applied.
pub fn rag_config(global: &GlobalArgs) -> Result<RagConfig> {
    let mut config = match &global.config {
        Some(path) => RagConfig::from_json_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => RagConfig::default(),
    };
    if let Some(mode) = global.mode {
        config.retrieval_mode = mode.into();
    }
    if let Some(top_k) = global.top_k {
        config.top_k = top_k;
    }
    config.validate()?;
    Ok(config)
}

fn openai_config(global: &GlobalArgs) -> OpenAIConfig {
    let mut config = OpenAIConfig { chat_model: global.model.clone(), ..OpenAIConfig::default() };
    if let Some(base_url) = &global.base_url {
        config.base_url = base_url.clone();
    }
    config
}

pub fn generator(global: &GlobalArgs) -> Result<Arc<dyn TextGenerator>> {
    let generator = OpenAIGenerator::from_config(&openai_config(global))
        .context("failed to create the chat client (is OPENAI_API_KEY set?)")?;
    Ok(Arc::new(generator))
}

fn embedding_provider(global: &GlobalArgs) -> Result<Arc<dyn EmbeddingProvider>> {
    if global.offline_embeddings {
        return Ok(Arc::new(HashingEmbeddingProvider::default()));
    }
    let provider = OpenAIEmbeddingProvider::from_config(&openai_config(global))
        .context("failed to create the embeddings client (is OPENAI_API_KEY set?)")?;
    Ok(Arc::new(provider))
}

/// A pipeline over the configured retriever and chat model; with
/// `evaluate`, the same model also judges relevance and faithfulness.
pub fn pipeline(global: &GlobalArgs, evaluate: bool) -> Result<RagPipeline> {
    let config = rag_config(global)?;
    let generator = generator(global)?;

    let mut builder = RagPipeline::builder().config(config.clone()).generator(generator.clone());
    if config.retrieval_mode == RetrievalMode::Embedding {
        builder = builder.embedding_provider(embedding_provider(global)?);
    }
    if evaluate {
        builder = builder.scorers(
            Arc::new(LlmRelevanceScorer::new(generator.clone())),
            Arc::new(LlmFaithfulnessScorer::new(generator)),
        );
    }

    info!(mode = ?config.retrieval_mode, top_k = config.top_k, "pipeline configured");
    Ok(builder.build()?)
}

/// A PubMed collector, rewriting questions with the chat model unless
/// `rewrite` is false.
pub fn collector(global: &GlobalArgs, max_results: usize, rewrite: bool) -> Result<Collector> {
    let config = PubMedConfig { max_results, ..PubMedConfig::from_env() };
    let parallel = config.max_parallel_fetches;
    let client = Arc::new(PubMedClient::new(config)?);

    let rewriter: Arc<dyn QueryRewriter> = if rewrite {
        Arc::new(LlmQueryRewriter::new(generator(global)?))
    } else {
        Arc::new(VerbatimRewriter)
    };

    Ok(Collector::new(rewriter, client.clone(), client)
        .with_max_results(max_results)
        .with_max_parallel_fetches(parallel))
}
