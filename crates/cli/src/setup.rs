//! Turns the loaded configuration into the concrete providers, index settings
//! and tools the commands run with.

use std::{sync::Arc, time::Duration};

use {
    anyhow::Context,
    gqlrag_agents::{AgentConfig, ToolRegistry, providers::OpenAiCompatProvider},
    gqlrag_config::{
        AgentSection, EmbeddingsSection, GqlragConfig, GraphqlSection, LlmSection, MetricName,
    },
    gqlrag_memory::{
        EmbeddingProvider, IndexConfig, Metric, embeddings_openai::OpenAiEmbeddingProvider,
    },
    gqlrag_tools::GraphqlQueryTool,
    secrecy::{ExposeSecret, Secret},
    tracing::info,
};

use crate::{Cli, Command};

pub fn load_config(cli: &Cli) -> anyhow::Result<GqlragConfig> {
    let (mut config, path) = gqlrag_config::load(cli.config.as_deref())?;
    match &path {
        Some(path) => info!(path = %path.display(), "using config file"),
        None => info!("no config file, using defaults"),
    }
    apply_overrides(&mut config, cli);
    config.apply_env(|name| std::env::var(name).ok());
    config.validate()?;
    Ok(config)
}

fn apply_overrides(config: &mut GqlragConfig, cli: &Cli) {
    if let Some(schema) = &cli.schema {
        config.schema.path = schema.clone();
    }
    if let Some(dir) = &cli.index_dir {
        config.index.dir = dir.clone();
    }
    match &cli.command {
        Command::Index => {},
        Command::Search { k, .. } => {
            if let Some(k) = k {
                config.agent.retrieval_k = *k;
            }
        },
        Command::Chat { no_tools, k } => {
            if *no_tools {
                config.agent.tools_enabled = false;
            }
            if let Some(k) = k {
                config.agent.retrieval_k = *k;
            }
        },
    }
}

pub fn index_config(config: &GqlragConfig) -> IndexConfig {
    let index = &config.index;
    IndexConfig {
        chunk_size: index.chunk_size,
        chunk_overlap: index.chunk_overlap,
        m: index.m,
        ef_construction: index.ef_construction,
        ef_search: index.ef_search,
        metric: match index.metric {
            MetricName::Cosine => Metric::Cosine,
            MetricName::Euclidean => Metric::Euclidean,
        },
        seed: index.seed,
        embed_batch_size: index.embed_batch_size,
    }
}

fn copy_secret(secret: &Option<Secret<String>>) -> Option<Secret<String>> {
    secret
        .as_ref()
        .map(|s| Secret::new(s.expose_secret().clone()))
}

pub fn embedder(section: &EmbeddingsSection) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    let provider =
        OpenAiEmbeddingProvider::new(&section.base_url, section.model.clone(), section.dimensions)
            .context("invalid embeddings configuration")?
            .with_api_key(copy_secret(&section.api_key))
            .with_timeout(Duration::from_secs(section.timeout_secs))?;
    info!(endpoint = provider.endpoint(), model = %section.model, "embedding provider ready");
    Ok(Arc::new(provider))
}

pub fn chat_model(section: &LlmSection) -> anyhow::Result<OpenAiCompatProvider> {
    let provider = OpenAiCompatProvider::new(&section.base_url, section.model.clone())
        .context("invalid llm configuration")?
        .with_api_key(copy_secret(&section.api_key))
        .with_temperature(section.temperature)
        .with_max_tokens(section.max_tokens)
        .with_timeout(Duration::from_secs(section.timeout_secs))?;
    info!(endpoint = provider.endpoint(), model = %section.model, "chat model ready");
    Ok(provider)
}

pub fn agent_config(section: &AgentSection) -> AgentConfig {
    AgentConfig {
        retrieval_k: section.retrieval_k,
        max_tool_iterations: section.max_tool_iterations,
        retrieve_each_iteration: section.retrieve_each_iteration,
    }
}

pub fn tool_registry(
    agent: &AgentSection,
    graphql: &GraphqlSection,
) -> anyhow::Result<ToolRegistry> {
    let timeout = Duration::from_secs(graphql.timeout_secs);
    let tool = GraphqlQueryTool::new(&graphql.endpoint, timeout)?.with_headers(&graphql.headers)?;
    info!(endpoint = %tool.endpoint(), "graphql tool ready");
    let mut registry =
        ToolRegistry::new().with_timeout(Duration::from_secs(agent.tool_timeout_secs));
    registry.register(Arc::new(tool));
    Ok(registry)
}
