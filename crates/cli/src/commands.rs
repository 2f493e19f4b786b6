use std::{io::Write, path::Path, sync::Arc};

use {
    anyhow::Context,
    gqlrag_agents::{Agent, ConversationMemory, TurnOutcome, runner::is_exit_sentinel},
    gqlrag_config::GqlragConfig,
    gqlrag_memory::{IndexManager, SchemaMemory, SchemaSource, manager::stale_sources},
    tokio::io::{AsyncBufReadExt, BufReader},
    tracing::{info, warn},
};

use crate::setup;

fn read_schema(path: &Path) -> anyhow::Result<SchemaSource> {
    SchemaSource::from_path(path)
        .with_context(|| format!("cannot read schema file {}", path.display()))
}

fn manager(config: &GqlragConfig) -> anyhow::Result<IndexManager> {
    let embedder = setup::embedder(&config.embeddings)?;
    Ok(IndexManager::new(setup::index_config(config), embedder))
}

/// `gqlrag index`: load, chunk, embed, save.
pub async fn index(config: &GqlragConfig) -> anyhow::Result<()> {
    let source = read_schema(&config.schema.path)?;
    let manager = manager(config)?;
    let report = manager
        .build_and_save(std::slice::from_ref(&source), &config.index.dir)
        .await?;
    println!(
        "Indexed {} chunks from {} ({} dimensions) into {}",
        report.chunks,
        source.source_id,
        report.dimension,
        config.index.dir.display()
    );
    Ok(())
}

fn open_index(config: &GqlragConfig) -> anyhow::Result<SchemaMemory> {
    let manager = manager(config)?;
    let dir = &config.index.dir;
    let index = manager.load(dir).with_context(|| {
        format!(
            "cannot open index at {} (run `gqlrag index` first)",
            dir.display()
        )
    })?;
    info!(dir = %dir.display(), records = index.len(), "index loaded");
    Ok(SchemaMemory::new(Arc::new(index), manager.embedder().clone()))
}

/// `gqlrag search`: nearest chunks for a query.
pub async fn search(config: &GqlragConfig, query: &str) -> anyhow::Result<()> {
    let memory = open_index(config)?;
    let hits = memory.search(query, config.agent.retrieval_k).await?;
    if hits.is_empty() {
        println!("No matching chunks.");
        return Ok(());
    }
    for (rank, hit) in hits.iter().enumerate() {
        println!(
            "#{} distance={:.4} {}@{} (chunk {})",
            rank + 1,
            hit.distance,
            hit.chunk.source_id,
            hit.chunk.start_offset,
            hit.chunk.sequence_index
        );
        println!("{}\n", hit.chunk.text.trim_end());
    }
    Ok(())
}

fn warn_if_stale(config: &GqlragConfig, memory: &SchemaMemory) {
    let path = &config.schema.path;
    if !path.is_file() {
        return;
    }
    match SchemaSource::from_path(path) {
        Ok(source) => {
            for id in stale_sources(memory.index(), std::slice::from_ref(&source)) {
                warn!(source = %id, "schema changed since the index was built; run `gqlrag index`");
            }
        },
        Err(e) => warn!(error = %e, "could not re-read schema for staleness check"),
    }
}

/// `gqlrag chat`: line-oriented conversation until "exit" or end of input.
pub async fn chat(config: &GqlragConfig) -> anyhow::Result<()> {
    let memory = open_index(config)?;
    warn_if_stale(config, &memory);

    let model = Arc::new(setup::chat_model(&config.llm)?);
    let mut agent = Agent::new(model, Arc::new(memory), setup::agent_config(&config.agent))
        .with_memory(ConversationMemory::with_max_turns(
            config.agent.history_max_turns,
        ));
    if config.agent.tools_enabled {
        agent = agent.with_tools(setup::tool_registry(&config.agent, &config.graphql)?);
    }
    info!(tools = config.agent.tools_enabled, "chat started");

    println!("Ask about the schema. Type \"exit\" to quit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("You> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        if is_exit_sentinel(&line) {
            break;
        }
        match agent.respond(line.trim()).await {
            Ok(reply) => {
                if reply.outcome != TurnOutcome::Answered {
                    info!(outcome = ?reply.outcome, steps = reply.steps.len(), "turn ended");
                }
                println!("Assistant> {}\n", reply.answer);
            },
            Err(e) => {
                warn!(error = %e, "turn failed");
                println!("Assistant> Sorry, that failed: {e}\n");
            },
        }
    }
    println!("Bye.");
    Ok(())
}
