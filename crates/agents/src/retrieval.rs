use {
    async_trait::async_trait,
    gqlrag_memory::{SchemaMemory, SearchHit},
};

/// Source of schema context for a query.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Up to `k` chunks relevant to `query`, most relevant first.
    async fn retrieve(&self, query: &str, k: usize) -> anyhow::Result<Vec<SearchHit>>;
}

#[async_trait]
impl Retriever for SchemaMemory {
    async fn retrieve(&self, query: &str, k: usize) -> anyhow::Result<Vec<SearchHit>> {
        self.search(query, k).await
    }
}

/// Retrieved chunk texts joined by newlines, as placed in the prompt.
pub fn render_context(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|h| h.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}
