//! Config schema types. Every field has a default, so an empty file (or no
//! file) is a complete configuration.

use std::{collections::BTreeMap, path::PathBuf};

use {
    secrecy::Secret,
    serde::{Deserialize, Serialize},
};

/// Environment variables consulted for the chat model API key, in order.
pub const LLM_KEY_VARS: &[&str] = &["GQLRAG_LLM_API_KEY", "OPENAI_API_KEY"];
/// Environment variables consulted for the embeddings API key, in order.
pub const EMBEDDINGS_KEY_VARS: &[&str] = &["GQLRAG_EMBEDDINGS_API_KEY", "OPENAI_API_KEY"];

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GqlragConfig {
    pub schema: SchemaSection,
    pub index: IndexSection,
    pub embeddings: EmbeddingsSection,
    pub llm: LlmSection,
    pub agent: AgentSection,
    pub graphql: GraphqlSection,
}

impl GqlragConfig {
    /// Fill API keys that the file left unset from the environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.llm.api_key.is_none() {
            self.llm.api_key = first_set(LLM_KEY_VARS, &lookup).map(Secret::new);
        }
        if self.embeddings.api_key.is_none() {
            self.embeddings.api_key = first_set(EMBEDDINGS_KEY_VARS, &lookup).map(Secret::new);
        }
    }
}

fn first_set<F>(vars: &[&str], lookup: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    vars.iter()
        .filter_map(|v| lookup(*v))
        .find(|value| !value.trim().is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchemaSection {
    /// GraphQL SDL or introspection JSON file.
    pub path: PathBuf,
}

impl Default for SchemaSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("schema.graphql"),
        }
    }
}

/// Mirrors the vector index metric, so this crate does not depend on the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricName {
    #[default]
    Cosine,
    Euclidean,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexSection {
    /// Directory holding the saved index.
    pub dir: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub metric: MetricName,
    pub seed: u64,
    pub embed_batch_size: usize,
}

impl Default for IndexSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("vectorstore"),
            chunk_size: 800,
            chunk_overlap: 200,
            m: 16,
            ef_construction: 200,
            ef_search: 64,
            metric: MetricName::Cosine,
            seed: 42,
            embed_batch_size: 32,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmbeddingsSection {
    /// OpenAI-compatible base URL (Ollama serves one under `/v1`).
    pub base_url: String,
    pub model: String,
    pub dimensions: usize,
    pub timeout_secs: u64,
    pub api_key: Option<Secret<String>>,
}

impl Default for EmbeddingsSection {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".into(),
            model: "nomic-embed-text".into(),
            dimensions: 768,
            timeout_secs: 60,
            api_key: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmSection {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
    pub api_key: Option<Secret<String>>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".into(),
            model: "phi4-mini".into(),
            temperature: 0.0,
            max_tokens: None,
            timeout_secs: 120,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentSection {
    /// Chunks retrieved per user turn.
    pub retrieval_k: usize,
    pub max_tool_iterations: usize,
    /// Turns of conversation kept in the prompt; 0 keeps none.
    pub history_max_turns: usize,
    pub retrieve_each_iteration: bool,
    /// Register `runGraphQLQuery` and use the ReAct format.
    pub tools_enabled: bool,
    /// Upper bound on one tool call.
    pub tool_timeout_secs: u64,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            retrieval_k: 10,
            max_tool_iterations: 6,
            history_max_turns: 20,
            retrieve_each_iteration: false,
            tools_enabled: true,
            tool_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct GraphqlSection {
    pub endpoint: String,
    pub timeout_secs: u64,
    /// Sent with every query, e.g. `Authorization`.
    pub headers: BTreeMap<String, String>,
}

impl Default for GraphqlSection {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:4010/graphql".into(),
            timeout_secs: 30,
            headers: BTreeMap::new(),
        }
    }
}
