use crate::{error::ConfigError, schema::GqlragConfig};

impl GqlragConfig {
    /// Check values that would otherwise fail deep inside indexing or the
    /// agent loop. All problems are reported together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        let index = &self.index;
        if index.chunk_size == 0 {
            problems.push("index.chunk_size must be greater than zero".to_string());
        } else if index.chunk_overlap >= index.chunk_size {
            problems.push(format!(
                "index.chunk_overlap ({}) must be smaller than index.chunk_size ({})",
                index.chunk_overlap, index.chunk_size
            ));
        }
        if index.m < 2 {
            problems.push(format!("index.m must be at least 2, got {}", index.m));
        }
        if index.ef_construction == 0 {
            problems.push("index.ef_construction must be greater than zero".to_string());
        }
        if index.ef_search == 0 {
            problems.push("index.ef_search must be greater than zero".to_string());
        }
        if index.embed_batch_size == 0 {
            problems.push("index.embed_batch_size must be greater than zero".to_string());
        }
        if self.embeddings.dimensions == 0 {
            problems.push("embeddings.dimensions must be greater than zero".to_string());
        }
        if self.agent.retrieval_k == 0 {
            problems.push("agent.retrieval_k must be greater than zero".to_string());
        }
        if self.agent.max_tool_iterations == 0 {
            problems.push("agent.max_tool_iterations must be greater than zero".to_string());
        }
        for (name, secs) in [
            ("embeddings.timeout_secs", self.embeddings.timeout_secs),
            ("llm.timeout_secs", self.llm.timeout_secs),
            ("agent.tool_timeout_secs", self.agent.tool_timeout_secs),
            ("graphql.timeout_secs", self.graphql.timeout_secs),
        ] {
            if secs == 0 {
                problems.push(format!("{name} must be greater than zero"));
            }
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            problems.push(format!(
                "llm.temperature must be between 0 and 2, got {}",
                self.llm.temperature
            ));
        }
        for (name, value) in [
            ("embeddings.base_url", &self.embeddings.base_url),
            ("llm.base_url", &self.llm.base_url),
            ("graphql.endpoint", &self.graphql.endpoint),
        ] {
            if let Err(e) = url::Url::parse(value) {
                problems.push(format!("{name} {value:?} is not a valid URL: {e}"));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems.join("; ")))
        }
    }
}
