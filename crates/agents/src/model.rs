use async_trait::async_trait;

/// A text-completion language model.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Model identifier, for logs.
    fn id(&self) -> &str;

    /// Complete `prompt`. Generation stops before any of `stop` is emitted.
    async fn complete(&self, prompt: &str, stop: &[String]) -> anyhow::Result<String>;
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub tool_name: String,
    pub raw_argument: String,
}

/// One iteration of the agent loop, kept for the rest of the turn so the
/// next prompt can show what already happened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentStep {
    pub thought: String,
    pub action: Option<ToolCall>,
    pub observation: Option<String>,
    pub final_answer: Option<String>,
}
