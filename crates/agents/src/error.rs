use thiserror::Error;

/// Failures that end a single conversational turn.
///
/// Tool failures, unknown tools and malformed model output never show up
/// here: the loop turns them into observations or a degraded answer.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("schema retrieval failed: {0:#}")]
    Retrieval(anyhow::Error),

    #[error("language model call failed: {0:#}")]
    ModelInvocation(anyhow::Error),
}
