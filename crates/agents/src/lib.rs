//! Retrieval-augmented agent loop over an indexed GraphQL schema.

pub mod error;
pub mod history;
pub mod model;
pub mod parser;
pub mod prompt;
pub mod providers;
pub mod retrieval;
pub mod runner;
pub mod tool_registry;

pub use {
    error::AgentError,
    history::{ConversationMemory, ConversationTurn},
    model::{AgentStep, LlmProvider, ToolCall},
    parser::{OutputParser, ParsedOutput, PlainOutputParser, ReActOutputParser},
    retrieval::Retriever,
    runner::{Agent, AgentConfig, TurnOutcome, TurnReply},
    tool_registry::{AgentTool, ToolRegistry},
};
