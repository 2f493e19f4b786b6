//! Configuration for gqlrag: `gqlrag.toml` schema, discovery and validation.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::ConfigError,
    loader::{CONFIG_FILE_NAME, discover, load, load_from, user_config_path},
    schema::{
        AgentSection, EmbeddingsSection, GqlragConfig, GraphqlSection, IndexSection, LlmSection,
        MetricName, SchemaSection,
    },
};
