//! Tools the agent can call.

pub mod graphql;

pub use graphql::{GraphqlQueryTool, GraphqlRequest};
