//! Shared plumbing for the gqlrag crates.

pub mod http;
