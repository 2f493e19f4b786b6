use std::path::Path;

use {
    anyhow::Context,
    sha2::{Digest, Sha256},
    tracing::warn,
};

/// A schema document ready for chunking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaSource {
    /// Stored with every chunk; the path as given for files.
    pub source_id: String,
    pub text: String,
    /// Hex sha256 of `text`.
    pub hash: String,
}

impl SchemaSource {
    pub fn new(source_id: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            source_id: source_id.into(),
            hash: content_hash(&text),
            text,
        }
    }

    /// Read a schema file. SDL is used as is; an introspection result
    /// (`.json`, or text starting with `{`) is re-serialized with indentation
    /// so that it chunks on line breaks. JSON that does not parse is kept raw.
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read schema file {}", path.display()))?;

        let looks_like_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"))
            || raw.trim_start().starts_with('{');
        let text = if looks_like_json {
            match serde_json::from_str::<serde_json::Value>(&raw) {
                Ok(value) => serde_json::to_string_pretty(&value)?,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "schema is not valid JSON, indexing raw text"
                    );
                    raw
                },
            }
        } else {
            raw
        };

        Ok(Self::new(path.display().to_string(), text))
    }
}

pub fn content_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}
