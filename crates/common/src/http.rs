//! HTTP helpers shared by the OpenAI-compatible collaborators (embeddings,
//! chat completions) and the GraphQL tool.

use std::time::Duration;

use anyhow::Context;

const USER_AGENT: &str = concat!("gqlrag/", env!("CARGO_PKG_VERSION"));

/// Build a `reqwest::Client` with a request timeout and our user agent.
pub fn build_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .context("failed to build HTTP client")
}

pub fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// True when the last path segment looks like `v1`, `v4`, ...
fn ends_with_api_version(base_url: &str) -> bool {
    base_url
        .rsplit('/')
        .next()
        .and_then(|segment| segment.strip_prefix('v'))
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
}

/// Resolve the URL of an OpenAI-style resource (`embeddings`,
/// `chat/completions`) against a user supplied base URL.
///
/// Accepts a bare host (`http://localhost:11434`), a versioned base
/// (`https://api.openai.com/v1`, `.../api/paas/v4`) or the full resource URL.
pub fn openai_endpoint(base_url: &str, resource: &str) -> String {
    let base = normalize_base_url(base_url);
    let resource = resource.trim_matches('/');
    if base.ends_with(&format!("/{resource}")) {
        return base;
    }
    if ends_with_api_version(&base) {
        return format!("{base}/{resource}");
    }
    format!("{base}/v1/{resource}")
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("http://localhost:11434", "embeddings", "http://localhost:11434/v1/embeddings")]
    #[case("http://localhost:11434/v1/", "embeddings", "http://localhost:11434/v1/embeddings")]
    #[case(
        "https://open.bigmodel.cn/api/paas/v4",
        "chat/completions",
        "https://open.bigmodel.cn/api/paas/v4/chat/completions"
    )]
    #[case(
        "https://api.example.com/v1/chat/completions",
        "chat/completions",
        "https://api.example.com/v1/chat/completions"
    )]
    #[case("https://api.openai.com", "/chat/completions", "https://api.openai.com/v1/chat/completions")]
    fn resolves_openai_endpoints(
        #[case] base: &str,
        #[case] resource: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(openai_endpoint(base, resource), expected);
    }

    #[test]
    fn version_detection_ignores_named_segments() {
        assert!(!ends_with_api_version("https://example.com/video"));
        assert!(!ends_with_api_version("https://example.com/v"));
        assert!(ends_with_api_version("https://example.com/v2"));
    }

    #[test]
    fn client_builds_with_timeout() {
        assert!(build_client(Duration::from_secs(5)).is_ok());
    }
}
