//! `runGraphQLQuery`: send a query to a GraphQL HTTP endpoint and hand the
//! result back to the model.

use std::{collections::BTreeMap, time::Duration};

use {
    anyhow::{Context, bail},
    async_trait::async_trait,
    gqlrag_agents::{AgentTool, parser::strip_code_fences},
    gqlrag_common::http,
    reqwest::header::{HeaderMap, HeaderName, HeaderValue},
    serde::Serialize,
    tracing::{debug, info},
    url::Url,
};

pub const TOOL_NAME: &str = "runGraphQLQuery";
pub const TOOL_DESCRIPTION: &str =
    "Runs a GraphQL query against the backend and returns the result.";

/// Longest response body quoted in an HTTP error.
const MAX_ERROR_BODY: usize = 512;

/// Body of a GraphQL-over-HTTP POST.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphqlRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<serde_json::Value>,
    #[serde(rename = "operationName", skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}

impl GraphqlRequest {
    /// Accept either a bare query (optionally fenced) or a JSON object with
    /// `query` and optional `variables` / `operationName`.
    pub fn from_argument(raw: &str) -> anyhow::Result<Self> {
        let text = strip_code_fences(raw);
        if let Ok(serde_json::Value::Object(mut map)) = serde_json::from_str(&text)
            && let Some(query) = map.get("query").and_then(|q| q.as_str())
        {
            let query = strip_code_fences(query);
            let variables = map.remove("variables").filter(|v| !v.is_null());
            let operation_name = map
                .get("operationName")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            return Self::checked(query, variables, operation_name);
        }
        Self::checked(text, None, None)
    }

    fn checked(
        query: String,
        variables: Option<serde_json::Value>,
        operation_name: Option<String>,
    ) -> anyhow::Result<Self> {
        if query.trim().is_empty() {
            bail!("empty GraphQL query");
        }
        Ok(Self {
            query,
            variables,
            operation_name,
        })
    }
}

pub struct GraphqlQueryTool {
    client: reqwest::Client,
    endpoint: Url,
    headers: HeaderMap,
}

impl GraphqlQueryTool {
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        let endpoint = Url::parse(endpoint)
            .with_context(|| format!("invalid GraphQL endpoint {endpoint:?}"))?;
        Ok(Self {
            client: http::build_client(timeout)?,
            endpoint,
            headers: HeaderMap::new(),
        })
    }

    /// Extra headers sent with every request (auth tokens and the like).
    pub fn with_headers(mut self, headers: &BTreeMap<String, String>) -> anyhow::Result<Self> {
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("invalid header name {name:?}"))?;
            let mut value = HeaderValue::from_str(value)
                .with_context(|| format!("invalid value for header {name}"))?;
            value.set_sensitive(true);
            self.headers.insert(name, value);
        }
        Ok(self)
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Execute `request` and return the `data` member, pretty-printed.
    pub async fn execute(&self, request: &GraphqlRequest) -> anyhow::Result<String> {
        debug!(endpoint = %self.endpoint, query_len = request.query.len(), "graphql request");
        let resp = self
            .client
            .post(self.endpoint.clone())
            .headers(self.headers.clone())
            .json(request)
            .send()
            .await
            .with_context(|| format!("request to {} failed", self.endpoint))?;

        let status = resp.status();
        let body = resp.text().await.context("failed to read GraphQL response")?;
        if !status.is_success() {
            bail!("{} returned {status}: {}", self.endpoint, truncate(&body));
        }

        let value: serde_json::Value = serde_json::from_str(&body)
            .with_context(|| format!("GraphQL response is not JSON: {}", truncate(&body)))?;
        if let Some(errors) = value.get("errors").and_then(|e| e.as_array())
            && !errors.is_empty()
        {
            let messages: Vec<&str> = errors
                .iter()
                .map(|e| e.get("message").and_then(|m| m.as_str()).unwrap_or("unknown error"))
                .collect();
            bail!("GraphQL errors: {}", messages.join("; "));
        }

        let data = value.get("data").cloned().unwrap_or(serde_json::Value::Null);
        Ok(serde_json::to_string_pretty(&data)?)
    }
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[async_trait]
impl AgentTool for GraphqlQueryTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        TOOL_DESCRIPTION
    }

    async fn invoke(&self, argument: &str) -> anyhow::Result<String> {
        let request = GraphqlRequest::from_argument(argument)?;
        let result = self.execute(&request).await;
        info!(
            endpoint = %self.endpoint,
            ok = result.is_ok(),
            "graphql query executed"
        );
        result
    }
}
