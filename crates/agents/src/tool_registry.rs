use std::{collections::BTreeMap, panic::AssertUnwindSafe, sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    futures::FutureExt,
    tracing::{info, warn},
};

use crate::model::ToolCall;

/// Default upper bound on a single tool call.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// A capability the model can invoke by name with a free-text argument.
#[async_trait]
pub trait AgentTool: Send + Sync {
    fn name(&self) -> &str;

    /// One line shown to the model when choosing an action.
    fn description(&self) -> &str;

    async fn invoke(&self, argument: &str) -> anyhow::Result<String>;
}

/// Named tools available to the agent.
///
/// Executing a call never fails: unknown names, errors, panics and timeouts
/// all come back as observation strings for the model to react to.
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn AgentTool>>,
    timeout: Duration,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register a tool, replacing any previous tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn AgentTool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn AgentTool>> {
        self.tools.get(name)
    }

    /// Tool names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// `name: description` lines for the prompt.
    pub fn describe(&self) -> String {
        self.tools
            .values()
            .map(|t| format!("{}: {}", t.name(), t.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Run `call` and return the observation for the model.
    pub async fn execute(&self, call: &ToolCall) -> String {
        let Some(tool) = self.tools.get(&call.tool_name) else {
            warn!(tool = %call.tool_name, "model requested unknown tool");
            return format!("Unknown tool: {}", call.tool_name);
        };

        info!(tool = %call.tool_name, argument_len = call.raw_argument.len(), "invoking tool");
        let invocation = AssertUnwindSafe(tool.invoke(&call.raw_argument)).catch_unwind();
        match tokio::time::timeout(self.timeout, invocation).await {
            Ok(Ok(Ok(output))) => output,
            Ok(Ok(Err(e))) => {
                warn!(tool = %call.tool_name, error = %e, "tool failed");
                format!("Tool Error: {e:#}")
            },
            Ok(Err(panic)) => {
                let msg = panic_message(panic.as_ref());
                warn!(tool = %call.tool_name, panic = %msg, "tool panicked");
                format!("Tool Error: {msg}")
            },
            Err(_) => {
                warn!(tool = %call.tool_name, timeout = ?self.timeout, "tool timed out");
                format!("Tool Error: timed out after {}s", self.timeout.as_secs_f32())
            },
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "tool panicked".to_string()
    }
}
