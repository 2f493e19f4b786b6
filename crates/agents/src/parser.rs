//! Classifying raw model output as a final answer or a tool call.
//!
//! The parser owns its output grammar: it writes the format instructions and
//! renders earlier steps into the prompt, so swapping parsers swaps the
//! protocol without touching the loop.

use crate::{
    model::{AgentStep, ToolCall},
    tool_registry::ToolRegistry,
};

/// Typed result of parsing one model reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedOutput {
    FinalAnswer(String),
    ToolCall { call: ToolCall, thought: String },
    Unparseable,
}

pub trait OutputParser: Send + Sync {
    fn parse(&self, raw: &str) -> ParsedOutput;

    /// Output format description appended to the prompt.
    fn format_instructions(&self, tools: &ToolRegistry) -> String;

    /// Earlier steps of the current turn, as the model should see them.
    fn render_scratchpad(&self, input: &str, steps: &[AgentStep]) -> String;

    /// Sequences the model must stop at.
    fn stop_sequences(&self) -> Vec<String> {
        Vec::new()
    }

    /// Short reminder used when the previous reply could not be parsed.
    fn format_reminder(&self) -> &str;
}

const THOUGHT: &str = "Thought:";
const ACTION: &str = "Action:";
const ACTION_INPUT: &str = "Action Input:";
const OBSERVATION: &str = "Observation:";
const FINAL_ANSWER: &str = "Final Answer:";

/// Thought / Action / Action Input / Observation / Final Answer grammar.
#[derive(Debug, Clone)]
pub struct ReActOutputParser {
    argument_fields: Vec<String>,
}

impl Default for ReActOutputParser {
    fn default() -> Self {
        Self {
            argument_fields: vec!["input".to_string()],
        }
    }
}

impl ReActOutputParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// JSON fields unwrapped from an `Action Input` object such as
    /// `{"input": "..."}`. The first string-valued field found wins.
    pub fn with_argument_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argument_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    fn unwrap_argument(&self, raw: &str) -> String {
        let text = strip_code_fences(raw);
        if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(&text) {
            for field in &self.argument_fields {
                if let Some(value) = map.get(field).and_then(|v| v.as_str()) {
                    return strip_code_fences(value);
                }
            }
            return text;
        }
        strip_quotes(&text).to_string()
    }
}

impl OutputParser for ReActOutputParser {
    fn parse(&self, raw: &str) -> ParsedOutput {
        // Anything after an invented observation is the model talking to itself.
        let text = match raw.find(OBSERVATION) {
            Some(pos) => &raw[..pos],
            None => raw,
        };

        let final_pos = text.find(FINAL_ANSWER);
        let action_pos = text.find(ACTION);
        match (final_pos, action_pos) {
            (Some(f), a) if a.is_none_or(|a| f < a) => {
                let answer = text[f + FINAL_ANSWER.len()..].trim();
                if answer.is_empty() {
                    ParsedOutput::Unparseable
                } else {
                    ParsedOutput::FinalAnswer(answer.to_string())
                }
            },
            (_, Some(a)) => {
                let thought = text[..a].trim();
                let thought = thought.strip_prefix(THOUGHT).unwrap_or(thought).trim();
                let rest = &text[a + ACTION.len()..];
                let Some(input_pos) = rest.find(ACTION_INPUT) else {
                    return ParsedOutput::Unparseable;
                };
                let tool_name = rest[..input_pos].trim().trim_matches('`').trim();
                if tool_name.is_empty() || tool_name.contains('\n') {
                    return ParsedOutput::Unparseable;
                }
                let argument = self.unwrap_argument(&rest[input_pos + ACTION_INPUT.len()..]);
                ParsedOutput::ToolCall {
                    call: ToolCall {
                        tool_name: tool_name.to_string(),
                        raw_argument: argument,
                    },
                    thought: thought.to_string(),
                }
            },
            _ => ParsedOutput::Unparseable,
        }
    }

    fn format_instructions(&self, tools: &ToolRegistry) -> String {
        format!(
            "You have access to the following tools:\n\n{tools}\n\n\
             Use the following format:\n\n\
             Question: the input question you must answer\n\
             {THOUGHT} you should always think about what to do\n\
             {ACTION} the action to take, should be one of [{names}]\n\
             {ACTION_INPUT} the input to the action\n\
             {OBSERVATION} the result of the action\n\
             ... (this Thought/Action/Action Input/Observation can repeat N times)\n\
             {THOUGHT} I now know the final answer\n\
             {FINAL_ANSWER} the final answer to the original input question",
            tools = tools.describe(),
            names = tools.names().join(", "),
        )
    }

    fn render_scratchpad(&self, input: &str, steps: &[AgentStep]) -> String {
        let mut out = format!("Begin!\n\nQuestion: {input}\n");
        for step in steps {
            let Some(action) = &step.action else {
                continue;
            };
            out.push_str(&format!(
                "{THOUGHT} {}\n{ACTION} {}\n{ACTION_INPUT} {}\n{OBSERVATION} {}\n",
                step.thought,
                action.tool_name,
                action.raw_argument,
                step.observation.as_deref().unwrap_or_default(),
            ));
        }
        out.push_str(THOUGHT);
        out
    }

    fn stop_sequences(&self) -> Vec<String> {
        vec![format!("\n{OBSERVATION}")]
    }

    fn format_reminder(&self) -> &str {
        "Your previous reply did not follow the required format. Reply with either \
         \"Action:\" and \"Action Input:\" lines, or a \"Final Answer:\" line."
    }
}

/// The model's whole reply is the answer; no tools.
#[derive(Debug, Clone, Default)]
pub struct PlainOutputParser;

impl OutputParser for PlainOutputParser {
    fn parse(&self, raw: &str) -> ParsedOutput {
        let answer = raw.trim();
        if answer.is_empty() {
            ParsedOutput::Unparseable
        } else {
            ParsedOutput::FinalAnswer(answer.to_string())
        }
    }

    fn format_instructions(&self, _tools: &ToolRegistry) -> String {
        "Reply with a valid GraphQL query or mutation based on the schema and context above.\n\
         RESPONSE FORMAT:\n\
         - GraphQL Query/Mutation\n\
         - Type Definition\n\
         - Comments if needed\n\
         - NO guesses or assumptions\n\
         - example, with mandatory fields filled"
            .to_string()
    }

    fn render_scratchpad(&self, _input: &str, _steps: &[AgentStep]) -> String {
        String::new()
    }

    fn format_reminder(&self) -> &str {
        "Your previous reply was empty. Answer the user request."
    }
}

/// Remove Markdown code fences (```` ```graphql ````, ```` ``` ````) around a payload.
pub fn strip_code_fences(text: &str) -> String {
    let mut out = Vec::new();
    for line in text.trim().lines() {
        if let Some(rest) = line.trim().strip_prefix("```") {
            let body = rest.trim_end_matches("```").trim();
            // A bare word after the fence is a language tag.
            if !body.is_empty() && !body.chars().all(|c| c.is_ascii_alphanumeric()) {
                out.push(body);
            }
            continue;
        }
        out.push(line.trim_end().trim_end_matches("```"));
    }
    out.join("\n").trim().to_string()
}

fn strip_quotes(text: &str) -> &str {
    let text = text.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = text
            .strip_prefix(quote)
            .and_then(|t| t.strip_suffix(quote))
        {
            return inner.trim();
        }
    }
    text
}
