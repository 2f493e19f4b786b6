//! The agent loop.
//!
//! One call to [`Agent::respond`] handles one user utterance:
//!
//! ```text
//! Retrieving -> Prompting -> AwaitingModelOutput -> Parsed
//!   Parsed(final answer)  -> Done
//!   Parsed(tool call)     -> ToolExecuting -> Observing -> Prompting (or Retrieving)
//!   Parsed(unparseable)   -> Prompting with a reminder, once; then Done with the raw text
//! ```
//!
//! Conversation memory is written only when the turn reaches `Done`, so an
//! error or a dropped future leaves it untouched.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    error::AgentError,
    history::ConversationMemory,
    model::{AgentStep, LlmProvider, ToolCall},
    parser::{OutputParser, ParsedOutput, PlainOutputParser, ReActOutputParser},
    prompt::{PromptParts, SCHEMA_EXPERT_PREAMBLE, TOOL_ASSISTANT_PREAMBLE, build_prompt},
    retrieval::{Retriever, render_context},
    tool_registry::ToolRegistry,
};

/// Reply when retrieval finds nothing; the model is not called.
pub const NO_CONTEXT_REPLY: &str =
    "I couldn't find relevant schema context. Please refine your question.";

/// Loop settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Chunks retrieved per query.
    pub retrieval_k: usize,
    /// Tool calls allowed per user turn.
    pub max_tool_iterations: usize,
    /// Re-run retrieval with the latest observation after every tool call.
    pub retrieve_each_iteration: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            retrieval_k: 10,
            max_tool_iterations: 6,
            retrieve_each_iteration: false,
        }
    }
}

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model gave a final answer.
    Answered,
    /// Nothing relevant was retrieved.
    NoContext,
    /// The tool-call budget ran out.
    IterationLimit,
    /// The model kept ignoring the output format; its raw text was used.
    Unformatted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReply {
    pub answer: String,
    pub outcome: TurnOutcome,
    pub steps: Vec<AgentStep>,
}

/// True for input that ends the session: blank lines and `exit` in any case.
pub fn is_exit_sentinel(line: &str) -> bool {
    let line = line.trim();
    line.is_empty() || line.eq_ignore_ascii_case("exit")
}

enum TurnState {
    Retrieving { query: String },
    Prompting,
    AwaitingModelOutput { prompt: String },
    Parsed { raw: String, parsed: ParsedOutput },
    ToolExecuting { call: ToolCall, thought: String },
    Observing { step: AgentStep },
    Done { answer: String, outcome: TurnOutcome },
}

impl TurnState {
    fn name(&self) -> &'static str {
        match self {
            Self::Retrieving { .. } => "retrieving",
            Self::Prompting => "prompting",
            Self::AwaitingModelOutput { .. } => "awaiting_model_output",
            Self::Parsed { .. } => "parsed",
            Self::ToolExecuting { .. } => "tool_executing",
            Self::Observing { .. } => "observing",
            Self::Done { .. } => "done",
        }
    }
}

pub struct Agent {
    model: Arc<dyn LlmProvider>,
    retriever: Arc<dyn Retriever>,
    tools: ToolRegistry,
    parser: Box<dyn OutputParser>,
    preamble: &'static str,
    memory: ConversationMemory,
    config: AgentConfig,
}

impl Agent {
    /// Agent without tools: the model's reply is the answer.
    pub fn new(
        model: Arc<dyn LlmProvider>,
        retriever: Arc<dyn Retriever>,
        config: AgentConfig,
    ) -> Self {
        Self {
            model,
            retriever,
            tools: ToolRegistry::new(),
            parser: Box::new(PlainOutputParser),
            preamble: SCHEMA_EXPERT_PREAMBLE,
            memory: ConversationMemory::new(),
            config,
        }
    }

    /// Enable tool use with the ReAct grammar.
    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self.parser = Box::new(ReActOutputParser::new());
        self.preamble = TOOL_ASSISTANT_PREAMBLE;
        self
    }

    pub fn with_parser(mut self, parser: Box<dyn OutputParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_memory(mut self, memory: ConversationMemory) -> Self {
        self.memory = memory;
        self
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run one user turn to completion and record it in memory.
    pub async fn respond(&mut self, input: &str) -> Result<TurnReply, AgentError> {
        let reply = self.run_turn(input).await?;
        self.memory.record(input, reply.answer.as_str());
        Ok(reply)
    }

    async fn run_turn(&self, input: &str) -> Result<TurnReply, AgentError> {
        let history = self.memory.render();
        let stop = self.parser.stop_sequences();
        let instructions = self.parser.format_instructions(&self.tools);

        let mut context = String::new();
        let mut steps: Vec<AgentStep> = Vec::new();
        let mut tool_calls = 0usize;
        let mut reminded = false;
        let mut state = TurnState::Retrieving {
            query: input.to_string(),
        };

        loop {
            debug!(state = state.name(), step = steps.len(), "agent state");
            state = match state {
                TurnState::Retrieving { query } => {
                    let hits = self
                        .retriever
                        .retrieve(&query, self.config.retrieval_k)
                        .await
                        .map_err(AgentError::Retrieval)?;
                    debug!(hits = hits.len(), "retrieved schema context");
                    if !hits.is_empty() {
                        context = render_context(&hits);
                        TurnState::Prompting
                    } else if context.is_empty() {
                        TurnState::Done {
                            answer: NO_CONTEXT_REPLY.to_string(),
                            outcome: TurnOutcome::NoContext,
                        }
                    } else {
                        // Re-retrieval came back empty; keep the earlier context.
                        TurnState::Prompting
                    }
                },
                TurnState::Prompting => {
                    let scratchpad = self.parser.render_scratchpad(input, &steps);
                    let prompt = build_prompt(&PromptParts {
                        preamble: self.preamble,
                        history: &history,
                        context: &context,
                        input,
                        instructions: &instructions,
                        reminder: reminded.then(|| self.parser.format_reminder()),
                        scratchpad: &scratchpad,
                    });
                    TurnState::AwaitingModelOutput { prompt }
                },
                TurnState::AwaitingModelOutput { prompt } => {
                    let raw = self
                        .model
                        .complete(&prompt, &stop)
                        .await
                        .map_err(AgentError::ModelInvocation)?;
                    let parsed = self.parser.parse(&raw);
                    TurnState::Parsed { raw, parsed }
                },
                TurnState::Parsed { raw, parsed } => match parsed {
                    ParsedOutput::FinalAnswer(answer) => {
                        steps.push(AgentStep {
                            final_answer: Some(answer.clone()),
                            ..AgentStep::default()
                        });
                        TurnState::Done {
                            answer,
                            outcome: TurnOutcome::Answered,
                        }
                    },
                    ParsedOutput::ToolCall { call, thought } => {
                        if tool_calls >= self.config.max_tool_iterations {
                            warn!(
                                limit = self.config.max_tool_iterations,
                                "tool call limit reached"
                            );
                            TurnState::Done {
                                answer: format!(
                                    "Stopped after reaching the limit of {} tool calls \
                                     without a final answer.",
                                    self.config.max_tool_iterations
                                ),
                                outcome: TurnOutcome::IterationLimit,
                            }
                        } else {
                            tool_calls += 1;
                            TurnState::ToolExecuting { call, thought }
                        }
                    },
                    ParsedOutput::Unparseable if !reminded => {
                        debug!("unparseable model output, re-prompting with format reminder");
                        reminded = true;
                        TurnState::Prompting
                    },
                    ParsedOutput::Unparseable => {
                        warn!("model output still unparseable, using raw text as the answer");
                        TurnState::Done {
                            answer: raw.trim().to_string(),
                            outcome: TurnOutcome::Unformatted,
                        }
                    },
                },
                TurnState::ToolExecuting { call, thought } => {
                    info!(tool = %call.tool_name, iteration = tool_calls, "agent tool call");
                    let observation = self.tools.execute(&call).await;
                    TurnState::Observing {
                        step: AgentStep {
                            thought,
                            action: Some(call),
                            observation: Some(observation),
                            final_answer: None,
                        },
                    }
                },
                TurnState::Observing { step } => {
                    let next = if self.config.retrieve_each_iteration {
                        TurnState::Retrieving {
                            query: format!(
                                "{input}\n{}",
                                step.observation.as_deref().unwrap_or_default()
                            ),
                        }
                    } else {
                        TurnState::Prompting
                    };
                    steps.push(step);
                    next
                },
                TurnState::Done { answer, outcome } => {
                    debug!(?outcome, tool_calls, "turn complete");
                    return Ok(TurnReply {
                        answer,
                        outcome,
                        steps,
                    });
                },
            };
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use std::{
        collections::VecDeque,
        sync::Mutex,
        time::Duration,
    };

    use {
        super::*,
        crate::tool_registry::AgentTool,
        async_trait::async_trait,
        gqlrag_memory::{Chunk, SearchHit},
    };

    /// Model that replays scripted replies and records every prompt.
    /// Once the script runs out it repeats the last reply.
    struct ScriptedModel {
        replies: Mutex<VecDeque<anyhow::Result<String>>>,
        last: Mutex<String>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new<I: IntoIterator<Item = &'static str>>(replies: I) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into_iter().map(|r| Ok(r.to_string())).collect()),
                last: Mutex::new(String::new()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(VecDeque::from([Err(anyhow::anyhow!("connection refused"))])),
                last: Mutex::new(String::new()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }

        fn prompt(&self, i: usize) -> String {
            self.prompts.lock().unwrap()[i].clone()
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedModel {
        fn id(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, prompt: &str, _stop: &[String]) -> anyhow::Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let next = self.replies.lock().unwrap().pop_front();
            match next {
                Some(Ok(reply)) => {
                    *self.last.lock().unwrap() = reply.clone();
                    Ok(reply)
                },
                Some(Err(e)) => Err(e),
                None => Ok(self.last.lock().unwrap().clone()),
            }
        }
    }

    /// Retriever over a fixed list of chunk texts; records queries.
    struct FixedRetriever {
        texts: Vec<&'static str>,
        queries: Mutex<Vec<String>>,
    }

    impl FixedRetriever {
        fn new(texts: &[&'static str]) -> Arc<Self> {
            Arc::new(Self {
                texts: texts.to_vec(),
                queries: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Retriever for FixedRetriever {
        async fn retrieve(&self, query: &str, k: usize) -> anyhow::Result<Vec<SearchHit>> {
            self.queries.lock().unwrap().push(query.to_string());
            Ok(self
                .texts
                .iter()
                .take(k)
                .enumerate()
                .map(|(i, text)| SearchHit {
                    id: i as u32,
                    chunk: Chunk {
                        text: text.to_string(),
                        start_offset: 0,
                        source_id: "schema.graphql".into(),
                        sequence_index: i,
                    },
                    distance: i as f32 * 0.1,
                })
                .collect())
        }
    }

    struct CountingTool {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AgentTool for CountingTool {
        fn name(&self) -> &str {
            "runGraphQLQuery"
        }

        fn description(&self) -> &str {
            "Runs a GraphQL query against the backend and returns the result."
        }

        async fn invoke(&self, argument: &str) -> anyhow::Result<String> {
            self.calls.lock().unwrap().push(argument.to_string());
            Ok(r#"{"users": [{"id": "1"}]}"#.to_string())
        }
    }

    struct FailingTool;

    #[async_trait]
    impl AgentTool for FailingTool {
        fn name(&self) -> &str {
            "runGraphQLQuery"
        }

        fn description(&self) -> &str {
            "Always fails."
        }

        async fn invoke(&self, _argument: &str) -> anyhow::Result<String> {
            anyhow::bail!("Cannot query field \"nme\" on type \"User\"")
        }
    }

    struct StuckTool;

    #[async_trait]
    impl AgentTool for StuckTool {
        fn name(&self) -> &str {
            "runGraphQLQuery"
        }

        fn description(&self) -> &str {
            "Never returns."
        }

        async fn invoke(&self, _argument: &str) -> anyhow::Result<String> {
            std::future::pending::<()>().await;
            Ok(String::new())
        }
    }

    const SCHEMA: &[&str] = &[
        "type User {\n  id: ID!\n  name: String\n}",
        "type Query {\n  users: [User!]!\n}",
    ];

    const CALL: &str = "Thought: run it\nAction: runGraphQLQuery\n\
                        Action Input: ```graphql\nquery { users { id } }\n```";

    fn agent(model: &Arc<ScriptedModel>, config: AgentConfig) -> Agent {
        Agent::new(model.clone(), FixedRetriever::new(SCHEMA), config)
    }

    fn tools_with(tool: Arc<dyn AgentTool>) -> ToolRegistry {
        let mut tools = ToolRegistry::new();
        tools.register(tool);
        tools
    }

    fn counting_tool() -> Arc<CountingTool> {
        Arc::new(CountingTool {
            calls: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn plain_mode_answers_and_records_turn() {
        let model = ScriptedModel::new(["query { users { id name } }"]);
        let retriever = FixedRetriever::new(SCHEMA);
        let mut agent = Agent::new(model.clone(), retriever.clone(), AgentConfig::default());

        let reply = agent.respond("list users with names").await.unwrap();
        assert_eq!(reply.answer, "query { users { id name } }");
        assert_eq!(reply.outcome, TurnOutcome::Answered);

        let prompt = model.prompt(0);
        assert!(prompt.contains("type User {"));
        assert!(prompt.contains("User request:\nlist users with names"));
        assert!(prompt.contains("RESPONSE FORMAT"));
        assert_eq!(agent.memory().len(), 1);

        // History shows up in the next turn.
        agent.respond("now only ids").await.unwrap();
        assert!(
            model
                .prompt(1)
                .contains("Human: list users with names\nAI: query { users { id name } }")
        );
    }

    #[tokio::test]
    async fn empty_retrieval_refuses_without_model_call() {
        let model = ScriptedModel::new(["should not be used"]);
        let mut agent = Agent::new(model.clone(), FixedRetriever::new(&[]), AgentConfig::default());

        let reply = agent.respond("anything").await.unwrap();
        assert_eq!(reply.answer, NO_CONTEXT_REPLY);
        assert_eq!(reply.outcome, TurnOutcome::NoContext);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn tool_call_then_final_answer() {
        let model = ScriptedModel::new([
            CALL,
            "Thought: I now know the final answer\nFinal Answer: There is one user with id 1.",
        ]);
        let tool = counting_tool();
        let mut agent =
            agent(&model, AgentConfig::default()).with_tools(tools_with(tool.clone()));

        let reply = agent.respond("how many users are there?").await.unwrap();
        assert_eq!(reply.answer, "There is one user with id 1.");
        assert_eq!(reply.outcome, TurnOutcome::Answered);
        assert_eq!(*tool.calls.lock().unwrap(), ["query { users { id } }"]);

        assert_eq!(reply.steps.len(), 2);
        assert_eq!(reply.steps[0].thought, "run it");
        assert_eq!(
            reply.steps[0].observation.as_deref(),
            Some(r#"{"users": [{"id": "1"}]}"#)
        );
        assert_eq!(
            reply.steps[1].final_answer.as_deref(),
            Some("There is one user with id 1.")
        );

        let first = model.prompt(0);
        assert!(first.contains("runGraphQLQuery: Runs a GraphQL query"));
        assert!(first.ends_with("Question: how many users are there?\nThought:"));
        let second = model.prompt(1);
        assert!(second.contains("Observation: {\"users\": [{\"id\": \"1\"}]}\nThought:"));
    }

    #[tokio::test]
    async fn repeated_tool_calls_stop_at_limit() {
        let model = ScriptedModel::new([CALL]);
        let tool = counting_tool();
        let config = AgentConfig {
            max_tool_iterations: 3,
            ..AgentConfig::default()
        };
        let mut agent = agent(&model, config).with_tools(tools_with(tool.clone()));

        let reply = agent.respond("loop forever").await.unwrap();
        assert_eq!(reply.outcome, TurnOutcome::IterationLimit);
        assert!(reply.answer.contains("limit of 3 tool calls"));
        assert_eq!(tool.calls.lock().unwrap().len(), 3);
        assert_eq!(model.calls(), 4);
        assert_eq!(agent.memory().len(), 1);
    }

    #[tokio::test]
    async fn unknown_tool_is_observed_not_fatal() {
        let model = ScriptedModel::new([
            "Action: deleteEverything\nAction Input: now",
            "Final Answer: I can only run queries.",
        ]);
        let mut agent =
            agent(&model, AgentConfig::default()).with_tools(tools_with(counting_tool()));

        let reply = agent.respond("wipe the db").await.unwrap();
        assert_eq!(
            reply.steps[0].observation.as_deref(),
            Some("Unknown tool: deleteEverything")
        );
        assert_eq!(reply.answer, "I can only run queries.");
        assert!(model.prompt(1).contains("Observation: Unknown tool: deleteEverything"));
    }

    #[tokio::test]
    async fn tool_error_is_observed_not_fatal() {
        let model = ScriptedModel::new([CALL, "Final Answer: The field is called name."]);
        let mut agent =
            agent(&model, AgentConfig::default()).with_tools(tools_with(Arc::new(FailingTool)));

        let reply = agent.respond("get nme").await.unwrap();
        assert_eq!(
            reply.steps[0].observation.as_deref(),
            Some("Tool Error: Cannot query field \"nme\" on type \"User\"")
        );
        assert_eq!(reply.outcome, TurnOutcome::Answered);
    }

    #[tokio::test]
    async fn unparseable_output_gets_one_reminder() {
        let model = ScriptedModel::new([
            "I think you want users.",
            "Final Answer: query { users { id } }",
        ]);
        let mut agent =
            agent(&model, AgentConfig::default()).with_tools(tools_with(counting_tool()));

        let reply = agent.respond("users?").await.unwrap();
        assert_eq!(reply.outcome, TurnOutcome::Answered);
        assert!(!model.prompt(0).contains("did not follow the required format"));
        assert!(model.prompt(1).contains("did not follow the required format"));
    }

    #[tokio::test]
    async fn persistent_format_violation_degrades_to_raw_text() {
        let model = ScriptedModel::new(["  just some prose  "]);
        let mut agent =
            agent(&model, AgentConfig::default()).with_tools(tools_with(counting_tool()));

        let reply = agent.respond("users?").await.unwrap();
        assert_eq!(reply.outcome, TurnOutcome::Unformatted);
        assert_eq!(reply.answer, "just some prose");
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn model_failure_leaves_memory_untouched() {
        let mut agent = agent(&ScriptedModel::failing(), AgentConfig::default());
        let err = agent.respond("users?").await.unwrap_err();
        assert!(matches!(err, AgentError::ModelInvocation(_)));
        assert!(err.to_string().contains("connection refused"));
        assert!(agent.memory().is_empty());
    }

    #[tokio::test]
    async fn interrupted_tool_call_leaves_memory_untouched() {
        let model = ScriptedModel::new([CALL]);
        let tools = tools_with(Arc::new(StuckTool)).with_timeout(Duration::from_secs(60));
        let mut agent = agent(&model, AgentConfig::default()).with_tools(tools);
        agent.memory.record("earlier", "turn");

        let interrupted =
            tokio::time::timeout(Duration::from_millis(50), agent.respond("users?")).await;
        assert!(interrupted.is_err());
        assert_eq!(agent.memory().len(), 1);
        assert_eq!(agent.memory().total_recorded(), 1);
    }

    #[tokio::test]
    async fn per_iteration_retrieval_uses_latest_observation() {
        let model = ScriptedModel::new([CALL, "Final Answer: one user"]);
        let retriever = FixedRetriever::new(SCHEMA);
        let config = AgentConfig {
            retrieve_each_iteration: true,
            ..AgentConfig::default()
        };
        let mut agent =
            Agent::new(model, retriever.clone(), config).with_tools(tools_with(counting_tool()));

        agent.respond("users?").await.unwrap();
        let queries = retriever.queries.lock().unwrap().clone();
        assert_eq!(queries, ["users?", "users?\n{\"users\": [{\"id\": \"1\"}]}"]);
    }

    /// One-line grammar: `CALL <tool> <argument>` or `ANSWER <text>`.
    struct LineParser;

    impl OutputParser for LineParser {
        fn parse(&self, raw: &str) -> ParsedOutput {
            let raw = raw.trim();
            if let Some(answer) = raw.strip_prefix("ANSWER ") {
                return ParsedOutput::FinalAnswer(answer.to_string());
            }
            match raw.strip_prefix("CALL ").and_then(|rest| rest.split_once(' ')) {
                Some((tool_name, argument)) => ParsedOutput::ToolCall {
                    call: ToolCall {
                        tool_name: tool_name.to_string(),
                        raw_argument: argument.to_string(),
                    },
                    thought: String::new(),
                },
                None => ParsedOutput::Unparseable,
            }
        }

        fn format_instructions(&self, tools: &ToolRegistry) -> String {
            format!("Reply with CALL <tool> <argument> or ANSWER <text>.\n{}", tools.describe())
        }

        fn render_scratchpad(&self, _input: &str, steps: &[AgentStep]) -> String {
            steps
                .iter()
                .filter_map(|s| s.observation.as_deref())
                .map(|o| format!("RESULT {o}\n"))
                .collect()
        }

        fn format_reminder(&self) -> &str {
            "Start with CALL or ANSWER."
        }
    }

    #[tokio::test]
    async fn custom_parser_drives_the_loop() {
        let model =
            ScriptedModel::new(["CALL runGraphQLQuery { users { id } }", "ANSWER one user"]);
        let tool = counting_tool();
        let mut agent = agent(&model, AgentConfig::default())
            .with_tools(tools_with(tool.clone()))
            .with_parser(Box::new(LineParser));

        let reply = agent.respond("users?").await.unwrap();
        assert_eq!(reply.answer, "one user");
        assert_eq!(reply.outcome, TurnOutcome::Answered);
        assert_eq!(*tool.calls.lock().unwrap(), ["{ users { id } }"]);

        assert!(model.prompt(0).contains("Reply with CALL <tool> <argument> or ANSWER <text>."));
        assert!(!model.prompt(0).contains("Action Input:"));
        assert!(model.prompt(1).contains("RESULT {\"users\": [{\"id\": \"1\"}]}"));
    }

    #[test]
    fn exit_sentinel() {
        assert!(is_exit_sentinel("exit"));
        assert!(is_exit_sentinel("  EXIT "));
        assert!(is_exit_sentinel(""));
        assert!(!is_exit_sentinel("exit the loop"));
    }
}
