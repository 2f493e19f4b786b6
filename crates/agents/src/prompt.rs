/// Instructions for answering from schema context alone.
pub const SCHEMA_EXPERT_PREAMBLE: &str = "\
You are a GraphQL expert helping the user write valid queries and mutations and answer questions about the schema.

STRICT RULES:
- Only use fields and types explicitly found in the context.
- Do NOT guess or invent anything.
- If unsure, say \"I need more information\".";

/// Instructions when the model may run queries through tools.
pub const TOOL_ASSISTANT_PREAMBLE: &str = "\
You are a GraphQL assistant.
Use the schema context and conversation history to generate a valid GraphQL query or mutation.
Only use fields and types explicitly found in the context.
Generate the query and run it using the available tool, then answer from its result.";

/// Everything that goes into one model prompt.
#[derive(Debug, Clone, Copy)]
pub struct PromptParts<'a> {
    pub preamble: &'a str,
    pub history: &'a str,
    pub context: &'a str,
    pub input: &'a str,
    pub instructions: &'a str,
    /// Set after an unparseable reply.
    pub reminder: Option<&'a str>,
    pub scratchpad: &'a str,
}

pub fn build_prompt(parts: &PromptParts<'_>) -> String {
    let history = if parts.history.is_empty() {
        "(no previous turns)"
    } else {
        parts.history
    };

    let mut prompt = format!(
        "{preamble}\n\n\
         Conversation so far:\n{history}\n\n\
         Relevant schema context:\n{context}\n\n\
         User request:\n{input}\n\n\
         {instructions}\n",
        preamble = parts.preamble,
        context = parts.context,
        input = parts.input,
        instructions = parts.instructions,
    );
    if let Some(reminder) = parts.reminder {
        prompt.push('\n');
        prompt.push_str(reminder);
        prompt.push('\n');
    }
    if !parts.scratchpad.is_empty() {
        prompt.push('\n');
        prompt.push_str(parts.scratchpad);
    }
    prompt
}
