use std::collections::VecDeque;

/// One completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub input: String,
    pub output: String,
    /// Position in the whole conversation; keeps counting after evictions.
    pub turn_index: usize,
}

/// Ordered log of completed turns, rendered into every prompt.
///
/// Unbounded by default. With a turn cap the oldest turns are evicted first.
#[derive(Debug, Clone, Default)]
pub struct ConversationMemory {
    turns: VecDeque<ConversationTurn>,
    max_turns: Option<usize>,
    next_index: usize,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `max_turns` turns. Zero keeps nothing.
    pub fn with_max_turns(max_turns: usize) -> Self {
        Self {
            max_turns: Some(max_turns),
            ..Self::default()
        }
    }

    pub fn record(&mut self, input: impl Into<String>, output: impl Into<String>) {
        self.turns.push_back(ConversationTurn {
            input: input.into(),
            output: output.into(),
            turn_index: self.next_index,
        });
        self.next_index += 1;
        if let Some(max) = self.max_turns {
            while self.turns.len() > max {
                self.turns.pop_front();
            }
        }
    }

    /// Retained turns as `Human:` / `AI:` pairs, oldest first.
    pub fn render(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("Human: {}\nAI: {}", t.input, t.output))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn turns(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Turns recorded so far, including evicted ones.
    pub fn total_recorded(&self) -> usize {
        self.next_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_in_insertion_order() {
        let mut memory = ConversationMemory::new();
        assert_eq!(memory.render(), "");

        memory.record("list users", "query { users { id } }");
        memory.record("add names", "query { users { id name } }");
        assert_eq!(
            memory.render(),
            "Human: list users\nAI: query { users { id } }\n\
             Human: add names\nAI: query { users { id name } }"
        );
    }

    #[test]
    fn window_evicts_oldest_and_keeps_indices() {
        let mut memory = ConversationMemory::with_max_turns(2);
        for i in 0..5 {
            memory.record(format!("q{i}"), format!("a{i}"));
        }
        assert_eq!(memory.len(), 2);
        assert_eq!(memory.total_recorded(), 5);
        let indices: Vec<usize> = memory.turns().map(|t| t.turn_index).collect();
        assert_eq!(indices, [3, 4]);
        assert!(memory.render().starts_with("Human: q3"));
    }

    #[test]
    fn zero_window_keeps_nothing() {
        let mut memory = ConversationMemory::with_max_turns(0);
        memory.record("q", "a");
        assert!(memory.is_empty());
        assert_eq!(memory.render(), "");
    }
}
