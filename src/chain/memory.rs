use crate::model::ChatMessage;

/// Conversation buffer owned by one retrieval request.
///
/// Prior turns are prepended to the prompt; nothing outlives the request.
#[derive(Debug, Clone, Default)]
pub struct ChatMemory {
    turns: Vec<ChatMessage>,
}

impl ChatMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.turns
    }

    /// Record one question/answer exchange.
    pub fn record(&mut self, question: &str, answer: &str) {
        self.turns.push(ChatMessage::user(question));
        self.turns.push(ChatMessage::assistant(answer));
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_appends_pair() {
        let mut memory = ChatMemory::new();
        memory.record("q", "a");
        assert_eq!(memory.len(), 2);
        assert_eq!(memory.messages()[0].role, "user");
        assert_eq!(memory.messages()[1].content, "a");
    }
}
