//! In-memory bounded turn buffer — no persistence, cleared on process restart.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct Turn {
    pub user: String,
    pub assistant: String,
}

pub struct ShortTermBuffer {
    turns: VecDeque<Turn>,
    capacity: usize,
}

impl ShortTermBuffer {
    pub fn new(capacity: usize) -> Self {
        Self { turns: VecDeque::with_capacity(capacity), capacity }
    }

    pub fn push(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.turns.push_back(Turn { user: user.into(), assistant: assistant.into() });
        while self.turns.len() > self.capacity {
            self.turns.pop_front();
        }
    }

    pub fn get_turns(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }

    /// Alternating role-tagged entries in chronological order, e.g. for prompt assembly.
    pub fn get_messages(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::with_capacity(self.turns.len() * 2);
        for turn in &self.turns {
            out.push(("user", turn.user.clone()));
            out.push(("assistant", turn.assistant.clone()));
        }
        out
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_evicts_oldest_past_capacity() {
        let mut buf = ShortTermBuffer::new(2);
        buf.push("a", "1");
        buf.push("b", "2");
        buf.push("c", "3");
        let turns = buf.get_turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].user, "b");
        assert_eq!(turns[1].user, "c");
    }

    #[test]
    fn messages_alternate_roles_in_order() {
        let mut buf = ShortTermBuffer::new(5);
        buf.push("hi", "hello");
        let messages = buf.get_messages();
        assert_eq!(messages[0].0, "user");
        assert_eq!(messages[1].0, "assistant");
    }
}
