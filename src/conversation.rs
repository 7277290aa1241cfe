//! Shared conversation store
//!
//! Grounded on the teacher's `agent::conversation::Conversation` (a
//! lock-guarded turn list with a single mutating entry point) but replacing
//! its persistence-oriented `add_message` with the same-role-collapse and
//! spacer-insertion rule from `conversation.py`: appending to the same role
//! merges into the last turn rather than starting a new one, and a single
//! space is inserted before the new text unless it begins with `.`, `!`,
//! `?`, or `,` (§3 invariant).
//!
//! Modeled as §9 suggests: a leaf value behind a single mutex, with a single
//! `append` operation that encapsulates the invariant — no actor, no
//! back-references from the Sink/Responder into this type beyond a cloned
//! handle.

use std::sync::Mutex;

use crate::types::Role;

#[derive(Debug, Clone)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

pub struct Conversation {
    turns: Mutex<Vec<Turn>>,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            turns: Mutex::new(Vec::new()),
        }
    }

    /// Append `text` as a turn of `role`, collapsing into the previous turn
    /// if it has the same role. Returns a snapshot of all turns after the
    /// append, suitable for handing straight to an LLM call.
    pub fn append(&self, role: Role, text: &str) -> Vec<Turn> {
        let mut turns = self.turns.lock().unwrap();
        match turns.last_mut() {
            Some(last) if last.role == role => {
                let needs_space =
                    !last.text.is_empty() && !text.starts_with(['.', '!', '?', ',']);
                if needs_space {
                    last.text.push(' ');
                }
                last.text.push_str(text);
            }
            _ => turns.push(Turn {
                role,
                text: text.to_string(),
            }),
        }
        turns.clone()
    }

    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.lock().unwrap().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.lock().unwrap().is_empty()
    }

    pub fn len(&self) -> usize {
        self.turns.lock().unwrap().len()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_two_adjacent_turns_share_a_role() {
        let conv = Conversation::new();
        conv.append(Role::User, "hi");
        conv.append(Role::User, "there");
        conv.append(Role::Assistant, "hello");
        let turns = conv.snapshot();
        for pair in turns.windows(2) {
            assert_ne!(pair[0].role, pair[1].role);
        }
    }

    #[test]
    fn collapse_spacing_inserts_space_by_default() {
        let conv = Conversation::new();
        conv.append(Role::Assistant, "hello");
        conv.append(Role::Assistant, "world");
        let turns = conv.snapshot();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].text, "hello world");
    }

    #[test]
    fn collapse_spacing_skips_space_before_punctuation() {
        let conv = Conversation::new();
        conv.append(Role::Assistant, "hello");
        conv.append(Role::Assistant, ", world");
        let turns = conv.snapshot();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].text, "hello, world");
    }

    #[test]
    fn append_different_role_starts_new_turn() {
        let conv = Conversation::new();
        conv.append(Role::User, "hi");
        conv.append(Role::Assistant, "hello");
        let turns = conv.snapshot();
        assert_eq!(turns.len(), 2);
    }
}
