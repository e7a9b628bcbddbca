//! Shared voice-conversation state
//!
//! One `VoiceState` instance is owned by the panel and read by every part
//! of it; mutations go through field-wise partial updates so callers only
//! name the fields they touch.

use crate::models::ConversationTurn;

/// Observable state of the voice conversation
#[derive(Debug, Clone, Default)]
pub struct VoiceState {
    /// Microphone is live and audio is being sampled
    pub is_listening: bool,
    /// The agent is working on the last user turn
    pub is_processing: bool,
    /// The agent is speaking its reply
    pub is_speaking: bool,
    /// Latest recognized text for the in-flight user utterance
    pub transcript: String,
    /// Full conversation history, append-only
    pub conversation: Vec<ConversationTurn>,
}

/// Partial update for `VoiceState`; unset fields are left untouched
#[derive(Debug, Clone, Default)]
pub struct VoiceStateUpdate {
    pub is_listening: Option<bool>,
    pub is_processing: Option<bool>,
    pub is_speaking: Option<bool>,
    pub transcript: Option<String>,
}

impl VoiceState {
    /// Apply a partial update
    pub fn update(&mut self, update: VoiceStateUpdate) {
        if let Some(listening) = update.is_listening {
            self.is_listening = listening;
        }
        if let Some(processing) = update.is_processing {
            self.is_processing = processing;
        }
        if let Some(speaking) = update.is_speaking {
            self.is_speaking = speaking;
        }
        if let Some(transcript) = update.transcript {
            self.transcript = transcript;
        }
    }

    /// Append a turn to the conversation
    pub fn push_turn(&mut self, turn: ConversationTurn) {
        self.conversation.push(turn);
    }

    /// The most recent `count` turns, oldest first
    pub fn recent_turns(&self, count: usize) -> &[ConversationTurn] {
        let start = self.conversation.len().saturating_sub(count);
        &self.conversation[start..]
    }

    /// Drop listening/processing/speaking regardless of their prior values
    pub fn clear_flags(&mut self) {
        self.is_listening = false;
        self.is_processing = false;
        self.is_speaking = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConversationTurn, TurnRole};

    #[test]
    fn test_partial_update_leaves_unset_fields() {
        let mut state = VoiceState {
            is_listening: true,
            transcript: "hello".to_string(),
            ..Default::default()
        };

        state.update(VoiceStateUpdate {
            is_processing: Some(true),
            ..Default::default()
        });

        assert!(state.is_listening);
        assert!(state.is_processing);
        assert_eq!(state.transcript, "hello");
    }

    #[test]
    fn test_update_overwrites_named_fields() {
        let mut state = VoiceState::default();
        state.update(VoiceStateUpdate {
            is_listening: Some(true),
            transcript: Some("so far".to_string()),
            ..Default::default()
        });

        assert!(state.is_listening);
        assert_eq!(state.transcript, "so far");
    }

    #[test]
    fn test_turns_are_append_only_and_ordered() {
        let mut state = VoiceState::default();
        state.push_turn(ConversationTurn::user("first"));
        state.push_turn(ConversationTurn::assistant("second"));
        state.push_turn(ConversationTurn::user("third"));

        let all: Vec<&str> = state
            .conversation
            .iter()
            .map(|t| t.message.as_str())
            .collect();
        assert_eq!(all, ["first", "second", "third"]);
    }

    #[test]
    fn test_recent_turns_returns_tail() {
        let mut state = VoiceState::default();
        for i in 0..6 {
            state.push_turn(ConversationTurn::user(format!("turn {}", i)));
        }

        let recent = state.recent_turns(4);
        assert_eq!(recent.len(), 4);
        assert_eq!(recent[0].message, "turn 2");
        assert_eq!(recent[3].message, "turn 5");

        // Shorter histories come back whole
        let mut short = VoiceState::default();
        short.push_turn(ConversationTurn::assistant("only"));
        assert_eq!(short.recent_turns(4).len(), 1);
    }

    #[test]
    fn test_clear_flags() {
        let mut state = VoiceState {
            is_listening: true,
            is_processing: true,
            is_speaking: true,
            ..Default::default()
        };
        state.push_turn(ConversationTurn::user("kept"));
        state.clear_flags();

        assert!(!state.is_listening);
        assert!(!state.is_processing);
        assert!(!state.is_speaking);
        assert_eq!(state.conversation.len(), 1);
        assert_eq!(state.conversation[0].role, TurnRole::User);
    }
}
