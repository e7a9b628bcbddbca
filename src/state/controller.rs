//! Session controller
//!
//! Maps service-pushed events onto the panel's observable state. The
//! controller owns no I/O: the panel performs the actual microphone and
//! session teardown when `handle_event` asks for it.

use log::{info, warn};

use crate::agent::AgentEvent;
use crate::models::{ConnectionStatus, ConversationTurn};
use crate::state::{VoiceState, VoiceStateUpdate};

pub struct SessionController {
    pub status: ConnectionStatus,
    pub voice: VoiceState,
    /// Last surfaced error, shown on the panel until the next start
    pub error: Option<String>,
}

impl SessionController {
    pub fn new() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            voice: VoiceState::default(),
            error: None,
        }
    }

    /// A new session may not start while one is still being established or
    /// while the agent is working on the previous turn.
    pub fn can_start(&self) -> bool {
        self.status != ConnectionStatus::Connecting && !self.voice.is_processing
    }

    /// Bookkeeping for an accepted session start
    pub fn begin_connecting(&mut self) {
        self.error = None;
        self.status = ConnectionStatus::Connecting;
        self.voice.update(VoiceStateUpdate {
            is_listening: Some(true),
            transcript: Some(String::new()),
            ..Default::default()
        });
    }

    /// A startup failure, microphone denial included
    pub fn fail_start(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("session start failed: {}", message);
        self.error = Some(message);
        self.status = ConnectionStatus::Disconnected;
        self.voice.clear_flags();
    }

    /// Bookkeeping for a user-requested stop
    pub fn finish(&mut self) {
        self.status = ConnectionStatus::Disconnected;
        self.voice.clear_flags();
    }

    /// Map one service event onto local state.
    ///
    /// Returns true when the event ends the session and the caller must
    /// tear down audio sampling.
    pub fn handle_event(&mut self, event: &AgentEvent) -> bool {
        match event {
            AgentEvent::Connected { conversation_id } => {
                info!("session connected: {}", conversation_id);
                self.status = ConnectionStatus::Connected;
                self.error = None;
                false
            }
            AgentEvent::Disconnected { reason } => {
                if let Some(reason) = reason {
                    info!("session disconnected: {}", reason);
                }
                self.status = ConnectionStatus::Disconnected;
                self.voice.clear_flags();
                true
            }
            AgentEvent::UserTranscript { text, is_final } => {
                self.voice.update(VoiceStateUpdate {
                    transcript: Some(text.clone()),
                    ..Default::default()
                });
                if *is_final && !text.is_empty() {
                    self.voice.push_turn(ConversationTurn::user(text.clone()));
                    self.voice.update(VoiceStateUpdate {
                        is_processing: Some(true),
                        ..Default::default()
                    });
                }
                false
            }
            AgentEvent::AgentReply { text } => {
                self.voice.push_turn(ConversationTurn::assistant(text.clone()));
                self.voice.update(VoiceStateUpdate {
                    is_processing: Some(false),
                    is_speaking: Some(true),
                    transcript: Some(String::new()),
                    ..Default::default()
                });
                false
            }
            AgentEvent::SpeakingChanged { speaking } => {
                self.voice.update(VoiceStateUpdate {
                    is_speaking: Some(*speaking),
                    ..Default::default()
                });
                false
            }
            // Audio chunks go straight to playback; no state change here
            AgentEvent::AgentAudio { .. } => false,
            AgentEvent::Error { message } => {
                warn!("session error: {}", message);
                self.error = Some(message.clone());
                self.status = ConnectionStatus::Disconnected;
                self.voice.clear_flags();
                true
            }
        }
    }
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TurnRole;

    fn connected_controller() -> SessionController {
        let mut controller = SessionController::new();
        controller.begin_connecting();
        controller.handle_event(&AgentEvent::Connected {
            conversation_id: "conv-1".to_string(),
        });
        controller
    }

    #[test]
    fn test_start_blocked_while_connecting() {
        let mut controller = SessionController::new();
        assert!(controller.can_start());

        controller.begin_connecting();
        assert_eq!(controller.status, ConnectionStatus::Connecting);
        assert!(!controller.can_start());
    }

    #[test]
    fn test_start_blocked_while_processing() {
        let mut controller = connected_controller();
        controller.handle_event(&AgentEvent::UserTranscript {
            text: "what time is it".to_string(),
            is_final: true,
        });

        assert!(controller.voice.is_processing);
        assert!(!controller.can_start());
    }

    #[test]
    fn test_connect_clears_prior_error() {
        let mut controller = SessionController::new();
        controller.fail_start("Microphone unavailable: no device");
        assert!(controller.error.is_some());

        controller.begin_connecting();
        assert!(controller.error.is_none());

        controller.fail_start("again");
        controller.begin_connecting();
        let teardown = controller.handle_event(&AgentEvent::Connected {
            conversation_id: "conv-2".to_string(),
        });

        assert!(!teardown);
        assert_eq!(controller.status, ConnectionStatus::Connected);
        assert!(controller.error.is_none());
    }

    #[test]
    fn test_disconnect_clears_listening_regardless_of_state() {
        let mut controller = connected_controller();
        controller.voice.is_processing = true;
        controller.voice.is_speaking = true;

        let teardown = controller.handle_event(&AgentEvent::Disconnected { reason: None });

        assert!(teardown);
        assert_eq!(controller.status, ConnectionStatus::Disconnected);
        assert!(!controller.voice.is_listening);
        assert!(!controller.voice.is_processing);
        assert!(!controller.voice.is_speaking);
    }

    #[test]
    fn test_reply_appends_exactly_one_assistant_turn() {
        let mut controller = connected_controller();
        controller.handle_event(&AgentEvent::UserTranscript {
            text: "hello there".to_string(),
            is_final: true,
        });
        let before = controller.voice.conversation.len();

        controller.handle_event(&AgentEvent::AgentReply {
            text: "Hi! How can I help?".to_string(),
        });

        assert_eq!(controller.voice.conversation.len(), before + 1);
        let last = controller.voice.conversation.last().unwrap();
        assert_eq!(last.role, TurnRole::Assistant);
        assert_eq!(last.message, "Hi! How can I help?");
        assert!(!controller.voice.is_processing);
        assert!(controller.voice.is_speaking);
    }

    #[test]
    fn test_partial_transcript_updates_without_turn() {
        let mut controller = connected_controller();
        controller.handle_event(&AgentEvent::UserTranscript {
            text: "what ti".to_string(),
            is_final: false,
        });

        assert_eq!(controller.voice.transcript, "what ti");
        assert!(controller.voice.conversation.is_empty());
        assert!(!controller.voice.is_processing);
    }

    #[test]
    fn test_speaking_follows_service_flag() {
        let mut controller = connected_controller();
        controller.handle_event(&AgentEvent::AgentReply {
            text: "reply".to_string(),
        });
        assert!(controller.voice.is_speaking);

        controller.handle_event(&AgentEvent::SpeakingChanged { speaking: false });
        assert!(!controller.voice.is_speaking);
    }

    #[test]
    fn test_error_forces_disconnected_and_teardown() {
        let mut controller = connected_controller();
        let teardown = controller.handle_event(&AgentEvent::Error {
            message: "agent unavailable".to_string(),
        });

        assert!(teardown);
        assert_eq!(controller.status, ConnectionStatus::Disconnected);
        assert_eq!(controller.error.as_deref(), Some("agent unavailable"));
        assert!(!controller.voice.is_listening);
    }

    #[test]
    fn test_finish_is_idempotent() {
        let mut controller = connected_controller();
        controller.finish();
        controller.finish();

        assert_eq!(controller.status, ConnectionStatus::Disconnected);
        assert!(!controller.voice.is_listening);
    }
}
