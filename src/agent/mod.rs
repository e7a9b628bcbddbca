//! Client for the hosted conversational-voice service
//!
//! The service owns speech recognition, reasoning, and synthesis. This
//! module only maintains one WebSocket session against it and surfaces
//! the session's events to the panel.

mod protocol;
mod session;

pub use protocol::{decode_pcm16, encode_pcm16, ClientMessage, ServerMessage};
pub use session::{AgentSession, AgentSessionConfig};

/// Events surfaced by a running session
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// The service accepted the session
    Connected { conversation_id: String },
    /// The session is over, cleanly or otherwise
    Disconnected { reason: Option<String> },
    /// Recognized text for the in-flight user utterance
    UserTranscript { text: String, is_final: bool },
    /// The agent's textual reply for one turn
    AgentReply { text: String },
    /// Decoded agent speech ready for playback
    AgentAudio { samples: Vec<f32>, sample_rate: u32 },
    /// The service's observable speaking flag changed
    SpeakingChanged { speaking: bool },
    /// Terminal failure, reduced to one displayable string
    Error { message: String },
}
