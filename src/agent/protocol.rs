//! Wire protocol for the conversation service
//!
//! JSON messages tagged by `type`. Audio travels in both directions as
//! base64-encoded 16-bit little-endian PCM.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Messages sent by the client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// First message after the socket opens; names the agent to talk to
    SessionInit { agent_id: String },
    /// One chunk of 16 kHz mono microphone audio
    AudioChunk { audio: String },
    /// Keepalive reply
    Pong { event_id: u64 },
    /// Clean shutdown
    SessionClose,
}

/// Messages pushed by the service
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The session is up and the agent is ready
    SessionBegin { conversation_id: String },
    /// Recognized text for the in-flight user utterance
    UserTranscript {
        text: String,
        #[serde(default)]
        is_final: bool,
    },
    /// The agent's textual reply for one turn
    AgentReply { text: String },
    /// One chunk of synthesized agent speech
    AgentAudio { audio: String, sample_rate: u32 },
    /// The agent started or stopped speaking
    AgentState { speaking: bool },
    /// Keepalive
    Ping { event_id: u64 },
    /// Terminal error; the service closes the session after sending this
    Error { message: String },
    /// The service ended the session
    SessionEnd {
        #[serde(default)]
        reason: Option<String>,
    },
}

/// Encode mono f32 samples as a base64 PCM16 payload
pub fn encode_pcm16(samples: &[f32]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let value = (clamped * 32767.0) as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    BASE64.encode(bytes)
}

/// Decode a base64 PCM16 payload back into f32 samples
pub fn decode_pcm16(audio: &str) -> Result<Vec<f32>, String> {
    let bytes = BASE64
        .decode(audio)
        .map_err(|e| format!("invalid audio payload: {}", e))?;

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_init_names_the_agent() {
        let msg = ClientMessage::SessionInit {
            agent_id: "agent_42".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"session_init""#));
        assert!(json.contains(r#""agent_id":"agent_42""#));
    }

    #[test]
    fn test_parse_session_begin() {
        let msg: ServerMessage =
            serde_json::from_str(r#"{"type":"session_begin","conversation_id":"c-7"}"#).unwrap();
        assert_eq!(
            msg,
            ServerMessage::SessionBegin {
                conversation_id: "c-7".to_string()
            }
        );
    }

    #[test]
    fn test_parse_transcript_defaults_to_partial() {
        let msg: ServerMessage =
            serde_json::from_str(r#"{"type":"user_transcript","text":"hel"}"#).unwrap();
        assert_eq!(
            msg,
            ServerMessage::UserTranscript {
                text: "hel".to_string(),
                is_final: false
            }
        );

        let final_msg: ServerMessage = serde_json::from_str(
            r#"{"type":"user_transcript","text":"hello","is_final":true}"#,
        )
        .unwrap();
        assert!(matches!(
            final_msg,
            ServerMessage::UserTranscript { is_final: true, .. }
        ));
    }

    #[test]
    fn test_parse_reply_and_state() {
        let reply: ServerMessage =
            serde_json::from_str(r#"{"type":"agent_reply","text":"Sure."}"#).unwrap();
        assert_eq!(
            reply,
            ServerMessage::AgentReply {
                text: "Sure.".to_string()
            }
        );

        let state: ServerMessage =
            serde_json::from_str(r#"{"type":"agent_state","speaking":false}"#).unwrap();
        assert_eq!(state, ServerMessage::AgentState { speaking: false });
    }

    #[test]
    fn test_parse_session_end_without_reason() {
        let msg: ServerMessage = serde_json::from_str(r#"{"type":"session_end"}"#).unwrap();
        assert_eq!(msg, ServerMessage::SessionEnd { reason: None });
    }

    #[test]
    fn test_unknown_message_type_is_an_error() {
        let result = serde_json::from_str::<ServerMessage>(r#"{"type":"telemetry","x":1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_pcm16_round_trip() {
        let samples = vec![0.0, 0.5, -0.5, 1.0, -1.0];
        let decoded = decode_pcm16(&encode_pcm16(&samples)).unwrap();

        assert_eq!(decoded.len(), samples.len());
        for (a, b) in samples.iter().zip(decoded.iter()) {
            assert!((a - b).abs() < 1e-3, "expected {} got {}", a, b);
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_pcm16("not base64 !!!").is_err());
    }
}
