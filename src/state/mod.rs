//! Panel state: the shared voice-conversation state and the session
//! controller that maps service events onto it.

mod controller;
mod voice_state;

pub use controller::SessionController;
pub use voice_state::{VoiceState, VoiceStateUpdate};
