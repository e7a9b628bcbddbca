//! WebSocket session with the conversation service
//!
//! One Tokio task per session. There is no reconnect or backoff: a failed
//! or dropped connection surfaces as an event and the session is over.

use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite};

use super::protocol::{decode_pcm16, encode_pcm16, ClientMessage, ServerMessage};
use super::AgentEvent;
use crate::tokio_runtime;

type WsSink = futures_util::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    tungstenite::Message,
>;

/// Connection parameters for one session
#[derive(Debug, Clone)]
pub struct AgentSessionConfig {
    pub service_url: String,
    pub agent_id: String,
}

enum SessionCommand {
    Audio(Vec<f32>),
    End,
}

/// Handle to a running conversation session
pub struct AgentSession {
    cmd_tx: mpsc::Sender<SessionCommand>,
}

impl AgentSession {
    /// Open a session and start pumping events into `event_tx`.
    ///
    /// Connection failures are delivered as `AgentEvent::Error`; the
    /// handle itself is always returned.
    pub fn start(config: AgentSessionConfig, event_tx: mpsc::Sender<AgentEvent>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        tokio_runtime::handle().spawn(run_session(config, event_tx, cmd_rx));
        Self { cmd_tx }
    }

    /// Queue one chunk of 16 kHz mono samples for upload
    pub fn send_audio(&self, samples: Vec<f32>) {
        if self.cmd_tx.try_send(SessionCommand::Audio(samples)).is_err() {
            debug!("audio chunk dropped: session queue full or closed");
        }
    }

    /// Ask the session to close. Never fails; a session that is already
    /// gone simply ignores the request.
    pub fn end(&self) {
        if self.cmd_tx.try_send(SessionCommand::End).is_err() {
            debug!("end request ignored: session already closed");
        }
    }
}

async fn send_json(ws_tx: &mut WsSink, msg: &ClientMessage) -> Result<(), String> {
    let text = serde_json::to_string(msg).map_err(|e| format!("encode failed: {}", e))?;
    ws_tx
        .send(tungstenite::Message::Text(text.into()))
        .await
        .map_err(|e| format!("send failed: {}", e))
}

async fn run_session(
    config: AgentSessionConfig,
    event_tx: mpsc::Sender<AgentEvent>,
    mut cmd_rx: mpsc::Receiver<SessionCommand>,
) {
    info!(
        "starting session: url={} agent={}",
        config.service_url, config.agent_id
    );

    let ws_stream = match connect_async(&config.service_url).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            let _ = event_tx
                .send(AgentEvent::Error {
                    message: format!("Connection failed: {}", e),
                })
                .await;
            return;
        }
    };

    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let init = ClientMessage::SessionInit {
        agent_id: config.agent_id.clone(),
    };
    if let Err(e) = send_json(&mut ws_tx, &init).await {
        let _ = event_tx
            .send(AgentEvent::Error {
                message: format!("Session init failed: {}", e),
            })
            .await;
        return;
    }

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(SessionCommand::Audio(samples)) => {
                    let chunk = ClientMessage::AudioChunk {
                        audio: encode_pcm16(&samples),
                    };
                    if let Err(e) = send_json(&mut ws_tx, &chunk).await {
                        let _ = event_tx
                            .send(AgentEvent::Error {
                                message: format!("Connection lost: {}", e),
                            })
                            .await;
                        return;
                    }
                }
                Some(SessionCommand::End) | None => {
                    // Best-effort close; the panel has already moved on
                    if let Err(e) = send_json(&mut ws_tx, &ClientMessage::SessionClose).await {
                        debug!("close message not delivered: {}", e);
                    }
                    let _ = ws_tx.close().await;
                    let _ = event_tx.send(AgentEvent::Disconnected { reason: None }).await;
                    info!("session closed");
                    return;
                }
            },
            msg = ws_rx.next() => match msg {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(server_msg) => {
                            if !dispatch(server_msg, &event_tx, &mut ws_tx).await {
                                return;
                            }
                        }
                        Err(e) => warn!("unrecognized service message: {}", e),
                    }
                }
                Some(Ok(tungstenite::Message::Close(frame))) => {
                    let reason = frame.map(|f| f.reason.to_string()).filter(|r| !r.is_empty());
                    let _ = event_tx.send(AgentEvent::Disconnected { reason }).await;
                    return;
                }
                // Transport-level ping/pong and stray binary frames
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = event_tx
                        .send(AgentEvent::Error {
                            message: format!("Connection lost: {}", e),
                        })
                        .await;
                    return;
                }
                None => {
                    let _ = event_tx.send(AgentEvent::Disconnected { reason: None }).await;
                    return;
                }
            },
        }
    }
}

/// Map one service message onto an event. Returns false when the session
/// is over and the task should exit.
async fn dispatch(
    msg: ServerMessage,
    event_tx: &mpsc::Sender<AgentEvent>,
    ws_tx: &mut WsSink,
) -> bool {
    match msg {
        ServerMessage::SessionBegin { conversation_id } => {
            let _ = event_tx.send(AgentEvent::Connected { conversation_id }).await;
            true
        }
        ServerMessage::UserTranscript { text, is_final } => {
            let _ = event_tx
                .send(AgentEvent::UserTranscript { text, is_final })
                .await;
            true
        }
        ServerMessage::AgentReply { text } => {
            let _ = event_tx.send(AgentEvent::AgentReply { text }).await;
            true
        }
        ServerMessage::AgentAudio { audio, sample_rate } => {
            match decode_pcm16(&audio) {
                Ok(samples) => {
                    let _ = event_tx
                        .send(AgentEvent::AgentAudio {
                            samples,
                            sample_rate,
                        })
                        .await;
                }
                Err(e) => warn!("dropping undecodable audio chunk: {}", e),
            }
            true
        }
        ServerMessage::AgentState { speaking } => {
            let _ = event_tx.send(AgentEvent::SpeakingChanged { speaking }).await;
            true
        }
        ServerMessage::Ping { event_id } => {
            if let Err(e) = send_json(ws_tx, &ClientMessage::Pong { event_id }).await {
                debug!("pong not delivered: {}", e);
            }
            true
        }
        ServerMessage::Error { message } => {
            let _ = event_tx.send(AgentEvent::Error { message }).await;
            let _ = ws_tx.close().await;
            false
        }
        ServerMessage::SessionEnd { reason } => {
            let _ = event_tx.send(AgentEvent::Disconnected { reason }).await;
            let _ = ws_tx.close().await;
            false
        }
    }
}
