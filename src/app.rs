//! Main panel component for Confab

use crate::agent::{AgentEvent, AgentSession, AgentSessionConfig};
use crate::audio::{
    resample, AudioCapture, AudioPlayer, CaptureState, LevelAnalyser, SharedCaptureState,
    SharedPlaybackState,
};
use crate::models::{ConnectionStatus, ConversationTurn, TurnRole};
use crate::settings;
use crate::state::SessionController;
use gpui::prelude::*;
use gpui::{InteractiveElement, *};
use log::warn;
use std::time::Duration;
use tokio::sync::mpsc;

/// Number of bars in the waveform card
const WAVEFORM_BARS: usize = 48;
/// How many turns the transcript card shows
const VISIBLE_TURNS: usize = 4;
/// Sample rate the conversation service expects
const SERVICE_SAMPLE_RATE: u32 = 16000;
/// Upload cadence for microphone audio
const UPLOAD_INTERVAL_MS: u64 = 100;

/// The root panel view
pub struct ConversationPanel {
    controller: SessionController,
    /// Running session against the conversation service
    session: Option<AgentSession>,
    /// Microphone capture for the current session
    audio_capture: Option<AudioCapture>,
    capture_state: Option<SharedCaptureState>,
    level_analyser: LevelAnalyser,
    /// Current normalized loudness, recomputed every animation frame
    audio_level: f32,
    /// Output stream for agent speech
    audio_player: AudioPlayer,
    playback_state: SharedPlaybackState,
    _ui_refresh_task: Option<Task<()>>,
    _event_pump_task: Option<Task<()>>,
    _upload_task: Option<Task<()>>,
}

impl ConversationPanel {
    pub fn new(_cx: &mut Context<Self>) -> Self {
        let audio_player = AudioPlayer::new();
        let playback_state = audio_player.shared_state();

        Self {
            controller: SessionController::new(),
            session: None,
            audio_capture: None,
            capture_state: None,
            level_analyser: LevelAnalyser::new(),
            audio_level: 0.0,
            audio_player,
            playback_state,
            _ui_refresh_task: None,
            _event_pump_task: None,
            _upload_task: None,
        }
    }

    /// Start a conversation session
    fn start_conversation(&mut self, cx: &mut Context<Self>) {
        if !self.controller.can_start() {
            return;
        }
        self.controller.begin_connecting();

        // Microphone first; a denied or missing device is an ordinary
        // startup failure
        let mut capture = AudioCapture::new();
        let capture_state = capture.shared_state();
        if let Err(e) = capture.start() {
            self.controller.fail_start(format!("Microphone unavailable: {}", e));
            return;
        }
        self.capture_state = Some(capture_state.clone());
        self.audio_capture = Some(capture);

        // Agent speech keeps flowing as text even when the output stream
        // cannot be opened
        if let Err(e) = self.audio_player.open() {
            warn!("agent audio playback unavailable: {}", e);
        }

        let config = AgentSessionConfig {
            service_url: settings::service_url(),
            agent_id: settings::agent_id(),
        };
        let (event_tx, event_rx) = mpsc::channel(64);
        self.session = Some(AgentSession::start(config, event_tx));

        self.spawn_event_pump(event_rx, cx);
        self.spawn_upload_loop(cx);
        self.spawn_refresh_task(cx);
        cx.notify();
    }

    /// Stop the conversation session
    ///
    /// Never fails; anything that goes wrong on the way down is logged.
    fn stop_conversation(&mut self) {
        if let Some(session) = self.session.take() {
            session.end();
        }
        self.teardown_audio();
        self.controller.finish();
    }

    fn toggle_conversation(&mut self, cx: &mut Context<Self>) {
        if self.session.is_some() {
            self.stop_conversation();
            cx.notify();
        } else {
            self.start_conversation(cx);
        }
    }

    /// Release the microphone and the output stream, and reset the level
    fn teardown_audio(&mut self) {
        if let Some(mut capture) = self.audio_capture.take() {
            if let Err(e) = capture.stop() {
                warn!("failed to stop audio capture: {}", e);
            }
        }
        self.capture_state = None;
        self.audio_player.close();
        self.playback_state.clear();
        self.level_analyser.reset();
        self.audio_level = 0.0;
    }

    /// Apply one service event to the panel
    fn handle_agent_event(&mut self, event: AgentEvent) {
        if let AgentEvent::AgentAudio {
            ref samples,
            sample_rate,
        } = event
        {
            self.playback_state.push(samples, sample_rate);
        }

        let session_over = self.controller.handle_event(&event);
        if session_over {
            self.session = None;
            self.teardown_audio();
        }
    }

    /// Drain session events into the view
    fn spawn_event_pump(&mut self, mut event_rx: mpsc::Receiver<AgentEvent>, cx: &mut Context<Self>) {
        self._event_pump_task = Some(cx.spawn({
            async move |this: WeakEntity<Self>, cx: &mut AsyncApp| {
                while let Some(event) = event_rx.recv().await {
                    let Some(this) = this.upgrade() else {
                        break;
                    };
                    let result = cx.update_entity(&this, |this, cx| {
                        this.handle_agent_event(event);
                        cx.notify();
                    });
                    if result.is_err() {
                        break;
                    }
                }
            }
        }));
    }

    /// Forward captured microphone audio to the service
    fn spawn_upload_loop(&mut self, cx: &mut Context<Self>) {
        self._upload_task = Some(cx.spawn({
            async move |this: WeakEntity<Self>, cx: &mut AsyncApp| {
                loop {
                    cx.background_executor()
                        .timer(Duration::from_millis(UPLOAD_INTERVAL_MS))
                        .await;

                    let should_continue = this
                        .update(cx, |this, _| {
                            let Some(capture) = this.capture_state.clone() else {
                                return false;
                            };
                            if this.session.is_none() {
                                return false;
                            }

                            let pending = capture.take_pending();
                            if !pending.is_empty() {
                                let rate = capture.sample_rate();
                                let chunk = if rate != SERVICE_SAMPLE_RATE {
                                    resample(&pending, rate, SERVICE_SAMPLE_RATE)
                                } else {
                                    pending
                                };
                                if let Some(session) = &this.session {
                                    session.send_audio(chunk);
                                }
                            }
                            true
                        })
                        .unwrap_or(false);

                    if !should_continue {
                        break;
                    }
                }
            }
        }));
    }

    /// Recompute the audio level at ~60fps while listening
    fn spawn_refresh_task(&mut self, cx: &mut Context<Self>) {
        self._ui_refresh_task = Some(cx.spawn({
            async move |this: WeakEntity<Self>, cx: &mut AsyncApp| {
                loop {
                    cx.background_executor()
                        .timer(Duration::from_millis(16))
                        .await;

                    let Some(this) = this.upgrade() else {
                        break;
                    };
                    let result = cx.update_entity(&this, |this, cx| {
                        let Some(capture) = this.capture_state.clone() else {
                            return false;
                        };

                        // A capture thread that died mid-session surfaces
                        // like any other failure
                        if capture.state() == CaptureState::Error {
                            let message = capture
                                .error()
                                .unwrap_or_else(|| "Audio capture failed".to_string());
                            this.stop_conversation();
                            this.controller.error = Some(format!("Microphone error: {}", message));
                            cx.notify();
                            return false;
                        }

                        let window = capture.recent_window();
                        this.audio_level = this.level_analyser.analyse(&window);
                        cx.notify();
                        true
                    });

                    match result {
                        Ok(true) => continue,
                        _ => break,
                    }
                }
            }
        }));
    }

    /// Copy the conversation to clipboard and primary selection (X11)
    fn copy_transcript(&self, cx: &mut Context<Self>) {
        if self.controller.voice.conversation.is_empty() {
            return;
        }

        let text = self
            .controller
            .voice
            .conversation
            .iter()
            .map(|turn| {
                format!(
                    "[{}] {}: {}",
                    turn.time_label(),
                    turn.role.display_name(),
                    turn.message
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let item = ClipboardItem::new_string(text);
        cx.write_to_clipboard(item.clone());
        cx.write_to_primary(item);
    }

    fn render_header(&self, _cx: &mut Context<Self>) -> impl IntoElement {
        let status = self.controller.status;
        let status_color = match status {
            ConnectionStatus::Connected => rgb(0x4caf50),
            ConnectionStatus::Connecting => rgb(0xffa500),
            ConnectionStatus::Disconnected => rgb(0x666666),
        };

        div()
            .px_6()
            .py_4()
            .border_b_1()
            .border_color(rgb(0x2d2d44))
            .flex()
            .items_center()
            .justify_between()
            .child(
                div()
                    .flex()
                    .items_center()
                    .gap_2()
                    .child(
                        svg()
                            .path("icons/mic.svg")
                            .w(px(16.0))
                            .h(px(16.0))
                            .text_color(rgb(0xe94560)),
                    )
                    .child(
                        div()
                            .text_xl()
                            .font_weight(FontWeight::BOLD)
                            .text_color(rgb(0xffffff))
                            .child("Voice Chat"),
                    ),
            )
            .child(
                div()
                    .flex()
                    .items_center()
                    .gap_2()
                    .child(div().w(px(8.0)).h(px(8.0)).rounded_full().bg(status_color))
                    .child(
                        div()
                            .text_sm()
                            .text_color(status_color)
                            .child(status.label()),
                    ),
            )
    }

    fn render_waveform(&self, _cx: &mut Context<Self>) -> impl IntoElement {
        let is_listening = self.controller.voice.is_listening;
        let is_speaking = self.controller.voice.is_speaking;
        let level = self.audio_level;

        // Agent speech turns the bars green, microphone input keeps the
        // accent color
        let bar_color = if is_speaking {
            rgb(0x4caf50)
        } else {
            rgb(0xe94560)
        };

        div()
            .px_6()
            .py_4()
            .flex()
            .justify_center()
            .child(
                div()
                    .w_full()
                    .h(px(100.0))
                    .bg(rgb(0x1a1a2e))
                    .rounded_lg()
                    .border_1()
                    .border_color(rgb(0x2d2d44))
                    .flex()
                    .items_center()
                    .justify_center()
                    .when(!is_listening, |el| {
                        el.child(
                            div()
                                .text_color(rgb(0x666666))
                                .text_sm()
                                .child("Press Start to talk to the agent"),
                        )
                    })
                    .when(is_listening, |el| {
                        el.child(
                            div()
                                .flex()
                                .items_end()
                                .justify_center()
                                .gap_1()
                                .h(px(60.0))
                                .children((0..WAVEFORM_BARS).map(move |i| {
                                    // Center-weighted arc modulated by the
                                    // current level, with a per-bar wobble so
                                    // the bars don't move in lockstep
                                    let arc = (std::f32::consts::PI * i as f32
                                        / (WAVEFORM_BARS - 1) as f32)
                                        .sin();
                                    let wobble = 0.6 + 0.4 * ((i * 37 % 17) as f32 / 16.0);
                                    let height = (level * arc * wobble * 72.0).clamp(2.0, 60.0);
                                    div()
                                        .w(px(4.0))
                                        .h(px(height))
                                        .bg(bar_color)
                                        .rounded_sm()
                                })),
                        )
                    }),
            )
    }

    fn render_transcript(&self, cx: &mut Context<Self>) -> impl IntoElement {
        let turns: Vec<ConversationTurn> = self
            .controller
            .voice
            .recent_turns(VISIBLE_TURNS)
            .to_vec();
        let transcript = self.controller.voice.transcript.clone();
        let is_listening = self.controller.voice.is_listening;
        let is_processing = self.controller.voice.is_processing;
        let has_history = !self.controller.voice.conversation.is_empty();

        div()
            .id("transcript-scroll")
            .flex_grow()
            .px_6()
            .py_4()
            .overflow_y_scroll()
            .overflow_x_hidden()
            .child(
                div()
                    .p_4()
                    .bg(rgb(0x1a1a2e))
                    .rounded_lg()
                    .min_h(px(200.0))
                    .w_full()
                    .flex()
                    .flex_col()
                    .gap_3()
                    .child(
                        div()
                            .flex()
                            .items_center()
                            .justify_between()
                            .child(
                                div()
                                    .text_sm()
                                    .font_weight(FontWeight::MEDIUM)
                                    .text_color(rgb(0x888888))
                                    .child("Conversation"),
                            )
                            .child(
                                div()
                                    .id("copy-transcript")
                                    .text_xs()
                                    .text_color(rgb(0x888888))
                                    .cursor_pointer()
                                    .hover(|s| s.text_color(rgb(0xcccccc)))
                                    .when(!has_history, |el| el.opacity(0.5).cursor_default())
                                    .on_click(cx.listener(|this, _, _w, cx| {
                                        this.copy_transcript(cx);
                                    }))
                                    .child("Copy"),
                            ),
                    )
                    .when(turns.is_empty() && transcript.is_empty(), |el| {
                        el.child(
                            div()
                                .text_sm()
                                .text_color(rgb(0x666666))
                                .child(if is_listening {
                                    "Listening..."
                                } else {
                                    "Your conversation will appear here"
                                }),
                        )
                    })
                    .children(turns.into_iter().map(|turn| {
                        let role_color = match turn.role {
                            TurnRole::User => rgb(0xe94560),
                            TurnRole::Assistant => rgb(0x4caf50),
                        };
                        let row_bg = match turn.role {
                            TurnRole::User => rgb(0x2d2d44),
                            TurnRole::Assistant => rgb(0x16213e),
                        };
                        div()
                            .flex()
                            .flex_col()
                            .gap_1()
                            .p_3()
                            .rounded_md()
                            .bg(row_bg)
                            .child(
                                div()
                                    .flex()
                                    .items_center()
                                    .justify_between()
                                    .child(
                                        div()
                                            .text_xs()
                                            .font_weight(FontWeight::SEMIBOLD)
                                            .text_color(role_color)
                                            .child(turn.role.display_name()),
                                    )
                                    .child(
                                        div()
                                            .text_xs()
                                            .text_color(rgb(0x666666))
                                            .child(turn.time_label()),
                                    ),
                            )
                            .child(
                                div()
                                    .text_sm()
                                    .text_color(rgb(0xcccccc))
                                    .child(turn.message),
                            )
                    }))
                    // In-flight utterance under the committed turns
                    .when(!transcript.is_empty(), |el| {
                        el.child(
                            div()
                                .flex()
                                .flex_col()
                                .gap_1()
                                .p_3()
                                .rounded_md()
                                .bg(rgb(0x1f1f33))
                                .child(
                                    div()
                                        .text_xs()
                                        .font_weight(FontWeight::SEMIBOLD)
                                        .text_color(rgb(0x888888))
                                        .child("You"),
                                )
                                .child(
                                    div()
                                        .text_sm()
                                        .text_color(rgb(0x888888))
                                        .child(transcript),
                                ),
                        )
                    })
                    .when(is_processing, |el| {
                        el.child(
                            div()
                                .text_xs()
                                .text_color(rgb(0xffa500))
                                .child("Agent is thinking..."),
                        )
                    }),
            )
    }

    fn render_controls(&self, cx: &mut Context<Self>) -> impl IntoElement {
        let in_session = self.session.is_some();
        let can_start = self.controller.can_start();
        let disabled = !in_session && !can_start;
        let duration = self
            .capture_state
            .as_ref()
            .map(|s| s.duration())
            .unwrap_or(0.0);

        let format_duration = |secs: f64| {
            let total_seconds = secs as u64;
            let minutes = total_seconds / 60;
            let seconds = total_seconds % 60;
            format!("{:02}:{:02}", minutes, seconds)
        };

        div()
            .px_6()
            .py_4()
            .border_t_1()
            .border_color(rgb(0x2d2d44))
            .flex()
            .items_center()
            .justify_between()
            .child(
                div()
                    .id("session-toggle")
                    .px_6()
                    .py_2()
                    .rounded_lg()
                    .cursor_pointer()
                    .bg(if in_session {
                        rgb(0xf44336)
                    } else {
                        rgb(0x4caf50)
                    })
                    .hover(move |s| {
                        s.bg(if in_session {
                            rgb(0xd32f2f)
                        } else {
                            rgb(0x45a049)
                        })
                    })
                    .text_color(rgb(0xffffff))
                    .font_weight(FontWeight::SEMIBOLD)
                    .when(disabled, |el| el.opacity(0.5).cursor_default())
                    .on_click(cx.listener(|this, _, _w, cx| {
                        this.toggle_conversation(cx);
                    }))
                    .child(if in_session { "End" } else { "Start" }),
            )
            .child(
                div()
                    .text_2xl()
                    .font_weight(FontWeight::BOLD)
                    .text_color(if in_session {
                        rgb(0xe94560)
                    } else {
                        rgb(0x666666)
                    })
                    .child(format_duration(duration)),
            )
    }
}

impl Render for ConversationPanel {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let error = self.controller.error.clone();

        div()
            .size_full()
            .flex()
            .flex_col()
            .bg(rgb(0x0f0f1a))
            .key_context("ConversationPanel")
            .on_key_down(cx.listener(|this, event: &KeyDownEvent, window, cx| {
                match event.keystroke.key.as_str() {
                    "space" => {
                        this.toggle_conversation(cx);
                    }
                    "q" if event.keystroke.modifiers.control => {
                        this.stop_conversation();
                        window.remove_window();
                    }
                    _ => {}
                }
            }))
            // Custom titlebar
            .child(
                div()
                    .id("titlebar")
                    .flex()
                    .items_center()
                    .justify_between()
                    .w_full()
                    .h(px(36.0))
                    .bg(rgb(0x12121f))
                    .border_b_1()
                    .border_color(rgb(0x2d2d44))
                    .child(
                        // Window title (left side) - draggable area
                        div()
                            .id("titlebar-drag-area")
                            .flex()
                            .flex_grow()
                            .items_center()
                            .h_full()
                            .gap_2()
                            .px_4()
                            .on_mouse_down(
                                MouseButton::Left,
                                cx.listener(|_this, _event: &MouseDownEvent, window, _cx| {
                                    window.start_window_move();
                                }),
                            )
                            .child(
                                div()
                                    .text_sm()
                                    .font_weight(FontWeight::SEMIBOLD)
                                    .text_color(rgb(0xcccccc))
                                    .child("Confab - Voice Chat"),
                            ),
                    )
                    .child(
                        // Close button (right side) - NOT draggable
                        div()
                            .id("close-button")
                            .w(px(46.0))
                            .h(px(36.0))
                            .flex()
                            .items_center()
                            .justify_center()
                            .cursor_pointer()
                            .hover(|style| style.bg(rgb(0xe81123)))
                            .on_click(cx.listener(|this, _, window, _cx| {
                                // End the session cleanly before closing
                                this.stop_conversation();
                                window.remove_window();
                            }))
                            .child(div().text_lg().text_color(rgb(0xcccccc)).child("×")),
                    ),
            )
            .child(self.render_header(cx))
            // Error message
            .when(error.is_some(), |el| {
                let err = error.clone().unwrap_or_default();
                el.child(
                    div()
                        .px_6()
                        .py_2()
                        .bg(rgb(0x4a1c1c))
                        .text_color(rgb(0xf44336))
                        .text_sm()
                        .child(err),
                )
            })
            .child(self.render_waveform(cx))
            .child(self.render_transcript(cx))
            .child(self.render_controls(cx))
    }
}
