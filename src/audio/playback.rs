//! Agent audio playback using PipeWire
//!
//! Plays the audio chunks streamed by the conversation service. Unlike a
//! file player there is no fixed clip: chunks are queued as they arrive
//! and the output stream stays open for the whole session, writing
//! silence whenever the queue runs dry.

use pipewire as pw;
use pw::spa;
use pw::spa::param::format::{MediaSubtype, MediaType};
use pw::spa::param::format_utils;
use pw::spa::pod::Pod;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use super::resample;

/// Shared state for streamed playback - thread-safe
#[derive(Clone)]
pub struct SharedPlaybackState {
    inner: Arc<Mutex<PlaybackInner>>,
}

struct PlaybackInner {
    /// Samples waiting to be written to the output stream
    queue: VecDeque<f32>,
    /// Rate the output stream was opened at
    output_rate: u32,
}

impl SharedPlaybackState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(PlaybackInner {
                queue: VecDeque::new(),
                output_rate: 48000,
            })),
        }
    }

    /// Queue one decoded chunk, resampling to the output rate if needed
    pub fn push(&self, samples: &[f32], sample_rate: u32) {
        let mut inner = self.inner.lock().unwrap();
        if sample_rate != inner.output_rate {
            let resampled = resample(samples, sample_rate, inner.output_rate);
            inner.queue.extend(resampled);
        } else {
            inner.queue.extend(samples.iter().copied());
        }
    }

    /// Drop any queued audio
    pub fn clear(&self) {
        self.inner.lock().unwrap().queue.clear();
    }

    /// Whether the queue has drained
    pub fn is_idle(&self) -> bool {
        self.inner.lock().unwrap().queue.is_empty()
    }

    fn set_output_rate(&self, rate: u32) {
        self.inner.lock().unwrap().output_rate = rate;
    }

    /// Pop up to `count` samples for the output callback
    fn take(&self, count: usize) -> Vec<f32> {
        let mut inner = self.inner.lock().unwrap();
        let take = count.min(inner.queue.len());
        inner.queue.drain(..take).collect()
    }
}

impl Default for SharedPlaybackState {
    fn default() -> Self {
        Self::new()
    }
}

/// Streamed audio player using PipeWire
pub struct AudioPlayer {
    state: SharedPlaybackState,
    is_running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    sender: Option<pw::channel::Sender<PlaybackCommand>>,
}

enum PlaybackCommand {
    Stop,
}

impl AudioPlayer {
    /// Create a new audio player
    pub fn new() -> Self {
        Self {
            state: SharedPlaybackState::new(),
            is_running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
            sender: None,
        }
    }

    /// Get shared playback state for queueing chunks
    pub fn shared_state(&self) -> SharedPlaybackState {
        self.state.clone()
    }

    /// Check if the output stream is open
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Open the output stream for a session
    pub fn open(&mut self) -> Result<(), String> {
        if self.is_running.load(Ordering::SeqCst) {
            return Err("Playback already running".to_string());
        }

        self.state.clear();
        self.is_running.store(true, Ordering::SeqCst);

        let state = self.state.clone();
        let is_running = self.is_running.clone();

        // Create channel for stopping the loop
        let (sender, receiver) = pw::channel::channel::<PlaybackCommand>();
        self.sender = Some(sender);

        let handle = thread::spawn(move || {
            if let Err(e) = run_playback_loop(state.clone(), receiver) {
                log::warn!("playback error: {}", e);
            }
            is_running.store(false, Ordering::SeqCst);
        });

        self.thread_handle = Some(handle);
        Ok(())
    }

    /// Close the output stream and drop queued audio
    pub fn close(&mut self) {
        if !self.is_running.load(Ordering::SeqCst) {
            return;
        }

        // Send stop command
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(PlaybackCommand::Stop);
        }

        // Wait for thread to finish
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }

        self.is_running.store(false, Ordering::SeqCst);
        self.state.clear();
    }
}

impl Default for AudioPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AudioPlayer {
    fn drop(&mut self) {
        self.close();
    }
}

/// Run the PipeWire playback loop in a background thread
fn run_playback_loop(
    state: SharedPlaybackState,
    receiver: pw::channel::Receiver<PlaybackCommand>,
) -> Result<(), String> {
    pw::init();

    let mainloop = pw::main_loop::MainLoopRc::new(None)
        .map_err(|e| format!("Failed to create PipeWire main loop: {}", e))?;

    let context = pw::context::ContextRc::new(&mainloop, None)
        .map_err(|e| format!("Failed to create PipeWire context: {}", e))?;

    let core = context
        .connect_rc(None)
        .map_err(|e| format!("Failed to connect to PipeWire: {}", e))?;

    // Set up channel receiver to stop the loop
    let mainloop_weak = mainloop.downgrade();
    let _receiver = receiver.attach(mainloop.loop_(), move |cmd| match cmd {
        PlaybackCommand::Stop => {
            if let Some(mainloop) = mainloop_weak.upgrade() {
                mainloop.quit();
            }
        }
    });

    // User data for the stream callbacks
    struct UserData {
        format: spa::param::audio::AudioInfoRaw,
        state: SharedPlaybackState,
    }

    let user_data = UserData {
        format: Default::default(),
        state: state.clone(),
    };

    // Create playback stream
    let props = pw::properties::properties! {
        *pw::keys::MEDIA_TYPE => "Audio",
        *pw::keys::MEDIA_CATEGORY => "Playback",
        *pw::keys::MEDIA_ROLE => "Communication",
        *pw::keys::APP_NAME => "Confab Voice Panel",
    };

    let stream = pw::stream::StreamBox::new(&core, "confab-playback", props)
        .map_err(|e| format!("Failed to create PipeWire stream: {}", e))?;

    let _listener = stream
        .add_local_listener_with_user_data(user_data)
        .param_changed(|_, user_data, id, param| {
            let Some(param) = param else { return };
            if id != spa::param::ParamType::Format.as_raw() {
                return;
            }

            let (media_type, media_subtype) = match format_utils::parse_format(param) {
                Ok(v) => v,
                Err(_) => return,
            };

            if media_type != MediaType::Audio || media_subtype != MediaSubtype::Raw {
                return;
            }

            if user_data.format.parse(param).is_ok() {
                let rate = user_data.format.rate();
                if rate > 0 {
                    user_data.state.set_output_rate(rate);
                }
            }
        })
        .process(|stream, user_data| {
            let Some(mut buffer) = stream.dequeue_buffer() else {
                return;
            };

            let datas = buffer.datas_mut();
            if datas.is_empty() {
                return;
            }

            let data = &mut datas[0];
            let n_channels = user_data.format.channels().max(1) as usize;
            let stride = std::mem::size_of::<f32>() * n_channels;

            let Some(slice) = data.data() else {
                return;
            };

            let n_frames = slice.len() / stride;

            // Write queued samples; silence keeps the stream alive when
            // the agent is quiet
            let samples = user_data.state.take(n_frames);

            for (i, &sample) in samples.iter().enumerate() {
                let offset = i * stride;
                if offset + std::mem::size_of::<f32>() <= slice.len() {
                    let bytes = sample.to_le_bytes();
                    slice[offset..offset + 4].copy_from_slice(&bytes);
                    // If stereo, duplicate to second channel
                    if n_channels > 1 && offset + 8 <= slice.len() {
                        slice[offset + 4..offset + 8].copy_from_slice(&bytes);
                    }
                }
            }
            let written = samples.len() * stride;
            if written < slice.len() {
                slice[written..].fill(0);
            }

            let chunk = data.chunk_mut();
            *chunk.offset_mut() = 0;
            *chunk.stride_mut() = stride as i32;
            *chunk.size_mut() = (n_frames * stride) as u32;
        })
        .register()
        .map_err(|e| format!("Failed to register stream listener: {}", e))?;

    // Set up audio format - request F32LE at native rate
    let mut audio_info = spa::param::audio::AudioInfoRaw::new();
    audio_info.set_format(spa::param::audio::AudioFormat::F32LE);

    let obj = spa::pod::Object {
        type_: spa::utils::SpaTypes::ObjectParamFormat.as_raw(),
        id: spa::param::ParamType::EnumFormat.as_raw(),
        properties: audio_info.into(),
    };

    let values: Vec<u8> = spa::pod::serialize::PodSerializer::serialize(
        std::io::Cursor::new(Vec::new()),
        &spa::pod::Value::Object(obj),
    )
    .map_err(|e| format!("Failed to serialize audio format: {:?}", e))?
    .0
    .into_inner();

    let mut params = [Pod::from_bytes(&values).unwrap()];

    // Connect the stream (Output direction for playback)
    stream
        .connect(
            spa::utils::Direction::Output,
            None,
            pw::stream::StreamFlags::AUTOCONNECT
                | pw::stream::StreamFlags::MAP_BUFFERS
                | pw::stream::StreamFlags::RT_PROCESS,
            &mut params,
        )
        .map_err(|e| format!("Failed to connect stream: {}", e))?;

    // Run until stopped
    mainloop.run();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_take_in_order() {
        let state = SharedPlaybackState::new();
        state.set_output_rate(16000);
        state.push(&[0.1, 0.2], 16000);
        state.push(&[0.3], 16000);

        assert!(!state.is_idle());
        assert_eq!(state.take(2), vec![0.1, 0.2]);
        assert_eq!(state.take(8), vec![0.3]);
        assert!(state.is_idle());
    }

    #[test]
    fn test_push_resamples_to_output_rate() {
        let state = SharedPlaybackState::new();
        state.set_output_rate(48000);
        state.push(&vec![0.5; 160], 16000);

        // 10ms at 16k becomes 10ms at 48k
        let mut total = 0;
        loop {
            let chunk = state.take(1024);
            if chunk.is_empty() {
                break;
            }
            total += chunk.len();
        }
        assert_eq!(total, 480);
    }

    #[test]
    fn test_clear_drops_queue() {
        let state = SharedPlaybackState::new();
        state.set_output_rate(16000);
        state.push(&[0.1; 64], 16000);
        state.clear();
        assert!(state.is_idle());
        assert!(state.take(64).is_empty());
    }
}
