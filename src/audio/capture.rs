//! Microphone capture using PipeWire
//!
//! One input stream per conversation session. The capture callback keeps a
//! rolling window of recent samples for loudness analysis and accumulates
//! pending samples for upload to the conversation service.

use pipewire as pw;
use pw::spa;
use pw::spa::param::format::{MediaSubtype, MediaType};
use pw::spa::param::format_utils;
use pw::spa::pod::Pod;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use super::level::FFT_SIZE;

/// Current state of audio capture
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Capturing,
    Error,
}

/// Shared state for audio capture - thread-safe
#[derive(Clone)]
pub struct SharedCaptureState {
    inner: Arc<Mutex<CaptureInner>>,
}

struct CaptureInner {
    /// Rolling window of the most recent samples, sized for the analyser
    recent: Vec<f32>,
    /// Samples captured since the last upload drain
    pending: Vec<f32>,
    /// Samples captured this session, for the duration readout
    total_samples: usize,
    /// Sample rate being used
    sample_rate: u32,
    /// Current state
    state: CaptureState,
    /// Error message if any
    error: Option<String>,
}

impl SharedCaptureState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(CaptureInner {
                recent: Vec::with_capacity(FFT_SIZE),
                pending: Vec::new(),
                total_samples: 0,
                sample_rate: 48000,
                state: CaptureState::Idle,
                error: None,
            })),
        }
    }

    pub fn state(&self) -> CaptureState {
        self.inner.lock().unwrap().state
    }

    pub fn error(&self) -> Option<String> {
        self.inner.lock().unwrap().error.clone()
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.lock().unwrap().sample_rate
    }

    /// Session duration in seconds
    pub fn duration(&self) -> f64 {
        let inner = self.inner.lock().unwrap();
        inner.total_samples as f64 / inner.sample_rate as f64
    }

    /// The most recent capture window for loudness analysis
    pub fn recent_window(&self) -> Vec<f32> {
        self.inner.lock().unwrap().recent.clone()
    }

    /// Drain the samples accumulated since the last call
    pub fn take_pending(&self) -> Vec<f32> {
        std::mem::take(&mut self.inner.lock().unwrap().pending)
    }

    pub fn set_state(&self, state: CaptureState) {
        self.inner.lock().unwrap().state = state;
    }

    pub fn set_error(&self, error: String) {
        let mut inner = self.inner.lock().unwrap();
        inner.error = Some(error);
        inner.state = CaptureState::Error;
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.recent.clear();
        inner.pending.clear();
        inner.total_samples = 0;
        inner.error = None;
        inner.state = CaptureState::Idle;
    }

    /// Process incoming audio samples
    pub fn process_samples(&self, samples: &[f32], sample_rate: u32) {
        let mut inner = self.inner.lock().unwrap();
        inner.sample_rate = sample_rate;

        if samples.is_empty() {
            return;
        }

        // Maintain the rolling analysis window
        inner.recent.extend_from_slice(samples);
        if inner.recent.len() > FFT_SIZE {
            let excess = inner.recent.len() - FFT_SIZE;
            inner.recent.drain(..excess);
        }

        inner.pending.extend_from_slice(samples);
        inner.total_samples += samples.len();
    }
}

impl Default for SharedCaptureState {
    fn default() -> Self {
        Self::new()
    }
}

/// Microphone capture manager using PipeWire
pub struct AudioCapture {
    state: SharedCaptureState,
    is_running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    sender: Option<pw::channel::Sender<PipeWireCommand>>,
}

enum PipeWireCommand {
    Stop,
}

impl AudioCapture {
    /// Create a new audio capture instance
    pub fn new() -> Self {
        Self {
            state: SharedCaptureState::new(),
            is_running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
            sender: None,
        }
    }

    /// Get shared capture state for analysis and upload
    pub fn shared_state(&self) -> SharedCaptureState {
        self.state.clone()
    }

    /// Check if capture is running
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Start capturing audio
    pub fn start(&mut self) -> Result<(), String> {
        if self.is_running.load(Ordering::SeqCst) {
            return Err("Capture already running".to_string());
        }

        self.state.reset();
        self.state.set_state(CaptureState::Capturing);
        self.is_running.store(true, Ordering::SeqCst);

        let state = self.state.clone();
        let is_running = self.is_running.clone();

        // Create channel for stopping the loop
        let (sender, receiver) = pw::channel::channel::<PipeWireCommand>();
        self.sender = Some(sender);

        let handle = thread::spawn(move || {
            if let Err(e) = run_capture_loop(state.clone(), is_running.clone(), receiver) {
                state.set_error(e);
            }
            is_running.store(false, Ordering::SeqCst);
        });

        self.thread_handle = Some(handle);
        Ok(())
    }

    /// Stop capturing and release the input stream
    pub fn stop(&mut self) -> Result<(), String> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err("Capture not running".to_string());
        }

        // Send stop command
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(PipeWireCommand::Stop);
        }

        // Wait for thread to finish
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }

        self.is_running.store(false, Ordering::SeqCst);
        self.state.set_state(CaptureState::Idle);

        Ok(())
    }
}

impl Default for AudioCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        if self.is_running.load(Ordering::SeqCst) {
            let _ = self.stop();
        }
    }
}

/// Run the PipeWire capture loop in a background thread
fn run_capture_loop(
    state: SharedCaptureState,
    _is_running: Arc<AtomicBool>,
    receiver: pw::channel::Receiver<PipeWireCommand>,
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
        PipeWireCommand::Stop => {
            if let Some(mainloop) = mainloop_weak.upgrade() {
                mainloop.quit();
            }
        }
    });

    // User data for the stream callbacks
    struct UserData {
        format: spa::param::audio::AudioInfoRaw,
        state: SharedCaptureState,
    }

    let user_data = UserData {
        format: Default::default(),
        state: state.clone(),
    };

    // Create capture stream
    let props = pw::properties::properties! {
        *pw::keys::MEDIA_TYPE => "Audio",
        *pw::keys::MEDIA_CATEGORY => "Capture",
        *pw::keys::MEDIA_ROLE => "Communication",
        *pw::keys::APP_NAME => "Confab Voice Panel",
    };

    let stream = pw::stream::StreamBox::new(&core, "confab-capture", props)
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

            user_data
                .format
                .parse(param)
                .expect("Failed to parse audio format");
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
            let n_channels = user_data.format.channels().max(1);
            let sample_rate = user_data.format.rate();
            let n_samples = data.chunk().size() / (std::mem::size_of::<f32>() as u32);

            if let Some(raw_samples) = data.data() {
                // Convert bytes to f32 samples and mix to mono if needed
                let mut mono_samples = Vec::with_capacity((n_samples / n_channels) as usize);

                for i in (0..n_samples).step_by(n_channels as usize) {
                    let start = i as usize * std::mem::size_of::<f32>();
                    let end = start + std::mem::size_of::<f32>();
                    if end <= raw_samples.len() {
                        let sample = f32::from_le_bytes(
                            raw_samples[start..end].try_into().unwrap_or([0; 4]),
                        );
                        mono_samples.push(sample);
                    }
                }

                user_data.state.process_samples(&mono_samples, sample_rate);
            }
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

    // Connect the stream
    stream
        .connect(
            spa::utils::Direction::Input,
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
    fn test_recent_window_is_bounded() {
        let state = SharedCaptureState::new();
        state.process_samples(&vec![0.25; FFT_SIZE * 3], 48000);

        let recent = state.recent_window();
        assert_eq!(recent.len(), FFT_SIZE);
    }

    #[test]
    fn test_take_pending_drains() {
        let state = SharedCaptureState::new();
        state.process_samples(&[0.1, 0.2, 0.3], 48000);
        state.process_samples(&[0.4], 48000);

        let pending = state.take_pending();
        assert_eq!(pending, vec![0.1, 0.2, 0.3, 0.4]);
        assert!(state.take_pending().is_empty());
    }

    #[test]
    fn test_duration_tracks_total_samples() {
        let state = SharedCaptureState::new();
        state.process_samples(&vec![0.0; 48000], 48000);
        state.take_pending();
        state.process_samples(&vec![0.0; 24000], 48000);

        assert!((state.duration() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_reset_clears_everything() {
        let state = SharedCaptureState::new();
        state.process_samples(&[0.5; 32], 44100);
        state.set_error("boom".to_string());

        state.reset();
        assert_eq!(state.state(), CaptureState::Idle);
        assert!(state.error().is_none());
        assert!(state.recent_window().is_empty());
        assert_eq!(state.duration(), 0.0);
    }
}
