//! CPAL audio backend implementation
//!
//! Builds the single stereo output stream that hosts the looper engine.
//!
//! ```text
//! ┌──────────────────┐                     ┌─────────────────────┐
//! │  Session thread  │───push()───────────►│   Command Queue     │
//! │  (user intents)  │                     │  (lock-free SPSC)   │
//! └──────────────────┘                     └──────────┬──────────┘
//!                                                     │ pop()
//!                                                     ▼
//! ┌──────────────────┐                     ┌─────────────────────┐
//! │  Analysis taps   │◄──post-gain mono────│  CPAL Audio Thread  │
//! │  (7x SPSC ring)  │                     │  (owns LooperEngine)│
//! └──────────────────┘                     └─────────────────────┘
//! ```

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig};

use super::config::{
    AudioConfig, BufferSize, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE, MAX_BUFFER_SIZE,
};
use super::error::{AudioError, AudioResult};
use crate::analysis::tap_channel;
use crate::engine::{command_channel, CommandSender, EngineCommand, LooperEngine};
use crate::types::{StereoBuffer, NUM_TRACKS};

/// Keeps the output stream alive. Drop this to stop audio.
pub struct AudioHandle {
    stream: Stream,
    sample_rate: u32,
    buffer_size: u32,
}

impl AudioHandle {
    /// Get the sample rate of the audio system
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Get the actual buffer size in frames
    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// Get the audio latency in milliseconds (one-way, output only)
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.sample_rate as f32) * 1000.0
    }

    /// Resume the output stream; safe to call when it is already running
    pub fn resume(&self) -> AudioResult<()> {
        self.stream
            .play()
            .map_err(|e| AudioError::StreamPlayError(e.to_string()))
    }
}

/// Everything the session needs after backend startup
pub struct AudioSystemResult {
    /// Stream handle, keeps audio alive
    pub handle: AudioHandle,
    /// Send side of the engine command queue
    pub command_sender: CommandSender,
    /// Consumer side of each track's analysis tap
    pub tap_consumers: [rtrb::Consumer<f32>; NUM_TRACKS],
    /// Negotiated sample rate
    pub sample_rate: u32,
    /// Negotiated buffer size in frames
    pub buffer_size: u32,
    /// One-way output latency
    pub latency_ms: f32,
}

/// Start the audio system with the given configuration
///
/// Creates the engine, wires up the command queue and analysis taps, and
/// starts the output stream.
pub fn start_audio_system(config: &AudioConfig) -> AudioResult<AudioSystemResult> {
    let device = find_output_device(config)?;
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    log::info!("Using audio device: {}", device_name);

    let (supported_config, buffer_size) = get_output_config(&device, config)?;
    let sample_rate = supported_config.sample_rate().0;

    let stream_config = StreamConfig {
        channels: supported_config.channels(),
        sample_rate: supported_config.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(buffer_size),
    };

    let latency_ms = (buffer_size as f32 / sample_rate as f32) * 1000.0;
    log::info!(
        "Audio config: {} channels, {}Hz, {} frames (~{:.1}ms latency)",
        stream_config.channels,
        sample_rate,
        buffer_size,
        latency_ms
    );

    // One analysis tap per track: producers feed the engine, consumers go
    // to the analysis thread
    let mut consumers = Vec::with_capacity(NUM_TRACKS);
    let producers: [rtrb::Producer<f32>; NUM_TRACKS] = std::array::from_fn(|_| {
        let (producer, consumer) = tap_channel();
        consumers.push(consumer);
        producer
    });
    let tap_consumers: [rtrb::Consumer<f32>; NUM_TRACKS] = match consumers.try_into() {
        Ok(array) => array,
        Err(_) => unreachable!("exactly NUM_TRACKS tap consumers"),
    };

    let engine = LooperEngine::new(sample_rate, producers);
    let (command_tx, command_rx) = command_channel();

    let callback_state = Arc::new(Mutex::new(AudioCallbackState::new(engine, command_rx)));
    let stream = build_output_stream(&device, &stream_config, callback_state)?;
    stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;

    log::info!("Audio stream started");

    Ok(AudioSystemResult {
        handle: AudioHandle {
            stream,
            sample_rate,
            buffer_size,
        },
        command_sender: CommandSender::new(command_tx),
        tap_consumers,
        sample_rate,
        buffer_size,
        latency_ms,
    })
}

/// State for the audio callback, owned by the output stream
struct AudioCallbackState {
    /// The looper engine (owned exclusively by the audio thread)
    engine: LooperEngine,
    /// Command receiver from the session
    command_rx: rtrb::Consumer<EngineCommand>,
    /// Pre-allocated render buffer
    master_buffer: StereoBuffer,
}

impl AudioCallbackState {
    fn new(engine: LooperEngine, command_rx: rtrb::Consumer<EngineCommand>) -> Self {
        Self {
            engine,
            command_rx,
            master_buffer: StereoBuffer::silence(MAX_BUFFER_SIZE),
        }
    }

    /// Process one callback worth of audio
    fn process(&mut self, n_frames: usize) {
        // Set working buffer length (RT-safe: no allocation)
        self.master_buffer.set_len_from_capacity(n_frames);

        // Apply pending commands, then render
        self.engine.process_commands(&mut self.command_rx);
        self.engine.process(&mut self.master_buffer);
    }
}

/// Resolve the configured output device
fn find_output_device(config: &AudioConfig) -> AudioResult<cpal::Device> {
    let host = cpal::default_host();
    match &config.device {
        Some(name) => {
            let mut devices = host
                .output_devices()
                .map_err(|e| AudioError::ConfigError(e.to_string()))?;
            devices
                .find(|d| d.name().map(|n| &n == name).unwrap_or(false))
                .ok_or_else(|| AudioError::DeviceNotFound(name.clone()))
        }
        None => host
            .default_output_device()
            .ok_or_else(|| AudioError::NoDefaultDevice("no default output device".to_string())),
    }
}

/// Get the best output configuration for a device
///
/// Returns (SupportedStreamConfig, actual_buffer_size_in_frames)
fn get_output_config(
    device: &cpal::Device,
    config: &AudioConfig,
) -> AudioResult<(cpal::SupportedStreamConfig, u32)> {
    let supported_configs: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .collect();

    if supported_configs.is_empty() {
        return Err(AudioError::ConfigError(
            "No supported output configurations".to_string(),
        ));
    }

    let target_sample_rate = config.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);

    // Prefer f32 format, stereo, and the requested sample rate
    let best_config = supported_configs
        .iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .filter(|c| c.channels() >= 2)
        .find(|c| {
            target_sample_rate >= c.min_sample_rate().0
                && target_sample_rate <= c.max_sample_rate().0
        })
        .or_else(|| supported_configs.iter().find(|c| c.channels() >= 2))
        .or_else(|| supported_configs.first())
        .ok_or_else(|| {
            AudioError::ConfigError("No suitable output configuration found".to_string())
        })?;

    let sample_rate = if target_sample_rate >= best_config.min_sample_rate().0
        && target_sample_rate <= best_config.max_sample_rate().0
    {
        cpal::SampleRate(target_sample_rate)
    } else {
        let fallback = best_config.max_sample_rate();
        log::warn!(
            "Audio device doesn't support {}Hz, falling back to {}Hz (loops will be resampled)",
            target_sample_rate,
            fallback.0
        );
        fallback
    };

    let stream_config = best_config.clone().with_sample_rate(sample_rate);

    let buffer_size = match config.buffer_size {
        BufferSize::Default => DEFAULT_BUFFER_SIZE,
        BufferSize::Fixed(frames) => frames.clamp(64, MAX_BUFFER_SIZE as u32),
    };

    Ok((stream_config, buffer_size))
}

/// Build the output stream
fn build_output_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    state: Arc<Mutex<AudioCallbackState>>,
) -> AudioResult<Stream> {
    let channels = config.channels as usize;

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                let mut state = state.lock().unwrap();
                let n_frames = data.len() / channels;

                state.process(n_frames);

                let samples = state.master_buffer.as_slice();
                for (i, frame) in data.chunks_mut(channels).enumerate() {
                    if i < samples.len() {
                        let sample = samples[i];
                        frame[0] = sample.left;
                        if channels > 1 {
                            frame[1] = sample.right;
                        }
                        // Fill additional channels with silence
                        for ch in frame.iter_mut().skip(2) {
                            *ch = 0.0;
                        }
                    } else {
                        for ch in frame.iter_mut() {
                            *ch = 0.0;
                        }
                    }
                }
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
            },
            None, // No timeout (blocking)
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

    Ok(stream)
}
