//! Looper engine - renders the synchronized seven-loop mix

use std::sync::Arc;

use crate::decode::LoopBuffer;
use crate::types::{StereoBuffer, NUM_TRACKS};

use super::{EngineCommand, Voice};

/// Gain applied to every strip until the session pushes mix state
pub const DEFAULT_GAIN: f32 = 0.8;

/// Per-track live resources
///
/// The gain stage and analysis tap live for the whole session; only the
/// voice is transient, created per play cycle.
struct TrackStrip {
    /// Decoded loop installed by the loader (None until loaded, or on failure)
    buffer: Option<Arc<LoopBuffer>>,
    /// Live gain stage, written via commands
    gain: f32,
    /// Analysis tap fed with post-gain mono samples
    tap: rtrb::Producer<f32>,
    /// Active voice for the current play cycle
    voice: Option<Voice>,
}

/// The looper engine
///
/// Owns one strip per registry track and sums their voices into the output
/// buffer. Lives on the audio thread; all external control arrives through
/// [`EngineCommand`]s.
pub struct LooperEngine {
    strips: [TrackStrip; NUM_TRACKS],
    sample_rate: u32,
}

impl LooperEngine {
    /// Create a new engine with one analysis tap producer per track
    pub fn new(sample_rate: u32, taps: [rtrb::Producer<f32>; NUM_TRACKS]) -> Self {
        let mut taps = taps.into_iter();
        Self {
            strips: std::array::from_fn(|_| TrackStrip {
                buffer: None,
                gain: DEFAULT_GAIN,
                tap: taps.next().expect("one tap per track"),
                voice: None,
            }),
            sample_rate,
        }
    }

    /// Sample rate the engine renders at
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of currently active voices
    pub fn active_voices(&self) -> usize {
        self.strips.iter().filter(|s| s.voice.is_some()).count()
    }

    /// Drain and apply all pending commands
    pub fn process_commands(&mut self, rx: &mut rtrb::Consumer<EngineCommand>) {
        while let Ok(command) = rx.pop() {
            match command {
                EngineCommand::LoadLoop { track, buffer } => self.load_loop(track, buffer),
                EngineCommand::StartAll { offset_seconds } => self.start_all(offset_seconds),
                EngineCommand::StopAll => self.stop_all(),
                EngineCommand::SetGain { track, gain } => self.set_gain(track, gain),
            }
        }
    }

    fn load_loop(&mut self, track: usize, buffer: Arc<LoopBuffer>) {
        if let Some(strip) = self.strips.get_mut(track) {
            strip.buffer = Some(buffer);
        }
    }

    fn set_gain(&mut self, track: usize, gain: f32) {
        if let Some(strip) = self.strips.get_mut(track) {
            strip.gain = gain.clamp(0.0, 1.0);
        }
    }

    /// Start a fresh voice on every loaded strip
    ///
    /// Stale voices from a previous cycle are dropped first; dropping an
    /// already-empty voice set is a plain no-op. Strips without a decoded
    /// loop are skipped with a warning, the rest still start.
    fn start_all(&mut self, offset_seconds: f64) {
        self.stop_all();

        let offset_frames = (offset_seconds.max(0.0) * self.sample_rate as f64) as usize;
        for (idx, strip) in self.strips.iter_mut().enumerate() {
            match &strip.buffer {
                Some(buffer) if !buffer.is_empty() => {
                    strip.voice = Some(Voice::start(Arc::clone(buffer), offset_frames));
                }
                _ => log::warn!("Could not start track {}: no decoded loop", idx),
            }
        }
    }

    /// Drop all active voices
    fn stop_all(&mut self) {
        for strip in &mut self.strips {
            strip.voice = None;
        }
    }

    /// Render one buffer of the mix
    ///
    /// Sums every active voice through its gain stage and feeds the
    /// post-gain mono signal into that track's analysis tap. A full tap
    /// drops samples; the analysis thread catches up on its next frame.
    pub fn process(&mut self, output: &mut StereoBuffer) {
        output.fill_silence();

        for strip in &mut self.strips {
            let Some(voice) = &mut strip.voice else {
                continue;
            };
            let gain = strip.gain;
            for out in output.iter_mut() {
                let sample = voice.next_sample() * gain;
                *out += sample;
                let _ = strip.tap.push(sample.mid());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::command_channel;
    use crate::types::StereoSample;

    fn test_engine(sample_rate: u32) -> (LooperEngine, Vec<rtrb::Consumer<f32>>) {
        let mut consumers = Vec::new();
        let taps = std::array::from_fn(|_| {
            let (producer, consumer) = rtrb::RingBuffer::new(4096);
            consumers.push(consumer);
            producer
        });
        (LooperEngine::new(sample_rate, taps), consumers)
    }

    fn constant_loop(frames: usize, rate: u32, value: f32) -> Arc<LoopBuffer> {
        let mut buffer = StereoBuffer::silence(frames);
        for sample in buffer.iter_mut() {
            *sample = StereoSample::mono(value);
        }
        Arc::new(LoopBuffer::new(buffer, rate))
    }

    #[test]
    fn test_empty_engine_renders_silence() {
        let (mut engine, _taps) = test_engine(48000);
        let mut out = StereoBuffer::silence(256);
        engine.process(&mut out);
        assert_eq!(out.peak(), 0.0);
        assert_eq!(engine.active_voices(), 0);
    }

    #[test]
    fn test_start_skips_unloaded_tracks() {
        let (mut engine, _taps) = test_engine(48000);
        let (mut tx, mut rx) = command_channel();

        tx.push(EngineCommand::LoadLoop {
            track: 0,
            buffer: constant_loop(64, 48000, 0.5),
        })
        .unwrap();
        tx.push(EngineCommand::StartAll { offset_seconds: 0.0 }).unwrap();
        engine.process_commands(&mut rx);

        // Only the loaded track starts; the other six are skipped
        assert_eq!(engine.active_voices(), 1);

        let mut out = StereoBuffer::silence(32);
        engine.process(&mut out);
        assert!((out[0].left - 0.5 * DEFAULT_GAIN).abs() < 1e-6);
    }

    #[test]
    fn test_gain_stage_applies_to_mix() {
        let (mut engine, _taps) = test_engine(48000);
        let (mut tx, mut rx) = command_channel();

        tx.push(EngineCommand::LoadLoop {
            track: 2,
            buffer: constant_loop(64, 48000, 1.0),
        })
        .unwrap();
        tx.push(EngineCommand::SetGain { track: 2, gain: 0.25 }).unwrap();
        tx.push(EngineCommand::StartAll { offset_seconds: 0.0 }).unwrap();
        engine.process_commands(&mut rx);

        let mut out = StereoBuffer::silence(16);
        engine.process(&mut out);
        assert!((out[5].right - 0.25).abs() < 1e-6);

        // Muting drives the live gain to zero without stopping the voice
        tx.push(EngineCommand::SetGain { track: 2, gain: 0.0 }).unwrap();
        engine.process_commands(&mut rx);
        engine.process(&mut out);
        assert_eq!(out.peak(), 0.0);
        assert_eq!(engine.active_voices(), 1);
    }

    #[test]
    fn test_stop_all_is_idempotent() {
        let (mut engine, _taps) = test_engine(48000);
        let (mut tx, mut rx) = command_channel();

        tx.push(EngineCommand::LoadLoop {
            track: 0,
            buffer: constant_loop(64, 48000, 0.5),
        })
        .unwrap();
        tx.push(EngineCommand::StartAll { offset_seconds: 0.0 }).unwrap();
        engine.process_commands(&mut rx);
        assert_eq!(engine.active_voices(), 1);

        tx.push(EngineCommand::StopAll).unwrap();
        tx.push(EngineCommand::StopAll).unwrap();
        engine.process_commands(&mut rx);
        assert_eq!(engine.active_voices(), 0);
    }

    #[test]
    fn test_shared_offset_maps_to_per_track_phase() {
        // Loops of 3s and 5s started 7s past the origin sit at 1s and 2s
        // into their own cycles.
        let rate = 1000;
        let (mut engine, _taps) = test_engine(rate);
        let (mut tx, mut rx) = command_channel();

        tx.push(EngineCommand::LoadLoop {
            track: 0,
            buffer: constant_loop(3 * rate as usize, rate, 0.1),
        })
        .unwrap();
        tx.push(EngineCommand::LoadLoop {
            track: 1,
            buffer: constant_loop(5 * rate as usize, rate, 0.1),
        })
        .unwrap();
        tx.push(EngineCommand::StartAll { offset_seconds: 7.0 }).unwrap();
        engine.process_commands(&mut rx);

        let positions: Vec<usize> = engine
            .strips
            .iter()
            .filter_map(|s| s.voice.as_ref().map(|v| v.position()))
            .collect();
        assert_eq!(positions, vec![1000, 2000]);
    }

    #[test]
    fn test_tap_receives_post_gain_samples() {
        let (mut engine, mut taps) = test_engine(48000);
        let (mut tx, mut rx) = command_channel();

        tx.push(EngineCommand::LoadLoop {
            track: 0,
            buffer: constant_loop(64, 48000, 1.0),
        })
        .unwrap();
        tx.push(EngineCommand::SetGain { track: 0, gain: 0.5 }).unwrap();
        tx.push(EngineCommand::StartAll { offset_seconds: 0.0 }).unwrap();
        engine.process_commands(&mut rx);

        let mut out = StereoBuffer::silence(8);
        engine.process(&mut out);

        let tapped = taps[0].pop().unwrap();
        assert!((tapped - 0.5).abs() < 1e-6);
        // Unplayed tracks push nothing
        assert!(taps[1].pop().is_err());
    }
}
