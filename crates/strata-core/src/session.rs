//! Session - owner of all per-track live resources
//!
//! The session ties together the command queue to the audio engine, the
//! shared transport clock, per-track mix state, and the visualization frame
//! loop. The presentation layer reads its state and forwards user intents;
//! nothing else mutates it.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::analysis::{start_frame_loop, FrameLoop, VizEngine, VizState};
use crate::audio::{AudioHandle, AudioSystemResult};
use crate::engine::{CommandSender, EngineCommand};
use crate::loader::LoadedBank;
use crate::registry::{TrackInfo, TRACKS};
use crate::types::{PlayState, TrackId, NUM_TRACKS};

/// Default per-track volume
pub const DEFAULT_VOLUME: f32 = 0.8;

/// Per-track mix state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixState {
    pub muted: bool,
    pub volume: f32,
}

impl Default for MixState {
    fn default() -> Self {
        Self {
            muted: false,
            volume: DEFAULT_VOLUME,
        }
    }
}

/// Transport clock shared by all loop voices
///
/// While playing, every track's loop phase is `(now - started_at) mod its
/// own duration`: the phase origin is shared even though loop periods
/// differ. Pausing captures `now - started_at` as the resume offset.
#[derive(Debug)]
pub struct Transport {
    state: PlayState,
    started_at: Instant,
    paused_offset: Duration,
}

impl Transport {
    pub fn new(now: Instant) -> Self {
        Self {
            state: PlayState::Idle,
            started_at: now,
            paused_offset: Duration::ZERO,
        }
    }

    pub fn state(&self) -> PlayState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlayState::Playing
    }

    pub fn paused_offset(&self) -> Duration {
        self.paused_offset
    }

    /// Enter Loading from a cold start
    pub fn begin_loading(&mut self) {
        if self.state == PlayState::Idle {
            self.state = PlayState::Loading;
        }
    }

    /// Loading settled, playback may start
    pub fn mark_ready(&mut self) {
        self.state = PlayState::Ready;
    }

    /// Whether a play intent is valid in the current state
    pub fn can_play(&self) -> bool {
        matches!(
            self.state,
            PlayState::Ready | PlayState::Paused | PlayState::Playing
        )
    }

    /// Resume offset for the next play cycle: zero on a restart while
    /// already playing, the captured pause point otherwise
    pub fn resume_offset(&self) -> Duration {
        if self.is_playing() {
            Duration::ZERO
        } else {
            self.paused_offset
        }
    }

    /// Enter Playing with the phase origin `offset` in the past
    pub fn begin(&mut self, now: Instant, offset: Duration) {
        self.started_at = now - offset;
        self.state = PlayState::Playing;
    }

    /// Capture the pause point; only meaningful while playing
    pub fn capture_pause(&mut self, now: Instant) {
        if self.is_playing() {
            self.paused_offset = now.duration_since(self.started_at);
        }
    }

    /// Leave Playing
    pub fn set_paused(&mut self) {
        if self.is_playing() {
            self.state = PlayState::Paused;
        }
    }

    /// Zero the offset and return to Ready
    pub fn rewind(&mut self) {
        self.paused_offset = Duration::ZERO;
        if matches!(self.state, PlayState::Playing | PlayState::Paused) {
            self.state = PlayState::Ready;
        }
    }
}

/// The looper session
///
/// Owns every live per-track resource by track index 0..6: the engine
/// command producer, mix state, the transport, and the visualization engine
/// with its frame loop.
pub struct Session {
    /// Output stream handle; None runs control-only (no audio host)
    audio: Option<AudioHandle>,
    commands: CommandSender,
    transport: Transport,
    mix: [MixState; NUM_TRACKS],
    loaded: [bool; NUM_TRACKS],
    loading_progress: Option<Arc<AtomicU8>>,
    viz_state: Arc<Mutex<VizState>>,
    redraw: Arc<AtomicU64>,
    /// Parked analysis engine while the frame loop is not running
    viz: Option<VizEngine>,
    frame_loop: Option<FrameLoop>,
    sample_rate: u32,
}

impl Session {
    /// Build a session around a started audio system
    pub fn new(system: AudioSystemResult) -> Self {
        let sample_rate = system.sample_rate;
        Self::from_parts(
            Some(system.handle),
            system.command_sender,
            system.tap_consumers,
            sample_rate,
        )
    }

    fn from_parts(
        audio: Option<AudioHandle>,
        commands: CommandSender,
        tap_consumers: [rtrb::Consumer<f32>; NUM_TRACKS],
        sample_rate: u32,
    ) -> Self {
        let viz = VizEngine::new(tap_consumers);
        let viz_state = viz.state_handle();
        let redraw = viz.generation_handle();
        Self {
            audio,
            commands,
            transport: Transport::new(Instant::now()),
            mix: [MixState::default(); NUM_TRACKS],
            loaded: [false; NUM_TRACKS],
            loading_progress: None,
            viz_state,
            redraw,
            viz: Some(viz),
            frame_loop: None,
            sample_rate,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // State reads for the presentation layer
    // ─────────────────────────────────────────────────────────────

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn state(&self) -> PlayState {
        self.transport.state()
    }

    pub fn is_playing(&self) -> bool {
        self.transport.is_playing()
    }

    /// Whether loading has settled and playback may start
    pub fn is_loaded(&self) -> bool {
        matches!(
            self.transport.state(),
            PlayState::Ready | PlayState::Playing | PlayState::Paused
        )
    }

    /// Aggregate loading progress, 0-100
    pub fn loading_progress(&self) -> u8 {
        if self.is_loaded() {
            return 100;
        }
        self.loading_progress
            .as_ref()
            .map(|p| p.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Static registry entry for a track
    pub fn track_info(&self, track: TrackId) -> TrackInfo {
        TRACKS[track.index()]
    }

    /// Current mix state for a track
    pub fn mix_state(&self, track: TrackId) -> MixState {
        self.mix[track.index()]
    }

    /// Whether a track's loop decoded successfully
    pub fn track_has_loop(&self, track: TrackId) -> bool {
        self.loaded[track.index()]
    }

    /// Snapshot of the visualization bands for all tracks
    pub fn visualization(&self) -> VizState {
        self.viz_state.lock().unwrap().clone()
    }

    /// Monotonic re-render generation, bumped by the frame loop
    pub fn redraw_generation(&self) -> u64 {
        self.redraw.load(Ordering::Acquire)
    }

    // ─────────────────────────────────────────────────────────────
    // Loading lifecycle
    // ─────────────────────────────────────────────────────────────

    /// Enter Loading and adopt the loader's progress value
    pub fn begin_loading(&mut self, progress: Arc<AtomicU8>) {
        self.loading_progress = Some(progress);
        self.transport.begin_loading();
    }

    /// Install a delivered bank and move to Ready
    ///
    /// Missing loops stay controllable in the mix but produce no sound.
    pub fn apply_bank(&mut self, bank: LoadedBank) {
        for (idx, slot) in bank.loops.into_iter().enumerate() {
            if let Some(buffer) = slot {
                self.loaded[idx] = true;
                self.commands.send(EngineCommand::LoadLoop { track: idx, buffer });
            }
        }
        if let Some(viz) = &mut self.viz {
            viz.set_active(self.loaded);
        }
        self.transport.mark_ready();
    }

    // ─────────────────────────────────────────────────────────────
    // User intents
    // ─────────────────────────────────────────────────────────────

    /// Toggle between playing and paused
    pub fn toggle_playback(&mut self) {
        if self.transport.is_playing() {
            self.stop_tracks(true);
        } else {
            self.play();
        }
    }

    /// Stop and rewind to the loop origin
    pub fn reset(&mut self) {
        self.stop_tracks(true);
        self.transport.rewind();
    }

    /// Flip a track's mute state
    ///
    /// Muting drives the live gain to zero without touching the stored
    /// volume; unmuting restores the stored level exactly.
    pub fn toggle_mute(&mut self, track: TrackId) {
        let mix = &mut self.mix[track.index()];
        mix.muted = !mix.muted;
        let gain = if mix.muted { 0.0 } else { mix.volume };
        self.commands.send(EngineCommand::SetGain {
            track: track.index(),
            gain,
        });
    }

    /// Store a track's volume and, if unmuted, push it to the live gain
    ///
    /// The caller constrains `volume` to [0, 1]. A muted track keeps a zero
    /// live gain until unmuted.
    pub fn set_volume(&mut self, track: TrackId, volume: f32) {
        let mix = &mut self.mix[track.index()];
        mix.volume = volume;
        if !mix.muted {
            self.commands.send(EngineCommand::SetGain {
                track: track.index(),
                gain: volume,
            });
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Playback internals
    // ─────────────────────────────────────────────────────────────

    /// Start (or restart) all loop voices at the shared transport offset
    fn play(&mut self) {
        if !self.transport.can_play() || !self.is_loaded() {
            log::warn!("Play ignored in state {:?}", self.transport.state());
            return;
        }
        if let Some(audio) = &self.audio {
            if let Err(e) = audio.resume() {
                log::error!("Could not resume audio stream: {}", e);
                return;
            }
        }

        let offset = self.transport.resume_offset();

        // Stop stale voices without leaving Playing mid-transition
        self.stop_tracks(false);

        // Every play cycle begins from a clean visual slate
        self.viz_state.lock().unwrap().zero();

        self.commands.send(EngineCommand::StartAll {
            offset_seconds: offset.as_secs_f64(),
        });
        self.transport.begin(Instant::now(), offset);

        if self.frame_loop.is_none() {
            if let Some(viz) = self.viz.take() {
                self.frame_loop = Some(start_frame_loop(viz));
            }
        }
    }

    /// Stop all voices
    ///
    /// When `update_state`, also leave Playing and cancel the frame loop so
    /// no analysis tick fires once paused. The `update_state = false`
    /// variant lets `play()` restart voices without flipping the externally
    /// observed state mid-transition.
    fn stop_tracks(&mut self, update_state: bool) {
        self.transport.capture_pause(Instant::now());
        self.commands.send(EngineCommand::StopAll);

        if update_state {
            self.transport.set_paused();
            if let Some(frame_loop) = self.frame_loop.take() {
                self.viz = Some(frame_loop.cancel());
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(frame_loop) = self.frame_loop.take() {
            self.viz = Some(frame_loop.cancel());
        }
        self.commands.send(EngineCommand::StopAll);
    }
}
