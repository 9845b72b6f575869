//! Real-time looper engine
//!
//! This module contains the audio-thread side of the looper:
//! - Voice: one-shot playable instance bound to a decoded loop
//! - LooperEngine: per-track strips (gain stage, analysis tap, voice)
//! - EngineCommand: lock-free command queue from the session
//!
//! The engine is owned exclusively by the audio callback thread; the session
//! drives it through commands and never touches it directly.

mod command;
mod engine;
mod voice;

pub use command::*;
pub use engine::*;
pub use voice::*;
