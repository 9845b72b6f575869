//! Track registry - the fixed set of seven loop tracks
//!
//! The registry is an ordered table: array order defines left-to-right
//! rendering order and legend order. The legend letters spell the bank name.

use crate::types::{TrackId, NUM_TRACKS};

/// Static description of one loop track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackInfo {
    /// Track identity, equal to the array index (0-6)
    pub id: TrackId,
    /// Display name
    pub name: &'static str,
    /// Asset file name, resolved against the configured sounds directory
    pub file: &'static str,
    /// Accent color as a hex string
    pub color: &'static str,
    /// Single legend letter
    pub letter: &'static str,
}

/// The seven loop tracks, in rendering order
pub const TRACKS: [TrackInfo; NUM_TRACKS] = [
    TrackInfo { id: TrackId(0), name: "Triangle", file: "triangle-loop.mp3", color: "#FF5252", letter: "S" },
    TrackInfo { id: TrackId(1), name: "Drums", file: "drum-kick-loop.mp3", color: "#FF9800", letter: "E" },
    TrackInfo { id: TrackId(2), name: "Piano", file: "piano-loop.mp3", color: "#FFEB3B", letter: "V" },
    TrackInfo { id: TrackId(3), name: "Synth", file: "synth-loop.mp3", color: "#4CAF50", letter: "E" },
    TrackInfo { id: TrackId(4), name: "Guitar", file: "guitar-loop.mp3", color: "#2196F3", letter: "N" },
    TrackInfo { id: TrackId(5), name: "Vocals", file: "vocals-loop.mp3", color: "#673AB7", letter: "S" },
    TrackInfo { id: TrackId(6), name: "Effects", file: "effects-loop.mp3", color: "#E91E63", letter: "O" },
];
