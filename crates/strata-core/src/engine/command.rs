//! Lock-free command queue for real-time engine control
//!
//! The session thread sends commands via a lock-free queue and the audio
//! thread processes them at buffer boundaries. A mutex here would risk
//! audible dropouts: a failed `try_lock()` in the callback means silence.
//! The `rtrb` ringbuffer is wait-free on both ends and allocates nothing
//! after startup.

use std::sync::Arc;

use crate::decode::LoopBuffer;

/// Commands sent from the session to the audio thread
///
/// Each variant is an atomic operation on the engine, applied at the start
/// of an audio buffer so state never changes mid-buffer.
pub enum EngineCommand {
    /// Install a decoded loop on a track strip
    ///
    /// The buffer is shared via `Arc`, so the command itself stays
    /// pointer-sized in the queue.
    LoadLoop {
        track: usize,
        buffer: Arc<LoopBuffer>,
    },

    /// Drop any stale voices, then start a fresh voice on every strip with a
    /// loop, each at intra-loop offset `offset_seconds mod loop duration`
    StartAll { offset_seconds: f64 },

    /// Drop all active voices (a no-op when none are active)
    StopAll,

    /// Set the live gain for a track strip
    SetGain { track: usize, gain: f32 },
}

/// Capacity of the command queue
///
/// A full play cycle sends at most one command per track plus transport
/// commands, so 64 leaves ample headroom.
pub const COMMAND_QUEUE_CAPACITY: usize = 64;

/// Create a new command channel (producer/consumer pair)
///
/// The producer side belongs to the session, the consumer to the audio
/// thread.
pub fn command_channel() -> (rtrb::Producer<EngineCommand>, rtrb::Consumer<EngineCommand>) {
    rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY)
}

/// Send side of the command queue, owned by the session
pub struct CommandSender {
    producer: rtrb::Producer<EngineCommand>,
}

impl CommandSender {
    /// Wrap the producer half of a command channel
    pub fn new(producer: rtrb::Producer<EngineCommand>) -> Self {
        Self { producer }
    }

    /// Push a command without blocking
    ///
    /// A full queue drops the command and logs; the audio thread drains the
    /// queue every few milliseconds, so this only fires if it has stalled.
    pub fn send(&mut self, command: EngineCommand) {
        if self.producer.push(command).is_err() {
            log::error!("Engine command queue full, dropping command");
        }
    }
}
