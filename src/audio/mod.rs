pub mod backend;
pub mod cpal_backend;
pub mod deck;
pub mod decoder;
pub mod error;
pub mod frame;
pub mod loader;
pub mod mixer;
pub mod output;
pub mod ring;
pub mod track;

pub use error::{AudioError, AudioResult};
pub use frame::Frame;

/// Fixed output sample rate. Every device runs at this rate.
pub const SAMPLE_RATE: u32 = 44_100;

/// Interleaved stereo.
pub const CHANNELS: u16 = 2;

/// Number of one-shot sample slots next to the two decks.
pub const MAX_SAMPLE_SLOTS: usize = 16;

/// Mixing buffer capacity: 8 seconds of audio.
pub const MIX_BUFFER_FRAMES: usize = SAMPLE_RATE as usize * 8;
