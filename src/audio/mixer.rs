//! Mixing engine: the pull callback behind the speaker output.
//!
//! The engine lives on the device thread and owns its own table of track
//! handles (sample slots, then deck A, then deck B). The control thread never
//! touches that table directly; it sends [`MixCommand`]s through a lock-free
//! SPSC queue, applied at the start of each pull. Tracks that drop out of the
//! table travel back through a second queue so their memory is released on
//! the control thread.

use std::sync::Arc;

use ringbuf::{
    traits::{Consumer as _, Producer as _, Split},
    HeapCons, HeapProd, HeapRb,
};

use super::{
    deck::{DeckId, Slot},
    output::PullCallback,
    ring::MixBuffer,
    track::Track,
    AudioError, AudioResult, Frame, MAX_SAMPLE_SLOTS,
};

/// Commands sent from the control thread to the device thread.
enum MixCommand {
    Install { slot: Slot, track: Option<Arc<Track>> },
}

// ── Control-thread handle ────────────────────────────────────────────────────

pub struct MixerHandle {
    commands: HeapProd<MixCommand>,
    retired: HeapCons<Arc<Track>>,
}

impl MixerHandle {
    /// Put `track` into `slot` (or clear it with `None`). The engine swaps it
    /// in at its next pull.
    pub fn install(&mut self, slot: Slot, track: Option<Arc<Track>>) -> AudioResult<()> {
        self.collect_retired();
        self.commands
            .try_push(MixCommand::Install { slot, track })
            .map_err(|_| AudioError::CommandQueueFull)
    }

    /// Release tracks the engine has let go of. Returns how many were freed.
    pub fn collect_retired(&mut self) -> usize {
        let mut n = 0;
        while let Some(track) = self.retired.try_pop() {
            log::debug!("Released {}", track.name());
            drop(track);
            n += 1;
        }
        n
    }
}

// ── Device-thread engine ─────────────────────────────────────────────────────

pub struct MixEngine {
    ring: MixBuffer,
    samples: [Option<Arc<Track>>; MAX_SAMPLE_SLOTS],
    decks: [Option<Arc<Track>>; 2],
    commands: HeapCons<MixCommand>,
    retired: HeapProd<Arc<Track>>,
}

impl MixEngine {
    const CMD_RING_SIZE: usize = 64;
    /// Each command retires at most one track, and [`MixerHandle::install`]
    /// collects before queueing. Uncollected tracks therefore never exceed
    /// `CMD_RING_SIZE + 1`.
    const RETIRED_RING_SIZE: usize = Self::CMD_RING_SIZE + MAX_SAMPLE_SLOTS + 2;

    /// Build the engine with a mixing buffer of `capacity` frames, plus the
    /// handle the controller keeps.
    pub fn new(capacity: usize) -> AudioResult<(MixerHandle, MixEngine)> {
        let ring = MixBuffer::with_capacity(capacity)?;
        let (cmd_prod, cmd_cons) = HeapRb::<MixCommand>::new(Self::CMD_RING_SIZE).split();
        let (ret_prod, ret_cons) = HeapRb::<Arc<Track>>::new(Self::RETIRED_RING_SIZE).split();
        let engine = MixEngine {
            ring,
            samples: Default::default(),
            decks: Default::default(),
            commands: cmd_cons,
            retired: ret_prod,
        };
        let handle = MixerHandle {
            commands: cmd_prod,
            retired: ret_cons,
        };
        Ok((handle, engine))
    }

    pub fn frames_buffered(&self) -> usize {
        self.ring.frames_buffered()
    }

    /// Apply pending control commands. Never blocks.
    fn process_commands(&mut self) {
        while let Some(cmd) = self.commands.try_pop() {
            match cmd {
                MixCommand::Install { slot, track } => {
                    let entry = match slot {
                        Slot::Deck(DeckId::A) => &mut self.decks[0],
                        Slot::Deck(DeckId::B) => &mut self.decks[1],
                        Slot::Sample(s) => &mut self.samples[s.index()],
                    };
                    if let Some(old) = std::mem::replace(entry, track) {
                        let pushed = self.retired.try_push(old);
                        debug_assert!(pushed.is_ok(), "retired queue overflow");
                    }
                }
            }
        }
    }

    /// Sum of the current frame of every present track, samples first.
    fn mix_frame(samples: &[Option<Arc<Track>>], decks: &[Option<Arc<Track>>]) -> Frame {
        samples
            .iter()
            .chain(decks.iter())
            .flatten()
            .fold(Frame::SILENCE, |acc, t| acc.mix(t.next_frame()))
    }

    /// Make sure `n` mixed frames are buffered ahead of the read cursor.
    pub fn ensure_filled(&mut self, n: usize) -> AudioResult<usize> {
        let Self {
            ring,
            samples,
            decks,
            ..
        } = self;
        ring.ensure_filled(n, || Self::mix_frame(&samples[..], &decks[..]))
    }

    /// Hand out `left.len()` frames, mixing more first if needed.
    pub fn drain(&mut self, left: &mut [i16], right: &mut [i16]) -> AudioResult<()> {
        let Self {
            ring,
            samples,
            decks,
            ..
        } = self;
        ring.drain(left, right, || Self::mix_frame(&samples[..], &decks[..]))
    }
}

impl PullCallback for MixEngine {
    fn pull(&mut self, left: &mut [i16], right: &mut [i16]) -> AudioResult<()> {
        self.process_commands();
        self.drain(left, right)
    }
}
