//! A fully decoded audio file and its playback state machine.
//!
//! The control thread flips the play state; the device thread is the only
//! caller of [`Track::next_frame`] and therefore the only writer of the cursor.

use std::{
    fmt,
    sync::atomic::{AtomicU8, AtomicUsize, Ordering},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use super::{Frame, SAMPLE_RATE};

/// Track playback states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackState {
    Ready,
    Playing,
    EndOfMedia,
}

impl TrackState {
    const fn as_u8(self) -> u8 {
        match self {
            TrackState::Ready => 0,
            TrackState::Playing => 1,
            TrackState::EndOfMedia => 2,
        }
    }

    const fn from_u8(v: u8) -> Self {
        match v {
            0 => TrackState::Ready,
            1 => TrackState::Playing,
            _ => TrackState::EndOfMedia,
        }
    }
}

impl fmt::Display for TrackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackState::Ready => write!(f, "ready"),
            TrackState::Playing => write!(f, "playing"),
            TrackState::EndOfMedia => write!(f, "ended"),
        }
    }
}

pub struct Track {
    name: String,
    frames: Box<[Frame]>,
    cursor: AtomicUsize,
    state: AtomicU8,
}

impl Track {
    /// Wrap already-decoded frames. The track starts READY at frame 0.
    pub fn from_frames(name: impl Into<String>, frames: Vec<Frame>) -> Self {
        Self {
            name: name.into(),
            frames: frames.into_boxed_slice(),
            cursor: AtomicUsize::new(0),
            state: AtomicU8::new(TrackState::Ready.as_u8()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total frames in the track.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frames already played.
    pub fn position(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    pub fn duration(&self) -> Duration {
        frames_to_duration(self.len())
    }

    pub fn elapsed(&self) -> Duration {
        frames_to_duration(self.position())
    }

    pub fn state(&self) -> TrackState {
        TrackState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_playing(&self) -> bool {
        self.state() == TrackState::Playing
    }

    /// READY -> PLAYING. Returns whether the transition happened.
    pub fn play(&self) -> bool {
        self.transition(TrackState::Ready, TrackState::Playing)
    }

    /// PLAYING -> READY, keeping the cursor. Returns whether the transition happened.
    pub fn pause(&self) -> bool {
        self.transition(TrackState::Playing, TrackState::Ready)
    }

    /// Next frame for the mixer.
    ///
    /// Silence while not playing. Running off the end moves the track to
    /// END_OF_MEDIA and yields silence from then on. Never blocks or allocates.
    #[inline]
    pub fn next_frame(&self) -> Frame {
        if !self.is_playing() {
            return Frame::SILENCE;
        }
        let pos = self.cursor.load(Ordering::Relaxed);
        match self.frames.get(pos) {
            Some(&frame) => {
                self.cursor.store(pos + 1, Ordering::Release);
                frame
            }
            None => {
                self.transition(TrackState::Playing, TrackState::EndOfMedia);
                Frame::SILENCE
            }
        }
    }

    fn transition(&self, from: TrackState, to: TrackState) -> bool {
        self.state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl fmt::Debug for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Track")
            .field("name", &self.name)
            .field("len", &self.len())
            .field("position", &self.position())
            .field("state", &self.state())
            .finish()
    }
}

fn frames_to_duration(frames: usize) -> Duration {
    Duration::from_millis(frames as u64 * 1000 / SAMPLE_RATE as u64)
}
