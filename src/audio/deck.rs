use std::{fmt, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};

use super::{track::Track, MAX_SAMPLE_SLOTS};

// ── DeckId ────────────────────────────────────────────────────────────────────

/// One of the two long-form playback decks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeckId {
    A,
    B,
}

impl DeckId {
    pub const ALL: [DeckId; 2] = [DeckId::A, DeckId::B];

    pub fn index(self) -> usize {
        match self {
            DeckId::A => 0,
            DeckId::B => 1,
        }
    }
}

impl fmt::Display for DeckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeckId::A => write!(f, "deck a"),
            DeckId::B => write!(f, "deck b"),
        }
    }
}

impl FromStr for DeckId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "a" => Ok(DeckId::A),
            "b" => Ok(DeckId::B),
            _ => Err(format!("unknown deck: {s}")),
        }
    }
}

// ── SampleSlot ────────────────────────────────────────────────────────────────

/// Zero-based sample slot index, always below `MAX_SAMPLE_SLOTS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SampleSlot(usize);

impl SampleSlot {
    pub fn new(index: usize) -> Option<Self> {
        (index < MAX_SAMPLE_SLOTS).then_some(Self(index))
    }

    /// Slot from the 1-based number users type.
    pub fn from_number(n: usize) -> Option<Self> {
        n.checked_sub(1).and_then(Self::new)
    }

    pub fn index(self) -> usize {
        self.0
    }

    pub fn number(self) -> usize {
        self.0 + 1
    }

    pub fn all() -> impl Iterator<Item = SampleSlot> {
        (0..MAX_SAMPLE_SLOTS).map(SampleSlot)
    }
}

impl fmt::Display for SampleSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sample {}", self.number())
    }
}

/// Any place a track can live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Deck(DeckId),
    Sample(SampleSlot),
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Deck(d) => d.fmt(f),
            Slot::Sample(s) => s.fmt(f),
        }
    }
}

// ── Deck ──────────────────────────────────────────────────────────────────────

/// Control-side view of a deck: the loaded track and its fader.
///
/// `volume` is stored and reported but not applied by the mixer.
#[derive(Debug)]
pub struct Deck {
    pub id: DeckId,
    pub track: Option<Arc<Track>>,
    volume: f32,
}

impl Deck {
    pub fn new(id: DeckId) -> Self {
        Self {
            id,
            track: None,
            volume: 1.0,
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
    }

    pub fn play(&self) -> bool {
        self.track.as_ref().map(|t| t.play()).unwrap_or(false)
    }

    pub fn pause(&self) -> bool {
        self.track.as_ref().map(|t| t.pause()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deck_ids_parse_case_insensitively() {
        assert_eq!("a".parse::<DeckId>().unwrap(), DeckId::A);
        assert_eq!("B".parse::<DeckId>().unwrap(), DeckId::B);
        assert!("c".parse::<DeckId>().is_err());
    }

    #[test]
    fn sample_numbers_are_one_based() {
        assert_eq!(SampleSlot::from_number(1).unwrap().index(), 0);
        assert_eq!(SampleSlot::from_number(16).unwrap().index(), 15);
        assert!(SampleSlot::from_number(0).is_none(), "slot 0 does not exist");
        assert!(SampleSlot::from_number(17).is_none(), "only 16 slots");
        assert_eq!(SampleSlot::all().count(), MAX_SAMPLE_SLOTS);
    }

    #[test]
    fn volume_is_clamped() {
        let mut d = Deck::new(DeckId::A);
        d.set_volume(1.7);
        assert_eq!(d.volume(), 1.0);
        d.set_volume(-0.5);
        assert_eq!(d.volume(), 0.0);
        d.set_volume(f32::NAN);
        assert_eq!(d.volume(), 0.0);
    }

    #[test]
    fn empty_deck_ignores_transport() {
        let d = Deck::new(DeckId::B);
        assert!(!d.play(), "play on empty deck is a no-op");
        assert!(!d.pause());
    }
}
