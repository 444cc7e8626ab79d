use serde::Serialize;

use crate::audio::{
    deck::{Deck, DeckId, SampleSlot},
    output::{DeviceState, OutputDevice},
    track::{Track, TrackState},
};

#[derive(Debug, Clone, Serialize)]
pub struct TrackStatus {
    pub name: String,
    pub state: TrackState,
    pub position_ms: u64,
    pub duration_ms: u64,
}

impl From<&Track> for TrackStatus {
    fn from(t: &Track) -> Self {
        Self {
            name: t.name().to_string(),
            state: t.state(),
            position_ms: t.elapsed().as_millis() as u64,
            duration_ms: t.duration().as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeckStatus {
    pub deck: DeckId,
    pub volume: f32,
    pub track: Option<TrackStatus>,
}

impl From<&Deck> for DeckStatus {
    fn from(d: &Deck) -> Self {
        Self {
            deck: d.id,
            volume: d.volume(),
            track: d.track.as_deref().map(TrackStatus::from),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SampleStatus {
    /// 1-based, as typed in the shell.
    pub slot: usize,
    pub track: TrackStatus,
}

impl SampleStatus {
    pub fn new(slot: SampleSlot, track: &Track) -> Self {
        Self {
            slot: slot.number(),
            track: TrackStatus::from(track),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputStatus {
    pub name: String,
    pub sink: String,
    pub state: DeviceState,
    pub pulls: u64,
    pub underflows: u64,
    pub last_error: Option<String>,
}

impl From<&OutputDevice> for OutputStatus {
    fn from(dev: &OutputDevice) -> Self {
        let stats = dev.stats();
        Self {
            name: dev.name().to_string(),
            sink: dev.sink().to_string(),
            state: dev.state(),
            pulls: stats.pulls(),
            underflows: stats.underflows(),
            last_error: dev.last_error(),
        }
    }
}

/// Snapshot of everything the controller owns. Only loaded sample slots are
/// listed.
#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    pub decks: Vec<DeckStatus>,
    pub samples: Vec<SampleStatus>,
    pub outputs: Vec<OutputStatus>,
}

fn format_ms(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{}:{:02}.{:01}", secs / 60, secs % 60, (ms % 1000) / 100)
}

impl std::fmt::Display for TrackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}/{}",
            self.name,
            self.state,
            format_ms(self.position_ms),
            format_ms(self.duration_ms)
        )
    }
}

impl std::fmt::Display for ControllerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for d in &self.decks {
            match &d.track {
                Some(t) => writeln!(f, "{}: {t} volume {:.2}", d.deck, d.volume)?,
                None => writeln!(f, "{}: empty", d.deck)?,
            }
        }
        for s in &self.samples {
            writeln!(f, "sample {}: {}", s.slot, s.track)?;
        }
        for o in &self.outputs {
            write!(
                f,
                "{} ({}): {}, {} pulls, {} underflows",
                o.name, o.sink, o.state, o.pulls, o.underflows
            )?;
            if let Some(e) = &o.last_error {
                write!(f, ", last error: {e}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
