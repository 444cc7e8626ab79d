//! The controller owns both decks, the sample slots and the two output
//! devices. Speakers are driven by the mixing engine, headphones by silence.

use std::{fmt, path::Path, sync::Arc};

use crate::{
    audio::{
        backend::AudioBackend,
        deck::{Deck, DeckId, SampleSlot, Slot},
        decoder::Decoder,
        loader::PendingLoad,
        mixer::{MixEngine, MixerHandle},
        output::{DeviceStats, OutputDevice, Silence},
        track::Track,
        AudioError, AudioResult, MAX_SAMPLE_SLOTS, MIX_BUFFER_FRAMES,
    },
    config::Config,
};

use super::types::{ControllerStatus, DeckStatus, OutputStatus, SampleStatus};

pub struct Controller {
    config: Config,
    decoder: Arc<dyn Decoder>,
    decks: [Deck; 2],
    samples: [Option<Arc<Track>>; MAX_SAMPLE_SLOTS],
    mixer: MixerHandle,
    speakers: OutputDevice,
    headphones: OutputDevice,
}

impl Controller {
    /// Open the speaker output (mixing engine) and then the headphone output
    /// (silence). If the headphones fail the speakers are shut down again.
    pub fn new(
        config: &Config,
        backend: &dyn AudioBackend,
        decoder: Arc<dyn Decoder>,
    ) -> AudioResult<Self> {
        let speaker_sink = required_sink(config.speakers.as_deref(), "speakers")?;
        let headphone_sink = required_sink(config.headphones.as_deref(), "headphones")?;

        let (mixer, engine) = MixEngine::new(MIX_BUFFER_FRAMES)?;
        let speakers = OutputDevice::open(backend, "speakers", speaker_sink, Box::new(engine))?;
        let headphones =
            match OutputDevice::open(backend, "headphones", headphone_sink, Box::new(Silence)) {
                Ok(dev) => dev,
                Err(e) => {
                    log::warn!("Headphones failed to open, shutting speakers down: {e}");
                    speakers.shutdown();
                    return Err(e);
                }
            };

        log::info!("Controller running: speakers={speaker_sink} headphones={headphone_sink}");
        Ok(Self {
            config: config.clone(),
            decoder,
            decks: [Deck::new(DeckId::A), Deck::new(DeckId::B)],
            samples: Default::default(),
            mixer,
            speakers,
            headphones,
        })
    }

    // ── Loading ──────────────────────────────────────────────────────────

    /// Load `path` onto `deck`. The previous track is only replaced once the
    /// new one decoded; on failure the deck is untouched.
    pub fn load_deck(&mut self, deck: DeckId, path: &Path) -> AudioResult<()> {
        let track = self.load(path)?;
        self.mixer
            .install(Slot::Deck(deck), Some(Arc::clone(&track)))?;
        log::info!("Loaded {} on {deck}", track.name());
        self.decks[deck.index()].track = Some(track);
        Ok(())
    }

    /// Load `path` into a sample slot, same replacement rules as decks.
    pub fn load_sample(&mut self, slot: SampleSlot, path: &Path) -> AudioResult<()> {
        let track = self.load(path)?;
        self.mixer
            .install(Slot::Sample(slot), Some(Arc::clone(&track)))?;
        log::info!("Loaded {} as {slot}", track.name());
        self.samples[slot.index()] = Some(track);
        Ok(())
    }

    /// Empty `deck`. Returns whether a track was loaded.
    pub fn unload_deck(&mut self, deck: DeckId) -> AudioResult<bool> {
        if self.decks[deck.index()].track.is_none() {
            return Ok(false);
        }
        self.mixer.install(Slot::Deck(deck), None)?;
        if let Some(track) = self.decks[deck.index()].track.take() {
            log::info!("Unloaded {} from {deck}", track.name());
        }
        Ok(true)
    }

    pub fn unload_sample(&mut self, slot: SampleSlot) -> AudioResult<bool> {
        if self.samples[slot.index()].is_none() {
            return Ok(false);
        }
        self.mixer.install(Slot::Sample(slot), None)?;
        if let Some(track) = self.samples[slot.index()].take() {
            log::info!("Unloaded {} from {slot}", track.name());
        }
        Ok(true)
    }

    /// Free tracks the speaker engine has dropped since the last call.
    pub fn collect_retired(&mut self) -> usize {
        self.mixer.collect_retired()
    }

    fn load(&mut self, path: &Path) -> AudioResult<Arc<Track>> {
        self.mixer.collect_retired();
        let path = self.config.resolve_media(path);
        let track = PendingLoad::spawn(Arc::clone(&self.decoder), path)?
            .wait()
            .inspect_err(|e| log::warn!("{e}"))?;
        Ok(Arc::new(track))
    }

    // ── Transport ────────────────────────────────────────────────────────

    /// Returns whether the deck started. Empty decks are a no-op.
    pub fn play_deck(&self, deck: DeckId) -> bool {
        let started = self.decks[deck.index()].play();
        log::debug!("play {deck}: {}", if started { "started" } else { "no-op" });
        started
    }

    pub fn pause_deck(&self, deck: DeckId) -> bool {
        let paused = self.decks[deck.index()].pause();
        log::debug!("pause {deck}: {}", if paused { "paused" } else { "no-op" });
        paused
    }

    /// Fire a sample. Empty slots and already-played samples are a no-op.
    pub fn play_sample(&self, slot: SampleSlot) -> bool {
        self.samples[slot.index()]
            .as_ref()
            .map(|t| t.play())
            .unwrap_or(false)
    }

    pub fn set_deck_volume(&mut self, deck: DeckId, volume: f32) {
        self.decks[deck.index()].set_volume(volume);
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn deck(&self, deck: DeckId) -> &Deck {
        &self.decks[deck.index()]
    }

    pub fn sample(&self, slot: SampleSlot) -> Option<&Arc<Track>> {
        self.samples[slot.index()].as_ref()
    }

    pub fn speaker_stats(&self) -> Arc<DeviceStats> {
        self.speakers.stats()
    }

    pub fn status(&self) -> ControllerStatus {
        ControllerStatus {
            decks: self.decks.iter().map(DeckStatus::from).collect(),
            samples: SampleSlot::all()
                .filter_map(|s| self.sample(s).map(|t| SampleStatus::new(s, t)))
                .collect(),
            outputs: vec![
                OutputStatus::from(&self.speakers),
                OutputStatus::from(&self.headphones),
            ],
        }
    }

    /// Shut both outputs down, then release every track.
    pub fn shutdown(self) {
        let Controller {
            speakers,
            headphones,
            mut mixer,
            decks,
            samples,
            ..
        } = self;
        speakers.shutdown();
        headphones.shutdown();
        mixer.collect_retired();
        let loaded = decks.iter().filter(|d| d.track.is_some()).count()
            + samples.iter().filter(|s| s.is_some()).count();
        drop(decks);
        drop(samples);
        log::info!("Controller shut down, released {loaded} tracks");
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("speakers", &self.speakers)
            .field("headphones", &self.headphones)
            .finish_non_exhaustive()
    }
}

fn required_sink<'a>(sink: Option<&'a str>, name: &str) -> AudioResult<&'a str> {
    sink.ok_or_else(|| AudioError::DeviceNotFound(format!("no sink configured for {name}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{backend::NullBackend, track::TrackState, Frame},
        config::ConfigVar,
    };
    use std::{
        path::PathBuf,
        sync::Mutex,
        thread,
        time::{Duration, Instant},
    };

    /// Decodes any path ending in `.ok` into frames carrying the path length.
    struct StubDecoder;

    impl Decoder for StubDecoder {
        fn decode(&self, path: &Path) -> AudioResult<Vec<Frame>> {
            match path.extension().and_then(|e| e.to_str()) {
                Some("ok") => {
                    let v = path.as_os_str().len() as i16;
                    Ok(vec![Frame::new(v, v); 44_100])
                }
                _ => Err(AudioError::load_failed(path, "no such file")),
            }
        }
    }

    fn config() -> Config {
        let mut cfg = Config::default();
        cfg.set(ConfigVar::Speakers, "front");
        cfg.set(ConfigVar::Headphones, "cue");
        cfg
    }

    fn controller(backend: &NullBackend) -> Controller {
        Controller::new(&config(), backend, Arc::new(StubDecoder)).unwrap()
    }

    fn wait_for(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn failed_load_keeps_previous_track_playable() {
        let backend = NullBackend::new(["front", "cue"]);
        let mut c = controller(&backend);
        c.load_deck(DeckId::A, Path::new("/music/first.ok")).unwrap();

        let err = c
            .load_deck(DeckId::A, Path::new("/music/missing.mp3"))
            .unwrap_err();
        assert!(matches!(err, AudioError::LoadFailed { .. }), "got {err:?}");

        let track = c.deck(DeckId::A).track.clone().expect("old track still loaded");
        assert_eq!(track.name(), "first.ok");
        assert!(c.play_deck(DeckId::A), "old track still plays");
        c.shutdown();
    }

    #[test]
    fn shutdown_while_playing_stops_pulls() {
        let backend = NullBackend::new(["front", "cue"]).with_period(256);
        let mut c = controller(&backend);
        c.load_deck(DeckId::A, Path::new("/music/a.ok")).unwrap();
        c.play_deck(DeckId::A);
        let stats = c.speaker_stats();
        wait_for(|| stats.pulls() >= 2);

        c.shutdown();
        let after = stats.pulls();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(stats.pulls(), after, "speaker pull counter stays flat after shutdown");
    }

    #[test]
    fn speakers_hear_decks_and_samples() {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let backend = NullBackend::new(["front", "cue"])
            .with_period(128)
            .with_capture(Arc::clone(&captured));
        let mut c = controller(&backend);
        let deck_path = PathBuf::from("a.ok");
        let sample_path = PathBuf::from("bb.ok");
        c.load_deck(DeckId::A, &deck_path).unwrap();
        c.load_sample(SampleSlot::from_number(3).unwrap(), &sample_path)
            .unwrap();
        c.play_deck(DeckId::A);
        c.play_sample(SampleSlot::from_number(3).unwrap());

        let both = deck_path.as_os_str().len() as i16 + sample_path.as_os_str().len() as i16;
        wait_for(|| {
            captured
                .lock()
                .unwrap()
                .iter()
                .any(|f| *f == Frame::new(both, both))
        });
        c.shutdown();
    }

    #[test]
    fn transport_on_empty_slots_is_noop() {
        let backend = NullBackend::new(["front", "cue"]);
        let c = controller(&backend);
        assert!(!c.play_deck(DeckId::B));
        assert!(!c.pause_deck(DeckId::B));
        assert!(!c.play_sample(SampleSlot::from_number(16).unwrap()));
        c.shutdown();
    }

    #[test]
    fn pause_and_resume_deck() {
        let backend = NullBackend::new(["front", "cue"]);
        let mut c = controller(&backend);
        c.load_deck(DeckId::B, Path::new("b.ok")).unwrap();
        assert!(c.play_deck(DeckId::B));
        assert!(c.pause_deck(DeckId::B));
        assert_eq!(
            c.deck(DeckId::B).track.as_ref().unwrap().state(),
            TrackState::Ready
        );
        c.shutdown();
    }

    #[test]
    fn missing_headphones_shut_speakers_down() {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let backend = NullBackend::new(["front"])
            .with_period(64)
            .with_capture(Arc::clone(&captured));
        let err = Controller::new(&config(), &backend, Arc::new(StubDecoder)).unwrap_err();
        assert!(matches!(err, AudioError::DeviceNotFound(ref s) if s == "cue"), "got {err:?}");

        let rendered = captured.lock().unwrap().len();
        assert!(rendered > 0, "speakers were opened first");
        thread::sleep(Duration::from_millis(30));
        assert_eq!(
            captured.lock().unwrap().len(),
            rendered,
            "speakers render nothing once the controller gave up"
        );
    }

    #[test]
    fn unload_playing_deck_silences_speakers() {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let backend = NullBackend::new(["front", "cue"])
            .with_period(64)
            .with_capture(Arc::clone(&captured));
        let mut c = controller(&backend);
        c.load_deck(DeckId::A, Path::new("a.ok")).unwrap();
        c.play_deck(DeckId::A);
        let level = "a.ok".len() as i16;
        wait_for(|| captured.lock().unwrap().iter().any(|f| f.left == level));

        let track = c.deck(DeckId::A).track.clone().unwrap();
        assert!(c.unload_deck(DeckId::A).unwrap());
        assert!(c.deck(DeckId::A).track.is_none());
        assert!(!c.play_deck(DeckId::A), "an unloaded deck cannot play");

        wait_for(|| {
            c.collect_retired();
            Arc::strong_count(&track) == 1
        });
        captured.lock().unwrap().clear();
        wait_for(|| captured.lock().unwrap().len() > 256);
        assert!(
            captured.lock().unwrap().iter().all(|f| f.is_silent()),
            "speakers are silent once the engine let go of the track"
        );
        assert!(!c.unload_deck(DeckId::A).unwrap(), "second unload is a no-op");
        c.shutdown();
    }

    #[test]
    fn unload_empty_sample_is_noop() {
        let backend = NullBackend::new(["front", "cue"]);
        let mut c = controller(&backend);
        let slot = SampleSlot::from_number(4).unwrap();
        assert!(!c.unload_sample(slot).unwrap());
        c.load_sample(slot, Path::new("s.ok")).unwrap();
        assert!(c.unload_sample(slot).unwrap());
        assert!(c.sample(slot).is_none());
        assert!(!c.play_sample(slot));
        c.shutdown();
    }

    #[test]
    fn controller_debug_names_outputs() {
        let backend = NullBackend::new(["front", "cue"]);
        let c = controller(&backend);
        let text = format!("{c:?}");
        assert!(text.contains("speakers") && text.contains("headphones"), "{text}");
        c.shutdown();
    }

    #[test]
    fn unset_sink_is_device_not_found() {
        let backend = NullBackend::new(["front", "cue"]);
        let err = Controller::new(&Config::default(), &backend, Arc::new(StubDecoder)).unwrap_err();
        assert!(matches!(err, AudioError::DeviceNotFound(_)));
    }

    #[test]
    fn status_lists_loaded_slots_and_outputs() {
        let backend = NullBackend::new(["front", "cue"]);
        let mut c = controller(&backend);
        c.load_sample(SampleSlot::from_number(2).unwrap(), Path::new("s.ok"))
            .unwrap();
        c.set_deck_volume(DeckId::A, 0.25);
        let status = c.status();
        assert_eq!(status.decks.len(), 2);
        assert_eq!(status.decks[0].volume, 0.25);
        assert!(status.decks[0].track.is_none());
        assert_eq!(status.samples.len(), 1);
        assert_eq!(status.samples[0].slot, 2);
        assert_eq!(status.outputs[0].name, "speakers");
        assert_eq!(status.outputs[1].name, "headphones");
        c.shutdown();
    }
}
