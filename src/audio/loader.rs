//! Off-thread track loading.
//!
//! Every load gets its own short-lived thread so decoding never touches the
//! device thread. The resulting [`Track`] is only handed out once the thread
//! has been joined.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    thread::{self, JoinHandle},
};

use super::{decoder::Decoder, track::Track, AudioError, AudioResult};

pub struct PendingLoad {
    path: PathBuf,
    handle: JoinHandle<AudioResult<Track>>,
}

impl PendingLoad {
    /// Start decoding `path` on a new thread named `load:<file name>`.
    pub fn spawn(decoder: Arc<dyn Decoder>, path: impl Into<PathBuf>) -> AudioResult<Self> {
        let path = path.into();
        let name = track_name(&path);
        let thread_path = path.clone();
        let handle = thread::Builder::new()
            .name(format!("load:{name}"))
            .spawn(move || {
                let frames = decoder.decode(&thread_path)?;
                log::debug!("Decoded {name}: {} frames", frames.len());
                Ok(Track::from_frames(name, frames))
            })
            .map_err(|e| {
                AudioError::load_failed(&path, format!("failed to spawn loader thread: {e}"))
            })?;
        Ok(Self { path, handle })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the loader thread has finished (successfully or not).
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the loader thread ends and take its result.
    pub fn wait(self) -> AudioResult<Track> {
        match self.handle.join() {
            Ok(result) => result,
            Err(_) => Err(AudioError::load_failed(self.path, "loader thread panicked")),
        }
    }
}

/// Display name for a track: its file name, or the whole path if it has none.
pub fn track_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::Frame;

    struct FixedDecoder(usize);

    impl Decoder for FixedDecoder {
        fn decode(&self, path: &Path) -> AudioResult<Vec<Frame>> {
            if path.ends_with("missing.mp3") {
                return Err(AudioError::load_failed(path, "no such file"));
            }
            Ok(vec![Frame::new(7, 7); self.0])
        }
    }

    #[test]
    fn load_produces_named_ready_track() {
        let pending = PendingLoad::spawn(Arc::new(FixedDecoder(12)), "/music/intro.mp3").unwrap();
        let track = pending.wait().unwrap();
        assert_eq!(track.name(), "intro.mp3");
        assert_eq!(track.len(), 12);
        assert_eq!(track.position(), 0);
    }

    #[test]
    fn failed_decode_produces_no_track() {
        let pending = PendingLoad::spawn(Arc::new(FixedDecoder(1)), "/music/missing.mp3").unwrap();
        assert_eq!(pending.path(), Path::new("/music/missing.mp3"));
        assert!(matches!(pending.wait(), Err(AudioError::LoadFailed { .. })));
    }

    #[test]
    fn polling_eventually_reports_finished() {
        let pending = PendingLoad::spawn(Arc::new(FixedDecoder(1)), "a.mp3").unwrap();
        while !pending.is_finished() {
            thread::yield_now();
        }
        assert!(pending.wait().is_ok());
    }
}
