//! Platform seam between output devices and whatever actually plays audio.
//!
//! [`CpalBackend`](super::cpal_backend::CpalBackend) talks to the system audio
//! server. [`NullBackend`] is a software sink that pulls periods on its own
//! thread; it backs headless runs and the tests.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use super::{
    output::{StreamControl, StreamHandler},
    AudioError, AudioResult, Frame, CHANNELS, SAMPLE_RATE,
};

/// Fixed stream format: 44.1 kHz, interleaved stereo, signed 16-bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSpec {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for StreamSpec {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            channels: CHANNELS,
        }
    }
}

pub trait AudioBackend {
    fn name(&self) -> &'static str;

    /// Names of the sinks currently available. Re-queried on every call.
    fn output_devices(&self) -> AudioResult<Vec<String>>;

    /// Create a stream on `sink` driven by `handler`. The stream does not
    /// request audio until [`SinkStream::start`].
    fn open_stream(
        &self,
        sink: &str,
        spec: &StreamSpec,
        handler: StreamHandler,
    ) -> AudioResult<Box<dyn SinkStream>>;

    fn device_exists(&self, sink: &str) -> AudioResult<bool> {
        Ok(self.output_devices()?.iter().any(|d| d == sink))
    }
}

/// A connected stream. Dropping it without `close` is allowed but skips drain.
pub trait SinkStream {
    /// Begin requesting audio. Readiness or failure is reported through the
    /// handler's lifecycle signal.
    fn start(&mut self) -> AudioResult<()>;

    /// Let audio already handed to the sink play out.
    fn drain(&mut self);

    /// Stop and release the stream.
    fn close(self: Box<Self>);
}

// ── NullBackend ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pacing {
    RealTime,
    FreeRunning,
}

/// Software sink that renders fixed-size periods on a thread per stream.
#[derive(Clone)]
pub struct NullBackend {
    sinks: Vec<String>,
    broken: Vec<String>,
    period_frames: usize,
    pacing: Pacing,
    capture: Option<Arc<Mutex<Vec<Frame>>>>,
}

impl NullBackend {
    pub const DEFAULT_PERIOD_FRAMES: usize = 1024;

    pub fn new<I, S>(sinks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sinks: sinks.into_iter().map(Into::into).collect(),
            broken: Vec::new(),
            period_frames: Self::DEFAULT_PERIOD_FRAMES,
            pacing: Pacing::RealTime,
            capture: None,
        }
    }

    pub fn with_period(mut self, frames: usize) -> Self {
        self.period_frames = frames.max(1);
        self
    }

    /// Render periods back to back instead of at the sample rate.
    pub fn free_running(mut self) -> Self {
        self.pacing = Pacing::FreeRunning;
        self
    }

    /// Keep every rendered frame in `sink`.
    pub fn with_capture(mut self, sink: Arc<Mutex<Vec<Frame>>>) -> Self {
        self.capture = Some(sink);
        self
    }

    /// Streams on `sink` fail to connect.
    pub fn with_broken_sink(mut self, sink: impl Into<String>) -> Self {
        self.broken.push(sink.into());
        self
    }
}

impl AudioBackend for NullBackend {
    fn name(&self) -> &'static str {
        "null"
    }

    fn output_devices(&self) -> AudioResult<Vec<String>> {
        Ok(self.sinks.clone())
    }

    fn open_stream(
        &self,
        sink: &str,
        spec: &StreamSpec,
        handler: StreamHandler,
    ) -> AudioResult<Box<dyn SinkStream>> {
        if !self.sinks.iter().any(|s| s == sink) {
            return Err(AudioError::DeviceNotFound(sink.to_string()));
        }
        let period = Duration::from_secs_f64(self.period_frames as f64 / spec.sample_rate as f64);
        Ok(Box::new(NullStream {
            sink: sink.to_string(),
            broken: self.broken.iter().any(|s| s == sink),
            period_frames: self.period_frames,
            period: match self.pacing {
                Pacing::RealTime => Some(period),
                Pacing::FreeRunning => None,
            },
            channels: spec.channels as usize,
            capture: self.capture.clone(),
            handler: Some(handler),
            stop: Arc::new(AtomicBool::new(false)),
            thread: None,
        }))
    }
}

struct NullStream {
    sink: String,
    broken: bool,
    period_frames: usize,
    period: Option<Duration>,
    channels: usize,
    capture: Option<Arc<Mutex<Vec<Frame>>>>,
    handler: Option<StreamHandler>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SinkStream for NullStream {
    fn start(&mut self) -> AudioResult<()> {
        let Some(mut handler) = self.handler.take() else {
            return Ok(());
        };
        let signal = handler.signal();
        if self.broken {
            signal.fail(format!("connection to {} refused", self.sink));
            return Ok(());
        }

        let stop = Arc::clone(&self.stop);
        let capture = self.capture.clone();
        let period = self.period;
        let mut buf = vec![0i16; self.period_frames * self.channels];

        let thread = thread::Builder::new()
            .name(format!("sink:{}", self.sink))
            .spawn(move || {
                signal.ready();
                // End of the audio already handed to the sink.
                let mut played_until: Option<Instant> = None;
                while !stop.load(Ordering::Acquire) {
                    let control = handler.render(&mut buf);
                    let now = Instant::now();
                    if played_until.is_some_and(|end| now > end) {
                        signal.underflow();
                    }
                    if let Some(capture) = &capture {
                        let mut frames = capture.lock().unwrap_or_else(|e| e.into_inner());
                        frames.extend(buf.chunks_exact(2).map(|p| Frame::new(p[0], p[1])));
                    }
                    if control == StreamControl::Stop {
                        break;
                    }
                    match period {
                        Some(p) => {
                            // Request the next period once this one starts playing.
                            let start = played_until.map_or(now, |end| end.max(now));
                            played_until = Some(start + p);
                            thread::sleep(start - now);
                        }
                        None => thread::yield_now(),
                    }
                }
            })
            .map_err(|e| AudioError::ConnectionError(format!("failed to spawn sink thread: {e}")))?;
        self.thread = Some(thread);
        Ok(())
    }

    fn drain(&mut self) {
        // The render loop exits on its own after the shutdown render.
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
    }

    fn close(mut self: Box<Self>) {
        self.stop.store(true, Ordering::Release);
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
    }
}

impl Drop for NullStream {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_configured_sinks() {
        let backend = NullBackend::new(["front", "cue"]);
        assert_eq!(backend.output_devices().unwrap(), vec!["front", "cue"]);
        assert!(backend.device_exists("cue").unwrap());
        assert!(!backend.device_exists("rear").unwrap());
    }

    #[test]
    fn default_spec_is_cd_stereo() {
        let spec = StreamSpec::default();
        assert_eq!(spec.sample_rate, 44_100);
        assert_eq!(spec.channels, 2);
    }
}
