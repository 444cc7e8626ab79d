//! Output device lifecycle and the pull-callback contract.
//!
//! An [`OutputDevice`] wraps one stream opened through an [`AudioBackend`].
//! The backend's device thread calls [`StreamHandler::render`] whenever the
//! sink wants audio; the handler splits the request into left/right buffers
//! and asks the registered [`PullCallback`] to fill them.
//!
//! State machine: `Initializing -> Ready -> ShutDown`, with `Error` reachable
//! from `Initializing` or `Ready`. `Error` and `ShutDown` are terminal and no
//! callback runs after either.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Condvar, Mutex, MutexGuard,
    },
    time::Duration,
};

use serde::Serialize;

use super::{
    backend::{AudioBackend, SinkStream, StreamSpec},
    AudioError, AudioResult, MIX_BUFFER_FRAMES,
};

// ── Pull callback ────────────────────────────────────────────────────────────

/// Fills `left` and `right` (same length, one entry per frame) with the next
/// audio to play. Runs on the device thread: no blocking, no allocation.
pub trait PullCallback: Send {
    fn pull(&mut self, left: &mut [i16], right: &mut [i16]) -> AudioResult<()>;
}

impl<F> PullCallback for F
where
    F: FnMut(&mut [i16], &mut [i16]) -> AudioResult<()> + Send,
{
    fn pull(&mut self, left: &mut [i16], right: &mut [i16]) -> AudioResult<()> {
        self(left, right)
    }
}

/// Callback that only ever produces silence (headphone cue bus).
#[derive(Debug, Default, Clone, Copy)]
pub struct Silence;

impl PullCallback for Silence {
    fn pull(&mut self, left: &mut [i16], right: &mut [i16]) -> AudioResult<()> {
        left.fill(0);
        right.fill(0);
        Ok(())
    }
}

// ── Device state ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    Initializing,
    Ready,
    Error,
    ShutDown,
}

impl DeviceState {
    pub fn is_terminal(self) -> bool {
        matches!(self, DeviceState::Error | DeviceState::ShutDown)
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceState::Initializing => write!(f, "initializing"),
            DeviceState::Ready => write!(f, "ready"),
            DeviceState::Error => write!(f, "error"),
            DeviceState::ShutDown => write!(f, "shut down"),
        }
    }
}

/// Counters updated from the device thread. Outlive the device itself.
#[derive(Debug, Default)]
pub struct DeviceStats {
    pulls: AtomicU64,
    underflows: AtomicU64,
}

impl DeviceStats {
    /// Pull callback invocations so far.
    pub fn pulls(&self) -> u64 {
        self.pulls.load(Ordering::Acquire)
    }

    pub fn underflows(&self) -> u64 {
        self.underflows.load(Ordering::Acquire)
    }
}

struct Lifecycle {
    state: DeviceState,
    draining: bool,
    error: Option<String>,
}

struct DeviceShared {
    name: String,
    lifecycle: Mutex<Lifecycle>,
    changed: Condvar,
    /// Set by the control thread; the next render observes it.
    shutdown_requested: AtomicBool,
    /// Set once the device thread must not call the pull callback again.
    halted: AtomicBool,
    latency_us: AtomicU64,
    stats: Arc<DeviceStats>,
}

impl DeviceShared {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            lifecycle: Mutex::new(Lifecycle {
                state: DeviceState::Initializing,
                draining: false,
                error: None,
            }),
            changed: Condvar::new(),
            shutdown_requested: AtomicBool::new(false),
            halted: AtomicBool::new(false),
            latency_us: AtomicU64::new(0),
            stats: Arc::new(DeviceStats::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Block until `done` holds for the lifecycle.
    fn wait_until(&self, mut done: impl FnMut(&Lifecycle) -> bool) -> MutexGuard<'_, Lifecycle> {
        let mut guard = self.lock();
        while !done(&guard) {
            guard = self.changed.wait(guard).unwrap_or_else(|e| e.into_inner());
        }
        guard
    }
}

// ── Lifecycle signal (backend -> device) ─────────────────────────────────────

/// Handle a backend uses to report connection progress for one stream.
#[derive(Clone)]
pub struct LifecycleSignal {
    shared: Arc<DeviceShared>,
}

impl LifecycleSignal {
    /// The sink is connected and will start pulling.
    pub fn ready(&self) {
        let mut lc = self.shared.lock();
        if lc.state == DeviceState::Initializing {
            lc.state = DeviceState::Ready;
            log::info!("Audio output {} ready", self.shared.name);
            self.shared.changed.notify_all();
        }
    }

    /// The connection failed or broke. Moves the device to `Error`.
    pub fn fail(&self, reason: impl fmt::Display) {
        self.shared.halted.store(true, Ordering::Release);
        let mut lc = self.shared.lock();
        if !lc.state.is_terminal() {
            log::error!("Audio output {} failed: {reason}", self.shared.name);
            lc.state = DeviceState::Error;
            lc.error = Some(reason.to_string());
            self.shared.changed.notify_all();
        }
    }

    /// The sink ran out of data before the callback delivered.
    pub fn underflow(&self) {
        let n = self.shared.stats.underflows.fetch_add(1, Ordering::AcqRel) + 1;
        log::debug!("Underflow on {} (total {n})", self.shared.name);
    }

    /// Latest reported output latency (time from callback to playback).
    pub fn set_latency(&self, latency: Duration) {
        self.shared
            .latency_us
            .store(latency.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn latency(&self) -> Duration {
        Duration::from_micros(self.shared.latency_us.load(Ordering::Relaxed))
    }

    pub fn device_name(&self) -> &str {
        &self.shared.name
    }

    fn begin_drain(&self) {
        let mut lc = self.shared.lock();
        lc.draining = true;
        self.shared.changed.notify_all();
    }
}

// ── Stream handler (device thread) ───────────────────────────────────────────

/// What the backend should do after a render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamControl {
    Continue,
    /// No more data will be produced; stop requesting it.
    Stop,
}

/// Device-thread half of an output device. Owned by the backend stream.
pub struct StreamHandler {
    callback: Box<dyn PullCallback>,
    signal: LifecycleSignal,
    left: Vec<i16>,
    right: Vec<i16>,
}

impl StreamHandler {
    fn new(callback: Box<dyn PullCallback>, signal: LifecycleSignal) -> AudioResult<Self> {
        Ok(Self {
            callback,
            signal,
            left: scratch(MIX_BUFFER_FRAMES)?,
            right: scratch(MIX_BUFFER_FRAMES)?,
        })
    }

    pub fn signal(&self) -> LifecycleSignal {
        self.signal.clone()
    }

    /// Fill an interleaved stereo buffer.
    ///
    /// Produces silence and returns `Stop` once shutdown was requested or the
    /// device failed. A failing pull callback moves the device to `Error`.
    pub fn render(&mut self, out: &mut [i16]) -> StreamControl {
        let shared = &self.signal.shared;
        if shared.halted.load(Ordering::Acquire) {
            out.fill(0);
            return StreamControl::Stop;
        }
        if shared.shutdown_requested.load(Ordering::Acquire) {
            out.fill(0);
            shared.halted.store(true, Ordering::Release);
            self.signal.begin_drain();
            return StreamControl::Stop;
        }

        let frames = out.len() / 2;
        if frames > self.left.len() {
            out.fill(0);
            self.signal.fail(AudioError::BufferOverrun {
                requested: frames,
                capacity: self.left.len(),
            });
            return StreamControl::Stop;
        }

        shared.stats.pulls.fetch_add(1, Ordering::AcqRel);
        let (left, right) = (&mut self.left[..frames], &mut self.right[..frames]);
        if let Err(e) = self.callback.pull(left, right) {
            out.fill(0);
            self.signal.fail(e);
            return StreamControl::Stop;
        }

        for (i, pair) in out.chunks_exact_mut(2).enumerate() {
            pair[0] = left[i];
            pair[1] = right[i];
        }
        StreamControl::Continue
    }
}

fn scratch(len: usize) -> AudioResult<Vec<i16>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).map_err(|_| AudioError::OutOfMemory)?;
    v.resize(len, 0);
    Ok(v)
}

// ── OutputDevice ─────────────────────────────────────────────────────────────

/// One connected output (speakers or headphones).
pub struct OutputDevice {
    sink: String,
    shared: Arc<DeviceShared>,
    stream: Option<Box<dyn SinkStream>>,
}

impl OutputDevice {
    /// Connect `name` to the backend sink `sink` and block until it is ready.
    ///
    /// On failure nothing is left running.
    pub fn open(
        backend: &dyn AudioBackend,
        name: &str,
        sink: &str,
        callback: Box<dyn PullCallback>,
    ) -> AudioResult<Self> {
        let shared = Arc::new(DeviceShared::new(name));
        let signal = LifecycleSignal {
            shared: Arc::clone(&shared),
        };
        let handler = StreamHandler::new(callback, signal)?;

        log::debug!("Opening {name} on {sink} via {}", backend.name());
        let mut stream = backend.open_stream(sink, &StreamSpec::default(), handler)?;
        if let Err(e) = stream.start() {
            shared.halted.store(true, Ordering::Release);
            stream.close();
            return Err(e);
        }

        let settled = shared.wait_until(|lc| lc.state != DeviceState::Initializing);
        if settled.state != DeviceState::Ready {
            let reason = settled
                .error
                .clone()
                .unwrap_or_else(|| format!("{name} did not become ready"));
            drop(settled);
            stream.close();
            return Err(AudioError::ConnectionError(reason));
        }
        drop(settled);

        Ok(Self {
            sink: sink.to_string(),
            shared,
            stream: Some(stream),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn sink(&self) -> &str {
        &self.sink
    }

    pub fn state(&self) -> DeviceState {
        self.shared.lock().state
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.lock().error.clone()
    }

    pub fn stats(&self) -> Arc<DeviceStats> {
        Arc::clone(&self.shared.stats)
    }

    /// Stop the device: the next pull emits silence and stops the stream,
    /// pending audio is drained, then the connection is closed.
    /// Blocks until the device is terminal.
    pub fn shutdown(mut self) {
        self.close_stream();
    }

    fn close_stream(&mut self) {
        let Some(mut stream) = self.stream.take() else {
            return;
        };
        let ready = self.state() == DeviceState::Ready;
        if ready {
            self.shared.shutdown_requested.store(true, Ordering::Release);
            let guard = self
                .shared
                .wait_until(|lc| lc.draining || lc.state.is_terminal());
            let drain = guard.draining;
            drop(guard);
            if drain {
                stream.drain();
            }
        }
        self.shared.halted.store(true, Ordering::Release);
        stream.close();

        let mut lc = self.shared.lock();
        if !lc.state.is_terminal() {
            lc.state = DeviceState::ShutDown;
            self.shared.changed.notify_all();
        }
        log::info!("Audio output {} {}", self.shared.name, lc.state);
    }
}

impl Drop for OutputDevice {
    fn drop(&mut self) {
        if self.stream.is_some() {
            self.close_stream();
        }
    }
}

impl fmt::Debug for OutputDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputDevice")
            .field("name", &self.name())
            .field("sink", &self.sink)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::backend::NullBackend;
    use std::sync::atomic::AtomicI16;

    fn constant(value: i16) -> Box<dyn PullCallback> {
        Box::new(move |l: &mut [i16], r: &mut [i16]| -> AudioResult<()> {
            l.fill(value);
            r.fill(-value);
            Ok(())
        })
    }

    #[test]
    fn open_reaches_ready_and_pulls() {
        let backend = NullBackend::new(["out"]).free_running();
        let dev = OutputDevice::open(&backend, "speakers", "out", constant(3)).unwrap();
        assert_eq!(dev.state(), DeviceState::Ready);
        let stats = dev.stats();
        while stats.pulls() < 3 {
            std::thread::yield_now();
        }
        dev.shutdown();
        assert!(stats.pulls() >= 3);
        assert_eq!(stats.underflows(), 0, "an unpaced sink never runs dry");
    }

    #[test]
    fn slow_callback_counts_underflows() {
        // 64 frames last about 1.5 ms, each pull takes 5 ms.
        let backend = NullBackend::new(["out"]).with_period(64);
        let slow = |l: &mut [i16], r: &mut [i16]| -> AudioResult<()> {
            std::thread::sleep(Duration::from_millis(5));
            l.fill(0);
            r.fill(0);
            Ok(())
        };
        let dev = OutputDevice::open(&backend, "speakers", "out", Box::new(slow)).unwrap();
        let stats = dev.stats();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while stats.underflows() == 0 {
            assert!(std::time::Instant::now() < deadline, "no underflow reported");
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(dev.state(), DeviceState::Ready, "underflows are not fatal");
        dev.shutdown();
    }

    #[test]
    fn unknown_sink_is_device_not_found() {
        let backend = NullBackend::new(["out"]);
        let err = OutputDevice::open(&backend, "speakers", "nope", Box::new(Silence)).unwrap_err();
        assert!(matches!(err, AudioError::DeviceNotFound(ref s) if s == "nope"), "got {err:?}");
    }

    #[test]
    fn failed_connection_is_connection_error() {
        let backend = NullBackend::new(["out"]).with_broken_sink("out");
        let err = OutputDevice::open(&backend, "speakers", "out", Box::new(Silence)).unwrap_err();
        assert!(matches!(err, AudioError::ConnectionError(_)), "got {err:?}");
    }

    #[test]
    fn shutdown_stops_pulls() {
        let backend = NullBackend::new(["out"]).free_running();
        let dev = OutputDevice::open(&backend, "speakers", "out", constant(1)).unwrap();
        let stats = dev.stats();
        dev.shutdown();
        let after = stats.pulls();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(stats.pulls(), after, "no pulls after shutdown");
    }

    #[test]
    fn callback_error_moves_device_to_error() {
        let backend = NullBackend::new(["out"]).free_running();
        let calls = Arc::new(AtomicI16::new(0));
        let calls_cb = Arc::clone(&calls);
        let failing = move |_: &mut [i16], _: &mut [i16]| -> AudioResult<()> {
            calls_cb.fetch_add(1, Ordering::SeqCst);
            Err(AudioError::BufferOverrun {
                requested: 9,
                capacity: 1,
            })
        };
        let failing: Box<dyn PullCallback> = Box::new(failing);
        let dev = OutputDevice::open(&backend, "speakers", "out", failing).unwrap();
        let settled = dev.shared.wait_until(|lc| lc.state.is_terminal()).state;
        assert_eq!(settled, DeviceState::Error);
        assert!(dev.last_error().unwrap().contains("exceeds"));
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(calls.load(Ordering::SeqCst), 1, "callback never runs after ERROR");
        dev.shutdown();
    }

    #[test]
    fn render_after_shutdown_request_is_silent() {
        let shared = Arc::new(DeviceShared::new("test"));
        let signal = LifecycleSignal {
            shared: Arc::clone(&shared),
        };
        let mut handler = StreamHandler::new(constant(9), signal.clone()).unwrap();
        signal.ready();

        let mut out = [1i16; 8];
        assert_eq!(handler.render(&mut out), StreamControl::Continue);
        assert_eq!(out, [9, -9, 9, -9, 9, -9, 9, -9], "left/right interleaved");

        shared.shutdown_requested.store(true, Ordering::Release);
        let mut out = [1i16; 8];
        assert_eq!(handler.render(&mut out), StreamControl::Stop);
        assert_eq!(out, [0; 8]);
        assert!(shared.lock().draining);
        assert_eq!(shared.stats.pulls(), 1, "the shutdown render does not pull");
    }
}
