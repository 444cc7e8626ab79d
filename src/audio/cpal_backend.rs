//! CPAL audio backend
//!
//! Opens i16 stereo 44.1 kHz output streams on the system host (ALSA,
//! PulseAudio, CoreAudio, WASAPI). The CPAL callback thread is the device
//! thread: it drives [`StreamHandler::render`] directly.

use std::{thread, time::Duration};

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    BufferSize, SampleRate, Stream, StreamConfig,
};

use super::{
    backend::{AudioBackend, SinkStream, StreamSpec},
    output::{LifecycleSignal, StreamControl, StreamHandler},
    AudioError, AudioResult,
};

pub struct CpalBackend {
    host: cpal::Host,
}

impl CpalBackend {
    pub fn new() -> Self {
        let host = cpal::default_host();
        log::info!("Audio host: {}", host.id().name());
        Self { host }
    }

    fn find_device(&self, sink: &str) -> AudioResult<cpal::Device> {
        self.host
            .output_devices()
            .map_err(|e| AudioError::ConnectionError(e.to_string()))?
            .find(|d| d.name().map(|n| n == sink).unwrap_or(false))
            .ok_or_else(|| AudioError::DeviceNotFound(sink.to_string()))
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn output_devices(&self) -> AudioResult<Vec<String>> {
        let devices = self
            .host
            .output_devices()
            .map_err(|e| AudioError::ConnectionError(e.to_string()))?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }

    fn open_stream(
        &self,
        sink: &str,
        spec: &StreamSpec,
        handler: StreamHandler,
    ) -> AudioResult<Box<dyn SinkStream>> {
        let device = self.find_device(sink)?;
        let config = StreamConfig {
            channels: spec.channels,
            sample_rate: SampleRate(spec.sample_rate),
            buffer_size: BufferSize::Default,
        };

        let signal = handler.signal();
        let stream = build_output_stream(&device, &config, handler)?;
        log::debug!(
            "Built {} stream on {sink}: {} Hz, {} ch",
            signal.device_name(),
            spec.sample_rate,
            spec.channels
        );
        Ok(Box::new(CpalStream { stream, signal }))
    }
}

fn build_output_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut handler: StreamHandler,
) -> AudioResult<Stream> {
    let signal = handler.signal();
    let err_signal = handler.signal();
    let frame_rate = config.sample_rate.0 as f64;
    let channels = config.channels.max(1) as usize;
    let mut stopped = false;
    // Instant at which the previously delivered buffer finishes playing.
    let mut played_until: Option<cpal::StreamInstant> = None;

    device
        .build_output_stream(
            config,
            move |data: &mut [i16], info: &cpal::OutputCallbackInfo| {
                let ts = info.timestamp();
                if let Some(latency) = ts.playback.duration_since(&ts.callback) {
                    signal.set_latency(latency);
                }
                let late = played_until
                    .and_then(|end| ts.callback.duration_since(&end))
                    .is_some_and(|d| !d.is_zero());
                if late {
                    signal.underflow();
                }
                let frames = data.len() / channels;
                let length = Duration::from_secs_f64(frames as f64 / frame_rate);
                played_until = ts.playback.add(length);
                if stopped {
                    data.fill(0);
                    return;
                }
                stopped = handler.render(data) == StreamControl::Stop;
            },
            move |err| err_signal.fail(format!("CPAL stream error: {err}")),
            None,
        )
        .map_err(|e| match e {
            cpal::BuildStreamError::DeviceNotAvailable => {
                AudioError::DeviceNotFound(device.name().unwrap_or_default())
            }
            other => AudioError::ConnectionError(other.to_string()),
        })
}

struct CpalStream {
    stream: Stream,
    signal: LifecycleSignal,
}

impl SinkStream for CpalStream {
    fn start(&mut self) -> AudioResult<()> {
        self.stream
            .play()
            .map_err(|e| AudioError::ConnectionError(format!("stream play error: {e}")))?;
        self.signal.ready();
        Ok(())
    }

    fn drain(&mut self) {
        // Audio already handed over plays out within one latency period.
        let latency = self.signal.latency();
        if !latency.is_zero() {
            thread::sleep(latency);
        }
    }

    fn close(self: Box<Self>) {
        if let Err(e) = self.stream.pause() {
            log::warn!("Pausing {} stream: {e}", self.signal.device_name());
        }
    }
}
