use std::path::Path;

use symphonia::core::{
    audio::SampleBuffer,
    codecs::{DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};

use super::{AudioError, AudioResult, Frame, SAMPLE_RATE};

/// Turns a media file into interleaved stereo frames, whole file at once.
pub trait Decoder: Send + Sync {
    fn decode(&self, path: &Path) -> AudioResult<Vec<Frame>>;
}

/// Symphonia-backed decoder (MP3, plus whatever else the probe recognises).
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaDecoder;

impl Decoder for SymphoniaDecoder {
    fn decode(&self, path: &Path) -> AudioResult<Vec<Frame>> {
        let frames = decode_file(path)?;
        if frames.is_empty() {
            return Err(AudioError::load_failed(path, "no audio frames decoded"));
        }
        Ok(frames)
    }
}

fn decode_file(path: &Path) -> AudioResult<Vec<Frame>> {
    let file = std::fs::File::open(path).map_err(|e| AudioError::load_failed(path, e))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }
    let mut probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| AudioError::load_failed(path, format!("probe failed: {e}")))?;

    let track = probed
        .format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AudioError::load_failed(path, "no audio track found"))?
        .clone();

    let track_id = track.id;
    if let Some(sr) = track.codec_params.sample_rate {
        if sr != SAMPLE_RATE {
            log::warn!(
                "{} is {sr} Hz, output runs at {SAMPLE_RATE} Hz; playing without resampling",
                path.display()
            );
        }
    }

    let mut frames: Vec<Frame> = Vec::new();
    if let Some(n) = track.codec_params.n_frames {
        frames
            .try_reserve_exact(n as usize)
            .map_err(|_| AudioError::OutOfMemory)?;
    }

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AudioError::load_failed(path, format!("codec init: {e}")))?;

    let mut sample_buf: Option<SampleBuffer<i16>> = None;

    loop {
        let packet = match probed.format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => {
                log::warn!("Format read on {}: {e}", path.display());
                break;
            }
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Decode error (skip): {e}");
                continue;
            }
            Err(e) => {
                return Err(AudioError::load_failed(path, format!("fatal decode: {e}")));
            }
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count();
        let needed = decoded.capacity() * channels;
        if sample_buf.as_ref().map_or(true, |b| b.capacity() < needed) {
            sample_buf = Some(SampleBuffer::<i16>::new(decoded.capacity() as u64, spec));
        }
        if let Some(buf) = sample_buf.as_mut() {
            buf.copy_interleaved_ref(decoded);
            append_interleaved(&mut frames, buf.samples(), channels)?;
        }
    }

    Ok(frames)
}

/// Fold interleaved samples of any channel count into stereo frames.
/// Mono is duplicated to both sides; channels past the second are dropped.
fn append_interleaved(out: &mut Vec<Frame>, samples: &[i16], n_channels: usize) -> AudioResult<()> {
    let n_channels = n_channels.max(1);
    out.try_reserve(samples.len() / n_channels)
        .map_err(|_| AudioError::OutOfMemory)?;
    for chunk in samples.chunks_exact(n_channels) {
        let left = chunk[0];
        let right = if n_channels > 1 { chunk[1] } else { chunk[0] };
        out.push(Frame::new(left, right));
    }
    Ok(())
}
