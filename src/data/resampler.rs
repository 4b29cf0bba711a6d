// ============================================================
// Layer 4 — Audio Resampler
// ============================================================
// Loads one audio file and converts it to a mono FeatureVector
// at the target sample rate the pretrained model expects.
//
//   file ──decode──► interleaved f32, source rate, channels
//        ──downmix─► mono f32 (mean over channels)
//        ──resample► mono f32 at target rate
//
// Decoding:
//   .wav           → hound
//   anything else  → symphonia probe (FLAC, MP3, OGG, ...)
//
// Resampling uses rubato's windowed-sinc interpolator over the
// whole file as a single chunk (zero-padded up to MIN_CHUNK for
// very short files), then flushes the filter tail and trims the
// filter delay, so the output length is exactly
// ceil(len * target / source). The filter is deterministic, so
// running twice on the same file yields identical output.
//
// A file that decodes to zero frames is rejected: an empty
// FeatureVector would collate into a batch of pure padding.
//
// Failure mapping:
//   missing / unreadable file          → PipelineError::Io
//   container or codec not decodable   → PipelineError::UnsupportedFormat
//   no audio frames in the file        → PipelineError::UnsupportedFormat
//   filter construction / processing   → PipelineError::Resample
//
// Reference: hound, symphonia and rubato documentation

use std::{fs::File, path::Path};

use rubato::{
    Resampler as RubatoResampler, SincFixedIn, SincInterpolationParameters,
    SincInterpolationType, WindowFunction,
};
use symphonia::core::{
    audio::SampleBuffer,
    codecs::{DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};

use crate::domain::error::{PipelineError, PipelineResult};
use crate::domain::sample::FeatureVector;
use crate::domain::traits::AudioSource;

/// Smallest input block handed to the sinc filter
const MIN_CHUNK: usize = 1024;

/// Tail flushes allowed before a short output counts as a failure
const MAX_FLUSHES: usize = 16;

/// Audio exactly as stored in the file.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub interleaved: Vec<f32>,
    pub sample_rate: u32,
    pub channels:    usize,
}

impl DecodedAudio {
    /// Average interleaved channels into one
    pub fn into_mono(self) -> Vec<f32> {
        if self.channels <= 1 {
            return self.interleaved;
        }
        self.interleaved
            .chunks(self.channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    }
}

/// File-backed AudioSource. Stateless; safe to share across threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct Resampler;

impl Resampler {
    pub fn new() -> Self {
        Self
    }

    /// Decode a file, picking the decoder from the extension
    pub fn decode(path: &Path) -> PipelineResult<DecodedAudio> {
        let is_wav = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("wav"));

        if is_wav {
            decode_wav(path)
        } else {
            decode_with_symphonia(path)
        }
    }
}

impl AudioSource for Resampler {
    fn load(&self, path: &Path, target_rate: u32) -> PipelineResult<FeatureVector> {
        let decoded     = Self::decode(path)?;
        let source_rate = decoded.sample_rate;
        let mono        = decoded.into_mono();
        if mono.is_empty() {
            return Err(unsupported(path, "file contains no audio frames"));
        }

        tracing::debug!(
            "Decoded '{}': {} samples at {} Hz",
            path.display(),
            mono.len(),
            source_rate
        );

        resample(&mono, source_rate, target_rate).map_err(|reason| PipelineError::Resample {
            path: path.to_path_buf(),
            reason,
        })
    }
}

/// Convert mono samples from `from_rate` to `to_rate`.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, String> {
    if from_rate == 0 || to_rate == 0 {
        return Err(format!("invalid sample rates {from_rate} -> {to_rate}"));
    }
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let ratio    = to_rate as f64 / from_rate as f64;
    let expected = (samples.len() as u64 * to_rate as u64).div_ceil(from_rate as u64) as usize;

    let params = SincInterpolationParameters {
        sinc_len:            256,
        f_cutoff:            0.95,
        interpolation:       SincInterpolationType::Linear,
        oversampling_factor: 256,
        window:              WindowFunction::BlackmanHarris2,
    };

    let chunk = samples.len().max(MIN_CHUNK);
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, chunk, 1)
        .map_err(|e| e.to_string())?;
    let delay = resampler.output_delay();

    // process_partial zero-pads an input shorter than the chunk
    let input: &[&[f32]] = &[samples];
    let mut out = resampler
        .process_partial(Some(input), None)
        .map_err(|e| e.to_string())?
        .into_iter()
        .next()
        .unwrap_or_default();

    // Flush the filter tail with silence until the delayed output is complete
    let mut flushes = 0;
    while out.len() < expected + delay {
        if flushes == MAX_FLUSHES {
            return Err(format!(
                "filter produced {} of {} frames",
                out.len().saturating_sub(delay),
                expected
            ));
        }
        let tail = resampler
            .process_partial(None::<&[&[f32]]>, None)
            .map_err(|e| e.to_string())?
            .into_iter()
            .next()
            .unwrap_or_default();
        out.extend(tail);
        flushes += 1;
    }

    out.drain(..delay);
    out.truncate(expected);
    Ok(out)
}

fn wav_error(path: &Path, err: hound::Error) -> PipelineError {
    match err {
        hound::Error::IoError(source) => PipelineError::Io {
            path: path.to_path_buf(),
            source,
        },
        other => PipelineError::UnsupportedFormat {
            path:   path.to_path_buf(),
            reason: other.to_string(),
        },
    }
}

fn decode_wav(path: &Path) -> PipelineResult<DecodedAudio> {
    let reader = hound::WavReader::open(path).map_err(|e| wav_error(path, e))?;
    let spec   = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>(),
        hound::SampleFormat::Int => {
            let max_val = (1u64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<Vec<_>, _>>()
        }
    }
    .map_err(|e| wav_error(path, e))?;

    Ok(DecodedAudio {
        interleaved,
        sample_rate: spec.sample_rate,
        channels:    spec.channels as usize,
    })
}

// The file was opened before symphonia sees it, so running out of
// bytes means the content is unrecognised or truncated.
fn symphonia_error(path: &Path, err: SymphoniaError) -> PipelineError {
    match err {
        SymphoniaError::IoError(source) if source.kind() == std::io::ErrorKind::UnexpectedEof => {
            PipelineError::UnsupportedFormat {
                path:   path.to_path_buf(),
                reason: format!("unexpected end of stream: {source}"),
            }
        }
        SymphoniaError::IoError(source) => PipelineError::Io {
            path: path.to_path_buf(),
            source,
        },
        other => PipelineError::UnsupportedFormat {
            path:   path.to_path_buf(),
            reason: other.to_string(),
        },
    }
}

fn unsupported(path: &Path, reason: &str) -> PipelineError {
    PipelineError::UnsupportedFormat {
        path:   path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn decode_with_symphonia(path: &Path) -> PipelineResult<DecodedAudio> {
    let file = File::open(path).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let stream = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, stream, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| symphonia_error(path, e))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| unsupported(path, "no decodable audio track"))?;
    let track_id = track.id;
    let params   = track.codec_params.clone();

    let sample_rate = params
        .sample_rate
        .ok_or_else(|| unsupported(path, "sample rate missing from header"))?;
    let mut channels = params.channels.map(|c| c.count()).unwrap_or(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| symphonia_error(path, e))?;

    let mut interleaved = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(symphonia_error(path, e)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder
            .decode(&packet)
            .map_err(|e| symphonia_error(path, e))?;
        let spec = *decoded.spec();
        channels = spec.channels.count();

        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        interleaved.extend_from_slice(buf.samples());
    }

    Ok(DecodedAudio {
        interleaved,
        sample_rate,
        channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_sine(dir: &tempfile::TempDir, name: &str, rate: u32, channels: u16, frames: usize) -> PathBuf {
        let path = dir.path().join(name);
        let spec = hound::WavSpec {
            channels,
            sample_rate:     rate,
            bits_per_sample: 16,
            sample_format:   hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..frames {
            let v = ((i as f32 * 0.05).sin() * 8000.0) as i16;
            for _ in 0..channels {
                writer.write_sample(v).unwrap();
            }
        }
        writer.finalize().unwrap();
        path
    }

    #[test]
    fn test_same_rate_passes_through() {
        let dir  = tempfile::tempdir().unwrap();
        let path = write_sine(&dir, "a.wav", 16_000, 1, 1600);
        let out  = Resampler.load(&path, 16_000).unwrap();
        assert_eq!(out.len(), 1600);
        assert!(out.iter().all(|v| v.abs() <= 1.0));
    }

    #[test]
    fn test_downsample_length() {
        let dir  = tempfile::tempdir().unwrap();
        let path = write_sine(&dir, "b.wav", 44_100, 1, 44_100);
        let out  = Resampler.load(&path, 16_000).unwrap();
        assert_eq!(out.len(), 16_000);
    }

    #[test]
    fn test_resampling_is_idempotent() {
        let dir   = tempfile::tempdir().unwrap();
        let path  = write_sine(&dir, "c.wav", 22_050, 1, 5_000);
        let first = Resampler.load(&path, 16_000).unwrap();
        let again = Resampler.load(&path, 16_000).unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn test_stereo_is_downmixed() {
        let dir  = tempfile::tempdir().unwrap();
        let path = write_sine(&dir, "d.wav", 16_000, 2, 800);
        let out  = Resampler.load(&path, 16_000).unwrap();
        assert_eq!(out.len(), 800);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = Resampler.load(Path::new("/nonexistent/x.wav"), 16_000).unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));

        let err = Resampler.load(Path::new("/nonexistent/x.flac"), 16_000).unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
    }

    #[test]
    fn test_garbage_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["bad.wav", "bad.xyz"] {
            let path = dir.path().join(name);
            std::fs::write(&path, b"this is not audio at all, just text bytes").unwrap();
            let err = Resampler.load(&path, 16_000).unwrap_err();
            assert!(
                matches!(err, PipelineError::UnsupportedFormat { .. }),
                "{name}: {err}"
            );
        }
    }

    #[test]
    fn test_short_inputs_keep_their_length() {
        for (n, from, to, expected) in [
            (1, 44_100, 16_000, 1),
            (50, 44_100, 16_000, 19),
            (60, 44_100, 16_000, 22),
            (60, 8_000, 16_000, 120),
        ] {
            let x: Vec<f32> = (0..n).map(|i| (i as f32 * 0.3).sin()).collect();
            let out = resample(&x, from, to).unwrap();
            assert_eq!(out.len(), expected, "{n} samples {from} -> {to}");
        }
    }

    #[test]
    fn test_empty_wav_is_unsupported() {
        let dir  = tempfile::tempdir().unwrap();
        let path = write_sine(&dir, "empty.wav", 16_000, 1, 0);
        let err  = Resampler.load(&path, 16_000).unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedFormat { .. }), "{err}");
    }

    #[test]
    fn test_symphonia_path_matches_hound() {
        let dir  = tempfile::tempdir().unwrap();
        let wav  = write_sine(&dir, "e.wav", 22_050, 2, 3_000);
        let riff = dir.path().join("e.riff");
        std::fs::copy(&wav, &riff).unwrap();

        let by_hound     = Resampler::decode(&wav).unwrap();
        let by_symphonia = Resampler::decode(&riff).unwrap();
        assert_eq!(by_symphonia.channels, 2);
        assert_eq!(by_symphonia.sample_rate, 22_050);
        assert_eq!(by_symphonia.interleaved.len(), 6_000);
        assert_eq!(by_symphonia, by_hound);

        let a = Resampler.load(&wav, 16_000).unwrap();
        let b = Resampler.load(&riff, 16_000).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_into_mono_averages() {
        let audio = DecodedAudio {
            interleaved: vec![1.0, 0.0, 0.5, 0.5],
            sample_rate: 16_000,
            channels:    2,
        };
        assert_eq!(audio.into_mono(), vec![0.5, 0.5]);
    }
}
