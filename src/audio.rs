//! Reference audio loading.
//!
//! The core only needs a mono float waveform and its sample rate from a
//! reference recording. [`DefaultAudioLoader`] reads WAV through `hound` and,
//! with the `compressed-audio` feature, mp3/ogg/flac through `symphonia`.

use std::path::Path;

use crate::error::{Result, VoiceCloneError};

/// A mono waveform with amplitude in `[-1.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Decodes a reference recording into a [`Waveform`].
pub trait AudioLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Waveform>;
}

/// Loader used by the orchestrator unless another one is supplied.
#[derive(Debug, Clone, Default)]
pub struct DefaultAudioLoader {
    /// Resample to this rate after decoding. `None` keeps the native rate.
    pub target_sample_rate: Option<u32>,
    /// Keep at most this many seconds of audio.
    pub max_seconds: Option<f32>,
}

impl DefaultAudioLoader {
    pub fn new(target_sample_rate: Option<u32>, max_seconds: Option<f32>) -> Self {
        Self {
            target_sample_rate,
            max_seconds,
        }
    }
}

impl AudioLoader for DefaultAudioLoader {
    fn load(&self, path: &Path) -> Result<Waveform> {
        if !path.exists() {
            return Err(VoiceCloneError::SourceAudioNotFound(path.to_path_buf()));
        }

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        let (mut samples, mut sample_rate) = match ext.as_deref() {
            Some("wav") | Some("wave") | None => decode_wav(path)?,
            Some(_) => decode_compressed(path)?,
        };

        if samples.is_empty() {
            return Err(VoiceCloneError::decode(path, "decoded audio is empty"));
        }

        if let Some(max) = self.max_seconds {
            let max_samples = (max * sample_rate as f32) as usize;
            if samples.len() > max_samples {
                log::debug!(
                    "Truncating reference {} from {} to {} samples",
                    path.display(),
                    samples.len(),
                    max_samples
                );
                samples.truncate(max_samples);
            }
        }

        normalize_peak(&mut samples);

        if let Some(target) = self.target_sample_rate {
            if target != sample_rate {
                samples = resample_linear_mono(&samples, sample_rate, target);
                sample_rate = target;
            }
        }

        log::debug!(
            "Loaded {} ({} samples @ {}Hz)",
            path.display(),
            samples.len(),
            sample_rate
        );
        Ok(Waveform {
            samples,
            sample_rate,
        })
    }
}

fn decode_wav(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::open(path).map_err(|e| VoiceCloneError::decode(path, e))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| VoiceCloneError::decode(path, e))?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1u64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| VoiceCloneError::decode(path, e))?
        }
    };

    Ok((downmix(&interleaved, channels), spec.sample_rate))
}

#[cfg(feature = "compressed-audio")]
fn decode_compressed(path: &Path) -> Result<(Vec<f32>, u32)> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::DecoderOptions;
    use symphonia::core::errors::Error as SymphError;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let file = std::fs::File::open(path)
        .map_err(|e| VoiceCloneError::storage(format!("opening {}", path.display()), e))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| VoiceCloneError::decode(path, format!("failed to probe audio: {e}")))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| VoiceCloneError::decode(path, "no default audio track"))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| VoiceCloneError::decode(path, "unknown sample rate"))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| VoiceCloneError::decode(path, format!("failed to create decoder: {e}")))?;

    let mut out = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(VoiceCloneError::decode(path, e)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphError::DecodeError(_)) => continue,
            Err(e) => return Err(VoiceCloneError::decode(path, e)),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count();
        let frames = decoded.frames() as u64;
        let required = (frames as usize).saturating_mul(channels);

        let needs_new = sample_buf
            .as_ref()
            .map_or(true, |b| b.capacity() < required);
        if needs_new {
            sample_buf = Some(SampleBuffer::<f32>::new(frames, spec));
        }
        if let Some(buf) = sample_buf.as_mut() {
            buf.copy_interleaved_ref(decoded);
            out.extend(downmix(buf.samples(), channels));
        }
    }

    Ok((out, sample_rate))
}

#[cfg(not(feature = "compressed-audio"))]
fn decode_compressed(path: &Path) -> Result<(Vec<f32>, u32)> {
    Err(VoiceCloneError::decode(
        path,
        "only WAV is supported without the `compressed-audio` feature",
    ))
}

fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Scale so the loudest sample sits at ±1.0. Silence is left untouched.
fn normalize_peak(samples: &mut [f32]) {
    let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    if peak > f32::EPSILON && peak.is_finite() {
        for s in samples.iter_mut() {
            *s /= peak;
        }
    }
}

fn resample_linear_mono(input: &[f32], from_sr: u32, to_sr: u32) -> Vec<f32> {
    if input.is_empty() || from_sr == to_sr || from_sr == 0 {
        return input.to_vec();
    }

    let ratio = to_sr as f64 / from_sr as f64;
    let out_len = ((input.len() as f64) * ratio).round() as usize;
    let last = input.len() - 1;

    (0..out_len)
        .map(|i| {
            let src_pos = i as f64 / ratio;
            let i0 = (src_pos.floor() as usize).min(last);
            let i1 = (i0 + 1).min(last);
            let t = (src_pos - i0 as f64) as f32;
            input[i0] * (1.0 - t) + input[i1] * t
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::write_wav_fixture;

    #[test]
    fn missing_file_is_source_audio_not_found() {
        let loader = DefaultAudioLoader::default();
        let err = loader.load(Path::new("/definitely/not/here.wav")).unwrap_err();
        assert!(matches!(err, VoiceCloneError::SourceAudioNotFound(_)));
    }

    #[test]
    fn int_wav_is_normalized_to_unit_peak() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ref.wav");
        write_wav_fixture(&path, 16_000, &[0.0, 0.25, -0.5, 0.25]);

        let wave = DefaultAudioLoader::default().load(&path).unwrap();
        assert_eq!(wave.sample_rate, 16_000);
        assert_eq!(wave.samples.len(), 4);
        let peak = wave.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!((peak - 1.0).abs() < 1e-3, "peak was {peak}");
    }

    #[test]
    fn stereo_is_downmixed() {
        assert_eq!(downmix(&[1.0, 0.0, 0.5, 0.5], 2), vec![0.5, 0.5]);
    }

    #[test]
    fn resampling_changes_length_by_rate_ratio() {
        let input = vec![0.0f32; 1600];
        assert_eq!(resample_linear_mono(&input, 16_000, 24_000).len(), 2400);
    }

    #[test]
    fn loader_resamples_and_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.wav");
        let samples: Vec<f32> = (0..8_000 * 3).map(|i| ((i % 50) as f32 / 50.0) - 0.5).collect();
        write_wav_fixture(&path, 8_000, &samples);

        let loader = DefaultAudioLoader::new(Some(16_000), Some(2.0));
        let wave = loader.load(&path).unwrap();
        assert_eq!(wave.sample_rate, 16_000);
        assert_eq!(wave.samples.len(), 32_000);
        assert!((wave.duration_secs() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn sub_second_limit_is_honored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.wav");
        write_wav_fixture(&path, 8_000, &vec![0.25; 8_000 * 2]);

        let wave = DefaultAudioLoader::new(None, Some(0.5)).load(&path).unwrap();
        assert_eq!(wave.sample_rate, 8_000);
        assert_eq!(wave.samples.len(), 4_000);
    }
}
