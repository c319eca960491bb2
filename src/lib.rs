//! # voiceclone-rs
//!
//! Offline voice cloning orchestration: capture a speaker's vocal identity
//! from a short recording, then synthesize new utterances in that voice,
//! optionally with emotion, laughter and breathing cues.
//!
//! The neural synthesis itself is an external [`GenerationEngine`]. This crate
//! owns everything around it:
//!
//! - **Speaker identities**: embedding artifacts persisted by id ([`identity`])
//! - **Prompt annotation**: emotion, paralinguistic and language markers ([`annotate`])
//! - **Engine lifecycle**: one lazy, thread-safe initialization per process ([`lifecycle`])
//! - **Orchestration**: the [`VoiceCloner`] façade tying them together
//!
//! ## Quick Start
//!
//! ```no_run
//! use voiceclone_rs::engines::command::CommandEngineLoader;
//! use voiceclone_rs::{ClonerConfig, GenerationRequestBuilder, VoiceCloner};
//!
//! let cloner = VoiceCloner::new(
//!     ClonerConfig::default(),
//!     CommandEngineLoader::new("bark-generator"),
//! );
//! cloner.extract_identity("ref.wav".as_ref(), Some("speakerA"))?;
//!
//! let request = GenerationRequestBuilder::default()
//!     .text("Hello world")
//!     .speaker_id("speakerA")
//!     .build()?;
//! let path = cloner.generate(&request)?;
//! println!("wrote {}", path.display());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod annotate;
pub mod audio;
pub mod cloner;
pub mod config;
pub mod engines;
pub mod error;
pub mod identity;
pub mod lifecycle;

#[cfg(test)]
pub(crate) mod test_support;

use std::path::Path;

pub use annotate::{annotate, AnnotatedPrompt, Effects, Emotion};
pub use audio::{AudioLoader, DefaultAudioLoader, Waveform};
pub use cloner::{GenerationRequest, GenerationRequestBuilder, GenerationStage, VoiceCloner};
pub use config::{ClonerConfig, ClonerConfigBuilder};
pub use error::{EngineError, EngineResult, Result, VoiceCloneError};
pub use identity::{EmbeddingStore, IdentityStore, VoiceIdentity};
pub use lifecycle::{EngineHandle, EngineManager};

/// The result of a synthesis operation.
///
/// Contains raw f32 audio samples and the sample rate of the output audio.
#[derive(Debug, Clone)]
pub struct SynthesisResult {
    /// Raw audio samples as f32 values
    pub samples: Vec<f32>,
    /// The engine's native sample rate
    pub sample_rate: u32,
}

impl SynthesisResult {
    /// Write the audio to a 32-bit float WAV file, creating parent
    /// directories as needed.
    pub fn write_wav(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                VoiceCloneError::storage(format!("creating {}", parent.display()), e)
            })?;
        }

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let wav_err = |e: hound::Error| {
            let io = match e {
                hound::Error::IoError(io) => io,
                other => std::io::Error::new(std::io::ErrorKind::Other, other.to_string()),
            };
            VoiceCloneError::storage(format!("writing {}", path.display()), io)
        };

        let mut writer = hound::WavWriter::create(path, spec).map_err(wav_err)?;
        for &sample in &self.samples {
            writer.write_sample(sample).map_err(wav_err)?;
        }
        writer.finalize().map_err(wav_err)?;
        Ok(())
    }

    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Sampling temperatures for the two generation stages.
///
/// Callers set a single temperature; [`GenerationParams::from_temperature`]
/// applies it to both stages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    /// Semantic (text → tokens) stage.
    pub text_temperature: f32,
    /// Acoustic (tokens → waveform) stage.
    pub waveform_temperature: f32,
}

impl GenerationParams {
    pub fn from_temperature(temperature: f32) -> Self {
        Self {
            text_temperature: temperature,
            waveform_temperature: temperature,
        }
    }
}

/// An initialized Generation Engine.
///
/// Implementations must be shareable across threads: one instance serves
/// every request in the process.
pub trait GenerationEngine: Send + Sync {
    /// Native output sample rate.
    fn sample_rate(&self) -> u32;

    /// Derive the voice prompt stored for a reference recording.
    ///
    /// Defaults to the normalized reference waveform itself.
    fn encode_voice_prompt(&self, reference: &Waveform) -> EngineResult<Vec<f32>> {
        Ok(reference.samples.clone())
    }

    /// Synthesize `text` in the voice described by `voice_prompt`.
    fn synthesize(
        &self,
        text: &str,
        voice_prompt: &[f32],
        params: &GenerationParams,
    ) -> EngineResult<Vec<f32>>;
}

/// Performs the expensive one-time engine initialization (weights, devices).
pub trait EngineLoader: Send + Sync {
    fn load(&self, model_dir: &Path) -> EngineResult<Box<dyn GenerationEngine>>;
}

impl<F> EngineLoader for F
where
    F: Fn(&Path) -> EngineResult<Box<dyn GenerationEngine>> + Send + Sync,
{
    fn load(&self, model_dir: &Path) -> EngineResult<Box<dyn GenerationEngine>> {
        self(model_dir)
    }
}
