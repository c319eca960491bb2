//! Configuration surfaced to the orchestration core.
//!
//! A [`ClonerConfig`] can be assembled in code through [`ClonerConfigBuilder`]
//! or read from a JSON file where every field is optional:
//!
//! ```json
//! {
//!   "model_dir": "/var/lib/voiceclone",
//!   "default_language": "fr",
//!   "default_temperature": 0.6
//! }
//! ```

use std::path::{Path, PathBuf};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VoiceCloneError};

/// Subdirectory of the model root holding one artifact per voice identity.
pub const SPEAKER_EMBEDDINGS_DIR: &str = "speaker_embeddings";

/// Language the Generation Engine speaks without a language marker.
pub const NATIVE_LANGUAGE: &str = "en";

pub const DEFAULT_TEMPERATURE: f32 = 0.7;

#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(setter(into), default, build_fn(validate = "Self::validate"))]
#[serde(default)]
pub struct ClonerConfig {
    /// Root for model assets, speaker embeddings and default outputs.
    pub model_dir: PathBuf,
    /// Language used when a request does not name one.
    pub default_language: String,
    /// Temperature used when a request does not set one. Range: 0.0–1.0.
    pub default_temperature: f32,
    /// Resample reference audio to this rate before encoding. `None` keeps
    /// the recording's native rate.
    pub target_sample_rate: Option<u32>,
    /// Reference recordings longer than this are truncated.
    pub max_reference_seconds: f32,
    /// Seed for paralinguistic marker placement. `None` seeds from entropy,
    /// which makes annotation non-deterministic.
    pub annotation_seed: Option<u64>,
}

impl Default for ClonerConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            default_language: NATIVE_LANGUAGE.to_string(),
            default_temperature: DEFAULT_TEMPERATURE,
            target_sample_rate: None,
            max_reference_seconds: 30.0,
            annotation_seed: None,
        }
    }
}

impl ClonerConfigBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        check_values(
            self.default_language.as_deref(),
            self.default_temperature,
            self.max_reference_seconds,
        )
    }
}

impl ClonerConfig {
    /// Load a configuration from a JSON file. Missing fields take their
    /// default values.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            VoiceCloneError::storage(format!("reading config {}", path.display()), e)
        })?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| VoiceCloneError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        check_values(
            Some(&self.default_language),
            Some(self.default_temperature),
            Some(self.max_reference_seconds),
        )
        .map_err(VoiceCloneError::Config)
    }

    /// Directory holding the speaker embedding artifacts.
    pub fn speaker_embeddings_dir(&self) -> PathBuf {
        self.model_dir.join(SPEAKER_EMBEDDINGS_DIR)
    }
}

fn check_values(
    language: Option<&str>,
    temperature: Option<f32>,
    max_reference_seconds: Option<f32>,
) -> std::result::Result<(), String> {
    if let Some(lang) = language {
        if lang.trim().is_empty() {
            return Err("default_language must not be empty".to_string());
        }
    }
    if let Some(t) = temperature {
        if !(0.0..=1.0).contains(&t) {
            return Err(format!("default_temperature {t} is outside 0.0–1.0"));
        }
    }
    if let Some(secs) = max_reference_seconds {
        if !(secs.is_finite() && secs > 0.0) {
            return Err(format!("max_reference_seconds must be positive, got {secs}"));
        }
    }
    Ok(())
}
