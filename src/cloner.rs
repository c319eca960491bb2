//! Generation Orchestrator.
//!
//! [`VoiceCloner`] resolves a voice identity, builds the annotated prompt,
//! drives the shared engine and writes the result to disk. It is cheap to
//! clone and safe to call from several threads at once; a GUI can run each
//! request on its own worker while a CLI calls it inline.
//!
//! A request moves through [`GenerationStage`]s in order. Validation failures
//! are reported before anything touches the disk or the engine. Later
//! failures are logged with the stage they happened in and returned as-is;
//! nothing is retried.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use derive_builder::Builder;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::annotate::{annotate, Effects};
use crate::audio::{AudioLoader, DefaultAudioLoader};
use crate::config::ClonerConfig;
use crate::error::{Result, VoiceCloneError};
use crate::identity::{self, EmbeddingStore, FsEmbeddingStore, IdentityStore, VoiceIdentity};
use crate::lifecycle::{EngineHandle, EngineManager};
use crate::{EngineLoader, GenerationParams};

/// One synthesis request.
///
/// At least one of `speaker_id` and `reference_audio` must be set. With a
/// reference recording, a fresh identity is extracted first, stored under
/// `speaker_id` when given or under a generated `speaker_xxxxxxxx` id.
#[derive(Debug, Clone, PartialEq, Builder)]
pub struct GenerationRequest {
    #[builder(setter(into))]
    pub text: String,
    #[builder(default, setter(into, strip_option))]
    pub speaker_id: Option<String>,
    #[builder(default, setter(into, strip_option))]
    pub reference_audio: Option<PathBuf>,
    /// Falls back to the configured default language.
    #[builder(default, setter(into, strip_option))]
    pub language: Option<String>,
    /// Clamped to 0.0–1.0. Falls back to the configured default.
    #[builder(default, setter(strip_option))]
    pub temperature: Option<f32>,
    #[builder(default)]
    pub effects: Effects,
    /// Defaults to `<model_dir>/generated_{id}_{timestamp}.wav`.
    #[builder(default, setter(into, strip_option))]
    pub output_path: Option<PathBuf>,
}

impl GenerationRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            speaker_id: None,
            reference_audio: None,
            language: None,
            temperature: None,
            effects: Effects::default(),
            output_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationStage {
    Validating,
    ResolvingIdentity,
    EngineReady,
    Annotating,
    Synthesizing,
    Persisting,
}

impl fmt::Display for GenerationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GenerationStage::Validating => "validating the request",
            GenerationStage::ResolvingIdentity => "resolving the voice identity",
            GenerationStage::EngineReady => "initializing the engine",
            GenerationStage::Annotating => "annotating the text",
            GenerationStage::Synthesizing => "synthesizing",
            GenerationStage::Persisting => "writing the output",
        })
    }
}

enum VoiceSource<'a> {
    Speaker(&'a str),
    Reference {
        audio: &'a Path,
        speaker_id: Option<&'a str>,
    },
}

struct Validated<'a> {
    text: &'a str,
    voice: VoiceSource<'a>,
    language: &'a str,
    temperature: f32,
}

struct Inner {
    config: ClonerConfig,
    identities: IdentityStore,
    engine: EngineManager,
    rng: Mutex<StdRng>,
}

#[derive(Clone)]
pub struct VoiceCloner {
    inner: Arc<Inner>,
}

impl VoiceCloner {
    /// Cloner storing identities under `<model_dir>/speaker_embeddings` and
    /// reading reference audio with [`DefaultAudioLoader`].
    pub fn new(config: ClonerConfig, loader: impl EngineLoader + 'static) -> Self {
        let backend = Arc::new(FsEmbeddingStore::new(config.speaker_embeddings_dir()));
        let audio = Arc::new(DefaultAudioLoader::new(
            config.target_sample_rate,
            Some(config.max_reference_seconds),
        ));
        Self::with_components(config, loader, backend, audio)
    }

    /// Cloner with a caller-supplied identity backend and audio loader.
    pub fn with_components(
        config: ClonerConfig,
        loader: impl EngineLoader + 'static,
        backend: Arc<dyn EmbeddingStore>,
        audio: Arc<dyn AudioLoader>,
    ) -> Self {
        let rng = match config.annotation_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let engine = EngineManager::new(loader, config.model_dir.clone());
        Self {
            inner: Arc::new(Inner {
                identities: IdentityStore::new(backend, audio),
                engine,
                rng: Mutex::new(rng),
                config,
            }),
        }
    }

    /// Reseed the annotation RNG so laughter and breathing placement is
    /// reproducible. Clones of this cloner share the reseeded generator.
    pub fn with_seed(self, seed: u64) -> Self {
        *self.inner.rng.lock().unwrap_or_else(PoisonError::into_inner) =
            StdRng::seed_from_u64(seed);
        self
    }

    pub fn config(&self) -> &ClonerConfig {
        &self.inner.config
    }

    /// Load the engine now instead of on the first request.
    pub fn prepare(&self) -> Result<EngineHandle> {
        self.inner.engine.ensure_ready()
    }

    pub fn is_engine_ready(&self) -> bool {
        self.inner.engine.is_ready()
    }

    pub fn list_identities(&self) -> Result<Vec<String>> {
        self.inner.identities.list()
    }

    pub fn resolve(&self, id: &str) -> Result<Vec<f32>> {
        self.inner.identities.resolve(id)
    }

    /// Extract and store a voice identity from a reference recording.
    pub fn extract_identity(&self, source_audio: &Path, id: Option<&str>) -> Result<VoiceIdentity> {
        let result = self.extract_checked(source_audio, id);
        if let Err(e) = &result {
            log::error!(
                "Voice identity extraction from {} failed: {e}",
                source_audio.display()
            );
        }
        result
    }

    fn extract_checked(&self, source_audio: &Path, id: Option<&str>) -> Result<VoiceIdentity> {
        if let Some(id) = id {
            identity::validate_id(id)?;
        }
        if !source_audio.exists() {
            return Err(VoiceCloneError::SourceAudioNotFound(
                source_audio.to_path_buf(),
            ));
        }
        let handle = self.inner.engine.ensure_ready()?;
        self.inner
            .identities
            .extract_identity(handle.engine(), source_audio, id)
    }

    /// Run a request to completion and return the written file.
    pub fn generate(&self, request: &GenerationRequest) -> Result<PathBuf> {
        let mut stage = GenerationStage::Validating;
        let result = self.run(request, &mut stage);
        match &result {
            Ok(path) => log::info!("Generated audio written to {}", path.display()),
            Err(e) => log::error!("Generation failed while {stage}: {e}"),
        }
        result
    }

    fn run(&self, request: &GenerationRequest, stage: &mut GenerationStage) -> Result<PathBuf> {
        let req = self.validate(request)?;

        *stage = GenerationStage::ResolvingIdentity;
        let id = match req.voice {
            VoiceSource::Speaker(id) => id.to_string(),
            VoiceSource::Reference { audio, speaker_id } => {
                let handle = self.inner.engine.ensure_ready()?;
                self.inner
                    .identities
                    .extract_identity(handle.engine(), audio, speaker_id)?
                    .id
            }
        };
        let voice_prompt = self.inner.identities.resolve(&id)?;

        *stage = GenerationStage::EngineReady;
        let handle = self.inner.engine.ensure_ready()?;

        *stage = GenerationStage::Annotating;
        let prompt = {
            let mut rng = self.inner.rng.lock().unwrap_or_else(PoisonError::into_inner);
            annotate(req.text, req.language, &request.effects, &mut *rng)
        };

        *stage = GenerationStage::Synthesizing;
        log::info!("Generating speech for '{id}': {:?}", prompt.as_str());
        let params = GenerationParams::from_temperature(req.temperature);
        let audio = handle
            .synthesize(prompt.as_str(), &voice_prompt, &params)
            .map_err(|e| VoiceCloneError::SynthesisFailure(e.to_string()))?;

        *stage = GenerationStage::Persisting;
        let path = match &request.output_path {
            Some(path) => path.clone(),
            None => self.default_output_path(&id),
        };
        audio.write_wav(&path)?;
        log::debug!(
            "Wrote {:.2}s of audio at {}Hz",
            audio.duration_secs(),
            audio.sample_rate
        );
        Ok(path)
    }

    fn validate<'a>(&'a self, request: &'a GenerationRequest) -> Result<Validated<'a>> {
        if request.text.trim().is_empty() {
            return Err(VoiceCloneError::InvalidRequest(
                "text must not be empty".to_string(),
            ));
        }

        let speaker_id = request.speaker_id.as_deref();
        if let Some(id) = speaker_id {
            identity::validate_id(id)?;
        }
        let voice = match (speaker_id, request.reference_audio.as_deref()) {
            (_, Some(audio)) => {
                if !audio.exists() {
                    return Err(VoiceCloneError::SourceAudioNotFound(audio.to_path_buf()));
                }
                VoiceSource::Reference { audio, speaker_id }
            }
            (Some(id), None) => VoiceSource::Speaker(id),
            (None, None) => {
                return Err(VoiceCloneError::InvalidRequest(
                    "provide a speaker id or a reference recording".to_string(),
                ))
            }
        };

        let language = request
            .language
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(self.inner.config.default_language.as_str());

        Ok(Validated {
            text: &request.text,
            voice,
            language,
            temperature: effective_temperature(
                request.temperature,
                self.inner.config.default_temperature,
            )?,
        })
    }

    fn default_output_path(&self, id: &str) -> PathBuf {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        self.inner
            .config
            .model_dir
            .join(format!("generated_{id}_{timestamp}.wav"))
    }
}

fn effective_temperature(requested: Option<f32>, default: f32) -> Result<f32> {
    let t = requested.unwrap_or(default);
    if t.is_nan() {
        return Err(VoiceCloneError::InvalidRequest(
            "temperature must be a number".to_string(),
        ));
    }
    let clamped = t.clamp(0.0, 1.0);
    if clamped != t {
        log::warn!("Temperature {t} is outside 0.0–1.0, using {clamped}");
    }
    Ok(clamped)
}
