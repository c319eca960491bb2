//! Engine Lifecycle Manager.
//!
//! Loading the Generation Engine can take minutes, so it happens once per
//! process, on first need. [`EngineManager::ensure_ready`] serializes loads
//! behind an init mutex: concurrent first callers block until the single
//! load finishes and then share its handle. The ready handle lives in a
//! separate lock that is only held to read or publish it, so
//! [`EngineManager::is_ready`] answers immediately while a load is running.
//! A failed load leaves the manager empty, so the next call retries.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use crate::error::{EngineResult, Result, VoiceCloneError};
use crate::{EngineLoader, GenerationEngine, GenerationParams, SynthesisResult, Waveform};

/// Shared capability over an initialized engine. Cloning is cheap.
#[derive(Clone)]
pub struct EngineHandle {
    engine: Arc<dyn GenerationEngine>,
    sample_rate: u32,
}

impl EngineHandle {
    pub fn new(engine: Arc<dyn GenerationEngine>) -> Self {
        let sample_rate = engine.sample_rate();
        Self {
            engine,
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn engine(&self) -> &dyn GenerationEngine {
        self.engine.as_ref()
    }

    pub fn encode_voice_prompt(&self, reference: &Waveform) -> EngineResult<Vec<f32>> {
        self.engine.encode_voice_prompt(reference)
    }

    pub fn synthesize(
        &self,
        text: &str,
        voice_prompt: &[f32],
        params: &GenerationParams,
    ) -> EngineResult<SynthesisResult> {
        let samples = self.engine.synthesize(text, voice_prompt, params)?;
        Ok(SynthesisResult {
            samples,
            sample_rate: self.sample_rate,
        })
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("sample_rate", &self.sample_rate)
            .finish_non_exhaustive()
    }
}

pub struct EngineManager {
    loader: Box<dyn EngineLoader>,
    model_dir: PathBuf,
    ready: RwLock<Option<EngineHandle>>,
    init: Mutex<()>,
}

impl EngineManager {
    pub fn new(loader: impl EngineLoader + 'static, model_dir: impl Into<PathBuf>) -> Self {
        Self {
            loader: Box::new(loader),
            model_dir: model_dir.into(),
            ready: RwLock::new(None),
            init: Mutex::new(()),
        }
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    /// Return the shared engine, loading it first if needed.
    pub fn ensure_ready(&self) -> Result<EngineHandle> {
        if let Some(handle) = self.current() {
            return Ok(handle);
        }

        // A panic inside a previous load leaves the handle empty; recovering
        // the guard is enough to retry.
        let _init = self.init.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = self.current() {
            return Ok(handle);
        }

        log::info!(
            "Initializing generation engine from {}",
            self.model_dir.display()
        );
        let start = Instant::now();
        let engine = self.loader.load(&self.model_dir).map_err(|e| {
            log::error!("Generation engine failed to load: {e}");
            VoiceCloneError::EngineUnavailable(e.to_string())
        })?;

        let handle = EngineHandle::new(Arc::from(engine));
        log::info!(
            "Generation engine ready in {:.2?} ({}Hz)",
            start.elapsed(),
            handle.sample_rate()
        );
        *self.ready.write().unwrap_or_else(PoisonError::into_inner) = Some(handle.clone());
        Ok(handle)
    }

    /// Whether a load has completed. Never waits for a load in progress.
    pub fn is_ready(&self) -> bool {
        self.ready
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn current(&self) -> Option<EngineHandle> {
        self.ready
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
