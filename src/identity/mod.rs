//! Speaker Identity Store.
//!
//! Voice identities are opaque embedding artifacts derived from a reference
//! recording by the Generation Engine. This module only manages their
//! persistence: the engine decides what an embedding is.
//!
//! # Artifact Layout
//!
//! ```text
//! models/
//! └── speaker_embeddings/
//!     ├── speakerA.npy
//!     └── speaker_1f3a9c02.npy
//! ```
//!
//! Storage goes through the [`EmbeddingStore`] key-value interface, so an
//! in-memory or database-backed store can replace the directory layout.
//!
//! Re-extracting with an existing id replaces the stored artifact. Concurrent
//! extractions under the same id race and the last writer wins.

pub mod backend;
pub mod npy;

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};

pub use backend::{EmbeddingStore, FsEmbeddingStore, MemoryEmbeddingStore};

use crate::audio::AudioLoader;
use crate::error::{Result, VoiceCloneError};
use crate::GenerationEngine;

/// Prefix for generated identity ids.
pub const GENERATED_ID_PREFIX: &str = "speaker_";

/// A stored speaker identity.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceIdentity {
    pub id: String,
    /// Whatever the Generation Engine accepts as a voice prompt.
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

pub struct IdentityStore {
    backend: Arc<dyn EmbeddingStore>,
    loader: Arc<dyn AudioLoader>,
}

impl IdentityStore {
    pub fn new(backend: Arc<dyn EmbeddingStore>, loader: Arc<dyn AudioLoader>) -> Self {
        Self { backend, loader }
    }

    /// Load `source_audio`, let `engine` encode it, and persist the result
    /// under `id` (or a fresh `speaker_xxxxxxxx` id).
    pub fn extract_identity(
        &self,
        engine: &dyn GenerationEngine,
        source_audio: &Path,
        id: Option<&str>,
    ) -> Result<VoiceIdentity> {
        let id = match id {
            Some(id) => {
                validate_id(id)?;
                id.to_string()
            }
            None => generate_id(),
        };
        if !source_audio.exists() {
            return Err(VoiceCloneError::SourceAudioNotFound(
                source_audio.to_path_buf(),
            ));
        }

        log::info!(
            "Extracting voice identity '{}' from {}",
            id,
            source_audio.display()
        );
        let waveform = self.loader.load(source_audio)?;
        let embedding = engine.encode_voice_prompt(&waveform).map_err(|e| {
            VoiceCloneError::SynthesisFailure(format!("encoding voice prompt for '{id}': {e}"))
        })?;

        self.backend.put(&id, &embedding)?;
        log::info!(
            "Stored voice identity '{}' ({} values, {:.1}s reference)",
            id,
            embedding.len(),
            waveform.duration_secs()
        );

        Ok(VoiceIdentity {
            id,
            embedding,
            created_at: Utc::now(),
        })
    }

    pub fn resolve(&self, id: &str) -> Result<Vec<f32>> {
        validate_id(id)?;
        self.backend
            .get(id)?
            .ok_or_else(|| VoiceCloneError::IdentityNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> Result<bool> {
        if validate_id(id).is_err() {
            return Ok(false);
        }
        self.backend.exists(id)
    }

    pub fn list(&self) -> Result<Vec<String>> {
        self.backend.ids()
    }
}

/// Ids double as file names, so they are restricted to a portable subset.
pub fn validate_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(VoiceCloneError::InvalidRequest(format!(
            "invalid voice identity id {id:?}: use letters, digits, '_', '-' or '.'"
        )))
    }
}

pub fn generate_id() -> String {
    let token = uuid::Uuid::new_v4().simple().to_string();
    format!("{GENERATED_ID_PREFIX}{}", &token[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::DefaultAudioLoader;
    use crate::test_support::{write_wav_fixture, FakeEngine};

    fn fs_store(root: &Path) -> (IdentityStore, Arc<FsEmbeddingStore>) {
        let backend = Arc::new(FsEmbeddingStore::new(root.join("speaker_embeddings")));
        let store = IdentityStore::new(backend.clone(), Arc::new(DefaultAudioLoader::default()));
        (store, backend)
    }

    #[test]
    fn extract_then_resolve_round_trips() {
        let root = tempfile::tempdir().unwrap();
        let wav = root.path().join("ref.wav");
        write_wav_fixture(&wav, 16_000, &[0.1, -0.2, 0.4]);
        let (store, backend) = fs_store(root.path());
        let engine = FakeEngine::default();

        let identity = store
            .extract_identity(&engine, &wav, Some("speakerA"))
            .unwrap();
        assert_eq!(identity.id, "speakerA");
        assert!(backend.artifact_path("speakerA").is_file());
        assert_eq!(store.resolve("speakerA").unwrap(), identity.embedding);
    }

    #[test]
    fn re_extraction_replaces_the_artifact() {
        let root = tempfile::tempdir().unwrap();
        let first = root.path().join("first.wav");
        let second = root.path().join("second.wav");
        write_wav_fixture(&first, 16_000, &[0.5; 10]);
        write_wav_fixture(&second, 16_000, &[0.5; 20]);
        let (store, backend) = fs_store(root.path());
        let engine = FakeEngine::default();

        store.extract_identity(&engine, &first, Some("X")).unwrap();
        let replaced = store.extract_identity(&engine, &second, Some("X")).unwrap();

        assert_eq!(backend.ids().unwrap(), vec!["X".to_string()]);
        let stored = store.resolve("X").unwrap();
        assert_eq!(stored, replaced.embedding);
        assert_eq!(stored.len(), 20);
    }

    #[test]
    fn generated_ids_have_speaker_prefix() {
        let root = tempfile::tempdir().unwrap();
        let wav = root.path().join("ref.wav");
        write_wav_fixture(&wav, 16_000, &[0.3; 4]);
        let (store, _) = fs_store(root.path());

        let identity = store
            .extract_identity(&FakeEngine::default(), &wav, None)
            .unwrap();
        assert!(identity.id.starts_with(GENERATED_ID_PREFIX));
        assert_eq!(identity.id.len(), GENERATED_ID_PREFIX.len() + 8);
        assert!(store.contains(&identity.id).unwrap());
    }

    #[test]
    fn missing_source_and_missing_identity() {
        let root = tempfile::tempdir().unwrap();
        let (store, _) = fs_store(root.path());

        let err = store
            .extract_identity(&FakeEngine::default(), &root.path().join("nope.wav"), None)
            .unwrap_err();
        assert!(matches!(err, VoiceCloneError::SourceAudioNotFound(_)));

        let err = store.resolve("ghost").unwrap_err();
        assert!(matches!(err, VoiceCloneError::IdentityNotFound(id) if id == "ghost"));
    }

    #[test]
    fn path_like_ids_are_rejected() {
        assert!(validate_id("../etc/passwd").is_err());
        assert!(validate_id("").is_err());
        assert!(validate_id(".hidden").is_err());
        assert!(validate_id("speaker_01-b.v2").is_ok());
    }
}
