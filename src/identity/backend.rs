use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use super::npy;
use crate::error::{Result, VoiceCloneError};

const ARTIFACT_EXT: &str = "npy";

/// Key-value storage for embedding artifacts, keyed by identity id.
///
/// `put` replaces any existing value for the same id.
pub trait EmbeddingStore: Send + Sync {
    fn put(&self, id: &str, embedding: &[f32]) -> Result<()>;
    fn get(&self, id: &str) -> Result<Option<Vec<f32>>>;
    fn exists(&self, id: &str) -> Result<bool>;
    /// All stored ids, sorted.
    fn ids(&self) -> Result<Vec<String>>;
}

/// One `{id}.npy` file per identity inside a directory.
#[derive(Debug, Clone)]
pub struct FsEmbeddingStore {
    dir: PathBuf,
}

impl FsEmbeddingStore {
    /// The directory is created lazily on the first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn artifact_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.{ARTIFACT_EXT}"))
    }
}

impl EmbeddingStore for FsEmbeddingStore {
    fn put(&self, id: &str, embedding: &[f32]) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            VoiceCloneError::storage(format!("creating {}", self.dir.display()), e)
        })?;

        // Write beside the target and rename so readers never see a partial file.
        let path = self.artifact_path(id);
        let tmp = self
            .dir
            .join(format!(".{id}.{}.tmp", uuid::Uuid::new_v4().simple()));
        fs::write(&tmp, npy::encode_f32(embedding))
            .map_err(|e| VoiceCloneError::storage(format!("writing {}", tmp.display()), e))?;
        fs::rename(&tmp, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            VoiceCloneError::storage(format!("replacing {}", path.display()), e)
        })?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Vec<f32>>> {
        let path = self.artifact_path(id);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(VoiceCloneError::storage(
                    format!("reading {}", path.display()),
                    e,
                ))
            }
        };
        npy::decode_f32(&data, &path.display().to_string())
            .map(Some)
            .map_err(|e| VoiceCloneError::storage(format!("parsing {}", path.display()), e))
    }

    fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.artifact_path(id).is_file())
    }

    fn ids(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(VoiceCloneError::storage(
                    format!("listing {}", self.dir.display()),
                    e,
                ))
            }
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                VoiceCloneError::storage(format!("listing {}", self.dir.display()), e)
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ARTIFACT_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if !stem.starts_with('.') {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }
}

/// Process-local store, mostly for tests and embedding hosts.
#[derive(Debug, Default)]
pub struct MemoryEmbeddingStore {
    entries: RwLock<HashMap<String, Vec<f32>>>,
}

impl MemoryEmbeddingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EmbeddingStore for MemoryEmbeddingStore {
    fn put(&self, id: &str, embedding: &[f32]) -> Result<()> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), embedding.to_vec());
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Vec<f32>>> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned())
    }

    fn exists(&self, id: &str) -> Result<bool> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id))
    }

    fn ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_store_creates_directory_and_overwrites() {
        let root = tempfile::tempdir().unwrap();
        let store = FsEmbeddingStore::new(root.path().join("nested/speaker_embeddings"));
        assert!(!store.exists("alice").unwrap());
        assert_eq!(store.get("alice").unwrap(), None);

        store.put("alice", &[1.0, 2.0]).unwrap();
        store.put("alice", &[3.0]).unwrap();

        assert!(store.exists("alice").unwrap());
        assert_eq!(store.get("alice").unwrap(), Some(vec![3.0]));
        assert_eq!(store.ids().unwrap(), vec!["alice".to_string()]);

        let files = fs::read_dir(store.dir()).unwrap().count();
        assert_eq!(files, 1, "temp files must not linger after rename");
    }

    #[test]
    fn fs_store_lists_only_artifacts() {
        let root = tempfile::tempdir().unwrap();
        let store = FsEmbeddingStore::new(root.path());
        store.put("b", &[0.0]).unwrap();
        store.put("a", &[0.0]).unwrap();
        fs::write(root.path().join("notes.txt"), "x").unwrap();
        assert_eq!(store.ids().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn fs_store_reports_corrupt_artifacts_as_storage_errors() {
        let root = tempfile::tempdir().unwrap();
        let store = FsEmbeddingStore::new(root.path());
        fs::write(store.artifact_path("broken"), b"garbage").unwrap();
        let err = store.get("broken").unwrap_err();
        assert!(matches!(err, VoiceCloneError::Storage { .. }));
    }

    #[test]
    fn memory_store_overwrites() {
        let store = MemoryEmbeddingStore::new();
        store.put("x", &[1.0]).unwrap();
        store.put("x", &[2.0, 2.0]).unwrap();
        assert_eq!(store.get("x").unwrap(), Some(vec![2.0, 2.0]));
        assert_eq!(store.ids().unwrap().len(), 1);
    }
}
