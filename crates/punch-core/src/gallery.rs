//! In-memory embedding gallery with file-backed persistence.
//!
//! The gallery is the set of enrolled identities. It is rewritten to the
//! encoding file as a single atomic unit whenever any entry changes, so a
//! completed registration or deletion is durable before the call returns.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::EMBEDDING_DIM;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("employee ID already registered: {0}")]
    DuplicateKey(String),
    #[error("employee ID not found: {0}")]
    NotFound(String),
    #[error("invalid embedding dimension: {0} (expected {EMBEDDING_DIM})")]
    InvalidEmbeddingDim(usize),
    #[error("invalid embedding value (NaN/Inf)")]
    InvalidEmbeddingValue,
    #[error("encoding file corrupt: {0}")]
    Corrupt(String),
    #[error("encoding file serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("encoding file I/O failed: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// An enrolled identity: display name, unique employee key, and the
/// 128-dimensional embedding captured at registration.
#[derive(Debug, Clone)]
pub struct Identity {
    pub name: String,
    pub employee_id: String,
    pub embedding: Vec<f32>,
}

/// Result of a nearest-neighbour query against the gallery.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub employee_id: String,
    pub name: String,
    pub distance: f32,
    /// `(1 - distance) * 100`, clamped to [0, 100]. A monotonic proxy,
    /// not a calibrated probability.
    pub confidence: f32,
}

/// Serialized encoding file: parallel arrays, one index per identity.
#[derive(Serialize, Deserialize, Default)]
struct EncodingFile {
    embeddings: Vec<Vec<f32>>,
    names: Vec<String>,
    employee_ids: Vec<String>,
}

/// Ordered collection of identities keyed by employee ID.
///
/// Insertion order is irrelevant to matching but stable for iteration,
/// which makes the tie-break on identical minimum distances
/// deterministic (earliest entry wins).
#[derive(Debug)]
pub struct Gallery {
    entries: Vec<Identity>,
    path: Option<PathBuf>,
}

impl Gallery {
    /// An empty gallery with no persistence (tests, ephemeral sessions).
    pub fn in_memory() -> Self {
        Self {
            entries: Vec::new(),
            path: None,
        }
    }

    /// Load the gallery from the encoding file, or start empty if the
    /// file does not exist yet.
    pub fn load(path: &Path) -> Result<Self, GalleryError> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no encoding file; starting with empty gallery");
            return Ok(Self {
                entries: Vec::new(),
                path: Some(path.to_path_buf()),
            });
        }

        let bytes = std::fs::read(path).map_err(|source| GalleryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: EncodingFile = serde_json::from_slice(&bytes)?;

        if file.embeddings.len() != file.names.len()
            || file.embeddings.len() != file.employee_ids.len()
        {
            return Err(GalleryError::Corrupt(format!(
                "parallel array length mismatch: {} embeddings, {} names, {} employee IDs",
                file.embeddings.len(),
                file.names.len(),
                file.employee_ids.len()
            )));
        }

        let mut entries = Vec::with_capacity(file.embeddings.len());
        for ((embedding, name), employee_id) in file
            .embeddings
            .into_iter()
            .zip(file.names)
            .zip(file.employee_ids)
        {
            validate_embedding(&embedding)?;
            entries.push(Identity {
                name,
                employee_id,
                embedding,
            });
        }

        tracing::info!(count = entries.len(), path = %path.display(), "loaded face encodings");
        Ok(Self {
            entries,
            path: Some(path.to_path_buf()),
        })
    }

    /// Register an identity. Fails with `DuplicateKey` if the employee ID
    /// is already present; persists the whole gallery before returning.
    /// On a persistence failure the in-memory insert is rolled back so
    /// memory and disk stay in agreement.
    pub fn add(&mut self, identity: Identity) -> Result<(), GalleryError> {
        validate_embedding(&identity.embedding)?;
        if self.contains(&identity.employee_id) {
            return Err(GalleryError::DuplicateKey(identity.employee_id));
        }

        self.entries.push(identity);
        if let Err(e) = self.persist() {
            self.entries.pop();
            return Err(e);
        }
        Ok(())
    }

    /// Remove an identity by employee ID. Fails with `NotFound` if the
    /// key is absent; a second call for the same key also fails.
    pub fn remove(&mut self, employee_id: &str) -> Result<Identity, GalleryError> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.employee_id == employee_id)
            .ok_or_else(|| GalleryError::NotFound(employee_id.to_string()))?;

        let removed = self.entries.remove(idx);
        if let Err(e) = self.persist() {
            self.entries.insert(idx, removed);
            return Err(e);
        }
        Ok(removed)
    }

    /// Nearest-neighbour match against every stored embedding.
    ///
    /// Returns the minimum-distance identity only if that distance is at
    /// most `tolerance` (smaller tolerance = stricter). An empty gallery
    /// yields `None` without computing anything.
    pub fn best_match(&self, embedding: &[f32], tolerance: f32) -> Option<MatchResult> {
        if self.entries.is_empty() {
            return None;
        }

        let mut best: Option<(&Identity, f32)> = None;
        for entry in &self.entries {
            let d = euclidean_distance(&entry.embedding, embedding);
            // Strict < keeps the earliest entry on a tie.
            if best.map(|(_, bd)| d < bd).unwrap_or(true) {
                best = Some((entry, d));
            }
        }

        let (entry, distance) = best?;
        if distance > tolerance {
            return None;
        }

        Some(MatchResult {
            employee_id: entry.employee_id.clone(),
            name: entry.name.clone(),
            distance,
            confidence: ((1.0 - distance) * 100.0).clamp(0.0, 100.0),
        })
    }

    pub fn contains(&self, employee_id: &str) -> bool {
        self.entries.iter().any(|e| e.employee_id == employee_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.entries.iter()
    }

    /// Rewrite the encoding file in full (rewrite-on-any-change policy).
    /// Writes to a temp file in the same directory, then renames over the
    /// target so readers never see a partial file.
    fn persist(&self) -> Result<(), GalleryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let file = EncodingFile {
            embeddings: self.entries.iter().map(|e| e.embedding.clone()).collect(),
            names: self.entries.iter().map(|e| e.name.clone()).collect(),
            employee_ids: self
                .entries
                .iter()
                .map(|e| e.employee_id.clone())
                .collect(),
        };
        let bytes = serde_json::to_vec(&file)?;

        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &bytes).map_err(|source| GalleryError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, path).map_err(|source| GalleryError::Io {
            path: path.clone(),
            source,
        })?;

        tracing::debug!(count = self.entries.len(), path = %path.display(), "encoding file rewritten");
        Ok(())
    }
}

fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

fn validate_embedding(values: &[f32]) -> Result<(), GalleryError> {
    if values.len() != EMBEDDING_DIM {
        return Err(GalleryError::InvalidEmbeddingDim(values.len()));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(GalleryError::InvalidEmbeddingValue);
    }
    Ok(())
}
