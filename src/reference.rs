//! Reference statistics cache.
//!
//! Moment pairs of the reference population are computed once per
//! extractor/layer and kept for the lifetime of the cache. With a stats
//! directory they are also persisted as JSON (`{"mu": [...], "sigma": [[...]]}`)
//! so later processes can skip the recomputation.

use std::collections::HashMap;
use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ndarray::{Array1, Array2};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::activations::FeatureExtractor;
use crate::error::Result;
use crate::moments::MomentPair;

/// Identity of a cached reference entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ReferenceKey {
    pub extractor: String,
    pub layer: usize,
}

impl ReferenceKey {
    pub fn new(extractor: impl Into<String>, layer: usize) -> Self {
        Self {
            extractor: extractor.into(),
            layer,
        }
    }

    pub fn of<E: FeatureExtractor + ?Sized>(extractor: &E) -> Self {
        Self::new(extractor.name(), extractor.feature_layer())
    }

    fn file_name(&self, prefix: &str) -> String {
        let name: String = self
            .extractor
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        format!("{prefix}_{name}_act_{}.json", self.layer)
    }
}

#[derive(Serialize, Deserialize)]
struct StatsFile {
    mu: Vec<f64>,
    sigma: Vec<Vec<f64>>,
}

impl StatsFile {
    fn from_pair(pair: &MomentPair) -> Self {
        Self {
            mu: pair.mean.to_vec(),
            sigma: pair.cov.outer_iter().map(|row| row.to_vec()).collect(),
        }
    }

    /// `None` unless the covariance is `d x d` for a mean of length `d`.
    fn into_pair(self) -> Option<MomentPair> {
        let d = self.mu.len();
        if self.sigma.len() != d || self.sigma.iter().any(|row| row.len() != d) {
            return None;
        }
        let flat: Vec<f64> = self.sigma.into_iter().flatten().collect();
        let cov = Array2::from_shape_vec((d, d), flat).ok()?;
        Some(MomentPair {
            mean: Array1::from(self.mu),
            cov,
        })
    }
}

type Slot = Arc<OnceCell<Arc<MomentPair>>>;

pub struct ReferenceCache {
    dir: Option<PathBuf>,
    prefix: String,
    entries: Mutex<HashMap<ReferenceKey, Slot>>,
}

impl ReferenceCache {
    /// Cache that lives only as long as this value.
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            prefix: String::new(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Cache backed by JSON files under `dir`.
    pub fn persistent(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: Some(dir.into()),
            prefix: prefix.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn stats_path(&self, key: &ReferenceKey) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|dir| dir.join(key.file_name(&self.prefix)))
    }

    /// Return the cached pair for `key`, running `compute` only when neither
    /// memory nor disk has a usable entry.
    ///
    /// Concurrent callers for the same key wait for the first one to finish.
    pub fn get_or_compute<F>(&self, key: &ReferenceKey, compute: F) -> Result<Arc<MomentPair>>
    where
        F: FnOnce() -> Result<MomentPair>,
    {
        let slot = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(entries.entry(key.clone()).or_default())
        };

        slot.get_or_try_init(|| {
            if let Some(pair) = self.load(key) {
                info!(extractor = %key.extractor, layer = key.layer, "reference stats loaded");
                return Ok(Arc::new(pair));
            }
            info!(extractor = %key.extractor, layer = key.layer, "computing reference stats");
            let pair = compute()?;
            self.store(key, &pair)?;
            Ok(Arc::new(pair))
        })
        .map(Arc::clone)
    }

    /// Read a persisted entry; missing or malformed files count as absent.
    pub fn load(&self, key: &ReferenceKey) -> Option<MomentPair> {
        let path = self.stats_path(key)?;
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable reference stats");
                return None;
            }
        };
        let parsed = serde_json::from_slice::<StatsFile>(&raw)
            .ok()
            .and_then(StatsFile::into_pair);
        if parsed.is_none() {
            warn!(path = %path.display(), "ignoring malformed reference stats");
        }
        parsed
    }

    /// Persist `pair` atomically (temp file in the same directory, then rename).
    /// A no-op for in-memory caches.
    pub fn store(&self, key: &ReferenceKey, pair: &MomentPair) -> Result<()> {
        let Some(path) = self.stats_path(key) else {
            return Ok(());
        };
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;

        let tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer(&mut writer, &StatsFile::from_pair(pair))?;
            writer.flush()?;
        }
        tmp.persist(&path).map_err(|e| e.error)?;
        info!(path = %path.display(), "reference stats persisted");
        Ok(())
    }
}

impl Default for ReferenceCache {
    fn default() -> Self {
        Self::in_memory()
    }
}
