//! Content-addressed cache of calibration profiles.
//!
//! Entries live at `<roll>/.cache/<key>.profile.json`, where the key hashes
//! the technical recipe and the analyzer's key inputs (estimators and proxy
//! size). Entries are
//! never evicted; a changed recipe simply maps to a new file.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::calibration::CalibrationProfile;
use crate::error::{PipelineError, PipelineResult};
use crate::roll::Roll;

use super::analyzer::RollAnalysis;
use super::hash::RecipeKey;
use super::progress::{CancelToken, ProgressSink};

/// Bumped whenever the entry layout changes.
pub const CACHE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    format_version: u32,
    key: String,
    version: String,
    profile: CalibrationProfile,
}

/// Whether a profile came from disk or a fresh analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Computed,
}

/// Sits between callers and an analyzer, memoizing its results on disk.
pub struct CalibrationCoordinator<A: RollAnalysis> {
    analyzer: A,
}

impl<A: RollAnalysis> CalibrationCoordinator<A> {
    pub fn new(analyzer: A) -> Self {
        Self { analyzer }
    }

    pub fn analyzer(&self) -> &A {
        &self.analyzer
    }

    /// Cache key for the roll's current technical recipe.
    pub fn key_for(&self, roll: &Roll) -> PipelineResult<RecipeKey> {
        RecipeKey::compute(roll.technical(), &self.analyzer.key_inputs()).map_err(|e| {
            PipelineError::Cache {
                path: roll.cache_dir(),
                message: format!("Cannot serialize recipe: {e}"),
            }
        })
    }

    pub fn cache_path(&self, roll: &Roll) -> PipelineResult<PathBuf> {
        let key = self.key_for(roll)?;
        Ok(roll.cache_dir().join(format!("{key}.profile.json")))
    }

    /// Return the roll's profile, loading it from the cache or analyzing the
    /// roll on a miss. The profile is attached to the roll either way.
    pub fn get_or_compute(
        &self,
        roll: &mut Roll,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> PipelineResult<(Arc<CalibrationProfile>, CacheOutcome)> {
        roll.technical().validate()?;
        let key = self.key_for(roll)?;
        let path = roll.cache_dir().join(format!("{key}.profile.json"));

        if let Some(profile) = load_entry(&path, &key) {
            tracing::info!("Calibration cache hit for {} ({})", roll.name(), key);
            let profile = Arc::new(profile);
            roll.set_calibration(profile.clone());
            return Ok((profile, CacheOutcome::Hit));
        }

        tracing::info!("Calibration cache miss for {} ({}), analyzing", roll.name(), key);
        let profile = self.analyzer.analyze(roll, progress, cancel)?;
        store_entry(&path, &key, &profile)?;

        let profile = Arc::new(profile);
        roll.set_calibration(profile.clone());
        Ok((profile, CacheOutcome::Computed))
    }

    /// Cached profile for the roll's recipe, without analyzing.
    pub fn lookup(&self, roll: &Roll) -> PipelineResult<Option<CalibrationProfile>> {
        let key = self.key_for(roll)?;
        let path = roll.cache_dir().join(format!("{key}.profile.json"));
        Ok(load_entry(&path, &key))
    }
}

/// Read an entry. Unreadable, stale or mismatched entries are logged and
/// treated as a miss.
fn load_entry(path: &Path, key: &RecipeKey) -> Option<CalibrationProfile> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!("Cannot read calibration cache {:?}: {}", path, e);
            return None;
        }
    };
    let entry: CacheEntry = match serde_json::from_slice(&bytes) {
        Ok(entry) => entry,
        Err(e) => {
            tracing::warn!("Ignoring corrupt calibration cache {:?}: {}", path, e);
            return None;
        }
    };
    if entry.format_version != CACHE_FORMAT_VERSION || entry.key != key.as_str() {
        tracing::warn!(
            "Ignoring calibration cache {:?} (format {}, key {})",
            path,
            entry.format_version,
            entry.key
        );
        return None;
    }
    Some(entry.profile)
}

/// Write an entry through a temporary file and rename it into place.
fn store_entry(path: &Path, key: &RecipeKey, profile: &CalibrationProfile) -> PipelineResult<()> {
    let cache_err = |message: String| PipelineError::Cache {
        path: path.to_path_buf(),
        message,
    };
    let entry = CacheEntry {
        format_version: CACHE_FORMAT_VERSION,
        key: key.to_string(),
        version: crate::VERSION.to_string(),
        profile: profile.clone(),
    };
    let json = serde_json::to_vec_pretty(&entry).map_err(|e| cache_err(e.to_string()))?;

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| cache_err(format!("Cannot create cache dir: {e}")))?;
    }
    let tmp = path.with_extension("json.tmp");
    let write = || -> std::io::Result<()> {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(&json)?;
        file.sync_all()?;
        std::fs::rename(&tmp, path)
    };
    if let Err(e) = write() {
        let _ = std::fs::remove_file(&tmp);
        return Err(cache_err(e.to_string()));
    }
    tracing::debug!("Stored calibration profile at {:?}", path);
    Ok(())
}
