//! Baseline persistence.
//!
//! Layout of [`FsBaselineStore`]:
//!
//! ```text
//! <baseline_dir>/baseline.json   current baseline, replaced atomically
//! <baseline_dir>/baseline.lock   present only while a writer holds the store
//! ```

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::domain::{Baseline, RegateError, Result, BASELINE_SCHEMA_VERSION};
use crate::fsutil::write_atomic;

pub const BASELINE_FILE: &str = "baseline.json";
pub const BASELINE_LOCK_FILE: &str = "baseline.lock";

/// Storage backend for the single current baseline.
pub trait BaselineStore: Send + Sync {
    /// Load the current baseline. `BaselineMissing` if none was ever saved.
    fn load(&self) -> Result<Baseline>;

    /// Replace the current baseline. Readers see either the old or the new
    /// baseline, never a mix.
    fn save(&self, baseline: &Baseline) -> Result<()>;

    fn exists(&self) -> bool;

    /// Human-readable location, used in error messages and logs.
    fn location(&self) -> PathBuf;
}

/// Filesystem-backed baseline store.
#[derive(Debug, Clone)]
pub struct FsBaselineStore {
    dir: PathBuf,
}

impl FsBaselineStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(BASELINE_FILE)
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(BASELINE_LOCK_FILE)
    }
}

/// Exclusive writer lock, released on drop.
struct WriterLock {
    path: PathBuf,
}

impl WriterLock {
    fn acquire(path: PathBuf) -> Result<Self> {
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Self { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(RegateError::BaselineLocked { path })
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for WriterLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release baseline lock");
        }
    }
}

fn decode(path: &Path, bytes: &[u8]) -> Result<Baseline> {
    let baseline: Baseline =
        serde_json::from_slice(bytes).map_err(|e| RegateError::BaselineCorrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    if baseline.schema_version() != BASELINE_SCHEMA_VERSION {
        return Err(RegateError::BaselineCorrupt {
            path: path.to_path_buf(),
            reason: format!(
                "unsupported schema version {} (expected {})",
                baseline.schema_version(),
                BASELINE_SCHEMA_VERSION
            ),
        });
    }
    Ok(baseline)
}

impl BaselineStore for FsBaselineStore {
    fn load(&self) -> Result<Baseline> {
        let path = self.path();
        let bytes = fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RegateError::BaselineMissing { path: path.clone() }
            } else {
                RegateError::Io(e)
            }
        })?;
        decode(&path, &bytes)
    }

    fn save(&self, baseline: &Baseline) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let _lock = WriterLock::acquire(self.lock_path())?;
        let content = serde_json::to_vec_pretty(baseline)?;
        write_atomic(&self.path(), &content)?;
        tracing::debug!(path = %self.path().display(), "baseline written");
        Ok(())
    }

    fn exists(&self) -> bool {
        self.path().exists()
    }

    fn location(&self) -> PathBuf {
        self.path()
    }
}

/// In-memory store for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemoryBaselineStore {
    current: Mutex<Option<Baseline>>,
}

impl InMemoryBaselineStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_baseline(baseline: Baseline) -> Self {
        Self {
            current: Mutex::new(Some(baseline)),
        }
    }
}

impl BaselineStore for InMemoryBaselineStore {
    fn load(&self) -> Result<Baseline> {
        let guard = self.current.lock().unwrap_or_else(|p| p.into_inner());
        guard.clone().ok_or_else(|| RegateError::BaselineMissing {
            path: self.location(),
        })
    }

    fn save(&self, baseline: &Baseline) -> Result<()> {
        let mut guard = self.current.lock().unwrap_or_else(|p| p.into_inner());
        *guard = Some(baseline.clone());
        Ok(())
    }

    fn exists(&self) -> bool {
        self.current
            .lock()
            .map(|g| g.is_some())
            .unwrap_or_else(|p| p.into_inner().is_some())
    }

    fn location(&self) -> PathBuf {
        PathBuf::from("<memory>")
    }
}
