//! Persisted transform-planning wisdom.
//!
//! Creating a plan can involve a measured search over candidate transform
//! algorithms. The cache provider persists the outcome, keyed by the
//! transform shape, so later runs (and other engine instances in the same
//! process) skip the search. The content is a pure optimization hint: a
//! missing, stale, or corrupt entry only costs a recomputation, never
//! correctness.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::backend::Direction;

/// Which class of transform a cache entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformKind {
    RealToComplex,
    ComplexToComplex,
}

/// Numeric precision of the planned transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precision {
    Single,
    Double,
}

/// Shape of a transform plan; one persisted entry exists per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlanKey {
    pub kind: TransformKind,
    pub direction: Direction,
    pub precision: Precision,
    pub len: usize,
}

impl PlanKey {
    /// File name for this key, e.g. `wisdom_r2c64_16384.plan`.
    pub fn file_name(&self) -> String {
        let kind = match (self.kind, self.direction) {
            (TransformKind::RealToComplex, _) => "r2c",
            (TransformKind::ComplexToComplex, Direction::Forward) => "cfc",
            (TransformKind::ComplexToComplex, Direction::Backward) => "cbc",
        };
        let bits = match self.precision {
            Precision::Single => 32,
            Precision::Double => 64,
        };
        format!("wisdom_{kind}{bits}_{}.plan", self.len)
    }
}

/// Lookup/store contract for persisted planning wisdom.
///
/// Blobs are opaque to the cache; the backend that stored an entry is the
/// one that can interpret it. Both operations degrade gracefully: lookup
/// failures surface as a miss, store failures as a warning.
pub trait PlanCache {
    fn lookup(&self, key: &PlanKey) -> Option<Vec<u8>>;
    fn store(&self, key: &PlanKey, blob: &[u8]);
}

/// Cache that never persists anything.
pub struct NullPlanCache;

impl PlanCache for NullPlanCache {
    fn lookup(&self, _key: &PlanKey) -> Option<Vec<u8>> {
        None
    }

    fn store(&self, _key: &PlanKey, _blob: &[u8]) {}
}

/// File-backed cache: one file per key inside a directory.
///
/// The directory may be shared by every engine instance of a process (and
/// by concurrent processes). Entries are written to a temporary file and
/// renamed into place, so concurrent writers to the same key race over
/// whole files and the survivor is always internally consistent
/// (last-writer-wins).
pub struct FsPlanCache {
    dir: PathBuf,
}

impl FsPlanCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &PlanKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    fn write_entry(&self, path: &Path, blob: &[u8]) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let tmp = path.with_extension(format!("tmp{}", std::process::id()));
        fs::write(&tmp, blob)?;
        fs::rename(&tmp, path)
    }
}

impl PlanCache for FsPlanCache {
    fn lookup(&self, key: &PlanKey) -> Option<Vec<u8>> {
        let path = self.entry_path(key);
        match fs::read(&path) {
            Ok(blob) => Some(blob),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => {
                log::warn!("could not read plan wisdom {}: {err}", path.display());
                None
            }
        }
    }

    fn store(&self, key: &PlanKey, blob: &[u8]) {
        let path = self.entry_path(key);
        match self.write_entry(&path, blob) {
            Ok(()) => log::info!("created plan wisdom at {}", path.display()),
            Err(err) => {
                log::warn!("could not persist plan wisdom {}: {err}", path.display());
            }
        }
    }
}
