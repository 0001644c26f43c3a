//! The staging directory: files queued for OCR.

use crate::{
    config::Config,
    error::{Error, Result},
    util::hash_file,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionPolicy {
    Overwrite,
    Rename,
}

impl CollisionPolicy {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "overwrite" => Ok(Self::Overwrite),
            "rename" => Ok(Self::Rename),
            other => Err(Error::Config(format!("unknown staging.on_collision: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub removed: usize,
    pub failures: Vec<CleanupFailure>,
    pub report_removed: bool,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanupFailure {
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct StagingStore {
    dir: PathBuf,
    on_collision: CollisionPolicy,
}

impl StagingStore {
    pub fn new(dir: impl Into<PathBuf>, on_collision: CollisionPolicy) -> Self {
        Self {
            dir: dir.into(),
            on_collision,
        }
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Ok(Self::new(
            &cfg.paths.staging_dir,
            CollisionPolicy::parse(&cfg.staging.on_collision)?,
        ))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copies `source` into the staging directory and returns the staged path.
    pub fn ingest(&self, source: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir).map_err(|e| Error::staging(&self.dir, e))?;

        let name = source
            .file_name()
            .ok_or_else(|| Error::Config(format!("not a file path: {}", source.display())))?;
        let mut dest = self.dir.join(name);

        // Copying a file onto itself truncates it.
        if dest.exists() && same_file(source, &dest)? {
            debug!("already staged: {}", dest.display());
            return Ok(dest);
        }

        if dest.exists() && self.on_collision == CollisionPolicy::Rename {
            let incoming = hash_file(source).map_err(|e| Error::staging(source, e))?;
            let existing = hash_file(&dest).map_err(|e| Error::staging(&dest, e))?;
            if incoming == existing {
                debug!("identical file already staged: {}", dest.display());
                return Ok(dest);
            }
            dest = self.free_name(&dest);
        }

        std::fs::copy(source, &dest).map_err(|e| Error::staging(&dest, e))?;
        info!("staged {} -> {}", source.display(), dest.display());
        Ok(dest)
    }

    /// Every regular file under the staging directory, sorted by path.
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.dir).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| self.dir.clone());
                Error::staging(path, e.into())
            })?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }

    /// Removes every entry under the staging directory. Failures are logged and
    /// collected; they never stop the remaining deletions.
    pub fn clear(&self) -> CleanupReport {
        let mut report = CleanupReport::default();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return report,
            Err(e) => {
                warn!("failed to read staging dir {}: {e}", self.dir.display());
                report.failures.push(CleanupFailure {
                    path: self.dir.clone(),
                    error: e.to_string(),
                });
                return report;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("failed to read staging entry: {e}");
                    report.failures.push(CleanupFailure {
                        path: self.dir.clone(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            let path = entry.path();
            match remove_entry(&path) {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    warn!("failed to delete {}: {e}", path.display());
                    report.failures.push(CleanupFailure {
                        path,
                        error: e.to_string(),
                    });
                }
            }
        }
        report
    }

    fn free_name(&self, taken: &Path) -> PathBuf {
        let stem = taken
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = taken.extension().map(|e| e.to_string_lossy().into_owned());
        let mut n = 1u32;
        loop {
            let name = match &ext {
                Some(ext) => format!("{stem} ({n}).{ext}"),
                None => format!("{stem} ({n})"),
            };
            let candidate = self.dir.join(name);
            if !candidate.exists() {
                return candidate;
            }
            n += 1;
        }
    }
}

fn same_file(a: &Path, b: &Path) -> Result<bool> {
    let a = std::fs::canonicalize(a).map_err(|e| Error::staging(a, e))?;
    let b = std::fs::canonicalize(b).map_err(|e| Error::staging(b, e))?;
    Ok(a == b)
}

fn remove_entry(path: &Path) -> std::io::Result<()> {
    // symlink_metadata so a link to a directory is unlinked, not followed
    let meta = std::fs::symlink_metadata(path)?;
    if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}
