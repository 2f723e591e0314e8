//! Files Storage
//!
//! One file per entry inside a cache directory. Writers take a non-blocking
//! exclusive lock; a writer that loses the race drops its write.

use std::fs::{self, OpenOptions, TryLockError};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::cache::Packet;
use crate::config::StorageType;
use crate::error::{CacheError, Result};
use crate::storage::{key, Storage};

// == Files Storage ==
/// Directory-backed storage.
#[derive(Debug, Clone)]
pub struct FilesStorage {
    dir: PathBuf,
}

impl FilesStorage {
    // == Constructor ==
    /// Opens the storage over an existing, writable directory.
    ///
    /// # Arguments
    /// * `dir` - The cache directory; it is never created here
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let metadata = fs::metadata(&dir).map_err(|e| {
            CacheError::Connect(format!("cache dir {} not accessible: {}", dir.display(), e))
        })?;

        if !metadata.is_dir() {
            return Err(CacheError::Connect(format!(
                "cache dir {} is not a directory",
                dir.display()
            )));
        }
        if metadata.permissions().readonly() {
            return Err(CacheError::Connect(format!(
                "cache dir {} is not writable",
                dir.display()
            )));
        }

        info!("files storage opened at {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path of the file holding `key`.
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        Ok(self.dir.join(key::location(key)?.as_ref()))
    }

    fn read_packet(path: &Path) -> Result<Packet> {
        let bytes = fs::read(path)
            .map_err(|e| CacheError::BadPacket(format!("{} not readable: {}", path.display(), e)))?;
        Packet::decode(&bytes)
    }

    /// Writes `packet` under an exclusive lock.
    ///
    /// Returns `Ok(false)` when another writer holds the lock.
    fn write_locked(path: &Path, packet: &Packet) -> Result<bool> {
        // Truncation waits until the lock is held.
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => return Ok(false),
            Err(TryLockError::Error(e)) => return Err(e.into()),
        }

        file.set_len(0)?;
        file.write_all(packet.encode().as_bytes())?;
        file.flush()?;
        file.unlock()?;
        Ok(true)
    }

    /// Cache files in the directory, skipping dot-files and non-files.
    fn entries(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                paths.push(entry.path());
            }
        }
        Ok(paths)
    }

    fn remove(path: &Path) {
        if let Err(e) = fs::remove_file(path) {
            warn!("files storage: failed to remove {}: {}", path.display(), e);
        }
    }
}

impl Storage for FilesStorage {
    fn kind(&self) -> StorageType {
        StorageType::Files
    }

    fn get_packet(&mut self, key: &str) -> Result<Packet> {
        Self::read_packet(&self.path_for(key)?)
    }

    // == Set ==
    fn set(&mut self, key: &str, value: &str, lifetime: i64, savetime: i64) -> bool {
        let path = match self.path_for(key) {
            Ok(path) => path,
            Err(e) => {
                warn!("files storage: {}", e);
                return false;
            }
        };

        match Self::write_locked(&path, &Packet::new(value, lifetime, savetime)) {
            Ok(true) => true,
            Ok(false) => {
                debug!("files storage: {} locked by another writer", path.display());
                false
            }
            Err(e) => {
                warn!("files storage: write to {} failed: {}", path.display(), e);
                false
            }
        }
    }

    fn delete(&mut self, key: &str) -> bool {
        let path = match self.path_for(key) {
            Ok(path) => path,
            Err(_) => return false,
        };

        match fs::remove_file(&path) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => {
                warn!("files storage: failed to remove {}: {}", path.display(), e);
                false
            }
        }
    }

    // == Delete Outdated ==
    /// Removes outdated files and any file that does not decode.
    fn delete_outdated(&mut self) -> bool {
        let paths = match self.entries() {
            Ok(paths) => paths,
            Err(e) => {
                warn!("files storage: cannot scan {}: {}", self.dir.display(), e);
                return false;
            }
        };

        let mut removed = 0usize;
        for path in paths {
            let stale = match Self::read_packet(&path) {
                Ok(packet) => packet.outdated(),
                Err(_) => true,
            };
            if stale {
                Self::remove(&path);
                removed += 1;
            }
        }

        debug!("files storage: removed {} outdated entries", removed);
        true
    }

    fn clear(&mut self) -> bool {
        match self.entries() {
            Ok(paths) => {
                paths.iter().for_each(|path| Self::remove(path));
                true
            }
            Err(e) => {
                warn!("files storage: cannot scan {}: {}", self.dir.display(), e);
                false
            }
        }
    }
}
