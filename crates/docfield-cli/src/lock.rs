//! Intake folder lock, so two orchestrators never work the same folder.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Lock file name inside the intake folder.
pub const LOCK_FILE: &str = ".docfield.lock";

/// Held lock; the file is removed on drop while it still carries our token.
#[derive(Debug)]
pub struct IntakeLock {
    path: PathBuf,
    token: String,
}

impl IntakeLock {
    /// Try to take the lock on `dir`.
    ///
    /// Returns `None` when another live process holds it. A lock file older
    /// than `stale_after` is considered abandoned and replaced.
    pub fn acquire(dir: &Path, stale_after: Duration) -> anyhow::Result<Option<Self>> {
        let path = dir.join(LOCK_FILE);

        if let Some(age) = lock_age(&path) {
            if age < stale_after {
                debug!("Lock {} is held ({}s old)", path.display(), age.as_secs());
                return Ok(None);
            }
            warn!("Removing stale lock {} ({} min old)", path.display(), age.as_secs() / 60);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let token = format!("{}-{}", std::process::id(), Uuid::new_v4());
        writeln!(file, "pid={}", std::process::id())?;
        writeln!(file, "token={}", token)?;
        writeln!(file, "acquired_at={}", Utc::now().to_rfc3339())?;

        debug!("Acquired lock {}", path.display());
        Ok(Some(Self { path, token }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the lock file still carries this holder's token.
    pub fn is_owned(&self) -> bool {
        match fs::read_to_string(&self.path) {
            Ok(content) => content
                .lines()
                .any(|line| line.strip_prefix("token=") == Some(self.token.as_str())),
            Err(_) => false,
        }
    }

    /// Bump the lock's modification time so a long batch never looks stale.
    ///
    /// Returns `false` when the lock was taken over by another process.
    pub fn refresh(&self) -> anyhow::Result<bool> {
        if !self.is_owned() {
            warn!("Lock {} is no longer ours", self.path.display());
            return Ok(false);
        }

        OpenOptions::new()
            .write(true)
            .open(&self.path)?
            .set_modified(SystemTime::now())?;
        Ok(true)
    }
}

impl Drop for IntakeLock {
    fn drop(&mut self) {
        if !self.is_owned() {
            warn!("Lock {} was taken over, leaving it in place", self.path.display());
            return;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to release lock {}: {}", self.path.display(), e);
        }
    }
}

fn lock_age(path: &Path) -> Option<Duration> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    // A clock step backwards counts as fresh
    Some(SystemTime::now().duration_since(modified).unwrap_or_default())
}
