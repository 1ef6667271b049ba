//! Scoped lock files.
//!
//! A lock is the exclusive creation of a `.lock` sibling; contention is
//! an immediate [`record::Error::Lock`], never a blocking wait. Guards
//! release on every exit path: dropping an uncommitted guard unlinks the
//! lock file, while `commit` consumes the guard by renaming the lock
//! file over its target (the manifest swap). Stale locks left by dead
//! processes are an operator's call to remove; this code never breaks
//! another holder's lock.

use record::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::apply_mode;

pub(crate) struct Lockfile {
    path: PathBuf,
    file: Option<File>,
    defused: bool,
}

impl Lockfile {
    /// Takes the lock for `target` by exclusively creating
    /// `<target>.lock`.
    pub fn acquire(target: &Path) -> Result<Self> {
        let path = lock_path(target);
        match OpenOptions::new().create_new(true).write(true).open(&path) {
            Ok(file) => Ok(Self {
                path,
                file: Some(file),
                defused: false,
            }),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Err(Error::Lock),
            Err(err) => Err(err.into()),
        }
    }

    /// Writes and fsyncs the body that `commit` will rename into place.
    pub fn write_body(&mut self, body: &[u8]) -> Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.write_all(body)?;
            file.sync_all()?;
        }
        Ok(())
    }

    /// Replaces `target` with the lock file via atomic rename, which
    /// releases the lock implicitly. On failure the lock file stays in
    /// place so an operator can inspect what was about to be committed.
    pub fn commit(mut self, target: &Path, mode: Option<u32>) -> Result<()> {
        self.file = None; // close before rename
        self.defused = true;
        apply_mode(&self.path, mode)?;
        std::fs::rename(&self.path, target)?;
        Ok(())
    }
}

impl Drop for Lockfile {
    fn drop(&mut self) {
        if !self.defused {
            self.file = None;
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// `<target>.lock`, next to the target.
fn lock_path(target: &Path) -> PathBuf {
    let mut os = target.as_os_str().to_os_string();
    os.push(".lock");
    PathBuf::from(os)
}
