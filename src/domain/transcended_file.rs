//! Transcended files.
//!
//! A transcended file lives on durable (shared, slow) storage but is worked on through a copy in
//! a local scratch directory. The copy is staged in when the file is entered, staged out when the
//! guard is finished, and removed exactly once on every exit path.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::{Error, Result};

/// What happens when a transcended source does not exist at stage-in or stage-out time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagingPolicy {
    /// Log an error and skip the copy.
    #[default]
    Lenient,
    /// Fail with `Error::Staging`.
    Strict,
}

/// Direction of a transcended file relative to the operation that uses it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    /// Copy remote to local on enter; copy back on finish only if `return_file` is set.
    From { return_file: bool },
    /// Nothing on enter; copy local to remote on finish.
    To,
    /// `From` if the remote file already exists when the transcended file is created, `To` otherwise.
    ToOrFrom { return_file: bool },
}

#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Fixed local directory. If unset, every transcended file gets its own temporary directory
    /// below `scratch_root`.
    pub tmp_dir: Option<PathBuf>,
    /// Parent of the temporary directories; defaults to [`default_scratch_root`].
    pub scratch_root: Option<PathBuf>,
    /// If set, the local path mirrors the remote path below this base instead of using the file name.
    pub base_dir: Option<PathBuf>,
    pub overwrite: bool,
    pub do_nothing: bool,
    pub policy: StagingPolicy,
}

impl Default for TransferOptions {
    fn default() -> Self {
        TransferOptions { tmp_dir: None, scratch_root: None, base_dir: None, overwrite: true, do_nothing: false, policy: StagingPolicy::Lenient }
    }
}

impl TransferOptions {
    pub fn with_scratch_root(scratch_root: impl Into<PathBuf>) -> Self {
        TransferOptions { scratch_root: Some(scratch_root.into()), ..Default::default() }
    }

    pub fn with_policy(mut self, policy: StagingPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Scratch location of this process.
///
/// `$SCRATCHDIR` if set, otherwise `/scratch/$USER` when `/scratch` exists, otherwise
/// `$HOME/scratch`. The process id is appended so concurrent stages on one host never share a
/// directory. The directory is created, and removed again once its last transcended file is
/// cleaned up.
pub fn default_scratch_root() -> Result<PathBuf> {
    let base = match std::env::var_os("SCRATCHDIR") {
        Some(dir) => PathBuf::from(dir),
        None if Path::new("/scratch").exists() => {
            let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
            Path::new("/scratch").join(user)
        }
        None => {
            let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(std::env::temp_dir);
            home.join("scratch")
        }
    };

    let dir = base.join(std::process::id().to_string());
    fs::create_dir_all(&dir)?;

    Ok(dir)
}

#[derive(Debug)]
pub struct TranscendedFile {
    remote: PathBuf,
    local: PathBuf,
    transfer: Transfer,
    options: TransferOptions,
    temp_dir: Option<TempDir>,
    /// Per-process scratch directory to prune after cleanup, set when it was resolved here.
    process_scratch: Option<PathBuf>,
    cleaned: bool,
}

impl TranscendedFile {
    pub fn new(remote: impl Into<PathBuf>, transfer: Transfer, options: TransferOptions) -> Result<Self> {
        let remote = remote.into();

        let transfer = match transfer {
            Transfer::ToOrFrom { return_file } if remote.exists() => Transfer::From { return_file },
            Transfer::ToOrFrom { .. } => Transfer::To,
            other => other,
        };

        let mut process_scratch = None;
        let (local_dir, temp_dir) = if options.do_nothing {
            (PathBuf::new(), None)
        } else if let Some(tmp_dir) = &options.tmp_dir {
            (tmp_dir.clone(), None)
        } else {
            let scratch_root = match &options.scratch_root {
                Some(root) => {
                    fs::create_dir_all(root)?;
                    root.clone()
                }
                None => {
                    let root = default_scratch_root()?;
                    process_scratch = Some(root.clone());
                    root
                }
            };
            let temp_dir = tempfile::Builder::new().prefix("tfile").tempdir_in(scratch_root)?;
            (temp_dir.path().to_path_buf(), Some(temp_dir))
        };

        let local = if options.do_nothing {
            remote.clone()
        } else {
            match options.base_dir.as_ref().and_then(|base| remote.strip_prefix(base).ok()) {
                Some(relative) => local_dir.join(relative),
                None => local_dir.join(remote.file_name().unwrap_or(remote.as_os_str())),
            }
        };

        Ok(TranscendedFile { remote, local, transfer, options, temp_dir, process_scratch, cleaned: false })
    }

    /// Read-only input with default options below `scratch_root`.
    pub fn from_remote(remote: impl Into<PathBuf>, options: TransferOptions) -> Result<Self> {
        TranscendedFile::new(remote, Transfer::From { return_file: false }, options)
    }

    /// Output with default options below `scratch_root`.
    pub fn to_remote(remote: impl Into<PathBuf>, options: TransferOptions) -> Result<Self> {
        TranscendedFile::new(remote, Transfer::To, options)
    }

    pub fn remote_path(&self) -> &Path {
        &self.remote
    }

    /// Path the enclosed operation reads or writes. Equals the remote path in do-nothing mode.
    pub fn local_path(&self) -> &Path {
        &self.local
    }

    pub fn transfer(&self) -> Transfer {
        self.transfer
    }

    /// Copies the remote file or directory to the local path.
    pub fn stage_in(&self) -> Result<()> {
        if self.options.do_nothing {
            return Ok(());
        }

        if !self.remote.exists() {
            return self.missing(&self.remote);
        }

        if let Some(parent) = self.local.parent() {
            fs::create_dir_all(parent)?;
        }

        if self.remote.is_dir() {
            log::debug!("Copying from directory '{}' to '{}'", self.remote.display(), self.local.display());
            copy_dir_all(&self.remote, &self.local)?;
        } else {
            log::debug!("Copying from file '{}' to '{}'", self.remote.display(), self.local.display());
            fs::copy(&self.remote, &self.local)?;
        }

        Ok(())
    }

    /// Replaces the remote file or directory with the local copy.
    pub fn stage_out(&self) -> Result<()> {
        if self.options.do_nothing {
            return Ok(());
        }

        if self.remote.exists() && !self.options.overwrite {
            log::debug!("'{}' already exists and will not be overwritten", self.remote.display());
            return Ok(());
        }

        if !self.local.exists() {
            return self.missing(&self.local);
        }

        if let Some(parent) = self.remote.parent() {
            fs::create_dir_all(parent)?;
        }

        if self.remote.is_dir() {
            log::debug!("Removing existing directory '{}'", self.remote.display());
            fs::remove_dir_all(&self.remote)?;
        } else if self.remote.exists() {
            log::debug!("Removing existing file '{}'", self.remote.display());
            fs::remove_file(&self.remote)?;
        }

        if self.local.is_dir() {
            log::debug!("Copying to directory '{}' from '{}'", self.remote.display(), self.local.display());
            copy_dir_all(&self.local, &self.remote)?;
        } else {
            log::debug!("Copying to file '{}' from '{}'", self.remote.display(), self.local.display());
            fs::copy(&self.local, &self.remote)?;
        }

        Ok(())
    }

    /// Removes the local copy. Only the first call does anything.
    pub fn cleanup(&mut self) -> Result<()> {
        if self.cleaned || self.options.do_nothing {
            self.cleaned = true;
            return Ok(());
        }
        self.cleaned = true;

        if let Some(temp_dir) = self.temp_dir.take() {
            log::debug!("Removing scratch directory '{}'", temp_dir.path().display());
            temp_dir.close()?;
            // Fails while other transcended files of this process still live below it.
            if let Some(dir) = &self.process_scratch {
                if fs::remove_dir(dir).is_ok() {
                    log::debug!("Removed process scratch directory '{}'", dir.display());
                }
            }
        } else if self.local.is_dir() {
            log::debug!("Removing directory '{}'", self.local.display());
            fs::remove_dir_all(&self.local)?;
        } else if self.local.exists() {
            log::debug!("Removing file '{}'", self.local.display());
            fs::remove_file(&self.local)?;
        }

        Ok(())
    }

    pub fn is_cleaned(&self) -> bool {
        self.cleaned
    }

    /// Stages in (for `From`) and returns the guard that owns the rest of the lifecycle.
    pub fn enter(mut self) -> Result<TransferGuard> {
        if let Transfer::From { .. } = self.transfer {
            if let Err(e) = self.stage_in() {
                if let Err(cleanup_err) = self.cleanup() {
                    log::error!("Failed to clean up '{}': {}", self.local.display(), cleanup_err);
                }
                return Err(e);
            }
        }

        Ok(TransferGuard { file: self, released: false })
    }

    fn stages_out_on_finish(&self) -> bool {
        match self.transfer {
            Transfer::From { return_file } | Transfer::ToOrFrom { return_file } => return_file,
            Transfer::To => true,
        }
    }

    fn missing(&self, path: &Path) -> Result<()> {
        match self.options.policy {
            StagingPolicy::Lenient => {
                log::error!("The file '{}' does not exist", path.display());
                Ok(())
            }
            StagingPolicy::Strict => Err(Error::Staging(path.to_path_buf())),
        }
    }
}

/// Scope of an entered transcended file.
///
/// [`TransferGuard::finish`] stages out and cleans up. Dropping the guard without finishing it
/// (an error path) only cleans up, so a failed operation never publishes partial output.
#[derive(Debug)]
pub struct TransferGuard {
    file: TranscendedFile,
    released: bool,
}

impl TransferGuard {
    pub fn local_path(&self) -> &Path {
        self.file.local_path()
    }

    pub fn remote_path(&self) -> &Path {
        self.file.remote_path()
    }

    /// Stages out if the direction requires it, then cleans up. Cleanup runs even if the
    /// stage-out fails; the first error is returned.
    pub fn finish(mut self) -> Result<()> {
        self.released = true;

        let staged = if self.file.stages_out_on_finish() { self.file.stage_out() } else { Ok(()) };
        let cleaned = self.file.cleanup();

        staged.and(cleaned)
    }
}

impl Drop for TransferGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Err(e) = self.file.cleanup() {
            log::error!("Failed to clean up '{}': {}", self.file.local_path().display(), e);
        }
    }
}

/// Several transcended files entered as one scope.
///
/// Members are entered in order and released in reverse order, on success and on every error
/// path, including a failure while entering a later member.
#[derive(Debug, Default)]
pub struct TransferSet {
    guards: Vec<TransferGuard>,
}

impl TransferSet {
    pub fn enter(files: impl IntoIterator<Item = TranscendedFile>) -> Result<Self> {
        let mut set = TransferSet::default();
        for file in files {
            set.guards.push(file.enter()?);
        }
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    pub fn local_paths(&self) -> impl Iterator<Item = &Path> {
        self.guards.iter().map(TransferGuard::local_path)
    }

    /// Finishes every member in reverse order. All members are released even if one of them
    /// fails; the first error is returned.
    pub fn finish(mut self) -> Result<()> {
        let mut first_error = None;
        while let Some(guard) = self.guards.pop() {
            if let Err(e) = guard.finish() {
                log::error!("Failed to release transcended file: {}", e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for TransferSet {
    fn drop(&mut self) {
        while let Some(guard) = self.guards.pop() {
            drop(guard);
        }
    }
}

fn copy_dir_all(source: &Path, destination: &Path) -> std::io::Result<()> {
    fs::create_dir_all(destination)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let target = destination.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}
