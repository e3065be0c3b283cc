//! Crash-safe file replacement
//!
//! 1. Write to a temporary file next to the target
//! 2. `sync_all()` the temporary file
//! 3. Rename it over the target
//! 4. Fsync the parent directory (Unix only)

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

const TEMP_SUFFIX: &str = ".tmp";

/// Temporary path for `path`, hidden and in the same directory
fn temp_path(path: &Path) -> io::Result<PathBuf> {
    let parent = parent_dir(path)?;
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    Ok(parent.join(format!(".{file_name}{TEMP_SUFFIX}")))
}

fn parent_dir(path: &Path) -> io::Result<&Path> {
    path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("path has no parent directory: {}", path.display()),
        )
    })
}

/// Fsync a directory so a completed rename survives a crash
#[cfg(unix)]
pub(crate) fn sync_dir(path: &Path) -> io::Result<()> {
    File::open(path)?.sync_all()
}

#[cfg(not(unix))]
pub(crate) fn sync_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Replace `path` with `data` atomically and durably
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = AtomicFile::create(path)?;
    file.write_all(data)?;
    file.commit()
}

/// Remove temporary files left behind by an interrupted write
pub(crate) fn remove_stale_temp_files(dir: &Path) -> io::Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') && name.ends_with(TEMP_SUFFIX) {
            fs::remove_file(entry.path())?;
            debug!(file = %name, "removed stale temporary file");
            removed += 1;
        }
    }
    Ok(removed)
}

/// A file that replaces its target only when committed
///
/// Dropping an uncommitted `AtomicFile` removes the temporary file and
/// leaves the target untouched.
pub(crate) struct AtomicFile {
    file: Option<File>,
    temp_path: PathBuf,
    final_path: PathBuf,
    committed: bool,
}

impl AtomicFile {
    pub(crate) fn create(path: &Path) -> io::Result<Self> {
        let final_path = path.to_path_buf();
        let temp_path = temp_path(&final_path)?;
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;

        Ok(Self {
            file: Some(file),
            temp_path,
            final_path,
            committed: false,
        })
    }

    /// Extend or shrink the temporary file; new bytes read as zero
    pub(crate) fn set_len(&self, size: u64) -> io::Result<()> {
        match &self.file {
            Some(file) => file.set_len(size),
            None => Err(closed()),
        }
    }

    /// Sync, rename over the target and sync the directory
    pub(crate) fn commit(mut self) -> io::Result<()> {
        if let Some(file) = self.file.take() {
            file.sync_all()?;
        }

        fs::rename(&self.temp_path, &self.final_path)?;
        self.committed = true;

        sync_dir(parent_dir(&self.final_path)?)
    }
}

impl Write for AtomicFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.file {
            Some(file) => file.write(buf),
            None => Err(closed()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.file {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for AtomicFile {
    fn drop(&mut self) {
        if !self.committed {
            self.file.take();
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}

fn closed() -> io::Error {
    io::Error::other("atomic file already committed")
}
