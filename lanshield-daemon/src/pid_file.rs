//! PID file guard.
//!
//! Prevents two daemon instances from running against the same PID file.
//! The file is removed when the guard is dropped.
//!
//! # Security
//!
//! - `create_new(true)` makes creation atomic (no TOCTOU window)
//! - the created path must be a regular file (rejects symlink tricks)
//! - parent directory is created `0o700`, the file itself `0o600`

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;

#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Create `path` and write the current process id into it.
    ///
    /// # Errors
    ///
    /// Fails if the file already exists, is not a regular file, or cannot be
    /// written.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_private_dir(parent)?;
        }

        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let existing = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_owned());
                anyhow::bail!(
                    "PID file {} already exists with PID: {}. Is another instance running?",
                    path.display(),
                    existing.trim()
                );
            }
            Err(e) => return Err(e.into()),
        };

        if !fs::symlink_metadata(path)?.file_type().is_file() {
            let _ = fs::remove_file(path);
            anyhow::bail!(
                "PID file {} is not a regular file (possible symlink attack)",
                path.display()
            );
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))?;
        }

        let pid = std::process::id();
        writeln!(file, "{pid}")?;
        tracing::info!(pid, path = %path.display(), "PID file written");

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::info!(path = %self.path.display(), "PID file removed"),
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to remove PID file"
            ),
        }
    }
}

fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        fs::DirBuilder::new().mode(0o700).recursive(true).create(dir)
    }
    #[cfg(not(unix))]
    {
        fs::create_dir_all(dir)
    }
}
