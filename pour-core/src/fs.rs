// pour-core/src/fs.rs
//! Local filesystem implementation of the [`Filesystem`] capability.

use std::fs::{self, Permissions};
use std::io::{self, Write};
#[cfg(unix)]
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::Path;
use std::sync::Arc;

use pour_common::capability::{Filesystem, LinkReplacement};
use pour_common::error::{PourError, Result};
use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, error, warn};
use walkdir::WalkDir;

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFilesystem;

fn io_context(e: io::Error, what: String) -> PourError {
    PourError::Io(Arc::new(io::Error::new(e.kind(), format!("{what}: {e}"))))
}

impl Filesystem for LocalFilesystem {
    fn exists(&self, path: &Path) -> bool {
        path.symlink_metadata().is_ok()
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        debug!("Creating directory recursively: {}", path.display());
        fs::create_dir_all(path).map_err(|e| {
            error!("Failed create dir {}: {}", path.display(), e);
            io_context(e, format!("Failed to create directory {}", path.display()))
        })
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        debug!("Reading file to string: {}", path.display());
        fs::read_to_string(path)
            .map_err(|e| io_context(e, format!("Failed to read {}", path.display())))
    }

    fn write(&self, path: &Path, content: &[u8]) -> Result<()> {
        debug!("Writing {} bytes to {}", content.len(), path.display());
        fs::write(path, content)
            .map_err(|e| io_context(e, format!("Failed to write {}", path.display())))
    }

    fn write_atomic(&self, original_path: &Path, content: &[u8]) -> Result<()> {
        let dir = original_path.parent().ok_or_else(|| {
            PourError::Generic(format!(
                "Cannot get parent directory for {}",
                original_path.display()
            ))
        })?;
        self.create_dir_all(dir)?;

        let original_perms = fs::metadata(original_path).map(|m| m.permissions()).ok();

        let mut temp_file = NamedTempFile::new_in(dir)?;
        debug!(
            "Atomically writing {} bytes to {} via temp file {}",
            content.len(),
            original_path.display(),
            temp_file.path().display()
        );
        temp_file.write_all(content)?;
        temp_file.flush()?;
        temp_file.as_file().sync_all()?;

        temp_file.persist(original_path).map_err(|e| {
            error!(
                "Failed to persist temporary file over {}: {}",
                original_path.display(),
                e.error
            );
            PourError::Io(Arc::new(e.error))
        })?;

        // NamedTempFile is created 0600; restore what the file had before.
        if let Some(perms) = original_perms.or_else(default_file_permissions) {
            if let Err(e) = fs::set_permissions(original_path, perms) {
                warn!(
                    "Failed to restore permissions on {}: {}",
                    original_path.display(),
                    e
                );
            }
        }
        Ok(())
    }

    fn copy_path(&self, source: &Path, destination: &Path) -> Result<()> {
        debug!("Copying {} -> {}", source.display(), destination.display());
        let meta = fs::symlink_metadata(source)
            .map_err(|e| io_context(e, format!("Failed to stat {}", source.display())))?;

        if meta.is_dir() {
            self.create_dir_all(destination)?;
            for entry in WalkDir::new(source).min_depth(1) {
                let entry = entry.map_err(|e| {
                    PourError::Generic(format!("Failed to walk {}: {}", source.display(), e))
                })?;
                let relative = entry.path().strip_prefix(source).map_err(|e| {
                    PourError::Generic(format!("Unexpected path {}: {}", entry.path().display(), e))
                })?;
                let target = destination.join(relative);
                let file_type = entry.file_type();
                if file_type.is_dir() {
                    self.create_dir_all(&target)?;
                } else if file_type.is_symlink() {
                    copy_symlink(entry.path(), &target)?;
                } else {
                    copy_file(entry.path(), &target)?;
                }
            }
            Ok(())
        } else if meta.file_type().is_symlink() {
            copy_symlink(source, destination)
        } else {
            copy_file(source, destination)
        }
    }

    #[cfg(unix)]
    fn force_symlink(&self, target: &Path, link: &Path) -> Result<LinkReplacement> {
        let outcome = match fs::symlink_metadata(link) {
            Ok(meta) if meta.file_type().is_symlink() => {
                let previous = fs::read_link(link)?;
                if previous == target {
                    debug!("Link {} already points at {}", link.display(), target.display());
                    return Ok(LinkReplacement::Unchanged);
                }
                fs::remove_file(link)?;
                LinkReplacement::Replaced { previous }
            }
            Ok(meta) if meta.is_dir() => return Err(PourError::LinkConflict(link.to_path_buf())),
            Ok(_) => {
                fs::remove_file(link)?;
                LinkReplacement::Replaced {
                    previous: link.to_path_buf(),
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => LinkReplacement::Created,
            Err(e) => return Err(io_context(e, format!("Failed to stat {}", link.display()))),
        };

        debug!("Creating symlink {} -> {}", link.display(), target.display());
        symlink(target, link).map_err(|e| {
            error!(
                "Failed create symlink {} -> {}: {}",
                link.display(),
                target.display(),
                e
            );
            io_context(e, format!("Failed to link {}", link.display()))
        })?;
        Ok(outcome)
    }

    #[cfg(not(unix))]
    fn force_symlink(&self, target: &Path, link: &Path) -> Result<LinkReplacement> {
        warn!(
            "Symlink creation not supported on this platform: {} -> {}",
            link.display(),
            target.display()
        );
        Err(PourError::Generic(
            "Symlinks not supported on this platform".to_string(),
        ))
    }

    fn scoped_temp_dir(&self, parent: &Path) -> Result<TempDir> {
        let dir = tempfile::Builder::new()
            .prefix("pour-")
            .tempdir_in(parent)
            .map_err(|e| {
                io_context(e, format!("Failed to create temp dir in {}", parent.display()))
            })?;
        debug!("Created scoped temp dir {}", dir.path().display());
        Ok(dir)
    }
}

#[cfg(unix)]
fn default_file_permissions() -> Option<Permissions> {
    Some(Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn default_file_permissions() -> Option<Permissions> {
    None
}

/// `fs::copy` carries the permission bits over with the content.
fn copy_file(source: &Path, destination: &Path) -> Result<()> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    if let Ok(meta) = fs::symlink_metadata(destination) {
        if meta.is_dir() {
            return Err(PourError::Generic(format!(
                "Cannot copy {} over directory {}",
                source.display(),
                destination.display()
            )));
        }
        // Replacing rather than truncating keeps read-only files and links safe.
        fs::remove_file(destination)?;
    }
    fs::copy(source, destination).map_err(|e| {
        io_context(
            e,
            format!("Failed to copy {} to {}", source.display(), destination.display()),
        )
    })?;
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(source: &Path, destination: &Path) -> Result<()> {
    let link_target = fs::read_link(source)?;
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    if fs::symlink_metadata(destination).is_ok() {
        fs::remove_file(destination)?;
    }
    symlink(&link_target, destination)
        .map_err(|e| io_context(e, format!("Failed to link {}", destination.display())))
}

#[cfg(not(unix))]
fn copy_symlink(source: &Path, destination: &Path) -> Result<()> {
    copy_file(source, destination)
}
