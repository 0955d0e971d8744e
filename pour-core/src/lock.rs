// pour-core/src/lock.rs
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use pour_common::error::{PourError, Result};
use tracing::{debug, warn};

/// Exclusive claim on one formula+version, held for the duration of an
/// install. The installer itself never locks; callers that may run
/// concurrently take this first.
///
/// The claim is an advisory `flock` on `<lock_dir>/<name>-<version>.lock`.
/// The kernel drops it when the last handle closes, process death included.
/// The file itself stays on disk.
#[derive(Debug)]
pub struct InstallLock {
    path: PathBuf,
    _file: File,
}

impl InstallLock {
    pub fn acquire(lock_dir: &Path, name: &str, version: &str) -> Result<Self> {
        fs::create_dir_all(lock_dir)?;
        let key = format!("{name}-{version}");
        let path = lock_dir.join(format!("{key}.lock"));
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        match try_lock_exclusive(&file) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                debug!("Install lock {} is held elsewhere", path.display());
                return Err(PourError::Locked(key));
            }
            Err(e) => return Err(e.into()),
        }

        // Holder pid, for humans only; the flock is the lock.
        if let Err(e) = file.set_len(0).and_then(|_| writeln!(file, "{}", std::process::id())) {
            warn!("Failed to record pid in {}: {}", path.display(), e);
        }
        debug!("Acquired install lock {}", path.display());
        Ok(Self { path, _file: file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> io::Result<()> {
    use std::os::unix::io::AsFd;

    use rustix::fs::{flock, FlockOperation};

    flock(file.as_fd(), FlockOperation::NonBlockingLockExclusive)
        .map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(not(unix))]
fn try_lock_exclusive(_file: &File) -> io::Result<()> {
    warn!("Install locks are not enforced on this platform");
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let lock = InstallLock::acquire(dir.path(), "butterfly", "3.2.7").unwrap();
        assert!(lock.path().ends_with("butterfly-3.2.7.lock"));

        let err = InstallLock::acquire(dir.path(), "butterfly", "3.2.7").unwrap_err();
        assert!(matches!(err, PourError::Locked(ref key) if key == "butterfly-3.2.7"));

        // Different versions do not contend.
        let other = InstallLock::acquire(dir.path(), "butterfly", "3.3.0").unwrap();

        drop(lock);
        InstallLock::acquire(dir.path(), "butterfly", "3.2.7").unwrap();
        drop(other);
    }

    #[test]
    fn closing_the_handle_releases_the_lock() {
        let dir = tempfile::tempdir().unwrap();
        let lock = InstallLock::acquire(dir.path(), "butterfly", "3.2.7").unwrap();
        // What process death does: the handle closes, nothing else runs.
        let InstallLock { path, _file: file } = lock;
        drop(file);

        assert!(path.exists());
        let again = InstallLock::acquire(dir.path(), "butterfly", "3.2.7").unwrap();
        assert_eq!(again.path(), path.as_path());
    }

    #[test]
    fn leftover_lock_file_from_a_dead_process_does_not_block() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("butterfly-3.2.7.lock"), "99999\n").unwrap();

        let lock = InstallLock::acquire(dir.path(), "butterfly", "3.2.7").unwrap();
        assert_eq!(
            fs::read_to_string(lock.path()).unwrap(),
            format!("{}\n", std::process::id())
        );
    }
}
