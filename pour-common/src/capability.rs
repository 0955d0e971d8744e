// pour-common/src/capability.rs
//! Services the installer consumes but does not implement itself.
//!
//! Every trait is object safe so an [`Environment`] can mix real
//! implementations with in-process fakes in tests.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use semver::Version;
use tempfile::TempDir;

use crate::error::Result;

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Downloads the full body behind `url`.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

pub trait ChecksumVerifier: Send + Sync {
    /// Lowercase hex digest of `bytes`.
    fn digest(&self, bytes: &[u8]) -> String;
}

/// Outcome of replacing whatever sat at a link path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkReplacement {
    Created,
    /// An identical link was already there.
    Unchanged,
    /// Something else was there and has been replaced.
    Replaced { previous: PathBuf },
}

pub trait Filesystem: Send + Sync {
    fn exists(&self, path: &Path) -> bool;
    fn create_dir_all(&self, path: &Path) -> Result<()>;
    fn read_to_string(&self, path: &Path) -> Result<String>;
    fn write(&self, path: &Path, content: &[u8]) -> Result<()>;
    /// Replaces `path` atomically, keeping its permission bits.
    fn write_atomic(&self, path: &Path, content: &[u8]) -> Result<()>;
    /// Copies a file or directory tree, keeping permission bits and symlinks.
    fn copy_path(&self, source: &Path, destination: &Path) -> Result<()>;
    /// Points `link` at `target`, replacing an existing file or link.
    fn force_symlink(&self, target: &Path, link: &Path) -> Result<LinkReplacement>;
    /// A temporary directory under `parent`, removed when dropped.
    fn scoped_temp_dir(&self, parent: &Path) -> Result<TempDir>;
}

#[async_trait]
pub trait DependencyRegistry: Send + Sync {
    async fn installed_version(&self, name: &str) -> Result<Option<Version>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, command: &str, args: &[String]) -> Result<CommandOutput>;
}

/// The capability bundle handed to the installer.
#[derive(Clone)]
pub struct Environment {
    pub fetcher: Arc<dyn Fetcher>,
    pub verifier: Arc<dyn ChecksumVerifier>,
    pub filesystem: Arc<dyn Filesystem>,
    pub registry: Arc<dyn DependencyRegistry>,
    pub runner: Arc<dyn ProcessRunner>,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment").finish_non_exhaustive()
    }
}
