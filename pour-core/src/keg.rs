// pour-core/src/keg.rs
use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;
use pour_common::capability::DependencyRegistry;
use pour_common::error::{PourError, Result};
use pour_common::model::manifest::InstalledManifest;
use pour_common::version::parse_lenient;
use semver::Version;
use tracing::{debug, warn};

/// An installed formula version in the cellar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledKeg {
    pub name: String,
    pub version_str: String,
    pub path: PathBuf,
}

impl InstalledKeg {
    pub fn version(&self) -> Option<Version> {
        parse_lenient(&self.version_str).ok()
    }

    /// A keg counts as installed only once its receipt was written.
    pub fn is_complete(&self) -> bool {
        self.path.join(InstalledManifest::RECEIPT_FILE).is_file()
    }
}

/// Answers questions about what is installed under `<cellar>/<name>/<version>`.
#[derive(Debug, Clone)]
pub struct KegRegistry {
    cellar: PathBuf,
}

impl KegRegistry {
    pub fn new(cellar: impl Into<PathBuf>) -> Self {
        Self {
            cellar: cellar.into(),
        }
    }

    /// Every keg in the cellar, sorted by name then version.
    pub fn installed_kegs(&self) -> Result<Vec<InstalledKeg>> {
        if !self.cellar.is_dir() {
            debug!("Cellar {} does not exist yet", self.cellar.display());
            return Ok(Vec::new());
        }
        let mut kegs = Vec::new();
        for formula_entry in fs::read_dir(&self.cellar)? {
            let formula_entry = formula_entry?;
            if !formula_entry.path().is_dir() {
                continue;
            }
            let name = formula_entry.file_name().to_string_lossy().into_owned();
            kegs.extend(self.kegs_for(&name)?);
        }
        kegs.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| compare_versions(&a.version_str, &b.version_str))
        });
        Ok(kegs)
    }

    pub fn kegs_for(&self, name: &str) -> Result<Vec<InstalledKeg>> {
        let formula_dir = self.cellar.join(name);
        if !formula_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut kegs = Vec::new();
        for entry in fs::read_dir(&formula_dir).map_err(|e| {
            PourError::Io(std::sync::Arc::new(std::io::Error::new(
                e.kind(),
                format!("Failed to read {}: {}", formula_dir.display(), e),
            )))
        })? {
            match entry {
                Ok(entry) if entry.path().is_dir() => kegs.push(InstalledKeg {
                    name: name.to_string(),
                    version_str: entry.file_name().to_string_lossy().into_owned(),
                    path: entry.path(),
                }),
                Ok(_) => {}
                Err(e) => warn!(
                    "Error reading an entry in '{}': {}. Skipping entry.",
                    formula_dir.display(),
                    e
                ),
            }
        }
        Ok(kegs)
    }

    /// Highest complete keg; kegs left behind by a failed install are ignored.
    pub fn latest_keg(&self, name: &str) -> Result<Option<InstalledKeg>> {
        Ok(self
            .kegs_for(name)?
            .into_iter()
            .filter(|keg| {
                let complete = keg.is_complete();
                if !complete {
                    debug!("Ignoring incomplete keg {}", keg.path.display());
                }
                complete
            })
            .max_by(|a, b| compare_versions(&a.version_str, &b.version_str)))
    }
}

fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    match (parse_lenient(a), parse_lenient(b)) {
        (Ok(va), Ok(vb)) => va.cmp(&vb).then_with(|| a.cmp(b)),
        _ => a.cmp(b),
    }
}

#[async_trait]
impl DependencyRegistry for KegRegistry {
    async fn installed_version(&self, name: &str) -> Result<Option<Version>> {
        let latest = self.latest_keg(name)?;
        debug!("Latest keg for '{}': {:?}", name, latest.as_ref().map(|k| &k.path));
        Ok(latest.and_then(|keg| keg.version()))
    }
}
