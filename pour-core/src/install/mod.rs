// pour-core/src/install/mod.rs
//! The formula install pipeline: preflight, fetch, verify, extract, run the
//! declared actions, smoke test, receipt.

use std::path::Path;
use std::time::Duration;

use pour_common::config::Config;
use pour_common::error::{PourError, Result};
use pour_common::model::formula::{FormulaDescriptor, RuntimeDependency};
use pour_common::model::manifest::{InstallLayout, InstallWarning, InstalledManifest, TestOutcome};
use pour_common::Environment;
use tracing::{debug, error, info, warn};

pub mod extract;
pub mod smoke;
pub mod steps;

#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Bound on each fetch attempt.
    pub fetch_timeout: Duration,
    pub test_timeout: Duration,
    pub run_test: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self::from(&Config::with_prefix(""))
    }
}

impl From<&Config> for InstallOptions {
    fn from(config: &Config) -> Self {
        Self {
            fetch_timeout: config.fetch_timeout,
            test_timeout: config.test_timeout,
            run_test: true,
        }
    }
}

/// Installs formulas into an explicit [`InstallLayout`] using only the
/// capabilities in its [`Environment`].
///
/// The installer does not serialize concurrent installs of the same
/// formula; callers that need that take an
/// [`InstallLock`](crate::lock::InstallLock) first.
#[derive(Debug, Clone)]
pub struct FormulaInstaller {
    env: Environment,
    options: InstallOptions,
}

impl FormulaInstaller {
    pub fn new(env: Environment, options: InstallOptions) -> Self {
        Self { env, options }
    }

    pub fn options(&self) -> &InstallOptions {
        &self.options
    }

    pub async fn install(
        &self,
        formula: &FormulaDescriptor,
        layout: &InstallLayout,
    ) -> Result<InstalledManifest> {
        info!(
            "Installing {} {} into {}",
            formula.name(),
            layout.version,
            layout.keg.display()
        );

        if let Some(dependency) = &formula.dependency {
            self.check_dependency(dependency).await?;
        }

        let fs = self.env.filesystem.as_ref();
        fs.create_dir_all(&layout.scratch_dir)?;
        // Removed on drop, whichever way this function returns.
        let scope = fs.scoped_temp_dir(&layout.scratch_dir)?;

        let (url, bytes) = self.fetch_artifact(formula).await?;
        self.verify(formula, url, &bytes)?;

        let artifact_path = scope.path().join(artifact_file_name(url, formula.name()));
        fs.write(&artifact_path, &bytes)?;
        drop(bytes);
        let staging_root = extract::stage_artifact(&artifact_path, &scope.path().join("stage"))?;
        debug!("Staging root is {}", staging_root.display());

        fs.create_dir_all(&layout.keg)?;
        let report = steps::run_actions(fs, &formula.install, &staging_root, layout)?;
        let mut warnings = report.warnings;

        let test = match (&formula.test, self.options.run_test) {
            (Some(test), true) => {
                smoke::run_smoke_test(
                    self.env.runner.as_ref(),
                    test,
                    layout,
                    self.options.test_timeout,
                )
                .await
            }
            (Some(_), false) => {
                debug!("Smoke test for {} skipped on request", formula.name());
                TestOutcome::Skipped
            }
            (None, _) => TestOutcome::Skipped,
        };
        if let TestOutcome::Failed { reason } = &test {
            warnings.push(InstallWarning::TestFailure {
                reason: reason.clone(),
            });
        }

        let manifest = InstalledManifest {
            name: formula.name().to_string(),
            version: layout.version.clone(),
            keg: layout.keg.clone(),
            links: report.links,
            test,
            warnings,
        };
        self.write_receipt(&manifest)?;

        info!(
            "Installed {} {} ({} link(s), {} warning(s))",
            manifest.name,
            manifest.version,
            manifest.links.len(),
            manifest.warnings.len()
        );
        Ok(manifest)
    }

    async fn check_dependency(&self, dependency: &RuntimeDependency) -> Result<()> {
        let found = self.env.registry.installed_version(&dependency.name).await?;
        debug!("Dependency {} resolved to {:?}", dependency, found);
        match found {
            Some(version) if dependency.minimum.is_satisfied_by(&version) => Ok(()),
            found => {
                error!(
                    "Dependency {} not satisfied (found {:?})",
                    dependency, found
                );
                Err(PourError::UnsatisfiedDependency {
                    name: dependency.name.clone(),
                    required: dependency.minimum.to_string(),
                    found: found.map(|v| v.to_string()),
                })
            }
        }
    }

    /// Tries the primary URL, then each mirror while failures are retryable.
    async fn fetch_artifact<'a>(
        &self,
        formula: &'a FormulaDescriptor,
    ) -> Result<(&'a str, Vec<u8>)> {
        let timeout = self.options.fetch_timeout;
        let mut last_error = None;
        for url in formula.urls() {
            debug!("Fetching {} (timeout {:?})", url, timeout);
            let error = match tokio::time::timeout(timeout, self.env.fetcher.fetch(url)).await {
                Ok(Ok(bytes)) => {
                    debug!("Fetched {} bytes from {}", bytes.len(), url);
                    return Ok((url, bytes));
                }
                Ok(Err(e)) => e,
                Err(_) => PourError::Timeout {
                    operation: format!("fetching {url}"),
                    after: timeout,
                },
            };
            if !error.is_retryable() {
                error!("Fetching {} failed: {}", url, error);
                return Err(error);
            }
            warn!("Fetching {} failed: {}", url, error);
            last_error = Some(error);
        }
        Err(last_error.unwrap_or_else(|| {
            PourError::Generic(format!("No download URL for '{}'", formula.name()))
        }))
    }

    fn verify(&self, formula: &FormulaDescriptor, url: &str, bytes: &[u8]) -> Result<()> {
        let actual = self.env.verifier.digest(bytes);
        if actual.eq_ignore_ascii_case(&formula.sha256) {
            debug!("Checksum verified for {}", url);
            return Ok(());
        }
        error!(
            "Checksum mismatch for {}: expected {}, got {}",
            url, formula.sha256, actual
        );
        Err(PourError::IntegrityError {
            url: url.to_string(),
            expected: formula.sha256.clone(),
            actual,
        })
    }

    fn write_receipt(&self, manifest: &InstalledManifest) -> Result<()> {
        let mut json = serde_json::to_vec_pretty(manifest)?;
        json.push(b'\n');
        let path = manifest.receipt_path();
        debug!("Writing receipt {}", path.display());
        self.env.filesystem.write_atomic(&path, &json)
    }
}

/// Last URL path segment, which carries the archive extension.
fn artifact_file_name(url: &str, fallback: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty() && !n.contains(':'))
        .unwrap_or_else(|| fallback.to_string())
}
