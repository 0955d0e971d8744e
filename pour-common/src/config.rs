// pour-common/src/config.rs
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use super::error::{PourError, Result};
use super::model::{FormulaDescriptor, InstallLayout};

const DEFAULT_PREFIX_DIR_NAME: &str = ".pour";
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct Config {
    pub prefix: PathBuf,
    pub fetch_timeout: Duration,
    pub test_timeout: Duration,
}

impl Config {
    /// Reads `POUR_PREFIX`, `POUR_FETCH_TIMEOUT` and `POUR_TEST_TIMEOUT`.
    pub fn load() -> Result<Self> {
        debug!("Loading pour configuration");

        let prefix = match env::var("POUR_PREFIX").ok().filter(|s| !s.is_empty()) {
            Some(prefix) => PathBuf::from(prefix),
            None => {
                let home = dirs::home_dir().ok_or_else(|| {
                    PourError::Config(
                        "POUR_PREFIX is not set and no home directory could be determined"
                            .to_string(),
                    )
                })?;
                debug!(
                    "POUR_PREFIX not set or empty, falling back to {}/{}",
                    home.display(),
                    DEFAULT_PREFIX_DIR_NAME
                );
                home.join(DEFAULT_PREFIX_DIR_NAME)
            }
        };
        debug!("Effective prefix set to: {}", prefix.display());

        let fetch_timeout = duration_from_env("POUR_FETCH_TIMEOUT", DEFAULT_FETCH_TIMEOUT)?;
        let test_timeout = duration_from_env("POUR_TEST_TIMEOUT", DEFAULT_TEST_TIMEOUT)?;

        debug!("Configuration loaded successfully.");
        Ok(Self {
            prefix,
            fetch_timeout,
            test_timeout,
        })
    }

    pub fn with_prefix(prefix: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            test_timeout: DEFAULT_TEST_TIMEOUT,
        }
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.prefix.join("bin")
    }

    pub fn cellar_dir(&self) -> PathBuf {
        self.prefix.join("Cellar")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.prefix.join("tmp")
    }

    pub fn var_dir(&self) -> PathBuf {
        self.prefix.join("var")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.var_dir().join("log")
    }

    pub fn lock_dir(&self) -> PathBuf {
        self.var_dir().join("lock")
    }

    pub fn formula_cellar_dir(&self, formula_name: &str) -> PathBuf {
        self.cellar_dir().join(formula_name)
    }

    pub fn formula_keg_path(&self, formula_name: &str, version_str: &str) -> PathBuf {
        self.formula_cellar_dir(formula_name).join(version_str)
    }

    pub fn layout_for(&self, formula: &FormulaDescriptor) -> Result<InstallLayout> {
        let version = formula.version_str()?;
        Ok(InstallLayout {
            keg: self.formula_keg_path(formula.name(), &version),
            bin_dir: self.bin_dir(),
            scratch_dir: self.tmp_dir(),
            name: formula.name().to_string(),
            version,
        })
    }
}

fn duration_from_env(var: &str, default: Duration) -> Result<Duration> {
    match env::var(var).ok().filter(|s| !s.trim().is_empty()) {
        Some(raw) => humantime::parse_duration(raw.trim())
            .map_err(|e| PourError::Config(format!("{var}='{raw}' is not a duration: {e}"))),
        None => Ok(default),
    }
}
