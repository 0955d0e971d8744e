// pour/src/cli/install.rs
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use colored::Colorize;
use pour_common::config::Config;
use pour_common::error::{PourError, Result};
use pour_common::model::manifest::{InstallWarning, InstalledManifest};
use pour_common::FormulaDescriptor;
use pour_core::{system_environment, FormulaInstaller, InstallLock, InstallOptions};
use tracing::{debug, instrument};

#[derive(Debug, Args)]
pub struct InstallArgs {
    /// Formula files to install, in order
    #[arg(required = true, value_name = "FORMULA.toml")]
    formulas: Vec<PathBuf>,

    /// Do not run the formula's smoke test
    #[arg(long)]
    skip_test: bool,

    /// Bound on each download attempt, e.g. "90s" or "5m"
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    fetch_timeout: Option<Duration>,

    /// Bound on the smoke test
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    test_timeout: Option<Duration>,
}

impl InstallArgs {
    fn options(&self, config: &Config) -> InstallOptions {
        let mut options = InstallOptions::from(config);
        if let Some(timeout) = self.fetch_timeout {
            options.fetch_timeout = timeout;
        }
        if let Some(timeout) = self.test_timeout {
            options.test_timeout = timeout;
        }
        options.run_test = !self.skip_test;
        options
    }

    #[instrument(skip(self, config), fields(formulas = ?self.formulas))]
    pub async fn run(&self, config: &Config) -> Result<()> {
        let installer = FormulaInstaller::new(system_environment(config)?, self.options(config));
        debug!("Install options: {:?}", installer.options());

        let mut failed = 0usize;
        for path in &self.formulas {
            match install_one(&installer, config, path).await {
                Ok(manifest) => print_manifest(&manifest),
                Err(e) => {
                    failed += 1;
                    eprintln!("{} {}: {:#}", "✖".red().bold(), path.display(), e);
                }
            }
        }

        if failed > 0 {
            return Err(PourError::Generic(format!(
                "{failed} of {} formula(s) failed to install",
                self.formulas.len()
            )));
        }
        Ok(())
    }
}

async fn install_one(
    installer: &FormulaInstaller,
    config: &Config,
    path: &Path,
) -> Result<InstalledManifest> {
    let formula = FormulaDescriptor::from_file(path)?;
    let layout = config.layout_for(&formula)?;
    println!(
        "{} {} {}",
        "==>".blue().bold(),
        "Installing".bold(),
        format!("{} {}", layout.name, layout.version).cyan()
    );
    let _lock = InstallLock::acquire(&config.lock_dir(), &layout.name, &layout.version)?;
    installer.install(&formula, &layout).await
}

fn print_manifest(manifest: &InstalledManifest) {
    println!(
        "{} {} {} {}",
        "✔".green().bold(),
        manifest.name.bold(),
        manifest.version,
        manifest.keg.display().to_string().dimmed()
    );
    for link in &manifest.links {
        println!("    {} -> {}", link.link.display(), link.target.display());
    }
    for warning in &manifest.warnings {
        let text = match warning {
            InstallWarning::TestFailure { reason } => format!("smoke test failed: {reason}"),
            InstallWarning::ReplacedLink { link, previous } => format!(
                "replaced {} (previously {})",
                link.display(),
                previous.display()
            ),
        };
        println!("    {} {}", "Warning:".yellow().bold(), text);
    }
}
