// pour/src/cli/list.rs
use clap::Args;
use colored::Colorize;
use pour_common::config::Config;
use pour_common::error::Result;
use pour_core::{InstalledKeg, KegRegistry};

#[derive(Args, Debug)]
pub struct List {
    /// Show all installed versions, not just the latest for each name
    #[arg(long)]
    pub all: bool,
}

impl List {
    pub async fn run(&self, config: &Config) -> Result<()> {
        let mut kegs = KegRegistry::new(config.cellar_dir()).installed_kegs()?;
        if !self.all {
            kegs = latest_per_name(kegs);
        }
        if kegs.is_empty() {
            println!("{}", "No formulas installed".yellow());
            return Ok(());
        }

        let width = kegs.iter().map(|k| k.name.len()).max().unwrap_or(0);
        for keg in &kegs {
            // Kegs without a receipt were left behind by a failed install.
            let status = if keg.is_complete() {
                String::new()
            } else {
                format!(" {}", "(incomplete)".yellow())
            };
            println!(
                "{:<width$}  {}{}",
                keg.name.bold(),
                keg.version_str,
                status,
                width = width
            );
        }
        Ok(())
    }
}

/// `kegs` arrive sorted by name then version, so the last of each run wins.
fn latest_per_name(kegs: Vec<InstalledKeg>) -> Vec<InstalledKeg> {
    let mut latest: Vec<InstalledKeg> = Vec::new();
    for keg in kegs {
        match latest.last_mut() {
            Some(last) if last.name == keg.name => *last = keg,
            _ => latest.push(keg),
        }
    }
    latest
}
