// pour/src/cli/info.rs
use std::path::PathBuf;

use clap::Args;
use colored::Colorize;
use pour_common::config::Config;
use pour_common::error::Result;
use pour_common::model::formula::TestCommand;
use pour_common::FormulaDescriptor;
use pour_core::KegRegistry;

#[derive(Args, Debug)]
pub struct Info {
    /// Formula file to describe
    #[arg(value_name = "FORMULA.toml")]
    pub formula: PathBuf,
}

impl Info {
    pub async fn run(&self, config: &Config) -> Result<()> {
        let formula = FormulaDescriptor::from_file(&self.formula)?;
        let version = formula.version_str()?;

        println!("{} {}", formula.name().green().bold(), version);
        if !formula.description.is_empty() {
            println!("{}", formula.description);
        }
        if !formula.homepage.is_empty() {
            println!("{}", formula.homepage.blue().underline());
        }

        println!("\n{}", "Artifact".bold());
        println!("  url:    {}", formula.url);
        for mirror in &formula.mirrors {
            println!("  mirror: {mirror}");
        }
        println!("  sha256: {}", formula.sha256);

        if let Some(dependency) = &formula.dependency {
            println!("\n{}", "Requires".bold());
            println!("  {dependency}");
        }

        if !formula.install.is_empty() {
            println!("\n{}", "Install steps".bold());
            for (i, action) in formula.install.iter().enumerate() {
                println!("  {}. {}", i + 1, action);
            }
        }

        if let Some(test) = &formula.test {
            println!("\n{}", "Test".bold());
            println!("  {}", describe_test(test));
        }

        let kegs = KegRegistry::new(config.cellar_dir()).kegs_for(formula.name())?;
        println!();
        if kegs.is_empty() {
            println!("{}", "Not installed".yellow());
        } else {
            for keg in kegs {
                let marker = if keg.version_str == version { " *" } else { "" };
                println!("Installed: {}{}", keg.path.display(), marker);
            }
        }
        Ok(())
    }
}

fn describe_test(test: &TestCommand) -> String {
    let mut line = test.command.clone();
    for arg in &test.args {
        line.push(' ');
        line.push_str(arg);
    }
    if !test.expect_success {
        line.push_str(" (expected to fail)");
    }
    line
}
