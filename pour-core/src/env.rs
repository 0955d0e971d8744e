// pour-core/src/env.rs
use std::sync::Arc;

use pour_common::capability::{DependencyRegistry, ProcessRunner};
use pour_common::config::Config;
use pour_common::error::Result;
use pour_common::Environment;
use pour_net::{HttpFetcher, Sha256Verifier};
use tracing::debug;

use crate::fs::LocalFilesystem;
use crate::keg::KegRegistry;
use crate::process::TokioProcessRunner;
use crate::registry::{ChainRegistry, ProbeRegistry};

/// The real capabilities: HTTPS downloads, the local disk, child processes,
/// and dependencies resolved from the cellar first, then from the system.
pub fn system_environment(config: &Config) -> Result<Environment> {
    debug!("Building system environment for prefix {}", config.prefix().display());
    let runner: Arc<dyn ProcessRunner> = Arc::new(TokioProcessRunner);
    let registry: Arc<dyn DependencyRegistry> = Arc::new(ChainRegistry::new(vec![
        Arc::new(KegRegistry::new(config.cellar_dir())),
        Arc::new(ProbeRegistry::new(runner.clone())),
    ]));

    Ok(Environment {
        fetcher: Arc::new(HttpFetcher::new()?),
        verifier: Arc::new(Sha256Verifier),
        filesystem: Arc::new(LocalFilesystem),
        registry,
        runner,
    })
}
