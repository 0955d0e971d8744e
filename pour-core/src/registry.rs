// pour-core/src/registry.rs
//! Dependency registries that look outside the cellar.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use pour_common::capability::{DependencyRegistry, ProcessRunner};
use pour_common::error::Result;
use pour_common::version::parse_lenient;
use regex::Regex;
use semver::Version;
use tracing::debug;

/// Command whose output reveals a tool's version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionProbe {
    pub command: String,
    pub args: Vec<String>,
}

impl VersionProbe {
    pub fn new(command: impl Into<String>, args: &[&str]) -> Self {
        Self {
            command: command.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// Finds system-provided runtimes by running a version probe.
/// Unknown names fall back to `<name> --version`.
pub struct ProbeRegistry {
    runner: Arc<dyn ProcessRunner>,
    probes: HashMap<String, VersionProbe>,
}

impl ProbeRegistry {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        let mut probes = HashMap::new();
        probes.insert("java".to_string(), VersionProbe::new("java", &["-version"]));
        Self { runner, probes }
    }

    pub fn with_probe(mut self, name: impl Into<String>, probe: VersionProbe) -> Self {
        self.probes.insert(name.into(), probe);
        self
    }
}

#[async_trait]
impl DependencyRegistry for ProbeRegistry {
    async fn installed_version(&self, name: &str) -> Result<Option<Version>> {
        let probe = self
            .probes
            .get(name)
            .cloned()
            .unwrap_or_else(|| VersionProbe::new(name, &["--version"]));

        let output = match self.runner.run(&probe.command, &probe.args).await {
            Ok(output) => output,
            Err(e) => {
                debug!("Version probe for '{}' could not run: {}", name, e);
                return Ok(None);
            }
        };
        if !output.success() {
            debug!("Version probe for '{}' exited with {:?}", name, output.code);
            return Ok(None);
        }
        // java -version prints to stderr
        let version = parse_probe_output(&output.stderr).or_else(|| parse_probe_output(&output.stdout));
        debug!("Version probe for '{}' found {:?}", name, version);
        Ok(version)
    }
}

/// Pulls the first version out of tool output, preferring a quoted one
/// (`openjdk version "11.0.2" 2019-01-15`).
pub fn parse_probe_output(output: &str) -> Option<Version> {
    static QUOTED: OnceLock<Regex> = OnceLock::new();
    static BARE: OnceLock<Regex> = OnceLock::new();
    let quoted = QUOTED.get_or_init(|| {
        Regex::new(r#""(\d+(?:[._]\d+)*)[^"]*""#).expect("quoted version pattern is valid")
    });
    let bare =
        BARE.get_or_init(|| Regex::new(r"\b(\d+(?:\.\d+)+)\b").expect("bare version pattern is valid"));

    quoted
        .captures(output)
        .or_else(|| bare.captures(output))
        .and_then(|caps| caps.get(1))
        .and_then(|m| parse_lenient(m.as_str()).ok())
}

/// Asks every registry and reports the highest version any of them knows.
pub struct ChainRegistry {
    registries: Vec<Arc<dyn DependencyRegistry>>,
}

impl ChainRegistry {
    pub fn new(registries: Vec<Arc<dyn DependencyRegistry>>) -> Self {
        Self { registries }
    }
}

#[async_trait]
impl DependencyRegistry for ChainRegistry {
    async fn installed_version(&self, name: &str) -> Result<Option<Version>> {
        let mut best: Option<Version> = None;
        for registry in &self.registries {
            let found = registry.installed_version(name).await?;
            best = best.max(found);
        }
        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use pour_common::capability::CommandOutput;
    use pour_common::error::PourError;

    use super::*;

    #[derive(Default)]
    struct ScriptedRunner {
        responses: HashMap<String, CommandOutput>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedRunner {
        fn respond(mut self, command: &str, code: i32, stdout: &str, stderr: &str) -> Self {
            self.responses.insert(
                command.to_string(),
                CommandOutput {
                    code: Some(code),
                    stdout: stdout.into(),
                    stderr: stderr.into(),
                },
            );
            self
        }
    }

    #[async_trait]
    impl ProcessRunner for ScriptedRunner {
        async fn run(&self, command: &str, args: &[String]) -> Result<CommandOutput> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{command} {}", args.join(" ")));
            self.responses
                .get(command)
                .cloned()
                .ok_or_else(|| PourError::CommandExec(format!("{command}: not found")))
        }
    }

    struct Fixed(Option<Version>);

    #[async_trait]
    impl DependencyRegistry for Fixed {
        async fn installed_version(&self, _name: &str) -> Result<Option<Version>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn parses_java_version_banners() {
        assert_eq!(
            parse_probe_output("java version \"1.8.0_292\"\nJava(TM) SE Runtime Environment"),
            Some(Version::new(1, 8, 0))
        );
        assert_eq!(
            parse_probe_output("openjdk version \"11.0.2\" 2019-01-15\nOpenJDK Runtime Environment"),
            Some(Version::new(11, 0, 2))
        );
        assert_eq!(
            parse_probe_output("openjdk version \"17\" 2021-09-14"),
            Some(Version::new(17, 0, 0))
        );
        assert_eq!(parse_probe_output("Apache Maven 3.9.6 (bc0240f3)"), Some(Version::new(3, 9, 6)));
        assert_eq!(parse_probe_output("no version here"), None);
    }

    #[tokio::test]
    async fn java_probe_reads_stderr() {
        let runner = Arc::new(ScriptedRunner::default().respond(
            "java",
            0,
            "",
            "openjdk version \"11.0.2\" 2019-01-15",
        ));
        let registry = ProbeRegistry::new(runner.clone());
        assert_eq!(
            registry.installed_version("java").await.unwrap(),
            Some(Version::new(11, 0, 2))
        );
        assert_eq!(runner.calls.lock().unwrap().as_slice(), ["java -version"]);
    }

    #[tokio::test]
    async fn missing_or_failing_probe_means_not_installed() {
        let runner = Arc::new(ScriptedRunner::default().respond("ant", 1, "", "boom"));
        let registry = ProbeRegistry::new(runner.clone())
            .with_probe("ant", VersionProbe::new("ant", &["-version"]));
        assert_eq!(registry.installed_version("ant").await.unwrap(), None);
        assert_eq!(registry.installed_version("java").await.unwrap(), None);
        assert_eq!(registry.installed_version("gradle").await.unwrap(), None);
        assert_eq!(
            runner.calls.lock().unwrap().last().map(String::as_str),
            Some("gradle --version")
        );
    }

    #[tokio::test]
    async fn chain_returns_highest_version() {
        let chain = ChainRegistry::new(vec![
            Arc::new(Fixed(None)),
            Arc::new(Fixed(Some(Version::new(17, 0, 0)))),
            Arc::new(Fixed(Some(Version::new(1, 8, 0)))),
        ]);
        assert_eq!(
            chain.installed_version("java").await.unwrap(),
            Some(Version::new(17, 0, 0))
        );
        assert_eq!(
            ChainRegistry::new(vec![Arc::new(Fixed(None))])
                .installed_version("java")
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn old_cellar_keg_does_not_shadow_newer_system_tool() {
        let cellar = tempfile::tempdir().unwrap();
        let keg = cellar.path().join("java/1.7.0");
        std::fs::create_dir_all(&keg).unwrap();
        std::fs::write(keg.join("INSTALL_RECEIPT.json"), "{}").unwrap();
        let runner = Arc::new(ScriptedRunner::default().respond(
            "java",
            0,
            "",
            "openjdk version \"17.0.1\" 2021-10-19",
        ));

        let chain = ChainRegistry::new(vec![
            Arc::new(crate::keg::KegRegistry::new(cellar.path())),
            Arc::new(ProbeRegistry::new(runner)),
        ]);
        assert_eq!(
            chain.installed_version("java").await.unwrap(),
            Some(Version::new(17, 0, 1))
        );
    }
}
