// pour-common/src/model/manifest.rs
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where one formula+version gets installed. Always passed explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    /// Target root (`<cellar>/<name>/<version>`).
    pub keg: PathBuf,
    pub bin_dir: PathBuf,
    /// Parent directory for the scoped temporary work area.
    pub scratch_dir: PathBuf,
    pub name: String,
    pub version: String,
}

impl InstallLayout {
    /// Expands `{prefix}`, `{bin}`, `{name}` and `{version}`.
    pub fn expand(&self, template: &str) -> String {
        template
            .replace("{prefix}", &self.keg.to_string_lossy())
            .replace("{bin}", &self.bin_dir.to_string_lossy())
            .replace("{name}", &self.name)
            .replace("{version}", &self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkRecord {
    pub link: PathBuf,
    pub target: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TestOutcome {
    Passed,
    Failed { reason: String },
    Skipped,
}

impl TestOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Problems that did not stop the install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InstallWarning {
    TestFailure { reason: String },
    /// The link previously pointed somewhere other than this keg.
    ReplacedLink { link: PathBuf, previous: PathBuf },
}

/// Result of a structurally complete install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledManifest {
    pub name: String,
    pub version: String,
    pub keg: PathBuf,
    pub links: Vec<LinkRecord>,
    pub test: TestOutcome,
    #[serde(skip)]
    pub warnings: Vec<InstallWarning>,
}

impl InstalledManifest {
    pub const RECEIPT_FILE: &'static str = "INSTALL_RECEIPT.json";

    pub fn receipt_path(&self) -> PathBuf {
        self.keg.join(Self::RECEIPT_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> InstallLayout {
        InstallLayout {
            keg: PathBuf::from("/opt/pour/Cellar/butterfly/3.2.7"),
            bin_dir: PathBuf::from("/opt/pour/bin"),
            scratch_dir: PathBuf::from("/opt/pour/tmp"),
            name: "butterfly".into(),
            version: "3.2.7".into(),
        }
    }

    #[test]
    fn expands_placeholders() {
        let layout = layout();
        assert_eq!(
            layout.expand("export BUTTERFLY_HOME={prefix}"),
            "export BUTTERFLY_HOME=/opt/pour/Cellar/butterfly/3.2.7"
        );
        assert_eq!(
            layout.expand("{bin}/{name} --version={version}"),
            "/opt/pour/bin/butterfly --version=3.2.7"
        );
        assert_eq!(layout.expand("no placeholders"), "no placeholders");
    }

    #[test]
    fn warnings_stay_out_of_the_receipt() {
        let manifest = InstalledManifest {
            name: "butterfly".into(),
            version: "3.2.7".into(),
            keg: layout().keg,
            links: vec![],
            test: TestOutcome::Failed {
                reason: "exit status 1".into(),
            },
            warnings: vec![InstallWarning::TestFailure {
                reason: "exit status 1".into(),
            }],
        };
        let json = serde_json::to_string(&manifest).unwrap();
        assert!(!json.contains("warnings"));
        assert!(json.contains("\"status\":\"failed\""));
        assert!(manifest.receipt_path().ends_with("3.2.7/INSTALL_RECEIPT.json"));
    }
}
