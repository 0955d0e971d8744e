// pour-common/src/model/formula.rs
//! Formula descriptors and their TOML source format.

use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{PourError, Result};
use crate::version::{parse_lenient, VersionConstraint};

const SHA256_HEX_LEN: usize = 64;

/// A parsed formula. Never mutated after [`FormulaDescriptor::parse`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaDescriptor {
    pub name: String,
    #[serde(default, alias = "desc")]
    pub description: String,
    #[serde(default)]
    pub homepage: String,
    pub url: String,
    #[serde(default)]
    pub mirrors: Vec<String>,
    pub sha256: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub dependency: Option<RuntimeDependency>,
    #[serde(default)]
    pub install: Vec<InstallAction>,
    #[serde(default)]
    pub test: Option<TestCommand>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeDependency {
    pub name: String,
    pub minimum: VersionConstraint,
}

impl fmt::Display for RuntimeDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.minimum)
    }
}

/// One step of the install procedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum InstallAction {
    /// Rewrite a file of the extracted artifact in place.
    PatchText {
        target: PathBuf,
        transform: TextTransform,
    },
    /// Copy a file or tree into the keg, relative to the keg root.
    InstallPath {
        source: PathBuf,
        #[serde(default = "keg_root")]
        destination: PathBuf,
    },
    /// Link `<bin>/<link>` to `<keg>/<target>`.
    CreateSymlink { link: PathBuf, target: PathBuf },
}

fn keg_root() -> PathBuf {
    PathBuf::from(".")
}

impl InstallAction {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PatchText { .. } => "patch_text",
            Self::InstallPath { .. } => "install_path",
            Self::CreateSymlink { .. } => "create_symlink",
        }
    }

    fn relative_paths(&self) -> Vec<&Path> {
        match self {
            Self::PatchText { target, .. } => vec![target.as_path()],
            Self::InstallPath {
                source,
                destination,
            } => vec![source.as_path(), destination.as_path()],
            Self::CreateSymlink { link, target } => vec![link.as_path(), target.as_path()],
        }
    }
}

impl fmt::Display for InstallAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PatchText { target, transform } => {
                write!(f, "patch {} ({})", target.display(), transform.kind())
            }
            Self::InstallPath {
                source,
                destination,
            } => write!(f, "install {} -> {}", source.display(), destination.display()),
            Self::CreateSymlink { link, target } => {
                write!(f, "link {} -> {}", link.display(), target.display())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextTransform {
    /// Insert a line at the very beginning of the file.
    Prepend(String),
    /// Add a line at the end of the file.
    Append(String),
    /// Replace every occurrence of `from` with `to`.
    Replace { from: String, to: String },
}

impl TextTransform {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Prepend(_) => "prepend",
            Self::Append(_) => "append",
            Self::Replace { .. } => "replace",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCommand {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "expect_success_default")]
    pub expect_success: bool,
}

fn expect_success_default() -> bool {
    true
}

impl FormulaDescriptor {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading formula from {}", path.display());
        let content = fs::read_to_string(path).map_err(|e| {
            PourError::Io(std::sync::Arc::new(std::io::Error::new(
                e.kind(),
                format!("Failed to read formula {}: {}", path.display(), e),
            )))
        })?;
        Self::parse(&content)
    }

    /// Parses and validates a formula from TOML source.
    pub fn parse(content: &str) -> Result<Self> {
        let mut formula: FormulaDescriptor = toml::from_str(content)?;
        formula.sha256 = formula.sha256.trim().to_ascii_lowercase();
        formula.validate()?;
        debug!(
            "Parsed formula '{}' ({} install steps)",
            formula.name,
            formula.install.len()
        );
        Ok(formula)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared version, or the one embedded in the artifact file name.
    pub fn version_str(&self) -> Result<String> {
        if let Some(version) = self.version.as_deref().map(str::trim) {
            if !version.is_empty() {
                return Ok(version.to_string());
            }
        }
        version_from_url(&self.url).ok_or_else(|| {
            PourError::Parse(
                "formula",
                format!(
                    "'{}' declares no version and none could be inferred from {}",
                    self.name, self.url
                ),
            )
        })
    }

    /// Primary URL followed by mirrors.
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.url.as_str()).chain(self.mirrors.iter().map(String::as_str))
    }

    fn validate(&self) -> Result<()> {
        let valid_name = !self.name.is_empty()
            && self.name.starts_with(|c: char| c.is_ascii_lowercase() || c.is_ascii_digit())
            && self.name.chars().all(|c| {
                c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '@' | '.' | '_' | '+' | '-')
            });
        if !valid_name {
            return Err(PourError::Parse(
                "formula",
                format!("invalid formula name '{}'", self.name),
            ));
        }

        for url in self.urls() {
            validate_https_url(url)?;
        }

        if self.sha256.len() != SHA256_HEX_LEN
            || !self.sha256.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(PourError::Parse(
                "formula",
                format!(
                    "sha256 for '{}' must be {} hex characters, got {} characters",
                    self.name,
                    SHA256_HEX_LEN,
                    self.sha256.len()
                ),
            ));
        }

        let version = self.version_str()?;
        if version.contains(['/', '\\']) || version == "." || version == ".." {
            return Err(PourError::Parse(
                "formula",
                format!("version '{version}' cannot be used as a directory name"),
            ));
        }

        for (index, action) in self.install.iter().enumerate() {
            for path in action.relative_paths() {
                if !is_contained_relative(path) {
                    return Err(PourError::Parse(
                        "formula",
                        format!(
                            "install step {} ({}) uses path '{}' which must be relative and stay inside its root",
                            index + 1,
                            action.kind(),
                            path.display()
                        ),
                    ));
                }
            }
            if let InstallAction::PatchText {
                transform: TextTransform::Replace { from, .. },
                ..
            } = action
            {
                if from.is_empty() {
                    return Err(PourError::Parse(
                        "formula",
                        format!("install step {} replaces an empty pattern", index + 1),
                    ));
                }
            }
        }

        if let Some(test) = &self.test {
            if test.command.trim().is_empty() {
                return Err(PourError::Parse("formula", "test command is empty".into()));
            }
        }
        Ok(())
    }
}

fn validate_https_url(raw: &str) -> Result<()> {
    let url = Url::parse(raw)
        .map_err(|e| PourError::Parse("formula", format!("invalid URL '{raw}': {e}")))?;
    if url.scheme() != "https" {
        return Err(PourError::Parse(
            "formula",
            format!("URL '{raw}' must use https, got '{}'", url.scheme()),
        ));
    }
    Ok(())
}

fn is_contained_relative(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Extracts a version from an artifact URL's file name, e.g.
/// `.../butterfly-3.2.7.zip` or `.../v1.4.0/tool_1.4.0_linux.tar.gz`.
pub fn version_from_url(url: &str) -> Option<String> {
    static VERSION_RE: OnceLock<Regex> = OnceLock::new();
    let re = VERSION_RE.get_or_init(|| {
        Regex::new(r"[-_]v?(\d+(?:\.\d+)+(?:[-_.]?(?:alpha|beta|rc|RELEASE)\d*)?)")
            .expect("version pattern is valid")
    });

    let file_name = url.split(['?', '#']).next()?.rsplit('/').next()?;
    let version = re.captures(file_name)?.get(1)?.as_str();
    parse_lenient(version).ok()?;
    Some(version.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUTTERFLY: &str = r#"
name = "butterfly"
description = "Application transformation tool"
homepage = "https://github.com/paypal/butterfly"
url = "https://example.org/releases/butterfly-3.2.7.zip"
sha256 = "5D41402ABC4B2A76B9719D911017C592A4E2B7D5E0A1F3A7E9C6B2D4F8A1C3E5"

[dependency]
name = "java"
minimum = "1.8+"

[[install]]
action = "patch_text"
target = "butterfly"
transform = { prepend = "export BUTTERFLY_HOME={prefix}" }

[[install]]
action = "install_path"
source = "butterfly"

[[install]]
action = "install_path"
source = "lib"
destination = "lib"

[[install]]
action = "create_symlink"
link = "butterfly"
target = "butterfly"

[test]
command = "{bin}/butterfly"
args = ["-l"]
"#;

    #[test]
    fn parses_butterfly_formula() {
        let formula = FormulaDescriptor::parse(BUTTERFLY).unwrap();
        assert_eq!(formula.name(), "butterfly");
        assert_eq!(formula.version_str().unwrap(), "3.2.7");
        assert_eq!(
            formula.sha256,
            "5d41402abc4b2a76b9719d911017c592a4e2b7d5e0a1f3a7e9c6b2d4f8a1c3e5"
        );

        let dependency = formula.dependency.as_ref().unwrap();
        assert_eq!(dependency.name, "java");
        assert_eq!(dependency.to_string(), "java >= 1.8.0");

        assert_eq!(formula.install.len(), 4);
        assert_eq!(
            formula.install[0],
            InstallAction::PatchText {
                target: PathBuf::from("butterfly"),
                transform: TextTransform::Prepend("export BUTTERFLY_HOME={prefix}".into()),
            }
        );
        assert_eq!(
            formula.install[1],
            InstallAction::InstallPath {
                source: PathBuf::from("butterfly"),
                destination: PathBuf::from("."),
            }
        );
        assert_eq!(formula.install[3].kind(), "create_symlink");

        let test = formula.test.as_ref().unwrap();
        assert_eq!(test.args, vec!["-l".to_string()]);
        assert!(test.expect_success);
    }

    #[test]
    fn rejects_overlong_checksum() {
        let source = BUTTERFLY.replace(
            "5D41402ABC4B2A76B9719D911017C592A4E2B7D5E0A1F3A7E9C6B2D4F8A1C3E5",
            "5D41402ABC4B2A76B9719D911017C592A4E2B7D5E0A1F3A7E9C6B2D4F8A1C3E5F",
        );
        let err = FormulaDescriptor::parse(&source).unwrap_err();
        assert!(err.to_string().contains("65 characters"), "{err}");
    }

    #[test]
    fn rejects_plain_http_and_escaping_paths() {
        let http = BUTTERFLY.replace("https://example.org", "http://example.org");
        assert!(FormulaDescriptor::parse(&http).is_err());

        let escaping = BUTTERFLY.replace("source = \"lib\"", "source = \"../lib\"");
        let err = FormulaDescriptor::parse(&escaping).unwrap_err();
        assert!(err.to_string().contains("install step 3"), "{err}");

        let absolute = BUTTERFLY.replace("link = \"butterfly\"", "link = \"/usr/bin/butterfly\"");
        assert!(FormulaDescriptor::parse(&absolute).is_err());
    }

    #[test]
    fn explicit_version_wins_over_url() {
        let source = BUTTERFLY.replace(
            "sha256 =",
            "version = \"3.2.7-hotfix\"\nsha256 =",
        );
        let formula = FormulaDescriptor::parse(&source).unwrap();
        assert_eq!(formula.version_str().unwrap(), "3.2.7-hotfix");
    }

    #[test]
    fn missing_version_is_a_parse_error() {
        let source = BUTTERFLY.replace("butterfly-3.2.7.zip", "butterfly-latest.zip");
        assert!(FormulaDescriptor::parse(&source).is_err());
    }

    #[test]
    fn infers_versions_from_common_file_names() {
        assert_eq!(
            version_from_url("https://example.org/butterfly-3.2.7.zip").as_deref(),
            Some("3.2.7")
        );
        assert_eq!(
            version_from_url("https://example.org/dl/tool_1.4.0_linux.tar.gz").as_deref(),
            Some("1.4.0")
        );
        assert_eq!(
            version_from_url("https://example.org/app-v2.10.tgz?raw=1").as_deref(),
            Some("2.10")
        );
        assert_eq!(version_from_url("https://example.org/app.zip"), None);
    }

    #[test]
    fn mirrors_follow_primary_url() {
        let source = BUTTERFLY.replace(
            "sha256 =",
            "mirrors = [\"https://mirror.example.org/butterfly-3.2.7.zip\"]\nsha256 =",
        );
        let formula = FormulaDescriptor::parse(&source).unwrap();
        let urls: Vec<&str> = formula.urls().collect();
        assert_eq!(
            urls,
            vec![
                "https://example.org/releases/butterfly-3.2.7.zip",
                "https://mirror.example.org/butterfly-3.2.7.zip",
            ]
        );
    }
}
