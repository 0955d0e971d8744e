// pour-core/src/install/steps.rs
//! Execution of the declared install actions.

use std::path::{Path, PathBuf};

use pour_common::capability::{Filesystem, LinkReplacement};
use pour_common::error::{PourError, Result};
use pour_common::model::formula::{InstallAction, TextTransform};
use pour_common::model::manifest::{InstallLayout, InstallWarning, LinkRecord};
use tracing::{debug, warn};

/// What the actions produced so far, folded into the manifest at the end.
#[derive(Debug, Default)]
pub struct StepReport {
    pub links: Vec<LinkRecord>,
    pub warnings: Vec<InstallWarning>,
}

/// Runs `actions` in order. The first failure stops the run and is wrapped
/// in [`PourError::StepFailed`] with the 1-based step number.
pub fn run_actions(
    fs: &dyn Filesystem,
    actions: &[InstallAction],
    staging_root: &Path,
    layout: &InstallLayout,
) -> Result<StepReport> {
    let mut report = StepReport::default();
    for (i, action) in actions.iter().enumerate() {
        let index = i + 1;
        debug!("Install step {}/{}: {}", index, actions.len(), action);
        apply_action(fs, action, staging_root, layout, &mut report).map_err(|source| {
            PourError::StepFailed {
                index,
                action: action.to_string(),
                source: Box::new(source),
            }
        })?;
    }
    report.links.sort();
    report.links.dedup();
    Ok(report)
}

fn apply_action(
    fs: &dyn Filesystem,
    action: &InstallAction,
    staging_root: &Path,
    layout: &InstallLayout,
    report: &mut StepReport,
) -> Result<()> {
    match action {
        InstallAction::PatchText { target, transform } => {
            let path = resolve_source(fs, target, staging_root, &layout.keg)?;
            patch_file(fs, &path, transform, layout)
        }
        InstallAction::InstallPath {
            source,
            destination,
        } => install_path(fs, source, destination, staging_root, layout),
        InstallAction::CreateSymlink { link, target } => {
            let record = link_into_bin(fs, link, target, layout, report)?;
            report.links.push(record);
            Ok(())
        }
    }
}

/// Looks in the extracted tree first, then in what earlier steps put in the keg.
fn resolve_source(
    fs: &dyn Filesystem,
    relative: &Path,
    staging_root: &Path,
    keg: &Path,
) -> Result<PathBuf> {
    [staging_root, keg]
        .iter()
        .map(|root| join_relative(root, relative))
        .find(|candidate| fs.exists(candidate))
        .ok_or_else(|| PourError::MissingInstallArtifact(relative.to_path_buf()))
}

/// `root.join(".")` keeps a trailing `.` component; avoid it.
fn join_relative(root: &Path, relative: &Path) -> PathBuf {
    if relative == Path::new(".") || relative.as_os_str().is_empty() {
        root.to_path_buf()
    } else {
        root.join(relative)
    }
}

fn patch_file(
    fs: &dyn Filesystem,
    path: &Path,
    transform: &TextTransform,
    layout: &InstallLayout,
) -> Result<()> {
    let original = fs.read_to_string(path)?;
    let transform = expand_transform(transform, layout);
    match apply_transform(&original, &transform) {
        Ok(Some(patched)) => {
            debug!("Patched {} ({})", path.display(), transform.kind());
            fs.write_atomic(path, patched.as_bytes())
        }
        Ok(None) => {
            debug!("{} already patched ({}), leaving it", path.display(), transform.kind());
            Ok(())
        }
        Err(pattern) => Err(PourError::PatchMismatch {
            file: path.to_path_buf(),
            pattern,
        }),
    }
}

fn expand_transform(transform: &TextTransform, layout: &InstallLayout) -> TextTransform {
    match transform {
        TextTransform::Prepend(line) => TextTransform::Prepend(layout.expand(line)),
        TextTransform::Append(line) => TextTransform::Append(layout.expand(line)),
        TextTransform::Replace { from, to } => TextTransform::Replace {
            from: layout.expand(from),
            to: layout.expand(to),
        },
    }
}

/// Applies an expanded transform to `content`.
///
/// Returns `Ok(None)` when the content already carries the change, so a
/// second run is a no-op. `Err(pattern)` means a `Replace` found neither
/// its `from` nor its `to` text.
pub fn apply_transform(
    content: &str,
    transform: &TextTransform,
) -> std::result::Result<Option<String>, String> {
    match transform {
        TextTransform::Prepend(text) => {
            let text = text.trim_end_matches('\n');
            if content == text || content.starts_with(&format!("{text}\n")) {
                Ok(None)
            } else {
                Ok(Some(format!("{text}\n{content}")))
            }
        }
        TextTransform::Append(text) => {
            let text = text.trim_end_matches('\n');
            let body = content.strip_suffix('\n').unwrap_or(content);
            if body == text || body.ends_with(&format!("\n{text}")) {
                return Ok(None);
            }
            let mut patched = content.to_string();
            if !patched.is_empty() && !patched.ends_with('\n') {
                patched.push('\n');
            }
            patched.push_str(text);
            patched.push('\n');
            Ok(Some(patched))
        }
        TextTransform::Replace { from, to } => {
            if !content.contains(from.as_str()) {
                // A deletion leaves nothing to find once applied.
                return if to.is_empty() || content.contains(to.as_str()) {
                    Ok(None)
                } else {
                    Err(from.clone())
                };
            }
            let patched = if !to.is_empty() && to.contains(from.as_str()) {
                // `from` inside an existing `to` is already patched; only
                // rewrite the bare occurrences between them.
                content
                    .split(to.as_str())
                    .map(|piece| piece.replace(from.as_str(), to))
                    .collect::<Vec<_>>()
                    .join(to)
            } else {
                content.replace(from.as_str(), to)
            };
            Ok((patched != content).then_some(patched))
        }
    }
}

fn install_path(
    fs: &dyn Filesystem,
    source: &Path,
    destination: &Path,
    staging_root: &Path,
    layout: &InstallLayout,
) -> Result<()> {
    let target_dir = join_relative(&layout.keg, destination);
    fs.create_dir_all(&target_dir)?;

    if source == Path::new(".") {
        // Whole staging tree: copy its contents, not the directory itself.
        debug!(
            "Installing contents of {} into {}",
            staging_root.display(),
            target_dir.display()
        );
        return fs.copy_path(staging_root, &target_dir);
    }

    let src = resolve_source(fs, source, staging_root, &layout.keg)?;
    let file_name = src
        .file_name()
        .ok_or_else(|| PourError::MissingInstallArtifact(source.to_path_buf()))?;
    let dest = target_dir.join(file_name);
    if src == dest {
        debug!("{} is already in place", dest.display());
        return Ok(());
    }
    debug!("Installing {} -> {}", src.display(), dest.display());
    fs.copy_path(&src, &dest)
}

fn link_into_bin(
    fs: &dyn Filesystem,
    link: &Path,
    target: &Path,
    layout: &InstallLayout,
    report: &mut StepReport,
) -> Result<LinkRecord> {
    let target_path = join_relative(&layout.keg, target);
    if !fs.exists(&target_path) {
        return Err(PourError::MissingInstallArtifact(target_path));
    }
    let link_path = layout.bin_dir.join(link);
    if let Some(parent) = link_path.parent() {
        fs.create_dir_all(parent)?;
    }

    match fs.force_symlink(&target_path, &link_path)? {
        LinkReplacement::Created => debug!(
            "Linked {} -> {}",
            link_path.display(),
            target_path.display()
        ),
        LinkReplacement::Unchanged => debug!("{} already linked", link_path.display()),
        LinkReplacement::Replaced { previous } => {
            warn!(
                "Replaced {} (was {}) with a link to {}",
                link_path.display(),
                previous.display(),
                target_path.display()
            );
            report.warnings.push(InstallWarning::ReplacedLink {
                link: link_path.clone(),
                previous,
            });
        }
    }
    Ok(LinkRecord {
        link: link_path,
        target: target_path,
    })
}
