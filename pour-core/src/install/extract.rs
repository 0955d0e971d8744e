// pour-core/src/install/extract.rs
use std::fs::{self, File};
use std::io::{self, Read, Seek};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use pour_common::error::{PourError, Result};
use tar::Archive;
use tracing::{debug, warn};
use xz2::read::XzDecoder;
use zip::read::ZipArchive;

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    TarGz,
    TarBz2,
    TarXz,
    Tar,
    /// Not an archive; staged as a single file.
    Raw,
}

impl ArchiveKind {
    /// Decides from the file name first, then from the leading bytes.
    pub fn detect(file_name: &str, head: &[u8]) -> Self {
        let lower = file_name.to_ascii_lowercase();
        if lower.ends_with(".zip") {
            return Self::Zip;
        }
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            return Self::TarGz;
        }
        if lower.ends_with(".tar.bz2") || lower.ends_with(".tbz") || lower.ends_with(".tbz2") {
            return Self::TarBz2;
        }
        if lower.ends_with(".tar.xz") || lower.ends_with(".txz") {
            return Self::TarXz;
        }
        if lower.ends_with(".tar") {
            return Self::Tar;
        }
        match infer::get(head).map(|kind| kind.extension()) {
            Some("zip") => Self::Zip,
            Some("gz") => Self::TarGz,
            Some("bz2") => Self::TarBz2,
            Some("xz") => Self::TarXz,
            Some("tar") => Self::Tar,
            _ => Self::Raw,
        }
    }
}

/// Unpacks `archive_path` into `stage_dir` and returns the directory the
/// install actions should resolve paths against: the single top-level
/// directory if there is exactly one, otherwise `stage_dir` itself.
pub fn stage_artifact(archive_path: &Path, stage_dir: &Path) -> Result<PathBuf> {
    let file_name = archive_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut head = [0u8; 512];
    let read = File::open(archive_path)?.read(&mut head)?;
    let kind = ArchiveKind::detect(&file_name, &head[..read]);
    debug!(
        "Staging '{}' as {:?} into {}",
        archive_path.display(),
        kind,
        stage_dir.display()
    );

    fs::create_dir_all(stage_dir)?;
    if kind == ArchiveKind::Raw {
        fs::copy(archive_path, stage_dir.join(&file_name))?;
        return Ok(stage_dir.to_path_buf());
    }
    extract_archive(archive_path, stage_dir, kind)?;
    single_root_dir(stage_dir)
}

pub fn extract_archive(archive_path: &Path, target_dir: &Path, kind: ArchiveKind) -> Result<()> {
    let file = File::open(archive_path).map_err(|e| {
        PourError::Io(std::sync::Arc::new(io::Error::new(
            e.kind(),
            format!("Failed to open archive {}: {}", archive_path.display(), e),
        )))
    })?;

    match kind {
        ArchiveKind::Zip => extract_zip_archive(file, target_dir, archive_path),
        ArchiveKind::TarGz => extract_tar_archive(GzDecoder::new(file), target_dir, archive_path),
        ArchiveKind::TarBz2 => extract_tar_archive(BzDecoder::new(file), target_dir, archive_path),
        ArchiveKind::TarXz => extract_tar_archive(XzDecoder::new(file), target_dir, archive_path),
        ArchiveKind::Tar => extract_tar_archive(file, target_dir, archive_path),
        ArchiveKind::Raw => Err(PourError::Extraction(format!(
            "{} is not an archive",
            archive_path.display()
        ))),
    }
}

fn single_root_dir(stage_dir: &Path) -> Result<PathBuf> {
    let mut entries = fs::read_dir(stage_dir)?.collect::<io::Result<Vec<_>>>()?;
    if entries.len() == 1 && entries[0].file_type()?.is_dir() {
        let root = entries.remove(0).path();
        debug!("Using single top-level directory {} as staging root", root.display());
        return Ok(root);
    }
    if entries.is_empty() {
        warn!("Archive extracted into {} is empty", stage_dir.display());
    }
    Ok(stage_dir.to_path_buf())
}

/// Rejects absolute paths and `..` so nothing lands outside the stage.
fn checked_relative(path: &Path, archive_path_for_log: &Path) -> Result<()> {
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            other => {
                return Err(PourError::Extraction(format!(
                    "Disallowed component {:?} in entry '{}' of {}",
                    other,
                    path.display(),
                    archive_path_for_log.display()
                )))
            }
        }
    }
    Ok(())
}

fn extract_tar_archive<R: Read>(
    reader: R,
    target_dir: &Path,
    archive_path_for_log: &Path,
) -> Result<()> {
    let mut archive = Archive::new(reader);
    archive.set_preserve_permissions(true);
    archive.set_overwrite(true);

    for entry_result in archive.entries()? {
        let mut entry = entry_result.map_err(|e| {
            PourError::Extraction(format!(
                "Error reading TAR entry from {}: {}",
                archive_path_for_log.display(),
                e
            ))
        })?;
        let path = entry
            .path()
            .map_err(|e| {
                PourError::Extraction(format!(
                    "Invalid path in TAR entry from {}: {}",
                    archive_path_for_log.display(),
                    e
                ))
            })?
            .into_owned();
        checked_relative(&path, archive_path_for_log)?;

        // unpack_in resolves hardlinks relative to the stage and refuses escapes.
        let unpacked = entry.unpack_in(target_dir).map_err(|e| {
            PourError::Extraction(format!(
                "Failed to unpack '{}' from {}: {}",
                path.display(),
                archive_path_for_log.display(),
                e
            ))
        })?;
        if !unpacked {
            return Err(PourError::Extraction(format!(
                "Entry '{}' in {} points outside the extraction directory",
                path.display(),
                archive_path_for_log.display()
            )));
        }
    }
    debug!("Finished TAR extraction for {}", archive_path_for_log.display());
    Ok(())
}

fn extract_zip_archive<R: Read + Seek>(
    reader: R,
    target_dir: &Path,
    archive_path_for_log: &Path,
) -> Result<()> {
    let mut archive = ZipArchive::new(reader).map_err(|e| {
        PourError::Extraction(format!(
            "Failed to open ZIP {}: {}",
            archive_path_for_log.display(),
            e
        ))
    })?;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i).map_err(|e| {
            PourError::Extraction(format!(
                "Error reading ZIP index {} in {}: {}",
                i,
                archive_path_for_log.display(),
                e
            ))
        })?;
        let relative = file.enclosed_name().ok_or_else(|| {
            PourError::Extraction(format!(
                "Entry '{}' in {} points outside the extraction directory",
                file.name(),
                archive_path_for_log.display()
            ))
        })?;
        let out_path = target_dir.join(&relative);

        if file.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mode = file.unix_mode();
        #[cfg(unix)]
        if mode.is_some_and(|m| m & S_IFMT == S_IFLNK) {
            let mut link_target = String::new();
            file.read_to_string(&mut link_target)?;
            checked_relative(Path::new(&link_target), archive_path_for_log)?;
            if fs::symlink_metadata(&out_path).is_ok() {
                fs::remove_file(&out_path)?;
            }
            std::os::unix::fs::symlink(&link_target, &out_path)?;
            continue;
        }

        let mut out = File::create(&out_path)?;
        io::copy(&mut file, &mut out)?;
        drop(out);

        #[cfg(unix)]
        if let Some(mode) = mode {
            fs::set_permissions(&out_path, fs::Permissions::from_mode(mode & 0o7777))?;
        }
    }
    debug!("Finished ZIP extraction for {}", archive_path_for_log.display());
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::{Cursor, Write};

    use flate2::write::GzEncoder;
    use flate2::Compression;
    use zip::write::SimpleFileOptions;

    use super::*;

    fn tar_gz(entries: &[(&str, &[u8], u32)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (path, data, mode) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(*mode);
            header.set_cksum();
            builder.append_data(&mut header, path, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn zip(entries: &[(&str, &[u8], u32)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (path, data, mode) in entries {
            writer
                .start_file(*path, SimpleFileOptions::default().unix_permissions(*mode))
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn write_artifact(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn detects_kinds_by_name_then_content() {
        assert_eq!(ArchiveKind::detect("a.zip", b""), ArchiveKind::Zip);
        assert_eq!(ArchiveKind::detect("a.TGZ", b""), ArchiveKind::TarGz);
        assert_eq!(ArchiveKind::detect("a.tar.xz", b""), ArchiveKind::TarXz);
        assert_eq!(ArchiveKind::detect("a.tbz2", b""), ArchiveKind::TarBz2);
        assert_eq!(ArchiveKind::detect("download", &zip(&[("x", b"x", 0o644)])), ArchiveKind::Zip);
        assert_eq!(ArchiveKind::detect("download", &tar_gz(&[("x", b"x", 0o644)])), ArchiveKind::TarGz);
        assert_eq!(ArchiveKind::detect("tool.jar.sh", b"#!/bin/sh\n"), ArchiveKind::Raw);
    }

    #[test]
    fn tar_gz_with_single_root_is_unwrapped_and_keeps_modes() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = write_artifact(
            dir.path(),
            "butterfly-3.2.7.tar.gz",
            &tar_gz(&[
                ("butterfly-3.2.7/butterfly", b"#!/bin/bash\n", 0o755),
                ("butterfly-3.2.7/lib/core.jar", b"jar", 0o644),
            ]),
        );

        let root = stage_artifact(&artifact, &dir.path().join("stage")).unwrap();
        assert!(root.ends_with("stage/butterfly-3.2.7"));
        let mode = fs::metadata(root.join("butterfly")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
        assert_eq!(fs::read(root.join("lib/core.jar")).unwrap(), b"jar");
    }

    #[test]
    fn zip_with_several_roots_stays_at_stage() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = write_artifact(
            dir.path(),
            "butterfly-3.2.7.zip",
            &zip(&[
                ("butterfly", b"#!/bin/bash\n", 0o755),
                ("lib/core.jar", b"jar", 0o644),
            ]),
        );

        let stage = dir.path().join("stage");
        let root = stage_artifact(&artifact, &stage).unwrap();
        assert_eq!(root, stage);
        let mode = fs::metadata(root.join("butterfly")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn zip_entries_escaping_the_stage_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = write_artifact(
            dir.path(),
            "evil.zip",
            &zip(&[("../escaped.txt", b"nope", 0o644)]),
        );

        let err = stage_artifact(&artifact, &dir.path().join("stage")).unwrap_err();
        assert!(matches!(err, PourError::Extraction(_)), "{err}");
        assert!(!dir.path().join("escaped.txt").exists());
    }

    /// `tar::Builder` refuses `..` and absolute names, so write the raw header.
    fn tar_gz_with_raw_name(name: &[u8], data: &[u8]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        let mut header = tar::Header::new_gnu();
        header.as_gnu_mut().unwrap().name[..name.len()].copy_from_slice(name);
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        builder.append(&header, data).unwrap();
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn tar_entries_escaping_the_stage_are_rejected() {
        for name in [&b"../escaped.txt"[..], &b"butterfly/../../escaped.txt"[..]] {
            let dir = tempfile::tempdir().unwrap();
            let artifact = write_artifact(
                dir.path(),
                "evil.tar.gz",
                &tar_gz_with_raw_name(name, b"nope"),
            );

            let err = stage_artifact(&artifact, &dir.path().join("stage")).unwrap_err();
            assert!(matches!(err, PourError::Extraction(_)), "{err}");
            assert!(!dir.path().join("escaped.txt").exists());
        }
    }

    #[test]
    fn tar_entries_with_absolute_paths_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("absolute.txt");
        let artifact = write_artifact(
            dir.path(),
            "evil.tar.gz",
            &tar_gz_with_raw_name(target.to_str().unwrap().as_bytes(), b"nope"),
        );

        let err = stage_artifact(&artifact, &dir.path().join("stage")).unwrap_err();
        assert!(matches!(err, PourError::Extraction(_)), "{err}");
        assert!(!target.exists());
    }

    #[test]
    fn raw_files_are_staged_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = write_artifact(dir.path(), "tool-1.0.jar.sh", b"#!/bin/sh\necho hi\n");
        let stage = dir.path().join("stage");
        let root = stage_artifact(&artifact, &stage).unwrap();
        assert_eq!(root, stage);
        assert_eq!(
            fs::read_to_string(stage.join("tool-1.0.jar.sh")).unwrap(),
            "#!/bin/sh\necho hi\n"
        );
    }
}
