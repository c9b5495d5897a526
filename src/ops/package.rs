//! Package assembly.
//!
//! Each application is staged under `<output>/.staging/` and written as one
//! archive next to it. Entries are relative, sorted and carry fixed
//! timestamps and modes, so identical inputs produce identical bytes.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;

use crate::builder::errors::PipelineError;
use crate::core::application::Application;
use crate::core::artifact::{ArtifactKind, Package, RuntimeArtifact};
use crate::core::platform::{ArchiveFormat, TargetPlatform};
use crate::util::fs::{ensure_dir, glob_files, relative_path, remove_dir_all_if_exists};

const STAGING_DIR: &str = ".staging";

/// Archive path of an application for a platform.
pub fn archive_path(output_dir: &Path, app_name: &str, platform: &TargetPlatform) -> PathBuf {
    output_dir.join(format!(
        "{}_{}.{}",
        app_name,
        platform.archive_tag(),
        platform.archive_format.extension()
    ))
}

/// One file inside the archive.
#[derive(Debug, Clone)]
struct Entry {
    source: PathBuf,
    mode: u32,
}

/// Stage an application's files and write its archive.
pub fn assemble(
    app: &Application,
    binary: &Path,
    artifacts: &[RuntimeArtifact],
    platform: &TargetPlatform,
    output_dir: &Path,
) -> Result<Package, PipelineError> {
    assemble_inner(app, binary, artifacts, platform, output_dir)
        .map_err(|e| PipelineError::packaging(&app.name, &e))
}

fn assemble_inner(
    app: &Application,
    binary: &Path,
    artifacts: &[RuntimeArtifact],
    platform: &TargetPlatform,
    output_dir: &Path,
) -> Result<Package> {
    if !binary.is_file() {
        bail!("binary {} does not exist", binary.display());
    }

    let mut extra: Vec<RuntimeArtifact> = artifacts.to_vec();
    let data_files = glob_files(&app.source_unit, &app.data_files)?;
    extra.extend(data_files.into_iter().map(|path| RuntimeArtifact {
        destination_name: relative_path(&app.source_unit, &path),
        source_path: path,
        kind: ArtifactKind::DataFile,
    }));

    let binary = RuntimeArtifact::executable(binary.to_path_buf());
    let mut entries: BTreeMap<PathBuf, Entry> = BTreeMap::new();
    entries.insert(
        binary.destination_name.clone(),
        Entry {
            source: binary.source_path.clone(),
            mode: binary.kind.mode(),
        },
    );

    let mut shipped = Vec::with_capacity(extra.len());
    for artifact in extra {
        if artifact.destination_name.is_absolute()
            || artifact
                .destination_name
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            bail!(
                "artifact destination {} escapes the package",
                artifact.destination_name.display()
            );
        }
        if entries.contains_key(&artifact.destination_name) {
            tracing::warn!(
                "Skipping {}: {} is already packaged",
                artifact.source_path.display(),
                artifact.destination_name.display()
            );
            continue;
        }
        entries.insert(
            artifact.destination_name.clone(),
            Entry {
                source: artifact.source_path.clone(),
                mode: artifact.kind.mode(),
            },
        );
        shipped.push(artifact);
    }

    let stem = format!("{}_{}", app.name, platform.archive_tag());
    let staging_root = output_dir.join(STAGING_DIR).join(&stem);
    let staging = staging_root.join(&app.name);
    remove_dir_all_if_exists(&staging_root)?;
    ensure_dir(&staging)?;

    let mut staged = Vec::with_capacity(entries.len());
    for (dest, entry) in &entries {
        let target = staging.join(dest);
        if let Some(parent) = target.parent() {
            ensure_dir(parent)?;
        }
        std::fs::copy(&entry.source, &target).with_context(|| {
            format!("failed to stage {} as {}", entry.source.display(), dest.display())
        })?;
        let name = Path::new(&app.name).join(dest);
        staged.push((archive_name(&name), target, entry.mode));
    }

    let archive = archive_path(output_dir, &app.name, platform);
    ensure_dir(output_dir)?;
    let tmp = NamedTempFile::new_in(output_dir)
        .with_context(|| format!("failed to create temporary archive in {}", output_dir.display()))?;
    match platform.archive_format {
        ArchiveFormat::Zip => write_zip(tmp.as_file(), &staged)?,
        ArchiveFormat::TarGz => write_tar_gz(tmp.as_file(), &staged)?,
    }
    tmp.persist(&archive)
        .with_context(|| format!("failed to write {}", archive.display()))?;

    remove_dir_all_if_exists(&staging_root)?;
    remove_staging_parent(&output_dir.join(STAGING_DIR));

    tracing::info!("Packaged {} ({} files)", archive.display(), staged.len());

    Ok(Package {
        application_name: app.name.clone(),
        binary,
        extra_artifacts: shipped,
        archive_path: archive,
    })
}

/// Remove the shared staging directory once no application is staged in it.
fn remove_staging_parent(dir: &Path) {
    match std::fs::remove_dir(dir) {
        Ok(()) => {}
        Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::DirectoryNotEmpty) => {}
        Err(e) => tracing::debug!("Leaving {} in place: {}", dir.display(), e),
    }
}

/// Forward-slash entry name.
fn archive_name(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn write_zip(file: &File, entries: &[(String, PathBuf, u32)]) -> Result<()> {
    let mut zip = zip::ZipWriter::new(file);
    for (name, path, mode) in entries {
        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default())
            .unix_permissions(*mode);
        let data = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        zip.start_file(name.as_str(), options)?;
        zip.write_all(&data)?;
    }
    zip.finish()?;
    Ok(())
}

fn write_tar_gz(file: &File, entries: &[(String, PathBuf, u32)]) -> Result<()> {
    let encoder = GzEncoder::new(file, Compression::default());
    let mut tar = tar::Builder::new(encoder);
    for (name, path, mode) in entries {
        let data = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(*mode);
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);
        tar.append_data(&mut header, name, data.as_slice())?;
    }
    tar.into_inner()?.finish()?;
    Ok(())
}
