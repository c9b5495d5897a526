//! Fetching dependency sources into a step's work directory.
//!
//! Tarballs are verified against their SHA-256 and kept in a download cache
//! keyed by that checksum, so building the same dependency for a second
//! context never downloads it again.

use std::io::{Cursor, Write};
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use git2::{Repository, ResetType};

use crate::core::step::{BuildStep, FetchSpec};
use crate::util::fs::{copy_dir_all, ensure_dir, remove_dir_all_if_exists};
use crate::util::hash::{sha256_bytes, verify_sha256};

/// Fetch a step's sources into its `src` directory.
///
/// Any previous content of the directory (a partial earlier run) is
/// discarded first. Returns the source directory.
pub fn fetch_source(step: &BuildStep, downloads_dir: &Path) -> Result<PathBuf> {
    let dest = step.src_dir();
    remove_dir_all_if_exists(&dest)?;
    ensure_dir(&step.build_dir())?;

    match &step.fetch {
        FetchSpec::Url {
            url,
            sha256,
            strip_prefix,
        } => {
            let data = download_cached(url, sha256, downloads_dir)?;
            extract_tarball(&data, &dest, strip_prefix.as_deref())
                .with_context(|| format!("failed to extract {}", url))?;
        }
        FetchSpec::Git { url, rev } => {
            clone_at(url, rev.as_deref(), &dest)?;
        }
        FetchSpec::Path { path } => {
            if !path.is_dir() {
                bail!("source directory does not exist: {}", path.display());
            }
            copy_dir_all(path, &dest)?;
        }
    }

    tracing::debug!("Fetched {} into {}", step.fetch.describe(), dest.display());
    Ok(dest)
}

/// Get an archive from the download cache, downloading it on a miss.
pub fn download_cached(url: &str, sha256: &str, downloads_dir: &Path) -> Result<Vec<u8>> {
    let cached = downloads_dir.join(sha256.to_lowercase());

    if cached.is_file() {
        let data = std::fs::read(&cached)
            .with_context(|| format!("failed to read {}", cached.display()))?;
        if verify_sha256(&data, sha256).is_ok() {
            tracing::debug!("Using cached download {}", cached.display());
            return Ok(data);
        }
        tracing::warn!("Cached download {} is corrupt, fetching again", cached.display());
    }

    let data = download(url)?;
    verify_sha256(&data, sha256).with_context(|| format!("download of {} rejected", url))?;

    ensure_dir(downloads_dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(downloads_dir)?;
    tmp.write_all(&data)?;
    tmp.persist(&cached)
        .with_context(|| format!("failed to store {}", cached.display()))?;

    Ok(data)
}

fn download(url: &str) -> Result<Vec<u8>> {
    let parsed = url::Url::parse(url).with_context(|| format!("invalid url: {}", url))?;

    if parsed.scheme() == "file" {
        let path = parsed
            .to_file_path()
            .map_err(|_| anyhow::anyhow!("invalid file url: {}", url))?;
        return std::fs::read(&path).with_context(|| format!("failed to read {}", path.display()));
    }

    tracing::info!("Downloading {}", url);
    let response = reqwest::blocking::get(url)
        .with_context(|| format!("failed to download {}", url))?;

    if !response.status().is_success() {
        bail!("failed to download {}: HTTP {}", url, response.status());
    }

    let bytes = response
        .bytes()
        .with_context(|| format!("failed to read response body of {}", url))?;
    tracing::debug!("Downloaded {} ({} bytes, sha256 {})", url, bytes.len(), &sha256_bytes(&bytes)[..16]);
    Ok(bytes.to_vec())
}

fn clone_at(url: &str, rev: Option<&str>, dest: &Path) -> Result<()> {
    tracing::info!("Cloning {}", url);

    let repo = Repository::clone(url, dest).with_context(|| format!("failed to clone {}", url))?;

    if let Some(rev) = rev {
        let object = repo
            .revparse_single(rev)
            .or_else(|_| repo.revparse_single(&format!("origin/{}", rev)))
            .with_context(|| format!("revision `{}` not found in {}", rev, url))?;
        let commit = object.peel_to_commit()?;
        repo.reset(commit.as_object(), ResetType::Hard, None)?;
        tracing::debug!("Checked out {} at {}", url, commit.id());
    }

    Ok(())
}

/// Extract a gzip-compressed tarball, optionally stripping a leading directory.
pub fn extract_tarball(data: &[u8], dest: &Path, strip_prefix: Option<&str>) -> Result<()> {
    use flate2::read::GzDecoder;
    use tar::Archive;

    let mut archive = Archive::new(GzDecoder::new(Cursor::new(data)));
    ensure_dir(dest)?;

    let prefix = strip_prefix.map(|p| p.trim_end_matches('/'));

    for entry in archive.entries().context("failed to read tarball entries")? {
        let mut entry = entry.context("failed to read tarball entry")?;
        let entry_path = entry.path().context("failed to get entry path")?.into_owned();

        let relative = match prefix {
            Some(prefix) => match entry_path.strip_prefix(prefix) {
                Ok(rest) => rest.to_path_buf(),
                Err(_) => entry_path.clone(),
            },
            None => entry_path.clone(),
        };

        if relative.as_os_str().is_empty() {
            continue;
        }
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            bail!(
                "tarball entry escapes destination directory: {}",
                entry_path.display()
            );
        }

        let output_path = dest.join(&relative);
        if let Some(parent) = output_path.parent() {
            ensure_dir(parent)?;
        }

        match entry.header().entry_type() {
            tar::EntryType::Directory => ensure_dir(&output_path)?,
            tar::EntryType::Regular
            | tar::EntryType::Continuous
            | tar::EntryType::Symlink
            | tar::EntryType::Link => {
                entry.unpack(&output_path).with_context(|| {
                    format!("failed to extract file: {}", output_path.display())
                })?;
            }
            other => {
                tracing::debug!("Skipping tarball entry {:?} of type {:?}", entry_path, other);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::toolchain::ToolchainRole;
    use crate::core::step::BuildSystem;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn tarball(files: &[(&str, &str)]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (path, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, content.as_bytes()).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn step(work: &Path, fetch: FetchSpec) -> BuildStep {
        BuildStep {
            id: "fftw".to_string(),
            role: ToolchainRole::Target,
            fetch,
            build_system: BuildSystem::Autotools,
            configure_args: Vec::new(),
            build_command: None,
            install_command: None,
            install_prefix: work.join("prefix"),
            cache_marker: work.join("prefix/lib/libfftw3f.a"),
            required: true,
            ldflags: Vec::new(),
            env: BTreeMap::new(),
            reuse_prefix: None,
            work_dir: work.join("work"),
        }
    }

    #[test]
    fn test_extract_tarball_strip_prefix() {
        let tmp = TempDir::new().unwrap();
        let data = tarball(&[
            ("fftw-3.3.10/configure", "#!/bin/sh"),
            ("fftw-3.3.10/api/fftw3.h", "/* api */"),
        ]);

        extract_tarball(&data, tmp.path(), Some("fftw-3.3.10/")).unwrap();

        assert!(tmp.path().join("configure").exists());
        assert!(tmp.path().join("api/fftw3.h").exists());
        assert!(!tmp.path().join("fftw-3.3.10").exists());
    }

    #[test]
    fn test_url_fetch_uses_download_cache() {
        let tmp = TempDir::new().unwrap();
        let data = tarball(&[("pkg/configure", "#!/bin/sh")]);
        let archive = tmp.path().join("pkg.tar.gz");
        std::fs::write(&archive, &data).unwrap();
        let sha256 = sha256_bytes(&data);

        let url = url::Url::from_file_path(&archive).unwrap().to_string();
        let downloads = tmp.path().join("downloads");
        let s = step(
            tmp.path(),
            FetchSpec::Url {
                url,
                sha256: sha256.clone(),
                strip_prefix: Some("pkg".to_string()),
            },
        );

        let src = fetch_source(&s, &downloads).unwrap();
        assert!(src.join("configure").exists());
        assert!(downloads.join(&sha256).exists());

        // The cached copy is used once the original is gone
        std::fs::remove_file(&archive).unwrap();
        let src = fetch_source(&s, &downloads).unwrap();
        assert!(src.join("configure").exists());
    }

    #[test]
    fn test_url_fetch_rejects_checksum_mismatch() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("pkg.tar.gz");
        std::fs::write(&archive, tarball(&[("a", "b")])).unwrap();

        let s = step(
            tmp.path(),
            FetchSpec::Url {
                url: url::Url::from_file_path(&archive).unwrap().to_string(),
                sha256: "00".repeat(32),
                strip_prefix: None,
            },
        );

        let err = fetch_source(&s, &tmp.path().join("downloads")).unwrap_err();
        assert!(format!("{:#}", err).contains("checksum mismatch"));
        assert!(!tmp.path().join("downloads").join("00".repeat(32)).exists());
    }

    #[test]
    fn test_path_fetch_replaces_previous_sources() {
        let tmp = TempDir::new().unwrap();
        let local = tmp.path().join("local");
        std::fs::create_dir_all(&local).unwrap();
        std::fs::write(local.join("build.sh"), "echo").unwrap();

        let s = step(tmp.path(), FetchSpec::Path { path: local });
        std::fs::create_dir_all(s.src_dir()).unwrap();
        std::fs::write(s.src_dir().join("stale.o"), "").unwrap();

        let src = fetch_source(&s, &tmp.path().join("downloads")).unwrap();
        assert!(src.join("build.sh").exists());
        assert!(!src.join("stale.o").exists());
        assert!(s.build_dir().is_dir());
    }

    #[test]
    fn test_path_fetch_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let s = step(
            tmp.path(),
            FetchSpec::Path {
                path: tmp.path().join("missing"),
            },
        );
        assert!(fetch_source(&s, &tmp.path().join("downloads")).is_err());
    }
}
