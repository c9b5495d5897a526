//! Cache inspection and invalidation.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Serialize;

use crate::builder::dual::DualContextBuilder;
use crate::builder::fingerprint::{step_fingerprint, InstallRecord};
use crate::builder::toolchain::{ResolvedContexts, ToolchainRole};
use crate::core::manifest::Manifest;
use crate::util::fs::dir_size;

/// Cache state of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum CacheState {
    /// Marker missing; the next build runs the step
    NotBuilt,
    /// Marker present and the recorded inputs match the manifest
    Current,
    /// Marker present but the inputs changed since the install
    Stale { recorded: String, current: String },
    /// Marker present without an install record
    Unrecorded,
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheState::NotBuilt => write!(f, "not built"),
            CacheState::Current => write!(f, "cached"),
            CacheState::Stale { recorded, current } => {
                write!(f, "cached, inputs changed ({} -> {})", recorded, current)
            }
            CacheState::Unrecorded => write!(f, "cached, no install record"),
        }
    }
}

/// One step of the cache report.
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntry {
    pub id: String,
    pub role: ToolchainRole,
    pub prefix: PathBuf,
    pub marker: PathBuf,
    /// Bytes below the prefix
    pub size: u64,
    #[serde(flatten)]
    pub state: CacheState,
}

/// Report the cache state of every step of a manifest.
///
/// A stale entry is only reported; the next build still skips it until its
/// marker is removed.
pub fn cache_status(
    manifest: &Manifest,
    contexts: &ResolvedContexts,
    cache_root: &Path,
) -> Result<Vec<CacheEntry>> {
    let dual = DualContextBuilder::new(contexts, cache_root);
    let mut entries = Vec::new();

    for role in [ToolchainRole::Target, ToolchainRole::Host] {
        let ctx = contexts.get(role);
        for step in dual.graph(&manifest.dependencies, role).steps {
            let state = if !step.is_cached() {
                CacheState::NotBuilt
            } else {
                match InstallRecord::load(&step.install_prefix)? {
                    None => CacheState::Unrecorded,
                    Some(record) => {
                        let current = step_fingerprint(&step, ctx);
                        if record.fingerprint == current {
                            CacheState::Current
                        } else {
                            CacheState::Stale {
                                recorded: record.fingerprint,
                                current,
                            }
                        }
                    }
                }
            };

            entries.push(CacheEntry {
                size: dir_size(&step.install_prefix),
                id: step.id,
                role,
                prefix: step.install_prefix,
                marker: step.cache_marker,
                state,
            });
        }
    }

    Ok(entries)
}

/// Remove the cache markers of a dependency so the next build reruns it.
///
/// With `role` set only that context's marker is removed. Returns the
/// markers that existed and were deleted.
pub fn invalidate(
    manifest: &Manifest,
    contexts: &ResolvedContexts,
    cache_root: &Path,
    id: &str,
    role: Option<ToolchainRole>,
) -> Result<Vec<PathBuf>> {
    let Some(dep) = manifest.dependency(id) else {
        let known: Vec<&str> = manifest.dependencies.iter().map(|d| d.id.as_str()).collect();
        bail!(
            "unknown dependency `{}`\navailable dependencies: {}",
            id,
            if known.is_empty() {
                "(none)".to_string()
            } else {
                known.join(", ")
            }
        );
    };

    if let Some(role) = role {
        if !dep.builds_in(role) {
            bail!("`{}` is not built in the {} context", id, role);
        }
    }

    let dual = DualContextBuilder::new(contexts, cache_root);
    let mut removed = Vec::new();
    for r in dep.contexts.iter().filter(|r| role.is_none_or(|want| want == **r)) {
        let marker = dual.step(dep, *r).cache_marker;
        if marker.exists() {
            std::fs::remove_file(&marker)
                .with_context(|| format!("failed to remove {}", marker.display()))?;
            tracing::info!("Invalidated {} ({})", id, r);
            removed.push(marker);
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{mesh_manifest, test_contexts, touch};
    use tempfile::TempDir;

    #[test]
    fn test_status_states() {
        let tmp = TempDir::new().unwrap();
        let manifest = mesh_manifest(tmp.path());
        let contexts = test_contexts();
        let dual = DualContextBuilder::new(&contexts, tmp.path());

        let fftw = dual.step(manifest.dependency("fftw").unwrap(), ToolchainRole::Target);
        touch(&fftw.cache_marker);
        InstallRecord::new(&fftw, &contexts.target)
            .save(&fftw.install_prefix)
            .unwrap();

        let mut essentia = dual.step(manifest.dependency("essentia").unwrap(), ToolchainRole::Target);
        touch(&essentia.cache_marker);
        essentia.configure_args.push("--with-vamp".to_string());
        InstallRecord::new(&essentia, &contexts.target)
            .save(&essentia.install_prefix)
            .unwrap();

        let madmom = dual.step(manifest.dependency("madmom").unwrap(), ToolchainRole::Target);
        touch(&madmom.cache_marker);

        let entries = cache_status(&manifest, &contexts, tmp.path()).unwrap();
        assert_eq!(entries.len(), 5);
        assert_eq!(entries[0].state, CacheState::Current);
        assert!(matches!(entries[1].state, CacheState::Stale { .. }));
        assert_eq!(entries[2].state, CacheState::Unrecorded);
        assert_eq!(entries[3].role, ToolchainRole::Host);
        assert_eq!(entries[3].state, CacheState::NotBuilt);
        assert_eq!(entries[3].state.to_string(), "not built");
    }

    #[test]
    fn test_invalidate_removes_only_markers() {
        let tmp = TempDir::new().unwrap();
        let manifest = mesh_manifest(tmp.path());
        let contexts = test_contexts();
        let dual = DualContextBuilder::new(&contexts, tmp.path());
        let dep = manifest.dependency("essentia").unwrap();

        let target = dual.step(dep, ToolchainRole::Target);
        let host = dual.step(dep, ToolchainRole::Host);
        touch(&target.cache_marker);
        touch(&target.install_prefix.join("include/essentia/essentia.h"));
        touch(&host.cache_marker);

        let removed = invalidate(&manifest, &contexts, tmp.path(), "essentia", Some(ToolchainRole::Host))
            .unwrap();
        assert_eq!(removed, vec![host.cache_marker.clone()]);
        assert!(target.cache_marker.exists());

        let removed = invalidate(&manifest, &contexts, tmp.path(), "essentia", None).unwrap();
        assert_eq!(removed, vec![target.cache_marker.clone()]);
        assert!(target.install_prefix.join("include/essentia/essentia.h").exists());
    }

    #[test]
    fn test_invalidate_errors() {
        let tmp = TempDir::new().unwrap();
        let manifest = mesh_manifest(tmp.path());
        let contexts = test_contexts();

        let err = invalidate(&manifest, &contexts, tmp.path(), "chromaprint", None).unwrap_err();
        assert!(err.to_string().contains("available dependencies: fftw, essentia, madmom"));

        let err = invalidate(&manifest, &contexts, tmp.path(), "fftw", Some(ToolchainRole::Host))
            .unwrap_err();
        assert!(err.to_string().contains("not built in the host context"));
    }
}
