//! Per-invocation state shared by the commands: working directory, cache
//! root, output flags and the merged `config.toml`.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use directories::ProjectDirs;

use crate::builder::toolchain::ToolchainRole;
use crate::core::manifest::{find_manifest, MANIFEST_NAME};
use crate::util::config::{global_config_path, load_config, project_config_path, Config};

/// Environment variable naming the cache root.
pub const CACHE_DIR_ENV: &str = "CROSSBUILD_CACHE_DIR";

static PROJECT_DIRS: LazyLock<Option<ProjectDirs>> =
    LazyLock::new(|| ProjectDirs::from("com", "crossbuild", "crossbuild"));

#[derive(Debug, Clone)]
pub struct GlobalContext {
    cwd: PathBuf,
    /// Holds install prefixes, work trees and downloads
    cache_root: PathBuf,
    verbose: bool,
    color: bool,
    config: Config,
}

impl GlobalContext {
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        Ok(Self::with_cwd(cwd))
    }

    /// The cache root comes from `CROSSBUILD_CACHE_DIR`, then the `cache-dir`
    /// config setting, then the platform cache directory.
    pub fn with_cwd(cwd: PathBuf) -> Self {
        let config = load_config(global_config_path().as_deref(), &project_config_path(&cwd));

        let cache_root = std::env::var_os(CACHE_DIR_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| config.build.cache_dir.clone())
            .unwrap_or_else(default_cache_root);

        GlobalContext {
            cache_root: absolutize(&cwd, cache_root),
            cwd,
            verbose: false,
            color: true,
            config,
        }
    }

    /// Override the cache root (`--cache-dir`).
    pub fn set_cache_root(&mut self, path: impl Into<PathBuf>) {
        self.cache_root = absolutize(&self.cwd, path.into());
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub fn set_color(&mut self, color: bool) {
        self.color = color;
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn color(&self) -> bool {
        self.color
    }

    /// Parallel jobs: configured value or available parallelism.
    pub fn default_jobs(&self) -> usize {
        self.config.build.jobs.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    /// Nearest `Crossbuild.toml` in the working directory or above it.
    pub fn find_manifest(&self) -> Result<PathBuf> {
        self.cwd
            .ancestors()
            .find_map(find_manifest)
            .with_context(|| {
                format!(
                    "could not find `{}` in `{}` or any parent directory",
                    MANIFEST_NAME,
                    self.cwd.display()
                )
            })
    }
}

/// Install prefix layout: `<cache>/<role>-<gnu-triple>/<id>`.
pub fn prefix_dir(cache_root: &Path, role: ToolchainRole, gnu_triple: &str, id: &str) -> PathBuf {
    cache_root.join(format!("{}-{}", role, gnu_triple)).join(id)
}

/// Work directory layout: `<cache>/work/<role>-<gnu-triple>/<id>`.
pub fn work_dir(cache_root: &Path, role: ToolchainRole, gnu_triple: &str, id: &str) -> PathBuf {
    cache_root
        .join("work")
        .join(format!("{}-{}", role, gnu_triple))
        .join(id)
}

fn default_cache_root() -> PathBuf {
    match PROJECT_DIRS.as_ref() {
        Some(dirs) => dirs.cache_dir().to_path_buf(),
        None => PathBuf::from(".crossbuild-cache"),
    }
}

fn absolutize(cwd: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        cwd.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cache_layout() {
        let tmp = TempDir::new().unwrap();
        let mut ctx = GlobalContext::with_cwd(tmp.path().to_path_buf());
        ctx.set_cache_root("cache");

        let root = ctx.cache_root();
        assert_eq!(root, tmp.path().join("cache"));
        assert_eq!(
            prefix_dir(root, ToolchainRole::Target, "x86_64-w64-mingw32", "essentia"),
            tmp.path().join("cache/target-x86_64-w64-mingw32/essentia")
        );
        assert_eq!(
            work_dir(root, ToolchainRole::Host, "x86_64-linux-gnu", "fftw"),
            tmp.path().join("cache/work/host-x86_64-linux-gnu/fftw")
        );
    }

    #[test]
    fn test_find_manifest_walks_up() {
        let tmp = TempDir::new().unwrap();
        let manifest = tmp.path().join(MANIFEST_NAME);
        std::fs::write(&manifest, "").unwrap();
        let nested = tmp.path().join("crates/mesh-player");
        std::fs::create_dir_all(&nested).unwrap();

        let ctx = GlobalContext::with_cwd(nested);
        assert_eq!(ctx.find_manifest().unwrap(), manifest);
    }

    #[test]
    fn test_find_manifest_missing() {
        let tmp = TempDir::new().unwrap();
        let ctx = GlobalContext::with_cwd(tmp.path().to_path_buf());
        // A Crossbuild.toml above the temp dir would be found; none is expected
        if let Err(e) = ctx.find_manifest() {
            assert!(e.to_string().contains(MANIFEST_NAME));
        }
    }
}
