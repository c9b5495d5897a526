//! Step fingerprints and install records.
//!
//! A fingerprint captures the inputs of a build step. It is recorded next to
//! the install prefix after a successful install so `cache status` can tell
//! when a cached prefix no longer matches the manifest. The cache marker
//! alone decides whether a step runs; fingerprints are informational.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::builder::toolchain::ToolchainContext;
use crate::core::step::{BuildStep, BuildSystem};
use crate::util::hash::Fingerprint;

/// File name of the install record inside a prefix.
pub const INSTALL_RECORD_NAME: &str = ".crossbuild-install.json";

/// Fingerprint of everything that shapes a step's installation.
pub fn step_fingerprint(step: &BuildStep, ctx: &ToolchainContext) -> String {
    let mut fp = Fingerprint::new();
    fp.update_str(&step.id)
        .update_str(step.role.as_str())
        .update_str(&ctx.platform.gnu_triple)
        .update_str(&step.fetch.describe())
        .update_str(step.build_system.name());

    if let BuildSystem::Custom(custom) = &step.build_system {
        fp.update_list(custom.configure.iter().map(|s| s.as_str()))
            .update_list(custom.build.iter().map(|s| s.as_str()))
            .update_list(custom.install.iter().map(|s| s.as_str()));
    }

    fp.update_list(step.configure_args.iter().map(|s| s.as_str()))
        .update_opt(step.build_command.as_ref().map(|c| c.join(" ")).as_deref())
        .update_opt(step.install_command.as_ref().map(|c| c.join(" ")).as_deref())
        .update_list(step.ldflags.iter().map(|s| s.as_str()));

    for (key, value) in &step.env {
        fp.update_str(key).update_str(value);
    }

    fp.update_path(&ctx.compilers.cc)
        .update_path(&ctx.compilers.cxx)
        .update_opt(ctx.sysroot.as_ref().map(|p| p.display().to_string()).as_deref())
        .update_bool(ctx.debug);

    fp.finish_short()
}

/// Metadata written next to an installed prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRecord {
    pub step: String,
    pub role: String,
    pub triple: String,
    pub fingerprint: String,
    /// Seconds since the Unix epoch
    pub installed_at: u64,
}

impl InstallRecord {
    /// Record for a step that just installed.
    pub fn new(step: &BuildStep, ctx: &ToolchainContext) -> Self {
        let installed_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        InstallRecord {
            step: step.id.clone(),
            role: step.role.to_string(),
            triple: ctx.platform.gnu_triple.clone(),
            fingerprint: step_fingerprint(step, ctx),
            installed_at,
        }
    }

    /// Path of the record for an install prefix.
    pub fn path_for(prefix: &Path) -> PathBuf {
        prefix.join(INSTALL_RECORD_NAME)
    }

    /// Load the record of a prefix, `None` when there is none.
    pub fn load(prefix: &Path) -> Result<Option<Self>> {
        let path = Self::path_for(prefix);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let record = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(Some(record))
    }

    /// Save the record into a prefix.
    pub fn save(&self, prefix: &Path) -> Result<()> {
        std::fs::create_dir_all(prefix)?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(Self::path_for(prefix), content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{autotools_step, test_contexts};
    use tempfile::TempDir;

    #[test]
    fn test_fingerprint_tracks_inputs() {
        let contexts = test_contexts();
        let step = autotools_step("/cache", &contexts.target, "fftw");

        let fp1 = step_fingerprint(&step, &contexts.target);
        let fp2 = step_fingerprint(&step.clone(), &contexts.target);
        assert_eq!(fp1, fp2);

        let mut changed = step.clone();
        changed.configure_args.push("--enable-threads".to_string());
        assert_ne!(fp1, step_fingerprint(&changed, &contexts.target));

        let mut exported = step.clone();
        exported.ldflags.push("-Wl,--export-all-symbols".to_string());
        assert_ne!(fp1, step_fingerprint(&exported, &contexts.target));
    }

    #[test]
    fn test_install_record_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let contexts = test_contexts();
        let step = autotools_step(tmp.path(), &contexts.target, "fftw");

        assert!(InstallRecord::load(&step.install_prefix).unwrap().is_none());

        let record = InstallRecord::new(&step, &contexts.target);
        record.save(&step.install_prefix).unwrap();

        let loaded = InstallRecord::load(&step.install_prefix).unwrap().unwrap();
        assert_eq!(loaded, record);
        assert_eq!(loaded.role, "target");
        assert_eq!(loaded.triple, "x86_64-w64-mingw32");
    }
}
