//! Runtime shared library collection.
//!
//! Dynamic dependencies are read with the context's `objdump -p` and looked
//! up in the install prefixes of the contexts the application was linked
//! against, then in explicitly configured fallback directories.

use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::builder::context::BuildContext;
use crate::builder::toolchain::{CommandSpec, ToolchainContext};
use crate::core::artifact::RuntimeArtifact;

/// `DLL Name: foo.dll` (PE) and `NEEDED libfoo.so.1` (ELF) lines.
static DEPENDENCY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:DLL Name:|NEEDED)\s+(\S+)\s*$").expect("dependency pattern is valid")
});

/// Libraries every Windows installation provides.
const WINDOWS_SYSTEM_LIBRARIES: &[&str] = &[
    "advapi32.dll",
    "bcrypt.dll",
    "comctl32.dll",
    "comdlg32.dll",
    "crypt32.dll",
    "d3d11.dll",
    "d3d12.dll",
    "dwmapi.dll",
    "dxgi.dll",
    "gdi32.dll",
    "imm32.dll",
    "kernel32.dll",
    "msvcrt.dll",
    "ncrypt.dll",
    "ntdll.dll",
    "ole32.dll",
    "oleaut32.dll",
    "opengl32.dll",
    "secur32.dll",
    "setupapi.dll",
    "shell32.dll",
    "shlwapi.dll",
    "ucrtbase.dll",
    "user32.dll",
    "userenv.dll",
    "uxtheme.dll",
    "version.dll",
    "winmm.dll",
    "ws2_32.dll",
];

/// Libraries every glibc system provides.
const ELF_SYSTEM_LIBRARIES: &[&str] = &[
    "libc.so.6",
    "libdl.so.2",
    "libgcc_s.so.1",
    "libm.so.6",
    "libpthread.so.0",
    "librt.so.1",
    "libstdc++.so.6",
];

/// Extract dynamic dependency names from `objdump -p` output.
pub fn parse_dependencies(objdump_output: &str) -> Vec<String> {
    DEPENDENCY_RE
        .captures_iter(objdump_output)
        .map(|c| c[1].to_string())
        .collect()
}

/// Libraries found for a binary and what could not be resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectReport {
    /// Libraries to ship, in discovery order
    pub artifacts: Vec<RuntimeArtifact>,
    /// Names found nowhere
    pub unresolved: Vec<String>,
    /// Non-fatal problems (unresolved names, failed inspections)
    pub warnings: Vec<String>,
}

/// Collects the shared libraries a binary needs at runtime.
pub struct RuntimeCollector<'b, 'a> {
    bcx: &'b mut BuildContext<'a>,
    fallback_dirs: Vec<PathBuf>,
    system_libraries: BTreeSet<String>,
}

impl<'b, 'a> RuntimeCollector<'b, 'a> {
    pub fn new(bcx: &'b mut BuildContext<'a>) -> Self {
        RuntimeCollector {
            bcx,
            fallback_dirs: Vec::new(),
            system_libraries: BTreeSet::new(),
        }
    }

    /// Directories searched after every prefix.
    pub fn with_fallback_dirs(mut self, dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        self.fallback_dirs.extend(dirs);
        self
    }

    /// Extra library names never shipped.
    pub fn with_system_libraries<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.system_libraries
            .extend(names.into_iter().map(|n| n.as_ref().to_ascii_lowercase()));
        self
    }

    /// Walk the dependency closure of `binary`.
    ///
    /// Contexts are searched in the given order; the first is also the one
    /// whose objdump reads the binaries.
    pub fn collect(&mut self, binary: &Path, contexts: &[&ToolchainContext]) -> CollectReport {
        let mut report = CollectReport::default();
        let Some(primary) = contexts.first() else {
            report
                .warnings
                .push(format!("no context to inspect {}", binary.display()));
            return report;
        };
        let case_insensitive = primary.platform.case_insensitive_names();

        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut queue: VecDeque<PathBuf> = VecDeque::from([binary.to_path_buf()]);

        while let Some(file) = queue.pop_front() {
            let names = match self.inspect(&primary.objdump, &file) {
                Ok(names) => names,
                Err(message) => {
                    tracing::warn!("{}", message);
                    report.warnings.push(message);
                    continue;
                }
            };

            for name in names {
                let key = if case_insensitive {
                    name.to_ascii_lowercase()
                } else {
                    name.clone()
                };
                if !seen.insert(key) {
                    continue;
                }

                if self.is_system_library(&name, case_insensitive) {
                    tracing::debug!("Skipping system library {}", name);
                    continue;
                }

                match self.resolve(&name, contexts, case_insensitive) {
                    Some(path) => {
                        tracing::debug!("Resolved {} to {}", name, path.display());
                        queue.push_back(path.clone());
                        report.artifacts.push(RuntimeArtifact::shared_library(path));
                    }
                    None => {
                        let message = format!(
                            "runtime library {} needed by {} was not found",
                            name,
                            file.file_name().unwrap_or_default().to_string_lossy()
                        );
                        tracing::warn!("{}", message);
                        report.warnings.push(message);
                        report.unresolved.push(name);
                    }
                }
            }
        }

        report
    }

    fn inspect(&mut self, objdump: &Path, file: &Path) -> Result<Vec<String>, String> {
        let cmd = CommandSpec::new(objdump)
            .arg("-p")
            .arg(file.display().to_string());
        let BuildContext { runner, env, .. } = &mut *self.bcx;
        match runner.run(&cmd, env) {
            Ok(output) if output.success() => Ok(parse_dependencies(&output.stdout)),
            Ok(output) => Err(format!(
                "could not inspect {}: {}",
                file.display(),
                output.stderr.lines().last().unwrap_or("objdump failed")
            )),
            Err(e) => Err(format!("could not inspect {}: {:#}", file.display(), e)),
        }
    }

    fn is_system_library(&self, name: &str, case_insensitive: bool) -> bool {
        let lower = name.to_ascii_lowercase();
        if self.system_libraries.contains(&lower) {
            return true;
        }
        if case_insensitive {
            lower.starts_with("api-ms-win-")
                || lower.starts_with("ext-ms-")
                || WINDOWS_SYSTEM_LIBRARIES.contains(&lower.as_str())
        } else {
            name.starts_with("ld-linux")
                || name.starts_with("linux-vdso")
                || ELF_SYSTEM_LIBRARIES.contains(&name)
        }
    }

    fn resolve(
        &self,
        name: &str,
        contexts: &[&ToolchainContext],
        case_insensitive: bool,
    ) -> Option<PathBuf> {
        let prefix_dirs = contexts.iter().flat_map(|ctx| {
            let mut subdirs = vec![ctx.platform.runtime_lib_dir];
            subdirs.extend(["lib", "bin"].into_iter().filter(|d| *d != ctx.platform.runtime_lib_dir));
            ctx.search_paths
                .iter()
                .flat_map(move |prefix| subdirs.clone().into_iter().map(move |d| prefix.join(d)))
        });

        prefix_dirs
            .chain(self.fallback_dirs.iter().cloned())
            .find_map(|dir| find_in_dir(&dir, name, case_insensitive))
    }
}

fn find_in_dir(dir: &Path, name: &str, case_insensitive: bool) -> Option<PathBuf> {
    let exact = dir.join(name);
    if exact.is_file() {
        return Some(exact);
    }
    if !case_insensitive {
        return None;
    }

    let entries = std::fs::read_dir(dir).ok()?;
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .find(|p| {
            p.file_name()
                .map(|f| f.to_string_lossy().eq_ignore_ascii_case(name))
                .unwrap_or(false)
        })
}
