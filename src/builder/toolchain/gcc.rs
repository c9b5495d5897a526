//! GCC-family tool naming and command generation.

use std::path::{Path, PathBuf};

use super::{CommandSpec, CompilerPaths};

/// GCC/binutils tool set, native or prefixed with a cross triple.
#[derive(Debug, Clone)]
pub struct GccTools {
    /// Tool prefix including the trailing dash (`x86_64-w64-mingw32-`), empty for native
    prefix: String,
    /// Suffix appended to the compiler drivers (`-posix` for MinGW thread model)
    driver_suffix: String,
}

impl GccTools {
    /// Native tools (`cc`, `c++`, `ar`, ...).
    pub fn native() -> Self {
        GccTools {
            prefix: String::new(),
            driver_suffix: String::new(),
        }
    }

    /// Cross tools for a GNU triple.
    pub fn cross(gnu_triple: &str, posix_threads: bool) -> Self {
        GccTools {
            prefix: format!("{}-", gnu_triple),
            driver_suffix: if posix_threads { "-posix".to_string() } else { String::new() },
        }
    }

    fn tool(&self, name: &str) -> PathBuf {
        PathBuf::from(format!("{}{}", self.prefix, name))
    }

    /// Compiler paths for this tool set.
    pub fn compiler_paths(&self) -> CompilerPaths {
        let (cc, cxx) = if self.prefix.is_empty() {
            (PathBuf::from("cc"), PathBuf::from("c++"))
        } else {
            (
                self.tool(&format!("gcc{}", self.driver_suffix)),
                self.tool(&format!("g++{}", self.driver_suffix)),
            )
        };

        CompilerPaths {
            cc,
            cxx,
            ar: self.tool("ar"),
            ranlib: self.tool("ranlib"),
            linker: self.tool("ld"),
        }
    }

    /// The objdump of this tool set.
    pub fn objdump(&self) -> PathBuf {
        self.tool("objdump")
    }

    /// C++ driver next to a C driver: `*gcc[-posix]` becomes `*g++[-posix]`,
    /// `cc` becomes `c++`, anything else gets `++` appended.
    pub fn infer_cxx(cc: &Path) -> PathBuf {
        let name = cc
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let cxx = if let Some(stem) = name.strip_suffix("gcc-posix") {
            format!("{}g++-posix", stem)
        } else if let Some(stem) = name.strip_suffix("gcc") {
            format!("{}g++", stem)
        } else if name == "cc" || name.ends_with("-cc") {
            format!("{}++", &name[..name.len() - 1])
        } else {
            format!("{}++", name)
        };
        cc.with_file_name(cxx)
    }
}

/// Input for a compile-and-link step of a C/C++ application.
#[derive(Debug, Clone)]
pub struct LinkInput {
    /// Source files compiled into the executable
    pub sources: Vec<PathBuf>,
    /// Output executable
    pub output: PathBuf,
    /// Include search paths
    pub include_dirs: Vec<PathBuf>,
    /// Library search paths
    pub lib_dirs: Vec<PathBuf>,
    /// Libraries to link (without -l prefix)
    pub libs: Vec<String>,
    /// Additional compiler flags
    pub cflags: Vec<String>,
    /// Additional linker flags
    pub ldflags: Vec<String>,
}

/// Generate a single compile+link command for an executable.
pub fn link_exe_command(compilers: &CompilerPaths, input: &LinkInput, cxx: bool) -> CommandSpec {
    let driver = if cxx { &compilers.cxx } else { &compilers.cc };
    // Libraries come after the sources so static archives resolve
    CommandSpec::new(driver)
        .args(input.cflags.iter().cloned())
        .args(input.include_dirs.iter().map(|d| format!("-I{}", d.display())))
        .arg("-o")
        .arg(input.output.display().to_string())
        .args(input.sources.iter().map(|s| s.display().to_string()))
        .args(input.lib_dirs.iter().map(|d| format!("-L{}", d.display())))
        .args(input.libs.iter().map(|l| format!("-l{}", l)))
        .args(input.ldflags.iter().cloned())
}
