//! Target platform descriptions.
//!
//! A platform bundles everything the orchestrator needs to know about where
//! a binary will run: the GNU triple used to name cross tools, the Rust
//! triple handed to cargo, and the conventions that differ between PE and
//! ELF targets (symbol visibility, archive format, runtime library layout).

use std::fmt;

use serde::Serialize;

/// Target triple components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetTriple {
    /// CPU architecture (x86_64, aarch64, etc.)
    pub arch: String,
    /// Vendor (unknown, w64, pc, etc.)
    pub vendor: String,
    /// Operating system (linux, mingw32, windows, etc.)
    pub os: String,
    /// Environment/ABI (gnu, gnueabihf, etc.)
    pub env: Option<String>,
}

impl TargetTriple {
    /// Create a new target triple.
    pub fn new(arch: &str, vendor: &str, os: &str, env: Option<&str>) -> Self {
        TargetTriple {
            arch: arch.to_string(),
            vendor: vendor.to_string(),
            os: os.to_string(),
            env: env.map(|s| s.to_string()),
        }
    }

    /// Parse a target triple string.
    ///
    /// GNU cross triples frequently omit the vendor (`aarch64-linux-gnu`),
    /// so three-part triples whose last component is an ABI are read as
    /// `arch-os-env` with an `unknown` vendor.
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.split('-').collect();
        match parts.as_slice() {
            [arch, os, env] if env.starts_with("gnu") => {
                Some(TargetTriple::new(arch, "unknown", os, Some(env)))
            }
            [arch, vendor, os] => Some(TargetTriple::new(arch, vendor, os, None)),
            [arch, vendor, os, env] => Some(TargetTriple::new(arch, vendor, os, Some(env))),
            _ => None,
        }
    }

    /// Triple with `-` replaced by `_`, as used in cargo/cc-rs variable names.
    pub fn env_suffix(&self) -> String {
        self.to_string().replace('-', "_")
    }
}

impl fmt::Display for TargetTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.env {
            Some(env) => write!(f, "{}-{}-{}-{}", self.arch, self.vendor, self.os, env),
            None => write!(f, "{}-{}-{}", self.arch, self.vendor, self.os),
        }
    }
}

/// How the platform's linker treats symbols of shared libraries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SymbolConvention {
    /// Every non-static symbol is exported automatically (ELF).
    ExportAll,
    /// Nothing is exported unless asked for (PE/DLL).
    HiddenByDefault,
}

/// Object file format of produced binaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BinaryFormat {
    Pe,
    Elf,
}

/// Archive format of distributable packages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    /// File extension without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::TarGz => "tar.gz",
        }
    }
}

/// A platform binaries are built for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetPlatform {
    /// Short identifier used on the command line and in archive names
    pub id: String,
    /// GNU triple, used as the prefix of cross tools
    pub gnu_triple: String,
    /// Rust triple, passed to `cargo --target`
    pub rust_triple: TargetTriple,
    /// Executable suffix (".exe" or "")
    pub exe_suffix: &'static str,
    /// Shared library extension without dot
    pub shared_lib_extension: &'static str,
    /// Linker symbol visibility convention
    pub symbol_convention: SymbolConvention,
    /// Object format of binaries
    pub binary_format: BinaryFormat,
    /// Format of produced packages
    pub archive_format: ArchiveFormat,
    /// Directory (relative to an install prefix) holding runtime libraries
    pub runtime_lib_dir: &'static str,
    /// Whether the GNU tools carry a `-posix` thread-model suffix
    pub posix_threads_suffix: bool,
}

/// Platform identifiers with a known cross-compiler mapping.
pub const SUPPORTED_PLATFORMS: &[&str] = &[
    "windows",
    "windows-x86_64",
    "windows-i686",
    "linux-aarch64",
    "linux-armv7",
    "linux-x86_64",
];

impl TargetPlatform {
    /// Look up a platform by identifier.
    ///
    /// Returns `None` if no cross-compiler mapping exists.
    pub fn lookup(id: &str) -> Option<Self> {
        let platform = match id {
            "windows" | "windows-x86_64" => {
                Self::windows(id, "x86_64-w64-mingw32", TargetTriple::new("x86_64", "pc", "windows", Some("gnu")))
            }
            "windows-i686" => {
                Self::windows(id, "i686-w64-mingw32", TargetTriple::new("i686", "pc", "windows", Some("gnu")))
            }
            "linux-aarch64" => Self::linux(
                id,
                "aarch64-linux-gnu",
                TargetTriple::new("aarch64", "unknown", "linux", Some("gnu")),
            ),
            "linux-armv7" => Self::linux(
                id,
                "arm-linux-gnueabihf",
                TargetTriple::new("armv7", "unknown", "linux", Some("gnueabihf")),
            ),
            "linux-x86_64" => Self::linux(
                id,
                "x86_64-linux-gnu",
                TargetTriple::new("x86_64", "unknown", "linux", Some("gnu")),
            ),
            _ => return None,
        };
        Some(platform)
    }

    /// Describe the machine this process runs on.
    pub fn host() -> Self {
        let arch = std::env::consts::ARCH;
        match std::env::consts::OS {
            "windows" => {
                let gnu = format!("{}-w64-mingw32", arch);
                Self::windows("host", &gnu, TargetTriple::new(arch, "pc", "windows", Some("msvc")))
            }
            "macos" => TargetPlatform {
                id: "host".to_string(),
                gnu_triple: format!("{}-apple-darwin", arch),
                rust_triple: TargetTriple::new(arch, "apple", "darwin", None),
                exe_suffix: "",
                shared_lib_extension: "dylib",
                symbol_convention: SymbolConvention::ExportAll,
                binary_format: BinaryFormat::Elf,
                archive_format: ArchiveFormat::TarGz,
                runtime_lib_dir: "lib",
                posix_threads_suffix: false,
            },
            _ => {
                let gnu = format!("{}-linux-gnu", arch);
                Self::linux("host", &gnu, TargetTriple::new(arch, "unknown", "linux", Some("gnu")))
            }
        }
    }

    fn windows(id: &str, gnu_triple: &str, rust_triple: TargetTriple) -> Self {
        TargetPlatform {
            id: id.to_string(),
            gnu_triple: gnu_triple.to_string(),
            rust_triple,
            exe_suffix: ".exe",
            shared_lib_extension: "dll",
            symbol_convention: SymbolConvention::HiddenByDefault,
            binary_format: BinaryFormat::Pe,
            archive_format: ArchiveFormat::Zip,
            runtime_lib_dir: "bin",
            posix_threads_suffix: true,
        }
    }

    fn linux(id: &str, gnu_triple: &str, rust_triple: TargetTriple) -> Self {
        TargetPlatform {
            id: id.to_string(),
            gnu_triple: gnu_triple.to_string(),
            rust_triple,
            exe_suffix: "",
            shared_lib_extension: "so",
            symbol_convention: SymbolConvention::ExportAll,
            binary_format: BinaryFormat::Elf,
            archive_format: ArchiveFormat::TarGz,
            runtime_lib_dir: "lib",
            posix_threads_suffix: false,
        }
    }

    /// Short name used in archive file names (`mesh-player_win.zip`).
    pub fn archive_tag(&self) -> &str {
        match self.id.as_str() {
            "windows" | "windows-x86_64" => "win",
            "windows-i686" => "win32",
            other => other,
        }
    }

    /// Whether produced shared libraries need an explicit export-all directive.
    pub fn needs_export_all_symbols(&self) -> bool {
        self.symbol_convention == SymbolConvention::HiddenByDefault
    }

    /// Executable file name for a binary base name.
    pub fn exe_name(&self, base: &str) -> String {
        if base.ends_with(self.exe_suffix) {
            base.to_string()
        } else {
            format!("{}{}", base, self.exe_suffix)
        }
    }

    /// Whether library names should be compared case-insensitively.
    pub fn case_insensitive_names(&self) -> bool {
        self.binary_format == BinaryFormat::Pe
    }
}

impl fmt::Display for TargetPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.gnu_triple)
    }
}
