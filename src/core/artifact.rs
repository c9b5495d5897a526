//! Files shipped in a package.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// Kind of a shipped file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    Executable,
    SharedLibrary,
    DataFile,
}

impl ArtifactKind {
    /// Unix permissions of the file inside an archive.
    pub fn mode(self) -> u32 {
        match self {
            ArtifactKind::Executable | ArtifactKind::SharedLibrary => 0o755,
            ArtifactKind::DataFile => 0o644,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Executable => write!(f, "executable"),
            ArtifactKind::SharedLibrary => write!(f, "shared library"),
            ArtifactKind::DataFile => write!(f, "data file"),
        }
    }
}

/// A file to place next to an application binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeArtifact {
    /// Where the file is now
    pub source_path: PathBuf,
    pub kind: ArtifactKind,
    /// Path inside the package directory, always relative
    pub destination_name: PathBuf,
}

impl RuntimeArtifact {
    /// A shared library shipped under its file name.
    pub fn shared_library(source_path: PathBuf) -> Self {
        Self::by_file_name(source_path, ArtifactKind::SharedLibrary)
    }

    /// The application binary, shipped under its file name.
    pub fn executable(source_path: PathBuf) -> Self {
        Self::by_file_name(source_path, ArtifactKind::Executable)
    }

    fn by_file_name(source_path: PathBuf, kind: ArtifactKind) -> Self {
        let destination_name = PathBuf::from(source_path.file_name().unwrap_or_default());
        RuntimeArtifact {
            source_path,
            kind,
            destination_name,
        }
    }
}

/// A produced archive and what went into it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Package {
    pub application_name: String,
    pub binary: RuntimeArtifact,
    pub extra_artifacts: Vec<RuntimeArtifact>,
    pub archive_path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_library_destination_is_file_name() {
        let a = RuntimeArtifact::shared_library(PathBuf::from("/cache/target/essentia/bin/libessentia.dll"));
        assert_eq!(a.destination_name, PathBuf::from("libessentia.dll"));
        assert!(a.destination_name.is_relative());
        assert_eq!(a.kind.to_string(), "shared library");
    }

    #[test]
    fn test_executable_and_modes() {
        let exe = RuntimeArtifact::executable(PathBuf::from("/src/target/release/mesh-player.exe"));
        assert_eq!(exe.kind, ArtifactKind::Executable);
        assert_eq!(exe.destination_name, PathBuf::from("mesh-player.exe"));
        assert_eq!(exe.kind.mode(), 0o755);
        assert_eq!(ArtifactKind::DataFile.mode(), 0o644);
    }
}
