//! Structured descriptors for dataset storage locations.
use std::fmt::Display;
use std::path::{self, Path, PathBuf};

/// A filesystem location split into the parts the dataset model cares about.
///
/// Nothing here touches the filesystem except [`StoragePath::exists`], so a
/// descriptor can be built for a file that is not there (yet).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StoragePath {
    /// The string the descriptor was created from
    pub original: String,
    pub full: PathBuf,
    /// The containing directory, empty when the path has no parent
    pub directory: PathBuf,
    /// The name of the last component of `directory`
    pub directory_name: String,
    /// The final component, empty when the path names a directory
    pub filename: String,
    /// The extension including the leading dot, empty when there is none
    pub extension: String,
}

fn ends_with_separator(raw: &str) -> bool {
    raw.ends_with('/') || raw.ends_with(path::MAIN_SEPARATOR)
}

impl StoragePath {
    pub fn parse<S: AsRef<str>>(raw: S) -> Self {
        let raw = raw.as_ref();
        let full = PathBuf::from(raw);
        let (directory, filename) = if ends_with_separator(raw) || raw.is_empty() {
            (full.clone(), String::new())
        } else {
            (
                full.parent().map(Path::to_path_buf).unwrap_or_default(),
                full.file_name()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            )
        };
        let extension = if filename.is_empty() {
            String::new()
        } else {
            Path::new(&filename)
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default()
        };
        let directory_name = directory
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            original: raw.to_string(),
            full,
            directory,
            directory_name,
            filename,
            extension,
        }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        Self::parse(path.as_ref().to_string_lossy())
    }

    /// Resolve `name`, as written in a project description file, against the
    /// project's directory.
    ///
    /// Project files written on Windows use `\` as separator, which is rewritten to
    /// the platform separator.
    pub fn join_project_relative<P: AsRef<Path>>(directory: P, name: &str) -> Self {
        let name = if path::MAIN_SEPARATOR == '\\' {
            name.to_string()
        } else {
            name.replace('\\', path::MAIN_SEPARATOR_STR)
        };
        Self::from_path(directory.as_ref().join(name))
    }

    pub fn exists(&self) -> bool {
        self.full.exists()
    }

    pub fn is_file(&self) -> bool {
        self.full.is_file()
    }

    /// Build the descriptor obtained by inserting `suffix` right before the extension,
    /// e.g. `Slide1sec001.oib` becomes `Slide1sec001_01.oib` for `_01`.
    pub fn with_suffix_before_extension(&self, suffix: &str) -> Self {
        match self.original.strip_suffix(&self.extension) {
            Some(stem) if !self.extension.is_empty() => {
                Self::parse(format!("{stem}{suffix}{}", self.extension))
            }
            _ => Self::parse(format!("{}{suffix}", self.original)),
        }
    }
}

impl Display for StoragePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full.display())
    }
}

impl AsRef<Path> for StoragePath {
    fn as_ref(&self) -> &Path {
        &self.full
    }
}
