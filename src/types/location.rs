//! File locations and the providers that host them

use std::fmt;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────
// File Provider
// ─────────────────────────────────────────────────────────────────

/// Storage backend hosting a file location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FileProvider {
    /// Local filesystem (absolute paths)
    #[serde(rename = "local")]
    Local,
    /// Google Cloud Storage (`gs://bucket/object`)
    #[serde(rename = "gs")]
    Gcs,
}

impl FileProvider {
    /// Get all providers
    pub fn all() -> &'static [FileProvider] {
        &[FileProvider::Local, FileProvider::Gcs]
    }

    /// Configuration name of the provider
    pub fn name(&self) -> &'static str {
        match self {
            FileProvider::Local => "local",
            FileProvider::Gcs => "gs",
        }
    }

    /// Parse from a configuration name
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "local" | "file" => Some(FileProvider::Local),
            "gs" | "gcs" => Some(FileProvider::Gcs),
            _ => None,
        }
    }

    /// Map a URI scheme to a provider
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_lowercase().as_str() {
            "file" => Some(FileProvider::Local),
            "gs" => Some(FileProvider::Gcs),
            _ => None,
        }
    }

    /// First component of the in-task layout for files from this provider
    pub fn layout_prefix(&self) -> &'static str {
        match self {
            FileProvider::Local => "file",
            FileProvider::Gcs => "gs",
        }
    }
}

impl fmt::Display for FileProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─────────────────────────────────────────────────────────────────
// Location
// ─────────────────────────────────────────────────────────────────

/// A normalized file location
///
/// `path` is everything up to and including the last `/` (scheme and bucket
/// included for remote objects); `basename` is the trailing file name or
/// filename pattern and is empty for directory locations.
///
/// | uri                         | path                  | basename   |
/// |-----------------------------|-----------------------|------------|
/// | `gs://bucket/folder/a.txt`  | `gs://bucket/folder/` | `a.txt`    |
/// | `/tmp/data/`                | `/tmp/data/`          | ``         |
/// | `/tmp/data/*.bam`           | `/tmp/data/`          | `*.bam`    |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    uri: String,
    path: String,
    basename: String,
    provider: FileProvider,
}

impl Location {
    /// Build a location from its directory part and basename
    pub fn new(path: impl Into<String>, basename: impl Into<String>, provider: FileProvider) -> Self {
        let path = path.into();
        let basename = basename.into();
        Self {
            uri: format!("{}{}", path, basename),
            path,
            basename,
            provider,
        }
    }

    /// Full normalized URI (or absolute path for local files)
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Directory part, always ending in `/`
    pub fn path(&self) -> &str {
        &self.path
    }

    /// File name or pattern, empty for directories
    pub fn basename(&self) -> &str {
        &self.basename
    }

    pub fn provider(&self) -> FileProvider {
        self.provider
    }

    /// Whether the location names a directory rather than a file
    pub fn is_directory(&self) -> bool {
        self.basename.is_empty()
    }

    /// Whether the basename is a filename wildcard
    pub fn is_wildcard(&self) -> bool {
        self.basename.contains('*')
    }

    /// URI of an entry below this location's directory
    pub fn child(&self, relative: &str) -> String {
        format!("{}{}", self.path, relative.trim_start_matches('/'))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}
