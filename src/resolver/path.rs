//! Path resolver
//!
//! Turns raw parameter values into normalized [`Location`]s and the relative
//! layout each file occupies inside a task directory.

use std::collections::BTreeSet;
use std::path::PathBuf;

use tracing::trace;

use super::uri::{detect_provider, directory_fmt, rewrite_gcs, rewrite_local, split_basename, validate_path};
use crate::error::{Error, Result};
use crate::types::{Direction, FileProvider, Location, ParameterBinding};

/// A location together with its provider-prefixed layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub location: Location,
    /// Layout below `input/` or `output/`, e.g. `gs/bucket/a.txt`
    pub layout: String,
}

/// Resolves raw values against the set of enabled providers
#[derive(Debug, Clone)]
pub struct PathResolver {
    providers: BTreeSet<FileProvider>,
}

impl Default for PathResolver {
    fn default() -> Self {
        Self::new(FileProvider::all().iter().copied())
    }
}

impl PathResolver {
    /// Create a resolver that accepts only the given providers
    pub fn new(providers: impl IntoIterator<Item = FileProvider>) -> Self {
        Self {
            providers: providers.into_iter().collect(),
        }
    }

    /// Enabled providers
    pub fn providers(&self) -> impl Iterator<Item = FileProvider> + '_ {
        self.providers.iter().copied()
    }

    /// Validate and normalize a raw location
    ///
    /// Recursive locations are treated as directories and always end in `/`.
    pub fn resolve(&self, raw: &str, recursive: bool) -> Result<ResolvedPath> {
        if raw.is_empty() {
            return Err(Error::unresolvable(raw, "empty location"));
        }
        let raw_uri = if recursive { directory_fmt(raw) } else { raw.to_string() };

        let provider = detect_provider(&raw_uri)?;
        if !self.providers.contains(&provider) {
            return Err(Error::unresolvable(
                raw,
                format!("provider '{}' is not enabled", provider),
            ));
        }
        validate_path(&raw_uri, recursive)?;

        let (normalized, layout) = match provider {
            FileProvider::Gcs => rewrite_gcs(&raw_uri)?,
            FileProvider::Local => rewrite_local(&raw_uri)?,
        };
        let (path, basename) = split_basename(&normalized);
        trace!(raw = %raw, uri = %normalized, layout = %layout, "Resolved location");

        Ok(ResolvedPath {
            location: Location::new(path, basename, provider),
            layout,
        })
    }

    /// Build a file binding for a task parameter
    pub fn resolve_file(
        &self,
        name: &str,
        direction: Direction,
        recursive: bool,
        raw: &str,
    ) -> Result<ParameterBinding> {
        let resolved = self.resolve(raw, recursive)?;
        let relative = PathBuf::from(direction.dir_name()).join(&resolved.layout);
        Ok(ParameterBinding::file(
            name,
            direction,
            recursive,
            raw,
            resolved.location,
            relative,
        ))
    }

    /// Resolve the destination for task logs
    ///
    /// A location ending in `.log` names the log files directly; anything
    /// else is a directory.
    pub fn resolve_logging(&self, raw: &str) -> Result<Location> {
        let recursive = !raw.ends_with(".log");
        let resolved = self.resolve(raw, recursive)?;
        if resolved.location.is_wildcard() {
            return Err(Error::unresolvable(raw, "wildcards are not allowed in the logging location"));
        }
        Ok(resolved.location)
    }

    /// Resolve the location of a script file
    pub fn resolve_script(&self, raw: &str) -> Result<Location> {
        let resolved = self.resolve(raw, false)?;
        if resolved.location.is_wildcard() {
            return Err(Error::unresolvable(raw, "a script must name a single file"));
        }
        Ok(resolved.location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_gcs_file() {
        let resolver = PathResolver::default();
        let binding = resolver
            .resolve_file("INPUT_BAM", Direction::Input, false, "gs://bucket/sample.bam")
            .unwrap();

        let location = binding.location.as_ref().unwrap();
        assert_eq!(location.uri(), "gs://bucket/sample.bam");
        assert_eq!(location.path(), "gs://bucket/");
        assert_eq!(location.basename(), "sample.bam");
        assert_eq!(location.provider(), FileProvider::Gcs);
        assert_eq!(
            binding.relative_path.as_deref().unwrap(),
            std::path::Path::new("input/gs/bucket/sample.bam")
        );
    }

    #[test]
    fn test_resolve_recursive_adds_slash() {
        let resolver = PathResolver::default();
        let resolved = resolver.resolve("gs://bucket/dir", true).unwrap();
        assert_eq!(resolved.location.uri(), "gs://bucket/dir/");
        assert!(resolved.location.is_directory());
        assert_eq!(resolved.layout, "gs/bucket/dir/");
    }

    #[test]
    fn test_resolve_output_local() {
        let resolver = PathResolver::default();
        let binding = resolver
            .resolve_file("OUT", Direction::Output, false, "/tmp/results/out.txt")
            .unwrap();
        assert_eq!(binding.location.as_ref().unwrap().uri(), "/tmp/results/out.txt");
        assert_eq!(
            binding.relative_path.as_deref().unwrap(),
            std::path::Path::new("output/file/tmp/results/out.txt")
        );
    }

    #[test]
    fn test_disabled_provider() {
        let resolver = PathResolver::new([FileProvider::Local]);
        let err = resolver.resolve("gs://bucket/a.txt", false).unwrap_err();
        assert!(matches!(err, Error::UnresolvableLocation { .. }));
        assert!(err.to_string().contains("not enabled"));
    }

    #[test]
    fn test_unsupported_scheme() {
        let resolver = PathResolver::default();
        let err = resolver.resolve("s3://bucket/a.txt", false).unwrap_err();
        assert!(matches!(err, Error::UnresolvableLocation { .. }));
    }

    #[test]
    fn test_logging_location() {
        let resolver = PathResolver::default();
        let file = resolver.resolve_logging("gs://bucket/logs/job.log").unwrap();
        assert_eq!(file.basename(), "job.log");

        let dir = resolver.resolve_logging("gs://bucket/logs").unwrap();
        assert!(dir.is_directory());
        assert_eq!(dir.uri(), "gs://bucket/logs/");

        assert!(resolver.resolve_logging("gs://bucket/logs/*.log").is_err());
    }

    #[test]
    fn test_script_location() {
        let resolver = PathResolver::default();
        assert!(resolver.resolve_script("gs://bucket/run.sh").is_ok());
        assert!(resolver.resolve_script("gs://bucket/*.sh").is_err());
        assert!(resolver.resolve_script("gs://bucket/scripts/").is_err());
    }
}
