//! URI parsing, validation and layout rewriting
//!
//! Two strings come out of every file location: the normalized URI used to
//! talk to the store, and the relative layout used inside a task directory.
//!
//! | raw                         | normalized                 | layout                        |
//! |-----------------------------|----------------------------|-------------------------------|
//! | `gs://bucket/a/b.txt`       | `gs://bucket/a/b.txt`      | `gs/bucket/a/b.txt`           |
//! | `/data/./x/../b.txt`        | `/data/b.txt`              | `file/data/b.txt`             |
//! | `file:///tmp/data/*.bam`    | `/tmp/data/*.bam`          | `file/tmp/data/*.bam`         |
//! | `./../upper_dir/`           | `<cwd parent>/upper_dir/`  | `file/_dotdot_/upper_dir/`    |
//! | `~/localdata/*.bam`         | `<home>/localdata/*.bam`   | `file/_home_/localdata/*.bam` |

use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::FileProvider;

/// Longest URI scheme accepted, not counting the leading letter
const MAX_SCHEME_TAIL: usize = 29;

/// Ensure a directory reference ends with `/`
pub fn directory_fmt(directory: &str) -> String {
    if directory.ends_with('/') {
        directory.to_string()
    } else {
        format!("{}/", directory)
    }
}

/// Split a URI at its last `/` into directory part and basename
///
/// The directory part keeps its trailing `/`; it is empty when the URI
/// contains no `/` at all.
pub fn split_basename(uri: &str) -> (&str, &str) {
    match uri.rfind('/') {
        Some(idx) => (&uri[..=idx], &uri[idx + 1..]),
        None => ("", uri),
    }
}

/// Extract a leading `scheme://`, if any
///
/// The scheme is a letter followed by up to 29 letters, digits, `+`, `.` or `-`.
pub fn scheme_of(raw: &str) -> Option<&str> {
    let end = raw.find("://")?;
    let scheme = &raw[..end];
    let mut chars = scheme.chars();
    let first = chars.next()?;
    let tail_ok = scheme.len() - 1 <= MAX_SCHEME_TAIL
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '-'));
    if first.is_ascii_alphabetic() && tail_ok {
        Some(scheme)
    } else {
        None
    }
}

/// Determine which provider hosts a raw location
pub fn detect_provider(raw: &str) -> Result<FileProvider> {
    match scheme_of(raw) {
        None => Ok(FileProvider::Local),
        Some(scheme) => FileProvider::from_scheme(scheme).ok_or_else(|| {
            Error::unresolvable(raw, format!("unsupported scheme '{}://'", scheme.to_lowercase()))
        }),
    }
}

/// Reject location syntax the engine cannot transfer
pub fn validate_path(raw: &str, recursive: bool) -> Result<()> {
    let (dir, filename) = split_basename(raw);

    if raw.contains('[') || raw.contains(']') {
        return Err(Error::unresolvable(raw, "square bracket character ranges are not supported"));
    }
    if raw.contains('?') {
        return Err(Error::unresolvable(raw, "question mark wildcards are not supported"));
    }
    if dir.contains('*') {
        return Err(Error::unresolvable(raw, "wildcards are only supported in file names"));
    }
    if filename.contains("**") {
        return Err(Error::unresolvable(raw, "recursive wildcards (**) are not supported"));
    }
    if filename == "." || filename == ".." {
        return Err(Error::unresolvable(raw, "'.' and '..' are not valid file names"));
    }
    if !recursive && filename.is_empty() {
        return Err(Error::unresolvable(
            raw,
            "non-recursive values must reference a file name or wildcard",
        ));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────
// Cloud Storage
// ─────────────────────────────────────────────────────────────────

/// Normalize a `gs://` URI and compute its layout
pub fn rewrite_gcs(raw: &str) -> Result<(String, String)> {
    let scheme_len = scheme_of(raw).map(str::len).unwrap_or(0);
    let rest = &raw[scheme_len + "://".len()..];
    let normalized = format!("gs://{}", rest);

    let parsed = url::Url::parse(&normalized)
        .map_err(|e| Error::unresolvable(raw, format!("invalid URL: {}", e)))?;
    match parsed.host_str() {
        Some(bucket) if !bucket.is_empty() => {}
        _ => return Err(Error::unresolvable(raw, "missing bucket name")),
    }
    let Some((_, object)) = rest.split_once('/') else {
        return Err(Error::unresolvable(raw, "missing object name after the bucket"));
    };
    if object.split('/').any(|part| part == "." || part == "..") {
        return Err(Error::unresolvable(raw, "'.' and '..' segments are not allowed in object names"));
    }

    Ok((normalized, format!("{}/{}", FileProvider::Gcs.layout_prefix(), rest)))
}

// ─────────────────────────────────────────────────────────────────
// Local Filesystem
// ─────────────────────────────────────────────────────────────────

/// Normalize a local path and compute its layout
///
/// Only the directory part is rewritten; the file name or pattern is kept
/// verbatim.
pub fn rewrite_local(raw: &str) -> Result<(String, String)> {
    let (raw_dir, filename) = split_basename(raw);
    let raw_dir = raw_dir.strip_suffix('/').filter(|d| !d.is_empty()).unwrap_or(raw_dir);

    let absolute = absolute_dir(raw, raw_dir)?;
    let normalized = format!("{}{}", directory_fmt(&absolute.display().to_string()), filename);

    let layout_dir = layout_dir(raw_dir);
    let prefix = FileProvider::Local.layout_prefix();
    let layout = if layout_dir.is_empty() {
        format!("{}/{}", prefix, filename)
    } else {
        format!("{}/{}/{}", prefix, layout_dir, filename)
    };

    Ok((normalized, layout))
}

fn absolute_dir(raw: &str, raw_dir: &str) -> Result<PathBuf> {
    let expanded: PathBuf = if let Some(rest) = raw_dir.strip_prefix("file://") {
        PathBuf::from(format!("/{}", rest.trim_start_matches('/')))
    } else if let Some(rest) = raw_dir.strip_prefix("file:/") {
        PathBuf::from(format!("/{}", rest))
    } else if raw_dir == "~" || raw_dir.starts_with("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::unresolvable(raw, "cannot determine home directory"))?;
        home.join(raw_dir.trim_start_matches('~').trim_start_matches('/'))
    } else {
        PathBuf::from(raw_dir)
    };

    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir()
            .map_err(|e| Error::unresolvable(raw, format!("cannot determine current directory: {}", e)))?
            .join(expanded)
    };

    Ok(lexical_normalize(&absolute))
}

/// Collapse `.` and `..` without touching the filesystem
pub fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    if out.as_os_str().is_empty() {
        out.push("/");
    }
    out
}

/// Directory part of the in-task layout for a local path
///
/// Host-specific prefixes never reach the layout: `..` becomes `_dotdot_`
/// and a leading `~` becomes `_home_`.
fn layout_dir(raw_dir: &str) -> String {
    let stripped = raw_dir
        .strip_prefix("file:")
        .map(|rest| rest.trim_start_matches('/'))
        .unwrap_or(raw_dir);

    let mut parts: Vec<&str> = Vec::new();
    for (idx, part) in stripped.split('/').enumerate() {
        match part {
            "" | "." => {}
            ".." => match parts.last() {
                Some(last) if *last != ".." && !(idx == 1 && *last == "~") => {
                    parts.pop();
                }
                _ => parts.push(".."),
            },
            _ => parts.push(part),
        }
    }

    parts
        .iter()
        .enumerate()
        .map(|(idx, part)| match *part {
            ".." => "_dotdot_",
            "~" if idx == 0 => "_home_",
            other => other,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_detection() {
        assert_eq!(scheme_of("gs://bucket/a"), Some("gs"));
        assert_eq!(scheme_of("s3+x.y-z://bucket"), Some("s3+x.y-z"));
        assert_eq!(scheme_of("/tmp/a"), None);
        assert_eq!(scheme_of("1x://a"), None);
        assert_eq!(scheme_of(&format!("a{}://x", "b".repeat(30))), None);

        assert_eq!(detect_provider("gs://b/o").unwrap(), FileProvider::Gcs);
        assert_eq!(detect_provider("GS://b/o").unwrap(), FileProvider::Gcs);
        assert_eq!(detect_provider("file:///tmp/a").unwrap(), FileProvider::Local);
        assert_eq!(detect_provider("relative/a.txt").unwrap(), FileProvider::Local);
        assert!(detect_provider("s3://bucket/key").is_err());
    }

    #[test]
    fn test_validate_path() {
        assert!(validate_path("gs://b/a.txt", false).is_ok());
        assert!(validate_path("gs://b/*.bam", false).is_ok());
        assert!(validate_path("gs://b/dir/", true).is_ok());

        assert!(validate_path("gs://b/a[0-9].txt", false).is_err());
        assert!(validate_path("gs://b/a?.txt", false).is_err());
        assert!(validate_path("gs://b/*/a.txt", false).is_err());
        assert!(validate_path("gs://b/**.txt", false).is_err());
        assert!(validate_path("/tmp/..", false).is_err());
        assert!(validate_path("gs://b/dir/", false).is_err());
    }

    #[test]
    fn test_gcs_rewrite() {
        let (uri, layout) = rewrite_gcs("gs://mybucket/myfile.txt").unwrap();
        assert_eq!(uri, "gs://mybucket/myfile.txt");
        assert_eq!(layout, "gs/mybucket/myfile.txt");

        let (_, layout) = rewrite_gcs("gs://mybucket/gcs_dir/").unwrap();
        assert_eq!(layout, "gs/mybucket/gcs_dir/");

        assert!(rewrite_gcs("gs:///object").is_err());
        assert!(rewrite_gcs("gs://bucket").is_err());
    }

    #[test]
    fn test_gcs_dot_segments_rejected() {
        for raw in [
            "gs://bucket/../../../../task-2/input/evil.txt",
            "gs://bucket/a/../b.txt",
            "gs://bucket/./b.txt",
            "gs://bucket/dir/../",
        ] {
            let err = rewrite_gcs(raw).unwrap_err();
            assert!(matches!(err, Error::UnresolvableLocation { .. }), "{raw}");
        }
        // Dots inside a segment are ordinary names
        assert!(rewrite_gcs("gs://bucket/..hidden/a..b.txt").is_ok());
    }

    #[test]
    fn test_local_rewrite_absolute() {
        let (uri, layout) = rewrite_local("/tmp/a_path/../B_PATH/file.txt").unwrap();
        assert_eq!(uri, "/tmp/B_PATH/file.txt");
        assert_eq!(layout, "file/tmp/B_PATH/file.txt");

        let (uri, layout) = rewrite_local("/myhome/./mydir/").unwrap();
        assert_eq!(uri, "/myhome/mydir/");
        assert_eq!(layout, "file/myhome/mydir/");

        let (uri, layout) = rewrite_local("file:///tmp/data/*.bam").unwrap();
        assert_eq!(uri, "/tmp/data/*.bam");
        assert_eq!(layout, "file/tmp/data/*.bam");

        let (uri, _) = rewrite_local("/data/./dir_a/../myfile.txt").unwrap();
        assert_eq!(uri, "/data/myfile.txt");
    }

    #[test]
    fn test_local_rewrite_relative() {
        let (_, layout) = rewrite_local("./../upper_dir/").unwrap();
        assert_eq!(layout, "file/_dotdot_/upper_dir/");

        let (_, layout) = rewrite_local("~/localdata/*.bam").unwrap();
        assert_eq!(layout, "file/_home_/localdata/*.bam");

        let (uri, layout) = rewrite_local("sample.bam").unwrap();
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(uri, format!("{}sample.bam", directory_fmt(&cwd.display().to_string())));
        assert_eq!(layout, "file/sample.bam");
    }

    #[test]
    fn test_lexical_normalize() {
        assert_eq!(lexical_normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(lexical_normalize(Path::new("/..")), PathBuf::from("/"));
    }

    #[test]
    fn test_directory_fmt() {
        assert_eq!(directory_fmt("gs://bucket/folder"), "gs://bucket/folder/");
        assert_eq!(directory_fmt("/"), "/");
    }
}
