//! Version and build information embedded by `build.rs`

use std::fmt;

/// Build information embedded at compile time
#[derive(Debug, Clone)]
pub struct BuildInfo {
    pub name: &'static str,
    pub version: &'static str,
    /// Git commit hash (short)
    pub git_hash: &'static str,
    pub git_branch: &'static str,
    /// "true", "false" or "unknown"
    git_dirty: &'static str,
    pub build_timestamp: &'static str,
    /// Target triple (e.g., x86_64-unknown-linux-gnu)
    pub target: &'static str,
    /// Build profile (debug/release)
    pub profile: &'static str,
    pub rustc_version: &'static str,
}

impl BuildInfo {
    pub const fn current() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            git_hash: env!("BATCHWORK_GIT_HASH"),
            git_branch: env!("BATCHWORK_GIT_BRANCH"),
            git_dirty: env!("BATCHWORK_GIT_DIRTY"),
            build_timestamp: env!("BATCHWORK_BUILD_TIMESTAMP"),
            target: env!("BATCHWORK_TARGET"),
            profile: env!("BATCHWORK_PROFILE"),
            rustc_version: env!("BATCHWORK_RUSTC_VERSION"),
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.git_dirty == "true"
    }

    /// Version with commit, e.g. "0.1.0-abc12345"
    pub fn full_version(&self) -> String {
        let dirty = if self.is_dirty() { "-dirty" } else { "" };
        format!("{}-{}{}", self.version, self.git_hash, dirty)
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {}", self.name, self.full_version())?;
        writeln!(f)?;
        writeln!(f, "  Git:      {} ({})", self.git_hash, self.git_branch)?;
        writeln!(f, "  Built:    {} [{}]", self.build_timestamp, self.profile)?;
        writeln!(f, "  Target:   {}", self.target)?;
        writeln!(f, "  Compiler: {}", self.rustc_version)
    }
}

pub fn build_info() -> BuildInfo {
    BuildInfo::current()
}

/// Print version information to stdout
pub fn print_version() {
    print!("{}", build_info());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_version_format() {
        let info = build_info();
        assert_eq!(info.name, "batchwork");
        let full = info.full_version();
        assert!(full.starts_with(info.version));
        assert!(full.contains(info.git_hash));
    }

    #[test]
    fn test_display_format() {
        let display = build_info().to_string();
        assert!(display.starts_with("batchwork "));
        assert!(display.contains("Target:"));
        assert!(display.contains("Compiler:"));
    }
}
