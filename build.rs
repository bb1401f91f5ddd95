//! Build script for batchwork
//!
//! Embeds the git commit, build timestamp, target and rustc version.

use std::env;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    let git_hash = run("git", &["rev-parse", "--short=8", "HEAD"]);
    let git_branch = run("git", &["rev-parse", "--abbrev-ref", "HEAD"]);
    let git_dirty = match Command::new("git").args(["status", "--porcelain"]).output() {
        Ok(output) if output.status.success() => (!output.stdout.is_empty()).to_string(),
        _ => "unknown".to_string(),
    };

    let vars = [
        ("BATCHWORK_GIT_HASH", git_hash),
        ("BATCHWORK_GIT_BRANCH", git_branch),
        ("BATCHWORK_GIT_DIRTY", git_dirty),
        (
            "BATCHWORK_BUILD_TIMESTAMP",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        ),
        ("BATCHWORK_TARGET", cargo_var("TARGET")),
        ("BATCHWORK_PROFILE", cargo_var("PROFILE")),
        ("BATCHWORK_RUSTC_VERSION", run("rustc", &["--version"])),
    ];
    for (name, value) in vars {
        println!("cargo:rustc-env={}={}", name, value);
    }
}

fn cargo_var(name: &str) -> String {
    env::var(name).unwrap_or_else(|_| "unknown".to_string())
}

/// Trimmed stdout of a successful command, or "unknown"
fn run(program: &str, args: &[&str]) -> String {
    Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
