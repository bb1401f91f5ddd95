//! Common test utilities and fixtures
//!
//! This module provides shared test infrastructure

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use batchwork::coordinator::{CoordinatorConfig, JobCoordinator};
use batchwork::storage::{LocalStore, MemoryStore, StoreRegistry};
use batchwork::types::{FileProvider, TaskCommand};

/// Get the path to the test fixtures directory
pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

/// Get a path to a specific fixture file
pub fn fixture_path(name: &str) -> PathBuf {
    fixtures_dir().join(name)
}

/// Get the valid config fixture path
pub fn valid_config_fixture() -> PathBuf {
    fixture_path("valid_config.toml")
}

/// Get the invalid config fixture path
pub fn invalid_config_fixture() -> PathBuf {
    fixture_path("invalid_config.toml")
}

pub fn read_fixture(name: &str) -> Vec<u8> {
    std::fs::read(fixture_path(name)).unwrap()
}

/// Registry with an in-memory store serving `gs://` and the local filesystem
pub fn memory_registry() -> (Arc<MemoryStore>, Arc<StoreRegistry>) {
    let gcs = Arc::new(MemoryStore::new(FileProvider::Gcs));
    let registry = StoreRegistry::new();
    registry.register(gcs.clone());
    registry.register(Arc::new(LocalStore::new()));
    (gcs, Arc::new(registry))
}

/// Coordinator with fast polling, working under `root`
pub fn coordinator(
    root: &Path,
    stores: Arc<StoreRegistry>,
    max_parallel_tasks: usize,
    task_timeout: Option<Duration>,
) -> JobCoordinator {
    let config = CoordinatorConfig {
        working_root: root.to_path_buf(),
        max_parallel_tasks,
        task_timeout,
        poll_initial: Duration::from_millis(10),
        poll_max: Duration::from_millis(50),
        poll_multiplier: 1.5,
    };
    JobCoordinator::new(config, stores)
}

/// Inline command run with `/bin/sh -c`
pub fn sh(text: &str) -> Arc<TaskCommand> {
    Arc::new(TaskCommand::Inline {
        shell: "/bin/sh".to_string(),
        text: text.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixtures_dir_exists() {
        assert!(fixtures_dir().exists(), "Fixtures directory should exist");
    }

    #[test]
    fn test_config_fixtures_exist() {
        assert!(valid_config_fixture().exists(), "Valid config fixture should exist");
        assert!(invalid_config_fixture().exists(), "Invalid config fixture should exist");
    }

    #[test]
    fn test_sample_fixtures_exist() {
        assert!(fixture_path("sample.bam").is_file());
        assert!(fixture_path("sample.bam.md5").is_file());
    }
}
