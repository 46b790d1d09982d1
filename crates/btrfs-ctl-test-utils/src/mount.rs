// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Access to a live btrfs mount for tests that need the real kernel.
//!
//! Such tests only run when `BTRFS_CTL_TEST_MOUNT` names a writable directory
//! on btrfs. Everything else about the host is left untouched: each test
//! works inside its own scratch directory below that mount.

use std::env;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

pub const TEST_MOUNT_ENV: &str = "BTRFS_CTL_TEST_MOUNT";

/// The mount named by `BTRFS_CTL_TEST_MOUNT`, if it points at a directory.
pub fn configured_mount() -> Option<PathBuf> {
    let raw = env::var_os(TEST_MOUNT_ENV)?;
    if raw.is_empty() {
        return None;
    }
    let path = PathBuf::from(raw);
    path.is_dir().then_some(path)
}

/// Like [`configured_mount`], printing a skip line for `test_name` when unset.
pub fn require_test_mount(test_name: &str) -> Option<PathBuf> {
    let mount = configured_mount();
    if mount.is_none() {
        println!(
            "⚠️  Skipping {}: set {} to a writable btrfs mount to run it",
            test_name, TEST_MOUNT_ENV
        );
    }
    mount
}

/// Fresh directory below `mount`, removed on drop.
pub fn scratch_dir(mount: &Path) -> io::Result<TempDir> {
    tempfile::Builder::new()
        .prefix("btrfs-ctl-test-")
        .tempdir_in(mount)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_dir_is_created_below_mount() {
        let root = tempfile::tempdir().unwrap();
        let scratch = scratch_dir(root.path()).unwrap();
        assert!(scratch.path().starts_with(root.path()));
        assert!(scratch
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("btrfs-ctl-test-"));
    }
}
