// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Test infrastructure shared by the btrfs-ctl crates.
//!
//! - Each test writes a unique log file under `target/test-logs/`
//! - Passing tests print one line; failing tests print the log path and size
//! - Tests against a real btrfs mount are opt-in via `BTRFS_CTL_TEST_MOUNT`

// Lets the attribute macros refer to this crate by name from inside it.
extern crate self as btrfs_ctl_test_utils;

pub mod guard;
pub mod logging;
pub mod mount;

pub use btrfs_ctl_test_utils_macros::{btrfs_test, logged_test};
pub use guard::TestLoggerGuard;
pub use logging::{TestLogError, TestLogger, create_unique_test_log};
pub use mount::{TEST_MOUNT_ENV, configured_mount, require_test_mount, scratch_dir};
