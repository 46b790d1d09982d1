// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Typed bindings for the btrfs control plane.
//!
//! This crate provides:
//! - A control handle on a directory of a mounted btrfs filesystem
//! - `#[repr(C)]` mirrors of the kernel ioctl argument structures
//! - Decoding of ioctl replies into plain value types
//! - The `btrfs.compression` extended attribute, read with a bounded retry
//! - Interfaces for the subvolume and send/receive implementations
//!
//! ```no_run
//! use btrfs_ctl::Btrfs;
//!
//! # fn main() -> btrfs_ctl::Result<()> {
//! let fs = Btrfs::open("/mnt/pool", true)?;
//! let info = fs.info()?;
//! for devid in 1..=info.max_id {
//!     let stats = fs.device_stats(devid)?;
//!     println!("{}: {} errors", devid, stats.total());
//! }
//! fs.close()
//! # }
//! ```

pub mod abi;
pub mod channel;
mod codec;
pub mod collab;
pub mod error;
pub mod features;
pub mod fs;
pub mod types;
pub mod xattr;

pub use channel::{ControlChannel, Handle, is_btrfs, is_subvolume};
pub use collab::{StreamOps, Subvolume, SubvolumeOps};
pub use error::{Error, Result};
pub use features::{CompatRoFeatures, IncompatFeatures, SubvolumeFlags};
pub use fs::Btrfs;
pub use types::{DevStat, DeviceStats, FeatureFlags, FilesystemInfo, Fsid, SupportedFeatureSets};
pub use xattr::{Compression, CompressionAttr, XattrOps, get_compression, set_compression};
