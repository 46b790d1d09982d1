// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Semantic result types produced by the ioctl codec.
//!
//! These are plain values: none of them keeps a reference to the handle that
//! produced it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::abi::BTRFS_FSID_SIZE;
use crate::features::{CompatRoFeatures, IncompatFeatures};

/// Filesystem identifier (`fsid`), rendered as a UUID.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Fsid(pub [u8; BTRFS_FSID_SIZE]);

impl Fsid {
    pub fn as_bytes(&self) -> &[u8; BTRFS_FSID_SIZE] {
        &self.0
    }
}

impl fmt::Display for Fsid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{}-{}-{}-{}-{}",
            hex::encode(&b[0..4]),
            hex::encode(&b[4..6]),
            hex::encode(&b[6..8]),
            hex::encode(&b[8..10]),
            hex::encode(&b[10..16])
        )
    }
}

impl fmt::Debug for Fsid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fsid({})", self)
    }
}

/// Snapshot of `BTRFS_IOC_FS_INFO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesystemInfo {
    /// Highest device id the kernel has handed out.
    pub max_id: u64,
    pub num_devices: u64,
    pub fsid: Fsid,
    pub node_size: u32,
    pub sector_size: u32,
    /// Alignment required for clone and dedupe ranges.
    pub clone_alignment: u32,
}

/// Named per-device error counters, in kernel slot order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DevStat {
    WriteErrs = 0,
    ReadErrs = 1,
    FlushErrs = 2,
    /// Checksum error, bytenr error or illegal contents: the block was damaged
    /// during read or write, or written to or read from the wrong location.
    CorruptionErrs = 3,
    /// Blocks that were expected on disk but never written.
    GenerationErrs = 4,
}

impl DevStat {
    pub const ALL: [DevStat; 5] = [
        DevStat::WriteErrs,
        DevStat::ReadErrs,
        DevStat::FlushErrs,
        DevStat::CorruptionErrs,
        DevStat::GenerationErrs,
    ];

    pub fn slot(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            DevStat::WriteErrs => "write_io_errs",
            DevStat::ReadErrs => "read_io_errs",
            DevStat::FlushErrs => "flush_io_errs",
            DevStat::CorruptionErrs => "corruption_errs",
            DevStat::GenerationErrs => "generation_errs",
        }
    }
}

/// Error counters for one device.
///
/// `reported` is the number of slots the kernel declared populated. Named
/// fields whose slot lies at or beyond `reported` hold zero and are not
/// kernel-authoritative; use [`DeviceStats::get`] to tell the two apart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStats {
    pub devid: u64,
    pub reported: usize,
    pub write_errs: u64,
    pub read_errs: u64,
    pub flush_errs: u64,
    pub corruption_errs: u64,
    pub generation_errs: u64,
    /// Counters past the five named ones, in slot order.
    pub unrecognized: Vec<u64>,
}

impl DeviceStats {
    /// Counter value, or `None` if the kernel did not populate that slot.
    pub fn get(&self, stat: DevStat) -> Option<u64> {
        if stat.slot() >= self.reported {
            return None;
        }
        Some(match stat {
            DevStat::WriteErrs => self.write_errs,
            DevStat::ReadErrs => self.read_errs,
            DevStat::FlushErrs => self.flush_errs,
            DevStat::CorruptionErrs => self.corruption_errs,
            DevStat::GenerationErrs => self.generation_errs,
        })
    }

    /// Sum of every populated counter, unrecognized ones included.
    pub fn total(&self) -> u64 {
        DevStat::ALL
            .iter()
            .filter_map(|s| self.get(*s))
            .chain(self.unrecognized.iter().copied())
            .fold(0u64, u64::saturating_add)
    }
}

/// The three on-disk feature masks, passed through bit for bit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureFlags {
    /// Unknown bits may be ignored.
    pub compat: u64,
    /// Unknown bits allow a read-only mount.
    pub compat_ro: u64,
    /// Unknown bits forbid mounting.
    pub incompat: u64,
}

impl FeatureFlags {
    pub fn compat_ro_named(&self) -> CompatRoFeatures {
        CompatRoFeatures::from_bits_retain(self.compat_ro)
    }

    pub fn incompat_named(&self) -> IncompatFeatures {
        IncompatFeatures::from_bits_retain(self.incompat)
    }
}

/// All three entries of `BTRFS_IOC_GET_SUPPORTED_FEATURES`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedFeatureSets {
    pub supported: FeatureFlags,
    pub safe_to_set: FeatureFlags,
    pub safe_to_clear: FeatureFlags,
}
