// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Named-bit overlays for the raw masks returned by the codec.
//!
//! The codec never interprets bits. These types are an optional lens: they are
//! built with `from_bits_retain`, so bits unknown to this build survive a
//! round trip and show up as a remainder when printed.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// `BTRFS_FEATURE_COMPAT_RO_*`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct CompatRoFeatures: u64 {
        const FREE_SPACE_TREE = 1 << 0;
        const FREE_SPACE_TREE_VALID = 1 << 1;
        const VERITY = 1 << 2;
        const BLOCK_GROUP_TREE = 1 << 3;
    }
}

bitflags! {
    /// `BTRFS_FEATURE_INCOMPAT_*`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct IncompatFeatures: u64 {
        const MIXED_BACKREF = 1 << 0;
        const DEFAULT_SUBVOL = 1 << 1;
        const MIXED_GROUPS = 1 << 2;
        const COMPRESS_LZO = 1 << 3;
        const COMPRESS_ZSTD = 1 << 4;
        const BIG_METADATA = 1 << 5;
        const EXTENDED_IREF = 1 << 6;
        const RAID56 = 1 << 7;
        const SKINNY_METADATA = 1 << 8;
        const NO_HOLES = 1 << 9;
        const METADATA_UUID = 1 << 10;
        const RAID1C34 = 1 << 11;
        const ZONED = 1 << 12;
        const EXTENT_TREE_V2 = 1 << 13;
        const RAID_STRIPE_TREE = 1 << 14;
        const SIMPLE_QUOTA = 1 << 16;
    }
}

bitflags! {
    /// `BTRFS_SUBVOL_*` flags accepted by `SUBVOL_GETFLAGS` / `SUBVOL_SETFLAGS`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct SubvolumeFlags: u64 {
        const RDONLY = 1 << 1;
    }
}

impl SubvolumeFlags {
    pub fn is_read_only(&self) -> bool {
        self.contains(SubvolumeFlags::RDONLY)
    }
}

fn write_names<I>(f: &mut fmt::Formatter<'_>, names: I, unknown: u64) -> fmt::Result
where
    I: Iterator<Item = &'static str>,
{
    let mut first = true;
    for name in names {
        if !first {
            f.write_str(",")?;
        }
        f.write_str(&name.to_ascii_lowercase())?;
        first = false;
    }
    if unknown != 0 {
        if !first {
            f.write_str(",")?;
        }
        write!(f, "0x{:x}", unknown)?;
        first = false;
    }
    if first {
        f.write_str("none")?;
    }
    Ok(())
}

macro_rules! impl_named_display {
    ($($ty:ty),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    let unknown = self.bits() & !<$ty>::all().bits();
                    write_names(f, self.iter_names().map(|(name, _)| name), unknown)
                }
            }
        )*
    };
}

impl_named_display!(CompatRoFeatures, IncompatFeatures, SubvolumeFlags);
