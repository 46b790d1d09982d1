// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Translation between kernel argument structures and semantic types.

use crate::abi::{
    BTRFS_DEV_STAT_VALUES_MAX, DEV_STATS_CAPACITY, FeatureFlagsArgs, FsInfoArgs, GetDevStatsArgs,
    SupportedFeaturesArgs,
};
use crate::types::{DeviceStats, FeatureFlags, FilesystemInfo, Fsid, SupportedFeatureSets};

impl From<&FsInfoArgs> for FilesystemInfo {
    fn from(arg: &FsInfoArgs) -> Self {
        FilesystemInfo {
            max_id: arg.max_id,
            num_devices: arg.num_devices,
            fsid: Fsid(arg.fsid),
            node_size: arg.nodesize,
            sector_size: arg.sectorsize,
            clone_alignment: arg.clone_alignment,
        }
    }
}

impl From<&GetDevStatsArgs> for DeviceStats {
    fn from(arg: &GetDevStatsArgs) -> Self {
        // Never trust the count past the slots we actually own.
        let reported = usize::try_from(arg.nr_items)
            .unwrap_or(usize::MAX)
            .min(DEV_STATS_CAPACITY);
        let populated = &arg.values[..reported];
        let named = |slot: usize| populated.get(slot).copied().unwrap_or(0);

        DeviceStats {
            devid: arg.devid,
            reported,
            write_errs: named(0),
            read_errs: named(1),
            flush_errs: named(2),
            corruption_errs: named(3),
            generation_errs: named(4),
            unrecognized: populated
                .get(BTRFS_DEV_STAT_VALUES_MAX..)
                .map(<[u64]>::to_vec)
                .unwrap_or_default(),
        }
    }
}

impl From<&FeatureFlagsArgs> for FeatureFlags {
    fn from(arg: &FeatureFlagsArgs) -> Self {
        FeatureFlags {
            compat: arg.compat_flags,
            compat_ro: arg.compat_ro_flags,
            incompat: arg.incompat_flags,
        }
    }
}

impl From<&FeatureFlags> for FeatureFlagsArgs {
    fn from(flags: &FeatureFlags) -> Self {
        FeatureFlagsArgs {
            compat_flags: flags.compat,
            compat_ro_flags: flags.compat_ro,
            incompat_flags: flags.incompat,
        }
    }
}

impl From<&SupportedFeaturesArgs> for SupportedFeatureSets {
    fn from(arg: &SupportedFeaturesArgs) -> Self {
        SupportedFeatureSets {
            supported: FeatureFlags::from(&arg[0]),
            safe_to_set: FeatureFlags::from(&arg[1]),
            safe_to_clear: FeatureFlags::from(&arg[2]),
        }
    }
}
