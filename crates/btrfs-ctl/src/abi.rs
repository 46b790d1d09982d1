// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Kernel ABI for the btrfs ioctl interface.
//!
//! Every structure here mirrors `include/uapi/linux/btrfs.h` field for field.
//! The kernel reads and writes these regions by offset, so fields must never
//! be reordered or resized. Sizes are pinned with compile-time assertions.

use std::mem;

/// `BTRFS_SUPER_MAGIC` as reported by `statfs(2)` in `f_type`.
pub const BTRFS_SUPER_MAGIC: u32 = 0x9123_683E;

pub const BTRFS_IOCTL_MAGIC: u8 = 0x94;

pub const BTRFS_FSID_SIZE: usize = 16;

/// Objectid of the root directory of every subvolume.
pub const BTRFS_FIRST_FREE_OBJECTID: u64 = 256;

/// Counters named by this binding (write, read, flush, corruption, generation).
pub const BTRFS_DEV_STAT_VALUES_MAX: usize = 5;

/// Slot region following the dev-stats header: `values[5]` plus `unused[121]`.
///
/// Newer kernels may populate slots past the first five, so the whole region
/// is treated as one counter array.
pub const DEV_STATS_CAPACITY: usize = 128 - 2;

/// Name of the xattr holding the per-inode compression property.
pub const XATTR_COMPRESSION: &str = "btrfs.compression";

/// `struct btrfs_ioctl_fs_info_args`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsInfoArgs {
    pub max_id: u64,
    pub num_devices: u64,
    pub fsid: [u8; BTRFS_FSID_SIZE],
    pub nodesize: u32,
    pub sectorsize: u32,
    pub clone_alignment: u32,
    pub csum_type: u16,
    pub csum_size: u16,
    pub flags: u64,
    pub generation: u64,
    pub metadata_uuid: [u8; BTRFS_FSID_SIZE],
    pub reserved: [u8; 944],
}

impl Default for FsInfoArgs {
    fn default() -> Self {
        Self {
            max_id: 0,
            num_devices: 0,
            fsid: [0; BTRFS_FSID_SIZE],
            nodesize: 0,
            sectorsize: 0,
            clone_alignment: 0,
            csum_type: 0,
            csum_size: 0,
            flags: 0,
            generation: 0,
            metadata_uuid: [0; BTRFS_FSID_SIZE],
            reserved: [0; 944],
        }
    }
}

/// `struct btrfs_ioctl_get_dev_stats`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetDevStatsArgs {
    pub devid: u64,
    pub nr_items: u64,
    /// `BTRFS_DEV_STATS_RESET` lives here; always zero in this binding.
    pub flags: u64,
    pub values: [u64; DEV_STATS_CAPACITY],
}

impl GetDevStatsArgs {
    /// Request for `devid` asking for every slot the structure can carry.
    ///
    /// The kernel lowers `nr_items` to the number of counters it knows about.
    pub fn request(devid: u64) -> Self {
        Self {
            devid,
            nr_items: DEV_STATS_CAPACITY as u64,
            ..Self::default()
        }
    }
}

impl Default for GetDevStatsArgs {
    fn default() -> Self {
        Self {
            devid: 0,
            nr_items: 0,
            flags: 0,
            values: [0; DEV_STATS_CAPACITY],
        }
    }
}

/// `struct btrfs_ioctl_feature_flags`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureFlagsArgs {
    pub compat_flags: u64,
    pub compat_ro_flags: u64,
    pub incompat_flags: u64,
}

/// `GET_SUPPORTED_FEATURES` fills supported, safe-to-set and safe-to-clear, in that order.
pub type SupportedFeaturesArgs = [FeatureFlagsArgs; 3];

const _: () = assert!(mem::size_of::<FsInfoArgs>() == 1024);
const _: () = assert!(mem::size_of::<GetDevStatsArgs>() == 1032);
const _: () = assert!(mem::size_of::<FeatureFlagsArgs>() == 24);
const _: () = assert!(mem::size_of::<SupportedFeaturesArgs>() == 72);

// #define BTRFS_IOC_FS_INFO _IOR(BTRFS_IOCTL_MAGIC, 31, struct btrfs_ioctl_fs_info_args)
nix::ioctl_read!(btrfs_ioc_fs_info, BTRFS_IOCTL_MAGIC, 31, FsInfoArgs);
// #define BTRFS_IOC_GET_DEV_STATS _IOWR(BTRFS_IOCTL_MAGIC, 52, struct btrfs_ioctl_get_dev_stats)
nix::ioctl_readwrite!(btrfs_ioc_get_dev_stats, BTRFS_IOCTL_MAGIC, 52, GetDevStatsArgs);
// #define BTRFS_IOC_GET_FEATURES _IOR(BTRFS_IOCTL_MAGIC, 57, struct btrfs_ioctl_feature_flags)
nix::ioctl_read!(btrfs_ioc_get_features, BTRFS_IOCTL_MAGIC, 57, FeatureFlagsArgs);
// #define BTRFS_IOC_GET_SUPPORTED_FEATURES _IOR(BTRFS_IOCTL_MAGIC, 57, struct btrfs_ioctl_feature_flags[3])
nix::ioctl_read!(
    btrfs_ioc_get_supported_features,
    BTRFS_IOCTL_MAGIC,
    57,
    SupportedFeaturesArgs
);
// #define BTRFS_IOC_SUBVOL_GETFLAGS _IOR(BTRFS_IOCTL_MAGIC, 25, __u64)
nix::ioctl_read!(btrfs_ioc_subvol_getflags, BTRFS_IOCTL_MAGIC, 25, u64);
// #define BTRFS_IOC_SUBVOL_SETFLAGS _IOW(BTRFS_IOCTL_MAGIC, 26, __u64)
nix::ioctl_write_ptr!(btrfs_ioc_subvol_setflags, BTRFS_IOCTL_MAGIC, 26, u64);
// #define BTRFS_IOC_START_SYNC _IOR(BTRFS_IOCTL_MAGIC, 24, __u64)
// Called with a null argument: the kernel skips reporting the transid.
nix::ioctl_read!(btrfs_ioc_start_sync, BTRFS_IOCTL_MAGIC, 24, u64);
// #define BTRFS_IOC_WAIT_SYNC _IOW(BTRFS_IOCTL_MAGIC, 22, __u64)
// Called with a null argument: the kernel waits on the current transaction.
nix::ioctl_write_ptr!(btrfs_ioc_wait_sync, BTRFS_IOCTL_MAGIC, 22, u64);

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::offset_of;

    #[test]
    fn test_fs_info_field_offsets() {
        assert_eq!(offset_of!(FsInfoArgs, max_id), 0);
        assert_eq!(offset_of!(FsInfoArgs, num_devices), 8);
        assert_eq!(offset_of!(FsInfoArgs, fsid), 16);
        assert_eq!(offset_of!(FsInfoArgs, nodesize), 32);
        assert_eq!(offset_of!(FsInfoArgs, sectorsize), 36);
        assert_eq!(offset_of!(FsInfoArgs, clone_alignment), 40);
        assert_eq!(offset_of!(FsInfoArgs, flags), 48);
        assert_eq!(offset_of!(FsInfoArgs, reserved), 80);
    }

    #[test]
    fn test_dev_stats_layout() {
        assert_eq!(offset_of!(GetDevStatsArgs, nr_items), 8);
        assert_eq!(offset_of!(GetDevStatsArgs, flags), 16);
        assert_eq!(offset_of!(GetDevStatsArgs, values), 24);
        assert_eq!(mem::size_of::<GetDevStatsArgs>(), 1032);
    }

    #[test]
    fn test_dev_stats_request_asks_for_full_capacity() {
        let req = GetDevStatsArgs::request(3);
        assert_eq!(req.devid, 3);
        assert_eq!(req.nr_items, DEV_STATS_CAPACITY as u64);
        assert_eq!(req.flags, 0);
        assert!(req.values.iter().all(|v| *v == 0));
    }

    #[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
    #[test]
    fn test_request_codes_match_kernel_headers() {
        // Values from a x86_64 build of btrfs-progs.
        let fs_info = nix::request_code_read!(BTRFS_IOCTL_MAGIC, 31, mem::size_of::<FsInfoArgs>());
        assert_eq!(fs_info as u32, 0x8400_941f);

        let dev_stats = nix::request_code_readwrite!(
            BTRFS_IOCTL_MAGIC,
            52,
            mem::size_of::<GetDevStatsArgs>()
        );
        assert_eq!(dev_stats as u32, 0xc408_9434);

        let features =
            nix::request_code_read!(BTRFS_IOCTL_MAGIC, 57, mem::size_of::<FeatureFlagsArgs>());
        assert_eq!(features as u32, 0x8018_9439);

        let supported =
            nix::request_code_read!(BTRFS_IOCTL_MAGIC, 57, mem::size_of::<SupportedFeaturesArgs>());
        assert_eq!(supported as u32, 0x8048_9439);

        let start_sync = nix::request_code_read!(BTRFS_IOCTL_MAGIC, 24, mem::size_of::<u64>());
        assert_eq!(start_sync as u32, 0x8008_9418);

        let wait_sync = nix::request_code_write!(BTRFS_IOCTL_MAGIC, 22, mem::size_of::<u64>());
        assert_eq!(wait_sync as u32, 0x4008_9416);
    }
}
