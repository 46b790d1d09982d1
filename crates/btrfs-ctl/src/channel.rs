// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Control channel: an open directory on a btrfs mount plus the raw ioctl calls
//! issued against it.

use std::fs::{File, OpenOptions};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, IntoRawFd, RawFd};
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::ptr;

use nix::errno::Errno;
use nix::sys::statfs::{FsType, statfs};
use tracing::{debug, trace};

use crate::abi::{self, BTRFS_FIRST_FREE_OBJECTID, BTRFS_SUPER_MAGIC};
use crate::error::{Error, Result};

/// The raw ioctl surface the facade is built on.
///
/// Each method issues exactly one control call and lets the kernel fill the
/// argument in place. [`Handle`] is the production implementation.
#[cfg_attr(test, mockall::automock)]
pub trait ControlChannel {
    fn fs_info(&self, arg: &mut abi::FsInfoArgs) -> nix::Result<()>;

    fn get_dev_stats(&self, arg: &mut abi::GetDevStatsArgs) -> nix::Result<()>;

    fn get_features(&self, arg: &mut abi::FeatureFlagsArgs) -> nix::Result<()>;

    fn get_supported_features(&self, arg: &mut abi::SupportedFeaturesArgs) -> nix::Result<()>;

    fn subvol_getflags(&self, flags: &mut u64) -> nix::Result<()>;

    fn subvol_setflags(&self, flags: u64) -> nix::Result<()>;

    fn start_sync(&self) -> nix::Result<()>;

    fn wait_sync(&self) -> nix::Result<()>;
}

/// Whether `path` lives on a btrfs filesystem.
pub fn is_btrfs(path: &Path) -> Result<bool> {
    let st = statfs(path).map_err(|e| Error::path("statfs", path, e))?;
    Ok(st.filesystem_type() == FsType(BTRFS_SUPER_MAGIC as _))
}

/// Whether `path` is the root directory of a btrfs subvolume.
pub fn is_subvolume(path: &Path) -> Result<bool> {
    let meta = std::fs::metadata(path).map_err(|e| Error::path("stat", path, e))?;
    if !meta.is_dir() || meta.ino() != BTRFS_FIRST_FREE_OBJECTID {
        return Ok(false);
    }
    is_btrfs(path)
}

/// Open directory on a btrfs mount.
///
/// The descriptor is released on drop; [`Handle::close`] does the same but
/// reports the result of `close(2)`.
#[derive(Debug)]
pub struct Handle {
    file: File,
    path: PathBuf,
}

impl Handle {
    /// Open `path` for control calls.
    ///
    /// Read-only opens ask the kernel not to touch the access time. If that is
    /// refused because the caller does not own the directory, the open is
    /// retried without `O_NOATIME`.
    pub fn open(path: impl AsRef<Path>, read_only: bool) -> Result<Self> {
        let path = path.as_ref();
        if !is_btrfs(path)? {
            return Err(Error::NotSupportedFilesystem {
                path: path.to_path_buf(),
            });
        }

        let file = if read_only {
            match open_dir(path, libc::O_NOATIME) {
                Err(e) if e.raw_os_error() == Some(libc::EPERM) => {
                    debug!(path = %path.display(), "O_NOATIME refused, reopening without it");
                    open_dir(path, 0)
                }
                other => other,
            }
        } else {
            open_dir(path, 0)
        }
        .map_err(|e| Error::path("open", path, e))?;

        let meta = file.metadata().map_err(|e| Error::path("stat", path, e))?;
        if !meta.is_dir() {
            return Err(Error::NotADirectory {
                path: path.to_path_buf(),
            });
        }

        debug!(path = %path.display(), read_only, "opened btrfs control handle");
        Ok(Handle {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Directory the handle was opened on.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the descriptor, surfacing any error from `close(2)`.
    pub fn close(self) -> Result<()> {
        let fd = self.file.into_raw_fd();
        Errno::result(unsafe { libc::close(fd) })
            .map(drop)
            .map_err(|e| Error::io("close", e))
    }

    fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

fn open_dir(path: &Path, extra_flags: libc::c_int) -> std::io::Result<File> {
    // Directories cannot be opened for writing; control calls only need a descriptor.
    OpenOptions::new()
        .read(true)
        .custom_flags(extra_flags)
        .open(path)
}

impl AsFd for Handle {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl AsRawFd for Handle {
    fn as_raw_fd(&self) -> RawFd {
        self.fd()
    }
}

impl ControlChannel for Handle {
    fn fs_info(&self, arg: &mut abi::FsInfoArgs) -> nix::Result<()> {
        trace!(fd = self.fd(), "BTRFS_IOC_FS_INFO");
        unsafe { abi::btrfs_ioc_fs_info(self.fd(), arg) }.map(drop)
    }

    fn get_dev_stats(&self, arg: &mut abi::GetDevStatsArgs) -> nix::Result<()> {
        trace!(fd = self.fd(), devid = arg.devid, "BTRFS_IOC_GET_DEV_STATS");
        unsafe { abi::btrfs_ioc_get_dev_stats(self.fd(), arg) }.map(drop)
    }

    fn get_features(&self, arg: &mut abi::FeatureFlagsArgs) -> nix::Result<()> {
        trace!(fd = self.fd(), "BTRFS_IOC_GET_FEATURES");
        unsafe { abi::btrfs_ioc_get_features(self.fd(), arg) }.map(drop)
    }

    fn get_supported_features(&self, arg: &mut abi::SupportedFeaturesArgs) -> nix::Result<()> {
        trace!(fd = self.fd(), "BTRFS_IOC_GET_SUPPORTED_FEATURES");
        unsafe { abi::btrfs_ioc_get_supported_features(self.fd(), arg) }.map(drop)
    }

    fn subvol_getflags(&self, flags: &mut u64) -> nix::Result<()> {
        trace!(fd = self.fd(), "BTRFS_IOC_SUBVOL_GETFLAGS");
        unsafe { abi::btrfs_ioc_subvol_getflags(self.fd(), flags) }.map(drop)
    }

    fn subvol_setflags(&self, flags: u64) -> nix::Result<()> {
        trace!(fd = self.fd(), flags, "BTRFS_IOC_SUBVOL_SETFLAGS");
        unsafe { abi::btrfs_ioc_subvol_setflags(self.fd(), &flags) }.map(drop)
    }

    fn start_sync(&self) -> nix::Result<()> {
        trace!(fd = self.fd(), "BTRFS_IOC_START_SYNC");
        unsafe { abi::btrfs_ioc_start_sync(self.fd(), ptr::null_mut()) }.map(drop)
    }

    fn wait_sync(&self) -> nix::Result<()> {
        trace!(fd = self.fd(), "BTRFS_IOC_WAIT_SYNC");
        unsafe { abi::btrfs_ioc_wait_sync(self.fd(), ptr::null()) }.map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_procfs_is_not_btrfs() {
        assert!(!is_btrfs(Path::new("/proc")).unwrap());
        assert!(!is_subvolume(Path::new("/proc")).unwrap());
    }

    #[test]
    fn test_open_rejects_foreign_filesystem() {
        match Handle::open("/proc", true) {
            Err(Error::NotSupportedFilesystem { path }) => assert_eq!(path, Path::new("/proc")),
            other => panic!("expected NotSupportedFilesystem, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_path_is_a_path_error() {
        let err = Handle::open("/nonexistent/btrfs-ctl-probe", true).unwrap_err();
        match err {
            Error::Path { operation, .. } => assert_eq!(operation, "statfs"),
            other => panic!("expected Path error, got {:?}", other),
        }
        assert_eq!(
            Handle::open("/nonexistent/btrfs-ctl-probe", false)
                .unwrap_err()
                .errno(),
            Some(Errno::ENOENT)
        );
    }
}
