// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Typed facade over a btrfs control handle.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::abi::{FeatureFlagsArgs, FsInfoArgs, GetDevStatsArgs, SupportedFeaturesArgs};
use crate::channel::{ControlChannel, Handle};
use crate::collab::{join_under, StreamOps, Subvolume, SubvolumeOps};
use crate::error::{Error, Result};
use crate::features::SubvolumeFlags;
use crate::types::{DeviceStats, FeatureFlags, FilesystemInfo, SupportedFeatureSets};

/// A btrfs filesystem reached through a directory on one of its mounts.
///
/// Every query issues one control call against the channel and decodes the
/// reply into a value type. Nothing is cached.
#[derive(Debug)]
pub struct Btrfs<C = Handle> {
    channel: C,
    path: PathBuf,
}

impl Btrfs<Handle> {
    /// Open the directory at `path` and verify it belongs to btrfs.
    pub fn open(path: impl AsRef<Path>, read_only: bool) -> Result<Self> {
        let handle = Handle::open(path, read_only)?;
        let path = handle.path().to_path_buf();
        Ok(Btrfs {
            channel: handle,
            path,
        })
    }

    /// The underlying handle, for collaborators that issue their own calls.
    pub fn handle(&self) -> &Handle {
        &self.channel
    }

    pub fn close(self) -> Result<()> {
        debug!(path = %self.path.display(), "closing btrfs control handle");
        self.channel.close()
    }
}

impl<C: ControlChannel> Btrfs<C> {
    /// Wrap an already established channel. `path` is used to resolve names
    /// handed to collaborators.
    pub fn from_channel(channel: C, path: impl Into<PathBuf>) -> Self {
        Btrfs {
            channel,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self) -> Result<FilesystemInfo> {
        let mut arg = FsInfoArgs::default();
        self.channel
            .fs_info(&mut arg)
            .map_err(|e| kernel_error("BTRFS_IOC_FS_INFO", e))?;
        Ok(FilesystemInfo::from(&arg))
    }

    /// Error counters of device `devid`.
    pub fn device_stats(&self, devid: u64) -> Result<DeviceStats> {
        let mut arg = GetDevStatsArgs::request(devid);
        self.channel
            .get_dev_stats(&mut arg)
            .map_err(|e| kernel_error("BTRFS_IOC_GET_DEV_STATS", e))?;
        let stats = DeviceStats::from(&arg);
        debug!(devid, reported = stats.reported, "device stats");
        Ok(stats)
    }

    /// Feature bits enabled on this filesystem.
    pub fn features(&self) -> Result<FeatureFlags> {
        let mut arg = FeatureFlagsArgs::default();
        self.channel
            .get_features(&mut arg)
            .map_err(|e| kernel_error("BTRFS_IOC_GET_FEATURES", e))?;
        Ok(FeatureFlags::from(&arg))
    }

    /// Feature bits the running kernel supports.
    pub fn supported_features(&self) -> Result<FeatureFlags> {
        Ok(self.supported_feature_sets()?.supported)
    }

    /// Supported bits plus the bits that may be set or cleared on a mounted
    /// filesystem.
    pub fn supported_feature_sets(&self) -> Result<SupportedFeatureSets> {
        let mut arg = SupportedFeaturesArgs::default();
        self.channel
            .get_supported_features(&mut arg)
            .map_err(|e| kernel_error("BTRFS_IOC_GET_SUPPORTED_FEATURES", e))?;
        Ok(SupportedFeatureSets::from(&arg))
    }

    pub fn subvolume_flags(&self) -> Result<SubvolumeFlags> {
        let mut raw = 0u64;
        self.channel
            .subvol_getflags(&mut raw)
            .map_err(|e| kernel_error("BTRFS_IOC_SUBVOL_GETFLAGS", e))?;
        Ok(SubvolumeFlags::from_bits_retain(raw))
    }

    pub fn set_subvolume_flags(&self, flags: SubvolumeFlags) -> Result<()> {
        self.channel
            .subvol_setflags(flags.bits())
            .map_err(|e| kernel_error("BTRFS_IOC_SUBVOL_SETFLAGS", e))
    }

    /// Start a transaction commit and wait for it to reach disk.
    pub fn sync(&self) -> Result<()> {
        self.channel
            .start_sync()
            .map_err(|e| kernel_error("BTRFS_IOC_START_SYNC", e))?;
        self.channel
            .wait_sync()
            .map_err(|e| kernel_error("BTRFS_IOC_WAIT_SYNC", e))
    }

    pub fn create_subvolume<S: SubvolumeOps + ?Sized>(
        &self,
        ops: &S,
        name: impl AsRef<Path>,
    ) -> Result<()> {
        ops.create(&self.resolve(name.as_ref())?)
    }

    pub fn delete_subvolume<S: SubvolumeOps + ?Sized>(
        &self,
        ops: &S,
        name: impl AsRef<Path>,
    ) -> Result<()> {
        ops.delete(&self.resolve(name.as_ref())?)
    }

    /// Snapshot the subvolume this handle was opened on into `dest`.
    pub fn snapshot<S: SubvolumeOps + ?Sized>(
        &self,
        ops: &S,
        dest: impl AsRef<Path>,
        read_only: bool,
    ) -> Result<()> {
        ops.snapshot(&self.path, &self.resolve(dest.as_ref())?, read_only)
    }

    /// Snapshot the subvolume `name` below this handle into `dest`.
    pub fn snapshot_subvolume<S: SubvolumeOps + ?Sized>(
        &self,
        ops: &S,
        name: impl AsRef<Path>,
        dest: impl AsRef<Path>,
        read_only: bool,
    ) -> Result<()> {
        let source = self.resolve(name.as_ref())?;
        ops.snapshot(&source, &self.resolve(dest.as_ref())?, read_only)
    }

    /// Stream `subvols` to `out`, incrementally against `parent` when given.
    pub fn send<S, P>(
        &self,
        ops: &S,
        out: &mut dyn Write,
        parent: Option<&Path>,
        subvols: &[P],
    ) -> Result<()>
    where
        S: StreamOps + ?Sized,
        P: AsRef<Path>,
    {
        let parent = parent.map(|p| self.resolve(p)).transpose()?;
        let subvols = subvols
            .iter()
            .map(|s| self.resolve(s.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        ops.send(out, parent.as_deref(), &subvols)
    }

    /// Apply a send stream directly below this handle's directory.
    pub fn receive<S: StreamOps + ?Sized>(&self, ops: &S, input: &mut dyn Read) -> Result<()> {
        ops.receive(input, &self.path)
    }

    pub fn receive_to<S: StreamOps + ?Sized>(
        &self,
        ops: &S,
        input: &mut dyn Read,
        dest: impl AsRef<Path>,
    ) -> Result<()> {
        ops.receive(input, &self.resolve(dest.as_ref())?)
    }

    /// Subvolumes of this filesystem, ordered by id.
    pub fn list_subvolumes<S, F>(&self, ops: &S, filter: Option<F>) -> Result<Vec<Subvolume>>
    where
        S: SubvolumeOps + ?Sized,
        F: Fn(&Subvolume) -> bool,
    {
        let mut out: Vec<Subvolume> = ops
            .list(&self.path)?
            .into_values()
            .filter(|sv| filter.as_ref().map_or(true, |keep| keep(sv)))
            .collect();
        out.sort_by_key(|sv| sv.id);
        Ok(out)
    }

    /// Id of the subvolume containing this handle's directory.
    pub fn subvolume_id<S: SubvolumeOps + ?Sized>(&self, ops: &S) -> Result<u64> {
        ops.root_id(&self.path)
    }

    fn resolve(&self, name: &Path) -> Result<PathBuf> {
        join_under(&self.path, name)
    }
}

fn kernel_error(operation: &'static str, errno: nix::errno::Errno) -> Error {
    debug!(operation, %errno, "control call rejected");
    Error::io(operation, errno)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use mockall::predicate::eq;
    use mockall::Sequence;
    use nix::errno::Errno;

    use super::*;
    use crate::channel::MockControlChannel;
    use crate::collab::MockSubvolumeOps;
    use crate::types::DevStat;

    fn facade(channel: MockControlChannel) -> Btrfs<MockControlChannel> {
        Btrfs::from_channel(channel, "/mnt/pool")
    }

    #[test]
    fn test_info_decodes_reply() {
        let mut channel = MockControlChannel::new();
        channel.expect_fs_info().times(1).returning(|arg| {
            arg.max_id = 2;
            arg.num_devices = 2;
            arg.fsid = [0x11; 16];
            arg.nodesize = 16384;
            arg.sectorsize = 4096;
            arg.clone_alignment = 4096;
            Ok(())
        });

        let info = facade(channel).info().unwrap();
        assert_eq!(info.max_id, 2);
        assert_eq!(info.num_devices, 2);
        assert_eq!(info.node_size, 16384);
        assert_eq!(info.fsid.to_string(), "11111111-1111-1111-1111-111111111111");
    }

    #[test]
    fn test_info_maps_kernel_rejection() {
        let mut channel = MockControlChannel::new();
        channel.expect_fs_info().returning(|_| Err(Errno::ENOTTY));

        let err = facade(channel).info().unwrap_err();
        assert_eq!(err.operation(), Some("BTRFS_IOC_FS_INFO"));
        assert_eq!(err.errno(), Some(Errno::ENOTTY));
    }

    #[test]
    fn test_device_stats_request_and_decode() {
        let mut channel = MockControlChannel::new();
        channel.expect_get_dev_stats().times(1).returning(|arg| {
            assert_eq!(arg.devid, 3);
            assert_eq!(arg.flags, 0);
            assert!(arg.nr_items > 0);
            arg.nr_items = 6;
            arg.values[..6].copy_from_slice(&[0, 7, 0, 1, 0, 42]);
            Ok(())
        });

        let stats = facade(channel).device_stats(3).unwrap();
        assert_eq!(stats.devid, 3);
        assert_eq!(stats.get(DevStat::ReadErrs), Some(7));
        assert_eq!(stats.corruption_errs, 1);
        assert_eq!(stats.unrecognized, vec![42]);
    }

    #[test]
    fn test_missing_device_surfaces_enodev() {
        let mut channel = MockControlChannel::new();
        channel
            .expect_get_dev_stats()
            .returning(|_| Err(Errno::ENODEV));

        let err = facade(channel).device_stats(9).unwrap_err();
        assert_eq!(err.errno(), Some(Errno::ENODEV));
        assert_eq!(err.operation(), Some("BTRFS_IOC_GET_DEV_STATS"));
    }

    #[test]
    fn test_supported_features_takes_first_entry() {
        let mut channel = MockControlChannel::new();
        channel.expect_get_supported_features().times(1).returning(|arg| {
            arg[0].incompat_flags = 0x3ff;
            arg[1].incompat_flags = 0x10;
            arg[2].compat_ro_flags = 0x1;
            Ok(())
        });

        let supported = facade(channel).supported_features().unwrap();
        assert_eq!(supported.incompat, 0x3ff);
        assert_eq!(supported.compat_ro, 0);
    }

    #[test]
    fn test_subvolume_flags_round_trip() {
        let stored = std::sync::Arc::new(std::sync::Mutex::new(0u64));
        let mut channel = MockControlChannel::new();
        let sink = stored.clone();
        channel
            .expect_subvol_setflags()
            .with(eq(SubvolumeFlags::RDONLY.bits() | (1 << 40)))
            .times(1)
            .returning(move |v| {
                *sink.lock().unwrap() = v;
                Ok(())
            });
        let source = stored.clone();
        channel.expect_subvol_getflags().times(1).returning(move |out| {
            *out = *source.lock().unwrap();
            Ok(())
        });

        let fs = facade(channel);
        let wanted = SubvolumeFlags::from_bits_retain(SubvolumeFlags::RDONLY.bits() | (1 << 40));
        fs.set_subvolume_flags(wanted).unwrap();
        let got = fs.subvolume_flags().unwrap();
        assert_eq!(got, wanted);
        assert!(got.is_read_only());
    }

    #[test]
    fn test_sync_starts_then_waits() {
        let mut seq = Sequence::new();
        let mut channel = MockControlChannel::new();
        channel
            .expect_start_sync()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));
        channel
            .expect_wait_sync()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));

        facade(channel).sync().unwrap();
    }

    #[test]
    fn test_sync_wait_failure_is_not_retried() {
        let mut channel = MockControlChannel::new();
        channel.expect_start_sync().times(1).returning(|| Ok(()));
        channel
            .expect_wait_sync()
            .times(1)
            .returning(|| Err(Errno::EIO));

        let err = facade(channel).sync().unwrap_err();
        assert_eq!(err.operation(), Some("BTRFS_IOC_WAIT_SYNC"));
        assert_eq!(err.errno(), Some(Errno::EIO));
    }

    #[test]
    fn test_sync_start_failure_skips_wait() {
        let mut channel = MockControlChannel::new();
        channel
            .expect_start_sync()
            .times(1)
            .returning(|| Err(Errno::EROFS));
        channel.expect_wait_sync().never();

        let err = facade(channel).sync().unwrap_err();
        assert_eq!(err.operation(), Some("BTRFS_IOC_START_SYNC"));
    }

    #[test]
    fn test_subvolume_names_resolve_under_handle() {
        let mut ops = MockSubvolumeOps::new();
        ops.expect_create()
            .withf(|p| p == Path::new("/mnt/pool/work"))
            .times(1)
            .returning(|_| Ok(()));
        ops.expect_snapshot()
            .withf(|src, dst, ro| {
                src == Path::new("/mnt/pool/work")
                    && dst == Path::new("/mnt/pool/snaps/1")
                    && *ro
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        ops.expect_snapshot()
            .withf(|src, dst, ro| {
                src == Path::new("/mnt/pool") && dst == Path::new("/mnt/pool/whole") && !*ro
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let fs = facade(MockControlChannel::new());
        fs.create_subvolume(&ops, "work").unwrap();
        fs.snapshot_subvolume(&ops, "work", "snaps/1", true).unwrap();
        fs.snapshot(&ops, "whole", false).unwrap();
    }

    #[test]
    fn test_escaping_names_never_reach_collaborator() {
        let mut ops = MockSubvolumeOps::new();
        ops.expect_delete().never();

        let fs = facade(MockControlChannel::new());
        let err = fs.delete_subvolume(&ops, "../other").unwrap_err();
        assert_eq!(err.errno(), Some(Errno::EINVAL));
    }

    #[test]
    fn test_list_subvolumes_filters_and_sorts() {
        let mut ops = MockSubvolumeOps::new();
        ops.expect_list()
            .withf(|root| root == Path::new("/mnt/pool"))
            .returning(|_| {
                let mut map = HashMap::new();
                for (id, ro) in [(261u64, false), (257, true), (300, true)] {
                    let flags = if ro {
                        SubvolumeFlags::RDONLY
                    } else {
                        SubvolumeFlags::empty()
                    };
                    map.insert(
                        id,
                        Subvolume {
                            id,
                            parent_id: 5,
                            path: PathBuf::from(format!("sv{id}")),
                            flags,
                        },
                    );
                }
                Ok(map)
            });

        ops.expect_root_id()
            .withf(|p| p == Path::new("/mnt/pool"))
            .returning(|_| Ok(257));

        let fs = facade(MockControlChannel::new());
        assert_eq!(fs.subvolume_id(&ops).unwrap(), 257);
        let all = fs
            .list_subvolumes(&ops, None::<fn(&Subvolume) -> bool>)
            .unwrap();
        assert_eq!(all.iter().map(|s| s.id).collect::<Vec<_>>(), vec![257, 261, 300]);

        let read_only = fs
            .list_subvolumes(&ops, Some(|s: &Subvolume| s.flags.is_read_only()))
            .unwrap();
        assert_eq!(read_only.iter().map(|s| s.id).collect::<Vec<_>>(), vec![257, 300]);
    }

    #[derive(Default)]
    struct RecordingStream {
        sent: std::cell::RefCell<Vec<(Option<PathBuf>, Vec<PathBuf>)>>,
        received: std::cell::RefCell<Vec<(Vec<u8>, PathBuf)>>,
    }

    impl StreamOps for RecordingStream {
        fn send(
            &self,
            out: &mut dyn Write,
            parent: Option<&Path>,
            subvols: &[PathBuf],
        ) -> Result<()> {
            out.write_all(b"stream").map_err(|e| Error::io("send", e))?;
            self.sent
                .borrow_mut()
                .push((parent.map(Path::to_path_buf), subvols.to_vec()));
            Ok(())
        }

        fn receive(&self, input: &mut dyn Read, dest: &Path) -> Result<()> {
            let mut buf = Vec::new();
            input.read_to_end(&mut buf).map_err(|e| Error::io("receive", e))?;
            self.received.borrow_mut().push((buf, dest.to_path_buf()));
            Ok(())
        }
    }

    #[test]
    fn test_send_and_receive_resolve_paths() {
        let ops = RecordingStream::default();
        let fs = facade(MockControlChannel::new());

        let mut out = Vec::new();
        fs.send(&ops, &mut out, Some(Path::new("base")), &["a", "b/c"])
            .unwrap();
        fs.send(&ops, &mut out, None, &["a"]).unwrap();
        assert_eq!(out, b"streamstream");

        let sent = ops.sent.borrow();
        assert_eq!(sent[0].0.as_deref(), Some(Path::new("/mnt/pool/base")));
        assert_eq!(
            sent[0].1,
            vec![PathBuf::from("/mnt/pool/a"), PathBuf::from("/mnt/pool/b/c")]
        );
        assert_eq!(sent[1].0, None);

        fs.receive(&ops, &mut &b"one"[..]).unwrap();
        fs.receive_to(&ops, &mut &b"two"[..], "incoming").unwrap();
        let received = ops.received.borrow();
        assert_eq!(received[0], (b"one".to_vec(), PathBuf::from("/mnt/pool")));
        assert_eq!(received[1], (b"two".to_vec(), PathBuf::from("/mnt/pool/incoming")));
    }
}
