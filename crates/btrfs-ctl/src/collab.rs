// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Interfaces to the subvolume and send/receive implementations.
//!
//! Tree walks, subvolume creation and the send stream codec live elsewhere.
//! The facade only resolves names against the handle's path and hands the
//! resulting paths over through these traits.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};

use nix::errno::Errno;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::features::SubvolumeFlags;

/// Metadata of one subvolume as reported by the enumeration backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subvolume {
    pub id: u64,
    pub parent_id: u64,
    /// Path relative to the filesystem's top-level subvolume.
    pub path: PathBuf,
    pub flags: SubvolumeFlags,
}

#[cfg_attr(test, mockall::automock)]
pub trait SubvolumeOps {
    fn create(&self, path: &Path) -> Result<()>;

    fn delete(&self, path: &Path) -> Result<()>;

    fn snapshot(&self, source: &Path, dest: &Path, read_only: bool) -> Result<()>;

    /// All subvolumes reachable from the filesystem containing `root`.
    fn list(&self, root: &Path) -> Result<HashMap<u64, Subvolume>>;

    /// Id of the subvolume containing `path`.
    fn root_id(&self, path: &Path) -> Result<u64>;
}

pub trait StreamOps {
    /// Write a send stream for `subvols`, optionally relative to `parent`.
    fn send(&self, out: &mut dyn Write, parent: Option<&Path>, subvols: &[PathBuf]) -> Result<()>;

    /// Apply a send stream read from `input` below `dest`.
    fn receive(&self, input: &mut dyn Read, dest: &Path) -> Result<()>;
}

/// Join `name` below `root` without letting it climb out.
///
/// Leading separators are ignored, so `/snap` and `snap` resolve to the same
/// place. Any `..` component is rejected.
pub(crate) fn join_under(root: &Path, name: &Path) -> Result<PathBuf> {
    let mut out = root.to_path_buf();
    for component in name.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            Component::ParentDir => {
                return Err(Error::path("join", name, Errno::EINVAL));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_under_keeps_names_below_root() {
        let root = Path::new("/mnt/pool");
        assert_eq!(
            join_under(root, Path::new("snaps/daily")).unwrap(),
            Path::new("/mnt/pool/snaps/daily")
        );
        assert_eq!(
            join_under(root, Path::new("/abs/./name")).unwrap(),
            Path::new("/mnt/pool/abs/name")
        );
        assert_eq!(join_under(root, Path::new("")).unwrap(), root);
    }

    #[test]
    fn test_join_under_rejects_parent_components() {
        let err = join_under(Path::new("/mnt/pool"), Path::new("a/../../etc")).unwrap_err();
        assert_eq!(err.errno(), Some(Errno::EINVAL));
        assert_eq!(err.operation(), Some("join"));
    }
}
