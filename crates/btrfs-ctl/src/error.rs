// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for btrfs control operations

use std::io;
use std::path::{Path, PathBuf};

use nix::errno::Errno;

/// Errors surfaced by the control channel, the ioctl codec and the xattr accessor
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("not a btrfs filesystem: {}", path.display())]
    NotSupportedFilesystem { path: PathBuf },

    #[error("not a directory: {}", path.display())]
    NotADirectory { path: PathBuf },

    /// A control call (ioctl or descriptor operation) was rejected.
    #[error("{operation}: {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: io::Error,
    },

    /// A path-based operation (open, statfs, getxattr, setxattr) failed.
    #[error("{operation} {}: {source}", path.display())]
    Path {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(operation: &'static str, source: impl Into<io::Error>) -> Self {
        Error::Io {
            operation,
            source: source.into(),
        }
    }

    pub(crate) fn path(
        operation: &'static str,
        path: &Path,
        source: impl Into<io::Error>,
    ) -> Self {
        Error::Path {
            operation,
            path: path.to_path_buf(),
            source: source.into(),
        }
    }

    /// Name of the failing operation, if the error came from the kernel boundary.
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            Error::Io { operation, .. } | Error::Path { operation, .. } => Some(operation),
            _ => None,
        }
    }

    /// Raw errno carried by the underlying cause, if any.
    pub fn errno(&self) -> Option<Errno> {
        match self {
            Error::Io { source, .. } | Error::Path { source, .. } => {
                source.raw_os_error().map(Errno::from_raw)
            }
            _ => None,
        }
    }
}
