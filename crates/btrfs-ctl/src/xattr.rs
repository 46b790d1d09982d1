// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Per-inode compression property, stored in the `btrfs.compression` xattr.
//!
//! This path is independent of the control channel: it works on any path and
//! goes through the regular extended-attribute syscalls.

use std::ffi::CString;
use std::fmt;
use std::path::Path;
use std::ptr;
use std::str::FromStr;

use nix::NixPath;
use nix::errno::Errno;
use serde::{Serialize, Serializer};
use tracing::{debug, trace, warn};

use crate::abi::XATTR_COMPRESSION;
use crate::error::{Error, Result};

/// How many probe/read rounds a read may take before giving up on a value
/// that keeps growing underneath it.
pub const DEFAULT_RETRY_LIMIT: usize = 16;

/// Compression policy requested for a file or directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Compression {
    /// No property set (attribute absent or empty).
    #[default]
    None,
    Lzo,
    Zlib,
    Zstd,
    /// Any other token, kept byte for byte (e.g. `zstd:3` on newer kernels).
    Custom(Vec<u8>),
}

impl Compression {
    /// Decode a stored value. One trailing NUL, if present, is dropped.
    pub fn from_bytes(raw: &[u8]) -> Self {
        let raw = raw.strip_suffix(&[0]).unwrap_or(raw);
        match raw {
            b"" => Compression::None,
            b"lzo" => Compression::Lzo,
            b"zlib" => Compression::Zlib,
            b"zstd" => Compression::Zstd,
            other => Compression::Custom(other.to_vec()),
        }
    }

    /// Bytes written to the attribute; empty for [`Compression::None`].
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Compression::None => b"",
            Compression::Lzo => b"lzo",
            Compression::Zlib => b"zlib",
            Compression::Zstd => b"zstd",
            Compression::Custom(raw) => raw,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Compression::None)
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::None => f.write_str("none"),
            other => f.write_str(&String::from_utf8_lossy(other.as_bytes())),
        }
    }
}

impl FromStr for Compression {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "none" => Compression::None,
            other => Compression::from_bytes(other.as_bytes()),
        })
    }
}

impl Serialize for Compression {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// Raw extended-attribute calls used by [`CompressionAttr`].
pub trait XattrOps {
    /// Read `name` into `buf` and return the value length. An empty `buf`
    /// probes the current length without copying anything.
    fn get(&self, path: &Path, name: &str, buf: &mut [u8]) -> nix::Result<usize>;

    fn set(&self, path: &Path, name: &str, value: &[u8]) -> nix::Result<()>;
}

/// `getxattr(2)` / `setxattr(2)` on the real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemXattr;

impl XattrOps for SystemXattr {
    fn get(&self, path: &Path, name: &str, buf: &mut [u8]) -> nix::Result<usize> {
        let name = CString::new(name).map_err(|_| Errno::EINVAL)?;
        let (data, len) = if buf.is_empty() {
            (ptr::null_mut(), 0)
        } else {
            (buf.as_mut_ptr().cast::<libc::c_void>(), buf.len())
        };
        let res = path.with_nix_path(|p| unsafe {
            libc::getxattr(p.as_ptr(), name.as_ptr(), data, len)
        })?;
        Errno::result(res).map(|n| n as usize)
    }

    fn set(&self, path: &Path, name: &str, value: &[u8]) -> nix::Result<()> {
        let name = CString::new(name).map_err(|_| Errno::EINVAL)?;
        let res = path.with_nix_path(|p| unsafe {
            libc::setxattr(
                p.as_ptr(),
                name.as_ptr(),
                value.as_ptr().cast::<libc::c_void>(),
                value.len(),
                0,
            )
        })?;
        Errno::result(res).map(drop)
    }
}

/// Reads and writes the compression property.
#[derive(Debug, Clone)]
pub struct CompressionAttr<X = SystemXattr> {
    ops: X,
    retry_limit: usize,
}

impl CompressionAttr<SystemXattr> {
    pub fn new() -> Self {
        Self::with_ops(SystemXattr)
    }
}

impl Default for CompressionAttr<SystemXattr> {
    fn default() -> Self {
        Self::new()
    }
}

impl<X: XattrOps> CompressionAttr<X> {
    pub fn with_ops(ops: X) -> Self {
        Self {
            ops,
            retry_limit: DEFAULT_RETRY_LIMIT,
        }
    }

    /// Bound the probe/read rounds. Zero is treated as one.
    pub fn with_retry_limit(mut self, limit: usize) -> Self {
        self.retry_limit = limit.max(1);
        self
    }

    /// Current policy on `path`.
    ///
    /// The value is read in two steps: a size probe, then a read into a buffer
    /// of exactly that size. If another writer grows the value in between, the
    /// read fails with `ERANGE` and the whole sequence starts over.
    pub fn get(&self, path: &Path) -> Result<Compression> {
        let mut buf = Vec::new();
        for attempt in 1..=self.retry_limit {
            let size = match self.ops.get(path, XATTR_COMPRESSION, &mut [0u8; 0]) {
                Ok(0) | Err(Errno::ENODATA) => return Ok(Compression::None),
                Ok(size) => size,
                Err(e) => return Err(Error::path("getxattr", path, e)),
            };
            trace!(path = %path.display(), size, attempt, "probed compression xattr");

            buf.resize(size, 0);
            match self.ops.get(path, XATTR_COMPRESSION, &mut buf) {
                Ok(len) => {
                    buf.truncate(len);
                    return Ok(Compression::from_bytes(&buf));
                }
                Err(Errno::ENODATA) => return Ok(Compression::None),
                Err(Errno::ERANGE) => {
                    warn!(
                        path = %path.display(),
                        attempt,
                        "compression xattr grew between probe and read, retrying"
                    );
                }
                Err(e) => return Err(Error::path("getxattr", path, e)),
            }
        }
        Err(Error::path("getxattr", path, Errno::ERANGE))
    }

    /// Store `value` on `path`. [`Compression::None`] writes an empty value,
    /// which clears the property.
    pub fn set(&self, path: &Path, value: &Compression) -> Result<()> {
        let raw = value.as_bytes();
        if raw.contains(&0) {
            return Err(Error::path("setxattr", path, Errno::EINVAL));
        }
        debug!(path = %path.display(), compression = %value, "setting compression xattr");
        self.ops
            .set(path, XATTR_COMPRESSION, raw)
            .map_err(|e| Error::path("setxattr", path, e))
    }
}

/// Compression policy of `path`, with the default retry bound.
pub fn get_compression(path: impl AsRef<Path>) -> Result<Compression> {
    CompressionAttr::new().get(path.as_ref())
}

pub fn set_compression(path: impl AsRef<Path>, value: &Compression) -> Result<()> {
    CompressionAttr::new().set(path.as_ref(), value)
}
