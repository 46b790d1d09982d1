// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

mod config;
mod output;

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use btrfs_ctl::{Btrfs, Compression, CompressionAttr, ControlChannel, DeviceStats, SubvolumeFlags};
use btrfs_ctl_logging::{CliLogLevel, CliLoggingArgs};
use clap::{ArgAction, Parser, Subcommand};
use nix::errno::Errno;
use tracing::{debug, info};

use crate::config::CtlConfig;
use crate::output::{OutputFormat, emit};

#[derive(Parser, Debug)]
#[command(
    name = "btrfs-ctl",
    author,
    version,
    about = "Query and adjust a mounted btrfs filesystem through its ioctl interface"
)]
struct Cli {
    /// Configuration file (default: $XDG_CONFIG_HOME/btrfs-ctl/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format, overriding the configured one
    #[arg(long, short = 'o', value_enum, global = true)]
    output: Option<OutputFormat>,

    #[command(flatten)]
    logging: CliLoggingArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Filesystem id, device count and block sizes
    Info { path: PathBuf },
    /// Per-device error counters (every device unless --devid is given)
    DevStats {
        path: PathBuf,
        #[arg(long)]
        devid: Option<u64>,
    },
    /// Enabled feature bits, or the kernel's supported sets with --supported
    Features {
        path: PathBuf,
        #[arg(long)]
        supported: bool,
    },
    /// Read or change subvolume flags
    SubvolFlags {
        #[command(subcommand)]
        action: FlagsAction,
    },
    /// Commit the running transaction and wait until it is on disk
    Sync { path: PathBuf },
    /// Read or change the per-file compression property
    Compression {
        #[command(subcommand)]
        action: CompressionAction,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Subcommand, Debug)]
enum FlagsAction {
    Get {
        path: PathBuf,
    },
    /// Toggle the read-only flag, keeping every other bit
    Set {
        path: PathBuf,
        #[arg(long, action = ArgAction::Set)]
        read_only: bool,
    },
}

#[derive(Subcommand, Debug)]
enum CompressionAction {
    Get {
        path: PathBuf,
    },
    /// `none` clears the property; any other token is stored as given
    Set { path: PathBuf, value: Compression },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = CtlConfig::load(cli.config.as_deref())?;

    let mut logging = cli.logging.clone();
    if logging.log_level.is_none() {
        logging.log_level = cfg.log_level;
    }
    logging.init("btrfs-ctl", CliLogLevel::Warn)?;

    let format = cli.output.unwrap_or(cfg.output);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    run(cli.command, &cfg, format, &mut out)
}

fn run(
    command: Command,
    cfg: &CtlConfig,
    format: OutputFormat,
    out: &mut dyn Write,
) -> Result<()> {
    match command {
        Command::Info { path } => {
            let fs = open(&path, cfg.read_only)?;
            emit(out, format, &fs.info()?)?;
            close(fs)
        }
        Command::DevStats { path, devid } => {
            let fs = open(&path, cfg.read_only)?;
            let stats = collect_dev_stats(&fs, devid)?;
            emit(out, format, stats.as_slice())?;
            close(fs)
        }
        Command::Features { path, supported } => {
            let fs = open(&path, cfg.read_only)?;
            if supported {
                emit(out, format, &fs.supported_feature_sets()?)?;
            } else {
                emit(out, format, &fs.features()?)?;
            }
            close(fs)
        }
        Command::SubvolFlags { action } => match action {
            FlagsAction::Get { path } => {
                let fs = open(&path, cfg.read_only)?;
                emit(out, format, &fs.subvolume_flags()?)?;
                close(fs)
            }
            FlagsAction::Set { path, read_only } => {
                let fs = open(&path, false)?;
                let flags = toggle_read_only(&fs, read_only)?;
                info!(path = %path.display(), %flags, "subvolume flags updated");
                emit(out, format, &flags)?;
                close(fs)
            }
        },
        Command::Sync { path } => {
            let fs = open(&path, cfg.read_only)?;
            fs.sync()
                .with_context(|| format!("sync failed on {}", path.display()))?;
            info!(path = %path.display(), "sync complete");
            close(fs)
        }
        Command::Compression { action } => {
            let attr = CompressionAttr::new().with_retry_limit(cfg.xattr_retry_limit);
            match action {
                CompressionAction::Get { path } => emit(out, format, &attr.get(&path)?),
                CompressionAction::Set { path, value } => {
                    attr.set(&path, &value)?;
                    info!(path = %path.display(), compression = %value, "compression updated");
                    Ok(())
                }
            }
        }
        Command::Config => {
            match format {
                OutputFormat::Text => write!(out, "{}", toml::to_string(cfg)?)?,
                OutputFormat::Json => {
                    serde_json::to_writer_pretty(&mut *out, cfg)?;
                    writeln!(out)?;
                }
            }
            Ok(())
        }
    }
}

fn open(path: &Path, read_only: bool) -> Result<Btrfs> {
    Btrfs::open(path, read_only).with_context(|| format!("failed to open {}", path.display()))
}

fn close(fs: Btrfs) -> Result<()> {
    fs.close().context("failed to close control handle")
}

/// Counters for `devid`, or for every device id up to `max_id`.
///
/// Ids of removed devices stay unused, so `ENODEV` while scanning is a gap
/// rather than an error.
fn collect_dev_stats<C: ControlChannel>(
    fs: &Btrfs<C>,
    devid: Option<u64>,
) -> Result<Vec<DeviceStats>> {
    if let Some(devid) = devid {
        return Ok(vec![fs.device_stats(devid)?]);
    }

    let info = fs.info()?;
    let mut all = Vec::with_capacity(info.num_devices as usize);
    for devid in 1..=info.max_id {
        match fs.device_stats(devid) {
            Ok(stats) => all.push(stats),
            Err(e) if e.errno() == Some(Errno::ENODEV) => {
                debug!(devid, "no device with this id");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(all)
}

fn toggle_read_only<C: ControlChannel>(fs: &Btrfs<C>, read_only: bool) -> Result<SubvolumeFlags> {
    let mut flags = fs.subvolume_flags()?;
    flags.set(SubvolumeFlags::RDONLY, read_only);
    fs.set_subvolume_flags(flags)?;
    Ok(fs.subvolume_flags()?)
}
