// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Text and JSON rendering of command results.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::Result;
use btrfs_ctl::{
    Compression, DevStat, DeviceStats, FeatureFlags, FilesystemInfo, SubvolumeFlags,
    SupportedFeatureSets,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Something a command prints.
pub trait Render: Serialize {
    fn render_text(&self, out: &mut String);
}

pub fn emit<T: Render + ?Sized>(out: &mut dyn Write, format: OutputFormat, value: &T) -> Result<()> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, value)?;
            writeln!(out)?;
        }
        OutputFormat::Text => {
            let mut text = String::new();
            value.render_text(&mut text);
            out.write_all(text.as_bytes())?;
        }
    }
    Ok(())
}

impl Render for FilesystemInfo {
    fn render_text(&self, out: &mut String) {
        let _ = writeln!(out, "fsid:            {}", self.fsid);
        let _ = writeln!(out, "devices:         {}", self.num_devices);
        let _ = writeln!(out, "max devid:       {}", self.max_id);
        let _ = writeln!(out, "node size:       {}", self.node_size);
        let _ = writeln!(out, "sector size:     {}", self.sector_size);
        let _ = writeln!(out, "clone alignment: {}", self.clone_alignment);
    }
}

impl Render for DeviceStats {
    fn render_text(&self, out: &mut String) {
        for stat in DevStat::ALL {
            match self.get(stat) {
                Some(value) => {
                    let _ = writeln!(out, "[devid:{}].{:<16} {}", self.devid, stat.name(), value);
                }
                None => {
                    let _ = writeln!(out, "[devid:{}].{:<16} -", self.devid, stat.name());
                }
            }
        }
        for (i, value) in self.unrecognized.iter().enumerate() {
            let slot = DevStat::ALL.len() + i;
            let _ = writeln!(out, "[devid:{}].slot_{:<11} {}", self.devid, slot, value);
        }
    }
}

impl Render for [DeviceStats] {
    fn render_text(&self, out: &mut String) {
        for stats in self {
            stats.render_text(out);
        }
    }
}

impl Render for FeatureFlags {
    fn render_text(&self, out: &mut String) {
        render_flags(out, "", self);
    }
}

impl Render for SupportedFeatureSets {
    fn render_text(&self, out: &mut String) {
        render_flags(out, "supported ", &self.supported);
        render_flags(out, "safe-set  ", &self.safe_to_set);
        render_flags(out, "safe-clear ", &self.safe_to_clear);
    }
}

fn render_flags(out: &mut String, prefix: &str, flags: &FeatureFlags) {
    let _ = writeln!(out, "{}compat:    {:#x}", prefix, flags.compat);
    let _ = writeln!(
        out,
        "{}compat_ro: {:#x} ({})",
        prefix,
        flags.compat_ro,
        flags.compat_ro_named()
    );
    let _ = writeln!(
        out,
        "{}incompat:  {:#x} ({})",
        prefix,
        flags.incompat,
        flags.incompat_named()
    );
}

impl Render for SubvolumeFlags {
    fn render_text(&self, out: &mut String) {
        let _ = writeln!(out, "{:#x} ({})", self.bits(), self);
    }
}

impl Render for Compression {
    fn render_text(&self, out: &mut String) {
        let _ = writeln!(out, "{}", self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text<T: Render + ?Sized>(value: &T) -> String {
        let mut buf = Vec::new();
        emit(&mut buf, OutputFormat::Text, value).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_device_stats_text_marks_unreported_counters() {
        let stats = DeviceStats {
            devid: 2,
            reported: 3,
            write_errs: 1,
            read_errs: 0,
            flush_errs: 5,
            ..Default::default()
        };
        let rendered = text(&stats);
        assert!(rendered.contains("[devid:2].write_io_errs    1"), "{rendered}");
        assert!(rendered.contains("[devid:2].flush_io_errs    5"), "{rendered}");
        assert!(rendered.contains("[devid:2].corruption_errs  -"), "{rendered}");
        assert_eq!(rendered.lines().count(), 5);
    }

    #[test]
    fn test_unrecognized_counters_are_numbered_by_slot() {
        let stats = DeviceStats {
            devid: 1,
            reported: 7,
            unrecognized: vec![10, 20],
            ..Default::default()
        };
        let rendered = text(&stats);
        assert!(rendered.contains("[devid:1].slot_5"));
        assert!(rendered.contains("[devid:1].slot_6"));
        assert_eq!(rendered.lines().count(), 7);
    }

    #[test]
    fn test_feature_text_names_known_bits() {
        let flags = FeatureFlags {
            compat: 0,
            compat_ro: 0b11,
            incompat: (1 << 0) | (1 << 9),
        };
        let rendered = text(&flags);
        assert!(rendered.contains("compat_ro: 0x3 (free_space_tree,free_space_tree_valid)"));
        assert!(rendered.contains("incompat:  0x201 (mixed_backref,no_holes)"));
    }

    #[test]
    fn test_json_output_is_parseable() {
        let mut buf = Vec::new();
        emit(&mut buf, OutputFormat::Json, &Compression::Zstd).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value, serde_json::json!("zstd"));

        let mut buf = Vec::new();
        let list = vec![DeviceStats::default(), DeviceStats::default()];
        emit(&mut buf, OutputFormat::Json, list.as_slice()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value.as_array().map(Vec::len), Some(2));
    }
}
