// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Layered CLI configuration.
//!
//! Precedence, lowest first: built-in defaults, the TOML file, `BTRFS_CTL_*`
//! environment variables, then command-line flags (applied by the caller).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use btrfs_ctl::xattr::DEFAULT_RETRY_LIMIT;
use btrfs_ctl_logging::CliLogLevel;
use serde::{Deserialize, Serialize};

use crate::output::OutputFormat;

pub const ENV_PREFIX: &str = "BTRFS_CTL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CtlConfig {
    /// Open mode for query commands.
    pub read_only: bool,
    pub xattr_retry_limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<CliLogLevel>,
    pub output: OutputFormat,
}

impl Default for CtlConfig {
    fn default() -> Self {
        Self {
            read_only: true,
            xattr_retry_limit: DEFAULT_RETRY_LIMIT,
            log_level: None,
            output: OutputFormat::Text,
        }
    }
}

impl CtlConfig {
    /// Load from `explicit` (which must exist) or the default location (which
    /// may be absent), overlaid with the process environment.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::load_with_env(explicit, config::Environment::with_prefix(ENV_PREFIX))
    }

    pub(crate) fn load_with_env(
        explicit: Option<&Path>,
        env: config::Environment,
    ) -> Result<Self> {
        let mut builder = config::Config::builder();
        match explicit {
            Some(path) => {
                builder = builder.add_source(
                    config::File::from(path)
                        .format(config::FileFormat::Toml)
                        .required(true),
                );
            }
            None => {
                if let Some(path) = default_config_path() {
                    builder = builder.add_source(
                        config::File::from(path)
                            .format(config::FileFormat::Toml)
                            .required(false),
                    );
                }
            }
        }

        let built = builder
            .add_source(
                env.prefix_separator("_")
                    .convert_case(config::Case::Kebab)
                    .try_parsing(true),
            )
            .build()
            .context("failed to read configuration")?;
        built
            .try_deserialize()
            .context("invalid configuration")
    }
}

/// `$XDG_CONFIG_HOME/btrfs-ctl/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("btrfs-ctl").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        config::Environment::with_prefix(ENV_PREFIX).source(Some(map))
    }

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        std::io::Write::write_all(&mut file, contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_file_values_override_defaults() {
        let file = write_config("read-only = false\nxattr-retry-limit = 4\noutput = \"json\"\n");
        let cfg = CtlConfig::load_with_env(Some(file.path()), env(&[])).unwrap();
        assert!(!cfg.read_only);
        assert_eq!(cfg.xattr_retry_limit, 4);
        assert_eq!(cfg.output, OutputFormat::Json);
        assert_eq!(cfg.log_level, None);
    }

    #[test]
    fn test_environment_overrides_file() {
        let file = write_config("xattr-retry-limit = 4\nlog-level = \"info\"\n");
        let cfg = CtlConfig::load_with_env(
            Some(file.path()),
            env(&[
                ("BTRFS_CTL_XATTR_RETRY_LIMIT", "32"),
                ("BTRFS_CTL_LOG_LEVEL", "debug"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.xattr_retry_limit, 32);
        assert_eq!(cfg.log_level, Some(CliLogLevel::Debug));
        assert!(cfg.read_only);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(CtlConfig::load_with_env(Some(&missing), env(&[])).is_err());
    }

    #[test]
    fn test_defaults_survive_toml_round_trip() {
        let rendered = toml::to_string(&CtlConfig::default()).unwrap();
        assert!(rendered.contains("read-only = true"));
        let parsed: CtlConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, CtlConfig::default());
    }
}
