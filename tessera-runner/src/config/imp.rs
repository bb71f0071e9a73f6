// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{PoolOptions, RpcTimeout};
use crate::{
    errors::{ConfigParseError, ConfigParseErrorKind},
    helpers::get_num_cpus,
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::{collections::BTreeSet, num::NonZeroUsize, time::Duration};
use tessera_metadata::RuntimeConfig;

/// Overall configuration for tessera.
///
/// This is the root data structure for tessera configuration. The parts of it that workers need
/// are projected into a [`RuntimeConfig`] through [`runtime_config`](Self::runtime_config).
#[derive(Clone, Debug)]
pub struct TesseraConfig {
    root: Utf8PathBuf,
    test: TestConfig,
    pool: PoolOptions,
    rpc: RpcConfig,
}

impl TesseraConfig {
    /// The default location of the config within the project root.
    pub const CONFIG_PATH: &'static str = ".config/tessera.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Repository-specific configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../../default-config.toml");

    /// Reads the tessera config from the given file, or if not specified from
    /// `.config/tessera.toml` in the project root.
    ///
    /// `unknown_callback` is called with the set of keys the config file contained that tessera
    /// does not recognize.
    pub fn from_sources(
        root: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
        mut unknown_callback: impl FnMut(&Utf8Path, &BTreeSet<String>),
    ) -> Result<Self, ConfigParseError> {
        let root = root.into();

        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = root.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        let (deserialized, unknown) = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(&config_file, kind))?;
        if !unknown.is_empty() {
            unknown_callback(&config_file, &unknown);
        }

        Self::from_deserialized(root, deserialized)
            .map_err(|kind| ConfigParseError::new(&config_file, kind))
    }

    /// Returns the default tessera config.
    pub fn default_config(root: impl Into<Utf8PathBuf>) -> Self {
        let (deserialized, _) = Self::build_and_deserialize_config(&Self::make_default_config())
            .expect("default config is always valid");
        Self::from_deserialized(root.into(), deserialized).expect("default config is always valid")
    }

    /// Returns the project root.
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Returns the configuration sent to workers.
    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            test_timeout: self.test.timeout,
            hook_timeout: self.test.hook_timeout,
            retry: self.test.retry,
            max_concurrency: self.test.max_concurrency.get(),
            pass_with_no_tests: self.test.pass_with_no_tests,
            sequence_concurrent: self.test.sequence_concurrent,
            test_name_pattern: self.test.name_pattern.clone(),
        }
    }

    /// Returns the pool options.
    pub fn pool_options(&self) -> &PoolOptions {
        &self.pool
    }

    /// Returns the timeout for orchestrator-side RPC calls.
    pub fn rpc_timeout(&self) -> RpcTimeout {
        self.rpc.timeout
    }

    /// Returns the number of failed files after which dispatch stops, if any.
    pub fn bail(&self) -> Option<usize> {
        self.test.bail.filter(|&bail| bail > 0)
    }

    // ---
    // Helper methods
    // ---

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn from_deserialized(
        root: Utf8PathBuf,
        deserialized: TesseraConfigDeserialize,
    ) -> Result<Self, ConfigParseErrorKind> {
        let TesseraConfigDeserialize { test, pool, rpc } = deserialized;

        if let Some(pattern) = &test.name_pattern {
            regex::Regex::new(pattern).map_err(ConfigParseErrorKind::InvalidNamePattern)?;
        }
        pool.validate(get_num_cpus())
            .map_err(ConfigParseErrorKind::InvalidPoolOptions)?;

        Ok(Self {
            root,
            test,
            pool,
            rpc,
        })
    }

    /// This returns a tuple of (config, ignored paths).
    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(TesseraConfigDeserialize, BTreeSet<String>), ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        let mut ignored = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            ignored.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let config: TesseraConfigDeserialize = serde_path_to_error::deserialize(ignored_de)
            .map_err(|error| {
                // Both serde_path_to_error and the config crate report the key. Drop the key from
                // the config error for consistency.
                let path = error.path().clone();
                let config_error = error.into_inner();
                let error = match config_error {
                    ConfigError::At { error, .. } => *error,
                    other => other,
                };
                ConfigParseErrorKind::DeserializeError(Box::new(serde_path_to_error::Error::new(
                    path, error,
                )))
            })?;

        Ok((config, ignored))
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct TesseraConfigDeserialize {
    test: TestConfig,
    pool: PoolOptions,
    rpc: RpcConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct TestConfig {
    #[serde(with = "humantime_serde")]
    timeout: Duration,
    #[serde(with = "humantime_serde")]
    hook_timeout: Duration,
    retry: u32,
    max_concurrency: NonZeroUsize,
    pass_with_no_tests: bool,
    sequence_concurrent: bool,
    #[serde(default)]
    name_pattern: Option<String>,
    #[serde(default)]
    bail: Option<usize>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RpcConfig {
    timeout: RpcTimeout,
}
