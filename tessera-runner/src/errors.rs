// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by tessera.

use camino::Utf8PathBuf;
use config::ConfigError;
use std::{borrow::Cow, error::Error, fmt, time::Duration};
use tessera_metadata::{RpcErrorPayload, WireError};
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse tessera config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }

    /// Returns the kind of error.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing a config.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),

    /// The config deserialized, but describes an invalid pool.
    #[error(transparent)]
    InvalidPoolOptions(PoolOptionsError),

    /// `test.name-pattern` is not a valid regex.
    #[error("invalid test.name-pattern")]
    InvalidNamePattern(#[source] regex::Error),
}

/// Error returned while parsing a [`WorkerCount`](crate::config::WorkerCount) value.
#[derive(Clone, Debug, Error)]
#[error("invalid worker count `{input}`: {message}")]
pub struct WorkerCountParseError {
    input: String,
    message: Cow<'static, str>,
}

impl WorkerCountParseError {
    pub(crate) fn new(input: impl Into<String>, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            input: input.into(),
            message: message.into(),
        }
    }
}

/// A combination of pool options that can never be satisfied.
///
/// This is a configuration error: it is reported before any worker is spawned.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[non_exhaustive]
pub enum PoolOptionsError {
    /// `min-workers` resolved to more workers than `max-workers`.
    #[error("min-workers ({min}) must not exceed max-workers ({max})")]
    MinExceedsMax {
        /// The resolved minimum.
        min: usize,

        /// The resolved maximum.
        max: usize,
    },
}

/// An error that occurred while making a call over an RPC channel.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RpcError {
    /// The call did not complete within the channel's timeout.
    #[error("rpc call `{method}` timed out after {}ms", timeout.as_millis())]
    Timeout {
        /// The method called.
        method: String,

        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The channel closed before a response arrived.
    #[error("rpc channel closed while waiting for `{method}`")]
    Closed {
        /// The method called.
        method: String,
    },

    /// The response arrived tagged with a run that is no longer current, and was dropped.
    #[error("response to `{method}` belonged to a superseded run")]
    Superseded {
        /// The method called.
        method: String,
    },

    /// The remote end returned an error.
    #[error("rpc call `{method}` failed: {}", payload.message)]
    Remote {
        /// The method called.
        method: String,

        /// The error returned by the remote end.
        payload: RpcErrorPayload,
    },

    /// Converting arguments or results failed.
    #[error("rpc call `{method}` had an invalid payload")]
    Wire {
        /// The method called.
        method: String,

        /// The underlying error.
        #[source]
        error: WireError,
    },
}

impl RpcError {
    /// Returns true if this error indicates the channel is gone.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }
}

/// An error that occurred while spawning a worker process.
#[derive(Debug, Error)]
#[error("failed to spawn worker `{program}`")]
pub struct WorkerSpawnError {
    program: Utf8PathBuf,
    #[source]
    error: std::io::Error,
}

impl WorkerSpawnError {
    pub(crate) fn new(program: impl Into<Utf8PathBuf>, error: std::io::Error) -> Self {
        Self {
            program: program.into(),
            error,
        }
    }
}

/// An error that occurs while setting up the signal handler.
#[derive(Debug, Error)]
#[error("error setting up signal handler")]
pub struct SignalHandlerSetupError(#[from] std::io::Error);

/// An error that occurred while building a [`TestRunner`](crate::runner::TestRunner).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TestRunnerBuildError {
    /// An error occurred while creating the Tokio runtime.
    #[error("error creating Tokio runtime")]
    TokioRuntimeCreate(#[source] std::io::Error),

    /// An error occurred while setting up signals.
    #[error("error setting up signals")]
    SignalHandlerSetupError(#[from] SignalHandlerSetupError),

    /// The pool options are invalid.
    #[error("invalid pool options")]
    InvalidPoolOptions(#[from] PoolOptionsError),

    /// The default worker command could not be determined.
    #[error("error determining the worker command")]
    WorkerCommand(#[from] WorkerSpawnError),
}

/// An error returned by a [`BuildPipeline`](crate::pipeline::BuildPipeline).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PipelineError {
    /// The build pipeline failed to produce entries.
    #[error("build pipeline failed")]
    Build(#[source] Box<dyn Error + Send + Sync>),

    /// Reading a built artifact failed.
    #[error("failed to read artifact `{path}`")]
    ReadArtifact {
        /// The artifact path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: Box<dyn Error + Send + Sync>,
    },
}

/// Displays an error along with its chain of sources, separated by `: `.
pub struct DisplayErrorChain<E>(E);

impl<E: Error> DisplayErrorChain<E> {
    /// Creates a new chain displayer.
    pub fn new(error: E) -> Self {
        Self(error)
    }
}

impl<E: Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = self.0.source();
        while let Some(next) = source {
            write!(f, ": {next}")?;
            source = next.source();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_error_chain() {
        let error = WorkerSpawnError::new(
            "target/debug/worker",
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        );
        assert_eq!(
            DisplayErrorChain::new(&error).to_string(),
            "failed to spawn worker `target/debug/worker`: no such file"
        );
    }
}
