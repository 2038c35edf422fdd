//! Error types for the conversion core

use thiserror::Error;

/// Build-time/deployment misconfiguration. Fatal: surfaced from constructors
/// before any audio moves, never raised mid-stream.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Neither domain supports this nominal rate
    #[error("Unsupported sample rate: {0} Hz")]
    UnsupportedRate(u32),

    /// More channels than the static conversion capacity
    #[error("{channels} channels exceed capacity ({max_jobs} jobs x {per_job} channels)")]
    TooManyChannels {
        channels: usize,
        max_jobs: usize,
        per_job: usize,
    },

    /// More parallel jobs than the worker pool can run
    #[error("{jobs} jobs exceed the worker pool capacity {max}")]
    TooManyJobs { jobs: usize, max: usize },

    /// Worker pool construction failed
    #[error("Failed to build worker pool: {0}")]
    Pool(String),
}

/// Errors that can stop the bridge task
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The resampling primitive rejected a processing call
    #[error("Resampler error: {0}")]
    Convert(String),
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
