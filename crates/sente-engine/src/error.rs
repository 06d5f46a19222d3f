//! Engine errors.

use std::path::PathBuf;

/// Errors surfaced by the engine library.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The transposition table could not be allocated.
    #[error("failed to allocate a {megabytes} MB transposition table")]
    HashAllocation {
        /// Requested size in megabytes.
        megabytes: usize,
    },

    /// A configuration file could not be read.
    #[error("cannot read config file {path}: {source}")]
    ConfigIo {
        /// The file that failed to open.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration file is not valid TOML for [`EngineConfig`](crate::EngineConfig).
    #[error("invalid config: {source}")]
    ConfigParse {
        /// The underlying TOML error.
        #[from]
        source: toml::de::Error,
    },

    /// An option value is outside its accepted range.
    #[error("invalid value {value} for option {name}")]
    InvalidOption {
        /// Option name.
        name: &'static str,
        /// The rejected value.
        value: String,
    },

    /// A search thread could not be started.
    #[error("failed to spawn search thread {index}: {source}")]
    ThreadSpawn {
        /// Index of the thread in the pool.
        index: usize,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}
