use std::path::PathBuf;
use thiserror::Error;

/// Core error type for bundle-free operations.
///
/// Only configuration-level failures use this type. Resolution misses are
/// `None`, transcode failures are logged and swallowed by the cache.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to read config at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to locate node_modules from {start}")]
    ResolutionRootNotFound { start: PathBuf },

    #[error("Failed to load package '{name}' from {path}: {source}")]
    DescriptorLoad {
        name: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse package.json of '{name}' at {path}: {source}")]
    DescriptorParse {
        name: String,
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid package.json for '{name}': {message}")]
    InvalidDescriptor { name: String, message: String },

    #[error("Invalid replacement pattern '{pattern}': {message}")]
    InvalidReplacement { pattern: String, message: String },
}

impl Error {
    /// True for failures caused by a broken dependency tree.
    #[must_use]
    pub fn is_descriptor_failure(&self) -> bool {
        matches!(
            self,
            Self::DescriptorLoad { .. } | Self::DescriptorParse { .. } | Self::InvalidDescriptor { .. }
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure while producing a cached ES module.
///
/// Never crosses the [`TranscodeCache`](crate::transcode::TranscodeCache)
/// boundary: it is logged there and the request degrades to "not served".
#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("Failed to read source {path}: {source}")]
    SourceRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write export shim {path}: {source}")]
    ShimWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create cache directory {path}: {source}")]
    CacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Bundler failed: {message}")]
    Bundler { message: String },

    #[error("Failed to run bundler '{program}': {source}")]
    BundlerSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move bundle into cache at {path}: {source}")]
    Rename {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
