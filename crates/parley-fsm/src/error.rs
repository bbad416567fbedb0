//! Error types for construction, typed cache access and flat backends.
//!
//! Core state and cache operations are total and never produce these errors;
//! absence is always reported as `None` / `false`.

/// Error type for parley operations that can genuinely fail.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Background reapers were requested outside of a Tokio runtime.
    #[error("No Tokio runtime available to spawn the {0} reaper")]
    NoRuntime(&'static str),

    /// A cached value exists but could not be decoded as the requested type.
    #[error("Cached value for key '{key}' is not a {expected}: {source}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// A value could not be encoded for caching.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Error from a flat key/value backend.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Configuration text could not be parsed.
    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}

/// Result type for parley operations.
pub type Result<T> = std::result::Result<T, Error>;
