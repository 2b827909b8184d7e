//! Error types for the cache crate.

use thiserror::Error;

/// Errors surfaced by the cache crate.
///
/// The in-process cache operations themselves are total and never fail;
/// errors exist only at the configuration and provider-resolution
/// boundaries.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A provider name was looked up before any factory was registered
    /// under it.
    #[error("No such provider registered: {0}")]
    NoSuchProvider(String),

    /// Invalid or unparseable configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;
