//! Flag error types.

use thiserror::Error;

/// Errors raised by flag definitions and the flag registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlagError {
    /// The registry has been frozen; no more flags may be registered.
    #[error("flag '{0}' registered after the registry was frozen")]
    RegistryFrozen(String),

    /// A flag with the same (case-insensitive) name already exists.
    #[error("a flag already exists by the name {0}")]
    Conflict(String),

    /// The flag name does not match `[:A-Za-z0-9-]{{1,40}}`.
    #[error("invalid flag name: {0:?}")]
    InvalidName(String),

    /// User input could not be parsed into a value for the flag.
    #[error("invalid value for flag '{flag}': {reason}")]
    InvalidFormat { flag: String, reason: String },
}

/// Result type for flag operations.
pub type FlagResult<T> = Result<T, FlagError>;
