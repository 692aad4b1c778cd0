//! Error types for shard routing.
//!
//! Every error records the source location that raised it, so a routing
//! failure surfaced at a call site can be traced back into the router.

use std::fmt;
use std::panic::Location;

use thiserror::Error;

/// Result type alias for routing operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Routing errors.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// Unsupported shard key type or load-balance policy.
    #[error("not supported: {message} (at {location})")]
    NotSupport {
        /// What was not supported.
        message: String,
        /// Where the error was raised.
        location: &'static Location<'static>,
    },

    /// No connection, service or server matched.
    #[error("not found: {message} (at {location})")]
    NotFound {
        /// What was looked up.
        message: String,
        /// Where the error was raised.
        location: &'static Location<'static>,
    },

    /// No policy is registered for the method.
    #[error("not exist: {message} (at {location})")]
    NotExist {
        /// The method that has no policy.
        message: String,
        /// Where the error was raised.
        location: &'static Location<'static>,
    },

    /// The method name does not match `/{package}.{Service}/{Method}`.
    #[error("invalid method: {message} (at {location})")]
    InvalidMethod {
        /// The offending method name.
        message: String,
        /// Where the error was raised.
        location: &'static Location<'static>,
    },

    /// Missing or invalid per-method configuration.
    #[error("configuration error: {message} (at {location})")]
    Configure {
        /// What is wrong with the configuration.
        message: String,
        /// Where the error was raised.
        location: &'static Location<'static>,
    },

    /// The shard key cannot be carried as outgoing call metadata.
    #[error("invalid shard key: {message} (at {location})")]
    InvalidShardKey {
        /// Why the key was rejected.
        message: String,
        /// Where the error was raised.
        location: &'static Location<'static>,
    },
}

/// The category of a routing error.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// See [`Error::NotSupport`].
    NotSupport,

    /// See [`Error::NotFound`].
    NotFound,

    /// See [`Error::NotExist`].
    NotExist,

    /// See [`Error::InvalidMethod`].
    InvalidMethod,

    /// See [`Error::Configure`].
    Configure,

    /// See [`Error::InvalidShardKey`].
    InvalidShardKey,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Error {
    /// Creates a [`Error::NotSupport`] at the caller's location.
    #[track_caller]
    pub fn not_support(message: impl Into<String>) -> Self {
        Self::NotSupport {
            message: message.into(),
            location: Location::caller(),
        }
    }

    /// Creates a [`Error::NotFound`] at the caller's location.
    #[track_caller]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            location: Location::caller(),
        }
    }

    /// Creates a [`Error::NotExist`] at the caller's location.
    #[track_caller]
    pub fn not_exist(message: impl Into<String>) -> Self {
        Self::NotExist {
            message: message.into(),
            location: Location::caller(),
        }
    }

    /// Creates a [`Error::InvalidMethod`] at the caller's location.
    #[track_caller]
    pub fn invalid_method(message: impl Into<String>) -> Self {
        Self::InvalidMethod {
            message: message.into(),
            location: Location::caller(),
        }
    }

    /// Creates a [`Error::Configure`] at the caller's location.
    #[track_caller]
    pub fn configure(message: impl Into<String>) -> Self {
        Self::Configure {
            message: message.into(),
            location: Location::caller(),
        }
    }

    /// Creates a [`Error::InvalidShardKey`] at the caller's location.
    #[track_caller]
    pub fn invalid_shard_key(message: impl Into<String>) -> Self {
        Self::InvalidShardKey {
            message: message.into(),
            location: Location::caller(),
        }
    }

    /// Returns the kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotSupport { .. } => ErrorKind::NotSupport,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::NotExist { .. } => ErrorKind::NotExist,
            Self::InvalidMethod { .. } => ErrorKind::InvalidMethod,
            Self::Configure { .. } => ErrorKind::Configure,
            Self::InvalidShardKey { .. } => ErrorKind::InvalidShardKey,
        }
    }

    /// Returns the error message without the location suffix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::NotSupport { message, .. }
            | Self::NotFound { message, .. }
            | Self::NotExist { message, .. }
            | Self::InvalidMethod { message, .. }
            | Self::Configure { message, .. }
            | Self::InvalidShardKey { message, .. } => message,
        }
    }

    /// Returns the source location that raised this error.
    #[must_use]
    pub const fn location(&self) -> &'static Location<'static> {
        match self {
            Self::NotSupport { location, .. }
            | Self::NotFound { location, .. }
            | Self::NotExist { location, .. }
            | Self::InvalidMethod { location, .. }
            | Self::Configure { location, .. }
            | Self::InvalidShardKey { location, .. } => location,
        }
    }
}
