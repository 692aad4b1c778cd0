//! Connection capability consumed by the router.

use std::error::Error;
use std::fmt::Debug;

/// A live connection to one backend server.
///
/// The router never establishes, health-checks or tears down transports
/// itself. It holds connections by `Arc`, orders them by [`Connection::id`]
/// and, when a server is removed, calls [`Connection::disable`] followed by
/// [`Connection::stop`].
pub trait Connection: Debug + Send + Sync + 'static {
    /// Underlying transport handed to call sites.
    type Transport: ?Sized;

    /// Error returned when stopping the connection.
    type Error: Error + Send + Sync + 'static;

    /// Returns the transport used to issue calls.
    fn transport(&self) -> &Self::Transport;

    /// Returns the connection id. Modulo routing orders connections by it.
    fn id(&self) -> &str;

    /// Whether the connection can currently carry calls.
    ///
    /// Selection does not consult this; callers should check it on the
    /// returned connection.
    fn is_available(&self) -> bool;

    /// Marks the connection as unusable for new calls.
    fn disable(&self);

    /// Releases the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport could not be released cleanly.
    fn stop(&self) -> Result<(), Self::Error>;
}
