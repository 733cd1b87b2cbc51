//! Transport layer abstraction for the relay connection.
//!
//! Defines the [`Transport`] trait that concrete transports satisfy,
//! plus the [`Connector`] factory the connection manager dials through.
//! Implementations:
//! - [`relay::RelayTransport`] — WebSocket connection to the relay endpoint
//! - [`loopback::LoopbackTransport`] — in-process channel-based transport for testing

pub mod loopback;
pub mod relay;

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection to the relay has been closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The operation timed out before completing.
    #[error("transport operation timed out")]
    Timeout,

    /// The relay endpoint URL is not a usable WebSocket URL.
    #[error("invalid relay url: {0}")]
    InvalidUrl(String),

    /// An underlying I/O error occurred.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Async transport carrying opaque JSON text frames to and from the relay.
///
/// The transport never inspects frame contents — encoding and event
/// dispatch happen in the connection manager above it.
pub trait Transport: Send + Sync + 'static {
    /// Send one text frame to the relay.
    ///
    /// Returns `Ok(())` when the frame has been handed to the underlying
    /// socket. This does NOT mean the recipient has the message — the
    /// delivery lifecycle tracks that separately.
    fn send(
        &self,
        frame: &str,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;

    /// Receive the next text frame from the relay.
    ///
    /// Blocks asynchronously until a frame arrives.
    fn recv(&self) -> impl std::future::Future<Output = Result<String, TransportError>> + Send;

    /// Check whether the underlying connection is currently open.
    fn is_connected(&self) -> bool;
}

/// Factory producing fresh transport connections.
///
/// The connection manager re-dials through its connector on transport
/// loss, which keeps reconnect/backoff logic independent of the
/// concrete transport and testable with scripted outcomes.
pub trait Connector: Send + Sync + 'static {
    /// The transport type this connector produces.
    type Transport: Transport;

    /// Establish a fresh connection to the relay endpoint.
    fn dial(
        &self,
    ) -> impl std::future::Future<Output = Result<Self::Transport, TransportError>> + Send;
}
