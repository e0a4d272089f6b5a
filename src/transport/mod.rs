//! Streaming channel transport.
//!
//! The client never touches a socket directly. It asks a `Connector` to open a
//! channel and gets back a `ChannelConnection` handle for sending and closing;
//! everything the remote side does comes back later as a `ChannelEvent`
//! tagged with the `ConnectionId` the channel was opened with.

mod websocket;

pub use websocket::WsConnector;

use crate::error::TransportError;

/// Identifies one opened channel so events from a replaced channel can be told
/// apart from events of the current one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Opened,
    Frame(String),
    Closed { code: u16, reason: String },
    /// The channel could not be established.
    Error(String),
}

pub trait ChannelConnection: Send {
    fn send(&mut self, frame: String) -> Result<(), TransportError>;

    fn close(&mut self, code: u16, reason: &str);
}

pub trait Connector: Send {
    /// Start opening a channel. Returns immediately; `Opened` or `Error`
    /// follows as an event.
    fn open(
        &mut self,
        url: &str,
        connection: ConnectionId,
    ) -> Result<Box<dyn ChannelConnection>, TransportError>;
}
