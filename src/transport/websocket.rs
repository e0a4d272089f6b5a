use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, info, warn};

use super::{ChannelConnection, ChannelEvent, ConnectionId, Connector};
use crate::error::TransportError;
use crate::protocol::ABNORMAL_CLOSURE;
use crate::session::ClientEvent;

/// Close code reported when the peer closed without giving one.
const NO_STATUS_RECEIVED: u16 = 1005;

/// Opens websocket channels with tokio-tungstenite. Each channel runs in its
/// own task and reports back through the session's event queue.
pub struct WsConnector {
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl WsConnector {
    pub fn new(events: mpsc::UnboundedSender<ClientEvent>) -> Self {
        Self { events }
    }
}

impl Connector for WsConnector {
    fn open(
        &mut self,
        url: &str,
        connection: ConnectionId,
    ) -> Result<Box<dyn ChannelConnection>, TransportError> {
        let request = url
            .into_client_request()
            .map_err(|err| TransportError::InvalidUrl {
                url: url.to_string(),
                reason: err.to_string(),
            })?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let events = EventSink {
            connection,
            events: self.events.clone(),
        };
        tokio::spawn(run_channel(request, outbound_rx, events));

        Ok(Box::new(WsConnection {
            outbound: outbound_tx,
        }))
    }
}

enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

struct WsConnection {
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl ChannelConnection for WsConnection {
    fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.outbound
            .send(Outbound::Text(frame))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&mut self, code: u16, reason: &str) {
        let _ = self.outbound.send(Outbound::Close {
            code,
            reason: reason.to_string(),
        });
    }
}

struct EventSink {
    connection: ConnectionId,
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl EventSink {
    fn emit(&self, event: ChannelEvent) {
        let _ = self.events.send(ClientEvent::Channel {
            connection: self.connection,
            event,
        });
    }

    fn closed(&self, code: u16, reason: impl Into<String>) {
        self.emit(ChannelEvent::Closed {
            code,
            reason: reason.into(),
        });
    }
}

async fn run_channel(
    request: Request,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: EventSink,
) {
    let uri = request.uri().to_string();
    let stream = match tokio_tungstenite::connect_async(request).await {
        Ok((stream, _)) => stream,
        Err(err) => {
            warn!("Channel connection to {} failed: {}", uri, err);
            events.emit(ChannelEvent::Error(err.to_string()));
            events.closed(ABNORMAL_CLOSURE, "connection failed");
            return;
        }
    };

    info!("Channel open: {}", uri);
    events.emit(ChannelEvent::Opened);

    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            command = outbound.recv() => match command {
                Some(Outbound::Text(text)) => {
                    if let Err(err) = write.send(WsMessage::Text(text.into())).await {
                        warn!("Channel send failed: {}", err);
                        events.closed(ABNORMAL_CLOSURE, err.to_string());
                        return;
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.clone().into(),
                    };
                    if let Err(err) = write.send(WsMessage::Close(Some(frame))).await {
                        debug!("Close frame not delivered: {}", err);
                    }
                    events.closed(code, reason);
                    return;
                }
                None => {
                    // Handle dropped without an explicit close.
                    let _ = write.send(WsMessage::Close(None)).await;
                    return;
                }
            },
            incoming = read.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    events.emit(ChannelEvent::Frame(text.as_str().to_owned()));
                }
                Some(Ok(WsMessage::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => events.emit(ChannelEvent::Frame(text)),
                    Err(_) => warn!("Dropping non UTF-8 binary frame ({} bytes)", bytes.len()),
                },
                Some(Ok(WsMessage::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.as_str().to_owned()))
                        .unwrap_or((NO_STATUS_RECEIVED, String::new()));
                    info!("Channel closed by peer: {} {}", code, reason);
                    events.closed(code, reason);
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!("Channel read failed: {}", err);
                    events.closed(ABNORMAL_CLOSURE, err.to_string());
                    return;
                }
                None => {
                    events.closed(ABNORMAL_CLOSURE, "stream ended");
                    return;
                }
            },
        }
    }
}
