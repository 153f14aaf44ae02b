//! Per-connection session handling
//!
//! One task per connection: a reader loop that dispatches inbound frames, a
//! writer task that owns the sink and drains the connection's outbound
//! channel, and a heartbeat task that pings the peer and closes on a missing
//! pong. The dispatch core ([`Session`]) is synchronous so the protocol state
//! machine can be exercised without a socket.

use std::sync::Arc;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::HubError;
use crate::hub::ChatHub;
use crate::protocol::{self, ClientMessage, ServerEvent, MAX_MESSAGE_LEN, MAX_USERNAME_LEN};
use crate::registry::{ConnectionId, Outbound, OutboundSender};
use crate::server::ServerConfig;

/// Handle a single WebSocket connection from accept to cleanup.
pub async fn handle_connection(stream: TcpStream, hub: Arc<ChatHub>, config: ServerConfig) {
    let addr = stream.peer_addr().ok();

    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake failed: {}", e);
            return;
        }
    };

    let (ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, rx) = mpsc::unbounded_channel::<Outbound>();

    let session = Session::new(hub, tx.clone());
    info!(connection = %session.id(), "new connection from {:?}", addr);

    let close_timeout = config.close_timeout;

    // Writer task: owns the sink, drains the outbound channel.
    let mut writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    // Heartbeat task: ping on an interval, close if the pong never comes.
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();
    let ping_tx = tx.clone();
    let conn_id = session.id();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(config.ping_interval);
        // Skip the first immediate tick.
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;
            if ping_tx.send(Outbound::Ping).is_err() {
                // Writer is gone, so is the connection.
                break;
            }
            match timeout(config.ping_timeout, pong_rx.recv()).await {
                Ok(Some(())) => {}
                _ => {
                    warn!(connection = %conn_id, "pong timeout, closing connection");
                    let _ = ping_tx.send(Outbound::Close);
                    break;
                }
            }
        }
    });

    // Reader loop: inbound frames processed strictly in arrival order. Also
    // watches the writer task: when it finishes (close requested by the
    // heartbeat or by shutdown, or a sink error), the session must end even
    // if the peer never sends another byte.
    let mut writer_done = false;
    loop {
        tokio::select! {
            msg = ws_receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => session.handle_frame(&text),
                Some(Ok(Message::Ping(_))) => {
                    // tungstenite queues the pong reply itself.
                }
                Some(Ok(Message::Pong(_))) => {
                    let _ = pong_tx.send(());
                }
                Some(Ok(Message::Close(_))) => {
                    debug!(connection = %session.id(), "client requested close");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(connection = %session.id(), "WebSocket error: {}", e);
                    break;
                }
                None => break,
            },
            _ = &mut writer_handle => {
                debug!(connection = %session.id(), "writer task finished, ending session");
                writer_done = true;
                break;
            }
        }
    }

    // Cleanup runs exactly once regardless of which path ended the loop; the
    // hub absorbs the case where a concurrent broadcast already dropped us.
    session.finish();
    ping_handle.abort();

    // Bounded drain: let the writer flush anything still queued (a final
    // error envelope, the close frame) before giving up on it.
    if !writer_done {
        let _ = tx.send(Outbound::Close);
        if timeout(close_timeout, &mut writer_handle).await.is_err() {
            writer_handle.abort();
        }
    }

    info!(connection = %session.id(), "connection closed from {:?}", addr);
}

/// Forwards outbound frames from the session's channel to the WebSocket sink.
/// Exits on the first sink error or after a close frame; either way the
/// channel closes behind it, which is how broadcasts detect this connection
/// as dead.
async fn writer_task(
    mut ws_sender: SplitSink<WebSocketStream<TcpStream>, Message>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(out) = rx.recv().await {
        let (msg, closing) = match out {
            Outbound::Frame(text) => (Message::Text(text), false),
            Outbound::Ping => (Message::Ping(Vec::new()), false),
            Outbound::Close => (Message::Close(None), true),
        };
        if ws_sender.send(msg).await.is_err() || closing {
            break;
        }
    }
}

/// The per-connection protocol state machine.
///
/// Registration state lives in the hub's registry, not here, so the session
/// never holds a view that can diverge from the one broadcasts see.
pub struct Session {
    id: ConnectionId,
    hub: Arc<ChatHub>,
    tx: OutboundSender,
}

impl Session {
    pub fn new(hub: Arc<ChatHub>, tx: OutboundSender) -> Self {
        Self {
            id: ConnectionId::new(),
            hub,
            tx,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Process one inbound text frame.
    ///
    /// Any error is attributable to this frame alone: it becomes an error
    /// envelope to this connection and the session survives.
    pub fn handle_frame(&self, text: &str) {
        if let Err(err) = self.dispatch(text) {
            debug!(connection = %self.id, "frame rejected: {}", err);
            self.send_event(&ServerEvent::error(err.to_string()));
        }
    }

    /// Terminal cleanup; idempotent through the hub.
    pub fn finish(&self) {
        self.hub.drop_connection(self.id);
    }

    fn dispatch(&self, text: &str) -> crate::error::Result<()> {
        match protocol::decode(text)? {
            ClientMessage::Join { username } => self.handle_join(username.trim()),
            ClientMessage::Message { content } => self.handle_message(content.trim()),
            ClientMessage::Typing { typing } => self.handle_typing(typing),
        }
    }

    fn handle_join(&self, username: &str) -> crate::error::Result<()> {
        if username.is_empty() {
            return Err(HubError::EmptyUsername);
        }
        if username.chars().count() > MAX_USERNAME_LEN {
            return Err(HubError::UsernameTooLong);
        }
        self.hub.register(self.id, username, &self.tx)?;
        Ok(())
    }

    fn handle_message(&self, content: &str) -> crate::error::Result<()> {
        let participant = self
            .hub
            .registry()
            .lookup(self.id)
            .ok_or(HubError::NotRegistered)?;

        if content.is_empty() {
            // Deliberately silent: no error, no broadcast.
            debug!(connection = %self.id, "dropping empty message");
            return Ok(());
        }
        if content.chars().count() > MAX_MESSAGE_LEN {
            return Err(HubError::MessageTooLong);
        }

        let event = ServerEvent::message(participant.username, content.to_string());
        self.hub.broadcast(&event, Some(self.id));
        // Echo the identical event back to the sender: exactly one copy each
        // way, without relying on the sender being in the broadcast set.
        self.send_event(&event);
        Ok(())
    }

    fn handle_typing(&self, typing: bool) -> crate::error::Result<()> {
        // Typing from an unregistered connection is deliberately silent.
        if let Some(participant) = self.hub.registry().set_typing(self.id, typing) {
            debug!(connection = %self.id, username = %participant.username, typing, "typing update");
            self.hub
                .broadcast(&ServerEvent::typing(participant.username, typing), Some(self.id));
        }
        Ok(())
    }

    fn send_event(&self, event: &ServerEvent) {
        match serde_json::to_string(event) {
            Ok(payload) => {
                // A closed channel means our own transport is already dead;
                // the reader loop will exit and clean up.
                let _ = self.tx.send(Outbound::Frame(payload));
            }
            Err(e) => warn!(connection = %self.id, "failed to serialize event: {}", e),
        }
    }
}
