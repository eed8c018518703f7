//! Remote backend: one persistent playground session over a WebSocket.
//!
//! The channel is established once at startup - optionally carrying a
//! `share` token so the service replays a stored source - and re-established
//! forever on loss, with bounded backoff. One channel carries every request
//! kind; requests sent while disconnected are dropped, not buffered, because
//! the next debounced edit re-submits the latest content anyway.
//!
//! Responses carry no correlation to requests (see [`protocol`]); they are
//! forwarded to the controller in arrival order and applied last-write-wins.

mod protocol;

pub use protocol::{ClientFrame, ServerFrame};

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use crate::compile::{BackendEvent, CompileBackend, CompileRequest};
use crate::session::channel_url_with_token;

const INITIAL_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

pub struct RemoteBackend {
    /// Sender into the live channel's writer, present only while connected
    outgoing: Arc<Mutex<Option<mpsc::UnboundedSender<ClientFrame>>>>,
}

impl RemoteBackend {
    /// Spawn the channel task. Must be called inside a tokio runtime.
    ///
    /// `share_token` is attached to the first connection attempt only:
    /// re-sending it on reconnect would replay the stored source over the
    /// user's newer edits.
    pub fn spawn(
        url: Url,
        share_token: Option<String>,
        events: mpsc::UnboundedSender<BackendEvent>,
    ) -> Self {
        let outgoing = Arc::new(Mutex::new(None));
        tokio::spawn(channel_loop(
            url,
            share_token,
            events,
            Arc::clone(&outgoing),
        ));
        Self { outgoing }
    }

    /// Whether a channel is currently established
    pub fn connected(&self) -> bool {
        self.outgoing.lock().is_some()
    }
}

impl CompileBackend for RemoteBackend {
    fn dispatch(&self, request: CompileRequest) {
        let frame = ClientFrame::from(&request);
        match self.outgoing.lock().as_ref() {
            Some(tx) if tx.send(frame).is_ok() => {}
            _ => crate::debug!("remote"; "dropping request {} while disconnected", request.seq),
        }
    }

    fn supports_share(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

/// Connect / serve / reconnect, forever.
async fn channel_loop(
    base: Url,
    share_token: Option<String>,
    events: mpsc::UnboundedSender<BackendEvent>,
    outgoing: Arc<Mutex<Option<mpsc::UnboundedSender<ClientFrame>>>>,
) {
    let mut attempt_url = match &share_token {
        Some(token) => channel_url_with_token(&base, token),
        None => base.clone(),
    };
    let mut backoff = INITIAL_BACKOFF;
    loop {
        match connect_async(attempt_url.as_str()).await {
            Ok((ws, _)) => {
                crate::debug!("remote"; "session channel established");
                backoff = INITIAL_BACKOFF;
                let (tx, rx) = mpsc::unbounded_channel();
                *outgoing.lock() = Some(tx);
                run_channel(ws, rx, &events).await;
                outgoing.lock().take();
                crate::debug!("remote"; "session channel lost");
            }
            Err(e) => crate::debug!("remote"; "connect failed: {}", e),
        }
        // Replay belongs to the first connection only
        attempt_url = base.clone();
        if events.is_closed() || crate::core::is_shutdown() {
            return;
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

/// Pump one live connection until either side goes away.
async fn run_channel(
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut out_rx: mpsc::UnboundedReceiver<ClientFrame>,
    events: &mpsc::UnboundedSender<BackendEvent>,
) {
    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            frame = out_rx.recv() => match frame {
                Some(frame) => {
                    if sink.send(Message::Text(frame.to_json().into())).await.is_err() {
                        return;
                    }
                }
                None => return,
            },
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => match ServerFrame::from_json(text.as_str()) {
                    Some(frame) => {
                        for event in frame.into_events() {
                            if events.send(event).is_err() {
                                return;
                            }
                        }
                    }
                    None => crate::debug!("remote"; "ignoring malformed frame"),
                },
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                // Pings/pongs are answered by the library
                Some(Ok(_)) => {}
            },
        }
    }
}
