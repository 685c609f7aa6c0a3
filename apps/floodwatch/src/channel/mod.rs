//! Realtime channel manager.
//!
//! Two independent WebSocket channels: the general event feed
//! (`/ws/general`, server-to-client) and chat (`/chat/ws`, bidirectional,
//! token presented in the handshake query). Each channel owns one spawned
//! pump task and a shared state cell; closing the channel aborts the task,
//! which also cancels any pending reconnect timer.
//!
//! Reconnect policy (unified across both channels): on unexpected close,
//! exactly one attempt is scheduled after a fixed 5s delay. Session
//! validity is re-checked when the timer fires, so a logout in the interim
//! ends the task instead of reconnecting.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::SessionStore;
use crate::config::{ConfigError, Endpoints};
use crate::model::ChatMessage;
use crate::protocol::{ChatEvent, ChatFrame, ChatOutbound, GeneralEvent};

pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    General,
    Chat,
}

impl ChannelKind {
    fn target(&self) -> &'static str {
        match self {
            ChannelKind::General => "channel::general",
            ChannelKind::Chat => "channel::chat",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Events surfaced to the UI loop. Channels never touch view collections
/// directly; they only emit.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    General(GeneralEvent),
    Chat(ChatMessage),
    StateChanged {
        kind: ChannelKind,
        state: ChannelState,
    },
}

#[derive(Clone)]
struct StateCell {
    kind: ChannelKind,
    cell: Arc<Mutex<ChannelState>>,
    events: mpsc::UnboundedSender<ChannelEvent>,
}

impl StateCell {
    fn new(kind: ChannelKind, events: mpsc::UnboundedSender<ChannelEvent>) -> Self {
        Self {
            kind,
            cell: Arc::new(Mutex::new(ChannelState::Disconnected)),
            events,
        }
    }

    fn get(&self) -> ChannelState {
        *self.cell.lock().expect("channel state poisoned")
    }

    fn set(&self, next: ChannelState) {
        let mut slot = self.cell.lock().expect("channel state poisoned");
        if *slot == next {
            return;
        }
        *slot = next;
        drop(slot);
        let _ = self.events.send(ChannelEvent::StateChanged {
            kind: self.kind,
            state: next,
        });
    }
}

/// The general event feed. Read-only from the client's perspective.
pub struct GeneralChannel {
    state: StateCell,
    task: tokio::task::JoinHandle<()>,
}

impl GeneralChannel {
    pub fn open(
        endpoints: &Endpoints,
        store: SessionStore,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> Result<Self, ChannelError> {
        let url = endpoints.ws("ws/general")?;
        let state = StateCell::new(ChannelKind::General, events.clone());
        let task = tokio::spawn(run_general(url, store, state.clone(), events));
        Ok(Self { state, task })
    }

    pub fn state(&self) -> ChannelState {
        self.state.get()
    }

    /// Abort the pump and any pending reconnect timer. Safe on every exit
    /// path (view unmount, logout, mid-connect).
    pub fn close(&self) {
        self.task.abort();
        self.state.set(ChannelState::Disconnected);
    }
}

/// The chat channel. `send` is a no-op unless connected.
pub struct ChatChannel {
    state: StateCell,
    task: tokio::task::JoinHandle<()>,
    outbound: mpsc::UnboundedSender<String>,
}

impl ChatChannel {
    pub fn open(
        endpoints: &Endpoints,
        store: SessionStore,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> Result<Self, ChannelError> {
        let url = endpoints.ws("chat/ws")?;
        let state = StateCell::new(ChannelKind::Chat, events.clone());
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_chat(url, store, state.clone(), events, outbound_rx));
        Ok(Self {
            state,
            task,
            outbound,
        })
    }

    pub fn state(&self) -> ChannelState {
        self.state.get()
    }

    /// Queue a message for the server. Returns false (and writes nothing)
    /// when the channel is not connected, so callers keep the input intact.
    pub fn send(&self, content: &str) -> bool {
        let content = content.trim();
        if content.is_empty() {
            return false;
        }
        if self.state() != ChannelState::Connected {
            warn!(
                target: "channel::chat",
                state = ?self.state(),
                "chat send while not connected; dropping"
            );
            return false;
        }
        self.outbound.send(content.to_string()).is_ok()
    }

    pub fn close(&self) {
        self.task.abort();
        self.state.set(ChannelState::Disconnected);
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn run_general(
    url: Url,
    store: SessionStore,
    state: StateCell,
    events: mpsc::UnboundedSender<ChannelEvent>,
) {
    let mut first_attempt = true;
    loop {
        if !first_attempt {
            // One reconnect attempt per close, after a fixed delay.
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
        first_attempt = false;
        if !store.is_active() {
            debug!(target: "channel::general", "session gone; not reconnecting");
            break;
        }

        state.set(ChannelState::Connecting);
        match connect_async(url.as_str()).await {
            Ok((ws, _)) => {
                info!(target: "channel::general", %url, "connected");
                state.set(ChannelState::Connected);
                pump_general(ws, &events).await;
                info!(target: "channel::general", "connection closed");
            }
            Err(err) => {
                warn!(target: "channel::general", error = %err, "connect failed");
            }
        }
        state.set(ChannelState::Disconnected);
    }
    state.set(ChannelState::Disconnected);
}

async fn pump_general(ws: WsStream, events: &mpsc::UnboundedSender<ChannelEvent>) {
    let (mut sink, mut stream) = ws.split();
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<GeneralEvent>(&text) {
                Ok(event) => {
                    if events.send(ChannelEvent::General(event)).is_err() {
                        break;
                    }
                }
                Err(err) => warn!(
                    target: "channel::general",
                    error = %err,
                    raw = %text,
                    "dropping malformed frame"
                ),
            },
            Ok(Message::Ping(payload)) => {
                let _ = sink.send(Message::Pong(payload)).await;
            }
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }
}

async fn run_chat(
    url: Url,
    store: SessionStore,
    state: StateCell,
    events: mpsc::UnboundedSender<ChannelEvent>,
    mut outbound: mpsc::UnboundedReceiver<String>,
) {
    let mut first_attempt = true;
    loop {
        if !first_attempt {
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
        first_attempt = false;
        // Token re-read on every attempt: no per-message auth exists after
        // the handshake, and a stale token must not be replayed.
        let Some(session) = store.current().filter(|s| !s.is_expired()) else {
            debug!(target: "channel::chat", "session gone; not reconnecting");
            break;
        };

        let mut authed_url = url.clone();
        authed_url
            .query_pairs_mut()
            .append_pair("token", &session.token);

        state.set(ChannelState::Connecting);
        match connect_async(authed_url.as_str()).await {
            Ok((ws, _)) => {
                info!(target: "channel::chat", "connected");
                state.set(ChannelState::Connected);
                pump_chat(ws, &events, &mut outbound).await;
                info!(target: "channel::chat", "connection closed");
            }
            Err(err) => {
                warn!(target: "channel::chat", error = %err, "connect failed");
            }
        }
        state.set(ChannelState::Disconnected);
    }
    state.set(ChannelState::Disconnected);
}

async fn pump_chat(
    ws: WsStream,
    events: &mpsc::UnboundedSender<ChannelEvent>,
    outbound: &mut mpsc::UnboundedReceiver<String>,
) {
    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            queued = outbound.recv() => match queued {
                Some(content) => {
                    let payload = match serde_json::to_string(&ChatOutbound { content }) {
                        Ok(payload) => payload,
                        Err(err) => {
                            warn!(target: "channel::chat", error = %err, "failed to encode outbound message");
                            continue;
                        }
                    };
                    if sink.send(Message::Text(payload)).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ChatFrame>(&text) {
                    Ok(ChatFrame::Event(ChatEvent::NewMessage(message))) => {
                        if events.send(ChannelEvent::Chat(message)).is_err() {
                            break;
                        }
                    }
                    Ok(ChatFrame::Error { error, details }) => warn!(
                        target: "channel::chat",
                        error = %error,
                        details = ?details,
                        "server reported a message error"
                    ),
                    Err(err) => warn!(
                        target: "channel::chat",
                        error = %err,
                        raw = %text,
                        "dropping malformed frame"
                    ),
                },
                Some(Ok(Message::Ping(payload))) => {
                    let _ = sink.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_cell_emits_only_on_transitions() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cell = StateCell::new(ChannelKind::General, tx);
        assert_eq!(cell.get(), ChannelState::Disconnected);

        cell.set(ChannelState::Disconnected);
        assert!(rx.try_recv().is_err(), "no event for a no-op transition");

        cell.set(ChannelState::Connecting);
        cell.set(ChannelState::Connected);
        assert_eq!(
            rx.try_recv().unwrap(),
            ChannelEvent::StateChanged {
                kind: ChannelKind::General,
                state: ChannelState::Connecting
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            ChannelEvent::StateChanged {
                kind: ChannelKind::General,
                state: ChannelState::Connected
            }
        );
    }
}
