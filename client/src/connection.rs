//! WebSocket connection management for game sessions.
//!
//! One [`ConnectionManager`] owns every live session link. Links are keyed
//! by session id: repeated connects for a session share the transport, and
//! concurrent connects share a single dial. After a link has been open once,
//! an unclean close is redialed with exponential backoff; exhausting the
//! attempts takes the link down for good and evicts it.
//!
//! Outbound traffic never blocks and never errors: when the socket is not
//! open, messages are dropped and logged. Inbound frames are decoded in
//! receipt order and forwarded FIFO to the single consumer that took the
//! link's event stream.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parlor_types::{ClientMessage, ServerMessage};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::backoff::retry_delay;
use crate::{Error, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Tuning for session links.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Cap on a single dial, including the handshake.
    pub dial_timeout: Duration,
    /// Delay before the first reconnect attempt; doubles per attempt.
    pub reconnect_base_delay: Duration,
    /// Upper bound on any single reconnect delay.
    pub max_reconnect_delay: Duration,
    /// Reconnect attempts per outage before the link goes down for good.
    pub max_reconnect_attempts: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_secs(10),
            reconnect_base_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
            max_reconnect_attempts: 5,
        }
    }
}

/// Observable state of one session link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    Connecting,
    Open,
    Reconnecting,
    Offline,
}

/// What a link driver reports to the session's event consumer.
#[derive(Debug)]
pub enum LinkEvent {
    /// Socket established. `resumed` is false for the first open.
    Up { resumed: bool },
    /// A decoded frame, delivered in receipt order.
    Inbound(ServerMessage),
    /// Unclean close observed; a redial is scheduled.
    Reconnecting { attempt: u32 },
    /// Reconnect attempts exhausted. Terminal for this link.
    Down,
}

/// Outcome of the shared first dial, broadcast to every waiting `connect`.
#[derive(Clone, Debug)]
enum DialOutcome {
    Pending,
    Up,
    Failed(String),
}

struct Link {
    id: u64,
    outbound: mpsc::UnboundedSender<ClientMessage>,
    dial: watch::Receiver<DialOutcome>,
    state: watch::Receiver<LinkState>,
    events: Option<mpsc::Receiver<LinkEvent>>,
    driver: JoinHandle<()>,
}

struct Inner {
    base_url: Url,
    config: ConnectionConfig,
    links: Mutex<HashMap<String, Link>>,
    next_link_id: AtomicU64,
}

/// Registry of WebSocket links, one per session id.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// `base_url` must already be validated as `ws` or `wss`.
    pub fn new(base_url: Url, config: ConnectionConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                base_url,
                config,
                links: Mutex::new(HashMap::new()),
                next_link_id: AtomicU64::new(0),
            }),
        }
    }

    /// Ensures a link for `session_id` exists and is (or comes) up.
    ///
    /// Idempotent: an open link resolves immediately, and concurrent calls
    /// for the same session await one shared dial. The first dial is not
    /// retried here; redial policy only applies to links that were open and
    /// closed uncleanly. A dial cancelled by [`disconnect`] resolves to
    /// [`Error::Cancelled`].
    ///
    /// [`disconnect`]: ConnectionManager::disconnect
    pub async fn connect(&self, session_id: &str, auth_token: Option<&str>) -> Result<()> {
        let mut dial = {
            let mut links = self.inner.links.lock().unwrap();
            match links.get(session_id) {
                Some(link) => link.dial.clone(),
                None => {
                    let link = spawn_link(self.inner.clone(), session_id, auth_token);
                    let dial = link.dial.clone();
                    links.insert(session_id.to_string(), link);
                    dial
                }
            }
        };

        loop {
            let outcome = dial.borrow_and_update().clone();
            match outcome {
                DialOutcome::Up => return Ok(()),
                DialOutcome::Failed(reason) => return Err(Error::Dial(reason)),
                DialOutcome::Pending => {
                    if dial.changed().await.is_err() {
                        // Driver aborted mid-dial by disconnect.
                        return Err(Error::Cancelled);
                    }
                }
            }
        }
    }

    /// Hands the link's event stream to its single consumer. Subsequent
    /// calls return `None`.
    pub fn take_events(&self, session_id: &str) -> Option<mpsc::Receiver<LinkEvent>> {
        let mut links = self.inner.links.lock().unwrap();
        links.get_mut(session_id).and_then(|link| link.events.take())
    }

    /// Queues `message` on the session's socket. Never blocks: when the link
    /// is missing or not open the message is dropped and logged, and callers
    /// must not assume delivery either way.
    pub fn send(&self, session_id: &str, message: ClientMessage) {
        let links = self.inner.links.lock().unwrap();
        let Some(link) = links.get(session_id) else {
            warn!(session = session_id, "dropping outbound message: no link");
            return;
        };
        let state = *link.state.borrow();
        if state != LinkState::Open {
            warn!(
                session = session_id,
                ?state,
                "dropping outbound message: link not open"
            );
            return;
        }
        if link.outbound.send(message).is_err() {
            warn!(session = session_id, "dropping outbound message: link closed");
        }
    }

    /// Tears the session's link down: aborts the driver (cancelling any
    /// in-flight dial and invalidating any scheduled reconnect), drops the
    /// socket, and evicts the registry slot. Idempotent.
    pub fn disconnect(&self, session_id: &str) {
        let link = self.inner.links.lock().unwrap().remove(session_id);
        if let Some(link) = link {
            link.driver.abort();
            info!(session = session_id, "session link disconnected");
        }
    }

    pub fn link_state(&self, session_id: &str) -> Option<LinkState> {
        let links = self.inner.links.lock().unwrap();
        links.get(session_id).map(|link| *link.state.borrow())
    }

    /// Disconnects every live link.
    pub fn shutdown(&self) {
        let ids: Vec<String> = {
            let links = self.inner.links.lock().unwrap();
            links.keys().cloned().collect()
        };
        for id in ids {
            self.disconnect(&id);
        }
    }
}

fn spawn_link(inner: Arc<Inner>, session_id: &str, auth_token: Option<&str>) -> Link {
    let mut url = inner.base_url.clone();
    if let Some(token) = auth_token {
        url.query_pairs_mut().append_pair("token", token);
    }

    let id = inner.next_link_id.fetch_add(1, Ordering::Relaxed);
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::channel(DEFAULT_EVENT_CAPACITY);
    let (dial_tx, dial_rx) = watch::channel(DialOutcome::Pending);
    let (state_tx, state_rx) = watch::channel(LinkState::Connecting);

    let driver = Driver {
        inner,
        link_id: id,
        session_id: session_id.to_string(),
        url,
        events: events_tx,
        outbound: outbound_rx,
        dial: dial_tx,
        state: state_tx,
    };
    let handle = tokio::spawn(driver.run());

    Link {
        id,
        outbound: outbound_tx,
        dial: dial_rx,
        state: state_rx,
        events: Some(events_rx),
        driver: handle,
    }
}

/// Owns one socket end to end: first dial, pumping, redials, teardown.
struct Driver {
    inner: Arc<Inner>,
    link_id: u64,
    session_id: String,
    url: Url,
    events: mpsc::Sender<LinkEvent>,
    outbound: mpsc::UnboundedReceiver<ClientMessage>,
    dial: watch::Sender<DialOutcome>,
    state: watch::Sender<LinkState>,
}

impl Driver {
    async fn run(mut self) {
        let mut socket = match self.dial().await {
            Ok(socket) => socket,
            Err(err) => {
                warn!(session = %self.session_id, error = %err, "dial failed");
                // Evict before publishing so a retrying caller dials fresh.
                self.evict();
                let _ = self.dial.send(DialOutcome::Failed(err.to_string()));
                return;
            }
        };
        let _ = self.state.send(LinkState::Open);
        let _ = self.dial.send(DialOutcome::Up);
        if self.events.send(LinkEvent::Up { resumed: false }).await.is_err() {
            self.evict();
            return;
        }
        debug!(session = %self.session_id, "session link up");

        loop {
            if self.pump(&mut socket).await {
                // Consumer or handle gone; nothing left to drive.
                self.evict();
                return;
            }
            self.drain_outbound();

            match self.redial().await {
                Some(reopened) => {
                    socket = reopened;
                    let _ = self.state.send(LinkState::Open);
                    if self
                        .events
                        .send(LinkEvent::Up { resumed: true })
                        .await
                        .is_err()
                    {
                        self.evict();
                        return;
                    }
                    info!(session = %self.session_id, "session link reestablished");
                }
                None => {
                    info!(
                        session = %self.session_id,
                        "reconnect attempts exhausted; link going down"
                    );
                    let _ = self.state.send(LinkState::Offline);
                    let _ = self.events.send(LinkEvent::Down).await;
                    self.evict();
                    return;
                }
            }
        }
    }

    /// Forwards traffic until the socket fails. Returns true when the link
    /// should shut down for good (consumer or registry slot dropped) rather
    /// than reconnect.
    async fn pump(&mut self, socket: &mut WsStream) -> bool {
        loop {
            tokio::select! {
                outbound = self.outbound.recv() => {
                    let Some(message) = outbound else {
                        // Registry slot gone; disconnect is in flight.
                        return true;
                    };
                    let frame = match serde_json::to_string(&message) {
                        Ok(frame) => frame,
                        Err(err) => {
                            warn!(
                                session = %self.session_id,
                                error = %err,
                                "failed to encode outbound message"
                            );
                            continue;
                        }
                    };
                    if let Err(err) = socket.send(Message::Text(frame)).await {
                        warn!(session = %self.session_id, error = %err, "websocket send failed");
                        return false;
                    }
                }
                inbound = socket.next() => {
                    match inbound {
                        Some(Ok(Message::Text(raw))) => {
                            match serde_json::from_str::<ServerMessage>(&raw) {
                                Ok(message) => {
                                    if self
                                        .events
                                        .send(LinkEvent::Inbound(message))
                                        .await
                                        .is_err()
                                    {
                                        return true;
                                    }
                                }
                                Err(err) => {
                                    // Garbage is dropped here, never surfaced.
                                    warn!(
                                        session = %self.session_id,
                                        error = %Error::Protocol(err),
                                        "discarding malformed frame"
                                    );
                                }
                            }
                        }
                        Some(Ok(Message::Binary(_))) => {
                            warn!(session = %self.session_id, "discarding unexpected binary frame");
                        }
                        Some(Ok(Message::Close(_))) => {
                            debug!(session = %self.session_id, "server closed websocket");
                            return false;
                        }
                        Some(Ok(_)) => {} // Ping/pong handled by tungstenite.
                        Some(Err(err)) => {
                            warn!(session = %self.session_id, error = %err, "websocket error");
                            return false;
                        }
                        None => {
                            debug!(session = %self.session_id, "websocket stream ended");
                            return false;
                        }
                    }
                }
            }
        }
    }

    /// Backoff-redial loop after an unclean close. `None` when attempts are
    /// exhausted.
    async fn redial(&mut self) -> Option<WsStream> {
        let config = self.inner.config.clone();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if attempt > config.max_reconnect_attempts {
                return None;
            }
            let _ = self.state.send(LinkState::Reconnecting);
            if self
                .events
                .send(LinkEvent::Reconnecting { attempt })
                .await
                .is_err()
            {
                return None;
            }
            let delay = retry_delay(
                config.reconnect_base_delay,
                attempt,
                config.max_reconnect_delay,
            );
            debug!(
                session = %self.session_id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "scheduling reconnect"
            );
            sleep(delay).await;
            match self.dial().await {
                Ok(socket) => return Some(socket),
                Err(err) => {
                    warn!(
                        session = %self.session_id,
                        attempt,
                        error = %err,
                        "reconnect dial failed"
                    );
                }
            }
        }
    }

    async fn dial(&self) -> Result<WsStream> {
        match timeout(self.inner.config.dial_timeout, connect_async(self.url.as_str())).await {
            Ok(Ok((socket, _response))) => Ok(socket),
            Ok(Err(err)) => Err(err.into()),
            Err(_) => Err(Error::DialTimeout),
        }
    }

    /// Drops any messages queued while the socket was failing.
    fn drain_outbound(&mut self) {
        let mut dropped = 0usize;
        while self.outbound.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            warn!(
                session = %self.session_id,
                dropped,
                "dropped outbound messages queued during outage"
            );
        }
    }

    /// Removes this driver's own slot, leaving any replacement link alone.
    fn evict(&self) {
        let mut links = self.inner.links.lock().unwrap();
        if links
            .get(&self.session_id)
            .is_some_and(|link| link.id == self.link_id)
        {
            links.remove(&self.session_id);
        }
    }
}
