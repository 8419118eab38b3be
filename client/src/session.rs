//! Live handle to one match, online or hot-seat.
//!
//! Every online session owns a pump task that drains its link events in
//! order and feeds them through the state machine. UI code never sees the
//! link directly; it reads snapshots from a watch channel and calls the
//! handle methods below.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use parlor_types::{ClientMessage, GameKind, GridMove};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::connection::{ConnectionManager, LinkEvent};
use crate::state::{
    ConnectionHealth, PlayMode, SessionState, SessionStateMachine, Verdict,
};
use crate::{Error, Result};

/// State shared between a session handle and its pump task.
pub(crate) struct SessionShared {
    session_id: String,
    kind: GameKind,
    player_id: String,
    machine: Mutex<SessionStateMachine>,
    updates: watch::Sender<Arc<SessionState>>,
}

impl SessionShared {
    pub(crate) fn new_online(session_id: String, kind: GameKind, player_id: String) -> Arc<Self> {
        let machine = SessionStateMachine::new(session_id.clone(), kind);
        Self::wrap(session_id, kind, player_id, machine)
    }

    pub(crate) fn new_hotseat(session_id: String, kind: GameKind, player_id: String) -> Arc<Self> {
        let machine = SessionStateMachine::new_hotseat(session_id.clone(), kind);
        Self::wrap(session_id, kind, player_id, machine)
    }

    fn wrap(
        session_id: String,
        kind: GameKind,
        player_id: String,
        machine: SessionStateMachine,
    ) -> Arc<Self> {
        let (updates, _) = watch::channel(machine.snapshot());
        Arc::new(Self {
            session_id,
            kind,
            player_id,
            machine: Mutex::new(machine),
            updates,
        })
    }

    /// Pushes the machine's current snapshot to all watchers. Re-reading
    /// under the lock keeps publishes monotonic however calls interleave.
    fn publish(&self) {
        let snapshot = self.machine.lock().unwrap().snapshot();
        self.updates.send_replace(snapshot);
    }

    fn join_message(&self) -> ClientMessage {
        ClientMessage::JoinGame {
            match_id: self.session_id.clone(),
            game_type: self.kind,
            player_id: self.player_id.clone(),
        }
    }
}

pub(crate) struct SessionCore {
    shared: Arc<SessionShared>,
    manager: Option<ConnectionManager>,
    pump: Option<JoinHandle<()>>,
    closed: AtomicBool,
}

impl SessionCore {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(Error::SessionClosed)
        } else {
            Ok(())
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(pump) = &self.pump {
            pump.abort();
        }
        if let Some(manager) = &self.manager {
            manager.disconnect(&self.shared.session_id);
        }
    }
}

impl Drop for SessionCore {
    fn drop(&mut self) {
        self.close();
    }
}

/// Cloneable handle to one match. Dropping the last clone leaves the match
/// and tears the link down.
#[derive(Clone)]
pub struct Session {
    core: Arc<SessionCore>,
}

impl Session {
    pub(crate) fn online(
        shared: Arc<SessionShared>,
        manager: ConnectionManager,
        events: mpsc::Receiver<LinkEvent>,
    ) -> Self {
        let pump = tokio::spawn(run_pump(shared.clone(), manager.clone(), events));
        Self {
            core: Arc::new(SessionCore {
                shared,
                manager: Some(manager),
                pump: Some(pump),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn hotseat(shared: Arc<SessionShared>) -> Self {
        Self {
            core: Arc::new(SessionCore {
                shared,
                manager: None,
                pump: None,
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn from_core(core: Arc<SessionCore>) -> Self {
        Self { core }
    }

    pub(crate) fn downgrade(&self) -> Weak<SessionCore> {
        Arc::downgrade(&self.core)
    }

    pub fn session_id(&self) -> &str {
        &self.core.shared.session_id
    }

    pub fn kind(&self) -> GameKind {
        self.core.shared.kind
    }

    pub fn player_id(&self) -> &str {
        &self.core.shared.player_id
    }

    /// Latest published snapshot.
    pub fn state(&self) -> Arc<SessionState> {
        self.core.shared.updates.borrow().clone()
    }

    /// Subscribes to snapshot updates. Watchers that fall behind only see
    /// the latest state, never a stale one.
    pub fn watch(&self) -> watch::Receiver<Arc<SessionState>> {
        self.core.shared.updates.subscribe()
    }

    /// Plays at `position`. Online this gates on turn ownership, records
    /// the move as speculative and sends it upstream; hot-seat it resolves
    /// entirely locally. Rejections come back synchronously as
    /// [`Error::IllegalMove`] with the session unchanged.
    pub fn make_move(&self, position: GridMove) -> Result<()> {
        self.core.ensure_open()?;
        let shared = &self.core.shared;
        let mut outbound = None;
        {
            let mut machine = shared.machine.lock().unwrap();
            match machine.mode() {
                PlayMode::Online => {
                    let pending = machine.propose_move(position)?;
                    outbound = Some(ClientMessage::MakeMove {
                        match_id: shared.session_id.clone(),
                        game_type: shared.kind,
                        position: pending.position,
                        player_id: shared.player_id.clone(),
                    });
                }
                PlayMode::Hotseat => machine.apply_local_move(position)?,
            }
        }
        shared.publish();
        if let Some(message) = outbound {
            if let Some(manager) = &self.core.manager {
                manager.send(&shared.session_id, message);
            }
        }
        Ok(())
    }

    /// Asks for a fresh board. Online the reset round-trips through the
    /// server; hot-seat it happens in place.
    pub fn restart(&self) -> Result<()> {
        self.core.ensure_open()?;
        let shared = &self.core.shared;
        let mode = shared.machine.lock().unwrap().mode();
        match mode {
            PlayMode::Online => {
                if let Some(manager) = &self.core.manager {
                    manager.send(
                        &shared.session_id,
                        ClientMessage::RestartGame {
                            match_id: shared.session_id.clone(),
                            game_type: shared.kind,
                        },
                    );
                }
            }
            PlayMode::Hotseat => {
                shared.machine.lock().unwrap().apply_restart();
                shared.publish();
            }
        }
        Ok(())
    }

    /// Abandons the server and continues the current board as hot-seat.
    /// One-way for this session.
    pub fn go_offline(&self) {
        let shared = &self.core.shared;
        shared.machine.lock().unwrap().engage_hotseat();
        shared.publish();
        if let Some(pump) = &self.core.pump {
            pump.abort();
        }
        if let Some(manager) = &self.core.manager {
            manager.disconnect(&shared.session_id);
        }
    }

    /// Leaves the match and closes the handle. Later calls on any clone
    /// return [`Error::SessionClosed`].
    pub fn leave(&self) {
        self.core.close();
    }
}

/// Drains link events in arrival order into the state machine.
async fn run_pump(
    shared: Arc<SessionShared>,
    manager: ConnectionManager,
    mut events: mpsc::Receiver<LinkEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            LinkEvent::Up { resumed } => {
                shared
                    .machine
                    .lock()
                    .unwrap()
                    .set_health(ConnectionHealth::Online);
                shared.publish();
                if resumed {
                    info!(session = %shared.session_id, "link back up; rejoining match");
                } else {
                    debug!(session = %shared.session_id, "link up; joining match");
                }
                // Joining (or rejoining) prompts the server to send a full
                // sync for this match.
                manager.send(&shared.session_id, shared.join_message());
            }
            LinkEvent::Inbound(message) => {
                let verdict = shared.machine.lock().unwrap().apply_server(&message);
                match verdict {
                    Verdict::Applied => shared.publish(),
                    Verdict::Discarded(reason) => {
                        warn!(session = %shared.session_id, reason, "discarding server message");
                    }
                }
            }
            LinkEvent::Reconnecting { attempt } => {
                debug!(session = %shared.session_id, attempt, "link down; reconnecting");
                shared
                    .machine
                    .lock()
                    .unwrap()
                    .set_health(ConnectionHealth::Reconnecting);
                shared.publish();
            }
            LinkEvent::Down => {
                info!(session = %shared.session_id, "link lost for good; continuing locally");
                shared.machine.lock().unwrap().engage_hotseat();
                shared.publish();
                break;
            }
        }
    }
    debug!(session = %shared.session_id, "session pump finished");
}
