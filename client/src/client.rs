//! Entry point: one transport, many sessions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use parlor_types::GameKind;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::time::sleep;
use tracing::{info, warn};
use url::Url;

use crate::connection::{ConnectionConfig, ConnectionManager};
use crate::offline::{FallbackDecision, FallbackPolicy, OfflineFallback};
use crate::session::{Session, SessionCore, SessionShared};
use crate::{Error, Result};

/// Client-wide settings; per-session behavior is derived from these.
#[derive(Clone, Debug, Default)]
pub struct ClientConfig {
    pub connection: ConnectionConfig,
    pub fallback: FallbackPolicy,
}

/// Handle to a parlor server. Cheap to clone; all clones share the
/// transport and the session registry.
#[derive(Clone)]
pub struct Client {
    manager: ConnectionManager,
    sessions: Arc<Mutex<HashMap<String, Weak<SessionCore>>>>,
    config: ClientConfig,
}

impl Client {
    /// Points the client at a server endpoint, e.g. `ws://127.0.0.1:4000/ws`.
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_config(base_url, ClientConfig::default())
    }

    pub fn with_config(base_url: &str, config: ClientConfig) -> Result<Self> {
        let url = Url::parse(base_url)?;
        match url.scheme() {
            "ws" | "wss" => {}
            other => return Err(Error::InvalidScheme(other.to_string())),
        }
        Ok(Self {
            manager: ConnectionManager::new(url, config.connection.clone()),
            sessions: Arc::new(Mutex::new(HashMap::new())),
            config,
        })
    }

    /// Joins `match_id`, dialing the server as needed. Re-joining a match
    /// this client already has live returns the existing session. When the
    /// server stays unreachable past the fallback budget the returned
    /// session is a local hot-seat game instead of an error.
    pub async fn join(
        &self,
        match_id: &str,
        kind: GameKind,
        player_id: Option<String>,
        auth_token: Option<&str>,
    ) -> Result<Session> {
        if let Some(existing) = self.live_session(match_id) {
            return Ok(existing);
        }
        let player_id = player_id.unwrap_or_else(generate_player_id);

        let mut fallback = OfflineFallback::new(self.config.fallback);
        loop {
            match self.manager.connect(match_id, auth_token).await {
                Ok(()) => break,
                Err(err) => {
                    warn!(
                        session = match_id,
                        error = %err,
                        attempt = fallback.failures() + 1,
                        "connection attempt failed"
                    );
                    match fallback.record_failure() {
                        FallbackDecision::RetryAfter(delay) => sleep(delay).await,
                        FallbackDecision::GoOffline => {
                            info!(
                                session = match_id,
                                "server unreachable; starting hot-seat game"
                            );
                            let shared = SessionShared::new_hotseat(
                                match_id.to_string(),
                                kind,
                                player_id,
                            );
                            return Ok(self.register(match_id, Session::hotseat(shared)));
                        }
                    }
                }
            }
        }

        let mut sessions = self.sessions.lock().unwrap();
        // A concurrent join for the same match may have won the race while
        // we were dialing.
        if let Some(core) = sessions.get(match_id).and_then(Weak::upgrade) {
            if !core.is_closed() {
                return Ok(Session::from_core(core));
            }
        }
        let events = self
            .manager
            .take_events(match_id)
            .ok_or(Error::ConnectionClosed)?;
        let shared = SessionShared::new_online(match_id.to_string(), kind, player_id);
        let session = Session::online(shared, self.manager.clone(), events);
        sessions.insert(match_id.to_string(), session.downgrade());
        Ok(session)
    }

    /// Starts a purely local two-player game, no server involved.
    pub fn hotseat(&self, kind: GameKind) -> Session {
        let session_id = format!("local-{}", random_suffix());
        let shared = SessionShared::new_hotseat(session_id.clone(), kind, generate_player_id());
        self.register(&session_id, Session::hotseat(shared))
    }

    fn live_session(&self, match_id: &str) -> Option<Session> {
        let mut sessions = self.sessions.lock().unwrap();
        // Dropped sessions leave dead weak entries behind.
        sessions.retain(|_, core| core.strong_count() > 0);
        let core = sessions.get(match_id).and_then(Weak::upgrade)?;
        if core.is_closed() {
            None
        } else {
            Some(Session::from_core(core))
        }
    }

    fn register(&self, match_id: &str, session: Session) -> Session {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.retain(|_, core| core.strong_count() > 0);
        sessions.insert(match_id.to_string(), session.downgrade());
        session
    }
}

fn generate_player_id() -> String {
    format!("guest-{}", random_suffix())
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect()
}
