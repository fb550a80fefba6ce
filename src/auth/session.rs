//! Session Registry
//! Mission: Track logged-in sessions and sweep idle ones

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use rand::RngCore;
use std::collections::HashMap;
use tracing::debug;

/// Sessions idle longer than this are dropped by the sweep.
const IDLE_MAX_HOURS: i64 = 24;

/// Token pair cached on a session record.
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
}

/// A tracked login. Tokens remain the authorization source of truth; the
/// session exists for activity tracking and proactive eviction only.
#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
    pub tokens: SessionTokens,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Process-local session map.
///
/// Lives only in memory: a restart drops all records but does not invalidate
/// tokens already issued. Multi-instance deployments would need to move this
/// to shared storage.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Session>>,
    idle_max: Duration,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::with_idle_max(Duration::hours(IDLE_MAX_HOURS))
    }

    pub fn with_idle_max(idle_max: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_max,
        }
    }

    /// Create a session and return its identifier: 32 random bytes, hex
    /// encoded (256 bits of entropy).
    pub fn create(&self, username: &str, tokens: SessionTokens) -> String {
        let mut raw = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut raw);
        let id = hex::encode(raw);

        let now = Utc::now();
        let session = Session {
            username: username.to_string(),
            tokens,
            created_at: now,
            last_activity: now,
        };

        self.sessions.write().insert(id.clone(), session);
        id
    }

    pub fn get(&self, id: &str) -> Option<Session> {
        self.sessions.read().get(id).cloned()
    }

    /// Record activity on a session. Missing sessions are ignored; callers
    /// treat this as best effort.
    pub fn touch(&self, id: &str) -> bool {
        match self.sessions.write().get_mut(id) {
            Some(session) => {
                session.last_activity = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Replace the cached access token after a refresh, also counting as
    /// activity.
    pub fn update_access_token(&self, id: &str, access_token: &str) -> bool {
        match self.sessions.write().get_mut(id) {
            Some(session) => {
                session.tokens.access_token = access_token.to_string();
                session.last_activity = Utc::now();
                true
            }
            None => false,
        }
    }

    pub fn destroy(&self, id: &str) -> bool {
        self.sessions.write().remove(id).is_some()
    }

    /// Drop sessions idle past the threshold. Returns the number removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    /// Sweep against an explicit clock, so expiry is testable without
    /// waiting out the idle window.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, session| now - session.last_activity <= self.idle_max);
        let removed = before - sessions.len();
        if removed > 0 {
            debug!("swept {} idle session(s)", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
