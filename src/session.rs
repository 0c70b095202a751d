use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::bucket::Bucket;
use crate::config::LimiterConfig;

/// Opaque key identifying a request source.
pub type ClientIdentity = String;

// Per-client state - bucket + last time the client was seen
struct Session {
    bucket: Arc<Bucket>,
    last_seen: Instant,
}

/// Client sessions behind a single lock.
///
/// The lock only guards the map and `last_seen`; buckets are handed out as
/// `Arc`s so token waits happen outside of it.
pub struct SessionStore {
    config: LimiterConfig,
    sessions: Mutex<HashMap<ClientIdentity, Session>>,
}

impl SessionStore {
    pub fn new(config: &LimiterConfig) -> Self {
        Self {
            config: *config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch the bucket for `identity`, creating a full one if this is a new
    /// client. Refreshes `last_seen` either way.
    pub fn get_or_create(&self, identity: &str) -> Arc<Bucket> {
        let now = Instant::now();
        let mut sessions = self.sessions.lock();

        if let Some(session) = sessions.get_mut(identity) {
            session.last_seen = now;
            return Arc::clone(&session.bucket);
        }

        debug!(identity, "new client session");
        let bucket = Arc::new(Bucket::new(&self.config));
        sessions.insert(
            identity.to_owned(),
            Session {
                bucket: Arc::clone(&bucket),
                last_seen: now,
            },
        );
        bucket
    }

    /// Drop every session that has been idle for at least `idle_threshold`.
    /// Returns how many were removed.
    pub fn sweep_expired(&self, now: Instant, idle_threshold: Duration) -> usize {
        let mut sessions = self.sessions.lock();
        let before = sessions.len();

        sessions.retain(|identity, session| {
            let idle = now.saturating_duration_since(session.last_seen);
            let keep = idle < idle_threshold;
            if !keep {
                debug!(identity = %identity, idle = ?idle, "removed expiring session");
            }
            keep
        });

        before - sessions.len()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.sessions.lock().contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}
