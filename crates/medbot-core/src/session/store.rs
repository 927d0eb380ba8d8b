use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::StoreError;
use crate::util::truncate_string;

use super::{Flow, Session};

/// Marker appended to text cut down by [`SessionStore::enforce_size_bound`].
pub const TRUNCATION_MARKER: &str = "…[truncated]";

/// Stored record for one user plus the bookkeeping the turn protocol needs.
#[derive(Debug)]
pub struct SessionSlot {
    pub session: Session,
    /// Bumped by every reset; a turn that read an older epoch must not write back.
    pub epoch: u64,
    /// Collaborator calls currently running for this user.
    pub in_flight: u32,
    /// Set when the slot has been dropped from the map.
    pub removed: bool,
}

impl SessionSlot {
    fn new(user_id: &str) -> Self {
        Self {
            session: Session::new(user_id),
            epoch: 0,
            in_flight: 0,
            removed: false,
        }
    }
}

/// Exclusive access to one user's slot. Other users are unaffected.
pub type SessionGuard = OwnedMutexGuard<SessionSlot>;

/// In-memory session store: a sharded map with one async mutex per user.
///
/// Only map mutation itself is guarded across users; a turn holds its own
/// user's mutex and nothing else.
pub struct SessionStore {
    sessions: DashMap<String, Arc<Mutex<SessionSlot>>>,
    /// Slots admitted against `max_sessions`; never lower than the map size.
    admitted: AtomicUsize,
    max_sessions: usize,
    max_field_bytes: usize,
}

impl SessionStore {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            admitted: AtomicUsize::new(0),
            max_sessions: config.max_sessions,
            max_field_bytes: config.max_field_bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn max_field_bytes(&self) -> usize {
        self.max_field_bytes
    }

    fn slot(&self, user_id: &str) -> Result<Arc<Mutex<SessionSlot>>, StoreError> {
        if let Some(existing) = self.sessions.get(user_id) {
            return Ok(existing.value().clone());
        }
        match self.sessions.entry(user_id.to_string()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let admitted = self
                    .admitted
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                        (n < self.max_sessions).then_some(n + 1)
                    });
                if admitted.is_err() {
                    warn!("Session store full ({} sessions)", self.max_sessions);
                    return Err(StoreError::Exhausted {
                        limit: self.max_sessions,
                    });
                }
                debug!("Creating session for {}", user_id);
                let slot = Arc::new(Mutex::new(SessionSlot::new(user_id)));
                entry.insert(slot.clone());
                Ok(slot)
            }
        }
    }

    /// Lock the user's slot, creating it if needed, and refresh its access time.
    pub async fn checkout(&self, user_id: &str) -> Result<SessionGuard, StoreError> {
        loop {
            let slot = self.slot(user_id)?;
            let mut guard = slot.lock_owned().await;
            if guard.removed {
                // Swept between lookup and lock; retry against the live entry.
                continue;
            }
            guard.session.touch();
            return Ok(guard);
        }
    }

    /// Snapshot of the existing session, or a newly stored default one.
    pub async fn get_or_create(&self, user_id: &str) -> Result<Session, StoreError> {
        let guard = self.checkout(user_id).await?;
        Ok(guard.session.clone())
    }

    /// Snapshot of an existing session without creating one.
    pub async fn get(&self, user_id: &str) -> Option<Session> {
        let slot = self.sessions.get(user_id).map(|e| e.value().clone())?;
        let guard = slot.lock().await;
        if guard.removed {
            None
        } else {
            Some(guard.session.clone())
        }
    }

    /// Replace the user's session with a fresh default record.
    ///
    /// Waits for any turn currently holding the slot; a collaborator call that
    /// started before the reset will see the new epoch and discard its result.
    pub async fn reset(&self, user_id: &str) -> Result<(), StoreError> {
        let mut guard = self.checkout(user_id).await?;
        guard.session = Session::new(user_id);
        guard.epoch += 1;
        info!("Session reset for {}", user_id);
        Ok(())
    }

    /// Drop the user's session entirely. Returns whether one existed.
    pub async fn remove(&self, user_id: &str) -> bool {
        let Some((_, slot)) = self.sessions.remove(user_id) else {
            return false;
        };
        self.admitted.fetch_sub(1, Ordering::AcqRel);
        let mut guard = slot.lock().await;
        guard.removed = true;
        guard.epoch += 1;
        info!("Session removed for {}", user_id);
        true
    }

    /// Remove sessions idle for longer than `max_idle`. Returns how many were removed.
    ///
    /// Slots that are locked or have a collaborator call running are skipped.
    pub fn sweep_expired(&self, max_idle: Duration) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(max_idle)
            .ok()
            .and_then(|idle| chrono::Utc::now().checked_sub_signed(idle))
        else {
            return 0;
        };
        let mut removed = 0;

        self.sessions.retain(|_, slot| {
            let Ok(mut guard) = slot.try_lock() else {
                return true;
            };
            if guard.in_flight > 0 || guard.session.last_access >= cutoff {
                return true;
            }
            guard.removed = true;
            removed += 1;
            false
        });

        if removed > 0 {
            self.admitted.fetch_sub(removed, Ordering::AcqRel);
            info!("Swept {} idle sessions ({} remaining)", removed, self.sessions.len());
        }
        removed
    }

    /// Truncate oversized text fields in place. Returns whether anything was cut.
    pub fn enforce_size_bound(&self, session: &mut Session) -> bool {
        let limit = self.max_field_bytes;
        let mut truncated = false;
        let mut bound = |text: &mut String| {
            if text.len() > limit {
                *text = truncate_string(text, limit, TRUNCATION_MARKER);
                truncated = true;
            }
        };

        match &mut session.flow {
            Flow::Idle => {}
            Flow::Education(state) => {
                if let Some(leaflet) = state.leaflet.as_mut() {
                    bound(&mut leaflet.topic);
                    bound(&mut leaflet.primary_content);
                    if let Some(translation) = leaflet.translation.as_mut() {
                        bound(&mut translation.language);
                        bound(&mut translation.content);
                    }
                }
            }
            Flow::Chat(state) => {
                if let Some(language) = state.target_language.as_mut() {
                    bound(language);
                }
                if let Some(exchange) = state.last_exchange.as_mut() {
                    bound(&mut exchange.source);
                    bound(&mut exchange.plain_text);
                    bound(&mut exchange.translated);
                }
            }
        }

        if truncated {
            warn!("Truncated oversized session fields for {}", session.user_id);
        }
        truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ChatExchange, Leaflet, Mode, Translation};

    fn store() -> SessionStore {
        SessionStore::new(&SessionConfig::default())
    }

    #[tokio::test]
    async fn test_get_or_create_is_lazy_and_stable() {
        let store = store();
        assert!(store.is_empty());
        let s = store.get_or_create("U1").await.unwrap();
        assert_eq!(s.user_id, "U1");
        assert!(!s.started);
        store.get_or_create("U1").await.unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_get_or_create_creates_once() {
        let store = Arc::new(store());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut guard = store.checkout("same").await.unwrap();
                guard.session.activate(Mode::Education);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.len(), 1);
        assert!(store.get("same").await.unwrap().started);
    }

    #[tokio::test]
    async fn test_mutation_through_guard_persists() {
        let store = store();
        {
            let mut guard = store.checkout("U1").await.unwrap();
            guard.session.activate(Mode::Chat);
        }
        let s = store.get("U1").await.unwrap();
        assert_eq!(s.mode(), Mode::Chat);
    }

    #[tokio::test]
    async fn test_reset_bumps_epoch_and_clears() {
        let store = store();
        {
            let mut guard = store.checkout("U1").await.unwrap();
            guard.session.activate(Mode::Education);
        }
        store.reset("U1").await.unwrap();
        let guard = store.checkout("U1").await.unwrap();
        assert_eq!(guard.epoch, 1);
        assert!(!guard.session.started);
        assert_eq!(guard.session.user_id, "U1");
    }

    #[tokio::test]
    async fn test_remove_marks_slot() {
        let store = store();
        let guard = store.checkout("U1").await.unwrap();
        let slot = OwnedMutexGuard::mutex(&guard).clone();
        drop(guard);

        assert!(store.remove("U1").await);
        assert!(!store.remove("U1").await);
        assert!(slot.lock().await.removed);
        assert!(store.get("U1").await.is_none());
    }

    #[tokio::test]
    async fn test_exhaustion_is_reported() {
        let store = SessionStore::new(&SessionConfig {
            max_sessions: 2,
            ..SessionConfig::default()
        });
        store.get_or_create("a").await.unwrap();
        store.get_or_create("b").await.unwrap();
        // Existing users are still served
        store.get_or_create("a").await.unwrap();
        let err = store.get_or_create("c").await.unwrap_err();
        assert!(matches!(err, StoreError::Exhausted { limit: 2 }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_new_users_respect_limit() {
        let store = Arc::new(SessionStore::new(&SessionConfig {
            max_sessions: 4,
            ..SessionConfig::default()
        }));
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.get_or_create(&format!("U{i}")).await.is_ok()
            }));
        }
        let mut admitted = 0;
        for h in handles {
            if h.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 4);
        assert_eq!(store.len(), 4);
    }

    #[tokio::test]
    async fn test_removed_and_swept_slots_free_capacity() {
        let store = SessionStore::new(&SessionConfig {
            max_sessions: 2,
            ..SessionConfig::default()
        });
        store.get_or_create("a").await.unwrap();
        store.get_or_create("b").await.unwrap();
        assert!(store.get_or_create("c").await.is_err());

        assert!(store.remove("a").await);
        store.get_or_create("c").await.unwrap();

        {
            let mut guard = store.checkout("b").await.unwrap();
            guard.session.last_access = chrono::Utc::now() - chrono::Duration::hours(2);
        }
        assert_eq!(store.sweep_expired(Duration::from_secs(60)), 1);
        store.get_or_create("d").await.unwrap();
        assert!(store.get_or_create("e").await.is_err());
    }

    #[tokio::test]
    async fn test_sweep_removes_only_idle() {
        let store = store();
        {
            let mut guard = store.checkout("old").await.unwrap();
            guard.session.last_access = chrono::Utc::now() - chrono::Duration::hours(2);
        }
        store.get_or_create("fresh").await.unwrap();

        let removed = store.sweep_expired(Duration::from_secs(3600));
        assert_eq!(removed, 1);
        assert!(store.get("old").await.is_none());
        assert!(store.get("fresh").await.is_some());
    }

    #[tokio::test]
    async fn test_sweep_skips_in_flight_and_locked() {
        let store = store();
        {
            let mut guard = store.checkout("busy").await.unwrap();
            guard.session.last_access = chrono::Utc::now() - chrono::Duration::hours(2);
            guard.in_flight = 1;
        }
        let mut held = store.checkout("held").await.unwrap();
        held.session.last_access = chrono::Utc::now() - chrono::Duration::hours(2);

        assert_eq!(store.sweep_expired(Duration::from_secs(60)), 0);
        drop(held);
        assert_eq!(store.sweep_expired(Duration::from_secs(60)), 1);
        assert!(store.get("busy").await.is_some());
    }

    #[tokio::test]
    async fn test_checkout_refreshes_access_time() {
        let store = store();
        {
            let mut guard = store.checkout("U1").await.unwrap();
            guard.session.last_access = chrono::Utc::now() - chrono::Duration::hours(2);
        }
        store.checkout("U1").await.unwrap();
        assert_eq!(store.sweep_expired(Duration::from_secs(3600)), 0);
    }

    #[test]
    fn test_enforce_size_bound_truncates_with_marker() {
        let store = SessionStore::new(&SessionConfig {
            max_field_bytes: 64,
            ..SessionConfig::default()
        });
        let mut s = Session::new("U1");
        s.activate(Mode::Education);
        s.education_mut().unwrap().leaflet = Some(Leaflet {
            topic: "糖尿病".to_string(),
            primary_content: "衛教".repeat(100),
            translation: None,
        });

        assert!(store.enforce_size_bound(&mut s));
        let content = s.primary_content().unwrap();
        assert!(content.len() <= 64);
        assert!(content.ends_with(TRUNCATION_MARKER));
        assert_eq!(s.last_topic(), Some("糖尿病"));
        assert!(!store.enforce_size_bound(&mut s));
    }

    #[test]
    fn test_enforce_size_bound_covers_language_fields() {
        let store = SessionStore::new(&SessionConfig {
            max_field_bytes: 64,
            ..SessionConfig::default()
        });
        let mut s = Session::new("U1");
        s.activate(Mode::Education);
        s.education_mut().unwrap().leaflet = Some(Leaflet {
            topic: "糖尿病".to_string(),
            primary_content: "CONTENT_A".to_string(),
            translation: Some(Translation {
                language: "x".repeat(5000),
                content: "translated".to_string(),
            }),
        });

        assert!(store.enforce_size_bound(&mut s));
        let leaflet = s.education().unwrap().leaflet.as_ref().unwrap();
        let translation = leaflet.translation.as_ref().unwrap();
        assert!(translation.language.len() <= 64);
        assert!(translation.language.ends_with(TRUNCATION_MARKER));
        assert_eq!(translation.content, "translated");

        let mut chat = Session::new("U2");
        chat.activate(Mode::Chat);
        chat.chat_mut().unwrap().target_language = Some("y".repeat(5000));
        assert!(store.enforce_size_bound(&mut chat));
        let language = chat.chat().unwrap().target_language.as_deref().unwrap();
        assert!(language.len() <= 64);
    }

    #[test]
    fn test_enforce_size_bound_chat_fields() {
        let store = SessionStore::new(&SessionConfig {
            max_field_bytes: 32,
            ..SessionConfig::default()
        });
        let mut s = Session::new("U1");
        s.activate(Mode::Chat);
        s.chat_mut().unwrap().last_exchange = Some(ChatExchange {
            source: "short".to_string(),
            plain_text: "x".repeat(100),
            translated: "y".repeat(10),
        });
        assert!(store.enforce_size_bound(&mut s));
        let ex = s.chat().unwrap().last_exchange.as_ref().unwrap();
        assert_eq!(ex.source, "short");
        assert!(ex.plain_text.ends_with(TRUNCATION_MARKER));
        assert_eq!(ex.translated.len(), 10);
    }
}
