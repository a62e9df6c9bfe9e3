//! Subscription Registry
//!
//! Tracks, per open stream, the currency pairs a client asked to be kept
//! informed about.
//!
//! # Design
//!
//! The registry tracks:
//! - Which pairs each session is subscribed to, in request order
//! - The lifecycle state of each session
//! - Reference counts per pair across sessions
//!
//! A session is created when a stream opens and removed, together with its
//! pair list, when the stream ends. Nothing else ever deletes a session, so
//! the task that owns a stream is the only one that can tear it down.
//!
//! # Lifecycle
//!
//! ```text
//! open_session ──► Connected ──(first valid pair)──► Streaming
//!                      │                                 │
//!                      └──────────(close_session)────────┴──► removed
//! ```
//!
//! There is no closed state: a closed session is gone, and
//! [`SubscriptionRegistry::state`] reports it as `None`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::domain::rates::RatePair;

// =============================================================================
// Types
// =============================================================================

/// Opaque identifier for one stream connection.
pub type SessionId = u64;

/// Lifecycle state of a stream session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Stream open, no valid request received yet.
    Connected,
    /// At least one pair registered; updates are being pushed.
    Streaming,
}

impl SessionState {
    /// Lowercase name for logs and health output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Streaming => "streaming",
        }
    }
}

/// Result of registering a pair for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// Pair appended to the session's list.
    Added,
    /// The session already had this pair; nothing changed.
    Duplicate,
}

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// No open session with this id.
    #[error("unknown session {0}")]
    UnknownSession(SessionId),
}

// =============================================================================
// Registry State
// =============================================================================

#[derive(Debug)]
struct SessionEntry {
    state: SessionState,
    pairs: Vec<RatePair>,
    opened_at: DateTime<Utc>,
}

impl SessionEntry {
    fn new() -> Self {
        Self {
            state: SessionState::Connected,
            pairs: Vec::new(),
            opened_at: Utc::now(),
        }
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    sessions: HashMap<SessionId, SessionEntry>,
    pair_refcount: HashMap<RatePair, usize>,
}

impl RegistryState {
    fn add(&mut self, session: SessionId, pair: RatePair) -> Result<AddOutcome, RegistryError> {
        let entry = self
            .sessions
            .get_mut(&session)
            .ok_or(RegistryError::UnknownSession(session))?;

        if entry.pairs.contains(&pair) {
            return Ok(AddOutcome::Duplicate);
        }

        *self.pair_refcount.entry(pair.clone()).or_insert(0) += 1;
        entry.pairs.push(pair);
        entry.state = SessionState::Streaming;

        Ok(AddOutcome::Added)
    }

    fn remove(&mut self, session: SessionId) -> Option<Vec<RatePair>> {
        let entry = self.sessions.remove(&session)?;

        for pair in &entry.pairs {
            if let Some(refcount) = self.pair_refcount.get_mut(pair) {
                *refcount = refcount.saturating_sub(1);

                if *refcount == 0 {
                    self.pair_refcount.remove(pair);
                }
            }
        }

        Some(entry.pairs)
    }
}

// =============================================================================
// Subscription Registry
// =============================================================================

/// Thread-safe map from session to its requested pairs.
///
/// # Example
///
/// ```rust
/// use currency_service::domain::rates::RatePair;
/// use currency_service::domain::subscription::{AddOutcome, SessionState, SubscriptionRegistry};
///
/// let registry = SubscriptionRegistry::new();
/// let session = registry.open_session();
/// assert_eq!(registry.state(session), Some(SessionState::Connected));
///
/// let pair = RatePair::new("USD", "INR").unwrap();
/// assert_eq!(registry.add_pair(session, pair.clone()), Ok(AddOutcome::Added));
/// assert_eq!(registry.add_pair(session, pair), Ok(AddOutcome::Duplicate));
/// assert_eq!(registry.state(session), Some(SessionState::Streaming));
///
/// registry.close_session(session);
/// assert_eq!(registry.state(session), None);
/// ```
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    state: RwLock<RegistryState>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session in the `Connected` state.
    pub fn open_session(&self) -> SessionId {
        let mut state = self.state.write();
        loop {
            let id = uuid::Uuid::new_v4().as_u64_pair().0;
            if let std::collections::hash_map::Entry::Vacant(slot) = state.sessions.entry(id) {
                slot.insert(SessionEntry::new());
                return id;
            }
        }
    }

    /// Append a pair to a session's list.
    ///
    /// A pair the session already holds is acknowledged as
    /// [`AddOutcome::Duplicate`] and not stored twice.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownSession`] if the session was never
    /// opened or has been closed.
    pub fn add_pair(&self, session: SessionId, pair: RatePair) -> Result<AddOutcome, RegistryError> {
        self.state.write().add(session, pair)
    }

    /// Pairs held by a session, in request order.
    #[must_use]
    pub fn pairs(&self, session: SessionId) -> Vec<RatePair> {
        self.state
            .read()
            .sessions
            .get(&session)
            .map(|entry| entry.pairs.clone())
            .unwrap_or_default()
    }

    /// Current lifecycle state, or `None` once the session is closed.
    #[must_use]
    pub fn state(&self, session: SessionId) -> Option<SessionState> {
        self.state.read().sessions.get(&session).map(|e| e.state)
    }

    /// When the session was opened.
    #[must_use]
    pub fn opened_at(&self, session: SessionId) -> Option<DateTime<Utc>> {
        self.state.read().sessions.get(&session).map(|e| e.opened_at)
    }

    /// Whether the session is still registered.
    #[must_use]
    pub fn contains(&self, session: SessionId) -> bool {
        self.state.read().sessions.contains_key(&session)
    }

    /// Remove a session and release its pairs.
    ///
    /// Returns the pairs the session held, or an empty list for an unknown
    /// session. Closing twice is harmless.
    pub fn close_session(&self, session: SessionId) -> Vec<RatePair> {
        self.state.write().remove(session).unwrap_or_default()
    }

    /// Number of open sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.state.read().sessions.len()
    }

    /// Distinct pairs subscribed by at least one session.
    #[must_use]
    pub fn active_pairs(&self) -> Vec<RatePair> {
        self.state.read().pair_refcount.keys().cloned().collect()
    }

    /// Registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let state = self.state.read();
        RegistryStats {
            session_count: state.sessions.len(),
            streaming_sessions: state
                .sessions
                .values()
                .filter(|e| e.state == SessionState::Streaming)
                .count(),
            pair_count: state.pair_refcount.len(),
            request_count: state.sessions.values().map(|e| e.pairs.len()).sum(),
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Snapshot of registry counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Open sessions.
    pub session_count: usize,
    /// Sessions with at least one pair.
    pub streaming_sessions: usize,
    /// Distinct pairs across sessions.
    pub pair_count: usize,
    /// Pairs summed over sessions.
    pub request_count: usize,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(base: &str, destination: &str) -> RatePair {
        RatePair::new(base, destination).unwrap()
    }

    #[test]
    fn open_session_starts_connected() {
        let registry = SubscriptionRegistry::new();

        let session = registry.open_session();

        assert_eq!(registry.state(session), Some(SessionState::Connected));
        assert!(registry.pairs(session).is_empty());
        assert!(registry.opened_at(session).is_some());
    }

    #[test]
    fn session_ids_are_distinct() {
        let registry = SubscriptionRegistry::new();

        let a = registry.open_session();
        let b = registry.open_session();

        assert_ne!(a, b);
        assert_eq!(registry.session_count(), 2);
    }

    #[test]
    fn first_pair_moves_to_streaming() {
        let registry = SubscriptionRegistry::new();
        let session = registry.open_session();

        let outcome = registry.add_pair(session, pair("USD", "INR")).unwrap();

        assert_eq!(outcome, AddOutcome::Added);
        assert_eq!(registry.state(session), Some(SessionState::Streaming));
    }

    #[test]
    fn duplicate_pair_not_stored_twice() {
        let registry = SubscriptionRegistry::new();
        let session = registry.open_session();

        registry.add_pair(session, pair("USD", "INR")).unwrap();
        let outcome = registry.add_pair(session, pair("USD", "INR")).unwrap();

        assert_eq!(outcome, AddOutcome::Duplicate);
        assert_eq!(registry.pairs(session).len(), 1);
    }

    #[test]
    fn pairs_keep_request_order() {
        let registry = SubscriptionRegistry::new();
        let session = registry.open_session();

        registry.add_pair(session, pair("USD", "INR")).unwrap();
        registry.add_pair(session, pair("GBP", "JPY")).unwrap();
        registry.add_pair(session, pair("INR", "USD")).unwrap();

        assert_eq!(
            registry.pairs(session),
            vec![pair("USD", "INR"), pair("GBP", "JPY"), pair("INR", "USD")]
        );
    }

    #[test]
    fn add_to_unknown_session_fails() {
        let registry = SubscriptionRegistry::new();

        let err = registry.add_pair(42, pair("USD", "INR")).unwrap_err();

        assert_eq!(err, RegistryError::UnknownSession(42));
    }

    #[test]
    fn add_after_close_fails() {
        let registry = SubscriptionRegistry::new();
        let session = registry.open_session();
        registry.close_session(session);

        assert!(registry.add_pair(session, pair("USD", "INR")).is_err());
    }

    #[test]
    fn close_session_releases_pairs() {
        let registry = SubscriptionRegistry::new();
        let session = registry.open_session();
        registry.add_pair(session, pair("USD", "INR")).unwrap();

        let released = registry.close_session(session);

        assert_eq!(released, vec![pair("USD", "INR")]);
        assert_eq!(registry.state(session), None);
        assert!(!registry.contains(session));
        assert!(registry.active_pairs().is_empty());
    }

    #[test]
    fn close_unknown_session_is_harmless() {
        let registry = SubscriptionRegistry::new();
        let session = registry.open_session();

        assert!(registry.close_session(999).is_empty());
        assert!(registry.close_session(session).is_empty());
        assert!(registry.close_session(session).is_empty());
        assert_eq!(registry.session_count(), 0);
    }

    #[test]
    fn shared_pair_survives_one_close() {
        let registry = SubscriptionRegistry::new();
        let a = registry.open_session();
        let b = registry.open_session();
        registry.add_pair(a, pair("USD", "INR")).unwrap();
        registry.add_pair(b, pair("USD", "INR")).unwrap();

        registry.close_session(a);

        assert_eq!(registry.active_pairs(), vec![pair("USD", "INR")]);
        assert_eq!(registry.pairs(b), vec![pair("USD", "INR")]);
    }

    #[test]
    fn stats_are_accurate() {
        let registry = SubscriptionRegistry::new();
        let a = registry.open_session();
        let b = registry.open_session();
        let _idle = registry.open_session();

        registry.add_pair(a, pair("USD", "INR")).unwrap();
        registry.add_pair(a, pair("GBP", "JPY")).unwrap();
        registry.add_pair(b, pair("USD", "INR")).unwrap();

        let stats = registry.stats();

        assert_eq!(stats.session_count, 3);
        assert_eq!(stats.streaming_sessions, 2);
        assert_eq!(stats.pair_count, 2); // USD/INR and GBP/JPY
        assert_eq!(stats.request_count, 3);
    }

    #[test]
    fn session_state_names() {
        assert_eq!(SessionState::Connected.as_str(), "connected");
        assert_eq!(SessionState::Streaming.as_str(), "streaming");
    }

    #[test]
    fn closed_session_has_no_state() {
        let registry = SubscriptionRegistry::new();
        let idle = registry.open_session();
        let streaming = registry.open_session();
        registry.add_pair(streaming, pair("GBP", "JPY")).unwrap();

        assert!(registry.close_session(idle).is_empty());
        registry.close_session(streaming);

        assert_eq!(registry.state(idle), None);
        assert_eq!(registry.state(streaming), None);
        assert_eq!(registry.opened_at(idle), None);
        assert_eq!(registry.session_count(), 0);
    }

    #[test]
    fn thread_safety_concurrent_subscriptions() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(SubscriptionRegistry::new());
        let sessions: Vec<_> = (0..10).map(|_| registry.open_session()).collect();
        let codes = ["USD", "GBP", "JPY", "CHF", "SEK", "NOK", "DKK", "PLN", "CZK", "HUF"];
        let mut handles = vec![];

        for (session, code) in sessions.iter().copied().zip(codes) {
            let r = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                r.add_pair(session, pair(code, "INR")).unwrap();
                r.add_pair(session, pair("EUR", "USD")).unwrap();
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let stats = registry.stats();
        assert_eq!(stats.streaming_sessions, 10);
        // 10 distinct X/INR pairs + 1 shared EUR/USD
        assert_eq!(stats.pair_count, 11);
    }

    #[test]
    fn thread_safety_concurrent_closes() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(SubscriptionRegistry::new());
        let sessions: Vec<_> = (0..10).map(|_| registry.open_session()).collect();
        for session in &sessions {
            registry.add_pair(*session, pair("EUR", "USD")).unwrap();
        }

        let mut handles = vec![];
        for session in sessions {
            let r = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                r.close_session(session);
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let stats = registry.stats();
        assert_eq!(stats.session_count, 0);
        assert_eq!(stats.pair_count, 0);
    }
}
