use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use contracts::domain::a002_cash_register_token::aggregate::CashRegisterTokenId;

/// Sessions that presented the right PIN, per token (in-memory).
/// Each entry carries the instant it stops counting.
#[derive(Clone, Default)]
pub struct PinSessions {
    verified: Arc<RwLock<HashMap<(CashRegisterTokenId, String), DateTime<Utc>>>>,
}

static PIN_SESSIONS: Lazy<PinSessions> = Lazy::new(PinSessions::new);

/// Process-wide registry
pub fn sessions() -> &'static PinSessions {
    &PIN_SESSIONS
}

impl PinSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a verified session until `valid_until`. Lapsed entries of
    /// every token are dropped on the way.
    pub fn mark_verified(
        &self,
        token_id: CashRegisterTokenId,
        session_id: &str,
        valid_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) {
        let mut verified = self.verified.write().unwrap_or_else(|e| e.into_inner());
        verified.retain(|_, until| *until > now);
        if valid_until > now {
            verified.insert((token_id, session_id.to_string()), valid_until);
        }
    }

    pub fn is_verified(
        &self,
        token_id: CashRegisterTokenId,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> bool {
        let verified = self.verified.read().unwrap_or_else(|e| e.into_inner());
        verified
            .get(&(token_id, session_id.to_string()))
            .map(|until| *until > now)
            .unwrap_or(false)
    }

    /// Forget every session of a token (on deactivation)
    pub fn forget_token(&self, token_id: CashRegisterTokenId) {
        let mut verified = self.verified.write().unwrap_or_else(|e| e.into_inner());
        verified.retain(|(id, _), _| *id != token_id);
    }

    pub fn len(&self) -> usize {
        self.verified.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_verification_is_per_session() {
        let sessions = PinSessions::new();
        let now = Utc::now();
        let until = now + Duration::hours(1);
        let token = CashRegisterTokenId::new_v4();
        let other_token = CashRegisterTokenId::new_v4();

        assert!(!sessions.is_verified(token, "s1", now));
        sessions.mark_verified(token, "s1", until, now);
        assert!(sessions.is_verified(token, "s1", now));
        assert!(!sessions.is_verified(token, "s2", now));
        assert!(!sessions.is_verified(other_token, "s1", now));
    }

    #[test]
    fn test_forget_token_drops_all_its_sessions() {
        let sessions = PinSessions::new();
        let now = Utc::now();
        let until = now + Duration::hours(1);
        let token = CashRegisterTokenId::new_v4();
        let other_token = CashRegisterTokenId::new_v4();
        sessions.mark_verified(token, "s1", until, now);
        sessions.mark_verified(token, "s2", until, now);
        sessions.mark_verified(other_token, "s1", until, now);

        sessions.forget_token(token);
        assert!(!sessions.is_verified(token, "s1", now));
        assert!(!sessions.is_verified(token, "s2", now));
        assert!(sessions.is_verified(other_token, "s1", now));
    }

    #[test]
    fn test_lapsed_sessions_stop_counting_and_are_evicted() {
        let sessions = PinSessions::new();
        let now = Utc::now();
        let token = CashRegisterTokenId::new_v4();

        sessions.mark_verified(token, "old", now + Duration::minutes(5), now);
        let later = now + Duration::minutes(10);
        assert!(!sessions.is_verified(token, "old", later));

        sessions.mark_verified(token, "new", later + Duration::minutes(5), later);
        assert_eq!(sessions.len(), 1);
        assert!(sessions.is_verified(token, "new", later));

        // already past its deadline, never stored
        sessions.mark_verified(token, "stale", later - Duration::seconds(1), later);
        assert_eq!(sessions.len(), 1);
    }
}
