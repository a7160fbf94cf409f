use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::a001_cash_register::aggregate::{CashRegisterAmounts, CashRegisterId};
use crate::domain::common::AggregateId;

pub const DEFAULT_TOKEN_EXPIRY_DAYS: i64 = 7;

/// Raw random bytes behind a token secret (hex encoded: 64 chars)
pub const TOKEN_SECRET_BYTES: usize = 32;

pub const PIN_MIN_DIGITS: usize = 4;
pub const PIN_MAX_DIGITS: usize = 6;

/// Expiry requested by the issuer, falling back to `default_days` when absent
/// or not positive. A zero-day request never means "expires immediately".
pub fn normalize_expiry_days(requested: Option<i64>, default_days: i64) -> i64 {
    let fallback = if default_days > 0 {
        default_days
    } else {
        DEFAULT_TOKEN_EXPIRY_DAYS
    };
    match requested {
        Some(days) if days > 0 => days,
        _ => fallback,
    }
}

pub fn validate_pin_format(pin: &str) -> Result<(), String> {
    let len = pin.len();
    if !(PIN_MIN_DIGITS..=PIN_MAX_DIGITS).contains(&len) || !pin.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(format!(
            "PIN must be {} to {} digits",
            PIN_MIN_DIGITS, PIN_MAX_DIGITS
        ));
    }
    Ok(())
}

// ============================================================================
// ID Type
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CashRegisterTokenId(pub Uuid);

impl CashRegisterTokenId {
    pub fn new(value: Uuid) -> Self {
        Self(value)
    }

    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl AggregateId for CashRegisterTokenId {
    fn as_string(&self) -> String {
        self.0.to_string()
    }

    fn from_string(s: &str) -> Result<Self, String> {
        Uuid::parse_str(s)
            .map(CashRegisterTokenId::new)
            .map_err(|e| format!("Invalid UUID: {}", e))
    }
}

// ============================================================================
// Aggregate Root
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    Active,
    Expired,
    Deactivated,
}

/// Bearer secret that lets staff without an account submit reconciliations
/// for one company
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashRegisterToken {
    pub id: CashRegisterTokenId,
    pub token: String,
    pub company_id: i64,
    pub employee_id: Option<i64>,
    #[serde(skip)]
    pub pin_hash: Option<String>,
    pub is_active: bool,
    /// `None` never expires
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub used_at: Option<DateTime<Utc>>,
    pub cash_register_id: Option<CashRegisterId>,
}

impl CashRegisterToken {
    pub fn new_for_insert(
        token: String,
        company_id: i64,
        employee_id: Option<i64>,
        pin_hash: Option<String>,
        expires_at: Option<DateTime<Utc>>,
        created_by: Option<String>,
    ) -> Self {
        Self {
            id: CashRegisterTokenId::new_v4(),
            token,
            company_id,
            employee_id,
            pin_hash,
            is_active: true,
            expires_at,
            created_at: Utc::now(),
            created_by,
            used_at: None,
            cash_register_id: None,
        }
    }

    /// Deactivation wins over expiry. Expiry is exclusive: a token whose
    /// `expires_at` equals `now` is already expired.
    pub fn status_at(&self, now: DateTime<Utc>) -> TokenStatus {
        if !self.is_active {
            return TokenStatus::Deactivated;
        }
        match self.expires_at {
            Some(expires_at) if expires_at <= now => TokenStatus::Expired,
            _ => TokenStatus::Active,
        }
    }

    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.status_at(now) == TokenStatus::Active
    }

    pub fn requires_pin(&self) -> bool {
        self.pin_hash.is_some()
    }

    /// Bookkeeping only, the token stays active
    pub fn record_use(&mut self, entry_id: CashRegisterId, at: DateTime<Utc>) {
        self.used_at = Some(at);
        self.cash_register_id = Some(entry_id);
    }

    pub fn deactivate(&mut self) {
        self.is_active = false;
    }
}

// ============================================================================
// Forms / DTOs
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueTokenDto {
    pub company_id: i64,
    #[serde(default)]
    pub employee_id: Option<i64>,
    #[serde(default)]
    pub expiry_days: Option<i64>,
    #[serde(default)]
    pub pin: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenListQuery {
    pub company_id: i64,
}

/// What an anonymous submitter learns about the token it holds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenInfoDto {
    pub company_id: i64,
    pub employee_id: Option<i64>,
    pub requires_pin: bool,
    pub pin_verified: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinCheckDto {
    pub pin: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinCheckResponse {
    pub session_id: String,
}

/// Reconciliation submitted through a token. Company and employee scope come
/// from the token itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSubmissionDto {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub amounts: CashRegisterAmounts,
    #[serde(default)]
    pub employee_name: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn token(expires_at: Option<DateTime<Utc>>) -> CashRegisterToken {
        CashRegisterToken::new_for_insert("ab".repeat(32), 1, None, None, expires_at, None)
    }

    #[test]
    fn test_normalize_expiry_days() {
        assert_eq!(normalize_expiry_days(Some(0), 7), 7);
        assert_eq!(normalize_expiry_days(Some(-3), 7), 7);
        assert_eq!(normalize_expiry_days(None, 7), 7);
        assert_eq!(normalize_expiry_days(Some(30), 7), 30);
        assert_eq!(normalize_expiry_days(None, 14), 14);
        assert_eq!(normalize_expiry_days(None, 0), DEFAULT_TOKEN_EXPIRY_DAYS);
    }

    #[test]
    fn test_expiry_is_exclusive() {
        let now = Utc::now();
        assert!(!token(Some(now)).is_usable_at(now));
        assert_eq!(token(Some(now)).status_at(now), TokenStatus::Expired);
        assert!(token(Some(now + Duration::seconds(1))).is_usable_at(now));
    }

    #[test]
    fn test_token_without_expiry_never_expires() {
        let now = Utc::now();
        assert!(token(None).is_usable_at(now + Duration::days(10_000)));
    }

    #[test]
    fn test_deactivation_wins_over_expiry() {
        let now = Utc::now();
        let mut t = token(Some(now - Duration::days(1)));
        t.deactivate();
        assert_eq!(t.status_at(now), TokenStatus::Deactivated);
    }

    #[test]
    fn test_record_use_keeps_token_active() {
        let now = Utc::now();
        let mut t = token(Some(now + Duration::days(7)));
        let entry = CashRegisterId::new_v4();
        t.record_use(entry, now);
        assert_eq!(t.used_at, Some(now));
        assert_eq!(t.cash_register_id, Some(entry));
        assert!(t.is_active);
        assert!(t.is_usable_at(now));
    }

    #[test]
    fn test_validate_pin_format() {
        assert!(validate_pin_format("1234").is_ok());
        assert!(validate_pin_format("123456").is_ok());
        assert!(validate_pin_format("123").is_err());
        assert!(validate_pin_format("1234567").is_err());
        assert!(validate_pin_format("12a4").is_err());
        assert!(validate_pin_format("").is_err());
    }

    #[test]
    fn test_pin_hash_is_never_serialized() {
        let mut t = token(None);
        t.pin_hash = Some("$argon2id$secret".into());
        let json = serde_json::to_string(&t).unwrap();
        assert!(!json.contains("argon2"));
        assert!(t.requires_pin());
    }
}
