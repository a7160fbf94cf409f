use chrono::{Duration, Utc};
use contracts::domain::a001_cash_register::aggregate::{Attribution, CashRegister};
use contracts::domain::a002_cash_register_token::aggregate::{
    normalize_expiry_days, validate_pin_format, CashRegisterToken, CashRegisterTokenId,
    IssueTokenDto, TokenInfoDto, TokenStatus, TokenSubmissionDto, TOKEN_SECRET_BYTES,
};
use rand::RngCore;
use sea_orm::{ConnectionTrait, DatabaseConnection, TransactionTrait};
use sha2::{Digest, Sha256};

use super::{pin_session, repository};
use crate::domain::a001_cash_register::service as cash_registers;
use crate::projections::p900_cash_register_summary::staff_cost::StaffCostEstimator;
use crate::shared::config::get_config;
use crate::shared::data::db::{is_busy, write_gate};
use crate::shared::error::CashRegisterError;
use crate::system::auth::password;

/// 256 random bits, hex encoded
pub fn generate_secret() -> String {
    let mut bytes = [0u8; TOKEN_SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Short SHA-256 fingerprint of a secret, safe to log
pub fn fingerprint(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..12].to_string()
}

pub async fn issue(
    db: &DatabaseConnection,
    dto: IssueTokenDto,
    created_by: Option<String>,
) -> Result<CashRegisterToken, CashRegisterError> {
    let pin_hash = match dto.pin.as_deref().filter(|p| !p.is_empty()) {
        Some(pin) => {
            validate_pin_format(pin).map_err(CashRegisterError::InvalidPin)?;
            Some(password::hash_password(pin)?)
        }
        None => None,
    };

    let days = normalize_expiry_days(
        dto.expiry_days,
        get_config().cash_register.default_token_expiry_days,
    );
    let expires_at = Utc::now() + Duration::days(days);

    let token = CashRegisterToken::new_for_insert(
        generate_secret(),
        dto.company_id,
        dto.employee_id,
        pin_hash,
        Some(expires_at),
        created_by,
    );
    {
        let _gate = write_gate().await;
        repository::insert(db, &token).await?;
    }

    tracing::info!(
        "Issued cash register token {} ({}) for company {}, expires {}, pin: {}",
        token.id.value(),
        fingerprint(&token.token),
        token.company_id,
        expires_at,
        token.requires_pin()
    );
    Ok(token)
}

/// Look up a secret and check it is usable right now
async fn load_usable<C: ConnectionTrait>(
    conn: &C,
    secret: &str,
) -> Result<CashRegisterToken, CashRegisterError> {
    let token = repository::get_by_secret(conn, secret)
        .await?
        .ok_or(CashRegisterError::TokenNotFound)?;

    match token.status_at(Utc::now()) {
        TokenStatus::Active => Ok(token),
        TokenStatus::Expired => Err(CashRegisterError::TokenExpired),
        TokenStatus::Deactivated => Err(CashRegisterError::TokenDeactivated),
    }
}

pub async fn validate(
    db: &DatabaseConnection,
    secret: &str,
) -> Result<CashRegisterToken, CashRegisterError> {
    load_usable(db, secret).await.map_err(|e| {
        tracing::debug!("Token {} refused: {}", fingerprint(secret), e);
        e
    })
}

/// What the submission form shows before asking for figures
pub async fn info(
    db: &DatabaseConnection,
    secret: &str,
    session_id: Option<&str>,
) -> Result<TokenInfoDto, CashRegisterError> {
    let token = validate(db, secret).await?;
    let pin_verified = !token.requires_pin()
        || session_id
            .map(|s| pin_session::sessions().is_verified(token.id, s, Utc::now()))
            .unwrap_or(false);
    Ok(TokenInfoDto {
        company_id: token.company_id,
        employee_id: token.employee_id,
        requires_pin: token.requires_pin(),
        pin_verified,
        expires_at: token.expires_at,
    })
}

/// Verify the PIN and open a fresh session for it. The session id is always
/// minted here; tokens without a PIN need no session and nothing is cached.
pub async fn check_pin(
    db: &DatabaseConnection,
    secret: &str,
    supplied_pin: &str,
) -> Result<String, CashRegisterError> {
    let token = validate(db, secret).await?;
    let session_id = uuid::Uuid::new_v4().to_string();

    let Some(pin_hash) = token.pin_hash.as_deref() else {
        return Ok(session_id);
    };
    if !password::verify_password(supplied_pin, pin_hash)? {
        tracing::warn!("Wrong PIN for token {}", fingerprint(secret));
        return Err(CashRegisterError::WrongPin);
    }

    let now = Utc::now();
    let ttl = Duration::minutes(get_config().cash_register.pin_session_ttl_minutes.max(1));
    let valid_until = match token.expires_at {
        Some(expires_at) => expires_at.min(now + ttl),
        None => now + ttl,
    };
    pin_session::sessions().mark_verified(token.id, &session_id, valid_until, now);
    Ok(session_id)
}

pub fn require_pin_session(
    token: &CashRegisterToken,
    session_id: Option<&str>,
) -> Result<(), CashRegisterError> {
    if !token.requires_pin() {
        return Ok(());
    }
    match session_id {
        Some(session_id)
            if pin_session::sessions().is_verified(token.id, session_id, Utc::now()) =>
        {
            Ok(())
        }
        _ => Err(CashRegisterError::PinRequired),
    }
}

async fn submit_once(
    db: &DatabaseConnection,
    estimator: &dyn StaffCostEstimator,
    secret: &str,
    session_id: Option<&str>,
    dto: &TokenSubmissionDto,
) -> Result<CashRegister, CashRegisterError> {
    let txn = db.begin().await?;
    let mut token = load_usable(&txn, secret).await?;
    require_pin_session(&token, session_id)?;

    let entry = cash_registers::create_in_txn(
        &txn,
        estimator,
        token.company_id,
        dto.date,
        &dto.amounts,
        Attribution {
            employee_id: token.employee_id,
            employee_name: dto.employee_name.clone(),
            token_id: Some(token.id.value()),
        },
        dto.notes.clone(),
    )
    .await?;

    token.record_use(entry.id, Utc::now());
    repository::update(&txn, &token).await?;
    txn.commit().await?;
    Ok(entry)
}

/// Submit a reconciliation for the token's company. Validation, PIN gate,
/// entry creation, rollup and usage bookkeeping share one transaction,
/// retried once when another process holds the database.
pub async fn submit(
    db: &DatabaseConnection,
    estimator: &dyn StaffCostEstimator,
    secret: &str,
    session_id: Option<&str>,
    dto: TokenSubmissionDto,
) -> Result<CashRegister, CashRegisterError> {
    let _gate = write_gate().await;
    let entry = match submit_once(db, estimator, secret, session_id, &dto).await {
        Err(CashRegisterError::Database(e)) if is_busy(&e) => {
            tracing::warn!(
                "Database busy on submission through token {}, retrying",
                fingerprint(secret)
            );
            submit_once(db, estimator, secret, session_id, &dto).await?
        }
        other => other?,
    };

    tracing::info!(
        "Token {} submitted cash register entry {} for company {} on {}",
        fingerprint(secret),
        entry.id.value(),
        entry.company_id,
        entry.date
    );
    Ok(entry)
}

/// Terminal and idempotent
pub async fn deactivate(
    db: &DatabaseConnection,
    id: CashRegisterTokenId,
) -> Result<CashRegisterToken, CashRegisterError> {
    let mut token = repository::get_by_id(db, id)
        .await?
        .ok_or(CashRegisterError::TokenNotFound)?;
    if token.is_active {
        token.deactivate();
        let _gate = write_gate().await;
        repository::update(db, &token).await?;
        tracing::info!("Deactivated cash register token {}", id.value());
    }
    pin_session::sessions().forget_token(id);
    Ok(token)
}

pub async fn list_for_company(
    db: &DatabaseConnection,
    company_id: i64,
) -> Result<Vec<CashRegisterToken>, CashRegisterError> {
    Ok(repository::list_for_company(db, company_id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projections::p900_cash_register_summary::staff_cost::testing::FixedStaffCost;
    use crate::shared::data::db::{connect_file, connect_in_memory};
    use chrono::NaiveDate;
    use contracts::domain::a001_cash_register::aggregate::{
        CashRegisterAmounts, PaymentBreakdown,
    };

    const NO_STAFF: FixedStaffCost = FixedStaffCost {
        weekly_hours: 0.0,
        monthly_hours: 0.0,
        hourly_cost: 12.0,
    };

    fn issue_dto(company_id: i64, expiry_days: Option<i64>, pin: Option<&str>) -> IssueTokenDto {
        IssueTokenDto {
            company_id,
            employee_id: Some(7),
            expiry_days,
            pin: pin.map(str::to_string),
        }
    }

    fn submission(day: u32, cash: f64) -> TokenSubmissionDto {
        TokenSubmissionDto {
            date: NaiveDate::from_ymd_opt(2024, 6, day).unwrap(),
            amounts: CashRegisterAmounts {
                payments: PaymentBreakdown {
                    cash_amount: cash,
                    ..Default::default()
                },
                total_amount: cash,
                ..Default::default()
            },
            employee_name: Some("Iker".into()),
            notes: None,
        }
    }

    #[test]
    fn test_secret_is_64_hex_chars_and_unique() {
        let a = generate_secret();
        let b = generate_secret();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
        assert_eq!(fingerprint(&a).len(), 12);
        assert_eq!(fingerprint(&a), fingerprint(&a));
    }

    #[tokio::test]
    async fn test_zero_expiry_falls_back_to_seven_days() {
        let db = connect_in_memory().await;
        let before = Utc::now();
        let token = issue(&db, issue_dto(1, Some(0), None), None).await.unwrap();

        let expires_at = token.expires_at.unwrap();
        assert!(expires_at >= before + Duration::days(7));
        assert!(expires_at <= Utc::now() + Duration::days(7));
        assert!(validate(&db, &token.token).await.is_ok());
    }

    #[tokio::test]
    async fn test_malformed_pin_is_rejected() {
        let db = connect_in_memory().await;
        let err = issue(&db, issue_dto(1, None, Some("12")), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CashRegisterError::InvalidPin(_)));
        assert!(list_for_company(&db, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pin_gated_submission() {
        let db = connect_in_memory().await;
        let token = issue(&db, issue_dto(3, Some(7), Some("1234")), Some("admin".into()))
            .await
            .unwrap();
        assert!(token.pin_hash.as_deref().unwrap().starts_with("$argon2"));

        let denied = submit(&db, &NO_STAFF, &token.token, Some("guessed"), submission(3, 50.0)).await;
        assert!(matches!(denied, Err(CashRegisterError::PinRequired)));

        let wrong = check_pin(&db, &token.token, "9999").await;
        assert!(matches!(wrong, Err(CashRegisterError::WrongPin)));

        let session = check_pin(&db, &token.token, "1234").await.unwrap();
        let verified = session.as_str();

        let entry = submit(&db, &NO_STAFF, &token.token, Some(verified), submission(3, 50.0))
            .await
            .unwrap();
        assert_eq!(entry.company_id, 3);
        assert_eq!(entry.attribution.employee_id, Some(7));
        assert_eq!(entry.attribution.token_id, Some(token.id.value()));

        let stored = repository::get_by_id(&db, token.id).await.unwrap().unwrap();
        assert!(stored.used_at.is_some());
        assert!(stored.is_active);
        assert_eq!(stored.cash_register_id, Some(entry.id));

        // verification does not carry over to another session
        let other = submit(&db, &NO_STAFF, &token.token, Some("guessed"), submission(4, 20.0)).await;
        assert!(matches!(other, Err(CashRegisterError::PinRequired)));
        assert!(matches!(
            submit(&db, &NO_STAFF, &token.token, None, submission(4, 20.0)).await,
            Err(CashRegisterError::PinRequired)
        ));

        let details = info(&db, &token.token, Some(verified)).await.unwrap();
        assert!(details.requires_pin);
        assert!(details.pin_verified);
    }

    #[tokio::test]
    async fn test_each_pin_check_opens_a_fresh_session() {
        let db = connect_in_memory().await;
        let token = issue(&db, issue_dto(1, None, Some("654321")), None)
            .await
            .unwrap();
        let first = check_pin(&db, &token.token, "654321").await.unwrap();
        let second = check_pin(&db, &token.token, "654321").await.unwrap();
        assert_ne!(first, second);
        assert!(require_pin_session(&token, Some(&first)).is_ok());
        assert!(require_pin_session(&token, Some(&second)).is_ok());
        assert!(matches!(
            require_pin_session(&token, Some("chosen-by-caller")),
            Err(CashRegisterError::PinRequired)
        ));
    }

    #[tokio::test]
    async fn test_pin_check_without_pin_caches_nothing() {
        let db = connect_in_memory().await;
        let token = issue(&db, issue_dto(1, None, None), None).await.unwrap();
        for _ in 0..50 {
            let session = check_pin(&db, &token.token, "").await.unwrap();
            assert!(!pin_session::sessions().is_verified(token.id, &session, Utc::now()));
        }
        assert!(require_pin_session(&token, None).is_ok());
    }

    #[tokio::test]
    async fn test_token_is_reusable_across_days() {
        let db = connect_in_memory().await;
        let token = issue(&db, issue_dto(1, None, None), None).await.unwrap();
        submit(&db, &NO_STAFF, &token.token, None, submission(3, 10.0))
            .await
            .unwrap();
        let second = submit(&db, &NO_STAFF, &token.token, None, submission(4, 10.0))
            .await
            .unwrap();

        let stored = repository::get_by_id(&db, token.id).await.unwrap().unwrap();
        assert!(stored.is_active);
        assert_eq!(stored.cash_register_id, Some(second.id));
    }

    #[tokio::test]
    async fn test_duplicate_submission_leaves_token_untouched() {
        let db = connect_in_memory().await;
        let token = issue(&db, issue_dto(1, None, None), None).await.unwrap();
        let first = submit(&db, &NO_STAFF, &token.token, None, submission(3, 10.0))
            .await
            .unwrap();
        let before = repository::get_by_id(&db, token.id).await.unwrap().unwrap();

        let err = submit(&db, &NO_STAFF, &token.token, None, submission(3, 99.0))
            .await
            .unwrap_err();
        assert!(matches!(err, CashRegisterError::DuplicateDate { .. }));

        let after = repository::get_by_id(&db, token.id).await.unwrap().unwrap();
        assert_eq!(after.used_at, before.used_at);
        assert_eq!(after.cash_register_id, Some(first.id));
    }

    #[tokio::test]
    async fn test_deactivated_token_is_refused() {
        let db = connect_in_memory().await;
        let token = issue(&db, issue_dto(1, None, None), None).await.unwrap();

        let deactivated = deactivate(&db, token.id).await.unwrap();
        assert!(!deactivated.is_active);
        // idempotent
        assert!(!deactivate(&db, token.id).await.unwrap().is_active);

        assert!(matches!(
            validate(&db, &token.token).await,
            Err(CashRegisterError::TokenDeactivated)
        ));
        assert!(matches!(
            submit(&db, &NO_STAFF, &token.token, None, submission(3, 10.0)).await,
            Err(CashRegisterError::TokenDeactivated)
        ));
    }

    #[tokio::test]
    async fn test_expired_and_unknown_tokens_are_refused() {
        let db = connect_in_memory().await;
        let mut expired = CashRegisterToken::new_for_insert(
            generate_secret(),
            1,
            None,
            None,
            Some(Utc::now() - Duration::minutes(1)),
            None,
        );
        repository::insert(&db, &expired).await.unwrap();
        assert!(matches!(
            validate(&db, &expired.token).await,
            Err(CashRegisterError::TokenExpired)
        ));

        // deactivation is reported before expiry
        expired.deactivate();
        repository::update(&db, &expired).await.unwrap();
        assert!(matches!(
            validate(&db, &expired.token).await,
            Err(CashRegisterError::TokenDeactivated)
        ));

        assert!(matches!(
            validate(&db, "deadbeef").await,
            Err(CashRegisterError::TokenNotFound)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_submissions_for_one_date_lose_with_duplicate_date() {
        let dir = tempfile::tempdir().unwrap();
        let db = connect_file(&dir.path().join("tokens.db"), 8).await;
        let token = issue(&db, issue_dto(1, None, None), None).await.unwrap();

        for day in 1..=10 {
            let (a, b) = tokio::join!(
                submit(&db, &NO_STAFF, &token.token, None, submission(day, 10.0)),
                submit(&db, &NO_STAFF, &token.token, None, submission(day, 20.0)),
            );
            let outcomes = [a, b];
            assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
            assert!(outcomes
                .iter()
                .any(|r| matches!(r, Err(CashRegisterError::DuplicateDate { .. }))));
        }
    }
}
