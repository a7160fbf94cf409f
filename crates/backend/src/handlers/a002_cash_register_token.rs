use axum::{
    extract::{Path, Query},
    http::{HeaderMap, StatusCode},
    Json,
};
use contracts::domain::a001_cash_register::aggregate::CashRegister;
use contracts::domain::a002_cash_register_token::aggregate::{
    CashRegisterToken, CashRegisterTokenId, IssueTokenDto, PinCheckDto, PinCheckResponse,
    TokenInfoDto, TokenListQuery, TokenSubmissionDto,
};
use contracts::domain::common::AggregateId;

use crate::domain::a002_cash_register_token::service;
use crate::projections::p900_cash_register_summary::service::default_estimator;
use crate::shared::data::db::get_connection;
use crate::shared::error::CashRegisterError;
use crate::system::auth::extractor::CurrentUser;

/// Header that carries the PIN session of an anonymous submitter
pub const SESSION_HEADER: &str = "x-session-id";

fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
}

// ============================================================================
// Back office (admin)
// ============================================================================

/// GET /api/cash_register_tokens?company_id=
pub async fn list(
    Query(query): Query<TokenListQuery>,
) -> Result<Json<Vec<CashRegisterToken>>, CashRegisterError> {
    Ok(Json(
        service::list_for_company(get_connection(), query.company_id).await?,
    ))
}

/// POST /api/cash_register_tokens
pub async fn issue(
    user: CurrentUser,
    Json(dto): Json<IssueTokenDto>,
) -> Result<(StatusCode, Json<CashRegisterToken>), CashRegisterError> {
    let token = service::issue(get_connection(), dto, Some(user.name())).await?;
    Ok((StatusCode::CREATED, Json(token)))
}

/// POST /api/cash_register_tokens/:id/deactivate
pub async fn deactivate(
    Path(id): Path<String>,
) -> Result<Json<CashRegisterToken>, CashRegisterError> {
    let id = CashRegisterTokenId::from_string(&id).map_err(|_| CashRegisterError::TokenNotFound)?;
    Ok(Json(service::deactivate(get_connection(), id).await?))
}

// ============================================================================
// Public, authorized by the token secret
// ============================================================================

/// GET /api/public/cash_register/:token
pub async fn info(
    Path(token): Path<String>,
    headers: HeaderMap,
) -> Result<Json<TokenInfoDto>, CashRegisterError> {
    Ok(Json(
        service::info(get_connection(), &token, session_id(&headers)).await?,
    ))
}

/// POST /api/public/cash_register/:token/pin
///
/// Any session header sent here is ignored; the response carries the new one.
pub async fn check_pin(
    Path(token): Path<String>,
    Json(dto): Json<PinCheckDto>,
) -> Result<Json<PinCheckResponse>, CashRegisterError> {
    let session_id = service::check_pin(get_connection(), &token, &dto.pin).await?;
    Ok(Json(PinCheckResponse { session_id }))
}

/// POST /api/public/cash_register/:token/submit
pub async fn submit(
    Path(token): Path<String>,
    headers: HeaderMap,
    Json(dto): Json<TokenSubmissionDto>,
) -> Result<(StatusCode, Json<CashRegister>), CashRegisterError> {
    let entry = service::submit(
        get_connection(),
        &default_estimator(),
        &token,
        session_id(&headers),
        dto,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_session_id_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_id(&headers), None);
        headers.insert(SESSION_HEADER, HeaderValue::from_static(""));
        assert_eq!(session_id(&headers), None);
        headers.insert(SESSION_HEADER, HeaderValue::from_static("abc"));
        assert_eq!(session_id(&headers), Some("abc"));
    }
}
