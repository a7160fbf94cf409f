use axum::{
    extract::{Path, Query},
    http::StatusCode,
    Json,
};
use contracts::domain::a001_cash_register::aggregate::{
    CashRegister, CashRegisterDto, CashRegisterId, CashRegisterListQuery,
};
use contracts::domain::common::AggregateId;

use crate::domain::a001_cash_register::service;
use crate::projections::p900_cash_register_summary::service::default_estimator;
use crate::shared::data::db::get_connection;
use crate::shared::error::CashRegisterError;
use crate::system::auth::extractor::CurrentUser;

// An id that does not parse cannot exist
fn parse_id(id: &str) -> Result<CashRegisterId, CashRegisterError> {
    CashRegisterId::from_string(id).map_err(|_| CashRegisterError::EntryNotFound)
}

/// GET /api/cash_registers?company_id=&date_from=&date_to=
pub async fn list(
    Query(query): Query<CashRegisterListQuery>,
) -> Result<Json<Vec<CashRegister>>, CashRegisterError> {
    Ok(Json(service::list_for_company(get_connection(), &query).await?))
}

/// GET /api/cash_registers/:id
pub async fn get_by_id(Path(id): Path<String>) -> Result<Json<CashRegister>, CashRegisterError> {
    Ok(Json(service::get_by_id(get_connection(), parse_id(&id)?).await?))
}

/// POST /api/cash_registers
pub async fn create(
    user: CurrentUser,
    Json(mut dto): Json<CashRegisterDto>,
) -> Result<(StatusCode, Json<CashRegister>), CashRegisterError> {
    if dto.employee_name.is_none() {
        dto.employee_name = Some(user.name());
    }
    let entry = service::create(get_connection(), &default_estimator(), dto).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// PUT /api/cash_registers/:id
pub async fn update(
    user: CurrentUser,
    Path(id): Path<String>,
    Json(dto): Json<CashRegisterDto>,
) -> Result<Json<CashRegister>, CashRegisterError> {
    let entry = service::update(
        get_connection(),
        &default_estimator(),
        parse_id(&id)?,
        dto,
        user.has_override(),
    )
    .await?;
    Ok(Json(entry))
}

/// DELETE /api/cash_registers/:id
pub async fn delete(
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, CashRegisterError> {
    service::delete(
        get_connection(),
        &default_estimator(),
        parse_id(&id)?,
        user.has_override(),
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/cash_registers/:id/confirm
pub async fn confirm(
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<CashRegister>, CashRegisterError> {
    let entry = service::confirm(get_connection(), parse_id(&id)?, Some(user.name())).await?;
    Ok(Json(entry))
}
