use axum::{
    extract::{Path, Query},
    Json,
};
use contracts::projections::p900_cash_register_summary::dto::{
    CashRegisterSummary, SummaryListQuery,
};
use serde_json::json;

use crate::projections::p900_cash_register_summary::service;
use crate::shared::error::CashRegisterError;

/// GET /api/cash_register_summaries?company_id=&year=&month=
pub async fn list(
    Query(query): Query<SummaryListQuery>,
) -> Result<Json<Vec<CashRegisterSummary>>, CashRegisterError> {
    Ok(Json(service::list(&query).await?))
}

/// POST /api/cash_register_summaries/:company_id/rebuild
pub async fn rebuild(
    Path(company_id): Path<i64>,
) -> Result<Json<serde_json::Value>, CashRegisterError> {
    let rebuilt = service::rebuild(company_id).await?;
    Ok(Json(json!({ "company_id": company_id, "rebuilt": rebuilt })))
}
