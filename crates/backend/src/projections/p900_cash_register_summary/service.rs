use contracts::projections::p900_cash_register_summary::dto::{
    CashRegisterSummary, SummaryListQuery,
};

use super::staff_cost::SqlStaffCostEstimator;
use super::{projection_builder, repository};
use crate::shared::config::get_config;
use crate::shared::data::db::get_connection;
use crate::shared::error::CashRegisterError;

/// Estimator backed by the application database and configured fallback cost
pub fn default_estimator() -> SqlStaffCostEstimator {
    SqlStaffCostEstimator::new(get_config().cash_register.default_hourly_employee_cost)
}

pub async fn list(query: &SummaryListQuery) -> Result<Vec<CashRegisterSummary>, CashRegisterError> {
    let db = get_connection();
    Ok(repository::list(db, query.company_id, query.year, query.month).await?)
}

/// Drop-in repair: recompute every period of a company from its entries
pub async fn rebuild(company_id: i64) -> Result<usize, CashRegisterError> {
    let db = get_connection();
    projection_builder::rebuild_company(db, &default_estimator(), company_id).await
}
