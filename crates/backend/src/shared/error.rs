use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::NaiveDate;
use contracts::domain::a001_cash_register::aggregate::AmountsError;
use contracts::projections::p900_cash_register_summary::dto::PeriodKey;
use sea_orm::DbErr;
use serde_json::json;
use thiserror::Error;

/// Failures of the cash register engine. Every variant is local to one request.
#[derive(Debug, Error)]
pub enum CashRegisterError {
    #[error("a cash register entry already exists for company {company_id} on {date}")]
    DuplicateDate { company_id: i64, date: NaiveDate },

    #[error("declared total {declared:.2} does not match payment methods sum {computed:.2}")]
    AmountMismatch { declared: f64, computed: f64 },

    #[error("{field} must be a non-negative amount, got {value}")]
    NegativeAmount { field: &'static str, value: f64 },

    #[error("VAT percentage must be between 0 and 100, got {0}")]
    InvalidVatPercentage(f64),

    #[error("{0}")]
    InvalidPin(String),

    #[error("no such period: {0}")]
    InvalidPeriod(PeriodKey),

    #[error("entry belongs to company {entry}, not {requested}")]
    CompanyMismatch { entry: i64, requested: i64 },

    #[error("cash register entry is already confirmed")]
    AlreadyConfirmed,

    #[error("cash register entry not found")]
    EntryNotFound,

    #[error("access token not found")]
    TokenNotFound,

    #[error("access token has expired")]
    TokenExpired,

    #[error("access token has been deactivated")]
    TokenDeactivated,

    #[error("wrong PIN")]
    WrongPin,

    #[error("PIN verification required for this session")]
    PinRequired,

    #[error("staff cost estimator failed: {0}")]
    StaffCost(String),

    #[error("database error: {0}")]
    Database(#[from] DbErr),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<AmountsError> for CashRegisterError {
    fn from(e: AmountsError) -> Self {
        match e {
            AmountsError::Mismatch { declared, computed } => {
                CashRegisterError::AmountMismatch { declared, computed }
            }
            AmountsError::Negative { field, value } => {
                CashRegisterError::NegativeAmount { field, value }
            }
            AmountsError::InvalidVatPercentage(v) => CashRegisterError::InvalidVatPercentage(v),
        }
    }
}

impl CashRegisterError {
    /// Stable machine-readable code for API clients
    pub fn code(&self) -> &'static str {
        match self {
            CashRegisterError::DuplicateDate { .. } => "DUPLICATE_DATE",
            CashRegisterError::AmountMismatch { .. } => "AMOUNT_MISMATCH",
            CashRegisterError::NegativeAmount { .. } => "NEGATIVE_AMOUNT",
            CashRegisterError::InvalidVatPercentage(_) => "INVALID_VAT_PERCENTAGE",
            CashRegisterError::InvalidPin(_) => "INVALID_PIN",
            CashRegisterError::InvalidPeriod(_) => "INVALID_PERIOD",
            CashRegisterError::CompanyMismatch { .. } => "COMPANY_MISMATCH",
            CashRegisterError::AlreadyConfirmed => "ALREADY_CONFIRMED",
            CashRegisterError::EntryNotFound => "ENTRY_NOT_FOUND",
            CashRegisterError::TokenNotFound => "TOKEN_NOT_FOUND",
            CashRegisterError::TokenExpired => "TOKEN_EXPIRED",
            CashRegisterError::TokenDeactivated => "TOKEN_DEACTIVATED",
            CashRegisterError::WrongPin => "WRONG_PIN",
            CashRegisterError::PinRequired => "PIN_REQUIRED",
            CashRegisterError::StaffCost(_) => "STAFF_COST_UNAVAILABLE",
            CashRegisterError::Database(_) | CashRegisterError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            CashRegisterError::DuplicateDate { .. } | CashRegisterError::AlreadyConfirmed => {
                StatusCode::CONFLICT
            }
            CashRegisterError::AmountMismatch { .. }
            | CashRegisterError::NegativeAmount { .. }
            | CashRegisterError::InvalidVatPercentage(_)
            | CashRegisterError::InvalidPin(_)
            | CashRegisterError::CompanyMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            CashRegisterError::InvalidPeriod(_) => StatusCode::BAD_REQUEST,
            CashRegisterError::EntryNotFound | CashRegisterError::TokenNotFound => {
                StatusCode::NOT_FOUND
            }
            CashRegisterError::TokenExpired => StatusCode::GONE,
            CashRegisterError::TokenDeactivated | CashRegisterError::PinRequired => {
                StatusCode::FORBIDDEN
            }
            CashRegisterError::WrongPin => StatusCode::UNAUTHORIZED,
            CashRegisterError::StaffCost(_) => StatusCode::SERVICE_UNAVAILABLE,
            CashRegisterError::Database(_) | CashRegisterError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for CashRegisterError {
    fn into_response(self) -> Response {
        let status = self.status();
        // internal details stay in the log
        let message = if status.is_server_error() {
            tracing::error!("Cash register request failed: {}", self);
            "internal error".to_string()
        } else {
            tracing::warn!("Cash register request rejected: {}", self);
            self.to_string()
        };
        (
            status,
            Json(json!({ "error": self.code(), "message": message })),
        )
            .into_response()
    }
}
