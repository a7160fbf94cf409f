use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::common::AggregateId;

/// Declared total may differ from the payment sum by at most this much
pub const AMOUNT_TOLERANCE: f64 = 0.01;

pub const DEFAULT_VAT_PERCENTAGE: f64 = 21.0;

/// Round a monetary amount to cents
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// VAT contained in a gross `total`: `(vat_amount, net_amount)`, both in cents.
pub fn compute_vat(total: f64, vat_percentage: f64) -> (f64, f64) {
    let vat_amount = round2(total - total / (1.0 + vat_percentage / 100.0));
    let net_amount = round2(total - vat_amount);
    (vat_amount, net_amount)
}

// ============================================================================
// ID Type
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CashRegisterId(pub Uuid);

impl CashRegisterId {
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

impl AggregateId for CashRegisterId {
    fn as_string(&self) -> String {
        self.0.to_string()
    }

    fn from_string(s: &str) -> Result<Self, String> {
        Uuid::parse_str(s)
            .map(CashRegisterId::new)
            .map_err(|e| format!("Invalid UUID: {}", e))
    }
}

// ============================================================================
// Amounts
// ============================================================================

/// Takings of one day split by payment method
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PaymentBreakdown {
    #[serde(default)]
    pub cash_amount: f64,
    #[serde(default)]
    pub card_amount: f64,
    #[serde(default)]
    pub delivery_cash_amount: f64,
    #[serde(default)]
    pub delivery_online_amount: f64,
    #[serde(default)]
    pub check_amount: f64,
}

impl PaymentBreakdown {
    pub fn sum(&self) -> f64 {
        self.cash_amount
            + self.card_amount
            + self.delivery_cash_amount
            + self.delivery_online_amount
            + self.check_amount
    }

    fn named(&self) -> [(&'static str, f64); 5] {
        [
            ("cash_amount", self.cash_amount),
            ("card_amount", self.card_amount),
            ("delivery_cash_amount", self.delivery_cash_amount),
            ("delivery_online_amount", self.delivery_online_amount),
            ("check_amount", self.check_amount),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AmountsError {
    Mismatch { declared: f64, computed: f64 },
    Negative { field: &'static str, value: f64 },
    InvalidVatPercentage(f64),
}

impl std::fmt::Display for AmountsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AmountsError::Mismatch { declared, computed } => write!(
                f,
                "declared total {:.2} does not match payment methods sum {:.2}",
                declared, computed
            ),
            AmountsError::Negative { field, value } => {
                write!(f, "{} must be a non-negative amount, got {}", field, value)
            }
            AmountsError::InvalidVatPercentage(v) => {
                write!(f, "VAT percentage must be between 0 and 100, got {}", v)
            }
        }
    }
}

impl std::error::Error for AmountsError {}

/// Submitted figures of a reconciliation, before any derived field is computed
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CashRegisterAmounts {
    #[serde(flatten)]
    pub payments: PaymentBreakdown,
    pub total_amount: f64,
    #[serde(default)]
    pub expenses_amount: f64,
    #[serde(default)]
    pub expenses_description: Option<String>,
    #[serde(default)]
    pub vat_percentage: Option<f64>,
}

impl CashRegisterAmounts {
    /// Expenses are checked on their own and never take part in the total check.
    pub fn validate(&self) -> Result<(), AmountsError> {
        for (field, value) in self.payments.named() {
            if !value.is_finite() || value < 0.0 {
                return Err(AmountsError::Negative { field, value });
            }
        }
        if !self.expenses_amount.is_finite() || self.expenses_amount < 0.0 {
            return Err(AmountsError::Negative {
                field: "expenses_amount",
                value: self.expenses_amount,
            });
        }
        if !self.total_amount.is_finite() || self.total_amount < 0.0 {
            return Err(AmountsError::Negative {
                field: "total_amount",
                value: self.total_amount,
            });
        }
        if let Some(vat) = self.vat_percentage {
            if !vat.is_finite() || !(0.0..=100.0).contains(&vat) {
                return Err(AmountsError::InvalidVatPercentage(vat));
            }
        }

        let computed = self.payments.sum();
        // 1e-9 absorbs binary representation noise right at the boundary
        if (self.total_amount - computed).abs() > AMOUNT_TOLERANCE + 1e-9 {
            return Err(AmountsError::Mismatch {
                declared: self.total_amount,
                computed,
            });
        }
        Ok(())
    }
}

// ============================================================================
// Aggregate Root
// ============================================================================

/// Who submitted the entry
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Attribution {
    pub employee_id: Option<i64>,
    /// Free text, token submitters rarely have an account
    pub employee_name: Option<String>,
    pub token_id: Option<Uuid>,
}

/// Daily cash register reconciliation ("arqueo") of one company
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashRegister {
    pub id: CashRegisterId,
    pub company_id: i64,
    pub date: NaiveDate,

    #[serde(flatten)]
    pub payments: PaymentBreakdown,
    pub total_amount: f64,
    pub expenses_amount: f64,
    pub expenses_description: Option<String>,

    pub vat_percentage: Option<f64>,
    pub vat_amount: Option<f64>,
    pub net_amount: Option<f64>,

    pub notes: Option<String>,
    #[serde(flatten)]
    pub attribution: Attribution,

    pub is_confirmed: bool,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub confirmed_by: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CashRegister {
    /// Build a new entry from already validated amounts
    pub fn new_for_insert(
        company_id: i64,
        date: NaiveDate,
        amounts: &CashRegisterAmounts,
        attribution: Attribution,
        notes: Option<String>,
    ) -> Self {
        let now = Utc::now();
        let mut entry = Self {
            id: CashRegisterId::new_v4(),
            company_id,
            date,
            payments: PaymentBreakdown::default(),
            total_amount: 0.0,
            expenses_amount: 0.0,
            expenses_description: None,
            vat_percentage: None,
            vat_amount: None,
            net_amount: None,
            notes,
            attribution,
            is_confirmed: false,
            confirmed_at: None,
            confirmed_by: None,
            created_at: now,
            updated_at: now,
        };
        entry.apply_amounts(amounts);
        entry
    }

    /// Replace all figures and recompute the VAT split
    pub fn apply_amounts(&mut self, amounts: &CashRegisterAmounts) {
        let total = round2(amounts.total_amount);
        let vat_percentage = amounts.vat_percentage.unwrap_or(DEFAULT_VAT_PERCENTAGE);
        let (vat_amount, net_amount) = compute_vat(total, vat_percentage);

        self.payments = amounts.payments;
        self.total_amount = total;
        self.expenses_amount = amounts.expenses_amount;
        self.expenses_description = amounts.expenses_description.clone();
        self.vat_percentage = Some(vat_percentage);
        self.vat_amount = Some(vat_amount);
        self.net_amount = Some(net_amount);
    }

    /// Confirmed entries are frozen for everybody without override privilege
    pub fn is_editable_by(&self, privileged: bool) -> bool {
        privileged || !self.is_confirmed
    }

    pub fn confirm(&mut self, confirmed_by: Option<String>, at: DateTime<Utc>) {
        self.is_confirmed = true;
        self.confirmed_at = Some(at);
        self.confirmed_by = confirmed_by;
        self.updated_at = at;
    }

    pub fn before_write(&mut self) {
        self.updated_at = Utc::now();
    }
}

// ============================================================================
// Forms / DTOs
// ============================================================================

/// DTO for creating/updating an entry from the authenticated back office
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashRegisterDto {
    pub id: Option<String>,
    pub company_id: i64,
    pub date: NaiveDate,
    #[serde(flatten)]
    pub amounts: CashRegisterAmounts,
    #[serde(default)]
    pub employee_id: Option<i64>,
    #[serde(default)]
    pub employee_name: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Query for listing entries of a company
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashRegisterListQuery {
    pub company_id: i64,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amounts(cash: f64, card: f64, total: f64) -> CashRegisterAmounts {
        CashRegisterAmounts {
            payments: PaymentBreakdown {
                cash_amount: cash,
                card_amount: card,
                ..Default::default()
            },
            total_amount: total,
            ..Default::default()
        }
    }

    #[test]
    fn test_total_within_tolerance_is_accepted() {
        assert!(amounts(100.0, 50.0, 150.0).validate().is_ok());
        assert!(amounts(100.0, 50.0, 150.01).validate().is_ok());
        assert!(amounts(100.0, 50.0, 149.99).validate().is_ok());
    }

    #[test]
    fn test_total_outside_tolerance_is_rejected() {
        let err = amounts(100.0, 50.0, 150.02).validate().unwrap_err();
        assert!(matches!(err, AmountsError::Mismatch { .. }));
        assert!(amounts(100.0, 50.0, 120.0).validate().is_err());
    }

    #[test]
    fn test_expenses_are_not_part_of_total() {
        let mut a = amounts(100.0, 0.0, 100.0);
        a.expenses_amount = 35.5;
        assert!(a.validate().is_ok());

        a.total_amount = 135.5;
        assert!(a.validate().is_err());
    }

    #[test]
    fn test_negative_amounts_rejected() {
        let err = amounts(-1.0, 1.0, 0.0).validate().unwrap_err();
        assert_eq!(
            err,
            AmountsError::Negative {
                field: "cash_amount",
                value: -1.0
            }
        );

        let mut a = amounts(10.0, 0.0, 10.0);
        a.expenses_amount = -0.5;
        assert!(matches!(
            a.validate(),
            Err(AmountsError::Negative {
                field: "expenses_amount",
                ..
            })
        ));
    }

    #[test]
    fn test_vat_percentage_range() {
        let mut a = amounts(10.0, 0.0, 10.0);
        a.vat_percentage = Some(150.0);
        assert_eq!(a.validate(), Err(AmountsError::InvalidVatPercentage(150.0)));
    }

    #[test]
    fn test_compute_vat() {
        assert_eq!(compute_vat(121.0, 21.0), (21.0, 100.0));
        assert_eq!(compute_vat(100.0, 21.0), (17.36, 82.64));
        assert_eq!(compute_vat(0.0, 21.0), (0.0, 0.0));
        assert_eq!(compute_vat(50.0, 0.0), (0.0, 50.0));
    }

    #[test]
    fn test_vat_round_trip() {
        for total in [0.01, 9.99, 100.0, 180.0, 1234.56, 99999.99] {
            for pct in [4.0, 10.0, 21.0] {
                let (vat, net) = compute_vat(total, pct);
                assert!((vat + net - round2(total)).abs() <= 0.01);
            }
        }
    }

    #[test]
    fn test_new_entry_derives_vat_with_default_percentage() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let entry = CashRegister::new_for_insert(
            1,
            date,
            &amounts(100.0, 21.0, 121.0),
            Attribution::default(),
            None,
        );
        assert_eq!(entry.vat_percentage, Some(21.0));
        assert_eq!(entry.vat_amount, Some(21.0));
        assert_eq!(entry.net_amount, Some(100.0));
        assert!(!entry.is_confirmed);
    }

    #[test]
    fn test_confirmed_entry_is_frozen_for_non_privileged() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let mut entry = CashRegister::new_for_insert(
            1,
            date,
            &amounts(10.0, 0.0, 10.0),
            Attribution::default(),
            None,
        );
        assert!(entry.is_editable_by(false));

        entry.confirm(Some("manager".into()), Utc::now());
        assert!(!entry.is_editable_by(false));
        assert!(entry.is_editable_by(true));
        assert_eq!(entry.confirmed_by.as_deref(), Some("manager"));
    }

    #[test]
    fn test_dto_accepts_flat_json() {
        let dto: CashRegisterDto = serde_json::from_str(
            r#"{
                "company_id": 1,
                "date": "2024-06-03",
                "cash_amount": 100.0,
                "card_amount": 50.0,
                "total_amount": 150.0,
                "employee_name": "Lucía"
            }"#,
        )
        .unwrap();
        assert_eq!(dto.amounts.payments.cash_amount, 100.0);
        assert_eq!(dto.amounts.total_amount, 150.0);
        assert_eq!(dto.amounts.expenses_amount, 0.0);
        assert_eq!(dto.employee_name.as_deref(), Some("Lucía"));
    }
}
