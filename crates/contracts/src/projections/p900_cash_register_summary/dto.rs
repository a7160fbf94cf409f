use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::period::iso_period_of;

/// Key of one summary row: company × ISO year × calendar month × ISO week
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeriodKey {
    pub company_id: i64,
    /// ISO year of the week
    pub year: i32,
    /// Calendar month of the entries
    pub month: u32,
    pub week_number: u32,
}

impl PeriodKey {
    pub fn new(company_id: i64, year: i32, month: u32, week_number: u32) -> Self {
        Self {
            company_id,
            year,
            month,
            week_number,
        }
    }

    /// Row that owns an entry dated `date`
    pub fn for_date(company_id: i64, date: NaiveDate) -> Self {
        let period = iso_period_of(date);
        Self::new(company_id, period.iso_year, period.month, period.iso_week)
    }
}

impl std::fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "company={} {}-W{:02} month={:02}",
            self.company_id, self.year, self.week_number, self.month
        )
    }
}

/// All derived figures of a summary row
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SummaryFigures {
    pub weekly_total: f64,
    pub weekly_cash: f64,
    pub weekly_card: f64,
    pub weekly_delivery_cash: f64,
    pub weekly_delivery_online: f64,
    pub weekly_check: f64,
    pub weekly_expenses: f64,
    pub weekly_vat_amount: f64,
    pub weekly_net_amount: f64,
    pub weekly_staff_cost: f64,
    pub weekly_staff_cost_percentage: f64,

    pub monthly_total: f64,
    pub monthly_vat_amount: f64,
    pub monthly_net_amount: f64,
    pub monthly_staff_cost: f64,
    pub monthly_staff_cost_percentage: f64,

    pub yearly_total: f64,
}

impl SummaryFigures {
    /// Copy the week-wide part of `other`
    pub fn set_weekly_from(&mut self, other: &SummaryFigures) {
        self.weekly_total = other.weekly_total;
        self.weekly_cash = other.weekly_cash;
        self.weekly_card = other.weekly_card;
        self.weekly_delivery_cash = other.weekly_delivery_cash;
        self.weekly_delivery_online = other.weekly_delivery_online;
        self.weekly_check = other.weekly_check;
        self.weekly_expenses = other.weekly_expenses;
        self.weekly_vat_amount = other.weekly_vat_amount;
        self.weekly_net_amount = other.weekly_net_amount;
        self.weekly_staff_cost = other.weekly_staff_cost;
        self.weekly_staff_cost_percentage = other.weekly_staff_cost_percentage;
    }

    /// Copy the month-wide part of `other`
    pub fn set_monthly_from(&mut self, other: &SummaryFigures) {
        self.monthly_total = other.monthly_total;
        self.monthly_vat_amount = other.monthly_vat_amount;
        self.monthly_net_amount = other.monthly_net_amount;
        self.monthly_staff_cost = other.monthly_staff_cost;
        self.monthly_staff_cost_percentage = other.monthly_staff_cost_percentage;
    }
}

/// Weekly/monthly/yearly rollup of cash register entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashRegisterSummary {
    #[serde(flatten)]
    pub key: PeriodKey,
    #[serde(flatten)]
    pub figures: SummaryFigures,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryListQuery {
    pub company_id: i64,
    pub year: Option<i32>,
    pub month: Option<u32>,
}
