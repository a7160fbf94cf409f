use chrono::{NaiveDate, Utc};
use contracts::domain::a001_cash_register::aggregate::{round2, CashRegister};
use contracts::projections::p900_cash_register_summary::dto::{
    CashRegisterSummary, PeriodKey, SummaryFigures,
};
use contracts::shared::period::{calendar_year_of, month_bounds, week_bounds, year_bounds};
use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};
use std::collections::BTreeSet;

use super::repository;
use super::staff_cost::StaffCostEstimator;
use crate::domain::a001_cash_register::repository as cash_registers;
use crate::shared::data::db::write_gate;
use crate::shared::error::CashRegisterError;

/// Sums over a set of entries, rounded to cents
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PeriodTotals {
    pub total: f64,
    pub cash: f64,
    pub card: f64,
    pub delivery_cash: f64,
    pub delivery_online: f64,
    pub check: f64,
    pub expenses: f64,
    pub vat_amount: f64,
    pub net_amount: f64,
}

impl PeriodTotals {
    pub fn from_entries(entries: &[CashRegister]) -> Self {
        let mut t = PeriodTotals::default();
        for e in entries {
            t.total += e.total_amount;
            t.cash += e.payments.cash_amount;
            t.card += e.payments.card_amount;
            t.delivery_cash += e.payments.delivery_cash_amount;
            t.delivery_online += e.payments.delivery_online_amount;
            t.check += e.payments.check_amount;
            t.expenses += e.expenses_amount;
            // rows written before the VAT split have no VAT figures
            t.vat_amount += e.vat_amount.unwrap_or(0.0);
            t.net_amount += e.net_amount.unwrap_or(0.0);
        }
        PeriodTotals {
            total: round2(t.total),
            cash: round2(t.cash),
            card: round2(t.card),
            delivery_cash: round2(t.delivery_cash),
            delivery_online: round2(t.delivery_online),
            check: round2(t.check),
            expenses: round2(t.expenses),
            vat_amount: round2(t.vat_amount),
            net_amount: round2(t.net_amount),
        }
    }
}

/// Staff cost as a percentage of takings; 0 when nothing was taken
pub fn staff_cost_percentage(staff_cost: f64, total: f64) -> f64 {
    if total > 0.0 {
        round2(staff_cost / total * 100.0)
    } else {
        0.0
    }
}

/// Rebuild the summary row of `key` from the current entries.
///
/// Every figure is overwritten. Other stored rows sharing the same ISO week,
/// calendar month or calendar year get the refreshed shared figures, so no
/// row keeps a stale week/month/year aggregate. Any error leaves the
/// transaction to be rolled back by the caller.
pub async fn recompute(
    txn: &DatabaseTransaction,
    estimator: &dyn StaffCostEstimator,
    key: PeriodKey,
) -> Result<CashRegisterSummary, CashRegisterError> {
    let invalid = || CashRegisterError::InvalidPeriod(key);
    let (monday, sunday) = week_bounds(key.year, key.week_number).ok_or_else(invalid)?;
    let calendar_year = calendar_year_of(key.year, key.week_number, key.month).ok_or_else(invalid)?;
    let (month_first, month_last) = month_bounds(calendar_year, key.month).ok_or_else(invalid)?;
    let (year_first, year_last) = year_bounds(calendar_year).ok_or_else(invalid)?;

    let mut summary = repository::get_by_key(txn, &key)
        .await?
        .unwrap_or_else(|| repository::new_row(key));

    let weekly = PeriodTotals::from_entries(
        &cash_registers::list_between(txn, key.company_id, monday, sunday).await?,
    );
    let monthly = PeriodTotals::from_entries(
        &cash_registers::list_between(txn, key.company_id, month_first, month_last).await?,
    );
    let yearly = PeriodTotals::from_entries(
        &cash_registers::list_between(txn, key.company_id, year_first, year_last).await?,
    );

    let staff_cost_failed = |e: anyhow::Error| {
        tracing::error!("Staff cost estimation failed for {}: {:#}", key, e);
        CashRegisterError::StaffCost(e.to_string())
    };
    let weekly_hours = estimator
        .hours_for_week(txn, key.company_id, key.year, key.week_number)
        .await
        .map_err(staff_cost_failed)?;
    let monthly_hours = estimator
        .hours_for_month(txn, key.company_id, calendar_year, key.month)
        .await
        .map_err(staff_cost_failed)?;
    let hourly_cost = estimator
        .hourly_employee_cost(txn, key.company_id)
        .await
        .map_err(staff_cost_failed)?;

    let weekly_staff_cost = round2(weekly_hours * hourly_cost);
    let monthly_staff_cost = round2(monthly_hours * hourly_cost);

    summary.figures = SummaryFigures {
        weekly_total: weekly.total,
        weekly_cash: weekly.cash,
        weekly_card: weekly.card,
        weekly_delivery_cash: weekly.delivery_cash,
        weekly_delivery_online: weekly.delivery_online,
        weekly_check: weekly.check,
        weekly_expenses: weekly.expenses,
        weekly_vat_amount: weekly.vat_amount,
        weekly_net_amount: weekly.net_amount,
        weekly_staff_cost,
        weekly_staff_cost_percentage: staff_cost_percentage(weekly_staff_cost, weekly.total),
        monthly_total: monthly.total,
        monthly_vat_amount: monthly.vat_amount,
        monthly_net_amount: monthly.net_amount,
        monthly_staff_cost,
        monthly_staff_cost_percentage: staff_cost_percentage(monthly_staff_cost, monthly.total),
        yearly_total: yearly.total,
    };
    summary.updated_at = Utc::now();
    repository::upsert(txn, &summary).await?;

    let refreshed = propagate_shared_figures(txn, &summary, calendar_year).await?;

    tracing::debug!(
        "Recomputed cash register summary {}: week {:.2}, month {:.2}, year {:.2} ({} sibling rows refreshed)",
        key,
        summary.figures.weekly_total,
        summary.figures.monthly_total,
        summary.figures.yearly_total,
        refreshed
    );

    Ok(summary)
}

async fn propagate_shared_figures(
    txn: &DatabaseTransaction,
    source: &CashRegisterSummary,
    calendar_year: i32,
) -> Result<usize, CashRegisterError> {
    let key = source.key;
    let candidates = repository::list_for_years(
        txn,
        key.company_id,
        &[calendar_year - 1, calendar_year, calendar_year + 1],
    )
    .await?;

    let mut refreshed = 0;
    for mut row in candidates {
        if row.key == key {
            continue;
        }
        let row_year = calendar_year_of(row.key.year, row.key.week_number, row.key.month);
        let before = row.figures;

        if row.key.year == key.year && row.key.week_number == key.week_number {
            row.figures.set_weekly_from(&source.figures);
        }
        if row_year == Some(calendar_year) {
            if row.key.month == key.month {
                row.figures.set_monthly_from(&source.figures);
            }
            row.figures.yearly_total = source.figures.yearly_total;
        }

        if row.figures != before {
            row.updated_at = source.updated_at;
            repository::upsert(txn, &row).await?;
            refreshed += 1;
        }
    }
    Ok(refreshed)
}

/// Recompute the row owning an entry dated `date`
pub async fn recompute_for_date(
    txn: &DatabaseTransaction,
    estimator: &dyn StaffCostEstimator,
    company_id: i64,
    date: NaiveDate,
) -> Result<CashRegisterSummary, CashRegisterError> {
    recompute(txn, estimator, PeriodKey::for_date(company_id, date)).await
}

/// Recompute every period that holds an entry of the company, plus every
/// stored row whose period has since lost its entries, in one transaction.
/// Returns the number of rows rebuilt.
pub async fn rebuild_company(
    db: &DatabaseConnection,
    estimator: &dyn StaffCostEstimator,
    company_id: i64,
) -> Result<usize, CashRegisterError> {
    let started_at = std::time::Instant::now();
    let _gate = write_gate().await;
    let txn = db.begin().await?;

    let mut keys: BTreeSet<(i32, u32, u32)> = cash_registers::list_dates(&txn, company_id)
        .await?
        .into_iter()
        .map(|date| {
            let key = PeriodKey::for_date(company_id, date);
            (key.year, key.week_number, key.month)
        })
        .collect();
    let with_entries = keys.len();
    keys.extend(
        repository::list(&txn, company_id, None, None)
            .await?
            .into_iter()
            .map(|row| (row.key.year, row.key.week_number, row.key.month)),
    );

    for (year, week_number, month) in &keys {
        recompute(
            &txn,
            estimator,
            PeriodKey::new(company_id, *year, *month, *week_number),
        )
        .await?;
    }
    txn.commit().await?;

    tracing::info!(
        "Rebuilt {} cash register summaries for company {} ({} without entries) in {:?}",
        keys.len(),
        company_id,
        keys.len() - with_entries,
        started_at.elapsed()
    );
    Ok(keys.len())
}
