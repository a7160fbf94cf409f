use chrono::{NaiveDate, Utc};
use contracts::domain::a001_cash_register::aggregate::{
    Attribution, CashRegister, CashRegisterAmounts, CashRegisterDto, CashRegisterId,
    CashRegisterListQuery,
};
use sea_orm::{DatabaseConnection, DatabaseTransaction, DbErr, TransactionTrait};

use super::repository;
use crate::projections::p900_cash_register_summary::projection_builder;
use crate::projections::p900_cash_register_summary::staff_cost::StaffCostEstimator;
use crate::shared::config::get_config;
use crate::shared::data::db::{is_busy, write_gate};
use crate::shared::error::CashRegisterError;

/// Fill in configured defaults and check the submitted figures
fn prepare_amounts(amounts: &CashRegisterAmounts) -> Result<CashRegisterAmounts, CashRegisterError> {
    let mut amounts = amounts.clone();
    if amounts.vat_percentage.is_none() {
        amounts.vat_percentage = Some(get_config().cash_register.default_vat_percentage);
    }
    amounts.validate()?;
    Ok(amounts)
}

fn write_error(err: DbErr, company_id: i64, date: NaiveDate) -> CashRegisterError {
    if repository::is_unique_violation(&err) {
        CashRegisterError::DuplicateDate { company_id, date }
    } else {
        CashRegisterError::Database(err)
    }
}

/// Insert a new entry and roll it up, inside the caller's transaction.
/// Shared by the back office and the token submission flow.
pub(crate) async fn create_in_txn(
    txn: &DatabaseTransaction,
    estimator: &dyn StaffCostEstimator,
    company_id: i64,
    date: NaiveDate,
    amounts: &CashRegisterAmounts,
    attribution: Attribution,
    notes: Option<String>,
) -> Result<CashRegister, CashRegisterError> {
    let amounts = prepare_amounts(amounts)?;

    if repository::get_by_company_and_date(txn, company_id, date)
        .await?
        .is_some()
    {
        return Err(CashRegisterError::DuplicateDate { company_id, date });
    }

    let entry = CashRegister::new_for_insert(company_id, date, &amounts, attribution, notes);
    repository::insert(txn, &entry)
        .await
        .map_err(|e| write_error(e, company_id, date))?;

    projection_builder::recompute_for_date(txn, estimator, company_id, date).await?;
    Ok(entry)
}

async fn create_once(
    db: &DatabaseConnection,
    estimator: &dyn StaffCostEstimator,
    dto: &CashRegisterDto,
) -> Result<CashRegister, CashRegisterError> {
    let txn = db.begin().await?;
    let entry = create_in_txn(
        &txn,
        estimator,
        dto.company_id,
        dto.date,
        &dto.amounts,
        Attribution {
            employee_id: dto.employee_id,
            employee_name: dto.employee_name.clone(),
            token_id: None,
        },
        dto.notes.clone(),
    )
    .await?;
    txn.commit().await?;
    Ok(entry)
}

/// Create an entry from the back office. A writer from another process
/// holding the database gets one retry, after which a lost race on the
/// date reads as DuplicateDate.
pub async fn create(
    db: &DatabaseConnection,
    estimator: &dyn StaffCostEstimator,
    dto: CashRegisterDto,
) -> Result<CashRegister, CashRegisterError> {
    let _gate = write_gate().await;
    let entry = match create_once(db, estimator, &dto).await {
        Err(CashRegisterError::Database(e)) if is_busy(&e) => {
            tracing::warn!(
                "Database busy creating entry for company {} on {}, retrying",
                dto.company_id,
                dto.date
            );
            create_once(db, estimator, &dto).await?
        }
        other => other?,
    };

    tracing::info!(
        "Created cash register entry {} for company {} on {} (total {:.2})",
        entry.id.value(),
        entry.company_id,
        entry.date,
        entry.total_amount
    );
    Ok(entry)
}

/// Replace figures, notes and attribution of an entry; the date may move
/// within its company. Confirmed entries need the override privilege.
pub async fn update(
    db: &DatabaseConnection,
    estimator: &dyn StaffCostEstimator,
    id: CashRegisterId,
    dto: CashRegisterDto,
    privileged: bool,
) -> Result<CashRegister, CashRegisterError> {
    let amounts = prepare_amounts(&dto.amounts)?;

    let _gate = write_gate().await;
    let txn = db.begin().await?;
    let mut entry = repository::get_by_id(&txn, id)
        .await?
        .ok_or(CashRegisterError::EntryNotFound)?;
    if entry.company_id != dto.company_id {
        return Err(CashRegisterError::CompanyMismatch {
            entry: entry.company_id,
            requested: dto.company_id,
        });
    }
    if !entry.is_editable_by(privileged) {
        return Err(CashRegisterError::AlreadyConfirmed);
    }

    let old_date = entry.date;
    if dto.date != old_date {
        if let Some(other) =
            repository::get_by_company_and_date(&txn, entry.company_id, dto.date).await?
        {
            if other.id != entry.id {
                return Err(CashRegisterError::DuplicateDate {
                    company_id: entry.company_id,
                    date: dto.date,
                });
            }
        }
        entry.date = dto.date;
    }

    entry.apply_amounts(&amounts);
    entry.notes = dto.notes;
    entry.attribution.employee_id = dto.employee_id;
    entry.attribution.employee_name = dto.employee_name;
    entry.before_write();

    repository::update(&txn, &entry)
        .await
        .map_err(|e| write_error(e, entry.company_id, entry.date))?;

    projection_builder::recompute_for_date(&txn, estimator, entry.company_id, entry.date).await?;
    if old_date != entry.date {
        projection_builder::recompute_for_date(&txn, estimator, entry.company_id, old_date)
            .await?;
    }
    txn.commit().await?;

    tracing::info!(
        "Updated cash register entry {} (company {}, {})",
        entry.id.value(),
        entry.company_id,
        entry.date
    );
    Ok(entry)
}

/// Freeze an entry. Figures do not change, so no rollup is needed.
pub async fn confirm(
    db: &DatabaseConnection,
    id: CashRegisterId,
    confirmed_by: Option<String>,
) -> Result<CashRegister, CashRegisterError> {
    let _gate = write_gate().await;
    let txn = db.begin().await?;
    let mut entry = repository::get_by_id(&txn, id)
        .await?
        .ok_or(CashRegisterError::EntryNotFound)?;
    if entry.is_confirmed {
        return Err(CashRegisterError::AlreadyConfirmed);
    }

    entry.confirm(confirmed_by, Utc::now());
    repository::update(&txn, &entry).await?;
    txn.commit().await?;

    tracing::info!(
        "Confirmed cash register entry {} by {}",
        entry.id.value(),
        entry.confirmed_by.as_deref().unwrap_or("-")
    );
    Ok(entry)
}

pub async fn delete(
    db: &DatabaseConnection,
    estimator: &dyn StaffCostEstimator,
    id: CashRegisterId,
    privileged: bool,
) -> Result<(), CashRegisterError> {
    let _gate = write_gate().await;
    let txn = db.begin().await?;
    let entry = repository::get_by_id(&txn, id)
        .await?
        .ok_or(CashRegisterError::EntryNotFound)?;
    if !entry.is_editable_by(privileged) {
        return Err(CashRegisterError::AlreadyConfirmed);
    }

    repository::delete(&txn, id).await?;
    projection_builder::recompute_for_date(&txn, estimator, entry.company_id, entry.date).await?;
    txn.commit().await?;

    tracing::info!(
        "Deleted cash register entry {} (company {}, {})",
        id.value(),
        entry.company_id,
        entry.date
    );
    Ok(())
}

pub async fn get_by_id(
    db: &DatabaseConnection,
    id: CashRegisterId,
) -> Result<CashRegister, CashRegisterError> {
    repository::get_by_id(db, id)
        .await?
        .ok_or(CashRegisterError::EntryNotFound)
}

pub async fn list_for_company(
    db: &DatabaseConnection,
    query: &CashRegisterListQuery,
) -> Result<Vec<CashRegister>, CashRegisterError> {
    Ok(repository::list_for_company(db, query.company_id, query.date_from, query.date_to).await?)
}
