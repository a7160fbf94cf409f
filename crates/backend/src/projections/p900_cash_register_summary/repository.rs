use chrono::Utc;
use contracts::projections::p900_cash_register_summary::dto::{
    CashRegisterSummary, PeriodKey, SummaryFigures,
};
use sea_orm::entity::prelude::*;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};

/// One rollup row per company × ISO year × calendar month × ISO week
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "cash_register_summaries")]
pub struct Model {
    // NK (Natural Key): (company_id, year, month, week_number)
    #[sea_orm(primary_key, auto_increment = false)]
    pub company_id: i64,
    #[sea_orm(primary_key, auto_increment = false)]
    pub year: i32,
    #[sea_orm(primary_key, auto_increment = false)]
    pub month: i32,
    #[sea_orm(primary_key, auto_increment = false)]
    pub week_number: i32,

    // Week
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

    // Month
    pub monthly_total: f64,
    pub monthly_vat_amount: f64,
    pub monthly_net_amount: f64,
    pub monthly_staff_cost: f64,
    pub monthly_staff_cost_percentage: f64,

    // Year
    pub yearly_total: f64,

    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for CashRegisterSummary {
    fn from(m: Model) -> Self {
        CashRegisterSummary {
            key: PeriodKey::new(
                m.company_id,
                m.year,
                m.month as u32,
                m.week_number as u32,
            ),
            figures: SummaryFigures {
                weekly_total: m.weekly_total,
                weekly_cash: m.weekly_cash,
                weekly_card: m.weekly_card,
                weekly_delivery_cash: m.weekly_delivery_cash,
                weekly_delivery_online: m.weekly_delivery_online,
                weekly_check: m.weekly_check,
                weekly_expenses: m.weekly_expenses,
                weekly_vat_amount: m.weekly_vat_amount,
                weekly_net_amount: m.weekly_net_amount,
                weekly_staff_cost: m.weekly_staff_cost,
                weekly_staff_cost_percentage: m.weekly_staff_cost_percentage,
                monthly_total: m.monthly_total,
                monthly_vat_amount: m.monthly_vat_amount,
                monthly_net_amount: m.monthly_net_amount,
                monthly_staff_cost: m.monthly_staff_cost,
                monthly_staff_cost_percentage: m.monthly_staff_cost_percentage,
                yearly_total: m.yearly_total,
            },
            updated_at: m.updated_at,
        }
    }
}

fn to_active(summary: &CashRegisterSummary) -> ActiveModel {
    let f = &summary.figures;
    ActiveModel {
        company_id: Set(summary.key.company_id),
        year: Set(summary.key.year),
        month: Set(summary.key.month as i32),
        week_number: Set(summary.key.week_number as i32),
        weekly_total: Set(f.weekly_total),
        weekly_cash: Set(f.weekly_cash),
        weekly_card: Set(f.weekly_card),
        weekly_delivery_cash: Set(f.weekly_delivery_cash),
        weekly_delivery_online: Set(f.weekly_delivery_online),
        weekly_check: Set(f.weekly_check),
        weekly_expenses: Set(f.weekly_expenses),
        weekly_vat_amount: Set(f.weekly_vat_amount),
        weekly_net_amount: Set(f.weekly_net_amount),
        weekly_staff_cost: Set(f.weekly_staff_cost),
        weekly_staff_cost_percentage: Set(f.weekly_staff_cost_percentage),
        monthly_total: Set(f.monthly_total),
        monthly_vat_amount: Set(f.monthly_vat_amount),
        monthly_net_amount: Set(f.monthly_net_amount),
        monthly_staff_cost: Set(f.monthly_staff_cost),
        monthly_staff_cost_percentage: Set(f.monthly_staff_cost_percentage),
        yearly_total: Set(f.yearly_total),
        updated_at: Set(summary.updated_at),
    }
}

fn key_tuple(key: &PeriodKey) -> (i64, i32, i32, i32) {
    (
        key.company_id,
        key.year,
        key.month as i32,
        key.week_number as i32,
    )
}

pub async fn get_by_key<C: ConnectionTrait>(
    conn: &C,
    key: &PeriodKey,
) -> Result<Option<CashRegisterSummary>, DbErr> {
    let result = Entity::find_by_id(key_tuple(key)).one(conn).await?;
    Ok(result.map(Into::into))
}

/// Upsert by NK. The stored row is replaced wholesale.
pub async fn upsert<C: ConnectionTrait>(
    conn: &C,
    summary: &CashRegisterSummary,
) -> Result<(), DbErr> {
    let existing = Entity::find_by_id(key_tuple(&summary.key))
        .one(conn)
        .await?;
    let active = to_active(summary);
    if existing.is_some() {
        active.update(conn).await?;
    } else {
        active.insert(conn).await?;
    }
    Ok(())
}

/// Empty row for a period seen for the first time
pub fn new_row(key: PeriodKey) -> CashRegisterSummary {
    CashRegisterSummary {
        key,
        figures: SummaryFigures::default(),
        updated_at: Utc::now(),
    }
}

/// Rows of a company for the given ISO years
pub async fn list_for_years<C: ConnectionTrait>(
    conn: &C,
    company_id: i64,
    years: &[i32],
) -> Result<Vec<CashRegisterSummary>, DbErr> {
    let items = Entity::find()
        .filter(Column::CompanyId.eq(company_id))
        .filter(Column::Year.is_in(years.iter().copied()))
        .order_by_asc(Column::Year)
        .order_by_asc(Column::WeekNumber)
        .order_by_asc(Column::Month)
        .all(conn)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(items)
}

pub async fn list<C: ConnectionTrait>(
    conn: &C,
    company_id: i64,
    year: Option<i32>,
    month: Option<u32>,
) -> Result<Vec<CashRegisterSummary>, DbErr> {
    let mut query = Entity::find().filter(Column::CompanyId.eq(company_id));
    if let Some(year) = year {
        query = query.filter(Column::Year.eq(year));
    }
    if let Some(month) = month {
        query = query.filter(Column::Month.eq(month as i32));
    }
    let items = query
        .order_by_asc(Column::Year)
        .order_by_asc(Column::WeekNumber)
        .order_by_asc(Column::Month)
        .all(conn)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(items)
}
