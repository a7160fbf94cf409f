use chrono::NaiveDate;
use contracts::domain::a001_cash_register::aggregate::{
    Attribution, CashRegister, CashRegisterId, PaymentBreakdown,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sea_orm::entity::prelude::*;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "cash_registers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub company_id: i64,
    pub date: NaiveDate,

    // Money
    pub total_amount: f64,
    pub cash_amount: f64,
    pub card_amount: f64,
    pub delivery_cash_amount: f64,
    pub delivery_online_amount: f64,
    pub check_amount: f64,
    pub expenses_amount: f64,
    #[sea_orm(nullable)]
    pub expenses_description: Option<String>,
    #[sea_orm(nullable)]
    pub vat_percentage: Option<f64>,
    #[sea_orm(nullable)]
    pub vat_amount: Option<f64>,
    #[sea_orm(nullable)]
    pub net_amount: Option<f64>,

    #[sea_orm(nullable)]
    pub notes: Option<String>,
    #[sea_orm(nullable)]
    pub employee_id: Option<i64>,
    #[sea_orm(nullable)]
    pub employee_name: Option<String>,
    #[sea_orm(nullable)]
    pub token_id: Option<String>,

    pub is_confirmed: bool,
    #[sea_orm(nullable)]
    pub confirmed_at: Option<DateTimeUtc>,
    #[sea_orm(nullable)]
    pub confirmed_by: Option<String>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for CashRegister {
    fn from(m: Model) -> Self {
        let uuid = Uuid::parse_str(&m.id).unwrap_or_else(|_| Uuid::new_v4());
        CashRegister {
            id: CashRegisterId(uuid),
            company_id: m.company_id,
            date: m.date,
            payments: PaymentBreakdown {
                cash_amount: m.cash_amount,
                card_amount: m.card_amount,
                delivery_cash_amount: m.delivery_cash_amount,
                delivery_online_amount: m.delivery_online_amount,
                check_amount: m.check_amount,
            },
            total_amount: m.total_amount,
            expenses_amount: m.expenses_amount,
            expenses_description: m.expenses_description,
            vat_percentage: m.vat_percentage,
            vat_amount: m.vat_amount,
            net_amount: m.net_amount,
            notes: m.notes,
            attribution: Attribution {
                employee_id: m.employee_id,
                employee_name: m.employee_name,
                token_id: m.token_id.and_then(|s| Uuid::parse_str(&s).ok()),
            },
            is_confirmed: m.is_confirmed,
            confirmed_at: m.confirmed_at,
            confirmed_by: m.confirmed_by,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

fn to_active(entry: &CashRegister) -> ActiveModel {
    ActiveModel {
        id: Set(entry.id.value().to_string()),
        company_id: Set(entry.company_id),
        date: Set(entry.date),
        total_amount: Set(entry.total_amount),
        cash_amount: Set(entry.payments.cash_amount),
        card_amount: Set(entry.payments.card_amount),
        delivery_cash_amount: Set(entry.payments.delivery_cash_amount),
        delivery_online_amount: Set(entry.payments.delivery_online_amount),
        check_amount: Set(entry.payments.check_amount),
        expenses_amount: Set(entry.expenses_amount),
        expenses_description: Set(entry.expenses_description.clone()),
        vat_percentage: Set(entry.vat_percentage),
        vat_amount: Set(entry.vat_amount),
        net_amount: Set(entry.net_amount),
        notes: Set(entry.notes.clone()),
        employee_id: Set(entry.attribution.employee_id),
        employee_name: Set(entry.attribution.employee_name.clone()),
        token_id: Set(entry.attribution.token_id.map(|id| id.to_string())),
        is_confirmed: Set(entry.is_confirmed),
        confirmed_at: Set(entry.confirmed_at),
        confirmed_by: Set(entry.confirmed_by.clone()),
        created_at: Set(entry.created_at),
        updated_at: Set(entry.updated_at),
    }
}

/// SQLite reports (company_id, date) collisions through this message
pub fn is_unique_violation(err: &DbErr) -> bool {
    err.to_string().contains("UNIQUE constraint failed")
}

pub async fn get_by_id<C: ConnectionTrait>(
    conn: &C,
    id: CashRegisterId,
) -> Result<Option<CashRegister>, DbErr> {
    let result = Entity::find_by_id(id.value().to_string()).one(conn).await?;
    Ok(result.map(Into::into))
}

pub async fn get_by_company_and_date<C: ConnectionTrait>(
    conn: &C,
    company_id: i64,
    date: NaiveDate,
) -> Result<Option<CashRegister>, DbErr> {
    let result = Entity::find()
        .filter(Column::CompanyId.eq(company_id))
        .filter(Column::Date.eq(date))
        .one(conn)
        .await?;
    Ok(result.map(Into::into))
}

/// Entries of a company with `from <= date <= to`, oldest first
pub async fn list_between<C: ConnectionTrait>(
    conn: &C,
    company_id: i64,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<CashRegister>, DbErr> {
    let items = Entity::find()
        .filter(Column::CompanyId.eq(company_id))
        .filter(Column::Date.between(from, to))
        .order_by_asc(Column::Date)
        .all(conn)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(items)
}

/// Entries of a company, optionally bounded on either side, oldest first
pub async fn list_for_company<C: ConnectionTrait>(
    conn: &C,
    company_id: i64,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<Vec<CashRegister>, DbErr> {
    let mut query = Entity::find().filter(Column::CompanyId.eq(company_id));
    if let Some(from) = from {
        query = query.filter(Column::Date.gte(from));
    }
    if let Some(to) = to {
        query = query.filter(Column::Date.lte(to));
    }
    let items = query
        .order_by_asc(Column::Date)
        .all(conn)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(items)
}

/// Every date a company has an entry for
pub async fn list_dates<C: ConnectionTrait>(
    conn: &C,
    company_id: i64,
) -> Result<Vec<NaiveDate>, DbErr> {
    let dates = Entity::find()
        .filter(Column::CompanyId.eq(company_id))
        .order_by_asc(Column::Date)
        .all(conn)
        .await?
        .into_iter()
        .map(|m| m.date)
        .collect();
    Ok(dates)
}

pub async fn insert<C: ConnectionTrait>(conn: &C, entry: &CashRegister) -> Result<(), DbErr> {
    to_active(entry).insert(conn).await?;
    Ok(())
}

pub async fn update<C: ConnectionTrait>(conn: &C, entry: &CashRegister) -> Result<(), DbErr> {
    let mut active = to_active(entry);
    active.created_at = sea_orm::ActiveValue::NotSet;
    active.update(conn).await?;
    Ok(())
}

pub async fn delete<C: ConnectionTrait>(conn: &C, id: CashRegisterId) -> Result<bool, DbErr> {
    let result = Entity::delete_by_id(id.value().to_string())
        .exec(conn)
        .await?;
    Ok(result.rows_affected > 0)
}
