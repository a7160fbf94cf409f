use contracts::domain::a001_cash_register::aggregate::CashRegisterId;
use contracts::domain::a002_cash_register_token::aggregate::{
    CashRegisterToken, CashRegisterTokenId,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sea_orm::entity::prelude::*;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "cash_register_tokens")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub token: String,
    pub company_id: i64,
    #[sea_orm(nullable)]
    pub employee_id: Option<i64>,
    #[sea_orm(nullable)]
    pub pin_hash: Option<String>,
    pub is_active: bool,
    #[sea_orm(nullable)]
    pub expires_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
    #[sea_orm(nullable)]
    pub created_by: Option<String>,
    #[sea_orm(nullable)]
    pub used_at: Option<DateTimeUtc>,
    #[sea_orm(nullable)]
    pub cash_register_id: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for CashRegisterToken {
    fn from(m: Model) -> Self {
        let uuid = Uuid::parse_str(&m.id).unwrap_or_else(|_| Uuid::new_v4());
        CashRegisterToken {
            id: CashRegisterTokenId(uuid),
            token: m.token,
            company_id: m.company_id,
            employee_id: m.employee_id,
            pin_hash: m.pin_hash,
            is_active: m.is_active,
            expires_at: m.expires_at,
            created_at: m.created_at,
            created_by: m.created_by,
            used_at: m.used_at,
            cash_register_id: m
                .cash_register_id
                .and_then(|s| Uuid::parse_str(&s).ok())
                .map(CashRegisterId),
        }
    }
}

fn to_active(t: &CashRegisterToken) -> ActiveModel {
    ActiveModel {
        id: Set(t.id.value().to_string()),
        token: Set(t.token.clone()),
        company_id: Set(t.company_id),
        employee_id: Set(t.employee_id),
        pin_hash: Set(t.pin_hash.clone()),
        is_active: Set(t.is_active),
        expires_at: Set(t.expires_at),
        created_at: Set(t.created_at),
        created_by: Set(t.created_by.clone()),
        used_at: Set(t.used_at),
        cash_register_id: Set(t.cash_register_id.map(|id| id.value().to_string())),
    }
}

pub async fn get_by_id<C: ConnectionTrait>(
    conn: &C,
    id: CashRegisterTokenId,
) -> Result<Option<CashRegisterToken>, DbErr> {
    let result = Entity::find_by_id(id.value().to_string()).one(conn).await?;
    Ok(result.map(Into::into))
}

pub async fn get_by_secret<C: ConnectionTrait>(
    conn: &C,
    secret: &str,
) -> Result<Option<CashRegisterToken>, DbErr> {
    let result = Entity::find()
        .filter(Column::Token.eq(secret))
        .one(conn)
        .await?;
    Ok(result.map(Into::into))
}

/// Newest first
pub async fn list_for_company<C: ConnectionTrait>(
    conn: &C,
    company_id: i64,
) -> Result<Vec<CashRegisterToken>, DbErr> {
    let items = Entity::find()
        .filter(Column::CompanyId.eq(company_id))
        .order_by_desc(Column::CreatedAt)
        .all(conn)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(items)
}

pub async fn insert<C: ConnectionTrait>(conn: &C, token: &CashRegisterToken) -> Result<(), DbErr> {
    to_active(token).insert(conn).await?;
    Ok(())
}

pub async fn update<C: ConnectionTrait>(conn: &C, token: &CashRegisterToken) -> Result<(), DbErr> {
    to_active(token).update(conn).await?;
    Ok(())
}
