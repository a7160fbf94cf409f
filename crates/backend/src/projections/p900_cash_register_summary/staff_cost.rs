use anyhow::Context;
use async_trait::async_trait;
use contracts::shared::period::{month_bounds, week_bounds};
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseTransaction, Statement};

/// Labour inputs of the staff-cost ratio. Hours come from time tracking and
/// the hourly cost from the company record, both owned outside this crate.
///
/// Calls run inside the transaction of the mutation being rolled up.
#[async_trait]
pub trait StaffCostEstimator: Send + Sync {
    async fn hours_for_week(
        &self,
        txn: &DatabaseTransaction,
        company_id: i64,
        iso_year: i32,
        iso_week: u32,
    ) -> anyhow::Result<f64>;

    async fn hours_for_month(
        &self,
        txn: &DatabaseTransaction,
        company_id: i64,
        year: i32,
        month: u32,
    ) -> anyhow::Result<f64>;

    async fn hourly_employee_cost(
        &self,
        txn: &DatabaseTransaction,
        company_id: i64,
    ) -> anyhow::Result<f64>;
}

/// Reads `time_entries` and `companies` from the application database
#[derive(Debug, Clone)]
pub struct SqlStaffCostEstimator {
    fallback_hourly_cost: f64,
}

impl SqlStaffCostEstimator {
    pub fn new(fallback_hourly_cost: f64) -> Self {
        Self {
            fallback_hourly_cost,
        }
    }

    async fn hours_between(
        &self,
        txn: &DatabaseTransaction,
        company_id: i64,
        from: chrono::NaiveDate,
        to: chrono::NaiveDate,
    ) -> anyhow::Result<f64> {
        let row = txn
            .query_one(Statement::from_sql_and_values(
                DatabaseBackend::Sqlite,
                "SELECT COALESCE(SUM(hours), 0.0) AS hours FROM time_entries
                 WHERE company_id = ? AND work_date BETWEEN ? AND ?",
                [
                    company_id.into(),
                    from.format("%Y-%m-%d").to_string().into(),
                    to.format("%Y-%m-%d").to_string().into(),
                ],
            ))
            .await
            .context("Failed to sum worked hours")?;

        match row {
            Some(row) => Ok(row.try_get::<f64>("", "hours")?),
            None => Ok(0.0),
        }
    }
}

#[async_trait]
impl StaffCostEstimator for SqlStaffCostEstimator {
    async fn hours_for_week(
        &self,
        txn: &DatabaseTransaction,
        company_id: i64,
        iso_year: i32,
        iso_week: u32,
    ) -> anyhow::Result<f64> {
        let (monday, sunday) = week_bounds(iso_year, iso_week)
            .ok_or_else(|| anyhow::anyhow!("No ISO week {} in {}", iso_week, iso_year))?;
        self.hours_between(txn, company_id, monday, sunday).await
    }

    async fn hours_for_month(
        &self,
        txn: &DatabaseTransaction,
        company_id: i64,
        year: i32,
        month: u32,
    ) -> anyhow::Result<f64> {
        let (first, last) = month_bounds(year, month)
            .ok_or_else(|| anyhow::anyhow!("Invalid month {}-{}", year, month))?;
        self.hours_between(txn, company_id, first, last).await
    }

    async fn hourly_employee_cost(
        &self,
        txn: &DatabaseTransaction,
        company_id: i64,
    ) -> anyhow::Result<f64> {
        let row = txn
            .query_one(Statement::from_sql_and_values(
                DatabaseBackend::Sqlite,
                "SELECT hourly_employee_cost FROM companies WHERE id = ?",
                [company_id.into()],
            ))
            .await
            .context("Failed to read company hourly cost")?;

        let configured = match row {
            Some(row) => row.try_get::<Option<f64>>("", "hourly_employee_cost")?,
            None => None,
        };
        Ok(configured
            .filter(|cost| *cost > 0.0)
            .unwrap_or(self.fallback_hourly_cost))
    }
}

/// Deterministic estimators for rollup tests
#[cfg(test)]
pub mod testing {
    use super::*;

    pub struct FixedStaffCost {
        pub weekly_hours: f64,
        pub monthly_hours: f64,
        pub hourly_cost: f64,
    }

    #[async_trait]
    impl StaffCostEstimator for FixedStaffCost {
        async fn hours_for_week(
            &self,
            _txn: &DatabaseTransaction,
            _company_id: i64,
            _iso_year: i32,
            _iso_week: u32,
        ) -> anyhow::Result<f64> {
            Ok(self.weekly_hours)
        }

        async fn hours_for_month(
            &self,
            _txn: &DatabaseTransaction,
            _company_id: i64,
            _year: i32,
            _month: u32,
        ) -> anyhow::Result<f64> {
            Ok(self.monthly_hours)
        }

        async fn hourly_employee_cost(
            &self,
            _txn: &DatabaseTransaction,
            _company_id: i64,
        ) -> anyhow::Result<f64> {
            Ok(self.hourly_cost)
        }
    }

    pub struct FailingStaffCost;

    #[async_trait]
    impl StaffCostEstimator for FailingStaffCost {
        async fn hours_for_week(
            &self,
            _txn: &DatabaseTransaction,
            _company_id: i64,
            _iso_year: i32,
            _iso_week: u32,
        ) -> anyhow::Result<f64> {
            anyhow::bail!("time tracking unavailable")
        }

        async fn hours_for_month(
            &self,
            _txn: &DatabaseTransaction,
            _company_id: i64,
            _year: i32,
            _month: u32,
        ) -> anyhow::Result<f64> {
            anyhow::bail!("time tracking unavailable")
        }

        async fn hourly_employee_cost(
            &self,
            _txn: &DatabaseTransaction,
            _company_id: i64,
        ) -> anyhow::Result<f64> {
            anyhow::bail!("time tracking unavailable")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::data::db::connect_in_memory;
    use sea_orm::TransactionTrait;

    async fn exec(txn: &DatabaseTransaction, sql: &str) {
        txn.execute(Statement::from_string(DatabaseBackend::Sqlite, sql.to_string()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_hours_are_summed_per_week_and_month() {
        let db = connect_in_memory().await;
        let txn = db.begin().await.unwrap();
        exec(
            &txn,
            "INSERT INTO time_entries (company_id, employee_id, work_date, hours) VALUES
                (1, 10, '2024-06-03', 8.0),
                (1, 11, '2024-06-05', 6.5),
                (1, 10, '2024-06-10', 8.0),
                (2, 20, '2024-06-04', 40.0),
                (1, 10, '2024-05-31', 4.0)",
        )
        .await;

        let estimator = SqlStaffCostEstimator::new(12.0);
        let week = estimator.hours_for_week(&txn, 1, 2024, 23).await.unwrap();
        let month = estimator.hours_for_month(&txn, 1, 2024, 6).await.unwrap();
        let empty = estimator.hours_for_week(&txn, 3, 2024, 23).await.unwrap();
        txn.rollback().await.unwrap();

        assert_eq!(week, 14.5);
        assert_eq!(month, 22.5);
        assert_eq!(empty, 0.0);
    }

    #[tokio::test]
    async fn test_hourly_cost_falls_back_when_unset() {
        let db = connect_in_memory().await;
        let txn = db.begin().await.unwrap();
        exec(
            &txn,
            "INSERT INTO companies (id, name, hourly_employee_cost) VALUES
                (1, 'Bar Centro', 15.0),
                (2, 'Bar Puerto', NULL)",
        )
        .await;

        let estimator = SqlStaffCostEstimator::new(12.0);
        assert_eq!(estimator.hourly_employee_cost(&txn, 1).await.unwrap(), 15.0);
        assert_eq!(estimator.hourly_employee_cost(&txn, 2).await.unwrap(), 12.0);
        assert_eq!(estimator.hourly_employee_cost(&txn, 99).await.unwrap(), 12.0);
        txn.rollback().await.unwrap();
    }
}
