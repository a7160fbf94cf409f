use once_cell::sync::{Lazy, OnceCell};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, DbErr,
    Statement,
};
use std::path::Path;
use tokio::sync::{Mutex, MutexGuard};

static DB_CONN: OnceCell<DatabaseConnection> = OnceCell::new();

/// SQLite admits one writer. Deferred transactions that read first and then
/// race for the write lock fail with SQLITE_BUSY instead of waiting, so
/// writers of entries and summaries queue here.
static WRITE_GATE: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

const CREATE_CASH_REGISTERS: &str = r#"
    CREATE TABLE cash_registers (
        id TEXT PRIMARY KEY NOT NULL,
        company_id INTEGER NOT NULL,
        date TEXT NOT NULL,
        total_amount REAL NOT NULL DEFAULT 0,
        cash_amount REAL NOT NULL DEFAULT 0,
        card_amount REAL NOT NULL DEFAULT 0,
        delivery_cash_amount REAL NOT NULL DEFAULT 0,
        delivery_online_amount REAL NOT NULL DEFAULT 0,
        check_amount REAL NOT NULL DEFAULT 0,
        expenses_amount REAL NOT NULL DEFAULT 0,
        expenses_description TEXT,
        vat_percentage REAL,
        vat_amount REAL,
        net_amount REAL,
        notes TEXT,
        employee_id INTEGER,
        employee_name TEXT,
        token_id TEXT,
        is_confirmed INTEGER NOT NULL DEFAULT 0,
        confirmed_at TEXT,
        confirmed_by TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
"#;

const CREATE_CASH_REGISTER_SUMMARIES: &str = r#"
    CREATE TABLE cash_register_summaries (
        company_id INTEGER NOT NULL,
        year INTEGER NOT NULL,
        month INTEGER NOT NULL,
        week_number INTEGER NOT NULL,
        weekly_total REAL NOT NULL DEFAULT 0,
        weekly_cash REAL NOT NULL DEFAULT 0,
        weekly_card REAL NOT NULL DEFAULT 0,
        weekly_delivery_cash REAL NOT NULL DEFAULT 0,
        weekly_delivery_online REAL NOT NULL DEFAULT 0,
        weekly_check REAL NOT NULL DEFAULT 0,
        weekly_expenses REAL NOT NULL DEFAULT 0,
        weekly_vat_amount REAL NOT NULL DEFAULT 0,
        weekly_net_amount REAL NOT NULL DEFAULT 0,
        weekly_staff_cost REAL NOT NULL DEFAULT 0,
        weekly_staff_cost_percentage REAL NOT NULL DEFAULT 0,
        monthly_total REAL NOT NULL DEFAULT 0,
        monthly_vat_amount REAL NOT NULL DEFAULT 0,
        monthly_net_amount REAL NOT NULL DEFAULT 0,
        monthly_staff_cost REAL NOT NULL DEFAULT 0,
        monthly_staff_cost_percentage REAL NOT NULL DEFAULT 0,
        yearly_total REAL NOT NULL DEFAULT 0,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (company_id, year, month, week_number)
    );
"#;

const CREATE_CASH_REGISTER_TOKENS: &str = r#"
    CREATE TABLE cash_register_tokens (
        id TEXT PRIMARY KEY NOT NULL,
        token TEXT NOT NULL UNIQUE,
        company_id INTEGER NOT NULL,
        employee_id INTEGER,
        pin_hash TEXT,
        is_active INTEGER NOT NULL DEFAULT 1,
        expires_at TEXT,
        created_at TEXT NOT NULL,
        created_by TEXT,
        used_at TEXT,
        cash_register_id TEXT
    );
"#;

// Owned by the company and time tracking modules; created here only so a
// fresh database can answer staff cost queries.
const CREATE_COMPANIES: &str = r#"
    CREATE TABLE companies (
        id INTEGER PRIMARY KEY NOT NULL,
        name TEXT NOT NULL DEFAULT '',
        hourly_employee_cost REAL
    );
"#;

const CREATE_TIME_ENTRIES: &str = r#"
    CREATE TABLE time_entries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        company_id INTEGER NOT NULL,
        employee_id INTEGER,
        work_date TEXT NOT NULL,
        hours REAL NOT NULL DEFAULT 0
    );
"#;

const CREATE_INDEXES: [&str; 3] = [
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_cash_registers_company_date ON cash_registers (company_id, date);",
    "CREATE INDEX IF NOT EXISTS idx_cash_register_tokens_company ON cash_register_tokens (company_id);",
    "CREATE INDEX IF NOT EXISTS idx_time_entries_company_date ON time_entries (company_id, work_date);",
];

pub async fn initialize_database(db_file: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let absolute_path = if db_file.is_absolute() {
        db_file.to_path_buf()
    } else {
        std::env::current_dir()?.join(db_file)
    };
    // Normalize path separators and ensure proper URL form on Windows
    let normalized = absolute_path.to_string_lossy().replace('\\', "/");
    let needs_leading_slash = !normalized.starts_with('/') && normalized.contains(':');
    let prefix = if needs_leading_slash { "/" } else { "" };
    let db_url = format!("sqlite://{}{}?mode=rwc", prefix, normalized);

    tracing::info!("Opening database {}", absolute_path.display());
    let mut options = ConnectOptions::new(db_url);
    options.sqlx_logging(false);
    let conn = Database::connect(options).await?;

    bootstrap_schema(&conn).await?;

    DB_CONN
        .set(conn)
        .map_err(|_| anyhow::anyhow!("Failed to set DB_CONN"))?;
    Ok(())
}

/// Create missing tables, add columns introduced after the first release
/// and make sure the indexes exist
pub async fn bootstrap_schema<C: ConnectionTrait>(conn: &C) -> anyhow::Result<()> {
    let tables = [
        ("cash_registers", CREATE_CASH_REGISTERS),
        ("cash_register_summaries", CREATE_CASH_REGISTER_SUMMARIES),
        ("cash_register_tokens", CREATE_CASH_REGISTER_TOKENS),
        ("companies", CREATE_COMPANIES),
        ("time_entries", CREATE_TIME_ENTRIES),
    ];

    for (table, create_sql) in tables {
        if table_exists(conn, table).await? {
            continue;
        }
        tracing::info!("Creating {} table", table);
        conn.execute(Statement::from_string(
            DatabaseBackend::Sqlite,
            create_sql.to_string(),
        ))
        .await?;
    }

    // VAT split arrived after the first cash register release
    for column in ["vat_percentage", "vat_amount", "net_amount"] {
        ensure_column(conn, "cash_registers", column, "REAL").await?;
    }
    ensure_column(conn, "cash_registers", "expenses_description", "TEXT").await?;
    ensure_column(conn, "cash_register_tokens", "pin_hash", "TEXT").await?;
    ensure_column(conn, "cash_register_tokens", "cash_register_id", "TEXT").await?;

    for index_sql in CREATE_INDEXES {
        conn.execute(Statement::from_string(
            DatabaseBackend::Sqlite,
            index_sql.to_string(),
        ))
        .await?;
    }

    Ok(())
}

async fn table_exists<C: ConnectionTrait>(conn: &C, table: &str) -> anyhow::Result<bool> {
    let rows = conn
        .query_all(Statement::from_sql_and_values(
            DatabaseBackend::Sqlite,
            "SELECT name FROM sqlite_master WHERE type='table' AND name = ?;",
            [table.into()],
        ))
        .await?;
    Ok(!rows.is_empty())
}

async fn ensure_column<C: ConnectionTrait>(
    conn: &C,
    table: &str,
    column: &str,
    sql_type: &str,
) -> anyhow::Result<()> {
    let pragma = format!("PRAGMA table_info('{}');", table);
    let cols = conn
        .query_all(Statement::from_string(DatabaseBackend::Sqlite, pragma))
        .await?;
    let exists = cols
        .iter()
        .any(|row| row.try_get::<String>("", "name").unwrap_or_default() == column);
    if !exists {
        tracing::info!("Adding {} column to {}", column, table);
        conn.execute(Statement::from_string(
            DatabaseBackend::Sqlite,
            format!("ALTER TABLE {} ADD COLUMN {} {};", table, column, sql_type),
        ))
        .await?;
    }
    Ok(())
}

/// Hold for the whole of a write transaction on entries or summaries
pub async fn write_gate() -> MutexGuard<'static, ()> {
    WRITE_GATE.lock().await
}

/// SQLITE_BUSY (5) or SQLITE_BUSY_SNAPSHOT (517): another process holds the
/// write lock
pub fn is_busy(err: &DbErr) -> bool {
    let message = err.to_string();
    message.contains("database is locked")
        || message.contains("(code: 5)")
        || message.contains("(code: 517)")
}

pub fn get_connection() -> &'static DatabaseConnection {
    DB_CONN
        .get()
        .expect("Database connection has not been initialized")
}

/// Fresh in-memory database with the full schema. One pooled connection,
/// otherwise every connection would see its own empty database.
#[cfg(test)]
pub async fn connect_in_memory() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:".to_string());
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let conn = Database::connect(options)
        .await
        .expect("in-memory sqlite should open");
    bootstrap_schema(&conn)
        .await
        .expect("schema bootstrap should succeed");
    conn
}

/// File database with a real connection pool, for tests that race writers
#[cfg(test)]
pub async fn connect_file(db_file: &Path, max_connections: u32) -> DatabaseConnection {
    let db_url = format!("sqlite://{}?mode=rwc", db_file.to_string_lossy());
    let mut options = ConnectOptions::new(db_url);
    options.max_connections(max_connections).sqlx_logging(false);
    let conn = Database::connect(options)
        .await
        .expect("file sqlite should open");
    bootstrap_schema(&conn)
        .await
        .expect("schema bootstrap should succeed");
    conn
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bootstrap_is_repeatable() {
        let conn = connect_in_memory().await;
        bootstrap_schema(&conn).await.unwrap();
        assert!(table_exists(&conn, "cash_register_summaries").await.unwrap());
    }

    #[test]
    fn test_busy_errors_are_recognised() {
        let locked = DbErr::Custom("error returned from database: (code: 5) database is locked".into());
        assert!(is_busy(&locked));
        let unique = DbErr::Custom("UNIQUE constraint failed: cash_registers.company_id".into());
        assert!(!is_busy(&unique));
    }

    #[tokio::test]
    async fn test_missing_vat_columns_are_added() {
        let conn = connect_in_memory().await;
        conn.execute(Statement::from_string(
            DatabaseBackend::Sqlite,
            "CREATE TABLE legacy_registers (id TEXT PRIMARY KEY NOT NULL);".to_string(),
        ))
        .await
        .unwrap();
        ensure_column(&conn, "legacy_registers", "vat_amount", "REAL")
            .await
            .unwrap();
        ensure_column(&conn, "legacy_registers", "vat_amount", "REAL")
            .await
            .unwrap();

        let cols = conn
            .query_all(Statement::from_string(
                DatabaseBackend::Sqlite,
                "PRAGMA table_info('legacy_registers');".to_string(),
            ))
            .await
            .unwrap();
        assert_eq!(cols.len(), 2);
    }
}
