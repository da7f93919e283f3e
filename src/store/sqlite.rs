//! SQLite-backed call repository.
//!
//! Implements [`CallRepository`] over a single rusqlite connection, plus the
//! ingestion and inspection helpers the import step and CLI use. Timestamps
//! are stored as Unix milliseconds.

use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, ToSql, params, params_from_iter};

use crate::domain::{
    Call, CallCounts, CallId, CallStatus, CallUpdate, Campaign, CampaignId, CampaignStatus, CampaignUpdate, Debtor,
    DebtorId, Invoice, OutcomeCode,
};
use crate::error::{DialerError, Result};
use crate::store::repository::CallRepository;

const CALL_COLUMNS: &str = "id, campaign_id, debtor_id, attempt, status, run_id, triggered_at, completed_at, \
     outcome, duration_secs, summary, raw_response, error_message, created_at, updated_at";

const CAMPAIGN_COLUMNS: &str = "id, name, active, paused, status, started_at, completed_at, created_at";

/// Repository over a SQLite database file (or memory).
pub struct SqliteRepository {
    /// rusqlite::Connection isn't Sync; the mutex gives the async trait shared access
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRepository").finish_non_exhaustive()
    }
}

impl SqliteRepository {
    /// Open or create a database at the given path.
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        Self::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Initialize the SQLite schema.
    fn init_schema(db: &Connection) -> Result<()> {
        db.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS campaigns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 0,
                paused INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                started_at INTEGER,
                completed_at INTEGER,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS debtors (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                phone TEXT NOT NULL,
                customer_number TEXT
            );

            CREATE TABLE IF NOT EXISTS invoices (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                debtor_id INTEGER NOT NULL REFERENCES debtors(id),
                invoice_number TEXT NOT NULL,
                amount REAL NOT NULL,
                currency TEXT,
                due_date TEXT
            );

            CREATE TABLE IF NOT EXISTS calls (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                campaign_id INTEGER NOT NULL REFERENCES campaigns(id),
                debtor_id INTEGER NOT NULL REFERENCES debtors(id),
                attempt INTEGER NOT NULL DEFAULT 1,
                status TEXT NOT NULL,
                run_id TEXT,
                triggered_at INTEGER,
                completed_at INTEGER,
                outcome TEXT,
                duration_secs INTEGER,
                summary TEXT,
                raw_response TEXT,
                error_message TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_calls_campaign_status ON calls(campaign_id, status);
            CREATE INDEX IF NOT EXISTS idx_calls_status ON calls(status);
            CREATE INDEX IF NOT EXISTS idx_invoices_debtor ON invoices(debtor_id);
            CREATE INDEX IF NOT EXISTS idx_campaigns_active ON campaigns(active);
            "#,
        )?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| DialerError::Storage(e.to_string()))
    }

    //=== Ingestion helpers (not part of the dispatcher contract) ===

    /// Create a new, inactive campaign.
    pub fn create_campaign(&self, name: &str) -> Result<Campaign> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO campaigns (name, active, paused, status, created_at) VALUES (?1, 0, 0, ?2, ?3)",
            params![name, CampaignStatus::Active.as_str(), to_ms(Utc::now())],
        )?;
        let id = conn.last_insert_rowid();
        Self::campaign_by_id(&conn, id)?.ok_or(DialerError::CampaignNotFound(id))
    }

    /// Make this campaign the single active one.
    pub fn activate_campaign(&self, id: CampaignId) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("UPDATE campaigns SET active = 0 WHERE active = 1", [])?;
        let changed = tx.execute(
            "UPDATE campaigns SET active = 1, status = ?1 WHERE id = ?2",
            params![CampaignStatus::Active.as_str(), id],
        )?;
        if changed == 0 {
            return Err(DialerError::CampaignNotFound(id));
        }
        tx.commit()?;
        Ok(())
    }

    /// Set or clear the operator pause on a campaign.
    pub fn pause_campaign(&self, id: CampaignId, paused: bool) -> Result<()> {
        let status = if paused {
            CampaignStatus::Paused
        } else {
            CampaignStatus::Active
        };
        let changed = self.conn()?.execute(
            "UPDATE campaigns SET paused = ?1, status = ?2 WHERE id = ?3",
            params![paused, status.as_str(), id],
        )?;
        if changed == 0 {
            return Err(DialerError::CampaignNotFound(id));
        }
        Ok(())
    }

    pub fn create_debtor(&self, name: &str, phone: &str, customer_number: Option<&str>) -> Result<DebtorId> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO debtors (name, phone, customer_number) VALUES (?1, ?2, ?3)",
            params![name, phone, customer_number],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn add_invoice(
        &self,
        debtor_id: DebtorId,
        invoice_number: &str,
        amount: f64,
        currency: Option<&str>,
        due_date: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO invoices (debtor_id, invoice_number, amount, currency, due_date) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![debtor_id, invoice_number, amount, currency, due_date],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Create a PENDING call for a debtor.
    pub fn enqueue_call(&self, campaign_id: CampaignId, debtor_id: DebtorId, attempt: u32) -> Result<Call> {
        let conn = self.conn()?;
        let now = to_ms(Utc::now());
        conn.execute(
            "INSERT INTO calls (campaign_id, debtor_id, attempt, status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![campaign_id, debtor_id, attempt.max(1), CallStatus::Pending.as_str(), now],
        )?;
        let id = conn.last_insert_rowid();
        Self::call_by_id(&conn, id)?.ok_or(DialerError::CallNotFound(id))
    }

    pub fn get_call(&self, id: CallId) -> Result<Option<Call>> {
        let conn = self.conn()?;
        Self::call_by_id(&conn, id)
    }

    pub fn get_campaign(&self, id: CampaignId) -> Result<Option<Campaign>> {
        let conn = self.conn()?;
        Self::campaign_by_id(&conn, id)
    }

    /// All calls of a campaign, oldest first.
    pub fn list_calls(&self, campaign_id: CampaignId) -> Result<Vec<Call>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {CALL_COLUMNS} FROM calls WHERE campaign_id = ?1 ORDER BY created_at, id");
        Self::query_calls(&conn, &sql, &[&campaign_id])
    }

    //=== Row mapping ===

    fn campaign_by_id(conn: &Connection, id: CampaignId) -> Result<Option<Campaign>> {
        let sql = format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?1");
        Ok(conn.query_row(&sql, [id], campaign_from_row).optional()?)
    }

    fn call_by_id(conn: &Connection, id: CallId) -> Result<Option<Call>> {
        let sql = format!("SELECT {CALL_COLUMNS} FROM calls WHERE id = ?1");
        Ok(conn.query_row(&sql, [id], call_from_row).optional()?)
    }

    fn query_calls(conn: &Connection, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<Call>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, call_from_row)?;

        let mut calls = Vec::new();
        for row in rows {
            calls.push(row?);
        }
        Ok(calls)
    }

    fn debtor_with_invoices(conn: &Connection, id: DebtorId) -> Result<Option<Debtor>> {
        let debtor = conn
            .query_row(
                "SELECT id, name, phone, customer_number FROM debtors WHERE id = ?1",
                [id],
                |row| {
                    Ok(Debtor {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        phone: row.get(2)?,
                        customer_number: row.get(3)?,
                        invoices: Vec::new(),
                    })
                },
            )
            .optional()?;

        let Some(mut debtor) = debtor else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT id, invoice_number, amount, currency, due_date FROM invoices WHERE debtor_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map([id], |row| {
            Ok(Invoice {
                id: row.get(0)?,
                invoice_number: row.get(1)?,
                amount: row.get(2)?,
                currency: row.get(3)?,
                due_date: row.get(4)?,
            })
        })?;
        for row in rows {
            debtor.invoices.push(row?);
        }

        Ok(Some(debtor))
    }
}

#[async_trait]
impl CallRepository for SqliteRepository {
    async fn find_active_campaign(&self) -> Result<Option<Campaign>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE active = 1 ORDER BY id LIMIT 1");
        Ok(conn.query_row(&sql, [], campaign_from_row).optional()?)
    }

    async fn count_calls_by_status(&self, campaign_id: CampaignId, statuses: &[CallStatus]) -> Result<CallCounts> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT COUNT(*) FROM calls WHERE campaign_id = ?1 AND status = ?2")?;

        let mut counts = CallCounts::default();
        for status in statuses {
            let count: i64 = stmt.query_row(params![campaign_id, status], |row| row.get(0))?;
            counts.set(*status, count as usize);
        }
        Ok(counts)
    }

    async fn list_pending_calls(&self, campaign_id: CampaignId, limit: usize) -> Result<Vec<Call>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {CALL_COLUMNS} FROM calls WHERE campaign_id = ?1 AND status = ?2 AND triggered_at IS NULL \
             ORDER BY created_at, id LIMIT ?3"
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut calls = Self::query_calls(&conn, &sql, &[&campaign_id, &CallStatus::Pending, &limit])?;

        for call in &mut calls {
            call.debtor = Self::debtor_with_invoices(&conn, call.debtor_id)?;
        }
        Ok(calls)
    }

    async fn list_running_calls(&self, campaign_id: CampaignId) -> Result<Vec<Call>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {CALL_COLUMNS} FROM calls WHERE campaign_id = ?1 AND status = ?2 ORDER BY id");
        Self::query_calls(&conn, &sql, &[&campaign_id, &CallStatus::Running])
    }

    async fn list_stale_running_calls(&self, cutoff: DateTime<Utc>) -> Result<Vec<Call>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {CALL_COLUMNS} FROM calls \
             WHERE (status = ?1 OR (status = ?2 AND triggered_at IS NOT NULL)) \
             AND COALESCE(triggered_at, updated_at) < ?3 ORDER BY id"
        );
        Self::query_calls(&conn, &sql, &[&CallStatus::Running, &CallStatus::Pending, &to_ms(cutoff)])
    }

    async fn update_call(&self, id: CallId, update: &CallUpdate) -> Result<()> {
        if update.is_empty() {
            return Ok(());
        }

        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<SqlValue> = Vec::new();

        if let Some(status) = update.status {
            sets.push("status = ?");
            values.push(SqlValue::Text(status.as_str().to_string()));
        }
        if let Some(run_id) = &update.run_id {
            sets.push("run_id = ?");
            values.push(SqlValue::Text(run_id.clone()));
        }
        if let Some(at) = update.triggered_at {
            sets.push("triggered_at = ?");
            values.push(SqlValue::Integer(to_ms(at)));
        }
        if let Some(at) = update.completed_at {
            sets.push("completed_at = ?");
            values.push(SqlValue::Integer(to_ms(at)));
        }
        if let Some(outcome) = update.outcome {
            sets.push("outcome = ?");
            values.push(SqlValue::Text(outcome.as_str().to_string()));
        }
        if let Some(duration) = update.duration_secs {
            sets.push("duration_secs = ?");
            values.push(SqlValue::Integer(i64::from(duration)));
        }
        if let Some(summary) = &update.summary {
            sets.push("summary = ?");
            values.push(SqlValue::Text(summary.clone()));
        }
        if let Some(raw) = &update.raw_response {
            sets.push("raw_response = ?");
            values.push(SqlValue::Text(raw.clone()));
        }
        if let Some(error) = &update.error_message {
            sets.push("error_message = ?");
            values.push(SqlValue::Text(error.clone()));
        }

        sets.push("updated_at = ?");
        values.push(SqlValue::Integer(to_ms(Utc::now())));
        values.push(SqlValue::Integer(id));

        let sql = format!("UPDATE calls SET {} WHERE id = ?", sets.join(", "));
        let changed = self.conn()?.execute(&sql, params_from_iter(values.iter()))?;
        if changed == 0 {
            return Err(DialerError::CallNotFound(id));
        }
        Ok(())
    }

    async fn update_campaign(&self, id: CampaignId, update: &CampaignUpdate) -> Result<()> {
        if update.is_empty() {
            return Ok(());
        }

        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<SqlValue> = Vec::new();

        if let Some(status) = update.status {
            sets.push("status = ?");
            values.push(SqlValue::Text(status.as_str().to_string()));
        }
        if let Some(active) = update.active {
            sets.push("active = ?");
            values.push(SqlValue::Integer(i64::from(active)));
        }
        if let Some(paused) = update.paused {
            sets.push("paused = ?");
            values.push(SqlValue::Integer(i64::from(paused)));
        }
        if let Some(at) = update.started_at {
            sets.push("started_at = ?");
            values.push(SqlValue::Integer(to_ms(at)));
        }
        if let Some(at) = update.completed_at {
            sets.push("completed_at = ?");
            values.push(SqlValue::Integer(to_ms(at)));
        }

        values.push(SqlValue::Integer(id));

        let sql = format!("UPDATE campaigns SET {} WHERE id = ?", sets.join(", "));
        let changed = self.conn()?.execute(&sql, params_from_iter(values.iter()))?;
        if changed == 0 {
            return Err(DialerError::CampaignNotFound(id));
        }
        Ok(())
    }
}

fn to_ms(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_ms(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn campaign_from_row(row: &Row<'_>) -> rusqlite::Result<Campaign> {
    Ok(Campaign {
        id: row.get(0)?,
        name: row.get(1)?,
        active: row.get(2)?,
        paused: row.get(3)?,
        status: row.get(4)?,
        started_at: row.get::<_, Option<i64>>(5)?.map(from_ms),
        completed_at: row.get::<_, Option<i64>>(6)?.map(from_ms),
        created_at: from_ms(row.get(7)?),
    })
}

fn call_from_row(row: &Row<'_>) -> rusqlite::Result<Call> {
    Ok(Call {
        id: row.get(0)?,
        campaign_id: row.get(1)?,
        debtor_id: row.get(2)?,
        attempt: row.get(3)?,
        status: row.get(4)?,
        run_id: row.get(5)?,
        triggered_at: row.get::<_, Option<i64>>(6)?.map(from_ms),
        completed_at: row.get::<_, Option<i64>>(7)?.map(from_ms),
        outcome: row.get(8)?,
        duration_secs: row.get(9)?,
        summary: row.get(10)?,
        raw_response: row.get(11)?,
        error_message: row.get(12)?,
        created_at: from_ms(row.get(13)?),
        updated_at: from_ms(row.get(14)?),
        debtor: None,
    })
}

fn unknown_value(kind: &str, raw: &str) -> FromSqlError {
    FromSqlError::Other(format!("unknown {} '{}'", kind, raw).into())
}

impl ToSql for CallStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for CallStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        CallStatus::parse(raw).ok_or_else(|| unknown_value("call status", raw))
    }
}

impl FromSql for CampaignStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        CampaignStatus::parse(raw).ok_or_else(|| unknown_value("campaign status", raw))
    }
}

impl FromSql for OutcomeCode {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        OutcomeCode::parse(raw).ok_or_else(|| unknown_value("outcome", raw))
    }
}
