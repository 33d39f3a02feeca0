// 📒 Ledger Store - append-only SQLite ledger
//
// One row per deposit. Column layout:
//   id, tx_uuid, timestamp, date, depositor, operator, site,
//   w_<Category> ... (one per category, schema order)            -- v1
//   total_weight, total_paid, total_resale_revenue, gross_profit,
//   catalog_fingerprint, rate_<Category> ...                     -- v2
//
// The schema version lives in `PRAGMA user_version`. Older databases are
// migrated by adding the v2 columns (NULL for existing rows). The read path
// never migrates: it selects NULL for columns an older file does not have,
// and `TransactionRecord::restore` applies the fallback policy.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use log::{debug, info};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::category::{Category, CategoryMap};
use crate::error::{LedgerError, Result};
use crate::record::{RecordMeta, StoredRow, TransactionRecord, CURRENT_SCHEMA_VERSION};

const METADATA_COLUMNS: [&str; 6] = ["tx_uuid", "timestamp", "date", "depositor", "operator", "site"];
const FINANCIAL_COLUMNS: [&str; 5] = [
    "total_weight",
    "total_paid",
    "total_resale_revenue",
    "gross_profit",
    "catalog_fingerprint",
];

// ============================================================================
// FILTER
// ============================================================================

/// Restricts `all` to matching records. Default matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    /// Exact, case-sensitive operator match
    pub operator: Option<String>,
}

impl RecordFilter {
    pub fn operator(name: &str) -> Self {
        RecordFilter {
            operator: Some(name.to_string()),
        }
    }
}

// ============================================================================
// AUDIT LOG
// ============================================================================

/// How a row entered the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Built from a live deposit against a catalog
    Deposit,
    /// Carried over from an older ledger or the CSV logbook (no catalog fingerprint)
    Import,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Deposit => "deposit",
            EntryKind::Import => "import",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "deposit" => Some(EntryKind::Deposit),
            "import" => Some(EntryKind::Import),
            _ => None,
        }
    }

    fn of(record: &TransactionRecord) -> Self {
        if record.catalog_fingerprint().is_empty() {
            EntryKind::Import
        } else {
            EntryKind::Deposit
        }
    }
}

/// What the ledger looked like for one row at the moment it was appended.
/// Written in the same SQLite transaction as the row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub tx_uuid: String,
    pub kind: EntryKind,
    pub appended_at: DateTime<Utc>,
    pub operator: String,
    pub total_weight: f64,
    /// `None` when the row carried no recorded payout
    pub total_paid: Option<f64>,
    pub catalog_fingerprint: Option<String>,
}

impl AuditEntry {
    pub fn for_record(record: &TransactionRecord) -> Self {
        let fingerprint = record.catalog_fingerprint();
        AuditEntry {
            tx_uuid: record.id().to_string(),
            kind: EntryKind::of(record),
            appended_at: Utc::now(),
            operator: record.operator().to_string(),
            total_weight: record.total_weight(),
            total_paid: record.recorded_total_paid(),
            catalog_fingerprint: (!fingerprint.is_empty()).then(|| fingerprint.to_string()),
        }
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

/// Create tables on demand and migrate older layouts to the current version.
/// A no-op (beyond journal mode) once `user_version` is current.
pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    let version = schema_version(conn)?;
    if version >= CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    let existed = !table_columns(conn, "transactions")?.is_empty();
    let weight_columns: Vec<String> = Category::ALL
        .iter()
        .map(|c| format!("{} REAL NOT NULL DEFAULT 0", c.weight_column()))
        .collect();

    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tx_uuid TEXT UNIQUE,
                timestamp TEXT NOT NULL,
                date TEXT NOT NULL,
                depositor TEXT NOT NULL,
                operator TEXT NOT NULL,
                site TEXT NOT NULL,
                {}
            )",
            weight_columns.join(",\n                ")
        ),
        [],
    )?;

    // v1 -> v2: financial and payout-rate columns, nullable so older rows stay valid
    let existing = table_columns(conn, "transactions")?;
    let mut added = 0;
    let v2_columns = FINANCIAL_COLUMNS
        .iter()
        .map(|name| {
            let sql_type = if *name == "catalog_fingerprint" { "TEXT" } else { "REAL" };
            (name.to_string(), sql_type)
        })
        .chain(Category::ALL.iter().map(|c| (c.rate_column(), "REAL")));

    for (name, sql_type) in v2_columns {
        if !existing.contains(&name) {
            conn.execute(
                &format!("ALTER TABLE transactions ADD COLUMN {} {}", name, sql_type),
                [],
            )?;
            added += 1;
        }
    }

    conn.execute(
        "CREATE TABLE IF NOT EXISTS audit_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tx_uuid TEXT NOT NULL,
            kind TEXT NOT NULL,
            appended_at TEXT NOT NULL,
            operator TEXT NOT NULL,
            total_weight REAL NOT NULL,
            total_paid REAL,
            catalog_fingerprint TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_operator ON transactions(operator)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_audit_tx ON audit_log(tx_uuid)",
        [],
    )?;

    conn.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)?;

    if existed {
        info!(
            "ledger schema migrated from v{} to v{} ({} columns added)",
            version, CURRENT_SCHEMA_VERSION, added
        );
    }

    Ok(())
}

pub fn schema_version(conn: &Connection) -> Result<u32> {
    let version: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(version)
}

fn table_columns(conn: &Connection, table: &str) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<HashSet<_>, _>>()?;
    Ok(columns)
}

// ============================================================================
// WRITE PATH
// ============================================================================

/// Append one record and its audit entry atomically
pub fn insert_record(conn: &Connection, record: &TransactionRecord) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    insert_row(&tx, record)?;
    tx.commit()?;
    debug!("appended transaction {}", record.id());
    Ok(())
}

/// Append many records in one transaction; none are persisted if any fails
pub fn insert_records(conn: &Connection, records: &[TransactionRecord]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    for record in records {
        insert_row(&tx, record)?;
    }
    tx.commit()?;
    Ok(records.len())
}

fn insert_row(conn: &Connection, record: &TransactionRecord) -> Result<()> {
    let mut columns: Vec<String> = METADATA_COLUMNS.iter().map(|c| c.to_string()).collect();
    let mut values: Vec<Value> = vec![
        Value::Text(record.id().to_string()),
        Value::Text(record.timestamp().to_rfc3339()),
        Value::Text(record.date().format("%Y-%m-%d").to_string()),
        Value::Text(record.depositor().to_string()),
        Value::Text(record.operator().to_string()),
        Value::Text(record.site().to_string()),
    ];

    for category in Category::ALL {
        columns.push(category.weight_column());
        values.push(Value::Real(record.weight(category)));
    }

    // Each total is written only if it was recorded; a fallback zero stays
    // NULL so it remains distinguishable from a real zero on the next read.
    let fingerprint = record.catalog_fingerprint();
    columns.extend(FINANCIAL_COLUMNS.iter().map(|c| c.to_string()));
    values.push(Value::Real(record.total_weight()));
    values.push(optional_real(record.recorded_total_paid()));
    values.push(optional_real(record.recorded_total_resale_revenue()));
    values.push(optional_real(record.recorded_gross_profit()));
    values.push(if fingerprint.is_empty() {
        Value::Null
    } else {
        Value::Text(fingerprint.to_string())
    });

    for (category, rate) in record.payout_rate_by_category() {
        columns.push(category.rate_column());
        values.push(Value::Real(*rate));
    }

    let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{}", i)).collect();
    conn.execute(
        &format!(
            "INSERT INTO transactions ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        ),
        params_from_iter(values.iter()),
    )?;

    insert_audit_entry(conn, &AuditEntry::for_record(record))
}

fn optional_real(value: Option<f64>) -> Value {
    value.map(Value::Real).unwrap_or(Value::Null)
}

pub fn insert_audit_entry(conn: &Connection, entry: &AuditEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO audit_log (
            tx_uuid, kind, appended_at, operator, total_weight, total_paid, catalog_fingerprint
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            entry.tx_uuid,
            entry.kind.as_str(),
            entry.appended_at.to_rfc3339(),
            entry.operator,
            entry.total_weight,
            entry.total_paid,
            entry.catalog_fingerprint,
        ],
    )?;

    Ok(())
}

// ============================================================================
// READ PATH
// ============================================================================

/// Every record in insertion order, optionally filtered by operator.
/// Columns missing from an older table are read as NULL.
pub fn get_all_records(conn: &Connection, filter: &RecordFilter) -> Result<Vec<TransactionRecord>> {
    let existing = table_columns(conn, "transactions")?;
    if existing.is_empty() {
        return Ok(Vec::new());
    }

    let select = |name: &str| -> String {
        if existing.contains(name) {
            name.to_string()
        } else {
            format!("NULL AS {}", name)
        }
    };

    let mut columns: Vec<String> = vec!["id".to_string()];
    columns.extend(METADATA_COLUMNS.iter().map(|c| select(*c)));
    columns.extend(Category::ALL.iter().map(|c| select(c.weight_column().as_str())));
    columns.extend(FINANCIAL_COLUMNS.iter().map(|c| select(*c)));
    columns.extend(Category::ALL.iter().map(|c| select(c.rate_column().as_str())));

    let mut sql = format!("SELECT {} FROM transactions", columns.join(", "));
    let mut args: Vec<Value> = Vec::new();
    if let Some(operator) = &filter.operator {
        sql.push_str(" WHERE operator = ?1");
        args.push(Value::Text(operator.clone()));
    }
    sql.push_str(" ORDER BY id ASC");

    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map(params_from_iter(args.iter()), row_to_record)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(records)
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<TransactionRecord> {
    let row_id: i64 = row.get(0)?;
    let tx_uuid: Option<String> = row.get(1)?;
    let timestamp_str: Option<String> = row.get(2)?;
    let date_str: Option<String> = row.get(3)?;

    let date = date_str
        .as_deref()
        .and_then(parse_date)
        .ok_or_else(|| conversion_error(3, format!("row {}: bad date {:?}", row_id, date_str)))?;
    let timestamp = timestamp_str
        .as_deref()
        .and_then(parse_timestamp)
        .unwrap_or_else(|| midnight_utc(date));

    let meta = RecordMeta {
        date,
        depositor: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        operator: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        site: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
    };

    let weight_base = 1 + METADATA_COLUMNS.len();
    let mut weights = CategoryMap::new();
    for (i, category) in Category::ALL.iter().enumerate() {
        let weight: Option<f64> = row.get(weight_base + i)?;
        weights.insert(*category, weight.unwrap_or(0.0));
    }

    // total_weight (financial column 0) is recomputed, not read
    let fin_base = weight_base + Category::ALL.len();
    let total_paid: Option<f64> = row.get(fin_base + 1)?;
    let total_resale_revenue: Option<f64> = row.get(fin_base + 2)?;
    let gross_profit: Option<f64> = row.get(fin_base + 3)?;
    let catalog_fingerprint: Option<String> = row.get(fin_base + 4)?;

    let rate_base = fin_base + FINANCIAL_COLUMNS.len();
    let mut payout_rates = CategoryMap::new();
    for (i, category) in Category::ALL.iter().enumerate() {
        if let Some(rate) = row.get::<_, Option<f64>>(rate_base + i)? {
            payout_rates.insert(*category, rate);
        }
    }

    Ok(TransactionRecord::restore(StoredRow {
        id: tx_uuid.unwrap_or_else(|| format!("legacy-{}", row_id)),
        timestamp,
        meta,
        weights,
        payout_rates,
        total_paid,
        total_resale_revenue,
        gross_profit,
        catalog_fingerprint,
    }))
}

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        Box::new(LedgerError::Storage(message)),
    )
}

pub fn count_records(conn: &Connection) -> Result<i64> {
    if table_columns(conn, "transactions")?.is_empty() {
        return Ok(0);
    }
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
    Ok(count)
}

/// Audit entries, oldest first: for one record, or the whole log when `tx_uuid` is `None`
pub fn get_audit_trail(conn: &Connection, tx_uuid: Option<&str>) -> Result<Vec<AuditEntry>> {
    if table_columns(conn, "audit_log")?.is_empty() {
        return Ok(Vec::new());
    }

    let mut sql = String::from(
        "SELECT tx_uuid, kind, appended_at, operator, total_weight, total_paid, catalog_fingerprint
         FROM audit_log",
    );
    let mut args: Vec<Value> = Vec::new();
    if let Some(tx_uuid) = tx_uuid {
        sql.push_str(" WHERE tx_uuid = ?1");
        args.push(Value::Text(tx_uuid.to_string()));
    }
    sql.push_str(" ORDER BY id ASC");

    let mut stmt = conn.prepare(&sql)?;
    let entries = stmt
        .query_map(params_from_iter(args.iter()), |row| {
            let kind_str: String = row.get(1)?;
            let appended_str: String = row.get(2)?;

            Ok(AuditEntry {
                tx_uuid: row.get(0)?,
                kind: EntryKind::parse(&kind_str)
                    .ok_or_else(|| conversion_error(1, format!("unknown entry kind {}", kind_str)))?,
                appended_at: parse_timestamp(&appended_str)
                    .ok_or_else(|| conversion_error(2, format!("bad timestamp {}", appended_str)))?,
                operator: row.get(3)?,
                total_weight: row.get(4)?,
                total_paid: row.get(5)?,
                catalog_fingerprint: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(entries)
}

// ============================================================================
// DATE PARSING (shared with the legacy CSV importer)
// ============================================================================

/// RFC 3339, or a naive `YYYY-MM-DD HH:MM:SS[.f]` taken as UTC
pub(crate) fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// `YYYY-MM-DD`, tolerating a trailing time part
pub(crate) fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| s.get(..10).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()))
}

pub(crate) fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or_default()
}

// ============================================================================
// LEDGER STORE (file-backed)
// ============================================================================

pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        LedgerStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open for writing, creating the file and schema on first use
    fn open_for_write(&self) -> Result<Connection> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| LedgerError::Storage(format!("{}: {}", parent.display(), e)))?;
            }
        }
        let conn = Connection::open(&self.path)?;
        setup_database(&conn)?;
        Ok(conn)
    }

    /// `None` when the ledger file does not exist yet
    fn open_for_read(&self) -> Result<Option<Connection>> {
        if !self.path.exists() {
            return Ok(None);
        }
        Ok(Some(Connection::open(&self.path)?))
    }

    /// Durably append one record (all columns or nothing)
    pub fn append(&self, record: &TransactionRecord) -> Result<()> {
        let conn = self.open_for_write()?;
        insert_record(&conn, record)?;
        info!(
            "recorded {} ({:.1} kg, paid {:.0}) by {}",
            record.id(),
            record.total_weight(),
            record.total_paid(),
            record.operator()
        );
        Ok(())
    }

    /// Append a batch atomically
    pub fn append_all(&self, records: &[TransactionRecord]) -> Result<usize> {
        let conn = self.open_for_write()?;
        insert_records(&conn, records)
    }

    /// All records, optionally filtered. Empty when the ledger does not exist.
    pub fn all(&self, filter: &RecordFilter) -> Result<Vec<TransactionRecord>> {
        match self.open_for_read()? {
            Some(conn) => get_all_records(&conn, filter),
            None => Ok(Vec::new()),
        }
    }

    pub fn count(&self) -> Result<i64> {
        match self.open_for_read()? {
            Some(conn) => count_records(&conn),
            None => Ok(0),
        }
    }

    /// Audit entries for one record; pass `None` for the whole log
    pub fn audit_trail(&self, record_id: Option<&str>) -> Result<Vec<AuditEntry>> {
        match self.open_for_read()? {
            Some(conn) => get_audit_trail(&conn, record_id),
            None => Ok(Vec::new()),
        }
    }
}
