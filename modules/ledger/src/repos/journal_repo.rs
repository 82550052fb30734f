use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::validation::LineAmounts;

/// Lifecycle of a journal entry: draft → posted → void (or draft → void)
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "journal_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JournalStatus {
    Draft,
    Posted,
    Void,
}

/// Journal entry header
#[derive(Debug, Clone, FromRow)]
pub struct JournalEntry {
    pub id: Uuid,
    pub company_id: Uuid,
    pub entry_number: String,
    pub entry_date: NaiveDate,
    pub description: String,
    pub status: JournalStatus,
    pub currency: String,
    pub created_by: Uuid,
    pub posted_by: Option<Uuid>,
    pub posted_at: Option<DateTime<Utc>>,
    pub voided_by: Option<Uuid>,
    pub voided_at: Option<DateTime<Utc>>,
    pub void_reason: Option<String>,
    pub reverses_entry_id: Option<Uuid>,
    pub reversed_by_entry_id: Option<Uuid>,
    pub source_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Journal line
#[derive(Debug, Clone, FromRow)]
pub struct JournalLine {
    pub id: Uuid,
    pub journal_entry_id: Uuid,
    pub line_no: i32,
    pub account_id: Uuid,
    pub debit_minor: i64,
    pub credit_minor: i64,
    pub memo: Option<String>,
}

impl JournalLine {
    pub fn amounts(&self) -> LineAmounts {
        LineAmounts {
            debit_minor: self.debit_minor,
            credit_minor: self.credit_minor,
        }
    }
}

/// Header fields supplied on insert; status always starts as draft
#[derive(Debug, Clone)]
pub struct NewJournalEntry<'a> {
    pub id: Uuid,
    pub company_id: Uuid,
    pub entry_number: &'a str,
    pub entry_date: NaiveDate,
    pub description: &'a str,
    pub currency: &'a str,
    pub created_by: Uuid,
    pub reverses_entry_id: Option<Uuid>,
    pub source_key: Option<&'a str>,
}

/// Line data for bulk insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalLineInsert {
    pub id: Uuid,
    pub line_no: i32,
    pub account_id: Uuid,
    pub debit_minor: i64,
    pub credit_minor: i64,
    pub memo: Option<String>,
}

const ENTRY_COLUMNS: &str = r#"
    id, company_id, entry_number, entry_date, description, status, currency,
    created_by, posted_by, posted_at, voided_by, voided_at, void_reason,
    reverses_entry_id, reversed_by_entry_id, source_key, created_at
"#;

/// Insert a journal entry header as draft
pub async fn insert_entry(
    tx: &mut Transaction<'_, Postgres>,
    entry: &NewJournalEntry<'_>,
) -> Result<Uuid, sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO journal_entries
            (id, company_id, entry_number, entry_date, description, status,
             currency, created_by, reverses_entry_id, source_key)
        VALUES ($1, $2, $3, $4, $5, 'draft', $6, $7, $8, $9)
        "#,
    )
    .bind(entry.id)
    .bind(entry.company_id)
    .bind(entry.entry_number)
    .bind(entry.entry_date)
    .bind(entry.description)
    .bind(entry.currency)
    .bind(entry.created_by)
    .bind(entry.reverses_entry_id)
    .bind(entry.source_key)
    .execute(&mut **tx)
    .await?;

    Ok(entry.id)
}

/// Insert journal lines for an entry
pub async fn bulk_insert_lines(
    tx: &mut Transaction<'_, Postgres>,
    entry_id: Uuid,
    lines: &[JournalLineInsert],
) -> Result<(), sqlx::Error> {
    for line in lines {
        sqlx::query(
            r#"
            INSERT INTO journal_lines
                (id, journal_entry_id, line_no, account_id, debit_minor, credit_minor, memo)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(line.id)
        .bind(entry_id)
        .bind(line.line_no)
        .bind(line.account_id)
        .bind(line.debit_minor)
        .bind(line.credit_minor)
        .bind(line.memo.as_deref())
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

/// Fetch an entry header scoped to the company
pub async fn find_entry(
    pool: &PgPool,
    company_id: Uuid,
    entry_id: Uuid,
) -> Result<Option<JournalEntry>, sqlx::Error> {
    sqlx::query_as::<_, JournalEntry>(&format!(
        "SELECT {ENTRY_COLUMNS} FROM journal_entries WHERE company_id = $1 AND id = $2"
    ))
    .bind(company_id)
    .bind(entry_id)
    .fetch_optional(pool)
    .await
}

/// Lock an entry row for the rest of the transaction
pub async fn lock_entry_tx(
    tx: &mut Transaction<'_, Postgres>,
    company_id: Uuid,
    entry_id: Uuid,
) -> Result<Option<JournalEntry>, sqlx::Error> {
    sqlx::query_as::<_, JournalEntry>(&format!(
        "SELECT {ENTRY_COLUMNS} FROM journal_entries WHERE company_id = $1 AND id = $2 FOR UPDATE"
    ))
    .bind(company_id)
    .bind(entry_id)
    .fetch_optional(&mut **tx)
    .await
}

/// Look up a system-generated entry by its source key
pub async fn find_by_source_key_tx(
    tx: &mut Transaction<'_, Postgres>,
    company_id: Uuid,
    source_key: &str,
) -> Result<Option<JournalEntry>, sqlx::Error> {
    sqlx::query_as::<_, JournalEntry>(&format!(
        "SELECT {ENTRY_COLUMNS} FROM journal_entries WHERE company_id = $1 AND source_key = $2"
    ))
    .bind(company_id)
    .bind(source_key)
    .fetch_optional(&mut **tx)
    .await
}

const LINE_QUERY: &str = r#"
    SELECT id, journal_entry_id, line_no, account_id, debit_minor, credit_minor, memo
    FROM journal_lines
    WHERE journal_entry_id = $1
    ORDER BY line_no
"#;

pub async fn fetch_lines(pool: &PgPool, entry_id: Uuid) -> Result<Vec<JournalLine>, sqlx::Error> {
    sqlx::query_as::<_, JournalLine>(LINE_QUERY)
        .bind(entry_id)
        .fetch_all(pool)
        .await
}

pub async fn fetch_lines_tx(
    tx: &mut Transaction<'_, Postgres>,
    entry_id: Uuid,
) -> Result<Vec<JournalLine>, sqlx::Error> {
    sqlx::query_as::<_, JournalLine>(LINE_QUERY)
        .bind(entry_id)
        .fetch_all(&mut **tx)
        .await
}

/// draft → posted
pub async fn mark_posted_tx(
    tx: &mut Transaction<'_, Postgres>,
    entry_id: Uuid,
    posted_by: Uuid,
    posted_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE journal_entries
        SET status = 'posted', posted_by = $2, posted_at = $3
        WHERE id = $1 AND status = 'draft'
        "#,
    )
    .bind(entry_id)
    .bind(posted_by)
    .bind(posted_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// draft/posted → void
pub async fn mark_void_tx(
    tx: &mut Transaction<'_, Postgres>,
    entry_id: Uuid,
    voided_by: Uuid,
    reason: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE journal_entries
        SET status = 'void', voided_by = $2, voided_at = NOW(), void_reason = $3
        WHERE id = $1 AND status <> 'void'
        "#,
    )
    .bind(entry_id)
    .bind(voided_by)
    .bind(reason)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Record which entry reversed the original
pub async fn link_reversal_tx(
    tx: &mut Transaction<'_, Postgres>,
    original_id: Uuid,
    reversal_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE journal_entries
        SET reversed_by_entry_id = $2
        WHERE id = $1 AND reversed_by_entry_id IS NULL
        "#,
    )
    .bind(original_id)
    .bind(reversal_id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
