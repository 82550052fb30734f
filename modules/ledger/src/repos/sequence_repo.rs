//! Per-company document numbering.
//!
//! The counter row is locked `FOR UPDATE` while a number is issued, so two
//! concurrent transactions never hand out the same number.

use chrono::NaiveDate;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceKind {
    JournalEntry,
    Payment,
    Invoice,
}

impl SequenceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SequenceKind::JournalEntry => "journal_entry",
            SequenceKind::Payment => "payment",
            SequenceKind::Invoice => "invoice",
        }
    }

    pub fn prefix(self) -> &'static str {
        match self {
            SequenceKind::JournalEntry => "JE",
            SequenceKind::Payment => "PAY",
            SequenceKind::Invoice => "INV",
        }
    }
}

/// `JE-2026-000042`
pub fn format_number(kind: SequenceKind, date: NaiveDate, value: i64) -> String {
    format!("{}-{}-{:06}", kind.prefix(), date.format("%Y"), value)
}

/// Issue the next value for `(company_id, kind)`
pub async fn next_value_tx(
    tx: &mut Transaction<'_, Postgres>,
    company_id: Uuid,
    kind: SequenceKind,
) -> Result<i64, sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO number_sequences (company_id, kind, next_value)
        VALUES ($1, $2, 1)
        ON CONFLICT (company_id, kind) DO NOTHING
        "#,
    )
    .bind(company_id)
    .bind(kind.as_str())
    .execute(&mut **tx)
    .await?;

    let value: i64 = sqlx::query_scalar(
        "SELECT next_value FROM number_sequences WHERE company_id = $1 AND kind = $2 FOR UPDATE",
    )
    .bind(company_id)
    .bind(kind.as_str())
    .fetch_one(&mut **tx)
    .await?;

    sqlx::query(
        "UPDATE number_sequences SET next_value = next_value + 1 WHERE company_id = $1 AND kind = $2",
    )
    .bind(company_id)
    .bind(kind.as_str())
    .execute(&mut **tx)
    .await?;

    Ok(value)
}

/// Issue and format the next document number
pub async fn next_number_tx(
    tx: &mut Transaction<'_, Postgres>,
    company_id: Uuid,
    kind: SequenceKind,
    date: NaiveDate,
) -> Result<String, sqlx::Error> {
    let value = next_value_tx(tx, company_id, kind).await?;
    Ok(format_number(kind, date, value))
}
