//! Repository for accounting period operations
//!
//! Provides database access for accounting periods to support closed-period governance.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Postgres, Transaction};
use thiserror::Error;
use uuid::Uuid;

/// open ⇄ closed → locked (locked is permanent)
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "period_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PeriodStatus {
    Open,
    Closed,
    Locked,
}

impl PeriodStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PeriodStatus::Open => "open",
            PeriodStatus::Closed => "closed",
            PeriodStatus::Locked => "locked",
        }
    }
}

/// Accounting period model representing a fiscal/accounting period
#[derive(Debug, Clone, FromRow)]
pub struct AccountingPeriod {
    pub id: Uuid,
    pub company_id: Uuid,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub status: PeriodStatus,
    pub closed_by: Option<Uuid>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Errors that can occur when resolving the period for a posting date
#[derive(Debug, Error)]
pub enum PeriodError {
    #[error("No accounting period found for company_id={company_id}, date={date}")]
    NoPeriodForDate { company_id: Uuid, date: NaiveDate },

    #[error("Accounting period is {}: company_id={company_id}, date={date}, period_id={period_id}", status.as_str())]
    PeriodClosed {
        company_id: Uuid,
        date: NaiveDate,
        period_id: Uuid,
        status: PeriodStatus,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

const PERIOD_COLUMNS: &str =
    "id, company_id, period_start, period_end, status, closed_by, closed_at, created_at";

/// Find the period containing `date`, holding a share lock so it cannot be
/// closed until the posting transaction ends
pub async fn find_by_date_tx(
    tx: &mut Transaction<'_, Postgres>,
    company_id: Uuid,
    date: NaiveDate,
) -> Result<Option<AccountingPeriod>, PeriodError> {
    let period = sqlx::query_as::<_, AccountingPeriod>(&format!(
        r#"
        SELECT {PERIOD_COLUMNS}
        FROM accounting_periods
        WHERE company_id = $1
          AND period_start <= $2
          AND period_end >= $2
        LIMIT 1
        FOR SHARE
        "#
    ))
    .bind(company_id)
    .bind(date)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(period)
}

/// Validate that a date falls within an open accounting period within a transaction
/// Returns error if no period exists for the date or if the period is closed or locked
pub async fn validate_posting_date_tx(
    tx: &mut Transaction<'_, Postgres>,
    company_id: Uuid,
    date: NaiveDate,
) -> Result<AccountingPeriod, PeriodError> {
    let period = find_by_date_tx(tx, company_id, date).await?;

    match period {
        None => Err(PeriodError::NoPeriodForDate { company_id, date }),
        Some(p) if p.status != PeriodStatus::Open => Err(PeriodError::PeriodClosed {
            company_id,
            date,
            period_id: p.id,
            status: p.status,
        }),
        Some(p) => Ok(p),
    }
}

pub async fn insert_tx(
    tx: &mut Transaction<'_, Postgres>,
    company_id: Uuid,
    period_start: NaiveDate,
    period_end: NaiveDate,
) -> Result<AccountingPeriod, sqlx::Error> {
    sqlx::query_as::<_, AccountingPeriod>(&format!(
        r#"
        INSERT INTO accounting_periods (id, company_id, period_start, period_end, status)
        VALUES ($1, $2, $3, $4, 'open')
        RETURNING {PERIOD_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(company_id)
    .bind(period_start)
    .bind(period_end)
    .fetch_one(&mut **tx)
    .await
}

/// Any existing period for the company intersecting [start, end]
pub async fn find_overlapping_tx(
    tx: &mut Transaction<'_, Postgres>,
    company_id: Uuid,
    period_start: NaiveDate,
    period_end: NaiveDate,
) -> Result<Option<AccountingPeriod>, sqlx::Error> {
    sqlx::query_as::<_, AccountingPeriod>(&format!(
        r#"
        SELECT {PERIOD_COLUMNS}
        FROM accounting_periods
        WHERE company_id = $1
          AND period_start <= $3
          AND period_end >= $2
        LIMIT 1
        "#
    ))
    .bind(company_id)
    .bind(period_start)
    .bind(period_end)
    .fetch_optional(&mut **tx)
    .await
}

pub async fn lock_by_id_tx(
    tx: &mut Transaction<'_, Postgres>,
    company_id: Uuid,
    period_id: Uuid,
) -> Result<Option<AccountingPeriod>, sqlx::Error> {
    sqlx::query_as::<_, AccountingPeriod>(&format!(
        "SELECT {PERIOD_COLUMNS} FROM accounting_periods WHERE company_id = $1 AND id = $2 FOR UPDATE"
    ))
    .bind(company_id)
    .bind(period_id)
    .fetch_optional(&mut **tx)
    .await
}

/// Set status; `closed_by`/`closed_at` are stamped when leaving open and
/// cleared when reopening
pub async fn update_status_tx(
    tx: &mut Transaction<'_, Postgres>,
    period_id: Uuid,
    status: PeriodStatus,
    actor_id: Uuid,
) -> Result<AccountingPeriod, sqlx::Error> {
    sqlx::query_as::<_, AccountingPeriod>(&format!(
        r#"
        UPDATE accounting_periods
        SET status = $2,
            closed_by = CASE WHEN $2 = 'open'::period_status THEN NULL ELSE COALESCE(closed_by, $3) END,
            closed_at = CASE WHEN $2 = 'open'::period_status THEN NULL ELSE COALESCE(closed_at, NOW()) END
        WHERE id = $1
        RETURNING {PERIOD_COLUMNS}
        "#
    ))
    .bind(period_id)
    .bind(status)
    .bind(actor_id)
    .fetch_one(&mut **tx)
    .await
}

/// Serialize period creation per company so overlap checks cannot race
pub async fn lock_company_periods_tx(
    tx: &mut Transaction<'_, Postgres>,
    company_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
        .bind(company_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}
