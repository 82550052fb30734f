//! Payment → invoice allocation rows.
//!
//! Reversal stamps `reversed_at`/`reversed_by`/`reversal_reason`; the
//! amount is never touched, so "active" always means `reversed_at IS NULL`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "allocation_method", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AllocationMethod {
    Manual,
    Automatic,
}

impl AllocationMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            AllocationMethod::Manual => "manual",
            AllocationMethod::Automatic => "automatic",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct PaymentAllocation {
    pub id: Uuid,
    pub company_id: Uuid,
    pub payment_id: Uuid,
    pub invoice_id: Uuid,
    pub amount_minor: i64,
    pub method: AllocationMethod,
    pub strategy: Option<String>,
    pub journal_entry_id: Option<Uuid>,
    pub reversed_at: Option<DateTime<Utc>>,
    pub reversed_by: Option<Uuid>,
    pub reversal_reason: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl PaymentAllocation {
    pub fn is_reversed(&self) -> bool {
        self.reversed_at.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct NewAllocation<'a> {
    pub company_id: Uuid,
    pub payment_id: Uuid,
    pub invoice_id: Uuid,
    pub amount_minor: i64,
    pub method: AllocationMethod,
    pub strategy: Option<&'a str>,
    pub created_by: Uuid,
}

const ALLOCATION_COLUMNS: &str = r#"
    id, company_id, payment_id, invoice_id, amount_minor, method, strategy,
    journal_entry_id, reversed_at, reversed_by, reversal_reason, created_by, created_at
"#;

pub async fn insert_tx(
    tx: &mut Transaction<'_, Postgres>,
    allocation: &NewAllocation<'_>,
) -> Result<PaymentAllocation, sqlx::Error> {
    sqlx::query_as::<_, PaymentAllocation>(&format!(
        r#"
        INSERT INTO payment_allocations
            (id, company_id, payment_id, invoice_id, amount_minor, method, strategy, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {ALLOCATION_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(allocation.company_id)
    .bind(allocation.payment_id)
    .bind(allocation.invoice_id)
    .bind(allocation.amount_minor)
    .bind(allocation.method)
    .bind(allocation.strategy)
    .bind(allocation.created_by)
    .fetch_one(&mut **tx)
    .await
}

pub async fn lock_tx(
    tx: &mut Transaction<'_, Postgres>,
    company_id: Uuid,
    allocation_id: Uuid,
) -> Result<Option<PaymentAllocation>, sqlx::Error> {
    sqlx::query_as::<_, PaymentAllocation>(&format!(
        "SELECT {ALLOCATION_COLUMNS} FROM payment_allocations WHERE company_id = $1 AND id = $2 FOR UPDATE"
    ))
    .bind(company_id)
    .bind(allocation_id)
    .fetch_optional(&mut **tx)
    .await
}

pub async fn list_for_payment(
    pool: &PgPool,
    company_id: Uuid,
    payment_id: Uuid,
) -> Result<Vec<PaymentAllocation>, sqlx::Error> {
    sqlx::query_as::<_, PaymentAllocation>(&format!(
        r#"
        SELECT {ALLOCATION_COLUMNS} FROM payment_allocations
        WHERE company_id = $1 AND payment_id = $2
        ORDER BY created_at, id
        "#
    ))
    .bind(company_id)
    .bind(payment_id)
    .fetch_all(pool)
    .await
}

/// Active allocations of a payment, locked
pub async fn lock_active_for_payment_tx(
    tx: &mut Transaction<'_, Postgres>,
    company_id: Uuid,
    payment_id: Uuid,
) -> Result<Vec<PaymentAllocation>, sqlx::Error> {
    sqlx::query_as::<_, PaymentAllocation>(&format!(
        r#"
        SELECT {ALLOCATION_COLUMNS} FROM payment_allocations
        WHERE company_id = $1 AND payment_id = $2 AND reversed_at IS NULL
        ORDER BY id
        FOR UPDATE
        "#
    ))
    .bind(company_id)
    .bind(payment_id)
    .fetch_all(&mut **tx)
    .await
}

/// Payments with an active allocation on the invoice, in id order
pub async fn active_payment_ids_for_invoice_tx(
    tx: &mut Transaction<'_, Postgres>,
    company_id: Uuid,
    invoice_id: Uuid,
) -> Result<Vec<Uuid>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT DISTINCT payment_id FROM payment_allocations
        WHERE company_id = $1 AND invoice_id = $2 AND reversed_at IS NULL
        ORDER BY payment_id
        "#,
    )
    .bind(company_id)
    .bind(invoice_id)
    .fetch_all(&mut **tx)
    .await
}

/// Lock the invoice's active allocations from `payment_ids`, newest first.
/// Callers must already hold the payment locks.
pub async fn lock_active_for_invoice_tx(
    tx: &mut Transaction<'_, Postgres>,
    company_id: Uuid,
    invoice_id: Uuid,
    payment_ids: &[Uuid],
) -> Result<Vec<PaymentAllocation>, sqlx::Error> {
    sqlx::query_as::<_, PaymentAllocation>(&format!(
        r#"
        SELECT {ALLOCATION_COLUMNS} FROM payment_allocations
        WHERE company_id = $1
          AND invoice_id = $2
          AND payment_id = ANY($3)
          AND reversed_at IS NULL
        ORDER BY created_at DESC, id DESC
        FOR UPDATE
        "#
    ))
    .bind(company_id)
    .bind(invoice_id)
    .bind(payment_ids)
    .fetch_all(&mut **tx)
    .await
}

pub async fn sum_active_for_payment_tx(
    tx: &mut Transaction<'_, Postgres>,
    payment_id: Uuid,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(amount_minor), 0)::BIGINT
        FROM payment_allocations
        WHERE payment_id = $1 AND reversed_at IS NULL
        "#,
    )
    .bind(payment_id)
    .fetch_one(&mut **tx)
    .await
}

pub async fn sum_active_for_invoice_tx(
    tx: &mut Transaction<'_, Postgres>,
    invoice_id: Uuid,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(amount_minor), 0)::BIGINT
        FROM payment_allocations
        WHERE invoice_id = $1 AND reversed_at IS NULL
        "#,
    )
    .bind(invoice_id)
    .fetch_one(&mut **tx)
    .await
}

pub async fn mark_reversed_tx(
    tx: &mut Transaction<'_, Postgres>,
    allocation_id: Uuid,
    reversed_by: Uuid,
    reason: &str,
) -> Result<PaymentAllocation, sqlx::Error> {
    sqlx::query_as::<_, PaymentAllocation>(&format!(
        r#"
        UPDATE payment_allocations
        SET reversed_at = NOW(), reversed_by = $2, reversal_reason = $3
        WHERE id = $1 AND reversed_at IS NULL
        RETURNING {ALLOCATION_COLUMNS}
        "#
    ))
    .bind(allocation_id)
    .bind(reversed_by)
    .bind(reason)
    .fetch_one(&mut **tx)
    .await
}

pub async fn set_journal_entry_tx(
    tx: &mut Transaction<'_, Postgres>,
    allocation_id: Uuid,
    journal_entry_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE payment_allocations SET journal_entry_id = $2 WHERE id = $1")
        .bind(allocation_id)
        .bind(journal_entry_id)
        .execute(&mut **tx)
        .await?;

    Ok(())
}
