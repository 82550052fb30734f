use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "payment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Void,
}

#[derive(Debug, Clone, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub company_id: Uuid,
    pub customer_id: Uuid,
    pub payment_number: String,
    pub payment_date: NaiveDate,
    pub method: String,
    pub reference: Option<String>,
    pub amount_minor: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub journal_entry_id: Option<Uuid>,
    pub void_reason: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayment<'a> {
    pub company_id: Uuid,
    pub customer_id: Uuid,
    pub payment_number: &'a str,
    pub payment_date: NaiveDate,
    pub method: &'a str,
    pub reference: Option<&'a str>,
    pub amount_minor: i64,
    pub currency: &'a str,
    pub created_by: Uuid,
}

const PAYMENT_COLUMNS: &str = r#"
    id, company_id, customer_id, payment_number, payment_date, method, reference,
    amount_minor, currency, status, journal_entry_id, void_reason, created_by, created_at
"#;

pub async fn insert_tx(
    tx: &mut Transaction<'_, Postgres>,
    payment: &NewPayment<'_>,
) -> Result<Payment, sqlx::Error> {
    sqlx::query_as::<_, Payment>(&format!(
        r#"
        INSERT INTO payments
            (id, company_id, customer_id, payment_number, payment_date, method, reference,
             amount_minor, currency, status, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'pending', $10)
        RETURNING {PAYMENT_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(payment.company_id)
    .bind(payment.customer_id)
    .bind(payment.payment_number)
    .bind(payment.payment_date)
    .bind(payment.method)
    .bind(payment.reference)
    .bind(payment.amount_minor)
    .bind(payment.currency)
    .bind(payment.created_by)
    .fetch_one(&mut **tx)
    .await
}

pub async fn find(
    pool: &PgPool,
    company_id: Uuid,
    payment_id: Uuid,
) -> Result<Option<Payment>, sqlx::Error> {
    sqlx::query_as::<_, Payment>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE company_id = $1 AND id = $2"
    ))
    .bind(company_id)
    .bind(payment_id)
    .fetch_optional(pool)
    .await
}

pub async fn lock_tx(
    tx: &mut Transaction<'_, Postgres>,
    company_id: Uuid,
    payment_id: Uuid,
) -> Result<Option<Payment>, sqlx::Error> {
    sqlx::query_as::<_, Payment>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE company_id = $1 AND id = $2 FOR UPDATE"
    ))
    .bind(company_id)
    .bind(payment_id)
    .fetch_optional(&mut **tx)
    .await
}

/// Unallocated amount of a customer's live payments
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct UnallocatedCash {
    pub currency: String,
    pub remaining_minor: i64,
}

/// Unallocated remainder of the customer's non-void payments, per currency
pub async fn unallocated_for_customer(
    pool: &PgPool,
    company_id: Uuid,
    customer_id: Uuid,
) -> Result<Vec<UnallocatedCash>, sqlx::Error> {
    sqlx::query_as::<_, UnallocatedCash>(
        r#"
        SELECT p.currency,
               COALESCE(SUM(p.amount_minor - COALESCE(a.allocated_minor, 0)), 0)::BIGINT
                   AS remaining_minor
        FROM payments p
        LEFT JOIN (
            SELECT payment_id, SUM(amount_minor) AS allocated_minor
            FROM payment_allocations
            WHERE reversed_at IS NULL
            GROUP BY payment_id
        ) a ON a.payment_id = p.id
        WHERE p.company_id = $1 AND p.customer_id = $2 AND p.status <> 'void'
        GROUP BY p.currency
        ORDER BY p.currency
        "#,
    )
    .bind(company_id)
    .bind(customer_id)
    .fetch_all(pool)
    .await
}

pub async fn update_status_tx(
    tx: &mut Transaction<'_, Postgres>,
    payment_id: Uuid,
    status: PaymentStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE payments SET status = $2, updated_at = NOW() WHERE id = $1")
        .bind(payment_id)
        .bind(status)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

pub async fn mark_void_tx(
    tx: &mut Transaction<'_, Postgres>,
    payment_id: Uuid,
    reason: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE payments SET status = 'void', void_reason = $2, updated_at = NOW() WHERE id = $1",
    )
    .bind(payment_id)
    .bind(reason)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

pub async fn set_journal_entry_tx(
    tx: &mut Transaction<'_, Postgres>,
    payment_id: Uuid,
    journal_entry_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE payments SET journal_entry_id = $2, updated_at = NOW() WHERE id = $1")
        .bind(payment_id)
        .bind(journal_entry_id)
        .execute(&mut **tx)
        .await?;

    Ok(())
}
