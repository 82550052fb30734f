use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "invoice_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Partial,
    Paid,
    Void,
}

impl InvoiceStatus {
    /// Only these may receive allocations
    pub fn is_payable(self) -> bool {
        matches!(self, InvoiceStatus::Sent | InvoiceStatus::Partial)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Partial => "partial",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Void => "void",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Invoice {
    pub id: Uuid,
    pub company_id: Uuid,
    pub customer_id: Uuid,
    pub invoice_number: String,
    pub currency: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub total_minor: i64,
    pub paid_minor: i64,
    pub balance_minor: i64,
    pub status: InvoiceStatus,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewInvoice<'a> {
    pub company_id: Uuid,
    pub customer_id: Uuid,
    pub invoice_number: &'a str,
    pub currency: &'a str,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub total_minor: i64,
    pub created_by: Uuid,
}

const INVOICE_COLUMNS: &str = r#"
    id, company_id, customer_id, invoice_number, currency, issue_date, due_date,
    total_minor, paid_minor, balance_minor, status, created_by, created_at
"#;

pub async fn insert_tx(
    tx: &mut Transaction<'_, Postgres>,
    invoice: &NewInvoice<'_>,
) -> Result<Invoice, sqlx::Error> {
    sqlx::query_as::<_, Invoice>(&format!(
        r#"
        INSERT INTO invoices
            (id, company_id, customer_id, invoice_number, currency, issue_date, due_date,
             total_minor, paid_minor, balance_minor, status, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, $8, 'draft', $9)
        RETURNING {INVOICE_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(invoice.company_id)
    .bind(invoice.customer_id)
    .bind(invoice.invoice_number)
    .bind(invoice.currency)
    .bind(invoice.issue_date)
    .bind(invoice.due_date)
    .bind(invoice.total_minor)
    .bind(invoice.created_by)
    .fetch_one(&mut **tx)
    .await
}

pub async fn find(
    pool: &PgPool,
    company_id: Uuid,
    invoice_id: Uuid,
) -> Result<Option<Invoice>, sqlx::Error> {
    sqlx::query_as::<_, Invoice>(&format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices WHERE company_id = $1 AND id = $2"
    ))
    .bind(company_id)
    .bind(invoice_id)
    .fetch_optional(pool)
    .await
}

pub async fn find_tx(
    tx: &mut Transaction<'_, Postgres>,
    company_id: Uuid,
    invoice_id: Uuid,
) -> Result<Option<Invoice>, sqlx::Error> {
    sqlx::query_as::<_, Invoice>(&format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices WHERE company_id = $1 AND id = $2"
    ))
    .bind(company_id)
    .bind(invoice_id)
    .fetch_optional(&mut **tx)
    .await
}

pub async fn lock_tx(
    tx: &mut Transaction<'_, Postgres>,
    company_id: Uuid,
    invoice_id: Uuid,
) -> Result<Option<Invoice>, sqlx::Error> {
    sqlx::query_as::<_, Invoice>(&format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices WHERE company_id = $1 AND id = $2 FOR UPDATE"
    ))
    .bind(company_id)
    .bind(invoice_id)
    .fetch_optional(&mut **tx)
    .await
}

/// Lock several invoices in id order. Ids belonging to another company are
/// simply absent from the result.
pub async fn lock_many_tx(
    tx: &mut Transaction<'_, Postgres>,
    company_id: Uuid,
    invoice_ids: &[Uuid],
) -> Result<Vec<Invoice>, sqlx::Error> {
    sqlx::query_as::<_, Invoice>(&format!(
        r#"
        SELECT {INVOICE_COLUMNS} FROM invoices
        WHERE company_id = $1 AND id = ANY($2)
        ORDER BY id
        FOR UPDATE
        "#
    ))
    .bind(company_id)
    .bind(invoice_ids)
    .fetch_all(&mut **tx)
    .await
}

/// Open invoices of a customer in one currency, oldest due date first
pub async fn list_open_for_customer_tx(
    tx: &mut Transaction<'_, Postgres>,
    company_id: Uuid,
    customer_id: Uuid,
    currency: &str,
) -> Result<Vec<Invoice>, sqlx::Error> {
    sqlx::query_as::<_, Invoice>(&format!(
        r#"
        SELECT {INVOICE_COLUMNS} FROM invoices
        WHERE company_id = $1
          AND customer_id = $2
          AND currency = $3
          AND status IN ('sent', 'partial')
          AND balance_minor > 0
        ORDER BY due_date, issue_date, invoice_number
        "#
    ))
    .bind(company_id)
    .bind(customer_id)
    .bind(currency)
    .fetch_all(&mut **tx)
    .await
}

/// Every currency's open invoices of a customer, oldest due date first
pub async fn list_open_for_customer(
    pool: &PgPool,
    company_id: Uuid,
    customer_id: Uuid,
) -> Result<Vec<Invoice>, sqlx::Error> {
    sqlx::query_as::<_, Invoice>(&format!(
        r#"
        SELECT {INVOICE_COLUMNS} FROM invoices
        WHERE company_id = $1
          AND customer_id = $2
          AND status IN ('sent', 'partial')
          AND balance_minor > 0
        ORDER BY currency, due_date, issue_date, invoice_number
        "#
    ))
    .bind(company_id)
    .bind(customer_id)
    .fetch_all(pool)
    .await
}

pub async fn update_settlement_tx(
    tx: &mut Transaction<'_, Postgres>,
    invoice_id: Uuid,
    paid_minor: i64,
    balance_minor: i64,
    status: InvoiceStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE invoices
        SET paid_minor = $2, balance_minor = $3, status = $4, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(invoice_id)
    .bind(paid_minor)
    .bind(balance_minor)
    .bind(status)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

pub async fn set_status_tx(
    tx: &mut Transaction<'_, Postgres>,
    invoice_id: Uuid,
    status: InvoiceStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE invoices SET status = $2, updated_at = NOW() WHERE id = $1")
        .bind(invoice_id)
        .bind(status)
        .execute(&mut **tx)
        .await?;

    Ok(())
}
