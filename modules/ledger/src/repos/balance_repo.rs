//! Running debit/credit totals per account and currency, maintained by posting.

use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, PartialEq, Eq)]
pub struct AccountBalance {
    pub company_id: Uuid,
    pub account_id: Uuid,
    pub currency: String,
    pub debit_total_minor: i64,
    pub credit_total_minor: i64,
}

impl AccountBalance {
    /// Debit-positive net
    pub fn net_minor(&self) -> i64 {
        self.debit_total_minor - self.credit_total_minor
    }
}

/// Add one line's amounts to the account's running totals
pub async fn apply_line_tx(
    tx: &mut Transaction<'_, Postgres>,
    company_id: Uuid,
    account_id: Uuid,
    currency: &str,
    debit_minor: i64,
    credit_minor: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO account_balances
            (company_id, account_id, currency, debit_total_minor, credit_total_minor)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (company_id, account_id, currency) DO UPDATE
        SET debit_total_minor = account_balances.debit_total_minor + EXCLUDED.debit_total_minor,
            credit_total_minor = account_balances.credit_total_minor + EXCLUDED.credit_total_minor,
            updated_at = NOW()
        "#,
    )
    .bind(company_id)
    .bind(account_id)
    .bind(currency)
    .bind(debit_minor)
    .bind(credit_minor)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

pub async fn find_balance(
    pool: &PgPool,
    company_id: Uuid,
    account_id: Uuid,
    currency: &str,
) -> Result<Option<AccountBalance>, sqlx::Error> {
    sqlx::query_as::<_, AccountBalance>(
        r#"
        SELECT company_id, account_id, currency, debit_total_minor, credit_total_minor
        FROM account_balances
        WHERE company_id = $1 AND account_id = $2 AND currency = $3
        "#,
    )
    .bind(company_id)
    .bind(account_id)
    .bind(currency)
    .fetch_optional(pool)
    .await
}
