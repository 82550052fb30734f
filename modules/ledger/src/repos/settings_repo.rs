//! Accounts used to mirror receivables activity into the ledger.
//!
//! A company without a settings row records payments and allocations
//! without journal entries.

use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, PartialEq, Eq)]
pub struct CompanyLedgerSettings {
    pub company_id: Uuid,
    pub cash_account_id: Uuid,
    pub receivable_account_id: Uuid,
    pub unapplied_cash_account_id: Uuid,
}

pub async fn find_tx(
    tx: &mut Transaction<'_, Postgres>,
    company_id: Uuid,
) -> Result<Option<CompanyLedgerSettings>, sqlx::Error> {
    sqlx::query_as::<_, CompanyLedgerSettings>(
        r#"
        SELECT company_id, cash_account_id, receivable_account_id, unapplied_cash_account_id
        FROM company_ledger_settings
        WHERE company_id = $1
        "#,
    )
    .bind(company_id)
    .fetch_optional(&mut **tx)
    .await
}

pub async fn upsert(pool: &PgPool, settings: &CompanyLedgerSettings) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO company_ledger_settings
            (company_id, cash_account_id, receivable_account_id, unapplied_cash_account_id)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (company_id) DO UPDATE
        SET cash_account_id = EXCLUDED.cash_account_id,
            receivable_account_id = EXCLUDED.receivable_account_id,
            unapplied_cash_account_id = EXCLUDED.unapplied_cash_account_id,
            updated_at = NOW()
        "#,
    )
    .bind(settings.company_id)
    .bind(settings.cash_account_id)
    .bind(settings.receivable_account_id)
    .bind(settings.unapplied_cash_account_id)
    .execute(pool)
    .await?;

    Ok(())
}
