use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use thiserror::Error;
use uuid::Uuid;

/// Account type enum matching database account_type
#[derive(Debug, Clone, Copy, sqlx::Type, PartialEq, Eq, Serialize, Deserialize)]
#[sqlx(type_name = "account_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

/// Normal balance enum matching database normal_balance
#[derive(Debug, Clone, Copy, sqlx::Type, PartialEq, Eq, Serialize, Deserialize)]
#[sqlx(type_name = "normal_balance", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NormalBalance {
    Debit,
    Credit,
}

impl AccountType {
    pub fn normal_balance(self) -> NormalBalance {
        match self {
            AccountType::Asset | AccountType::Expense => NormalBalance::Debit,
            AccountType::Liability | AccountType::Equity | AccountType::Revenue => {
                NormalBalance::Credit
            }
        }
    }
}

/// Chart of Accounts entry
#[derive(Debug, Clone, FromRow)]
pub struct Account {
    pub id: Uuid,
    pub company_id: Uuid,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub normal_balance: NormalBalance,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Errors that can occur during account lookups
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Account not found: company_id={company_id}, account_id={account_id}")]
    NotFound { company_id: Uuid, account_id: Uuid },

    #[error("Account is inactive: company_id={company_id}, account_id={account_id}, code={code}")]
    Inactive {
        company_id: Uuid,
        account_id: Uuid,
        code: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Create an account; the normal balance follows from the type
pub async fn insert_account(
    pool: &PgPool,
    company_id: Uuid,
    code: &str,
    name: &str,
    account_type: AccountType,
) -> Result<Account, sqlx::Error> {
    sqlx::query_as::<_, Account>(
        r#"
        INSERT INTO accounts (id, company_id, code, name, account_type, normal_balance)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, company_id, code, name, account_type, normal_balance, is_active, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(company_id)
    .bind(code)
    .bind(name)
    .bind(account_type)
    .bind(account_type.normal_balance())
    .fetch_one(pool)
    .await
}

pub async fn set_active(
    pool: &PgPool,
    company_id: Uuid,
    account_id: Uuid,
    is_active: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE accounts SET is_active = $3 WHERE company_id = $1 AND id = $2")
        .bind(company_id)
        .bind(account_id)
        .bind(is_active)
        .execute(pool)
        .await?;
    Ok(())
}

/// Find an account that exists, belongs to the company and is active
pub async fn find_active_by_id_tx(
    tx: &mut Transaction<'_, Postgres>,
    company_id: Uuid,
    account_id: Uuid,
) -> Result<Account, AccountError> {
    let account = sqlx::query_as::<_, Account>(
        r#"
        SELECT id, company_id, code, name, account_type, normal_balance, is_active, created_at
        FROM accounts
        WHERE company_id = $1 AND id = $2
        "#,
    )
    .bind(company_id)
    .bind(account_id)
    .fetch_optional(&mut **tx)
    .await?;

    match account {
        None => Err(AccountError::NotFound {
            company_id,
            account_id,
        }),
        Some(a) if !a.is_active => Err(AccountError::Inactive {
            company_id,
            account_id,
            code: a.code,
        }),
        Some(a) => Ok(a),
    }
}
