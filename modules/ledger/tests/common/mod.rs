//! Shared fixtures for ledger integration tests
//!
//! Tests need a PostgreSQL database in `DATABASE_URL`; without it they
//! print a note and return early. Every test works in a freshly generated
//! company so rows from earlier runs never collide.

#![allow(dead_code)]

use chrono::{Datelike, NaiveDate, Utc};
use ledger_rs::context::CompanyContext;
use ledger_rs::contracts::journal_entry_v1::{CreateJournalEntryRequest, JournalLineInput};
use ledger_rs::contracts::payment_v1::{CreateInvoiceRequest, RecordPaymentRequest};
use ledger_rs::db::{init_pool, run_migrations};
use ledger_rs::repos::account_repo::{self, AccountType};
use ledger_rs::repos::invoice_repo::Invoice;
use ledger_rs::repos::payment_repo::Payment;
use ledger_rs::repos::settings_repo::{self, CompanyLedgerSettings};
use ledger_rs::services::{invoice_service, payment_service, period_service};
use sqlx::PgPool;
use uuid::Uuid;

/// Connect and migrate, or `None` when no database is configured
pub async fn setup_pool() -> Option<PgPool> {
    dotenvy::dotenv().ok();

    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping database test");
        return None;
    };

    if std::env::var("DB_MAX_CONNECTIONS").is_err() {
        std::env::set_var("DB_MAX_CONNECTIONS", "5");
    }
    if std::env::var("DB_ACQUIRE_TIMEOUT_SECS").is_err() {
        std::env::set_var("DB_ACQUIRE_TIMEOUT_SECS", "10");
    }

    let pool = init_pool(&database_url)
        .await
        .expect("Failed to initialize test pool");
    run_migrations(&pool).await.expect("Failed to run migrations");
    Some(pool)
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// A company with a chart of accounts and an open period covering the
/// current calendar year
pub struct TestCompany {
    pub ctx: CompanyContext,
    pub cash: Uuid,
    pub revenue: Uuid,
    pub receivable: Uuid,
    pub unapplied_cash: Uuid,
    pub period_id: Uuid,
}

pub async fn seed_company(pool: &PgPool) -> TestCompany {
    let ctx = CompanyContext::new(Uuid::new_v4(), Uuid::new_v4());

    let cash = account_repo::insert_account(pool, ctx.company_id, "1000", "Cash", AccountType::Asset)
        .await
        .expect("insert cash account");
    let receivable = account_repo::insert_account(
        pool,
        ctx.company_id,
        "1200",
        "Accounts Receivable",
        AccountType::Asset,
    )
    .await
    .expect("insert receivable account");
    let unapplied_cash = account_repo::insert_account(
        pool,
        ctx.company_id,
        "2400",
        "Unapplied Cash",
        AccountType::Liability,
    )
    .await
    .expect("insert unapplied cash account");
    let revenue =
        account_repo::insert_account(pool, ctx.company_id, "4000", "Revenue", AccountType::Revenue)
            .await
            .expect("insert revenue account");

    let year = today().year();
    let period = period_service::create_period(
        pool,
        &ctx,
        NaiveDate::from_ymd_opt(year, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(year, 12, 31).unwrap(),
    )
    .await
    .expect("create current-year period");

    TestCompany {
        ctx,
        cash: cash.id,
        revenue: revenue.id,
        receivable: receivable.id,
        unapplied_cash: unapplied_cash.id,
        period_id: period.id,
    }
}

/// Turn on ledger postings for receipts and allocations
pub async fn enable_ledger_settings(pool: &PgPool, company: &TestCompany) {
    settings_repo::upsert(
        pool,
        &CompanyLedgerSettings {
            company_id: company.ctx.company_id,
            cash_account_id: company.cash,
            receivable_account_id: company.receivable,
            unapplied_cash_account_id: company.unapplied_cash,
        },
    )
    .await
    .expect("upsert ledger settings");
}

pub fn entry_request(
    entry_date: NaiveDate,
    lines: &[(Uuid, f64, f64)],
    auto_post: bool,
) -> CreateJournalEntryRequest {
    CreateJournalEntryRequest {
        entry_date,
        currency: "USD".into(),
        description: "Test entry".into(),
        lines: lines
            .iter()
            .map(|&(account_id, debit, credit)| JournalLineInput {
                account_id,
                debit,
                credit,
                memo: None,
            })
            .collect(),
        auto_post,
    }
}

/// Invoice that has been sent and can take payments
pub async fn sent_invoice(
    pool: &PgPool,
    company: &TestCompany,
    customer_id: Uuid,
    total: f64,
    issue_date: NaiveDate,
    due_date: NaiveDate,
) -> Invoice {
    let invoice = invoice_service::create_invoice(
        pool,
        &company.ctx,
        &CreateInvoiceRequest {
            customer_id,
            currency: "USD".into(),
            issue_date,
            due_date,
            total,
        },
    )
    .await
    .expect("create invoice");

    invoice_service::send_invoice(pool, &company.ctx, invoice.id)
        .await
        .expect("send invoice")
}

pub async fn payment(
    pool: &PgPool,
    company: &TestCompany,
    customer_id: Uuid,
    amount: f64,
) -> Payment {
    payment_service::record_payment(
        pool,
        &company.ctx,
        &RecordPaymentRequest {
            customer_id,
            payment_date: today(),
            method: "bank_transfer".into(),
            reference: None,
            amount,
            currency: "USD".into(),
        },
    )
    .await
    .expect("record payment")
}

/// Read a response body as JSON
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    use http_body_util::BodyExt;

    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body is JSON")
}
