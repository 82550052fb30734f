//! Minimal invoice lifecycle: create as draft, send, and derive settlement
//! status from allocations. Also the per-customer balance summary.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::json;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::context::CompanyContext;
use crate::contracts::payment_v1::CreateInvoiceRequest;
use crate::money::{is_valid_currency, to_minor};
use crate::repos::invoice_repo::{self, Invoice, InvoiceStatus, NewInvoice};
use crate::repos::sequence_repo::{self, SequenceKind};
use crate::repos::payment_repo::{self, UnallocatedCash};
use crate::repos::{allocation_repo, audit_repo};

#[derive(Debug, thiserror::Error)]
pub enum InvoiceError {
    #[error("Currency must be a 3-letter uppercase code (ISO 4217), got: {0}")]
    InvalidCurrency(String),

    #[error("Invoice total must be positive")]
    NonPositiveTotal,

    #[error("Invoice total is outside the supported range")]
    TotalOutOfRange,

    #[error("Due date {due} is before issue date {issue}")]
    DueBeforeIssue { issue: NaiveDate, due: NaiveDate },

    #[error("Invoice not found: {0}")]
    NotFound(Uuid),

    #[error("Invoice {invoice_id} is {}, expected draft", status.as_str())]
    NotDraft {
        invoice_id: Uuid,
        status: InvoiceStatus,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Status implied by the amount paid so far.
///
/// Fully paid → paid; partly paid → partial; nothing paid → back to sent,
/// or draft if the invoice was never sent. Void is terminal.
pub fn invoice_status_for(total_minor: i64, paid_minor: i64, current: InvoiceStatus) -> InvoiceStatus {
    match current {
        InvoiceStatus::Void => InvoiceStatus::Void,
        _ if paid_minor >= total_minor => InvoiceStatus::Paid,
        _ if paid_minor > 0 => InvoiceStatus::Partial,
        InvoiceStatus::Draft => InvoiceStatus::Draft,
        _ => InvoiceStatus::Sent,
    }
}

pub async fn create_invoice(
    pool: &PgPool,
    ctx: &CompanyContext,
    req: &CreateInvoiceRequest,
) -> Result<Invoice, InvoiceError> {
    if !is_valid_currency(&req.currency) {
        return Err(InvoiceError::InvalidCurrency(req.currency.clone()));
    }
    if !req.total.is_finite() {
        return Err(InvoiceError::NonPositiveTotal);
    }
    let total_minor = to_minor(req.total).ok_or(InvoiceError::TotalOutOfRange)?;
    if total_minor <= 0 {
        return Err(InvoiceError::NonPositiveTotal);
    }
    if req.due_date < req.issue_date {
        return Err(InvoiceError::DueBeforeIssue {
            issue: req.issue_date,
            due: req.due_date,
        });
    }

    let mut tx = pool.begin().await?;

    let invoice_number =
        sequence_repo::next_number_tx(&mut tx, ctx.company_id, SequenceKind::Invoice, req.issue_date)
            .await?;

    let invoice = invoice_repo::insert_tx(
        &mut tx,
        &NewInvoice {
            company_id: ctx.company_id,
            customer_id: req.customer_id,
            invoice_number: &invoice_number,
            currency: &req.currency,
            issue_date: req.issue_date,
            due_date: req.due_date,
            total_minor,
            created_by: ctx.user_id,
        },
    )
    .await?;

    audit_repo::insert_tx(
        &mut tx,
        audit_repo::AuditRecord {
            company_id: ctx.company_id,
            actor_id: ctx.user_id,
            action: "invoice.created",
            entity_type: "invoice",
            entity_id: invoice.id,
            details: json!({ "invoice_number": invoice.invoice_number, "total_minor": invoice.total_minor }),
        },
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        company_id = %ctx.company_id,
        invoice_id = %invoice.id,
        invoice_number = %invoice.invoice_number,
        "Invoice created"
    );

    Ok(invoice)
}

/// draft → sent
pub async fn send_invoice(
    pool: &PgPool,
    ctx: &CompanyContext,
    invoice_id: Uuid,
) -> Result<Invoice, InvoiceError> {
    let mut tx = pool.begin().await?;

    let mut invoice = invoice_repo::lock_tx(&mut tx, ctx.company_id, invoice_id)
        .await?
        .ok_or(InvoiceError::NotFound(invoice_id))?;

    if invoice.status != InvoiceStatus::Draft {
        return Err(InvoiceError::NotDraft {
            invoice_id,
            status: invoice.status,
        });
    }

    invoice_repo::set_status_tx(&mut tx, invoice_id, InvoiceStatus::Sent).await?;
    invoice.status = InvoiceStatus::Sent;

    audit_repo::insert_tx(
        &mut tx,
        audit_repo::AuditRecord {
            company_id: ctx.company_id,
            actor_id: ctx.user_id,
            action: "invoice.sent",
            entity_type: "invoice",
            entity_id: invoice_id,
            details: json!({}),
        },
    )
    .await?;

    tx.commit().await?;

    tracing::info!(company_id = %ctx.company_id, invoice_id = %invoice_id, "Invoice sent");

    Ok(invoice)
}

pub async fn get_invoice(
    pool: &PgPool,
    company_id: Uuid,
    invoice_id: Uuid,
) -> Result<Invoice, InvoiceError> {
    invoice_repo::find(pool, company_id, invoice_id)
        .await?
        .ok_or(InvoiceError::NotFound(invoice_id))
}

/// Recompute paid/balance/status of a locked invoice from its active
/// allocations and persist the result
pub async fn refresh_settlement_tx(
    tx: &mut Transaction<'_, Postgres>,
    invoice: &Invoice,
) -> Result<Invoice, sqlx::Error> {
    let paid_minor = allocation_repo::sum_active_for_invoice_tx(tx, invoice.id).await?;
    let balance_minor = invoice.total_minor - paid_minor;
    let status = invoice_status_for(invoice.total_minor, paid_minor, invoice.status);

    invoice_repo::update_settlement_tx(tx, invoice.id, paid_minor, balance_minor, status).await?;

    Ok(Invoice {
        paid_minor,
        balance_minor,
        status,
        ..invoice.clone()
    })
}

#[derive(Debug, Clone)]
pub struct InvoiceBalance {
    pub invoice: Invoice,
    /// 0 unless the due date is before `as_of`
    pub days_overdue: i64,
}

/// Receivable position of a customer in one currency
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurrencyBalance {
    pub currency: String,
    pub open_invoices: usize,
    pub balance_due_minor: i64,
    pub overdue_minor: i64,
    pub unallocated_minor: i64,
    pub net_minor: i64,
}

#[derive(Debug, Clone)]
pub struct CustomerBalanceSummary {
    pub customer_id: Uuid,
    pub as_of: NaiveDate,
    /// One row per currency, sorted by code
    pub balances: Vec<CurrencyBalance>,
    pub invoices: Vec<InvoiceBalance>,
}

/// Fold open invoices and unallocated payment cash into per-currency totals.
///
/// Amounts are never mixed across currencies. A currency with only
/// unallocated cash still gets a row, with a negative net balance.
pub fn summarize_customer(
    customer_id: Uuid,
    as_of: NaiveDate,
    invoices: Vec<Invoice>,
    unallocated: &[UnallocatedCash],
) -> CustomerBalanceSummary {
    let mut balances: BTreeMap<String, CurrencyBalance> = BTreeMap::new();
    let mut rows = Vec::with_capacity(invoices.len());

    for invoice in invoices {
        let days_overdue = (as_of - invoice.due_date).num_days().max(0);
        let entry = balances
            .entry(invoice.currency.clone())
            .or_insert_with(|| CurrencyBalance {
                currency: invoice.currency.clone(),
                ..CurrencyBalance::default()
            });
        entry.open_invoices += 1;
        entry.balance_due_minor = entry.balance_due_minor.saturating_add(invoice.balance_minor);
        if days_overdue > 0 {
            entry.overdue_minor = entry.overdue_minor.saturating_add(invoice.balance_minor);
        }
        rows.push(InvoiceBalance {
            invoice,
            days_overdue,
        });
    }

    for cash in unallocated.iter().filter(|c| c.remaining_minor != 0) {
        let entry = balances
            .entry(cash.currency.clone())
            .or_insert_with(|| CurrencyBalance {
                currency: cash.currency.clone(),
                ..CurrencyBalance::default()
            });
        entry.unallocated_minor = entry.unallocated_minor.saturating_add(cash.remaining_minor);
    }

    let balances = balances
        .into_values()
        .map(|b| CurrencyBalance {
            net_minor: b.balance_due_minor.saturating_sub(b.unallocated_minor),
            ..b
        })
        .collect();

    CustomerBalanceSummary {
        customer_id,
        as_of,
        balances,
        invoices: rows,
    }
}

/// Open receivables and unallocated payments of one customer
pub async fn customer_balance_summary(
    pool: &PgPool,
    company_id: Uuid,
    customer_id: Uuid,
    as_of: NaiveDate,
) -> Result<CustomerBalanceSummary, InvoiceError> {
    let invoices = invoice_repo::list_open_for_customer(pool, company_id, customer_id).await?;
    let unallocated = payment_repo::unallocated_for_customer(pool, company_id, customer_id).await?;

    Ok(summarize_customer(customer_id, as_of, invoices, &unallocated))
}
