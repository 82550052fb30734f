//! Payment allocation against invoices
//!
//! Lock order is always payment, then allocation rows, then invoices in id
//! order. Invoice `paid`/`balance`/`status` are recomputed from active
//! allocations after every change rather than adjusted incrementally.

use std::collections::{HashMap, HashSet};

use chrono::{NaiveDate, Utc};
use serde_json::json;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::context::CompanyContext;
use crate::contracts::payment_v1::{AllocatedInvoiceV1, AllocationReversedV1, PaymentAllocatedV1};
use crate::metrics::metrics;
use crate::money::checked_total;
use crate::repos::allocation_repo::{self, AllocationMethod, NewAllocation, PaymentAllocation};
use crate::repos::invoice_repo::{self, Invoice, InvoiceStatus};
use crate::repos::payment_repo::{self, Payment, PaymentStatus};
use crate::repos::settings_repo::{self, CompanyLedgerSettings};
use crate::repos::{audit_repo, outbox_repo};
use crate::services::allocation_strategy::{
    plan_allocations, AllocationStrategy, OpenInvoice, StrategyOptions,
};
use crate::services::invoice_service::refresh_settlement_tx;
use crate::services::journal_service::{self, line_insert, JournalError, SystemEntry};
use crate::services::reversal_service::{self, ReversalError};
use crate::validation::{validate_reason, LineAmounts, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Payment not found: {0}")]
    PaymentNotFound(Uuid),

    #[error("Payment is void: {0}")]
    PaymentVoid(Uuid),

    #[error("Invoice not found: {0}")]
    InvoiceNotFound(Uuid),

    #[error("Allocation not found: {0}")]
    AllocationNotFound(Uuid),

    #[error("At least one allocation is required")]
    EmptyAllocation,

    #[error("Invoice {0} appears more than once")]
    DuplicateInvoice(Uuid),

    #[error("Allocation amount for invoice {0} must be positive")]
    NonPositiveAmount(Uuid),

    #[error("Invoice {invoice_id} is {} and cannot receive payments", status.as_str())]
    InvoiceNotPayable {
        invoice_id: Uuid,
        status: InvoiceStatus,
    },

    #[error("Invoice {0} belongs to a different customer than the payment")]
    CustomerMismatch(Uuid),

    #[error("Invoice {invoice_id} is in {invoice_currency}, payment is in {payment_currency}")]
    CurrencyMismatch {
        invoice_id: Uuid,
        invoice_currency: String,
        payment_currency: String,
    },

    #[error("Allocation of {requested_minor} exceeds invoice {invoice_id} balance of {balance_minor}")]
    ExceedsInvoiceBalance {
        invoice_id: Uuid,
        requested_minor: i64,
        balance_minor: i64,
    },

    #[error("Allocations total {requested_minor} but only {remaining_minor} of the payment is unallocated")]
    ExceedsPaymentRemaining {
        requested_minor: i64,
        remaining_minor: i64,
    },

    #[error("Allocation already reversed: {0}")]
    AlreadyReversed(Uuid),

    #[error("Ledger posting failed: {0}")]
    Journal(#[from] JournalError),

    #[error("Ledger reversal failed: {0}")]
    Reversal(#[from] ReversalError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type AllocationResult<T> = Result<T, AllocationError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationInput {
    pub invoice_id: Uuid,
    pub amount_minor: i64,
}

#[derive(Debug, Clone)]
pub struct AllocationOutcome {
    pub payment_id: Uuid,
    pub payment_status: PaymentStatus,
    pub total_allocated_minor: i64,
    pub remaining_minor: i64,
    /// Allocations created by this call
    pub allocations: Vec<PaymentAllocation>,
}

impl AllocationOutcome {
    fn record_committed(&self, method: AllocationMethod) {
        let posted = self
            .allocations
            .iter()
            .filter(|a| a.journal_entry_id.is_some())
            .count();
        metrics().record_committed_postings(posted, 0);
        metrics()
            .payment_allocations_total
            .with_label_values(&[method.as_str()])
            .inc_by(self.allocations.len() as u64);
    }
}

/// Request-shape checks that need no database
pub fn validate_inputs(inputs: &[AllocationInput]) -> AllocationResult<()> {
    if inputs.is_empty() {
        return Err(AllocationError::EmptyAllocation);
    }
    let mut seen = HashSet::with_capacity(inputs.len());
    for input in inputs {
        if !seen.insert(input.invoice_id) {
            return Err(AllocationError::DuplicateInvoice(input.invoice_id));
        }
        if input.amount_minor <= 0 {
            return Err(AllocationError::NonPositiveAmount(input.invoice_id));
        }
    }
    checked_total(inputs.iter().map(|i| i.amount_minor))
        .ok_or(ValidationError::TotalOutOfRange)?;
    Ok(())
}

/// Payment status implied by how much of it is allocated
pub fn payment_status_for(amount_minor: i64, allocated_minor: i64) -> PaymentStatus {
    if allocated_minor >= amount_minor {
        PaymentStatus::Completed
    } else {
        PaymentStatus::Pending
    }
}

fn check_invoice(
    payment: &Payment,
    invoice: &Invoice,
    amount_minor: i64,
) -> AllocationResult<()> {
    if invoice.customer_id != payment.customer_id {
        return Err(AllocationError::CustomerMismatch(invoice.id));
    }
    if invoice.currency != payment.currency {
        return Err(AllocationError::CurrencyMismatch {
            invoice_id: invoice.id,
            invoice_currency: invoice.currency.clone(),
            payment_currency: payment.currency.clone(),
        });
    }
    if !invoice.status.is_payable() {
        return Err(AllocationError::InvoiceNotPayable {
            invoice_id: invoice.id,
            status: invoice.status,
        });
    }
    if amount_minor > invoice.balance_minor {
        return Err(AllocationError::ExceedsInvoiceBalance {
            invoice_id: invoice.id,
            requested_minor: amount_minor,
            balance_minor: invoice.balance_minor,
        });
    }
    Ok(())
}

async fn lock_live_payment(
    tx: &mut Transaction<'_, Postgres>,
    ctx: &CompanyContext,
    payment_id: Uuid,
) -> AllocationResult<Payment> {
    let payment = payment_repo::lock_tx(tx, ctx.company_id, payment_id)
        .await?
        .ok_or(AllocationError::PaymentNotFound(payment_id))?;
    if payment.status == PaymentStatus::Void {
        return Err(AllocationError::PaymentVoid(payment_id));
    }
    Ok(payment)
}

/// Allocate a payment to invoices with explicit amounts
pub async fn allocate_payment(
    pool: &PgPool,
    ctx: &CompanyContext,
    payment_id: Uuid,
    inputs: &[AllocationInput],
) -> AllocationResult<AllocationOutcome> {
    validate_inputs(inputs)?;

    let mut tx = pool.begin().await?;
    let outcome =
        allocate_payment_tx(&mut tx, ctx, payment_id, inputs, AllocationMethod::Manual, None)
            .await?;
    tx.commit().await?;

    outcome.record_committed(AllocationMethod::Manual);

    Ok(outcome)
}

/// Allocate inside the caller's transaction. All checks run against locked
/// rows before anything is written.
pub async fn allocate_payment_tx(
    tx: &mut Transaction<'_, Postgres>,
    ctx: &CompanyContext,
    payment_id: Uuid,
    inputs: &[AllocationInput],
    method: AllocationMethod,
    strategy: Option<AllocationStrategy>,
) -> AllocationResult<AllocationOutcome> {
    validate_inputs(inputs)?;

    let payment = lock_live_payment(tx, ctx, payment_id).await?;

    let already_allocated = allocation_repo::sum_active_for_payment_tx(tx, payment_id).await?;
    let remaining_minor = payment.amount_minor - already_allocated;
    let requested_minor = checked_total(inputs.iter().map(|i| i.amount_minor))
        .ok_or(ValidationError::TotalOutOfRange)?;
    if requested_minor > remaining_minor {
        tracing::warn!(
            company_id = %ctx.company_id,
            payment_id = %payment_id,
            requested_minor,
            remaining_minor,
            "Allocation exceeds unallocated payment amount"
        );
        return Err(AllocationError::ExceedsPaymentRemaining {
            requested_minor,
            remaining_minor,
        });
    }

    let mut invoice_ids: Vec<Uuid> = inputs.iter().map(|i| i.invoice_id).collect();
    invoice_ids.sort();
    let invoices: HashMap<Uuid, Invoice> =
        invoice_repo::lock_many_tx(tx, ctx.company_id, &invoice_ids)
            .await?
            .into_iter()
            .map(|i| (i.id, i))
            .collect();

    for input in inputs {
        let invoice = invoices
            .get(&input.invoice_id)
            .ok_or(AllocationError::InvoiceNotFound(input.invoice_id))?;
        check_invoice(&payment, invoice, input.amount_minor)?;
    }

    let settings = settings_repo::find_tx(tx, ctx.company_id).await?;
    let strategy_name = strategy.map(AllocationStrategy::as_str);
    let mut created = Vec::with_capacity(inputs.len());

    for input in inputs {
        let mut allocation = allocation_repo::insert_tx(
            tx,
            &NewAllocation {
                company_id: ctx.company_id,
                payment_id,
                invoice_id: input.invoice_id,
                amount_minor: input.amount_minor,
                method,
                strategy: strategy_name,
                created_by: ctx.user_id,
            },
        )
        .await?;

        let invoice = &invoices[&input.invoice_id];
        refresh_settlement_tx(tx, invoice).await?;

        if let Some(ref settings) = settings {
            let entry_id =
                post_allocation_entry(tx, ctx, settings, &payment, invoice, &allocation).await?;
            allocation_repo::set_journal_entry_tx(tx, allocation.id, entry_id).await?;
            allocation.journal_entry_id = Some(entry_id);
        }

        created.push(allocation);
    }

    let total_allocated_minor = already_allocated + requested_minor;
    let payment_status = payment_status_for(payment.amount_minor, total_allocated_minor);
    payment_repo::update_status_tx(tx, payment_id, payment_status).await?;

    audit_repo::insert_tx(
        tx,
        audit_repo::AuditRecord {
            company_id: ctx.company_id,
            actor_id: ctx.user_id,
            action: "payment.allocated",
            entity_type: "payment",
            entity_id: payment_id,
            details: json!({
                "method": method,
                "strategy": strategy_name,
                "allocated_minor": requested_minor,
                "invoice_ids": invoice_ids,
            }),
        },
    )
    .await?;

    outbox_repo::insert_outbox_event(
        tx,
        ctx.company_id,
        outbox_repo::EVENT_PAYMENT_ALLOCATED,
        "payment",
        payment_id,
        &PaymentAllocatedV1 {
            payment_id,
            company_id: ctx.company_id,
            method,
            strategy,
            allocations: created
                .iter()
                .map(|a| AllocatedInvoiceV1 {
                    allocation_id: a.id,
                    invoice_id: a.invoice_id,
                    amount_minor: a.amount_minor,
                })
                .collect(),
            remaining_minor: payment.amount_minor - total_allocated_minor,
        },
    )
    .await?;

    tracing::info!(
        company_id = %ctx.company_id,
        payment_id = %payment_id,
        method = method.as_str(),
        allocation_count = created.len(),
        allocated_minor = requested_minor,
        payment_status = ?payment_status,
        "Payment allocated"
    );

    Ok(AllocationOutcome {
        payment_id,
        payment_status,
        total_allocated_minor,
        remaining_minor: payment.amount_minor - total_allocated_minor,
        allocations: created,
    })
}

/// Dr unapplied cash, Cr receivable
async fn post_allocation_entry(
    tx: &mut Transaction<'_, Postgres>,
    ctx: &CompanyContext,
    settings: &CompanyLedgerSettings,
    payment: &Payment,
    invoice: &Invoice,
    allocation: &PaymentAllocation,
) -> AllocationResult<Uuid> {
    let entry_id = journal_service::create_and_post_entry_tx(
        tx,
        ctx,
        &SystemEntry {
            entry_date: Utc::now().date_naive(),
            currency: payment.currency.clone(),
            description: format!(
                "Payment {} applied to invoice {}",
                payment.payment_number, invoice.invoice_number
            ),
            lines: vec![
                line_insert(
                    1,
                    settings.unapplied_cash_account_id,
                    LineAmounts::debit(allocation.amount_minor),
                    None,
                ),
                line_insert(
                    2,
                    settings.receivable_account_id,
                    LineAmounts::credit(allocation.amount_minor),
                    Some(invoice.invoice_number.clone()),
                ),
            ],
            source_key: Some(format!("payment_allocation:{}", allocation.id)),
            reverses_entry_id: None,
        },
    )
    .await?;
    Ok(entry_id)
}

/// Plan allocations with a strategy over the customer's open invoices and
/// apply them. An empty plan changes nothing. `options` carries the
/// percentages or invoice order that some strategies need.
pub async fn auto_allocate_payment(
    pool: &PgPool,
    ctx: &CompanyContext,
    payment_id: Uuid,
    strategy: AllocationStrategy,
    options: &StrategyOptions,
    as_of: NaiveDate,
) -> AllocationResult<AllocationOutcome> {
    let mut tx = pool.begin().await?;

    let payment = lock_live_payment(&mut tx, ctx, payment_id).await?;
    let already_allocated = allocation_repo::sum_active_for_payment_tx(&mut tx, payment_id).await?;
    let available_minor = payment.amount_minor - already_allocated;

    let open: Vec<OpenInvoice> = invoice_repo::list_open_for_customer_tx(
        &mut tx,
        ctx.company_id,
        payment.customer_id,
        &payment.currency,
    )
    .await?
    .into_iter()
    .map(|i| OpenInvoice {
        invoice_id: i.id,
        invoice_number: i.invoice_number,
        issue_date: i.issue_date,
        due_date: i.due_date,
        balance_minor: i.balance_minor,
    })
    .collect();

    let plan = plan_allocations(strategy, options, &open, available_minor, as_of);

    if plan.is_empty() {
        tracing::info!(
            company_id = %ctx.company_id,
            payment_id = %payment_id,
            strategy = strategy.as_str(),
            open_invoices = open.len(),
            available_minor,
            "Nothing to auto-allocate"
        );
        return Ok(AllocationOutcome {
            payment_id,
            payment_status: payment.status,
            total_allocated_minor: already_allocated,
            remaining_minor: available_minor,
            allocations: Vec::new(),
        });
    }

    let inputs: Vec<AllocationInput> = plan
        .iter()
        .map(|p| AllocationInput {
            invoice_id: p.invoice_id,
            amount_minor: p.amount_minor,
        })
        .collect();

    let outcome = allocate_payment_tx(
        &mut tx,
        ctx,
        payment_id,
        &inputs,
        AllocationMethod::Automatic,
        Some(strategy),
    )
    .await?;

    tx.commit().await?;

    outcome.record_committed(AllocationMethod::Automatic);

    Ok(outcome)
}

/// Reverse one allocation of a payment
pub async fn reverse_allocation(
    pool: &PgPool,
    ctx: &CompanyContext,
    payment_id: Uuid,
    allocation_id: Uuid,
    reason: &str,
) -> AllocationResult<PaymentAllocation> {
    validate_reason(reason)?;

    let mut tx = pool.begin().await?;

    let payment = payment_repo::lock_tx(&mut tx, ctx.company_id, payment_id)
        .await?
        .ok_or(AllocationError::PaymentNotFound(payment_id))?;

    let allocation = allocation_repo::lock_tx(&mut tx, ctx.company_id, allocation_id)
        .await?
        .filter(|a| a.payment_id == payment_id)
        .ok_or(AllocationError::AllocationNotFound(allocation_id))?;

    if allocation.is_reversed() {
        return Err(AllocationError::AlreadyReversed(allocation_id));
    }

    let reversed = reverse_allocation_tx(&mut tx, ctx, &payment, &allocation, reason).await?;

    tx.commit().await?;

    let reversals = usize::from(allocation.journal_entry_id.is_some());
    metrics().record_committed_postings(reversals, reversals);

    Ok(reversed)
}

/// Result of reversing allocations across an invoice
#[derive(Debug, Clone)]
pub struct InvoiceReversalOutcome {
    pub invoice_id: Uuid,
    pub reversed_total_minor: i64,
    /// Newest first
    pub allocations: Vec<PaymentAllocation>,
}

/// Newest-first prefix of `allocations` whose running total stays within
/// `max_minor`. Without a cap every allocation is taken.
pub fn take_within_cap(
    allocations: Vec<PaymentAllocation>,
    max_minor: Option<i64>,
) -> Vec<PaymentAllocation> {
    let Some(max_minor) = max_minor else {
        return allocations;
    };
    let mut total: i64 = 0;
    allocations
        .into_iter()
        .take_while(|a| match total.checked_add(a.amount_minor) {
            Some(next) if next <= max_minor => {
                total = next;
                true
            }
            _ => false,
        })
        .collect()
}

/// Reverse the active allocations on an invoice, newest first.
///
/// `max_minor` stops before the reversed total would exceed it. An invoice
/// with nothing to reverse gives an empty outcome.
pub async fn reverse_invoice_allocations(
    pool: &PgPool,
    ctx: &CompanyContext,
    invoice_id: Uuid,
    reason: &str,
    max_minor: Option<i64>,
) -> AllocationResult<InvoiceReversalOutcome> {
    validate_reason(reason)?;
    if max_minor.is_some_and(|m| m <= 0) {
        return Err(AllocationError::NonPositiveAmount(invoice_id));
    }

    let mut tx = pool.begin().await?;

    invoice_repo::find_tx(&mut tx, ctx.company_id, invoice_id)
        .await?
        .ok_or(AllocationError::InvoiceNotFound(invoice_id))?;

    // Payments before allocations before the invoice, as everywhere else
    let payment_ids =
        allocation_repo::active_payment_ids_for_invoice_tx(&mut tx, ctx.company_id, invoice_id)
            .await?;
    let mut payments = HashMap::with_capacity(payment_ids.len());
    for payment_id in &payment_ids {
        let payment = payment_repo::lock_tx(&mut tx, ctx.company_id, *payment_id)
            .await?
            .ok_or(AllocationError::PaymentNotFound(*payment_id))?;
        payments.insert(*payment_id, payment);
    }

    let active =
        allocation_repo::lock_active_for_invoice_tx(&mut tx, ctx.company_id, invoice_id, &payment_ids)
            .await?;
    let selected = take_within_cap(active, max_minor);

    let mut reversed = Vec::with_capacity(selected.len());
    for allocation in &selected {
        let payment = payments
            .get(&allocation.payment_id)
            .ok_or(AllocationError::PaymentNotFound(allocation.payment_id))?;
        reversed.push(reverse_allocation_tx(&mut tx, ctx, payment, allocation, reason).await?);
    }

    tx.commit().await?;

    let reversals = selected.iter().filter(|a| a.journal_entry_id.is_some()).count();
    metrics().record_committed_postings(reversals, reversals);

    let reversed_total_minor = selected
        .iter()
        .fold(0i64, |total, a| total.saturating_add(a.amount_minor));

    tracing::info!(
        company_id = %ctx.company_id,
        invoice_id = %invoice_id,
        reversed = reversed.len(),
        reversed_total_minor,
        "Invoice allocations reversed"
    );

    Ok(InvoiceReversalOutcome {
        invoice_id,
        reversed_total_minor,
        allocations: reversed,
    })
}

/// Reverse a locked, active allocation inside the caller's transaction.
///
/// The allocation amount is kept; the row is stamped reversed, the invoice
/// is recomputed and the payment drops back to pending.
pub async fn reverse_allocation_tx(
    tx: &mut Transaction<'_, Postgres>,
    ctx: &CompanyContext,
    payment: &Payment,
    allocation: &PaymentAllocation,
    reason: &str,
) -> AllocationResult<PaymentAllocation> {
    let reversed = allocation_repo::mark_reversed_tx(tx, allocation.id, ctx.user_id, reason).await?;

    let invoice = invoice_repo::lock_tx(tx, ctx.company_id, allocation.invoice_id)
        .await?
        .ok_or(AllocationError::InvoiceNotFound(allocation.invoice_id))?;
    refresh_settlement_tx(tx, &invoice).await?;

    if let Some(entry_id) = allocation.journal_entry_id {
        reversal_service::reverse_entry_tx(
            tx,
            ctx,
            entry_id,
            Utc::now().date_naive(),
            Some(reason),
        )
        .await?;
    }

    if payment.status != PaymentStatus::Void {
        payment_repo::update_status_tx(tx, payment.id, PaymentStatus::Pending).await?;
    }

    audit_repo::insert_tx(
        tx,
        audit_repo::AuditRecord {
            company_id: ctx.company_id,
            actor_id: ctx.user_id,
            action: "payment_allocation.reversed",
            entity_type: "payment_allocation",
            entity_id: allocation.id,
            details: json!({
                "payment_id": payment.id,
                "invoice_id": allocation.invoice_id,
                "amount_minor": allocation.amount_minor,
                "reason": reason,
            }),
        },
    )
    .await?;

    outbox_repo::insert_outbox_event(
        tx,
        ctx.company_id,
        outbox_repo::EVENT_ALLOCATION_REVERSED,
        "payment_allocation",
        allocation.id,
        &AllocationReversedV1 {
            allocation_id: allocation.id,
            payment_id: payment.id,
            invoice_id: allocation.invoice_id,
            company_id: ctx.company_id,
            amount_minor: allocation.amount_minor,
            reason: reason.to_string(),
        },
    )
    .await?;

    tracing::info!(
        company_id = %ctx.company_id,
        allocation_id = %allocation.id,
        payment_id = %payment.id,
        invoice_id = %allocation.invoice_id,
        amount_minor = allocation.amount_minor,
        "Payment allocation reversed"
    );

    Ok(reversed)
}
