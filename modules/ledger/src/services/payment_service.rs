//! Recording and voiding customer payments.
//!
//! When the company has ledger settings, a receipt posts Dr cash / Cr
//! unapplied cash; allocations later move unapplied cash to receivables.

use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::context::CompanyContext;
use crate::contracts::payment_v1::RecordPaymentRequest;
use crate::metrics::metrics;
use crate::money::{is_valid_currency, to_minor};
use crate::repos::allocation_repo::{self, PaymentAllocation};
use crate::repos::payment_repo::{self, NewPayment, Payment, PaymentStatus};
use crate::repos::sequence_repo::{self, SequenceKind};
use crate::repos::{audit_repo, settings_repo};
use crate::services::allocation_service::{self, AllocationError};
use crate::services::journal_service::{self, line_insert, JournalError, SystemEntry};
use crate::services::reversal_service::{self, ReversalError};
use crate::validation::{validate_reason, LineAmounts, ValidationError};

const MAX_METHOD_CHARS: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Currency must be a 3-letter uppercase code (ISO 4217), got: {0}")]
    InvalidCurrency(String),

    #[error("Payment amount must be positive")]
    NonPositiveAmount,

    #[error("Payment amount is outside the supported range")]
    AmountOutOfRange,

    #[error("Payment method must be between 1 and 50 characters")]
    InvalidMethod,

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Payment not found: {0}")]
    NotFound(Uuid),

    #[error("Payment is already void: {0}")]
    AlreadyVoid(Uuid),

    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error("Ledger posting failed: {0}")]
    Journal(#[from] JournalError),

    #[error("Ledger reversal failed: {0}")]
    Reversal(#[from] ReversalError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

fn validate_request(req: &RecordPaymentRequest) -> Result<i64, PaymentError> {
    if !is_valid_currency(&req.currency) {
        return Err(PaymentError::InvalidCurrency(req.currency.clone()));
    }
    let method_len = req.method.trim().chars().count();
    if method_len == 0 || method_len > MAX_METHOD_CHARS {
        return Err(PaymentError::InvalidMethod);
    }
    if !req.amount.is_finite() {
        return Err(PaymentError::NonPositiveAmount);
    }
    let amount_minor = to_minor(req.amount).ok_or(PaymentError::AmountOutOfRange)?;
    if amount_minor <= 0 {
        return Err(PaymentError::NonPositiveAmount);
    }
    Ok(amount_minor)
}

/// Record a received payment as pending
pub async fn record_payment(
    pool: &PgPool,
    ctx: &CompanyContext,
    req: &RecordPaymentRequest,
) -> Result<Payment, PaymentError> {
    let amount_minor = validate_request(req)?;

    let mut tx = pool.begin().await?;

    let payment_number =
        sequence_repo::next_number_tx(&mut tx, ctx.company_id, SequenceKind::Payment, req.payment_date)
            .await?;

    let mut payment = payment_repo::insert_tx(
        &mut tx,
        &NewPayment {
            company_id: ctx.company_id,
            customer_id: req.customer_id,
            payment_number: &payment_number,
            payment_date: req.payment_date,
            method: req.method.trim(),
            reference: req.reference.as_deref(),
            amount_minor,
            currency: &req.currency,
            created_by: ctx.user_id,
        },
    )
    .await?;

    if let Some(settings) = settings_repo::find_tx(&mut tx, ctx.company_id).await? {
        let entry_id = journal_service::create_and_post_entry_tx(
            &mut tx,
            ctx,
            &SystemEntry {
                entry_date: payment.payment_date,
                currency: payment.currency.clone(),
                description: format!("Payment received {}", payment.payment_number),
                lines: vec![
                    line_insert(1, settings.cash_account_id, LineAmounts::debit(amount_minor), None),
                    line_insert(
                        2,
                        settings.unapplied_cash_account_id,
                        LineAmounts::credit(amount_minor),
                        None,
                    ),
                ],
                source_key: Some(format!("payment_receipt:{}", payment.id)),
                reverses_entry_id: None,
            },
        )
        .await?;
        payment_repo::set_journal_entry_tx(&mut tx, payment.id, entry_id).await?;
        payment.journal_entry_id = Some(entry_id);
    }

    audit_repo::insert_tx(
        &mut tx,
        audit_repo::AuditRecord {
            company_id: ctx.company_id,
            actor_id: ctx.user_id,
            action: "payment.recorded",
            entity_type: "payment",
            entity_id: payment.id,
            details: json!({
                "payment_number": payment.payment_number,
                "amount_minor": amount_minor,
                "journal_entry_id": payment.journal_entry_id,
            }),
        },
    )
    .await?;

    tx.commit().await?;

    if payment.journal_entry_id.is_some() {
        metrics().record_committed_postings(1, 0);
    }

    tracing::info!(
        company_id = %ctx.company_id,
        payment_id = %payment.id,
        payment_number = %payment.payment_number,
        amount_minor,
        "Payment recorded"
    );

    Ok(payment)
}

/// Void a payment: reverse every active allocation, reverse the receipt
/// entry if there is one, then mark the payment void
pub async fn void_payment(
    pool: &PgPool,
    ctx: &CompanyContext,
    payment_id: Uuid,
    reason: &str,
) -> Result<Payment, PaymentError> {
    validate_reason(reason)?;

    let mut tx = pool.begin().await?;

    let mut payment = payment_repo::lock_tx(&mut tx, ctx.company_id, payment_id)
        .await?
        .ok_or(PaymentError::NotFound(payment_id))?;

    if payment.status == PaymentStatus::Void {
        return Err(PaymentError::AlreadyVoid(payment_id));
    }

    let mut active =
        allocation_repo::lock_active_for_payment_tx(&mut tx, ctx.company_id, payment_id).await?;
    // Invoices are locked while reversing, so walk them in invoice-id order
    active.sort_by_key(|a| (a.invoice_id, a.id));
    for allocation in &active {
        allocation_service::reverse_allocation_tx(&mut tx, ctx, &payment, allocation, reason).await?;
    }

    if let Some(entry_id) = payment.journal_entry_id {
        reversal_service::reverse_entry_tx(&mut tx, ctx, entry_id, Utc::now().date_naive(), Some(reason))
            .await?;
    }

    payment_repo::mark_void_tx(&mut tx, payment_id, reason).await?;
    payment.status = PaymentStatus::Void;
    payment.void_reason = Some(reason.to_string());

    audit_repo::insert_tx(
        &mut tx,
        audit_repo::AuditRecord {
            company_id: ctx.company_id,
            actor_id: ctx.user_id,
            action: "payment.voided",
            entity_type: "payment",
            entity_id: payment_id,
            details: json!({
                "reason": reason,
                "reversed_allocations": active.iter().map(|a| a.id).collect::<Vec<_>>(),
            }),
        },
    )
    .await?;

    tx.commit().await?;

    let reversals = active.iter().filter(|a| a.journal_entry_id.is_some()).count()
        + usize::from(payment.journal_entry_id.is_some());
    metrics().record_committed_postings(reversals, reversals);

    tracing::info!(
        company_id = %ctx.company_id,
        payment_id = %payment_id,
        reversed_allocations = active.len(),
        "Payment voided"
    );

    Ok(payment)
}

/// A payment with all of its allocations, reversed ones included
pub async fn get_payment(
    pool: &PgPool,
    company_id: Uuid,
    payment_id: Uuid,
) -> Result<(Payment, Vec<PaymentAllocation>), PaymentError> {
    let payment = payment_repo::find(pool, company_id, payment_id)
        .await?
        .ok_or(PaymentError::NotFound(payment_id))?;
    let allocations = allocation_repo::list_for_payment(pool, company_id, payment_id).await?;
    Ok((payment, allocations))
}
