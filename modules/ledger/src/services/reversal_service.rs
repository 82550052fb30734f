//! Reversal service for creating inverse journal entries
//!
//! Posted entries are never edited or deleted. Undoing one creates a new
//! posted entry with debit and credit swapped, linked both ways through
//! `reverses_entry_id` / `reversed_by_entry_id`. Voiding a posted entry is
//! a reversal plus a status change on the original; voiding a draft is a
//! plain status change.

use chrono::{NaiveDate, Utc};
use serde_json::json;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::context::CompanyContext;
use crate::contracts::journal_entry_v1::{EntryReversedV1, ReversalOutcome, VoidOutcome};
use crate::metrics::metrics;
use crate::repos::journal_repo::{self, JournalEntry, JournalLine, JournalLineInsert, JournalStatus};
use crate::repos::{audit_repo, outbox_repo};
use crate::services::journal_service::{self, JournalError, SystemEntry};
use crate::validation::{validate_reason, ValidationError};

/// Errors that can occur during void and reversal operations
#[derive(Debug, thiserror::Error)]
pub enum ReversalError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Original entry not found: {0}")]
    EntryNotFound(Uuid),

    #[error("Only posted entries can be reversed: {0}")]
    NotPosted(Uuid),

    #[error("Entry is already void: {0}")]
    AlreadyVoid(Uuid),

    #[error("Entry already reversed: {0}")]
    AlreadyReversed(Uuid),

    #[error("Entry is itself a reversal and cannot be reversed or voided: {0}")]
    CannotReverseReversal(Uuid),

    #[error("Posting reversal failed: {0}")]
    Journal(#[from] JournalError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result type for reversal operations
pub type ReversalResult<T> = Result<T, ReversalError>;

/// Inverse lines: same accounts, debit and credit swapped
pub fn build_reversal_lines(lines: &[JournalLine]) -> Vec<JournalLineInsert> {
    lines
        .iter()
        .map(|line| JournalLineInsert {
            id: Uuid::new_v4(),
            line_no: line.line_no,
            account_id: line.account_id,
            debit_minor: line.credit_minor,
            credit_minor: line.debit_minor,
            memo: line.memo.as_ref().map(|m| format!("REVERSAL: {}", m)),
        })
        .collect()
}

fn ensure_reversible(entry: &JournalEntry) -> ReversalResult<()> {
    match entry.status {
        JournalStatus::Posted => {}
        JournalStatus::Draft => return Err(ReversalError::NotPosted(entry.id)),
        JournalStatus::Void => return Err(ReversalError::AlreadyVoid(entry.id)),
    }
    if entry.reverses_entry_id.is_some() {
        return Err(ReversalError::CannotReverseReversal(entry.id));
    }
    if entry.reversed_by_entry_id.is_some() {
        return Err(ReversalError::AlreadyReversed(entry.id));
    }
    Ok(())
}

/// Reverse a posted entry; the original stays posted
pub async fn reverse_entry(
    pool: &PgPool,
    ctx: &CompanyContext,
    original_entry_id: Uuid,
    reversal_date: Option<NaiveDate>,
    reason: Option<&str>,
) -> ReversalResult<ReversalOutcome> {
    if let Some(reason) = reason {
        validate_reason(reason)?;
    }
    let reversal_date = reversal_date.unwrap_or_else(|| Utc::now().date_naive());

    let mut tx = pool.begin().await?;
    let reversal_entry_id =
        reverse_entry_tx(&mut tx, ctx, original_entry_id, reversal_date, reason).await?;
    tx.commit().await?;

    metrics().record_committed_postings(1, 1);

    Ok(ReversalOutcome {
        original_entry_id,
        reversal_entry_id,
    })
}

/// Reverse a posted entry inside the caller's transaction.
///
/// The reversal is posted on `reversal_date`, which must fall in an open
/// period; the original's period is not consulted.
pub async fn reverse_entry_tx(
    tx: &mut Transaction<'_, Postgres>,
    ctx: &CompanyContext,
    original_entry_id: Uuid,
    reversal_date: NaiveDate,
    reason: Option<&str>,
) -> ReversalResult<Uuid> {
    let original = journal_repo::lock_entry_tx(tx, ctx.company_id, original_entry_id)
        .await?
        .ok_or(ReversalError::EntryNotFound(original_entry_id))?;

    if let Err(e) = ensure_reversible(&original) {
        tracing::warn!(
            company_id = %ctx.company_id,
            original_entry_id = %original_entry_id,
            error = %e,
            "Reversal rejected"
        );
        return Err(e);
    }

    let original_lines = journal_repo::fetch_lines_tx(tx, original_entry_id).await?;

    let reversal_entry_id = journal_service::create_and_post_entry_tx(
        tx,
        ctx,
        &SystemEntry {
            entry_date: reversal_date,
            currency: original.currency.clone(),
            description: format!("REVERSAL: {}", original.description),
            lines: build_reversal_lines(&original_lines),
            source_key: None,
            reverses_entry_id: Some(original_entry_id),
        },
    )
    .await?;

    journal_repo::link_reversal_tx(tx, original_entry_id, reversal_entry_id).await?;

    audit_repo::insert_tx(
        tx,
        audit_repo::AuditRecord {
            company_id: ctx.company_id,
            actor_id: ctx.user_id,
            action: "journal_entry.reversed",
            entity_type: "journal_entry",
            entity_id: original_entry_id,
            details: json!({
                "reversal_entry_id": reversal_entry_id,
                "reversal_date": reversal_date,
                "reason": reason,
            }),
        },
    )
    .await?;

    outbox_repo::insert_outbox_event(
        tx,
        ctx.company_id,
        outbox_repo::EVENT_ENTRY_REVERSED,
        "journal_entry",
        original_entry_id,
        &EntryReversedV1 {
            original_entry_id,
            reversal_entry_id: Some(reversal_entry_id),
            company_id: ctx.company_id,
            reason: reason.map(str::to_string),
        },
    )
    .await?;

    tracing::info!(
        company_id = %ctx.company_id,
        original_entry_id = %original_entry_id,
        reversal_entry_id = %reversal_entry_id,
        "Reversal entry created successfully"
    );

    Ok(reversal_entry_id)
}

/// Void an entry.
///
/// Draft: marked void, nothing else. Posted: a reversal dated today is
/// posted and the original is marked void and linked to it.
pub async fn void_entry(
    pool: &PgPool,
    ctx: &CompanyContext,
    entry_id: Uuid,
    reason: &str,
) -> ReversalResult<VoidOutcome> {
    validate_reason(reason)?;

    let mut tx = pool.begin().await?;

    let entry = journal_repo::lock_entry_tx(&mut tx, ctx.company_id, entry_id)
        .await?
        .ok_or(ReversalError::EntryNotFound(entry_id))?;

    let (reversal_entry_id, kind) = match entry.status {
        JournalStatus::Void => return Err(ReversalError::AlreadyVoid(entry_id)),
        JournalStatus::Draft => (None, "void_draft"),
        JournalStatus::Posted => {
            ensure_reversible(&entry)?;
            let today = Utc::now().date_naive();
            let reversal_id =
                reverse_entry_tx(&mut tx, ctx, entry_id, today, Some(reason)).await?;
            (Some(reversal_id), "void_posted")
        }
    };

    journal_repo::mark_void_tx(&mut tx, entry_id, ctx.user_id, reason).await?;

    audit_repo::insert_tx(
        &mut tx,
        audit_repo::AuditRecord {
            company_id: ctx.company_id,
            actor_id: ctx.user_id,
            action: "journal_entry.voided",
            entity_type: "journal_entry",
            entity_id: entry_id,
            details: json!({
                "previous_status": entry.status,
                "reversal_entry_id": reversal_entry_id,
                "reason": reason,
            }),
        },
    )
    .await?;

    outbox_repo::insert_outbox_event(
        &mut tx,
        ctx.company_id,
        outbox_repo::EVENT_ENTRY_VOIDED,
        "journal_entry",
        entry_id,
        &EntryReversedV1 {
            original_entry_id: entry_id,
            reversal_entry_id,
            company_id: ctx.company_id,
            reason: Some(reason.to_string()),
        },
    )
    .await?;

    tx.commit().await?;

    if reversal_entry_id.is_some() {
        metrics().record_committed_postings(1, 1);
    }
    metrics().entries_voided_total.with_label_values(&[kind]).inc();

    tracing::info!(
        company_id = %ctx.company_id,
        entry_id = %entry_id,
        reversal_entry_id = ?reversal_entry_id,
        kind,
        "Journal entry voided"
    );

    Ok(VoidOutcome {
        entry_id,
        reversal_entry_id,
    })
}
