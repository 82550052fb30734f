//! Journal entry business logic service
//!
//! Creates draft entries and posts them. Posting runs inside one
//! transaction: lock the entry, validate lines, accounts and period,
//! update running balances, stamp the entry, then write audit and outbox
//! rows. Any failure rolls the whole thing back.

use chrono::{NaiveDate, Utc};
use serde_json::json;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::context::CompanyContext;
use crate::contracts::journal_entry_v1::{CreateJournalEntryRequest, EntryPostedV1};
use crate::metrics::metrics;
use crate::repos::account_repo::{self, AccountError};
use crate::repos::journal_repo::{
    self, JournalEntry, JournalLine, JournalLineInsert, JournalStatus, NewJournalEntry,
};
use crate::repos::period_repo::{self, PeriodError};
use crate::repos::sequence_repo::{self, SequenceKind};
use crate::repos::{audit_repo, balance_repo, outbox_repo};
use crate::validation::{
    validate_create_request, validate_entry_for_posting, LineAmounts, ValidationError,
};

/// Errors that can occur during journal entry processing
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Period(#[from] PeriodError),

    #[error(transparent)]
    Account(#[from] AccountError),

    #[error("Journal entry not found: {0}")]
    NotFound(Uuid),

    #[error("Journal entry already posted: {0}")]
    AlreadyPosted(Uuid),

    #[error("Journal entry is void: {0}")]
    EntryVoided(Uuid),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl JournalError {
    /// Metric label for business rejections; `None` for infrastructure failures
    pub fn rejection_reason(&self) -> Option<&'static str> {
        match self {
            JournalError::Validation(_) => Some("validation"),
            JournalError::Period(PeriodError::Database(_)) => None,
            JournalError::Period(_) => Some("period"),
            JournalError::Account(AccountError::Database(_)) => None,
            JournalError::Account(_) => Some("account"),
            JournalError::AlreadyPosted(_) | JournalError::EntryVoided(_) => Some("state"),
            JournalError::NotFound(_) | JournalError::Database(_) => None,
        }
    }
}

/// Result type for journal operations
pub type JournalResult<T> = Result<T, JournalError>;

/// An entry generated by the system (receipts, allocations, reversals)
#[derive(Debug, Clone)]
pub struct SystemEntry {
    pub entry_date: NaiveDate,
    pub currency: String,
    pub description: String,
    pub lines: Vec<JournalLineInsert>,
    /// At-most-once key; a second call with the same key returns the first entry
    pub source_key: Option<String>,
    pub reverses_entry_id: Option<Uuid>,
}

/// Build a line for insert with a fresh id
pub fn line_insert(
    line_no: i32,
    account_id: Uuid,
    amounts: LineAmounts,
    memo: Option<String>,
) -> JournalLineInsert {
    JournalLineInsert {
        id: Uuid::new_v4(),
        line_no,
        account_id,
        debit_minor: amounts.debit_minor,
        credit_minor: amounts.credit_minor,
        memo,
    }
}

/// Create a draft entry from an API request, optionally posting it in the
/// same transaction
pub async fn create_draft_entry(
    pool: &PgPool,
    ctx: &CompanyContext,
    req: &CreateJournalEntryRequest,
) -> JournalResult<Uuid> {
    let amounts = validate_create_request(req)?;

    let lines: Vec<JournalLineInsert> = req
        .lines
        .iter()
        .zip(amounts)
        .enumerate()
        .map(|(idx, (line, amount))| {
            line_insert(idx as i32 + 1, line.account_id, amount, line.memo.clone())
        })
        .collect();

    let mut tx = pool.begin().await?;

    let entry_id = insert_draft_tx(
        &mut tx,
        ctx,
        &SystemEntry {
            entry_date: req.entry_date,
            currency: req.currency.clone(),
            description: req.description.clone(),
            lines,
            source_key: None,
            reverses_entry_id: None,
        },
    )
    .await?;

    if req.auto_post {
        post_entry_tx(&mut tx, ctx, entry_id).await?;
    }

    tx.commit().await?;

    if req.auto_post {
        metrics().record_committed_postings(1, 0);
    }

    tracing::info!(
        company_id = %ctx.company_id,
        entry_id = %entry_id,
        auto_post = req.auto_post,
        "Journal entry created"
    );

    Ok(entry_id)
}

/// Post a draft entry
pub async fn post_entry(
    pool: &PgPool,
    ctx: &CompanyContext,
    entry_id: Uuid,
) -> JournalResult<JournalEntry> {
    let mut tx = pool.begin().await?;
    let entry = post_entry_tx(&mut tx, ctx, entry_id).await?;
    tx.commit().await?;
    metrics().record_committed_postings(1, 0);
    Ok(entry)
}

/// Post a draft entry inside the caller's transaction.
///
/// Rejections are counted here; successful posts are counted by whoever
/// commits.
pub async fn post_entry_tx(
    tx: &mut Transaction<'_, Postgres>,
    ctx: &CompanyContext,
    entry_id: Uuid,
) -> JournalResult<JournalEntry> {
    match post_locked_entry(tx, ctx, entry_id).await {
        Ok(entry) => Ok(entry),
        Err(e) => {
            if let Some(reason) = e.rejection_reason() {
                metrics()
                    .posting_rejected_total
                    .with_label_values(&[reason])
                    .inc();
                tracing::warn!(
                    company_id = %ctx.company_id,
                    entry_id = %entry_id,
                    reason,
                    error = %e,
                    "Posting rejected"
                );
            }
            Err(e)
        }
    }
}

async fn post_locked_entry(
    tx: &mut Transaction<'_, Postgres>,
    ctx: &CompanyContext,
    entry_id: Uuid,
) -> JournalResult<JournalEntry> {
    let mut entry = journal_repo::lock_entry_tx(tx, ctx.company_id, entry_id)
        .await?
        .ok_or(JournalError::NotFound(entry_id))?;

    match entry.status {
        JournalStatus::Draft => {}
        JournalStatus::Posted => return Err(JournalError::AlreadyPosted(entry_id)),
        JournalStatus::Void => return Err(JournalError::EntryVoided(entry_id)),
    }

    let lines = journal_repo::fetch_lines_tx(tx, entry_id).await?;
    let amounts: Vec<LineAmounts> = lines.iter().map(JournalLine::amounts).collect();
    let totals = validate_entry_for_posting(&amounts)?;

    for line in &lines {
        account_repo::find_active_by_id_tx(tx, ctx.company_id, line.account_id).await?;
    }

    let period = period_repo::validate_posting_date_tx(tx, ctx.company_id, entry.entry_date).await?;

    for line in &lines {
        balance_repo::apply_line_tx(
            tx,
            ctx.company_id,
            line.account_id,
            &entry.currency,
            line.debit_minor,
            line.credit_minor,
        )
        .await?;
    }

    let posted_at = Utc::now();
    journal_repo::mark_posted_tx(tx, entry_id, ctx.user_id, posted_at).await?;
    entry.status = JournalStatus::Posted;
    entry.posted_by = Some(ctx.user_id);
    entry.posted_at = Some(posted_at);

    audit_repo::insert_tx(
        tx,
        audit_repo::AuditRecord {
            company_id: ctx.company_id,
            actor_id: ctx.user_id,
            action: "journal_entry.posted",
            entity_type: "journal_entry",
            entity_id: entry_id,
            details: json!({
                "entry_number": entry.entry_number,
                "total_minor": totals.debit_minor,
                "period_id": period.id,
            }),
        },
    )
    .await?;

    outbox_repo::insert_outbox_event(
        tx,
        ctx.company_id,
        outbox_repo::EVENT_ENTRY_POSTED,
        "journal_entry",
        entry_id,
        &EntryPostedV1 {
            entry_id,
            entry_number: entry.entry_number.clone(),
            company_id: ctx.company_id,
            entry_date: entry.entry_date,
            currency: entry.currency.clone(),
            total_minor: totals.debit_minor,
            reverses_entry_id: entry.reverses_entry_id,
        },
    )
    .await?;

    tracing::info!(
        company_id = %ctx.company_id,
        entry_id = %entry_id,
        entry_number = %entry.entry_number,
        total_minor = totals.debit_minor,
        line_count = lines.len(),
        "Journal entry posted"
    );

    Ok(entry)
}

/// Create and post a system entry in the caller's transaction.
///
/// With a `source_key`, an entry already recorded under that key is
/// returned instead of posting a second one.
pub async fn create_and_post_entry_tx(
    tx: &mut Transaction<'_, Postgres>,
    ctx: &CompanyContext,
    entry: &SystemEntry,
) -> JournalResult<Uuid> {
    if let Some(ref key) = entry.source_key {
        if let Some(existing) = journal_repo::find_by_source_key_tx(tx, ctx.company_id, key).await? {
            tracing::info!(
                company_id = %ctx.company_id,
                entry_id = %existing.id,
                source_key = %key,
                "Entry already recorded for source key, skipping (idempotency)"
            );
            return Ok(existing.id);
        }
    }

    let entry_id = insert_draft_tx(tx, ctx, entry).await?;
    post_entry_tx(tx, ctx, entry_id).await?;
    Ok(entry_id)
}

async fn insert_draft_tx(
    tx: &mut Transaction<'_, Postgres>,
    ctx: &CompanyContext,
    entry: &SystemEntry,
) -> JournalResult<Uuid> {
    let entry_number = sequence_repo::next_number_tx(
        tx,
        ctx.company_id,
        SequenceKind::JournalEntry,
        entry.entry_date,
    )
    .await?;

    let entry_id = journal_repo::insert_entry(
        tx,
        &NewJournalEntry {
            id: Uuid::new_v4(),
            company_id: ctx.company_id,
            entry_number: &entry_number,
            entry_date: entry.entry_date,
            description: &entry.description,
            currency: &entry.currency,
            created_by: ctx.user_id,
            reverses_entry_id: entry.reverses_entry_id,
            source_key: entry.source_key.as_deref(),
        },
    )
    .await?;

    journal_repo::bulk_insert_lines(tx, entry_id, &entry.lines).await?;

    audit_repo::insert_tx(
        tx,
        audit_repo::AuditRecord {
            company_id: ctx.company_id,
            actor_id: ctx.user_id,
            action: "journal_entry.created",
            entity_type: "journal_entry",
            entity_id: entry_id,
            details: json!({ "entry_number": entry_number, "line_count": entry.lines.len() }),
        },
    )
    .await?;

    Ok(entry_id)
}

/// Fetch an entry with its lines
pub async fn get_entry(
    pool: &PgPool,
    company_id: Uuid,
    entry_id: Uuid,
) -> JournalResult<(JournalEntry, Vec<JournalLine>)> {
    let entry = journal_repo::find_entry(pool, company_id, entry_id)
        .await?
        .ok_or(JournalError::NotFound(entry_id))?;
    let lines = journal_repo::fetch_lines(pool, entry_id).await?;
    Ok((entry, lines))
}
