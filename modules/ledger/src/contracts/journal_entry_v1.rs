//! Journal entry V1 contract types
//!
//! Request/response bodies for the journal entry endpoints and the payloads
//! written to the outbox for `ledger.entry.*` events. Amounts are currency
//! units on the wire; they are rounded to minor units once, on the way in.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::from_minor;
use crate::repos::journal_repo::{JournalEntry, JournalLine, JournalStatus};

/// Body of `POST /api/ledger/journal-entries`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateJournalEntryRequest {
    /// Accounting date (YYYY-MM-DD)
    pub entry_date: NaiveDate,

    /// ISO 4217 currency code
    pub currency: String,

    /// 1-500 characters
    pub description: String,

    #[serde(default)]
    pub lines: Vec<JournalLineInput>,

    /// Post in the same transaction as creation
    #[serde(default)]
    pub auto_post: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JournalLineInput {
    pub account_id: Uuid,

    #[serde(default)]
    pub debit: f64,

    #[serde(default)]
    pub credit: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoidJournalEntryRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReverseJournalEntryRequest {
    /// Defaults to today
    #[serde(default)]
    pub reversal_date: Option<NaiveDate>,

    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JournalEntryResponse {
    pub id: Uuid,
    pub entry_number: String,
    pub entry_date: NaiveDate,
    pub description: String,
    pub status: JournalStatus,
    pub currency: String,
    pub created_by: Uuid,
    pub posted_by: Option<Uuid>,
    pub posted_at: Option<DateTime<Utc>>,
    pub voided_by: Option<Uuid>,
    pub voided_at: Option<DateTime<Utc>>,
    pub void_reason: Option<String>,
    pub reverses_entry_id: Option<Uuid>,
    pub reversed_by_entry_id: Option<Uuid>,
    pub total_debit: f64,
    pub total_credit: f64,
    pub lines: Vec<JournalLineResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JournalLineResponse {
    pub line_no: i32,
    pub account_id: Uuid,
    pub debit: f64,
    pub credit: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

impl JournalEntryResponse {
    pub fn from_parts(entry: JournalEntry, lines: Vec<JournalLine>) -> Self {
        let total_debit = lines.iter().fold(0i64, |t, l| t.saturating_add(l.debit_minor));
        let total_credit = lines.iter().fold(0i64, |t, l| t.saturating_add(l.credit_minor));
        Self {
            id: entry.id,
            entry_number: entry.entry_number,
            entry_date: entry.entry_date,
            description: entry.description,
            status: entry.status,
            currency: entry.currency,
            created_by: entry.created_by,
            posted_by: entry.posted_by,
            posted_at: entry.posted_at,
            voided_by: entry.voided_by,
            voided_at: entry.voided_at,
            void_reason: entry.void_reason,
            reverses_entry_id: entry.reverses_entry_id,
            reversed_by_entry_id: entry.reversed_by_entry_id,
            total_debit: from_minor(total_debit),
            total_credit: from_minor(total_credit),
            lines: lines
                .into_iter()
                .map(|l| JournalLineResponse {
                    line_no: l.line_no,
                    account_id: l.account_id,
                    debit: from_minor(l.debit_minor),
                    credit: from_minor(l.credit_minor),
                    memo: l.memo,
                })
                .collect(),
        }
    }
}

/// Result of `POST .../void`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoidOutcome {
    pub entry_id: Uuid,
    /// Present when the voided entry had been posted
    pub reversal_entry_id: Option<Uuid>,
}

/// Result of `POST .../reverse`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReversalOutcome {
    pub original_entry_id: Uuid,
    pub reversal_entry_id: Uuid,
}

/// Outbox payload for `ledger.entry.posted`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntryPostedV1 {
    pub entry_id: Uuid,
    pub entry_number: String,
    pub company_id: Uuid,
    pub entry_date: NaiveDate,
    pub currency: String,
    pub total_minor: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reverses_entry_id: Option<Uuid>,
}

/// Outbox payload for `ledger.entry.voided` and `ledger.entry.reversed`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntryReversedV1 {
    pub original_entry_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reversal_entry_id: Option<Uuid>,
    pub company_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
