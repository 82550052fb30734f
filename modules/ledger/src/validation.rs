//! Validation for journal entries
//!
//! Two layers: request shape checks run before anything touches the
//! database, and the posting check runs on the stored minor-unit lines
//! inside the posting transaction.

use crate::contracts::journal_entry_v1::CreateJournalEntryRequest;
use crate::money::{is_valid_currency, to_minor};
use thiserror::Error;

pub const MAX_DESCRIPTION_CHARS: usize = 500;
pub const MAX_MEMO_CHARS: usize = 500;
pub const MAX_REASON_CHARS: usize = 1000;

/// Validation errors for journal entries
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Currency must be a 3-letter uppercase code (ISO 4217), got: {0}")]
    InvalidCurrency(String),

    #[error("Description must be between 1 and 500 characters, got {0} characters")]
    InvalidDescriptionLength(usize),

    #[error("Lines must have at least 2 items, got {0}")]
    InsufficientLines(usize),

    #[error("Line {0}: amount is not a finite number")]
    NonFiniteAmount(usize),

    #[error("Line {0}: amount is outside the supported range")]
    AmountOutOfRange(usize),

    #[error("Entry totals exceed the supported range")]
    TotalOutOfRange,

    #[error("Line {0}: debit must be non-negative, got {1}")]
    NegativeDebit(usize, i64),

    #[error("Line {0}: credit must be non-negative, got {1}")]
    NegativeCredit(usize, i64),

    #[error("Line {0}: exactly one of debit or credit must be set, got both")]
    BothSidesSet(usize),

    #[error("Line {0}: exactly one of debit or credit must be set, got neither")]
    NoAmount(usize),

    #[error("Line {0}: memo exceeds 500 characters, got {1}")]
    MemoTooLong(usize, usize),

    #[error("Total debits ({debit_minor}) must equal total credits ({credit_minor}) in minor units")]
    UnbalancedEntry { debit_minor: i64, credit_minor: i64 },

    #[error("Reason must be between 1 and 1000 characters, got {0} characters")]
    InvalidReasonLength(usize),
}

/// Debit/credit of one line in minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineAmounts {
    pub debit_minor: i64,
    pub credit_minor: i64,
}

impl LineAmounts {
    pub fn debit(minor: i64) -> Self {
        Self { debit_minor: minor, credit_minor: 0 }
    }

    pub fn credit(minor: i64) -> Self {
        Self { debit_minor: 0, credit_minor: minor }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryTotals {
    pub debit_minor: i64,
    pub credit_minor: i64,
}

/// Validate a set of lines for posting
///
/// # Rules
///
/// - at least 2 lines
/// - each line: no negative amount, exactly one side non-zero
/// - total debits equal total credits
///
/// Amounts are already rounded to minor units, so the 0.01 tolerance of
/// the wire format collapses to exact equality here.
pub fn validate_entry_for_posting(lines: &[LineAmounts]) -> Result<EntryTotals, ValidationError> {
    if lines.len() < 2 {
        return Err(ValidationError::InsufficientLines(lines.len()));
    }

    let mut totals = EntryTotals {
        debit_minor: 0,
        credit_minor: 0,
    };

    for (idx, line) in lines.iter().enumerate() {
        validate_line_amounts(idx, line)?;
        totals.debit_minor = totals
            .debit_minor
            .checked_add(line.debit_minor)
            .ok_or(ValidationError::TotalOutOfRange)?;
        totals.credit_minor = totals
            .credit_minor
            .checked_add(line.credit_minor)
            .ok_or(ValidationError::TotalOutOfRange)?;
    }

    if totals.debit_minor != totals.credit_minor {
        return Err(ValidationError::UnbalancedEntry {
            debit_minor: totals.debit_minor,
            credit_minor: totals.credit_minor,
        });
    }

    Ok(totals)
}

fn validate_line_amounts(index: usize, line: &LineAmounts) -> Result<(), ValidationError> {
    if line.debit_minor < 0 {
        return Err(ValidationError::NegativeDebit(index, line.debit_minor));
    }
    if line.credit_minor < 0 {
        return Err(ValidationError::NegativeCredit(index, line.credit_minor));
    }
    match (line.debit_minor > 0, line.credit_minor > 0) {
        (true, true) => Err(ValidationError::BothSidesSet(index)),
        (false, false) => Err(ValidationError::NoAmount(index)),
        _ => Ok(()),
    }
}

/// Validate a draft creation request and convert its lines to minor units.
///
/// Balance is not required for a draft; it is enforced at posting time.
pub fn validate_create_request(
    req: &CreateJournalEntryRequest,
) -> Result<Vec<LineAmounts>, ValidationError> {
    if !is_valid_currency(&req.currency) {
        return Err(ValidationError::InvalidCurrency(req.currency.clone()));
    }

    let desc_len = req.description.chars().count();
    if desc_len == 0 || desc_len > MAX_DESCRIPTION_CHARS {
        return Err(ValidationError::InvalidDescriptionLength(desc_len));
    }

    if req.lines.len() < 2 {
        return Err(ValidationError::InsufficientLines(req.lines.len()));
    }

    let mut amounts = Vec::with_capacity(req.lines.len());
    for (idx, line) in req.lines.iter().enumerate() {
        if !line.debit.is_finite() || !line.credit.is_finite() {
            return Err(ValidationError::NonFiniteAmount(idx));
        }
        if let Some(ref memo) = line.memo {
            let memo_len = memo.chars().count();
            if memo_len > MAX_MEMO_CHARS {
                return Err(ValidationError::MemoTooLong(idx, memo_len));
            }
        }
        let amount = LineAmounts {
            debit_minor: to_minor(line.debit).ok_or(ValidationError::AmountOutOfRange(idx))?,
            credit_minor: to_minor(line.credit).ok_or(ValidationError::AmountOutOfRange(idx))?,
        };
        validate_line_amounts(idx, &amount)?;
        amounts.push(amount);
    }

    Ok(amounts)
}

/// Void and reversal reasons are mandatory free text.
pub fn validate_reason(reason: &str) -> Result<(), ValidationError> {
    let len = reason.trim().chars().count();
    if len == 0 || len > MAX_REASON_CHARS {
        return Err(ValidationError::InvalidReasonLength(len));
    }
    Ok(())
}
