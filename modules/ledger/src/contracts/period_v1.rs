//! Accounting period V1 contract types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::repos::period_repo::{AccountingPeriod, PeriodStatus};

/// Body of `POST /api/ledger/periods`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreatePeriodRequest {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeriodResponse {
    pub id: Uuid,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub status: PeriodStatus,
    pub closed_by: Option<Uuid>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl From<AccountingPeriod> for PeriodResponse {
    fn from(p: AccountingPeriod) -> Self {
        Self {
            id: p.id,
            period_start: p.period_start,
            period_end: p.period_end,
            status: p.status,
            closed_by: p.closed_by,
            closed_at: p.closed_at,
        }
    }
}
