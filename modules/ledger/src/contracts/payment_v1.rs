//! Receivables V1 contract types: invoices, payments and allocations.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::from_minor;
use crate::repos::allocation_repo::{AllocationMethod, PaymentAllocation};
use crate::repos::invoice_repo::{Invoice, InvoiceStatus};
use crate::repos::payment_repo::{Payment, PaymentStatus};
use crate::services::allocation_service::AllocationOutcome;
use crate::services::allocation_strategy::AllocationStrategy;
use crate::services::invoice_service::{CurrencyBalance, CustomerBalanceSummary, InvoiceBalance};

/// Body of `POST /api/ar/invoices`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateInvoiceRequest {
    pub customer_id: Uuid,
    pub currency: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub total: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvoiceResponse {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub invoice_number: String,
    pub currency: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub total: f64,
    pub paid: f64,
    pub balance: f64,
    pub status: InvoiceStatus,
}

impl From<Invoice> for InvoiceResponse {
    fn from(i: Invoice) -> Self {
        Self {
            id: i.id,
            customer_id: i.customer_id,
            invoice_number: i.invoice_number,
            currency: i.currency,
            issue_date: i.issue_date,
            due_date: i.due_date,
            total: from_minor(i.total_minor),
            paid: from_minor(i.paid_minor),
            balance: from_minor(i.balance_minor),
            status: i.status,
        }
    }
}

/// Body of `POST /api/ar/payments`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordPaymentRequest {
    pub customer_id: Uuid,
    pub payment_date: NaiveDate,
    /// e.g. "bank_transfer", "check", "card"
    pub method: String,
    #[serde(default)]
    pub reference: Option<String>,
    pub amount: f64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub payment_number: String,
    pub payment_date: NaiveDate,
    pub method: String,
    pub reference: Option<String>,
    pub amount: f64,
    pub currency: String,
    pub status: PaymentStatus,
    pub journal_entry_id: Option<Uuid>,
}

impl From<Payment> for PaymentResponse {
    fn from(p: Payment) -> Self {
        Self {
            id: p.id,
            customer_id: p.customer_id,
            payment_number: p.payment_number,
            payment_date: p.payment_date,
            method: p.method,
            reference: p.reference,
            amount: from_minor(p.amount_minor),
            currency: p.currency,
            status: p.status,
            journal_entry_id: p.journal_entry_id,
        }
    }
}

/// Body of `POST /api/ar/payments/{id}/allocations`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AllocatePaymentRequest {
    pub allocations: Vec<AllocationLineRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AllocationLineRequest {
    pub invoice_id: Uuid,
    pub amount: f64,
}

/// Body of `POST /api/ar/payments/{id}/auto-allocate`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutoAllocateRequest {
    pub strategy: AllocationStrategy,
    /// Reference date for overdue checks; defaults to today
    #[serde(default)]
    pub as_of: Option<NaiveDate>,
    /// Required by `percentage_based`
    #[serde(default)]
    pub percentages: Vec<InvoicePercentage>,
    /// Required by `custom_priority`; invoices to pay first, in order
    #[serde(default)]
    pub priority: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvoicePercentage {
    pub invoice_id: Uuid,
    /// Share of the payment's unallocated amount, 0 < percent <= 100
    pub percent: f64,
}

/// Body of `POST /api/ar/invoices/{id}/allocations/reverse`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReverseInvoiceAllocationsRequest {
    pub reason: String,
    /// Stop before the reversed total would exceed this amount
    #[serde(default)]
    pub max_amount: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReverseInvoiceAllocationsResponse {
    pub invoice_id: Uuid,
    pub reversed_count: usize,
    pub reversed_total: f64,
    pub allocations: Vec<AllocationResponse>,
}

/// Body of allocation reverse and payment void
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReasonRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AllocationResponse {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub invoice_id: Uuid,
    pub amount: f64,
    pub method: AllocationMethod,
    pub strategy: Option<String>,
    pub journal_entry_id: Option<Uuid>,
    pub reversed_at: Option<DateTime<Utc>>,
    pub reversed_by: Option<Uuid>,
    pub reversal_reason: Option<String>,
}

impl From<PaymentAllocation> for AllocationResponse {
    fn from(a: PaymentAllocation) -> Self {
        Self {
            id: a.id,
            payment_id: a.payment_id,
            invoice_id: a.invoice_id,
            amount: from_minor(a.amount_minor),
            method: a.method,
            strategy: a.strategy,
            journal_entry_id: a.journal_entry_id,
            reversed_at: a.reversed_at,
            reversed_by: a.reversed_by,
            reversal_reason: a.reversal_reason,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AllocationOutcomeResponse {
    pub payment_id: Uuid,
    pub payment_status: PaymentStatus,
    pub total_allocated: f64,
    pub remaining: f64,
    pub allocations: Vec<AllocationResponse>,
}

impl From<AllocationOutcome> for AllocationOutcomeResponse {
    fn from(o: AllocationOutcome) -> Self {
        Self {
            payment_id: o.payment_id,
            payment_status: o.payment_status,
            total_allocated: from_minor(o.total_allocated_minor),
            remaining: from_minor(o.remaining_minor),
            allocations: o.allocations.into_iter().map(Into::into).collect(),
        }
    }
}

/// Body of `GET /api/ar/payments/{id}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentDetailResponse {
    #[serde(flatten)]
    pub payment: PaymentResponse,
    pub allocations: Vec<AllocationResponse>,
}

/// Body of `GET /api/ar/customers/{customer_id}/balance`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomerBalanceResponse {
    pub customer_id: Uuid,
    pub as_of: NaiveDate,
    pub balances: Vec<CurrencyBalanceResponse>,
    pub invoices: Vec<InvoiceBalanceResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurrencyBalanceResponse {
    pub currency: String,
    pub open_invoices: usize,
    pub balance_due: f64,
    pub overdue: f64,
    pub unallocated_payments: f64,
    /// Balance due less unallocated payments; negative means credit
    pub net_balance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvoiceBalanceResponse {
    pub id: Uuid,
    pub invoice_number: String,
    pub currency: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub total: f64,
    pub paid: f64,
    pub balance: f64,
    pub status: InvoiceStatus,
    pub days_overdue: i64,
}

impl From<CurrencyBalance> for CurrencyBalanceResponse {
    fn from(b: CurrencyBalance) -> Self {
        Self {
            currency: b.currency,
            open_invoices: b.open_invoices,
            balance_due: from_minor(b.balance_due_minor),
            overdue: from_minor(b.overdue_minor),
            unallocated_payments: from_minor(b.unallocated_minor),
            net_balance: from_minor(b.net_minor),
        }
    }
}

impl From<InvoiceBalance> for InvoiceBalanceResponse {
    fn from(b: InvoiceBalance) -> Self {
        let days_overdue = b.days_overdue;
        let i = b.invoice;
        Self {
            id: i.id,
            invoice_number: i.invoice_number,
            currency: i.currency,
            issue_date: i.issue_date,
            due_date: i.due_date,
            total: from_minor(i.total_minor),
            paid: from_minor(i.paid_minor),
            balance: from_minor(i.balance_minor),
            status: i.status,
            days_overdue,
        }
    }
}

impl From<CustomerBalanceSummary> for CustomerBalanceResponse {
    fn from(s: CustomerBalanceSummary) -> Self {
        Self {
            customer_id: s.customer_id,
            as_of: s.as_of,
            balances: s.balances.into_iter().map(Into::into).collect(),
            invoices: s.invoices.into_iter().map(Into::into).collect(),
        }
    }
}

/// Outbox payload for `payments.payment.allocated`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentAllocatedV1 {
    pub payment_id: Uuid,
    pub company_id: Uuid,
    pub method: AllocationMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<AllocationStrategy>,
    pub allocations: Vec<AllocatedInvoiceV1>,
    pub remaining_minor: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AllocatedInvoiceV1 {
    pub allocation_id: Uuid,
    pub invoice_id: Uuid,
    pub amount_minor: i64,
}

/// Outbox payload for `payments.allocation.reversed`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AllocationReversedV1 {
    pub allocation_id: Uuid,
    pub payment_id: Uuid,
    pub invoice_id: Uuid,
    pub company_id: Uuid,
    pub amount_minor: i64,
    pub reason: String,
}
