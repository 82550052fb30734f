pub mod invoices;
pub mod journal_entries;
pub mod payments;
pub mod periods;

use axum::{
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;

use crate::repos::account_repo::AccountError;
use crate::repos::period_repo::PeriodError;
use crate::services::allocation_service::AllocationError;
use crate::services::allocation_strategy::StrategyError;
use crate::services::invoice_service::InvoiceError;
use crate::services::journal_service::JournalError;
use crate::services::payment_service::PaymentError;
use crate::services::period_service::PeriodServiceError;
use crate::services::reversal_service::ReversalError;
use crate::{health, idempotency, metrics};

/// Error body returned by every endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}

/// Service error translated to an HTTP status and error code
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "validation_error", message)
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "conflict", message)
    }

    fn database(error: &sqlx::Error) -> Self {
        tracing::error!(error = %error, "Database error while handling request");
        // Don't leak internal details
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "database_error", "Database error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse::new(self.code, self.message))).into_response()
    }
}

impl From<PeriodError> for ApiError {
    fn from(error: PeriodError) -> Self {
        match &error {
            PeriodError::NoPeriodForDate { .. } => ApiError::validation(error.to_string()),
            PeriodError::PeriodClosed { .. } => {
                ApiError::new(StatusCode::CONFLICT, "period_closed", error.to_string())
            }
            PeriodError::Database(e) => ApiError::database(e),
        }
    }
}

impl From<AccountError> for ApiError {
    fn from(error: AccountError) -> Self {
        match &error {
            AccountError::NotFound { .. } | AccountError::Inactive { .. } => {
                ApiError::validation(error.to_string())
            }
            AccountError::Database(e) => ApiError::database(e),
        }
    }
}

impl From<JournalError> for ApiError {
    fn from(error: JournalError) -> Self {
        match error {
            JournalError::Validation(e) => ApiError::validation(e.to_string()),
            JournalError::Period(e) => e.into(),
            JournalError::Account(e) => e.into(),
            JournalError::NotFound(_) => ApiError::not_found(error.to_string()),
            JournalError::AlreadyPosted(_) | JournalError::EntryVoided(_) => {
                ApiError::conflict(error.to_string())
            }
            JournalError::Database(ref e) => ApiError::database(e),
        }
    }
}

impl From<ReversalError> for ApiError {
    fn from(error: ReversalError) -> Self {
        match error {
            ReversalError::Validation(e) => ApiError::validation(e.to_string()),
            ReversalError::EntryNotFound(_) => ApiError::not_found(error.to_string()),
            ReversalError::NotPosted(_)
            | ReversalError::AlreadyVoid(_)
            | ReversalError::AlreadyReversed(_)
            | ReversalError::CannotReverseReversal(_) => ApiError::conflict(error.to_string()),
            ReversalError::Journal(e) => e.into(),
            ReversalError::Database(ref e) => ApiError::database(e),
        }
    }
}

impl From<PeriodServiceError> for ApiError {
    fn from(error: PeriodServiceError) -> Self {
        match error {
            PeriodServiceError::InvalidRange { .. } => ApiError::validation(error.to_string()),
            PeriodServiceError::NotFound(_) => ApiError::not_found(error.to_string()),
            PeriodServiceError::Overlap(_) | PeriodServiceError::InvalidTransition { .. } => {
                ApiError::conflict(error.to_string())
            }
            PeriodServiceError::Database(ref e) => ApiError::database(e),
        }
    }
}

impl From<InvoiceError> for ApiError {
    fn from(error: InvoiceError) -> Self {
        match error {
            InvoiceError::InvalidCurrency(_)
            | InvoiceError::NonPositiveTotal
            | InvoiceError::TotalOutOfRange
            | InvoiceError::DueBeforeIssue { .. } => ApiError::validation(error.to_string()),
            InvoiceError::NotFound(_) => ApiError::not_found(error.to_string()),
            InvoiceError::NotDraft { .. } => ApiError::conflict(error.to_string()),
            InvoiceError::Database(ref e) => ApiError::database(e),
        }
    }
}

impl From<AllocationError> for ApiError {
    fn from(error: AllocationError) -> Self {
        match error {
            AllocationError::Validation(e) => ApiError::validation(e.to_string()),
            AllocationError::PaymentNotFound(_)
            | AllocationError::InvoiceNotFound(_)
            | AllocationError::AllocationNotFound(_) => ApiError::not_found(error.to_string()),
            AllocationError::EmptyAllocation
            | AllocationError::DuplicateInvoice(_)
            | AllocationError::NonPositiveAmount(_)
            | AllocationError::CustomerMismatch(_)
            | AllocationError::CurrencyMismatch { .. }
            | AllocationError::ExceedsInvoiceBalance { .. }
            | AllocationError::ExceedsPaymentRemaining { .. } => {
                ApiError::validation(error.to_string())
            }
            AllocationError::PaymentVoid(_)
            | AllocationError::InvoiceNotPayable { .. }
            | AllocationError::AlreadyReversed(_) => ApiError::conflict(error.to_string()),
            AllocationError::Journal(e) => e.into(),
            AllocationError::Reversal(e) => e.into(),
            AllocationError::Database(ref e) => ApiError::database(e),
        }
    }
}

impl From<StrategyError> for ApiError {
    fn from(error: StrategyError) -> Self {
        ApiError::validation(error.to_string())
    }
}

impl From<PaymentError> for ApiError {
    fn from(error: PaymentError) -> Self {
        match error {
            PaymentError::InvalidCurrency(_)
            | PaymentError::NonPositiveAmount
            | PaymentError::AmountOutOfRange
            | PaymentError::InvalidMethod => ApiError::validation(error.to_string()),
            PaymentError::Validation(e) => ApiError::validation(e.to_string()),
            PaymentError::NotFound(_) => ApiError::not_found(error.to_string()),
            PaymentError::AlreadyVoid(_) => ApiError::conflict(error.to_string()),
            PaymentError::Allocation(e) => e.into(),
            PaymentError::Journal(e) => e.into(),
            PaymentError::Reversal(e) => e.into(),
            PaymentError::Database(ref e) => ApiError::database(e),
        }
    }
}

/// Full HTTP surface of the service
pub fn ledger_router(pool: PgPool) -> Router {
    let state = Arc::new(pool);

    let api = Router::new()
        .route("/api/ledger/journal-entries", post(journal_entries::create_entry))
        .route("/api/ledger/journal-entries/{id}", get(journal_entries::get_entry))
        .route("/api/ledger/journal-entries/{id}/post", post(journal_entries::post_entry))
        .route("/api/ledger/journal-entries/{id}/void", post(journal_entries::void_entry))
        .route("/api/ledger/journal-entries/{id}/reverse", post(journal_entries::reverse_entry))
        .route("/api/ledger/periods", post(periods::create_period))
        .route("/api/ledger/periods/{id}/close", post(periods::close_period))
        .route("/api/ledger/periods/{id}/reopen", post(periods::reopen_period))
        .route("/api/ledger/periods/{id}/lock", post(periods::lock_period))
        .route("/api/ar/invoices", post(invoices::create_invoice))
        .route("/api/ar/invoices/{id}", get(invoices::get_invoice))
        .route("/api/ar/invoices/{id}/send", post(invoices::send_invoice))
        .route(
            "/api/ar/invoices/{id}/allocations/reverse",
            post(invoices::reverse_invoice_allocations),
        )
        .route("/api/ar/customers/{customer_id}/balance", get(invoices::customer_balance))
        .route("/api/ar/payments", post(payments::record_payment))
        .route("/api/ar/payments/{id}", get(payments::get_payment))
        .route("/api/ar/payments/{id}/allocations", post(payments::allocate_payment))
        .route("/api/ar/payments/{id}/auto-allocate", post(payments::auto_allocate_payment))
        .route(
            "/api/ar/payments/{id}/allocations/{allocation_id}/reverse",
            post(payments::reverse_allocation),
        )
        .route("/api/ar/payments/{id}/void", post(payments::void_payment))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            idempotency::check_idempotency,
        ));

    Router::new()
        .route("/api/health", get(health::health))
        .route("/api/ready", get(health::ready))
        .route("/metrics", get(metrics::metrics_handler))
        .merge(api)
        .with_state(state)
}
