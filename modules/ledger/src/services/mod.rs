pub mod allocation_service;
pub mod allocation_strategy;
pub mod invoice_service;
pub mod journal_service;
pub mod payment_service;
pub mod period_service;
pub mod reversal_service;
