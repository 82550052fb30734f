pub mod account_repo;
pub mod allocation_repo;
pub mod audit_repo;
pub mod balance_repo;
pub mod invoice_repo;
pub mod journal_repo;
pub mod outbox_repo;
pub mod payment_repo;
pub mod period_repo;
pub mod sequence_repo;
pub mod settings_repo;
