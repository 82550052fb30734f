pub mod journal_entry_v1;
pub mod payment_v1;
pub mod period_v1;
