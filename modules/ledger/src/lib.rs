pub mod config;
pub mod context;
pub mod contracts;
pub mod db;
pub mod health;
pub mod idempotency;
pub mod metrics;
pub mod money;
pub mod repos;
pub mod routes;
pub mod services;
pub mod validation;

pub use routes::ledger_router;
