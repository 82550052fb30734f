//! Outbox repository for reliable event publishing
//!
//! Uses the transactional outbox pattern to ensure events are persisted
//! within the same transaction as domain changes. A relay outside this
//! service publishes rows and stamps `published_at`.

use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

pub const EVENT_ENTRY_POSTED: &str = "ledger.entry.posted";
pub const EVENT_ENTRY_VOIDED: &str = "ledger.entry.voided";
pub const EVENT_ENTRY_REVERSED: &str = "ledger.entry.reversed";
pub const EVENT_PAYMENT_ALLOCATED: &str = "payments.payment.allocated";
pub const EVENT_ALLOCATION_REVERSED: &str = "payments.allocation.reversed";

/// Insert an event into the outbox for later publishing
pub async fn insert_outbox_event(
    tx: &mut Transaction<'_, Postgres>,
    company_id: Uuid,
    event_type: &str,
    aggregate_type: &str,
    aggregate_id: Uuid,
    payload: &impl Serialize,
) -> Result<Uuid, sqlx::Error> {
    let event_id = Uuid::new_v4();
    let payload = serde_json::to_value(payload).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

    sqlx::query(
        r#"
        INSERT INTO events_outbox
            (event_id, company_id, event_type, aggregate_type, aggregate_id, payload)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(event_id)
    .bind(company_id)
    .bind(event_type)
    .bind(aggregate_type)
    .bind(aggregate_id.to_string())
    .bind(payload)
    .execute(&mut **tx)
    .await?;

    Ok(event_id)
}

/// Event types recorded for an aggregate, oldest first
pub async fn event_types_for(
    pool: &PgPool,
    company_id: Uuid,
    aggregate_id: Uuid,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT event_type FROM events_outbox
        WHERE company_id = $1 AND aggregate_id = $2
        ORDER BY created_at, event_type
        "#,
    )
    .bind(company_id)
    .bind(aggregate_id.to_string())
    .fetch_all(pool)
    .await
}
