//! Append-only audit trail. Rows are written in the same transaction as
//! the change they describe.

use serde_json::Value;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct AuditRecord<'a> {
    pub company_id: Uuid,
    pub actor_id: Uuid,
    pub action: &'a str,
    pub entity_type: &'a str,
    pub entity_id: Uuid,
    pub details: Value,
}

#[derive(Debug, Clone, FromRow)]
pub struct AuditRow {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub details: Value,
}

pub async fn insert_tx(
    tx: &mut Transaction<'_, Postgres>,
    record: AuditRecord<'_>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO audit_log (id, company_id, actor_id, action, entity_type, entity_id, details)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(record.company_id)
    .bind(record.actor_id)
    .bind(record.action)
    .bind(record.entity_type)
    .bind(record.entity_id)
    .bind(record.details)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

pub async fn list_for_entity(
    pool: &PgPool,
    company_id: Uuid,
    entity_id: Uuid,
) -> Result<Vec<AuditRow>, sqlx::Error> {
    sqlx::query_as::<_, AuditRow>(
        r#"
        SELECT id, actor_id, action, entity_type, entity_id, details
        FROM audit_log
        WHERE company_id = $1 AND entity_id = $2
        ORDER BY created_at, action
        "#,
    )
    .bind(company_id)
    .bind(entity_id)
    .fetch_all(pool)
    .await
}
