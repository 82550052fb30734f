//! Void and reversal integration tests
//!
//! Voiding never deletes a posted entry; it posts an equal-and-opposite
//! entry and links the two. Reversals cannot be stacked.

use ledger_rs::repos::balance_repo::find_balance;
use ledger_rs::repos::journal_repo::JournalStatus;
use ledger_rs::repos::outbox_repo::{self, EVENT_ENTRY_POSTED, EVENT_ENTRY_REVERSED, EVENT_ENTRY_VOIDED};
use ledger_rs::services::journal_service;
use ledger_rs::services::reversal_service::{self, ReversalError};
use ledger_rs::validation::ValidationError;
use serial_test::serial;
use sqlx::PgPool;
use uuid::Uuid;

mod common;
use common::{entry_request, seed_company, setup_pool, today, TestCompany};

async fn posted_entry(pool: &PgPool, company: &TestCompany, amount: f64) -> Uuid {
    let req = entry_request(
        today(),
        &[(company.cash, amount, 0.0), (company.revenue, 0.0, amount)],
        true,
    );
    journal_service::create_draft_entry(pool, &company.ctx, &req)
        .await
        .expect("post entry")
}

#[tokio::test]
#[serial]
async fn voiding_a_draft_marks_it_void_without_reversal() {
    let Some(pool) = setup_pool().await else { return };
    let company = seed_company(&pool).await;

    let req = entry_request(
        today(),
        &[(company.cash, 40.0, 0.0), (company.revenue, 0.0, 40.0)],
        false,
    );
    let entry_id = journal_service::create_draft_entry(&pool, &company.ctx, &req)
        .await
        .unwrap();

    let outcome = reversal_service::void_entry(&pool, &company.ctx, entry_id, "Entered twice")
        .await
        .unwrap();
    assert_eq!(outcome.entry_id, entry_id);
    assert_eq!(outcome.reversal_entry_id, None);

    let (entry, _) = journal_service::get_entry(&pool, company.ctx.company_id, entry_id)
        .await
        .unwrap();
    assert_eq!(entry.status, JournalStatus::Void);
    assert_eq!(entry.void_reason.as_deref(), Some("Entered twice"));
    assert_eq!(entry.voided_by, Some(company.ctx.user_id));

    // A void draft can no longer be posted
    let err = journal_service::post_entry(&pool, &company.ctx, entry_id)
        .await
        .unwrap_err();
    assert!(matches!(err, journal_service::JournalError::EntryVoided(_)));
}

#[tokio::test]
#[serial]
async fn voiding_a_posted_entry_creates_opposite_entry() {
    let Some(pool) = setup_pool().await else { return };
    let company = seed_company(&pool).await;
    let entry_id = posted_entry(&pool, &company, 100.0).await;

    let outcome = reversal_service::void_entry(&pool, &company.ctx, entry_id, "Wrong customer")
        .await
        .unwrap();
    let reversal_id = outcome.reversal_entry_id.expect("posted void has a reversal");

    let (original, original_lines) =
        journal_service::get_entry(&pool, company.ctx.company_id, entry_id)
            .await
            .unwrap();
    assert_eq!(original.status, JournalStatus::Void);
    assert_eq!(original.reversed_by_entry_id, Some(reversal_id));
    assert_eq!(original_lines.len(), 2, "original lines are kept");

    let (reversal, reversal_lines) =
        journal_service::get_entry(&pool, company.ctx.company_id, reversal_id)
            .await
            .unwrap();
    assert_eq!(reversal.status, JournalStatus::Posted);
    assert_eq!(reversal.reverses_entry_id, Some(entry_id));
    assert_eq!(reversal.entry_date, today());
    assert!(reversal.description.starts_with("REVERSAL: "));

    for (orig, rev) in original_lines.iter().zip(&reversal_lines) {
        assert_eq!(orig.account_id, rev.account_id);
        assert_eq!(orig.debit_minor, rev.credit_minor);
        assert_eq!(orig.credit_minor, rev.debit_minor);
    }

    let cash = find_balance(&pool, company.ctx.company_id, company.cash, "USD")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cash.debit_total_minor, 10000);
    assert_eq!(cash.credit_total_minor, 10000);
    assert_eq!(cash.net_minor(), 0);

    let events = outbox_repo::event_types_for(&pool, company.ctx.company_id, entry_id)
        .await
        .unwrap();
    assert!(events.contains(&EVENT_ENTRY_POSTED.to_string()));
    assert!(events.contains(&EVENT_ENTRY_REVERSED.to_string()));
    assert!(events.contains(&EVENT_ENTRY_VOIDED.to_string()));
}

#[tokio::test]
#[serial]
async fn reverse_keeps_original_posted_and_links_both_ways() {
    let Some(pool) = setup_pool().await else { return };
    let company = seed_company(&pool).await;
    let entry_id = posted_entry(&pool, &company, 12.34).await;

    let outcome =
        reversal_service::reverse_entry(&pool, &company.ctx, entry_id, None, Some("Accrual reversal"))
            .await
            .unwrap();
    assert_eq!(outcome.original_entry_id, entry_id);

    let (original, _) = journal_service::get_entry(&pool, company.ctx.company_id, entry_id)
        .await
        .unwrap();
    assert_eq!(original.status, JournalStatus::Posted);
    assert_eq!(original.reversed_by_entry_id, Some(outcome.reversal_entry_id));

    let err = reversal_service::reverse_entry(&pool, &company.ctx, entry_id, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ReversalError::AlreadyReversed(id) if id == entry_id));

    let err = reversal_service::void_entry(&pool, &company.ctx, entry_id, "again")
        .await
        .unwrap_err();
    assert!(matches!(err, ReversalError::AlreadyReversed(_)));
}

#[tokio::test]
#[serial]
async fn reversal_of_a_reversal_is_rejected() {
    let Some(pool) = setup_pool().await else { return };
    let company = seed_company(&pool).await;
    let entry_id = posted_entry(&pool, &company, 50.0).await;

    let outcome = reversal_service::reverse_entry(&pool, &company.ctx, entry_id, None, None)
        .await
        .unwrap();

    let err = reversal_service::reverse_entry(
        &pool,
        &company.ctx,
        outcome.reversal_entry_id,
        None,
        None,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ReversalError::CannotReverseReversal(_)));

    let err = reversal_service::void_entry(&pool, &company.ctx, outcome.reversal_entry_id, "no")
        .await
        .unwrap_err();
    assert!(matches!(err, ReversalError::CannotReverseReversal(_)));
}

#[tokio::test]
#[serial]
async fn draft_cannot_be_reversed_and_void_needs_a_reason() {
    let Some(pool) = setup_pool().await else { return };
    let company = seed_company(&pool).await;

    let req = entry_request(
        today(),
        &[(company.cash, 5.0, 0.0), (company.revenue, 0.0, 5.0)],
        false,
    );
    let entry_id = journal_service::create_draft_entry(&pool, &company.ctx, &req)
        .await
        .unwrap();

    let err = reversal_service::reverse_entry(&pool, &company.ctx, entry_id, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ReversalError::NotPosted(_)));

    let err = reversal_service::void_entry(&pool, &company.ctx, entry_id, "   ")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReversalError::Validation(ValidationError::InvalidReasonLength(0))
    ));

    let err = reversal_service::void_entry(&pool, &company.ctx, Uuid::new_v4(), "gone")
        .await
        .unwrap_err();
    assert!(matches!(err, ReversalError::EntryNotFound(_)));
}

#[tokio::test]
#[serial]
async fn posted_entries_cannot_be_deleted_or_edited() {
    let Some(pool) = setup_pool().await else { return };
    let company = seed_company(&pool).await;
    let entry_id = posted_entry(&pool, &company, 75.0).await;

    let delete = sqlx::query("DELETE FROM journal_entries WHERE id = $1")
        .bind(entry_id)
        .execute(&pool)
        .await;
    assert!(delete.is_err(), "deleting a posted entry must fail");

    let edit = sqlx::query("UPDATE journal_lines SET debit_minor = debit_minor + 1 WHERE journal_entry_id = $1")
        .bind(entry_id)
        .execute(&pool)
        .await;
    assert!(edit.is_err(), "editing posted lines must fail");

    let (entry, lines) = journal_service::get_entry(&pool, company.ctx.company_id, entry_id)
        .await
        .unwrap();
    assert_eq!(entry.status, JournalStatus::Posted);
    assert_eq!(lines.iter().map(|l| l.debit_minor).sum::<i64>(), 7500);
}
