//! Period enforcement integration tests
//!
//! Entries only post into open periods; closed periods can be reopened,
//! locked periods cannot.

use chrono::NaiveDate;
use ledger_rs::repos::journal_repo::JournalStatus;
use ledger_rs::repos::period_repo::{PeriodError, PeriodStatus};
use ledger_rs::services::journal_service::{self, JournalError};
use ledger_rs::services::period_service::{self, PeriodServiceError};
use ledger_rs::services::reversal_service::{self, ReversalError};
use serial_test::serial;

mod common;
use common::{entry_request, seed_company, setup_pool, today};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[tokio::test]
#[serial]
async fn posting_into_closed_period_is_rejected_until_reopened() {
    let Some(pool) = setup_pool().await else { return };
    let company = seed_company(&pool).await;

    let period = period_service::create_period(&pool, &company.ctx, date(2020, 1, 1), date(2020, 12, 31))
        .await
        .unwrap();
    let closed = period_service::close_period(&pool, &company.ctx, period.id)
        .await
        .unwrap();
    assert_eq!(closed.status, PeriodStatus::Closed);
    assert_eq!(closed.closed_by, Some(company.ctx.user_id));

    let req = entry_request(
        date(2020, 6, 15),
        &[(company.cash, 10.0, 0.0), (company.revenue, 0.0, 10.0)],
        false,
    );
    let entry_id = journal_service::create_draft_entry(&pool, &company.ctx, &req)
        .await
        .expect("drafts may be dated in closed periods");

    let err = journal_service::post_entry(&pool, &company.ctx, entry_id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        JournalError::Period(PeriodError::PeriodClosed { status: PeriodStatus::Closed, .. })
    ));

    let reopened = period_service::reopen_period(&pool, &company.ctx, period.id)
        .await
        .unwrap();
    assert_eq!(reopened.status, PeriodStatus::Open);
    assert_eq!(reopened.closed_at, None);

    let posted = journal_service::post_entry(&pool, &company.ctx, entry_id)
        .await
        .unwrap();
    assert_eq!(posted.status, JournalStatus::Posted);
}

#[tokio::test]
#[serial]
async fn locked_period_rejects_posting_and_cannot_reopen() {
    let Some(pool) = setup_pool().await else { return };
    let company = seed_company(&pool).await;

    let period = period_service::create_period(&pool, &company.ctx, date(2021, 1, 1), date(2021, 12, 31))
        .await
        .unwrap();
    period_service::lock_period(&pool, &company.ctx, period.id)
        .await
        .unwrap();

    let req = entry_request(
        date(2021, 3, 1),
        &[(company.cash, 10.0, 0.0), (company.revenue, 0.0, 10.0)],
        true,
    );
    let err = journal_service::create_draft_entry(&pool, &company.ctx, &req)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        JournalError::Period(PeriodError::PeriodClosed { status: PeriodStatus::Locked, .. })
    ));

    let err = period_service::reopen_period(&pool, &company.ctx, period.id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PeriodServiceError::InvalidTransition {
            from: PeriodStatus::Locked,
            to: PeriodStatus::Open,
            ..
        }
    ));
}

#[tokio::test]
#[serial]
async fn date_outside_every_period_is_rejected() {
    let Some(pool) = setup_pool().await else { return };
    let company = seed_company(&pool).await;

    let req = entry_request(
        date(2019, 7, 4),
        &[(company.cash, 10.0, 0.0), (company.revenue, 0.0, 10.0)],
        true,
    );
    let err = journal_service::create_draft_entry(&pool, &company.ctx, &req)
        .await
        .unwrap_err();
    assert!(matches!(err, JournalError::Period(PeriodError::NoPeriodForDate { .. })));
}

#[tokio::test]
#[serial]
async fn reversal_dated_in_closed_period_is_rejected() {
    let Some(pool) = setup_pool().await else { return };
    let company = seed_company(&pool).await;

    let period = period_service::create_period(&pool, &company.ctx, date(2020, 1, 1), date(2020, 12, 31))
        .await
        .unwrap();
    period_service::close_period(&pool, &company.ctx, period.id)
        .await
        .unwrap();

    let req = entry_request(
        today(),
        &[(company.cash, 10.0, 0.0), (company.revenue, 0.0, 10.0)],
        true,
    );
    let entry_id = journal_service::create_draft_entry(&pool, &company.ctx, &req)
        .await
        .unwrap();

    let err = reversal_service::reverse_entry(&pool, &company.ctx, entry_id, Some(date(2020, 12, 31)), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReversalError::Journal(JournalError::Period(PeriodError::PeriodClosed { .. }))
    ));

    let (entry, _) = journal_service::get_entry(&pool, company.ctx.company_id, entry_id)
        .await
        .unwrap();
    assert_eq!(entry.reversed_by_entry_id, None, "failed reversal leaves no link");
}

#[tokio::test]
#[serial]
async fn overlapping_and_inverted_periods_are_rejected() {
    let Some(pool) = setup_pool().await else { return };
    let company = seed_company(&pool).await;

    let err = period_service::create_period(&pool, &company.ctx, date(2030, 6, 1), date(2030, 5, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, PeriodServiceError::InvalidRange { .. }));

    // seed_company already covers the whole current year
    let err = period_service::create_period(&pool, &company.ctx, today(), today())
        .await
        .unwrap_err();
    assert!(matches!(err, PeriodServiceError::Overlap(id) if id == company.period_id));
}
