//! Payment allocation integration tests
//!
//! - Manual allocation keeps invoice balance == total - active allocations
//! - Over-allocation of the payment or an invoice is rejected atomically
//! - Strategy-driven auto allocation
//! - Customer balance summary
//! - Ledger postings when the company has ledger settings

use chrono::Duration;
use ledger_rs::repos::allocation_repo::AllocationMethod;
use ledger_rs::repos::balance_repo::find_balance;
use ledger_rs::repos::invoice_repo::InvoiceStatus;
use ledger_rs::repos::journal_repo::{self, JournalStatus};
use ledger_rs::repos::outbox_repo::{self, EVENT_PAYMENT_ALLOCATED};
use ledger_rs::repos::payment_repo::PaymentStatus;
use ledger_rs::services::allocation_service::{self, AllocationError, AllocationInput};
use ledger_rs::services::allocation_strategy::{AllocationStrategy, StrategyOptions};
use ledger_rs::services::{invoice_service, payment_service};
use serial_test::serial;
use sqlx::PgPool;
use uuid::Uuid;

mod common;
use common::{enable_ledger_settings, payment, seed_company, sent_invoice, setup_pool, today};

/// Balance must equal total minus the sum of non-reversed allocations
async fn assert_invoice_consistent(pool: &PgPool, company_id: Uuid, invoice_id: Uuid) {
    let invoice = invoice_service::get_invoice(pool, company_id, invoice_id)
        .await
        .unwrap();
    let allocated: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount_minor), 0)::BIGINT FROM payment_allocations WHERE invoice_id = $1 AND reversed_at IS NULL",
    )
    .bind(invoice_id)
    .fetch_one(pool)
    .await
    .unwrap();
    assert_eq!(invoice.paid_minor, allocated);
    assert_eq!(invoice.balance_minor, invoice.total_minor - allocated);
}

#[tokio::test]
#[serial]
async fn manual_allocation_settles_invoice_and_payment() {
    let Some(pool) = setup_pool().await else { return };
    let company = seed_company(&pool).await;
    let customer = Uuid::new_v4();

    let invoice = sent_invoice(&pool, &company, customer, 100.0, today(), today() + Duration::days(30)).await;
    let pay = payment(&pool, &company, customer, 100.0).await;
    assert_eq!(pay.status, PaymentStatus::Pending);
    assert!(pay.payment_number.starts_with("PAY-"));

    let outcome = allocation_service::allocate_payment(
        &pool,
        &company.ctx,
        pay.id,
        &[AllocationInput { invoice_id: invoice.id, amount_minor: 4000 }],
    )
    .await
    .unwrap();
    assert_eq!(outcome.payment_status, PaymentStatus::Pending);
    assert_eq!(outcome.total_allocated_minor, 4000);
    assert_eq!(outcome.remaining_minor, 6000);
    assert_eq!(outcome.allocations[0].method, AllocationMethod::Manual);

    let partial = invoice_service::get_invoice(&pool, company.ctx.company_id, invoice.id)
        .await
        .unwrap();
    assert_eq!(partial.status, InvoiceStatus::Partial);
    assert_eq!(partial.balance_minor, 6000);
    assert_invoice_consistent(&pool, company.ctx.company_id, invoice.id).await;

    let outcome = allocation_service::allocate_payment(
        &pool,
        &company.ctx,
        pay.id,
        &[AllocationInput { invoice_id: invoice.id, amount_minor: 6000 }],
    )
    .await
    .unwrap();
    assert_eq!(outcome.payment_status, PaymentStatus::Completed);
    assert_eq!(outcome.remaining_minor, 0);

    let paid = invoice_service::get_invoice(&pool, company.ctx.company_id, invoice.id)
        .await
        .unwrap();
    assert_eq!(paid.status, InvoiceStatus::Paid);
    assert_eq!(paid.balance_minor, 0);
    assert_invoice_consistent(&pool, company.ctx.company_id, invoice.id).await;

    let events = outbox_repo::event_types_for(&pool, company.ctx.company_id, pay.id)
        .await
        .unwrap();
    assert_eq!(events.iter().filter(|e| *e == EVENT_PAYMENT_ALLOCATED).count(), 2);
}

#[tokio::test]
#[serial]
async fn allocating_more_than_remaining_is_rejected() {
    let Some(pool) = setup_pool().await else { return };
    let company = seed_company(&pool).await;
    let customer = Uuid::new_v4();

    let first = sent_invoice(&pool, &company, customer, 80.0, today(), today()).await;
    let second = sent_invoice(&pool, &company, customer, 80.0, today(), today()).await;
    let pay = payment(&pool, &company, customer, 100.0).await;

    let err = allocation_service::allocate_payment(
        &pool,
        &company.ctx,
        pay.id,
        &[
            AllocationInput { invoice_id: first.id, amount_minor: 8000 },
            AllocationInput { invoice_id: second.id, amount_minor: 3000 },
        ],
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        AllocationError::ExceedsPaymentRemaining { requested_minor: 11000, remaining_minor: 10000 }
    ));

    // Nothing from the rejected request was written
    let (_, allocations) = payment_service::get_payment(&pool, company.ctx.company_id, pay.id)
        .await
        .unwrap();
    assert!(allocations.is_empty());
    assert_invoice_consistent(&pool, company.ctx.company_id, first.id).await;
}

#[tokio::test]
#[serial]
async fn allocating_more_than_invoice_balance_is_rejected() {
    let Some(pool) = setup_pool().await else { return };
    let company = seed_company(&pool).await;
    let customer = Uuid::new_v4();

    let invoice = sent_invoice(&pool, &company, customer, 50.0, today(), today()).await;
    let pay = payment(&pool, &company, customer, 100.0).await;

    let err = allocation_service::allocate_payment(
        &pool,
        &company.ctx,
        pay.id,
        &[AllocationInput { invoice_id: invoice.id, amount_minor: 5001 }],
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        AllocationError::ExceedsInvoiceBalance { requested_minor: 5001, balance_minor: 5000, .. }
    ));
}

#[tokio::test]
#[serial]
async fn invoice_must_be_sent_and_belong_to_payment_customer() {
    let Some(pool) = setup_pool().await else { return };
    let company = seed_company(&pool).await;
    let customer = Uuid::new_v4();
    let pay = payment(&pool, &company, customer, 100.0).await;

    let draft = invoice_service::create_invoice(
        &pool,
        &company.ctx,
        &ledger_rs::contracts::payment_v1::CreateInvoiceRequest {
            customer_id: customer,
            currency: "USD".into(),
            issue_date: today(),
            due_date: today(),
            total: 10.0,
        },
    )
    .await
    .unwrap();
    let err = allocation_service::allocate_payment(
        &pool,
        &company.ctx,
        pay.id,
        &[AllocationInput { invoice_id: draft.id, amount_minor: 1000 }],
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        AllocationError::InvoiceNotPayable { status: InvoiceStatus::Draft, .. }
    ));

    let foreign = sent_invoice(&pool, &company, Uuid::new_v4(), 10.0, today(), today()).await;
    let err = allocation_service::allocate_payment(
        &pool,
        &company.ctx,
        pay.id,
        &[AllocationInput { invoice_id: foreign.id, amount_minor: 1000 }],
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AllocationError::CustomerMismatch(id) if id == foreign.id));

    let err = allocation_service::allocate_payment(
        &pool,
        &company.ctx,
        pay.id,
        &[AllocationInput { invoice_id: Uuid::new_v4(), amount_minor: 1000 }],
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AllocationError::InvoiceNotFound(_)));
}

#[tokio::test]
#[serial]
async fn fifo_pays_oldest_due_first() {
    let Some(pool) = setup_pool().await else { return };
    let company = seed_company(&pool).await;
    let customer = Uuid::new_v4();

    let newest = sent_invoice(&pool, &company, customer, 100.0, today(), today() + Duration::days(30)).await;
    let oldest = sent_invoice(&pool, &company, customer, 100.0, today() - Duration::days(60), today() - Duration::days(30)).await;
    let middle = sent_invoice(&pool, &company, customer, 100.0, today(), today()).await;
    let pay = payment(&pool, &company, customer, 150.0).await;

    let outcome = allocation_service::auto_allocate_payment(
        &pool,
        &company.ctx,
        pay.id,
        AllocationStrategy::Fifo,
        &StrategyOptions::default(),
        today(),
    )
    .await
    .unwrap();

    let by_invoice: Vec<(Uuid, i64)> = outcome
        .allocations
        .iter()
        .map(|a| (a.invoice_id, a.amount_minor))
        .collect();
    assert_eq!(by_invoice, vec![(oldest.id, 10000), (middle.id, 5000)]);
    assert_eq!(outcome.payment_status, PaymentStatus::Completed);
    assert!(outcome
        .allocations
        .iter()
        .all(|a| a.method == AllocationMethod::Automatic && a.strategy.as_deref() == Some("fifo")));

    let untouched = invoice_service::get_invoice(&pool, company.ctx.company_id, newest.id)
        .await
        .unwrap();
    assert_eq!(untouched.balance_minor, 10000);
    for id in [oldest.id, middle.id, newest.id] {
        assert_invoice_consistent(&pool, company.ctx.company_id, id).await;
    }
}

#[tokio::test]
#[serial]
async fn proportional_splits_by_balance() {
    let Some(pool) = setup_pool().await else { return };
    let company = seed_company(&pool).await;
    let customer = Uuid::new_v4();

    let small = sent_invoice(&pool, &company, customer, 100.0, today(), today()).await;
    let large = sent_invoice(&pool, &company, customer, 300.0, today(), today() + Duration::days(1)).await;
    let pay = payment(&pool, &company, customer, 200.0).await;

    let outcome = allocation_service::auto_allocate_payment(
        &pool,
        &company.ctx,
        pay.id,
        AllocationStrategy::Proportional,
        &StrategyOptions::default(),
        today(),
    )
    .await
    .unwrap();

    let amount_for = |id: Uuid| {
        outcome
            .allocations
            .iter()
            .find(|a| a.invoice_id == id)
            .map(|a| a.amount_minor)
    };
    assert_eq!(amount_for(small.id), Some(5000));
    assert_eq!(amount_for(large.id), Some(15000));
    assert_eq!(outcome.remaining_minor, 0);
}

#[tokio::test]
#[serial]
async fn overdue_first_and_largest_first_order_invoices() {
    let Some(pool) = setup_pool().await else { return };
    let company = seed_company(&pool).await;
    let customer = Uuid::new_v4();

    let current_big = sent_invoice(&pool, &company, customer, 500.0, today(), today() + Duration::days(10)).await;
    let overdue_small = sent_invoice(&pool, &company, customer, 50.0, today() - Duration::days(40), today() - Duration::days(10)).await;

    let pay = payment(&pool, &company, customer, 50.0).await;
    let outcome = allocation_service::auto_allocate_payment(
        &pool,
        &company.ctx,
        pay.id,
        AllocationStrategy::OverdueFirst,
        &StrategyOptions::default(),
        today(),
    )
    .await
    .unwrap();
    assert_eq!(outcome.allocations.len(), 1);
    assert_eq!(outcome.allocations[0].invoice_id, overdue_small.id);

    let pay = payment(&pool, &company, customer, 50.0).await;
    let outcome = allocation_service::auto_allocate_payment(
        &pool,
        &company.ctx,
        pay.id,
        AllocationStrategy::LargestFirst,
        &StrategyOptions::default(),
        today(),
    )
    .await
    .unwrap();
    assert_eq!(outcome.allocations.len(), 1);
    assert_eq!(outcome.allocations[0].invoice_id, current_big.id);
}

#[tokio::test]
#[serial]
async fn percentage_based_splits_by_requested_share() {
    let Some(pool) = setup_pool().await else { return };
    let company = seed_company(&pool).await;
    let customer = Uuid::new_v4();

    let first = sent_invoice(&pool, &company, customer, 100.0, today(), today()).await;
    let second = sent_invoice(&pool, &company, customer, 300.0, today(), today() + Duration::days(1)).await;
    let skipped = sent_invoice(&pool, &company, customer, 50.0, today(), today() + Duration::days(2)).await;
    let pay = payment(&pool, &company, customer, 200.0).await;

    // 60% of 200 is 120, capped at the first invoice's 100
    let options = StrategyOptions::build(
        AllocationStrategy::PercentageBased,
        &[(first.id, 60.0), (second.id, 25.0)],
        &[],
    )
    .unwrap();
    let outcome = allocation_service::auto_allocate_payment(
        &pool,
        &company.ctx,
        pay.id,
        AllocationStrategy::PercentageBased,
        &options,
        today(),
    )
    .await
    .unwrap();

    let by_invoice: Vec<(Uuid, i64)> = outcome
        .allocations
        .iter()
        .map(|a| (a.invoice_id, a.amount_minor))
        .collect();
    assert_eq!(by_invoice, vec![(first.id, 10000), (second.id, 5000)]);
    assert_eq!(outcome.remaining_minor, 5000);
    assert_eq!(outcome.payment_status, PaymentStatus::Pending);
    assert!(outcome
        .allocations
        .iter()
        .all(|a| a.strategy.as_deref() == Some("percentage_based")));

    for id in [first.id, second.id, skipped.id] {
        assert_invoice_consistent(&pool, company.ctx.company_id, id).await;
    }
}

#[tokio::test]
#[serial]
async fn custom_priority_pays_chosen_invoices_first() {
    let Some(pool) = setup_pool().await else { return };
    let company = seed_company(&pool).await;
    let customer = Uuid::new_v4();

    let oldest = sent_invoice(&pool, &company, customer, 100.0, today() - Duration::days(60), today() - Duration::days(30)).await;
    let newest = sent_invoice(&pool, &company, customer, 100.0, today(), today() + Duration::days(30)).await;
    let pay = payment(&pool, &company, customer, 150.0).await;

    let options =
        StrategyOptions::build(AllocationStrategy::CustomPriority, &[], &[newest.id]).unwrap();
    let outcome = allocation_service::auto_allocate_payment(
        &pool,
        &company.ctx,
        pay.id,
        AllocationStrategy::CustomPriority,
        &options,
        today(),
    )
    .await
    .unwrap();

    let by_invoice: Vec<(Uuid, i64)> = outcome
        .allocations
        .iter()
        .map(|a| (a.invoice_id, a.amount_minor))
        .collect();
    assert_eq!(by_invoice, vec![(newest.id, 10000), (oldest.id, 5000)]);
    assert_eq!(outcome.payment_status, PaymentStatus::Completed);
}

#[tokio::test]
#[serial]
async fn customer_balance_nets_unallocated_payments() {
    let Some(pool) = setup_pool().await else { return };
    let company = seed_company(&pool).await;
    let customer = Uuid::new_v4();

    let overdue = sent_invoice(&pool, &company, customer, 100.0, today() - Duration::days(40), today() - Duration::days(10)).await;
    let current = sent_invoice(&pool, &company, customer, 250.0, today(), today() + Duration::days(20)).await;
    let pay = payment(&pool, &company, customer, 80.0).await;
    allocation_service::allocate_payment(
        &pool,
        &company.ctx,
        pay.id,
        &[AllocationInput { invoice_id: overdue.id, amount_minor: 3000 }],
    )
    .await
    .unwrap();

    let summary = invoice_service::customer_balance_summary(
        &pool,
        company.ctx.company_id,
        customer,
        today(),
    )
    .await
    .unwrap();

    assert_eq!(summary.balances.len(), 1);
    let usd = &summary.balances[0];
    assert_eq!(usd.open_invoices, 2);
    assert_eq!(usd.balance_due_minor, 7000 + 25000);
    assert_eq!(usd.overdue_minor, 7000);
    assert_eq!(usd.unallocated_minor, 5000);
    assert_eq!(usd.net_minor, 32000 - 5000);

    let ids: Vec<Uuid> = summary.invoices.iter().map(|i| i.invoice.id).collect();
    assert_eq!(ids, vec![overdue.id, current.id]);
    assert_eq!(summary.invoices[0].days_overdue, 10);
}

#[tokio::test]
#[serial]
async fn auto_allocation_without_open_invoices_changes_nothing() {
    let Some(pool) = setup_pool().await else { return };
    let company = seed_company(&pool).await;
    let pay = payment(&pool, &company, Uuid::new_v4(), 75.0).await;

    let outcome = allocation_service::auto_allocate_payment(
        &pool,
        &company.ctx,
        pay.id,
        AllocationStrategy::Fifo,
        &StrategyOptions::default(),
        today(),
    )
    .await
    .unwrap();
    assert!(outcome.allocations.is_empty());
    assert_eq!(outcome.remaining_minor, 7500);
    assert_eq!(outcome.payment_status, PaymentStatus::Pending);
}

#[tokio::test]
#[serial]
async fn ledger_settings_post_receipt_and_allocation_entries() {
    let Some(pool) = setup_pool().await else { return };
    let company = seed_company(&pool).await;
    enable_ledger_settings(&pool, &company).await;
    let customer = Uuid::new_v4();

    let invoice = sent_invoice(&pool, &company, customer, 60.0, today(), today()).await;
    let pay = payment(&pool, &company, customer, 100.0).await;

    let receipt_id = pay.journal_entry_id.expect("receipt entry");
    let receipt = journal_repo::find_entry(&pool, company.ctx.company_id, receipt_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(receipt.status, JournalStatus::Posted);
    assert_eq!(receipt.source_key, Some(format!("payment_receipt:{}", pay.id)));

    let outcome = allocation_service::allocate_payment(
        &pool,
        &company.ctx,
        pay.id,
        &[AllocationInput { invoice_id: invoice.id, amount_minor: 6000 }],
    )
    .await
    .unwrap();
    let allocation = &outcome.allocations[0];
    let entry_id = allocation.journal_entry_id.expect("allocation entry");
    let entry = journal_repo::find_entry(&pool, company.ctx.company_id, entry_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.source_key, Some(format!("payment_allocation:{}", allocation.id)));

    let cash = find_balance(&pool, company.ctx.company_id, company.cash, "USD")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cash.net_minor(), 10000);

    let unapplied = find_balance(&pool, company.ctx.company_id, company.unapplied_cash, "USD")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unapplied.credit_total_minor, 10000);
    assert_eq!(unapplied.debit_total_minor, 6000);

    let receivable = find_balance(&pool, company.ctx.company_id, company.receivable, "USD")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(receivable.credit_total_minor, 6000);
}
