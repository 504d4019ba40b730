mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::Span;

use common::fake_accrual::{FakeAccrual, Reply};
use common::{num, setup_ledger, user_with_orders};
use loyalty::accrual::{AccrualClient, Scorer, Verdict};
use loyalty::ledger::{OrderLedger, SqlxLedger};
use loyalty::metrics::Counters;
use loyalty::model::{OrderStatus, Points};
use loyalty::pipeline::{FetchStage, Pipeline, Reconciler};
use loyalty::scheduler::{CycleOutcome, Scheduler, spawn_scheduler};

fn build_scheduler(
    ledger: Arc<SqlxLedger>,
    base_url: &str,
    timeout: Duration,
    period: Duration,
) -> (Scheduler<AccrualClient, SqlxLedger>, Counters) {
    let client = Arc::new(AccrualClient::new(base_url, timeout).unwrap());
    let counters = Counters::default();
    let pipeline = Pipeline::new(
        FetchStage::new(client, 4, Span::none()),
        Reconciler::new(ledger.clone(), counters.clone(), Span::none()),
    );
    let scheduler = Scheduler::new(ledger, pipeline, period, counters.clone(), Span::none());
    (scheduler, counters)
}

#[tokio::test]
async fn processed_and_unknown_orders_are_settled_in_one_cycle() {
    let (_db, ledger) = setup_ledger().await;
    let ledger = Arc::new(ledger);
    let (a, b) = (num("12345678903"), num("79927398713"));
    let alice = user_with_orders(&ledger, "alice", &[a.clone(), b.clone()]).await;

    let fake = FakeAccrual::default();
    fake.set("12345678903", Reply::processed("12345678903", 50.0));
    // "79927398713" is unknown to the service and gets 204.
    let base = fake.start().await;

    let (scheduler, _) = build_scheduler(
        ledger.clone(),
        &base,
        Duration::from_secs(5),
        Duration::from_secs(1),
    );

    let outcome = scheduler.run_cycle(&CancellationToken::new()).await;
    let CycleOutcome::Completed(report) = outcome else {
        panic!("unexpected outcome {outcome:?}");
    };
    assert_eq!(report.polled, 2);
    assert_eq!(report.applied, 2);

    let stored_a = ledger.order(&a).await.unwrap().unwrap();
    assert_eq!(stored_a.status, OrderStatus::Processed);
    assert_eq!(stored_a.accrual, Points::from_hundredths(5_000));

    let stored_b = ledger.order(&b).await.unwrap().unwrap();
    assert_eq!(stored_b.status, OrderStatus::Invalid);
    assert!(stored_b.accrual.is_zero());

    assert_eq!(
        ledger.balance(&alice).await.unwrap().current,
        Points::from_hundredths(5_000)
    );
    assert!(ledger.list_pending_orders().await.unwrap().is_empty());
}

#[tokio::test]
async fn rate_limited_order_stays_pending_until_scored() {
    let (_db, ledger) = setup_ledger().await;
    let ledger = Arc::new(ledger);
    let order = num("12345678903");
    let alice = user_with_orders(&ledger, "alice", &[order.clone()]).await;

    let fake = FakeAccrual::default();
    fake.set("12345678903", Reply::Status(StatusCode::TOO_MANY_REQUESTS));
    let base = fake.start().await;

    let (scheduler, counters) = build_scheduler(
        ledger.clone(),
        &base,
        Duration::from_secs(5),
        Duration::from_secs(1),
    );

    let outcome = scheduler.run_cycle(&CancellationToken::new()).await;
    assert!(matches!(outcome, CycleOutcome::Completed(r) if r.deferred == 1));
    assert_eq!(
        ledger.order(&order).await.unwrap().unwrap().status,
        OrderStatus::New
    );
    assert_eq!(ledger.list_pending_orders().await.unwrap(), vec![order.clone()]);

    fake.set("12345678903", Reply::processed("12345678903", 12.5));
    scheduler.run_cycle(&CancellationToken::new()).await;

    assert_eq!(
        ledger.balance(&alice).await.unwrap().current,
        Points::from_hundredths(1_250)
    );
    assert_eq!(Counters::get(&counters.verdicts_deferred), 1);
    assert_eq!(Counters::get(&counters.verdicts_applied), 1);
}

#[tokio::test]
async fn intermediate_statuses_advance_without_credit() {
    let (_db, ledger) = setup_ledger().await;
    let ledger = Arc::new(ledger);
    let order = num("12345678903");
    let alice = user_with_orders(&ledger, "alice", &[order.clone()]).await;

    let fake = FakeAccrual::default();
    fake.set("12345678903", Reply::status("12345678903", "REGISTERED"));
    let base = fake.start().await;
    let (scheduler, _) = build_scheduler(
        ledger.clone(),
        &base,
        Duration::from_secs(5),
        Duration::from_secs(1),
    );

    scheduler.run_cycle(&CancellationToken::new()).await;
    assert_eq!(
        ledger.order(&order).await.unwrap().unwrap().status,
        OrderStatus::Registered
    );

    fake.set("12345678903", Reply::status("12345678903", "PROCESSING"));
    scheduler.run_cycle(&CancellationToken::new()).await;
    assert_eq!(
        ledger.order(&order).await.unwrap().unwrap().status,
        OrderStatus::Processing
    );
    assert!(ledger.balance(&alice).await.unwrap().current.is_zero());
    assert_eq!(ledger.list_pending_orders().await.unwrap(), vec![order]);
}

#[tokio::test]
async fn settled_orders_are_not_polled_or_credited_again() {
    let (_db, ledger) = setup_ledger().await;
    let ledger = Arc::new(ledger);
    let order = num("12345678903");
    let alice = user_with_orders(&ledger, "alice", &[order.clone()]).await;

    let fake = FakeAccrual::default();
    fake.set("12345678903", Reply::processed("12345678903", 50.0));
    let base = fake.start().await;
    let (scheduler, _) = build_scheduler(
        ledger.clone(),
        &base,
        Duration::from_secs(5),
        Duration::from_secs(1),
    );

    scheduler.run_cycle(&CancellationToken::new()).await;
    let second = scheduler.run_cycle(&CancellationToken::new()).await;

    assert_eq!(second, CycleOutcome::Idle);
    assert_eq!(fake.hit_count(), 1);
    assert_eq!(
        ledger.balance(&alice).await.unwrap().current,
        Points::from_hundredths(5_000)
    );
}

#[tokio::test]
async fn empty_ledger_makes_no_requests() {
    let (_db, ledger) = setup_ledger().await;
    let fake = FakeAccrual::default();
    let base = fake.start().await;

    let (scheduler, counters) = build_scheduler(
        Arc::new(ledger),
        &base,
        Duration::from_secs(5),
        Duration::from_secs(1),
    );

    assert_eq!(
        scheduler.run_cycle(&CancellationToken::new()).await,
        CycleOutcome::Idle
    );
    assert_eq!(fake.hit_count(), 0);
    assert_eq!(Counters::get(&counters.idle_cycles), 1);
}

#[tokio::test]
async fn timed_out_call_leaves_order_pending() {
    let (_db, ledger) = setup_ledger().await;
    let ledger = Arc::new(ledger);
    let slow = num("12345678903");
    let fast = num("79927398713");
    user_with_orders(&ledger, "alice", &[slow.clone(), fast.clone()]).await;

    let fake = FakeAccrual::default();
    fake.set("12345678903", Reply::Hang);
    fake.set("79927398713", Reply::status("79927398713", "INVALID"));
    let base = fake.start().await;

    let (scheduler, _) = build_scheduler(
        ledger.clone(),
        &base,
        Duration::from_millis(200),
        Duration::from_secs(1),
    );

    let outcome = tokio::time::timeout(
        Duration::from_secs(10),
        scheduler.run_cycle(&CancellationToken::new()),
    )
    .await
    .expect("a hung accrual call must not stall the cycle");

    assert!(matches!(outcome, CycleOutcome::Completed(r) if r.failed == 1 && r.applied == 1));
    assert_eq!(ledger.list_pending_orders().await.unwrap(), vec![slow]);
    assert_eq!(
        ledger.order(&fast).await.unwrap().unwrap().status,
        OrderStatus::Invalid
    );
}

#[tokio::test]
async fn client_reads_numeric_order_and_server_errors() {
    let fake = FakeAccrual::default();
    fake.set(
        "12345678903",
        Reply::Json(serde_json::json!({ "order": 12345678903u64, "status": "PROCESSED", "accrual": 729.98 })),
    );
    fake.set("79927398713", Reply::Status(StatusCode::SERVICE_UNAVAILABLE));
    fake.set("2377225624", Reply::Status(StatusCode::NOT_FOUND));
    let base = fake.start().await;

    let client = AccrualClient::new(&base, Duration::from_secs(5)).unwrap();

    assert_eq!(
        client.score(&num("12345678903")).await,
        Verdict::Resolved {
            status: OrderStatus::Processed,
            accrual: Points::from_hundredths(72_998),
        }
    );
    assert_eq!(client.score(&num("79927398713")).await, Verdict::Deferred);
    assert!(matches!(
        client.score(&num("2377225624")).await,
        Verdict::Failed(_)
    ));
    assert_eq!(client.score(&num("346436439")).await, Verdict::invalid());
    assert_eq!(fake.hits().len(), 4);
}

#[tokio::test]
async fn unreachable_service_fails_softly() {
    // Port 9 (discard) on loopback is expected to refuse connections.
    let client = AccrualClient::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
    assert!(matches!(
        client.score(&num("12345678903")).await,
        Verdict::Failed(_)
    ));
}

#[tokio::test]
async fn scheduler_loop_settles_orders_and_stops_on_cancel() {
    let (_db, ledger) = setup_ledger().await;
    let ledger = Arc::new(ledger);
    let order = num("12345678903");
    let alice = user_with_orders(&ledger, "alice", &[order.clone()]).await;

    let fake = FakeAccrual::default();
    fake.set("12345678903", Reply::Status(StatusCode::TOO_MANY_REQUESTS));
    let base = fake.start().await;

    let (scheduler, counters) = build_scheduler(
        ledger.clone(),
        &base,
        Duration::from_secs(5),
        Duration::from_millis(20),
    );
    let cancel = CancellationToken::new();
    let handle = spawn_scheduler(scheduler, cancel.clone());

    // The first poll is rate limited; the service recovers afterwards.
    tokio::time::sleep(Duration::from_millis(50)).await;
    fake.set("12345678903", Reply::processed("12345678903", 3.0));

    let settled = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let o = ledger.order(&order).await.unwrap().unwrap();
            if o.status == OrderStatus::Processed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(settled.is_ok(), "order never reached PROCESSED");

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("scheduler must stop promptly")
        .unwrap();

    assert_eq!(
        ledger.balance(&alice).await.unwrap().current,
        Points::from_hundredths(300)
    );
    assert!(Counters::get(&counters.cycles) >= 2);
}
