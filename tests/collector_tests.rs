// Collector tests: agent registration, batch flattening, ingestion isolation and failure

mod common;

use apm_collector::collector::{RAW_LEVEL, flatten};
use apm_collector::error::CollectorError;
use apm_collector::models::*;
use apm_collector::store::CollectorStore;
use common::*;
use std::sync::atomic::Ordering;

const AGENT: &str = "agent-1";

fn environment() -> Environment {
    Environment {
        host_name: "app-01".into(),
        process_id: Some(4242),
        start_time: 1_000,
        runtime_version: "17.0.2".into(),
        args: vec!["-Xmx1g".into()],
    }
}

#[tokio::test]
async fn first_init_adopts_declared_config() {
    let h = Harness::new(vec![], 1_000).await;
    let declared = AgentConfig::default();

    let reply = h
        .collector
        .collect_init(AGENT, &environment(), &declared)
        .await
        .unwrap();
    assert_eq!(reply, None);

    let record = h.store.read_agent(AGENT).await.unwrap().unwrap();
    assert_eq!(record.config, declared);
    assert_eq!(record.environment.host_name, "app-01");
    assert_eq!(record.last_seen, 1_000);
}

#[tokio::test]
async fn later_init_returns_stored_config_when_declared_differs() {
    let h = Harness::new(vec![], 1_000).await;
    let stored = AgentConfig::default();
    h.collector
        .collect_init(AGENT, &environment(), &stored)
        .await
        .unwrap();

    let mut declared = stored.clone();
    declared.general.slow_threshold_millis = 50;
    h.clock.set(2_000);
    let reply = h
        .collector
        .collect_init(AGENT, &environment(), &declared)
        .await
        .unwrap();
    assert_eq!(reply, Some(stored.clone()));

    let record = h.store.read_agent(AGENT).await.unwrap().unwrap();
    assert_eq!(record.config, stored);
    assert_eq!(record.last_seen, 2_000);
}

#[tokio::test]
async fn aggregates_are_flattened_and_stored_at_raw_level() {
    let h = Harness::new(vec![], MINUTE).await;
    let mut by_type = batch("Web", 10, 1);
    by_type[0].transaction_aggregates.push(TransactionAggregate {
        transaction_name: "/checkout".into(),
        aggregate: aggregate(4, 1, 3_000_000),
    });
    by_type[0].overall_aggregate.queries.push(QueryMessage {
        query_type: "SQL".into(),
        shared_query_text_index: 1,
        total_duration_nanos: 900.0,
        execution_count: 3,
        total_rows: not_available::NA,
    });
    let texts = vec!["select 1".to_string(), "select * from orders".to_string()];

    h.collector
        .collect_aggregates(AGENT, MINUTE, &by_type, &texts)
        .await
        .unwrap();

    let points = h
        .store
        .query_aggregates(AGENT, RAW_LEVEL, TimeRange::new(0, 2 * MINUTE))
        .await
        .unwrap();
    assert_eq!(points.len(), 2);
    assert!(points[0].is_overall());
    assert_eq!(points[0].transaction_count, 10);
    assert_eq!(points[0].queries[0].text, "select * from orders");
    assert_eq!(points[0].queries[0].total_rows, not_available::NA);
    assert!(not_available::is_na_f64(points[0].total_cpu_nanos));
    assert_eq!(points[1].transaction_name.as_deref(), Some("/checkout"));
    assert_eq!(points[1].histogram.total_count(), 4);
    assert_eq!(points[1].timers.root().count, 4);
}

#[tokio::test]
async fn redelivered_batch_overwrites_instead_of_adding() {
    let h = Harness::new(vec![], MINUTE).await;
    for _ in 0..2 {
        h.collector
            .collect_aggregates(AGENT, MINUTE, &batch("Web", 10, 1), &[])
            .await
            .unwrap();
    }
    let points = h
        .store
        .query_aggregates(AGENT, RAW_LEVEL, TimeRange::new(0, 2 * MINUTE))
        .await
        .unwrap();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].transaction_count, 10);
}

#[test]
fn bad_shared_query_index_is_invalid_request() {
    let mut by_type = batch("Web", 1, 0);
    by_type[0].overall_aggregate.queries.push(QueryMessage {
        query_type: "SQL".into(),
        shared_query_text_index: 3,
        total_duration_nanos: 1.0,
        execution_count: 1,
        total_rows: 1,
    });
    let err = flatten(0, &by_type, &["select 1".to_string()]).unwrap_err();
    assert!(matches!(err, CollectorError::InvalidRequest(_)));
    assert!(!err.is_retryable());
}

#[test]
fn empty_transaction_name_is_invalid_request() {
    let mut by_type = batch("Web", 1, 0);
    by_type[0].transaction_aggregates.push(TransactionAggregate {
        transaction_name: String::new(),
        aggregate: aggregate(1, 0, 1_000_000),
    });
    let err = flatten(0, &by_type, &[]).unwrap_err();
    assert!(matches!(err, CollectorError::InvalidRequest(_)));
}

#[tokio::test]
async fn empty_transaction_name_does_not_replace_overall_row() {
    let h = Harness::new(vec![], MINUTE).await;
    h.collector
        .collect_aggregates(AGENT, MINUTE, &batch("Web", 10, 0), &[])
        .await
        .unwrap();
    let mut by_type = batch("Web", 10, 0);
    by_type[0].transaction_aggregates.push(TransactionAggregate {
        transaction_name: String::new(),
        aggregate: aggregate(1, 1, 1_000_000),
    });
    assert!(
        h.collector
            .collect_aggregates(AGENT, MINUTE, &by_type, &[])
            .await
            .is_err()
    );

    let points = h
        .store
        .query_aggregates(AGENT, RAW_LEVEL, TimeRange::new(0, 2 * MINUTE))
        .await
        .unwrap();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].transaction_count, 10);
}

#[tokio::test]
async fn encoded_agent_histogram_is_decoded() {
    let h = Harness::new(vec![], MINUTE).await;
    let mut by_type = batch("Web", 3, 0);
    let mut msg = DurationHistogram::from_values(&[1_000_000, 4_000_000])
        .to_message()
        .unwrap();
    msg.ordered_raw_values = vec![9_000_000];
    by_type[0].overall_aggregate.histogram = msg;

    h.collector
        .collect_aggregates(AGENT, MINUTE, &by_type, &[])
        .await
        .unwrap();
    let points = h
        .store
        .query_aggregates(AGENT, RAW_LEVEL, TimeRange::new(0, 2 * MINUTE))
        .await
        .unwrap();
    let p100 = points[0].histogram.value_at_percentile(100.0).unwrap();
    assert_eq!(points[0].histogram.total_count(), 3);
    assert!((9_000_000..9_100_000).contains(&p100));

    by_type[0].overall_aggregate.histogram.encoded_bytes = Some("%%%".into());
    let err = h
        .collector
        .collect_aggregates(AGENT, MINUTE, &by_type, &[])
        .await
        .unwrap_err();
    assert!(matches!(err, CollectorError::InvalidRequest(_)));
}

#[tokio::test]
async fn extreme_capture_times_do_not_break_ingestion() {
    let h = Harness::new(
        vec![
            error_rate_rule("errors", 300, 0.1),
            gauge_rule("heap", "heap_used", 300, 100.0),
        ],
        MINUTE,
    )
    .await;

    for t in [i64::MAX, i64::MIN] {
        h.collector
            .collect_aggregates(AGENT, t, &batch("Web", 10, 10), &[])
            .await
            .unwrap();
        h.collector
            .collect_gauge_values(AGENT, &[gauge("heap_used", t, 500.0)])
            .await
            .unwrap();
    }

    let points = h
        .store
        .query_aggregates(AGENT, RAW_LEVEL, TimeRange::new(i64::MIN, i64::MAX))
        .await
        .unwrap();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].capture_time, i64::MIN);
}

#[tokio::test]
async fn ingestion_succeeds_when_alert_check_fails() {
    let h = Harness::new(vec![error_rate_rule("errors", 60, 0.1)], MINUTE).await;
    h.store.fail_reads.store(true, Ordering::SeqCst);

    h.collector
        .collect_aggregates(AGENT, MINUTE, &batch("Web", 10, 10), &[])
        .await
        .unwrap();
    h.collector
        .collect_gauge_values(AGENT, &[gauge("heap_used", MINUTE, 1.0)])
        .await
        .unwrap();

    let points = h
        .store
        .query_aggregates(AGENT, RAW_LEVEL, TimeRange::new(0, 2 * MINUTE))
        .await
        .unwrap();
    assert_eq!(points.len(), 1);
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn storage_failure_fails_call_and_skips_alerts() {
    let h = Harness::new(vec![error_rate_rule("errors", 60, 0.1)], MINUTE).await;
    h.store.fail_writes.store(true, Ordering::SeqCst);

    let err = h
        .collector
        .collect_aggregates(AGENT, MINUTE, &batch("Web", 10, 10), &[])
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    let err = h
        .collector
        .collect_gauge_values(AGENT, &[gauge("heap_used", MINUTE, 1.0)])
        .await
        .unwrap_err();
    assert!(matches!(err, CollectorError::Storage(_)));

    assert!(h.notifier.sent().is_empty());
    assert!(h.triggered(AGENT).await.is_empty());
}

#[tokio::test]
async fn empty_batch_stores_nothing_but_still_checks_alerts() {
    let h = Harness::new(vec![error_rate_rule("errors", 300, 0.1)], 2 * MINUTE).await;
    h.store
        .store_aggregates(AGENT, RAW_LEVEL, MINUTE, &[overall_point("Web", MINUTE, 10, 5)])
        .await
        .unwrap();

    h.collector
        .collect_aggregates(AGENT, 2 * MINUTE, &[], &[])
        .await
        .unwrap();

    let points = h
        .store
        .query_aggregates(AGENT, RAW_LEVEL, TimeRange::new(2 * MINUTE, 3 * MINUTE))
        .await
        .unwrap();
    assert!(points.is_empty());
    assert_eq!(h.notifier.sent().len(), 1);
}

#[tokio::test]
async fn trace_threads_are_merged_and_partial_is_overwritten() {
    let h = Harness::new(vec![], MINUTE).await;
    let header = TraceHeader {
        transaction_type: "Web".into(),
        transaction_name: "/checkout".into(),
        start_time: 1_000,
        capture_time: 2_000,
        duration_nanos: 1_000_000,
        error: false,
        partial: true,
        headline: "POST /checkout".into(),
        user: String::new(),
    };
    let trace = Trace {
        id: "t-1".into(),
        header: header.clone(),
        main_thread_timer: TimerNode::new("http request", 1_000_000, 1)
            .with_child(TimerNode::new("jdbc query", 400_000, 2)),
        auxiliary_thread_timers: vec![
            TimerNode::new("http request", 300_000, 1)
                .with_child(TimerNode::new("jdbc query", 100_000, 1)),
        ],
    };
    h.collector.collect_trace(AGENT, trace.clone()).await.unwrap();

    let stored = h.store.read_trace(AGENT, "t-1").await.unwrap().unwrap();
    assert!(stored.header.partial);
    assert_eq!(stored.timers.root().count, 2);
    assert_eq!(stored.timers.find(&["jdbc query"]).unwrap().count, 3);

    let mut complete = trace;
    complete.header.partial = false;
    complete.header.duration_nanos = 5_000_000;
    h.collector.collect_trace(AGENT, complete).await.unwrap();
    let stored = h.store.read_trace(AGENT, "t-1").await.unwrap().unwrap();
    assert!(!stored.header.partial);
    assert_eq!(stored.header.duration_nanos, 5_000_000);
}
