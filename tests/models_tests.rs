// Model tests: JSON payload shape (camelCase, defaults), NA arithmetic, histogram, gauges

use apm_collector::models::*;

#[test]
fn test_aggregate_message_deserializes_camel_case_with_defaults() {
    let json = r#"{
        "agentId": "agent-1",
        "captureTime": 60000,
        "aggregatesByType": [{
            "transactionType": "Web",
            "overallAggregate": {
                "totalDurationNanos": 3000000.0,
                "transactionCount": 3,
                "rootTimer": {"name": "http request", "totalNanos": 3000000, "count": 3},
                "queries": [{
                    "queryType": "SQL",
                    "sharedQueryTextIndex": 0,
                    "totalDurationNanos": 10.0,
                    "executionCount": 1
                }]
            },
            "transactionAggregates": []
        }],
        "sharedQueryTexts": ["select 1"]
    }"#;
    let msg: AggregateMessage = serde_json::from_str(json).unwrap();
    assert_eq!(msg.agent_id, "agent-1");
    let overall = &msg.aggregates_by_type[0].overall_aggregate;
    assert_eq!(overall.error_count, 0);
    assert!(not_available::is_na_f64(overall.total_cpu_nanos));
    assert!(overall.histogram.is_empty());
    assert_eq!(overall.queries[0].total_rows, not_available::NA);
    assert!(!overall.root_timer.extended);
    assert!(overall.root_timer.children.is_empty());
}

#[test]
fn test_init_response_omits_unchanged_config() {
    let json = serde_json::to_string(&InitResponse::default()).unwrap();
    assert_eq!(json, "{}");

    let json = serde_json::to_string(&InitResponse {
        agent_config: Some(AgentConfig::default()),
    })
    .unwrap();
    assert!(json.contains("\"agentConfig\""));
    assert!(json.contains("\"slowThresholdMillis\":2000"));
}

#[test]
fn test_gauge_value_weight_defaults_to_one() {
    let v: GaugeValue =
        serde_json::from_str(r#"{"gaugeName":"heap","captureTime":5,"value":2.5}"#).unwrap();
    assert_eq!(v.weight, 1);
}

#[test]
fn test_na_propagates_through_sums() {
    assert_eq!(not_available::add(5, 7), 12);
    assert_eq!(not_available::add(not_available::NA, 7), not_available::NA);
    assert_eq!(not_available::add(5, not_available::NA), not_available::NA);
    assert!(not_available::is_na_f64(not_available::add_f64(
        not_available::NA_F64,
        3.0
    )));
    assert_eq!(not_available::or_none(not_available::NA), None);
    assert_eq!(not_available::or_none_f64(2.0), Some(2.0));
}

#[test]
fn test_query_stat_merge_keeps_na_rows() {
    let mut a = QueryStat {
        query_type: "SQL".into(),
        text: "select 1".into(),
        total_duration_nanos: 10.0,
        execution_count: 1,
        total_rows: 4,
    };
    let b = QueryStat {
        total_rows: not_available::NA,
        ..a.clone()
    };
    a.merge(&b);
    assert_eq!(a.execution_count, 2);
    assert_eq!(a.total_duration_nanos, 20.0);
    assert_eq!(a.total_rows, not_available::NA);
}

#[test]
fn test_accumulator_merges_queries_by_type_and_text() {
    let query = |text: &str| QueryStat {
        query_type: "SQL".into(),
        text: text.into(),
        total_duration_nanos: 1.0,
        execution_count: 1,
        total_rows: 1,
    };
    let point = |queries: Vec<QueryStat>| AggregatePoint {
        transaction_type: "Web".into(),
        transaction_name: None,
        capture_time: 0,
        total_duration_nanos: 1.0,
        total_cpu_nanos: 1.0,
        error_count: 0,
        transaction_count: 1,
        timers: TimerTree::new("http request"),
        histogram: DurationHistogram::new(),
        queries,
    };

    let mut acc = AggregateAccumulator::new(&point(vec![query("a")]), 300_000);
    acc.add(&point(vec![query("b"), query("a")]));
    let rolled = acc.finish();
    assert_eq!(rolled.capture_time, 300_000);
    assert_eq!(rolled.queries.len(), 2);
    assert_eq!(rolled.queries[0].text, "a");
    assert_eq!(rolled.queries[0].execution_count, 2);
    assert_eq!(rolled.total_cpu_nanos, 2.0);
}

#[test]
fn test_histogram_message_accepts_raw_values_and_encoding() {
    let encoded = DurationHistogram::from_values(&[1_000_000, 2_000_000])
        .to_message()
        .unwrap()
        .encoded_bytes
        .unwrap();
    let json = format!(
        r#"{{"orderedRawValues": [3000000], "encodedBytes": "{}"}}"#,
        encoded
    );
    let msg: HistogramMessage = serde_json::from_str(&json).unwrap();
    let h = DurationHistogram::from_message(&msg).unwrap();
    assert_eq!(h.total_count(), 3);

    let raw_only: HistogramMessage =
        serde_json::from_str(r#"{"orderedRawValues": [5, 7]}"#).unwrap();
    assert_eq!(raw_only.encoded_bytes, None);
    assert_eq!(DurationHistogram::from_message(&raw_only).unwrap().total_count(), 2);
}

#[test]
fn test_histogram_percentile_after_merge_matches_single_histogram() {
    let values: Vec<u64> = (1..=200).map(|i| i * 250_000).collect();
    let whole = DurationHistogram::from_values(&values);
    let mut merged = DurationHistogram::from_values(&values[..80]);
    merged.merge(&DurationHistogram::from_values(&values[80..]));
    assert_eq!(merged, whole);
    assert_eq!(
        merged.value_at_percentile(95.0),
        whole.value_at_percentile(95.0)
    );
}

#[test]
fn test_weighted_average() {
    let a = GaugeValue {
        gauge_name: "heap".into(),
        capture_time: 0,
        value: 10.0,
        weight: 3,
    };
    let b = GaugeValue {
        value: 50.0,
        weight: 1,
        ..a.clone()
    };
    assert_eq!(weighted_average(&[&a, &b]), Some((20.0, 4)));
    assert_eq!(weighted_average(&[]), None);
}

#[test]
fn test_alert_rule_scope_and_window() {
    let rule = AlertRule {
        id: "errors".into(),
        agent_id: Some("agent-1".into()),
        time_period_secs: 300,
        threshold: 0.1,
        notify_on_recovery: true,
        condition: AlertCondition::Gauge {
            gauge_name: "heap".into(),
        },
    };
    assert!(rule.applies_to("agent-1"));
    assert!(!rule.applies_to("agent-2"));
    assert!(rule.is_gauge());
    assert_eq!(rule.time_period_ms(), 300_000);
}

#[test]
fn test_time_range_is_half_open() {
    let r = TimeRange::new(10, 20);
    assert!(r.contains(10));
    assert!(r.contains(19));
    assert!(!r.contains(20));
}
