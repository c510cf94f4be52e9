// Schema for the collector database. Primary keys are the overwrite keys.

use sqlx::SqlitePool;

pub(super) const SCHEMA_VERSION: i64 = 1;

const TABLES: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS schema_version (key TEXT PRIMARY KEY, value INTEGER NOT NULL)",
    r#"
    CREATE TABLE IF NOT EXISTS agents (
        agent_id TEXT PRIMARY KEY,
        environment TEXT NOT NULL,
        config TEXT NOT NULL,
        last_seen INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS aggregate_points (
        agent_id TEXT NOT NULL,
        rollup_level INTEGER NOT NULL,
        capture_time INTEGER NOT NULL,
        transaction_type TEXT NOT NULL,
        transaction_name TEXT NOT NULL,
        total_duration_nanos REAL NOT NULL,
        total_cpu_nanos REAL NOT NULL,
        error_count INTEGER NOT NULL,
        transaction_count INTEGER NOT NULL,
        timer_data BLOB NOT NULL,
        histogram_data BLOB NOT NULL,
        query_data BLOB NOT NULL,
        PRIMARY KEY (agent_id, rollup_level, capture_time, transaction_type, transaction_name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS gauge_values (
        agent_id TEXT NOT NULL,
        rollup_level INTEGER NOT NULL,
        gauge_name TEXT NOT NULL,
        capture_time INTEGER NOT NULL,
        value REAL NOT NULL,
        weight INTEGER NOT NULL,
        PRIMARY KEY (agent_id, rollup_level, gauge_name, capture_time)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_gauge_values_time ON gauge_values(agent_id, rollup_level, capture_time)",
    r#"
    CREATE TABLE IF NOT EXISTS rollup_progress (
        agent_id TEXT NOT NULL,
        rollup_level INTEGER NOT NULL,
        next_bucket_start INTEGER NOT NULL,
        PRIMARY KEY (agent_id, rollup_level)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS traces (
        agent_id TEXT NOT NULL,
        trace_id TEXT NOT NULL,
        capture_time INTEGER NOT NULL,
        transaction_type TEXT NOT NULL,
        transaction_name TEXT NOT NULL,
        duration_nanos INTEGER NOT NULL,
        error INTEGER NOT NULL,
        partial INTEGER NOT NULL,
        header TEXT NOT NULL,
        timer_data BLOB NOT NULL,
        PRIMARY KEY (agent_id, trace_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_traces_capture_time ON traces(capture_time)",
    r#"
    CREATE TABLE IF NOT EXISTS triggered_alerts (
        agent_id TEXT NOT NULL,
        alert_id TEXT NOT NULL,
        first_triggered_at INTEGER NOT NULL,
        PRIMARY KEY (agent_id, alert_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS alert_evaluations (
        agent_id TEXT NOT NULL,
        alert_id TEXT NOT NULL,
        evaluated_at INTEGER NOT NULL,
        PRIMARY KEY (agent_id, alert_id)
    )
    "#,
];

/// Creates all tables and indexes if not present and records the schema version.
pub(super) async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for ddl in TABLES {
        sqlx::query(ddl).execute(pool).await?;
    }
    sqlx::query("INSERT OR IGNORE INTO schema_version (key, value) VALUES ('schema', $1)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await?;
    Ok(())
}
