// SQLite collector store (sqlx pool, WAL). Nested structures are stored as
// version-prefixed wincode blobs; agent config and trace headers as JSON text.
// The overall aggregate of a transaction type is stored with an empty
// transaction_name so it can take part in the primary key.

use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::instrument;

use super::{CollectorStore, blob, schema};
use crate::error::Result;
use crate::models::{
    AgentConfig, AgentRecord, AggregatePoint, Environment, GaugeValue, StoredTrace, TimeRange,
    TraceHeader, TriggeredAlert, TriggeredAlertKey,
};

const OVERALL_NAME: &str = "";

const AGGREGATE_COLUMNS: &str = "capture_time, transaction_type, transaction_name, \
     total_duration_nanos, total_cpu_nanos, error_count, transaction_count, \
     timer_data, histogram_data, query_data";

/// SQLite integers are signed; counts beyond `i64::MAX` are clamped.
fn to_sql_count(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

fn from_sql_count(v: i64) -> u64 {
    u64::try_from(v).unwrap_or(0)
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(path: &str, max_pool_size: u32, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(busy_timeout)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_pool_size)
            .connect_with(opts)
            .await?;
        Ok(Self { pool })
    }

    pub async fn init(&self) -> Result<()> {
        schema::init_schema(&self.pool).await?;
        Ok(())
    }

    fn parse_aggregate_row(row: &SqliteRow) -> Result<AggregatePoint> {
        let transaction_name: String = row.try_get("transaction_name")?;
        let timer_data: Vec<u8> = row.try_get("timer_data")?;
        let histogram_data: Vec<u8> = row.try_get("histogram_data")?;
        let query_data: Vec<u8> = row.try_get("query_data")?;
        let error_count: i64 = row.try_get("error_count")?;
        let transaction_count: i64 = row.try_get("transaction_count")?;
        Ok(AggregatePoint {
            transaction_type: row.try_get("transaction_type")?,
            transaction_name: (transaction_name != OVERALL_NAME).then_some(transaction_name),
            capture_time: row.try_get("capture_time")?,
            total_duration_nanos: row.try_get("total_duration_nanos")?,
            total_cpu_nanos: row.try_get("total_cpu_nanos")?,
            error_count: from_sql_count(error_count),
            transaction_count: from_sql_count(transaction_count),
            timers: blob::decode_timers(&timer_data)?,
            histogram: blob::decode_histogram(&histogram_data)?,
            queries: blob::decode_queries(&query_data)?,
        })
    }

    fn parse_gauge_row(row: &SqliteRow) -> Result<GaugeValue> {
        let weight: i64 = row.try_get("weight")?;
        Ok(GaugeValue {
            gauge_name: row.try_get("gauge_name")?,
            capture_time: row.try_get("capture_time")?,
            value: row.try_get("value")?,
            weight: from_sql_count(weight),
        })
    }
}

#[async_trait]
impl CollectorStore for SqliteStore {
    #[instrument(skip(self, environment, declared), fields(repo = "collector", operation = "store_agent"))]
    async fn store_agent(
        &self,
        agent_id: &str,
        environment: &Environment,
        declared: &AgentConfig,
        now: i64,
    ) -> Result<AgentConfig> {
        let mut tx = self.pool.begin().await?;
        let existing = sqlx::query_scalar::<_, String>("SELECT config FROM agents WHERE agent_id = $1")
            .bind(agent_id)
            .fetch_optional(&mut *tx)
            .await?;
        let canonical = match existing {
            Some(json) => serde_json::from_str(&json)?,
            None => declared.clone(),
        };
        sqlx::query(
            r#"
            INSERT INTO agents (agent_id, environment, config, last_seen) VALUES ($1, $2, $3, $4)
            ON CONFLICT(agent_id) DO UPDATE SET environment = excluded.environment, last_seen = excluded.last_seen
            "#,
        )
        .bind(agent_id)
        .bind(serde_json::to_string(environment)?)
        .bind(serde_json::to_string(&canonical)?)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(canonical)
    }

    async fn read_agent(&self, agent_id: &str) -> Result<Option<AgentRecord>> {
        let row = sqlx::query(
            "SELECT agent_id, environment, config, last_seen FROM agents WHERE agent_id = $1",
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let environment: String = row.try_get("environment")?;
        let config: String = row.try_get("config")?;
        Ok(Some(AgentRecord {
            agent_id: row.try_get("agent_id")?,
            environment: serde_json::from_str(&environment)?,
            config: serde_json::from_str(&config)?,
            last_seen: row.try_get("last_seen")?,
        }))
    }

    async fn list_agent_ids(&self) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>("SELECT agent_id FROM agents ORDER BY agent_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    #[instrument(
        skip(self, points),
        fields(repo = "collector", operation = "store_aggregates", points_count = points.len())
    )]
    async fn store_aggregates(
        &self,
        agent_id: &str,
        level: usize,
        capture_time: i64,
        points: &[AggregatePoint],
    ) -> Result<()> {
        let mut rows = Vec::with_capacity(points.len());
        for p in points {
            rows.push((
                p,
                blob::encode_timers(&p.timers)?,
                blob::encode_histogram(&p.histogram)?,
                blob::encode_queries(&p.queries)?,
            ));
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "DELETE FROM aggregate_points WHERE agent_id = $1 AND rollup_level = $2 AND capture_time = $3",
        )
        .bind(agent_id)
        .bind(level as i64)
        .bind(capture_time)
        .execute(&mut *tx)
        .await?;
        for (p, timer_data, histogram_data, query_data) in &rows {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO aggregate_points
                (agent_id, rollup_level, capture_time, transaction_type, transaction_name,
                 total_duration_nanos, total_cpu_nanos, error_count, transaction_count,
                 timer_data, histogram_data, query_data)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(agent_id)
            .bind(level as i64)
            .bind(capture_time)
            .bind(&p.transaction_type)
            .bind(p.transaction_name.as_deref().unwrap_or(OVERALL_NAME))
            .bind(p.total_duration_nanos)
            .bind(p.total_cpu_nanos)
            .bind(to_sql_count(p.error_count))
            .bind(to_sql_count(p.transaction_count))
            .bind(timer_data)
            .bind(histogram_data)
            .bind(query_data)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self), fields(repo = "collector", operation = "query_aggregates"))]
    async fn query_aggregates(
        &self,
        agent_id: &str,
        level: usize,
        range: TimeRange,
    ) -> Result<Vec<AggregatePoint>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM aggregate_points
             WHERE agent_id = $1 AND rollup_level = $2 AND capture_time >= $3 AND capture_time < $4
             ORDER BY capture_time ASC, transaction_type ASC, transaction_name ASC",
            AGGREGATE_COLUMNS
        ))
        .bind(agent_id)
        .bind(level as i64)
        .bind(range.from)
        .bind(range.to)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(Self::parse_aggregate_row(&row)?);
        }
        Ok(out)
    }

    #[instrument(skip(self), fields(repo = "collector", operation = "query_overall_aggregates"))]
    async fn query_overall_aggregates(
        &self,
        agent_id: &str,
        level: usize,
        transaction_type: &str,
        range: TimeRange,
    ) -> Result<Vec<AggregatePoint>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM aggregate_points
             WHERE agent_id = $1 AND rollup_level = $2 AND transaction_type = $3
               AND transaction_name = $4 AND capture_time >= $5 AND capture_time < $6
             ORDER BY capture_time ASC",
            AGGREGATE_COLUMNS
        ))
        .bind(agent_id)
        .bind(level as i64)
        .bind(transaction_type)
        .bind(OVERALL_NAME)
        .bind(range.from)
        .bind(range.to)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(Self::parse_aggregate_row(&row)?);
        }
        Ok(out)
    }

    #[instrument(
        skip(self, values),
        fields(repo = "collector", operation = "store_gauge_values", values_count = values.len())
    )]
    async fn store_gauge_values(
        &self,
        agent_id: &str,
        level: usize,
        values: &[GaugeValue],
    ) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for v in values {
            sqlx::query(
                "INSERT OR REPLACE INTO gauge_values (agent_id, rollup_level, gauge_name, capture_time, value, weight) VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(agent_id)
            .bind(level as i64)
            .bind(&v.gauge_name)
            .bind(v.capture_time)
            .bind(v.value)
            .bind(to_sql_count(v.weight))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self), fields(repo = "collector", operation = "query_gauge_values"))]
    async fn query_gauge_values(
        &self,
        agent_id: &str,
        level: usize,
        gauge_name: Option<&str>,
        range: TimeRange,
    ) -> Result<Vec<GaugeValue>> {
        let rows = match gauge_name {
            Some(name) => {
                sqlx::query(
                    "SELECT gauge_name, capture_time, value, weight FROM gauge_values
                     WHERE agent_id = $1 AND rollup_level = $2 AND gauge_name = $3
                       AND capture_time >= $4 AND capture_time < $5
                     ORDER BY capture_time ASC",
                )
                .bind(agent_id)
                .bind(level as i64)
                .bind(name)
                .bind(range.from)
                .bind(range.to)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT gauge_name, capture_time, value, weight FROM gauge_values
                     WHERE agent_id = $1 AND rollup_level = $2
                       AND capture_time >= $3 AND capture_time < $4
                     ORDER BY capture_time ASC, gauge_name ASC",
                )
                .bind(agent_id)
                .bind(level as i64)
                .bind(range.from)
                .bind(range.to)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(Self::parse_gauge_row(&row)?);
        }
        Ok(out)
    }

    async fn first_capture_time(
        &self,
        agent_id: &str,
        level: usize,
        from: i64,
    ) -> Result<Option<i64>> {
        let min = sqlx::query_scalar::<_, Option<i64>>(
            r#"
            SELECT MIN(t) FROM (
                SELECT MIN(capture_time) AS t FROM aggregate_points
                WHERE agent_id = $1 AND rollup_level = $2 AND capture_time >= $3
                UNION ALL
                SELECT MIN(capture_time) AS t FROM gauge_values
                WHERE agent_id = $4 AND rollup_level = $5 AND capture_time >= $6
            )
            "#,
        )
        .bind(agent_id)
        .bind(level as i64)
        .bind(from)
        .bind(agent_id)
        .bind(level as i64)
        .bind(from)
        .fetch_one(&self.pool)
        .await?;
        Ok(min)
    }

    async fn rollup_progress(&self, agent_id: &str, level: usize) -> Result<Option<i64>> {
        let next = sqlx::query_scalar::<_, i64>(
            "SELECT next_bucket_start FROM rollup_progress WHERE agent_id = $1 AND rollup_level = $2",
        )
        .bind(agent_id)
        .bind(level as i64)
        .fetch_optional(&self.pool)
        .await?;
        Ok(next)
    }

    async fn advance_rollup_progress(
        &self,
        agent_id: &str,
        level: usize,
        next_bucket_start: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO rollup_progress (agent_id, rollup_level, next_bucket_start) VALUES ($1, $2, $3)
            ON CONFLICT(agent_id, rollup_level)
            DO UPDATE SET next_bucket_start = MAX(next_bucket_start, excluded.next_bucket_start)
            "#,
        )
        .bind(agent_id)
        .bind(level as i64)
        .bind(next_bucket_start)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self, trace), fields(repo = "collector", operation = "store_trace", trace_id = %trace.id))]
    async fn store_trace(&self, agent_id: &str, trace: &StoredTrace) -> Result<()> {
        let timer_data = blob::encode_timers(&trace.timers)?;
        let header = serde_json::to_string(&trace.header)?;
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO traces
            (agent_id, trace_id, capture_time, transaction_type, transaction_name,
             duration_nanos, error, partial, header, timer_data)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(agent_id)
        .bind(&trace.id)
        .bind(trace.header.capture_time)
        .bind(&trace.header.transaction_type)
        .bind(&trace.header.transaction_name)
        .bind(to_sql_count(trace.header.duration_nanos))
        .bind(trace.header.error)
        .bind(trace.header.partial)
        .bind(header)
        .bind(timer_data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn read_trace(&self, agent_id: &str, trace_id: &str) -> Result<Option<StoredTrace>> {
        let row = sqlx::query(
            "SELECT trace_id, header, timer_data FROM traces WHERE agent_id = $1 AND trace_id = $2",
        )
        .bind(agent_id)
        .bind(trace_id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let header: String = row.try_get("header")?;
        let timer_data: Vec<u8> = row.try_get("timer_data")?;
        let header: TraceHeader = serde_json::from_str(&header)?;
        Ok(Some(StoredTrace {
            id: row.try_get("trace_id")?,
            header,
            timers: blob::decode_timers(&timer_data)?,
        }))
    }

    async fn triggered_alert(&self, key: &TriggeredAlertKey) -> Result<Option<TriggeredAlert>> {
        let first = sqlx::query_scalar::<_, i64>(
            "SELECT first_triggered_at FROM triggered_alerts WHERE agent_id = $1 AND alert_id = $2",
        )
        .bind(&key.agent_id)
        .bind(&key.alert_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(first.map(|first_triggered_at| TriggeredAlert {
            agent_id: key.agent_id.clone(),
            alert_id: key.alert_id.clone(),
            first_triggered_at,
        }))
    }

    async fn insert_triggered_alert(&self, alert: &TriggeredAlert) -> Result<bool> {
        let r = sqlx::query(
            "INSERT OR IGNORE INTO triggered_alerts (agent_id, alert_id, first_triggered_at) VALUES ($1, $2, $3)",
        )
        .bind(&alert.agent_id)
        .bind(&alert.alert_id)
        .bind(alert.first_triggered_at)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected() == 1)
    }

    async fn delete_triggered_alert(&self, key: &TriggeredAlertKey) -> Result<bool> {
        let r = sqlx::query("DELETE FROM triggered_alerts WHERE agent_id = $1 AND alert_id = $2")
            .bind(&key.agent_id)
            .bind(&key.alert_id)
            .execute(&self.pool)
            .await?;
        Ok(r.rows_affected() > 0)
    }

    async fn alert_evaluated_at(&self, key: &TriggeredAlertKey) -> Result<Option<i64>> {
        let evaluated_at = sqlx::query_scalar::<_, i64>(
            "SELECT evaluated_at FROM alert_evaluations WHERE agent_id = $1 AND alert_id = $2",
        )
        .bind(&key.agent_id)
        .bind(&key.alert_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(evaluated_at)
    }

    async fn record_alert_evaluation(
        &self,
        key: &TriggeredAlertKey,
        evaluated_at: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO alert_evaluations (agent_id, alert_id, evaluated_at) VALUES ($1, $2, $3)
            ON CONFLICT (agent_id, alert_id)
            DO UPDATE SET evaluated_at = MAX(evaluated_at, excluded.evaluated_at)
            "#,
        )
        .bind(&key.agent_id)
        .bind(&key.alert_id)
        .bind(evaluated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_triggered_alerts(&self, agent_id: &str) -> Result<Vec<TriggeredAlert>> {
        let rows = sqlx::query(
            "SELECT alert_id, first_triggered_at FROM triggered_alerts WHERE agent_id = $1 ORDER BY alert_id",
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(TriggeredAlert {
                agent_id: agent_id.to_owned(),
                alert_id: row.try_get("alert_id")?,
                first_triggered_at: row.try_get("first_triggered_at")?,
            });
        }
        Ok(out)
    }

    #[instrument(skip(self), fields(repo = "collector", operation = "expire_before"))]
    async fn expire_before(&self, level: usize, cutoff: i64) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let aggregates =
            sqlx::query("DELETE FROM aggregate_points WHERE rollup_level = $1 AND capture_time < $2")
                .bind(level as i64)
                .bind(cutoff)
                .execute(&mut *tx)
                .await?;
        let gauges =
            sqlx::query("DELETE FROM gauge_values WHERE rollup_level = $1 AND capture_time < $2")
                .bind(level as i64)
                .bind(cutoff)
                .execute(&mut *tx)
                .await?;
        tx.commit().await?;
        Ok(aggregates.rows_affected() + gauges.rows_affected())
    }

    #[instrument(skip(self), fields(repo = "collector", operation = "expire_traces_before"))]
    async fn expire_traces_before(&self, cutoff: i64) -> Result<u64> {
        let r = sqlx::query("DELETE FROM traces WHERE capture_time < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(r.rows_affected())
    }

    /// Reclaim space after deletes (run periodically after the retention sweep).
    #[instrument(skip(self), fields(repo = "collector", operation = "vacuum"))]
    async fn vacuum(&self) -> Result<()> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }
}
