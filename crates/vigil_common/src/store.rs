//! SQLite-backed monitoring store.
//!
//! The persistence boundary of the engine: services, model bindings,
//! training history, prediction signals, alerts and reports. Scoring,
//! trend and report-text logic never touches SQL; it operates on the
//! summaries produced here.
//!
//! Schema notes:
//! - timestamps are unix seconds in INTEGER columns
//! - bindings are unique per (service, device, type, metric)
//! - reports are unique per (service, device, type, period)
//! - soft-deleting a service flags its bindings and excludes its
//!   signals/alerts/reports from every read by joining services
//!
//! The connection sits behind a mutex so one handle can be shared by
//! the scheduler tick and its spawned workers. The only compound
//! operation held under the lock across statements is the due-claim.

use anyhow::Result;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

use crate::types::{
    Alert, AlertLevel, AlertStats, AlertStatus, AlgorithmProfile, ModelBinding, MonitoredService,
    PredictionSignal, PredictionStats, Report, ReportScope, ReportType, StatsSummary,
    TrainingRecord, TrainingStatus, TrendDirection,
};

/// Default store path for the daemon.
pub const MONITOR_DB_PATH: &str = "/var/lib/vigil/monitor.db";

/// SQLite-backed monitoring database.
pub struct MonitorDb {
    conn: Mutex<Connection>,
}

impl MonitorDb {
    /// Open or create the store at a specific path.
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::bootstrap(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::bootstrap(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn bootstrap(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS services (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                profile TEXT NOT NULL,
                update_cycle_days INTEGER NOT NULL DEFAULT 1,
                prediction_cycle_days INTEGER NOT NULL DEFAULT 1,
                prediction_duration_days INTEGER NOT NULL DEFAULT 1,
                auto_generate INTEGER NOT NULL DEFAULT 0,
                enabled INTEGER NOT NULL DEFAULT 1,
                deleted INTEGER NOT NULL DEFAULT 0,
                last_train_at INTEGER,
                last_generated_at INTEGER,
                next_run_at INTEGER
            );

            CREATE TABLE IF NOT EXISTS bindings (
                id TEXT PRIMARY KEY,
                service_id TEXT NOT NULL,
                device_id TEXT NOT NULL,
                monitor_type TEXT NOT NULL,
                metric TEXT NOT NULL,
                training_status TEXT NOT NULL DEFAULT 'untrained',
                last_train_at INTEGER,
                deleted INTEGER NOT NULL DEFAULT 0
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_bindings_tuple
                ON bindings(service_id, device_id, monitor_type, metric);

            CREATE TABLE IF NOT EXISTS training_records (
                id TEXT PRIMARY KEY,
                service_id TEXT NOT NULL,
                binding_id TEXT NOT NULL,
                started_at INTEGER NOT NULL,
                ended_at INTEGER,
                status TEXT NOT NULL,
                duration_secs INTEGER NOT NULL DEFAULT 0,
                sample_count INTEGER NOT NULL DEFAULT 0,
                accuracy REAL NOT NULL DEFAULT 0,
                model_version TEXT NOT NULL DEFAULT ''
            );
            CREATE INDEX IF NOT EXISTS idx_training_binding_time
                ON training_records(binding_id, started_at);

            CREATE TABLE IF NOT EXISTS signals (
                id TEXT PRIMARY KEY,
                service_id TEXT NOT NULL,
                device_id TEXT NOT NULL,
                binding_id TEXT NOT NULL,
                predicted_at INTEGER NOT NULL,
                value REAL NOT NULL,
                anomaly INTEGER NOT NULL DEFAULT 0,
                confidence REAL NOT NULL DEFAULT 0,
                algorithm TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_signals_scope_time
                ON signals(service_id, predicted_at);

            CREATE TABLE IF NOT EXISTS alerts (
                id TEXT PRIMARY KEY,
                service_id TEXT NOT NULL,
                device_id TEXT NOT NULL,
                signal_id TEXT,
                level TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                message TEXT NOT NULL,
                raised_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_alerts_scope_time
                ON alerts(service_id, raised_at);

            CREATE TABLE IF NOT EXISTS reports (
                id TEXT PRIMARY KEY,
                service_id TEXT NOT NULL,
                device_id TEXT,
                report_type TEXT NOT NULL,
                period_start INTEGER NOT NULL,
                period_end INTEGER NOT NULL,
                total_signals INTEGER NOT NULL DEFAULT 0,
                anomaly_count INTEGER NOT NULL DEFAULT 0,
                accuracy_rate REAL NOT NULL DEFAULT 0,
                avg_confidence REAL NOT NULL DEFAULT 0,
                min_confidence REAL NOT NULL DEFAULT 0,
                max_confidence REAL NOT NULL DEFAULT 0,
                device_count INTEGER NOT NULL DEFAULT 0,
                info_alerts INTEGER NOT NULL DEFAULT 0,
                warning_alerts INTEGER NOT NULL DEFAULT 0,
                critical_alerts INTEGER NOT NULL DEFAULT 0,
                health_score REAL NOT NULL DEFAULT 0,
                trend_direction TEXT,
                trend_confidence REAL,
                summary TEXT NOT NULL DEFAULT '',
                findings TEXT NOT NULL DEFAULT '[]',
                recommendations TEXT NOT NULL DEFAULT '[]',
                detail TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_reports_period
                ON reports(service_id, COALESCE(device_id, ''), report_type, period_start, period_end);
            "#,
        )?;
        Ok(())
    }

    // ---- services ----

    pub fn insert_service(&self, service: &MonitoredService) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO services (id, name, profile, update_cycle_days, prediction_cycle_days,
                 prediction_duration_days, auto_generate, enabled, deleted,
                 last_train_at, last_generated_at, next_run_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                service.id.to_string(),
                service.name,
                service.profile.as_str(),
                service.update_cycle_days,
                service.prediction_cycle_days,
                service.prediction_duration_days,
                service.auto_generate,
                service.enabled,
                service.deleted,
                service.last_train_at.map(|t| t.timestamp()),
                service.last_generated_at.map(|t| t.timestamp()),
                service.next_run_at.map(|t| t.timestamp()),
            ],
        )?;
        Ok(())
    }

    pub fn get_service(&self, id: Uuid) -> Result<Option<MonitoredService>> {
        let conn = self.conn.lock().unwrap();
        let service = conn
            .query_row(
                "SELECT id, name, profile, update_cycle_days, prediction_cycle_days,
                        prediction_duration_days, auto_generate, enabled, deleted,
                        last_train_at, last_generated_at, next_run_at
                 FROM services WHERE id = ?1",
                params![id.to_string()],
                row_to_service,
            )
            .optional()?;
        Ok(service)
    }

    /// Services the scheduler considers on each tick: enabled,
    /// auto-generate, not deleted.
    pub fn generation_candidates(&self) -> Result<Vec<MonitoredService>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, profile, update_cycle_days, prediction_cycle_days,
                    prediction_duration_days, auto_generate, enabled, deleted,
                    last_train_at, last_generated_at, next_run_at
             FROM services
             WHERE enabled = 1 AND auto_generate = 1 AND deleted = 0
             ORDER BY name",
        )?;
        let rows = stmt.query_map([], row_to_service)?;
        let mut services = Vec::new();
        for row in rows {
            services.push(row?);
        }
        Ok(services)
    }

    /// Atomically claim a due service and advance its schedule.
    ///
    /// The claim is a conditional UPDATE on `next_run_at`: it succeeds
    /// only if the service is live and due (`next_run_at` unset or
    /// `<= now`), and in the same statement moves `next_run_at` one
    /// cycle forward. Two concurrent ticks can therefore never
    /// double-trigger the same due window; the loser's UPDATE matches
    /// zero rows.
    pub fn claim_due(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<MonitoredService>> {
        let conn = self.conn.lock().unwrap();
        let service = conn
            .query_row(
                "SELECT id, name, profile, update_cycle_days, prediction_cycle_days,
                        prediction_duration_days, auto_generate, enabled, deleted,
                        last_train_at, last_generated_at, next_run_at
                 FROM services WHERE id = ?1",
                params![id.to_string()],
                row_to_service,
            )
            .optional()?;
        let Some(service) = service else {
            return Ok(None);
        };
        if service.deleted || !service.enabled {
            return Ok(None);
        }
        let next = now + Duration::days(service.effective_cycle_days());
        let claimed = conn.execute(
            "UPDATE services SET next_run_at = ?1
             WHERE id = ?2 AND enabled = 1 AND deleted = 0
               AND (next_run_at IS NULL OR next_run_at <= ?3)",
            params![next.timestamp(), id.to_string(), now.timestamp()],
        )?;
        if claimed == 1 {
            Ok(Some(service))
        } else {
            Ok(None)
        }
    }

    /// Unconditionally advance a service's schedule (manual trigger path).
    pub fn advance_schedule(&self, id: Uuid, next: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE services SET next_run_at = ?1 WHERE id = ?2",
            params![next.timestamp(), id.to_string()],
        )?;
        Ok(())
    }

    pub fn mark_generated(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE services SET last_generated_at = ?1 WHERE id = ?2",
            params![at.timestamp(), id.to_string()],
        )?;
        Ok(())
    }

    /// Soft-delete a service. Cascades the flag to its bindings;
    /// signals, alerts and reports stay on disk but disappear from
    /// reads, which all join against live services.
    pub fn soft_delete_service(&self, id: Uuid) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE services SET deleted = 1, enabled = 0 WHERE id = ?1",
            params![id.to_string()],
        )?;
        tx.execute(
            "UPDATE bindings SET deleted = 1 WHERE service_id = ?1",
            params![id.to_string()],
        )?;
        tx.commit()?;
        Ok(())
    }

    // ---- bindings ----

    pub fn insert_binding(&self, binding: &ModelBinding) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO bindings (id, service_id, device_id, monitor_type, metric,
                 training_status, last_train_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                binding.id.to_string(),
                binding.service_id.to_string(),
                binding.device_id,
                binding.monitor_type,
                binding.metric,
                binding.training_status.as_str(),
                binding.last_train_at.map(|t| t.timestamp()),
            ],
        )?;
        Ok(())
    }

    pub fn get_binding(&self, id: Uuid) -> Result<Option<ModelBinding>> {
        let conn = self.conn.lock().unwrap();
        let binding = conn
            .query_row(
                "SELECT id, service_id, device_id, monitor_type, metric, training_status, last_train_at
                 FROM bindings WHERE id = ?1 AND deleted = 0",
                params![id.to_string()],
                row_to_binding,
            )
            .optional()?;
        Ok(binding)
    }

    pub fn bindings_for_service(&self, service_id: Uuid) -> Result<Vec<ModelBinding>> {
        self.bindings_where(service_id, None)
    }

    /// Only `success` bindings are eligible for signal generation.
    pub fn trained_bindings(&self, service_id: Uuid) -> Result<Vec<ModelBinding>> {
        self.bindings_where(service_id, Some(TrainingStatus::Success))
    }

    fn bindings_where(
        &self,
        service_id: Uuid,
        status: Option<TrainingStatus>,
    ) -> Result<Vec<ModelBinding>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, service_id, device_id, monitor_type, metric, training_status, last_train_at
             FROM bindings
             WHERE service_id = ?1 AND deleted = 0
               AND (?2 IS NULL OR training_status = ?2)
             ORDER BY device_id, metric",
        )?;
        let rows = stmt.query_map(
            params![service_id.to_string(), status.map(|s| s.as_str())],
            row_to_binding,
        )?;
        let mut bindings = Vec::new();
        for row in rows {
            bindings.push(row?);
        }
        Ok(bindings)
    }

    pub fn set_training_status(
        &self,
        binding_id: Uuid,
        status: TrainingStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        if status == TrainingStatus::Success {
            conn.execute(
                "UPDATE bindings SET training_status = ?1, last_train_at = ?2 WHERE id = ?3",
                params![status.as_str(), at.timestamp(), binding_id.to_string()],
            )?;
            conn.execute(
                "UPDATE services SET last_train_at = ?1
                 WHERE id = (SELECT service_id FROM bindings WHERE id = ?2)",
                params![at.timestamp(), binding_id.to_string()],
            )?;
        } else {
            conn.execute(
                "UPDATE bindings SET training_status = ?1 WHERE id = ?2",
                params![status.as_str(), binding_id.to_string()],
            )?;
        }
        Ok(())
    }

    // ---- training records ----

    pub fn append_training_record(&self, record: &TrainingRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO training_records (id, service_id, binding_id, started_at, ended_at,
                 status, duration_secs, sample_count, accuracy, model_version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.id.to_string(),
                record.service_id.to_string(),
                record.binding_id.to_string(),
                record.started_at.timestamp(),
                record.ended_at.map(|t| t.timestamp()),
                record.status.as_str(),
                record.duration_secs,
                record.sample_count,
                record.accuracy,
                record.model_version,
            ],
        )?;
        Ok(())
    }

    /// Most recent training records for a binding, newest first.
    pub fn recent_training_records(
        &self,
        binding_id: Uuid,
        limit: usize,
    ) -> Result<Vec<TrainingRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, service_id, binding_id, started_at, ended_at, status,
                    duration_secs, sample_count, accuracy, model_version
             FROM training_records
             WHERE binding_id = ?1
             ORDER BY started_at DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(
            params![binding_id.to_string(), limit as i64],
            row_to_training_record,
        )?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    // ---- signals ----

    pub fn insert_signal(&self, signal: &PredictionSignal) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO signals (id, service_id, device_id, binding_id, predicted_at,
                 value, anomaly, confidence, algorithm)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                signal.id.to_string(),
                signal.service_id.to_string(),
                signal.device_id,
                signal.binding_id.to_string(),
                signal.predicted_at.timestamp(),
                signal.value,
                signal.anomaly,
                signal.confidence,
                signal.algorithm,
            ],
        )?;
        Ok(())
    }

    /// Signal rows for a (scope, half-open window), oldest first.
    pub fn signals_in_window(
        &self,
        scope: &ReportScope,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PredictionSignal>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT g.id, g.service_id, g.device_id, g.binding_id, g.predicted_at,
                    g.value, g.anomaly, g.confidence, g.algorithm
             FROM signals g
             JOIN services s ON s.id = g.service_id AND s.deleted = 0
             WHERE g.service_id = ?1
               AND (?2 IS NULL OR g.device_id = ?2)
               AND g.predicted_at >= ?3 AND g.predicted_at < ?4
             ORDER BY g.predicted_at",
        )?;
        let rows = stmt.query_map(
            params![
                scope.service_id.to_string(),
                scope.device_id,
                start.timestamp(),
                end.timestamp(),
            ],
            row_to_signal,
        )?;
        let mut signals = Vec::new();
        for row in rows {
            signals.push(row?);
        }
        Ok(signals)
    }

    /// Aggregate signal statistics for a (scope, half-open window) in a
    /// single query. Accuracy estimation happens in the aggregator, not
    /// here.
    pub fn signal_stats_in_window(
        &self,
        scope: &ReportScope,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<PredictionStats> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT COUNT(*),
                    COALESCE(SUM(g.anomaly), 0),
                    COALESCE(AVG(g.confidence), 0),
                    COALESCE(MIN(g.confidence), 0),
                    COALESCE(MAX(g.confidence), 0),
                    COUNT(DISTINCT g.device_id)
             FROM signals g
             JOIN services s ON s.id = g.service_id AND s.deleted = 0
             WHERE g.service_id = ?1
               AND (?2 IS NULL OR g.device_id = ?2)
               AND g.predicted_at >= ?3 AND g.predicted_at < ?4",
        )?;
        let stats = stmt.query_row(
            params![
                scope.service_id.to_string(),
                scope.device_id,
                start.timestamp(),
                end.timestamp(),
            ],
            |row| {
                Ok(PredictionStats {
                    total_signals: row.get::<_, i64>(0)? as u64,
                    anomaly_count: row.get::<_, i64>(1)? as u64,
                    accuracy_rate: 0.0,
                    avg_confidence: row.get(2)?,
                    min_confidence: row.get(3)?,
                    max_confidence: row.get(4)?,
                    device_count: row.get::<_, i64>(5)? as u64,
                })
            },
        )?;
        Ok(stats)
    }

    // ---- alerts ----

    pub fn insert_alert(&self, alert: &Alert) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO alerts (id, service_id, device_id, signal_id, level, status, message, raised_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                alert.id.to_string(),
                alert.service_id.to_string(),
                alert.device_id,
                alert.signal_id.map(|s| s.to_string()),
                alert.level.as_str(),
                alert.status.as_str(),
                alert.message,
                alert.raised_at.timestamp(),
            ],
        )?;
        Ok(())
    }

    pub fn resolve_alert(&self, id: Uuid) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE alerts SET status = 'resolved' WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(())
    }

    /// Alert counts per level for a (scope, half-open window). Rows with
    /// unrecognized levels contribute zero.
    pub fn alert_counts_in_window(
        &self,
        scope: &ReportScope,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<AlertStats> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT a.level, COUNT(*)
             FROM alerts a
             JOIN services s ON s.id = a.service_id AND s.deleted = 0
             WHERE a.service_id = ?1
               AND (?2 IS NULL OR a.device_id = ?2)
               AND a.raised_at >= ?3 AND a.raised_at < ?4
             GROUP BY a.level",
        )?;
        let rows = stmt.query_map(
            params![
                scope.service_id.to_string(),
                scope.device_id,
                start.timestamp(),
                end.timestamp(),
            ],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64)),
        )?;
        let mut stats = AlertStats::default();
        for row in rows {
            let (level, count) = row?;
            match level.as_str() {
                "info" => stats.info = count,
                "warning" => stats.warning = count,
                "critical" => stats.critical = count,
                _ => {}
            }
        }
        Ok(stats)
    }

    // ---- reports ----

    pub fn report_exists(
        &self,
        scope: &ReportScope,
        report_type: ReportType,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM reports r
             JOIN services s ON s.id = r.service_id AND s.deleted = 0
             WHERE r.service_id = ?1
               AND COALESCE(r.device_id, '') = COALESCE(?2, '')
               AND r.report_type = ?3
               AND r.period_start = ?4 AND r.period_end = ?5",
            params![
                scope.service_id.to_string(),
                scope.device_id,
                report_type.as_str(),
                period_start.timestamp(),
                period_end.timestamp(),
            ],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn insert_report(&self, report: &Report) -> Result<()> {
        let findings = serde_json::to_string(&report.findings)?;
        let recommendations = serde_json::to_string(&report.recommendations)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO reports (id, service_id, device_id, report_type, period_start, period_end,
                 total_signals, anomaly_count, accuracy_rate, avg_confidence, min_confidence,
                 max_confidence, device_count, info_alerts, warning_alerts, critical_alerts,
                 health_score, trend_direction, trend_confidence,
                 summary, findings, recommendations, detail, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                 ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24)",
            params![
                report.id.to_string(),
                report.service_id.to_string(),
                report.device_id,
                report.report_type.as_str(),
                report.period_start.timestamp(),
                report.period_end.timestamp(),
                report.stats.predictions.total_signals as i64,
                report.stats.predictions.anomaly_count as i64,
                report.stats.predictions.accuracy_rate,
                report.stats.predictions.avg_confidence,
                report.stats.predictions.min_confidence,
                report.stats.predictions.max_confidence,
                report.stats.predictions.device_count as i64,
                report.stats.alerts.info as i64,
                report.stats.alerts.warning as i64,
                report.stats.alerts.critical as i64,
                report.health_score,
                report.trend_direction.map(|d| d.as_str()),
                report.trend_confidence,
                report.summary,
                findings,
                recommendations,
                report.detail,
                report.created_at.timestamp(),
            ],
        )?;
        Ok(())
    }

    pub fn get_report(&self, id: Uuid) -> Result<Option<Report>> {
        let conn = self.conn.lock().unwrap();
        let report = conn
            .query_row(
                "SELECT id, service_id, device_id, report_type, period_start, period_end,
                        total_signals, anomaly_count, accuracy_rate, avg_confidence,
                        min_confidence, max_confidence, device_count,
                        info_alerts, warning_alerts, critical_alerts,
                        health_score, trend_direction, trend_confidence,
                        summary, findings, recommendations, detail, created_at
                 FROM reports WHERE id = ?1",
                params![id.to_string()],
                row_to_report,
            )
            .optional()?;
        Ok(report)
    }
}

// ---- row mapping ----

fn parse_uuid(idx: usize, s: String) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(&s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

fn opt_timestamp(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.map(timestamp)
}

fn row_to_service(row: &Row<'_>) -> rusqlite::Result<MonitoredService> {
    Ok(MonitoredService {
        id: parse_uuid(0, row.get(0)?)?,
        name: row.get(1)?,
        profile: AlgorithmProfile::from_str_lossy(&row.get::<_, String>(2)?),
        update_cycle_days: row.get(3)?,
        prediction_cycle_days: row.get(4)?,
        prediction_duration_days: row.get(5)?,
        auto_generate: row.get(6)?,
        enabled: row.get(7)?,
        deleted: row.get(8)?,
        last_train_at: opt_timestamp(row.get(9)?),
        last_generated_at: opt_timestamp(row.get(10)?),
        next_run_at: opt_timestamp(row.get(11)?),
    })
}

fn row_to_binding(row: &Row<'_>) -> rusqlite::Result<ModelBinding> {
    let status: String = row.get(5)?;
    Ok(ModelBinding {
        id: parse_uuid(0, row.get(0)?)?,
        service_id: parse_uuid(1, row.get(1)?)?,
        device_id: row.get(2)?,
        monitor_type: row.get(3)?,
        metric: row.get(4)?,
        training_status: TrainingStatus::parse(&status).unwrap_or_default(),
        last_train_at: opt_timestamp(row.get(6)?),
    })
}

fn row_to_training_record(row: &Row<'_>) -> rusqlite::Result<TrainingRecord> {
    let status: String = row.get(5)?;
    Ok(TrainingRecord {
        id: parse_uuid(0, row.get(0)?)?,
        service_id: parse_uuid(1, row.get(1)?)?,
        binding_id: parse_uuid(2, row.get(2)?)?,
        started_at: timestamp(row.get(3)?),
        ended_at: opt_timestamp(row.get(4)?),
        status: TrainingStatus::parse(&status).unwrap_or_default(),
        duration_secs: row.get(6)?,
        sample_count: row.get(7)?,
        accuracy: row.get(8)?,
        model_version: row.get(9)?,
    })
}

fn row_to_signal(row: &Row<'_>) -> rusqlite::Result<PredictionSignal> {
    Ok(PredictionSignal {
        id: parse_uuid(0, row.get(0)?)?,
        service_id: parse_uuid(1, row.get(1)?)?,
        device_id: row.get(2)?,
        binding_id: parse_uuid(3, row.get(3)?)?,
        predicted_at: timestamp(row.get(4)?),
        value: row.get(5)?,
        anomaly: row.get(6)?,
        confidence: row.get(7)?,
        algorithm: row.get(8)?,
    })
}

fn row_to_report(row: &Row<'_>) -> rusqlite::Result<Report> {
    let report_type: String = row.get(3)?;
    let findings: String = row.get(20)?;
    let recommendations: String = row.get(21)?;
    Ok(Report {
        id: parse_uuid(0, row.get(0)?)?,
        service_id: parse_uuid(1, row.get(1)?)?,
        device_id: row.get(2)?,
        report_type: match report_type.as_str() {
            "trend" => ReportType::Trend,
            "summary" => ReportType::Summary,
            _ => ReportType::Health,
        },
        period_start: timestamp(row.get(4)?),
        period_end: timestamp(row.get(5)?),
        stats: StatsSummary {
            predictions: PredictionStats {
                total_signals: row.get::<_, i64>(6)? as u64,
                anomaly_count: row.get::<_, i64>(7)? as u64,
                accuracy_rate: row.get(8)?,
                avg_confidence: row.get(9)?,
                min_confidence: row.get(10)?,
                max_confidence: row.get(11)?,
                device_count: row.get::<_, i64>(12)? as u64,
            },
            alerts: AlertStats {
                info: row.get::<_, i64>(13)? as u64,
                warning: row.get::<_, i64>(14)? as u64,
                critical: row.get::<_, i64>(15)? as u64,
            },
        },
        health_score: row.get(16)?,
        trend_direction: row
            .get::<_, Option<String>>(17)?
            .map(|s| TrendDirection::from_str_lossy(&s)),
        trend_confidence: row.get(18)?,
        summary: row.get(19)?,
        findings: serde_json::from_str(&findings).unwrap_or_default(),
        recommendations: serde_json::from_str(&recommendations).unwrap_or_default(),
        detail: row.get(22)?,
        created_at: timestamp(row.get(23)?),
    })
}

/// Build an alert for an anomalous signal. Severity comes strictly from
/// the signal's confidence.
pub fn alert_for_signal(signal: &PredictionSignal, now: DateTime<Utc>) -> Alert {
    let level = AlertLevel::from_confidence(signal.confidence);
    Alert {
        id: Uuid::new_v4(),
        service_id: signal.service_id,
        device_id: signal.device_id.clone(),
        signal_id: Some(signal.id),
        level,
        status: AlertStatus::Active,
        message: format!(
            "Anomalous prediction on {}: value {:.2} at confidence {:.2}",
            signal.device_id, signal.value, signal.confidence
        ),
        raised_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn service(update_cycle_days: i64) -> MonitoredService {
        MonitoredService {
            id: Uuid::new_v4(),
            name: "fleet".to_string(),
            profile: AlgorithmProfile::Knn,
            update_cycle_days,
            prediction_cycle_days: 1,
            prediction_duration_days: 7,
            auto_generate: true,
            enabled: true,
            last_train_at: None,
            last_generated_at: None,
            next_run_at: None,
            deleted: false,
        }
    }

    fn binding(service_id: Uuid, device: &str, metric: &str) -> ModelBinding {
        ModelBinding {
            id: Uuid::new_v4(),
            service_id,
            device_id: device.to_string(),
            monitor_type: "host".to_string(),
            metric: metric.to_string(),
            training_status: TrainingStatus::Success,
            last_train_at: None,
        }
    }

    fn signal(svc: Uuid, bind: Uuid, device: &str, at: DateTime<Utc>, conf: f64) -> PredictionSignal {
        PredictionSignal {
            id: Uuid::new_v4(),
            service_id: svc,
            device_id: device.to_string(),
            binding_id: bind,
            predicted_at: at,
            value: 42.0,
            anomaly: false,
            confidence: conf,
            algorithm: "knn".to_string(),
        }
    }

    #[test]
    fn test_service_roundtrip() {
        let db = MonitorDb::open_in_memory().unwrap();
        let svc = service(3);
        db.insert_service(&svc).unwrap();
        let loaded = db.get_service(svc.id).unwrap().unwrap();
        assert_eq!(loaded.name, "fleet");
        assert_eq!(loaded.profile, AlgorithmProfile::Knn);
        assert_eq!(loaded.update_cycle_days, 3);
        assert!(loaded.next_run_at.is_none());
    }

    #[test]
    fn test_open_at_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.db");
        let svc = service(1);
        {
            let db = MonitorDb::open_at(&path).unwrap();
            db.insert_service(&svc).unwrap();
        }
        let db = MonitorDb::open_at(&path).unwrap();
        assert!(db.get_service(svc.id).unwrap().is_some());
    }

    #[test]
    fn test_claim_due_advances_and_blocks_second_claim() {
        let db = MonitorDb::open_in_memory().unwrap();
        let svc = service(2);
        db.insert_service(&svc).unwrap();
        let now = Utc::now();

        // Never generated: counts as due.
        let claimed = db.claim_due(svc.id, now).unwrap();
        assert!(claimed.is_some());

        // Schedule moved one cycle forward; an immediate second claim loses.
        let again = db.claim_due(svc.id, now).unwrap();
        assert!(again.is_none());

        let loaded = db.get_service(svc.id).unwrap().unwrap();
        let next = loaded.next_run_at.unwrap();
        assert_eq!(next.timestamp(), (now + Duration::days(2)).timestamp());

        // Due again once the window arrives.
        let later = now + Duration::days(2);
        assert!(db.claim_due(svc.id, later).unwrap().is_some());
    }

    #[test]
    fn test_claim_due_refuses_disabled_and_deleted() {
        let db = MonitorDb::open_in_memory().unwrap();
        let mut svc = service(1);
        svc.enabled = false;
        db.insert_service(&svc).unwrap();
        assert!(db.claim_due(svc.id, Utc::now()).unwrap().is_none());

        let svc2 = service(1);
        db.insert_service(&svc2).unwrap();
        db.soft_delete_service(svc2.id).unwrap();
        assert!(db.claim_due(svc2.id, Utc::now()).unwrap().is_none());
    }

    #[test]
    fn test_binding_tuple_unique() {
        let db = MonitorDb::open_in_memory().unwrap();
        let svc = service(1);
        db.insert_service(&svc).unwrap();
        let b = binding(svc.id, "dev-1", "cpu");
        db.insert_binding(&b).unwrap();
        let mut dup = binding(svc.id, "dev-1", "cpu");
        dup.id = Uuid::new_v4();
        assert!(db.insert_binding(&dup).is_err());
    }

    #[test]
    fn test_trained_bindings_filters_status() {
        let db = MonitorDb::open_in_memory().unwrap();
        let svc = service(1);
        db.insert_service(&svc).unwrap();
        let trained = binding(svc.id, "dev-1", "cpu");
        let mut untrained = binding(svc.id, "dev-2", "cpu");
        untrained.training_status = TrainingStatus::Untrained;
        db.insert_binding(&trained).unwrap();
        db.insert_binding(&untrained).unwrap();

        let eligible = db.trained_bindings(svc.id).unwrap();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].device_id, "dev-1");

        assert_eq!(db.bindings_for_service(svc.id).unwrap().len(), 2);
    }

    #[test]
    fn test_signal_stats_window_is_half_open() {
        let db = MonitorDb::open_in_memory().unwrap();
        let svc = service(1);
        db.insert_service(&svc).unwrap();
        let b = binding(svc.id, "dev-1", "cpu");
        db.insert_binding(&b).unwrap();

        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let end = start + Duration::hours(1);
        db.insert_signal(&signal(svc.id, b.id, "dev-1", start, 0.8)).unwrap();
        // Exactly at the end bound: excluded.
        db.insert_signal(&signal(svc.id, b.id, "dev-1", end, 0.9)).unwrap();

        let scope = ReportScope::service(svc.id);
        let stats = db.signal_stats_in_window(&scope, start, end).unwrap();
        assert_eq!(stats.total_signals, 1);
        assert_eq!(stats.device_count, 1);
    }

    #[test]
    fn test_soft_delete_hides_signals_and_bindings() {
        let db = MonitorDb::open_in_memory().unwrap();
        let svc = service(1);
        db.insert_service(&svc).unwrap();
        let b = binding(svc.id, "dev-1", "cpu");
        db.insert_binding(&b).unwrap();
        let now = Utc::now();
        db.insert_signal(&signal(svc.id, b.id, "dev-1", now, 0.8)).unwrap();

        db.soft_delete_service(svc.id).unwrap();

        let scope = ReportScope::service(svc.id);
        let stats = db
            .signal_stats_in_window(&scope, now - Duration::hours(1), now + Duration::hours(1))
            .unwrap();
        assert_eq!(stats.total_signals, 0);
        assert!(db.trained_bindings(svc.id).unwrap().is_empty());
        assert!(db.get_binding(b.id).unwrap().is_none());
    }

    #[test]
    fn test_alert_counts_group_by_level() {
        let db = MonitorDb::open_in_memory().unwrap();
        let svc = service(1);
        db.insert_service(&svc).unwrap();
        let now = Utc::now();
        for (level, n) in [(AlertLevel::Critical, 2), (AlertLevel::Info, 3)] {
            for _ in 0..n {
                db.insert_alert(&Alert {
                    id: Uuid::new_v4(),
                    service_id: svc.id,
                    device_id: "dev-1".to_string(),
                    signal_id: None,
                    level,
                    status: AlertStatus::Active,
                    message: "test".to_string(),
                    raised_at: now,
                })
                .unwrap();
            }
        }
        let scope = ReportScope::service(svc.id);
        let stats = db
            .alert_counts_in_window(&scope, now - Duration::hours(1), now + Duration::hours(1))
            .unwrap();
        assert_eq!(stats.critical, 2);
        assert_eq!(stats.info, 3);
        assert_eq!(stats.warning, 0);
    }

    #[test]
    fn test_report_roundtrip_and_existence() {
        let db = MonitorDb::open_in_memory().unwrap();
        let svc = service(1);
        db.insert_service(&svc).unwrap();
        let scope = ReportScope::service(svc.id);
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let end = start + Duration::days(7);

        assert!(!db.report_exists(&scope, ReportType::Health, start, end).unwrap());

        let report = Report {
            id: Uuid::new_v4(),
            service_id: svc.id,
            device_id: None,
            report_type: ReportType::Health,
            period_start: start,
            period_end: end,
            stats: StatsSummary::default(),
            health_score: 0.87,
            trend_direction: Some(TrendDirection::Improving),
            trend_confidence: Some(0.8),
            summary: "ok".to_string(),
            findings: vec!["finding".to_string()],
            recommendations: vec!["recommendation".to_string()],
            detail: "detail".to_string(),
            created_at: end,
        };
        db.insert_report(&report).unwrap();

        assert!(db.report_exists(&scope, ReportType::Health, start, end).unwrap());
        // Same period, different type: no collision.
        assert!(!db.report_exists(&scope, ReportType::Trend, start, end).unwrap());
        // Device-scoped report for the same period: no collision.
        let dev_scope = ReportScope::device(svc.id, "dev-1");
        assert!(!db.report_exists(&dev_scope, ReportType::Health, start, end).unwrap());

        let loaded = db.get_report(report.id).unwrap().unwrap();
        assert_eq!(loaded.health_score, 0.87);
        assert_eq!(loaded.findings, vec!["finding".to_string()]);
        assert_eq!(loaded.trend_direction, Some(TrendDirection::Improving));
    }

    #[test]
    fn test_alert_for_signal_level_from_confidence() {
        let mut sig = signal(Uuid::new_v4(), Uuid::new_v4(), "dev-1", Utc::now(), 0.93);
        sig.anomaly = true;
        let alert = alert_for_signal(&sig, Utc::now());
        assert_eq!(alert.level, AlertLevel::Critical);
        assert_eq!(alert.signal_id, Some(sig.id));

        sig.confidence = 0.75;
        assert_eq!(alert_for_signal(&sig, Utc::now()).level, AlertLevel::Warning);
        sig.confidence = 0.55;
        assert_eq!(alert_for_signal(&sig, Utc::now()).level, AlertLevel::Info);
    }
}
