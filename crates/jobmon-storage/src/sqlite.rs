use crate::MonitorData;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobmon_common::id::AlertIdGenerator;
use jobmon_common::types::{AlertRecord, DistributionGroup, MonitorRule, MonitorUser};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// SQLite-backed implementation of [`MonitorData`].
///
/// A single connection in WAL mode behind a mutex; every query is short and
/// the pipeline's fan-out tasks only contend on it briefly.
pub struct SqliteMonitorData {
    conn: Mutex<Connection>,
    ids: AlertIdGenerator,
}

impl SqliteMonitorData {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init_schema(&conn)?;
        tracing::info!(path = %path.display(), "Monitor database opened");
        Ok(Self {
            conn: Mutex::new(conn),
            ids: AlertIdGenerator::default(),
        })
    }

    /// In-memory database, used by tests and demos.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            ids: AlertIdGenerator::default(),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS monitor_rules (
                id             TEXT PRIMARY KEY,
                title          TEXT NOT NULL,
                event_id       INTEGER NOT NULL,
                event_argument TEXT,
                job_group      TEXT,
                job_name       TEXT,
                group_id       TEXT NOT NULL,
                hook           TEXT NOT NULL,
                active         INTEGER NOT NULL DEFAULT 1
            );
            CREATE INDEX IF NOT EXISTS idx_rules_event ON monitor_rules (event_id);

            CREATE TABLE IF NOT EXISTS distribution_groups (
                id        TEXT PRIMARY KEY,
                name      TEXT NOT NULL,
                reference TEXT
            );

            CREATE TABLE IF NOT EXISTS group_users (
                id       TEXT PRIMARY KEY,
                group_id TEXT NOT NULL,
                name     TEXT NOT NULL,
                emails   TEXT NOT NULL,
                phone    TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_group_users ON group_users (group_id);

            CREATE TABLE IF NOT EXISTS job_runs (
                id            TEXT PRIMARY KEY,
                job_id        TEXT NOT NULL,
                fire_time     INTEGER NOT NULL,
                success       INTEGER NOT NULL,
                effected_rows INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_job_runs ON job_runs (job_id, fire_time);

            CREATE TABLE IF NOT EXISTS mutes (
                id         TEXT PRIMARY KEY,
                job_id     TEXT NOT NULL,
                rule_id    TEXT,
                event_id   INTEGER,
                expires_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_mutes ON mutes (job_id);

            CREATE TABLE IF NOT EXISTS alerts (
                id               TEXT PRIMARY KEY,
                rule_id          TEXT NOT NULL,
                rule_title       TEXT NOT NULL,
                event_id         INTEGER NOT NULL,
                event_title      TEXT NOT NULL,
                event_argument   TEXT,
                group_id         TEXT NOT NULL,
                group_name       TEXT NOT NULL,
                hook             TEXT NOT NULL,
                fire_time        TEXT NOT NULL,
                has_error        INTEGER NOT NULL,
                exception        TEXT,
                payload          TEXT NOT NULL,
                users_count      INTEGER NOT NULL,
                fire_instance_id TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_alerts_rule ON alerts (rule_id);

            CREATE TABLE IF NOT EXISTS rule_counters (
                rule_id TEXT NOT NULL,
                period  TEXT NOT NULL,
                total   INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (rule_id, period)
            );",
        )?;
        Ok(())
    }

    // ---- host-side write helpers (admin surface / test fixtures) ----

    pub fn insert_rule(&self, rule: &MonitorRule) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO monitor_rules
             (id, title, event_id, event_argument, job_group, job_name, group_id, hook, active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                rule.id,
                rule.title,
                rule.event_id,
                rule.event_argument,
                rule.job_group,
                rule.job_name,
                rule.group_id,
                rule.hook,
                rule.active,
            ],
        )?;
        Ok(())
    }

    pub fn upsert_group(&self, group: &DistributionGroup) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO distribution_groups (id, name, reference) VALUES (?1, ?2, ?3)",
            params![group.id, group.name, group.reference],
        )?;
        conn.execute(
            "DELETE FROM group_users WHERE group_id = ?1",
            params![group.id],
        )?;
        for user in &group.users {
            let emails = serde_json::to_string(&user.emails)?;
            conn.execute(
                "INSERT INTO group_users (id, group_id, name, emails, phone)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![user.id, group.id, user.name, emails, user.phone],
            )?;
        }
        Ok(())
    }

    pub fn record_job_run(
        &self,
        job_id: &str,
        fire_time: DateTime<Utc>,
        success: bool,
        effected_rows: Option<i64>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO job_runs (id, job_id, fire_time, success, effected_rows)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                self.ids.next(),
                job_id,
                fire_time.timestamp_millis(),
                success,
                effected_rows,
            ],
        )?;
        Ok(())
    }

    /// Adds a mute record. `rule_id`/`event_id` of `None` mute every rule or
    /// event for the job.
    pub fn add_mute(
        &self,
        job_id: &str,
        rule_id: Option<&str>,
        event_id: Option<i32>,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO mutes (id, job_id, rule_id, event_id, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                self.ids.next(),
                job_id,
                rule_id,
                event_id,
                expires_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    /// Drops expired mute rows. Returns the number removed. Run by the
    /// maintenance job, not by the pipeline.
    pub fn clear_expired_mutes(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute(
            "DELETE FROM mutes WHERE expires_at <= ?1",
            params![Utc::now().timestamp_millis()],
        )?;
        if removed > 0 {
            tracing::info!(removed, "Expired mute records cleared");
        }
        Ok(removed)
    }

    pub fn counter_total(&self, rule_id: &str, period: &str) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let total: Option<i64> = conn
            .query_row(
                "SELECT total FROM rule_counters WHERE rule_id = ?1 AND period = ?2",
                params![rule_id, period],
                |row| row.get(0),
            )
            .optional()?;
        Ok(total.unwrap_or(0) as u64)
    }

    pub fn list_alerts(&self, limit: usize) -> Result<Vec<AlertRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, rule_id, rule_title, event_id, event_title, event_argument,
                    group_id, group_name, hook, fire_time, has_error, exception,
                    payload, users_count, fire_instance_id
             FROM alerts ORDER BY fire_time DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            let fire_time: String = row.get(9)?;
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i32>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, String>(8)?,
                fire_time,
                row.get::<_, bool>(10)?,
                row.get::<_, Option<String>>(11)?,
                row.get::<_, String>(12)?,
                row.get::<_, i64>(13)?,
                row.get::<_, Option<String>>(14)?,
            ))
        })?;

        let mut alerts = Vec::new();
        for row in rows {
            let (
                id,
                rule_id,
                rule_title,
                event_id,
                event_title,
                event_argument,
                group_id,
                group_name,
                hook,
                fire_time,
                has_error,
                exception,
                payload,
                users_count,
                fire_instance_id,
            ) = row?;
            let fire_time = DateTime::parse_from_rfc3339(&fire_time)
                .map_err(|_| crate::error::StorageError::InvalidTimestamp {
                    column: "fire_time",
                    value: fire_time.clone(),
                })?
                .with_timezone(&chrono::Local);
            alerts.push(AlertRecord {
                id,
                rule_id,
                rule_title,
                event_id,
                event_title,
                event_argument,
                group_id,
                group_name,
                hook,
                fire_time,
                has_error,
                exception,
                payload,
                users_count: users_count as u64,
                fire_instance_id,
            });
        }
        Ok(alerts)
    }

    fn rule_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MonitorRule> {
        Ok(MonitorRule {
            id: row.get(0)?,
            title: row.get(1)?,
            event_id: row.get(2)?,
            event_argument: row.get(3)?,
            job_group: row.get(4)?,
            job_name: row.get(5)?,
            group_id: row.get(6)?,
            hook: row.get(7)?,
            active: row.get(8)?,
        })
    }

    fn query_rules(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<MonitorRule>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(sql)?;
        let rows = stmt.query_map(params, Self::rule_from_row)?;
        let mut rules = Vec::new();
        for row in rows {
            rules.push(row?);
        }
        Ok(rules)
    }
}

const RULE_COLUMNS: &str =
    "id, title, event_id, event_argument, job_group, job_name, group_id, hook, active";

#[async_trait]
impl MonitorData for SqliteMonitorData {
    async fn get_rules_by_event(&self, event_id: i32) -> Result<Vec<MonitorRule>> {
        self.query_rules(
            &format!(
                "SELECT {RULE_COLUMNS} FROM monitor_rules
                 WHERE event_id = ?1 AND active = 1 AND job_group IS NULL"
            ),
            &[&event_id],
        )
    }

    async fn get_rules_by_group(&self, event_id: i32, job_group: &str) -> Result<Vec<MonitorRule>> {
        self.query_rules(
            &format!(
                "SELECT {RULE_COLUMNS} FROM monitor_rules
                 WHERE event_id = ?1 AND active = 1 AND job_group = ?2 AND job_name IS NULL"
            ),
            &[&event_id, &job_group],
        )
    }

    async fn get_rules_by_job(
        &self,
        event_id: i32,
        job_group: &str,
        job_name: &str,
    ) -> Result<Vec<MonitorRule>> {
        self.query_rules(
            &format!(
                "SELECT {RULE_COLUMNS} FROM monitor_rules
                 WHERE event_id = ?1 AND active = 1 AND job_group = ?2 AND job_name = ?3"
            ),
            &[&event_id, &job_group, &job_name],
        )
    }

    async fn get_all_active_rules(&self) -> Result<Vec<MonitorRule>> {
        self.query_rules(
            &format!("SELECT {RULE_COLUMNS} FROM monitor_rules WHERE active = 1"),
            &[],
        )
    }

    async fn get_distribution_group(&self, group_id: &str) -> Result<Option<DistributionGroup>> {
        let conn = self.conn.lock().unwrap();
        let header: Option<(String, String, Option<String>)> = conn
            .query_row(
                "SELECT id, name, reference FROM distribution_groups WHERE id = ?1",
                params![group_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((id, name, reference)) = header else {
            return Ok(None);
        };

        let mut stmt = conn.prepare_cached(
            "SELECT id, name, emails, phone FROM group_users WHERE group_id = ?1",
        )?;
        let rows = stmt.query_map(params![group_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?;

        let mut users = Vec::new();
        for row in rows {
            let (id, name, emails, phone) = row?;
            users.push(MonitorUser {
                id,
                name,
                emails: serde_json::from_str(&emails)?,
                phone,
            });
        }

        Ok(Some(DistributionGroup {
            id,
            name,
            reference,
            users,
        }))
    }

    async fn count_consecutive_failures(&self, job_id: &str) -> Result<u32> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT success FROM job_runs WHERE job_id = ?1 ORDER BY fire_time DESC",
        )?;
        let rows = stmt.query_map(params![job_id], |row| row.get::<_, bool>(0))?;

        let mut count = 0u32;
        for row in rows {
            if row? {
                break;
            }
            count += 1;
        }
        Ok(count)
    }

    async fn count_failures_since(&self, job_id: &str, since: DateTime<Utc>) -> Result<u32> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM job_runs
             WHERE job_id = ?1 AND success = 0 AND fire_time >= ?2",
            params![job_id, since.timestamp_millis()],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    async fn sum_effected_rows(&self, job_id: &str, since: DateTime<Utc>) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let sum: Option<i64> = conn.query_row(
            "SELECT SUM(effected_rows) FROM job_runs
             WHERE job_id = ?1 AND fire_time >= ?2",
            params![job_id, since.timestamp_millis()],
            |row| row.get(0),
        )?;
        Ok(sum.unwrap_or(0))
    }

    async fn is_muted(&self, job_id: &str, event_id: i32, rule_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM mutes
             WHERE job_id = ?1
               AND (rule_id IS NULL OR rule_id = ?2)
               AND (event_id IS NULL OR event_id = ?3)
               AND expires_at > ?4",
            params![job_id, rule_id, event_id, Utc::now().timestamp_millis()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    async fn save_alert(&self, alert: &AlertRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO alerts
             (id, rule_id, rule_title, event_id, event_title, event_argument,
              group_id, group_name, hook, fire_time, has_error, exception,
              payload, users_count, fire_instance_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                alert.id,
                alert.rule_id,
                alert.rule_title,
                alert.event_id,
                alert.event_title,
                alert.event_argument,
                alert.group_id,
                alert.group_name,
                alert.hook,
                alert.fire_time.to_rfc3339(),
                alert.has_error,
                alert.exception,
                alert.payload,
                alert.users_count as i64,
                alert.fire_instance_id,
            ],
        )?;
        Ok(())
    }

    async fn increment_counter(&self, rule_id: &str) -> Result<()> {
        let period = Utc::now().format("%Y-%m").to_string();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO rule_counters (rule_id, period, total) VALUES (?1, ?2, 1)
             ON CONFLICT (rule_id, period) DO UPDATE SET total = total + 1",
            params![rule_id, period],
        )?;
        Ok(())
    }
}
