//! Data-access layer for the monitor pipeline.
//!
//! The pipeline talks to its data store exclusively through the
//! [`MonitorData`] trait: rule lookups, historical run aggregates, mute
//! records, alert persistence, and per-rule counters. The default
//! implementation ([`sqlite::SqliteMonitorData`]) uses a single SQLite
//! database in WAL mode.

pub mod error;
pub mod sqlite;


use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobmon_common::types::{AlertRecord, DistributionGroup, MonitorRule};

/// Data-access collaborator contract for the monitor pipeline.
///
/// Implementations must be safe to share across threads (`Send + Sync`)
/// because the dispatch consumer fans out one task per matched rule and each
/// task queries independently.
#[async_trait]
pub trait MonitorData: Send + Sync {
    /// Rules matching the event with global scope (no job filter).
    async fn get_rules_by_event(&self, event_id: i32) -> Result<Vec<MonitorRule>>;

    /// Rules matching the event, scoped to a job group.
    async fn get_rules_by_group(&self, event_id: i32, job_group: &str) -> Result<Vec<MonitorRule>>;

    /// Rules matching the event, scoped to an exact job.
    async fn get_rules_by_job(
        &self,
        event_id: i32,
        job_group: &str,
        job_name: &str,
    ) -> Result<Vec<MonitorRule>>;

    /// Full snapshot of active rules, used by the read-through rule cache.
    async fn get_all_active_rules(&self) -> Result<Vec<MonitorRule>>;

    /// Recipient group snapshot for a rule, or `None` if the group is gone.
    async fn get_distribution_group(&self, group_id: &str) -> Result<Option<DistributionGroup>>;

    /// Number of trailing failed runs for the job (stops at the most recent
    /// success).
    async fn count_consecutive_failures(&self, job_id: &str) -> Result<u32>;

    /// Number of failed runs for the job since the given instant.
    async fn count_failures_since(&self, job_id: &str, since: DateTime<Utc>) -> Result<u32>;

    /// Sum of effected rows over the job's runs since the given instant.
    async fn sum_effected_rows(&self, job_id: &str, since: DateTime<Utc>) -> Result<i64>;

    /// Whether the rule is currently muted for the job.
    async fn is_muted(&self, job_id: &str, event_id: i32, rule_id: &str) -> Result<bool>;

    /// Appends one alert record (best-effort from the caller's view).
    async fn save_alert(&self, alert: &AlertRecord) -> Result<()>;

    /// Bumps the rule's hit counter in the current period bucket.
    async fn increment_counter(&self, rule_id: &str) -> Result<()>;
}
