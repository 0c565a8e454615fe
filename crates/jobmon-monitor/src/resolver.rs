use anyhow::Result;
use async_trait::async_trait;
use jobmon_common::types::MonitorRule;
use jobmon_storage::MonitorData;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Supplies the set of rules matching an event, optionally scoped to a job.
///
/// Implemented by [`RuleResolver`] (straight to the data store) and
/// [`RuleCache`] (read-through snapshot). A rule matching at more than one
/// scope is returned once.
#[async_trait]
pub trait RuleSource: Send + Sync {
    async fn resolve(
        &self,
        event_id: i32,
        job: Option<(&str, &str)>,
    ) -> Result<Vec<MonitorRule>>;
}

/// Resolves rules with three concurrent lookups against the data store:
/// global, group-scoped, and exact-job. Any lookup failure fails the whole
/// resolution so no rule fires from a half-failed read.
pub struct RuleResolver {
    data: Arc<dyn MonitorData>,
}

impl RuleResolver {
    pub fn new(data: Arc<dyn MonitorData>) -> Self {
        Self { data }
    }
}

#[async_trait]
impl RuleSource for RuleResolver {
    async fn resolve(
        &self,
        event_id: i32,
        job: Option<(&str, &str)>,
    ) -> Result<Vec<MonitorRule>> {
        let rules = match job {
            Some((group, name)) => {
                let (global, grouped, exact) = tokio::try_join!(
                    self.data.get_rules_by_event(event_id),
                    self.data.get_rules_by_group(event_id, group),
                    self.data.get_rules_by_job(event_id, group, name),
                )?;
                let mut rules = global;
                rules.extend(grouped);
                rules.extend(exact);
                rules
            }
            None => self.data.get_rules_by_event(event_id).await?,
        };
        Ok(distinct(rules))
    }
}

struct Snapshot {
    rules: Vec<MonitorRule>,
    fetched_at: Instant,
}

/// Read-through cache over the full active-rule set.
///
/// Trades staleness (bounded by the freshness window) for one bulk query
/// instead of three per event. [`invalidate`](Self::invalidate) forces a
/// rebuild on the next resolution.
pub struct RuleCache {
    data: Arc<dyn MonitorData>,
    ttl: Duration,
    snapshot: RwLock<Option<Snapshot>>,
}

impl RuleCache {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

    pub fn new(data: Arc<dyn MonitorData>, ttl: Duration) -> Self {
        Self {
            data,
            ttl,
            snapshot: RwLock::new(None),
        }
    }

    pub async fn invalidate(&self) {
        *self.snapshot.write().await = None;
        tracing::debug!("Rule cache invalidated");
    }

    async fn rules(&self) -> Result<Vec<MonitorRule>> {
        {
            let guard = self.snapshot.read().await;
            if let Some(snapshot) = guard.as_ref() {
                if snapshot.fetched_at.elapsed() < self.ttl {
                    return Ok(snapshot.rules.clone());
                }
            }
        }

        let mut guard = self.snapshot.write().await;
        // Another resolver task may have rebuilt while we waited
        if let Some(snapshot) = guard.as_ref() {
            if snapshot.fetched_at.elapsed() < self.ttl {
                return Ok(snapshot.rules.clone());
            }
        }

        let rules = self.data.get_all_active_rules().await?;
        tracing::debug!(count = rules.len(), "Rule cache snapshot rebuilt");
        *guard = Some(Snapshot {
            rules: rules.clone(),
            fetched_at: Instant::now(),
        });
        Ok(rules)
    }
}

#[async_trait]
impl RuleSource for RuleCache {
    async fn resolve(
        &self,
        event_id: i32,
        job: Option<(&str, &str)>,
    ) -> Result<Vec<MonitorRule>> {
        let rules = self.rules().await?;
        let matched = rules
            .into_iter()
            .filter(|r| r.active && r.event_id == event_id)
            .filter(|r| match job {
                Some((group, name)) => r.matches_job(group, name),
                None => r.job_group.is_none(),
            })
            .collect();
        Ok(distinct(matched))
    }
}

fn distinct(rules: Vec<MonitorRule>) -> Vec<MonitorRule> {
    let mut seen = HashSet::new();
    rules
        .into_iter()
        .filter(|r| r.active)
        .filter(|r| seen.insert(r.id.clone()))
        .collect()
}
