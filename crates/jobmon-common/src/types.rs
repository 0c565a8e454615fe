use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A configured alerting rule, mapping an event (optionally scoped to a job
/// group or an exact job) to a notification hook and a distribution group.
///
/// Rules are created and edited by an external admin surface; the pipeline
/// only ever reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorRule {
    pub id: String,
    pub title: String,
    pub event_id: i32,
    /// Numeric threshold argument(s) for argument-bearing events,
    /// e.g. `"3"` or `"50,24"`. Unused for other tiers.
    pub event_argument: Option<String>,
    /// `None` means the rule is global (matches every job).
    pub job_group: Option<String>,
    /// Only meaningful together with `job_group`; narrows to an exact job.
    pub job_name: Option<String>,
    pub group_id: String,
    /// Name of the hook that delivers this rule's notifications.
    pub hook: String,
    pub active: bool,
}

impl MonitorRule {
    /// True when the rule applies to the given job identity, either globally,
    /// by group, or by exact job.
    pub fn matches_job(&self, job_group: &str, job_name: &str) -> bool {
        match (&self.job_group, &self.job_name) {
            (None, _) => true,
            (Some(g), None) => g == job_group,
            (Some(g), Some(n)) => g == job_group && n == job_name,
        }
    }
}

/// A notification recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorUser {
    pub id: String,
    pub name: String,
    pub emails: Vec<String>,
    pub phone: Option<String>,
}

/// Recipients for a rule, snapshotted into the hook payload at fire time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionGroup {
    pub id: String,
    pub name: String,
    pub reference: Option<String>,
    pub users: Vec<MonitorUser>,
}

impl DistributionGroup {
    pub fn users_count(&self) -> u64 {
        self.users.len() as u64
    }
}

/// Job-execution flavor of a monitor event, constructed fresh per event from
/// the scheduler's execution context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventContext {
    pub job_id: String,
    pub job_name: String,
    pub job_group: String,
    pub trigger_id: String,
    pub trigger_name: String,
    pub trigger_group: String,
    /// Correlation id for one firing of the trigger.
    pub fire_instance_id: String,
    pub merged_data: HashMap<String, String>,
    pub fire_time: DateTime<Utc>,
    pub run_duration_ms: i64,
    pub effected_rows: Option<i64>,
    pub exception: Option<String>,
    pub recovering: bool,
}

impl EventContext {
    /// `group.name` identity used for rule scoping and debounce keys.
    pub fn job_key(&self) -> String {
        format!("{}.{}", self.job_group, self.job_name)
    }
}

/// Non-job flavor of a monitor event: a message template plus ordered
/// key/value substitution parameters.
///
/// # Examples
///
/// ```
/// use jobmon_common::types::SystemEventContext;
///
/// let ctx = SystemEventContext::new("node {{node}} joined cluster")
///     .with_param("node", "srv-02");
/// assert_eq!(ctx.render(), "node srv-02 joined cluster");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemEventContext {
    pub message_template: String,
    pub parameters: Vec<(String, String)>,
}

impl SystemEventContext {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            message_template: template.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.push((key.into(), value.into()));
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Substitutes `{{key}}` placeholders with the parameter values.
    pub fn render(&self) -> String {
        let mut message = self.message_template.clone();
        for (key, value) in &self.parameters {
            message = message.replace(&format!("{{{{{key}}}}}"), value);
        }
        message
    }
}

/// Persisted outcome of one rule-dispatch attempt. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: String,
    pub rule_id: String,
    pub rule_title: String,
    pub event_id: i32,
    pub event_title: String,
    pub event_argument: Option<String>,
    pub group_id: String,
    pub group_name: String,
    pub hook: String,
    /// Local wall-clock time of the firing.
    pub fire_time: DateTime<Local>,
    pub has_error: bool,
    pub exception: Option<String>,
    /// Serialized `details` blob of the hook payload. Never contains the
    /// recipient list, only `users_count`.
    pub payload: String,
    pub users_count: u64,
    /// Fire instance id of the triggering execution, when job-flavored.
    pub fire_instance_id: Option<String>,
}
