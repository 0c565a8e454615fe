use jobmon_common::types::{DistributionGroup, EventContext, SystemEventContext};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PAYLOAD_VERSION: &str = "1.0";

/// Which payload kind a wrapper carries, driving the hook entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadSubject {
    MonitorDetails,
    MonitorSystemDetails,
}

impl PayloadSubject {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MonitorDetails => "MonitorDetails",
            Self::MonitorSystemDetails => "MonitorSystemDetails",
        }
    }
}

/// Details blob for a job-execution firing.
///
/// `group` and `global_config` are populated while assembling the payload
/// and blanked before the blob is serialized into [`HookWrapper::details`];
/// they travel only in their dedicated wrapper fields. Recipient size is
/// preserved through `users_count`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorDetails {
    pub rule_id: String,
    pub rule_title: String,
    pub event_id: i32,
    pub event_title: String,
    pub event_argument: Option<String>,
    pub group: Option<DistributionGroup>,
    pub global_config: Option<Value>,
    pub users_count: u64,
    pub job: EventContext,
}

/// Details blob for a system-event firing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSystemDetails {
    pub rule_id: String,
    pub rule_title: String,
    pub event_id: i32,
    pub event_title: String,
    pub group: Option<DistributionGroup>,
    pub global_config: Option<Value>,
    pub users_count: u64,
    /// Rendered message (template with parameters substituted).
    pub message: String,
    pub system: SystemEventContext,
}

/// Self-describing wire payload sent to every hook regardless of execution
/// mode: a subject, a version, and two JSON blobs (recipients and details).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookWrapper {
    pub version: String,
    pub subject: String,
    /// JSON-encoded recipient group snapshot.
    pub groups: String,
    /// JSON-encoded host configuration snapshot.
    pub global_config: String,
    /// JSON-encoded details with recipients and config blanked out.
    pub details: String,
}

impl HookWrapper {
    /// Wraps a job-execution details blob, moving the recipient group and
    /// global configuration into their dedicated fields.
    pub fn from_details(mut details: MonitorDetails) -> serde_json::Result<Self> {
        let groups = serde_json::to_string(&details.group)?;
        let global_config = serde_json::to_string(&details.global_config)?;
        details.group = None;
        details.global_config = None;
        Ok(Self {
            version: PAYLOAD_VERSION.to_string(),
            subject: PayloadSubject::MonitorDetails.as_str().to_string(),
            groups,
            global_config,
            details: serde_json::to_string(&details)?,
        })
    }

    /// Wraps a system-event details blob.
    pub fn from_system_details(mut details: MonitorSystemDetails) -> serde_json::Result<Self> {
        let groups = serde_json::to_string(&details.group)?;
        let global_config = serde_json::to_string(&details.global_config)?;
        details.group = None;
        details.global_config = None;
        Ok(Self {
            version: PAYLOAD_VERSION.to_string(),
            subject: PayloadSubject::MonitorSystemDetails.as_str().to_string(),
            groups,
            global_config,
            details: serde_json::to_string(&details)?,
        })
    }

    pub fn subject_kind(&self) -> Option<PayloadSubject> {
        match self.subject.as_str() {
            "MonitorDetails" => Some(PayloadSubject::MonitorDetails),
            "MonitorSystemDetails" => Some(PayloadSubject::MonitorSystemDetails),
            _ => None,
        }
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn parse(message: &str) -> serde_json::Result<Self> {
        serde_json::from_str(message)
    }

    /// Handler-side decode of the details blob.
    pub fn decode_details<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.details)
    }

    /// Handler-side decode of the recipient group snapshot.
    pub fn decode_groups(&self) -> serde_json::Result<Option<DistributionGroup>> {
        serde_json::from_str(&self.groups)
    }
}
