use serde::{Deserialize, Serialize};

/// Evaluation tier of a monitor event, derived from its numeric band.
///
/// # Examples
///
/// ```
/// use jobmon_common::events::{EventTier, MonitorEvent};
///
/// assert_eq!(MonitorEvent::ExecutionFail.tier(), EventTier::Simple);
/// assert_eq!(MonitorEvent::ExecutionFailNTimesInRow.tier(), EventTier::ArgumentBearing);
/// assert_eq!(MonitorEvent::ClusterNodeJoin.tier(), EventTier::System);
/// assert_eq!(MonitorEvent::Custom1.tier(), EventTier::Custom);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventTier {
    /// Fires on every matched rule, no historical analysis (100-199).
    Simple,
    /// Requires threshold analysis against historical run data (200-299).
    ArgumentBearing,
    /// Non-job events raised by the scheduler or cluster (300-399).
    System,
    /// User-raised events, always fire (400-499).
    Custom,
}

/// The monitor event catalogue.
///
/// Numeric values are wire-stable: rules reference events by id, and the
/// tier is derived from the hundreds band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum MonitorEvent {
    // Simple (100-199)
    ExecutionVetoed = 100,
    ExecutionRetry = 101,
    ExecutionFail = 102,
    ExecutionSuccess = 103,
    ExecutionStart = 104,
    ExecutionEnd = 105,
    ExecutionProgressChanged = 106,
    ExecutionSuccessWithNoEffectedRows = 107,
    ExecutionLastRetryFail = 108,

    // Argument-bearing (200-299)
    ExecutionFailNTimesInRow = 200,
    ExecutionFailNTimesInHours = 201,
    EffectedRowsGreaterThanN = 202,
    EffectedRowsLessThanN = 203,
    EffectedRowsSumGreaterThanNInHours = 204,
    EffectedRowsSumLessThanNInHours = 205,
    DurationGreaterThanNMinutes = 206,

    // System (300-399)
    ClusterNodeJoin = 300,
    ClusterNodeRemoved = 301,
    ClusterHealthCheckFail = 302,
    TriggerPaused = 303,
    TriggerResumed = 304,
    JobPaused = 305,
    JobResumed = 306,
    SchedulerInStandby = 307,
    SchedulerStarted = 308,
    SchedulerShutdown = 309,
    CircuitBreakerActivated = 310,
    CircuitBreakerReset = 311,
    MaxMemoryUsage = 312,
    ProcessRestart = 313,

    // Custom (400-499)
    Custom1 = 400,
    Custom2 = 401,
    Custom3 = 402,
    Custom4 = 403,
    Custom5 = 404,
}

impl MonitorEvent {
    pub fn id(self) -> i32 {
        self as i32
    }

    pub fn tier(self) -> EventTier {
        match self.id() / 100 {
            1 => EventTier::Simple,
            2 => EventTier::ArgumentBearing,
            3 => EventTier::System,
            _ => EventTier::Custom,
        }
    }

    /// Human-readable title, persisted on alert records.
    pub fn title(self) -> &'static str {
        match self {
            Self::ExecutionVetoed => "Execution Vetoed",
            Self::ExecutionRetry => "Execution Retry",
            Self::ExecutionFail => "Execution Fail",
            Self::ExecutionSuccess => "Execution Success",
            Self::ExecutionStart => "Execution Start",
            Self::ExecutionEnd => "Execution End",
            Self::ExecutionProgressChanged => "Execution Progress Changed",
            Self::ExecutionSuccessWithNoEffectedRows => "Execution Success With No Effected Rows",
            Self::ExecutionLastRetryFail => "Execution Last Retry Fail",
            Self::ExecutionFailNTimesInRow => "Execution Fail N Times In Row",
            Self::ExecutionFailNTimesInHours => "Execution Fail N Times In Last N Hours",
            Self::EffectedRowsGreaterThanN => "Effected Rows Greater Than N",
            Self::EffectedRowsLessThanN => "Effected Rows Less Than N",
            Self::EffectedRowsSumGreaterThanNInHours => {
                "Effected Rows Sum Greater Than N In Last N Hours"
            }
            Self::EffectedRowsSumLessThanNInHours => {
                "Effected Rows Sum Less Than N In Last N Hours"
            }
            Self::DurationGreaterThanNMinutes => "Duration Greater Than N Minutes",
            Self::ClusterNodeJoin => "Cluster Node Join",
            Self::ClusterNodeRemoved => "Cluster Node Removed",
            Self::ClusterHealthCheckFail => "Cluster Health Check Fail",
            Self::TriggerPaused => "Trigger Paused",
            Self::TriggerResumed => "Trigger Resumed",
            Self::JobPaused => "Job Paused",
            Self::JobResumed => "Job Resumed",
            Self::SchedulerInStandby => "Scheduler In Standby",
            Self::SchedulerStarted => "Scheduler Started",
            Self::SchedulerShutdown => "Scheduler Shutdown",
            Self::CircuitBreakerActivated => "Circuit Breaker Activated",
            Self::CircuitBreakerReset => "Circuit Breaker Reset",
            Self::MaxMemoryUsage => "Max Memory Usage",
            Self::ProcessRestart => "Process Restart",
            Self::Custom1 => "Custom Event 1",
            Self::Custom2 => "Custom Event 2",
            Self::Custom3 => "Custom Event 3",
            Self::Custom4 => "Custom Event 4",
            Self::Custom5 => "Custom Event 5",
        }
    }
}

impl std::fmt::Display for MonitorEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.title())
    }
}

impl TryFrom<i32> for MonitorEvent {
    type Error = UnknownEventId;

    fn try_from(id: i32) -> Result<Self, Self::Error> {
        let event = match id {
            100 => Self::ExecutionVetoed,
            101 => Self::ExecutionRetry,
            102 => Self::ExecutionFail,
            103 => Self::ExecutionSuccess,
            104 => Self::ExecutionStart,
            105 => Self::ExecutionEnd,
            106 => Self::ExecutionProgressChanged,
            107 => Self::ExecutionSuccessWithNoEffectedRows,
            108 => Self::ExecutionLastRetryFail,
            200 => Self::ExecutionFailNTimesInRow,
            201 => Self::ExecutionFailNTimesInHours,
            202 => Self::EffectedRowsGreaterThanN,
            203 => Self::EffectedRowsLessThanN,
            204 => Self::EffectedRowsSumGreaterThanNInHours,
            205 => Self::EffectedRowsSumLessThanNInHours,
            206 => Self::DurationGreaterThanNMinutes,
            300 => Self::ClusterNodeJoin,
            301 => Self::ClusterNodeRemoved,
            302 => Self::ClusterHealthCheckFail,
            303 => Self::TriggerPaused,
            304 => Self::TriggerResumed,
            305 => Self::JobPaused,
            306 => Self::JobResumed,
            307 => Self::SchedulerInStandby,
            308 => Self::SchedulerStarted,
            309 => Self::SchedulerShutdown,
            310 => Self::CircuitBreakerActivated,
            311 => Self::CircuitBreakerReset,
            312 => Self::MaxMemoryUsage,
            313 => Self::ProcessRestart,
            400 => Self::Custom1,
            401 => Self::Custom2,
            402 => Self::Custom3,
            403 => Self::Custom4,
            404 => Self::Custom5,
            _ => return Err(UnknownEventId(id)),
        };
        Ok(event)
    }
}

/// The numeric id does not map to any catalogued monitor event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownEventId(pub i32);

impl std::fmt::Display for UnknownEventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown monitor event id: {}", self.0)
    }
}

impl std::error::Error for UnknownEventId {}
