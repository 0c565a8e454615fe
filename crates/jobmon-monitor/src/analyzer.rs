use anyhow::Result;
use chrono::{Duration, Utc};
use jobmon_common::events::{EventTier, MonitorEvent};
use jobmon_common::types::{EventContext, MonitorRule};
use jobmon_storage::MonitorData;
use std::sync::Arc;

/// Outcome of evaluating one rule against one event.
///
/// Skip-vs-fail is a typed branch: collaborator failures surface as `Err`
/// from [`ThresholdAnalyzer::evaluate`], never as a skip.
#[derive(Debug, PartialEq, Eq)]
pub enum Verdict {
    Fire,
    Skip(SkipReason),
}

#[derive(Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The rule's event argument is missing, malformed, or has the wrong
    /// arity for the event. Configuration error: warn, no alert.
    InvalidArgument(String),
    /// Historical aggregates did not cross the configured threshold.
    ThresholdNotReached,
    /// The event compares effected rows but the current run reported none.
    EffectedRowsUnavailable,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument(reason) => write!(f, "invalid event argument: {reason}"),
            Self::ThresholdNotReached => write!(f, "threshold not reached"),
            Self::EffectedRowsUnavailable => write!(f, "effected rows not reported"),
        }
    }
}

/// Stateful threshold analysis for argument-bearing events.
///
/// The historical aggregates come from the data collaborator; the analyzer
/// itself is pure decision logic over their results. Simple and custom
/// tiers always fire, with one distinguished exception: success with zero
/// effected rows requires the current run to have effected exactly zero.
pub struct ThresholdAnalyzer {
    data: Arc<dyn MonitorData>,
}

impl ThresholdAnalyzer {
    pub fn new(data: Arc<dyn MonitorData>) -> Self {
        Self { data }
    }

    pub async fn evaluate(
        &self,
        event: MonitorEvent,
        rule: &MonitorRule,
        context: &EventContext,
    ) -> Result<Verdict> {
        match event.tier() {
            EventTier::Simple => {
                if event == MonitorEvent::ExecutionSuccessWithNoEffectedRows {
                    Ok(fire_if(context.effected_rows == Some(0)))
                } else {
                    Ok(Verdict::Fire)
                }
            }
            EventTier::System | EventTier::Custom => Ok(Verdict::Fire),
            EventTier::ArgumentBearing => self.evaluate_threshold(event, rule, context).await,
        }
    }

    async fn evaluate_threshold(
        &self,
        event: MonitorEvent,
        rule: &MonitorRule,
        context: &EventContext,
    ) -> Result<Verdict> {
        let args = match parse_arguments(rule.event_argument.as_deref(), arity(event)) {
            Ok(args) => args,
            Err(reason) => return Ok(Verdict::Skip(SkipReason::InvalidArgument(reason))),
        };

        let verdict = match event {
            MonitorEvent::ExecutionFailNTimesInRow => {
                let count = self.data.count_consecutive_failures(&context.job_id).await?;
                fire_if(i64::from(count) >= args[0])
            }
            MonitorEvent::ExecutionFailNTimesInHours => {
                let since = Utc::now() - Duration::hours(args[1]);
                let count = self.data.count_failures_since(&context.job_id, since).await?;
                fire_if(i64::from(count) >= args[0])
            }
            MonitorEvent::EffectedRowsGreaterThanN => match context.effected_rows {
                Some(rows) => fire_if(rows > args[0]),
                None => Verdict::Skip(SkipReason::EffectedRowsUnavailable),
            },
            MonitorEvent::EffectedRowsLessThanN => match context.effected_rows {
                Some(rows) => fire_if(rows < args[0]),
                None => Verdict::Skip(SkipReason::EffectedRowsUnavailable),
            },
            MonitorEvent::EffectedRowsSumGreaterThanNInHours => {
                let since = Utc::now() - Duration::hours(args[1]);
                let sum = self.data.sum_effected_rows(&context.job_id, since).await?;
                fire_if(sum > args[0])
            }
            MonitorEvent::EffectedRowsSumLessThanNInHours => {
                let since = Utc::now() - Duration::hours(args[1]);
                let sum = self.data.sum_effected_rows(&context.job_id, since).await?;
                fire_if(sum < args[0])
            }
            MonitorEvent::DurationGreaterThanNMinutes => {
                // Saturate: an absurdly large minutes argument must not wrap
                fire_if(context.run_duration_ms >= args[0].saturating_mul(60_000))
            }
            _ => {
                // Catalogue and tier bands guarantee this is unreachable
                Verdict::Skip(SkipReason::InvalidArgument(format!(
                    "event {event} is not argument-bearing"
                )))
            }
        };
        Ok(verdict)
    }
}

fn fire_if(condition: bool) -> Verdict {
    if condition {
        Verdict::Fire
    } else {
        Verdict::Skip(SkipReason::ThresholdNotReached)
    }
}

/// Expected argument count per argument-bearing event.
fn arity(event: MonitorEvent) -> usize {
    match event {
        MonitorEvent::ExecutionFailNTimesInHours
        | MonitorEvent::EffectedRowsSumGreaterThanNInHours
        | MonitorEvent::EffectedRowsSumLessThanNInHours => 2,
        _ => 1,
    }
}

/// Parses the rule's event-argument string into exactly `expected` positive
/// integers. Separators are commas and/or whitespace.
fn parse_arguments(argument: Option<&str>, expected: usize) -> Result<Vec<i64>, String> {
    let Some(argument) = argument else {
        return Err("missing".to_string());
    };

    let mut values = Vec::new();
    for part in argument.split([',', ' ']).filter(|p| !p.trim().is_empty()) {
        let value: i64 = part
            .trim()
            .parse()
            .map_err(|_| format!("'{part}' is not a number"))?;
        if value <= 0 {
            return Err(format!("'{part}' must be positive"));
        }
        values.push(value);
    }

    if values.len() != expected {
        return Err(format!(
            "expected {expected} value(s), got {}",
            values.len()
        ));
    }
    Ok(values)
}
