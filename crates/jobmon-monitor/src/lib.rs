//! Monitor event pipeline: the component between the scheduler and the
//! notification hooks.
//!
//! Producers publish job-execution and system events onto the
//! [`dispatch::MonitorQueue`]; a single consumer loop resolves the alerting
//! rules that match each event, throttles duplicates through the
//! [`debounce::DebounceStore`], runs threshold analysis for
//! argument-bearing events, invokes the rule's hook, and records the
//! outcome. Failures are isolated per rule: nothing inside a rule dispatch
//! can reach a sibling rule or the consumer loop.

pub mod analyzer;
pub mod config;
pub mod debounce;
pub mod dispatch;
pub mod resolver;


pub use config::MonitorConfig;
pub use dispatch::{
    monitor_channel, MonitorMessage, MonitorPipeline, MonitorQueue, MonitorReceiver, ScanKind,
};
