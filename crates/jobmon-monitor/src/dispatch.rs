use crate::analyzer::{SkipReason, ThresholdAnalyzer, Verdict};
use crate::config::MonitorConfig;
use crate::debounce::{debounce_key, DebounceStore};
use crate::resolver::{RuleCache, RuleResolver, RuleSource};
use chrono::Local;
use jobmon_common::events::MonitorEvent;
use jobmon_common::id::AlertIdGenerator;
use jobmon_common::types::{
    AlertRecord, DistributionGroup, EventContext, MonitorRule, SystemEventContext,
};
use jobmon_hook::error::HookError;
use jobmon_hook::invoker::HookInvoker;
use jobmon_hook::payload::{HookWrapper, MonitorDetails, MonitorSystemDetails};
use jobmon_hook::process::ExternalHookRunner;
use jobmon_hook::registry::HookRegistry;
use jobmon_storage::MonitorData;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// A unit of work on the dispatch queue.
///
/// `Scan*` messages go through rule resolution; `Execute*` messages carry a
/// pre-resolved rule and skip resolution entirely. `Lock` seeds the debounce
/// store ahead of events the producer knows are coming.
#[derive(Debug)]
pub enum MonitorMessage {
    ScanJob {
        event: MonitorEvent,
        context: EventContext,
    },
    ScanSystem {
        event: MonitorEvent,
        context: SystemEventContext,
    },
    ExecuteJob {
        rule: MonitorRule,
        event: MonitorEvent,
        context: EventContext,
    },
    ExecuteSystem {
        rule: MonitorRule,
        event: MonitorEvent,
        context: SystemEventContext,
    },
    Lock {
        key: String,
        ttl: Option<Duration>,
    },
}

/// Message discriminant, used in queue logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKind {
    ScanJob,
    ScanSystem,
    ExecuteJob,
    ExecuteSystem,
    Lock,
}

impl ScanKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ScanJob => "scan-job",
            Self::ScanSystem => "scan-system",
            Self::ExecuteJob => "execute-job",
            Self::ExecuteSystem => "execute-system",
            Self::Lock => "lock",
        }
    }
}

impl MonitorMessage {
    pub fn kind(&self) -> ScanKind {
        match self {
            Self::ScanJob { .. } => ScanKind::ScanJob,
            Self::ScanSystem { .. } => ScanKind::ScanSystem,
            Self::ExecuteJob { .. } => ScanKind::ExecuteJob,
            Self::ExecuteSystem { .. } => ScanKind::ExecuteSystem,
            Self::Lock { .. } => ScanKind::Lock,
        }
    }
}

/// Producer half of the dispatch queue. Cheap to clone; publishing never
/// blocks the scheduler thread, a full queue drops the message with an error
/// log instead.
#[derive(Clone)]
pub struct MonitorQueue {
    tx: mpsc::Sender<MonitorMessage>,
    shutdown: watch::Sender<bool>,
}

impl MonitorQueue {
    pub fn publish(&self, message: MonitorMessage) {
        let kind = message.kind();
        // After shutdown the consumer only drains what was already queued
        if *self.shutdown.borrow() {
            tracing::warn!(
                kind = kind.as_str(),
                "Monitor queue is shut down, message dropped"
            );
            return;
        }
        if let Err(err) = self.tx.try_send(message) {
            tracing::error!(
                kind = kind.as_str(),
                "Monitor queue rejected message, dropped: {err}"
            );
        }
    }

    /// Publishes a job-execution event, attaching the run exception to the
    /// context when the producer supplies one.
    pub fn publish_job_event(
        &self,
        event: MonitorEvent,
        mut context: EventContext,
        exception: Option<String>,
    ) {
        if exception.is_some() {
            context.exception = exception;
        }
        self.publish(MonitorMessage::ScanJob { event, context });
    }

    pub fn publish_system_event(&self, event: MonitorEvent, context: SystemEventContext) {
        self.publish(MonitorMessage::ScanSystem { event, context });
    }

    /// Signals the consumer to drain what is already queued and stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// Consumer half of the dispatch queue, owned by exactly one
/// [`MonitorPipeline::run`] call.
pub struct MonitorReceiver {
    rx: mpsc::Receiver<MonitorMessage>,
    shutdown: watch::Receiver<bool>,
}

/// Creates the dispatch queue with the given capacity.
pub fn monitor_channel(capacity: usize) -> (MonitorQueue, MonitorReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    (
        MonitorQueue {
            tx,
            shutdown: shutdown_tx,
        },
        MonitorReceiver {
            rx,
            shutdown: shutdown_rx,
        },
    )
}

/// The single consumer of the dispatch queue.
///
/// Messages are processed one at a time; within one message the matched
/// rules fan out onto concurrent tasks, and every per-rule failure is
/// contained to that rule.
pub struct MonitorPipeline {
    data: Arc<dyn MonitorData>,
    rules: Arc<dyn RuleSource>,
    analyzer: ThresholdAnalyzer,
    invoker: Arc<HookInvoker>,
    debounce: DebounceStore,
    ids: AlertIdGenerator,
    global_config: Option<Value>,
    system_lock_window: Duration,
}

impl MonitorPipeline {
    pub fn new(
        data: Arc<dyn MonitorData>,
        rules: Arc<dyn RuleSource>,
        invoker: Arc<HookInvoker>,
        config: &MonitorConfig,
    ) -> Self {
        Self {
            analyzer: ThresholdAnalyzer::new(Arc::clone(&data)),
            data,
            rules,
            invoker,
            debounce: DebounceStore::new(),
            ids: AlertIdGenerator::new(config.machine_id, config.node_id),
            global_config: config.global_config.clone(),
            system_lock_window: Duration::from_secs(config.system_lock_secs),
        }
    }

    /// Assembles the whole pipeline from one configuration: the dispatch
    /// queue at the configured capacity, the external runner with the
    /// configured timeout, and either the snapshot cache or per-event
    /// resolution as the rule source.
    pub fn from_config(
        data: Arc<dyn MonitorData>,
        registry: Arc<HookRegistry>,
        config: &MonitorConfig,
    ) -> (MonitorQueue, MonitorReceiver, Arc<Self>) {
        let runner = ExternalHookRunner::new(Duration::from_secs(config.hook_timeout_secs));
        let invoker = Arc::new(HookInvoker::new(registry, runner));
        let rules: Arc<dyn RuleSource> = if config.use_rule_cache {
            Arc::new(RuleCache::new(
                Arc::clone(&data),
                Duration::from_secs(config.rule_cache_ttl_secs),
            ))
        } else {
            Arc::new(RuleResolver::new(Arc::clone(&data)))
        };
        let (queue, receiver) = monitor_channel(config.queue_capacity);
        let pipeline = Arc::new(Self::new(data, rules, invoker, config));
        (queue, receiver, pipeline)
    }

    pub fn debounce(&self) -> &DebounceStore {
        &self.debounce
    }

    /// Consumes the queue until shutdown is signalled or every producer is
    /// gone. On shutdown, messages already queued are drained before the
    /// loop exits.
    pub async fn run(self: Arc<Self>, mut receiver: MonitorReceiver) {
        tracing::info!("Monitor pipeline started");
        loop {
            tokio::select! {
                message = receiver.rx.recv() => match message {
                    Some(message) => self.handle(message).await,
                    None => break,
                },
                _ = receiver.shutdown.changed() => {
                    if *receiver.shutdown.borrow() {
                        while let Ok(message) = receiver.rx.try_recv() {
                            self.handle(message).await;
                        }
                        break;
                    }
                }
            }
        }
        tracing::info!("Monitor pipeline stopped");
    }

    async fn handle(self: &Arc<Self>, message: MonitorMessage) {
        match message {
            MonitorMessage::ScanJob { event, context } => self.scan_job(event, context).await,
            MonitorMessage::ScanSystem { event, context } => {
                self.scan_system(event, context).await
            }
            MonitorMessage::ExecuteJob {
                rule,
                event,
                context,
            } => self.fan_out_job(vec![rule], event, context).await,
            MonitorMessage::ExecuteSystem {
                rule,
                event,
                context,
            } => self.fan_out_system(vec![rule], event, context).await,
            MonitorMessage::Lock { key, ttl } => {
                let acquired = match ttl {
                    Some(ttl) => self.debounce.try_lock_for(&key, ttl),
                    None => self.debounce.try_lock(&key),
                };
                tracing::debug!(key = %key, acquired, "Debounce lock requested");
            }
        }
    }

    async fn scan_job(self: &Arc<Self>, event: MonitorEvent, context: EventContext) {
        let key = debounce_key(&context.job_key(), event.id());
        if self.debounce.locked(&key) {
            tracing::debug!(key = %key, "Event suppressed by debounce");
            return;
        }

        let scope = (context.job_group.as_str(), context.job_name.as_str());
        let rules = match self.rules.resolve(event.id(), Some(scope)).await {
            Ok(rules) => rules,
            Err(err) => {
                tracing::error!(
                    event = %event,
                    job = %context.job_key(),
                    "Rule resolution failed, event abandoned: {err:#}"
                );
                return;
            }
        };
        if rules.is_empty() {
            return;
        }
        self.fan_out_job(rules, event, context).await;
    }

    async fn scan_system(self: &Arc<Self>, event: MonitorEvent, context: SystemEventContext) {
        let subject = system_subject(&context);

        // A recovery event unblocks its degraded counterpart immediately
        if let Some(counterpart) = release_counterpart(event) {
            self.debounce
                .release(&debounce_key(&subject, counterpart.id()));
        }

        let key = debounce_key(&subject, event.id());
        if holds_lock_window(event) {
            if !self.debounce.try_lock_for(&key, self.system_lock_window) {
                tracing::debug!(key = %key, "Event suppressed by debounce");
                return;
            }
        } else if self.debounce.locked(&key) {
            tracing::debug!(key = %key, "Event suppressed by debounce");
            return;
        }

        let rules = match self.rules.resolve(event.id(), None).await {
            Ok(rules) => rules,
            Err(err) => {
                tracing::error!(
                    event = %event,
                    subject = %subject,
                    "Rule resolution failed, event abandoned: {err:#}"
                );
                return;
            }
        };
        if rules.is_empty() {
            return;
        }
        self.fan_out_system(rules, event, context).await;
    }

    async fn fan_out_job(
        self: &Arc<Self>,
        rules: Vec<MonitorRule>,
        event: MonitorEvent,
        context: EventContext,
    ) {
        let mut tasks = Vec::with_capacity(rules.len());
        for rule in rules {
            let pipeline = Arc::clone(self);
            let context = context.clone();
            tasks.push(tokio::spawn(async move {
                pipeline.dispatch_job_rule(rule, event, context).await;
            }));
        }
        for task in tasks {
            if task.await.is_err() {
                tracing::error!(event = %event, "Rule dispatch task panicked");
            }
        }
    }

    async fn fan_out_system(
        self: &Arc<Self>,
        rules: Vec<MonitorRule>,
        event: MonitorEvent,
        context: SystemEventContext,
    ) {
        let mut tasks = Vec::with_capacity(rules.len());
        for rule in rules {
            let pipeline = Arc::clone(self);
            let context = context.clone();
            tasks.push(tokio::spawn(async move {
                pipeline.dispatch_system_rule(rule, event, context).await;
            }));
        }
        for task in tasks {
            if task.await.is_err() {
                tracing::error!(event = %event, "Rule dispatch task panicked");
            }
        }
    }

    async fn dispatch_job_rule(&self, rule: MonitorRule, event: MonitorEvent, context: EventContext) {
        match self
            .data
            .is_muted(&context.job_id, event.id(), &rule.id)
            .await
        {
            Ok(true) => {
                tracing::debug!(rule = %rule.id, job = %context.job_key(), "Rule muted, dispatch skipped");
                return;
            }
            Ok(false) => {}
            Err(err) => {
                tracing::error!(rule = %rule.id, "Mute check failed, rule abandoned: {err:#}");
                return;
            }
        }

        match self.analyzer.evaluate(event, &rule, &context).await {
            Ok(Verdict::Fire) => {}
            Ok(Verdict::Skip(SkipReason::InvalidArgument(reason))) => {
                tracing::warn!(rule = %rule.id, event = %event, "Rule argument rejected: {reason}");
                return;
            }
            Ok(Verdict::Skip(reason)) => {
                tracing::debug!(rule = %rule.id, event = %event, "Rule skipped: {reason}");
                return;
            }
            Err(err) => {
                tracing::error!(rule = %rule.id, "Threshold analysis failed, rule abandoned: {err:#}");
                return;
            }
        }

        let group = match self.data.get_distribution_group(&rule.group_id).await {
            Ok(Some(group)) => group,
            Ok(None) => {
                tracing::warn!(rule = %rule.id, group = %rule.group_id, "Distribution group missing, dispatch skipped");
                return;
            }
            Err(err) => {
                tracing::error!(rule = %rule.id, "Group lookup failed, rule abandoned: {err:#}");
                return;
            }
        };

        let fire_instance_id = context.fire_instance_id.clone();
        let details = MonitorDetails {
            rule_id: rule.id.clone(),
            rule_title: rule.title.clone(),
            event_id: event.id(),
            event_title: event.title().to_string(),
            event_argument: rule.event_argument.clone(),
            group: Some(group.clone()),
            global_config: self.global_config.clone(),
            users_count: group.users_count(),
            job: context,
        };
        let wrapper = match HookWrapper::from_details(details) {
            Ok(wrapper) => wrapper,
            Err(err) => {
                tracing::error!(rule = %rule.id, "Payload assembly failed, rule abandoned: {err}");
                return;
            }
        };

        let outcome = self.invoker.invoke(&rule.hook, &wrapper).await;
        if let Err(HookError::Unresolved(name)) = &outcome {
            // Configuration error, not a delivery failure: no alert record
            tracing::warn!(rule = %rule.id, hook = %name, "Hook not registered, dispatch skipped");
            return;
        }
        self.finish(&rule, event, &group, &wrapper, Some(fire_instance_id), outcome)
            .await;
    }

    async fn dispatch_system_rule(
        &self,
        rule: MonitorRule,
        event: MonitorEvent,
        context: SystemEventContext,
    ) {
        let group = match self.data.get_distribution_group(&rule.group_id).await {
            Ok(Some(group)) => group,
            Ok(None) => {
                tracing::warn!(rule = %rule.id, group = %rule.group_id, "Distribution group missing, dispatch skipped");
                return;
            }
            Err(err) => {
                tracing::error!(rule = %rule.id, "Group lookup failed, rule abandoned: {err:#}");
                return;
            }
        };

        let details = MonitorSystemDetails {
            rule_id: rule.id.clone(),
            rule_title: rule.title.clone(),
            event_id: event.id(),
            event_title: event.title().to_string(),
            group: Some(group.clone()),
            global_config: self.global_config.clone(),
            users_count: group.users_count(),
            message: context.render(),
            system: context,
        };
        let wrapper = match HookWrapper::from_system_details(details) {
            Ok(wrapper) => wrapper,
            Err(err) => {
                tracing::error!(rule = %rule.id, "Payload assembly failed, rule abandoned: {err}");
                return;
            }
        };

        let outcome = self.invoker.invoke(&rule.hook, &wrapper).await;
        if let Err(HookError::Unresolved(name)) = &outcome {
            tracing::warn!(rule = %rule.id, hook = %name, "Hook not registered, dispatch skipped");
            return;
        }
        self.finish(&rule, event, &group, &wrapper, None, outcome).await;
    }

    /// Records the dispatch outcome: one append-only alert record per
    /// attempt, and a counter bump only on success. Persistence failures are
    /// logged, never propagated.
    async fn finish(
        &self,
        rule: &MonitorRule,
        event: MonitorEvent,
        group: &DistributionGroup,
        wrapper: &HookWrapper,
        fire_instance_id: Option<String>,
        outcome: Result<(), HookError>,
    ) {
        let exception = outcome.as_ref().err().map(|err| err.to_string());
        let has_error = exception.is_some();
        match &outcome {
            Ok(()) => {
                tracing::info!(rule = %rule.id, event = %event, hook = %rule.hook, "Alert dispatched")
            }
            Err(err) => {
                tracing::error!(rule = %rule.id, event = %event, hook = %rule.hook, "Hook invocation failed: {err}")
            }
        }

        let alert = AlertRecord {
            id: self.ids.next(),
            rule_id: rule.id.clone(),
            rule_title: rule.title.clone(),
            event_id: event.id(),
            event_title: event.title().to_string(),
            event_argument: rule.event_argument.clone(),
            group_id: group.id.clone(),
            group_name: group.name.clone(),
            hook: rule.hook.clone(),
            fire_time: Local::now(),
            has_error,
            exception,
            payload: wrapper.details.clone(),
            users_count: group.users_count(),
            fire_instance_id,
        };
        if let Err(err) = self.data.save_alert(&alert).await {
            tracing::error!(rule = %rule.id, "Alert record not persisted: {err:#}");
        }
        if !has_error {
            if let Err(err) = self.data.increment_counter(&rule.id).await {
                tracing::error!(rule = %rule.id, "Counter increment failed: {err:#}");
            }
        }
    }
}

/// Debounce subject for a system event, taken from its parameters: the job
/// identity when present, then the trigger identity, then the node name.
fn system_subject(context: &SystemEventContext) -> String {
    if let (Some(group), Some(name)) = (context.param("job-group"), context.param("job-name")) {
        return format!("{group}.{name}");
    }
    if let (Some(group), Some(name)) =
        (context.param("trigger-group"), context.param("trigger-name"))
    {
        return format!("{group}.{name}");
    }
    match context.param("node") {
        Some(node) => node.to_string(),
        None => "system".to_string(),
    }
}

/// The degraded-state event a recovery event releases.
fn release_counterpart(event: MonitorEvent) -> Option<MonitorEvent> {
    match event {
        MonitorEvent::TriggerResumed => Some(MonitorEvent::TriggerPaused),
        MonitorEvent::JobResumed => Some(MonitorEvent::JobPaused),
        MonitorEvent::CircuitBreakerReset => Some(MonitorEvent::CircuitBreakerActivated),
        MonitorEvent::ClusterNodeRemoved => Some(MonitorEvent::ClusterNodeJoin),
        _ => None,
    }
}

/// System events that can repeat while the condition persists take a
/// time-bounded lock; one-shot lifecycle events fire every time.
fn holds_lock_window(event: MonitorEvent) -> bool {
    matches!(
        event,
        MonitorEvent::ClusterNodeJoin
            | MonitorEvent::ClusterHealthCheckFail
            | MonitorEvent::TriggerPaused
            | MonitorEvent::JobPaused
            | MonitorEvent::SchedulerInStandby
            | MonitorEvent::CircuitBreakerActivated
            | MonitorEvent::MaxMemoryUsage
    )
}
