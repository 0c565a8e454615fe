use crate::invoker::HookInvoker;
use crate::payload::{HookWrapper, MonitorDetails, MonitorSystemDetails, PayloadSubject};
use crate::process::{parse_log_tag, ExternalHookRunner, TagLevel};
use crate::registry::HookRegistry;
use crate::Hook;
use async_trait::async_trait;
use chrono::Utc;
use jobmon_common::types::{DistributionGroup, EventContext, MonitorUser, SystemEventContext};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

fn sample_context() -> EventContext {
    EventContext {
        job_id: "j-1".into(),
        job_name: "load".into(),
        job_group: "etl".into(),
        trigger_id: "t-1".into(),
        trigger_name: "nightly".into(),
        trigger_group: "etl".into(),
        fire_instance_id: "fi-42".into(),
        merged_data: HashMap::from([("source".to_string(), "s3".to_string())]),
        fire_time: Utc::now(),
        run_duration_ms: 1200,
        effected_rows: Some(17),
        exception: None,
        recovering: false,
    }
}

fn sample_group() -> DistributionGroup {
    DistributionGroup {
        id: "ops".into(),
        name: "Operations".into(),
        reference: None,
        users: vec![MonitorUser {
            id: "u1".into(),
            name: "oncall".into(),
            emails: vec!["oncall@example.com".into()],
            phone: None,
        }],
    }
}

fn sample_details() -> MonitorDetails {
    MonitorDetails {
        rule_id: "r1".into(),
        rule_title: "fail alert".into(),
        event_id: 102,
        event_title: "Execution Fail".into(),
        event_argument: None,
        group: Some(sample_group()),
        global_config: Some(serde_json::json!({"smtp_host": "mail.internal"})),
        users_count: 1,
        job: sample_context(),
    }
}

// ── payload ──

#[test]
fn wrapper_blanks_recipients_and_config_from_details() {
    let wrapper = HookWrapper::from_details(sample_details()).unwrap();

    assert_eq!(wrapper.version, "1.0");
    assert_eq!(wrapper.subject_kind(), Some(PayloadSubject::MonitorDetails));

    // Recipients and config live only in their dedicated blobs
    assert!(wrapper.groups.contains("oncall@example.com"));
    assert!(wrapper.global_config.contains("smtp_host"));
    assert!(!wrapper.details.contains("oncall@example.com"));
    assert!(!wrapper.details.contains("smtp_host"));

    // Everything else survives the round trip
    let decoded: MonitorDetails = wrapper.decode_details().unwrap();
    assert_eq!(decoded.rule_id, "r1");
    assert_eq!(decoded.users_count, 1);
    assert_eq!(decoded.job.fire_instance_id, "fi-42");
    assert_eq!(decoded.job.merged_data.get("source").unwrap(), "s3");
    assert!(decoded.group.is_none());
    assert!(decoded.global_config.is_none());

    let group = wrapper.decode_groups().unwrap().unwrap();
    assert_eq!(group.users.len(), 1);
}

#[test]
fn wrapper_encode_parse_round_trip() {
    let wrapper = HookWrapper::from_system_details(MonitorSystemDetails {
        rule_id: "r2".into(),
        rule_title: "node watch".into(),
        event_id: 300,
        event_title: "Cluster Node Join".into(),
        group: Some(sample_group()),
        global_config: None,
        users_count: 1,
        message: "node srv-02 joined cluster".into(),
        system: SystemEventContext::new("node {{node}} joined cluster")
            .with_param("node", "srv-02"),
    })
    .unwrap();

    let message = wrapper.encode().unwrap();
    // Wire field names are camelCase
    assert!(message.contains("\"globalConfig\""));

    let parsed = HookWrapper::parse(&message).unwrap();
    assert_eq!(
        parsed.subject_kind(),
        Some(PayloadSubject::MonitorSystemDetails)
    );
    let details: MonitorSystemDetails = parsed.decode_details().unwrap();
    assert_eq!(details.message, "node srv-02 joined cluster");
    assert_eq!(details.system.param("node"), Some("srv-02"));
}

// ── registry ──

struct NamedHook(&'static str);

#[async_trait]
impl Hook for NamedHook {
    fn name(&self) -> &str {
        self.0
    }
    async fn handle(&self, _message: &str) -> anyhow::Result<()> {
        Ok(())
    }
    async fn handle_system(&self, _message: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

#[test]
fn registry_validates_at_registration() {
    let registry = HookRegistry::new();
    assert!(registry.register(Arc::new(NamedHook(""))).is_err());
    assert!(registry.register(Arc::new(NamedHook("teams"))).is_ok());
    assert!(registry.register(Arc::new(NamedHook("teams"))).is_err());
    assert!(registry.has_hook("teams"));
    assert!(registry.resolve("missing").is_none());

    assert!(registry.unregister("teams"));
    assert!(!registry.unregister("teams"));
    assert!(!registry.has_hook("teams"));
}

#[test]
fn registry_rejects_missing_executable() {
    let registry = HookRegistry::new();
    let err = registry
        .register_external("gone", std::path::Path::new("/nonexistent/hook"))
        .unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[cfg(unix)]
#[test]
fn registry_accepts_existing_executable() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_script(dir.path(), "ok.sh", "exit 0");
    let registry = HookRegistry::new();
    assert!(registry.register_external("shell", &path).is_ok());
    assert!(registry.has_hook("shell"));
}

// ── log tag parsing ──

#[test]
fn log_tag_requires_matching_open_and_close() {
    let (level, msg) = parse_log_tag("<hook.log.warning>disk low</hook.log.warning>").unwrap();
    assert_eq!(level, TagLevel::Warning);
    assert_eq!(msg, "disk low");

    // Close tag from another namespace: discarded
    assert!(parse_log_tag("<hook.log.warning>x</hog.log.warning>").is_none());
    // Mismatched level between open and close: discarded
    assert!(parse_log_tag("<hook.log.warning>x</hook.log.error>").is_none());
    // Plain output is never re-logged
    assert!(parse_log_tag("just some stdout noise").is_none());
    assert!(parse_log_tag("<hook.log.shout>x</hook.log.shout>").is_none());
}

#[test]
fn log_tag_is_case_insensitive() {
    let (level, msg) = parse_log_tag("<HOOK.LOG.Error>boom</hook.log.ERROR>").unwrap();
    assert_eq!(level, TagLevel::Error);
    assert_eq!(msg, "boom");

    let (level, _) = parse_log_tag("<hook.log.information>i</hook.log.INFORMATION>").unwrap();
    assert_eq!(level, TagLevel::Information);
}

// ── external runner ──

#[cfg(unix)]
fn write_script(dir: &std::path::Path, name: &str, body: &str) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

#[cfg(unix)]
#[tokio::test]
async fn external_hook_success_with_tagged_output() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_script(
        dir.path(),
        "hook.sh",
        // Checks the CLI convention before succeeding
        "[ \"$1\" = \"--service-mode\" ] || exit 9\n\
         [ \"$2\" = \"--context\" ] || exit 9\n\
         [ -n \"$3\" ] || exit 9\n\
         echo '<hook.log.information>delivered</hook.log.information>'\n\
         echo plain noise\n\
         exit 0",
    );

    let runner = ExternalHookRunner::default();
    let wrapper = HookWrapper::from_details(sample_details()).unwrap();
    runner.run("shell", &path, &wrapper).await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn external_hook_nonzero_exit_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_script(dir.path(), "fail.sh", "exit 3");

    let runner = ExternalHookRunner::default();
    let wrapper = HookWrapper::from_details(sample_details()).unwrap();
    let err = runner.run("shell", &path, &wrapper).await.unwrap_err();
    assert!(matches!(
        err,
        crate::error::HookError::ExitStatus { code: Some(3), .. }
    ));
}

#[cfg(unix)]
#[tokio::test]
async fn external_hook_overrunning_timeout_is_killed() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_script(dir.path(), "slow.sh", "sleep 30");

    let runner = ExternalHookRunner::new(std::time::Duration::from_millis(300));
    let wrapper = HookWrapper::from_details(sample_details()).unwrap();

    let started = std::time::Instant::now();
    let err = runner.run("slow", &path, &wrapper).await.unwrap_err();
    assert!(matches!(err, crate::error::HookError::Timeout { .. }));
    // The runner must not wait for the child's natural exit
    assert!(started.elapsed() < std::time::Duration::from_secs(5));
}

#[cfg(unix)]
#[tokio::test]
async fn external_hook_timeout_kills_forked_workers() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("worker.pid");
    let path = write_script(
        dir.path(),
        "forking.sh",
        &format!(
            "sleep 30 &\n\
             echo $! > {}\n\
             wait",
            pid_file.display()
        ),
    );

    let runner = ExternalHookRunner::new(std::time::Duration::from_millis(300));
    let wrapper = HookWrapper::from_details(sample_details()).unwrap();
    let err = runner.run("forking", &path, &wrapper).await.unwrap_err();
    assert!(matches!(err, crate::error::HookError::Timeout { .. }));

    let worker_pid: i32 = std::fs::read_to_string(&pid_file)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    // The group signal must reach the worker the hook forked, not just the
    // hook process itself (running or zombie counts as still around)
    let running = |pid: i32| match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => !stat.contains(") Z"),
        Err(_) => false,
    };
    let mut gone = false;
    for _ in 0..20 {
        if !running(worker_pid) {
            gone = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    assert!(gone, "forked worker survived the hook timeout");
}

// ── invoker ──

struct RecordingHook {
    calls: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Hook for RecordingHook {
    fn name(&self) -> &str {
        "recorder"
    }
    async fn handle(&self, _message: &str) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push("job".into());
        Ok(())
    }
    async fn handle_system(&self, _message: &str) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push("system".into());
        Ok(())
    }
}

#[tokio::test]
async fn invoker_routes_subject_to_matching_entry_point() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let registry = Arc::new(HookRegistry::new());
    registry
        .register(Arc::new(RecordingHook {
            calls: calls.clone(),
        }))
        .unwrap();
    let invoker = HookInvoker::new(registry, ExternalHookRunner::default());

    let job = HookWrapper::from_details(sample_details()).unwrap();
    invoker.invoke("recorder", &job).await.unwrap();

    let system = HookWrapper::from_system_details(MonitorSystemDetails {
        rule_id: "r2".into(),
        rule_title: "node watch".into(),
        event_id: 300,
        event_title: "Cluster Node Join".into(),
        group: None,
        global_config: None,
        users_count: 0,
        message: "joined".into(),
        system: SystemEventContext::new("joined"),
    })
    .unwrap();
    invoker.invoke("recorder", &system).await.unwrap();

    assert_eq!(*calls.lock().unwrap(), vec!["job", "system"]);
}

#[tokio::test]
async fn invoker_reports_unresolved_hook() {
    let invoker = HookInvoker::new(Arc::new(HookRegistry::new()), ExternalHookRunner::default());
    let wrapper = HookWrapper::from_details(sample_details()).unwrap();
    let err = invoker.invoke("ghost", &wrapper).await.unwrap_err();
    assert!(matches!(err, crate::error::HookError::Unresolved(_)));
}
