use crate::error::{HookError, Result};
use crate::payload::HookWrapper;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Hard ceiling on external hook execution before the process is killed.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);

/// Structured log tag embedded in an external hook's output. Open and close
/// tags must carry the same level or the line is discarded.
static LOG_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^<hook\.log\.(trace|debug|information|warning|error|critical)>(.+)</hook\.log\.(trace|debug|information|warning|error|critical)>$",
    )
    .expect("valid hook log tag pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagLevel {
    Trace,
    Debug,
    Information,
    Warning,
    Error,
    Critical,
}

impl TagLevel {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "information" => Some(Self::Information),
            "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// Parses one output line against the hook log tag convention. Returns the
/// level and inner message only when the open and close tags agree.
pub fn parse_log_tag(line: &str) -> Option<(TagLevel, &str)> {
    let caps = LOG_TAG.captures(line.trim())?;
    let open = caps.get(1)?.as_str();
    let close = caps.get(3)?.as_str();
    if !open.eq_ignore_ascii_case(close) {
        return None;
    }
    let message = caps.get(2)?.as_str();
    Some((TagLevel::parse(open)?, message))
}

fn relog(hook: &str, level: TagLevel, message: &str) {
    match level {
        TagLevel::Trace => tracing::trace!(hook, "{message}"),
        TagLevel::Debug => tracing::debug!(hook, "{message}"),
        TagLevel::Information => tracing::info!(hook, "{message}"),
        TagLevel::Warning => tracing::warn!(hook, "{message}"),
        TagLevel::Error => tracing::error!(hook, "{message}"),
        TagLevel::Critical => tracing::error!(hook, critical = true, "{message}"),
    }
}

/// Runs external hook executables in a sandboxed child process with a hard
/// timeout and structured output parsing.
#[derive(Debug, Clone)]
pub struct ExternalHookRunner {
    timeout: Duration,
}

impl Default for ExternalHookRunner {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ExternalHookRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Launches `<exe> --service-mode --context <base64-wrapper>`, waits up
    /// to the configured timeout, kills the process tree on overrun, and
    /// re-emits tagged output lines into the host log.
    pub async fn run(&self, name: &str, path: &Path, wrapper: &HookWrapper) -> Result<()> {
        let context = BASE64.encode(wrapper.encode()?);
        let (program, mut args) = launch_convention(path);
        args.extend([
            "--service-mode".to_string(),
            "--context".to_string(),
            context,
        ]);

        tracing::debug!(hook = name, program = %program, "Launching external hook");

        let mut command = Command::new(&program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the child (e.g. on timeout) must not leak the process
            .kill_on_drop(true);
        // Own process group, so a timeout can take out forked workers too
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn().map_err(|source| HookError::Launch {
            path: path.to_path_buf(),
            source,
        })?;
        #[cfg(unix)]
        let pid = child.id();

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| HookError::Launch {
                path: path.to_path_buf(),
                source,
            })?,
            Err(_) => {
                tracing::error!(
                    hook = name,
                    timeout_secs = self.timeout.as_secs(),
                    "External hook timed out, killing process group"
                );
                // kill_on_drop only covers the direct child; signal the whole
                // group before the dropped future delivers it
                #[cfg(unix)]
                if let Some(pid) = pid {
                    unsafe {
                        libc::killpg(pid as i32, libc::SIGKILL);
                    }
                }
                return Err(HookError::Timeout {
                    hook: name.to_string(),
                    timeout_secs: self.timeout.as_secs(),
                });
            }
        };

        // stdout and stderr are treated as one merged mini-log
        for line in String::from_utf8_lossy(&output.stdout)
            .lines()
            .chain(String::from_utf8_lossy(&output.stderr).lines())
        {
            if let Some((level, message)) = parse_log_tag(line) {
                relog(name, level, message);
            }
        }

        if !output.status.success() {
            return Err(HookError::ExitStatus {
                hook: name.to_string(),
                code: output.status.code(),
            });
        }
        Ok(())
    }
}

/// Maps the configured target to the platform launch convention. Managed
/// assemblies (`.dll`) cannot be executed directly and are started through
/// the `dotnet` host instead.
fn launch_convention(path: &Path) -> (String, Vec<String>) {
    let is_managed = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("dll"))
        .unwrap_or(false);
    if is_managed {
        (
            "dotnet".to_string(),
            vec![path.to_string_lossy().into_owned()],
        )
    } else {
        (path.to_string_lossy().into_owned(), Vec::new())
    }
}
