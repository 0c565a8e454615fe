use crate::error::{HookError, Result};
use crate::payload::{HookWrapper, PayloadSubject};
use crate::process::ExternalHookRunner;
use crate::registry::{HookDescriptor, HookRegistry};
use std::sync::Arc;

/// Resolves a rule's hook name and delivers the payload through the
/// matching execution mode.
pub struct HookInvoker {
    registry: Arc<HookRegistry>,
    runner: ExternalHookRunner,
}

impl HookInvoker {
    pub fn new(registry: Arc<HookRegistry>, runner: ExternalHookRunner) -> Self {
        Self { registry, runner }
    }

    pub fn registry(&self) -> &HookRegistry {
        &self.registry
    }

    /// Invokes the named hook with the wrapped payload.
    ///
    /// In-process hooks run on a background task which is awaited to
    /// completion (no extra timeout); external hooks run under the runner's
    /// hard timeout. Failures are returned to the caller, which records
    /// them per rule and never lets them spread to sibling dispatches.
    pub async fn invoke(&self, name: &str, wrapper: &HookWrapper) -> Result<()> {
        let descriptor = self
            .registry
            .resolve(name)
            .ok_or_else(|| HookError::Unresolved(name.to_string()))?;

        match descriptor {
            HookDescriptor::InProcess(hook) => {
                let message = wrapper.encode()?;
                let subject = wrapper.subject_kind();
                let hook_name = hook.name().to_string();
                let task = tokio::spawn(async move {
                    match subject {
                        Some(PayloadSubject::MonitorSystemDetails) => {
                            hook.handle_system(&message).await
                        }
                        // Unknown subjects were already rejected upstream
                        _ => hook.handle(&message).await,
                    }
                });
                match task.await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(source)) => Err(HookError::Failed {
                        hook: hook_name,
                        source,
                    }),
                    Err(_) => Err(HookError::Panicked(hook_name)),
                }
            }
            HookDescriptor::External { name, path } => {
                self.runner.run(&name, &path, wrapper).await
            }
        }
    }
}
