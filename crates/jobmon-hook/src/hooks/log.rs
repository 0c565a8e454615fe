use crate::payload::{HookWrapper, MonitorDetails, MonitorSystemDetails};
use crate::Hook;
use anyhow::Result;
use async_trait::async_trait;

/// Writes every firing into the host log. Mostly useful as a smoke-test
/// target and as the fallback hook for new rules.
pub struct LogHook;

#[async_trait]
impl Hook for LogHook {
    fn name(&self) -> &str {
        "log"
    }

    async fn handle(&self, message: &str) -> Result<()> {
        let wrapper = HookWrapper::parse(message)?;
        let details: MonitorDetails = wrapper.decode_details()?;
        tracing::info!(
            rule = %details.rule_title,
            event = %details.event_title,
            job = %details.job.job_key(),
            users = details.users_count,
            "Monitor alert"
        );
        Ok(())
    }

    async fn handle_system(&self, message: &str) -> Result<()> {
        let wrapper = HookWrapper::parse(message)?;
        let details: MonitorSystemDetails = wrapper.decode_details()?;
        tracing::info!(
            rule = %details.rule_title,
            event = %details.event_title,
            message = %details.message,
            "Monitor system alert"
        );
        Ok(())
    }
}
