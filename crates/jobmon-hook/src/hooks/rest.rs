use crate::payload::HookWrapper;
use crate::Hook;
use anyhow::Result;
use async_trait::async_trait;

/// Posts the raw wrapper JSON to a configured HTTP endpoint.
///
/// Transient failures are retried twice with backoff before the invocation
/// is reported as failed.
pub struct RestHook {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl RestHook {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }

    async fn post(&self, message: &str) -> Result<()> {
        // Validate before shipping; a malformed wrapper is a host bug
        HookWrapper::parse(message)?;

        let mut last_err = None;
        for attempt in 0..3u32 {
            match self
                .client
                .post(&self.url)
                .header("Content-Type", "application/json")
                .body(message.to_string())
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => {
                    let status = resp.status();
                    tracing::warn!(
                        hook = %self.name,
                        attempt = attempt + 1,
                        status = %status,
                        "Rest hook returned non-success status, retrying"
                    );
                    last_err = Some(anyhow::anyhow!("HTTP {status}"));
                }
                Err(e) => {
                    tracing::warn!(
                        hook = %self.name,
                        attempt = attempt + 1,
                        error = %e,
                        "Rest hook request failed, retrying"
                    );
                    last_err = Some(e.into());
                }
            }
            if attempt < 2 {
                tokio::time::sleep(std::time::Duration::from_millis(100 * 2u64.pow(attempt)))
                    .await;
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("rest hook failed")))
    }
}

#[async_trait]
impl Hook for RestHook {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, message: &str) -> Result<()> {
        self.post(message).await
    }

    async fn handle_system(&self, message: &str) -> Result<()> {
        self.post(message).await
    }
}
