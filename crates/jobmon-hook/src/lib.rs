//! Notification hook framework with pluggable in-process and
//! external-process delivery.
//!
//! A rule names a hook; the [`registry::HookRegistry`] resolves that name to
//! either a registered [`Hook`] object or an external executable, and the
//! [`invoker::HookInvoker`] delivers the two-part JSON payload
//! ([`payload::HookWrapper`]) with per-invocation failure isolation.

pub mod error;
pub mod hooks;
pub mod invoker;
pub mod payload;
pub mod process;
pub mod registry;

#[cfg(test)]
mod tests;

use anyhow::Result;
use async_trait::async_trait;

/// An in-process notification hook.
///
/// Both entry points are mandatory, mirroring the two payload kinds: a hook
/// that cannot handle system events is not a valid hook. The trait itself is
/// the contract the registry validates against; there is no reflective
/// member lookup.
#[async_trait]
pub trait Hook: Send + Sync {
    /// Unique hook name, referenced by rules.
    fn name(&self) -> &str;

    /// Handles a job-execution payload. `message` is the serialized
    /// [`payload::HookWrapper`].
    async fn handle(&self, message: &str) -> Result<()>;

    /// Handles a system-event payload.
    async fn handle_system(&self, message: &str) -> Result<()>;
}
