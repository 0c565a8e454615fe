use crate::error::{HookError, Result};
use crate::Hook;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// A resolved notification target: either a registered in-process hook
/// object or an external executable.
#[derive(Clone)]
pub enum HookDescriptor {
    InProcess(Arc<dyn Hook>),
    External { name: String, path: PathBuf },
}

impl HookDescriptor {
    pub fn name(&self) -> &str {
        match self {
            Self::InProcess(hook) => hook.name(),
            Self::External { name, .. } => name,
        }
    }
}

/// Process-wide registry of available hooks.
///
/// Validation happens at registration time, not at fire time: an in-process
/// candidate must implement the full [`Hook`] contract (both entry points),
/// and an external candidate must point at an existing file. Rejected
/// candidates are logged and excluded.
///
/// Hooks can be registered and removed at runtime, which is what allows
/// replacing a hook without restarting the host.
#[derive(Default)]
pub struct HookRegistry {
    hooks: RwLock<HashMap<String, HookDescriptor>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the built-in hooks.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        // Built-ins satisfy the contract by construction
        let _ = registry.register(Arc::new(crate::hooks::log::LogHook));
        registry
    }

    pub fn register(&self, hook: Arc<dyn Hook>) -> Result<()> {
        let name = hook.name().trim().to_string();
        self.insert(name, HookDescriptor::InProcess(hook))
    }

    pub fn register_external(&self, name: &str, path: &Path) -> Result<()> {
        if !path.is_file() {
            tracing::warn!(
                hook = name,
                path = %path.display(),
                "External hook executable missing, excluded"
            );
            return Err(HookError::MissingExecutable(path.to_path_buf()));
        }
        let name = name.trim().to_string();
        let descriptor = HookDescriptor::External {
            name: name.clone(),
            path: path.to_path_buf(),
        };
        self.insert(name, descriptor)
    }

    fn insert(&self, name: String, descriptor: HookDescriptor) -> Result<()> {
        if name.is_empty() {
            tracing::warn!("Hook with blank name rejected");
            return Err(HookError::InvalidName);
        }
        let mut hooks = self.hooks.write().unwrap();
        if hooks.contains_key(&name) {
            tracing::warn!(hook = %name, "Duplicate hook registration rejected");
            return Err(HookError::Duplicate(name));
        }
        tracing::info!(hook = %name, "Hook registered");
        hooks.insert(name, descriptor);
        Ok(())
    }

    /// Removes a hook, e.g. before registering a replacement. Returns
    /// whether it was present.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self.hooks.write().unwrap().remove(name).is_some();
        if removed {
            tracing::info!(hook = name, "Hook unregistered");
        }
        removed
    }

    pub fn resolve(&self, name: &str) -> Option<HookDescriptor> {
        self.hooks.read().unwrap().get(name).cloned()
    }

    pub fn has_hook(&self, name: &str) -> bool {
        self.hooks.read().unwrap().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.hooks.read().unwrap().keys().cloned().collect()
    }
}
