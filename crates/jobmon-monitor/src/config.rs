use serde::{Deserialize, Serialize};

/// Pipeline tuning knobs, deserialized from the host configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Dispatch queue capacity; publishes beyond it are dropped and logged.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Suppression window for debounced system events (seconds).
    #[serde(default = "default_system_lock_secs")]
    pub system_lock_secs: u64,

    /// Hard timeout for external hook processes (seconds).
    #[serde(default = "default_hook_timeout_secs")]
    pub hook_timeout_secs: u64,

    /// Freshness window of the rule snapshot cache (seconds).
    #[serde(default = "default_rule_cache_ttl_secs")]
    pub rule_cache_ttl_secs: u64,

    /// Whether rule resolution goes through the snapshot cache instead of
    /// per-event data-store lookups.
    #[serde(default)]
    pub use_rule_cache: bool,

    /// Machine half of the alert-id identity (0-31). Must differ between
    /// hosts sharing one database.
    #[serde(default = "default_snowflake_id")]
    pub machine_id: i32,

    /// Node half of the alert-id identity (0-31).
    #[serde(default = "default_snowflake_id")]
    pub node_id: i32,

    /// Host configuration snapshot forwarded to hooks in the payload's
    /// dedicated `globalConfig` blob.
    #[serde(default)]
    pub global_config: Option<serde_json::Value>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            system_lock_secs: default_system_lock_secs(),
            hook_timeout_secs: default_hook_timeout_secs(),
            rule_cache_ttl_secs: default_rule_cache_ttl_secs(),
            use_rule_cache: false,
            machine_id: default_snowflake_id(),
            node_id: default_snowflake_id(),
            global_config: None,
        }
    }
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_system_lock_secs() -> u64 {
    300
}

fn default_hook_timeout_secs() -> u64 {
    180
}

fn default_rule_cache_ttl_secs() -> u64 {
    60 * 60
}

fn default_snowflake_id() -> i32 {
    1
}
