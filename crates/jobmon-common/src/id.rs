use snowflake::SnowflakeIdBucket;
use std::sync::Mutex;

/// Generator for alert-record ids.
///
/// Ids are snowflake-shaped: time-ordered, so an alert listing sorted by id
/// follows fire order, and stamped with a machine/node identity so pipeline
/// hosts sharing one database never collide. Each owner (the dispatch
/// consumer, the data store's fixture helpers) holds its own generator; the
/// identity comes from the host configuration.
pub struct AlertIdGenerator {
    bucket: Mutex<SnowflakeIdBucket>,
}

impl AlertIdGenerator {
    /// `machine_id` and `node_id` must each be in `0..=31`.
    pub fn new(machine_id: i32, node_id: i32) -> Self {
        Self {
            bucket: Mutex::new(SnowflakeIdBucket::new(machine_id, node_id)),
        }
    }

    pub fn next(&self) -> String {
        self.bucket.lock().unwrap().get_id().to_string()
    }
}

impl Default for AlertIdGenerator {
    fn default() -> Self {
        Self::new(1, 1)
    }
}
