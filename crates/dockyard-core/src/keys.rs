//! Coordination-store keyspace and artifact-store layout.
//!
//! ```text
//! <id>              simple status ("Deployed", "Failed", ...)
//! <id>:status       phase tag ("Failed:build", ...)
//! <id>:Port         listening port of a dynamic deployment
//! domain:<token>    owning project id, written only by conditional create
//! job:<id>          JSON job record (KV record backend)
//!
//! output/<id>/...   uploaded source tree
//! dist/<id>/...     published static build output
//! ```

/// Default name of the work queue.
pub const WORK_QUEUE: &str = "upload-queue";

pub const DOMAIN_PREFIX: &str = "domain:";
pub const RECORD_PREFIX: &str = "job:";

pub const SOURCE_ROOT: &str = "output";
pub const PUBLISH_ROOT: &str = "dist";

pub fn simple_status_key(id: &str) -> String {
    id.to_string()
}

pub fn status_key(id: &str) -> String {
    format!("{id}:status")
}

pub fn port_key(id: &str) -> String {
    format!("{id}:Port")
}

pub fn domain_key(token: &str) -> String {
    format!("{DOMAIN_PREFIX}{token}")
}

pub fn record_key(id: &str) -> String {
    format!("{RECORD_PREFIX}{id}")
}

pub fn source_prefix(id: &str) -> String {
    format!("{SOURCE_ROOT}/{id}")
}

pub fn publish_prefix(id: &str) -> String {
    format!("{PUBLISH_ROOT}/{id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        assert_eq!(simple_status_key("abc123"), "abc123");
        assert_eq!(status_key("abc123"), "abc123:status");
        assert_eq!(port_key("abc123"), "abc123:Port");
        assert_eq!(domain_key("shop"), "domain:shop");
        assert_eq!(source_prefix("abc123"), "output/abc123");
        assert_eq!(publish_prefix("abc123"), "dist/abc123");
    }
}
