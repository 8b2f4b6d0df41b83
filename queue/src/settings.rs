//! Queue names and declaration arguments.

use serde::{Deserialize, Serialize};

/// Arguments for declaring one queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueSpec {
    pub name: String,
    pub durable: bool,
    pub message_ttl_ms: u32,
    pub max_length: u32,
}

/// Names and limits shared by every queue in the pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueSettings {
    #[serde(default = "default_validation_queue")]
    pub validation_queue: String,

    #[serde(default = "default_aggregation_queue")]
    pub aggregation_queue: String,

    #[serde(default = "default_review_queue")]
    pub review_queue: String,

    /// Per-message TTL in milliseconds (24 h).
    #[serde(default = "default_message_ttl_ms")]
    pub message_ttl_ms: u32,

    #[serde(default = "default_max_length")]
    pub max_length: u32,
}

fn default_validation_queue() -> String {
    "votes.validation".to_string()
}

fn default_aggregation_queue() -> String {
    "votes.aggregation".to_string()
}

fn default_review_queue() -> String {
    "votes.review".to_string()
}

fn default_message_ttl_ms() -> u32 {
    86_400_000
}

fn default_max_length() -> u32 {
    1_000_000
}

impl QueueSettings {
    pub fn spec(&self, name: &str) -> QueueSpec {
        QueueSpec {
            name: name.to_string(),
            durable: true,
            message_ttl_ms: self.message_ttl_ms,
            max_length: self.max_length,
        }
    }

    /// All three pipeline queues.
    pub fn all_specs(&self) -> Vec<QueueSpec> {
        [
            &self.validation_queue,
            &self.aggregation_queue,
            &self.review_queue,
        ]
        .into_iter()
        .map(|name| self.spec(name))
        .collect()
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            validation_queue: default_validation_queue(),
            aggregation_queue: default_aggregation_queue(),
            review_queue: default_review_queue(),
            message_ttl_ms: default_message_ttl_ms(),
            max_length: default_max_length(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_pipeline_queues() {
        let settings = QueueSettings::default();
        let names: Vec<_> = settings.all_specs().into_iter().map(|s| s.name).collect();
        assert_eq!(names, ["votes.validation", "votes.aggregation", "votes.review"]);
    }

    #[test]
    fn specs_are_durable_with_limits() {
        let spec = QueueSettings::default().spec("votes.validation");
        assert!(spec.durable);
        assert_eq!(spec.message_ttl_ms, 86_400_000);
        assert_eq!(spec.max_length, 1_000_000);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let settings: QueueSettings = toml::from_str(r#"review_queue = "ops.review""#).unwrap();
        assert_eq!(settings.review_queue, "ops.review");
        assert_eq!(settings.validation_queue, "votes.validation");
    }
}
