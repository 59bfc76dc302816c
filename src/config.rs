//! Orchestrator configuration
//!
//! A single JSON file. Every field except `initial_primary`, `regions`
//! and `cutover.records` has a default. `validate()` runs on load; the
//! hooks needed to actually fail over are checked separately by
//! `validate_for_run()` so `status` and `init` work without them.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cutover::{validate_weights, CutoverSettings, DEFAULT_WEIGHT_STEPS};
use crate::notify::{NotificationConfig, DEFAULT_TOPIC};
use crate::policy::PolicyConfig;
use crate::promotion::PromotionSettings;
use crate::region::{RegionId, RegionSpec};
use crate::retry::RetryPolicy;
use crate::state::DEFAULT_STATE_KEY;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Top-level configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Primary written by `init` (required)
    pub initial_primary: RegionId,

    /// Participating regions (at least two)
    pub regions: Vec<RegionSpec>,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Samples kept per region
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    #[serde(default)]
    pub policy: PolicySection,

    #[serde(default)]
    pub promotion: PromotionSection,

    pub cutover: CutoverSection,

    #[serde(default)]
    pub state: StateSection,

    #[serde(default)]
    pub notifications: NotificationSection,

    #[serde(default)]
    pub hooks: HooksSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySection {
    #[serde(default = "default_down_after_consecutive")]
    pub down_after_consecutive: u32,

    #[serde(default = "default_max_replication_lag_secs")]
    pub max_replication_lag_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionSection {
    #[serde(default = "default_promotion_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    #[serde(default = "default_confirm_timeout_secs")]
    pub confirm_timeout_secs: u64,

    #[serde(default = "default_confirm_interval_ms")]
    pub confirm_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CutoverSection {
    /// Routing records to shift (required, non-empty)
    pub records: Vec<String>,

    #[serde(default = "default_weight_steps")]
    pub weight_steps: Vec<u8>,

    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,

    #[serde(default = "default_verify_interval_ms")]
    pub verify_interval_ms: u64,

    #[serde(default = "default_max_step_attempts")]
    pub max_step_attempts: u32,

    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSection {
    /// File backend location
    #[serde(default = "default_state_path")]
    pub path: PathBuf,

    #[serde(default = "default_state_key")]
    pub key: String,

    #[serde(default = "default_state_op_timeout_ms")]
    pub op_timeout_ms: u64,

    /// Pause before retrying a cycle after a transient store error
    #[serde(default = "default_state_backoff_ms")]
    pub backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSection {
    #[serde(default = "default_topic")]
    pub topic: String,

    #[serde(default = "default_notification_max_attempts")]
    pub max_attempts: u32,

    /// Bound on each publish attempt
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,
}

/// Executables implementing the external interfaces. Each is an argv.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HooksSection {
    /// Falls back to a TCP connect probe when absent
    #[serde(default)]
    pub probe_command: Option<Vec<String>>,

    #[serde(default)]
    pub promote_command: Option<Vec<String>>,

    #[serde(default)]
    pub status_command: Option<Vec<String>>,

    #[serde(default)]
    pub set_weight_command: Option<Vec<String>>,

    #[serde(default)]
    pub get_weight_command: Option<Vec<String>>,
}

fn default_poll_interval_ms() -> u64 {
    30_000
}
fn default_history_capacity() -> usize {
    crate::health::DEFAULT_HISTORY_CAPACITY
}
fn default_probe_timeout_ms() -> u64 {
    5_000
}
fn default_down_after_consecutive() -> u32 {
    crate::policy::DEFAULT_DOWN_AFTER_CONSECUTIVE
}
fn default_max_replication_lag_secs() -> u64 {
    crate::policy::DEFAULT_MAX_REPLICATION_LAG.as_secs()
}
fn default_promotion_max_attempts() -> u32 {
    5
}
fn default_initial_backoff_ms() -> u64 {
    500
}
fn default_max_backoff_ms() -> u64 {
    30_000
}
fn default_call_timeout_ms() -> u64 {
    30_000
}
fn default_confirm_timeout_secs() -> u64 {
    600
}
fn default_confirm_interval_ms() -> u64 {
    5_000
}
fn default_weight_steps() -> Vec<u8> {
    DEFAULT_WEIGHT_STEPS.to_vec()
}
fn default_step_timeout_secs() -> u64 {
    60
}
fn default_verify_interval_ms() -> u64 {
    2_000
}
fn default_max_step_attempts() -> u32 {
    3
}
fn default_state_path() -> PathBuf {
    PathBuf::from("./failover-state.json")
}
fn default_state_key() -> String {
    DEFAULT_STATE_KEY.to_string()
}
fn default_state_op_timeout_ms() -> u64 {
    5_000
}
fn default_state_backoff_ms() -> u64 {
    5_000
}
fn default_topic() -> String {
    DEFAULT_TOPIC.to_string()
}
fn default_notification_max_attempts() -> u32 {
    3
}
fn default_publish_timeout_ms() -> u64 {
    10_000
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            down_after_consecutive: default_down_after_consecutive(),
            max_replication_lag_secs: default_max_replication_lag_secs(),
        }
    }
}

impl Default for PromotionSection {
    fn default() -> Self {
        Self {
            max_attempts: default_promotion_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            call_timeout_ms: default_call_timeout_ms(),
            confirm_timeout_secs: default_confirm_timeout_secs(),
            confirm_interval_ms: default_confirm_interval_ms(),
        }
    }
}

impl Default for StateSection {
    fn default() -> Self {
        Self {
            path: default_state_path(),
            key: default_state_key(),
            op_timeout_ms: default_state_op_timeout_ms(),
            backoff_ms: default_state_backoff_ms(),
        }
    }
}

impl Default for NotificationSection {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            max_attempts: default_notification_max_attempts(),
            publish_timeout_ms: default_publish_timeout_ms(),
        }
    }
}

impl OrchestratorConfig {
    /// Load and validate configuration from file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parse and validate a JSON document
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: OrchestratorConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.regions.len() < 2 {
            return Err(ConfigError::invalid("at least two regions are required"));
        }

        let mut seen = HashSet::new();
        for region in &self.regions {
            if region.id.is_empty() {
                return Err(ConfigError::invalid("region id must not be empty"));
            }
            if region.endpoint.address.trim().is_empty() {
                return Err(ConfigError::invalid(format!(
                    "region '{}' has an empty endpoint address",
                    region.id
                )));
            }
            if !seen.insert(&region.id) {
                return Err(ConfigError::invalid(format!(
                    "duplicate region id '{}'",
                    region.id
                )));
            }
        }

        if !seen.contains(&self.initial_primary) {
            return Err(ConfigError::invalid(format!(
                "initial_primary '{}' is not a configured region",
                self.initial_primary
            )));
        }

        if self.poll_interval_ms == 0 {
            return Err(ConfigError::invalid("poll_interval_ms must be > 0"));
        }
        if self.probe_timeout_ms == 0 {
            return Err(ConfigError::invalid("probe_timeout_ms must be > 0"));
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::invalid("history_capacity must be > 0"));
        }

        let k = self.policy.down_after_consecutive;
        if k == 0 || k as usize > self.history_capacity {
            return Err(ConfigError::invalid(format!(
                "policy.down_after_consecutive must be within 1..={}",
                self.history_capacity
            )));
        }

        if self.promotion.max_attempts == 0 {
            return Err(ConfigError::invalid("promotion.max_attempts must be > 0"));
        }
        if self.promotion.initial_backoff_ms > self.promotion.max_backoff_ms {
            return Err(ConfigError::invalid(
                "promotion.initial_backoff_ms must not exceed max_backoff_ms",
            ));
        }
        if self.promotion.call_timeout_ms == 0 || self.promotion.confirm_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "promotion timeouts and intervals must be > 0",
            ));
        }

        if self.cutover.records.is_empty() {
            return Err(ConfigError::invalid("cutover.records must not be empty"));
        }
        if self.cutover.records.iter().any(|r| r.trim().is_empty()) {
            return Err(ConfigError::invalid("cutover.records contains an empty name"));
        }
        validate_weights(&self.cutover.weight_steps)
            .map_err(|e| ConfigError::invalid(format!("cutover.weight_steps: {}", e.message)))?;
        if self.cutover.max_step_attempts == 0 {
            return Err(ConfigError::invalid("cutover.max_step_attempts must be > 0"));
        }
        if self.cutover.verify_interval_ms == 0 || self.cutover.call_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "cutover timeouts and intervals must be > 0",
            ));
        }

        if self.state.key.trim().is_empty() {
            return Err(ConfigError::invalid("state.key must not be empty"));
        }
        if self.state.op_timeout_ms == 0 {
            return Err(ConfigError::invalid("state.op_timeout_ms must be > 0"));
        }

        if self.notifications.topic.trim().is_empty() {
            return Err(ConfigError::invalid("notifications.topic must not be empty"));
        }
        if self.notifications.max_attempts == 0 {
            return Err(ConfigError::invalid("notifications.max_attempts must be > 0"));
        }
        if self.notifications.publish_timeout_ms == 0 {
            return Err(ConfigError::invalid("notifications.publish_timeout_ms must be > 0"));
        }

        for (name, hook) in self.hooks.entries() {
            if matches!(hook, Some(argv) if argv.is_empty()) {
                return Err(ConfigError::invalid(format!("hooks.{} must not be empty", name)));
            }
        }

        Ok(())
    }

    /// Hooks required by `run` and `resume-cutover`.
    pub fn validate_for_run(&self) -> ConfigResult<()> {
        let required = [
            ("promote_command", &self.hooks.promote_command),
            ("status_command", &self.hooks.status_command),
            ("set_weight_command", &self.hooks.set_weight_command),
            ("get_weight_command", &self.hooks.get_weight_command),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, hook)| hook.is_none())
            .map(|(name, _)| *name)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::invalid(format!(
                "missing hooks: {}",
                missing.join(", ")
            )))
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn state_op_timeout(&self) -> Duration {
        Duration::from_millis(self.state.op_timeout_ms)
    }

    pub fn state_backoff(&self) -> Duration {
        Duration::from_millis(self.state.backoff_ms)
    }

    pub fn policy_config(&self) -> PolicyConfig {
        PolicyConfig {
            down_after_consecutive: self.policy.down_after_consecutive,
            max_replication_lag: Duration::from_secs(self.policy.max_replication_lag_secs),
        }
    }

    pub fn promotion_settings(&self) -> PromotionSettings {
        let p = &self.promotion;
        PromotionSettings {
            retry: RetryPolicy::exponential()
                .max_attempts(p.max_attempts)
                .initial_backoff(Duration::from_millis(p.initial_backoff_ms))
                .max_backoff(Duration::from_millis(p.max_backoff_ms)),
            call_timeout: Duration::from_millis(p.call_timeout_ms),
            confirm_timeout: Duration::from_secs(p.confirm_timeout_secs),
            confirm_interval: Duration::from_millis(p.confirm_interval_ms),
            ..PromotionSettings::default()
        }
    }

    pub fn cutover_settings(&self) -> CutoverSettings {
        let c = &self.cutover;
        CutoverSettings {
            records: c.records.clone(),
            weight_steps: c.weight_steps.clone(),
            step_timeout: Duration::from_secs(c.step_timeout_secs),
            verify_interval: Duration::from_millis(c.verify_interval_ms),
            max_step_attempts: c.max_step_attempts,
            call_timeout: Duration::from_millis(c.call_timeout_ms),
            ..CutoverSettings::default()
        }
    }

    pub fn notification_config(&self) -> NotificationConfig {
        NotificationConfig {
            topic: self.notifications.topic.clone(),
            retry: RetryPolicy::exponential().max_attempts(self.notifications.max_attempts),
            publish_timeout: Duration::from_millis(self.notifications.publish_timeout_ms),
        }
    }
}

impl HooksSection {
    fn entries(&self) -> [(&'static str, &Option<Vec<String>>); 5] {
        [
            ("probe_command", &self.probe_command),
            ("promote_command", &self.promote_command),
            ("status_command", &self.status_command),
            ("set_weight_command", &self.set_weight_command),
            ("get_weight_command", &self.get_weight_command),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal() -> serde_json::Value {
        json!({
            "initial_primary": "us-east-1",
            "regions": [
                {"id": "us-east-1", "endpoint": {"address": "db.use1.internal:5432"}},
                {"id": "us-west-2", "endpoint": {"address": "db.usw2.internal:5432", "health_check_id": "hc-2"}}
            ],
            "cutover": {"records": ["db.example.com"]}
        })
    }

    fn parse(value: serde_json::Value) -> ConfigResult<OrchestratorConfig> {
        OrchestratorConfig::from_json(&value.to_string())
    }

    fn invalid_message(value: serde_json::Value) -> String {
        match parse(value) {
            Err(ConfigError::Invalid(msg)) => msg,
            other => panic!("expected Invalid, got {:?}", other),
        }
    }

    #[test]
    fn test_defaults_applied() {
        let config = parse(minimal()).unwrap();

        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.history_capacity, 10);
        assert_eq!(config.probe_timeout(), Duration::from_secs(5));
        assert_eq!(config.policy.down_after_consecutive, 3);
        assert_eq!(config.policy.max_replication_lag_secs, 30);
        assert_eq!(config.promotion.max_attempts, 5);
        assert_eq!(config.promotion.confirm_timeout_secs, 600);
        assert_eq!(config.cutover.weight_steps, vec![50, 100]);
        assert_eq!(config.cutover.max_step_attempts, 3);
        assert_eq!(config.state.path, PathBuf::from("./failover-state.json"));
        assert_eq!(config.state.key, "failover/state");
        assert_eq!(config.notifications.topic, "failover-events");
        assert!(config.hooks.probe_command.is_none());
        assert_eq!(
            config.regions[1].endpoint.health_check_id.as_deref(),
            Some("hc-2")
        );
    }

    #[test]
    fn test_settings_conversion() {
        let mut value = minimal();
        value["promotion"] = json!({"max_attempts": 2, "call_timeout_ms": 100});
        value["cutover"]["weight_steps"] = json!([25, 50, 100]);
        let config = parse(value).unwrap();

        let promotion = config.promotion_settings();
        assert_eq!(promotion.retry.attempts(), 2);
        assert_eq!(promotion.call_timeout, Duration::from_millis(100));

        let cutover = config.cutover_settings();
        assert_eq!(cutover.weight_steps, vec![25, 50, 100]);
        assert_eq!(cutover.records, vec!["db.example.com".to_string()]);

        assert_eq!(config.policy_config().max_replication_lag, Duration::from_secs(30));
        assert_eq!(config.notification_config().retry.attempts(), 3);
        assert_eq!(
            config.notification_config().publish_timeout,
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_single_region_rejected() {
        let mut value = minimal();
        value["regions"] = json!([{"id": "us-east-1", "endpoint": {"address": "a:1"}}]);
        assert!(invalid_message(value).contains("two regions"));
    }

    #[test]
    fn test_duplicate_region_rejected() {
        let mut value = minimal();
        value["regions"][1]["id"] = json!("us-east-1");
        assert!(invalid_message(value).contains("duplicate"));
    }

    #[test]
    fn test_unknown_initial_primary_rejected() {
        let mut value = minimal();
        value["initial_primary"] = json!("eu-west-1");
        assert!(invalid_message(value).contains("initial_primary"));
    }

    #[test]
    fn test_threshold_bounded_by_history() {
        let mut value = minimal();
        value["history_capacity"] = json!(2);
        value["policy"] = json!({"down_after_consecutive": 3});
        assert!(invalid_message(value).contains("down_after_consecutive"));

        let mut value = minimal();
        value["policy"] = json!({"down_after_consecutive": 0});
        assert!(invalid_message(value).contains("down_after_consecutive"));
    }

    #[test]
    fn test_bad_weight_schedule_rejected() {
        let mut value = minimal();
        value["cutover"]["weight_steps"] = json!([50, 40, 100]);
        assert!(invalid_message(value).contains("weight_steps"));

        let mut value = minimal();
        value["cutover"]["weight_steps"] = json!([50, 90]);
        assert!(invalid_message(value).contains("weight_steps"));
    }

    #[test]
    fn test_empty_records_rejected() {
        let mut value = minimal();
        value["cutover"]["records"] = json!([]);
        assert!(invalid_message(value).contains("records"));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            OrchestratorConfig::from_json("{ nope"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_run_requires_hooks() {
        let config = parse(minimal()).unwrap();
        let err = config.validate_for_run().unwrap_err().to_string();
        assert!(err.contains("promote_command"));
        assert!(err.contains("get_weight_command"));

        let mut value = minimal();
        value["hooks"] = json!({
            "promote_command": ["promote"],
            "status_command": ["status"],
            "set_weight_command": ["set-weight"],
            "get_weight_command": ["get-weight"]
        });
        assert!(parse(value).unwrap().validate_for_run().is_ok());
    }

    #[test]
    fn test_empty_hook_argv_rejected() {
        let mut value = minimal();
        value["hooks"] = json!({"probe_command": []});
        assert!(invalid_message(value).contains("probe_command"));
    }

    #[test]
    fn test_load_missing_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = OrchestratorConfig::load(&tmp.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
