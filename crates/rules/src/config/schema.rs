use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RulesConfig {
    #[serde(default = "default_org_id")]
    pub org_id: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_rules_dir")]
    pub rules_dir: String,
    #[serde(default)]
    pub maintenance_file: Option<String>,
    #[serde(default)]
    pub querier: QuerierConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub manager: ManagerConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct QuerierConfig {
    #[serde(default = "default_querier_url")]
    pub url: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl QuerierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for QuerierConfig {
    fn default() -> Self {
        Self {
            url: default_querier_url(),
            timeout_seconds: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct NotifierConfig {
    /// Alerts are only logged when unset.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ManagerConfig {
    #[serde(default = "default_resend_delay")]
    pub resend_delay_seconds: u64,
    #[serde(default)]
    pub eval_delay_seconds: u64,
    #[serde(default = "default_source_url")]
    pub source_url: String,
}

impl ManagerConfig {
    pub fn resend_delay(&self) -> Duration {
        Duration::from_secs(self.resend_delay_seconds)
    }

    pub fn eval_delay(&self) -> Duration {
        Duration::from_secs(self.eval_delay_seconds)
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            resend_delay_seconds: default_resend_delay(),
            eval_delay_seconds: 0,
            source_url: default_source_url(),
        }
    }
}

fn default_org_id() -> String {
    "default".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rules_dir() -> String {
    "/etc/sentinel/rules".to_string()
}

fn default_querier_url() -> String {
    "http://127.0.0.1:9090".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_resend_delay() -> u64 {
    60
}

fn default_source_url() -> String {
    "http://localhost:8080/alerts".to_string()
}
