mod logging;
mod webhook;

pub use logging::LogNotifier;
pub use webhook::WebhookNotifier;

use crate::alert::Alert;

/// Hands a batch of alerts to the delivery subsystem.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;
    async fn notify(&self, org_id: &str, expr: &str, alerts: Vec<Alert>) -> Result<(), NotifyError>;
}

#[derive(Debug)]
pub struct NotifyError(pub String);

impl std::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "notify: {}", self.0)
    }
}

impl std::error::Error for NotifyError {}
