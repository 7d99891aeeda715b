use super::{Notifier, NotifyError};
use crate::alert::Alert;

/// Writes each alert as a structured log event.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, org_id: &str, expr: &str, alerts: Vec<Alert>) -> Result<(), NotifyError> {
        for alert in &alerts {
            let status = if alert.is_resolved() { "resolved" } else { "firing" };
            tracing::info!(
                org_id = %org_id,
                expr = %expr,
                status,
                state = %alert.state,
                labels = %alert.labels,
                value = alert.value,
                receivers = ?alert.receivers,
                "alert"
            );
        }
        Ok(())
    }
}
