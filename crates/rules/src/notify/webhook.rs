use reqwest::Client;
use serde::Serialize;

use super::{Notifier, NotifyError};
use crate::alert::Alert;

pub struct WebhookNotifier {
    url: String,
    client: Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Payload<'a> {
    org_id: &'a str,
    expr: &'a str,
    alerts: &'a [Alert],
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, org_id: &str, expr: &str, alerts: Vec<Alert>) -> Result<(), NotifyError> {
        let payload = Payload {
            org_id,
            expr,
            alerts: &alerts,
        };

        self.client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError(e.to_string()))?
            .error_for_status()
            .map_err(|e| NotifyError(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertState;
    use crate::labels::Labels;
    use chrono::TimeZone;

    #[test]
    fn payload_shape() {
        let at = chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let alert = Alert {
            state: AlertState::Firing,
            labels: [("alertname", "High CPU")].into_iter().collect(),
            annotations: Labels::new(),
            query_result_labels: Labels::new(),
            generator_url: String::new(),
            receivers: vec!["ops".into()],
            value: 95.0,
            active_at: at,
            fired_at: Some(at),
            resolved_at: None,
            last_sent_at: None,
            valid_until: None,
            missing: false,
            is_recovering: false,
        };
        let alerts = vec![alert];
        let payload = Payload {
            org_id: "default",
            expr: "avg(cpu)",
            alerts: &alerts,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["orgId"], "default");
        assert_eq!(json["alerts"][0]["state"], "firing");
        assert_eq!(json["alerts"][0]["labels"]["alertname"], "High CPU");
    }
}
