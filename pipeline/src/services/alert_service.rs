use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::constants::http::WEBHOOK_TIMEOUT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertSeverity {
    Critical,
    Recovery,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertPayload {
    pub timestamp: DateTime<Utc>,
    pub severity: AlertSeverity,
    pub workflow_id: String,
    pub run_id: String,
    pub logical_date: DateTime<Utc>,
    pub stage_id: Option<String>,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

/// Webhook notifier for run failures and recoveries. Delivery problems are
/// logged and swallowed; an alert never changes a run's outcome.
#[derive(Clone)]
pub struct AlertService {
    webhook_url: String,
    client: Client,
}

impl AlertService {
    pub fn new(webhook_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .context("Failed to create HTTP client for AlertService")?;

        Ok(Self {
            webhook_url,
            client,
        })
    }

    pub fn is_enabled(&self) -> bool {
        !self.webhook_url.is_empty()
    }

    pub async fn alert_run_failed(
        &self,
        workflow_id: &str,
        run_id: &str,
        logical_date: DateTime<Utc>,
        stage_id: &str,
        error: &str,
        error_category: &str,
    ) {
        let payload = AlertPayload {
            timestamp: Utc::now(),
            severity: AlertSeverity::Critical,
            workflow_id: workflow_id.to_string(),
            run_id: run_id.to_string(),
            logical_date,
            stage_id: Some(stage_id.to_string()),
            message: format!("Stage {} failed: {}", stage_id, error),
            details: Some(serde_json::json!({ "error_category": error_category })),
        };
        self.send_webhook(&payload).await;
    }

    pub async fn alert_run_recovered(
        &self,
        workflow_id: &str,
        run_id: &str,
        logical_date: DateTime<Utc>,
        previous_failed_run: &str,
    ) {
        let payload = AlertPayload {
            timestamp: Utc::now(),
            severity: AlertSeverity::Recovery,
            workflow_id: workflow_id.to_string(),
            run_id: run_id.to_string(),
            logical_date,
            stage_id: None,
            message: "Workflow succeeded after a failed run".to_string(),
            details: Some(serde_json::json!({ "previous_failed_run": previous_failed_run })),
        };
        self.send_webhook(&payload).await;
    }

    async fn send_webhook(&self, payload: &AlertPayload) {
        if !self.is_enabled() {
            debug!("No webhook URL configured, skipping alert");
            return;
        }

        match timeout(
            WEBHOOK_TIMEOUT,
            self.client.post(&self.webhook_url).json(payload).send(),
        )
        .await
        {
            Ok(Ok(response)) => {
                if response.status().is_success() {
                    info!(
                        "Alert sent for {} run {}: {:?}",
                        payload.workflow_id, payload.run_id, payload.severity
                    );
                } else {
                    warn!(
                        "Alert webhook returned status {} for run {}",
                        response.status(),
                        payload.run_id
                    );
                }
            }
            Ok(Err(e)) => warn!("Failed to send alert for run {}: {}", payload.run_id, e),
            Err(_) => warn!("Alert webhook timeout for run {}", payload.run_id),
        }
    }
}
