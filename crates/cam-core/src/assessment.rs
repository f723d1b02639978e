//! Assessment engine contract and its HTTP adapter.
//!
//! Evidence is submitted fire-and-forget; verdicts come back later through
//! an [`AssessmentResultHook`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{CamError, Result};

/// Input shape expected by the assessment engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentRequest {
    pub evidence_id: String,
    pub service_id: String,
    pub tool_id: String,
    pub timestamp: DateTime<Utc>,
    pub raw_evidence: Option<String>,
    /// Structured evidence value
    pub resource: serde_json::Value,
}

/// One verdict for one metric, produced from one evidence item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentResult {
    pub evidence_id: String,
    pub metric_id: String,
    /// May be stale or empty; the aggregator re-derives it from the evidence
    #[serde(default)]
    pub service_id: String,
    pub compliant: bool,
    #[serde(default)]
    pub resource_types: Vec<String>,
}

/// Receiver for asynchronous assessment verdicts.
///
/// Implementations must return quickly and never fail the caller.
pub trait AssessmentResultHook: Send + Sync {
    fn on_result(&self, result: std::result::Result<AssessmentResult, String>);
}

#[async_trait]
pub trait AssessmentEngine: Send + Sync {
    /// Submit evidence for assessment. Only submission errors are reported
    /// here; verdicts arrive through the hook.
    async fn submit(&self, request: AssessmentRequest) -> Result<()>;
}

/// Posts assessment requests to an HTTP endpoint and relays the returned
/// verdicts to the registered hook on a background task.
#[derive(Clone)]
pub struct HttpAssessmentEngine {
    http: reqwest::Client,
    endpoint: String,
    hook: Arc<dyn AssessmentResultHook>,
}

impl HttpAssessmentEngine {
    pub fn new(endpoint: impl Into<String>, hook: Arc<dyn AssessmentResultHook>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("cam-core/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CamError::UpstreamUnavailable(format!("http client: {e}")))?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            hook,
        })
    }
}

#[async_trait]
impl AssessmentEngine for HttpAssessmentEngine {
    async fn submit(&self, request: AssessmentRequest) -> Result<()> {
        let http = self.http.clone();
        let endpoint = self.endpoint.clone();
        let hook = Arc::clone(&self.hook);
        let evidence_id = request.evidence_id.clone();

        debug!(
            evidence_id = %evidence_id,
            endpoint = %endpoint,
            "submitting evidence for assessment"
        );
        tokio::spawn(async move {
            let outcome: std::result::Result<Vec<AssessmentResult>, String> = async {
                let response = http
                    .post(&endpoint)
                    .json(&request)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| e.to_string())?;
                response
                    .json::<Vec<AssessmentResult>>()
                    .await
                    .map_err(|e| e.to_string())
            }
            .await;

            match outcome {
                Ok(results) => {
                    for result in results {
                        hook.on_result(Ok(result));
                    }
                }
                Err(e) => {
                    warn!(evidence_id = %evidence_id, error = %e, "assessment failed");
                    hook.on_result(Err(e));
                }
            }
        });
        Ok(())
    }
}
