//! Evaluation-side facade: evidence lookup, evaluation results and
//! compliance history.

use std::sync::Arc;

use cam_state::{Compliance, EvaluationLedger, EvaluationResult, Evidence, EvidenceStore};
use chrono::{Duration, Utc};

use crate::aggregator::ComplianceAggregator;
use crate::domain::{CamError, Result};

/// Look-back window used when a list call passes `days = 0`.
pub const DEFAULT_LOOKBACK_DAYS: u32 = 30;

pub struct EvaluationService {
    evidence: Arc<dyn EvidenceStore>,
    ledger: Arc<dyn EvaluationLedger>,
    aggregator: Arc<ComplianceAggregator>,
}

fn lookback(days: u32) -> chrono::DateTime<Utc> {
    let days = if days == 0 { DEFAULT_LOOKBACK_DAYS } else { days };
    Utc::now() - Duration::days(i64::from(days))
}

fn require(value: &str, what: &str) -> Result<()> {
    if value.is_empty() {
        return Err(CamError::validation(format!("{what} is missing")));
    }
    Ok(())
}

impl EvaluationService {
    pub fn new(
        evidence: Arc<dyn EvidenceStore>,
        ledger: Arc<dyn EvaluationLedger>,
        aggregator: Arc<ComplianceAggregator>,
    ) -> Self {
        Self {
            evidence,
            ledger,
            aggregator,
        }
    }

    pub async fn get_evidence(&self, evidence_id: &str) -> Result<Evidence> {
        require(evidence_id, "evidenceID")?;
        Ok(self.evidence.get_evidence(evidence_id).await?)
    }

    /// Evidence gathered for a service in the last `days` days, newest first.
    pub async fn list_evidences(&self, service_id: &str, days: u32) -> Result<Vec<Evidence>> {
        require(service_id, "serviceID")?;
        Ok(self
            .evidence
            .list_evidence(service_id, lookback(days))
            .await?)
    }

    pub async fn get_evaluation(
        &self,
        service_id: &str,
        metric_id: &str,
    ) -> Result<EvaluationResult> {
        require(service_id, "serviceID")?;
        require(metric_id, "metricID")?;
        self.ledger
            .latest_result(service_id, metric_id)
            .await?
            .ok_or_else(|| CamError::NotFound {
                kind: "evaluation result",
                id: format!("{service_id}/{metric_id}"),
            })
    }

    pub async fn get_compliance(&self, service_id: &str, control_id: &str) -> Result<Compliance> {
        require(service_id, "serviceID")?;
        require(control_id, "controlID")?;
        self.ledger
            .latest_compliance(service_id, control_id)
            .await?
            .ok_or_else(|| CamError::NotFound {
                kind: "compliance",
                id: format!("{service_id}/{control_id}"),
            })
    }

    /// Verdicts recorded for a service in the last `days` days. An empty
    /// history is not an error.
    pub async fn list_compliance(&self, service_id: &str, days: u32) -> Result<Vec<Compliance>> {
        require(service_id, "serviceID")?;
        Ok(self
            .ledger
            .list_compliance(service_id, lookback(days))
            .await?)
    }

    pub async fn calculate_compliance(
        &self,
        service_id: &str,
        control_ids: &[String],
    ) -> Result<Vec<Compliance>> {
        require(service_id, "serviceID")?;
        if control_ids.is_empty() {
            return Err(CamError::validation("control IDs must be specified"));
        }
        self.aggregator
            .calculate_compliance(service_id, control_ids)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_days_means_default_lookback() {
        let since = lookback(0);
        let expected = Utc::now() - Duration::days(30);
        assert!((since - expected).num_seconds().abs() < 5);
    }

    #[test]
    fn empty_ids_are_rejected() {
        assert!(require("", "serviceID").is_err());
        assert!(require("svc", "serviceID").is_ok());
    }
}
