//! Debounced compliance aggregation.
//!
//! Every assessment verdict is appended to the ledger right away. The
//! per-control rollup is recomputed at most once per window or once per
//! threshold count of verdicts, whichever comes first, per
//! `(service_id, metric_id)`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cam_state::{Catalog, Compliance, Control, EvaluationLedger, EvaluationResult, EvidenceStore};
use chrono::Utc;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use crate::assessment::{AssessmentResult, AssessmentResultHook};
use crate::debounce::{Arrival, CalcWindows, WindowKey};
use crate::domain::{CamError, Result};
use crate::metrics::METRICS;
use crate::obs;

/// Default debounce window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(2);

/// Default number of verdicts that closes a window early.
pub const DEFAULT_THRESHOLD: u64 = 100;

#[derive(Debug, Clone, Copy)]
pub struct AggregatorConfig {
    pub window: Duration,
    pub threshold: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

pub struct ComplianceAggregator {
    catalog: Arc<dyn Catalog>,
    evidence: Arc<dyn EvidenceStore>,
    ledger: Arc<dyn EvaluationLedger>,
    config: AggregatorConfig,
    windows: CalcWindows,
    recomputes: AtomicU64,
}

impl ComplianceAggregator {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        evidence: Arc<dyn EvidenceStore>,
        ledger: Arc<dyn EvaluationLedger>,
        config: AggregatorConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            catalog,
            evidence,
            ledger,
            windows: CalcWindows::new(config.threshold, config.window),
            config,
            recomputes: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> AggregatorConfig {
        self.config
    }

    /// Number of debounced recompute triggers fired so far.
    pub fn recompute_count(&self) -> u64 {
        self.recomputes.load(Ordering::SeqCst)
    }

    /// Hook to register with an assessment engine.
    pub fn hook(self: &Arc<Self>) -> Arc<dyn AssessmentResultHook> {
        Arc::new(AggregatorHook(Arc::clone(self)))
    }

    /// Record one verdict and feed the debounce window for its metric.
    ///
    /// The service id is taken from the stored evidence, not from the
    /// verdict.
    #[instrument(skip_all, fields(evidence_id = %result.evidence_id, metric_id = %result.metric_id))]
    pub async fn process_result(self: &Arc<Self>, result: AssessmentResult) -> Result<()> {
        let evidence = match self.evidence.get_evidence(&result.evidence_id).await {
            Ok(evidence) => evidence,
            Err(e) => {
                let err = CamError::from(e);
                obs::emit_hook_error(&result.evidence_id, &err);
                return Err(err);
            }
        };

        let record = EvaluationResult {
            id: Uuid::new_v4().to_string(),
            metric_id: result.metric_id.clone(),
            service_id: evidence.target_service.clone(),
            evidence_id: evidence.id,
            status: result.compliant,
            time: Utc::now(),
        };
        if let Err(e) = self.ledger.append_result(record).await {
            let err = CamError::from(e);
            obs::emit_hook_error(&result.evidence_id, &err);
            return Err(err);
        }
        METRICS.inc_results_recorded();

        self.debounce((evidence.target_service, result.metric_id)).await;
        Ok(())
    }

    async fn debounce(self: &Arc<Self>, key: WindowKey) {
        match self.windows.arrive(&key) {
            Arrival::Threshold => {
                debug!(service_id = %key.0, metric_id = %key.1, "threshold reached");
                self.trigger(&key.0, &key.1).await;
            }
            Arrival::First {
                generation,
                deadline,
            } => {
                let this = Arc::clone(self);
                tokio::spawn(async move {
                    tokio::time::sleep_until(deadline).await;
                    if this.windows.expire(&key, generation) {
                        this.trigger(&key.0, &key.1).await;
                    }
                });
            }
            Arrival::Accrued => {}
        }
    }

    async fn trigger(&self, service_id: &str, metric_id: &str) {
        self.recomputes.fetch_add(1, Ordering::SeqCst);
        METRICS.inc_compliance_recomputed();
        if let Err(e) = self
            .recompute_control_compliance(service_id, metric_id)
            .await
        {
            error!(
                service_id = %service_id,
                metric_id = %metric_id,
                error = %e,
                "could not recompute compliance"
            );
        }
    }

    /// Recompute the rollup of the control owning `metric_id`.
    ///
    /// Returns `None` when the service is not scoped to that control.
    pub async fn recompute_control_compliance(
        &self,
        service_id: &str,
        metric_id: &str,
    ) -> Result<Option<Compliance>> {
        let control = self
            .catalog
            .list_controls(None)
            .await?
            .into_iter()
            .find(|c| c.has_metric(metric_id))
            .ok_or_else(|| CamError::ControlNotFound(metric_id.to_string()))?;

        let service = self.catalog.get_cloud_service(service_id).await?;
        if !service.requirement_ids.iter().any(|r| *r == control.id) {
            debug!(
                service_id = %service_id,
                control_id = %control.id,
                "control not in scope for service, skipping"
            );
            return Ok(None);
        }

        self.compute(service_id, &control).await.map(Some)
    }

    /// Recompute each of `control_ids` for `service_id`.
    ///
    /// One control's failure is logged and does not stop the others.
    pub async fn calculate_compliance(
        &self,
        service_id: &str,
        control_ids: &[String],
    ) -> Result<Vec<Compliance>> {
        let controls = self.catalog.list_controls(Some(control_ids)).await?;

        let mut verdicts = Vec::with_capacity(controls.len());
        for control_id in control_ids {
            let Some(control) = controls.iter().find(|c| c.id == *control_id) else {
                warn!(service_id = %service_id, control_id = %control_id, "control not found");
                continue;
            };
            match self.compute(service_id, control).await {
                Ok(compliance) => verdicts.push(compliance),
                Err(e) => error!(
                    service_id = %service_id,
                    control_id = %control_id,
                    error = %e,
                    "could not calculate compliance"
                ),
            }
        }
        Ok(verdicts)
    }

    async fn compute(&self, service_id: &str, control: &Control) -> Result<Compliance> {
        let mut status = true;
        let mut evaluations = Vec::with_capacity(control.metric_ids.len());

        // Metrics without a result are skipped, so a control with no results
        // at all is reported compliant.
        for metric_id in &control.metric_ids {
            match self.ledger.latest_result(service_id, metric_id).await? {
                Some(result) => {
                    status &= result.status;
                    evaluations.push(result);
                }
                None => debug!(metric_id = %metric_id, "no evaluation result yet"),
            }
        }

        let compliance = Compliance {
            id: Uuid::new_v4().to_string(),
            control_id: control.id.clone(),
            service_id: service_id.to_string(),
            status,
            time: Utc::now(),
            evaluations,
        };
        self.ledger.append_compliance(compliance.clone()).await?;

        obs::emit_compliance_calculated(
            service_id,
            &control.id,
            compliance.status,
            compliance.evaluations.len(),
        );
        Ok(compliance)
    }
}

/// Adapts the aggregator to the engine's synchronous result hook.
struct AggregatorHook(Arc<ComplianceAggregator>);

impl AssessmentResultHook for AggregatorHook {
    fn on_result(&self, result: std::result::Result<AssessmentResult, String>) {
        let result = match result {
            Ok(result) => result,
            Err(e) => {
                obs::emit_hook_error("<unknown>", &e);
                return;
            }
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(evidence_id = %result.evidence_id, "no runtime for assessment result, discarded");
            return;
        };
        let aggregator = Arc::clone(&self.0);
        runtime.spawn(async move {
            // failures are already reported by process_result
            let _ = aggregator.process_result(result).await;
        });
    }
}
