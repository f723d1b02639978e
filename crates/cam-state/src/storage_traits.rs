//! Storage trait definitions for compliance monitoring
//!
//! These traits define the persistence seams the orchestration core relies on:
//! - `ModuleRegistry`: collection modules and their per-service configuration
//! - `Catalog`: metrics, controls, cloud services and metric configuration
//! - `EvidenceStore`: evidence received from collection modules
//! - `EvaluationLedger`: append-only evaluation results and compliance verdicts
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Collection modules
// ---------------------------------------------------------------------------

/// An external service that gathers evidence for a fixed set of metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionModule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Metrics this module can produce evidence for
    pub metric_ids: Vec<String>,
    /// `host:port` the module listens on
    pub address: String,
    /// Type URL of the configuration message the module expects
    #[serde(default)]
    pub config_type_url: String,
}

impl CollectionModule {
    /// True when the module declares at least one of `metric_ids`.
    pub fn serves_any(&self, metric_ids: &[String]) -> bool {
        self.metric_ids.iter().any(|m| metric_ids.contains(m))
    }
}

/// Opaque configuration for one collection module concerning one service.
///
/// Keyed by `(service_id, type_url)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfiguration {
    pub service_id: String,
    pub type_url: String,
    #[serde(default)]
    pub raw_configuration: Option<serde_json::Value>,
}

impl ServiceConfiguration {
    /// An empty configuration, used when nothing was stored for a service.
    pub fn empty(service_id: impl Into<String>, type_url: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            type_url: type_url.into(),
            raw_configuration: None,
        }
    }
}

/// Collection module catalog plus per-service module configuration.
#[async_trait]
pub trait ModuleRegistry: Send + Sync {
    /// Register a module. Fails with `AlreadyExists` on a duplicate id.
    async fn add_module(&self, module: CollectionModule) -> StorageResult<()>;

    /// All registered modules, ordered by id.
    async fn list_modules(&self) -> StorageResult<Vec<CollectionModule>>;

    /// Remove a module. Fails with `NotFound` if it was never registered.
    async fn remove_module(&self, module_id: &str) -> StorageResult<()>;

    /// Insert or replace the configuration for `(service_id, type_url)`.
    async fn save_service_configuration(&self, config: ServiceConfiguration)
        -> StorageResult<()>;

    async fn get_service_configuration(
        &self,
        service_id: &str,
        type_url: &str,
    ) -> StorageResult<Option<ServiceConfiguration>>;

    async fn list_service_configurations(
        &self,
        service_id: &str,
    ) -> StorageResult<Vec<ServiceConfiguration>>;
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// The smallest unit of compliance measurement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metric {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Scale/type metadata (e.g. `"ordinal"`), opaque to the core
    #[serde(default)]
    pub scale: String,
    /// Collection interval in seconds. Zero or negative means "use default".
    #[serde(default)]
    pub interval_secs: i64,
}

/// A group of metrics representing one compliance rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Control {
    pub id: String,
    pub name: String,
    /// Ordered metric references
    #[serde(default)]
    pub metric_ids: Vec<String>,
}

impl Control {
    pub fn has_metric(&self, metric_id: &str) -> bool {
        self.metric_ids.iter().any(|m| m == metric_id)
    }
}

/// A monitored target service and the controls currently assigned to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudService {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Control ids in scope for this service
    #[serde(default)]
    pub requirement_ids: Vec<String>,
}

/// Per-service target for one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricConfiguration {
    pub service_id: String,
    pub metric_id: String,
    pub operator: String,
    pub target_value: serde_json::Value,
    #[serde(default)]
    pub is_default: bool,
    pub updated_at: DateTime<Utc>,
}

/// Read/write access to the control catalog and cloud services.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn upsert_metric(&self, metric: Metric) -> StorageResult<()>;

    /// Fails with `NotFound` for unknown ids.
    async fn get_metric(&self, metric_id: &str) -> StorageResult<Metric>;

    async fn list_metrics(&self) -> StorageResult<Vec<Metric>>;

    async fn upsert_control(&self, control: Control) -> StorageResult<()>;

    /// Controls ordered by id; `Some(ids)` keeps only those ids.
    async fn list_controls(&self, filter: Option<&[String]>) -> StorageResult<Vec<Control>>;

    /// Insert or replace a cloud service.
    async fn register_cloud_service(&self, service: CloudService) -> StorageResult<()>;

    /// Fails with `NotFound` for unknown ids.
    async fn get_cloud_service(&self, service_id: &str) -> StorageResult<CloudService>;

    async fn list_cloud_services(&self) -> StorageResult<Vec<CloudService>>;

    async fn save_metric_configuration(&self, config: MetricConfiguration) -> StorageResult<()>;

    async fn get_metric_configuration(
        &self,
        service_id: &str,
        metric_id: &str,
    ) -> StorageResult<Option<MetricConfiguration>>;
}

// ---------------------------------------------------------------------------
// Evidence
// ---------------------------------------------------------------------------

/// Collection-time failure reported by a module alongside its evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceError {
    pub code: String,
    pub description: String,
}

/// One observation of a target resource's configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub target_service: String,
    #[serde(default)]
    pub target_resource: String,
    #[serde(default)]
    pub tool_id: String,
    #[serde(default)]
    pub gathered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub raw_evidence: Option<String>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<EvidenceError>,
}

#[async_trait]
pub trait EvidenceStore: Send + Sync {
    /// Persist evidence. Fails with `AlreadyExists` on a duplicate id.
    async fn create_evidence(&self, evidence: Evidence) -> StorageResult<()>;

    /// Fails with `NotFound` for unknown ids.
    async fn get_evidence(&self, evidence_id: &str) -> StorageResult<Evidence>;

    /// Evidence for a service gathered at or after `since`, newest first.
    async fn list_evidence(
        &self,
        service_id: &str,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<Evidence>>;
}

// ---------------------------------------------------------------------------
// Evaluation ledger
// ---------------------------------------------------------------------------

/// One assessment verdict for one metric of one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub id: String,
    pub metric_id: String,
    pub service_id: String,
    pub evidence_id: String,
    pub status: bool,
    pub time: DateTime<Utc>,
}

/// Rollup of a control's latest per-metric results for one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compliance {
    pub id: String,
    pub control_id: String,
    pub service_id: String,
    pub status: bool,
    pub time: DateTime<Utc>,
    /// The results the status was derived from
    pub evaluations: Vec<EvaluationResult>,
}

/// Append-only history of evaluation results and compliance verdicts.
///
/// "Latest" is always a query by timestamp, never insertion order.
#[async_trait]
pub trait EvaluationLedger: Send + Sync {
    async fn append_result(&self, result: EvaluationResult) -> StorageResult<()>;

    /// Most recent result by `time` for `(service_id, metric_id)`.
    async fn latest_result(
        &self,
        service_id: &str,
        metric_id: &str,
    ) -> StorageResult<Option<EvaluationResult>>;

    async fn append_compliance(&self, compliance: Compliance) -> StorageResult<()>;

    /// Most recent verdict by `time` for `(service_id, control_id)`.
    async fn latest_compliance(
        &self,
        service_id: &str,
        control_id: &str,
    ) -> StorageResult<Option<Compliance>>;

    /// Verdicts for a service with `time >= since`, newest first.
    async fn list_compliance(
        &self,
        service_id: &str,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<Compliance>>;
}
