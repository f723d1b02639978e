//! Row definitions for the compliance SurrealDB tables
//!
//! Tables:
//! - collection_modules / service_configurations
//! - metrics / controls / cloud_services / metric_configurations
//! - evidences
//! - evaluation_results / compliances
//!
//! Rows carry their domain identifier in a dedicated `*_id` column because
//! SurrealDB reserves `id` for the record link. Conversion to and from the
//! `storage_traits` types happens here, at the boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::sql::Thing;

use crate::storage_traits::{
    CloudService, CollectionModule, Compliance, Control, EvaluationResult, Evidence,
    EvidenceError, Metric, MetricConfiguration, ServiceConfiguration,
};

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serde::Serialize::serialize(&SurrealDatetime::from(*date), serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Module for serializing optional chrono DateTime to SurrealDB datetime format
mod surreal_datetime_opt {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = date.map(SurrealDatetime::from);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = Option::<SurrealDatetime>::deserialize(deserializer)?;
        Ok(sd.map(DateTime::from))
    }
}

// ---------------------------------------------------------------------------
// Collection modules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Thing>,
    pub module_id: String,
    pub name: String,
    pub description: String,
    pub metric_ids: Vec<String>,
    pub address: String,
    pub config_type_url: String,
}

impl From<CollectionModule> for ModuleRow {
    fn from(m: CollectionModule) -> Self {
        Self {
            id: None,
            module_id: m.id,
            name: m.name,
            description: m.description,
            metric_ids: m.metric_ids,
            address: m.address,
            config_type_url: m.config_type_url,
        }
    }
}

impl From<ModuleRow> for CollectionModule {
    fn from(r: ModuleRow) -> Self {
        Self {
            id: r.module_id,
            name: r.name,
            description: r.description,
            metric_ids: r.metric_ids,
            address: r.address,
            config_type_url: r.config_type_url,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfigRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Thing>,
    pub service_id: String,
    pub type_url: String,
    #[serde(default)]
    pub raw_configuration: Option<serde_json::Value>,
}

impl From<ServiceConfiguration> for ServiceConfigRow {
    fn from(c: ServiceConfiguration) -> Self {
        Self {
            id: None,
            service_id: c.service_id,
            type_url: c.type_url,
            raw_configuration: c.raw_configuration,
        }
    }
}

impl From<ServiceConfigRow> for ServiceConfiguration {
    fn from(r: ServiceConfigRow) -> Self {
        Self {
            service_id: r.service_id,
            type_url: r.type_url,
            raw_configuration: r.raw_configuration,
        }
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Thing>,
    pub metric_id: String,
    pub name: String,
    pub description: String,
    pub scale: String,
    pub interval_secs: i64,
}

impl From<Metric> for MetricRow {
    fn from(m: Metric) -> Self {
        Self {
            id: None,
            metric_id: m.id,
            name: m.name,
            description: m.description,
            scale: m.scale,
            interval_secs: m.interval_secs,
        }
    }
}

impl From<MetricRow> for Metric {
    fn from(r: MetricRow) -> Self {
        Self {
            id: r.metric_id,
            name: r.name,
            description: r.description,
            scale: r.scale,
            interval_secs: r.interval_secs,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Thing>,
    pub control_id: String,
    pub name: String,
    pub metric_ids: Vec<String>,
}

impl From<Control> for ControlRow {
    fn from(c: Control) -> Self {
        Self {
            id: None,
            control_id: c.id,
            name: c.name,
            metric_ids: c.metric_ids,
        }
    }
}

impl From<ControlRow> for Control {
    fn from(r: ControlRow) -> Self {
        Self {
            id: r.control_id,
            name: r.name,
            metric_ids: r.metric_ids,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudServiceRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Thing>,
    pub service_id: String,
    pub name: String,
    pub description: String,
    pub requirement_ids: Vec<String>,
}

impl From<CloudService> for CloudServiceRow {
    fn from(s: CloudService) -> Self {
        Self {
            id: None,
            service_id: s.id,
            name: s.name,
            description: s.description,
            requirement_ids: s.requirement_ids,
        }
    }
}

impl From<CloudServiceRow> for CloudService {
    fn from(r: CloudServiceRow) -> Self {
        Self {
            id: r.service_id,
            name: r.name,
            description: r.description,
            requirement_ids: r.requirement_ids,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricConfigRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Thing>,
    pub service_id: String,
    pub metric_id: String,
    pub operator: String,
    pub target_value: serde_json::Value,
    pub is_default: bool,
    #[serde(with = "surreal_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl From<MetricConfiguration> for MetricConfigRow {
    fn from(c: MetricConfiguration) -> Self {
        Self {
            id: None,
            service_id: c.service_id,
            metric_id: c.metric_id,
            operator: c.operator,
            target_value: c.target_value,
            is_default: c.is_default,
            updated_at: c.updated_at,
        }
    }
}

impl From<MetricConfigRow> for MetricConfiguration {
    fn from(r: MetricConfigRow) -> Self {
        Self {
            service_id: r.service_id,
            metric_id: r.metric_id,
            operator: r.operator,
            target_value: r.target_value,
            is_default: r.is_default,
            updated_at: r.updated_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Evidence
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Thing>,
    pub evidence_id: String,
    pub name: String,
    pub target_service: String,
    pub target_resource: String,
    pub tool_id: String,
    #[serde(default, with = "surreal_datetime_opt")]
    pub gathered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub raw_evidence: Option<String>,
    /// Structured evidence value
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl From<Evidence> for EvidenceRow {
    fn from(e: Evidence) -> Self {
        let (error_code, error_description) = match e.error {
            Some(err) => (Some(err.code), Some(err.description)),
            None => (None, None),
        };
        Self {
            id: None,
            evidence_id: e.id,
            name: e.name,
            target_service: e.target_service,
            target_resource: e.target_resource,
            tool_id: e.tool_id,
            gathered_at: e.gathered_at,
            raw_evidence: e.raw_evidence,
            payload: e.value,
            error_code,
            error_description,
        }
    }
}

impl From<EvidenceRow> for Evidence {
    fn from(r: EvidenceRow) -> Self {
        let error = r.error_code.map(|code| EvidenceError {
            code,
            description: r.error_description.unwrap_or_default(),
        });
        Self {
            id: r.evidence_id,
            name: r.name,
            target_service: r.target_service,
            target_resource: r.target_resource,
            tool_id: r.tool_id,
            gathered_at: r.gathered_at,
            raw_evidence: r.raw_evidence,
            value: r.payload,
            error,
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Thing>,
    pub result_id: String,
    pub metric_id: String,
    pub service_id: String,
    pub evidence_id: String,
    pub status: bool,
    #[serde(with = "surreal_datetime")]
    pub recorded_at: DateTime<Utc>,
}

impl From<EvaluationResult> for EvaluationRow {
    fn from(r: EvaluationResult) -> Self {
        Self {
            id: None,
            result_id: r.id,
            metric_id: r.metric_id,
            service_id: r.service_id,
            evidence_id: r.evidence_id,
            status: r.status,
            recorded_at: r.time,
        }
    }
}

impl From<EvaluationRow> for EvaluationResult {
    fn from(r: EvaluationRow) -> Self {
        Self {
            id: r.result_id,
            metric_id: r.metric_id,
            service_id: r.service_id,
            evidence_id: r.evidence_id,
            status: r.status,
            time: r.recorded_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Thing>,
    pub compliance_id: String,
    pub control_id: String,
    pub service_id: String,
    pub status: bool,
    #[serde(with = "surreal_datetime")]
    pub recorded_at: DateTime<Utc>,
    pub evaluations: Vec<EvaluationRow>,
}

impl From<Compliance> for ComplianceRow {
    fn from(c: Compliance) -> Self {
        Self {
            id: None,
            compliance_id: c.id,
            control_id: c.control_id,
            service_id: c.service_id,
            status: c.status,
            recorded_at: c.time,
            evaluations: c.evaluations.into_iter().map(EvaluationRow::from).collect(),
        }
    }
}

impl From<ComplianceRow> for Compliance {
    fn from(r: ComplianceRow) -> Self {
        Self {
            id: r.compliance_id,
            control_id: r.control_id,
            service_id: r.service_id,
            status: r.status,
            time: r.recorded_at,
            evaluations: r
                .evaluations
                .into_iter()
                .map(EvaluationResult::from)
                .collect(),
        }
    }
}
