//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryModuleRegistry`, `MemoryCatalog`, `MemoryEvidenceStore`
//! and `MemoryEvaluationLedger` that satisfy the trait contracts without any
//! external dependencies.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageError;
use crate::storage_traits::*;

fn lock<T>(m: &Mutex<T>) -> StorageResult<MutexGuard<'_, T>> {
    m.lock()
        .map_err(|e| StorageError::Backend(format!("lock poisoned: {e}")))
}

// ---------------------------------------------------------------------------
// MemoryModuleRegistry
// ---------------------------------------------------------------------------

/// In-memory module catalog keyed by module id, plus service configurations
/// keyed by `(service_id, type_url)`.
#[derive(Debug, Default)]
pub struct MemoryModuleRegistry {
    modules: Mutex<BTreeMap<String, CollectionModule>>,
    configs: Mutex<BTreeMap<(String, String), ServiceConfiguration>>,
}

impl MemoryModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ModuleRegistry for MemoryModuleRegistry {
    async fn add_module(&self, module: CollectionModule) -> StorageResult<()> {
        let mut modules = lock(&self.modules)?;
        if modules.contains_key(&module.id) {
            return Err(StorageError::already_exists("collection module", &module.id));
        }
        modules.insert(module.id.clone(), module);
        Ok(())
    }

    async fn list_modules(&self) -> StorageResult<Vec<CollectionModule>> {
        Ok(lock(&self.modules)?.values().cloned().collect())
    }

    async fn remove_module(&self, module_id: &str) -> StorageResult<()> {
        lock(&self.modules)?
            .remove(module_id)
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found("collection module", module_id))
    }

    async fn save_service_configuration(
        &self,
        config: ServiceConfiguration,
    ) -> StorageResult<()> {
        let key = (config.service_id.clone(), config.type_url.clone());
        lock(&self.configs)?.insert(key, config);
        Ok(())
    }

    async fn get_service_configuration(
        &self,
        service_id: &str,
        type_url: &str,
    ) -> StorageResult<Option<ServiceConfiguration>> {
        let key = (service_id.to_string(), type_url.to_string());
        Ok(lock(&self.configs)?.get(&key).cloned())
    }

    async fn list_service_configurations(
        &self,
        service_id: &str,
    ) -> StorageResult<Vec<ServiceConfiguration>> {
        Ok(lock(&self.configs)?
            .values()
            .filter(|c| c.service_id == service_id)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MemoryCatalog
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct CatalogInner {
    metrics: BTreeMap<String, Metric>,
    controls: BTreeMap<String, Control>,
    services: BTreeMap<String, CloudService>,
    metric_configs: BTreeMap<(String, String), MetricConfiguration>,
}

/// In-memory control catalog.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    inner: Mutex<CatalogInner>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn upsert_metric(&self, metric: Metric) -> StorageResult<()> {
        lock(&self.inner)?.metrics.insert(metric.id.clone(), metric);
        Ok(())
    }

    async fn get_metric(&self, metric_id: &str) -> StorageResult<Metric> {
        lock(&self.inner)?
            .metrics
            .get(metric_id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("metric", metric_id))
    }

    async fn list_metrics(&self) -> StorageResult<Vec<Metric>> {
        Ok(lock(&self.inner)?.metrics.values().cloned().collect())
    }

    async fn upsert_control(&self, control: Control) -> StorageResult<()> {
        lock(&self.inner)?
            .controls
            .insert(control.id.clone(), control);
        Ok(())
    }

    async fn list_controls(&self, filter: Option<&[String]>) -> StorageResult<Vec<Control>> {
        let inner = lock(&self.inner)?;
        Ok(inner
            .controls
            .values()
            .filter(|c| filter.map_or(true, |ids| ids.contains(&c.id)))
            .cloned()
            .collect())
    }

    async fn register_cloud_service(&self, service: CloudService) -> StorageResult<()> {
        lock(&self.inner)?
            .services
            .insert(service.id.clone(), service);
        Ok(())
    }

    async fn get_cloud_service(&self, service_id: &str) -> StorageResult<CloudService> {
        lock(&self.inner)?
            .services
            .get(service_id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("cloud service", service_id))
    }

    async fn list_cloud_services(&self) -> StorageResult<Vec<CloudService>> {
        Ok(lock(&self.inner)?.services.values().cloned().collect())
    }

    async fn save_metric_configuration(&self, config: MetricConfiguration) -> StorageResult<()> {
        let key = (config.service_id.clone(), config.metric_id.clone());
        lock(&self.inner)?.metric_configs.insert(key, config);
        Ok(())
    }

    async fn get_metric_configuration(
        &self,
        service_id: &str,
        metric_id: &str,
    ) -> StorageResult<Option<MetricConfiguration>> {
        let key = (service_id.to_string(), metric_id.to_string());
        Ok(lock(&self.inner)?.metric_configs.get(&key).cloned())
    }
}

// ---------------------------------------------------------------------------
// MemoryEvidenceStore
// ---------------------------------------------------------------------------

/// In-memory evidence store keyed by evidence id.
#[derive(Debug, Default)]
pub struct MemoryEvidenceStore {
    evidence: Mutex<BTreeMap<String, Evidence>>,
}

impl MemoryEvidenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored evidence items.
    pub fn len(&self) -> usize {
        self.evidence.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EvidenceStore for MemoryEvidenceStore {
    async fn create_evidence(&self, evidence: Evidence) -> StorageResult<()> {
        let mut store = lock(&self.evidence)?;
        if store.contains_key(&evidence.id) {
            return Err(StorageError::already_exists("evidence", &evidence.id));
        }
        store.insert(evidence.id.clone(), evidence);
        Ok(())
    }

    async fn get_evidence(&self, evidence_id: &str) -> StorageResult<Evidence> {
        lock(&self.evidence)?
            .get(evidence_id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("evidence", evidence_id))
    }

    async fn list_evidence(
        &self,
        service_id: &str,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<Evidence>> {
        let mut out: Vec<Evidence> = lock(&self.evidence)?
            .values()
            .filter(|e| e.target_service == service_id)
            .filter(|e| e.gathered_at.map_or(false, |t| t >= since))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.gathered_at.cmp(&a.gathered_at));
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// MemoryEvaluationLedger
// ---------------------------------------------------------------------------

/// In-memory append-only ledger.
#[derive(Debug, Default)]
pub struct MemoryEvaluationLedger {
    results: Mutex<Vec<EvaluationResult>>,
    compliance: Mutex<Vec<Compliance>>,
}

impl MemoryEvaluationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every compliance row in append order.
    pub fn compliance_history(&self) -> Vec<Compliance> {
        self.compliance
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// Every evaluation result in append order.
    pub fn result_history(&self) -> Vec<EvaluationResult> {
        self.results.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EvaluationLedger for MemoryEvaluationLedger {
    async fn append_result(&self, result: EvaluationResult) -> StorageResult<()> {
        lock(&self.results)?.push(result);
        Ok(())
    }

    async fn latest_result(
        &self,
        service_id: &str,
        metric_id: &str,
    ) -> StorageResult<Option<EvaluationResult>> {
        Ok(lock(&self.results)?
            .iter()
            .filter(|r| r.service_id == service_id && r.metric_id == metric_id)
            .max_by_key(|r| r.time)
            .cloned())
    }

    async fn append_compliance(&self, compliance: Compliance) -> StorageResult<()> {
        lock(&self.compliance)?.push(compliance);
        Ok(())
    }

    async fn latest_compliance(
        &self,
        service_id: &str,
        control_id: &str,
    ) -> StorageResult<Option<Compliance>> {
        Ok(lock(&self.compliance)?
            .iter()
            .filter(|c| c.service_id == service_id && c.control_id == control_id)
            .max_by_key(|c| c.time)
            .cloned())
    }

    async fn list_compliance(
        &self,
        service_id: &str,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<Compliance>> {
        let mut out: Vec<Compliance> = lock(&self.compliance)?
            .iter()
            .filter(|c| c.service_id == service_id && c.time >= since)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.time.cmp(&a.time));
        Ok(out)
    }
}
