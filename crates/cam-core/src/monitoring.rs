//! Per-service monitoring scheduler.
//!
//! Each monitored service owns one [`JobSet`] with one trigger job per
//! selected collection module. Sessions move `absent → running → stopped`;
//! a stopped session stays inspectable until a fresh start replaces it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cam_state::{Catalog, CollectionModule, ModuleRegistry, ServiceConfiguration};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn, Instrument};

use crate::collection::{CollectionClient, StartCollectingRequest};
use crate::domain::{CamError, Result};
use crate::interval::{resolve_interval, DEFAULT_INTERVAL};
use crate::jobs::{JobAction, JobSet, TRIGGER_TAG};
use crate::metrics::METRICS;
use crate::obs;
use crate::selector::select_modules;

/// Default address collection modules stream evidence to.
pub const DEFAULT_EVAL_MANAGER_ADDRESS: &str = "localhost:50101";

#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    /// Period used when no selected metric declares an interval
    pub default_interval: Duration,
    /// Evidence intake address handed to collection modules
    pub eval_manager_address: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            default_interval: DEFAULT_INTERVAL,
            eval_manager_address: DEFAULT_EVAL_MANAGER_ADDRESS.to_string(),
        }
    }
}

/// Snapshot of one service's monitoring session.
///
/// `next_run` and `control_ids` are only populated while the session runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringStatus {
    pub service_id: String,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub control_ids: Vec<String>,
}

struct Session {
    jobs: JobSet,
    control_ids: Vec<String>,
}

impl Session {
    fn status(&self, service_id: &str) -> MonitoringStatus {
        let running = self.jobs.is_running();
        MonitoringStatus {
            service_id: service_id.to_string(),
            last_run: self.jobs.last_run(TRIGGER_TAG),
            next_run: if running && !self.jobs.is_empty() {
                self.jobs.next_run()
            } else {
                None
            },
            control_ids: if running {
                self.control_ids.clone()
            } else {
                Vec::new()
            },
        }
    }
}

/// Job action: ask one module to start collecting for one service.
struct TriggerCollection {
    service_id: String,
    module: CollectionModule,
    eval_manager: String,
    registry: Arc<dyn ModuleRegistry>,
    client: Arc<dyn CollectionClient>,
}

#[async_trait]
impl JobAction for TriggerCollection {
    async fn run(&self) {
        self.trigger()
            .instrument(obs::monitoring_span(&self.service_id))
            .await
    }
}

impl TriggerCollection {
    async fn trigger(&self) {
        let configuration = match self
            .registry
            .get_service_configuration(&self.service_id, &self.module.config_type_url)
            .await
        {
            Ok(Some(config)) => config,
            Ok(None) => {
                ServiceConfiguration::empty(&self.service_id, &self.module.config_type_url)
            }
            Err(e) => {
                obs::emit_collection_failed(&self.service_id, &self.module.id, &e);
                return;
            }
        };

        METRICS.inc_collections_triggered();
        let request = StartCollectingRequest {
            service_id: self.service_id.clone(),
            eval_manager: self.eval_manager.clone(),
            configuration: Some(configuration),
        };

        match self
            .client
            .start_collecting(&self.module.address, request)
            .await
        {
            Ok(resp) => {
                obs::emit_collection_triggered(
                    &self.service_id,
                    &self.module.id,
                    &self.module.address,
                );
                debug!(request_id = %resp.request_id, "collection accepted");
            }
            Err(e) => obs::emit_collection_failed(&self.service_id, &self.module.id, &e),
        }
    }
}

/// Owns the per-service session table.
pub struct MonitoringScheduler {
    catalog: Arc<dyn Catalog>,
    registry: Arc<dyn ModuleRegistry>,
    client: Arc<dyn CollectionClient>,
    config: MonitoringConfig,
    sessions: Mutex<HashMap<String, Session>>,
}

impl MonitoringScheduler {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        registry: Arc<dyn ModuleRegistry>,
        client: Arc<dyn CollectionClient>,
        config: MonitoringConfig,
    ) -> Self {
        Self {
            catalog,
            registry,
            client,
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Start monitoring `service_id` for `control_ids`.
    ///
    /// The session table stays locked for the whole call, so two concurrent
    /// starts for one service cannot both pass the running check.
    #[instrument(skip(self, control_ids), fields(controls = control_ids.len()))]
    pub async fn start_monitoring(
        &self,
        service_id: &str,
        control_ids: &[String],
    ) -> Result<MonitoringStatus> {
        let mut sessions = self.sessions.lock().await;

        if sessions
            .get(service_id)
            .map_or(false, |s| s.jobs.is_running())
        {
            return Err(CamError::AlreadyMonitoring(service_id.to_string()));
        }

        let controls = self.catalog.list_controls(Some(control_ids)).await?;
        if controls.is_empty() {
            return Err(CamError::ControlsNotFound(service_id.to_string()));
        }

        let mut metric_ids: Vec<String> = Vec::new();
        for metric_id in controls.iter().flat_map(|c| c.metric_ids.iter()) {
            if !metric_ids.contains(metric_id) {
                metric_ids.push(metric_id.clone());
            }
        }

        let modules = select_modules(self.registry.as_ref(), &metric_ids).await?;
        let period = resolve_interval(
            self.catalog.as_ref(),
            &metric_ids,
            self.config.default_interval,
        )
        .await;

        let mut jobs = JobSet::new(period)?;
        for module in modules {
            let module_id = module.id.clone();
            if let Err(e) = self.schedule_module(&mut jobs, service_id, module) {
                warn!(module_id = %module_id, error = %e, "could not schedule collection module");
            }
        }

        obs::emit_monitoring_started(service_id, controls.len(), jobs.len(), period.as_secs());
        jobs.start();

        let session = Session {
            jobs,
            control_ids: controls.into_iter().map(|c| c.id).collect(),
        };
        let status = session.status(service_id);
        sessions.insert(service_id.to_string(), session);
        Ok(status)
    }

    fn schedule_module(
        &self,
        jobs: &mut JobSet,
        service_id: &str,
        module: CollectionModule,
    ) -> Result<()> {
        if module.address.is_empty() {
            return Err(CamError::validation(format!(
                "collection module {} has no address",
                module.id
            )));
        }

        let mut tags = Vec::with_capacity(module.metric_ids.len() + 1);
        tags.push(TRIGGER_TAG.to_string());
        tags.extend(module.metric_ids.iter().cloned());

        debug!(module_id = %module.id, address = %module.address, "scheduling collection module");
        jobs.add_job(
            tags,
            Arc::new(TriggerCollection {
                service_id: service_id.to_string(),
                module,
                eval_manager: self.config.eval_manager_address.clone(),
                registry: Arc::clone(&self.registry),
                client: Arc::clone(&self.client),
            }),
        )
    }

    pub async fn monitoring_status(&self, service_id: &str) -> Result<MonitoringStatus> {
        let sessions = self.sessions.lock().await;
        sessions
            .get(service_id)
            .map(|s| s.status(service_id))
            .ok_or_else(|| CamError::NotMonitored(service_id.to_string()))
    }

    /// Stop a running session; the record stays for status queries.
    #[instrument(skip(self))]
    pub async fn stop_monitoring(&self, service_id: &str) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(service_id)
            .filter(|s| s.jobs.is_running())
            .ok_or_else(|| CamError::NotMonitored(service_id.to_string()))?;

        session.jobs.stop();
        obs::emit_monitoring_stopped(service_id);
        Ok(())
    }

    /// Run every job tagged with `metric_id` now, across all running sessions.
    ///
    /// Returns how many jobs were fired.
    pub async fn retrigger_metric(&self, metric_id: &str) -> Result<usize> {
        let sessions = self.sessions.lock().await;
        let fired: usize = sessions
            .values()
            .filter(|s| s.jobs.is_running())
            .map(|s| s.jobs.run_by_tag(metric_id))
            .sum();
        info!(metric_id = %metric_id, fired = fired, "re-triggered collection");
        Ok(fired)
    }

    /// Stop every running session.
    pub async fn shutdown(&self) {
        let mut sessions = self.sessions.lock().await;
        for (service_id, session) in sessions.iter_mut() {
            if session.jobs.stop() {
                obs::emit_monitoring_stopped(service_id);
            }
        }
    }
}
