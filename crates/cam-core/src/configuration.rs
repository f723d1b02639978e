//! Configuration-side facade: module registry, cloud services, service
//! configurations and the monitoring lifecycle.

use std::sync::Arc;

use cam_state::{
    Catalog, CloudService, CollectionModule, Control, Metric, MetricConfiguration, ModuleRegistry,
    ServiceConfiguration,
};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::domain::{CamError, Result};
use crate::monitoring::{MonitoringScheduler, MonitoringStatus};

pub struct ConfigurationService {
    catalog: Arc<dyn Catalog>,
    registry: Arc<dyn ModuleRegistry>,
    scheduler: Arc<MonitoringScheduler>,
}

impl ConfigurationService {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        registry: Arc<dyn ModuleRegistry>,
        scheduler: Arc<MonitoringScheduler>,
    ) -> Self {
        Self {
            catalog,
            registry,
            scheduler,
        }
    }

    pub fn scheduler(&self) -> &Arc<MonitoringScheduler> {
        &self.scheduler
    }

    // ---- collection modules ------------------------------------------------

    pub async fn add_collection_module(&self, module: CollectionModule) -> Result<()> {
        if module.id.is_empty() {
            return Err(CamError::validation("collection module id is missing"));
        }
        if module.name.is_empty() {
            return Err(CamError::validation("collection module name is missing"));
        }
        if module.address.is_empty() {
            return Err(CamError::validation("collection module address is missing"));
        }
        info!(module_id = %module.id, address = %module.address, "adding collection module");
        self.registry.add_module(module).await?;
        Ok(())
    }

    pub async fn list_collection_modules(&self) -> Result<Vec<CollectionModule>> {
        Ok(self.registry.list_modules().await?)
    }

    pub async fn remove_collection_module(&self, module_id: &str) -> Result<()> {
        if module_id.is_empty() {
            return Err(CamError::validation("collection module id is missing"));
        }
        self.registry.remove_module(module_id).await?;
        info!(module_id = %module_id, "removed collection module");
        Ok(())
    }

    // ---- catalog -----------------------------------------------------------

    pub async fn register_cloud_service(&self, service: CloudService) -> Result<()> {
        if service.id.is_empty() {
            return Err(CamError::validation("serviceID is missing"));
        }
        self.catalog.register_cloud_service(service).await?;
        Ok(())
    }

    pub async fn list_cloud_services(&self) -> Result<Vec<CloudService>> {
        Ok(self.catalog.list_cloud_services().await?)
    }

    pub async fn list_controls(&self) -> Result<Vec<Control>> {
        Ok(self.catalog.list_controls(None).await?)
    }

    pub async fn list_metrics(&self) -> Result<Vec<Metric>> {
        Ok(self.catalog.list_metrics().await?)
    }

    // ---- service configurations --------------------------------------------

    /// Upsert per-module configurations for a service.
    ///
    /// Entries without a raw configuration are skipped. Returns how many
    /// entries were stored.
    pub async fn configure_cloud_service(
        &self,
        service_id: &str,
        configurations: Vec<ServiceConfiguration>,
    ) -> Result<usize> {
        if service_id.is_empty() {
            return Err(CamError::validation("serviceID is missing"));
        }
        self.catalog.get_cloud_service(service_id).await?;

        let mut stored = 0;
        for mut config in configurations {
            if config.raw_configuration.is_none() {
                debug!(type_url = %config.type_url, "skipping empty service configuration");
                continue;
            }
            config.service_id = service_id.to_string();
            self.registry.save_service_configuration(config).await?;
            stored += 1;
        }
        info!(service_id = %service_id, stored = stored, "configured cloud service");
        Ok(stored)
    }

    pub async fn list_cloud_service_configurations(
        &self,
        service_id: &str,
    ) -> Result<Vec<ServiceConfiguration>> {
        if service_id.is_empty() {
            return Err(CamError::validation("serviceID is missing"));
        }
        self.catalog.get_cloud_service(service_id).await?;
        Ok(self.registry.list_service_configurations(service_id).await?)
    }

    /// Persist a metric target, then re-run collection for that metric.
    ///
    /// A failed re-trigger is logged; the stored configuration stands.
    pub async fn update_metric_configuration(
        &self,
        service_id: &str,
        metric_id: &str,
        mut config: MetricConfiguration,
    ) -> Result<()> {
        if service_id.is_empty() {
            return Err(CamError::validation("serviceID is missing"));
        }
        if metric_id.is_empty() {
            return Err(CamError::validation("metricID is missing"));
        }
        config.service_id = service_id.to_string();
        config.metric_id = metric_id.to_string();
        config.updated_at = Utc::now();
        self.catalog.save_metric_configuration(config).await?;

        match self.scheduler.retrigger_metric(metric_id).await {
            Ok(fired) => debug!(metric_id = %metric_id, fired = fired, "metric re-triggered"),
            Err(e) => warn!(metric_id = %metric_id, error = %e, "could not re-trigger metric"),
        }
        Ok(())
    }

    pub async fn get_metric_configuration(
        &self,
        service_id: &str,
        metric_id: &str,
    ) -> Result<MetricConfiguration> {
        self.catalog
            .get_metric_configuration(service_id, metric_id)
            .await?
            .ok_or_else(|| CamError::NotFound {
                kind: "metric configuration",
                id: format!("{service_id}/{metric_id}"),
            })
    }

    // ---- monitoring --------------------------------------------------------

    pub async fn start_monitoring(
        &self,
        service_id: &str,
        control_ids: &[String],
    ) -> Result<MonitoringStatus> {
        if service_id.is_empty() {
            return Err(CamError::validation("serviceID is missing"));
        }
        if control_ids.is_empty() {
            return Err(CamError::validation("control IDs must be specified"));
        }
        self.scheduler.start_monitoring(service_id, control_ids).await
    }

    pub async fn monitoring_status(&self, service_id: &str) -> Result<MonitoringStatus> {
        if service_id.is_empty() {
            return Err(CamError::validation("serviceID is missing"));
        }
        self.scheduler.monitoring_status(service_id).await
    }

    pub async fn stop_monitoring(&self, service_id: &str) -> Result<()> {
        if service_id.is_empty() {
            return Err(CamError::validation("serviceID is missing"));
        }
        self.scheduler.stop_monitoring(service_id).await
    }
}
