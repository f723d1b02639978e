//! Startup tasks: catalog seeding and default collection modules.

use cam_core::ConfigurationService;
use cam_state::CollectionModule;
use tracing::{error, info, warn};

pub const WORKLOAD_MODULE_ID: &str = "f5ecde04-1ab1-47c8-ad93-6ac241b3e72e";
pub const AUTHSEC_MODULE_ID: &str = "56dd78b5-33de-462e-9b26-8f6e801079e7";
pub const INTEGRITY_MODULE_ID: &str = "6e58e7d6-774f-4b19-a8e0-a42432023f5c";
pub const COMMSEC_MODULE_ID: &str = "4deec3fd-43f0-40ec-b75e-dab0e7528e09";

/// Addresses of the four built-in collection modules.
#[derive(Debug, Clone)]
pub struct DefaultModuleAddresses {
    pub workload: String,
    pub authsec: String,
    pub integrity: String,
    pub commsec: String,
}

fn module(id: &str, name: &str, metrics: &[&str], address: &str, config: &str) -> CollectionModule {
    CollectionModule {
        id: id.to_string(),
        name: name.to_string(),
        description: String::new(),
        metric_ids: metrics.iter().map(|m| m.to_string()).collect(),
        address: address.to_string(),
        config_type_url: format!("type.cam/collection.{config}"),
    }
}

pub fn default_modules(addrs: &DefaultModuleAddresses) -> Vec<CollectionModule> {
    vec![
        module(
            WORKLOAD_MODULE_ID,
            "Workload Security",
            &["AtRestEncryption"],
            &addrs.workload,
            "WorkloadSecurityConfig",
        ),
        module(
            AUTHSEC_MODULE_ID,
            "Authentication Security",
            &["OAuthGrantTypes", "APIOAuthProtected"],
            &addrs.authsec,
            "AuthenticationSecurityConfig",
        ),
        module(
            INTEGRITY_MODULE_ID,
            "Remote Integrity",
            &["SystemComponentsIntegrity"],
            &addrs.integrity,
            "RemoteIntegrityConfig",
        ),
        module(
            COMMSEC_MODULE_ID,
            "Communication Security",
            &["TlsVersion", "TlsCipherSuite", "TlsCommonWeaknesses"],
            &addrs.commsec,
            "CommunicationSecurityConfig",
        ),
    ]
}

/// Replace every registered module with the built-in set.
///
/// Returns how many modules were registered. Individual failures are logged.
pub async fn autocreate_modules(
    config: &ConfigurationService,
    addrs: &DefaultModuleAddresses,
) -> usize {
    let existing = match config.list_collection_modules().await {
        Ok(modules) => modules,
        Err(e) => {
            error!(error = %e, "could not list collection modules");
            return 0;
        }
    };
    for m in existing {
        if let Err(e) = config.remove_collection_module(&m.id).await {
            warn!(module_id = %m.id, error = %e, "could not remove collection module");
        }
    }

    let mut added = 0;
    for m in default_modules(addrs) {
        let (name, address) = (m.name.clone(), m.address.clone());
        match config.add_collection_module(m).await {
            Ok(()) => {
                info!(module = %name, address = %address, "added collection module");
                added += 1;
            }
            Err(e) => error!(module = %name, error = %e, "could not add collection module"),
        }
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use cam_core::fakes::RecordingCollectionClient;
    use cam_core::{MonitoringConfig, MonitoringScheduler};
    use cam_state::fakes::{MemoryCatalog, MemoryModuleRegistry};

    fn addrs() -> DefaultModuleAddresses {
        DefaultModuleAddresses {
            workload: "localhost:50054".into(),
            authsec: "localhost:50052".into(),
            integrity: "localhost:50053".into(),
            commsec: "localhost:50051".into(),
        }
    }

    #[tokio::test]
    async fn autocreate_replaces_existing_modules() {
        let catalog = Arc::new(MemoryCatalog::new());
        let registry = Arc::new(MemoryModuleRegistry::new());
        let scheduler = Arc::new(MonitoringScheduler::new(
            catalog.clone(),
            registry.clone(),
            Arc::new(RecordingCollectionClient::new()),
            MonitoringConfig::default(),
        ));
        let config = ConfigurationService::new(catalog, registry, scheduler);
        config
            .add_collection_module(module("stale", "Stale", &["X"], "old:1", "Old"))
            .await
            .unwrap();

        assert_eq!(autocreate_modules(&config, &addrs()).await, 4);
        let modules = config.list_collection_modules().await.unwrap();
        assert_eq!(modules.len(), 4);
        assert!(modules.iter().all(|m| m.id != "stale"));

        let commsec = modules.iter().find(|m| m.id == COMMSEC_MODULE_ID).unwrap();
        assert_eq!(commsec.address, "localhost:50051");
        assert_eq!(commsec.metric_ids.len(), 3);

        // idempotent on a second run
        assert_eq!(autocreate_modules(&config, &addrs()).await, 4);
    }
}
