//! camd - continuous compliance monitoring daemon
//!
//! Hosts the monitoring scheduler, the evidence intake listener and the
//! compliance aggregator behind two line-delimited JSON listeners.

mod admin;
mod bootstrap;
mod evidence_server;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use cam_core::metrics::METRICS;
use cam_core::telemetry::{init_tracing, LogFormat};
use cam_core::{
    load_catalog, seed_catalog, AggregatorConfig, ComplianceAggregator, ConfigurationService,
    EvaluationService, EvidenceIntake, HttpAssessmentEngine, HttpCollectionClient,
    MonitoringConfig, MonitoringScheduler,
};
use cam_state::{Catalog, EvaluationLedger, EvidenceStore, ModuleRegistry, SurrealStore};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, Level};

use crate::admin::Services;
use crate::bootstrap::{autocreate_modules, DefaultModuleAddresses};

#[derive(Parser, Debug)]
#[command(name = "camd")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Continuous compliance monitoring daemon", long_about = None)]
struct Args {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// Address of the administrative listener
    #[arg(long, env = "CAM_ADMIN_ADDR", default_value = "0.0.0.0:50100")]
    admin_addr: String,

    /// Address of the evidence intake listener
    #[arg(long, env = "CAM_EVIDENCE_ADDR", default_value = "0.0.0.0:50101")]
    evidence_addr: String,

    /// Evidence address handed to collection modules
    #[arg(long, env = "CAM_EVAL_MANAGER_ADDRESS", default_value = "localhost:50101")]
    eval_manager_address: String,

    /// Endpoint of the assessment engine
    #[arg(
        long,
        env = "CAM_ASSESSMENT_ENDPOINT",
        default_value = "http://localhost:50102/v1/assess"
    )]
    assessment_endpoint: String,

    /// Collection period when no metric declares one
    #[arg(long, env = "CAM_DEFAULT_INTERVAL_SECS", default_value_t = 300)]
    default_interval_secs: u64,

    /// Compliance debounce window in milliseconds
    #[arg(long, env = "CAM_WINDOW_MS", default_value_t = 2000)]
    window_ms: u64,

    /// Results per metric that close a debounce window early
    #[arg(long, env = "CAM_THRESHOLD", default_value_t = 100)]
    threshold: u64,

    /// JSON catalog of metrics and controls to load at start
    #[arg(long, env = "CAM_CATALOG")]
    catalog: Option<PathBuf>,

    /// Use an in-memory database instead of the environment-selected one
    #[arg(long, env = "CAM_DB_IN_MEMORY")]
    db_in_memory: bool,

    /// Replace registered collection modules with the built-in set
    #[arg(long, env = "CAM_COLLECTION_AUTOCREATE")]
    collection_autocreate: bool,

    #[arg(long, env = "CAM_COLLECTION_WORKLOAD_HOST", default_value = "localhost")]
    collection_workload_host: String,
    #[arg(long, env = "CAM_COLLECTION_WORKLOAD_PORT", default_value_t = 50054)]
    collection_workload_port: u16,
    #[arg(long, env = "CAM_COLLECTION_AUTHSEC_HOST", default_value = "localhost")]
    collection_authsec_host: String,
    #[arg(long, env = "CAM_COLLECTION_AUTHSEC_PORT", default_value_t = 50052)]
    collection_authsec_port: u16,
    #[arg(long, env = "CAM_COLLECTION_INTEGRITY_HOST", default_value = "localhost")]
    collection_integrity_host: String,
    #[arg(long, env = "CAM_COLLECTION_INTEGRITY_PORT", default_value_t = 50053)]
    collection_integrity_port: u16,
    #[arg(long, env = "CAM_COLLECTION_COMMSEC_HOST", default_value = "localhost")]
    collection_commsec_host: String,
    #[arg(long, env = "CAM_COLLECTION_COMMSEC_PORT", default_value_t = 50051)]
    collection_commsec_port: u16,
}

impl Args {
    fn module_addresses(&self) -> DefaultModuleAddresses {
        DefaultModuleAddresses {
            workload: format!(
                "{}:{}",
                self.collection_workload_host, self.collection_workload_port
            ),
            authsec: format!(
                "{}:{}",
                self.collection_authsec_host, self.collection_authsec_port
            ),
            integrity: format!(
                "{}:{}",
                self.collection_integrity_host, self.collection_integrity_port
            ),
            commsec: format!(
                "{}:{}",
                self.collection_commsec_host, self.collection_commsec_port
            ),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(LogFormat::from_json_flag(args.json), level);

    if args.default_interval_secs == 0 {
        bail!("--default-interval-secs must be positive");
    }

    let store = if args.db_in_memory {
        SurrealStore::in_memory().await
    } else {
        SurrealStore::from_env().await
    }
    .context("Failed to connect to CAM database")?;

    let catalog: Arc<dyn Catalog> = Arc::new(store.clone());
    let registry: Arc<dyn ModuleRegistry> = Arc::new(store.clone());
    let evidence: Arc<dyn EvidenceStore> = Arc::new(store.clone());
    let ledger: Arc<dyn EvaluationLedger> = Arc::new(store);

    if let Some(path) = &args.catalog {
        let file = load_catalog(path)?;
        seed_catalog(catalog.as_ref(), file).await?;
    }

    let client = Arc::new(HttpCollectionClient::new()?);
    let scheduler = Arc::new(MonitoringScheduler::new(
        Arc::clone(&catalog),
        Arc::clone(&registry),
        client,
        MonitoringConfig {
            default_interval: Duration::from_secs(args.default_interval_secs),
            eval_manager_address: args.eval_manager_address.clone(),
        },
    ));

    let aggregator = ComplianceAggregator::new(
        Arc::clone(&catalog),
        Arc::clone(&evidence),
        Arc::clone(&ledger),
        AggregatorConfig {
            window: Duration::from_millis(args.window_ms),
            threshold: args.threshold,
        },
    );
    let engine = Arc::new(HttpAssessmentEngine::new(
        args.assessment_endpoint.clone(),
        aggregator.hook(),
    )?);
    let intake = Arc::new(EvidenceIntake::new(Arc::clone(&evidence), engine));

    let services = Arc::new(Services {
        configuration: ConfigurationService::new(
            Arc::clone(&catalog),
            registry,
            Arc::clone(&scheduler),
        ),
        evaluation: EvaluationService::new(evidence, ledger, aggregator),
    });

    if args.collection_autocreate {
        let added = autocreate_modules(&services.configuration, &args.module_addresses()).await;
        info!(added, "collection modules auto-created");
    }

    let admin_listener = TcpListener::bind(&args.admin_addr)
        .await
        .with_context(|| format!("bind admin listener on {}", args.admin_addr))?;
    let evidence_listener = TcpListener::bind(&args.evidence_addr)
        .await
        .with_context(|| format!("bind evidence listener on {}", args.evidence_addr))?;

    let admin_task = tokio::spawn(admin::serve(admin_listener, services));
    let evidence_task = tokio::spawn(evidence_server::serve(evidence_listener, intake));
    info!(
        admin = %args.admin_addr,
        evidence = %args.evidence_addr,
        "camd started"
    );

    tokio::signal::ctrl_c()
        .await
        .context("wait for shutdown signal")?;
    info!("shutting down");

    admin_task.abort();
    evidence_task.abort();
    scheduler.shutdown().await;
    METRICS.flush();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_ports() {
        let args = Args::parse_from(["camd"]);
        assert_eq!(args.admin_addr, "0.0.0.0:50100");
        assert_eq!(args.evidence_addr, "0.0.0.0:50101");
        assert_eq!(args.window_ms, 2000);
        assert_eq!(args.threshold, 100);

        let addrs = args.module_addresses();
        assert_eq!(addrs.workload, "localhost:50054");
        assert_eq!(addrs.commsec, "localhost:50051");
    }

    #[test]
    fn flags_override_defaults() {
        let args = Args::parse_from([
            "camd",
            "--db-in-memory",
            "--collection-autocreate",
            "--collection-authsec-port",
            "6000",
            "--threshold",
            "5",
        ]);
        assert!(args.db_in_memory);
        assert!(args.collection_autocreate);
        assert_eq!(args.module_addresses().authsec, "localhost:6000");
        assert_eq!(args.threshold, 5);
    }
}
