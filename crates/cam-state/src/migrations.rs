//! SurrealDB schema migrations and initialization
//!
//! Defines every compliance table with its identifying and lookup indexes.
//! The evaluation tables are append-only: deletes are denied at the
//! permission level.

use crate::error::StateError;
use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all compliance tables in SurrealDB
///
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing compliance schema");

    init_module_tables(db).await?;
    init_catalog_tables(db).await?;
    init_evidence_table(db).await?;
    init_ledger_tables(db).await?;

    info!("Compliance schema initialization complete");
    Ok(())
}

async fn run(db: &Surreal<Any>, table: &str, sql: &'static str) -> Result<()> {
    debug!(table = %table, "Initializing table");
    db.query(sql)
        .await
        .and_then(|res| res.check())
        .map_err(|e| StateError::SchemaSetup(format!("{table}: {e}")))?;
    Ok(())
}

/// `collection_modules` and `service_configurations`
///
/// ```text
/// TABLE collection_modules { module_id (unique), name, metric_ids, address, config_type_url }
/// TABLE service_configurations { service_id, type_url, raw_configuration }
///   unique (service_id, type_url)
/// ```
async fn init_module_tables(db: &Surreal<Any>) -> Result<()> {
    run(
        db,
        "collection_modules",
        r#"
        DEFINE TABLE IF NOT EXISTS collection_modules SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_module_id ON TABLE collection_modules COLUMNS module_id UNIQUE;
        "#,
    )
    .await?;

    run(
        db,
        "service_configurations",
        r#"
        DEFINE TABLE IF NOT EXISTS service_configurations SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_service_type ON TABLE service_configurations
            COLUMNS service_id, type_url UNIQUE;
        "#,
    )
    .await
}

/// `metrics`, `controls`, `cloud_services`, `metric_configurations`
async fn init_catalog_tables(db: &Surreal<Any>) -> Result<()> {
    run(
        db,
        "metrics",
        r#"
        DEFINE TABLE IF NOT EXISTS metrics SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_metric_id ON TABLE metrics COLUMNS metric_id UNIQUE;
        "#,
    )
    .await?;

    run(
        db,
        "controls",
        r#"
        DEFINE TABLE IF NOT EXISTS controls SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_control_id ON TABLE controls COLUMNS control_id UNIQUE;
        "#,
    )
    .await?;

    run(
        db,
        "cloud_services",
        r#"
        DEFINE TABLE IF NOT EXISTS cloud_services SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_cloud_service_id ON TABLE cloud_services
            COLUMNS service_id UNIQUE;
        "#,
    )
    .await?;

    run(
        db,
        "metric_configurations",
        r#"
        DEFINE TABLE IF NOT EXISTS metric_configurations SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_service_metric ON TABLE metric_configurations
            COLUMNS service_id, metric_id UNIQUE;
        "#,
    )
    .await
}

/// `evidences`: immutable after creation
async fn init_evidence_table(db: &Surreal<Any>) -> Result<()> {
    run(
        db,
        "evidences",
        r#"
        DEFINE TABLE IF NOT EXISTS evidences
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update NONE
                FOR delete NONE;
        DEFINE INDEX IF NOT EXISTS idx_evidence_id ON TABLE evidences COLUMNS evidence_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_evidence_service ON TABLE evidences
            COLUMNS target_service, gathered_at;
        "#,
    )
    .await
}

/// `evaluation_results` and `compliances`: append-only
async fn init_ledger_tables(db: &Surreal<Any>) -> Result<()> {
    run(
        db,
        "evaluation_results",
        r#"
        DEFINE TABLE IF NOT EXISTS evaluation_results
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update NONE
                FOR delete NONE;
        DEFINE INDEX IF NOT EXISTS idx_result_lookup ON TABLE evaluation_results
            COLUMNS service_id, metric_id, recorded_at;
        "#,
    )
    .await?;

    run(
        db,
        "compliances",
        r#"
        DEFINE TABLE IF NOT EXISTS compliances
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update NONE
                FOR delete NONE;
        DEFINE INDEX IF NOT EXISTS idx_compliance_lookup ON TABLE compliances
            COLUMNS service_id, control_id, recorded_at;
        "#,
    )
    .await
}
