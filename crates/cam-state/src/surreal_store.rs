//! SurrealDB-backed implementation of every storage trait
//!
//! One connection serves the module registry, the catalog, the evidence
//! store and the evaluation ledger. Rows in `schema` are converted to and
//! from `storage_traits` types at the boundary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::sql::Datetime as SurrealDatetime;
use surrealdb::{Response, Surreal};
use tracing::{debug, info, instrument};

use crate::config::{StoreConfig, DEFAULT_DATABASE, DEFAULT_NAMESPACE, LOCAL_DB_PATH};
use crate::error::{StateError, StorageError};
use crate::migrations;
use crate::schema::{
    CloudServiceRow, ComplianceRow, ControlRow, EvaluationRow, EvidenceRow, MetricConfigRow,
    MetricRow, ModuleRow, ServiceConfigRow,
};
use crate::storage_traits::*;

/// SurrealDB-backed store implementing [`ModuleRegistry`], [`Catalog`],
/// [`EvidenceStore`] and [`EvaluationLedger`].
#[derive(Clone)]
pub struct SurrealStore {
    db: Surreal<Any>,
}

fn backend(e: surrealdb::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

fn take_rows<T: DeserializeOwned>(mut res: Response) -> StorageResult<Vec<T>> {
    res.take(0).map_err(backend)
}

impl SurrealStore {
    /// Create an in-memory instance for testing.
    ///
    /// Connects to `mem://`, selects `cam/main`, and runs `init_schema`.
    pub async fn in_memory() -> crate::Result<Self> {
        let store = Self::open("mem://", DEFAULT_NAMESPACE, DEFAULT_DATABASE).await?;
        info!("SurrealStore connected (in-memory)");
        Ok(store)
    }

    /// Connect to a remote instance with credentials.
    pub async fn connect(config: StoreConfig) -> crate::Result<Self> {
        let db = surrealdb::engine::any::connect(&config.endpoint)
            .await
            .map_err(|e| {
                StateError::Connection(format!("Failed to connect to {}: {}", config.endpoint, e))
            })?;

        if config.is_root {
            db.signin(Root {
                username: &config.username,
                password: &config.password,
            })
            .await
            .map_err(|e| StateError::Connection(format!("Root auth failed: {e}")))?;
        } else {
            db.signin(Database {
                namespace: &config.namespace,
                database: &config.database,
                username: &config.username,
                password: &config.password,
            })
            .await
            .map_err(|e| StateError::Connection(format!("DB auth failed: {e}")))?;
        }

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;
        info!(endpoint = %config.endpoint, "SurrealStore connected (remote)");
        Ok(Self { db })
    }

    /// Create from environment variables.
    ///
    /// `SURREALDB_ENDPOINT` + credentials → remote; else `SURREALDB_URL`;
    /// else local persistence under `.cam/db`.
    pub async fn from_env() -> crate::Result<Self> {
        if let Ok(config) = StoreConfig::from_env() {
            return Self::connect(config).await;
        }

        if let Ok(url) = std::env::var("SURREALDB_URL") {
            let store = Self::open(&url, DEFAULT_NAMESPACE, DEFAULT_DATABASE).await?;
            info!("SurrealStore connected ({})", url);
            return Ok(store);
        }

        std::fs::create_dir_all(LOCAL_DB_PATH).map_err(|e| {
            StateError::Connection(format!(
                "Failed to create database directory {}: {}",
                LOCAL_DB_PATH, e
            ))
        })?;
        let url = format!("surrealkv://{}", LOCAL_DB_PATH);
        info!(
            "No remote config or SURREALDB_URL found, using local persistence: {}",
            url
        );
        Self::open(&url, DEFAULT_NAMESPACE, DEFAULT_DATABASE).await
    }

    async fn open(url: &str, ns: &str, db_name: &str) -> crate::Result<Self> {
        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StateError::Connection(format!("Failed to connect to {}: {}", url, e)))?;

        db.use_ns(ns)
            .use_db(db_name)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;
        Ok(Self { db })
    }

    /// Fetch at most one row matching `column = $key` from `table`.
    async fn fetch_one<T: DeserializeOwned>(
        &self,
        table: &'static str,
        column: &'static str,
        key: &str,
    ) -> StorageResult<Option<T>> {
        let sql = format!("SELECT * FROM {table} WHERE {column} = $key LIMIT 1");
        let res = self
            .db
            .query(sql)
            .bind(("key", key.to_string()))
            .await
            .map_err(backend)?;
        Ok(take_rows::<T>(res)?.into_iter().next())
    }

    /// Replace any row with `column = $key` by `row` in one transaction.
    async fn replace<R>(
        &self,
        table: &'static str,
        column: &'static str,
        key: String,
        row: R,
    ) -> StorageResult<()>
    where
        R: serde::Serialize + Send + 'static,
    {
        let sql = format!(
            "BEGIN TRANSACTION; \
             DELETE {table} WHERE {column} = $key; \
             CREATE {table} CONTENT $row; \
             COMMIT TRANSACTION;"
        );
        self.db
            .query(sql)
            .bind(("key", key))
            .bind(("row", row))
            .await
            .and_then(|res| res.check())
            .map_err(backend)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ModuleRegistry
// ---------------------------------------------------------------------------

#[async_trait]
impl ModuleRegistry for SurrealStore {
    #[instrument(skip(self, module), fields(module_id = %module.id))]
    async fn add_module(&self, module: CollectionModule) -> StorageResult<()> {
        if self
            .fetch_one::<ModuleRow>("collection_modules", "module_id", &module.id)
            .await?
            .is_some()
        {
            return Err(StorageError::already_exists("collection module", &module.id));
        }

        debug!("creating collection module");
        let _created: Option<ModuleRow> = self
            .db
            .create("collection_modules")
            .content(ModuleRow::from(module))
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn list_modules(&self) -> StorageResult<Vec<CollectionModule>> {
        let res = self
            .db
            .query("SELECT * FROM collection_modules ORDER BY module_id ASC")
            .await
            .map_err(backend)?;
        let rows: Vec<ModuleRow> = take_rows(res)?;
        Ok(rows.into_iter().map(CollectionModule::from).collect())
    }

    #[instrument(skip(self))]
    async fn remove_module(&self, module_id: &str) -> StorageResult<()> {
        let res = self
            .db
            .query("DELETE collection_modules WHERE module_id = $mid RETURN BEFORE")
            .bind(("mid", module_id.to_string()))
            .await
            .map_err(backend)?;
        let deleted: Vec<ModuleRow> = take_rows(res)?;
        if deleted.is_empty() {
            return Err(StorageError::not_found("collection module", module_id));
        }
        Ok(())
    }

    #[instrument(skip(self, config), fields(service_id = %config.service_id, type_url = %config.type_url))]
    async fn save_service_configuration(
        &self,
        config: ServiceConfiguration,
    ) -> StorageResult<()> {
        self.db
            .query(
                "BEGIN TRANSACTION; \
                 DELETE service_configurations WHERE service_id = $sid AND type_url = $turl; \
                 CREATE service_configurations CONTENT $row; \
                 COMMIT TRANSACTION;",
            )
            .bind(("sid", config.service_id.clone()))
            .bind(("turl", config.type_url.clone()))
            .bind(("row", ServiceConfigRow::from(config)))
            .await
            .and_then(|res| res.check())
            .map_err(backend)?;
        Ok(())
    }

    async fn get_service_configuration(
        &self,
        service_id: &str,
        type_url: &str,
    ) -> StorageResult<Option<ServiceConfiguration>> {
        let res = self
            .db
            .query(
                "SELECT * FROM service_configurations \
                 WHERE service_id = $sid AND type_url = $turl LIMIT 1",
            )
            .bind(("sid", service_id.to_string()))
            .bind(("turl", type_url.to_string()))
            .await
            .map_err(backend)?;
        let rows: Vec<ServiceConfigRow> = take_rows(res)?;
        Ok(rows.into_iter().next().map(ServiceConfiguration::from))
    }

    async fn list_service_configurations(
        &self,
        service_id: &str,
    ) -> StorageResult<Vec<ServiceConfiguration>> {
        let res = self
            .db
            .query("SELECT * FROM service_configurations WHERE service_id = $sid ORDER BY type_url ASC")
            .bind(("sid", service_id.to_string()))
            .await
            .map_err(backend)?;
        let rows: Vec<ServiceConfigRow> = take_rows(res)?;
        Ok(rows.into_iter().map(ServiceConfiguration::from).collect())
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[async_trait]
impl Catalog for SurrealStore {
    async fn upsert_metric(&self, metric: Metric) -> StorageResult<()> {
        let key = metric.id.clone();
        self.replace("metrics", "metric_id", key, MetricRow::from(metric))
            .await
    }

    async fn get_metric(&self, metric_id: &str) -> StorageResult<Metric> {
        self.fetch_one::<MetricRow>("metrics", "metric_id", metric_id)
            .await?
            .map(Metric::from)
            .ok_or_else(|| StorageError::not_found("metric", metric_id))
    }

    async fn list_metrics(&self) -> StorageResult<Vec<Metric>> {
        let res = self
            .db
            .query("SELECT * FROM metrics ORDER BY metric_id ASC")
            .await
            .map_err(backend)?;
        let rows: Vec<MetricRow> = take_rows(res)?;
        Ok(rows.into_iter().map(Metric::from).collect())
    }

    async fn upsert_control(&self, control: Control) -> StorageResult<()> {
        let key = control.id.clone();
        self.replace("controls", "control_id", key, ControlRow::from(control))
            .await
    }

    async fn list_controls(&self, filter: Option<&[String]>) -> StorageResult<Vec<Control>> {
        let res = match filter {
            Some(ids) => self
                .db
                .query("SELECT * FROM controls WHERE control_id IN $ids ORDER BY control_id ASC")
                .bind(("ids", ids.to_vec()))
                .await
                .map_err(backend)?,
            None => self
                .db
                .query("SELECT * FROM controls ORDER BY control_id ASC")
                .await
                .map_err(backend)?,
        };
        let rows: Vec<ControlRow> = take_rows(res)?;
        Ok(rows.into_iter().map(Control::from).collect())
    }

    async fn register_cloud_service(&self, service: CloudService) -> StorageResult<()> {
        let key = service.id.clone();
        self.replace(
            "cloud_services",
            "service_id",
            key,
            CloudServiceRow::from(service),
        )
        .await
    }

    async fn get_cloud_service(&self, service_id: &str) -> StorageResult<CloudService> {
        self.fetch_one::<CloudServiceRow>("cloud_services", "service_id", service_id)
            .await?
            .map(CloudService::from)
            .ok_or_else(|| StorageError::not_found("cloud service", service_id))
    }

    async fn list_cloud_services(&self) -> StorageResult<Vec<CloudService>> {
        let res = self
            .db
            .query("SELECT * FROM cloud_services ORDER BY service_id ASC")
            .await
            .map_err(backend)?;
        let rows: Vec<CloudServiceRow> = take_rows(res)?;
        Ok(rows.into_iter().map(CloudService::from).collect())
    }

    async fn save_metric_configuration(&self, config: MetricConfiguration) -> StorageResult<()> {
        self.db
            .query(
                "BEGIN TRANSACTION; \
                 DELETE metric_configurations WHERE service_id = $sid AND metric_id = $mid; \
                 CREATE metric_configurations CONTENT $row; \
                 COMMIT TRANSACTION;",
            )
            .bind(("sid", config.service_id.clone()))
            .bind(("mid", config.metric_id.clone()))
            .bind(("row", MetricConfigRow::from(config)))
            .await
            .and_then(|res| res.check())
            .map_err(backend)?;
        Ok(())
    }

    async fn get_metric_configuration(
        &self,
        service_id: &str,
        metric_id: &str,
    ) -> StorageResult<Option<MetricConfiguration>> {
        let res = self
            .db
            .query(
                "SELECT * FROM metric_configurations \
                 WHERE service_id = $sid AND metric_id = $mid LIMIT 1",
            )
            .bind(("sid", service_id.to_string()))
            .bind(("mid", metric_id.to_string()))
            .await
            .map_err(backend)?;
        let rows: Vec<MetricConfigRow> = take_rows(res)?;
        Ok(rows.into_iter().next().map(MetricConfiguration::from))
    }
}

// ---------------------------------------------------------------------------
// EvidenceStore
// ---------------------------------------------------------------------------

#[async_trait]
impl EvidenceStore for SurrealStore {
    #[instrument(skip(self, evidence), fields(evidence_id = %evidence.id))]
    async fn create_evidence(&self, evidence: Evidence) -> StorageResult<()> {
        if self
            .fetch_one::<EvidenceRow>("evidences", "evidence_id", &evidence.id)
            .await?
            .is_some()
        {
            return Err(StorageError::already_exists("evidence", &evidence.id));
        }

        let _created: Option<EvidenceRow> = self
            .db
            .create("evidences")
            .content(EvidenceRow::from(evidence))
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn get_evidence(&self, evidence_id: &str) -> StorageResult<Evidence> {
        self.fetch_one::<EvidenceRow>("evidences", "evidence_id", evidence_id)
            .await?
            .map(Evidence::from)
            .ok_or_else(|| StorageError::not_found("evidence", evidence_id))
    }

    async fn list_evidence(
        &self,
        service_id: &str,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<Evidence>> {
        let res = self
            .db
            .query(
                "SELECT * FROM evidences \
                 WHERE target_service = $sid AND gathered_at >= $since \
                 ORDER BY gathered_at DESC",
            )
            .bind(("sid", service_id.to_string()))
            .bind(("since", SurrealDatetime::from(since)))
            .await
            .map_err(backend)?;
        let rows: Vec<EvidenceRow> = take_rows(res)?;
        Ok(rows.into_iter().map(Evidence::from).collect())
    }
}

// ---------------------------------------------------------------------------
// EvaluationLedger
// ---------------------------------------------------------------------------

#[async_trait]
impl EvaluationLedger for SurrealStore {
    #[instrument(skip(self, result), fields(service_id = %result.service_id, metric_id = %result.metric_id))]
    async fn append_result(&self, result: EvaluationResult) -> StorageResult<()> {
        let _created: Option<EvaluationRow> = self
            .db
            .create("evaluation_results")
            .content(EvaluationRow::from(result))
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn latest_result(
        &self,
        service_id: &str,
        metric_id: &str,
    ) -> StorageResult<Option<EvaluationResult>> {
        let res = self
            .db
            .query(
                "SELECT * FROM evaluation_results \
                 WHERE service_id = $sid AND metric_id = $mid \
                 ORDER BY recorded_at DESC LIMIT 1",
            )
            .bind(("sid", service_id.to_string()))
            .bind(("mid", metric_id.to_string()))
            .await
            .map_err(backend)?;
        let rows: Vec<EvaluationRow> = take_rows(res)?;
        Ok(rows.into_iter().next().map(EvaluationResult::from))
    }

    #[instrument(skip(self, compliance), fields(service_id = %compliance.service_id, control_id = %compliance.control_id))]
    async fn append_compliance(&self, compliance: Compliance) -> StorageResult<()> {
        let _created: Option<ComplianceRow> = self
            .db
            .create("compliances")
            .content(ComplianceRow::from(compliance))
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn latest_compliance(
        &self,
        service_id: &str,
        control_id: &str,
    ) -> StorageResult<Option<Compliance>> {
        let res = self
            .db
            .query(
                "SELECT * FROM compliances \
                 WHERE service_id = $sid AND control_id = $cid \
                 ORDER BY recorded_at DESC LIMIT 1",
            )
            .bind(("sid", service_id.to_string()))
            .bind(("cid", control_id.to_string()))
            .await
            .map_err(backend)?;
        let rows: Vec<ComplianceRow> = take_rows(res)?;
        Ok(rows.into_iter().next().map(Compliance::from))
    }

    async fn list_compliance(
        &self,
        service_id: &str,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<Compliance>> {
        let res = self
            .db
            .query(
                "SELECT * FROM compliances \
                 WHERE service_id = $sid AND recorded_at >= $since \
                 ORDER BY recorded_at DESC",
            )
            .bind(("sid", service_id.to_string()))
            .bind(("since", SurrealDatetime::from(since)))
            .await
            .map_err(backend)?;
        let rows: Vec<ComplianceRow> = take_rows(res)?;
        Ok(rows.into_iter().map(Compliance::from).collect())
    }
}
