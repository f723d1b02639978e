//! cam-core: orchestration core for continuous compliance monitoring
//!
//! ## Key Components
//!
//! - `monitoring`: per-service scheduler triggering collection modules
//! - `intake`: evidence channel processing (validate, persist, forward)
//! - `aggregator`: debounced per-control compliance rollup
//! - `configuration` / `evaluation`: administrative facades
//! - `collection` / `assessment`: outbound collaborator contracts

pub mod aggregator;
pub mod assessment;
pub mod catalog_file;
pub mod collection;
pub mod configuration;
pub mod debounce;
pub mod domain;
pub mod evaluation;
pub mod fakes;
pub mod intake;
pub mod interval;
pub mod jobs;
pub mod metrics;
pub mod monitoring;
pub mod obs;
pub mod selector;
pub mod telemetry;

pub use aggregator::{AggregatorConfig, ComplianceAggregator, DEFAULT_THRESHOLD, DEFAULT_WINDOW};
pub use assessment::{
    AssessmentEngine, AssessmentRequest, AssessmentResult, AssessmentResultHook,
    HttpAssessmentEngine,
};
pub use catalog_file::{load_catalog, seed_catalog, CatalogFile};
pub use collection::{
    CollectionClient, HttpCollectionClient, StartCollectingRequest, StartCollectingResponse,
};
pub use configuration::ConfigurationService;
pub use domain::{CamError, ErrorKind, EvidenceValidationError, Result};
pub use evaluation::EvaluationService;
pub use intake::{ndjson_evidence, ChannelAborted, ChannelError, EvidenceIntake, IntakeSummary};
pub use interval::{resolve_interval, DEFAULT_INTERVAL};
pub use jobs::{JobAction, JobSet, TRIGGER_TAG};
pub use monitoring::{
    MonitoringConfig, MonitoringScheduler, MonitoringStatus, DEFAULT_EVAL_MANAGER_ADDRESS,
};
pub use selector::select_modules;
