//! cam-state: persistence layer for continuous compliance monitoring
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: entity shapes, storage seams, and append-only evaluation history.
//!
//! ## Key Components
//!
//! - `storage_traits`: `ModuleRegistry`, `Catalog`, `EvidenceStore`, `EvaluationLedger`
//! - `fakes`: in-memory implementations for tests and embedded use
//! - `SurrealStore`: SurrealDB implementation of all four traits

mod config;
mod error;
pub mod fakes;
pub mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_store;

pub use config::{StoreConfig, LOCAL_DB_PATH};
pub use error::{StateError, StorageError};
pub use storage_traits::{
    Catalog, CloudService, CollectionModule, Compliance, Control, EvaluationLedger,
    EvaluationResult, Evidence, EvidenceError, EvidenceStore, Metric, MetricConfiguration,
    ModuleRegistry, ServiceConfiguration, StorageResult,
};
pub use surreal_store::SurrealStore;

/// Result type for cam-state connection and setup operations
pub type Result<T> = std::result::Result<T, StateError>;
