//! Domain types shared by the scheduler, intake pipeline and aggregator.

pub mod error;
pub mod evidence;

pub use error::{CamError, ErrorKind, EvidenceValidationError, Result};
pub use evidence::{resource_types, validate_evidence};
