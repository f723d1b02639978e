//! Evidence validation and resource type extraction.

use cam_state::Evidence;
use uuid::Uuid;

use super::error::EvidenceValidationError;

/// Validate an inbound evidence item.
///
/// Checks run in a fixed order so callers see the first failing field:
/// id, timestamp, target service, collection-time error, value presence,
/// value shape.
pub fn validate_evidence(ev: &Evidence) -> Result<(), EvidenceValidationError> {
    if Uuid::parse_str(&ev.id).is_err() {
        return Err(EvidenceValidationError::InvalidId(ev.id.clone()));
    }
    if ev.gathered_at.is_none() {
        return Err(EvidenceValidationError::MissingTimestamp);
    }
    if ev.target_service.is_empty() {
        return Err(EvidenceValidationError::MissingTargetService);
    }
    if let Some(err) = &ev.error {
        return Err(EvidenceValidationError::CarriesError {
            code: err.code.clone(),
            description: err.description.clone(),
        });
    }
    match &ev.value {
        None => Err(EvidenceValidationError::MissingValue),
        Some(v) if !v.is_object() => Err(EvidenceValidationError::ValueNotObject),
        Some(_) => Ok(()),
    }
}

/// Resource types declared in the evidence value's `type` array.
///
/// Intake does not need them; collection modules and assessment adapters
/// use this to label the resource an item describes. Evidence without a
/// value yields an empty list.
pub fn resource_types(ev: &Evidence) -> Result<Vec<String>, EvidenceValidationError> {
    let Some(value) = &ev.value else {
        return Ok(Vec::new());
    };
    let types = value
        .get("type")
        .and_then(|t| t.as_array())
        .filter(|t| !t.is_empty())
        .ok_or(EvidenceValidationError::MissingResourceTypes)?;

    types
        .iter()
        .enumerate()
        .map(|(i, t)| {
            t.as_str()
                .map(str::to_string)
                .ok_or(EvidenceValidationError::InvalidResourceType(i))
        })
        .collect()
}
