//! Collection module selection by metric responsibility.

use cam_state::{CollectionModule, ModuleRegistry};
use tracing::debug;

use crate::domain::Result;

/// Modules declaring at least one of `metric_ids`, in catalog order.
///
/// An empty result is not an error; a catalog read failure is.
pub async fn select_modules(
    registry: &dyn ModuleRegistry,
    metric_ids: &[String],
) -> Result<Vec<CollectionModule>> {
    let selected: Vec<CollectionModule> = registry
        .list_modules()
        .await?
        .into_iter()
        .filter(|m| m.serves_any(metric_ids))
        .collect();

    debug!(
        metrics = metric_ids.len(),
        selected = selected.len(),
        "selected collection modules"
    );
    Ok(selected)
}
