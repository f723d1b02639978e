//! Collection period resolution from metric intervals.

use std::time::Duration;

use cam_state::Catalog;
use tracing::{debug, warn};

/// Default collection period when no metric declares one.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);

/// Smallest positive interval declared by `metric_ids`, or `default`.
///
/// Unknown metrics and lookup failures are logged and skipped; they never
/// fail resolution of the other ids.
pub async fn resolve_interval(
    catalog: &dyn Catalog,
    metric_ids: &[String],
    default: Duration,
) -> Duration {
    let mut min_secs: Option<u64> = None;

    for metric_id in metric_ids {
        let metric = match catalog.get_metric(metric_id).await {
            Ok(m) => m,
            Err(e) => {
                warn!(metric_id = %metric_id, error = %e, "could not look up metric interval");
                continue;
            }
        };
        if metric.interval_secs <= 0 {
            continue;
        }
        let secs = metric.interval_secs as u64;
        min_secs = Some(min_secs.map_or(secs, |cur| cur.min(secs)));
    }

    let resolved = min_secs.map_or(default, Duration::from_secs);
    debug!(
        metrics = metric_ids.len(),
        period_secs = resolved.as_secs(),
        "resolved collection interval"
    );
    resolved
}
