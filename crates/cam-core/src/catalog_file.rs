use anyhow::{Context, Result};
use cam_state::{Catalog, Control, Metric};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Metrics and controls loaded at daemon start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub metrics: Vec<Metric>,
    #[serde(default)]
    pub controls: Vec<Control>,
}

/// Read a JSON catalog file.
pub fn load_catalog(path: &Path) -> Result<CatalogFile> {
    let content = std::fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("parse catalog {:?}", path))
}

/// Upsert every metric and control of `file` into `catalog`.
pub async fn seed_catalog(catalog: &dyn Catalog, file: CatalogFile) -> Result<()> {
    let (metrics, controls) = (file.metrics.len(), file.controls.len());
    for metric in file.metrics {
        let id = metric.id.clone();
        catalog
            .upsert_metric(metric)
            .await
            .with_context(|| format!("upsert metric {id}"))?;
    }
    for control in file.controls {
        let id = control.id.clone();
        catalog
            .upsert_control(control)
            .await
            .with_context(|| format!("upsert control {id}"))?;
    }
    info!(metrics = metrics, controls = controls, "catalog seeded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cam_state::fakes::MemoryCatalog;

    #[tokio::test]
    async fn load_and_seed_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(
            &path,
            r#"{
                "metrics": [{"id": "TlsVersion", "name": "TLS version", "interval_secs": 60}],
                "controls": [{"id": "OPS-13", "name": "Transport", "metric_ids": ["TlsVersion"]}]
            }"#,
        )
        .unwrap();

        let file = load_catalog(&path).unwrap();
        let catalog = MemoryCatalog::new();
        seed_catalog(&catalog, file).await.unwrap();

        assert_eq!(catalog.get_metric("TlsVersion").await.unwrap().interval_secs, 60);
        let controls = catalog.list_controls(None).await.unwrap();
        assert_eq!(controls.len(), 1);
        assert!(controls[0].has_metric("TlsVersion"));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_catalog(Path::new("/nonexistent/catalog.json")).unwrap_err();
        assert!(format!("{err:#}").contains("catalog.json"));
    }
}
