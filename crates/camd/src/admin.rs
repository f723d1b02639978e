//! Line-delimited JSON administrative protocol.
//!
//! Every request line is one tagged [`AdminRequest`]; every request gets
//! exactly one [`AdminResponse`] line back.

use std::sync::Arc;

use cam_core::{CamError, ConfigurationService, EvaluationService};
use cam_state::{CloudService, CollectionModule, MetricConfiguration, ServiceConfiguration};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Facades reachable over the admin listener.
pub struct Services {
    pub configuration: ConfigurationService,
    pub evaluation: EvaluationService,
}

/// Target value for one metric, as sent by administrative clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricTarget {
    pub operator: String,
    pub target_value: Value,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum AdminRequest {
    AddCollectionModule {
        module: CollectionModule,
    },
    ListCollectionModules,
    RemoveCollectionModule {
        module_id: String,
    },
    RegisterCloudService {
        service: CloudService,
    },
    ListCloudServices,
    ListControls,
    ListMetrics,
    ConfigureCloudService {
        service_id: String,
        configurations: Vec<ServiceConfiguration>,
    },
    ListCloudServiceConfigurations {
        service_id: String,
    },
    UpdateMetricConfiguration {
        service_id: String,
        metric_id: String,
        configuration: MetricTarget,
    },
    GetMetricConfiguration {
        service_id: String,
        metric_id: String,
    },
    StartMonitoring {
        service_id: String,
        control_ids: Vec<String>,
    },
    GetMonitoringStatus {
        service_id: String,
    },
    StopMonitoring {
        service_id: String,
    },
    GetEvidence {
        evidence_id: String,
    },
    ListEvidences {
        service_id: String,
        #[serde(default)]
        days: u32,
    },
    GetEvaluation {
        service_id: String,
        metric_id: String,
    },
    GetCompliance {
        service_id: String,
        control_id: String,
    },
    ListCompliance {
        service_id: String,
        #[serde(default)]
        days: u32,
    },
    CalculateCompliance {
        service_id: String,
        control_ids: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireError {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
}

impl AdminResponse {
    fn failure(code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(WireError {
                code: code.to_string(),
                message: message.into(),
            }),
        }
    }
}

fn respond<T: Serialize>(outcome: cam_core::Result<T>) -> AdminResponse {
    match outcome {
        Ok(value) => match serde_json::to_value(value) {
            Ok(result) => AdminResponse {
                ok: true,
                result: Some(result),
                error: None,
            },
            Err(e) => AdminResponse::failure("internal", e.to_string()),
        },
        Err(e) => err_response(&e),
    }
}

fn err_response(e: &CamError) -> AdminResponse {
    AdminResponse::failure(e.kind().code(), e.to_string())
}

pub async fn dispatch(services: &Services, request: AdminRequest) -> AdminResponse {
    let cfg = &services.configuration;
    let eval = &services.evaluation;

    match request {
        AdminRequest::AddCollectionModule { module } => {
            respond(cfg.add_collection_module(module).await)
        }
        AdminRequest::ListCollectionModules => respond(cfg.list_collection_modules().await),
        AdminRequest::RemoveCollectionModule { module_id } => {
            respond(cfg.remove_collection_module(&module_id).await)
        }
        AdminRequest::RegisterCloudService { service } => {
            respond(cfg.register_cloud_service(service).await)
        }
        AdminRequest::ListCloudServices => respond(cfg.list_cloud_services().await),
        AdminRequest::ListControls => respond(cfg.list_controls().await),
        AdminRequest::ListMetrics => respond(cfg.list_metrics().await),
        AdminRequest::ConfigureCloudService {
            service_id,
            configurations,
        } => respond(cfg.configure_cloud_service(&service_id, configurations).await),
        AdminRequest::ListCloudServiceConfigurations { service_id } => {
            respond(cfg.list_cloud_service_configurations(&service_id).await)
        }
        AdminRequest::UpdateMetricConfiguration {
            service_id,
            metric_id,
            configuration,
        } => {
            let config = MetricConfiguration {
                service_id: service_id.clone(),
                metric_id: metric_id.clone(),
                operator: configuration.operator,
                target_value: configuration.target_value,
                is_default: configuration.is_default,
                updated_at: Utc::now(),
            };
            let outcome = cfg
                .update_metric_configuration(&service_id, &metric_id, config)
                .await;
            respond(outcome)
        }
        AdminRequest::GetMetricConfiguration {
            service_id,
            metric_id,
        } => respond(cfg.get_metric_configuration(&service_id, &metric_id).await),
        AdminRequest::StartMonitoring {
            service_id,
            control_ids,
        } => respond(cfg.start_monitoring(&service_id, &control_ids).await),
        AdminRequest::GetMonitoringStatus { service_id } => {
            respond(cfg.monitoring_status(&service_id).await)
        }
        AdminRequest::StopMonitoring { service_id } => {
            respond(cfg.stop_monitoring(&service_id).await)
        }
        AdminRequest::GetEvidence { evidence_id } => {
            respond(eval.get_evidence(&evidence_id).await)
        }
        AdminRequest::ListEvidences { service_id, days } => {
            respond(eval.list_evidences(&service_id, days).await)
        }
        AdminRequest::GetEvaluation {
            service_id,
            metric_id,
        } => respond(eval.get_evaluation(&service_id, &metric_id).await),
        AdminRequest::GetCompliance {
            service_id,
            control_id,
        } => respond(eval.get_compliance(&service_id, &control_id).await),
        AdminRequest::ListCompliance { service_id, days } => {
            respond(eval.list_compliance(&service_id, days).await)
        }
        AdminRequest::CalculateCompliance {
            service_id,
            control_ids,
        } => respond(eval.calculate_compliance(&service_id, &control_ids).await),
    }
}

/// Decode one request line and dispatch it.
pub async fn handle_line(services: &Services, line: &[u8]) -> AdminResponse {
    match serde_json::from_slice::<AdminRequest>(line) {
        Ok(request) => {
            debug!(?request, "admin request");
            dispatch(services, request).await
        }
        Err(e) => AdminResponse::failure("invalid_argument", format!("malformed request: {e}")),
    }
}

async fn serve_connection<S>(services: &Services, stream: S) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }
        let line = buf.trim_ascii();
        if line.is_empty() {
            continue;
        }
        let response = handle_line(services, line).await;
        let mut out = serde_json::to_vec(&response)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        out.push(b'\n');
        writer.write_all(&out).await?;
    }
}

/// Accept admin connections until the task is dropped.
pub async fn serve(listener: TcpListener, services: Arc<Services>) {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "admin listener ready");
    }
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let services = Arc::clone(&services);
                tokio::spawn(async move {
                    if let Err(e) = serve_connection(&services, stream).await {
                        warn!(%peer, error = %e, "admin connection failed");
                    }
                });
            }
            Err(e) => error!(error = %e, "failed to accept admin connection"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cam_core::fakes::RecordingCollectionClient;
    use cam_core::{
        AggregatorConfig, ComplianceAggregator, MonitoringConfig, MonitoringScheduler,
    };
    use cam_state::fakes::{
        MemoryCatalog, MemoryEvaluationLedger, MemoryEvidenceStore, MemoryModuleRegistry,
    };
    use cam_state::{Catalog, Control};

    async fn services() -> Services {
        let catalog = Arc::new(MemoryCatalog::new());
        catalog
            .upsert_control(Control {
                id: "OPS-13".into(),
                name: "Transport security".into(),
                metric_ids: vec!["TlsVersion".into()],
            })
            .await
            .unwrap();
        let registry = Arc::new(MemoryModuleRegistry::new());
        let evidence = Arc::new(MemoryEvidenceStore::new());
        let ledger = Arc::new(MemoryEvaluationLedger::new());
        let scheduler = Arc::new(MonitoringScheduler::new(
            catalog.clone(),
            registry.clone(),
            Arc::new(RecordingCollectionClient::new()),
            MonitoringConfig::default(),
        ));
        let aggregator = ComplianceAggregator::new(
            catalog.clone(),
            evidence.clone(),
            ledger.clone(),
            AggregatorConfig::default(),
        );
        Services {
            configuration: ConfigurationService::new(catalog, registry, scheduler),
            evaluation: EvaluationService::new(evidence, ledger, aggregator),
        }
    }

    #[test]
    fn request_tag_is_snake_case_op() {
        let req: AdminRequest = serde_json::from_str(
            r#"{"op":"start_monitoring","service_id":"svc","control_ids":["OPS-13"]}"#,
        )
        .unwrap();
        assert!(matches!(req, AdminRequest::StartMonitoring { .. }));

        let req: AdminRequest =
            serde_json::from_str(r#"{"op":"list_evidences","service_id":"svc"}"#).unwrap();
        assert!(matches!(req, AdminRequest::ListEvidences { days: 0, .. }));
    }

    #[tokio::test]
    async fn start_and_status_round_trip() {
        let s = services().await;

        let resp = handle_line(
            &s,
            br#"{"op":"start_monitoring","service_id":"svc","control_ids":["OPS-13"]}"#,
        )
        .await;
        assert!(resp.ok, "{resp:?}");

        let resp = handle_line(&s, br#"{"op":"get_monitoring_status","service_id":"svc"}"#).await;
        let result = resp.result.unwrap();
        assert_eq!(result["service_id"], "svc");
        assert_eq!(result["control_ids"][0], "OPS-13");

        let resp = handle_line(
            &s,
            br#"{"op":"start_monitoring","service_id":"svc","control_ids":["OPS-13"]}"#,
        )
        .await;
        assert!(!resp.ok);
        assert_eq!(resp.error.unwrap().code, "already_exists");
    }

    #[tokio::test]
    async fn errors_carry_taxonomy_codes() {
        let s = services().await;

        let resp = handle_line(&s, br#"{"op":"stop_monitoring","service_id":"svc"}"#).await;
        assert_eq!(resp.error.unwrap().code, "not_found");

        let resp = handle_line(&s, br#"{"op":"list_evidences","service_id":""}"#).await;
        assert_eq!(resp.error.unwrap().code, "invalid_argument");

        let resp = handle_line(&s, b"not json").await;
        assert_eq!(resp.error.unwrap().code, "invalid_argument");
    }

    #[tokio::test]
    async fn list_compliance_empty_is_ok() {
        let s = services().await;
        let resp = handle_line(&s, br#"{"op":"list_compliance","service_id":"svc"}"#).await;
        assert!(resp.ok);
        assert_eq!(resp.result, Some(serde_json::json!([])));
    }

    #[tokio::test]
    async fn non_utf8_line_gets_an_error_response_and_connection_continues() {
        let s = services().await;
        let (client, server) = tokio::io::duplex(4096);
        let conn = async move { serve_connection(&s, server).await };
        let talk = async move {
            let (reader, mut writer) = tokio::io::split(client);
            writer.write_all(b"\xff\xfe garbage\n").await.unwrap();
            writer
                .write_all(b"{\"op\":\"list_compliance\",\"service_id\":\"svc\"}\n")
                .await
                .unwrap();
            writer.shutdown().await.unwrap();

            let mut lines = BufReader::new(reader).lines();
            let mut responses = Vec::new();
            while let Some(line) = lines.next_line().await.unwrap() {
                responses.push(serde_json::from_str::<AdminResponse>(&line).unwrap());
            }
            responses
        };

        let (served, responses) = tokio::join!(conn, talk);
        served.unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].error.as_ref().unwrap().code, "invalid_argument");
        assert!(responses[1].ok);
    }
}
