//! Collection module contract and its HTTP adapter.
//!
//! The scheduler only needs "ask this module to start collecting for this
//! service"; the module streams evidence back on its own.

use async_trait::async_trait;
use cam_state::ServiceConfiguration;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::domain::{CamError, Result};

/// Request sent to a collection module once per scheduled tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartCollectingRequest {
    pub service_id: String,
    /// Address the module must stream evidence to
    pub eval_manager: String,
    pub configuration: Option<ServiceConfiguration>,
}

impl StartCollectingRequest {
    /// Checks a module applies before accepting the request.
    ///
    /// [`HttpCollectionClient`] runs them before posting, so a request the
    /// module would reject never leaves the process.
    pub fn validate(&self) -> Result<()> {
        if self.service_id.is_empty() {
            return Err(CamError::validation("serviceID is missing"));
        }
        if Uuid::parse_str(&self.service_id).is_err() {
            return Err(CamError::validation("serviceID is invalid"));
        }
        if self.eval_manager.is_empty() {
            return Err(CamError::validation("evaluation manager URL is missing"));
        }
        let config = self
            .configuration
            .as_ref()
            .ok_or_else(|| CamError::validation("service configuration is missing"))?;
        if config.service_id != self.service_id {
            return Err(CamError::validation(
                "serviceID in service configuration is invalid",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartCollectingResponse {
    pub request_id: String,
}

/// Outbound calls to a collection module at `address`.
#[async_trait]
pub trait CollectionClient: Send + Sync {
    async fn start_collecting(
        &self,
        address: &str,
        request: StartCollectingRequest,
    ) -> Result<StartCollectingResponse>;

    /// Modules may answer with [`CamError::NotImplemented`].
    async fn stop_collecting(&self, address: &str, request_id: &str) -> Result<()>;
}

/// JSON-over-HTTP collection client.
///
/// Posts to `http://{address}/v1/collection/start` and `/v1/collection/stop`.
#[derive(Clone)]
pub struct HttpCollectionClient {
    http: reqwest::Client,
}

impl HttpCollectionClient {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("cam-core/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CamError::UpstreamUnavailable(format!("http client: {e}")))?;
        Ok(Self { http })
    }

    fn url(address: &str, path: &str) -> String {
        if address.starts_with("http://") || address.starts_with("https://") {
            format!("{}{}", address.trim_end_matches('/'), path)
        } else {
            format!("http://{}{}", address, path)
        }
    }
}

fn upstream_err(address: &str, err: reqwest::Error) -> CamError {
    CamError::UpstreamUnavailable(format!("collection module {address}: {err}"))
}

#[async_trait]
impl CollectionClient for HttpCollectionClient {
    async fn start_collecting(
        &self,
        address: &str,
        request: StartCollectingRequest,
    ) -> Result<StartCollectingResponse> {
        request.validate()?;
        let url = Self::url(address, "/v1/collection/start");
        debug!(url = %url, service_id = %request.service_id, "start collecting");

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| upstream_err(address, e))?;

        match response.status() {
            StatusCode::BAD_REQUEST => {
                let body = response.text().await.unwrap_or_default();
                Err(CamError::Validation(body))
            }
            s if !s.is_success() => Err(CamError::UpstreamUnavailable(format!(
                "collection module {address} answered {s}"
            ))),
            _ => response
                .json::<StartCollectingResponse>()
                .await
                .map_err(|e| upstream_err(address, e)),
        }
    }

    async fn stop_collecting(&self, address: &str, request_id: &str) -> Result<()> {
        let url = Self::url(address, "/v1/collection/stop");
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "request_id": request_id }))
            .send()
            .await
            .map_err(|e| upstream_err(address, e))?;

        match response.status() {
            StatusCode::NOT_IMPLEMENTED => Err(CamError::NotImplemented(format!(
                "stop collecting at {address}"
            ))),
            s if !s.is_success() => Err(CamError::UpstreamUnavailable(format!(
                "collection module {address} answered {s}"
            ))),
            _ => Ok(()),
        }
    }
}
