//! Recording fakes for the outbound collaborator contracts (testing only)

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::assessment::{AssessmentEngine, AssessmentRequest};
use crate::collection::{CollectionClient, StartCollectingRequest, StartCollectingResponse};
use crate::domain::{CamError, Result};

/// Records every start request as `(address, request)`.
#[derive(Debug, Default)]
pub struct RecordingCollectionClient {
    calls: Mutex<Vec<(String, StartCollectingRequest)>>,
    unreachable: AtomicBool,
}

impl RecordingCollectionClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `UpstreamUnavailable`.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<(String, StartCollectingRequest)> {
        self.calls
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    pub fn calls_to(&self, address: &str) -> usize {
        self.calls().iter().filter(|(a, _)| a == address).count()
    }
}

#[async_trait]
impl CollectionClient for RecordingCollectionClient {
    async fn start_collecting(
        &self,
        address: &str,
        request: StartCollectingRequest,
    ) -> Result<StartCollectingResponse> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((address.to_string(), request));
        }
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(CamError::UpstreamUnavailable(address.to_string()));
        }
        Ok(StartCollectingResponse {
            request_id: uuid::Uuid::new_v4().to_string(),
        })
    }

    async fn stop_collecting(&self, _address: &str, _request_id: &str) -> Result<()> {
        Err(CamError::NotImplemented("stop_collecting".into()))
    }
}

/// Counts submissions; never produces verdicts on its own.
#[derive(Debug, Default)]
pub struct RecordingAssessmentEngine {
    submitted: Mutex<Vec<AssessmentRequest>>,
    attempts: AtomicUsize,
    failing: AtomicBool,
}

impl RecordingAssessmentEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Successful submissions.
    pub fn submitted(&self) -> Vec<AssessmentRequest> {
        self.submitted
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// All submission attempts, failed ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssessmentEngine for RecordingAssessmentEngine {
    async fn submit(&self, request: AssessmentRequest) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(CamError::UpstreamUnavailable("assessment engine".into()));
        }
        if let Ok(mut submitted) = self.submitted.lock() {
            submitted.push(request);
        }
        Ok(())
    }
}
