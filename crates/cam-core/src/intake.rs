//! Evidence intake pipeline.
//!
//! One inbound channel carries a sequence of evidence items. Items are
//! handled strictly in arrival order: validated, persisted, and forwarded to
//! the assessment engine unless they report a collection-time error. A bad
//! item never aborts the channel; a transport failure does.

use std::sync::Arc;

use cam_state::{Evidence, EvidenceStore};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, error, info, instrument};

use crate::assessment::{AssessmentEngine, AssessmentRequest};
use crate::domain::{validate_evidence, EvidenceValidationError};
use crate::metrics::METRICS;
use crate::obs;

/// Failure to receive the next item from a channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The item arrived but could not be decoded; it is dropped.
    #[error("malformed evidence record: {0}")]
    Decode(String),

    /// The transport failed; the channel is aborted.
    #[error("evidence channel transport failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-channel counters reported back to the peer on close.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeSummary {
    pub received: u64,
    pub stored: u64,
    pub forwarded: u64,
    pub dropped: u64,
    pub failed: u64,
}

/// The channel was aborted by a transport failure. Items processed before
/// the failure remain persisted.
#[derive(Debug, thiserror::Error)]
#[error("evidence channel aborted after {} items: {source}", summary.received)]
pub struct ChannelAborted {
    pub summary: IntakeSummary,
    #[source]
    pub source: std::io::Error,
}

pub struct EvidenceIntake {
    store: Arc<dyn EvidenceStore>,
    engine: Arc<dyn AssessmentEngine>,
}

impl EvidenceIntake {
    pub fn new(store: Arc<dyn EvidenceStore>, engine: Arc<dyn AssessmentEngine>) -> Self {
        Self { store, engine }
    }

    /// Drain one channel until the peer closes it or the transport fails.
    #[instrument(skip_all, fields(peer = %peer))]
    pub async fn process_channel<S>(
        &self,
        peer: &str,
        mut channel: S,
    ) -> Result<IntakeSummary, ChannelAborted>
    where
        S: Stream<Item = Result<Evidence, ChannelError>> + Unpin + Send,
    {
        let mut summary = IntakeSummary::default();

        while let Some(next) = channel.next().await {
            match next {
                Ok(evidence) => self.process_item(evidence, &mut summary).await,
                Err(ChannelError::Decode(reason)) => {
                    summary.received += 1;
                    summary.dropped += 1;
                    METRICS.inc_evidence_received();
                    METRICS.inc_evidence_dropped();
                    obs::emit_evidence_dropped("<undecodable>", &reason);
                }
                Err(ChannelError::Io(source)) => {
                    error!(error = %source, "evidence channel failed");
                    return Err(ChannelAborted { summary, source });
                }
            }
        }

        info!(
            received = summary.received,
            stored = summary.stored,
            forwarded = summary.forwarded,
            dropped = summary.dropped,
            failed = summary.failed,
            "evidence channel closed"
        );
        Ok(summary)
    }

    async fn process_item(&self, evidence: Evidence, summary: &mut IntakeSummary) {
        summary.received += 1;
        METRICS.inc_evidence_received();
        debug!(evidence_id = %evidence.id, tool_id = %evidence.tool_id, "received evidence");

        let forward = match validate_evidence(&evidence) {
            Ok(()) => true,
            Err(EvidenceValidationError::CarriesError { code, .. }) => {
                debug!(evidence_id = %evidence.id, code = %code, "evidence carries an error, not assessed");
                false
            }
            Err(reason) => {
                summary.dropped += 1;
                METRICS.inc_evidence_dropped();
                obs::emit_evidence_dropped(&evidence.id, &reason);
                return;
            }
        };

        let request = forward.then(|| AssessmentRequest {
            evidence_id: evidence.id.clone(),
            service_id: evidence.target_service.clone(),
            tool_id: evidence.tool_id.clone(),
            timestamp: evidence.gathered_at.unwrap_or_default(),
            raw_evidence: evidence.raw_evidence.clone(),
            resource: evidence.value.clone().unwrap_or_default(),
        });
        let evidence_id = evidence.id.clone();
        let service_id = evidence.target_service.clone();

        if let Err(e) = self.store.create_evidence(evidence).await {
            summary.failed += 1;
            error!(evidence_id = %evidence_id, error = %e, "could not store evidence");
            return;
        }
        summary.stored += 1;

        let Some(request) = request else {
            obs::emit_evidence_received(&evidence_id, &service_id, false);
            return;
        };

        match self.engine.submit(request).await {
            Ok(()) => {
                summary.forwarded += 1;
                METRICS.inc_evidence_forwarded();
                obs::emit_evidence_received(&evidence_id, &service_id, true);
            }
            Err(e) => {
                error!(evidence_id = %evidence_id, error = %e, "could not submit evidence for assessment");
            }
        }
    }
}

/// Decode newline-delimited JSON evidence records from `reader`.
///
/// Blank lines are skipped. A line that is not a JSON evidence record,
/// including one that is not UTF-8, yields `ChannelError::Decode`. End of
/// input ends the stream cleanly; only read failures yield `ChannelError::Io`.
pub fn ndjson_evidence<R>(reader: R) -> impl Stream<Item = Result<Evidence, ChannelError>>
where
    R: AsyncBufRead + Unpin + Send,
{
    futures::stream::unfold(Some(reader), |state| async move {
        let mut reader = state?;
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => return None,
                Ok(_) if buf.trim_ascii().is_empty() => continue,
                Ok(_) => {
                    let item = serde_json::from_slice::<Evidence>(buf.trim_ascii())
                        .map_err(|e| ChannelError::Decode(e.to_string()));
                    return Some((item, Some(reader)));
                }
                Err(e) => return Some((Err(ChannelError::Io(e)), None)),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ndjson_skips_blank_lines_and_flags_garbage() {
        let input = b"{\"id\":\"a\"}\n\n not json \n{\"id\":\"b\"}\n";
        let items: Vec<_> = ndjson_evidence(&input[..]).collect().await;
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().unwrap().id, "a");
        assert!(matches!(items[1], Err(ChannelError::Decode(_))));
        assert_eq!(items[2].as_ref().unwrap().id, "b");
    }

    #[tokio::test]
    async fn ndjson_drops_non_utf8_line_and_keeps_reading() {
        let input = b"{\"id\":\"a\"}\n\xff\xfe garbage\n{\"id\":\"b\"}";
        let items: Vec<_> = ndjson_evidence(&input[..]).collect().await;
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().unwrap().id, "a");
        assert!(matches!(items[1], Err(ChannelError::Decode(_))));
        assert_eq!(items[2].as_ref().unwrap().id, "b");
    }
}
