//! Evidence listener: one TCP connection is one evidence channel.

use std::sync::Arc;

use cam_core::{ndjson_evidence, EvidenceIntake, IntakeSummary};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Final line written to the peer when its channel closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChannelStatus {
    Ok { summary: IntakeSummary },
    Error { code: String, message: String },
}

/// Drain one channel from `reader`, then report its status on `writer`.
pub async fn serve_channel<R, W>(
    intake: &EvidenceIntake,
    peer: &str,
    reader: R,
    mut writer: W,
) -> std::io::Result<ChannelStatus>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin,
{
    let channel = Box::pin(ndjson_evidence(BufReader::new(reader)));
    let status = match intake.process_channel(peer, channel).await {
        Ok(summary) => ChannelStatus::Ok { summary },
        Err(aborted) => ChannelStatus::Error {
            code: "unavailable".to_string(),
            message: aborted.to_string(),
        },
    };

    let mut line = serde_json::to_string(&status)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(status)
}

/// Accept evidence channels until the task is dropped.
pub async fn serve(listener: TcpListener, intake: Arc<EvidenceIntake>) {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "evidence listener ready");
    }
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let intake = Arc::clone(&intake);
                tokio::spawn(async move {
                    let peer = peer.to_string();
                    let (reader, writer) = stream.into_split();
                    if let Err(e) = serve_channel(&intake, &peer, reader, writer).await {
                        warn!(peer = %peer, error = %e, "could not report channel status");
                    }
                });
            }
            Err(e) => error!(error = %e, "failed to accept evidence connection"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cam_core::fakes::RecordingAssessmentEngine;
    use cam_state::fakes::MemoryEvidenceStore;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn evidence_line(id: &str) -> String {
        serde_json::json!({
            "id": id,
            "target_service": "svc",
            "tool_id": "commsec",
            "gathered_at": "2024-05-01T10:00:00Z",
            "value": {"type": ["TransportEncryption"]}
        })
        .to_string()
    }

    #[tokio::test]
    async fn in_memory_channel_reports_summary() {
        let store = Arc::new(MemoryEvidenceStore::new());
        let intake = EvidenceIntake::new(store.clone(), Arc::new(RecordingAssessmentEngine::new()));
        let input = format!(
            "{}\n{{oops\n",
            evidence_line(&uuid::Uuid::new_v4().to_string())
        );
        let mut out = Vec::new();

        let status = serve_channel(&intake, "test", input.as_bytes(), &mut out)
            .await
            .unwrap();
        let ChannelStatus::Ok { summary } = status else {
            panic!("expected ok status");
        };
        assert_eq!(summary.stored, 1);
        assert_eq!(summary.dropped, 1);

        let written = String::from_utf8(out).unwrap();
        assert!(written.starts_with(r#"{"status":"ok","summary":"#));
        assert!(written.ends_with('\n'));
    }

    #[tokio::test]
    async fn tcp_channel_round_trip() {
        let store = Arc::new(MemoryEvidenceStore::new());
        let intake = Arc::new(EvidenceIntake::new(
            store.clone(),
            Arc::new(RecordingAssessmentEngine::new()),
        ));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve(listener, intake));

        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        for _ in 0..3 {
            let line = evidence_line(&uuid::Uuid::new_v4().to_string());
            writer.write_all(line.as_bytes()).await.unwrap();
            writer.write_all(b"\n").await.unwrap();
        }
        writer.shutdown().await.unwrap();

        let mut lines = tokio::io::BufReader::new(reader).lines();
        let status_line = lines.next_line().await.unwrap().unwrap();
        let status: ChannelStatus = serde_json::from_str(&status_line).unwrap();
        match status {
            ChannelStatus::Ok { summary } => assert_eq!(summary.forwarded, 3),
            other => panic!("unexpected status: {other:?}"),
        }
        assert_eq!(store.len(), 3);
        server.abort();
    }
}
