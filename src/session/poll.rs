use std::time::Duration;

use tracing::debug;

use crate::models::{ClientMessage, PollResponse};
use crate::session::{SessionError, SessionHandle, SessionSettings};

impl SessionHandle {
    /// Process one synchronous request/response exchange.
    ///
    /// `getSince` long-polls for up to `durationMs`, capped by the
    /// configured maximum. Subscriptions need a streaming connection and are
    /// answered with an error.
    pub async fn serve_poll(
        &self,
        request: ClientMessage,
        settings: &SessionSettings,
    ) -> Result<PollResponse, SessionError> {
        match request {
            ClientMessage::Append(req) => {
                let accepted = self.append(req.ops).await?;
                Ok(PollResponse::ops(accepted))
            }
            ClientMessage::GetSince(req) => {
                let limit = req.limit.unwrap_or(settings.batch_limit).min(settings.batch_limit);
                let wait = Duration::from_millis(req.duration_ms.unwrap_or(0)).min(settings.max_poll_wait);
                debug!(parent: self.span(), "Poll from version {} (wait {:?})", req.version, wait);
                let ops = self.wait_since(req.version, limit, wait).await?;
                Ok(PollResponse::ops(ops))
            }
            ClientMessage::Subscribe(_) => Ok(PollResponse::error(
                "subscribe requires a streaming connection",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemStorage;
    use crate::models::{AppendRequest, GetSinceRequest, Operation, SubscribeRequest};
    use serde_json::json;
    use std::sync::Arc;
    use tracing::Span;

    fn session() -> SessionHandle {
        SessionHandle::new("doc", Arc::new(MemStorage::new()), Span::none())
    }

    #[tokio::test]
    async fn append_then_get_since() {
        let session = session();
        let settings = SessionSettings::default();

        let appended = session
            .serve_poll(
                ClientMessage::Append(AppendRequest {
                    ops: vec![Operation::new("a", json!(1)), Operation::new("b", json!(2))],
                }),
                &settings,
            )
            .await
            .unwrap();
        assert_eq!(appended.ops.len(), 2);
        assert!(appended.error.is_none());

        let read = session
            .serve_poll(
                ClientMessage::GetSince(GetSinceRequest { version: 1, limit: None, duration_ms: None }),
                &settings,
            )
            .await
            .unwrap();
        assert_eq!(read.ops.len(), 1);
        assert_eq!(read.ops[0].id, "b");
    }

    #[tokio::test]
    async fn long_poll_is_capped_by_settings() {
        let session = session();
        let settings = SessionSettings {
            max_poll_wait: Duration::from_millis(20),
            ..SessionSettings::default()
        };

        let started = std::time::Instant::now();
        let read = session
            .serve_poll(
                ClientMessage::GetSince(GetSinceRequest {
                    version: 0,
                    limit: Some(10),
                    duration_ms: Some(60_000),
                }),
                &settings,
            )
            .await
            .unwrap();
        assert!(read.ops.is_empty());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn subscribe_is_rejected() {
        let response = session()
            .serve_poll(
                ClientMessage::Subscribe(SubscribeRequest { version: 0 }),
                &SessionSettings::default(),
            )
            .await
            .unwrap();
        assert!(response.error.is_some());
    }
}
