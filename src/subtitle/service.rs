//! Subtitle Extraction Service

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::events::{BridgeEvent, EventBus};
use crate::metrics::Metrics;
use crate::protocol::{SubtitleData, SubtitleResult};
use crate::subtitle::ExtractError;

/// An in-flight extraction request awaiting its reply.
///
/// Removal from the pending map is the single commit point: whichever of
/// response handling or timeout removes the entry first settles the caller,
/// and the other side becomes a no-op.
struct PendingEntry {
    tx: oneshot::Sender<Result<SubtitleData, ExtractError>>,
    issued_at: Instant,
}

/// Correlates extraction requests with the results the extension reports.
///
/// All mutations of the pending map are serialized by its mutex; the lock is
/// never held across an await. This is a required invariant, not an
/// incidental property of the runtime.
pub struct SubtitleService {
    events: EventBus,
    metrics: Arc<Metrics>,
    pending: Mutex<HashMap<String, PendingEntry>>,
}

impl SubtitleService {
    /// Create a new SubtitleService
    pub fn new(events: EventBus, metrics: Arc<Metrics>) -> Self {
        Self {
            events,
            metrics,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Issue an extraction request and await its result.
    ///
    /// Mints a fresh request identifier, registers a pending entry, and
    /// publishes the request on the event bus. Settles exactly once: with
    /// the extension's result, or with `Timeout` once `timeout` elapses.
    pub async fn extract(
        &self,
        video_url: &str,
        timeout: Duration,
    ) -> Result<SubtitleData, ExtractError> {
        let request_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = self.pending.lock().await;
            pending.insert(
                request_id.clone(),
                PendingEntry {
                    tx,
                    issued_at: Instant::now(),
                },
            );
        }

        self.metrics.record_request_issued();
        debug!(
            "Issued extraction request {} for {} (timeout: {:?})",
            request_id, video_url, timeout
        );

        self.events.publish(BridgeEvent::ExtractionRequested {
            request_id: request_id.clone(),
            video_url: video_url.to_string(),
        });

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => {
                // Entry dropped without settling; only happens if the service
                // is torn down while the request is in flight
                error!("Pending entry for request {} dropped unsettled", request_id);
                Err(ExtractError::Protocol(
                    "request dropped before completion".to_string(),
                ))
            }
            Err(_) => {
                let removed = self.pending.lock().await.remove(&request_id);
                if removed.is_some() {
                    self.metrics.record_request_timed_out();
                    warn!(
                        "Extraction request {} timed out after {:?}",
                        request_id, timeout
                    );
                }
                Err(ExtractError::Timeout(timeout))
            }
        }
    }

    /// Settle the caller matching a result reported by the extension.
    ///
    /// Results for unknown or already-settled identifiers are logged and
    /// ignored; a late reply racing a timeout is expected, not a fault.
    pub async fn handle_result(&self, result: SubtitleResult) {
        let entry = self.pending.lock().await.remove(&result.request_id);

        let Some(entry) = entry else {
            warn!(
                "Received result for unknown or already-settled request {}",
                result.request_id
            );
            return;
        };

        let elapsed = entry.issued_at.elapsed();

        let outcome = if let Some(message) = result.error {
            self.metrics.record_request_failed();
            error!(
                "Extraction request {} failed after {:?}: {}",
                result.request_id, elapsed, message
            );
            Err(ExtractError::Remote(message))
        } else if let Some(data) = result.data {
            self.metrics.record_request_resolved();
            info!(
                "Extraction request {} resolved after {:?}: {}",
                result.request_id, elapsed, data.title
            );
            Ok(data)
        } else {
            self.metrics.record_request_failed();
            warn!(
                "Extraction request {} returned neither data nor error",
                result.request_id
            );
            Err(ExtractError::Protocol("unknown response format".to_string()))
        };

        if entry.tx.send(outcome).is_err() {
            debug!(
                "Caller for request {} is no longer waiting",
                result.request_id
            );
        }
    }

    /// Number of in-flight extraction requests
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Consume extraction results from the event bus until it closes
    pub fn spawn_listener(self: Arc<Self>) -> JoinHandle<()> {
        let mut events_rx = self.events.subscribe();

        tokio::spawn(async move {
            loop {
                match events_rx.recv().await {
                    Ok(BridgeEvent::ResultReceived(result)) => {
                        self.handle_result(result).await;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Result listener lagged, skipped {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            debug!("Result listener stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TranscriptItem;

    fn test_service() -> Arc<SubtitleService> {
        Arc::new(SubtitleService::new(
            EventBus::default(),
            Arc::new(Metrics::new()),
        ))
    }

    fn success_result(request_id: &str, title: &str) -> SubtitleResult {
        SubtitleResult {
            request_id: request_id.to_string(),
            data: Some(SubtitleData {
                title: title.to_string(),
                author: "author".to_string(),
                url: "https://www.bilibili.com/video/BV1xx411c7mD".to_string(),
                ctime: 1_700_000_000,
                subtitles: vec![TranscriptItem {
                    from: 0.0,
                    to: 1.5,
                    content: "hello".to_string(),
                }],
            }),
            error: None,
        }
    }

    /// Extract the freshly minted request id by watching the event bus
    async fn issued_request_id(rx: &mut broadcast::Receiver<BridgeEvent>) -> String {
        loop {
            match rx.recv().await.unwrap() {
                BridgeEvent::ExtractionRequested { request_id, .. } => return request_id,
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn test_result_for_unknown_request_is_ignored() {
        let service = test_service();

        service.handle_result(success_result("no-such-id", "t")).await;

        assert_eq!(service.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_extract_resolves_with_matching_result() {
        let service = test_service();
        let mut events_rx = service.events.subscribe();

        let task = {
            let service = Arc::clone(&service);
            tokio::spawn(
                async move { service.extract("url", Duration::from_secs(1)).await },
            )
        };

        let request_id = issued_request_id(&mut events_rx).await;
        service
            .handle_result(success_result(&request_id, "the title"))
            .await;

        let data = task.await.unwrap().unwrap();
        assert_eq!(data.title, "the title");
        assert_eq!(service.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_extract_rejects_on_remote_error() {
        let service = test_service();
        let mut events_rx = service.events.subscribe();

        let task = {
            let service = Arc::clone(&service);
            tokio::spawn(
                async move { service.extract("url", Duration::from_secs(1)).await },
            )
        };

        let request_id = issued_request_id(&mut events_rx).await;
        service
            .handle_result(SubtitleResult {
                request_id,
                data: None,
                error: Some("video has no subtitles".to_string()),
            })
            .await;

        match task.await.unwrap() {
            Err(ExtractError::Remote(message)) => {
                assert_eq!(message, "video has no subtitles");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_result_with_neither_field_is_a_protocol_error() {
        let service = test_service();
        let mut events_rx = service.events.subscribe();

        let task = {
            let service = Arc::clone(&service);
            tokio::spawn(
                async move { service.extract("url", Duration::from_secs(1)).await },
            )
        };

        let request_id = issued_request_id(&mut events_rx).await;
        service
            .handle_result(SubtitleResult {
                request_id,
                data: None,
                error: None,
            })
            .await;

        match task.await.unwrap() {
            Err(ExtractError::Protocol(message)) => {
                assert!(message.contains("unknown response format"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_extract_times_out_and_late_result_is_a_noop() {
        let service = test_service();
        let mut events_rx = service.events.subscribe();

        let task = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.extract("url", Duration::from_millis(50)).await })
        };

        let request_id = issued_request_id(&mut events_rx).await;

        match task.await.unwrap() {
            Err(ExtractError::Timeout(timeout)) => {
                assert_eq!(timeout, Duration::from_millis(50));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(service.pending_count().await, 0);

        // Late reply after the timeout already rejected the caller
        service
            .handle_result(success_result(&request_id, "too late"))
            .await;
        assert_eq!(service.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_requests_resolve_independently() {
        let service = test_service();
        let mut events_rx = service.events.subscribe();

        let task_a = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.extract("url-a", Duration::from_secs(1)).await })
        };
        let id_a = issued_request_id(&mut events_rx).await;

        let task_b = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.extract("url-b", Duration::from_secs(1)).await })
        };
        let id_b = issued_request_id(&mut events_rx).await;

        assert_ne!(id_a, id_b);
        assert_eq!(service.pending_count().await, 2);

        // Deliver out of order: B first, then A
        service.handle_result(success_result(&id_b, "title b")).await;
        service.handle_result(success_result(&id_a, "title a")).await;

        assert_eq!(task_a.await.unwrap().unwrap().title, "title a");
        assert_eq!(task_b.await.unwrap().unwrap().title, "title b");
        assert_eq!(service.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_listener_routes_bus_results() {
        let service = test_service();
        let events = service.events.clone();
        Arc::clone(&service).spawn_listener();

        let mut events_rx = events.subscribe();
        let task = {
            let service = Arc::clone(&service);
            tokio::spawn(
                async move { service.extract("url", Duration::from_secs(1)).await },
            )
        };

        let request_id = issued_request_id(&mut events_rx).await;
        events.publish(BridgeEvent::ResultReceived(success_result(
            &request_id,
            "via bus",
        )));

        assert_eq!(task.await.unwrap().unwrap().title, "via bus");
    }
}
