// Notifier Batcher
//
// Collects job events per route (receiver + auth token) and flushes
// one batched message per route on a fixed interval. Delivery is at
// most once: a failed send drops the batch and reports it on the error
// channel instead of re-queueing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use metrics::counter;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::application::shutdown::ShutdownToken;
use crate::domain::{BatchMessage, JobEvent, JobEventType, Route};
use crate::metrics::names;
use crate::port::NotifyTransport;

/// Literal standing in for the auth token in error reports.
pub const REDACTED_TOKEN: &str = "*redacted*";

#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// How often queued events are flushed.
    pub event_batch_interval: Duration,
    /// Per-breach blocks one SLA-miss event may expand into.
    pub max_sla_events_per_message: usize,
    /// Bound of the error channel handed to the caller.
    pub error_channel_capacity: usize,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            event_batch_interval: Duration::from_secs(5),
            max_sla_events_per_message: 6,
            error_channel_capacity: 16,
        }
    }
}

/// A batch that could not be delivered. The auth token is replaced
/// before the report leaves the notifier.
#[derive(Debug, Clone)]
pub struct NotifyError {
    pub receiver: String,
    pub auth_token: String,
    pub reason: String,
    pub dropped: Vec<JobEvent>,
}

pub struct Notifier {
    transport: Arc<dyn NotifyTransport>,
    queues: Mutex<HashMap<Route, Vec<JobEvent>>>,
    errors: mpsc::Sender<NotifyError>,
    config: NotifyConfig,
}

impl Notifier {
    /// Build a notifier and the receiving half of its error channel.
    pub fn new(
        transport: Arc<dyn NotifyTransport>,
        config: NotifyConfig,
    ) -> (Arc<Self>, mpsc::Receiver<NotifyError>) {
        let (errors, error_rx) = mpsc::channel(config.error_channel_capacity.max(1));
        let notifier =
            Arc::new(Self { transport, queues: Mutex::new(HashMap::new()), errors, config });
        (notifier, error_rx)
    }

    /// Append one event to its route's queue. Arrival order within a
    /// route is preserved through to the rendered batch.
    pub fn queue(&self, route: Route, event: JobEvent) {
        debug!(route = ?route, job = %event.job_name, kind = %event.event_type, "event queued");
        self.queues.lock().expect("lock poisoned").entry(route).or_default().push(event);
    }

    /// Number of events currently queued across all routes.
    pub fn pending(&self) -> usize {
        self.queues.lock().expect("lock poisoned").values().map(Vec::len).sum()
    }

    /// Run the flush loop until shutdown; flushes once more on the way
    /// out so queued events are not lost to a clean stop.
    pub async fn run(self: Arc<Self>, mut shutdown: ShutdownToken) {
        info!(
            interval_ms = self.config.event_batch_interval.as_millis() as u64,
            "notifier worker started"
        );
        let mut tick = interval(self.config.event_batch_interval);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.flush().await;
                }
                _ = shutdown.wait() => {
                    self.flush().await;
                    break;
                }
            }
        }
        info!("notifier worker stopped");
    }

    /// Spawn the flush loop on the runtime.
    pub fn spawn_worker(self: &Arc<Self>, shutdown: ShutdownToken) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run(shutdown))
    }

    /// Snapshot-and-clear every queue under the lock, then deliver the
    /// batches outside it. Routes are flushed in receiver order so the
    /// emission sequence is stable.
    pub async fn flush(&self) {
        let mut batches: Vec<(Route, Vec<JobEvent>)> = {
            let mut queues = self.queues.lock().expect("lock poisoned");
            queues.drain().collect()
        };
        batches.sort_by_key(|(route, _)| route.receiver.to_string());

        for (route, events) in batches {
            if events.is_empty() {
                continue;
            }
            let message = self.render_batch(&events);
            match self.transport.send(&route, &message).await {
                Ok(()) => {
                    counter!(names::NOTIFY_BATCHES_TOTAL).increment(1);
                    debug!(route = ?route, events = events.len(), "batch delivered");
                }
                Err(error) => {
                    counter!(names::NOTIFY_EVENTS_DROPPED_TOTAL).increment(events.len() as u64);
                    warn!(route = ?route, error = %error, dropped = events.len(), "batch dropped");
                    let report = NotifyError {
                        receiver: route.receiver.to_string(),
                        auth_token: REDACTED_TOKEN.to_string(),
                        reason: error.to_string(),
                        dropped: events,
                    };
                    if self.errors.try_send(report).is_err() {
                        warn!("notify error channel full or closed, report discarded");
                    }
                }
            }
        }
    }

    /// One block per event; an SLA miss expands into per-breach blocks,
    /// truncated past the configured cap.
    fn render_batch(&self, events: &[JobEvent]) -> BatchMessage {
        let mut blocks = Vec::new();
        for event in events {
            blocks.push(format!(
                "[{}] {}/{}/{}",
                event.event_type, event.project, event.namespace, event.job_name
            ));
            if event.event_type == JobEventType::SlaMiss {
                let breaches = event.sla_breaches();
                let cap = self.config.max_sla_events_per_message;
                for breach in breaches.iter().take(cap) {
                    blocks.push(format!("  sla breach: {}", breach));
                }
                if breaches.len() > cap {
                    blocks.push(format!("  + {} more breaches", breaches.len() - cap));
                }
            } else if let Some(message) = event.attributes.get("message").and_then(|m| m.as_str())
            {
                blocks.push(format!("  {}", message));
            }
        }
        BatchMessage { blocks }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::shutdown::shutdown_channel;
    use crate::domain::Receiver;
    use crate::port::notify_transport::mocks::RecordingTransport;

    fn route(channel: &str) -> Route {
        Route::new(Receiver::Channel(channel.to_string()), "xoxb-token")
    }

    fn event(job: &str, kind: JobEventType) -> JobEvent {
        JobEvent::new("sales", "core", job, kind)
    }

    fn notifier_with(
        transport: RecordingTransport,
        config: NotifyConfig,
    ) -> (Arc<RecordingTransport>, Arc<Notifier>, mpsc::Receiver<NotifyError>) {
        let transport = Arc::new(transport);
        let (notifier, errors) = Notifier::new(transport.clone(), config);
        (transport, notifier, errors)
    }

    #[tokio::test]
    async fn test_flush_batches_per_route_in_arrival_order() {
        let (transport, notifier, _errors) =
            notifier_with(RecordingTransport::new(), NotifyConfig::default());
        notifier.queue(route("oncall"), event("a", JobEventType::Failure));
        notifier.queue(route("oncall"), event("b", JobEventType::Success));
        notifier.queue(route("audit"), event("c", JobEventType::Failure));

        notifier.flush().await;

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        // Routes flush in receiver order: #audit before #oncall.
        assert_eq!(sent[0].0.receiver, Receiver::Channel("audit".to_string()));
        let oncall_blocks = &sent[1].1.blocks;
        let a_pos = oncall_blocks.iter().position(|b| b.ends_with("/a")).unwrap();
        let b_pos = oncall_blocks.iter().position(|b| b.ends_with("/b")).unwrap();
        assert!(a_pos < b_pos);
        assert_eq!(notifier.pending(), 0);
    }

    #[tokio::test]
    async fn test_send_failure_drops_events_and_reports() {
        let transport =
            RecordingTransport::new().failing_for(Receiver::Channel("oncall".to_string()));
        let (transport, notifier, mut errors) = notifier_with(transport, NotifyConfig::default());
        notifier.queue(route("oncall"), event("a", JobEventType::Failure));
        notifier.queue(route("oncall"), event("b", JobEventType::Failure));

        notifier.flush().await;

        let report = errors.try_recv().unwrap();
        assert_eq!(report.receiver, "#oncall");
        assert_eq!(report.auth_token, REDACTED_TOKEN);
        assert!(report.reason.contains("transport refused"));
        assert_eq!(report.dropped.len(), 2);

        // At-most-once: nothing re-queued, nothing delivered later.
        assert_eq!(notifier.pending(), 0);
        notifier.flush().await;
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_sla_miss_expands_and_truncates() {
        let (transport, notifier, _errors) =
            notifier_with(RecordingTransport::new(), NotifyConfig::default());
        let mut sla = event("report", JobEventType::SlaMiss);
        let breaches: Vec<serde_json::Value> =
            (0..8).map(|i| serde_json::json!({ "scheduled_at": i })).collect();
        sla.attributes = serde_json::json!({ "slas": breaches });
        notifier.queue(route("oncall"), sla);

        notifier.flush().await;

        let sent = transport.sent();
        let blocks = &sent[0].1.blocks;
        let breach_blocks = blocks.iter().filter(|b| b.contains("sla breach")).count();
        assert_eq!(breach_blocks, 6);
        assert!(blocks.iter().any(|b| b.contains("+ 2 more breaches")));
    }

    #[tokio::test]
    async fn test_failure_message_attribute_rendered() {
        let (transport, notifier, _errors) =
            notifier_with(RecordingTransport::new(), NotifyConfig::default());
        let mut failure = event("report", JobEventType::Failure);
        failure.attributes = serde_json::json!({ "message": "exit code 137" });
        notifier.queue(route("oncall"), failure);

        notifier.flush().await;

        let sent = transport.sent();
        assert!(sent[0].1.blocks.iter().any(|b| b.contains("exit code 137")));
    }

    #[tokio::test]
    async fn test_shutdown_flushes_pending_events() {
        let (transport, notifier, _errors) = notifier_with(
            RecordingTransport::new(),
            NotifyConfig { event_batch_interval: Duration::from_secs(3600), ..Default::default() },
        );
        let (sender, token) = shutdown_channel();
        let handle = notifier.spawn_worker(token);

        notifier.queue(route("oncall"), event("a", JobEventType::Failure));
        sender.shutdown();
        handle.await.unwrap();

        assert_eq!(transport.sent().len(), 1);
        assert_eq!(notifier.pending(), 0);
    }
}
