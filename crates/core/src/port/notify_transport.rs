// Notify Transport Port (Interface)

use async_trait::async_trait;

use crate::domain::{BatchMessage, Route};
use crate::error::Result;

/// Outbound edge for notification batches (chat webhook, SMTP, ...).
/// One send per (route, tick); the notifier never retries.
#[async_trait]
pub trait NotifyTransport: Send + Sync {
    async fn send(&self, route: &Route, message: &BatchMessage) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use std::sync::Mutex;

    use super::*;
    use crate::domain::Receiver;
    use crate::error::{AppError, Entity};

    /// Transport capturing every send; optionally fails for chosen
    /// receivers.
    #[derive(Default)]
    pub struct RecordingTransport {
        sent: Mutex<Vec<(Route, BatchMessage)>>,
        failing_receivers: Mutex<Vec<Receiver>>,
    }

    impl RecordingTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing_for(self, receiver: Receiver) -> Self {
            self.failing_receivers.lock().unwrap().push(receiver);
            self
        }

        pub fn sent(&self) -> Vec<(Route, BatchMessage)> {
            self.sent.lock().unwrap().clone()
        }

        pub fn sent_to(&self, route: &Route) -> Vec<BatchMessage> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter(|(r, _)| r == route)
                .map(|(_, m)| m.clone())
                .collect()
        }
    }

    #[async_trait]
    impl NotifyTransport for RecordingTransport {
        async fn send(&self, route: &Route, message: &BatchMessage) -> Result<()> {
            if self.failing_receivers.lock().unwrap().iter().any(|r| r == &route.receiver) {
                return Err(AppError::internal(
                    Entity::Job,
                    format!("transport refused {}", route.receiver),
                ));
            }
            self.sent.lock().unwrap().push((route.clone(), message.clone()));
            Ok(())
        }
    }
}
