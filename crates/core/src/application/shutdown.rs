// Shutdown Token
//
// Graceful-termination signal shared by the deploy workers and the
// notifier. Backed by a watch channel so late subscribers still see a
// signal sent before they arrived.

use tokio::sync::watch;

/// Receiving half; cheap to clone, one per background task.
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// Whether shutdown was requested.
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until shutdown is requested.
    pub async fn wait(&mut self) {
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                // Sender dropped: treat as shutdown.
                return;
            }
        }
    }
}

/// Sending half, held by the composition root.
pub struct ShutdownSender {
    tx: watch::Sender<bool>,
}

impl ShutdownSender {
    /// Signal shutdown to every token.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }

    /// Hand out another token after channel creation.
    pub fn subscribe(&self) -> ShutdownToken {
        ShutdownToken { rx: self.tx.subscribe() }
    }
}

/// Create a shutdown channel.
pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSender { tx }, ShutdownToken { rx })
}
