//! Graceful shutdown coordination.
//!
//! One broadcast channel fans the shutdown decision out to every long-lived
//! task: the HTTP server, the metric sampler, and anything else that
//! subscribes. The trigger is either an OS signal or an explicit call.

use tokio::signal;
use tokio::sync::broadcast;
use tracing::info;

/// Broadcasts a single shutdown event to all subscribers.
pub struct GracefulShutdown {
    sender: broadcast::Sender<()>,
}

impl GracefulShutdown {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self { sender }
    }

    /// Subscribe to the shutdown event.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            receiver: self.sender.subscribe(),
        }
    }

    /// Trigger shutdown for every subscriber.
    pub fn shutdown(&self) {
        info!("Shutdown triggered");
        // Zero receivers is fine; nothing was listening yet.
        let _ = self.sender.send(());
    }

    /// Block until SIGINT or SIGTERM arrives, then trigger shutdown.
    pub async fn listen_for_signals(&self) {
        let ctrl_c = async {
            let _ = signal::ctrl_c().await;
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(_) => std::future::pending::<()>().await,
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received SIGINT"),
            _ = terminate => info!("Received SIGTERM"),
        }

        self.shutdown();
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// One subscriber's view of the shutdown event.
pub struct ShutdownSignal {
    receiver: broadcast::Receiver<()>,
}

impl ShutdownSignal {
    /// Resolve when shutdown is triggered. A lagged or closed channel also
    /// counts as shutdown; there is no other message on this channel.
    pub async fn wait(mut self) {
        let _ = self.receiver.recv().await;
    }
}
