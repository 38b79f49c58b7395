//! Process lifecycle and graceful shutdown.
//!
//! Every binary follows the same shape:
//!
//! 1. **Startup**: spawn consumers and HTTP servers, all listening on one
//!    shutdown broadcast
//! 2. **Runtime**: run until Ctrl+C/SIGTERM or until a consumer stops on a
//!    fatal error
//! 3. **Shutdown**: broadcast, then give each task the drain timeout to finish
//!
//! A fatal consumer error takes the whole process down with a non-zero exit
//! so the orchestrator restarts it. The record that failed was never
//! acknowledged, so its offset was not committed and the restarted process
//! reads it again.

use anyhow::Context;
use futures::future;
use order_lifecycle_runtime::{ConsumerError, ConsumerHandle};
use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Consumer loops and HTTP servers of one process, stopped together.
pub struct Supervisor {
    consumers: Vec<(&'static str, ConsumerHandle)>,
    servers: Vec<(&'static str, JoinHandle<std::io::Result<()>>)>,
    shutdown: broadcast::Sender<()>,
    drain_timeout: Duration,
}

impl Supervisor {
    /// Supervisor whose tasks stop on `shutdown`.
    #[must_use]
    pub const fn new(shutdown: broadcast::Sender<()>, drain_timeout: Duration) -> Self {
        Self {
            consumers: Vec::new(),
            servers: Vec::new(),
            shutdown,
            drain_timeout,
        }
    }

    /// Sender to hand to consumers and servers started after this call.
    #[must_use]
    pub const fn shutdown(&self) -> &broadcast::Sender<()> {
        &self.shutdown
    }

    /// Watch a consumer loop.
    pub fn consumer(&mut self, name: &'static str, handle: ConsumerHandle) {
        self.consumers.push((name, handle));
    }

    /// Serve `app` on `listener` until shutdown is broadcast.
    pub fn serve(&mut self, name: &'static str, listener: tokio::net::TcpListener, app: axum::Router) {
        let mut stop = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = stop.recv().await;
                })
                .await
        });
        self.servers.push((name, handle));
    }

    /// Run until a shutdown signal arrives or a consumer stops on its own.
    ///
    /// # Errors
    ///
    /// Returns the first fatal consumer error, after the remaining tasks have
    /// been drained.
    pub async fn run(self) -> anyhow::Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Like [`Supervisor::run`], with `signal` standing in for Ctrl+C/SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns the first fatal consumer error.
    pub async fn run_until(mut self, signal: impl Future<Output = ()>) -> anyhow::Result<()> {
        let stopped = if self.consumers.is_empty() {
            signal.await;
            None
        } else {
            tokio::select! {
                () = signal => None,
                (result, index, _) = future::select_all(self.consumers.iter_mut().map(|(_, handle)| handle)) => {
                    Some((index, result))
                }
            }
        };

        let mut failure = None;
        if let Some((index, result)) = stopped {
            let (name, _) = self.consumers.swap_remove(index);
            failure = outcome(name, result).err();
            if failure.is_none() {
                warn!(consumer = name, "Consumer stopped before shutdown was requested");
            }
        }

        info!("Initiating graceful shutdown");
        let _ = self.shutdown.send(());

        for (name, handle) in self.consumers {
            match tokio::time::timeout(self.drain_timeout, handle).await {
                Ok(result) => {
                    if let Err(e) = outcome(name, result) {
                        failure.get_or_insert(e);
                    }
                }
                Err(_) => warn!(consumer = name, "Consumer shutdown timed out"),
            }
        }

        for (name, handle) in self.servers {
            match tokio::time::timeout(self.drain_timeout, handle).await {
                Ok(Ok(Ok(()))) => info!(server = name, "HTTP server stopped gracefully"),
                Ok(Ok(Err(e))) => warn!(server = name, error = %e, "HTTP server failed"),
                Ok(Err(e)) => warn!(server = name, error = %e, "HTTP server task failed"),
                Err(_) => warn!(server = name, "HTTP server shutdown timed out"),
            }
        }

        match failure {
            Some(e) => Err(e),
            None => {
                info!("Graceful shutdown complete");
                Ok(())
            }
        }
    }
}

fn outcome(
    name: &'static str,
    result: Result<Result<(), ConsumerError>, tokio::task::JoinError>,
) -> anyhow::Result<()> {
    match result {
        Ok(Ok(())) => {
            info!(consumer = name, "Consumer stopped gracefully");
            Ok(())
        }
        Ok(Err(e)) => {
            error!(consumer = name, error = %e, "Consumer stopped on a fatal error");
            Err(e).context(format!("consumer {name} failed"))
        }
        Err(e) => {
            error!(consumer = name, error = %e, "Consumer task panicked or was cancelled");
            Err(e).context(format!("consumer {name} task failed"))
        }
    }
}

/// Bind `addr` for an HTTP server.
///
/// # Errors
///
/// Returns an error if the address cannot be bound.
pub async fn bind(addr: &str) -> anyhow::Result<tokio::net::TcpListener> {
    tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))
}

/// Wait for Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C signal"),
        () = terminate => info!("Received SIGTERM signal"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use order_lifecycle_core::{EventBus, EventBusError, Order, OrderId};
    use order_lifecycle_runtime::{EventConsumer, OrderHandler, PipelineError};
    use order_lifecycle_testing::InMemoryEventBus;
    use std::sync::Arc;

    struct Idle;

    impl OrderHandler for Idle {
        async fn handle(&self, _order: Order) -> Result<(), PipelineError> {
            Ok(())
        }
    }

    fn idle_consumer(bus: &Arc<InMemoryEventBus>, shutdown: &broadcast::Sender<()>) -> ConsumerHandle {
        let bus: Arc<dyn EventBus> = bus.clone();
        EventConsumer::new("idle", vec!["orders"], bus, Arc::new(Idle), 4, shutdown.subscribe()).spawn()
    }

    #[tokio::test]
    async fn signal_stops_consumers_and_servers() {
        let (shutdown, _) = broadcast::channel(1);
        let bus = Arc::new(InMemoryEventBus::new());

        let mut supervisor = Supervisor::new(shutdown.clone(), Duration::from_secs(5));
        supervisor.consumer("idle", idle_consumer(&bus, &shutdown));
        let listener = bind("127.0.0.1:0").await.unwrap();
        supervisor.serve("health", listener, axum::Router::new());

        bus.wait_for_subscribers("orders", 1).await;
        supervisor.run_until(async {}).await.unwrap();
    }

    #[tokio::test]
    async fn consumer_stopping_early_is_reported() {
        let (shutdown, _) = broadcast::channel(1);
        let bus = Arc::new(InMemoryEventBus::new());

        let mut supervisor = Supervisor::new(shutdown.clone(), Duration::from_secs(5));
        let failing = tokio::spawn(async {
            Err(ConsumerError::Fatal {
                consumer: "creation",
                source: PipelineError::Transport {
                    order_id: OrderId::new(1),
                    source: EventBusError::ConnectionFailed("broker down".to_string()),
                },
            })
        });
        supervisor.consumer("creation", failing);
        supervisor.consumer("idle", idle_consumer(&bus, &shutdown));

        let err = supervisor.run_until(future::pending()).await.unwrap_err();
        assert!(err.to_string().contains("creation"));
    }
}
