//! HTTP server lifecycle: start, bounce on configuration change, shutdown.
//!
//! ```text
//! Stopped -> Starting -> Listening --(change)--> Draining -> Starting -> Listening ...
//!                                  --(shutdown)-> Stopping -> Stopped
//! ```
//!
//! Bounces run one at a time from a single-slot queue. A request that finds the slot already
//! taken is coalesced into the pending bounce, which reads the newest snapshot when it runs.

use crate::app::{assemble, Application, Mounted};
use crate::config::{ChangeListener, ConfigMerger, Configuration};
use crate::error::AppError;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Starting,
    Listening(SocketAddr),
    Draining,
    Stopping,
}

/// Outcome of asking for a bounce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BounceRequest {
    /// Took the empty slot; a bounce will run.
    Queued,
    /// A bounce was already pending; this request rides on it.
    Coalesced,
    /// The server has shut down.
    Closed,
}

#[derive(Debug, Default)]
pub struct BounceStats {
    completed: AtomicU64,
    failed: AtomicU64,
    coalesced: AtomicU64,
}

impl BounceStats {
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    /// Bounces whose restart failed (for example a bind error); the server is then stopped.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn coalesced(&self) -> u64 {
        self.coalesced.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
struct BounceTrigger {
    tx: mpsc::Sender<()>,
    stats: Arc<BounceStats>,
}

impl BounceTrigger {
    fn request(&self) -> BounceRequest {
        match self.tx.try_send(()) {
            Ok(()) => BounceRequest::Queued,
            Err(mpsc::error::TrySendError::Full(())) => {
                self.stats.coalesced.fetch_add(1, Ordering::SeqCst);
                BounceRequest::Coalesced
            }
            Err(mpsc::error::TrySendError::Closed(())) => BounceRequest::Closed,
        }
    }
}

impl ChangeListener for BounceTrigger {
    fn on_change(&self, _config: &Arc<Configuration>) {
        let outcome = self.request();
        tracing::debug!(outcome = ?outcome, "bounce requested by configuration change");
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// One listening router generation.
struct Generation {
    mounted: Mounted,
    drain_tx: oneshot::Sender<()>,
    serve: JoinHandle<std::io::Result<()>>,
}

pub struct ServerController {
    app: Arc<dyn Application>,
    merger: Arc<ConfigMerger>,
    state_tx: watch::Sender<ServerState>,
    stats: Arc<BounceStats>,
}

impl ServerController {
    /// Build the first generation from the merger's current snapshot and start listening.
    /// A bind failure here is returned. Configuration changes bounce the server from then on.
    pub async fn start(app: Arc<dyn Application>, merger: Arc<ConfigMerger>) -> Result<ServerHandle, AppError> {
        let (state_tx, state_rx) = watch::channel(ServerState::Stopped);
        let controller = ServerController {
            app,
            merger: merger.clone(),
            state_tx,
            stats: Arc::new(BounceStats::default()),
        };
        let generation = controller.open(merger.snapshot()).await?;

        let (bounce_tx, bounce_rx) = mpsc::channel(1);
        let trigger = BounceTrigger {
            tx: bounce_tx,
            stats: controller.stats.clone(),
        };
        merger.subscribe(Arc::new(trigger.clone()));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let stats = controller.stats.clone();
        let task = tokio::spawn(controller.run(Some(generation), bounce_rx, shutdown_rx));
        Ok(ServerHandle {
            state: state_rx,
            trigger,
            stats,
            shutdown_tx: Some(shutdown_tx),
            task,
        })
    }

    async fn open(&self, config: Arc<Configuration>) -> Result<Generation, AppError> {
        self.state_tx.send_replace(ServerState::Starting);
        let mounted = match assemble(self.app.as_ref(), config.clone()).await {
            Ok(mounted) => mounted,
            Err(e) => {
                self.state_tx.send_replace(ServerState::Stopped);
                return Err(e);
            }
        };
        let addr = config.bind_address();
        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(source) => {
                mounted.stop().await;
                self.state_tx.send_replace(ServerState::Stopped);
                return Err(AppError::Bind { addr, source });
            }
        };
        let local = match listener.local_addr() {
            Ok(local) => local,
            Err(source) => {
                mounted.stop().await;
                self.state_tx.send_replace(ServerState::Stopped);
                return Err(AppError::Bind { addr, source });
            }
        };
        let (drain_tx, drain_rx) = oneshot::channel::<()>();
        let router = mounted.router.clone();
        let serve = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = drain_rx.await;
                })
                .await
        });
        self.state_tx.send_replace(ServerState::Listening(local));
        tracing::info!(
            address = %local,
            mode = %config.mode(),
            modules = ?mounted.module_names(),
            "HTTP server started"
        );
        Ok(Generation {
            mounted,
            drain_tx,
            serve,
        })
    }

    /// Stop accepting, wait for in-flight requests, then stop the modules.
    async fn close(&self, generation: Generation) {
        let _ = generation.drain_tx.send(());
        match generation.serve.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "HTTP server exited with error"),
            Err(e) => tracing::error!(error = %e, "HTTP server task failed"),
        }
        generation.mounted.stop().await;
    }

    async fn bounce(&self, current: &mut Option<Generation>) {
        if let Some(generation) = current.take() {
            self.state_tx.send_replace(ServerState::Draining);
            self.close(generation).await;
        }
        tracing::info!("restarting HTTP server");
        match self.open(self.merger.snapshot()).await {
            Ok(generation) => {
                *current = Some(generation);
                self.stats.completed.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::SeqCst);
                tracing::error!(error = %e, "HTTP server restart failed; no listener until the next configuration change");
            }
        }
    }

    async fn run(
        self,
        mut current: Option<Generation>,
        mut bounce_rx: mpsc::Receiver<()>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => break,
                request = bounce_rx.recv() => match request {
                    Some(()) => self.bounce(&mut current).await,
                    None => break,
                },
            }
        }
        self.state_tx.send_replace(ServerState::Stopping);
        if let Some(generation) = current.take() {
            self.close(generation).await;
        }
        self.state_tx.send_replace(ServerState::Stopped);
        tracing::info!("HTTP server stopped");
    }
}

/// Control surface of a running server. Dropping it shuts the server down.
pub struct ServerHandle {
    state: watch::Receiver<ServerState>,
    trigger: BounceTrigger,
    stats: Arc<BounceStats>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self.state() {
            ServerState::Listening(addr) => Some(addr),
            _ => None,
        }
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ServerState> {
        self.state.clone()
    }

    pub fn stats(&self) -> &BounceStats {
        &self.stats
    }

    /// Ask for a bounce with the current configuration.
    pub fn bounce(&self) -> BounceRequest {
        self.trigger.request()
    }

    /// Drain the active generation and stop.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            tracing::error!(error = %e, "server task failed");
        }
    }
}
