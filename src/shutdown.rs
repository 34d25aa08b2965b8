//! Cooperative shutdown: stop-then-acknowledge protocol for pipeline workers.
//!
//! Every worker task registers before the pipeline starts and receives a
//! [`StageHandle`]: a private stop signal plus a private done signal. On an
//! external trigger (OS signal or programmatic) the coordinator signals every
//! registered worker, then waits for each to acknowledge before the
//! process-wide done indicator fires. A worker that never acknowledges keeps
//! shutdown pending — deliberately fail-stop, no timeout.

use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};

struct RegisteredWorker {
    stop_tx: mpsc::Sender<()>,
    ack_rx: mpsc::Receiver<()>,
}

struct Inner {
    workers: Vec<RegisteredWorker>,
    done_tx: watch::Sender<bool>,
}

/// Process-wide shutdown coordinator.
///
/// Registration is only valid before the first trigger; a late `register`
/// call returns a handle whose stop signal is already pending so the
/// latecomer cannot stall shutdown.
pub struct ShutdownCoordinator {
    inner: Mutex<Option<Inner>>,
    done_rx: watch::Receiver<bool>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (done_tx, done_rx) = watch::channel(false);
        Self {
            inner: Mutex::new(Some(Inner {
                workers: Vec::new(),
                done_tx,
            })),
            done_rx,
        }
    }

    /// Allocates a fresh (stop, done) pair for one worker task.
    pub fn register(&self) -> StageHandle {
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let (ack_tx, ack_rx) = mpsc::channel(1);

        let mut guard = self.inner.lock().unwrap();
        match guard.as_mut() {
            Some(inner) => inner.workers.push(RegisteredWorker { stop_tx, ack_rx }),
            None => {
                // Shutdown already began; the ack side is not awaited.
                log::warn!("worker registered after shutdown was triggered; stopping it immediately");
                let _ = stop_tx.try_send(());
            }
        }

        StageHandle {
            stop: stop_rx,
            ack: ack_tx,
        }
    }

    /// Signals every registered worker to stop, then waits (asynchronously)
    /// for all acknowledgements before setting the done indicator.
    ///
    /// Safe to call more than once; only the first call has any effect.
    pub fn trigger(&self) {
        let inner = self.inner.lock().unwrap().take();
        let Some(inner) = inner else {
            log::debug!("shutdown already triggered");
            return;
        };

        let worker_count = inner.workers.len();
        log::info!("shutdown triggered, stopping {worker_count} workers");

        let mut acks = Vec::with_capacity(worker_count);
        for worker in inner.workers {
            // Capacity-1 channel and this is the only send, so it cannot block.
            let _ = worker.stop_tx.try_send(());
            acks.push(worker.ack_rx);
        }

        let done_tx = inner.done_tx;
        tokio::spawn(async move {
            for mut ack in acks {
                // None means the worker dropped its handle without an explicit
                // acknowledgement; the task is gone either way.
                let _ = ack.recv().await;
            }
            log::info!("all {worker_count} workers acknowledged shutdown");
            let _ = done_tx.send(true);
        });
    }

    /// Resolves once every registered worker has acknowledged a triggered
    /// shutdown. Any number of callers may wait.
    pub async fn wait_done(&self) {
        let mut rx = self.done_rx.clone();
        if *rx.borrow() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
    }

    /// Spawns the OS signal listener: SIGINT/SIGTERM trigger shutdown.
    pub fn spawn_signal_listener(self: Arc<Self>) {
        tokio::spawn(async move {
            wait_for_os_signal().await;
            log::info!("received interrupt/terminate signal, shutting down");
            self.trigger();
        });
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_os_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            log::error!("cannot install SIGTERM handler: {e}");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_os_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// One worker's view of the coordinator: select on [`StageHandle::stopped`]
/// at the top of the receive loop, finish in-flight work, then call
/// [`StageHandle::acknowledge`] exactly once.
pub struct StageHandle {
    stop: mpsc::Receiver<()>,
    ack: mpsc::Sender<()>,
}

impl StageHandle {
    /// Resolves when shutdown has been requested. Cancel-safe, so it can sit
    /// in a `tokio::select!` arm at the top of a receive loop.
    pub async fn stopped(&mut self) {
        // None (coordinator dropped) also counts as a stop request.
        let _ = self.stop.recv().await;
    }

    /// Confirms this worker has fully stopped. Consumes the handle: exactly
    /// one acknowledgement per registration.
    pub async fn acknowledge(self) {
        let _ = self.ack.send(()).await;
    }
}
