//! Graceful shutdown coordination: a single cancellation token shared by
//! every worker at startup, plus active-task tracking so the manager knows
//! when it is safe to exit (spec §5: "shared cancellation token ... must
//! return within a 30-second grace period").

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Shutdown signal receiver.
pub type ShutdownReceiver = broadcast::Receiver<()>;

/// Shutdown signal sender.
pub type ShutdownSender = broadcast::Sender<()>;

/// Shared cancellation token. Cloning shares the same underlying signal.
#[derive(Clone)]
pub struct ShutdownController {
    sender: ShutdownSender,
    is_shutting_down: Arc<AtomicBool>,
    grace_period: Duration,
}

impl ShutdownController {
    pub fn new(grace_period: Duration) -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            sender,
            is_shutting_down: Arc::new(AtomicBool::new(false)),
            grace_period,
        }
    }

    /// 30-second default grace period, per spec §5.
    pub fn with_default_grace_period() -> Self {
        Self::new(Duration::from_secs(30))
    }

    pub fn subscribe(&self) -> ShutdownReceiver {
        self.sender.subscribe()
    }

    /// Initiate shutdown exactly once, even if called from multiple tasks.
    pub fn shutdown(&self) {
        if self
            .is_shutting_down
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!("initiating graceful shutdown");
            let _ = self.sender.send(());
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.is_shutting_down.load(Ordering::SeqCst)
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::with_default_grace_period()
    }
}

/// Listen for SIGINT/SIGTERM and trip the controller.
pub async fn listen_for_shutdown_signals(controller: ShutdownController) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C"),
        _ = terminate => info!("received SIGTERM"),
    }

    controller.shutdown();
}

/// Tracks in-flight worker tasks so the manager can wait for them to drain
/// before exiting.
#[derive(Clone)]
pub struct ShutdownHandle {
    controller: ShutdownController,
    active_tasks: Arc<AtomicUsize>,
}

impl ShutdownHandle {
    pub fn new(controller: ShutdownController) -> Self {
        Self {
            controller,
            active_tasks: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn register_task(&self) -> TaskGuard {
        self.active_tasks.fetch_add(1, Ordering::SeqCst);
        TaskGuard {
            active_tasks: Arc::clone(&self.active_tasks),
        }
    }

    pub fn active_task_count(&self) -> usize {
        self.active_tasks.load(Ordering::SeqCst)
    }

    /// Poll until all registered tasks complete or the grace period elapses.
    pub async fn wait_for_tasks(&self, timeout: Duration) {
        let start = std::time::Instant::now();
        loop {
            let count = self.active_task_count();
            if count == 0 {
                info!("all active tasks completed");
                return;
            }
            if start.elapsed() > timeout {
                warn!(active = count, "shutdown grace period elapsed with tasks still active");
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.controller.is_shutting_down()
    }

    pub fn subscribe(&self) -> ShutdownReceiver {
        self.controller.subscribe()
    }
}

/// Decrements the active task count when dropped, even on panic/early return.
pub struct TaskGuard {
    active_tasks: Arc<AtomicUsize>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.active_tasks.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Sleep that returns early (with `true`) if shutdown is signalled first.
pub async fn shutdown_aware_sleep(duration: Duration, controller: &ShutdownController) -> bool {
    let mut receiver = controller.subscribe();
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = receiver.recv() => {
            info!("sleep interrupted by shutdown signal");
            true
        }
    }
}

/// Phases executed in order during an orderly shutdown (spec §5: consumer
/// stops pulling, inventory worker flushes its residual batch, other workers
/// exit on their current operation's timeout).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShutdownPhase {
    StopConsumer,
    FlushInventoryBatch,
    DrainWorkers,
    CloseDatabase,
    Cleanup,
}

impl ShutdownPhase {
    pub fn all() -> &'static [ShutdownPhase] {
        &[
            ShutdownPhase::StopConsumer,
            ShutdownPhase::FlushInventoryBatch,
            ShutdownPhase::DrainWorkers,
            ShutdownPhase::CloseDatabase,
            ShutdownPhase::Cleanup,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            ShutdownPhase::StopConsumer => "stop consumer loop",
            ShutdownPhase::FlushInventoryBatch => "flush residual inventory batch",
            ShutdownPhase::DrainWorkers => "drain diff/notification workers",
            ShutdownPhase::CloseDatabase => "close database connections",
            ShutdownPhase::Cleanup => "final cleanup",
        }
    }
}

type PhaseHandler = Box<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Runs registered handlers phase-by-phase, each phase sharing a slice of
/// the controller's overall grace period.
pub struct ShutdownExecutor {
    controller: ShutdownController,
    handlers: Vec<(ShutdownPhase, PhaseHandler)>,
}

impl ShutdownExecutor {
    pub fn new(controller: ShutdownController) -> Self {
        Self {
            controller,
            handlers: Vec::new(),
        }
    }

    pub fn register<F, Fut>(&mut self, phase: ShutdownPhase, handler: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.handlers
            .push((phase, Box::new(move || Box::pin(handler()))));
    }

    pub async fn execute(mut self) {
        self.handlers.sort_by_key(|(phase, _)| *phase);
        let timeout_per_phase = self.controller.grace_period() / (ShutdownPhase::all().len() as u32);

        for phase in ShutdownPhase::all() {
            let phase_handlers: Vec<_> = self.handlers.iter().filter(|(p, _)| p == phase).collect();
            if phase_handlers.is_empty() {
                continue;
            }

            info!(phase = phase.name(), "executing shutdown phase");
            let phase_future = async {
                for (_, handler) in phase_handlers {
                    handler().await;
                }
            };

            match tokio::time::timeout(timeout_per_phase, phase_future).await {
                Ok(_) => info!(phase = phase.name(), "shutdown phase completed"),
                Err(_) => warn!(phase = phase.name(), "shutdown phase timed out"),
            }
        }

        info!("graceful shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_controller_fires_once() {
        let controller = ShutdownController::with_default_grace_period();
        assert!(!controller.is_shutting_down());
        controller.shutdown();
        controller.shutdown();
        assert!(controller.is_shutting_down());
    }

    #[tokio::test]
    async fn test_task_guard_decrements_on_drop() {
        let controller = ShutdownController::with_default_grace_period();
        let handle = ShutdownHandle::new(controller);
        assert_eq!(handle.active_task_count(), 0);
        {
            let _g1 = handle.register_task();
            let _g2 = handle.register_task();
            assert_eq!(handle.active_task_count(), 2);
        }
        assert_eq!(handle.active_task_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_aware_sleep_interrupted() {
        let controller = ShutdownController::with_default_grace_period();
        let c2 = controller.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            c2.shutdown();
        });
        let interrupted = shutdown_aware_sleep(Duration::from_secs(5), &controller).await;
        assert!(interrupted);
    }

    #[tokio::test]
    async fn test_shutdown_phases_ordered() {
        let phases = ShutdownPhase::all();
        assert_eq!(phases[0], ShutdownPhase::StopConsumer);
        assert_eq!(phases[phases.len() - 1], ShutdownPhase::Cleanup);
    }
}
