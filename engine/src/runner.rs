/// runner.rs — Runner supervision (§4.K)
///
/// An addressable, owning container for one run (backtest, optimization,
/// live, or grid). A mutex guards the mutable fields; two atomics
/// (`should_stop`, `is_paused`) let `stop`/`pause`/`stats` calls from other
/// threads never block for a full tick cycle, the same publication-safety
/// discipline the teacher's supervising loop in `main.rs` uses around its
/// own `run_backtest` call, generalized here to a background worker thread.
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::info;

use crate::error::EngineError;
use crate::strategy::Signal;
use crate::types::OrderResult;

const HISTORY_CAPACITY: usize = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerStatus {
    Stopped,
    Starting,
    Running,
    Paused,
    Stopping,
    ErrorState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    Backtest,
    Optimization,
    Live,
    Grid,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RunnerMetrics {
    pub orders_submitted: u64,
    pub orders_filled: u64,
    pub orders_cancelled: u64,
    pub orders_rejected: u64,
    pub realized_pnl: f64,
    pub total_volume: f64,
    /// Optimization runners only: count of completed combinations.
    pub combinations_completed: u64,
}

struct Inner {
    status: RunnerStatus,
    metrics: RunnerMetrics,
    order_history: VecDeque<OrderResult>,
    signal_history: VecDeque<Signal>,
    started_at: Option<Instant>,
    last_error: Option<String>,
}

/// A bounded, oldest-first ring buffer. Eviction drops (and frees) the
/// oldest owned entry once `capacity` is exceeded.
fn push_bounded<T>(queue: &mut VecDeque<T>, item: T, capacity: usize) {
    queue.push_back(item);
    while queue.len() > capacity {
        queue.pop_front();
    }
}

/// Supervises exactly one background worker while `running` or `paused`.
pub struct Runner {
    kind: RunKind,
    inner: Mutex<Inner>,
    should_stop: AtomicBool,
    is_paused: AtomicBool,
    combinations_completed: AtomicU64,
    worker: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Runner {
    pub fn new(kind: RunKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            inner: Mutex::new(Inner {
                status: RunnerStatus::Stopped,
                metrics: RunnerMetrics::default(),
                order_history: VecDeque::new(),
                signal_history: VecDeque::new(),
                started_at: None,
                last_error: None,
            }),
            should_stop: AtomicBool::new(false),
            is_paused: AtomicBool::new(false),
            combinations_completed: AtomicU64::new(0),
            worker: Mutex::new(None),
        })
    }

    /// Spawns the single background worker this runner owns. `tick` is
    /// polled in a loop until `request_stop` is observed or it returns an
    /// error; the loop itself only locks `inner` from inside the calls
    /// `tick` makes back into `self` (`record_order`, `fail`, ...), never
    /// independently of them.
    pub fn spawn<F, Fut>(self: &Arc<Self>, mut tick: F)
    where
        F: FnMut(Arc<Runner>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<(), EngineError>> + Send,
    {
        let runner = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                if runner.should_stop() {
                    break;
                }
                if runner.is_paused() {
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                    continue;
                }
                if let Err(e) = tick(Arc::clone(&runner)).await {
                    runner.fail(e.to_string());
                    return;
                }
            }
            runner.finish_stopping();
        });
        *self.worker.lock().unwrap() = Some(handle);
    }

    /// Requests the worker stop and waits for it to be joined. Returning
    /// from this method is the caller's guarantee that no worker thread for
    /// this runner is still executing.
    pub async fn stop(self: &Arc<Self>) {
        self.request_stop();
        let handle = self.worker.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    pub fn kind(&self) -> RunKind {
        self.kind
    }

    pub fn status(&self) -> RunnerStatus {
        self.inner.lock().unwrap().status
    }

    pub fn metrics(&self) -> RunnerMetrics {
        let mut m = self.inner.lock().unwrap().metrics;
        m.combinations_completed = self.combinations_completed.load(Ordering::Relaxed);
        m
    }

    pub fn uptime(&self) -> Option<std::time::Duration> {
        self.inner.lock().unwrap().started_at.map(|s| s.elapsed())
    }

    /// Called by the runner's owner right before spawning the worker thread.
    pub fn begin(&self) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.status != RunnerStatus::Stopped {
            return Err(EngineError::internal("begin called outside the stopped state"));
        }
        inner.status = RunnerStatus::Starting;
        inner.started_at = Some(Instant::now());
        self.should_stop.store(false, Ordering::SeqCst);
        self.is_paused.store(false, Ordering::SeqCst);
        inner.status = RunnerStatus::Running;
        info!(kind = ?self.kind, "runner started");
        Ok(())
    }

    /// Non-blocking: sets the stop flag, observed by the worker at its next
    /// tick boundary.
    pub fn request_stop(&self) {
        self.should_stop.store(true, Ordering::SeqCst);
    }

    pub fn should_stop(&self) -> bool {
        self.should_stop.load(Ordering::SeqCst)
    }

    pub fn request_pause(&self) -> Result<(), EngineError> {
        if self.status() != RunnerStatus::Running {
            return Err(EngineError::internal("pause requires the running state"));
        }
        self.is_paused.store(true, Ordering::SeqCst);
        self.inner.lock().unwrap().status = RunnerStatus::Paused;
        Ok(())
    }

    pub fn request_resume(&self) -> Result<(), EngineError> {
        if self.status() != RunnerStatus::Paused {
            return Err(EngineError::internal("resume requires the paused state"));
        }
        self.is_paused.store(false, Ordering::SeqCst);
        self.inner.lock().unwrap().status = RunnerStatus::Running;
        Ok(())
    }

    pub fn is_paused(&self) -> bool {
        self.is_paused.load(Ordering::SeqCst)
    }

    /// Called by the worker thread once it observes `should_stop` and has
    /// unwound its own loop.
    pub fn finish_stopping(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.status = RunnerStatus::Stopping;
        inner.status = RunnerStatus::Stopped;
        info!(kind = ?self.kind, "runner stopped");
    }

    /// Called by the worker thread on an unrecoverable error. `error_state`
    /// absorbs: only a fresh `begin()` leaves it.
    pub fn fail(&self, reason: impl Into<String>) {
        let mut inner = self.inner.lock().unwrap();
        inner.status = RunnerStatus::ErrorState;
        inner.last_error = Some(reason.into());
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.lock().unwrap().last_error.clone()
    }

    /// Records a submitted/filled/rejected order in the bounded history and
    /// updates the aggregate counters. The worker calls this from inside its
    /// own `tick()`, never concurrently with another call (single worker
    /// invariant), so the mutex here only contends with readers.
    pub fn record_order(&self, order: OrderResult) {
        let mut inner = self.inner.lock().unwrap();
        inner.metrics.orders_submitted += 1;
        if order.success {
            inner.metrics.orders_filled += 1;
            if let Some(qty) = order.avg_fill_price.map(|p| p.to_float() * order.filled_quantity.to_float()) {
                inner.metrics.total_volume += qty;
            }
        } else {
            inner.metrics.orders_rejected += 1;
        }
        push_bounded(&mut inner.order_history, order, HISTORY_CAPACITY);
    }

    pub fn record_cancellation(&self) {
        self.inner.lock().unwrap().metrics.orders_cancelled += 1;
    }

    pub fn record_signal(&self, signal: Signal) {
        let mut inner = self.inner.lock().unwrap();
        push_bounded(&mut inner.signal_history, signal, HISTORY_CAPACITY);
    }

    pub fn record_realized_pnl(&self, pnl: f64) {
        self.inner.lock().unwrap().metrics.realized_pnl += pnl;
    }

    pub fn record_combination_completed(&self) {
        self.combinations_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn order_history_len(&self) -> usize {
        self.inner.lock().unwrap().order_history.len()
    }

    pub fn signal_history_len(&self) -> usize {
        self.inner.lock().unwrap().signal_history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::Decimal;
    use crate::time::Timestamp;

    fn fake_order(success: bool) -> OrderResult {
        OrderResult {
            success,
            exchange_order_id: Some("1".into()),
            filled_quantity: Decimal::from_int(1),
            avg_fill_price: Some(Decimal::from_int(100)),
            timestamp: Timestamp::from_millis(0),
            error_code: None,
            error_message: None,
        }
    }

    #[test]
    fn lifecycle_transitions_are_linear() {
        let runner = Runner::new(RunKind::Backtest);
        assert_eq!(runner.status(), RunnerStatus::Stopped);
        runner.begin().unwrap();
        assert_eq!(runner.status(), RunnerStatus::Running);
        runner.request_pause().unwrap();
        assert_eq!(runner.status(), RunnerStatus::Paused);
        runner.request_resume().unwrap();
        assert_eq!(runner.status(), RunnerStatus::Running);
        runner.finish_stopping();
        assert_eq!(runner.status(), RunnerStatus::Stopped);
    }

    #[test]
    fn stop_request_is_observed_without_locking_for_a_tick() {
        let runner = Runner::new(RunKind::Live);
        runner.begin().unwrap();
        assert!(!runner.should_stop());
        runner.request_stop();
        assert!(runner.should_stop());
    }

    #[test]
    fn order_history_is_bounded_and_evicts_oldest_first() {
        let runner = Runner::new(RunKind::Backtest);
        runner.begin().unwrap();
        for _ in 0..(HISTORY_CAPACITY + 10) {
            runner.record_order(fake_order(true));
        }
        assert_eq!(runner.order_history_len(), HISTORY_CAPACITY);
        assert_eq!(runner.metrics().orders_submitted as usize, HISTORY_CAPACITY + 10);
    }

    #[test]
    fn error_state_is_absorbing_until_begin() {
        let runner = Runner::new(RunKind::Grid);
        runner.begin().unwrap();
        runner.fail("provider disconnected");
        assert_eq!(runner.status(), RunnerStatus::ErrorState);
        assert!(runner.last_error().is_some());
    }

    #[tokio::test]
    async fn stop_joins_the_spawned_worker_before_returning() {
        let runner = Runner::new(RunKind::Live);
        runner.begin().unwrap();

        let ticks = Arc::new(AtomicU64::new(0));
        let ticks_in_worker = Arc::clone(&ticks);
        runner.spawn(move |_runner| {
            let ticks = Arc::clone(&ticks_in_worker);
            async move {
                ticks.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
                Ok(())
            }
        });

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        runner.stop().await;

        assert_eq!(runner.status(), RunnerStatus::Stopped);
        assert!(ticks.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test]
    async fn worker_error_moves_runner_to_error_state_without_hanging_stop() {
        let runner = Runner::new(RunKind::Backtest);
        runner.begin().unwrap();

        runner.spawn(|_runner| async { Err(EngineError::internal("provider disconnected")) });

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        runner.stop().await;

        assert_eq!(runner.status(), RunnerStatus::ErrorState);
        assert!(runner.last_error().is_some());
    }
}
