use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{Notify, Semaphore};

use crate::logging::Logger;
use crate::observability::PipelineMetrics;
use crate::shared::guard;
use crate::task::{Lifecycle, Task};

/// Executor runs submitted tasks on a bounded pool of workers
///
/// Architecture:
/// 1. `submit` records the task in the running set and spawns a supervisor
/// 2. The supervisor waits for one of `budget` permits, then runs `start` on its
///    own task so a panic is caught here and turned into Error
/// 3. Continuous tasks (the log drain) do not take a permit
/// 4. When `start` returns, the completion hook calls `stop`, removes the task
///    from the running set and wakes whoever waits on `completion_signal`
///
/// Submission never blocks; excess tasks wait for a permit inside their
/// supervisor. The orchestrator keeps submissions within the budget anyway.
pub struct Executor<T: Task> {
    budget: usize,
    permits: Arc<Semaphore>,
    running: Arc<Mutex<Vec<Arc<T>>>>,
    completed: Arc<Notify>,
    logger: Logger,
    metrics: Arc<PipelineMetrics>,
    drain_poll: Duration,
}

impl<T: Task> Executor<T> {
    pub fn new(budget: usize, logger: Logger, metrics: Arc<PipelineMetrics>) -> Self {
        let budget = budget.max(1);
        Self {
            budget,
            permits: Arc::new(Semaphore::new(budget)),
            running: Arc::new(Mutex::new(Vec::new())),
            completed: Arc::new(Notify::new()),
            logger,
            metrics,
            drain_poll: Duration::from_millis(50),
        }
    }

    /// Polling interval used by `drain_all` and `wait_for_one_shots`
    pub fn with_drain_poll(mut self, drain_poll: Duration) -> Self {
        self.drain_poll = drain_poll;
        self
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Schedule a task. Returns false when there is no runtime to schedule on, in
    /// which case the task is not tracked.
    pub fn submit(&self, task: Arc<T>) -> bool {
        let runtime = match Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                self.logger
                    .error(format!("Cannot schedule {}: {}", task.name(), e));
                return false;
            }
        };

        guard(&self.running).push(task.clone());
        self.metrics.task_submitted();
        self.logger.trace(format!("Submitted task {}", task.name()));

        let permits = self.permits.clone();
        let running = self.running.clone();
        let completed = self.completed.clone();
        let logger = self.logger.clone();
        let metrics = self.metrics.clone();

        runtime.spawn(async move {
            let permit = if task.is_continuous() {
                None
            } else {
                // The semaphore is never closed
                permits.acquire_owned().await.ok()
            };

            let worker = task.clone();
            if let Err(e) = tokio::spawn(async move { worker.start().await }).await {
                logger.error(format!("Task {} panicked: {}", task.name(), e));
                task.core().fail();
            }
            if task.lifecycle() == Lifecycle::Error {
                metrics.task_failed();
            }

            task.stop();
            guard(&running).retain(|t| !Arc::ptr_eq(t, &task));
            logger.trace(format!(
                "Task {} finished in {:.1} ms",
                task.name(),
                task.core().timer().duration_ms()
            ));
            drop(permit);
            completed.notify_one();
        });

        true
    }

    /// Ask a task to stop. True if it had not started yet, meaning its body will be
    /// skipped or cut short.
    pub fn request_stop(&self, task: &T) -> bool {
        let was_idle = task.lifecycle() == Lifecycle::Idle;
        task.stop();
        was_idle
    }

    pub fn is_running(&self, task: &T) -> bool {
        task.lifecycle() == Lifecycle::Running
    }

    pub fn is_done(&self, task: &T) -> bool {
        task.lifecycle().is_finished()
    }

    /// Tasks submitted and not yet through their completion hook
    pub fn active_count(&self) -> usize {
        guard(&self.running).len()
    }

    pub fn active_one_shot_count(&self) -> usize {
        guard(&self.running)
            .iter()
            .filter(|t| !t.is_continuous())
            .count()
    }

    pub fn running_tasks_snapshot(&self) -> Vec<Arc<T>> {
        guard(&self.running).clone()
    }

    /// Fires once per task completion
    pub fn completion_signal(&self) -> Arc<Notify> {
        self.completed.clone()
    }

    /// Stop every task and wait until the running set is empty
    pub async fn drain_all(&self) {
        for task in self.running_tasks_snapshot() {
            task.stop();
        }
        while self.active_count() > 0 {
            tokio::time::sleep(self.drain_poll).await;
        }
    }

    pub async fn wait_for_one_shots(&self) {
        while self.active_one_shot_count() > 0 {
            tokio::time::sleep(self.drain_poll).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogLevel;
    use crate::task::TaskCore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Gauge {
        current: AtomicUsize,
        peak: AtomicUsize,
        runs: AtomicUsize,
    }

    struct Probe {
        core: TaskCore,
        hold: Duration,
        panics: bool,
        gauge: Arc<Gauge>,
    }

    impl Probe {
        fn new(name: &str, hold: Duration, gauge: Arc<Gauge>) -> Arc<Self> {
            Arc::new(Self {
                core: TaskCore::one_shot(name),
                hold,
                panics: false,
                gauge,
            })
        }

        fn panicking(name: &str) -> Arc<Self> {
            Arc::new(Self {
                core: TaskCore::one_shot(name),
                hold: Duration::ZERO,
                panics: true,
                gauge: Arc::default(),
            })
        }
    }

    #[async_trait]
    impl Task for Probe {
        type Output = usize;

        fn core(&self) -> &TaskCore {
            &self.core
        }

        async fn start(&self) {
            if !self.core.begin() {
                return;
            }
            if self.panics {
                panic!("probe failure");
            }
            let now = self.gauge.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.gauge.peak.fetch_max(now, Ordering::SeqCst);
            self.gauge.runs.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.hold).await;
            self.gauge.current.fetch_sub(1, Ordering::SeqCst);
            self.stop();
        }

        fn read_result(&self) -> usize {
            self.gauge.runs.load(Ordering::SeqCst)
        }
    }

    fn executor(budget: usize) -> Executor<Probe> {
        Executor::new(budget, Logger::new(LogLevel::Trace), Arc::new(PipelineMetrics::new()))
            .with_drain_poll(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_submit_runs_and_removes_task() {
        let exec = executor(2);
        let task = Probe::new("a", Duration::from_millis(5), Arc::default());

        assert!(exec.submit(task.clone()));
        assert_eq!(exec.active_count(), 1);

        exec.wait_for_one_shots().await;
        assert!(exec.is_done(&task));
        assert_eq!(task.lifecycle(), Lifecycle::Done);
        assert_eq!(task.read_result(), 1);
        assert_eq!(exec.active_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_budget() {
        let exec = executor(2);
        let gauge = Arc::new(Gauge::default());

        for i in 0..6 {
            exec.submit(Probe::new(&format!("t{i}"), Duration::from_millis(10), gauge.clone()));
        }
        exec.wait_for_one_shots().await;

        assert_eq!(gauge.runs.load(Ordering::SeqCst), 6);
        assert!(gauge.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_panicking_task_is_marked_error() {
        let metrics = Arc::new(PipelineMetrics::new());
        let exec: Executor<Probe> =
            Executor::new(1, Logger::new(LogLevel::Trace), metrics.clone())
                .with_drain_poll(Duration::from_millis(5));
        let task = Probe::panicking("boom");

        exec.submit(task.clone());
        exec.wait_for_one_shots().await;

        assert_eq!(task.lifecycle(), Lifecycle::Error);
        assert_eq!(metrics.snapshot().tasks_failed, 1);
    }

    #[tokio::test]
    async fn test_request_stop_before_start_skips_body() {
        let exec = executor(1);
        let gauge = Arc::new(Gauge::default());
        let blocker = Probe::new("blocker", Duration::from_millis(20), gauge.clone());
        let queued = Probe::new("queued", Duration::ZERO, gauge.clone());

        exec.submit(blocker);
        exec.submit(queued.clone());
        assert!(exec.request_stop(&queued));

        exec.wait_for_one_shots().await;
        assert_eq!(queued.lifecycle(), Lifecycle::Done);
        assert_eq!(gauge.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drain_all_empties_running_set() {
        let exec = executor(4);
        let gauge = Arc::new(Gauge::default());
        for i in 0..3 {
            exec.submit(Probe::new(&format!("t{i}"), Duration::from_millis(10), gauge.clone()));
        }

        exec.drain_all().await;
        assert_eq!(exec.active_count(), 0);
        assert!(exec.running_tasks_snapshot().is_empty());
    }

    #[test]
    fn test_submit_without_runtime_is_rejected() {
        let exec = executor(1);
        let task = Probe::new("orphan", Duration::ZERO, Arc::default());
        assert!(!exec.submit(task.clone()));
        assert_eq!(exec.active_count(), 0);
        assert_eq!(task.lifecycle(), Lifecycle::Idle);
    }
}
