//! Units of work run by the executor
//!
//! Every task exposes the same contract through [`Task`]: `start` is the worker
//! entry point, `stop` is idempotent and may be called by the task itself and again
//! by the executor's completion hook, `read_result` hands back what the task
//! produced. Lifecycle is owned by the task's [`TaskCore`]; the executor and the
//! orchestrator only observe it.
//!
//! The pipeline runs a closed set of variants, gathered in [`PipelineTask`].

pub mod download;
pub mod log;
pub mod read;
pub mod write;

pub use download::DownloadTask;
pub use log::{LogDrain, LogFile, LogTask};
pub use read::{ReadOutcome, ReadTask, validate_url};
pub use write::WriteTask;

use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::watch;

use crate::record::Record;
use crate::shared::guard;
use crate::sink::SinkSummary;
use crate::timer::Timer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    Idle,
    Running,
    Done,
    Error,
}

impl Lifecycle {
    pub fn is_finished(self) -> bool {
        matches!(self, Lifecycle::Done | Lifecycle::Error)
    }
}

#[derive(Debug)]
struct CoreState {
    lifecycle: Lifecycle,
    timer: Timer,
}

/// Name, lifecycle, timer and stop signal shared by every task variant
///
/// Transitions:
/// - `begin`: Idle -> Running
/// - `stop`: Idle -> Done, Running -> Done for one-shot tasks; continuous tasks
///   only see the stop signal and finish themselves
/// - `finish`: Running -> Done
/// - `fail`: anything -> Error
#[derive(Debug)]
pub struct TaskCore {
    name: String,
    continuous: bool,
    state: Mutex<CoreState>,
    stop_tx: watch::Sender<bool>,
}

impl TaskCore {
    pub fn one_shot(name: impl Into<String>) -> Self {
        Self::new(name.into(), false)
    }

    pub fn continuous(name: impl Into<String>) -> Self {
        Self::new(name.into(), true)
    }

    fn new(name: String, continuous: bool) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            name,
            continuous,
            state: Mutex::new(CoreState {
                lifecycle: Lifecycle::Idle,
                timer: Timer::new(),
            }),
            stop_tx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_continuous(&self) -> bool {
        self.continuous
    }

    pub fn lifecycle(&self) -> Lifecycle {
        guard(&self.state).lifecycle
    }

    pub fn timer(&self) -> Timer {
        guard(&self.state).timer
    }

    /// Enter Running. False when the task was stopped before it got a worker.
    pub fn begin(&self) -> bool {
        let mut state = guard(&self.state);
        if state.lifecycle != Lifecycle::Idle {
            return false;
        }
        state.lifecycle = Lifecycle::Running;
        state.timer.start();
        true
    }

    /// Raise the stop signal and settle the lifecycle. Returns true if this call
    /// changed the lifecycle; repeated calls are no-ops.
    pub fn stop(&self) -> bool {
        self.stop_tx.send_replace(true);

        let mut state = guard(&self.state);
        match state.lifecycle {
            Lifecycle::Idle => {
                state.lifecycle = Lifecycle::Done;
                true
            }
            Lifecycle::Running if !self.continuous => {
                state.lifecycle = Lifecycle::Done;
                state.timer.stop();
                true
            }
            _ => false,
        }
    }

    pub fn finish(&self) {
        let mut state = guard(&self.state);
        if state.lifecycle == Lifecycle::Running {
            state.lifecycle = Lifecycle::Done;
            state.timer.stop();
        }
    }

    pub fn fail(&self) {
        let mut state = guard(&self.state);
        state.lifecycle = Lifecycle::Error;
        state.timer.stop();
    }

    pub fn stop_requested(&self) -> bool {
        *self.stop_tx.borrow()
    }

    pub fn stop_signal(&self) -> StopSignal {
        StopSignal {
            rx: self.stop_tx.subscribe(),
        }
    }
}

/// Owned view of a task's stop flag, usable from spawned futures
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn is_raised(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once stop has been requested
    pub async fn raised(&mut self) {
        loop {
            let raised = *self.rx.borrow_and_update();
            if raised {
                return;
            }
            if self.rx.changed().await.is_err() {
                // Owning task is gone; nobody can raise it anymore
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Uniform start/stop/result contract
#[async_trait]
pub trait Task: Send + Sync + 'static {
    type Output: Send;

    fn core(&self) -> &TaskCore;

    /// Worker entry point. Runs to completion on the calling worker and leaves the
    /// lifecycle Done or Error.
    async fn start(&self);

    fn read_result(&self) -> Self::Output;

    fn stop(&self) -> bool {
        self.core().stop()
    }

    fn name(&self) -> &str {
        self.core().name()
    }

    fn lifecycle(&self) -> Lifecycle {
        self.core().lifecycle()
    }

    fn is_continuous(&self) -> bool {
        self.core().is_continuous()
    }
}

/// Every task kind the pipeline submits
pub enum PipelineTask {
    Read(ReadTask),
    Download(DownloadTask),
    Write(WriteTask),
    Log(LogTask),
}

#[derive(Debug, Clone)]
pub enum TaskOutput {
    Read(ReadOutcome),
    Download(Record),
    Write(Option<SinkSummary>),
    Log(usize),
}

#[async_trait]
impl Task for PipelineTask {
    type Output = TaskOutput;

    fn core(&self) -> &TaskCore {
        match self {
            PipelineTask::Read(task) => task.core(),
            PipelineTask::Download(task) => task.core(),
            PipelineTask::Write(task) => task.core(),
            PipelineTask::Log(task) => task.core(),
        }
    }

    async fn start(&self) {
        match self {
            PipelineTask::Read(task) => task.start().await,
            PipelineTask::Download(task) => task.start().await,
            PipelineTask::Write(task) => task.start().await,
            PipelineTask::Log(task) => task.start().await,
        }
    }

    fn read_result(&self) -> TaskOutput {
        match self {
            PipelineTask::Read(task) => TaskOutput::Read(task.read_result()),
            PipelineTask::Download(task) => TaskOutput::Download(task.read_result()),
            PipelineTask::Write(task) => TaskOutput::Write(task.read_result()),
            PipelineTask::Log(task) => TaskOutput::Log(task.read_result()),
        }
    }
}
