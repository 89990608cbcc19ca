//! Report write task

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use super::{Task, TaskCore};
use crate::logging::Logger;
use crate::shared::{ReportStore, guard};
use crate::sink::{ReportSink, SinkSummary};

/// Persists the report store through the sink in a single flush
pub struct WriteTask {
    core: TaskCore,
    reports: Arc<ReportStore>,
    sink: ReportSink,
    logger: Logger,
    summary: Mutex<Option<SinkSummary>>,
}

impl WriteTask {
    pub fn new(reports: Arc<ReportStore>, sink: ReportSink, logger: Logger) -> Self {
        Self {
            core: TaskCore::one_shot("FileWriter"),
            reports,
            sink,
            logger,
            summary: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Task for WriteTask {
    type Output = Option<SinkSummary>;

    fn core(&self) -> &TaskCore {
        &self.core
    }

    async fn start(&self) {
        // Persistence is never skipped, even when a stop arrived first
        self.core.begin();

        let records = self.reports.read();
        match self.sink.write_all(records).await {
            Ok(summary) => {
                self.logger.info(format!(
                    "Wrote {} rows to {}",
                    summary.rows,
                    self.sink.path().display()
                ));
                *guard(&self.summary) = Some(summary);
            }
            Err(e) => {
                self.logger.error(format!(
                    "Exception: {}, on file write {}",
                    e,
                    self.sink.path().display()
                ));
            }
        }

        self.stop();
    }

    fn read_result(&self) -> Option<SinkSummary> {
        *guard(&self.summary)
    }
}
