use crate::{
    config::Config,
    engine::{ExtractionResult, OcrEngine},
    error::{Error, Result},
    postprocess,
    progress::ProgressTracker,
    report::{ReportBuilder, ReportConfig},
    staging::{CleanupFailure, CleanupReport, StagingStore},
    util::{base_name, now_rfc3339},
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BatchState {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub rows_written: usize,
    pub skipped: Vec<String>,
    pub cancelled: bool,
    pub started: String,
    pub finished: String,
    pub report_path: PathBuf,
}

#[derive(Debug, Clone)]
pub enum BatchEvent {
    Started {
        total: usize,
    },
    Progress {
        file: String,
        processed: usize,
        total: usize,
        percent: u8,
    },
    Skipped {
        file: String,
        reason: String,
    },
    Completed(BatchSummary),
    Failed {
        error: String,
    },
}

/// Cooperative cancellation, checked between files.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct BatchHandle {
    events: Receiver<BatchEvent>,
    cancel: CancelFlag,
    worker: JoinHandle<Result<BatchSummary>>,
}

impl BatchHandle {
    pub fn events(&self) -> &Receiver<BatchEvent> {
        &self.events
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn join(self) -> Result<BatchSummary> {
        self.worker
            .join()
            .unwrap_or_else(|_| Err(Error::WorkerPanicked))
    }
}

pub struct Pipeline<E: OcrEngine> {
    cfg: Config,
    engine: E,
    staging: StagingStore,
    report: ReportBuilder,
    skip_failed_files: bool,
    state: Mutex<BatchState>,
}

impl<E: OcrEngine> Pipeline<E> {
    pub fn new(cfg: &Config, engine: E) -> Result<Self> {
        let skip_failed_files = match cfg.pipeline.on_file_error.as_str() {
            "abort" => false,
            "skip" => true,
            other => {
                return Err(Error::Config(format!(
                    "unknown pipeline.on_file_error: {other}"
                )));
            }
        };
        Ok(Self {
            cfg: cfg.clone(),
            engine,
            staging: StagingStore::from_config(cfg)?,
            report: ReportBuilder::new(ReportConfig::from_config(cfg)),
            skip_failed_files,
            state: Mutex::new(BatchState::Idle),
        })
    }

    pub fn staging(&self) -> &StagingStore {
        &self.staging
    }

    pub fn report(&self) -> &ReportBuilder {
        &self.report
    }

    pub fn state(&self) -> BatchState {
        *self.lock_state()
    }

    /// Runs one batch on the calling thread. An empty `selection` means every
    /// staged file.
    pub fn process(
        &self,
        selection: &[PathBuf],
        cancel: &CancelFlag,
        events: &Sender<BatchEvent>,
    ) -> Result<BatchSummary> {
        {
            let mut state = self.lock_state();
            if *state == BatchState::Running {
                let _ = events.send(BatchEvent::Failed {
                    error: Error::Busy.to_string(),
                });
                return Err(Error::Busy);
            }
            *state = BatchState::Running;
        }

        let result = self.run_batch(selection, cancel, events);
        let final_state = match &result {
            Ok(summary) if summary.cancelled => BatchState::Cancelled,
            Ok(_) => BatchState::Completed,
            Err(_) => BatchState::Failed,
        };
        *self.lock_state() = final_state;

        match &result {
            Ok(summary) => {
                info!(
                    "batch finished state={:?} rows={} skipped={}",
                    final_state,
                    summary.rows_written,
                    summary.skipped.len()
                );
                let _ = events.send(BatchEvent::Completed(summary.clone()));
            }
            Err(e) => {
                error!("batch failed: {e}");
                let _ = events.send(BatchEvent::Failed {
                    error: e.to_string(),
                });
            }
        }
        result
    }

    fn run_batch(
        &self,
        selection: &[PathBuf],
        cancel: &CancelFlag,
        events: &Sender<BatchEvent>,
    ) -> Result<BatchSummary> {
        let started = now_rfc3339();
        let files = if selection.is_empty() {
            self.staging.list()?
        } else {
            selection.to_vec()
        };

        let mut summary = BatchSummary {
            rows_written: 0,
            skipped: Vec::new(),
            cancelled: false,
            started,
            finished: String::new(),
            report_path: self.report.path().to_path_buf(),
        };

        let total = files.len();
        let _ = events.send(BatchEvent::Started { total });
        if files.is_empty() {
            info!("nothing staged in {}", self.staging.dir().display());
            summary.finished = now_rfc3339();
            return Ok(summary);
        }
        info!("batch start files={total} language={}", self.cfg.ocr.language);

        let mut session = self.report.begin()?;
        let mut progress = ProgressTracker::new(total);

        for file in &files {
            if cancel.is_cancelled() {
                warn!("batch cancelled after {} of {total}", progress.processed());
                summary.cancelled = true;
                break;
            }

            let name = base_name(file);
            match self.extract(file, &name) {
                Ok(res) => {
                    if let Err(e) = session.append_row(
                        &res.source_file_name,
                        &res.recognized_text,
                        &res.source_image_path,
                    ) {
                        // The failed row never reached the book; keep the earlier ones.
                        if let Err(commit_err) = session.commit() {
                            warn!("could not persist rows before abort: {commit_err}");
                        }
                        return Err(e);
                    }
                    summary.rows_written += 1;
                }
                Err(e) if self.skip_failed_files && !e.is_batch_fatal() => {
                    warn!("skipping {}: {e}", file.display());
                    let _ = events.send(BatchEvent::Skipped {
                        file: name.clone(),
                        reason: e.to_string(),
                    });
                    summary.skipped.push(name.clone());
                }
                Err(e) => {
                    // Keep the rows that did succeed.
                    if let Err(commit_err) = session.commit() {
                        warn!("could not persist rows before abort: {commit_err}");
                    }
                    return Err(e);
                }
            }

            let percent = progress.advance();
            info!("{name} done ({percent}%)");
            let _ = events.send(BatchEvent::Progress {
                file: name,
                processed: progress.processed(),
                total,
                percent,
            });
        }

        session.commit()?;
        summary.finished = now_rfc3339();
        Ok(summary)
    }

    fn extract(&self, file: &std::path::Path, name: &str) -> Result<ExtractionResult> {
        let raw = self.engine.extract(file, &self.cfg.ocr.language)?;
        let text = postprocess::clean_text(&self.cfg.postprocess, &raw)
            .map_err(|e| Error::Config(format!("postprocess: {e:#}")))?;
        Ok(ExtractionResult {
            source_file_name: name.to_string(),
            recognized_text: text,
            source_image_path: file.to_path_buf(),
        })
    }

    /// Deletes staged files and the report. Refused while a batch is running.
    pub fn clear(&self) -> Result<CleanupReport> {
        let state = self.lock_state();
        if *state == BatchState::Running {
            return Err(Error::Busy);
        }

        let report = clear_workspace(&self.staging, &self.report);
        drop(state);
        Ok(report)
    }

    fn lock_state(&self) -> MutexGuard<'_, BatchState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Wipes the staging directory, then the report. Every failure is recorded and
/// logged; none stops the remaining deletions.
pub fn clear_workspace(staging: &StagingStore, report: &ReportBuilder) -> CleanupReport {
    let mut cleanup = staging.clear();
    match report.remove() {
        Ok(removed) => cleanup.report_removed = removed,
        Err(e) => {
            warn!("failed to delete report: {e}");
            cleanup.failures.push(CleanupFailure {
                path: report.path().to_path_buf(),
                error: e.to_string(),
            });
        }
    }
    info!(
        "cleanup removed={} failures={} report_removed={}",
        cleanup.removed,
        cleanup.failures.len(),
        cleanup.report_removed
    );
    cleanup
}

impl<E: OcrEngine + Send + Sync + 'static> Pipeline<E> {
    /// Runs [`Pipeline::process`] on a background thread.
    pub fn submit(self: &Arc<Self>, selection: Vec<PathBuf>) -> BatchHandle {
        let (tx, rx) = mpsc::channel();
        let cancel = CancelFlag::new();
        let pipeline = Arc::clone(self);
        let worker_cancel = cancel.clone();
        let worker = std::thread::spawn(move || pipeline.process(&selection, &worker_cancel, &tx));
        BatchHandle {
            events: rx,
            cancel,
            worker,
        }
    }
}
