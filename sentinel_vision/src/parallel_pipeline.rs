// THEORY:
// Two ways of spending more cores without changing a single result.
//
// 1.  **Pipelined run**: decoding and classification of ONE video overlap. A
//     producer on a blocking thread decodes frames into a bounded channel; a
//     consumer on another blocking thread feeds them, in arrival order, through
//     the same `AnalysisRun::ingest` the sequential driver uses. The channel is
//     FIFO and has a single consumer, so frame order, classification points and
//     incidents are identical to a sequential run. The bound keeps at most
//     `channel_capacity` decoded frames in memory.
//
// 2.  **Batch analysis**: MANY videos at once, one independent driver per
//     video, at most `max_concurrent_runs` in flight. Runs share nothing but
//     their collaborators, so interleaving cannot change any run's output.

use crate::error::PipelineError;
use crate::incident::UserId;
use crate::pipeline::{AnalysisJob, AnalysisRun, CancelToken, PipelineDriver, PipelineState, RunReport, VideoAnalysisService, read_next};
use crate::source::{FrameSource, VideoOpener};
use futures::future::join_all;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};

impl PipelineDriver {
    /// Opens the job's video and analyses it with decoding on its own thread.
    pub async fn run_pipelined(mut self, opener: &dyn VideoOpener, job: AnalysisJob) -> Result<RunReport, PipelineError> {
        if self.state != PipelineState::Idle {
            return Err(PipelineError::AlreadyRan);
        }
        match opener.open(&job.path) {
            Ok(source) => self.run_source_pipelined(source, job).await,
            Err(e) => Err(self.fail(&job.path, e)),
        }
    }

    pub async fn run_source_pipelined(
        mut self,
        source: Box<dyn FrameSource>,
        job: AnalysisJob,
    ) -> Result<RunReport, PipelineError> {
        if self.state != PipelineState::Idle {
            return Err(PipelineError::AlreadyRan);
        }
        self.state = PipelineState::Running;

        let info = source.info();
        let (tx, mut rx) = mpsc::channel::<RgbImage>(self.config.channel_capacity.max(1));

        // --- 1. Producer: decode ---
        let producer_cancel = self.cancel.clone();
        let producer = tokio::task::spawn_blocking(move || decode_into(source, tx, producer_cancel));

        // --- 2. Consumer: buffer, schedule, classify, record ---
        let PipelineDriver { config, mut classifier, collaborators, cancel, .. } = self;
        let consumer = tokio::task::spawn_blocking(move || {
            let mut run = AnalysisRun::start(&job, info, &config, &collaborators);
            let terminal = loop {
                if cancel.is_cancelled() {
                    break PipelineState::Cancelled;
                }
                match rx.blocking_recv() {
                    Some(image) => run.ingest(image, classifier.as_mut(), &collaborators),
                    None if cancel.is_cancelled() => break PipelineState::Cancelled,
                    None => break PipelineState::Completed,
                }
            };
            // Closing the receiver unblocks a producer waiting on a full channel.
            drop(rx);
            run.finish(terminal, &collaborators)
        });

        // --- 3. Join ---
        let (decoded, report) = tokio::join!(producer, consumer);
        let decoded = decoded.map_err(|e| PipelineError::Worker(format!("decoder task: {}", e)))?;
        let report = report.map_err(|e| PipelineError::Worker(format!("analysis task: {}", e)))?;
        log::debug!("Decoder for video {} produced {} frames", report.video_id, decoded);
        Ok(report)
    }
}

/// Decodes until end of stream, cancellation or a closed channel. Returns the
/// number of frames handed over.
fn decode_into(mut source: Box<dyn FrameSource>, tx: mpsc::Sender<RgbImage>, cancel: CancelToken) -> u64 {
    let mut sent = 0;
    while !cancel.is_cancelled() {
        let Some(image) = read_next(source.as_mut(), sent) else {
            break;
        };
        if tx.blocking_send(image).is_err() {
            break;
        }
        sent += 1;
    }
    sent
}

impl VideoAnalysisService {
    /// `submit`, with decoding overlapped with classification.
    pub async fn submit_pipelined(&self, user_id: UserId, filename: &str, path: &Path) -> Result<RunReport, PipelineError> {
        self.submit_pipelined_with_cancel(user_id, filename, path, CancelToken::new()).await
    }

    pub async fn submit_pipelined_with_cancel(
        &self,
        user_id: UserId,
        filename: &str,
        path: &Path,
        cancel: CancelToken,
    ) -> Result<RunReport, PipelineError> {
        let mut driver = self.driver().with_cancel_token(cancel);
        let source = match self.opener().open(path) {
            Ok(source) => source,
            Err(e) => return Err(driver.fail(path, e)),
        };
        let video_id = self.collaborators().store.create_video(user_id, filename, path)?;
        let job = AnalysisJob {
            video_id,
            user_id,
            video_label: filename.to_string(),
            path: path.to_path_buf(),
        };
        driver.run_source_pipelined(source, job).await
    }
}

/// One upload waiting for analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub user_id: UserId,
    pub filename: String,
    pub path: PathBuf,
}

/// Analyses many uploads concurrently, bounded by `max_concurrent_runs`.
pub struct BatchAnalyzer {
    service: VideoAnalysisService,
    permits: Arc<Semaphore>,
}

impl BatchAnalyzer {
    pub fn new(service: VideoAnalysisService) -> Self {
        let permits = Arc::new(Semaphore::new(service.config().max_concurrent_runs.max(1)));
        Self { service, permits }
    }

    /// One result per submission, in submission order. A failed run does not
    /// affect the others.
    pub async fn analyze_all(&self, submissions: Vec<Submission>) -> Vec<Result<RunReport, PipelineError>> {
        let runs = submissions.into_iter().map(|submission| {
            let service = self.service.clone();
            let permits = self.permits.clone();
            async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| PipelineError::Worker(e.to_string()))?;
                tokio::task::spawn_blocking(move || {
                    service.submit(submission.user_id, &submission.filename, &submission.path)
                })
                .await
                .map_err(|e| PipelineError::Worker(e.to_string()))?
            }
        });
        join_all(runs).await
    }
}
