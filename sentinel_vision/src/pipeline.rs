// THEORY:
// The `pipeline` module is the top-level API of the detection engine. It wires
// the core modules into one pass over a video and owns the run's lifecycle:
//
//     Idle -> Running -> Completed | Cancelled
//          \-> Failed            (source could not be opened)
//
// Per decoded frame, in strict order:
//   Stage 1: push the frame into the sliding window buffer.
//   Stage 2: ask the scheduler whether this frame closes a classification
//            window and whether progress is due.
//   Stage 3: classify the window and, on a positive, record an incident.
//   Stage 4: report progress.
//
// Everything a run touches outside its own memory (store, notifier, progress
// sink, snapshot writer) is injected through `Collaborators`. A driver owns
// its buffer and its `AnalysisRun` exclusively, so independent videos can be
// analysed concurrently by independent drivers.

use crate::core_modules::classifier::{Classifier, DEFAULT_CONFIDENCE_THRESHOLD};
use crate::core_modules::recorder::{IncidentRecorder, JpegSnapshotWriter, SnapshotWriter};
use crate::core_modules::scheduler::{DEFAULT_CLASSIFY_EVERY, DEFAULT_PROGRESS_EVERY, SamplingScheduler};
use crate::core_modules::window_buffer::SlidingWindowBuffer;
use crate::core_modules::frame::Frame;
use crate::error::{PipelineError, SourceError};
use crate::incident::{Confidence, Incident, UserId, VideoId};
use crate::notify::{NoNotifications, NotificationDispatcher};
use crate::progress::{NoProgress, ProgressSink};
use crate::source::{FrameSource, VideoInfo, VideoOpener};
use crate::store::{IncidentStore, VideoStatus};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Configuration for the detection pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Classify the window on every frame whose ordinal is a multiple of this.
    pub classify_every: u64,
    /// Emit a progress update on every frame whose ordinal is a multiple of this.
    pub progress_every: u64,
    /// Used when the owning user has not configured a threshold.
    pub default_confidence_threshold: Confidence,
    /// Frame rate assumed for timestamps when the container reports none.
    pub assumed_fps: f64,
    pub snapshot_root: PathBuf,
    /// Frames in flight between decoder and classifier in a pipelined run.
    pub channel_capacity: usize,
    pub max_concurrent_runs: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            classify_every: DEFAULT_CLASSIFY_EVERY,
            progress_every: DEFAULT_PROGRESS_EVERY,
            default_confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            assumed_fps: 30.0,
            snapshot_root: PathBuf::from("screenshots"),
            channel_capacity: 32,
            max_concurrent_runs: num_cpus::get(),
        }
    }
}

/// The external services a run talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn IncidentStore>,
    pub notifier: Arc<dyn NotificationDispatcher>,
    pub progress: Arc<dyn ProgressSink>,
    pub snapshots: Arc<dyn SnapshotWriter>,
}

impl Collaborators {
    /// A store with JPEG snapshots, no notifications and no progress output.
    pub fn new(store: Arc<dyn IncidentStore>) -> Self {
        Self {
            store,
            notifier: Arc::new(NoNotifications),
            progress: Arc::new(NoProgress),
            snapshots: Arc::new(JpegSnapshotWriter),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationDispatcher>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_snapshots(mut self, snapshots: Arc<dyn SnapshotWriter>) -> Self {
        self.snapshots = snapshots;
        self
    }
}

/// One video to analyse. The video row must already exist in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub video_id: VideoId,
    pub user_id: UserId,
    /// Human-readable name used in alerts.
    pub video_label: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

/// Cooperative cancellation, checked once per decoded frame.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
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

/// What a finished (completed or cancelled) run hands back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub video_id: VideoId,
    pub state: PipelineState,
    /// Detection order, strictly increasing in frame number.
    pub incidents: Vec<Incident>,
    pub frames_processed: u64,
    pub total_frames: u64,
    pub fps: f64,
    pub classifications: u64,
    /// Incidents kept in `incidents` that the store failed to persist.
    pub persist_failures: usize,
    /// False when the final video status could not be written.
    pub status_persisted: bool,
}

/// Transient state of one pipeline invocation.
pub struct AnalysisRun {
    pub video_id: VideoId,
    pub user_id: UserId,
    pub frame_count: u64,
    pub total_frames: u64,
    pub fps: f64,
    pub incidents: Vec<Incident>,
    video_label: String,
    threshold: Confidence,
    buffer: SlidingWindowBuffer,
    scheduler: SamplingScheduler,
    recorder: IncidentRecorder,
    classifications: u64,
    persist_failures: usize,
    /// False when the frame count or frame rate makes a fraction meaningless.
    progress_available: bool,
}

impl AnalysisRun {
    pub(crate) fn start(job: &AnalysisJob, info: VideoInfo, config: &PipelineConfig, collaborators: &Collaborators) -> Self {
        let threshold = resolve_threshold(collaborators.store.as_ref(), job.user_id, config.default_confidence_threshold);
        let timestamp_fps = if info.has_valid_fps() {
            info.fps
        } else {
            log::warn!(
                "Video {} reports fps {}; timestamps assume {} fps",
                job.video_id,
                info.fps,
                config.assumed_fps
            );
            config.assumed_fps
        };

        let progress_available = info.frame_count > 0 && info.has_valid_fps();
        if !progress_available {
            collaborators.progress.report_unavailable(&format!(
                "Video reports {} frames at {} fps; progress unavailable",
                info.frame_count, info.fps
            ));
        } else {
            collaborators.progress.report(
                0.0,
                &format!("Processing video: {:.1}s, {} frames", info.duration_seconds(), info.frame_count),
            );
        }

        log::info!(
            "Analysing video {} for user {} ({} frames, {} fps, threshold {:.2})",
            job.video_id,
            job.user_id,
            info.frame_count,
            info.fps,
            threshold
        );

        Self {
            video_id: job.video_id,
            user_id: job.user_id,
            frame_count: 0,
            total_frames: info.frame_count,
            fps: info.fps,
            incidents: Vec::new(),
            video_label: job.video_label.clone(),
            threshold,
            buffer: SlidingWindowBuffer::new(),
            scheduler: SamplingScheduler::new(config.classify_every, config.progress_every),
            recorder: IncidentRecorder::new(
                job.video_id,
                job.user_id,
                timestamp_fps,
                config.snapshot_root.clone(),
                collaborators.snapshots.clone(),
            ),
            classifications: 0,
            persist_failures: 0,
            progress_available,
        }
    }

    pub fn threshold(&self) -> Confidence {
        self.threshold
    }

    /// Runs stages 1-4 for the next decoded frame.
    pub(crate) fn ingest(&mut self, image: RgbImage, classifier: &mut dyn Classifier, collaborators: &Collaborators) {
        // Stage 1: Buffering
        self.frame_count += 1;
        let frame_number = self.frame_count;
        self.buffer.push(Frame::new(frame_number, image));

        // Stage 2: Scheduling
        let decision = self.scheduler.decide(frame_number, self.buffer.is_full(), self.total_frames);

        // Stage 3: Classification & Recording
        if decision.classify {
            if let Some(window) = self.buffer.window() {
                let result = classifier.classify(&window, self.threshold);
                self.classifications += 1;
                log::debug!(
                    "Frame {}: {} window positive={} confidence={:.3}",
                    frame_number,
                    classifier.name(),
                    result.is_positive,
                    result.confidence
                );
                if result.is_positive {
                    if let Some(recorded) = self.recorder.record(&window, result.confidence, collaborators.store.as_ref()) {
                        if recorded.persist_error.is_some() {
                            self.persist_failures += 1;
                        }
                        self.incidents.push(recorded.incident);
                    }
                }
            }
        }

        // Stage 4: Progress
        if decision.report_progress {
            match SamplingScheduler::progress_fraction(frame_number, self.total_frames) {
                Some(fraction) if self.progress_available => collaborators
                    .progress
                    .report(fraction, &format!("Analyzing... {:.1}% complete", fraction * 100.0)),
                _ => collaborators
                    .progress
                    .report_unavailable(&format!("Analyzing... {} frames processed", frame_number)),
            }
        }
    }

    /// Persists the final status and, for a completed run with incidents,
    /// notifies the owner exactly once.
    pub(crate) fn finish(self, state: PipelineState, collaborators: &Collaborators) -> RunReport {
        let status = match state {
            PipelineState::Cancelled => VideoStatus::Cancelled,
            _ => VideoStatus::Completed,
        };
        let status_persisted = match collaborators.store.finalize_video(self.video_id, status, self.incidents.len()) {
            Ok(()) => true,
            Err(e) => {
                log::error!("Failed to finalize video {}: {}", self.video_id, e);
                false
            }
        };

        if state == PipelineState::Completed {
            let message = format!("Analysis complete! Found {} incidents", self.incidents.len());
            if self.progress_available {
                collaborators.progress.report(1.0, &message);
            } else {
                collaborators.progress.report_unavailable(&message);
            }
            if !self.incidents.is_empty() {
                collaborators.notifier.notify(self.user_id, &self.video_label, &self.incidents);
            }
        } else {
            log::info!(
                "Analysis of video {} cancelled after {} frames with {} incidents",
                self.video_id,
                self.frame_count,
                self.incidents.len()
            );
        }

        log::info!(
            "Video {} finished: {} frames, {} windows classified, {} incidents",
            self.video_id,
            self.frame_count,
            self.classifications,
            self.incidents.len()
        );

        RunReport {
            video_id: self.video_id,
            state,
            incidents: self.incidents,
            frames_processed: self.frame_count,
            total_frames: self.total_frames,
            fps: self.fps,
            classifications: self.classifications,
            persist_failures: self.persist_failures,
            status_persisted,
        }
    }
}

/// The user's configured threshold if it is a usable probability, else the default.
pub fn resolve_threshold(store: &dyn IncidentStore, user_id: UserId, default: Confidence) -> Confidence {
    match store.confidence_threshold(user_id) {
        Ok(Some(threshold)) if threshold > 0.0 && threshold < 1.0 => threshold,
        Ok(Some(threshold)) => {
            log::warn!("Ignoring out-of-range threshold {} for user {}", threshold, user_id);
            default
        }
        Ok(None) => default,
        Err(e) => {
            log::warn!("Could not load threshold for user {}: {}", user_id, e);
            default
        }
    }
}

/// Reads the next frame, treating a decode failure as the end of the stream.
pub(crate) fn read_next(source: &mut dyn FrameSource, frames_so_far: u64) -> Option<RgbImage> {
    match source.next_frame() {
        Ok(frame) => frame,
        Err(SourceError::Decode(reason)) => {
            log::warn!("Frame decode failed after frame {}: {}; ending stream", frames_so_far, reason);
            None
        }
        Err(e) => {
            log::warn!("Frame source failed after frame {}: {}; ending stream", frames_so_far, e);
            None
        }
    }
}

/// Drives exactly one analysis from `Idle` to a terminal state.
pub struct PipelineDriver {
    pub(crate) config: PipelineConfig,
    pub(crate) classifier: Box<dyn Classifier>,
    pub(crate) collaborators: Collaborators,
    pub(crate) cancel: CancelToken,
    pub(crate) state: PipelineState,
}

impl PipelineDriver {
    pub fn new(config: PipelineConfig, classifier: Box<dyn Classifier>, collaborators: Collaborators) -> Self {
        Self {
            config,
            classifier,
            collaborators,
            cancel: CancelToken::new(),
            state: PipelineState::Idle,
        }
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Opens the job's video and analyses it. An unopenable source moves the
    /// driver to `Failed` without touching the store.
    pub fn run(&mut self, opener: &dyn VideoOpener, job: &AnalysisJob) -> Result<RunReport, PipelineError> {
        if self.state != PipelineState::Idle {
            return Err(PipelineError::AlreadyRan);
        }
        match opener.open(&job.path) {
            Ok(source) => self.run_source(source, job),
            Err(e) => Err(self.fail(&job.path, e)),
        }
    }

    /// Analyses an already opened source.
    pub fn run_source(&mut self, mut source: Box<dyn FrameSource>, job: &AnalysisJob) -> Result<RunReport, PipelineError> {
        if self.state != PipelineState::Idle {
            return Err(PipelineError::AlreadyRan);
        }
        self.state = PipelineState::Running;

        let mut run = AnalysisRun::start(job, source.info(), &self.config, &self.collaborators);

        let terminal = loop {
            if self.cancel.is_cancelled() {
                break PipelineState::Cancelled;
            }
            match read_next(source.as_mut(), run.frame_count) {
                Some(image) => run.ingest(image, self.classifier.as_mut(), &self.collaborators),
                None => break PipelineState::Completed,
            }
        };

        self.state = terminal;
        Ok(run.finish(terminal, &self.collaborators))
    }

    pub(crate) fn fail(&mut self, path: &Path, source: SourceError) -> PipelineError {
        log::error!("Could not open video file {}: {}", path.display(), source);
        self.state = PipelineState::Failed;
        PipelineError::SourceUnopenable { path: path.to_path_buf(), source }
    }
}

/// Produces a fresh classifier for each run.
pub type ClassifierFactory = Arc<dyn Fn() -> Box<dyn Classifier> + Send + Sync>;

/// Upload-to-report entry point: open, register, analyse.
#[derive(Clone)]
pub struct VideoAnalysisService {
    config: PipelineConfig,
    opener: Arc<dyn VideoOpener>,
    classifiers: ClassifierFactory,
    collaborators: Collaborators,
}

impl VideoAnalysisService {
    pub fn new(
        config: PipelineConfig,
        opener: Arc<dyn VideoOpener>,
        classifiers: ClassifierFactory,
        collaborators: Collaborators,
    ) -> Self {
        Self { config, opener, classifiers, collaborators }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Opens the source before registering the video, so a file that cannot
    /// be decoded leaves no trace in the store.
    pub fn submit(&self, user_id: UserId, filename: &str, path: &Path) -> Result<RunReport, PipelineError> {
        self.submit_with_cancel(user_id, filename, path, CancelToken::new())
    }

    pub fn submit_with_cancel(
        &self,
        user_id: UserId,
        filename: &str,
        path: &Path,
        cancel: CancelToken,
    ) -> Result<RunReport, PipelineError> {
        let mut driver = self.driver().with_cancel_token(cancel);
        let source = match self.opener.open(path) {
            Ok(source) => source,
            Err(e) => return Err(driver.fail(path, e)),
        };
        let video_id = self.collaborators.store.create_video(user_id, filename, path)?;
        let job = AnalysisJob {
            video_id,
            user_id,
            video_label: filename.to_string(),
            path: path.to_path_buf(),
        };
        driver.run_source(source, &job)
    }

    pub(crate) fn driver(&self) -> PipelineDriver {
        PipelineDriver::new(self.config.clone(), (self.classifiers)(), self.collaborators.clone())
    }

    pub(crate) fn opener(&self) -> &Arc<dyn VideoOpener> {
        &self.opener
    }

    pub(crate) fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }
}
