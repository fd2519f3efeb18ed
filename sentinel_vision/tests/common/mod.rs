#![allow(dead_code)]

use image::RgbImage;
use sentinel_vision::core_modules::classifier::Classifier;
use sentinel_vision::core_modules::frame::Frame;
use sentinel_vision::core_modules::recorder::SnapshotWriter;
use sentinel_vision::core_modules::simulated::{ScriptedRolls, SimulatedClassifier};
use sentinel_vision::error::{SourceError, StoreError};
use sentinel_vision::incident::{Confidence, FrameNumber, Incident, UserId, VideoId};
use sentinel_vision::notify::NotificationDispatcher;
use sentinel_vision::pipeline::{AnalysisJob, CancelToken, Collaborators};
use sentinel_vision::progress::ProgressSink;
use sentinel_vision::source::{FrameSource, VideoInfo};
use sentinel_vision::store::{IncidentStore, MemoryStore, NotificationPreferences, VideoStatus};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const USER: UserId = 1;

/// Remembers snapshot paths instead of writing files.
#[derive(Default)]
pub struct RecordingSnapshots {
    pub paths: Mutex<Vec<PathBuf>>,
}

impl SnapshotWriter for RecordingSnapshots {
    fn write(&self, path: &Path, _frame: &Frame) -> Result<(), image::ImageError> {
        self.paths.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub calls: Mutex<Vec<(UserId, String, Vec<Incident>)>>,
}

impl NotificationDispatcher for RecordingNotifier {
    fn notify(&self, user_id: UserId, video_label: &str, incidents: &[Incident]) {
        self.calls.lock().unwrap().push((user_id, video_label.to_string(), incidents.to_vec()));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reported {
    Fraction(f32, String),
    Unavailable(String),
}

#[derive(Default)]
pub struct RecordingProgress {
    pub updates: Mutex<Vec<Reported>>,
}

impl RecordingProgress {
    pub fn updates(&self) -> Vec<Reported> {
        self.updates.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingProgress {
    fn report(&self, fraction: f32, message: &str) {
        self.updates.lock().unwrap().push(Reported::Fraction(fraction, message.to_string()));
    }

    fn report_unavailable(&self, message: &str) {
        self.updates.lock().unwrap().push(Reported::Unavailable(message.to_string()));
    }
}

/// A `MemoryStore` that refuses incidents at chosen frames.
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub reject_frames: HashSet<FrameNumber>,
}

impl IncidentStore for FlakyStore {
    fn create_video(&self, user_id: UserId, filename: &str, path: &Path) -> Result<VideoId, StoreError> {
        self.inner.create_video(user_id, filename, path)
    }

    fn record_incident(&self, incident: &Incident) -> Result<(), StoreError> {
        if self.reject_frames.contains(&incident.frame_number) {
            return Err(StoreError::Backend("database is locked".into()));
        }
        self.inner.record_incident(incident)
    }

    fn finalize_video(&self, video_id: VideoId, status: VideoStatus, incident_count: usize) -> Result<(), StoreError> {
        self.inner.finalize_video(video_id, status, incident_count)
    }

    fn notification_preferences(&self, user_id: UserId) -> Result<NotificationPreferences, StoreError> {
        self.inner.notification_preferences(user_id)
    }

    fn confidence_threshold(&self, user_id: UserId) -> Result<Option<Confidence>, StoreError> {
        self.inner.confidence_threshold(user_id)
    }
}

/// Wraps a source and trips a cancel token once `after` frames were read.
pub struct CancelAfter<S> {
    pub inner: S,
    pub token: CancelToken,
    pub after: u64,
    pub read: u64,
}

impl<S: FrameSource> FrameSource for CancelAfter<S> {
    fn info(&self) -> VideoInfo {
        self.inner.info()
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>, SourceError> {
        let frame = self.inner.next_frame()?;
        if frame.is_some() {
            self.read += 1;
            if self.read == self.after {
                self.token.cancel();
            }
        }
        Ok(frame)
    }
}

pub struct Harness {
    pub collaborators: Collaborators,
    pub notifier: Arc<RecordingNotifier>,
    pub progress: Arc<RecordingProgress>,
    pub snapshots: Arc<RecordingSnapshots>,
}

pub fn harness(store: Arc<dyn IncidentStore>) -> Harness {
    let notifier = Arc::new(RecordingNotifier::default());
    let progress = Arc::new(RecordingProgress::default());
    let snapshots = Arc::new(RecordingSnapshots::default());
    let collaborators = Collaborators::new(store)
        .with_notifier(notifier.clone())
        .with_progress(progress.clone())
        .with_snapshots(snapshots.clone());
    Harness { collaborators, notifier, progress, snapshots }
}

pub fn job(store: &dyn IncidentStore, path: &str) -> AnalysisJob {
    let video_id = store.create_video(USER, path, Path::new(path)).unwrap();
    AnalysisJob {
        video_id,
        user_id: USER,
        video_label: path.to_string(),
        path: PathBuf::from(path),
    }
}

/// A simulated classifier whose 1-based calls listed in `hits` come out positive.
pub fn scripted(calls: usize, hits: &[(usize, f64)]) -> Box<dyn Classifier> {
    Box::new(SimulatedClassifier::new(Box::new(ScriptedRolls::for_calls(calls, hits))))
}

/// A simulated classifier that never hits.
pub fn always_miss() -> Box<dyn Classifier> {
    Box::new(SimulatedClassifier::new(Box::new(ScriptedRolls::new([]).with_fallback(0.0))))
}

pub fn frames_and_confidences(incidents: &[Incident]) -> Vec<(FrameNumber, Confidence)> {
    incidents.iter().map(|i| (i.frame_number, i.confidence)).collect()
}
