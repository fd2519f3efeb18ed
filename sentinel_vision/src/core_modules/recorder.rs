// THEORY:
// The recorder turns a positive window into a durable `Incident`:
//
// 1.  **Timestamp**: `frame_number / fps` of the newest frame in the window.
// 2.  **Snapshot**: the newest frame itself (not an average) is written as a
//     JPEG under a path derived from user, video and whole second. Writing is
//     best effort: one retry, then the incident is kept without an image.
// 3.  **Hand-off**: the incident is written to the store. A failed write is
//     reported back to the caller, which keeps the incident in memory and
//     carries on with the next frame.

use crate::core_modules::frame::{Frame, Window};
use crate::error::StoreError;
use crate::incident::{Confidence, FrameNumber, Incident, UserId, VideoId};
use crate::store::IncidentStore;
use chrono::Utc;
use image::ImageFormat;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Writes the snapshot image for an incident.
pub trait SnapshotWriter: Send + Sync {
    fn write(&self, path: &Path, frame: &Frame) -> Result<(), image::ImageError>;
}

/// Saves snapshots as JPEG files, creating parent directories on demand.
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegSnapshotWriter;

impl SnapshotWriter for JpegSnapshotWriter {
    fn write(&self, path: &Path, frame: &Frame) -> Result<(), image::ImageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        frame.image.save_with_format(path, ImageFormat::Jpeg)
    }
}

/// Result of recording one positive window.
#[derive(Debug)]
pub struct Recorded {
    pub incident: Incident,
    /// Set when the store rejected the incident.
    pub persist_error: Option<StoreError>,
}

pub struct IncidentRecorder {
    video_id: VideoId,
    user_id: UserId,
    fps: f64,
    snapshot_root: PathBuf,
    snapshots: Arc<dyn SnapshotWriter>,
    used_seconds: HashSet<u64>,
}

impl IncidentRecorder {
    pub fn new(
        video_id: VideoId,
        user_id: UserId,
        fps: f64,
        snapshot_root: impl Into<PathBuf>,
        snapshots: Arc<dyn SnapshotWriter>,
    ) -> Self {
        Self {
            video_id,
            user_id,
            fps,
            snapshot_root: snapshot_root.into(),
            snapshots,
            used_seconds: HashSet::new(),
        }
    }

    pub fn timestamp_for(&self, frame_number: FrameNumber) -> f64 {
        frame_number as f64 / self.fps
    }

    /// `<root>/user_<user>/incident_<video>_<second>.jpg`. A second already
    /// used in this run gets `_<frame>` appended so snapshots never overwrite
    /// each other.
    pub fn snapshot_path(&mut self, timestamp_seconds: f64, frame_number: FrameNumber) -> PathBuf {
        let second = timestamp_seconds.max(0.0).floor() as u64;
        let dir = self.snapshot_root.join(format!("user_{}", self.user_id));
        if self.used_seconds.insert(second) {
            dir.join(format!("incident_{}_{}.jpg", self.video_id, second))
        } else {
            dir.join(format!("incident_{}_{}_{}.jpg", self.video_id, second, frame_number))
        }
    }

    pub fn record(&mut self, window: &Window<'_>, confidence: Confidence, store: &dyn IncidentStore) -> Option<Recorded> {
        let frame = window.newest()?;
        let timestamp_seconds = self.timestamp_for(frame.number);
        let path = self.snapshot_path(timestamp_seconds, frame.number);
        let screenshot_path = self.write_snapshot(&path, frame);

        let incident = Incident {
            video_id: self.video_id,
            user_id: self.user_id,
            timestamp_seconds,
            frame_number: frame.number,
            confidence,
            screenshot_path,
            detected_at: Utc::now(),
        };

        let persist_error = store.record_incident(&incident).err();
        if let Some(e) = &persist_error {
            log::error!(
                "Failed to persist incident at frame {} of video {}: {}",
                incident.frame_number,
                self.video_id,
                e
            );
        }

        Some(Recorded { incident, persist_error })
    }

    fn write_snapshot(&self, path: &Path, frame: &Frame) -> Option<PathBuf> {
        let first = match self.snapshots.write(path, frame) {
            Ok(()) => return Some(path.to_path_buf()),
            Err(e) => e,
        };
        log::warn!("Snapshot write to {} failed, retrying: {}", path.display(), first);
        match self.snapshots.write(path, frame) {
            Ok(()) => Some(path.to_path_buf()),
            Err(e) => {
                log::warn!("Snapshot for frame {} dropped: {}", frame.number, e);
                None
            }
        }
    }
}
