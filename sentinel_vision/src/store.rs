// THEORY:
// The engine never owns a database connection. Everything it needs from
// persistence goes through the `IncidentStore` capability, injected by the
// caller, and the store's own transactional discipline serializes concurrent
// writes from independent runs.
//
// `MemoryStore` is the reference implementation: a mutex around a few maps.
// It backs the tests and any embedding that keeps results in process.

use crate::error::StoreError;
use crate::incident::{Confidence, Incident, UserId, VideoId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    Pending,
    Completed,
    Cancelled,
}

/// Whether and where a user wants incident alerts.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub enabled: bool,
    pub address: Option<String>,
}

/// Per-user settings the pipeline reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    pub notifications: NotificationPreferences,
    pub confidence_threshold: Option<Confidence>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub id: VideoId,
    pub user_id: UserId,
    pub filename: String,
    pub file_path: PathBuf,
    pub uploaded_at: DateTime<Utc>,
    pub status: VideoStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_incidents: usize,
}

pub trait IncidentStore: Send + Sync {
    fn create_video(&self, user_id: UserId, filename: &str, path: &Path) -> Result<VideoId, StoreError>;

    fn record_incident(&self, incident: &Incident) -> Result<(), StoreError>;

    /// Marks the video analysed and stamps the completion time.
    fn finalize_video(&self, video_id: VideoId, status: VideoStatus, incident_count: usize) -> Result<(), StoreError>;

    fn notification_preferences(&self, user_id: UserId) -> Result<NotificationPreferences, StoreError>;

    /// The user's own detection threshold, if they set one.
    fn confidence_threshold(&self, user_id: UserId) -> Result<Option<Confidence>, StoreError>;
}

#[derive(Default)]
struct MemoryInner {
    next_video_id: VideoId,
    videos: BTreeMap<VideoId, VideoRecord>,
    incidents: Vec<Incident>,
    users: HashMap<UserId, UserSettings>,
    writes: usize,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, user_id: UserId, settings: UserSettings) -> Self {
        self.lock().users.insert(user_id, settings);
        self
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn video(&self, video_id: VideoId) -> Option<VideoRecord> {
        self.lock().videos.get(&video_id).cloned()
    }

    pub fn incidents_for(&self, video_id: VideoId) -> Vec<Incident> {
        self.lock().incidents.iter().filter(|i| i.video_id == video_id).cloned().collect()
    }

    /// Number of mutating calls the store has accepted.
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }
}

impl IncidentStore for MemoryStore {
    fn create_video(&self, user_id: UserId, filename: &str, path: &Path) -> Result<VideoId, StoreError> {
        let mut inner = self.lock();
        inner.next_video_id += 1;
        let id = inner.next_video_id;
        inner.videos.insert(
            id,
            VideoRecord {
                id,
                user_id,
                filename: filename.to_string(),
                file_path: path.to_path_buf(),
                uploaded_at: Utc::now(),
                status: VideoStatus::Pending,
                completed_at: None,
                total_incidents: 0,
            },
        );
        inner.writes += 1;
        Ok(id)
    }

    fn record_incident(&self, incident: &Incident) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if !inner.videos.contains_key(&incident.video_id) {
            return Err(StoreError::UnknownVideo(incident.video_id));
        }
        inner.incidents.push(incident.clone());
        inner.writes += 1;
        Ok(())
    }

    fn finalize_video(&self, video_id: VideoId, status: VideoStatus, incident_count: usize) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let video = inner.videos.get_mut(&video_id).ok_or(StoreError::UnknownVideo(video_id))?;
        video.status = status;
        video.total_incidents = incident_count;
        video.completed_at = Some(Utc::now());
        inner.writes += 1;
        Ok(())
    }

    fn notification_preferences(&self, user_id: UserId) -> Result<NotificationPreferences, StoreError> {
        Ok(self.lock().users.get(&user_id).map(|u| u.notifications.clone()).unwrap_or_default())
    }

    fn confidence_threshold(&self, user_id: UserId) -> Result<Option<Confidence>, StoreError> {
        Ok(self.lock().users.get(&user_id).and_then(|u| u.confidence_threshold))
    }
}
