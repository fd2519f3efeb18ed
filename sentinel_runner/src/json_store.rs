// THEORY:
// A file-backed `IncidentStore` for the command-line runner. The whole state
// is one JSON document. Every mutation is applied to a copy, the copy is
// written to a temp file and renamed over the old document, and only then is
// it swapped into memory, so the file and the in-memory view never disagree
// and a crash mid-write leaves the previous document intact.

use chrono::Utc;
use sentinel_vision::error::StoreError;
use sentinel_vision::incident::{Confidence, Incident, UserId, VideoId};
use sentinel_vision::store::{IncidentStore, NotificationPreferences, UserSettings, VideoRecord, VideoStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const DOCUMENT_NAME: &str = "sentinel.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Document {
    next_video_id: VideoId,
    videos: BTreeMap<VideoId, VideoRecord>,
    incidents: Vec<Incident>,
    users: BTreeMap<UserId, UserSettings>,
}

pub struct JsonStore {
    path: PathBuf,
    doc: Mutex<Document>,
}

impl JsonStore {
    /// Opens `<dir>/sentinel.json`, creating the directory if needed. A
    /// missing document starts empty.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(DOCUMENT_NAME);
        let doc = if path.exists() { serde_json::from_slice(&fs::read(&path)?)? } else { Document::default() };
        Ok(Self { path, doc: Mutex::new(doc) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn set_user_settings(&self, user_id: UserId, settings: UserSettings) -> Result<(), StoreError> {
        self.update(|doc| {
            doc.users.insert(user_id, settings);
            Ok(())
        })
    }

    pub fn user_settings(&self, user_id: UserId) -> Option<UserSettings> {
        self.lock().users.get(&user_id).cloned()
    }

    pub fn video(&self, video_id: VideoId) -> Option<VideoRecord> {
        self.lock().videos.get(&video_id).cloned()
    }

    pub fn incidents_for(&self, video_id: VideoId) -> Vec<Incident> {
        self.lock().incidents.iter().filter(|i| i.video_id == video_id).cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, Document> {
        self.doc.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn update<T>(&self, apply: impl FnOnce(&mut Document) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let mut doc = self.lock();
        let mut next = doc.clone();
        let out = apply(&mut next)?;
        self.write(&next)?;
        *doc = next;
        Ok(out)
    }

    fn write(&self, doc: &Document) -> Result<(), StoreError> {
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(doc)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl IncidentStore for JsonStore {
    fn create_video(&self, user_id: UserId, filename: &str, path: &Path) -> Result<VideoId, StoreError> {
        self.update(|doc| {
            doc.next_video_id += 1;
            let id = doc.next_video_id;
            doc.videos.insert(
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
            Ok(id)
        })
    }

    fn record_incident(&self, incident: &Incident) -> Result<(), StoreError> {
        self.update(|doc| {
            if !doc.videos.contains_key(&incident.video_id) {
                return Err(StoreError::UnknownVideo(incident.video_id));
            }
            doc.incidents.push(incident.clone());
            Ok(())
        })
    }

    fn finalize_video(&self, video_id: VideoId, status: VideoStatus, incident_count: usize) -> Result<(), StoreError> {
        self.update(|doc| {
            let video = doc.videos.get_mut(&video_id).ok_or(StoreError::UnknownVideo(video_id))?;
            video.status = status;
            video.total_incidents = incident_count;
            video.completed_at = Some(Utc::now());
            Ok(())
        })
    }

    fn notification_preferences(&self, user_id: UserId) -> Result<NotificationPreferences, StoreError> {
        Ok(self.lock().users.get(&user_id).map(|u| u.notifications.clone()).unwrap_or_default())
    }

    fn confidence_threshold(&self, user_id: UserId) -> Result<Option<Confidence>, StoreError> {
        Ok(self.lock().users.get(&user_id).and_then(|u| u.confidence_threshold))
    }
}
