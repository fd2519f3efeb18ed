// THEORY:
// Notification is fire-and-forget from the pipeline's point of view. The
// driver calls `NotificationDispatcher::notify` at most once per completed run
// that found something, and the dispatcher contract has no error channel:
// every failure (opted-out user, missing address, mailer down) is logged and
// swallowed inside the dispatcher. Delivery is best effort, at most once.

use crate::incident::{Incident, UserId, format_timestamp};
use crate::store::IncidentStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Incidents listed individually in an alert before it summarizes the rest.
pub const ALERT_LISTED_INCIDENTS: usize = 5;

pub trait NotificationDispatcher: Send + Sync {
    fn notify(&self, user_id: UserId, video_label: &str, incidents: &[Incident]);
}

/// A dispatcher that drops every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoNotifications;

impl NotificationDispatcher for NoNotifications {
    fn notify(&self, _user_id: UserId, _video_label: &str, _incidents: &[Incident]) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub subject: String,
    pub body: String,
}

impl AlertMessage {
    pub fn compose(video_label: &str, incidents: &[Incident], completed_at: DateTime<Utc>) -> Self {
        let subject = format!("Violence Detection Alert - {} incidents found", incidents.len());

        let mut body = format!(
            "Violence has been detected in your uploaded video: {}\n\n\
             Detection Summary:\n\
             - Total incidents: {}\n\
             - Video file: {}\n\
             - Analysis completed: {}\n\n\
             Detected Incidents:\n",
            video_label,
            incidents.len(),
            video_label,
            completed_at.format("%Y-%m-%d %H:%M:%S"),
        );

        for (i, incident) in incidents.iter().take(ALERT_LISTED_INCIDENTS).enumerate() {
            body.push_str(&format!(
                "   {}. Time: {} - Confidence: {:.1}%\n",
                i + 1,
                format_timestamp(incident.timestamp_seconds),
                incident.confidence * 100.0
            ));
        }
        if incidents.len() > ALERT_LISTED_INCIDENTS {
            body.push_str(&format!("   ... and {} more incidents\n", incidents.len() - ALERT_LISTED_INCIDENTS));
        }
        body.push_str("\nPlease log in to review the full analysis.\n");

        Self { subject, body }
    }
}

/// Delivers a composed alert. Transport (SMTP or otherwise) lives behind this.
pub trait Mailer: Send + Sync {
    fn send(&self, to: &str, message: &AlertMessage) -> Result<(), String>;
}

/// Logs alerts instead of sending them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, to: &str, message: &AlertMessage) -> Result<(), String> {
        log::info!("Alert for {}: {}\n{}", to, message.subject, message.body);
        Ok(())
    }
}

/// Checks the user's preferences, composes the alert and hands it to a mailer.
pub struct EmailDispatcher<M> {
    store: Arc<dyn IncidentStore>,
    mailer: M,
}

impl<M: Mailer> EmailDispatcher<M> {
    pub fn new(store: Arc<dyn IncidentStore>, mailer: M) -> Self {
        Self { store, mailer }
    }
}

impl<M: Mailer> NotificationDispatcher for EmailDispatcher<M> {
    fn notify(&self, user_id: UserId, video_label: &str, incidents: &[Incident]) {
        let preferences = match self.store.notification_preferences(user_id) {
            Ok(preferences) => preferences,
            Err(e) => {
                log::warn!("Could not load notification preferences for user {}: {}", user_id, e);
                return;
            }
        };
        if !preferences.enabled {
            log::info!("Email notifications disabled for user {}", user_id);
            return;
        }
        let Some(address) = preferences.address.filter(|a| !a.trim().is_empty()) else {
            log::info!("No notification email set for user {}", user_id);
            return;
        };

        let message = AlertMessage::compose(video_label, incidents, Utc::now());
        match self.mailer.send(&address, &message) {
            Ok(()) => log::info!("Email notification sent to {}", address),
            Err(e) => log::warn!("Failed to send email notification to {}: {}", address, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, NotificationPreferences, UserSettings};
    use chrono::TimeZone;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<(String, AlertMessage)>>,
        fail: bool,
    }

    impl Mailer for &RecordingMailer {
        fn send(&self, to: &str, message: &AlertMessage) -> Result<(), String> {
            self.sent.lock().unwrap().push((to.to_string(), message.clone()));
            if self.fail { Err("connection refused".into()) } else { Ok(()) }
        }
    }

    fn incident(second: f64, confidence: f32) -> Incident {
        Incident {
            video_id: 1,
            user_id: 1,
            timestamp_seconds: second,
            frame_number: (second * 30.0) as u64,
            confidence,
            screenshot_path: None,
            detected_at: Utc::now(),
        }
    }

    fn store_with(preferences: NotificationPreferences) -> Arc<dyn IncidentStore> {
        Arc::new(MemoryStore::new().with_user(1, UserSettings { notifications: preferences, confidence_threshold: None }))
    }

    #[test]
    fn test_compose_lists_first_five() {
        let incidents: Vec<Incident> = (1..=7).map(|s| incident(s as f64 * 61.0, 0.9)).collect();
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let message = AlertMessage::compose("match.mp4", &incidents, at);

        assert_eq!(message.subject, "Violence Detection Alert - 7 incidents found");
        assert!(message.body.contains("1. Time: 01:01 - Confidence: 90.0%"));
        assert!(message.body.contains("5. Time: 05:05"));
        assert!(!message.body.contains("6. Time:"));
        assert!(message.body.contains("... and 2 more incidents"));
        assert!(message.body.contains("2026-03-01 12:00:00"));
    }

    #[test]
    fn test_sends_when_enabled() {
        let mailer = RecordingMailer::default();
        let dispatcher = EmailDispatcher::new(
            store_with(NotificationPreferences { enabled: true, address: Some("ops@example.com".into()) }),
            &mailer,
        );
        dispatcher.notify(1, "clip.mp4", &[incident(4.0, 0.91)]);
        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "ops@example.com");
    }

    #[test]
    fn test_skips_disabled_or_missing_address() {
        let mailer = RecordingMailer::default();
        EmailDispatcher::new(store_with(NotificationPreferences { enabled: false, address: Some("a@b.c".into()) }), &mailer)
            .notify(1, "clip.mp4", &[incident(4.0, 0.91)]);
        EmailDispatcher::new(store_with(NotificationPreferences { enabled: true, address: None }), &mailer)
            .notify(1, "clip.mp4", &[incident(4.0, 0.91)]);
        assert!(mailer.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_mailer_failure_is_swallowed() {
        let mailer = RecordingMailer { fail: true, ..Default::default() };
        let dispatcher = EmailDispatcher::new(
            store_with(NotificationPreferences { enabled: true, address: Some("ops@example.com".into()) }),
            &mailer,
        );
        dispatcher.notify(1, "clip.mp4", &[incident(4.0, 0.91)]);
        assert_eq!(mailer.sent.lock().unwrap().len(), 1);
    }
}
