use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub type VideoId = i64;
pub type UserId = i64;
pub type FrameNumber = u64;
pub type Confidence = f32;

/// A recorded positive detection. Created once per positive window and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub video_id: VideoId,
    pub user_id: UserId,
    /// Position in the source video, `frame_number / fps`.
    pub timestamp_seconds: f64,
    /// 1-based ordinal of the newest frame in the classified window.
    pub frame_number: FrameNumber,
    /// Probability of the violence class, in `[0, 1]`.
    pub confidence: Confidence,
    /// `None` when the snapshot could not be written.
    pub screenshot_path: Option<PathBuf>,
    pub detected_at: DateTime<Utc>,
}

impl Incident {
    pub fn formatted_timestamp(&self) -> String {
        format_timestamp(self.timestamp_seconds)
    }
}

/// Formats a video position as `MM:SS`. Minutes are not wrapped into hours,
/// so one hour renders as `60:00`.
pub fn format_timestamp(seconds: f64) -> String {
    let whole = if seconds.is_finite() && seconds > 0.0 { seconds.floor() as u64 } else { 0 };
    format!("{:02}:{:02}", whole / 60, whole % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp_boundaries() {
        assert_eq!(format_timestamp(0.0), "00:00");
        assert_eq!(format_timestamp(59.0), "00:59");
        assert_eq!(format_timestamp(60.0), "01:00");
        assert_eq!(format_timestamp(3599.0), "59:59");
        assert_eq!(format_timestamp(3600.0), "60:00");
    }

    #[test]
    fn test_format_timestamp_truncates_fraction() {
        assert_eq!(format_timestamp(4.99), "00:04");
        assert_eq!(format_timestamp(17.0), "00:17");
    }

    #[test]
    fn test_format_timestamp_is_stable_for_invalid_input() {
        assert_eq!(format_timestamp(-3.0), "00:00");
        assert_eq!(format_timestamp(f64::NAN), "00:00");
    }
}
