// THEORY:
// The scheduler decouples three rates that would otherwise be tied together:
// how fast frames decode, how often the (expensive) classifier runs, and how
// often the (cheap) progress sink hears from us. Both cadences are counted in
// source frames, not wall-clock time, so a 30fps video is classified roughly
// once per second of footage no matter how quickly it decodes.
//
// The scheduler is stateless: every decision is a pure function of the frame
// ordinal, the buffer state and the container's frame count.

use crate::incident::FrameNumber;

pub const DEFAULT_CLASSIFY_EVERY: u64 = 30;
pub const DEFAULT_PROGRESS_EVERY: u64 = 300;

/// What the driver should do with the frame it just buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameDecision {
    pub classify: bool,
    pub report_progress: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct SamplingScheduler {
    classify_every: u64,
    progress_every: u64,
}

impl SamplingScheduler {
    pub fn new(classify_every: u64, progress_every: u64) -> Self {
        Self {
            classify_every: classify_every.max(1),
            progress_every: progress_every.max(1),
        }
    }

    pub fn should_classify(&self, frame_number: FrameNumber, buffer_full: bool) -> bool {
        buffer_full && frame_number % self.classify_every == 0
    }

    /// Cadence updates, plus one at the container's last frame. A zero frame
    /// count has no last frame, so only the cadence applies.
    pub fn should_report(&self, frame_number: FrameNumber, total_frames: u64) -> bool {
        frame_number % self.progress_every == 0 || (total_frames > 0 && frame_number == total_frames)
    }

    pub fn decide(&self, frame_number: FrameNumber, buffer_full: bool, total_frames: u64) -> FrameDecision {
        FrameDecision {
            classify: self.should_classify(frame_number, buffer_full),
            report_progress: self.should_report(frame_number, total_frames),
        }
    }

    /// `frames_processed / total_frames`, clamped to 1 because container frame
    /// counts are estimates. `None` when the total is unknown.
    pub fn progress_fraction(frames_processed: u64, total_frames: u64) -> Option<f32> {
        if total_frames == 0 {
            return None;
        }
        Some((frames_processed as f64 / total_frames as f64).min(1.0) as f32)
    }

    /// How many windows an `n`-frame video gets classified, given the first
    /// full buffer arrives at frame `capacity`.
    pub fn expected_classifications(&self, total_frames: u64, capacity: usize) -> u64 {
        let cadence_hits = total_frames / self.classify_every;
        let before_full = (capacity as u64).saturating_sub(1) / self.classify_every;
        cadence_hits.saturating_sub(before_full)
    }
}

impl Default for SamplingScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_CLASSIFY_EVERY, DEFAULT_PROGRESS_EVERY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifies_on_cadence_only_when_full() {
        let scheduler = SamplingScheduler::default();
        assert!(!scheduler.should_classify(29, true));
        assert!(scheduler.should_classify(30, true));
        assert!(!scheduler.should_classify(30, false));
        assert!(scheduler.should_classify(600, true));
    }

    #[test]
    fn test_reports_on_cadence_and_last_frame() {
        let scheduler = SamplingScheduler::default();
        assert!(scheduler.should_report(300, 1000));
        assert!(!scheduler.should_report(301, 1000));
        assert!(scheduler.should_report(450, 450));
        assert!(!scheduler.should_report(1, 0));
    }

    #[test]
    fn test_progress_fraction_guards_zero_total() {
        assert_eq!(SamplingScheduler::progress_fraction(10, 0), None);
        assert_eq!(SamplingScheduler::progress_fraction(150, 300), Some(0.5));
        assert_eq!(SamplingScheduler::progress_fraction(400, 300), Some(1.0));
    }

    #[test]
    fn test_expected_classifications() {
        let scheduler = SamplingScheduler::default();
        assert_eq!(scheduler.expected_classifications(600, 16), 20);
        assert_eq!(scheduler.expected_classifications(29, 16), 0);
        // With a long window the early cadence hits land before it fills.
        assert_eq!(scheduler.expected_classifications(120, 45), 3);
        let fast = SamplingScheduler::new(10, 300);
        assert_eq!(fast.expected_classifications(100, 16), 9);
    }
}
