mod common;

use common::*;
use sentinel_vision::core_modules::simulated::SimulatedClassifier;
use sentinel_vision::error::PipelineError;
use sentinel_vision::parallel_pipeline::{BatchAnalyzer, Submission};
use sentinel_vision::pipeline::{
    CancelToken, ClassifierFactory, PipelineConfig, PipelineDriver, PipelineState, RunReport, VideoAnalysisService,
};
use sentinel_vision::source::{SyntheticOpener, SyntheticVideo};
use sentinel_vision::store::{MemoryStore, VideoStatus};
use sentinel_vision::Classifier;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn seeded(seed: u64) -> Box<dyn Classifier> {
    Box::new(SimulatedClassifier::seeded(seed))
}

fn sequential(seed: u64, video: SyntheticVideo) -> RunReport {
    let store = Arc::new(MemoryStore::new());
    let h = harness(store.clone());
    let job = job(store.as_ref(), "clip.mp4");
    let opener = SyntheticOpener::new().with_video("clip.mp4", video);
    let mut driver = PipelineDriver::new(PipelineConfig::default(), seeded(seed), h.collaborators.clone());
    driver.run(&opener, &job).unwrap()
}

async fn pipelined(seed: u64, video: SyntheticVideo, channel_capacity: usize) -> RunReport {
    let store = Arc::new(MemoryStore::new());
    let h = harness(store.clone());
    let job = job(store.as_ref(), "clip.mp4");
    let opener = SyntheticOpener::new().with_video("clip.mp4", video);
    let config = PipelineConfig { channel_capacity, ..PipelineConfig::default() };
    let driver = PipelineDriver::new(config, seeded(seed), h.collaborators.clone());
    driver.run_pipelined(&opener, job).await.unwrap()
}

#[tokio::test]
async fn test_pipelined_run_matches_sequential() {
    let expected = sequential(42, SyntheticVideo::new(90.0, 30.0));

    for capacity in [1, 4, 32] {
        let report = pipelined(42, SyntheticVideo::new(90.0, 30.0), capacity).await;
        assert_eq!(report.state, PipelineState::Completed);
        assert_eq!(report.frames_processed, expected.frames_processed);
        assert_eq!(report.classifications, expected.classifications);
        assert_eq!(frames_and_confidences(&report.incidents), frames_and_confidences(&expected.incidents));
    }
}

#[tokio::test]
async fn test_pipelined_scenario_persists_and_notifies() {
    let store = Arc::new(MemoryStore::new());
    let h = harness(store.clone());
    let job = job(store.as_ref(), "fight.mp4");
    let video_id = job.video_id;
    let opener = SyntheticOpener::new().with_video("fight.mp4", SyntheticVideo::new(20.0, 30.0));

    let classifier = scripted(20, &[(4, 0.5), (12, 0.5), (17, 0.5)]);
    let driver = PipelineDriver::new(PipelineConfig::default(), classifier, h.collaborators.clone());
    let report = driver.run_pipelined(&opener, job).await.unwrap();

    let frames: Vec<u64> = report.incidents.iter().map(|i| i.frame_number).collect();
    assert_eq!(frames, vec![120, 360, 510]);
    assert_eq!(store.video(video_id).unwrap().total_incidents, 3);
    assert_eq!(h.notifier.calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_pipelined_unopenable_source_writes_nothing() {
    let store = Arc::new(MemoryStore::new());
    let h = harness(store.clone());
    let job = sentinel_vision::AnalysisJob {
        video_id: 9,
        user_id: USER,
        video_label: "gone.mp4".into(),
        path: PathBuf::from("gone.mp4"),
    };

    let driver = PipelineDriver::new(PipelineConfig::default(), always_miss(), h.collaborators.clone());
    let result = driver.run_pipelined(&SyntheticOpener::new(), job).await;

    assert!(matches!(result, Err(PipelineError::SourceUnopenable { .. })));
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn test_pipelined_cancellation() {
    let store = Arc::new(MemoryStore::new());
    let h = harness(store.clone());
    let job = job(store.as_ref(), "fight.mp4");
    let video_id = job.video_id;
    let token = CancelToken::new();
    let source = CancelAfter { inner: SyntheticVideo::new(20.0, 30.0), token: token.clone(), after: 200, read: 0 };

    let driver = PipelineDriver::new(PipelineConfig { channel_capacity: 4, ..PipelineConfig::default() }, always_miss(), h.collaborators.clone())
        .with_cancel_token(token);
    let report = driver.run_source_pipelined(Box::new(source), job).await.unwrap();

    assert_eq!(report.state, PipelineState::Cancelled);
    assert!(report.frames_processed <= 200);
    assert_eq!(store.video(video_id).unwrap().status, VideoStatus::Cancelled);
    assert!(h.notifier.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_service_pipelined_submission() {
    let store = Arc::new(MemoryStore::new());
    let h = harness(store.clone());
    let factory: ClassifierFactory = Arc::new(|| scripted(10, &[(5, 0.5)]));
    let opener = SyntheticOpener::new().with_video("uploads/a.mp4", SyntheticVideo::new(10.0, 30.0));
    let service = VideoAnalysisService::new(PipelineConfig::default(), Arc::new(opener), factory, h.collaborators.clone());

    let report = service.submit_pipelined(USER, "a.mp4", Path::new("uploads/a.mp4")).await.unwrap();
    assert_eq!(report.incidents.len(), 1);
    assert_eq!(report.incidents[0].frame_number, 150);
    assert_eq!(store.video(report.video_id).unwrap().status, VideoStatus::Completed);
}

#[tokio::test]
async fn test_batch_keeps_submission_order_and_isolates_failures() {
    let store = Arc::new(MemoryStore::new());
    let h = harness(store.clone());
    let opener = SyntheticOpener::new()
        .with_video("uploads/a.mp4", SyntheticVideo::new(20.0, 30.0))
        .with_video("uploads/c.mp4", SyntheticVideo::new(10.0, 30.0));
    let factory: ClassifierFactory = Arc::new(|| scripted(20, &[(4, 0.5)]));
    let config = PipelineConfig { max_concurrent_runs: 2, ..PipelineConfig::default() };
    let batch = BatchAnalyzer::new(VideoAnalysisService::new(config, Arc::new(opener), factory, h.collaborators.clone()));

    let submissions = ["a.mp4", "b.mp4", "c.mp4"]
        .into_iter()
        .map(|name| Submission { user_id: USER, filename: name.into(), path: PathBuf::from(format!("uploads/{}", name)) })
        .collect();
    let results = batch.analyze_all(submissions).await;

    assert_eq!(results.len(), 3);
    let a = results[0].as_ref().unwrap();
    assert!(matches!(results[1], Err(PipelineError::SourceUnopenable { .. })));
    let c = results[2].as_ref().unwrap();

    assert_ne!(a.video_id, c.video_id);
    assert_eq!(a.frames_processed, 600);
    assert_eq!(c.frames_processed, 300);
    assert_eq!(store.video(a.video_id).unwrap().filename, "a.mp4");
    assert_eq!(store.video(c.video_id).unwrap().filename, "c.mp4");
    assert_eq!(store.incidents_for(a.video_id).len(), 1);
    assert_eq!(store.incidents_for(c.video_id).len(), 1);
    assert_eq!(h.notifier.calls.lock().unwrap().len(), 2);
}
