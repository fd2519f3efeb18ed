mod config;
mod json_store;
mod logging;
#[cfg(feature = "opencv")]
mod opencv_source;

use anyhow::{Context, Result};
use config::{Input, RunnerConfig, SYNTHETIC_FPS, USAGE};
use json_store::JsonStore;
use sentinel_vision::core_modules::recorder::JpegSnapshotWriter;
use sentinel_vision::core_modules::simulated::SimulatedClassifier;
use sentinel_vision::notify::{EmailDispatcher, LogMailer};
use sentinel_vision::pipeline::ClassifierFactory;
use sentinel_vision::progress::LogProgress;
use sentinel_vision::source::{SyntheticOpener, SyntheticVideo, VideoOpener};
use sentinel_vision::store::{IncidentStore, NotificationPreferences, UserSettings};
use sentinel_vision::{
    CancelToken, Classifier, ClassifierKind, Collaborators, PipelineConfig, RunReport, VideoAnalysisService,
    ViolenceClassifier, build_classifier,
};
use std::env;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Argument Parsing & Setup ---
    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        println!("{}", USAGE);
        return Ok(());
    }
    let config = RunnerConfig::from_env(&args)?;
    logging::init_stdout_logger(config.log_level);

    // --- 2. Persistence & User Settings ---
    let store = Arc::new(
        JsonStore::open(&config.data_dir)
            .with_context(|| format!("opening data directory {}", config.data_dir.display()))?,
    );
    apply_user_overrides(&store, &config)?;

    // --- 3. Video I/O Initialization ---
    let opener = video_opener(&config.input)?;

    // --- 4. Pipeline Initialization ---
    let pipeline_config = PipelineConfig { snapshot_root: config.snapshot_dir.clone(), ..PipelineConfig::default() };
    let collaborators = Collaborators::new(store.clone())
        .with_notifier(Arc::new(EmailDispatcher::new(store.clone(), LogMailer)))
        .with_progress(Arc::new(LogProgress))
        .with_snapshots(Arc::new(JpegSnapshotWriter));
    let kind = config.classifier_kind();
    let classifiers: ClassifierFactory = Arc::new(move || classifier_for(&kind));
    let service = VideoAnalysisService::new(pipeline_config, opener, classifiers, collaborators);

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted; finishing with the incidents found so far");
            on_interrupt.cancel();
        }
    });

    // --- 5. Analysis ---
    let path = config.input.path();
    let label = config.input.label();
    let report = if config.pipelined {
        service.submit_pipelined_with_cancel(config.user_id, &label, &path, cancel).await?
    } else {
        let user_id = config.user_id;
        tokio::task::spawn_blocking(move || service.submit_with_cancel(user_id, &label, &path, cancel))
            .await
            .context("analysis task panicked")??
    };

    // --- 6. Summary ---
    print_summary(&report);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// `SV_THRESHOLD` and `SV_NOTIFY_EMAIL` update the user's stored settings
/// before the run, the way the settings page would.
fn apply_user_overrides(store: &JsonStore, config: &RunnerConfig) -> Result<()> {
    if config.threshold.is_none() && config.notify_email.is_none() {
        return Ok(());
    }
    let mut settings = store.user_settings(config.user_id).unwrap_or(UserSettings {
        notifications: NotificationPreferences::default(),
        confidence_threshold: None,
    });
    if let Some(threshold) = config.threshold {
        settings.confidence_threshold = Some(threshold);
    }
    if let Some(address) = &config.notify_email {
        settings.notifications = NotificationPreferences { enabled: true, address: Some(address.clone()) };
    }
    store.set_user_settings(config.user_id, settings)?;
    log::info!(
        "User {} settings: threshold {:?}, alerts to {:?}",
        config.user_id,
        store.confidence_threshold(config.user_id)?,
        store.notification_preferences(config.user_id)?.address
    );
    Ok(())
}

fn video_opener(input: &Input) -> Result<Arc<dyn VideoOpener>> {
    match input {
        Input::Synthetic { seconds } => {
            Ok(Arc::new(SyntheticOpener::new().with_video(input.path(), SyntheticVideo::new(*seconds, SYNTHETIC_FPS))))
        }
        Input::File(_) => file_opener(),
    }
}

#[cfg(feature = "opencv")]
fn file_opener() -> Result<Arc<dyn VideoOpener>> {
    Ok(Arc::new(opencv_source::OpenCvOpener))
}

#[cfg(not(feature = "opencv"))]
fn file_opener() -> Result<Arc<dyn VideoOpener>> {
    anyhow::bail!("decoding video files requires the `opencv` feature; use synthetic:<seconds> instead")
}

/// A model that fails to load falls back to the simulated classifier so the
/// rest of the pipeline still runs.
fn classifier_for(kind: &ClassifierKind) -> Box<dyn Classifier> {
    match build_classifier(kind) {
        Ok(classifier) => Box::new(classifier),
        Err(e) => {
            log::warn!("{}; using the simulated classifier", e);
            Box::new(ViolenceClassifier::Simulated(SimulatedClassifier::from_entropy()))
        }
    }
}

fn print_summary(report: &RunReport) {
    log::info!(
        "Video {}: {:?}, {} of {} frames, {} windows classified, {} incidents",
        report.video_id,
        report.state,
        report.frames_processed,
        report.total_frames,
        report.classifications,
        report.incidents.len()
    );
    for incident in &report.incidents {
        log::info!(
            "  {} (frame {}) confidence {:.1}% snapshot {}",
            incident.formatted_timestamp(),
            incident.frame_number,
            incident.confidence * 100.0,
            incident
                .screenshot_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".into())
        );
    }
    if report.persist_failures > 0 {
        log::warn!("{} incidents could not be persisted", report.persist_failures);
    }
}
