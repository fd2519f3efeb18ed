// THEORY:
// The runner is configured the way the visualizer is: a couple of positional
// arguments for the thing to process, and `SV_*` environment variables for
// everything else. Environment lookup is injected so the parsing is testable
// without touching the process environment.

use crate::logging::parse_level;
use anyhow::{Context, Result, anyhow, bail};
use log::LevelFilter;
use sentinel_vision::incident::{Confidence, UserId};
use sentinel_vision::ClassifierKind;
use std::path::PathBuf;

pub const USAGE: &str = "Usage: sentinel_runner <input_video_path | synthetic:<seconds>> [user_id]";

/// Frame rate of generated demo videos.
pub const SYNTHETIC_FPS: f64 = 30.0;

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    File(PathBuf),
    Synthetic { seconds: f64 },
}

impl Input {
    fn parse(raw: &str) -> Result<Self> {
        match raw.strip_prefix("synthetic:") {
            Some(seconds) => {
                let seconds: f64 = seconds.parse().with_context(|| format!("invalid synthetic duration {:?}", seconds))?;
                if !(seconds.is_finite() && seconds > 0.0) {
                    bail!("synthetic duration must be positive, got {}", seconds);
                }
                Ok(Input::Synthetic { seconds })
            }
            None => Ok(Input::File(PathBuf::from(raw))),
        }
    }

    /// Where the video lives, as registered in the store.
    pub fn path(&self) -> PathBuf {
        match self {
            Input::File(path) => path.clone(),
            Input::Synthetic { seconds } => PathBuf::from(format!("synthetic:{}", seconds)),
        }
    }

    /// The name the user would recognise in an alert.
    pub fn label(&self) -> String {
        match self {
            Input::File(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            Input::Synthetic { seconds } => format!("synthetic_{}s.mp4", seconds),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    pub input: Input,
    pub user_id: UserId,
    /// `SV_MODEL`. Absent means the simulated classifier.
    pub model_path: Option<PathBuf>,
    pub seed: Option<u64>,
    pub data_dir: PathBuf,
    pub snapshot_dir: PathBuf,
    pub threshold: Option<Confidence>,
    pub notify_email: Option<String>,
    pub pipelined: bool,
    pub log_level: LevelFilter,
}

impl RunnerConfig {
    pub fn from_env(args: &[String]) -> Result<Self> {
        Self::parse(args, |key| std::env::var(key).ok())
    }

    /// `args` excludes the program name.
    pub fn parse(args: &[String], env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let input = Input::parse(args.first().ok_or_else(|| anyhow!(USAGE))?)?;
        let user_id = match args.get(1) {
            Some(raw) => raw.parse().with_context(|| format!("invalid user id {:?}", raw))?,
            None => 1,
        };

        let data_dir = PathBuf::from(var("SV_DATA_DIR").unwrap_or_else(|| "data".into()));
        let snapshot_dir = var("SV_SNAPSHOT_DIR").map(PathBuf::from).unwrap_or_else(|| data_dir.join("screenshots"));

        let seed = var("SV_SEED")
            .map(|raw| raw.parse::<u64>().with_context(|| format!("invalid SV_SEED {:?}", raw)))
            .transpose()?;
        let threshold = var("SV_THRESHOLD")
            .map(|raw| raw.parse::<Confidence>().with_context(|| format!("invalid SV_THRESHOLD {:?}", raw)))
            .transpose()?;
        if let Some(t) = threshold {
            if !(t > 0.0 && t < 1.0) {
                bail!("SV_THRESHOLD must be between 0 and 1, got {}", t);
            }
        }

        let pipelined = matches!(
            var("SV_PIPELINED").map(|v| v.to_ascii_lowercase()).as_deref(),
            Some("1" | "true" | "yes" | "on")
        );
        let log_level = match var("SV_LOG") {
            Some(raw) => parse_level(&raw).ok_or_else(|| anyhow!("invalid SV_LOG {:?}", raw))?,
            None => LevelFilter::Info,
        };

        Ok(Self {
            input,
            user_id,
            model_path: var("SV_MODEL").map(PathBuf::from),
            seed,
            data_dir,
            snapshot_dir,
            threshold,
            notify_email: var("SV_NOTIFY_EMAIL"),
            pipelined,
            log_level,
        })
    }

    pub fn classifier_kind(&self) -> ClassifierKind {
        match &self.model_path {
            Some(model_path) => ClassifierKind::ModelBacked { model_path: model_path.clone() },
            None => ClassifierKind::Simulated { seed: self.seed },
        }
    }
}
