use std::{fs::File, io::BufReader, time::Duration};

use serde::{Deserialize, Serialize};

use super::{
    expression::{
        estimator::{EstimatorTuning, PoseTuning},
        smoothing::SmoothingTuning,
    },
    folders::CONFIG_DIR,
    session::PipelineSettings,
};

const FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PuppetConfig {
    /// Port the detector page sends its results to.
    pub listen_port: u16,
    /// Port of the renderer receiving OSC.
    pub renderer_port: u16,
    pub tick_hz: f32,
    /// Playback rate of capture files.
    pub replay_fps: f32,
    /// Manifest path or name under the avatar directory. Unset means the
    /// geometric fallback.
    pub avatar: Option<String>,
    pub camera_timeout_secs: f32,
    pub estimator: EstimatorTuning,
    pub pose: PoseTuning,
    pub smoothing: SmoothingTuning,
}

impl Default for PuppetConfig {
    fn default() -> Self {
        Self {
            listen_port: 9410,
            renderer_port: 9411,
            tick_hz: 60.,
            replay_fps: 30.,
            avatar: None,
            camera_timeout_secs: 10.,
            estimator: EstimatorTuning::default(),
            pose: PoseTuning::default(),
            smoothing: SmoothingTuning::default(),
        }
    }
}

impl PuppetConfig {
    pub fn path() -> String {
        format!("{}/{}", CONFIG_DIR.as_ref(), FILE_NAME)
    }

    /// Reads the config file. A missing file means defaults; a broken one
    /// is reported and also means defaults.
    pub fn load() -> PuppetConfig {
        let path = Self::path();
        let Ok(file) = File::open(&path) else {
            log::info!("No config at {}, using defaults", path);
            return PuppetConfig::default();
        };
        Self::from_reader(file).unwrap_or_else(|e| {
            log::warn!("Ignoring {}: {}", path, e);
            PuppetConfig::default()
        })
    }

    fn from_reader(file: File) -> serde_json::Result<PuppetConfig> {
        serde_json::from_reader(BufReader::new(file))
    }

    pub fn tick_interval(&self) -> Duration {
        let hz = if self.tick_hz.is_finite() {
            self.tick_hz.clamp(1., 240.)
        } else {
            60.
        };
        Duration::from_secs_f32(1. / hz)
    }

    pub fn settings(&self) -> PipelineSettings {
        let timeout = if self.camera_timeout_secs.is_finite() && self.camera_timeout_secs > 0. {
            Duration::from_secs_f32(self.camera_timeout_secs)
        } else {
            PipelineSettings::default().camera_timeout
        };
        PipelineSettings {
            estimator: self.estimator.clone(),
            pose: self.pose.clone(),
            smoothing: self.smoothing.clone(),
            camera_timeout: timeout,
        }
    }
}
