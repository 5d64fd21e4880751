use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MoodcamConfig {
    pub validation: ValidationConfig,
    pub camera: CameraConfig,
    pub analysis: AnalysisConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ValidationConfig {
    /// Largest accepted image in bytes (inclusive)
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,

    /// Media types accepted for upload
    #[serde(default = "default_accepted_types")]
    pub accepted_types: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Which camera backend opens streams
    #[serde(default = "default_camera_backend")]
    pub backend: CameraBackendKind,

    /// Camera device index (e.g., 0 for /dev/video0)
    #[serde(default = "default_camera_index")]
    pub index: u32,

    /// Requested camera resolution (width, height)
    #[serde(default = "default_camera_resolution")]
    pub resolution: (u32, u32),

    /// Frames per second
    #[serde(default = "default_camera_fps")]
    pub fps: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AnalysisConfig {
    /// Prediction endpoint receiving the multipart upload
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Upper bound on a single prediction request, enforced by the workflow
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// What to show when the prediction service cannot be reached
    #[serde(default = "default_fallback")]
    pub fallback: FallbackMode,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CameraBackendKind {
    /// Generated test pattern, no hardware required
    Synthetic,
    /// V4L2 device through GStreamer (requires the `camera` feature)
    Gstreamer,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FallbackMode {
    /// Produce a placeholder result flagged as degraded
    Placeholder,
    /// Keep the image and surface the failure only
    Disabled,
}

impl AnalysisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl MoodcamConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("moodcam.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("validation.max_bytes", default_max_bytes() as i64)?
            .set_default("validation.accepted_types", default_accepted_types())?
            .set_default("camera.backend", "synthetic")?
            .set_default("camera.index", default_camera_index())?
            .set_default(
                "camera.resolution",
                vec![default_camera_resolution().0, default_camera_resolution().1],
            )?
            .set_default("camera.fps", default_camera_fps())?
            .set_default("analysis.endpoint", default_endpoint())?
            .set_default("analysis.timeout_ms", default_timeout_ms() as i64)?
            .set_default("analysis.fallback", "placeholder")?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // MOODCAM_ANALYSIS__ENDPOINT=... style overrides
            .add_source(
                Environment::with_prefix("MOODCAM")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: MoodcamConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.validation.max_bytes == 0 {
            return Err(ConfigError::Message(
                "Validation max_bytes must be greater than 0".to_string(),
            ));
        }

        if self.validation.accepted_types.is_empty() {
            return Err(ConfigError::Message(
                "At least one accepted media type is required".to_string(),
            ));
        }

        if self.camera.resolution.0 == 0 || self.camera.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera resolution must be greater than 0".to_string(),
            ));
        }

        if self.camera.fps == 0 {
            return Err(ConfigError::Message(
                "Camera fps must be greater than 0".to_string(),
            ));
        }

        match reqwest::Url::parse(&self.analysis.endpoint) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => {
                return Err(ConfigError::Message(format!(
                    "Analysis endpoint must use http or https, got '{}'",
                    url.scheme()
                )));
            }
            Err(e) => {
                return Err(ConfigError::Message(format!(
                    "Analysis endpoint '{}' is not a valid URL: {}",
                    self.analysis.endpoint, e
                )));
            }
        }

        if self.analysis.timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Analysis timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for MoodcamConfig {
    fn default() -> Self {
        Self {
            validation: ValidationConfig {
                max_bytes: default_max_bytes(),
                accepted_types: default_accepted_types(),
            },
            camera: CameraConfig {
                backend: default_camera_backend(),
                index: default_camera_index(),
                resolution: default_camera_resolution(),
                fps: default_camera_fps(),
            },
            analysis: AnalysisConfig {
                endpoint: default_endpoint(),
                timeout_ms: default_timeout_ms(),
                fallback: default_fallback(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
            },
        }
    }
}

// Default value functions
fn default_max_bytes() -> u64 {
    5 * 1024 * 1024
}
fn default_accepted_types() -> Vec<String> {
    vec!["image/jpeg".to_string(), "image/png".to_string()]
}

fn default_camera_backend() -> CameraBackendKind {
    CameraBackendKind::Synthetic
}
fn default_camera_index() -> u32 {
    0
}
fn default_camera_resolution() -> (u32, u32) {
    (640, 480)
}
fn default_camera_fps() -> u32 {
    30
}

fn default_endpoint() -> String {
    "http://localhost:8000/predict/".to_string()
}
fn default_timeout_ms() -> u64 {
    15_000
}
fn default_fallback() -> FallbackMode {
    FallbackMode::Placeholder
}

fn default_event_bus_capacity() -> usize {
    64
}
