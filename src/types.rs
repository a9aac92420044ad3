use serde::{Deserialize, Serialize};

/// A pixel position in one frame's coordinate space. The y axis grows
/// downward, as delivered by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: i32,
    pub y: i32,
}

impl Coordinate {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn as_tuple(&self) -> (i32, i32) {
        (self.x, self.y)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub annotation: AnnotationConfig,
    pub video: VideoConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationConfig {
    /// Minor-axis-to-major-axis ratio of the click zone ellipse drawn around
    /// each section segment.
    pub relative_ellipse_height: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// How many frames around the container-reported frame count to probe
    /// when the reported count turns out to be wrong.
    pub frame_count_probe_window: i64,
    /// Suffix assumed for video names stored without one in event files.
    pub default_video_suffix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            annotation: AnnotationConfig::default(),
            video: VideoConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            relative_ellipse_height: 0.15,
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            frame_count_probe_window: 8,
            default_video_suffix: ".mp4".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
