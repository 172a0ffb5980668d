use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

/// Layout of a capture directory on disk.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptureConfig {
    /// Subdirectory holding the video stream
    #[serde(default = "default_video_dir")]
    pub video_dir: String,

    /// Subdirectory holding the audio stream
    #[serde(default = "default_audio_dir")]
    pub audio_dir: String,

    /// File name of the init segment inside each stream directory
    #[serde(default = "default_init_file")]
    pub init_file: String,

    /// Extension of fragment files (without the dot)
    #[serde(default = "default_fragment_extension")]
    pub fragment_extension: String,
}

fn default_video_dir() -> String {
    "vid".to_string()
}

fn default_audio_dir() -> String {
    "aud".to_string()
}

fn default_init_file() -> String {
    "init.mp4".to_string()
}

fn default_fragment_extension() -> String {
    "m4s".to_string()
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            video_dir: default_video_dir(),
            audio_dir: default_audio_dir(),
            init_file: default_init_file(),
            fragment_extension: default_fragment_extension(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Appended to the capture id to name the muxed file
    #[serde(default = "default_suffix")]
    pub suffix: String,

    /// Where output files go when no explicit path is given (default: current directory)
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

fn default_suffix() -> String {
    "_combined.mp4".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            suffix: default_suffix(),
            directory: None,
        }
    }
}

impl OutputConfig {
    /// Default path for a file named `<id><suffix>`.
    pub fn path_for(&self, id: &str, suffix: &str) -> PathBuf {
        let name = format!("{}{}", id, suffix);
        match &self.directory {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }
}
