pub mod image;
pub mod probe;
pub mod tool;
pub mod video;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::ConvertError;
use crate::queue::{ConversionResult, JobKind, JobRecord};
use crate::storage::filesystem::remove_best_effort;

pub use image::ImageConverter;
pub use probe::ProbeInfo;
pub use tool::{ProcessRunner, ToolInvocation, ToolOutput, ToolRunner};
pub use video::{VideoConverter, VideoPlan};

/// Tool locations and encoding parameters shared by the converters.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertSettings {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub heif_convert_path: String,
    /// `-threads` for ffmpeg; 0 leaves the choice to ffmpeg.
    pub threads: u32,
    pub job_timeout: Duration,
    pub heic_timeout: Duration,
    pub max_video_duration_secs: u64,
    pub video_max_height: u32,
    pub video_fps: u32,
    pub ffmpeg_preset: String,
    pub video_crf: u8,
    pub video_maxrate: String,
    pub video_bufsize: String,
}

impl Default for ConvertSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            heif_convert_path: "heif-convert".to_string(),
            threads: 0,
            job_timeout: Duration::from_secs(20 * 60),
            heic_timeout: Duration::from_secs(5 * 60),
            max_video_duration_secs: 360,
            video_max_height: 720,
            video_fps: 30,
            ffmpeg_preset: "veryfast".to_string(),
            video_crf: 23,
            video_maxrate: "2500k".to_string(),
            video_bufsize: "5000k".to_string(),
        }
    }
}

#[async_trait]
pub trait Converter: Send + Sync {
    fn name(&self) -> &'static str;
    fn supports(&self, kind: JobKind) -> bool;
    async fn convert(&self, job: &JobRecord) -> Result<ConversionResult, ConvertError>;
}

/// Routes a job to the first converter that supports its kind.
pub struct ConverterRegistry {
    converters: Vec<Box<dyn Converter>>,
}

impl ConverterRegistry {
    /// The standard image and video converters.
    pub fn new(settings: ConvertSettings, runner: Arc<dyn ToolRunner>) -> Self {
        let settings = Arc::new(settings);
        Self {
            converters: vec![
                Box::new(ImageConverter::new(Arc::clone(&settings), Arc::clone(&runner))),
                Box::new(VideoConverter::new(settings, runner)),
            ],
        }
    }

    pub fn empty() -> Self {
        Self {
            converters: Vec::new(),
        }
    }

    pub fn register(&mut self, converter: Box<dyn Converter>) {
        self.converters.push(converter);
    }

    /// Converts `job` in place at its output path. A partial output left by
    /// a failed run is removed.
    pub async fn convert(&self, job: &JobRecord) -> Result<ConversionResult, ConvertError> {
        let converter = self
            .converters
            .iter()
            .find(|c| c.supports(job.kind))
            .ok_or_else(|| ConvertError::NoConverter(job.kind.to_string()))?;

        debug!(job_id = %job.job_id, converter = converter.name(), "Dispatching job");

        let result = converter.convert(job).await;
        if result.is_err() {
            remove_best_effort(&job.output_path);
        }
        result
    }
}

/// Size of a freshly written output file.
pub(crate) fn output_size(path: &Path) -> Result<u64, ConvertError> {
    std::fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| ConvertError::MissingOutput {
            path: path.to_path_buf(),
            source: e,
        })
}
