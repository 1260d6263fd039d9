use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::convert::tool::{ToolInvocation, ToolRunner};
use crate::convert::{output_size, ConvertSettings, Converter};
use crate::error::ConvertError;
use crate::queue::{ConversionResult, JobKind, JobRecord, MediaMeta};
use crate::sanitize::redact_path;
use crate::storage::filesystem::ensure_parent;
use crate::submit::format::JPEG_TARGET;

/// JPEG quality passed to `heif-convert`.
const HEIF_QUALITY: &str = "92";

/// Converts still images to JPEG.
///
/// HEIC/HEIF goes through `heif-convert` first; if that tool is missing or
/// fails, ffmpeg decodes the first frame instead.
pub struct ImageConverter {
    settings: Arc<ConvertSettings>,
    runner: Arc<dyn ToolRunner>,
}

impl ImageConverter {
    pub fn new(settings: Arc<ConvertSettings>, runner: Arc<dyn ToolRunner>) -> Self {
        Self { settings, runner }
    }

    fn heif_invocation(&self, job: &JobRecord) -> ToolInvocation {
        ToolInvocation::new(&self.settings.heif_convert_path, self.settings.heic_timeout)
            .args(["-q", HEIF_QUALITY])
            .arg(job.input_path.to_string_lossy())
            .arg(job.output_path.to_string_lossy())
    }

    fn ffmpeg_invocation(&self, job: &JobRecord) -> ToolInvocation {
        let mut invocation =
            ToolInvocation::new(&self.settings.ffmpeg_path, self.settings.job_timeout)
                .args(["-hide_banner", "-loglevel", "error", "-y"]);
        if self.settings.threads > 0 {
            invocation = invocation
                .arg("-threads")
                .arg(self.settings.threads.to_string());
        }
        invocation
            .arg("-i")
            .arg(job.input_path.to_string_lossy())
            .args(["-frames:v", "1", "-q:v", "2"])
            .arg(job.output_path.to_string_lossy())
    }
}

fn is_heif(job: &JobRecord) -> bool {
    matches!(job.original_extension().as_deref(), Some("heic") | Some("heif"))
}

#[async_trait]
impl Converter for ImageConverter {
    fn name(&self) -> &'static str {
        "image"
    }

    fn supports(&self, kind: JobKind) -> bool {
        kind == JobKind::Image
    }

    async fn convert(&self, job: &JobRecord) -> Result<ConversionResult, ConvertError> {
        ensure_parent(&job.output_path)?;

        let mut decoded = false;
        if is_heif(job) {
            match self.runner.run(&self.heif_invocation(job)).await {
                Ok(_) => decoded = true,
                Err(e) => warn!(
                    job_id = %job.job_id,
                    error = %e,
                    "heif-convert failed, falling back to ffmpeg"
                ),
            }
        }

        if !decoded {
            self.runner.run(&self.ffmpeg_invocation(job)).await?;
        }

        let size = output_size(&job.output_path)?;
        info!(
            job_id = %job.job_id,
            output = %redact_path(&job.output_path),
            size,
            "Image converted"
        );

        Ok(ConversionResult::new(
            size,
            JPEG_TARGET.mime,
            ".jpg",
            MediaMeta::default(),
        ))
    }
}
