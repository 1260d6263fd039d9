use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::convert::probe::{probe, ProbeInfo};
use crate::convert::tool::{ToolInvocation, ToolRunner};
use crate::convert::{output_size, ConvertSettings, Converter};
use crate::error::ConvertError;
use crate::queue::{ConversionResult, JobKind, JobRecord, MediaMeta};
use crate::sanitize::redact_path;
use crate::storage::filesystem::ensure_parent;
use crate::submit::format::MP4_TARGET;

/// Upper bound for a single ffprobe run.
pub(crate) const PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// How a source video becomes a browser-safe MP4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoPlan {
    /// Copy the streams into a faststart MP4 container.
    Remux,
    /// Re-encode to H.264/AAC at the given output height. `None` when the
    /// source height is unknown; ffmpeg then caps it without upscaling.
    Transcode { height: Option<u32> },
}

/// True when the source already plays in browsers and fits the size cap:
/// H.264 video no taller than `max_height`, and AAC or no audio.
pub fn is_remux_eligible(info: &ProbeInfo, max_height: u32) -> bool {
    let Some(video) = &info.video else {
        return false;
    };
    let is_h264 = video.codec.as_deref() == Some("h264");
    let fits = matches!(video.height, Some(h) if h <= max_height);
    let audio_ok = match &info.audio {
        None => true,
        Some(audio) => audio.codec.as_deref() == Some("aac"),
    };
    is_h264 && fits && audio_ok
}

pub fn plan(info: &ProbeInfo, max_height: u32) -> VideoPlan {
    if is_remux_eligible(info, max_height) {
        return VideoPlan::Remux;
    }
    let height = info
        .video
        .as_ref()
        .and_then(|v| v.height)
        .map(|source| round_down_even(source.min(max_height)).max(2));
    VideoPlan::Transcode { height }
}

fn round_down_even(value: u32) -> u32 {
    value & !1
}

/// Width matching `scale=-2:<height>`: the aspect-preserving width, made even.
fn scaled_width(source_width: u32, source_height: u32, height: u32) -> u32 {
    if source_height == 0 {
        return source_width;
    }
    let exact = source_width as f64 * height as f64 / source_height as f64;
    let even = (exact / 2.0).round() as u32 * 2;
    even.max(2)
}

pub fn build_remux_args(input: &Path, output: &Path) -> Vec<String> {
    let mut args = base_args(input);
    args.extend(
        ["-c", "copy", "-movflags", "+faststart"]
            .into_iter()
            .map(String::from),
    );
    args.push(output.to_string_lossy().to_string());
    args
}

/// `scale` filter for the output height. An unknown source height is left
/// to ffmpeg: capped at `max_height`, never enlarged, kept even.
fn scale_filter(height: Option<u32>, max_height: u32) -> String {
    match height {
        Some(height) => format!("scale=-2:{}", height),
        None => format!("scale=-2:'trunc(min({},ih)/2)*2'", max_height),
    }
}

pub fn build_transcode_args(
    input: &Path,
    output: &Path,
    height: Option<u32>,
    settings: &ConvertSettings,
) -> Vec<String> {
    let mut args = base_args(input);
    args.extend([
        "-vf".to_string(),
        format!(
            "{},fps={}",
            scale_filter(height, settings.video_max_height),
            settings.video_fps
        ),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        settings.ffmpeg_preset.clone(),
        "-crf".to_string(),
        settings.video_crf.to_string(),
        "-maxrate".to_string(),
        settings.video_maxrate.clone(),
        "-bufsize".to_string(),
        settings.video_bufsize.clone(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "128k".to_string(),
        "-ac".to_string(),
        "2".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
    ]);
    if settings.threads > 0 {
        args.push("-threads".to_string());
        args.push(settings.threads.to_string());
    }
    args.push(output.to_string_lossy().to_string());
    args
}

fn base_args(input: &Path) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-y".to_string(),
        "-i".to_string(),
        input.to_string_lossy().to_string(),
    ]
}

/// Converts arbitrary video to H.264/AAC MP4 with faststart.
pub struct VideoConverter {
    settings: Arc<ConvertSettings>,
    runner: Arc<dyn ToolRunner>,
}

impl VideoConverter {
    pub fn new(settings: Arc<ConvertSettings>, runner: Arc<dyn ToolRunner>) -> Self {
        Self { settings, runner }
    }

    fn result_meta(&self, info: &ProbeInfo, plan: VideoPlan) -> MediaMeta {
        let source_width = info.video.as_ref().and_then(|v| v.width);
        let source_height = info.video.as_ref().and_then(|v| v.height);

        let (width, height) = match plan {
            VideoPlan::Remux => (source_width, source_height),
            VideoPlan::Transcode { height: None } => (None, None),
            VideoPlan::Transcode {
                height: Some(height),
            } => {
                let width = match (source_width, source_height) {
                    (Some(w), Some(h)) => Some(scaled_width(w, h, height)),
                    _ => None,
                };
                (width, Some(height))
            }
        };

        MediaMeta {
            width,
            height,
            duration: info.duration,
            fps: Some(self.settings.video_fps),
        }
    }
}

#[async_trait]
impl Converter for VideoConverter {
    fn name(&self) -> &'static str {
        "video"
    }

    fn supports(&self, kind: JobKind) -> bool {
        kind == JobKind::Video
    }

    async fn convert(&self, job: &JobRecord) -> Result<ConversionResult, ConvertError> {
        let settings = &self.settings;
        let info = probe(
            self.runner.as_ref(),
            &settings.ffprobe_path,
            &job.input_path,
            PROBE_TIMEOUT.min(settings.job_timeout),
        )
        .await?;

        if info.video.is_none() {
            return Err(ConvertError::NoVideoStream(job.input_path.clone()));
        }

        if let Some(duration) = info.duration {
            if duration > settings.max_video_duration_secs as f64 {
                return Err(ConvertError::DurationExceeded {
                    duration,
                    max: settings.max_video_duration_secs,
                });
            }
        }

        ensure_parent(&job.output_path)?;

        let plan = plan(&info, settings.video_max_height);
        let args = match plan {
            VideoPlan::Remux => build_remux_args(&job.input_path, &job.output_path),
            VideoPlan::Transcode { height } => {
                build_transcode_args(&job.input_path, &job.output_path, height, settings)
            }
        };
        info!(job_id = %job.job_id, ?plan, duration = ?info.duration, "Converting video");

        let invocation = ToolInvocation::new(&settings.ffmpeg_path, settings.job_timeout).args(args);
        self.runner.run(&invocation).await?;

        let size = output_size(&job.output_path)?;
        info!(
            job_id = %job.job_id,
            output = %redact_path(&job.output_path),
            size,
            "Video converted"
        );

        Ok(ConversionResult::new(
            size,
            MP4_TARGET.mime,
            ".mp4",
            self.result_meta(&info, plan),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::probe::{AudioStreamInfo, VideoStreamInfo};
    use std::path::PathBuf;

    fn info(codec: &str, width: u32, height: u32, audio: Option<&str>) -> ProbeInfo {
        ProbeInfo {
            duration: Some(45.0),
            format_name: Some("mov,mp4,m4a,3gp,3g2,mj2".to_string()),
            video: Some(VideoStreamInfo {
                codec: Some(codec.to_string()),
                width: Some(width),
                height: Some(height),
                fps: Some(30.0),
            }),
            audio: audio.map(|codec| AudioStreamInfo {
                codec: Some(codec.to_string()),
            }),
        }
    }

    fn converter() -> VideoConverter {
        VideoConverter::new(
            Arc::new(ConvertSettings::default()),
            Arc::new(crate::convert::tool::ProcessRunner),
        )
    }

    #[test]
    fn test_remux_eligibility() {
        assert!(is_remux_eligible(&info("h264", 640, 480, None), 720));
        assert!(is_remux_eligible(&info("h264", 1280, 720, Some("aac")), 720));
        assert!(!is_remux_eligible(&info("h264", 1920, 1080, Some("aac")), 720));
        assert!(!is_remux_eligible(&info("hevc", 640, 480, None), 720));
        assert!(!is_remux_eligible(&info("h264", 640, 480, Some("pcm_s16le")), 720));
    }

    #[test]
    fn test_unknown_height_is_transcoded() {
        let mut probe = info("h264", 640, 480, None);
        if let Some(video) = probe.video.as_mut() {
            video.height = None;
        }
        assert!(!is_remux_eligible(&probe, 720));
        assert_eq!(plan(&probe, 720), VideoPlan::Transcode { height: None });

        let args = build_transcode_args(
            Path::new("/tmp/a.mov"),
            Path::new("/out/a.mp4"),
            None,
            &ConvertSettings::default(),
        );
        assert!(args.contains(&"scale=-2:'trunc(min(720,ih)/2)*2',fps=30".to_string()));
        assert!(!args.iter().any(|arg| arg.contains("scale=-2:720")));

        let meta = converter().result_meta(&probe, VideoPlan::Transcode { height: None });
        assert_eq!((meta.width, meta.height), (None, None));
        assert_eq!(meta.fps, Some(30));
    }

    #[test]
    fn test_plan_caps_height_and_keeps_it_even() {
        assert_eq!(
            plan(&info("hevc", 3840, 2160, Some("aac")), 720),
            VideoPlan::Transcode { height: Some(720) }
        );
        assert_eq!(
            plan(&info("hevc", 640, 481, None), 720),
            VideoPlan::Transcode { height: Some(480) }
        );
        assert_eq!(plan(&info("h264", 640, 480, None), 720), VideoPlan::Remux);
    }

    #[test]
    fn test_scaled_width() {
        assert_eq!(scaled_width(1920, 1080, 720), 1280);
        assert_eq!(scaled_width(1080, 1920, 720), 406);
        assert_eq!(scaled_width(0, 0, 720), 0);
    }

    #[test]
    fn test_remux_args() {
        let args = build_remux_args(Path::new("/tmp/a.mov"), Path::new("/out/a.mp4"));
        assert_eq!(
            args.join(" "),
            "-hide_banner -loglevel error -y -i /tmp/a.mov -c copy -movflags +faststart /out/a.mp4"
        );
    }

    #[test]
    fn test_transcode_args() {
        let settings = ConvertSettings {
            threads: 2,
            ..ConvertSettings::default()
        };
        let args = build_transcode_args(
            Path::new("/tmp/a.mov"),
            Path::new("/out/a.mp4"),
            Some(720),
            &settings,
        );
        let line = args.join(" ");

        assert!(line.contains("-vf scale=-2:720,fps=30"));
        assert!(line.contains("-c:v libx264 -preset veryfast -crf 23 -maxrate 2500k -bufsize 5000k -pix_fmt yuv420p"));
        assert!(line.contains("-c:a aac -b:a 128k -ac 2"));
        assert!(line.contains("-movflags +faststart -threads 2 /out/a.mp4"));
        assert_eq!(args.last().map(String::as_str), Some("/out/a.mp4"));
    }

    #[test]
    fn test_result_meta() {
        let converter = converter();
        let source = info("hevc", 1920, 1080, Some("aac"));

        let transcoded = converter.result_meta(&source, VideoPlan::Transcode { height: Some(720) });
        assert_eq!(transcoded.width, Some(1280));
        assert_eq!(transcoded.height, Some(720));
        assert_eq!(transcoded.duration, Some(45.0));
        assert_eq!(transcoded.fps, Some(30));

        let remuxed = converter.result_meta(&info("h264", 640, 480, None), VideoPlan::Remux);
        assert_eq!((remuxed.width, remuxed.height), (Some(640), Some(480)));
    }

    #[tokio::test]
    async fn test_missing_ffprobe_fails_job() {
        let settings = ConvertSettings {
            ffprobe_path: "mediaq-missing-ffprobe".to_string(),
            ..ConvertSettings::default()
        };
        let converter = VideoConverter::new(
            Arc::new(settings),
            Arc::new(crate::convert::tool::ProcessRunner),
        );
        let job = JobRecord::new(crate::queue::NewJob {
            lead_id: "l".to_string(),
            attachment_id: "a".to_string(),
            kind: JobKind::Video,
            input_path: PathBuf::from("/tmp/nope.mov"),
            output_path: PathBuf::from("/tmp/nope.mp4"),
            original_name: "nope.mov".to_string(),
            original_size: 0,
            original_mime: "video/quicktime".to_string(),
        });

        let err = converter.convert(&job).await.unwrap_err();
        assert!(matches!(
            err,
            ConvertError::Tool(crate::error::ToolError::NotFound { .. })
        ));
    }
}
