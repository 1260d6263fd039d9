use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::convert::video::PROBE_TIMEOUT;
use crate::convert::ConvertSettings;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("expected 'pretty' or 'json', got '{}'", other)),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Pretty => f.write_str("pretty"),
            LogFormat::Json => f.write_str("json"),
        }
    }
}

/// Everything the submitter and the worker process need. Every field has a
/// default, so an empty JSON object is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
    #[serde(default = "default_queue_dir")]
    pub queue_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_url_prefix")]
    pub public_url_prefix: String,
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    #[serde(default = "default_max_video_duration")]
    pub max_video_duration_secs: u64,
    #[serde(default = "default_video_max_height")]
    pub video_max_height: u32,
    #[serde(default = "default_video_fps")]
    pub video_fps: u32,
    #[serde(default)]
    pub ffmpeg_threads: u32,
    #[serde(default = "default_preset")]
    pub ffmpeg_preset: String,
    #[serde(default = "default_crf")]
    pub video_crf: u8,
    #[serde(default = "default_maxrate")]
    pub video_maxrate: String,
    #[serde(default = "default_bufsize")]
    pub video_bufsize: String,

    #[serde(default = "default_job_timeout_ms")]
    pub job_timeout_ms: u64,
    #[serde(default = "default_heic_timeout_ms")]
    pub heic_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_true")]
    pub recover_orphans: bool,
    /// Age after which a processing entry counts as orphaned. Defaults to
    /// the job timeout.
    #[serde(default)]
    pub orphan_after_ms: Option<u64>,
    #[serde(default)]
    pub watch: bool,
    /// Claims into `processing/<worker_id>/` when set.
    #[serde(default)]
    pub worker_id: Option<String>,

    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: String,
    #[serde(default = "default_heif_convert_path")]
    pub heif_convert_path: String,

    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("mediaq").join("uploads")
}

fn default_queue_dir() -> PathBuf {
    std::env::temp_dir().join("mediaq").join("queue")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("public").join("uploads")
}

fn default_url_prefix() -> String {
    "/uploads".to_string()
}

fn default_database_path() -> PathBuf {
    crate::db::default_database_path().unwrap_or_else(|| PathBuf::from("mediaq.db"))
}

fn default_max_video_duration() -> u64 {
    360
}

fn default_video_max_height() -> u32 {
    720
}

fn default_video_fps() -> u32 {
    30
}

fn default_preset() -> String {
    "veryfast".to_string()
}

fn default_crf() -> u8 {
    23
}

fn default_maxrate() -> String {
    "2500k".to_string()
}

fn default_bufsize() -> String {
    "5000k".to_string()
}

fn default_job_timeout_ms() -> u64 {
    20 * 60 * 1000
}

fn default_heic_timeout_ms() -> u64 {
    5 * 60 * 1000
}

fn default_max_retries() -> u32 {
    2
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_true() -> bool {
    true
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe_path() -> String {
    "ffprobe".to_string()
}

fn default_heif_convert_path() -> String {
    "heif-convert".to_string()
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
            queue_dir: default_queue_dir(),
            output_dir: default_output_dir(),
            public_url_prefix: default_url_prefix(),
            database_path: default_database_path(),
            max_video_duration_secs: default_max_video_duration(),
            video_max_height: default_video_max_height(),
            video_fps: default_video_fps(),
            ffmpeg_threads: 0,
            ffmpeg_preset: default_preset(),
            video_crf: default_crf(),
            video_maxrate: default_maxrate(),
            video_bufsize: default_bufsize(),
            job_timeout_ms: default_job_timeout_ms(),
            heic_timeout_ms: default_heic_timeout_ms(),
            max_retries: default_max_retries(),
            poll_interval_ms: default_poll_interval_ms(),
            recover_orphans: true,
            orphan_after_ms: None,
            watch: false,
            worker_id: None,
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            heif_convert_path: default_heif_convert_path(),
            log_format: LogFormat::default(),
        }
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_millis(self.job_timeout_ms)
    }

    pub fn heic_timeout(&self) -> Duration {
        Duration::from_millis(self.heic_timeout_ms)
    }

    /// Age after which a processing entry counts as orphaned. Defaults to the
    /// longest a live job can run: the job timeout plus the longer of the
    /// heif-convert attempt and the ffprobe run that precede it.
    pub fn orphan_after(&self) -> Duration {
        match self.orphan_after_ms {
            Some(ms) => Duration::from_millis(ms),
            None => {
                let probe = PROBE_TIMEOUT.min(self.job_timeout());
                self.job_timeout() + self.heic_timeout().max(probe)
            }
        }
    }

    pub fn convert_settings(&self) -> ConvertSettings {
        ConvertSettings {
            ffmpeg_path: self.ffmpeg_path.clone(),
            ffprobe_path: self.ffprobe_path.clone(),
            heif_convert_path: self.heif_convert_path.clone(),
            threads: self.ffmpeg_threads,
            job_timeout: self.job_timeout(),
            heic_timeout: self.heic_timeout(),
            max_video_duration_secs: self.max_video_duration_secs,
            video_max_height: self.video_max_height,
            video_fps: self.video_fps,
            ffmpeg_preset: self.ffmpeg_preset.clone(),
            video_crf: self.video_crf,
            video_maxrate: self.video_maxrate.clone(),
            video_bufsize: self.video_bufsize.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: WorkerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, WorkerConfig::default());
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.video_crf, 23);
        assert!(config.recover_orphans);
        assert!(!config.watch);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_orphan_threshold_covers_longest_job() {
        assert_eq!(
            WorkerConfig::default().orphan_after(),
            Duration::from_secs(25 * 60)
        );

        let mut config = WorkerConfig {
            job_timeout_ms: 90_000,
            heic_timeout_ms: 10_000,
            ..WorkerConfig::default()
        };
        assert_eq!(config.orphan_after(), Duration::from_secs(150));

        config.job_timeout_ms = 30_000;
        assert_eq!(config.orphan_after(), Duration::from_secs(60));

        config.orphan_after_ms = Some(5_000);
        assert_eq!(config.orphan_after(), Duration::from_secs(5));
    }

    #[test]
    fn test_convert_settings_match_defaults() {
        assert_eq!(
            WorkerConfig::default().convert_settings(),
            ConvertSettings::default()
        );
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
