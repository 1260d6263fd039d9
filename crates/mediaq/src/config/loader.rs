use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::schema::{LogFormat, WorkerConfig};
use crate::error::ConfigError;

/// Prefix shared by every environment key.
pub const ENV_PREFIX: &str = "MEDIA_";

/// Reads a JSON config file. Environment overrides are not applied.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<WorkerConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<WorkerConfig, ConfigError> {
    let config: WorkerConfig = serde_json::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Defaults overridden by `MEDIA_*` environment variables.
pub fn load_from_env() -> Result<WorkerConfig, ConfigError> {
    load_from_lookup(|key| std::env::var(key).ok())
}

/// Like [`load_from_env`], reading values through `lookup`.
pub fn load_from_lookup<F>(lookup: F) -> Result<WorkerConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = WorkerConfig::default();
    apply_overrides(&mut config, lookup)?;
    validate_config(&config)?;
    Ok(config)
}

/// Optional JSON file as the base, then environment overrides on top.
pub fn load(path: Option<&Path>) -> Result<WorkerConfig, ConfigError> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => WorkerConfig::default(),
    };
    apply_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config)?;
    Ok(config)
}

/// Applies every set (non-empty) `MEDIA_*` key to `config`.
pub fn apply_overrides<F>(config: &mut WorkerConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let env = Env { lookup: &lookup };

    env.path("TEMP_DIR", &mut config.temp_dir);
    env.path("QUEUE_DIR", &mut config.queue_dir);
    env.path("OUTPUT_DIR", &mut config.output_dir);
    env.string("PUBLIC_URL_PREFIX", &mut config.public_url_prefix);
    env.path("DATABASE_PATH", &mut config.database_path);

    env.parse("MAX_VIDEO_DURATION_SECS", &mut config.max_video_duration_secs)?;
    env.parse("VIDEO_MAX_HEIGHT", &mut config.video_max_height)?;
    env.parse("VIDEO_FPS", &mut config.video_fps)?;
    env.parse("FFMPEG_THREADS", &mut config.ffmpeg_threads)?;
    env.string("FFMPEG_PRESET", &mut config.ffmpeg_preset);
    env.parse("VIDEO_CRF", &mut config.video_crf)?;
    env.string("VIDEO_MAXRATE", &mut config.video_maxrate);
    env.string("VIDEO_BUFSIZE", &mut config.video_bufsize);

    env.parse("JOB_TIMEOUT_MS", &mut config.job_timeout_ms)?;
    env.parse("HEIC_TIMEOUT_MS", &mut config.heic_timeout_ms)?;
    env.parse("MAX_RETRIES", &mut config.max_retries)?;
    env.parse("POLL_INTERVAL_MS", &mut config.poll_interval_ms)?;

    env.flag("RECOVER_ORPHANS", &mut config.recover_orphans)?;
    if let Some(value) = env.get("ORPHAN_AFTER_MS") {
        config.orphan_after_ms = Some(parse_value("ORPHAN_AFTER_MS", &value)?);
    }
    env.flag("WATCH", &mut config.watch)?;
    if let Some(value) = env.get("WORKER_ID") {
        config.worker_id = Some(value);
    }

    env.string("FFMPEG_PATH", &mut config.ffmpeg_path);
    env.string("FFPROBE_PATH", &mut config.ffprobe_path);
    env.string("HEIF_CONVERT_PATH", &mut config.heif_convert_path);

    if let Some(value) = env.get("LOG_FORMAT") {
        config.log_format = LogFormat::from_str(&value).map_err(|reason| {
            ConfigError::InvalidValue {
                key: format!("{}LOG_FORMAT", ENV_PREFIX),
                value,
                reason,
            }
        })?;
    }

    Ok(())
}

struct Env<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(&format!("{}{}", ENV_PREFIX, name))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, name: &str, target: &mut String) {
        if let Some(value) = self.get(name) {
            *target = value;
        }
    }

    fn path(&self, name: &str, target: &mut PathBuf) {
        if let Some(value) = self.get(name) {
            *target = PathBuf::from(value);
        }
    }

    fn parse<T>(&self, name: &str, target: &mut T) -> Result<(), ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        if let Some(value) = self.get(name) {
            *target = parse_value(name, &value)?;
        }
        Ok(())
    }

    fn flag(&self, name: &str, target: &mut bool) -> Result<(), ConfigError> {
        if let Some(value) = self.get(name) {
            *target = parse_flag(name, &value)?;
        }
        Ok(())
    }
}

fn parse_value<T>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| ConfigError::InvalidValue {
        key: format!("{}{}", ENV_PREFIX, name),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_flag(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: format!("{}{}", ENV_PREFIX, name),
            value: value.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}

fn validate_config(config: &WorkerConfig) -> Result<(), ConfigError> {
    let invalid = |message: &str| {
        Err(ConfigError::Validation {
            message: message.to_string(),
        })
    };

    for (name, dir) in [
        ("temp_dir", &config.temp_dir),
        ("queue_dir", &config.queue_dir),
        ("output_dir", &config.output_dir),
    ] {
        if dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation {
                message: format!("{} must not be empty", name),
            });
        }
    }

    if config.poll_interval_ms == 0 {
        return invalid("poll_interval_ms must be greater than 0");
    }
    if config.job_timeout_ms == 0 || config.heic_timeout_ms == 0 {
        return invalid("timeouts must be greater than 0");
    }
    if config.video_fps == 0 {
        return invalid("video_fps must be greater than 0");
    }
    if config.video_max_height < 2 {
        return invalid("video_max_height must be at least 2");
    }
    if config.video_crf > 51 {
        return invalid("video_crf must be between 0 and 51");
    }
    if config.max_retries == 0 {
        return invalid("max_retries must be at least 1");
    }
    if let Some(worker_id) = &config.worker_id {
        if !crate::storage::public::is_safe_segment(worker_id) {
            return Err(ConfigError::Validation {
                message: format!("worker_id '{}' is not a valid directory name", worker_id),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_lookup_overrides() {
        let config = load_from_lookup(lookup(&[
            ("MEDIA_QUEUE_DIR", "/var/mediaq/queue"),
            ("MEDIA_VIDEO_MAX_HEIGHT", "1080"),
            ("MEDIA_MAX_RETRIES", "3"),
            ("MEDIA_WATCH", "yes"),
            ("MEDIA_RECOVER_ORPHANS", "false"),
            ("MEDIA_WORKER_ID", "worker-2"),
            ("MEDIA_LOG_FORMAT", "json"),
            ("MEDIA_ORPHAN_AFTER_MS", "60000"),
        ]))
        .unwrap();

        assert_eq!(config.queue_dir, PathBuf::from("/var/mediaq/queue"));
        assert_eq!(config.video_max_height, 1080);
        assert_eq!(config.max_retries, 3);
        assert!(config.watch);
        assert!(!config.recover_orphans);
        assert_eq!(config.worker_id.as_deref(), Some("worker-2"));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.orphan_after_ms, Some(60_000));
    }

    #[test]
    fn test_empty_values_are_ignored() {
        let config = load_from_lookup(lookup(&[("MEDIA_VIDEO_FPS", "  ")])).unwrap();
        assert_eq!(config.video_fps, 30);
    }

    #[test]
    fn test_unparseable_number() {
        match load_from_lookup(lookup(&[("MEDIA_VIDEO_CRF", "high")])) {
            Err(ConfigError::InvalidValue { key, value, .. }) => {
                assert_eq!(key, "MEDIA_VIDEO_CRF");
                assert_eq!(value, "high");
            }
            other => panic!("Expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        for (key, value) in [
            ("MEDIA_POLL_INTERVAL_MS", "0"),
            ("MEDIA_VIDEO_FPS", "0"),
            ("MEDIA_VIDEO_CRF", "52"),
            ("MEDIA_MAX_RETRIES", "0"),
            ("MEDIA_WORKER_ID", "../x"),
        ] {
            let result = load_from_lookup(lookup(&[(key, value)]));
            assert!(
                matches!(result, Err(ConfigError::Validation { .. })),
                "{}={} should be rejected",
                key,
                value
            );
        }
    }

    #[test]
    fn test_invalid_flag() {
        assert!(matches!(
            load_from_lookup(lookup(&[("MEDIA_WATCH", "maybe")])),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_load_config_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"queue_dir": "/data/queue", "video_fps": 24, "log_format": "json"}}"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.queue_dir, PathBuf::from("/data/queue"));
        assert_eq!(config.video_fps, 24);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.max_retries, 2);
    }

    #[test]
    fn test_load_config_missing_file() {
        assert!(matches!(
            load_config("/nonexistent/mediaq.json"),
            Err(ConfigError::ReadFile { .. })
        ));
    }

    #[test]
    fn test_load_config_invalid_json() {
        assert!(matches!(
            load_config_from_str("{not json"),
            Err(ConfigError::ParseJson(_))
        ));
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"video_fps": 24, "max_retries": 4}}"#).unwrap();

        std::env::set_var("MEDIA_VIDEO_FPS", "25");
        let config = load(Some(file.path()));
        std::env::remove_var("MEDIA_VIDEO_FPS");

        let config = config.unwrap();
        assert_eq!(config.video_fps, 25);
        assert_eq!(config.max_retries, 4);
    }

    #[test]
    #[serial]
    fn test_load_from_env() {
        std::env::set_var("MEDIA_POLL_INTERVAL_MS", "750");
        let config = load_from_env();
        std::env::remove_var("MEDIA_POLL_INTERVAL_MS");

        assert_eq!(config.unwrap().poll_interval_ms, 750);
    }
}
