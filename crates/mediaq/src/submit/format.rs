use std::path::Path;

use crate::error::SubmitError;
use crate::queue::JobKind;

/// One accepted upload type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaFormat {
    pub extension: &'static str,
    pub kind: JobKind,
    pub mimes: &'static [&'static str],
    /// Browser-safe target, if the upload cannot be served as-is.
    pub target: Option<TargetFormat>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetFormat {
    pub extension: &'static str,
    pub mime: &'static str,
}

pub const JPEG_TARGET: TargetFormat = TargetFormat {
    extension: "jpg",
    mime: "image/jpeg",
};

pub const MP4_TARGET: TargetFormat = TargetFormat {
    extension: "mp4",
    mime: "video/mp4",
};

const JPEG_MIMES: &[&str] = &["image/jpeg", "image/jpg", "image/pjpeg"];
const HEIC_MIMES: &[&str] = &[
    "image/heic",
    "image/heif",
    "image/heic-sequence",
    "image/heif-sequence",
];

pub const FORMATS: &[MediaFormat] = &[
    MediaFormat {
        extension: "jpg",
        kind: JobKind::Image,
        mimes: JPEG_MIMES,
        target: None,
    },
    MediaFormat {
        extension: "jpeg",
        kind: JobKind::Image,
        mimes: JPEG_MIMES,
        target: None,
    },
    MediaFormat {
        extension: "heic",
        kind: JobKind::Image,
        mimes: HEIC_MIMES,
        target: Some(JPEG_TARGET),
    },
    MediaFormat {
        extension: "heif",
        kind: JobKind::Image,
        mimes: HEIC_MIMES,
        target: Some(JPEG_TARGET),
    },
    MediaFormat {
        extension: "mp4",
        kind: JobKind::Video,
        mimes: &["video/mp4"],
        target: None,
    },
    MediaFormat {
        extension: "mov",
        kind: JobKind::Video,
        mimes: &["video/quicktime"],
        target: Some(MP4_TARGET),
    },
];

impl MediaFormat {
    /// Looks up an extension (case-insensitive, without the dot).
    pub fn from_extension(ext: &str) -> Option<&'static MediaFormat> {
        FORMATS.iter().find(|f| f.extension.eq_ignore_ascii_case(ext))
    }

    /// Validates an upload's file name against its declared MIME type.
    pub fn classify(file_name: &str, mime: &str) -> Result<&'static MediaFormat, SubmitError> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        let mime = normalize_mime(mime);

        let format = Self::from_extension(&extension).ok_or_else(|| SubmitError::UnsupportedType {
            extension: extension.clone(),
            mime: mime.clone(),
        })?;

        if !format.mimes.contains(&mime.as_str()) {
            return Err(SubmitError::MimeMismatch { extension, mime });
        }

        Ok(format)
    }

    pub fn needs_processing(&self) -> bool {
        self.target.is_some()
    }

    /// Extension of the file that is eventually served.
    pub fn output_extension(&self) -> &'static str {
        self.target.map(|t| t.extension).unwrap_or(self.extension)
    }
}

/// Lower-cases a MIME type and strips parameters (`; charset=...`).
pub fn normalize_mime(mime: &str) -> String {
    mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase()
}

/// Best guess at a file's MIME type from its name, for callers that
/// have no declared type (CLI uploads).
pub fn guess_mime(path: &Path) -> String {
    let is_heif = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("heic") || e.eq_ignore_ascii_case("heif"));
    if is_heif == Some(true) {
        return "image/heic".to_string();
    }
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
