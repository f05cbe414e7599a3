//! Decides what kind of media an upload is.
//!
//! Extension and MIME checks are deliberately lax: suffixes are compared
//! case-insensitively and MIME types only need to *contain* a known type,
//! so vendor-prefixed strings such as `x-vendor/video/mp4` still match.

use super::upload::{UploadedFile, DICOM_MIME_TYPE};
use crate::engine::metadata::MetadataProbe;
use crate::error::EngineError;
use std::fmt;

/// SOP classes that always carry cine content, whatever their frame count.
pub const VIDEO_SOP_CLASS_UIDS: &[&str] = &[
    // Video Endoscopic Image Storage
    "1.2.840.10008.5.1.4.1.1.77.1.1.1",
    // Video Microscopic Image Storage
    "1.2.840.10008.5.1.4.1.1.77.1.2.1",
    // Video Photographic Image Storage
    "1.2.840.10008.5.1.4.1.1.77.1.4.1",
    // Ophthalmic Photography 8 Bit Image Storage
    "1.2.840.10008.5.1.4.1.1.77.1.5.1",
    // Ultrasound Multi-frame Image Storage
    "1.2.840.10008.5.1.4.1.1.3.1",
    // Ultrasound Multi-frame Image Storage (Retired)
    "1.2.840.10008.5.1.4.1.1.3",
    // X-Ray Angiographic Image Storage
    "1.2.840.10008.5.1.4.1.1.12.1",
    // X-Ray Radiofluoroscopic Image Storage
    "1.2.840.10008.5.1.4.1.1.12.2",
];

pub const DICOM_EXTENSIONS: &[&str] = &[".dcm"];

pub const VIDEO_EXTENSIONS: &[&str] = &[
    ".mp4", ".avi", ".mov", ".wmv", ".flv", ".webm", ".mpeg", ".mpg",
];

pub const VIDEO_MIME_TYPES: &[&str] = &[
    "video/mp4",
    "video/avi",
    "video/quicktime",
    "video/x-ms-wmv",
];

pub const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".bmp", ".tiff"];

pub const IMAGE_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/bmp",
    "image/tiff",
];

/// Advisory filter for the file picker. The classifier has the final word.
pub const PICKER_EXTENSIONS: &[&str] = &[
    "dcm", "mp4", "avi", "mov", "wmv", "flv", "webm", "jpg", "jpeg", "png", "gif", "bmp",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileClassification {
    DicomVideo,
    DicomImage,
    RegularVideo,
    RegularImage,
    Unknown,
}

impl FileClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileClassification::DicomVideo => "dicom-video",
            FileClassification::DicomImage => "dicom-image",
            FileClassification::RegularVideo => "regular-video",
            FileClassification::RegularImage => "regular-image",
            FileClassification::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FileClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a metadata probe found out about a DICOM candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DicomProbe {
    pub sop_class_uid: Option<String>,
    pub number_of_frames: u32,
}

impl DicomProbe {
    pub fn is_video(&self) -> bool {
        self.number_of_frames > 1
            || self
                .sop_class_uid
                .as_deref()
                .is_some_and(is_video_sop_class)
    }

    pub fn classification(&self) -> FileClassification {
        if self.is_video() {
            FileClassification::DicomVideo
        } else {
            FileClassification::DicomImage
        }
    }
}

pub fn is_video_sop_class(uid: &str) -> bool {
    let uid = uid.trim_end_matches(['\0', ' ']);
    VIDEO_SOP_CLASS_UIDS.contains(&uid)
}

pub fn is_dicom_candidate(name: &str, mime_type: &str) -> bool {
    has_suffix(name, DICOM_EXTENSIONS) || mime_type.eq_ignore_ascii_case(DICOM_MIME_TYPE)
}

/// Classifies an upload, probing DICOM metadata when the name or type
/// suggests a DICOM object.
///
/// Probe failures never reach the caller: the file is treated as a
/// single-frame DICOM image so that the viewer still tries to show it.
pub async fn classify<P: MetadataProbe>(file: &UploadedFile, probe: &P) -> FileClassification {
    if !is_dicom_candidate(file.name(), file.mime_type()) {
        return classify_regular(file.name(), file.mime_type());
    }

    match probe_dicom(file, probe).await {
        Ok(dicom) => {
            log::debug!(
                "{}: SOP class {:?}, {} frame(s)",
                file.name(),
                dicom.sop_class_uid,
                dicom.number_of_frames
            );
            dicom.classification()
        }
        Err(err) => {
            log::warn!(
                "{}: metadata probe failed, treating as a DICOM image ({err})",
                file.name()
            );
            FileClassification::DicomImage
        }
    }
}

/// Rules for everything that is not a DICOM candidate.
pub fn classify_regular(name: &str, mime_type: &str) -> FileClassification {
    if has_suffix(name, VIDEO_EXTENSIONS) || contains_any(mime_type, VIDEO_MIME_TYPES) {
        FileClassification::RegularVideo
    } else if has_suffix(name, IMAGE_EXTENSIONS) || contains_any(mime_type, IMAGE_MIME_TYPES) {
        FileClassification::RegularImage
    } else {
        FileClassification::Unknown
    }
}

pub async fn probe_dicom<P: MetadataProbe>(
    file: &UploadedFile,
    probe: &P,
) -> Result<DicomProbe, EngineError> {
    let locator = probe.register_file(file);
    probe.load_metadata(&locator).await?;

    let sop_class_uid = probe
        .sop_common_module(&locator)
        .map(|module| module.sop_class_uid);
    let number_of_frames = probe
        .multiframe_module(&locator)
        .map(|module| module.number_of_frames)
        .or_else(|| probe.number_of_frames(&locator))
        .unwrap_or(1);

    Ok(DicomProbe {
        sop_class_uid,
        number_of_frames,
    })
}

fn has_suffix(name: &str, suffixes: &[&str]) -> bool {
    let name = name.to_ascii_lowercase();
    suffixes.iter().any(|suffix| name.ends_with(suffix))
}

fn contains_any(mime_type: &str, needles: &[&str]) -> bool {
    let mime_type = mime_type.to_ascii_lowercase();
    needles.iter().any(|needle| mime_type.contains(needle))
}
