use super::FileClassification;

/// How a classified file is put on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayStrategy {
    /// Decoded with FFmpeg and played in the viewer.
    NativeVideo,
    /// Decoded in-process and shown as a plain image.
    NativeImage,
    /// Rendering engine, cine viewport.
    EngineVideo,
    /// Rendering engine, stack viewport.
    EngineStack,
}

impl DisplayStrategy {
    pub fn for_classification(classification: FileClassification) -> Option<Self> {
        match classification {
            FileClassification::RegularVideo => Some(DisplayStrategy::NativeVideo),
            FileClassification::RegularImage => Some(DisplayStrategy::NativeImage),
            FileClassification::DicomVideo => Some(DisplayStrategy::EngineVideo),
            FileClassification::DicomImage => Some(DisplayStrategy::EngineStack),
            FileClassification::Unknown => None,
        }
    }
}
