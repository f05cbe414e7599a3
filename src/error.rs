use thiserror::Error;

/// Failures raised by the rendering engine while registering files,
/// reading headers or loading frames into viewports.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("No file registered for locator `{0}`")]
    UnknownLocator(String),

    #[error("No viewport with id `{0}`")]
    UnknownViewport(String),

    #[error("No cached volume with id `{0}`")]
    UnknownVolume(String),

    #[error("Viewport `{0}` was destroyed")]
    ViewportDestroyed(String),

    #[error("Object contains no decodable frames")]
    NoFrames,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Read(#[from] dicom::object::ReadError),

    #[error("Failed to decode pixel data: {0}")]
    Decode(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Everything the viewer surfaces to the user.
///
/// Classification probe failures never show up here: the classifier
/// recovers from them on its own.
#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("{}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Playback failed: {0}")]
    Playback(String),

    #[error(
        "Rendering engine error: {0}. \
         Check that DICOM codec support is available for this transfer syntax"
    )]
    RenderingEngine(#[from] EngineError),

    #[error("Could not read file: {0}")]
    Io(String),
}

impl ViewerError {
    /// Whether the error stops the file from being shown at all, as opposed
    /// to a display-level failure after rendering started.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            ViewerError::Validation(_) | ViewerError::UnsupportedFileType(_) | ViewerError::Io(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid settings file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Could not serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}
