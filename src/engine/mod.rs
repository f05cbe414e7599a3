//! A small rendering engine over dicom-rs.
//!
//! Files are registered with an [`ImageLoader`] and addressed through opaque
//! [`ImageLocator`]s from then on. A [`RenderingEngine`] owns the viewports
//! enabled on it; each viewport is a cheap, cloneable handle so that frame
//! loading can run as a background task while the UI keeps a reference.

pub mod cache;
pub mod metadata;
#[cfg(test)]
pub(crate) mod testing;
pub mod tools;
pub mod viewport;

pub use cache::{VolumeCache, VolumeId};
pub use tools::{Binding, ToolGroup, ToolName, ToolOptions};
pub use viewport::{RenderedFrame, VideoCapable, Viewport, ViewportCapable, VolumeInput};

use crate::error::EngineError;
use crate::image_pipeline::{Frame, FrameImagePipeline};
use crate::model::{FileId, UploadedFile};
use dicom::dictionary_std::tags;
use dicom::object::{open_file, DefaultDicomObject, OpenFileOptions};
use metadata::{MetadataProbe, MultiframeModule, SopCommonModule};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

const LOCATOR_SCHEME: &str = "dicomfile";

/// Opaque address of a registered file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageLocator(String);

impl fmt::Display for ImageLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViewportId(String);

impl ViewportId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ViewportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewportType {
    Stack,
    Video,
    Volume,
}

/// Named slot in the window layout that shows a viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementId(pub &'static str);

#[derive(Debug, Clone, PartialEq)]
pub struct ViewportOptions {
    /// Used when the object does not declare its own frame timing.
    pub default_frame_interval: Duration,
    pub loop_playback: bool,
}

impl Default for ViewportOptions {
    fn default() -> Self {
        Self {
            default_frame_interval: Duration::from_secs_f64(1.0 / 30.0),
            loop_playback: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ViewportInput {
    pub viewport_id: ViewportId,
    pub kind: ViewportType,
    pub element: ElementId,
    pub options: ViewportOptions,
}

/// Frames of one registered object plus what is needed to order it in a
/// volume.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub frames: Vec<Frame>,
    pub instance_number: Option<i32>,
    pub frame_interval: Option<Duration>,
}

#[derive(Default)]
struct LoaderState {
    next_id: u64,
    locators: HashMap<FileId, ImageLocator>,
    paths: HashMap<ImageLocator, PathBuf>,
    headers: HashMap<ImageLocator, Arc<DefaultDicomObject>>,
}

/// Registry of files known to the engine and cache of their headers.
#[derive(Clone, Default)]
pub struct ImageLoader {
    state: Arc<Mutex<LoaderState>>,
}

impl ImageLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(&self, locator: &ImageLocator) -> Option<Arc<DefaultDicomObject>> {
        lock(&self.state).headers.get(locator).cloned()
    }

    fn path_of(&self, locator: &ImageLocator) -> Result<PathBuf, EngineError> {
        lock(&self.state)
            .paths
            .get(locator)
            .cloned()
            .ok_or_else(|| EngineError::UnknownLocator(locator.to_string()))
    }

    /// Reads and decodes the whole object behind `locator`.
    pub fn load_image(
        &self,
        locator: &ImageLocator,
    ) -> impl Future<Output = Result<LoadedImage, EngineError>> + Send + 'static {
        let path = self.path_of(locator);
        async move {
            let path = path?;
            run_blocking(move || {
                let object = open_file(&path)?;
                Ok(LoadedImage {
                    frames: FrameImagePipeline::render_all_frames(&object)?,
                    instance_number: metadata::instance_number(&object),
                    frame_interval: metadata::frame_interval(&object),
                })
            })
            .await
        }
    }

    /// Forgets every registered file and cached header.
    pub fn purge(&self) {
        let mut state = lock(&self.state);
        state.locators.clear();
        state.paths.clear();
        state.headers.clear();
    }

    #[cfg(test)]
    pub fn registered_count(&self) -> usize {
        lock(&self.state).paths.len()
    }
}

impl MetadataProbe for ImageLoader {
    fn register_file(&self, file: &UploadedFile) -> ImageLocator {
        let mut state = lock(&self.state);
        if let Some(locator) = state.locators.get(&file.id()) {
            return locator.clone();
        }
        state.next_id += 1;
        let locator = ImageLocator(format!("{LOCATOR_SCHEME}:{}", state.next_id));
        state.locators.insert(file.id(), locator.clone());
        state.paths.insert(locator.clone(), file.path().to_path_buf());
        locator
    }

    fn load_metadata(
        &self,
        locator: &ImageLocator,
    ) -> impl Future<Output = Result<(), EngineError>> + Send {
        let path = self.path_of(locator);
        let state = Arc::clone(&self.state);
        let locator = locator.clone();
        async move {
            if lock(&state).headers.contains_key(&locator) {
                return Ok(());
            }
            let path = path?;
            let header = run_blocking(move || {
                OpenFileOptions::new()
                    .read_until(tags::PIXEL_DATA)
                    .open_file(&path)
                    .map_err(EngineError::from)
            })
            .await?;
            let mut registry = lock(&state);
            if registry.paths.contains_key(&locator) {
                registry.headers.insert(locator, Arc::new(header));
            } else {
                log::debug!("{locator} was purged while its header loaded");
            }
            Ok(())
        }
    }

    fn sop_common_module(&self, locator: &ImageLocator) -> Option<SopCommonModule> {
        metadata::sop_common_module(&*self.header(locator)?)
    }

    fn multiframe_module(&self, locator: &ImageLocator) -> Option<MultiframeModule> {
        metadata::multiframe_module(&*self.header(locator)?)
    }

    fn number_of_frames(&self, locator: &ImageLocator) -> Option<u32> {
        metadata::number_of_frames(&*self.header(locator)?)
    }
}

/// Owns the viewports of one mounted viewer and the volumes they show.
pub struct RenderingEngine {
    id: String,
    loader: ImageLoader,
    volumes: VolumeCache,
    viewports: HashMap<ViewportId, Viewport>,
}

impl RenderingEngine {
    pub fn create_engine(id: impl Into<String>, loader: ImageLoader) -> Self {
        let id = id.into();
        log::debug!("Creating rendering engine {id}");
        Self {
            id,
            loader,
            volumes: VolumeCache::default(),
            viewports: HashMap::new(),
        }
    }

    pub fn loader(&self) -> &ImageLoader {
        &self.loader
    }

    pub fn volumes(&self) -> &VolumeCache {
        &self.volumes
    }

    /// Creates a viewport of the requested kind. An existing viewport with
    /// the same id is destroyed first.
    pub fn enable_element(&mut self, input: ViewportInput) -> Viewport {
        self.disable_element(&input.viewport_id);

        log::debug!(
            "{}: enabling {:?} viewport {} in {}",
            self.id,
            input.kind,
            input.viewport_id,
            input.element.0
        );
        let viewport = Viewport::new(input, self.loader.clone(), self.volumes.clone());
        self.viewports
            .insert(viewport.id().clone(), viewport.clone());
        viewport
    }

    pub fn get_viewport(&self, id: &ViewportId) -> Option<&Viewport> {
        self.viewports.get(id)
    }

    pub fn disable_element(&mut self, id: &ViewportId) {
        if let Some(viewport) = self.viewports.remove(id) {
            viewport.destroy();
        }
    }

    #[cfg(test)]
    pub fn viewport_count(&self) -> usize {
        self.viewports.len()
    }

    /// Destroys every viewport and drops registered files and volumes.
    pub fn destroy(&mut self) {
        for (_, viewport) in self.viewports.drain() {
            viewport.destroy();
        }
        self.volumes.purge();
        self.loader.purge();
        log::debug!("{}: destroyed", self.id);
    }
}

impl Drop for RenderingEngine {
    fn drop(&mut self) {
        self.destroy();
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) async fn run_blocking<T, F>(work: F) -> Result<T, EngineError>
where
    F: FnOnce() -> Result<T, EngineError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| EngineError::Task(err.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::metadata::fixtures::Fixture;
    use super::*;
    use crate::model::classification::{classify, FileClassification};
    use tempfile::tempdir;

    fn stack_input() -> ViewportInput {
        ViewportInput {
            viewport_id: ViewportId::new("stack"),
            kind: ViewportType::Stack,
            element: ElementId("main"),
            options: ViewportOptions::default(),
        }
    }

    #[test]
    fn registering_twice_returns_the_same_locator() {
        let loader = ImageLoader::new();
        let file = UploadedFile::new("/tmp/a.dcm", "a.dcm", "", 10);
        let first = loader.register_file(&file);
        assert_eq!(loader.register_file(&file), first);
        assert!(first.to_string().starts_with("dicomfile:"));

        let other = UploadedFile::new("/tmp/a.dcm", "a.dcm", "", 10);
        assert_ne!(loader.register_file(&other), first);
        assert_eq!(loader.registered_count(), 2);
    }

    #[tokio::test]
    async fn unknown_locators_fail_to_load() {
        let loader = ImageLoader::new();
        let locator = ImageLocator("dicomfile:99".into());
        assert!(matches!(
            loader.load_metadata(&locator).await,
            Err(EngineError::UnknownLocator(_))
        ));
        assert!(loader.sop_common_module(&locator).is_none());
    }

    #[tokio::test]
    async fn classifies_real_files_through_the_loader() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("us.dcm");
        Fixture {
            sop_class_uid: "1.2.840.10008.5.1.4.1.1.2",
            number_of_frames: Some("4"),
            ..Default::default()
        }
        .write(&path);

        let loader = ImageLoader::new();
        let file = UploadedFile::from_path(&path).expect("upload");
        assert_eq!(file.mime_type(), "application/dicom");
        assert_eq!(
            classify(&file, &loader).await,
            FileClassification::DicomVideo
        );
    }

    #[tokio::test]
    async fn malformed_dicom_classifies_as_image() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("garbage.dcm");
        std::fs::write(&path, b"definitely not DICOM").expect("write file");

        let loader = ImageLoader::new();
        let file = UploadedFile::from_path(&path).expect("upload");
        assert_eq!(
            classify(&file, &loader).await,
            FileClassification::DicomImage
        );
    }

    #[tokio::test]
    async fn headers_loaded_after_a_purge_are_not_cached() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("ct.dcm");
        Fixture {
            sop_class_uid: "1.2.840.10008.5.1.4.1.1.2",
            ..Default::default()
        }
        .write(&path);

        let loader = ImageLoader::new();
        let locator = loader.register_file(&UploadedFile::from_path(&path).expect("upload"));
        let load = loader.load_metadata(&locator);
        loader.purge();

        load.await.expect("header read");
        assert!(loader.header(&locator).is_none());
        assert!(loader.sop_common_module(&locator).is_none());
    }

    #[test]
    fn enabling_an_existing_id_replaces_the_viewport() {
        let mut engine = RenderingEngine::create_engine("test", ImageLoader::new());
        let first = engine.enable_element(stack_input());
        let second = engine.enable_element(stack_input());
        assert!(first.is_destroyed());
        assert!(!second.is_destroyed());
        assert_eq!(engine.viewport_count(), 1);
    }

    #[test]
    fn destroy_releases_everything() {
        let loader = ImageLoader::new();
        let mut engine = RenderingEngine::create_engine("test", loader.clone());
        loader.register_file(&UploadedFile::new("/tmp/a.dcm", "a.dcm", "", 10));
        let viewport = engine.enable_element(stack_input());

        engine.destroy();
        assert!(viewport.is_destroyed());
        assert_eq!(engine.viewport_count(), 0);
        assert_eq!(loader.registered_count(), 0);
        assert!(engine.get_viewport(&ViewportId::new("stack")).is_none());
    }
}
