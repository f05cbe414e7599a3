use super::cache::{VolumeCache, VolumeId};
use super::{
    lock, ImageLoader, ImageLocator, LoadedImage, ViewportId, ViewportInput, ViewportOptions,
    ViewportType,
};
use crate::error::EngineError;
use crate::image_pipeline::Frame;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const MIN_ZOOM: f32 = 0.1;
const MAX_ZOOM: f32 = 10.0;

pub type LoadFuture = Pin<Box<dyn Future<Output = Result<(), EngineError>> + Send + 'static>>;

#[derive(Debug, Clone, PartialEq)]
pub struct VolumeInput {
    pub volume_id: VolumeId,
}

/// What a viewport currently shows.
#[derive(Debug, Clone)]
pub struct RenderedFrame {
    pub frame: Frame,
    pub index: usize,
    pub count: usize,
    pub zoom: f32,
}

/// Operations every viewport supports.
pub trait ViewportCapable {
    fn id(&self) -> &ViewportId;
    fn render(&self) -> Option<RenderedFrame>;
    fn reset_camera(&self);
    fn zoom_by(&self, factor: f32);
}

pub trait StackCapable: ViewportCapable {
    fn set_stack(&self, locators: Vec<ImageLocator>) -> LoadFuture;
    /// Moves through the stack by `delta` images.
    fn scroll(&self, delta: i32, loop_around: bool);
}

pub trait VideoCapable: ViewportCapable {
    fn set_video(&self, locator: ImageLocator) -> LoadFuture;
    fn play(&self);
    fn pause(&self);
    fn is_playing(&self) -> bool;
    /// Advances one frame; stops at the end unless the viewport loops.
    fn advance(&self);
    fn step(&self, delta: i32);
    fn set_time(&self, seconds: f64);
    fn current_time(&self) -> f64;
    fn duration(&self) -> f64;
    fn frame_interval(&self) -> Duration;
}

pub trait VolumeCapable: ViewportCapable {
    fn set_volumes(&self, volumes: &[VolumeInput]) -> LoadFuture;
    fn scroll(&self, delta: i32, loop_around: bool);
}

#[derive(Debug)]
struct ViewportState {
    frames: Vec<Frame>,
    index: usize,
    zoom: f32,
    playing: bool,
    frame_interval: Duration,
    destroyed: bool,
}

impl ViewportState {
    fn new(options: &ViewportOptions) -> Self {
        Self {
            frames: Vec::new(),
            index: 0,
            zoom: 1.0,
            playing: false,
            frame_interval: options.default_frame_interval,
            destroyed: false,
        }
    }

    fn move_by(&mut self, delta: i32, loop_around: bool) {
        let count = self.frames.len();
        if count == 0 {
            return;
        }
        let target = self.index as i64 + i64::from(delta);
        self.index = if loop_around {
            target.rem_euclid(count as i64) as usize
        } else {
            target.clamp(0, count as i64 - 1) as usize
        };
    }
}

struct Shared {
    id: ViewportId,
    kind: ViewportType,
    options: ViewportOptions,
    loader: ImageLoader,
    volumes: VolumeCache,
    state: Mutex<ViewportState>,
}

/// Handle to one enabled viewport. Clones share state; the capability a
/// viewport offers depends on the type it was enabled with.
#[derive(Clone)]
pub struct Viewport {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Viewport")
            .field("id", &self.shared.id)
            .field("kind", &self.shared.kind)
            .finish()
    }
}

impl Viewport {
    pub(super) fn new(input: ViewportInput, loader: ImageLoader, volumes: VolumeCache) -> Self {
        let state = ViewportState::new(&input.options);
        Self {
            shared: Arc::new(Shared {
                id: input.viewport_id,
                kind: input.kind,
                options: input.options,
                loader,
                volumes,
                state: Mutex::new(state),
            }),
        }
    }

    pub fn as_stack(&self) -> Option<&dyn StackCapable> {
        (self.shared.kind == ViewportType::Stack).then_some(self as &dyn StackCapable)
    }

    pub fn as_video(&self) -> Option<&dyn VideoCapable> {
        (self.shared.kind == ViewportType::Video).then_some(self as &dyn VideoCapable)
    }

    pub fn as_volume(&self) -> Option<&dyn VolumeCapable> {
        (self.shared.kind == ViewportType::Volume).then_some(self as &dyn VolumeCapable)
    }

    #[cfg(test)]
    pub fn is_destroyed(&self) -> bool {
        lock(&self.shared.state).destroyed
    }

    pub(super) fn destroy(&self) {
        let mut state = lock(&self.shared.state);
        state.destroyed = true;
        state.playing = false;
        state.frames.clear();
    }

    /// Installs decoded frames unless the viewport was destroyed meanwhile.
    fn install(
        &self,
        frames: Vec<Frame>,
        frame_interval: Option<Duration>,
    ) -> Result<(), EngineError> {
        if frames.is_empty() {
            return Err(EngineError::NoFrames);
        }
        let mut state = lock(&self.shared.state);
        if state.destroyed {
            return Err(EngineError::ViewportDestroyed(self.shared.id.to_string()));
        }
        state.frames = frames;
        state.index = 0;
        state.zoom = 1.0;
        state.playing = false;
        state.frame_interval = frame_interval
            .filter(|interval| !interval.is_zero())
            .unwrap_or(self.shared.options.default_frame_interval);
        Ok(())
    }

    fn load_images(
        &self,
        locators: Vec<ImageLocator>,
    ) -> impl Future<Output = Result<Vec<LoadedImage>, EngineError>> + Send + 'static {
        let loads: Vec<_> = locators
            .iter()
            .map(|locator| self.shared.loader.load_image(locator))
            .collect();
        async move {
            let mut images = Vec::with_capacity(loads.len());
            for load in loads {
                images.push(load.await?);
            }
            Ok(images)
        }
    }
}

impl ViewportCapable for Viewport {
    fn id(&self) -> &ViewportId {
        &self.shared.id
    }

    fn render(&self) -> Option<RenderedFrame> {
        let state = lock(&self.shared.state);
        let frame = state.frames.get(state.index)?.clone();
        Some(RenderedFrame {
            frame,
            index: state.index,
            count: state.frames.len(),
            zoom: state.zoom,
        })
    }

    fn reset_camera(&self) {
        lock(&self.shared.state).zoom = 1.0;
    }

    fn zoom_by(&self, factor: f32) {
        if !factor.is_finite() || factor <= 0.0 {
            return;
        }
        let mut state = lock(&self.shared.state);
        state.zoom = (state.zoom * factor).clamp(MIN_ZOOM, MAX_ZOOM);
    }
}

impl StackCapable for Viewport {
    fn set_stack(&self, locators: Vec<ImageLocator>) -> LoadFuture {
        let viewport = self.clone();
        let images = self.load_images(locators);
        Box::pin(async move {
            let frames = images
                .await?
                .into_iter()
                .flat_map(|image| image.frames)
                .collect();
            viewport.install(frames, None)
        })
    }

    fn scroll(&self, delta: i32, loop_around: bool) {
        lock(&self.shared.state).move_by(delta, loop_around);
    }
}

impl VideoCapable for Viewport {
    fn set_video(&self, locator: ImageLocator) -> LoadFuture {
        let viewport = self.clone();
        let load = self.shared.loader.load_image(&locator);
        Box::pin(async move {
            let image = load.await?;
            viewport.install(image.frames, image.frame_interval)
        })
    }

    fn play(&self) {
        let mut state = lock(&self.shared.state);
        if !state.frames.is_empty() && !state.destroyed {
            if state.index + 1 == state.frames.len() {
                state.index = 0;
            }
            state.playing = true;
        }
    }

    fn pause(&self) {
        lock(&self.shared.state).playing = false;
    }

    fn is_playing(&self) -> bool {
        lock(&self.shared.state).playing
    }

    fn advance(&self) {
        let mut state = lock(&self.shared.state);
        if !state.playing || state.frames.is_empty() {
            return;
        }
        if state.index + 1 < state.frames.len() {
            state.index += 1;
        } else if self.shared.options.loop_playback {
            state.index = 0;
        } else {
            state.playing = false;
        }
    }

    fn step(&self, delta: i32) {
        let mut state = lock(&self.shared.state);
        state.playing = false;
        state.move_by(delta, false);
    }

    fn set_time(&self, seconds: f64) {
        let mut state = lock(&self.shared.state);
        if state.frames.is_empty() {
            return;
        }
        let interval = state.frame_interval.as_secs_f64();
        let index = if interval > 0.0 {
            (seconds.max(0.0) / interval).floor() as usize
        } else {
            0
        };
        state.index = index.min(state.frames.len() - 1);
    }

    fn current_time(&self) -> f64 {
        let state = lock(&self.shared.state);
        state.index as f64 * state.frame_interval.as_secs_f64()
    }

    fn duration(&self) -> f64 {
        let state = lock(&self.shared.state);
        state.frames.len() as f64 * state.frame_interval.as_secs_f64()
    }

    fn frame_interval(&self) -> Duration {
        lock(&self.shared.state).frame_interval
    }
}

impl VolumeCapable for Viewport {
    /// Shows the first volume; slices are ordered by instance number when
    /// every image has one, otherwise by cache order.
    fn set_volumes(&self, volumes: &[VolumeInput]) -> LoadFuture {
        let viewport = self.clone();
        let Some(first) = volumes.first() else {
            return Box::pin(async { Err(EngineError::NoFrames) });
        };
        if volumes.len() > 1 {
            log::debug!(
                "{}: showing {} of {} volumes",
                self.shared.id,
                first.volume_id,
                volumes.len()
            );
        }
        let locators = match self.shared.volumes.locators(&first.volume_id) {
            Ok(locators) => locators,
            Err(err) => return Box::pin(async move { Err(err) }),
        };
        let images = self.load_images(locators);
        Box::pin(async move {
            let mut images = images.await?;
            if images.iter().all(|image| image.instance_number.is_some()) {
                images.sort_by_key(|image| image.instance_number);
            }
            let frames = images.into_iter().flat_map(|image| image.frames).collect();
            viewport.install(frames, None)
        })
    }

    fn scroll(&self, delta: i32, loop_around: bool) {
        lock(&self.shared.state).move_by(delta, loop_around);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::metadata::fixtures::Fixture;
    use crate::engine::metadata::MetadataProbe;
    use crate::engine::{ElementId, RenderingEngine};
    use crate::model::UploadedFile;
    use std::path::Path;
    use tempfile::tempdir;

    fn input(kind: ViewportType) -> ViewportInput {
        ViewportInput {
            viewport_id: ViewportId::new(format!("{kind:?}")),
            kind,
            element: ElementId("main"),
            options: ViewportOptions {
                default_frame_interval: Duration::from_millis(100),
                loop_playback: false,
            },
        }
    }

    fn cine_fixture(path: &Path, frames: u8, instance: &str) {
        let pixel_count = usize::from(frames) * 4;
        Fixture {
            sop_class_uid: "1.2.840.10008.5.1.4.1.1.3.1",
            number_of_frames: Some(if frames == 1 { "1" } else { "3" }),
            frame_time: Some("50"),
            instance_number: Some(instance),
            pixels: Some((2, 2, vec![128; pixel_count])),
            ..Default::default()
        }
        .write(path);
    }

    fn test_frames(count: usize) -> Vec<Frame> {
        (0..count)
            .map(|_| Frame::from_rgba(1, 1, vec![0, 0, 0, 255]))
            .collect()
    }

    #[test]
    fn capabilities_follow_the_viewport_type() {
        let mut engine = RenderingEngine::create_engine("caps", ImageLoader::new());
        let stack = engine.enable_element(input(ViewportType::Stack));
        let video = engine.enable_element(input(ViewportType::Video));
        let volume = engine.enable_element(input(ViewportType::Volume));

        assert!(stack.as_stack().is_some() && stack.as_video().is_none());
        assert!(video.as_video().is_some() && video.as_volume().is_none());
        assert!(volume.as_volume().is_some() && volume.as_stack().is_none());
    }

    #[test]
    fn scrolling_clamps_or_wraps() {
        let mut state = ViewportState::new(&ViewportOptions::default());
        state.frames = test_frames(3);

        state.move_by(-1, false);
        assert_eq!(state.index, 0);
        state.move_by(10, false);
        assert_eq!(state.index, 2);
        state.move_by(1, true);
        assert_eq!(state.index, 0);
        state.move_by(-1, true);
        assert_eq!(state.index, 2);
    }

    #[test]
    fn playback_stops_at_the_end_without_looping() {
        let viewport = Viewport::new(
            input(ViewportType::Video),
            ImageLoader::new(),
            VolumeCache::default(),
        );
        viewport.install(test_frames(2), None).expect("install");

        viewport.play();
        viewport.advance();
        assert_eq!(viewport.render().map(|r| r.index), Some(1));
        viewport.advance();
        assert!(!viewport.is_playing());

        viewport.play();
        assert_eq!(viewport.render().map(|r| r.index), Some(0));
    }

    #[test]
    fn seeking_maps_seconds_to_frames() {
        let viewport = Viewport::new(
            input(ViewportType::Video),
            ImageLoader::new(),
            VolumeCache::default(),
        );
        viewport.install(test_frames(10), None).expect("install");

        assert!((viewport.duration() - 1.0).abs() < 1e-9);
        viewport.set_time(0.45);
        assert_eq!(viewport.render().map(|r| r.index), Some(4));
        viewport.set_time(99.0);
        assert_eq!(viewport.render().map(|r| r.index), Some(9));
    }

    #[test]
    fn zero_frame_interval_falls_back_to_the_default() {
        let viewport = Viewport::new(
            input(ViewportType::Video),
            ImageLoader::new(),
            VolumeCache::default(),
        );
        viewport
            .install(test_frames(3), Some(Duration::ZERO))
            .expect("install");
        assert_eq!(viewport.frame_interval(), Duration::from_millis(100));
    }

    #[test]
    fn zoom_is_clamped_and_resettable() {
        let viewport = Viewport::new(
            input(ViewportType::Stack),
            ImageLoader::new(),
            VolumeCache::default(),
        );
        viewport.install(test_frames(1), None).expect("install");

        viewport.zoom_by(100.0);
        assert_eq!(viewport.render().map(|r| r.zoom), Some(MAX_ZOOM));
        viewport.zoom_by(-1.0);
        assert_eq!(viewport.render().map(|r| r.zoom), Some(MAX_ZOOM));
        viewport.reset_camera();
        assert_eq!(viewport.render().map(|r| r.zoom), Some(1.0));
    }

    #[test]
    fn destroyed_viewports_refuse_frames() {
        let viewport = Viewport::new(
            input(ViewportType::Stack),
            ImageLoader::new(),
            VolumeCache::default(),
        );
        viewport.destroy();
        assert!(matches!(
            viewport.install(test_frames(1), None),
            Err(EngineError::ViewportDestroyed(_))
        ));
        assert!(viewport.render().is_none());
    }

    #[tokio::test]
    async fn video_viewport_uses_declared_frame_time() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("cine.dcm");
        cine_fixture(&path, 3, "1");

        let loader = ImageLoader::new();
        let locator = loader.register_file(&UploadedFile::from_path(&path).expect("upload"));
        let mut engine = RenderingEngine::create_engine("video", loader);
        let viewport = engine.enable_element(input(ViewportType::Video));
        let video = viewport.as_video().expect("video capable");

        video.set_video(locator).await.expect("load video");
        assert!((video.frame_interval().as_secs_f64() - 0.05).abs() < 1e-6);
        assert_eq!(viewport.render().map(|r| r.count), Some(3));
    }

    #[tokio::test]
    async fn volume_slices_are_sorted_by_instance_number() {
        let dir = tempdir().expect("temp dir");
        let loader = ImageLoader::new();
        let mut locators = Vec::new();
        for instance in ["3", "1", "2"] {
            let path = dir.path().join(format!("slice-{instance}.dcm"));
            cine_fixture(&path, 1, instance);
            let file = UploadedFile::from_path(&path).expect("upload");
            locators.push(loader.register_file(&file));
        }

        let mut engine = RenderingEngine::create_engine("volume", loader);
        let volume_id = VolumeId::new("series");
        engine
            .volumes()
            .create_and_cache_volume(volume_id.clone(), locators);
        let viewport = engine.enable_element(input(ViewportType::Volume));
        let volume = viewport.as_volume().expect("volume capable");

        volume
            .set_volumes(&[VolumeInput { volume_id }])
            .await
            .expect("load volume");
        assert_eq!(viewport.render().map(|r| r.count), Some(3));
        volume.scroll(5, false);
        assert_eq!(viewport.render().map(|r| r.index), Some(2));
    }

    #[tokio::test]
    async fn unknown_volumes_fail() {
        let viewport = Viewport::new(
            input(ViewportType::Volume),
            ImageLoader::new(),
            VolumeCache::default(),
        );
        let result = viewport
            .set_volumes(&[VolumeInput {
                volume_id: VolumeId::new("missing"),
            }])
            .await;
        assert!(matches!(result, Err(EngineError::UnknownVolume(_))));
    }
}
