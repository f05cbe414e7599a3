//! One mounted viewer: the file being shown, the engine and tool group
//! showing it, and the state machine that gets it on screen.
//!
//! ```text
//! Idle -> Validating -> Classifying -> Rendering -> Ready
//!              \              \            \
//!               `-------------`------------`-> Failed
//! ```
//!
//! `teardown` is valid from every state and always ends in `Idle`.
//! Every piece of async work is stamped with a [`Ticket`]; results whose
//! ticket is no longer current are dropped, so a slow probe for a file the
//! user already replaced can never touch the new one. Files still being
//! read when the user picks another are dropped the same way, by
//! [`Selection`].

use crate::config::{Config, PlaybackConfig, ToolsConfig};
use crate::engine::metadata::{header_rows, HeaderRow, MetadataProbe, MIN_FRAME_INTERVAL};
use crate::engine::viewport::LoadFuture;
use crate::engine::{
    Binding, ElementId, ImageLoader, ImageLocator, RenderedFrame, RenderingEngine, ToolGroup,
    ToolName, ToolOptions, VideoCapable, Viewport, ViewportCapable, ViewportId, ViewportInput,
    ViewportOptions, ViewportType, VolumeId, VolumeInput,
};
use crate::error::{EngineError, ViewerError};
use crate::image_pipeline::Frame;
use crate::model::{classify, validate, DisplayStrategy, FileClassification, FileId, UploadedFile};
use crate::native::{self, NativeMedia, VideoInfo, VideoPlayer};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const VIEWPORT_ELEMENT: ElementId = ElementId("viewer-main");
const STACK_VIEWPORT: &str = "stack-viewport";
const VIDEO_VIEWPORT: &str = "video-viewport";
const VOLUME_VIEWPORT: &str = "volume-viewport";

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// One pick or drop, issued before the file is read from disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection(u64);

/// Identity of one unit of async work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
    file_id: FileId,
}

/// A validated file waiting to be classified.
#[derive(Debug, Clone)]
pub struct ClassifyTicket {
    ticket: Ticket,
    file: UploadedFile,
}

impl ClassifyTicket {
    pub fn ticket(&self) -> Ticket {
        self.ticket
    }

    pub fn classify<P>(
        self,
        probe: P,
    ) -> impl Future<Output = (Ticket, FileClassification)> + Send + 'static
    where
        P: MetadataProbe + 'static,
    {
        async move {
            let classification = classify(&self.file, &probe).await;
            (self.ticket, classification)
        }
    }
}

/// What a finished render job produced.
#[derive(Debug, Clone)]
pub enum RenderOutput {
    /// Frames were loaded into the active engine viewport.
    Engine,
    Image(Frame),
    Video(VideoInfo),
}

type RenderFuture = Pin<Box<dyn Future<Output = Result<RenderOutput, ViewerError>> + Send>>;

/// Loading work for the host to run off the update loop.
pub struct RenderJob {
    ticket: Ticket,
    future: RenderFuture,
}

impl RenderJob {
    pub async fn run(self) -> (Ticket, Result<RenderOutput, Arc<ViewerError>>) {
        (self.ticket, self.future.await.map_err(Arc::new))
    }

    fn engine(ticket: Ticket, load: LoadFuture) -> Self {
        Self {
            ticket,
            future: Box::pin(async move {
                load.await?;
                Ok(RenderOutput::Engine)
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DicomVideoMode {
    /// Cine playback in a video viewport.
    #[default]
    Playback,
    /// Frames as slices of a volume, browsed with the scroll tool.
    Frames,
}

#[derive(Debug, Clone)]
pub enum SessionState {
    Idle,
    Validating {
        file: UploadedFile,
    },
    Classifying {
        file: UploadedFile,
    },
    Rendering {
        file: UploadedFile,
        classification: FileClassification,
        strategy: DisplayStrategy,
    },
    Ready {
        file: UploadedFile,
        classification: FileClassification,
        strategy: DisplayStrategy,
    },
    Failed {
        file: Option<UploadedFile>,
        error: Arc<ViewerError>,
    },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Validating { .. } => "validating",
            SessionState::Classifying { .. } => "classifying",
            SessionState::Rendering { .. } => "rendering",
            SessionState::Ready { .. } => "ready",
            SessionState::Failed { .. } => "failed",
        }
    }

    pub fn file(&self) -> Option<&UploadedFile> {
        match self {
            SessionState::Idle => None,
            SessionState::Validating { file }
            | SessionState::Classifying { file }
            | SessionState::Rendering { file, .. }
            | SessionState::Ready { file, .. } => Some(file),
            SessionState::Failed { file, .. } => file.as_ref(),
        }
    }

    pub fn classification(&self) -> Option<FileClassification> {
        match self {
            SessionState::Rendering { classification, .. }
            | SessionState::Ready { classification, .. } => Some(*classification),
            _ => None,
        }
    }

    pub fn strategy(&self) -> Option<DisplayStrategy> {
        match self {
            SessionState::Rendering { strategy, .. } | SessionState::Ready { strategy, .. } => {
                Some(*strategy)
            }
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ViewerError> {
        match self {
            SessionState::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Pointer and wheel input over the viewport, before tool resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ToolInput {
    Press(Binding),
    /// Positive lines scroll up.
    Scroll { lines: f32 },
    /// Vertical movement while `binding` is held.
    Drag { binding: Binding, delta_y: f32 },
}

struct ActiveView {
    viewport_id: ViewportId,
    locator: ImageLocator,
}

pub struct ViewerSession {
    engine: RenderingEngine,
    tool_group: ToolGroup,
    native: NativeMedia,
    state: SessionState,
    generation: u64,
    selection: u64,
    active: Option<ActiveView>,
    video_mode: DicomVideoMode,
    playback: PlaybackConfig,
}

impl ViewerSession {
    pub fn new(config: &Config) -> Self {
        let serial = NEXT_SESSION.fetch_add(1, Ordering::Relaxed);
        let engine =
            RenderingEngine::create_engine(format!("engine-{serial}"), ImageLoader::new());
        let tool_group = build_tool_group(format!("tools-{serial}"), &config.tools);

        Self {
            engine,
            tool_group,
            native: NativeMedia::default(),
            state: SessionState::Idle,
            generation: 0,
            selection: 0,
            active: None,
            video_mode: DicomVideoMode::default(),
            playback: config.playback.clone(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn native(&self) -> &NativeMedia {
        &self.native
    }

    pub fn tool_group(&self) -> &ToolGroup {
        &self.tool_group
    }

    pub fn video_mode(&self) -> DicomVideoMode {
        self.video_mode
    }

    /// Probe handle for classification tasks.
    pub fn loader(&self) -> ImageLoader {
        self.engine.loader().clone()
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        ticket.generation == self.generation
            && self.state.file().is_some_and(|file| file.id() == ticket.file_id)
    }

    /// Starts a new selection. Files still opening for older ones will be
    /// dropped when they arrive.
    pub fn select(&mut self) -> Selection {
        self.selection += 1;
        Selection(self.selection)
    }

    pub fn is_latest(&self, selection: Selection) -> bool {
        selection.0 == self.selection
    }

    /// [`begin`](Self::begin) for a file opened for `selection`, or `None`
    /// when a newer selection (or a clear) came in while it was read.
    pub fn begin_selected(
        &mut self,
        selection: Selection,
        file: UploadedFile,
    ) -> Option<Result<ClassifyTicket, Arc<ViewerError>>> {
        if !self.is_latest(selection) {
            log::debug!("Dropping {} from an earlier selection", file.name());
            return None;
        }
        Some(self.begin(file))
    }

    /// Makes `file` the active file. The previous one is released first.
    pub fn begin(&mut self, file: UploadedFile) -> Result<ClassifyTicket, Arc<ViewerError>> {
        self.teardown();
        self.generation += 1;
        self.video_mode = DicomVideoMode::default();

        log::info!(
            "Selected {} ({} bytes, type {:?})",
            file.name(),
            file.size(),
            file.mime_type()
        );
        self.state = SessionState::Validating { file: file.clone() };

        let validation = validate(&file);
        if !validation.is_valid {
            let error = Arc::new(ViewerError::Validation(validation.errors));
            log::warn!("{}: {error}", file.name());
            self.state = SessionState::Failed {
                file: Some(file),
                error: Arc::clone(&error),
            };
            return Err(error);
        }

        let ticket = Ticket {
            generation: self.generation,
            file_id: file.id(),
        };
        self.state = SessionState::Classifying { file: file.clone() };
        Ok(ClassifyTicket { ticket, file })
    }

    /// Moves a classified file into rendering. Returns the loading work, or
    /// nothing when the result is stale or the file cannot be shown.
    pub fn apply_classification(
        &mut self,
        ticket: Ticket,
        classification: FileClassification,
    ) -> Option<RenderJob> {
        if !self.is_current(ticket) {
            log::debug!(
                "Dropping stale classification {classification} for {}",
                ticket.file_id
            );
            return None;
        }
        let SessionState::Classifying { file } = &self.state else {
            log::debug!("Ignoring classification while {}", self.state.name());
            return None;
        };
        let file = file.clone();
        log::info!("{}: classified as {classification}", file.name());

        let Some(strategy) = DisplayStrategy::for_classification(classification) else {
            self.state = SessionState::Failed {
                error: Arc::new(ViewerError::UnsupportedFileType(file.name().to_string())),
                file: Some(file),
            };
            return None;
        };

        let job = self.start_render(ticket, &file, strategy);
        self.state = SessionState::Rendering {
            file,
            classification,
            strategy,
        };
        Some(job)
    }

    pub fn finish_render(
        &mut self,
        ticket: Ticket,
        result: Result<RenderOutput, Arc<ViewerError>>,
    ) {
        if !self.is_current(ticket) {
            log::debug!("Dropping stale render result for {}", ticket.file_id);
            return;
        }
        let SessionState::Rendering {
            file,
            classification,
            strategy,
        } = &self.state
        else {
            log::debug!("Ignoring render result while {}", self.state.name());
            return;
        };
        let (file, classification, strategy) = (file.clone(), *classification, *strategy);

        let shown = result.and_then(|output| match output {
            RenderOutput::Engine => Ok(()),
            RenderOutput::Image(frame) => {
                self.native.show_image(frame);
                Ok(())
            }
            RenderOutput::Video(info) => {
                let player = VideoPlayer::start(info, self.playback.loop_playback)?;
                self.native.show_video(player);
                Ok(())
            }
        });

        match shown {
            Ok(()) => {
                log::info!("{}: ready ({strategy:?})", file.name());
                self.state = SessionState::Ready {
                    file,
                    classification,
                    strategy,
                };
                if self.playback.autoplay {
                    self.play();
                }
            }
            Err(error) => {
                log::error!("{}: {error}", file.name());
                self.release_active_view();
                self.state = SessionState::Failed {
                    file: Some(file),
                    error,
                };
            }
        }
    }

    /// Teardown that also drops files still being opened.
    pub fn clear(&mut self) {
        self.selection += 1;
        self.teardown();
    }

    /// Releases everything held for the current file and returns to idle.
    /// In-flight work for it becomes stale.
    pub fn teardown(&mut self) {
        self.generation += 1;
        self.native.release();
        self.release_active_view();
        self.engine.volumes().purge();
        self.engine.loader().purge();
        if !matches!(self.state, SessionState::Idle) {
            log::debug!("Tearing down viewer from {}", self.state.name());
        }
        self.state = SessionState::Idle;
    }

    /// Switches a DICOM cine object between playback and frame browsing.
    pub fn set_dicom_video_mode(&mut self, mode: DicomVideoMode) -> Option<RenderJob> {
        if mode == self.video_mode {
            return None;
        }
        let SessionState::Ready {
            file,
            classification,
            strategy: DisplayStrategy::EngineVideo,
        } = &self.state
        else {
            return None;
        };
        let (file, classification) = (file.clone(), *classification);
        let locator = self.active.as_ref()?.locator.clone();

        self.video_mode = mode;
        self.generation += 1;
        let ticket = Ticket {
            generation: self.generation,
            file_id: file.id(),
        };
        self.release_active_view();
        let load = self.show_in_engine(self.video_viewport_type(), locator);
        self.state = SessionState::Rendering {
            file,
            classification,
            strategy: DisplayStrategy::EngineVideo,
        };
        Some(RenderJob::engine(ticket, load))
    }

    pub fn render(&self) -> Option<RenderedFrame> {
        self.viewport()?.render()
    }

    /// Header attributes of the active DICOM object.
    pub fn header_rows(&self) -> Vec<HeaderRow> {
        self.active
            .as_ref()
            .and_then(|active| self.engine.loader().header(&active.locator))
            .map(|header| header_rows(&header))
            .unwrap_or_default()
    }

    pub fn reset_camera(&self) {
        if let Some(viewport) = self.viewport() {
            viewport.reset_camera();
        }
    }

    fn viewport(&self) -> Option<&Viewport> {
        self.engine.get_viewport(&self.active.as_ref()?.viewport_id)
    }

    fn video(&self) -> Option<&dyn VideoCapable> {
        self.viewport()?.as_video()
    }

    /// True for a DICOM cine viewport and for a regular video.
    pub fn has_video(&self) -> bool {
        self.video().is_some() || self.native.video().is_some()
    }

    pub fn is_playing(&self) -> bool {
        match self.video() {
            Some(video) => video.is_playing(),
            None => self.native.video().is_some_and(VideoPlayer::is_playing),
        }
    }

    pub fn frame_interval(&self) -> Option<Duration> {
        if let Some(video) = self.video() {
            return Some(video.frame_interval());
        }
        let declared = self.native.video()?.info().frame_interval;
        Some(
            declared
                .filter(|interval| *interval >= MIN_FRAME_INTERVAL)
                .unwrap_or_else(|| self.playback.default_frame_interval()),
        )
    }

    /// Whether the host should keep calling [`tick`](Self::tick). A regular
    /// video is polled while paused too, so that seeks show their frame.
    pub fn wants_ticks(&self) -> bool {
        self.is_playing() || self.native.video().is_some()
    }

    pub fn play(&mut self) {
        if let Some(video) = self.video() {
            video.play();
            return;
        }
        if let Some(player) = self.native.video_mut() {
            player.play();
        }
    }

    pub fn pause(&mut self) {
        if let Some(video) = self.video() {
            video.pause();
            return;
        }
        if let Some(player) = self.native.video_mut() {
            player.pause();
        }
    }

    pub fn toggle_playback(&mut self) {
        if self.is_playing() {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Seeks to `fraction` of the clip, clamped to `0.0..=1.0`.
    pub fn seek(&mut self, fraction: f64) {
        let fraction = fraction.clamp(0.0, 1.0);
        if let Some(video) = self.video() {
            video.set_time(fraction * video.duration());
            return;
        }
        if let Some(player) = self.native.video_mut() {
            let target = fraction * player.duration_secs();
            player.seek(target);
        }
    }

    /// Current position as a fraction of the clip.
    pub fn position(&self) -> Option<f64> {
        let (current, duration) = match self.video() {
            Some(video) => (video.current_time(), video.duration()),
            None => {
                let player = self.native.video()?;
                (player.position_secs(), player.duration_secs())
            }
        };
        (duration > 0.0).then(|| (current / duration).min(1.0))
    }

    /// Advances cine playback by one frame, or takes the frames a regular
    /// video decoded since the last tick. Decoder failures are returned and
    /// leave the session `Ready`.
    pub fn tick(&mut self) -> Result<(), ViewerError> {
        if let Some(video) = self.video() {
            video.advance();
            return Ok(());
        }
        match self.native.video_mut() {
            Some(player) => player.poll().inspect_err(|error| log::warn!("{error}")),
            None => Ok(()),
        }
    }

    /// Resolves input through the tool group and applies it to the active
    /// viewport.
    pub fn handle_input(&mut self, input: ToolInput) {
        if !matches!(self.state, SessionState::Ready { .. }) {
            return;
        }
        let Some(viewport) = self.viewport().cloned() else {
            return;
        };
        if !self.tool_group.viewports().contains(viewport.id()) {
            return;
        }

        match input {
            ToolInput::Scroll { lines } => {
                if lines == 0.0
                    || self.tool_group.tool_for(Binding::Wheel) != Some(ToolName::StackScroll)
                {
                    return;
                }
                let options = self.tool_group.tool_options(ToolName::StackScroll);
                let mut delta = if lines > 0.0 { -1 } else { 1 };
                if options.invert.unwrap_or(false) {
                    delta = -delta;
                }
                let loop_around = options.loop_around.unwrap_or(false);
                if let Some(stack) = viewport.as_stack() {
                    stack.scroll(delta, loop_around);
                } else if let Some(volume) = viewport.as_volume() {
                    volume.scroll(delta, loop_around);
                } else if let Some(video) = viewport.as_video() {
                    video.step(delta);
                }
            }
            ToolInput::Drag { binding, delta_y } => {
                if self.tool_group.tool_for(binding) == Some(ToolName::Zoom) {
                    let sensitivity = self
                        .tool_group
                        .tool_options(ToolName::Zoom)
                        .sensitivity
                        .unwrap_or(crate::config::DEFAULT_ZOOM_SENSITIVITY);
                    viewport.zoom_by((1.0 - delta_y * sensitivity).max(0.01));
                }
            }
            ToolInput::Press(binding) => {
                if self.tool_group.tool_for(binding) == Some(ToolName::PlayClip) {
                    self.toggle_playback();
                }
            }
        }
    }

    fn video_viewport_type(&self) -> ViewportType {
        match self.video_mode {
            DicomVideoMode::Playback => ViewportType::Video,
            DicomVideoMode::Frames => ViewportType::Volume,
        }
    }

    fn start_render(
        &mut self,
        ticket: Ticket,
        file: &UploadedFile,
        strategy: DisplayStrategy,
    ) -> RenderJob {
        let path = file.path().to_path_buf();
        match strategy {
            DisplayStrategy::NativeImage => RenderJob {
                ticket,
                future: Box::pin(async move {
                    Ok(RenderOutput::Image(native::decode_image(path).await?))
                }),
            },
            DisplayStrategy::NativeVideo => RenderJob {
                ticket,
                future: Box::pin(async move {
                    Ok(RenderOutput::Video(native::open_video(path).await?))
                }),
            },
            DisplayStrategy::EngineStack => {
                let locator = self.engine.loader().register_file(file);
                RenderJob::engine(ticket, self.show_in_engine(ViewportType::Stack, locator))
            }
            DisplayStrategy::EngineVideo => {
                let locator = self.engine.loader().register_file(file);
                let kind = self.video_viewport_type();
                RenderJob::engine(ticket, self.show_in_engine(kind, locator))
            }
        }
    }

    /// Enables a viewport of `kind`, joins it to the tool group and starts
    /// loading `locator` into it. PlayClip is only bound while a video
    /// viewport is shown.
    fn show_in_engine(&mut self, kind: ViewportType, locator: ImageLocator) -> LoadFuture {
        let viewport_id = match kind {
            ViewportType::Stack => STACK_VIEWPORT,
            ViewportType::Video => VIDEO_VIEWPORT,
            ViewportType::Volume => VOLUME_VIEWPORT,
        };
        let viewport = self.engine.enable_element(ViewportInput {
            viewport_id: ViewportId::new(viewport_id),
            kind,
            element: VIEWPORT_ELEMENT,
            options: ViewportOptions {
                default_frame_interval: self.playback.default_frame_interval(),
                loop_playback: self.playback.loop_playback,
            },
        });
        self.tool_group.add_viewport(viewport.id().clone());
        if kind == ViewportType::Video {
            self.tool_group.set_tool_active(ToolName::PlayClip, &[Binding::Primary]);
        } else {
            self.tool_group.set_tool_passive(ToolName::PlayClip);
        }

        let load = match kind {
            ViewportType::Stack => viewport
                .as_stack()
                .map(|stack| stack.set_stack(vec![locator.clone()])),
            ViewportType::Video => viewport
                .as_video()
                .map(|video| video.set_video(locator.clone())),
            ViewportType::Volume => {
                let volume_id = VolumeId::for_locator(&locator);
                self.engine
                    .volumes()
                    .create_and_cache_volume(volume_id.clone(), vec![locator.clone()]);
                viewport
                    .as_volume()
                    .map(|volume| volume.set_volumes(&[VolumeInput { volume_id }]))
            }
        };
        let load = load.unwrap_or_else(|| {
            let id = viewport.id().to_string();
            Box::pin(async move { Err(EngineError::UnknownViewport(id)) })
        });

        self.active = Some(ActiveView {
            viewport_id: viewport.id().clone(),
            locator,
        });
        load
    }

    fn release_active_view(&mut self) {
        if let Some(active) = self.active.take() {
            self.engine.disable_element(&active.viewport_id);
            self.tool_group.remove_viewport(&active.viewport_id);
            self.engine
                .volumes()
                .remove(&VolumeId::for_locator(&active.locator));
        }
    }
}

impl Drop for ViewerSession {
    fn drop(&mut self) {
        self.teardown();
        self.tool_group.remove_viewports();
        self.engine.destroy();
    }
}

fn build_tool_group(id: String, tools: &ToolsConfig) -> ToolGroup {
    let mut group = ToolGroup::new(id);
    group.add_tool(ToolName::StackScroll);
    group.add_tool(ToolName::Zoom);
    group.add_tool(ToolName::PlayClip);

    group.set_tool_active(ToolName::StackScroll, &[Binding::Wheel]);
    group.set_tool_active(ToolName::Zoom, &[Binding::Secondary]);
    group.set_tool_active(ToolName::PlayClip, &[Binding::Primary]);

    group.set_tool_configuration(
        ToolName::StackScroll,
        ToolOptions {
            invert: Some(tools.invert_scroll),
            loop_around: Some(tools.loop_stack_scroll),
            ..Default::default()
        },
    );
    group.set_tool_configuration(
        ToolName::Zoom,
        ToolOptions {
            sensitivity: Some(tools.zoom_sensitivity),
            ..Default::default()
        },
    );
    group
}
