use crate::config::{self, Config, ThemeMode};
use crate::engine::Binding;
use crate::message::Message;
use crate::model::classification::PICKER_EXTENSIONS;
use crate::model::UploadedFile;
use crate::session::{RenderJob, ToolInput, ViewerSession};
use crate::views::{metadata_panel, playback_controls, toolbar, viewport_panel};
use iced::mouse::ScrollDelta;
use iced::widget::text::Wrapping;
use iced::widget::{column, container, row, text};
use iced::{
    application, event, time, window, Element, Event, Length, Point, Subscription, Task, Theme,
};
use rfd::AsyncFileDialog;
use std::path::PathBuf;
use std::sync::Arc;

const APP_TITLE: &str = "Medview";
const PIXELS_PER_LINE: f32 = 40.0;

/// Start-up options from the command line.
#[derive(Debug, Default)]
pub struct Flags {
    pub file_path: Option<PathBuf>,
    pub config_dir: Option<PathBuf>,
}

pub fn run(flags: Flags) -> iced::Result {
    let _ = env_logger::Builder::from_default_env()
        .format_timestamp_secs()
        .try_init();

    application(APP_TITLE, App::update, App::view)
        .theme(App::theme)
        .subscription(App::subscription)
        .run_with(move || App::new(flags))
}

#[derive(Debug, Clone, Copy)]
struct Drag {
    binding: Binding,
    last_y: Option<f32>,
}

pub struct App {
    session: ViewerSession,
    config: Config,
    config_dir: Option<PathBuf>,
    fullscreen: bool,
    drag: Option<Drag>,
    last_error: Option<String>,
}

impl App {
    fn new(flags: Flags) -> (Self, Task<Message>) {
        let (config, warning) = config::load(flags.config_dir.as_deref());
        if let Some(warning) = &warning {
            log::warn!("{warning}");
        }

        let mut app = Self {
            session: ViewerSession::new(&config),
            config,
            config_dir: flags.config_dir,
            fullscreen: false,
            drag: None,
            last_error: warning,
        };

        let task = match flags.file_path {
            Some(path) => app.open_file(path),
            None => Task::none(),
        };
        (app, task)
    }

    pub fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::PickFile => Task::perform(
                async {
                    AsyncFileDialog::new()
                        .add_filter("Medical images and media", PICKER_EXTENSIONS)
                        .pick_file()
                        .await
                        .map(|handle| handle.path().to_path_buf())
                },
                Message::FilePicked,
            ),
            Message::FilePicked(Some(path)) | Message::FileDropped(path) => self.open_file(path),
            Message::FilePicked(None) => Task::none(),
            Message::FileOpened(selection, Ok(file)) => {
                let Some(started) = self.session.begin_selected(selection, file) else {
                    return Task::none();
                };
                self.last_error = None;
                self.drag = None;
                match started {
                    Ok(ticket) => Task::perform(
                        ticket.classify(self.session.loader()),
                        |(ticket, classification)| Message::Classified(ticket, classification),
                    ),
                    Err(_) => Task::none(),
                }
            }
            Message::FileOpened(selection, Err(error)) => {
                if self.session.is_latest(selection) {
                    self.last_error = Some(error.to_string());
                }
                Task::none()
            }
            Message::Classified(ticket, classification) => self
                .session
                .apply_classification(ticket, classification)
                .map_or_else(Task::none, run_job),
            Message::Rendered(ticket, result) => {
                self.session.finish_render(ticket, result);
                Task::none()
            }
            Message::ClearFile => {
                self.session.clear();
                self.drag = None;
                self.last_error = None;
                Task::none()
            }
            Message::TogglePlayback => {
                self.session.toggle_playback();
                Task::none()
            }
            Message::Seek(fraction) => {
                self.session.seek(fraction);
                Task::none()
            }
            Message::Tick => {
                if let Err(error) = self.session.tick() {
                    self.last_error = Some(error.to_string());
                }
                Task::none()
            }
            Message::ToggleFullscreen => {
                self.fullscreen = !self.fullscreen;
                let mode = if self.fullscreen {
                    window::Mode::Fullscreen
                } else {
                    window::Mode::Windowed
                };
                window::get_latest().and_then(move |id| window::change_mode(id, mode))
            }
            Message::ResetCamera => {
                self.session.reset_camera();
                Task::none()
            }
            Message::SetDicomVideoMode(mode) => self
                .session
                .set_dicom_video_mode(mode)
                .map_or_else(Task::none, run_job),
            Message::SetTheme(theme) => {
                if self.config.display.theme != theme {
                    self.config.display.theme = theme;
                    self.save_config();
                }
                Task::none()
            }
            Message::ViewportPressed(binding) => {
                self.session.handle_input(ToolInput::Press(binding));
                Task::none()
            }
            Message::ViewportScrolled(delta) => {
                let lines = match delta {
                    ScrollDelta::Lines { y, .. } => y,
                    ScrollDelta::Pixels { y, .. } => y / PIXELS_PER_LINE,
                };
                self.session.handle_input(ToolInput::Scroll { lines });
                Task::none()
            }
            Message::DragStarted(binding) => {
                self.drag = Some(Drag {
                    binding,
                    last_y: None,
                });
                Task::none()
            }
            Message::DragEnded => {
                self.drag = None;
                Task::none()
            }
            Message::CursorMoved(position) => {
                self.drag_to(position);
                Task::none()
            }
        }
    }

    pub fn view(&self) -> Element<'_, Message> {
        let state = self.session.state();

        let viewer = column![
            container(viewport_panel(&self.session))
                .width(Length::Fill)
                .height(Length::Fill),
            playback_controls(&self.session, self.fullscreen),
        ]
        .spacing(12)
        .width(Length::FillPortion(3));

        if self.fullscreen {
            return container(viewer).padding(8).into();
        }

        let metadata = container(metadata_panel(
            state.file(),
            state.classification(),
            self.session.native().video().map(|player| player.info()),
            self.session.header_rows(),
        ))
        .padding(16)
        .width(Length::FillPortion(2))
        .height(Length::Fill);

        let mut content =
            column![toolbar(state.file().is_some(), self.config.display.theme)].spacing(16);

        if let Some(error) = &self.last_error {
            content = content.push(text(error).size(14).wrapping(Wrapping::Word));
        }

        content
            .push(row![viewer, metadata].spacing(16).height(Length::Fill))
            .padding(20)
            .into()
    }

    pub fn theme(&self) -> Theme {
        match self.config.display.theme {
            ThemeMode::Dark => Theme::Dark,
            ThemeMode::Light => Theme::Light,
        }
    }

    pub fn subscription(&self) -> Subscription<Message> {
        let drops = event::listen_with(|event, _status, _window| match event {
            Event::Window(window::Event::FileDropped(path)) => Some(Message::FileDropped(path)),
            _ => None,
        });

        let ticks = match self.session.frame_interval() {
            Some(interval) if self.session.wants_ticks() && !interval.is_zero() => {
                time::every(interval).map(|_| Message::Tick)
            }
            _ => Subscription::none(),
        };

        Subscription::batch([drops, ticks])
    }

    fn drag_to(&mut self, position: Point) {
        let Some(drag) = &mut self.drag else {
            return;
        };
        if let Some(last_y) = drag.last_y {
            self.session.handle_input(ToolInput::Drag {
                binding: drag.binding,
                delta_y: position.y - last_y,
            });
        }
        drag.last_y = Some(position.y);
    }

    /// Reads `path` in the background, stamped with a fresh selection.
    fn open_file(&mut self, path: PathBuf) -> Task<Message> {
        let selection = self.session.select();
        Task::perform(UploadedFile::open(path), move |result| {
            Message::FileOpened(selection, result.map_err(Arc::new))
        })
    }

    fn save_config(&mut self) {
        let Some(path) = config::config_path(self.config_dir.as_deref()) else {
            log::warn!("No configuration directory; settings not saved");
            return;
        };
        if let Err(err) = config::save_to_path(&self.config, &path) {
            log::warn!("{}: {err}", path.display());
            self.last_error = Some(format!("Could not save settings: {err}"));
        }
    }
}

fn run_job(job: RenderJob) -> Task<Message> {
    Task::perform(job.run(), |(ticket, result)| Message::Rendered(ticket, result))
}
