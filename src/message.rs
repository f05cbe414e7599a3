use crate::config::ThemeMode;
use crate::engine::Binding;
use crate::error::ViewerError;
use crate::model::{FileClassification, UploadedFile};
use crate::session::{DicomVideoMode, RenderOutput, Selection, Ticket};
use iced::mouse::ScrollDelta;
use iced::Point;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum Message {
    PickFile,
    FilePicked(Option<PathBuf>),
    FileDropped(PathBuf),
    FileOpened(Selection, Result<UploadedFile, Arc<ViewerError>>),
    Classified(Ticket, FileClassification),
    Rendered(Ticket, Result<RenderOutput, Arc<ViewerError>>),
    ClearFile,
    TogglePlayback,
    Seek(f64),
    Tick,
    ToggleFullscreen,
    ResetCamera,
    SetDicomVideoMode(DicomVideoMode),
    SetTheme(ThemeMode),
    ViewportPressed(Binding),
    ViewportScrolled(ScrollDelta),
    DragStarted(Binding),
    DragEnded,
    CursorMoved(Point),
}
