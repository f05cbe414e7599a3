use crate::components::segmented_toggle;
use crate::config::ThemeMode;
use crate::message::Message;
use iced::widget::{button, horizontal_space, row, text};
use iced::{Alignment, Element};

/// Upload surface: picker, clear, theme. Files can also be dropped anywhere
/// on the window.
pub fn toolbar(has_file: bool, theme: ThemeMode) -> Element<'static, Message> {
    let open = button("Open File").on_press(Message::PickFile);
    let clear = button("Clear").on_press_maybe(has_file.then_some(Message::ClearFile));

    row![
        open,
        clear,
        text("or drop a DICOM, image or video file onto the window").size(14),
        horizontal_space(),
        segmented_toggle(
            ("Dark", ThemeMode::Dark),
            ("Light", ThemeMode::Light),
            theme,
            Message::SetTheme,
        ),
    ]
    .spacing(12)
    .align_y(Alignment::Center)
    .into()
}
