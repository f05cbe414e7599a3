use crate::engine::{Binding, RenderedFrame};
use crate::image_pipeline::Frame;
use crate::message::Message;
use crate::model::DisplayStrategy;
use crate::session::{SessionState, ViewerSession};
use iced::widget::text::Wrapping;
use iced::widget::{column, container, mouse_area, responsive, stack, text, Image};
use iced::{Alignment, Element, Length};

pub fn viewport_panel(session: &ViewerSession) -> Element<'_, Message> {
    match session.state() {
        SessionState::Idle => placeholder("Open or drop a file to view it"),
        SessionState::Validating { file } => placeholder(format!("Checking {}…", file.name())),
        SessionState::Classifying { file } => placeholder(format!("Inspecting {}…", file.name())),
        SessionState::Rendering { file, .. } => placeholder(format!("Loading {}…", file.name())),
        SessionState::Failed { error, .. } => {
            let heading = if error.is_blocking() {
                "This file cannot be opened"
            } else {
                "This file could not be displayed"
            };
            container(
                column![
                    text(heading).size(18),
                    text(error.to_string()).size(14).wrapping(Wrapping::Word),
                ]
                .spacing(8)
                .align_x(Alignment::Center),
            )
            .center(Length::Fill)
            .padding(24)
            .into()
        }
        SessionState::Ready { file, strategy, .. } => match strategy {
            DisplayStrategy::NativeImage => match session.native().image() {
                Some(frame) => native_frame(frame),
                None => placeholder("Image no longer available"),
            },
            DisplayStrategy::NativeVideo => {
                match session.native().video().and_then(|player| player.frame()) {
                    Some(frame) => native_frame(frame),
                    None => placeholder(format!("Decoding {}…", file.name())),
                }
            }
            DisplayStrategy::EngineStack | DisplayStrategy::EngineVideo => match session.render() {
                Some(rendered) => engine_viewport(rendered),
                None => placeholder("Nothing to display"),
            },
        },
    }
}

fn native_frame(frame: &Frame) -> Element<'static, Message> {
    container(
        Image::new(frame.handle.clone())
            .width(Length::Fill)
            .height(Length::Fill),
    )
    .center(Length::Fill)
    .into()
}

/// The active engine frame, scaled to fit and then by the camera zoom.
/// Wheel, left click and right drag are forwarded to the tool group.
fn engine_viewport(rendered: RenderedFrame) -> Element<'static, Message> {
    let counter = format!("{} / {}", rendered.index + 1, rendered.count);

    let image = responsive(move |size| {
        let frame = &rendered.frame;
        let fit = (size.width / frame.width.max(1) as f32)
            .min(size.height / frame.height.max(1) as f32);
        let scale = fit * rendered.zoom;
        container(
            Image::new(frame.handle.clone())
                .width(Length::Fixed(frame.width as f32 * scale))
                .height(Length::Fixed(frame.height as f32 * scale)),
        )
        .center(Length::Fill)
        .clip(true)
        .into()
    });

    let surface = mouse_area(image)
        .on_press(Message::ViewportPressed(Binding::Primary))
        .on_right_press(Message::DragStarted(Binding::Secondary))
        .on_right_release(Message::DragEnded)
        .on_scroll(Message::ViewportScrolled)
        .on_move(Message::CursorMoved);

    stack![
        surface,
        container(text(counter).size(14))
            .padding(8)
            .width(Length::Fill)
            .align_x(Alignment::End),
    ]
    .into()
}

fn placeholder<'a>(message: impl text::IntoFragment<'a>) -> Element<'a, Message> {
    container(text(message).size(16)).center(Length::Fill).into()
}
