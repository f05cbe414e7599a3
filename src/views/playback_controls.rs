use crate::components::segmented_toggle;
use crate::message::Message;
use crate::model::DisplayStrategy;
use crate::session::{DicomVideoMode, SessionState, ViewerSession};
use iced::widget::{button, horizontal_space, row, slider, text, Row};
use iced::{Alignment, Element, Length};

const SEEK_STEPS: f64 = 1000.0;

/// Controls under the viewport. Empty until an engine viewport or a
/// regular video is ready.
pub fn playback_controls(session: &ViewerSession, fullscreen: bool) -> Element<'static, Message> {
    let SessionState::Ready { strategy, .. } = session.state() else {
        return Row::new().into();
    };
    let engine = matches!(
        strategy,
        DisplayStrategy::EngineStack | DisplayStrategy::EngineVideo
    );
    if !engine && *strategy != DisplayStrategy::NativeVideo {
        return Row::new().into();
    }

    let mut controls = Row::new().spacing(12).align_y(Alignment::Center);

    if session.has_video() {
        let label = if session.is_playing() { "Pause" } else { "Play" };
        let position = session.position().unwrap_or(0.0);
        controls = controls
            .push(button(label).on_press(Message::TogglePlayback))
            .push(
                slider(0.0..=SEEK_STEPS, position * SEEK_STEPS, |value| {
                    Message::Seek(value / SEEK_STEPS)
                })
                .width(Length::Fill),
            );
    } else {
        controls = controls.push(text("Scroll to change frame, right-drag to zoom").size(13));
        controls = controls.push(horizontal_space());
    }

    if *strategy == DisplayStrategy::EngineVideo {
        controls = controls.push(segmented_toggle(
            ("Play", DicomVideoMode::Playback),
            ("Frames", DicomVideoMode::Frames),
            session.video_mode(),
            Message::SetDicomVideoMode,
        ));
    }

    let fullscreen_label = if fullscreen { "Exit Fullscreen" } else { "Fullscreen" };
    let mut bar = row![controls.width(Length::Fill)]
        .spacing(12)
        .align_y(Alignment::Center);
    if engine {
        bar = bar.push(button("Reset View").on_press(Message::ResetCamera));
    }
    bar.push(button(fullscreen_label).on_press(Message::ToggleFullscreen))
        .into()
}
