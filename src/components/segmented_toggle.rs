use crate::message::Message;
use iced::border::{Border, Radius};
use iced::widget::text::Wrapping;
use iced::widget::{button, container, row, text, Button, Container};
use iced::{Alignment, Background, Color, Length, Shadow, Theme};

const PILL: f32 = 999.0;
const INNER: f32 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

/// Two mutually exclusive options rendered as one pill. The option equal to
/// `current` is highlighted; pressing the other emits its message.
pub fn segmented_toggle<T>(
    left: (&'static str, T),
    right: (&'static str, T),
    current: T,
    on_select: fn(T) -> Message,
) -> Container<'static, Message>
where
    T: Copy + PartialEq + 'static,
{
    let toggle_row = row![
        segment(left.0, left.1 == current, on_select(left.1), Side::Left),
        segment(right.0, right.1 == current, on_select(right.1), Side::Right),
    ]
    .spacing(0);

    container(toggle_row)
        .padding(3)
        .width(Length::Fixed(220.0))
        .style(track_style)
}

fn segment(
    label: &'static str,
    is_active: bool,
    message: Message,
    side: Side,
) -> Button<'static, Message> {
    let content = container(text(label).size(13).wrapping(Wrapping::None))
        .width(Length::Fill)
        .height(Length::Fixed(28.0))
        .align_x(Alignment::Center)
        .align_y(Alignment::Center)
        .padding([4, 12]);

    let segment = button(content)
        .padding(0)
        .width(Length::FillPortion(1))
        .style(move |theme, status| segment_style(theme, status, is_active, side));

    if is_active {
        segment
    } else {
        segment.on_press(message)
    }
}

fn track_style(theme: &Theme) -> container::Style {
    let palette = theme.extended_palette();

    container::Style {
        background: Some(Background::Color(palette.background.strong.color)),
        border: Border {
            color: palette.background.strong.color.scale_alpha(0.6),
            width: 1.0,
            radius: Radius::new(PILL),
        },
        ..Default::default()
    }
}

fn segment_style(
    theme: &Theme,
    status: button::Status,
    is_active: bool,
    side: Side,
) -> button::Style {
    let palette = theme.extended_palette();

    let background = match (is_active, status) {
        (true, _) => palette.primary.strong.color,
        (false, button::Status::Hovered) => palette.background.base.color.scale_alpha(0.8),
        (false, button::Status::Pressed) => palette.background.base.color.scale_alpha(0.9),
        (false, _) => palette.background.strong.color.scale_alpha(0.4),
    };

    let text_color = if is_active {
        palette.primary.strong.text
    } else {
        palette.background.base.text
    };

    let radius = match side {
        Side::Left => Radius {
            top_left: PILL,
            top_right: INNER,
            bottom_right: INNER,
            bottom_left: PILL,
        },
        Side::Right => Radius {
            top_left: INNER,
            top_right: PILL,
            bottom_right: PILL,
            bottom_left: INNER,
        },
    };

    button::Style {
        background: Some(Background::Color(background)),
        text_color,
        border: Border {
            color: Color::TRANSPARENT,
            width: 0.0,
            radius,
        },
        shadow: Shadow::default(),
    }
}
