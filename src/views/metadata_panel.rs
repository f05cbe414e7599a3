use crate::engine::metadata::HeaderRow;
use crate::message::Message;
use crate::model::{FileClassification, UploadedFile};
use crate::native::VideoInfo;
use crate::utils::format_megabytes;
use iced::widget::text::Wrapping;
use iced::widget::{column, row, scrollable, text};
use iced::{Element, Length};

pub fn metadata_panel<'a>(
    file: Option<&'a UploadedFile>,
    classification: Option<FileClassification>,
    video: Option<&VideoInfo>,
    rows: Vec<HeaderRow>,
) -> Element<'a, Message> {
    let Some(file) = file else {
        return text("No file selected").into();
    };

    let kind = classification.map_or("pending", |classification| classification.as_str());
    let mut content = column![
        text(file.name()).size(16),
        text(format!("Size: {}", format_megabytes(file.size()))).size(13),
        text(format!(
            "Type: {}",
            if file.mime_type().is_empty() {
                "unknown"
            } else {
                file.mime_type()
            }
        ))
        .size(13),
        text(format!("Classification: {kind}")).size(13),
    ]
    .spacing(6);

    if let Some(video) = video {
        content = content
            .push(text(format!("Frame size: {} × {}", video.width, video.height)).size(13))
            .push(text(format!("Duration: {:.1} s", video.duration_secs)).size(13));
    }

    if !rows.is_empty() {
        let mut table = column![row![
            text("Tag").width(Length::FillPortion(2)),
            text("VR").width(Length::FillPortion(1)),
            text("Alias").width(Length::FillPortion(3)),
            text("Value").width(Length::FillPortion(4)),
        ]
        .spacing(12)];

        for header in rows {
            table = table.push(
                row![
                    text(header.tag).size(12).width(Length::FillPortion(2)),
                    text(header.vr).size(12).width(Length::FillPortion(1)),
                    text(header.alias).size(12).width(Length::FillPortion(3)),
                    text(header.value)
                        .size(12)
                        .width(Length::FillPortion(4))
                        .wrapping(Wrapping::Word),
                ]
                .spacing(12),
            );
        }

        content = content.push(scrollable(table.spacing(6)).height(Length::Fill));
    }

    content.into()
}
