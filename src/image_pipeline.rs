use crate::error::EngineError;
use dicom::object::DefaultDicomObject;
use dicom::pixeldata::{DecodedPixelData, PhotometricInterpretation, PixelDecoder};
use iced::widget::image::Handle;

/// One decoded frame, ready for an image widget.
#[derive(Debug, Clone)]
pub struct Frame {
    pub handle: Handle,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    pub fn from_rgba(width: u32, height: u32, rgba: Vec<u8>) -> Self {
        Self {
            handle: Handle::from_rgba(width, height, rgba),
            width,
            height,
        }
    }
}

pub struct FrameImagePipeline;

impl FrameImagePipeline {
    /// Decodes every frame of the object, in order.
    pub fn render_all_frames(object: &DefaultDicomObject) -> Result<Vec<Frame>, EngineError> {
        let decoded = object
            .decode_pixel_data()
            .map_err(|err| EngineError::Decode(err.to_string()))?;

        let count = decoded.number_of_frames();
        if count == 0 {
            return Err(EngineError::NoFrames);
        }

        (0..count)
            .map(|frame_idx| Self::render_frame(&decoded, frame_idx))
            .collect()
    }

    pub fn render_frame(
        decoded: &DecodedPixelData<'_>,
        frame_idx: u32,
    ) -> Result<Frame, EngineError> {
        if frame_idx >= decoded.number_of_frames() {
            return Err(EngineError::Decode(format!(
                "requested frame {frame_idx}, but only {} frame(s) are available",
                decoded.number_of_frames()
            )));
        }

        if decoded.photometric_interpretation().is_monochrome() {
            Self::render_monochrome(decoded, frame_idx)
        } else {
            Self::render_color(decoded, frame_idx)
        }
    }

    /// Monochrome frames are stretched over their own value range so that
    /// 12 and 16 bit data without a VOI window is still visible.
    fn render_monochrome(
        decoded: &DecodedPixelData<'_>,
        frame_idx: u32,
    ) -> Result<Frame, EngineError> {
        let invert = matches!(
            decoded.photometric_interpretation(),
            PhotometricInterpretation::Monochrome1
        );

        let gray: Vec<u8> = if decoded.bits_allocated() <= 8 {
            decoded
                .to_vec_frame::<u8>(frame_idx)
                .map_err(|err| EngineError::Decode(err.to_string()))?
        } else {
            let samples = decoded
                .to_vec_frame::<u16>(frame_idx)
                .map_err(|err| EngineError::Decode(err.to_string()))?;
            let (min, max) = min_max(&samples).unwrap_or((0, 0));
            samples
                .iter()
                .map(|&value| normalize(value, min, max))
                .collect()
        };

        let rgba = gray
            .into_iter()
            .flat_map(|value| {
                let value = if invert { u8::MAX - value } else { value };
                [value, value, value, u8::MAX]
            })
            .collect();

        Ok(Frame::from_rgba(decoded.columns(), decoded.rows(), rgba))
    }

    fn render_color(decoded: &DecodedPixelData<'_>, frame_idx: u32) -> Result<Frame, EngineError> {
        let rgba = decoded
            .to_dynamic_image(frame_idx)
            .map_err(|err| {
                EngineError::Decode(format!(
                    "unsupported photometric interpretation `{}`: {err}",
                    decoded.photometric_interpretation().as_str()
                ))
            })?
            .into_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(Frame::from_rgba(width, height, rgba.into_raw()))
    }
}

fn min_max(values: &[u16]) -> Option<(u16, u16)> {
    let min = values.iter().copied().min()?;
    let max = values.iter().copied().max()?;
    Some((min, max))
}

fn normalize(value: u16, min: u16, max: u16) -> u8 {
    if max <= min {
        return 0;
    }
    let scaled = f32::from(value.saturating_sub(min)) / f32::from(max - min);
    (scaled * 255.0).round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::metadata::fixtures::Fixture;
    use dicom::object::open_file;
    use tempfile::tempdir;

    #[test]
    fn normalize_spans_full_range() {
        assert_eq!(normalize(100, 100, 200), 0);
        assert_eq!(normalize(200, 100, 200), 255);
        assert_eq!(normalize(150, 100, 200), 128);
        assert_eq!(normalize(7, 7, 7), 0);
    }

    #[test]
    fn decodes_every_frame_of_a_multiframe_object() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("cine.dcm");
        Fixture {
            sop_class_uid: "1.2.840.10008.5.1.4.1.1.3.1",
            number_of_frames: Some("3"),
            pixels: Some((2, 2, (0u8..12).collect())),
            ..Default::default()
        }
        .write(&path);

        let object = open_file(&path).expect("open fixture");
        let frames = FrameImagePipeline::render_all_frames(&object).expect("frames");
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|frame| frame.width == 2 && frame.height == 2));
    }

    #[test]
    fn objects_without_pixel_data_fail_to_decode() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("header-only.dcm");
        Fixture {
            sop_class_uid: "1.2.840.10008.5.1.4.1.1.2",
            ..Default::default()
        }
        .write(&path);

        let object = open_file(&path).expect("open fixture");
        assert!(FrameImagePipeline::render_all_frames(&object).is_err());
    }
}
