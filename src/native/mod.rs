//! Display paths for everyday media that bypass the rendering engine.

pub mod video;

pub use video::{open_video, VideoInfo, VideoPlayer};

use crate::error::ViewerError;
use crate::image_pipeline::Frame;
use std::path::PathBuf;

/// Resources held for a regular image or video.
#[derive(Debug, Default)]
pub struct NativeMedia {
    image: Option<Frame>,
    video: Option<VideoPlayer>,
}

impl NativeMedia {
    pub fn image(&self) -> Option<&Frame> {
        self.image.as_ref()
    }

    pub fn video(&self) -> Option<&VideoPlayer> {
        self.video.as_ref()
    }

    pub fn video_mut(&mut self) -> Option<&mut VideoPlayer> {
        self.video.as_mut()
    }

    pub fn show_image(&mut self, frame: Frame) {
        self.release();
        self.image = Some(frame);
    }

    pub fn show_video(&mut self, player: VideoPlayer) {
        self.release();
        self.video = Some(player);
    }

    /// Drops the decoded pixels and stops any running decoder.
    pub fn release(&mut self) {
        if self.image.take().is_some() {
            log::debug!("Released decoded image");
        }
        if let Some(player) = self.video.take() {
            log::debug!("Stopped video {}", player.info().path.display());
        }
    }
}

/// Decodes a regular image file into RGBA pixels.
pub async fn decode_image(path: PathBuf) -> Result<Frame, ViewerError> {
    let display = path.display().to_string();
    let decoded = tokio::task::spawn_blocking(move || image::open(&path))
        .await
        .map_err(|err| ViewerError::Playback(format!("{display}: {err}")))?
        .map_err(|err| ViewerError::Playback(format!("{display}: cannot decode image ({err})")))?;

    let rgba = decoded.into_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(Frame::from_rgba(width, height, rgba.into_raw()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn decodes_png_files() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("dot.png");
        image::RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 255]))
            .save(&path)
            .expect("write png");

        let frame = decode_image(path).await.expect("decoded");
        assert_eq!((frame.width, frame.height), (3, 2));
    }

    #[tokio::test]
    async fn corrupt_images_are_playback_errors() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not a png").expect("write file");

        let result = decode_image(path).await;
        assert!(matches!(result, Err(ViewerError::Playback(_))));
    }

    #[test]
    fn release_clears_the_image() {
        let mut media = NativeMedia::default();
        media.show_image(Frame::from_rgba(1, 1, vec![0, 0, 0, 255]));
        assert!(media.image().is_some());

        media.release();
        assert!(media.image().is_none());
        assert!(media.video().is_none());
    }
}
