use crate::annotate::compositor::decode_png;
use crate::annotate::model::RgbaBuffer;
use anyhow::{anyhow, Context, Result};
use screenshots::Screen;
use std::path::PathBuf;

/// Source of the full-screen bitmap the selection is drawn over.
pub trait ScreenCapture {
    fn capture(&self) -> Result<RgbaBuffer>;
}

/// Grabs the display containing the screen origin.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrimaryDisplayCapture;

impl ScreenCapture for PrimaryDisplayCapture {
    fn capture(&self) -> Result<RgbaBuffer> {
        let screen = Screen::from_point(0, 0).context("locate primary display")?;
        let image = screen
            .capture()
            .map_err(|err| anyhow!("capture primary display: {err}"))?;
        let buffer = RgbaBuffer::from_image(image);
        tracing::info!(
            width = buffer.width,
            height = buffer.height,
            "captured primary display"
        );
        Ok(buffer)
    }
}

/// Replays a PNG from disk in place of a live capture.
#[derive(Debug, Clone)]
pub struct FileCapture {
    pub path: PathBuf,
}

impl ScreenCapture for FileCapture {
    fn capture(&self) -> Result<RgbaBuffer> {
        let bytes = std::fs::read(&self.path)
            .with_context(|| format!("read capture image {}", self.path.display()))?;
        decode_png(&bytes).with_context(|| format!("decode capture image {}", self.path.display()))
    }
}

/// Fixed in-memory bitmap.
#[derive(Debug, Clone)]
pub struct StaticCapture(pub RgbaBuffer);

impl ScreenCapture for StaticCapture {
    fn capture(&self) -> Result<RgbaBuffer> {
        if self.0.width == 0 || self.0.height == 0 {
            return Err(anyhow!("capture bounds are empty"));
        }
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::compositor::encode_png;
    use crate::annotate::model::Color;

    #[test]
    fn file_capture_reads_png() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("screen.png");
        let source = RgbaBuffer::new(3, 2, Color::rgba(1, 2, 3, 255));
        std::fs::write(&path, encode_png(&source).expect("encode")).expect("write");

        let captured = FileCapture { path }.capture().expect("capture");
        assert_eq!(captured, source);
    }

    #[test]
    fn missing_capture_file_is_an_error() {
        let capture = FileCapture {
            path: PathBuf::from("/definitely/not/here.png"),
        };
        assert!(capture.capture().is_err());
    }

    #[test]
    fn empty_static_capture_is_rejected() {
        assert!(StaticCapture(RgbaBuffer::transparent(0, 0)).capture().is_err());
    }
}
