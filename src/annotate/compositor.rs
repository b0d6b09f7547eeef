use crate::annotate::engine::AnnotationEngine;
use crate::annotate::model::{Color, Point, RgbaBuffer, SelectionRect, StrokeStyle};
use crate::annotate::raster::{blend_over, draw_polyline, draw_rect};
use crate::annotate::text::draw_text_item;
use crate::chat::message::ImagePart;
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use std::io::Cursor;
use std::path::Path;

pub const EXPORT_BACKGROUND: Color = Color::WHITE;

const OVERLAY_DIM: Color = Color::rgba(0, 0, 0, 128);
const SELECTION_BORDER: StrokeStyle = StrokeStyle {
    width: 3,
    color: Color::rgba(255, 255, 255, 255),
};
const SELECTION_PATH: StrokeStyle = StrokeStyle {
    width: 2,
    color: Color::rgba(102, 204, 255, 200),
};
const REGION_BORDER_WIDTH: u32 = 4;

/// Flattens the base crop, the raster canvas, and the text labels, in that
/// order, into one bitmap.
#[derive(Debug, Clone)]
pub struct ImageCompositor {
    base: RgbaBuffer,
}

impl ImageCompositor {
    pub fn new(base: RgbaBuffer) -> Self {
        Self { base }
    }

    pub fn base(&self) -> &RgbaBuffer {
        &self.base
    }

    pub fn render(&self, engine: &AnnotationEngine) -> RgbaBuffer {
        let mut output = self.base.clone();
        self.layer_annotations(&mut output, engine);
        output
    }

    /// Lossless PNG of [`Self::render`], ready to attach to a chat turn.
    pub fn encode(&self, engine: &AnnotationEngine) -> Result<ImagePart> {
        let png = encode_png(&self.render(engine))?;
        Ok(ImagePart::png(general_purpose::STANDARD.encode(png)))
    }

    /// Writes the flattened annotation over an opaque background. Write
    /// failures are returned to the caller untouched.
    pub fn render_to_file(&self, engine: &AnnotationEngine, path: &Path) -> Result<()> {
        let mut output = RgbaBuffer::new(self.base.width, self.base.height, EXPORT_BACKGROUND);
        blend_over(&mut output, &self.base);
        self.layer_annotations(&mut output, engine);

        let png = encode_png(&output)?;
        std::fs::write(path, png)
            .with_context(|| format!("write annotated selection to {}", path.display()))?;
        tracing::info!(path = %path.display(), "annotated selection exported");
        Ok(())
    }

    /// Editor view: the composited image, the shape being dragged, and a
    /// border marking the region edge.
    pub fn preview(&self, engine: &AnnotationEngine) -> RgbaBuffer {
        let mut output = self.render(engine);
        if let Some(layer) = engine.preview_layer() {
            blend_over(&mut output, &layer);
        }

        let mut border = RgbaBuffer::transparent(output.width, output.height);
        let far = (output.width as i32 - 2, output.height as i32 - 2);
        draw_rect(
            &mut border,
            (1, 1),
            far,
            StrokeStyle {
                width: REGION_BORDER_WIDTH,
                color: engine.style().pen.color,
            },
        );
        blend_over(&mut output, &border);
        output
    }

    fn layer_annotations(&self, output: &mut RgbaBuffer, engine: &AnnotationEngine) {
        blend_over(output, engine.canvas());
        let style = engine.style().text;
        for item in engine.text_items() {
            draw_text_item(output, item, style);
        }
    }
}

/// Selection screen: the capture dimmed, the chosen region revealed with a
/// border, and the drag path while it is being drawn.
pub fn selection_overlay(
    capture: &RgbaBuffer,
    stroke: &[Point],
    rect: Option<SelectionRect>,
) -> RgbaBuffer {
    let mut output = capture.clone();
    blend_over(
        &mut output,
        &RgbaBuffer::new(capture.width, capture.height, OVERLAY_DIM),
    );

    if let Some(rect) = rect.and_then(|r| r.clamp_to(capture.width, capture.height)) {
        let stride = capture.width as usize * 4;
        for y in rect.top as usize..rect.bottom as usize {
            let start = y * stride + rect.left as usize * 4;
            let end = start + rect.width() as usize * 4;
            output.pixels[start..end].copy_from_slice(&capture.pixels[start..end]);
        }
        let mut border = RgbaBuffer::transparent(capture.width, capture.height);
        draw_rect(&mut border, rect.top_left(), rect.bottom_right(), SELECTION_BORDER);
        blend_over(&mut output, &border);
    }

    if stroke.len() > 1 {
        let mut path = RgbaBuffer::transparent(capture.width, capture.height);
        draw_polyline(&mut path, stroke, SELECTION_PATH);
        blend_over(&mut output, &path);
    }
    output
}

pub fn encode_png(buffer: &RgbaBuffer) -> Result<Vec<u8>> {
    let image = buffer
        .to_image()
        .ok_or_else(|| anyhow!("pixel buffer does not match {}x{}", buffer.width, buffer.height))?;
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageOutputFormat::Png)
        .context("encode PNG")?;
    Ok(bytes)
}

pub fn decode_png(bytes: &[u8]) -> Result<RgbaBuffer> {
    let image = image::load_from_memory_with_format(bytes, image::ImageFormat::Png)
        .context("decode PNG")?;
    Ok(RgbaBuffer::from_image(image.to_rgba8()))
}
