use crate::annotate::model::{Color, Point, RgbaBuffer, SelectionRect, TextItem, TextStyle};
use crate::annotate::raster::blend_pixel_at;
use font8x8::{UnicodeFonts, BASIC_FONTS};

const GLYPH_SIZE: i32 = 8;
pub const MAX_TEXT_SCALE: u32 = 16;
pub const MAX_HIT_BOX: u32 = 4096;

/// Blends `text` into `buffer` with the top-left corner of its first glyph
/// cell at `origin`. Glyphs grow down and to the right from that point; there
/// is no baseline offset, so a label placed at the pointer hangs below it.
pub fn draw_text(buffer: &mut RgbaBuffer, origin: Point, text: &str, color: Color, scale: u32) {
    let scale = scale.clamp(1, MAX_TEXT_SCALE) as i32;
    let mut cursor_x = origin.0;

    for ch in text.chars() {
        let glyph = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?'));
        let Some(glyph) = glyph else {
            cursor_x = cursor_x.saturating_add(GLYPH_SIZE * scale);
            continue;
        };
        for (row_idx, row_bits) in glyph.iter().enumerate() {
            for col in 0..GLYPH_SIZE {
                if (row_bits >> col) & 1 == 0 {
                    continue;
                }
                let px = cursor_x + col * scale;
                let py = origin.1 + row_idx as i32 * scale;
                for sy in 0..scale {
                    for sx in 0..scale {
                        blend_pixel_at(buffer, px + sx, py + sy, color);
                    }
                }
            }
        }
        cursor_x = cursor_x.saturating_add(GLYPH_SIZE * scale);
    }
}

pub fn draw_text_item(buffer: &mut RgbaBuffer, item: &TextItem, style: TextStyle) {
    draw_text(buffer, item.position, &item.text, style.color, style.scale);
}

/// Pick box for dragging. Fixed size, independent of the label length, and
/// anchored at the same top-left point as the glyphs.
pub fn hit_box(item: &TextItem, style: TextStyle) -> SelectionRect {
    let (w, h) = style.hit_box;
    let extent = |side: u32| side.clamp(1, MAX_HIT_BOX) as i32;
    SelectionRect {
        left: item.position.0,
        top: item.position.1,
        right: item.position.0.saturating_add(extent(w)),
        bottom: item.position.1.saturating_add(extent(h)),
    }
}
