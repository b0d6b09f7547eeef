use crate::annotate::model::{Color, Point, RgbaBuffer, StrokeStyle};
use std::f64::consts::PI;

/// Barbs leave the tip at this angle on either side of the shaft.
pub const ARROW_BARB_ANGLE: f64 = PI / 6.0;
pub const DEFAULT_ARROW_BARB_LENGTH: u32 = 10;
pub const MAX_STROKE_WIDTH: u32 = 256;
pub const MAX_ARROW_BARB_LENGTH: u32 = 4096;

/// Writes `color` verbatim. Canvas strokes replace rather than blend so that
/// overlapping stamps of one stroke keep a uniform alpha.
pub fn set_pixel(buffer: &mut RgbaBuffer, x: i32, y: i32, color: Color) {
    if x < 0 || y < 0 || x >= buffer.width as i32 || y >= buffer.height as i32 {
        return;
    }
    let idx = ((y as usize) * (buffer.width as usize) + x as usize) * 4;
    buffer.pixels[idx..idx + 4].copy_from_slice(&color.to_array());
}

pub fn blend_pixel_at(buffer: &mut RgbaBuffer, x: i32, y: i32, color: Color) {
    if x < 0 || y < 0 || x >= buffer.width as i32 || y >= buffer.height as i32 {
        return;
    }
    let blended = blend_pixel(buffer.pixel(x as u32, y as u32), color);
    set_pixel(buffer, x, y, blended);
}

/// Source-over on straight (non-premultiplied) alpha.
pub fn blend_pixel(bottom: Color, top: Color) -> Color {
    let sa = top.a as f32 / 255.0;
    let da = bottom.a as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);

    if out_a <= f32::EPSILON {
        return Color::TRANSPARENT;
    }

    let blend = |s: u8, d: u8| -> u8 {
        (((s as f32 * sa) + (d as f32 * da * (1.0 - sa))) / out_a)
            .round()
            .clamp(0.0, 255.0) as u8
    };

    Color {
        r: blend(top.r, bottom.r),
        g: blend(top.g, bottom.g),
        b: blend(top.b, bottom.b),
        a: (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    }
}

pub fn blend_over(base: &mut RgbaBuffer, top: &RgbaBuffer) {
    assert_eq!(base.width, top.width);
    assert_eq!(base.height, top.height);

    for (dst, src) in base
        .pixels
        .chunks_exact_mut(4)
        .zip(top.pixels.chunks_exact(4))
    {
        if src[3] == 0 {
            continue;
        }
        let blended = blend_pixel(
            Color::rgba(dst[0], dst[1], dst[2], dst[3]),
            Color::rgba(src[0], src[1], src[2], src[3]),
        );
        dst.copy_from_slice(&blended.to_array());
    }
}

fn draw_brush(buffer: &mut RgbaBuffer, center: Point, color: Color, stroke_width: u32) {
    let radius = (stroke_width.min(MAX_STROKE_WIDTH).saturating_sub(1) / 2) as i32;
    for y in (center.1 - radius)..=(center.1 + radius) {
        for x in (center.0 - radius)..=(center.0 + radius) {
            let dx = x - center.0;
            let dy = y - center.1;
            if dx * dx + dy * dy <= radius * radius {
                set_pixel(buffer, x, y, color);
            }
        }
    }
}

/// Bresenham walk stamping a round brush at every step.
pub fn draw_segment(buffer: &mut RgbaBuffer, start: Point, end: Point, style: StrokeStyle) {
    let stroke_width = style.width.max(1);
    let (mut x0, mut y0) = start;
    let (x1, y1) = end;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        draw_brush(buffer, (x0, y0), style.color, stroke_width);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

/// Joins consecutive points with stamped segments. Fewer than two points
/// draw nothing.
pub fn draw_polyline(buffer: &mut RgbaBuffer, points: &[Point], style: StrokeStyle) {
    for segment in points.windows(2) {
        draw_segment(buffer, segment[0], segment[1], style);
    }
}

/// Outline of the normalized rectangle spanned by two corners.
pub fn draw_rect(buffer: &mut RgbaBuffer, start: Point, end: Point, style: StrokeStyle) {
    let (x0, x1) = (start.0.min(end.0), start.0.max(end.0));
    let (y0, y1) = (start.1.min(end.1), start.1.max(end.1));

    draw_segment(buffer, (x0, y0), (x1, y0), style);
    draw_segment(buffer, (x1, y0), (x1, y1), style);
    draw_segment(buffer, (x1, y1), (x0, y1), style);
    draw_segment(buffer, (x0, y1), (x0, y0), style);
}

/// Exact barb end points for an arrow pointing from `tail` to `tip`.
pub fn arrow_barb_endpoints(tail: Point, tip: Point, length: f64) -> [(f64, f64); 2] {
    let angle = ((tip.1 - tail.1) as f64).atan2((tip.0 - tail.0) as f64);
    [angle + ARROW_BARB_ANGLE, angle - ARROW_BARB_ANGLE].map(|barb| {
        (
            tip.0 as f64 - length * barb.cos(),
            tip.1 as f64 - length * barb.sin(),
        )
    })
}

/// Barb end points snapped to the pixel grid, truncating toward zero.
pub fn arrow_barbs(tail: Point, tip: Point, length: u32) -> [Point; 2] {
    arrow_barb_endpoints(tail, tip, length.min(MAX_ARROW_BARB_LENGTH) as f64)
        .map(|(x, y)| (x as i32, y as i32))
}

pub fn draw_arrow(
    buffer: &mut RgbaBuffer,
    tail: Point,
    tip: Point,
    barb_length: u32,
    style: StrokeStyle,
) {
    draw_segment(buffer, tail, tip, style);
    for barb in arrow_barbs(tail, tip, barb_length) {
        draw_segment(buffer, tip, barb, style);
    }
}
