use serde::{Deserialize, Serialize};

/// Integer pixel position. Screen and selection-local space share this type;
/// [`crate::annotate::coords::CoordinateMapper`] converts between them.
pub type Point = (i32, i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Freestyle,
    Rectangle,
    Arrow,
    Text,
}

impl Mode {
    pub const ALL: [Mode; 4] = [Mode::Freestyle, Mode::Rectangle, Mode::Arrow, Mode::Text];

    pub fn index(self) -> usize {
        match self {
            Mode::Freestyle => 0,
            Mode::Rectangle => 1,
            Mode::Arrow => 2,
            Mode::Text => 3,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Next mode in toolbar order, wrapping around.
    pub fn cycle(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    pub fn name(self) -> &'static str {
        match self {
            Mode::Freestyle => "freestyle",
            Mode::Rectangle => "rect",
            Mode::Arrow => "arrow",
            Mode::Text => "text",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "freestyle" | "free" | "pen" => Some(Mode::Freestyle),
            "rect" | "rectangle" => Some(Mode::Rectangle),
            "arrow" => Some(Mode::Arrow),
            "text" => Some(Mode::Text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const TRANSPARENT: Self = Self::rgba(0, 0, 0, 0);
    pub const WHITE: Self = Self::rgba(255, 255, 255, 255);
    pub const BLACK: Self = Self::rgba(0, 0, 0, 255);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

pub const DEFAULT_PEN_COLOR: Color = Color::rgba(102, 204, 255, 128);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrokeStyle {
    pub width: u32,
    pub color: Color,
}

impl Default for StrokeStyle {
    fn default() -> Self {
        Self {
            width: 2,
            color: DEFAULT_PEN_COLOR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextStyle {
    pub color: Color,
    /// Glyph scale over the 8px bitmap font; 2 gives a 16px label.
    pub scale: u32,
    /// Fixed hit box anchored at the item position, used for drag picking.
    pub hit_box: (u32, u32),
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            color: DEFAULT_PEN_COLOR,
            scale: 2,
            hit_box: (200, 30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextItem {
    pub position: Point,
    pub text: String,
}

/// Normalized, half-open rectangle in screen space: `left..right` by `top..bottom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SelectionRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl SelectionRect {
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            left: a.0.min(b.0),
            top: a.1.min(b.1),
            right: a.0.max(b.0),
            bottom: a.1.max(b.1),
        }
    }

    /// Bounding box of every point, or `None` when there are no points.
    pub fn bounding<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Point>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        Some(iter.fold(Self::from_corners(first, first), |rect, p| Self {
            left: rect.left.min(p.0),
            top: rect.top.min(p.1),
            right: rect.right.max(p.0),
            bottom: rect.bottom.max(p.1),
        }))
    }

    pub fn top_left(&self) -> Point {
        (self.left, self.top)
    }

    pub fn bottom_right(&self) -> Point {
        (self.right, self.bottom)
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top).max(0) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn contains(&self, point: Point) -> bool {
        point.0 >= self.left && point.0 < self.right && point.1 >= self.top && point.1 < self.bottom
    }

    /// Intersection with `0..width` by `0..height`, `None` when nothing overlaps.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Self> {
        let clamped = Self {
            left: self.left.clamp(0, width as i32),
            top: self.top.clamp(0, height as i32),
            right: self.right.clamp(0, width as i32),
            bottom: self.bottom.clamp(0, height as i32),
        };
        (!clamped.is_empty()).then_some(clamped)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaBuffer {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RgbaBuffer {
    pub fn new(width: u32, height: u32, fill: Color) -> Self {
        let mut pixels = vec![0u8; (width as usize) * (height as usize) * 4];
        for chunk in pixels.chunks_exact_mut(4) {
            chunk.copy_from_slice(&fill.to_array());
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn transparent(width: u32, height: u32) -> Self {
        Self::new(width, height, Color::TRANSPARENT)
    }

    pub fn from_pixels(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        assert_eq!(pixels.len(), (width as usize) * (height as usize) * 4);
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn from_image(image: image::RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self::from_pixels(width, height, image.into_raw())
    }

    pub fn to_image(&self) -> Option<image::RgbaImage> {
        image::RgbaImage::from_raw(self.width, self.height, self.pixels.clone())
    }

    pub fn pixel(&self, x: u32, y: u32) -> Color {
        let idx = ((y as usize) * (self.width as usize) + x as usize) * 4;
        Color {
            r: self.pixels[idx],
            g: self.pixels[idx + 1],
            b: self.pixels[idx + 2],
            a: self.pixels[idx + 3],
        }
    }

    pub fn is_fully_transparent(&self) -> bool {
        self.pixels.chunks_exact(4).all(|px| px[3] == 0)
    }

    /// Copy of the pixels under `rect`, clipped to this buffer.
    pub fn crop(&self, rect: SelectionRect) -> Option<RgbaBuffer> {
        let clipped = rect.clamp_to(self.width, self.height)?;
        let (w, h) = (clipped.width() as usize, clipped.height() as usize);
        let stride = self.width as usize * 4;
        let mut pixels = Vec::with_capacity(w * h * 4);
        for y in clipped.top as usize..clipped.bottom as usize {
            let start = y * stride + clipped.left as usize * 4;
            pixels.extend_from_slice(&self.pixels[start..start + w * 4]);
        }
        Some(RgbaBuffer::from_pixels(w as u32, h as u32, pixels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_corners_normalizes_either_drag_direction() {
        let forward = SelectionRect::from_corners((50, 50), (100, 100));
        let backward = SelectionRect::from_corners((100, 100), (50, 50));
        let mixed = SelectionRect::from_corners((100, 50), (50, 100));
        assert_eq!(forward, backward);
        assert_eq!(forward, mixed);
        assert_eq!(forward.top_left(), (50, 50));
        assert_eq!(forward.bottom_right(), (100, 100));
        assert_eq!((forward.width(), forward.height()), (50, 50));
    }

    #[test]
    fn bounding_box_covers_all_points() {
        let rect = SelectionRect::bounding([(10, 40), (30, 5), (-2, 12)]).expect("rect");
        assert_eq!(rect, SelectionRect::from_corners((-2, 5), (30, 40)));
        assert!(SelectionRect::bounding(Vec::<Point>::new()).is_none());
    }

    #[test]
    fn degenerate_rect_is_empty() {
        assert!(SelectionRect::from_corners((5, 5), (5, 40)).is_empty());
        assert!(SelectionRect::from_corners((5, 5), (40, 5)).is_empty());
        assert!(!SelectionRect::from_corners((5, 5), (6, 6)).is_empty());
    }

    #[test]
    fn crop_copies_rows_and_clips_to_bounds() {
        let mut pixels = Vec::new();
        for y in 0..3u8 {
            for x in 0..4u8 {
                pixels.extend_from_slice(&[x, y, 0, 255]);
            }
        }
        let buffer = RgbaBuffer::from_pixels(4, 3, pixels);

        let crop = buffer
            .crop(SelectionRect::from_corners((1, 1), (3, 3)))
            .expect("crop");
        assert_eq!((crop.width, crop.height), (2, 2));
        assert_eq!(crop.pixel(0, 0), Color::rgba(1, 1, 0, 255));
        assert_eq!(crop.pixel(1, 1), Color::rgba(2, 2, 0, 255));

        let clipped = buffer
            .crop(SelectionRect::from_corners((2, -5), (10, 2)))
            .expect("clipped crop");
        assert_eq!((clipped.width, clipped.height), (2, 2));

        assert!(buffer
            .crop(SelectionRect::from_corners((10, 10), (20, 20)))
            .is_none());
    }

    #[test]
    fn mode_cycles_in_toolbar_order() {
        assert_eq!(Mode::Freestyle.cycle(), Mode::Rectangle);
        assert_eq!(Mode::Text.cycle(), Mode::Freestyle);
        assert_eq!(Mode::parse("Rect"), Some(Mode::Rectangle));
        assert_eq!(Mode::from_index(2), Some(Mode::Arrow));
        assert_eq!(Mode::parse("ellipse"), None);
    }
}
