use crate::annotate::model::{Point, SelectionRect};

/// Translates between screen space and the space local to a confirmed
/// selection, whose origin is the selection's top-left corner.
///
/// Wrapping arithmetic keeps both directions exact inverses for every `i32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinateMapper {
    origin: Point,
}

impl CoordinateMapper {
    pub fn new(rect: SelectionRect) -> Self {
        Self {
            origin: rect.top_left(),
        }
    }

    pub fn origin(&self) -> Point {
        self.origin
    }

    pub fn to_local(&self, screen: Point) -> Point {
        (
            screen.0.wrapping_sub(self.origin.0),
            screen.1.wrapping_sub(self.origin.1),
        )
    }

    pub fn to_screen(&self, local: Point) -> Point {
        (
            local.0.wrapping_add(self.origin.0),
            local.1.wrapping_add(self.origin.1),
        )
    }
}
