use crate::annotate::model::RgbaBuffer;

/// Whole-canvas snapshots, one per committed shape. The canvas always equals
/// the top snapshot, or a blank buffer once the stack is empty.
#[derive(Debug, Clone, PartialEq)]
pub struct UndoStack {
    width: u32,
    height: u32,
    snapshots: Vec<RgbaBuffer>,
}

impl UndoStack {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            snapshots: Vec::new(),
        }
    }

    pub fn commit(&mut self, canvas: &RgbaBuffer) {
        debug_assert_eq!((canvas.width, canvas.height), (self.width, self.height));
        self.snapshots.push(canvas.clone());
    }

    /// Pops the newest snapshot and returns the canvas state to restore, or
    /// `None` when there is nothing to undo.
    pub fn undo(&mut self) -> Option<RgbaBuffer> {
        self.snapshots.pop()?;
        Some(self.current())
    }

    pub fn current(&self) -> RgbaBuffer {
        self.snapshots
            .last()
            .cloned()
            .unwrap_or_else(|| RgbaBuffer::transparent(self.width, self.height))
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::model::Color;

    fn filled(value: u8) -> RgbaBuffer {
        RgbaBuffer::new(2, 2, Color::rgba(value, value, value, 255))
    }

    #[test]
    fn undo_restores_previous_snapshot() {
        let mut stack = UndoStack::new(2, 2);
        stack.commit(&filled(1));
        stack.commit(&filled(2));

        assert_eq!(stack.undo(), Some(filled(1)));
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.undo(), Some(RgbaBuffer::transparent(2, 2)));
        assert_eq!(stack.undo(), None);
        assert!(stack.is_empty());
    }

    #[test]
    fn snapshots_are_independent_copies() {
        let mut stack = UndoStack::new(2, 2);
        let mut canvas = filled(7);
        stack.commit(&canvas);
        canvas.pixels.fill(0);
        assert_eq!(stack.current(), filled(7));
    }
}
