use crate::annotate::history::UndoStack;
use crate::annotate::model::{Mode, Point, RgbaBuffer, StrokeStyle, TextItem, TextStyle};
use crate::annotate::raster::{self, DEFAULT_ARROW_BARB_LENGTH};
use crate::annotate::text::hit_box;

/// Synchronous prompt for a text label. Returns the entered string and
/// whether the user confirmed it.
pub trait TextEntry {
    fn request_text(&mut self) -> (String, bool);
}

impl<F> TextEntry for F
where
    F: FnMut() -> (String, bool),
{
    fn request_text(&mut self) -> (String, bool) {
        self()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStyle {
    pub pen: StrokeStyle,
    pub text: TextStyle,
    pub barb_length: u32,
}

impl Default for EngineStyle {
    fn default() -> Self {
        Self {
            pen: StrokeStyle::default(),
            text: TextStyle::default(),
            barb_length: DEFAULT_ARROW_BARB_LENGTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ActiveStroke {
    Freestyle { points: Vec<Point> },
    Rectangle { anchor: Point, end: Point },
    Arrow { anchor: Point, end: Point },
    TextDrag { index: usize, offset: Point },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginOutcome {
    StrokeStarted,
    TextDragStarted { index: usize },
    TextAdded { index: usize },
    TextEntryCancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    TextDragEnded,
    NoActiveStroke,
}

/// Raster canvas, undo snapshots, active tool, and text labels for one
/// confirmed selection. All points are selection-local.
#[derive(Debug, Clone)]
pub struct AnnotationEngine {
    mode: Mode,
    style: EngineStyle,
    canvas: RgbaBuffer,
    history: UndoStack,
    text_items: Vec<TextItem>,
    active: Option<ActiveStroke>,
}

impl AnnotationEngine {
    pub fn new(width: u32, height: u32, style: EngineStyle) -> Self {
        Self {
            mode: Mode::Freestyle,
            style,
            canvas: RgbaBuffer::transparent(width, height),
            history: UndoStack::new(width, height),
            text_items: Vec::new(),
            active: None,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.canvas.width, self.canvas.height)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn style(&self) -> EngineStyle {
        self.style
    }

    pub fn canvas(&self) -> &RgbaBuffer {
        &self.canvas
    }

    pub fn history(&self) -> &UndoStack {
        &self.history
    }

    pub fn text_items(&self) -> &[TextItem] {
        &self.text_items
    }

    pub fn has_active_stroke(&self) -> bool {
        self.active.is_some()
    }

    /// Switches the tool for the next stroke; a stroke already in progress
    /// finishes with the tool it started with.
    pub fn set_mode(&mut self, mode: Mode) {
        tracing::debug!(from = ?self.mode, to = ?mode, "annotation mode changed");
        self.mode = mode;
    }

    pub fn begin_stroke(&mut self, point: Point, text_entry: &mut dyn TextEntry) -> BeginOutcome {
        if let Some(previous) = self.active.take() {
            tracing::debug!(?previous, "unfinished stroke dropped by new pointer press");
        }

        match self.mode {
            Mode::Freestyle => {
                self.active = Some(ActiveStroke::Freestyle {
                    points: vec![point],
                });
                BeginOutcome::StrokeStarted
            }
            Mode::Rectangle => {
                self.active = Some(ActiveStroke::Rectangle {
                    anchor: point,
                    end: point,
                });
                BeginOutcome::StrokeStarted
            }
            Mode::Arrow => {
                self.active = Some(ActiveStroke::Arrow {
                    anchor: point,
                    end: point,
                });
                BeginOutcome::StrokeStarted
            }
            Mode::Text => self.begin_text(point, text_entry),
        }
    }

    fn begin_text(&mut self, point: Point, text_entry: &mut dyn TextEntry) -> BeginOutcome {
        if let Some(index) = self.text_item_at(point) {
            let position = self.text_items[index].position;
            self.active = Some(ActiveStroke::TextDrag {
                index,
                offset: (point.0 - position.0, point.1 - position.1),
            });
            return BeginOutcome::TextDragStarted { index };
        }

        let (text, confirmed) = text_entry.request_text();
        if !confirmed || text.is_empty() {
            return BeginOutcome::TextEntryCancelled;
        }
        self.text_items.push(TextItem {
            position: point,
            text,
        });
        BeginOutcome::TextAdded {
            index: self.text_items.len() - 1,
        }
    }

    /// Topmost text item whose hit box contains `point`.
    pub fn text_item_at(&self, point: Point) -> Option<usize> {
        self.text_items
            .iter()
            .enumerate()
            .rev()
            .find(|(_, item)| hit_box(item, self.style.text).contains(point))
            .map(|(index, _)| index)
    }

    pub fn extend_stroke(&mut self, point: Point) {
        match self.active.as_mut() {
            Some(ActiveStroke::Freestyle { points }) => points.push(point),
            Some(ActiveStroke::Rectangle { end, .. }) | Some(ActiveStroke::Arrow { end, .. }) => {
                *end = point;
            }
            Some(ActiveStroke::TextDrag { index, offset }) => {
                if let Some(item) = self.text_items.get_mut(*index) {
                    item.position = (point.0 - offset.0, point.1 - offset.1);
                }
            }
            None => {}
        }
    }

    pub fn commit_stroke(&mut self) -> CommitOutcome {
        let Some(active) = self.active.take() else {
            return CommitOutcome::NoActiveStroke;
        };
        if matches!(active, ActiveStroke::TextDrag { .. }) {
            return CommitOutcome::TextDragEnded;
        }

        draw_active(&mut self.canvas, &active, self.style);
        self.history.commit(&self.canvas);
        tracing::debug!(snapshots = self.history.len(), "stroke committed");
        CommitOutcome::Committed
    }

    /// Restores the canvas to the previous snapshot. Text items are not
    /// part of the undo history.
    pub fn undo(&mut self) -> bool {
        match self.history.undo() {
            Some(previous) => {
                self.canvas = previous;
                true
            }
            None => false,
        }
    }

    /// The in-progress shape on a transparent layer, for live preview.
    pub fn preview_layer(&self) -> Option<RgbaBuffer> {
        let active = self.active.as_ref()?;
        if matches!(active, ActiveStroke::TextDrag { .. }) {
            return None;
        }
        let mut layer = RgbaBuffer::transparent(self.canvas.width, self.canvas.height);
        draw_active(&mut layer, active, self.style);
        Some(layer)
    }
}

fn draw_active(target: &mut RgbaBuffer, active: &ActiveStroke, style: EngineStyle) {
    match active {
        ActiveStroke::Freestyle { points } => raster::draw_polyline(target, points, style.pen),
        ActiveStroke::Rectangle { anchor, end } => {
            raster::draw_rect(target, *anchor, *end, style.pen)
        }
        ActiveStroke::Arrow { anchor, end } => {
            raster::draw_arrow(target, *anchor, *end, style.barb_length, style.pen)
        }
        ActiveStroke::TextDrag { .. } => {}
    }
}
