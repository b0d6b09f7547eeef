use crate::annotate::model::{Point, SelectionRect};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionPhase {
    Idle,
    Dragging,
    Confirmed,
}

pub fn can_transition(from: SelectionPhase, to: SelectionPhase) -> bool {
    matches!(
        (from, to),
        (SelectionPhase::Idle, SelectionPhase::Dragging)
            | (SelectionPhase::Dragging, SelectionPhase::Confirmed)
            | (SelectionPhase::Dragging, SelectionPhase::Idle)
            | (SelectionPhase::Confirmed, SelectionPhase::Idle)
    )
}

/// An operation was requested in a phase that does not accept it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionError {
    pub operation: &'static str,
    pub phase: SelectionPhase,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "selection cannot {} while {:?}",
            self.operation, self.phase
        )
    }
}

impl std::error::Error for TransitionError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragOutcome {
    Confirmed(SelectionRect),
    /// Zero-area drag; the controller silently returned to idle.
    Empty,
}

/// Turns the initial pointer drag into a confirmed selection rectangle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionController {
    phase: SelectionPhase,
    stroke: Vec<Point>,
    rect: Option<SelectionRect>,
}

impl Default for SelectionController {
    fn default() -> Self {
        Self {
            phase: SelectionPhase::Idle,
            stroke: Vec::new(),
            rect: None,
        }
    }
}

impl SelectionController {
    pub fn phase(&self) -> SelectionPhase {
        self.phase
    }

    /// Points recorded by the drag in progress; empty outside of a drag.
    pub fn stroke(&self) -> &[Point] {
        &self.stroke
    }

    pub fn rect(&self) -> Option<SelectionRect> {
        self.rect
    }

    pub fn begin_drag(&mut self, point: Point) -> Result<(), TransitionError> {
        self.transition("begin a drag", SelectionPhase::Dragging)?;
        self.stroke.clear();
        self.stroke.push(point);
        Ok(())
    }

    pub fn extend_drag(&mut self, point: Point) -> Result<(), TransitionError> {
        if self.phase != SelectionPhase::Dragging {
            return Err(self.reject("extend a drag"));
        }
        self.stroke.push(point);
        Ok(())
    }

    pub fn end_drag(&mut self) -> Result<DragOutcome, TransitionError> {
        if self.phase != SelectionPhase::Dragging {
            return Err(self.reject("end a drag"));
        }

        let stroke = std::mem::take(&mut self.stroke);
        match SelectionRect::bounding(stroke).filter(|rect| !rect.is_empty()) {
            Some(rect) => {
                self.transition("confirm", SelectionPhase::Confirmed)?;
                self.rect = Some(rect);
                tracing::debug!(?rect, "selection confirmed");
                Ok(DragOutcome::Confirmed(rect))
            }
            None => {
                self.transition("discard an empty drag", SelectionPhase::Idle)?;
                tracing::debug!("zero-area selection discarded");
                Ok(DragOutcome::Empty)
            }
        }
    }

    /// Drops the confirmed selection so a new drag can start.
    pub fn restart(&mut self) -> Result<(), TransitionError> {
        if self.phase != SelectionPhase::Confirmed {
            return Err(self.reject("restart"));
        }
        self.transition("restart", SelectionPhase::Idle)?;
        self.rect = None;
        self.stroke.clear();
        Ok(())
    }

    /// Rebinds a confirmed selection to a new rectangle without a drag.
    /// Used when the caller clips the drag to the capture bounds.
    pub(crate) fn replace_confirmed(&mut self, rect: SelectionRect) {
        if self.phase == SelectionPhase::Confirmed && !rect.is_empty() {
            self.rect = Some(rect);
        }
    }

    fn transition(
        &mut self,
        operation: &'static str,
        next: SelectionPhase,
    ) -> Result<(), TransitionError> {
        if !can_transition(self.phase, next) {
            return Err(self.reject(operation));
        }
        self.phase = next;
        Ok(())
    }

    fn reject(&self, operation: &'static str) -> TransitionError {
        tracing::warn!(operation, phase = ?self.phase, "rejected selection transition");
        TransitionError {
            operation,
            phase: self.phase,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drag(controller: &mut SelectionController, points: &[Point]) -> DragOutcome {
        controller.begin_drag(points[0]).expect("begin");
        for point in &points[1..] {
            controller.extend_drag(*point).expect("extend");
        }
        controller.end_drag().expect("end")
    }

    #[test]
    fn backwards_drag_yields_normalized_rect() {
        let mut controller = SelectionController::default();
        let outcome = drag(&mut controller, &[(100, 100), (50, 50)]);
        let expected = SelectionRect::from_corners((50, 50), (100, 100));
        assert_eq!(outcome, DragOutcome::Confirmed(expected));
        assert_eq!(controller.phase(), SelectionPhase::Confirmed);
        assert_eq!(controller.rect(), Some(expected));
    }

    #[test]
    fn drag_direction_does_not_change_rect() {
        let pairs = [((3, 9), (40, 2)), ((0, 0), (1, 1)), ((-20, 15), (7, -4))];
        for (a, b) in pairs {
            let mut forward = SelectionController::default();
            let mut backward = SelectionController::default();
            assert_eq!(drag(&mut forward, &[a, b]), drag(&mut backward, &[b, a]));
        }
    }

    #[test]
    fn rect_bounds_every_intermediate_point() {
        let mut controller = SelectionController::default();
        let outcome = drag(&mut controller, &[(10, 10), (5, 30), (25, 2), (12, 12)]);
        assert_eq!(
            outcome,
            DragOutcome::Confirmed(SelectionRect::from_corners((5, 2), (25, 30)))
        );
    }

    #[test]
    fn zero_area_drag_returns_to_idle() {
        let mut controller = SelectionController::default();
        assert_eq!(drag(&mut controller, &[(10, 10)]), DragOutcome::Empty);
        assert_eq!(controller.phase(), SelectionPhase::Idle);
        assert_eq!(drag(&mut controller, &[(10, 10), (10, 90)]), DragOutcome::Empty);
        assert_eq!(controller.rect(), None);
    }

    #[test]
    fn operations_outside_their_phase_are_rejected() {
        let mut controller = SelectionController::default();
        assert!(controller.extend_drag((1, 1)).is_err());
        assert!(controller.end_drag().is_err());
        assert!(controller.restart().is_err());

        drag(&mut controller, &[(0, 0), (10, 10)]);
        let err = controller.begin_drag((1, 1)).expect_err("begin while confirmed");
        assert_eq!(err.phase, SelectionPhase::Confirmed);
        assert_eq!(controller.phase(), SelectionPhase::Confirmed);
    }

    #[test]
    fn restart_clears_selection() {
        let mut controller = SelectionController::default();
        drag(&mut controller, &[(0, 0), (10, 10)]);
        controller.restart().expect("restart");
        assert_eq!(controller.phase(), SelectionPhase::Idle);
        assert_eq!(controller.rect(), None);
        assert!(controller.stroke().is_empty());

        assert_eq!(
            drag(&mut controller, &[(5, 5), (6, 7)]),
            DragOutcome::Confirmed(SelectionRect::from_corners((5, 5), (6, 7)))
        );
    }

    #[test]
    fn new_drag_discards_previous_stroke() {
        let mut controller = SelectionController::default();
        drag(&mut controller, &[(0, 0), (3, 3)]);
        controller.restart().expect("restart");
        controller.begin_drag((50, 50)).expect("begin");
        assert_eq!(controller.stroke(), &[(50, 50)]);
    }
}
