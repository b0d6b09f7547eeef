pub mod capture;
pub mod compositor;
pub mod coords;
pub mod engine;
pub mod history;
pub mod model;
pub mod raster;
pub mod save;
pub mod selection;
pub mod text;

pub use compositor::ImageCompositor;
pub use coords::CoordinateMapper;
pub use engine::{AnnotationEngine, EngineStyle, TextEntry};
pub use model::{Mode, Point, RgbaBuffer, SelectionRect, TextItem};
pub use selection::{DragOutcome, SelectionController, SelectionPhase};
