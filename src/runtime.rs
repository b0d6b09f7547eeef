use crate::annotate::compositor::{selection_overlay, ImageCompositor};
use crate::annotate::coords::CoordinateMapper;
use crate::annotate::engine::{AnnotationEngine, BeginOutcome, CommitOutcome, EngineStyle, TextEntry};
use crate::annotate::model::{Mode, Point, RgbaBuffer, SelectionRect};
use crate::annotate::save::{ensure_output_folder, is_png_path, resolve_output_path, OutputTarget};
use crate::annotate::selection::{DragOutcome, SelectionController, SelectionPhase, TransitionError};
use crate::chat::message::ImagePart;
use crate::chat::session::{ChatSession, TurnOutcome};
use crate::chat::stream::{
    CompletionBackend, StreamEvent, StreamEventKind, StreamState, StreamingClient,
};
use crate::settings::Settings;
use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// The confirmed region being annotated.
pub struct AnnotationSurface {
    mapper: CoordinateMapper,
    engine: AnnotationEngine,
    compositor: ImageCompositor,
}

impl AnnotationSurface {
    fn new(rect: SelectionRect, base: RgbaBuffer, style: EngineStyle, mode: Mode) -> Self {
        let mut engine = AnnotationEngine::new(base.width, base.height, style);
        engine.set_mode(mode);
        Self {
            mapper: CoordinateMapper::new(rect),
            engine,
            compositor: ImageCompositor::new(base),
        }
    }

    pub fn mapper(&self) -> &CoordinateMapper {
        &self.mapper
    }

    pub fn engine(&self) -> &AnnotationEngine {
        &self.engine
    }

    pub fn compositor(&self) -> &ImageCompositor {
        &self.compositor
    }

    pub fn render(&self) -> RgbaBuffer {
        self.compositor.render(&self.engine)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointerOutcome {
    SelectionStarted,
    SelectionExtended,
    SelectionConfirmed(SelectionRect),
    /// Zero-area drag, or a drag entirely outside the captured screen.
    SelectionDiscarded,
    Began(BeginOutcome),
    Extended,
    Ended(CommitOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Started { stream_id: u64, turn: TurnOutcome },
    /// A reply is still streaming; the turn goes out when it ends.
    Queued,
    Empty,
}

#[derive(Debug, Clone)]
struct PendingTurn {
    text: Option<String>,
    image: Option<ImagePart>,
}

/// Owns everything for one snip-and-ask session: the captured screen, the
/// selection, the annotation surface, and the conversation.
pub struct ScreenChat {
    capture: RgbaBuffer,
    style: EngineStyle,
    mode: Mode,
    attach_image: bool,
    output: OutputTarget,
    selection: SelectionController,
    surface: Option<AnnotationSurface>,
    session: ChatSession,
    client: StreamingClient,
    pending: Vec<PendingTurn>,
}

impl ScreenChat {
    pub fn new(capture: RgbaBuffer, backend: Arc<dyn CompletionBackend>, settings: &Settings) -> Self {
        Self {
            capture,
            style: settings.engine_style(),
            mode: Mode::Freestyle,
            attach_image: settings.attach_image,
            output: settings.output_target(),
            selection: SelectionController::default(),
            surface: None,
            session: ChatSession::default(),
            client: StreamingClient::new(backend, settings.model.clone()),
            pending: Vec::new(),
        }
    }

    pub fn capture(&self) -> &RgbaBuffer {
        &self.capture
    }

    pub fn selection_phase(&self) -> SelectionPhase {
        self.selection.phase()
    }

    pub fn selection_rect(&self) -> Option<SelectionRect> {
        self.selection.rect()
    }

    pub fn surface(&self) -> Option<&AnnotationSurface> {
        self.surface.as_ref()
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    pub fn stream_state(&self) -> StreamState {
        self.client.state()
    }

    pub fn queued_turns(&self) -> usize {
        self.pending.len()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
        if let Some(surface) = self.surface.as_mut() {
            surface.engine.set_mode(mode);
        }
    }

    pub fn cycle_mode(&mut self) -> Mode {
        self.set_mode(self.mode.cycle());
        self.mode
    }

    pub fn pointer_down(
        &mut self,
        screen: Point,
        text_entry: &mut dyn TextEntry,
    ) -> Result<PointerOutcome, TransitionError> {
        match self.surface.as_mut() {
            Some(surface) => {
                let local = surface.mapper.to_local(screen);
                Ok(PointerOutcome::Began(surface.engine.begin_stroke(local, text_entry)))
            }
            None => {
                self.selection.begin_drag(screen)?;
                Ok(PointerOutcome::SelectionStarted)
            }
        }
    }

    pub fn pointer_move(&mut self, screen: Point) -> Result<PointerOutcome, TransitionError> {
        match self.surface.as_mut() {
            Some(surface) => {
                let local = surface.mapper.to_local(screen);
                surface.engine.extend_stroke(local);
                Ok(PointerOutcome::Extended)
            }
            None => {
                self.selection.extend_drag(screen)?;
                Ok(PointerOutcome::SelectionExtended)
            }
        }
    }

    pub fn pointer_up(&mut self) -> Result<PointerOutcome, TransitionError> {
        if let Some(surface) = self.surface.as_mut() {
            return Ok(PointerOutcome::Ended(surface.engine.commit_stroke()));
        }

        let DragOutcome::Confirmed(rect) = self.selection.end_drag()? else {
            return Ok(PointerOutcome::SelectionDiscarded);
        };
        let clipped = rect.clamp_to(self.capture.width, self.capture.height);
        let Some((clipped, base)) =
            clipped.and_then(|clipped| Some((clipped, self.capture.crop(clipped)?)))
        else {
            tracing::warn!(?rect, "selection lies outside the captured screen");
            self.selection.restart()?;
            return Ok(PointerOutcome::SelectionDiscarded);
        };

        self.selection.replace_confirmed(clipped);
        tracing::info!(
            left = clipped.left,
            top = clipped.top,
            width = clipped.width(),
            height = clipped.height(),
            "annotation surface opened"
        );
        self.surface = Some(AnnotationSurface::new(clipped, base, self.style, self.mode));
        Ok(PointerOutcome::SelectionConfirmed(clipped))
    }

    pub fn undo(&mut self) -> bool {
        self.surface
            .as_mut()
            .is_some_and(|surface| surface.engine.undo())
    }

    /// Discards the selection and all annotations and returns to selecting.
    /// The conversation is kept.
    pub fn restart(&mut self) -> Result<(), TransitionError> {
        self.selection.restart()?;
        self.surface = None;
        tracing::info!("selection restarted");
        Ok(())
    }

    /// Adds a user turn, attaching the annotated region when configured to.
    /// While a reply is streaming the turn is queued and sent once the
    /// stream ends.
    pub fn send(&mut self, text: Option<&str>) -> Result<SendOutcome> {
        let text = text.map(str::trim).filter(|t| !t.is_empty());
        let image = match (&self.surface, self.attach_image) {
            (Some(surface), true) => Some(surface.compositor.encode(&surface.engine)?),
            _ => None,
        };
        if text.is_none() && image.is_none() {
            return Ok(SendOutcome::Empty);
        }

        if self.client.state() == StreamState::Streaming {
            self.pending.push(PendingTurn {
                text: text.map(str::to_string),
                image,
            });
            self.session
                .note("reply in progress; message queued until it finishes");
            return Ok(SendOutcome::Queued);
        }

        let turn = self.session.compose_turn(text, image);
        let stream_id = self.start_stream()?;
        Ok(SendOutcome::Started { stream_id, turn })
    }

    /// Applies every stream event that has arrived to the conversation.
    pub fn tick(&mut self) -> Result<Vec<StreamEvent>> {
        let events = self.client.poll();
        self.apply(events)
    }

    /// Like [`Self::tick`], waiting up to `timeout` for the first event.
    pub fn tick_timeout(&mut self, timeout: Duration) -> Result<Vec<StreamEvent>> {
        let events = self.client.poll_timeout(timeout);
        self.apply(events)
    }

    fn apply(&mut self, events: Vec<StreamEvent>) -> Result<Vec<StreamEvent>> {
        for event in &events {
            match &event.kind {
                StreamEventKind::ChunkReceived(chunk) => self.session.append_chunk(chunk),
                StreamEventKind::StreamFinished(text) => self.session.commit_assistant(text),
                StreamEventKind::StreamFailed(error) => self.session.record_failure(error),
            }
        }

        if self.client.state() != StreamState::Streaming && !self.pending.is_empty() {
            for turn in std::mem::take(&mut self.pending) {
                self.session.compose_turn(turn.text.as_deref(), turn.image);
            }
            self.start_stream()?;
        }
        Ok(events)
    }

    fn start_stream(&mut self) -> Result<u64> {
        match self.client.start(self.session.history()) {
            Ok(stream_id) => Ok(stream_id),
            Err(err) => {
                self.session.record_failure(&err.to_string());
                Err(anyhow!(err))
            }
        }
    }

    /// Flattens the annotated region onto white and writes it as PNG.
    pub fn confirm(&self, path: Option<&Path>) -> Result<PathBuf> {
        let surface = self
            .surface
            .as_ref()
            .ok_or_else(|| anyhow!("no confirmed selection to export"))?;

        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                ensure_output_folder(&self.output)?;
                resolve_output_path(&self.output, chrono::Local::now())
            }
        };
        if !is_png_path(&path) {
            tracing::warn!(path = %path.display(), "export path lacks a .png extension; writing PNG anyway");
        }
        surface.compositor.render_to_file(&surface.engine, &path)?;
        Ok(path)
    }

    /// What the user currently sees: the dimmed selection screen, or the
    /// annotation preview once a region is confirmed.
    pub fn frame(&self) -> RgbaBuffer {
        match &self.surface {
            Some(surface) => surface.compositor.preview(&surface.engine),
            None => selection_overlay(&self.capture, self.selection.stroke(), self.selection.rect()),
        }
    }
}
