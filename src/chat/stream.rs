use crate::chat::message::ChatMessage;
use anyhow::Result;
use serde::Serialize;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Streaming,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
}

/// Remote completion service. Implementations block the calling thread and
/// hand each text fragment to `on_chunk` as it arrives.
pub trait CompletionBackend: Send + Sync {
    fn stream_completion(
        &self,
        request: &CompletionRequest,
        on_chunk: &mut dyn FnMut(&str),
    ) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEventKind {
    ChunkReceived(String),
    StreamFinished(String),
    StreamFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    pub stream_id: u64,
    pub kind: StreamEventKind,
}

#[derive(Debug)]
pub enum StreamError {
    AlreadyStreaming { stream_id: u64 },
    Spawn(std::io::Error),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::AlreadyStreaming { stream_id } => {
                write!(f, "completion stream {stream_id} is still in flight")
            }
            StreamError::Spawn(err) => write!(f, "failed to spawn completion worker: {err}"),
        }
    }
}

impl std::error::Error for StreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StreamError::Spawn(err) => Some(err),
            StreamError::AlreadyStreaming { .. } => None,
        }
    }
}

/// Runs at most one completion request at a time on its own thread and
/// relays its output back as [`StreamEvent`]s.
///
/// The worker receives a frozen copy of the history and communicates only
/// through the event channel. There is no cancellation and no timeout: a
/// backend that never returns keeps its worker thread alive for the rest of
/// the process, and the client stays `Streaming`.
pub struct StreamingClient {
    backend: Arc<dyn CompletionBackend>,
    model: String,
    state: StreamState,
    current: Option<u64>,
    next_id: u64,
    events_tx: Sender<StreamEvent>,
    events_rx: Receiver<StreamEvent>,
}

impl StreamingClient {
    pub fn new(backend: Arc<dyn CompletionBackend>, model: impl Into<String>) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            backend,
            model: model.into(),
            state: StreamState::Idle,
            current: None,
            next_id: 1,
            events_tx,
            events_rx,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn start(&mut self, history: &[ChatMessage]) -> Result<u64, StreamError> {
        if self.state == StreamState::Streaming {
            let stream_id = self.current.unwrap_or_default();
            tracing::warn!(stream_id, "completion start rejected while streaming");
            return Err(StreamError::AlreadyStreaming { stream_id });
        }
        self.state = StreamState::Idle;

        let stream_id = self.next_id;
        let request = CompletionRequest {
            model: self.model.clone(),
            messages: history.to_vec(),
            stream: true,
        };
        let backend = Arc::clone(&self.backend);
        let tx = self.events_tx.clone();

        std::thread::Builder::new()
            .name(format!("completion-{stream_id}"))
            .spawn(move || run_worker(stream_id, backend.as_ref(), &request, &tx))
            .map_err(StreamError::Spawn)?;

        self.next_id += 1;
        self.current = Some(stream_id);
        self.state = StreamState::Streaming;
        tracing::info!(stream_id, messages = history.len(), "completion stream started");
        Ok(stream_id)
    }

    /// Drains every event that has arrived, in order, without blocking.
    pub fn poll(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        loop {
            match self.events_rx.try_recv() {
                Ok(event) => self.accept(event, &mut events),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }
        events
    }

    /// Like [`Self::poll`], but waits up to `timeout` for the first event.
    pub fn poll_timeout(&mut self, timeout: Duration) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        match self.events_rx.recv_timeout(timeout) {
            Ok(event) => self.accept(event, &mut events),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                return events
            }
        }
        events.extend(self.poll());
        events
    }

    fn accept(&mut self, event: StreamEvent, events: &mut Vec<StreamEvent>) {
        if self.current != Some(event.stream_id) {
            tracing::debug!(stream_id = event.stream_id, "dropping event from stale stream");
            return;
        }
        match &event.kind {
            StreamEventKind::ChunkReceived(_) => {}
            StreamEventKind::StreamFinished(text) => {
                self.state = StreamState::Completed;
                tracing::info!(
                    stream_id = event.stream_id,
                    chars = text.chars().count(),
                    "completion stream finished"
                );
            }
            StreamEventKind::StreamFailed(error) => {
                self.state = StreamState::Failed;
                tracing::warn!(stream_id = event.stream_id, %error, "completion stream failed");
            }
        }
        events.push(event);
    }
}

fn run_worker(
    stream_id: u64,
    backend: &dyn CompletionBackend,
    request: &CompletionRequest,
    tx: &Sender<StreamEvent>,
) {
    let send = |kind: StreamEventKind| {
        let _ = tx.send(StreamEvent { stream_id, kind });
    };

    let mut full_text = String::new();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        backend.stream_completion(request, &mut |chunk: &str| {
            if chunk.is_empty() {
                return;
            }
            full_text.push_str(chunk);
            send(StreamEventKind::ChunkReceived(chunk.to_string()));
        })
    }));

    match outcome {
        Ok(Ok(())) => send(StreamEventKind::StreamFinished(full_text)),
        Ok(Err(err)) => send(StreamEventKind::StreamFailed(format!("{err:#}"))),
        Err(payload) => {
            let panic_message = if let Some(message) = payload.downcast_ref::<&str>() {
                (*message).to_string()
            } else if let Some(message) = payload.downcast_ref::<String>() {
                message.clone()
            } else {
                "unknown panic payload".to_string()
            };
            tracing::error!(stream_id, panic_message, "completion worker panicked");
            send(StreamEventKind::StreamFailed(format!(
                "completion worker panicked: {panic_message}"
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::message::ChatMessagePart;
    use anyhow::anyhow;
    use std::sync::Mutex;

    struct Scripted {
        chunks: Vec<&'static str>,
        fail_with: Option<&'static str>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl Scripted {
        fn new(chunks: Vec<&'static str>, fail_with: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                chunks,
                fail_with,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl CompletionBackend for Scripted {
        fn stream_completion(
            &self,
            request: &CompletionRequest,
            on_chunk: &mut dyn FnMut(&str),
        ) -> Result<()> {
            self.seen.lock().expect("seen lock").push(request.clone());
            for chunk in &self.chunks {
                on_chunk(chunk);
            }
            match self.fail_with {
                Some(error) => Err(anyhow!(error)),
                None => Ok(()),
            }
        }
    }

    struct Panicking;

    impl CompletionBackend for Panicking {
        fn stream_completion(&self, _: &CompletionRequest, _: &mut dyn FnMut(&str)) -> Result<()> {
            panic!("backend exploded");
        }
    }

    fn history() -> Vec<ChatMessage> {
        vec![ChatMessage::user(vec![ChatMessagePart::text("hi")])]
    }

    fn drain_until_terminal(client: &mut StreamingClient) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        for _ in 0..200 {
            events.extend(client.poll_timeout(Duration::from_millis(25)));
            if client.state() != StreamState::Streaming {
                break;
            }
        }
        events
    }

    #[test]
    fn chunks_then_single_finish_in_order() {
        let backend = Scripted::new(vec!["Hel", "lo"], None);
        let mut client = StreamingClient::new(backend.clone(), "test-model");
        let id = client.start(&history()).expect("start");

        let kinds: Vec<StreamEventKind> = drain_until_terminal(&mut client)
            .into_iter()
            .map(|event| {
                assert_eq!(event.stream_id, id);
                event.kind
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                StreamEventKind::ChunkReceived("Hel".into()),
                StreamEventKind::ChunkReceived("lo".into()),
                StreamEventKind::StreamFinished("Hello".into()),
            ]
        );
        assert_eq!(client.state(), StreamState::Completed);

        let seen = backend.seen.lock().expect("seen lock");
        assert_eq!(seen[0].model, "test-model");
        assert!(seen[0].stream);
        assert_eq!(seen[0].messages, history());
    }

    #[test]
    fn backend_error_becomes_failed_event() {
        let backend = Scripted::new(vec!["par"], Some("connection reset"));
        let mut client = StreamingClient::new(backend, "m");
        client.start(&history()).expect("start");

        let events = drain_until_terminal(&mut client);
        assert_eq!(client.state(), StreamState::Failed);
        assert_eq!(
            events.last().map(|e| e.kind.clone()),
            Some(StreamEventKind::StreamFailed("connection reset".into()))
        );
    }

    #[test]
    fn worker_panic_is_reported_as_failure() {
        let mut client = StreamingClient::new(Arc::new(Panicking), "m");
        client.start(&history()).expect("start");

        let events = drain_until_terminal(&mut client);
        assert_eq!(client.state(), StreamState::Failed);
        assert!(matches!(
            &events[0].kind,
            StreamEventKind::StreamFailed(msg) if msg.contains("backend exploded")
        ));
    }

    #[test]
    fn second_start_while_streaming_is_rejected() {
        struct Blocking(Mutex<Option<mpsc::Receiver<()>>>);
        impl CompletionBackend for Blocking {
            fn stream_completion(
                &self,
                _: &CompletionRequest,
                _: &mut dyn FnMut(&str),
            ) -> Result<()> {
                let rx = self.0.lock().expect("lock").take();
                if let Some(rx) = rx {
                    let _ = rx.recv();
                }
                Ok(())
            }
        }

        let (release_tx, release_rx) = mpsc::channel();
        let mut client =
            StreamingClient::new(Arc::new(Blocking(Mutex::new(Some(release_rx)))), "m");
        let first = client.start(&history()).expect("start");

        let err = client.start(&history()).expect_err("second start");
        assert!(matches!(err, StreamError::AlreadyStreaming { stream_id } if stream_id == first));

        release_tx.send(()).expect("release");
        drain_until_terminal(&mut client);
        assert_eq!(client.state(), StreamState::Completed);

        let second = client.start(&history()).expect("restart after completion");
        assert_eq!(second, first + 1);
    }

    #[test]
    fn worker_sees_history_frozen_at_start() {
        let backend = Scripted::new(vec!["ok"], None);
        let mut client = StreamingClient::new(backend.clone(), "m");
        let mut live = history();
        client.start(&live).expect("start");
        live.push(ChatMessage::assistant("mutated after start"));

        drain_until_terminal(&mut client);
        assert_eq!(backend.seen.lock().expect("seen lock")[0].messages, history());
    }
}
