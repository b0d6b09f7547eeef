pub mod message;
pub mod openai;
pub mod session;
pub mod stream;

pub use message::{ChatMessage, ChatMessagePart, ImagePart, Role};
pub use session::{ChatSession, LogEntry, TurnOutcome};
pub use stream::{
    CompletionBackend, CompletionRequest, StreamError, StreamEvent, StreamEventKind, StreamState,
    StreamingClient,
};
