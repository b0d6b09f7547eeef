use crate::annotate::compositor::encode_png;
use crate::annotate::engine::TextEntry;
use crate::annotate::model::{Mode, Point};
use crate::chat::session::LogEntry;
use crate::runtime::{PointerOutcome, ScreenChat, SendOutcome};
use anyhow::Context;
use std::fmt;
use std::path::PathBuf;

/// One line typed into the terminal driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Down(Point),
    Move(Point),
    Up,
    Drag { from: Point, to: Point },
    Mode(Mode),
    /// Preloads the answer for the next text-entry request.
    Text(String),
    Undo,
    Restart,
    Say(String),
    Send,
    Preview(PathBuf),
    Confirm(Option<PathBuf>),
    History,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError(String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ParseError {}

pub const HELP: &str = "\
down X Y | move X Y | up | drag X1 Y1 X2 Y2
mode freestyle|rect|arrow|text | text MESSAGE | undo | restart
say MESSAGE | send | preview PATH | confirm [PATH] | history | help | quit";

fn point(args: &[&str]) -> Result<Point, ParseError> {
    match args {
        [x, y] => {
            let x = x
                .parse()
                .map_err(|_| ParseError(format!("invalid x coordinate '{x}'")))?;
            let y = y
                .parse()
                .map_err(|_| ParseError(format!("invalid y coordinate '{y}'")))?;
            Ok((x, y))
        }
        _ => Err(ParseError("expected two integer coordinates".into())),
    }
}

fn rest<'a>(line: &'a str, keyword: &str) -> &'a str {
    line[keyword.len()..].trim()
}

/// Returns `Ok(None)` for blank lines.
pub fn parse(line: &str) -> Result<Option<Command>, ParseError> {
    let line = line.trim();
    let mut words = line.split_whitespace();
    let Some(keyword) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let command = match keyword.to_ascii_lowercase().as_str() {
        "down" => Command::Down(point(&args)?),
        "move" => Command::Move(point(&args)?),
        "up" => Command::Up,
        "drag" => {
            if args.len() != 4 {
                return Err(ParseError("drag takes four coordinates".into()));
            }
            Command::Drag {
                from: point(&args[..2])?,
                to: point(&args[2..])?,
            }
        }
        "mode" => {
            let name = args
                .first()
                .ok_or_else(|| ParseError("mode needs a name".into()))?;
            Command::Mode(
                Mode::parse(name).ok_or_else(|| ParseError(format!("unknown mode '{name}'")))?,
            )
        }
        "text" => Command::Text(rest(line, keyword).to_string()),
        "undo" => Command::Undo,
        "restart" | "redo" => Command::Restart,
        "say" => {
            let message = rest(line, keyword);
            if message.is_empty() {
                return Err(ParseError("say needs a message".into()));
            }
            Command::Say(message.to_string())
        }
        "send" => Command::Send,
        "preview" => {
            let path = rest(line, keyword);
            if path.is_empty() {
                return Err(ParseError("preview needs a path".into()));
            }
            Command::Preview(PathBuf::from(path))
        }
        "confirm" => {
            let path = rest(line, keyword);
            Command::Confirm((!path.is_empty()).then(|| PathBuf::from(path)))
        }
        "history" => Command::History,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(ParseError(format!("unknown command '{other}'"))),
    };
    Ok(Some(command))
}

/// Answers text-entry requests with whatever `text <message>` queued last.
#[derive(Debug, Default)]
pub struct QueuedTextEntry {
    next: Option<String>,
}

impl QueuedTextEntry {
    pub fn queue(&mut self, text: String) {
        self.next = Some(text);
    }
}

impl TextEntry for QueuedTextEntry {
    fn request_text(&mut self) -> (String, bool) {
        match self.next.take() {
            Some(text) => (text, true),
            None => {
                tracing::info!("text entry requested with no label queued");
                (String::new(), false)
            }
        }
    }
}

/// Why a command did not complete.
#[derive(Debug)]
pub enum CommandError {
    /// The session cannot continue; the driver returns this from `main`.
    Fatal(anyhow::Error),
    /// Reported to the user; the session carries on.
    Rejected(anyhow::Error),
}

impl CommandError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, CommandError::Fatal(_))
    }

    pub fn into_inner(self) -> anyhow::Error {
        match self {
            CommandError::Fatal(err) | CommandError::Rejected(err) => err,
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Fatal(err) => write!(f, "fatal: {err:#}"),
            CommandError::Rejected(err) => write!(f, "{err:#}"),
        }
    }
}

impl std::error::Error for CommandError {}

fn rejected(err: impl Into<anyhow::Error>) -> CommandError {
    CommandError::Rejected(err.into())
}

/// Runs one command against the session and returns the lines to show.
/// Export failures are fatal; everything else is rejected and recoverable.
pub fn execute(
    app: &mut ScreenChat,
    text_entry: &mut QueuedTextEntry,
    command: Command,
) -> Result<Vec<String>, CommandError> {
    let mut out = Vec::new();
    match command {
        Command::Down(point) => {
            let outcome = app.pointer_down(point, text_entry).map_err(rejected)?;
            out.extend(describe(outcome));
        }
        Command::Move(point) => {
            app.pointer_move(point).map_err(rejected)?;
        }
        Command::Up => out.extend(describe(app.pointer_up().map_err(rejected)?)),
        Command::Drag { from, to } => {
            app.pointer_down(from, text_entry).map_err(rejected)?;
            app.pointer_move(to).map_err(rejected)?;
            out.extend(describe(app.pointer_up().map_err(rejected)?));
        }
        Command::Mode(mode) => {
            app.set_mode(mode);
            out.push(format!("mode: {}", mode.name()));
        }
        Command::Text(text) => text_entry.queue(text),
        Command::Undo => {
            if !app.undo() {
                out.push("nothing to undo".into());
            }
        }
        Command::Restart => {
            app.restart().map_err(rejected)?;
            out.push("selection cleared; drag to select a new region".into());
        }
        Command::Say(message) => out.push(sent(app.send(Some(&message)).map_err(rejected)?)),
        Command::Send => out.push(sent(app.send(None).map_err(rejected)?)),
        Command::Preview(path) => {
            let png = encode_png(&app.frame()).map_err(rejected)?;
            std::fs::write(&path, png)
                .with_context(|| format!("write preview {}", path.display()))
                .map_err(rejected)?;
            out.push(format!("preview written to {}", path.display()));
        }
        Command::Confirm(path) => {
            let written = app
                .confirm(path.as_deref())
                .map_err(CommandError::Fatal)?;
            out.push(format!("saved {}", written.display()));
        }
        Command::History => {
            for entry in app.session().log() {
                out.push(match entry {
                    LogEntry::User { text, images } => format!("you: {text} [{images} image(s)]"),
                    LogEntry::Assistant { text, streaming } => {
                        let marker = if *streaming { " ..." } else { "" };
                        format!("assistant: {text}{marker}")
                    }
                    LogEntry::Error { message } => format!("error: {message}"),
                    LogEntry::Notice { message } => format!("note: {message}"),
                });
            }
        }
        Command::Help => out.push(HELP.to_string()),
        Command::Quit => {}
    }
    Ok(out)
}

fn describe(outcome: PointerOutcome) -> Option<String> {
    match outcome {
        PointerOutcome::SelectionConfirmed(rect) => Some(format!(
            "selected {}x{} at ({}, {}); annotate, then `say` or `confirm`",
            rect.width(),
            rect.height(),
            rect.left,
            rect.top
        )),
        PointerOutcome::SelectionDiscarded => Some("empty selection; drag again".into()),
        other => {
            tracing::debug!(?other, "pointer event handled");
            None
        }
    }
}

fn sent(outcome: SendOutcome) -> String {
    match outcome {
        SendOutcome::Started { .. } => "assistant:".into(),
        SendOutcome::Queued => "queued until the current reply finishes".into(),
        SendOutcome::Empty => "nothing to send".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_commands() {
        assert_eq!(parse("down 10 -4"), Ok(Some(Command::Down((10, -4)))));
        assert_eq!(parse("  MOVE 3 4 "), Ok(Some(Command::Move((3, 4)))));
        assert_eq!(parse("up"), Ok(Some(Command::Up)));
        assert_eq!(
            parse("drag 0 0 50 60"),
            Ok(Some(Command::Drag {
                from: (0, 0),
                to: (50, 60)
            }))
        );
    }

    #[test]
    fn message_commands_keep_inner_spacing() {
        assert_eq!(
            parse("say what  is this?"),
            Ok(Some(Command::Say("what  is this?".into())))
        );
        assert_eq!(parse("text label"), Ok(Some(Command::Text("label".into()))));
        assert_eq!(parse("text"), Ok(Some(Command::Text(String::new()))));
    }

    #[test]
    fn confirm_path_is_optional() {
        assert_eq!(parse("confirm"), Ok(Some(Command::Confirm(None))));
        assert_eq!(
            parse("confirm out/shot.png"),
            Ok(Some(Command::Confirm(Some(PathBuf::from("out/shot.png")))))
        );
    }

    #[test]
    fn modes_and_aliases() {
        assert_eq!(parse("mode rect"), Ok(Some(Command::Mode(Mode::Rectangle))));
        assert_eq!(parse("redo"), Ok(Some(Command::Restart)));
        assert!(parse("mode circle").is_err());
    }

    #[test]
    fn bad_input_is_rejected() {
        assert_eq!(parse("   "), Ok(None));
        assert!(parse("down 1").is_err());
        assert!(parse("down a b").is_err());
        assert!(parse("drag 1 2 3").is_err());
        assert!(parse("say").is_err());
        assert!(parse("fly").is_err());
    }
    struct Silent;

    impl crate::chat::stream::CompletionBackend for Silent {
        fn stream_completion(
            &self,
            _: &crate::chat::stream::CompletionRequest,
            _: &mut dyn FnMut(&str),
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn selected_session() -> (ScreenChat, QueuedTextEntry) {
        let capture = crate::annotate::model::RgbaBuffer::new(
            64,
            64,
            crate::annotate::model::Color::BLACK,
        );
        let mut app = ScreenChat::new(
            capture,
            std::sync::Arc::new(Silent),
            &crate::settings::Settings::default(),
        );
        let mut entry = QueuedTextEntry::default();
        execute(
            &mut app,
            &mut entry,
            Command::Drag {
                from: (4, 4),
                to: (40, 30),
            },
        )
        .expect("select region");
        (app, entry)
    }

    #[test]
    fn failed_export_is_fatal() {
        let (mut app, mut entry) = selected_session();
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("no").join("such").join("out.png");

        let err = execute(&mut app, &mut entry, Command::Confirm(Some(missing)))
            .expect_err("export into a missing folder");
        assert!(err.is_fatal());
        assert!(format!("{:#}", err.into_inner()).contains("out.png"));
    }

    #[test]
    fn successful_export_reports_the_path() {
        let (mut app, mut entry) = selected_session();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.png");

        let lines = execute(&mut app, &mut entry, Command::Confirm(Some(path.clone())))
            .expect("export");
        assert_eq!(lines, vec![format!("saved {}", path.display())]);
        assert!(path.exists());
    }

    #[test]
    fn invalid_transitions_are_recoverable() {
        let (mut app, mut entry) = selected_session();
        execute(&mut app, &mut entry, Command::Restart).expect("restart");

        let err = execute(&mut app, &mut entry, Command::Restart).expect_err("second restart");
        assert!(!err.is_fatal());
        let err = execute(&mut app, &mut entry, Command::Up).expect_err("up while idle");
        assert!(!err.is_fatal());
    }

    #[test]
    fn queued_label_is_used_once() {
        let (mut app, mut entry) = selected_session();
        execute(&mut app, &mut entry, Command::Mode(Mode::Text)).expect("mode");
        execute(&mut app, &mut entry, Command::Text("hi".into())).expect("queue");
        execute(&mut app, &mut entry, Command::Down((5, 5))).expect("add label");
        execute(&mut app, &mut entry, Command::Up).expect("release");
        execute(&mut app, &mut entry, Command::Down((30, 60))).expect("no label queued");

        let labels = app.surface().expect("surface").engine().text_items().len();
        assert_eq!(labels, 1);
    }
}
