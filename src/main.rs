use anyhow::{bail, Context, Result};
use snip_chat::annotate::capture::{FileCapture, PrimaryDisplayCapture, ScreenCapture};
use snip_chat::chat::openai::OpenAiBackend;
use snip_chat::chat::stream::{StreamEventKind, StreamState};
use snip_chat::commands::{self, Command, CommandError, QueuedTextEntry};
use snip_chat::runtime::ScreenChat;
use snip_chat::settings::{resolve_settings_path, Settings};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

const IDLE_POLL: Duration = Duration::from_millis(50);

struct Args {
    settings_path: Option<PathBuf>,
    image: Option<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        settings_path: None,
        image: None,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--image" => {
                let path = iter.next().context("--image needs a path")?;
                args.image = Some(PathBuf::from(path));
            }
            other if other.starts_with("--") => bail!("unknown flag {other}"),
            other => args.settings_path = Some(PathBuf::from(other)),
        }
    }
    Ok(args)
}

fn main() -> Result<()> {
    let args = parse_args()?;
    let settings_path = match args.settings_path {
        Some(path) => path,
        None => resolve_settings_path()?,
    };
    let settings = Settings::load(&settings_path)?;
    let _log_guard =
        snip_chat::logging::init(settings.debug_logging, settings.log_dir.as_deref());
    tracing::info!(path = %settings_path.display(), model = %settings.model, "settings loaded");

    let capture = match args.image {
        Some(path) => FileCapture { path }.capture()?,
        None => PrimaryDisplayCapture.capture()?,
    };
    let backend = OpenAiBackend::new(
        &settings.api_base_url,
        settings.api_key(),
        settings.request_timeout(),
        settings.system_prompt.clone(),
    )?;
    let mut app = ScreenChat::new(capture, Arc::new(backend), &settings);

    let (line_tx, line_rx) = mpsc::channel::<String>();
    std::thread::Builder::new()
        .name("stdin-reader".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if line_tx.send(line).is_err() {
                    break;
                }
            }
        })
        .context("spawn stdin reader")?;

    println!(
        "captured {}x{}; drag to select a region. Type `help` for commands.",
        app.capture().width,
        app.capture().height
    );
    let mut text_entry = QueuedTextEntry::default();

    loop {
        print_events(&mut app)?;
        match line_rx.recv_timeout(IDLE_POLL) {
            Ok(line) => match commands::parse(&line) {
                Ok(Some(Command::Quit)) => break,
                Ok(Some(command)) => match commands::execute(&mut app, &mut text_entry, command) {
                    Ok(lines) => lines.iter().for_each(|line| println!("{line}")),
                    Err(CommandError::Fatal(err)) => {
                        tracing::error!(error = %format!("{err:#}"), "session ended by fatal command error");
                        return Err(err);
                    }
                    Err(CommandError::Rejected(err)) => {
                        tracing::warn!(error = %format!("{err:#}"), "command failed");
                        println!("error: {err:#}");
                    }
                },
                Ok(None) => {}
                Err(err) => println!("error: {err}"),
            },
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    if app.stream_state() == StreamState::Streaming {
        tracing::info!("exiting with a reply still streaming");
    }
    Ok(())
}

fn print_events(app: &mut ScreenChat) -> Result<()> {
    for event in app.tick()? {
        match event.kind {
            StreamEventKind::ChunkReceived(chunk) => {
                print!("{chunk}");
                let _ = std::io::stdout().flush();
            }
            StreamEventKind::StreamFinished(_) => println!(),
            StreamEventKind::StreamFailed(error) => println!("\n[reply failed: {error}]"),
        }
    }
    Ok(())
}
