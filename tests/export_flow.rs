use anyhow::Result;
use snip_chat::annotate::compositor::decode_png;
use snip_chat::annotate::model::{Color, Mode, RgbaBuffer};
use snip_chat::chat::stream::{CompletionBackend, CompletionRequest};
use snip_chat::runtime::ScreenChat;
use snip_chat::settings::Settings;
use std::sync::Arc;

struct Silent;

impl CompletionBackend for Silent {
    fn stream_completion(&self, _: &CompletionRequest, _: &mut dyn FnMut(&str)) -> Result<()> {
        Ok(())
    }
}

fn selected(settings: &Settings, capture: RgbaBuffer) -> Result<ScreenChat> {
    let mut app = ScreenChat::new(capture, Arc::new(Silent), settings);
    let mut entry = || -> (String, bool) { (String::new(), false) };
    app.pointer_down((10, 10), &mut entry)?;
    app.pointer_move((50, 40))?;
    app.pointer_up()?;
    Ok(app)
}

#[test]
fn confirm_writes_opaque_png_of_the_region() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("out.png");
    let capture = RgbaBuffer::new(100, 80, Color::rgba(0, 0, 255, 0));
    let mut app = selected(&Settings::default(), capture)?;

    app.set_mode(Mode::Rectangle);
    let mut entry = || -> (String, bool) { (String::new(), false) };
    app.pointer_down((15, 15), &mut entry)?;
    app.pointer_move((30, 30))?;
    app.pointer_up()?;

    assert_eq!(app.confirm(Some(path.as_path()))?, path);
    let written = decode_png(&std::fs::read(&path)?)?;
    assert_eq!((written.width, written.height), (40, 30));
    assert!(written.pixels.chunks_exact(4).all(|px| px[3] == 255));
    assert_eq!(written.pixel(0, 0), Color::WHITE);
    assert_ne!(written.pixel(5, 5), Color::WHITE);
    Ok(())
}

#[test]
fn export_folder_gets_timestamped_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let exports = dir.path().join("exports");
    let settings = Settings {
        export_dir: Some(exports.clone()),
        ..Settings::default()
    };
    let app = selected(&settings, RgbaBuffer::new(64, 64, Color::BLACK))?;

    let written = app.confirm(None)?;
    assert!(written.starts_with(&exports));
    let name = written
        .file_name()
        .and_then(|name| name.to_str())
        .expect("file name");
    assert!(name.ends_with("_selection.png"));
    assert!(written.exists());
    Ok(())
}

#[test]
fn unwritable_destination_is_reported() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let app = selected(&Settings::default(), RgbaBuffer::new(64, 64, Color::BLACK))?;
    let missing = dir.path().join("no").join("such").join("dir.png");

    let err = app.confirm(Some(missing.as_path())).expect_err("write should fail");
    assert!(format!("{err:#}").contains("dir.png"));
    Ok(())
}

#[test]
fn non_png_extension_still_writes_png() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("shot.jpg");
    let app = selected(&Settings::default(), RgbaBuffer::new(64, 64, Color::BLACK))?;

    app.confirm(Some(path.as_path()))?;
    let bytes = std::fs::read(&path)?;
    assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    Ok(())
}
