use anyhow::{Context, Result};
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_OUTPUT_FILE: &str = "selection_edited.png";

/// Where the confirmed annotation should be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// Always this exact path.
    Fixed(PathBuf),
    /// A timestamped file inside this folder.
    Folder(PathBuf),
}

impl Default for OutputTarget {
    fn default() -> Self {
        Self::Fixed(PathBuf::from(DEFAULT_OUTPUT_FILE))
    }
}

pub fn timestamped_stem(now: chrono::DateTime<Local>) -> String {
    now.format("%Y%m%d_%H%M%S").to_string()
}

pub fn build_filename(stem: &str) -> String {
    format!("{}_selection.png", stem)
}

pub fn resolve_output_path(target: &OutputTarget, now: chrono::DateTime<Local>) -> PathBuf {
    match target {
        OutputTarget::Fixed(path) => path.clone(),
        OutputTarget::Folder(dir) => dir.join(build_filename(&timestamped_stem(now))),
    }
}

/// Creates the folder a timestamped export goes into. Fixed paths are left
/// alone so a bad path surfaces as a write failure.
pub fn ensure_output_folder(target: &OutputTarget) -> Result<()> {
    if let OutputTarget::Folder(dir) = target {
        fs::create_dir_all(dir)
            .with_context(|| format!("create export folder {}", dir.display()))?;
    }
    Ok(())
}

pub fn is_png_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> chrono::DateTime<Local> {
        Local
            .with_ymd_and_hms(2026, 1, 2, 3, 4, 5)
            .single()
            .expect("date time")
    }

    #[test]
    fn default_target_is_selection_edited_png() {
        assert_eq!(
            resolve_output_path(&OutputTarget::default(), fixed_time()),
            PathBuf::from("selection_edited.png")
        );
    }

    #[test]
    fn folder_target_uses_timestamped_name() {
        let target = OutputTarget::Folder(PathBuf::from("/tmp/exports"));
        let path = resolve_output_path(&target, fixed_time());
        assert!(path.ends_with("20260102_030405_selection.png"));
        assert!(path.starts_with("/tmp/exports"));
    }

    #[test]
    fn folder_target_is_created() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("a").join("b");
        ensure_output_folder(&OutputTarget::Folder(nested.clone())).expect("create");
        assert!(nested.is_dir());
    }

    #[test]
    fn png_extension_check_is_case_insensitive() {
        assert!(is_png_path(Path::new("shot.PNG")));
        assert!(!is_png_path(Path::new("shot.jpg")));
        assert!(!is_png_path(Path::new("shot")));
    }
}
