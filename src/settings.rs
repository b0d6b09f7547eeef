use crate::annotate::engine::EngineStyle;
use crate::annotate::model::{StrokeStyle, TextStyle};
use crate::annotate::raster::{
    DEFAULT_ARROW_BARB_LENGTH, MAX_ARROW_BARB_LENGTH, MAX_STROKE_WIDTH,
};
use crate::annotate::save::{OutputTarget, DEFAULT_OUTPUT_FILE};
use crate::annotate::text::{MAX_HIT_BOX, MAX_TEXT_SCALE};
use crate::chat::openai::DEFAULT_API_BASE;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SETTINGS_FILE_NAME: &str = "snip_chat_settings.json";

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_output_path() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_FILE)
}

fn default_attach_image() -> bool {
    true
}

fn default_arrow_barb_length() -> u32 {
    DEFAULT_ARROW_BARB_LENGTH
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Unset means completion requests never time out.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,
    /// When set, confirmed images go here with timestamped names instead of
    /// `output_path`.
    #[serde(default)]
    pub export_dir: Option<PathBuf>,
    #[serde(default)]
    pub debug_logging: bool,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    /// Attach the annotated selection to every send.
    #[serde(default = "default_attach_image")]
    pub attach_image: bool,
    #[serde(default)]
    pub pen: StrokeStyle,
    #[serde(default)]
    pub text: TextStyle,
    #[serde(default = "default_arrow_barb_length")]
    pub arrow_barb_length: u32,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_base_url: default_api_base_url(),
            api_key_env: default_api_key_env(),
            request_timeout_secs: None,
            output_path: default_output_path(),
            export_dir: None,
            debug_logging: false,
            log_dir: None,
            attach_image: default_attach_image(),
            pen: StrokeStyle::default(),
            text: TextStyle::default(),
            arrow_barb_length: default_arrow_barb_length(),
            system_prompt: None,
        }
    }
}

impl Settings {
    /// Missing or empty files yield defaults. The result is sanitized.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).unwrap_or_default();
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let mut settings: Self = serde_json::from_str(&content)
            .with_context(|| format!("parse settings {}", path.display()))?;
        if settings.sanitize() {
            tracing::warn!(path = %path.display(), "settings contained out-of-range values");
        }
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("write settings {}", path.display()))?;
        Ok(())
    }

    /// Clamps sizes into `1..=max` for each field. Returns whether anything
    /// changed.
    pub fn sanitize(&mut self) -> bool {
        let mut changed = false;
        for (value, max) in [
            (&mut self.pen.width, MAX_STROKE_WIDTH),
            (&mut self.text.scale, MAX_TEXT_SCALE),
            (&mut self.text.hit_box.0, MAX_HIT_BOX),
            (&mut self.text.hit_box.1, MAX_HIT_BOX),
            (&mut self.arrow_barb_length, MAX_ARROW_BARB_LENGTH),
        ] {
            let clamped = (*value).clamp(1, max);
            if clamped != *value {
                *value = clamped;
                changed = true;
            }
        }
        if self.model.trim().is_empty() {
            self.model = default_model();
            changed = true;
        }
        if self.request_timeout_secs == Some(0) {
            self.request_timeout_secs = None;
            changed = true;
        }
        changed
    }

    pub fn engine_style(&self) -> EngineStyle {
        EngineStyle {
            pen: self.pen,
            text: self.text,
            barb_length: self.arrow_barb_length,
        }
    }

    pub fn output_target(&self) -> OutputTarget {
        match &self.export_dir {
            Some(dir) => OutputTarget::Folder(dir.clone()),
            None => OutputTarget::Fixed(self.output_path.clone()),
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok()
    }
}

pub fn settings_path_from_exe_path(exe_path: &Path) -> Result<PathBuf> {
    let parent = exe_path
        .parent()
        .ok_or_else(|| anyhow!("executable path has no parent: {}", exe_path.display()))?;
    Ok(parent.join(SETTINGS_FILE_NAME))
}

pub fn resolve_settings_path() -> Result<PathBuf> {
    let exe_path = std::env::current_exe().context("resolve current executable")?;
    settings_path_from_exe_path(&exe_path)
}
