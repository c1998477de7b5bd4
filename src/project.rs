//! Project configuration.
//!
//! Settings are plain JSON on disk. Scene scripts are code, so a [`Project`] pairs loaded
//! [`ProjectSettings`] with scene descriptions built by the embedding program.

use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::foundation::core::{Fps, FrameIndex, Rgba8Premul};
use crate::foundation::error::{WavyteError, WavyteResult};
use crate::render::stage::StageSettings;
use crate::render::surface::ColorSpace;
use crate::scene::scene::{SceneDescription, SceneSettings};

/// Exporter selection for a batch render.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ExporterSettings {
    /// Registered exporter id.
    pub name: String,
    /// Exporter-specific options, interpreted by the exporter factory.
    pub options: serde_json::Value,
}

impl Default for ExporterSettings {
    fn default() -> Self {
        Self {
            name: "image-sequence".to_owned(),
            options: serde_json::Value::Object(serde_json::Map::new()),
        }
    }
}

/// Parameters of one batch render.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Output name, used by exporters to derive file names.
    pub name: String,
    /// Time range in seconds; `None` renders the whole timeline.
    pub range: Option<[f64; 2]>,
    /// Export frame rate.
    pub fps: Fps,
    /// Export resolution scale.
    pub resolution_scale: f64,
    /// Export colour space.
    pub color_space: ColorSpace,
    /// Export background; `None` keeps the stage background.
    pub background: Option<Rgba8Premul>,
    /// Exporter to hand frames to.
    pub exporter: ExporterSettings,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            name: "project".to_owned(),
            range: None,
            fps: Fps::default(),
            resolution_scale: 1.0,
            color_space: ColorSpace::Srgb,
            background: None,
            exporter: ExporterSettings::default(),
        }
    }
}

impl RenderSettings {
    /// Reject settings no render can run with.
    pub fn validate(&self) -> WavyteResult<()> {
        validate_fps(self.fps, "rendering.fps")?;
        validate_scale(self.resolution_scale, "rendering.resolution_scale")?;
        validate_range(self.range, "rendering.range")?;
        if self.exporter.name.is_empty() {
            return Err(WavyteError::validation("rendering.exporter.name must be set"));
        }
        Ok(())
    }

    /// Inclusive frame range `[from, to]` to export, clamped to a timeline of `duration` frames.
    pub fn frame_range(&self, duration: u64) -> (FrameIndex, FrameIndex) {
        seconds_to_frames(self.range, self.fps, duration)
    }

    /// Stage settings for the export, derived from the project stage.
    pub fn stage_settings(&self, base: &StageSettings) -> StageSettings {
        StageSettings {
            size: base.size,
            resolution_scale: self.resolution_scale,
            color_space: self.color_space,
            background: self.background.or(base.background),
        }
    }
}

/// Settings of the interactive preview.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PreviewSettings {
    /// Preview frame rate.
    pub fps: Fps,
    /// Preview resolution scale.
    pub resolution_scale: f64,
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self {
            fps: Fps::default(),
            resolution_scale: 1.0,
        }
    }
}

/// Initial state of the interactive player.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PlayerSettings {
    /// Restart at the range start instead of pausing at its end.
    #[serde(rename = "loop")]
    pub looping: bool,
    /// Start with audio muted.
    pub muted: bool,
    /// Playback speed multiplier.
    pub speed: f64,
    /// Scrub range in seconds; `None` is the whole timeline.
    pub range: Option<[f64; 2]>,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            looping: true,
            muted: false,
            speed: 1.0,
            range: None,
        }
    }
}

/// Everything about a project that lives on disk.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ProjectSettings {
    /// Random seed shared by every scene.
    pub seed: u64,
    /// Logical stage.
    pub stage: StageSettings,
    /// Batch render parameters.
    pub rendering: RenderSettings,
    /// Interactive preview parameters.
    pub preview: PreviewSettings,
    /// Initial player state.
    pub player: PlayerSettings,
}

impl ProjectSettings {
    /// Parse settings from a JSON string.
    pub fn from_json_str(s: &str) -> WavyteResult<Self> {
        let settings: Self = serde_json::from_str(s)?;
        Ok(settings)
    }

    /// Parse settings from a JSON reader.
    pub fn from_reader<R: std::io::Read>(r: R) -> WavyteResult<Self> {
        let settings: Self = serde_json::from_reader(r)?;
        Ok(settings)
    }

    /// Parse settings from a JSON file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> WavyteResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            WavyteError::validation(format!("open project settings '{}': {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(f))
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json_string(&self) -> WavyteResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every section.
    pub fn validate(&self) -> WavyteResult<()> {
        self.stage.validate()?;
        self.rendering.validate()?;
        validate_fps(self.preview.fps, "preview.fps")?;
        validate_scale(self.preview.resolution_scale, "preview.resolution_scale")?;
        if !self.player.speed.is_finite() || self.player.speed <= 0.0 {
            return Err(WavyteError::validation("player.speed must be finite and > 0"));
        }
        validate_range(self.player.range, "player.range")
    }

    /// Scene settings for the interactive preview.
    pub fn preview_scene_settings(&self) -> SceneSettings {
        SceneSettings {
            size: self.stage.size,
            resolution_scale: self.preview.resolution_scale,
            fps: self.preview.fps,
            seed: self.seed,
            ..SceneSettings::default()
        }
    }

    /// Scene settings for a batch render with `render`.
    pub fn render_scene_settings(&self, render: &RenderSettings) -> SceneSettings {
        SceneSettings {
            size: self.stage.size,
            resolution_scale: render.resolution_scale,
            fps: render.fps,
            seed: self.seed,
            ..SceneSettings::default()
        }
    }
}

/// Settings plus the scenes that make up the timeline.
#[derive(Clone, Debug)]
pub struct Project {
    /// Project name.
    pub name: String,
    /// On-disk settings.
    pub settings: ProjectSettings,
    /// Scenes in timeline order.
    pub scenes: Vec<SceneDescription>,
}

impl Project {
    /// Assemble a project and validate it.
    pub fn new(
        name: impl Into<String>,
        settings: ProjectSettings,
        scenes: Vec<SceneDescription>,
    ) -> WavyteResult<Self> {
        let project = Self {
            name: name.into(),
            settings,
            scenes,
        };
        project.validate()?;
        Ok(project)
    }

    /// Settings must be valid and scene names unique.
    pub fn validate(&self) -> WavyteResult<()> {
        self.settings.validate()?;
        if self.scenes.is_empty() {
            return Err(WavyteError::validation("project has no scenes"));
        }
        let mut seen = HashSet::new();
        for s in &self.scenes {
            if !seen.insert(s.name.as_str()) {
                return Err(WavyteError::validation(format!(
                    "duplicate scene name '{}'",
                    s.name
                )));
            }
        }
        Ok(())
    }
}

pub(crate) fn seconds_to_frames(
    range: Option<[f64; 2]>,
    fps: Fps,
    duration: u64,
) -> (FrameIndex, FrameIndex) {
    match range {
        Some([from, to]) => (
            FrameIndex(fps.secs_to_frames_round(from).min(duration)),
            FrameIndex(fps.secs_to_frames_round(to).min(duration)),
        ),
        None => (FrameIndex(0), FrameIndex(duration)),
    }
}

pub(crate) fn validate_range(range: Option<[f64; 2]>, what: &str) -> WavyteResult<()> {
    let Some([from, to]) = range else {
        return Ok(());
    };
    if !from.is_finite() || !to.is_finite() || from < 0.0 || from > to {
        return Err(WavyteError::validation(format!(
            "{what} must satisfy 0 <= start <= end, got [{from}, {to}]"
        )));
    }
    Ok(())
}

fn validate_fps(fps: Fps, what: &str) -> WavyteResult<()> {
    Fps::new(fps.num, fps.den)
        .map(|_| ())
        .map_err(|e| WavyteError::validation(format!("{what}: {e}")))
}

fn validate_scale(scale: f64, what: &str) -> WavyteResult<()> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(WavyteError::validation(format!(
            "{what} must be finite and > 0"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "../tests/unit/project.rs"]
mod tests;
