use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::foundation::core::{Canvas, Fps, FrameIndex};
use crate::foundation::error::{WavyteError, WavyteResult};
use crate::render::surface::Surface;
use crate::scene::context::{SceneContext, SceneRun, Slide};
use crate::scene::script::{Deferred, Resume, Script, ScriptFactory, Step, Yielded};
use crate::scene::transition::{SceneState, Transition};
use crate::scene::view::{DrawContext, ResourceCache, View};

/// Upper bound on draw attempts per frame while resources are still resolving.
pub const MAX_RENDER_ATTEMPTS: usize = 10;

/// Per-scene configuration. Changing any field invalidates the duration cache.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SceneSettings {
    /// Logical size.
    pub size: Canvas,
    /// Logical-to-physical scale factor.
    pub resolution_scale: f64,
    /// Frame rate the scene is timed with.
    pub fps: Fps,
    /// Random seed; fixed per project so renders are reproducible.
    pub seed: u64,
    /// Recalculation gives up on scripts that run longer than this many frames.
    pub max_frames: u64,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            size: Canvas::default(),
            resolution_scale: 1.0,
            fps: Fps::default(),
            seed: 0,
            max_frames: 216_000,
        }
    }
}

/// Static information handed to script factories and scripts.
#[derive(Clone, Debug, PartialEq)]
pub struct SceneInfo {
    /// Scene name, unique within a project.
    pub name: String,
    /// Logical size.
    pub size: Canvas,
    /// Logical-to-physical scale factor.
    pub resolution_scale: f64,
    /// Frame rate.
    pub fps: Fps,
    /// Random seed.
    pub seed: u64,
}

/// A named script factory; each driver instantiates its own [`Scene`] from it.
#[derive(Clone)]
pub struct SceneDescription {
    /// Scene name.
    pub name: String,
    /// Script factory.
    pub factory: Arc<dyn ScriptFactory>,
}

impl SceneDescription {
    /// Describe a scene.
    pub fn new(name: impl Into<String>, factory: Arc<dyn ScriptFactory>) -> Self {
        Self {
            name: name.into(),
            factory,
        }
    }
}

impl fmt::Debug for SceneDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneDescription")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Timeline placement discovered by recalculation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SceneCache {
    /// First global frame of the scene.
    pub first_frame: FrameIndex,
    /// Global frame at which the scene can hand off to its successor.
    pub last_frame: FrameIndex,
    /// `last_frame - first_frame`.
    pub duration: u64,
    /// Frames spent transitioning in.
    pub transition_duration: u64,
}

/// One author-scripted segment of the timeline.
pub struct Scene {
    info: SceneInfo,
    factory: Arc<dyn ScriptFactory>,
    max_frames: u64,

    run: SceneRun,
    stack: Vec<Box<dyn Script>>,

    cache: SceneCache,
    cached: bool,
    slides: Vec<Slide>,

    resources: ResourceCache,
    resets: u64,
}

impl Scene {
    /// Instantiate a scene. It stays inert until the first [`Scene::reset`].
    pub fn new(desc: &SceneDescription, settings: &SceneSettings) -> Self {
        let info = SceneInfo {
            name: desc.name.clone(),
            size: settings.size,
            resolution_scale: settings.resolution_scale,
            fps: settings.fps,
            seed: settings.seed,
        };
        Self {
            run: SceneRun::new(info.seed, FrameIndex(0), None),
            info,
            factory: desc.factory.clone(),
            max_frames: settings.max_frames,
            stack: Vec::new(),
            cache: SceneCache::default(),
            cached: false,
            slides: Vec::new(),
            resources: ResourceCache::default(),
            resets: 0,
        }
    }

    /// Scene name.
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Static scene information.
    pub fn info(&self) -> &SceneInfo {
        &self.info
    }

    /// Start a fresh script run whose first frame is `frame`, then execute its first step.
    pub fn reset(&mut self, frame: FrameIndex, previous: Option<&str>) -> WavyteResult<()> {
        self.run = SceneRun::new(self.info.seed, frame, previous.map(str::to_owned));
        self.stack.clear();
        self.stack.push(self.factory.create(&self.info)?);
        self.resets += 1;
        self.step(Resume::Start)
    }

    /// Advance the script by exactly one frame. No-op once the script completed.
    pub fn next(&mut self) -> WavyteResult<()> {
        if self.stack.is_empty() {
            return Ok(());
        }
        self.run.frame = self.run.frame.next();
        self.step(Resume::Next)
    }

    fn step(&mut self, input: Resume) -> WavyteResult<()> {
        let mut input = input;
        loop {
            let Some(top) = self.stack.last_mut() else {
                self.run.state = SceneState::Finished;
                return Ok(());
            };
            let mut cx = SceneContext::new(&self.info, &mut self.run);
            match top.resume(&mut cx, input)? {
                Step::Yield(Yielded::Frame) => return Ok(()),
                Step::Yield(Yielded::Deferred(d)) => {
                    input = resolve_for_script(&self.info.name, d);
                }
                Step::Yield(Yielded::Nested(child)) => {
                    self.stack.push(child);
                    input = Resume::Start;
                }
                Step::Yield(Yielded::Value(v)) => {
                    warn!(scene = %self.info.name, value = %v, "invalid value yielded by the scene");
                    input = Resume::Value(v);
                }
                Step::Complete => {
                    self.stack.pop();
                    if self.stack.is_empty() {
                        self.run.state = SceneState::Finished;
                        return Ok(());
                    }
                    input = Resume::Completed;
                }
            }
        }
    }

    /// Draw the current content, retrying while resources resolve.
    pub fn render(&mut self, surface: &mut Surface) -> WavyteResult<()> {
        let scale = surface.resolution_scale();
        for attempt in 1..=MAX_RENDER_ATTEMPTS {
            surface.clear();
            let pending = {
                let mut dcx = DrawContext::new(scale, self.run.frame, &self.resources);
                self.run.view.draw(surface, &mut dcx)?;
                dcx.into_pending()
            };
            if pending.is_empty() {
                if attempt > 1 {
                    debug!(scene = %self.info.name, attempts = attempt, "render iterations");
                }
                return Ok(());
            }
            if attempt == MAX_RENDER_ATTEMPTS {
                warn!(
                    scene = %self.info.name,
                    frame = self.run.frame.0,
                    pending = pending.len(),
                    "resources still pending after {MAX_RENDER_ATTEMPTS} render attempts"
                );
                return Ok(());
            }
            for (key, d) in pending {
                match d.resolve() {
                    Ok(v) => self.resources.insert(key, v),
                    Err(e) => {
                        warn!(scene = %self.info.name, resource = %key, error = %e, "resource failed to resolve");
                        self.resources.mark_failed(key);
                    }
                }
            }
        }
        Ok(())
    }

    /// Discover the scene's length by a dry run starting at `start`.
    ///
    /// `set_frame` receives every global frame the dry run moves to. A cached scene is only
    /// re-anchored at `start`; its script is not executed again.
    #[tracing::instrument(skip(self, set_frame), fields(scene = %self.info.name))]
    pub fn recalculate(
        &mut self,
        start: FrameIndex,
        set_frame: &mut dyn FnMut(FrameIndex),
    ) -> WavyteResult<()> {
        if self.cached {
            self.cache.first_frame = start;
            self.cache.last_frame = FrameIndex(start.0 + self.cache.duration);
            set_frame(self.cache.last_frame);
            return Ok(());
        }

        let mut transition_duration: Option<u64> = None;
        self.reset(start, None)?;
        while !self.can_transition_out() {
            if transition_duration.is_none() && self.run.state == SceneState::AfterTransitionIn {
                transition_duration = Some(self.run.frame.0 - start.0);
            }
            if self.run.local_frame() >= self.max_frames {
                return Err(WavyteError::script(format!(
                    "scene '{}' did not finish within {} frames",
                    self.info.name, self.max_frames
                )));
            }
            set_frame(self.run.frame.next());
            self.next()?;
        }

        let last = self.run.frame;
        self.cache = SceneCache {
            first_frame: start,
            last_frame: last,
            duration: last.0 - start.0,
            transition_duration: transition_duration.unwrap_or(0),
        };
        self.slides = self.run.slides.clone();
        self.cached = true;
        debug!(duration = self.cache.duration, transition = self.cache.transition_duration, "scene recalculated");
        Ok(())
    }

    /// Swap the script factory. Invalidates the cache and resolved resources.
    pub fn reload(&mut self, factory: Arc<dyn ScriptFactory>) {
        self.factory = factory;
        self.cached = false;
        self.resources.clear();
    }

    /// Apply new settings. The cache is invalidated only if something changed.
    pub fn configure(&mut self, settings: &SceneSettings) {
        let info = SceneInfo {
            name: self.info.name.clone(),
            size: settings.size,
            resolution_scale: settings.resolution_scale,
            fps: settings.fps,
            seed: settings.seed,
        };
        if info != self.info || settings.max_frames != self.max_frames {
            self.info = info;
            self.max_frames = settings.max_frames;
            self.cached = false;
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SceneState {
        self.run.state
    }

    /// `true` once the scene may hand off to its successor.
    pub fn can_transition_out(&self) -> bool {
        matches!(
            self.run.state,
            SceneState::CanTransitionOut | SceneState::Finished
        )
    }

    /// `true` once the script completed.
    pub fn is_finished(&self) -> bool {
        self.run.state == SceneState::Finished
    }

    /// Global frame of the current run.
    pub fn frame(&self) -> FrameIndex {
        self.run.frame
    }

    /// Global frame the current run was reset at.
    pub fn start_frame(&self) -> FrameIndex {
        self.run.start_frame
    }

    /// Whether the cache is valid.
    pub fn is_cached(&self) -> bool {
        self.cached
    }

    /// Cached timeline placement (meaningful only while [`Scene::is_cached`]).
    pub fn cache(&self) -> SceneCache {
        self.cache
    }

    /// Cached first frame.
    pub fn first_frame(&self) -> FrameIndex {
        self.cache.first_frame
    }

    /// Cached hand-off frame.
    pub fn last_frame(&self) -> FrameIndex {
        self.cache.last_frame
    }

    /// Cached duration in frames.
    pub fn duration(&self) -> u64 {
        self.cache.duration
    }

    /// Cached transition-in length in frames.
    pub fn transition_duration(&self) -> u64 {
        self.cache.transition_duration
    }

    /// Transition parameters of the current run.
    pub fn transition(&self) -> Transition {
        self.run.transition
    }

    /// Whether the outgoing scene is drawn above this one.
    pub fn previous_on_top(&self) -> bool {
        self.run.transition.previous_on_top
    }

    /// Wait-for-input boundaries found by the last recalculation.
    pub fn slides(&self) -> &[Slide] {
        &self.slides
    }

    /// `true` when the current run declared a wait-for-input boundary at `frame`.
    pub fn is_waiting_for_input(&self, frame: FrameIndex) -> bool {
        self.run
            .slides
            .iter()
            .any(|s| self.run.start_frame.0 + s.local_frame == frame.0)
    }

    /// Content of the current frame.
    pub fn view(&self) -> &View {
        &self.run.view
    }

    /// Resources resolved so far.
    pub fn resources(&self) -> &ResourceCache {
        &self.resources
    }

    /// How many times the script was restarted.
    pub fn reset_count(&self) -> u64 {
        self.resets
    }
}

fn resolve_for_script(scene: &str, d: Deferred) -> Resume {
    let label = d.label().to_owned();
    match d.resolve() {
        Ok(v) => Resume::Resolved(v),
        Err(e) => {
            warn!(scene, resource = %label, error = %e, "deferred value failed to resolve");
            Resume::Failed(e.to_string())
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/scene/scene.rs"]
mod tests;
