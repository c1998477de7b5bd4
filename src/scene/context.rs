use std::collections::HashMap;

use tracing::warn;

use crate::foundation::core::{Canvas, FrameIndex};
use crate::foundation::random::Rng64;
use crate::scene::scene::SceneInfo;
use crate::scene::transition::{SceneState, Transition, TransitionStyle};
use crate::scene::view::View;

/// A wait-for-input boundary declared by a script.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Slide {
    /// Author-given name.
    pub name: String,
    /// Offset from the scene's first frame.
    pub local_frame: u64,
}

/// Mutable state of one script run. Cleared on every reset.
pub(crate) struct SceneRun {
    pub(crate) state: SceneState,
    pub(crate) start_frame: FrameIndex,
    pub(crate) frame: FrameIndex,
    pub(crate) random: Rng64,
    pub(crate) counters: HashMap<String, u64>,
    pub(crate) view: View,
    pub(crate) transition: Transition,
    pub(crate) slides: Vec<Slide>,
    pub(crate) previous_scene: Option<String>,
}

impl SceneRun {
    pub(crate) fn new(seed: u64, start_frame: FrameIndex, previous_scene: Option<String>) -> Self {
        Self {
            state: SceneState::AfterTransitionIn,
            start_frame,
            frame: start_frame,
            random: Rng64::new(seed),
            counters: HashMap::new(),
            view: View::default(),
            transition: Transition::default(),
            slides: Vec::new(),
            previous_scene,
        }
    }

    pub(crate) fn local_frame(&self) -> u64 {
        self.frame.0.saturating_sub(self.start_frame.0)
    }

    pub(crate) fn enter_initial(&mut self, scene: &str) {
        if self.state == SceneState::AfterTransitionIn {
            self.state = SceneState::Initial;
        } else {
            warn!(scene, state = ?self.state, "scene entered Initial out of order");
        }
    }

    pub(crate) fn enter_after_transition_in(&mut self, scene: &str) {
        if self.state == SceneState::Initial {
            self.state = SceneState::AfterTransitionIn;
        } else {
            warn!(scene, state = ?self.state, "scene entered AfterTransitionIn out of order");
        }
    }

    pub(crate) fn enter_can_transition_out(&mut self, scene: &str) {
        if matches!(
            self.state,
            SceneState::Initial | SceneState::AfterTransitionIn
        ) {
            self.state = SceneState::CanTransitionOut;
        } else {
            warn!(scene, state = ?self.state, "scene entered CanTransitionOut out of order");
        }
    }
}

/// Explicit context handed to scripts on every resume.
pub struct SceneContext<'a> {
    info: &'a SceneInfo,
    run: &'a mut SceneRun,
}

impl<'a> SceneContext<'a> {
    pub(crate) fn new(info: &'a SceneInfo, run: &'a mut SceneRun) -> Self {
        Self { info, run }
    }

    /// Static information about the scene.
    pub fn info(&self) -> &SceneInfo {
        self.info
    }

    /// Logical scene size.
    pub fn size(&self) -> Canvas {
        self.info.size
    }

    /// Global frame being produced.
    pub fn frame(&self) -> FrameIndex {
        self.run.frame
    }

    /// Frame offset from the scene's first frame.
    pub fn local_frame(&self) -> u64 {
        self.run.local_frame()
    }

    /// Scene-local time in seconds.
    pub fn time_secs(&self) -> f64 {
        self.info.fps.frames_to_secs(self.run.local_frame())
    }

    /// Name of the scene this run follows, if it was entered through a handoff.
    pub fn previous_scene(&self) -> Option<&str> {
        self.run.previous_scene.as_deref()
    }

    /// Deterministic random source, reseeded on every reset.
    pub fn random(&mut self) -> &mut Rng64 {
        &mut self.run.random
    }

    /// Content drawn for the current frame.
    pub fn view(&mut self) -> &mut View {
        &mut self.run.view
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SceneState {
        self.run.state
    }

    /// Per-run counter: returns the current value for `key` and increments it.
    pub fn counter(&mut self, key: &str) -> u64 {
        let c = self.run.counters.entry(key.to_owned()).or_insert(0);
        let v = *c;
        *c += 1;
        v
    }

    /// Start a transition-in; the previous scene keeps drawing until [`Self::finish_transition`].
    pub fn use_transition(&mut self, style: TransitionStyle, previous_on_top: bool) {
        self.run.enter_initial(&self.info.name);
        self.run.transition = Transition {
            style,
            previous_on_top,
            progress: 0.0,
        };
    }

    /// Publish the blend progress of the running transition.
    pub fn set_transition_progress(&mut self, progress: f32) {
        self.run.transition.progress = progress.clamp(0.0, 1.0);
    }

    /// End the transition-in.
    pub fn finish_transition(&mut self) {
        self.run.transition.progress = 1.0;
        self.run.enter_after_transition_in(&self.info.name);
    }

    /// Allow the next scene to start while this script keeps running.
    pub fn finish_scene(&mut self) {
        self.run.enter_can_transition_out(&self.info.name);
    }

    /// Declare a wait-for-input boundary at the current frame.
    pub fn wait_for_input(&mut self, name: impl Into<String>) {
        let local_frame = self.run.local_frame();
        self.run.slides.push(Slide {
            name: name.into(),
            local_frame,
        });
    }
}
