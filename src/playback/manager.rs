use std::sync::Arc;

use tracing::debug;

use crate::foundation::core::{Fps, FrameIndex};
use crate::foundation::error::{WavyteError, WavyteResult};
use crate::scene::scene::{Scene, SceneDescription, SceneSettings};
use crate::scene::script::ScriptFactory;
use crate::scene::transition::SceneState;

/// What the manager is currently driven by.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PlaybackState {
    /// Real-time playback.
    Playing,
    /// Interactive playback, paused.
    #[default]
    Paused,
    /// Batch export.
    Rendering,
}

/// One continuous timeline over independently scripted scenes.
///
/// The manager is the only writer of the global frame counter. Scenes are forward-only, so moving
/// backwards replays the owning scene from its first frame.
pub struct PlaybackManager {
    scenes: Vec<Scene>,
    settings: SceneSettings,
    current: usize,
    previous: Option<usize>,
    frame: FrameIndex,
    duration: u64,
    finished: bool,
    speed: f64,
    state: PlaybackState,
    replayed_steps: u64,
}

impl PlaybackManager {
    /// Instantiate every described scene with `settings`.
    pub fn new(descriptions: &[SceneDescription], settings: &SceneSettings) -> WavyteResult<Self> {
        if descriptions.is_empty() {
            return Err(WavyteError::validation("a timeline needs at least one scene"));
        }
        Ok(Self {
            scenes: descriptions
                .iter()
                .map(|d| Scene::new(d, settings))
                .collect(),
            settings: settings.clone(),
            current: 0,
            previous: None,
            frame: FrameIndex(0),
            duration: 0,
            finished: false,
            speed: 1.0,
            state: PlaybackState::default(),
            replayed_steps: 0,
        })
    }

    /// Discover the length of every scene and lay them out back to back, then [`Self::reset`].
    #[tracing::instrument(skip(self), fields(scenes = self.scenes.len()))]
    pub fn recalculate(&mut self) -> WavyteResult<()> {
        self.previous = None;
        let mut frame = FrameIndex(0);
        for scene in &mut self.scenes {
            let start = frame;
            scene.recalculate(start, &mut |f| frame = f)?;
        }
        self.frame = frame;
        self.duration = frame.0;
        debug!(duration = self.duration, "timeline recalculated");
        self.reset()
    }

    /// Rewind to frame 0 with the first scene freshly reset.
    pub fn reset(&mut self) -> WavyteResult<()> {
        self.previous = None;
        self.current = 0;
        self.frame = FrameIndex(0);
        self.finished = false;
        self.scenes[0].reset(self.frame, None)?;
        self.hand_off()?;
        self.finished = self.last_is_finished();
        Ok(())
    }

    /// Advance the timeline by exactly one frame. Returns `true` once the timeline is finished.
    pub fn progress(&mut self) -> WavyteResult<bool> {
        if self.finished {
            return Ok(true);
        }
        if let Some(p) = self.previous {
            self.scenes[p].next()?;
        }
        self.frame = self.frame.next();

        if self.scenes[self.current].is_finished() {
            self.previous = None;
            self.finished = true;
            return Ok(true);
        }

        self.scenes[self.current].next()?;
        if self.scenes[self.current].state() != SceneState::Initial {
            self.previous = None;
        }
        self.hand_off()?;

        self.finished = self.last_is_finished();
        Ok(self.finished)
    }

    // Zero-length scenes hand off within the same frame.
    fn hand_off(&mut self) -> WavyteResult<()> {
        while self.scenes[self.current].can_transition_out() && self.current + 1 < self.scenes.len()
        {
            let prev = self.current;
            self.current += 1;
            self.previous = Some(prev);
            let prev_name = self.scenes[prev].name().to_owned();
            self.scenes[self.current].reset(self.frame, Some(&prev_name))?;
            if self.scenes[self.current].state() != SceneState::Initial {
                self.previous = None;
            }
        }
        Ok(())
    }

    fn last_is_finished(&self) -> bool {
        self.current + 1 == self.scenes.len() && self.scenes[self.current].is_finished()
    }

    /// Move to `target`, clamped to `[0, duration]`. Returns `true` when the timeline is finished.
    ///
    /// Forward targets are reached by stepping from the current position. Anything else replays
    /// the owning scene from its cached first frame, so the cost is bounded by the distance from
    /// the nearest reachable position.
    #[tracing::instrument(skip(self), fields(from = self.frame.0))]
    pub fn seek(&mut self, target: FrameIndex) -> WavyteResult<bool> {
        let target = FrameIndex(target.0.min(self.duration));
        if target == self.frame {
            return Ok(self.finished);
        }

        let before = self.replayed_steps;
        let origin = self.find_best_scene(target);
        if target > self.frame && origin <= self.current {
            self.step_until(target)?;
        } else {
            self.previous = None;
            self.current = origin;
            self.frame = self.scenes[origin].first_frame();
            self.finished = false;
            let prev_name = origin
                .checked_sub(1)
                .map(|i| self.scenes[i].name().to_owned());
            self.scenes[origin].reset(self.frame, prev_name.as_deref())?;
            self.hand_off()?;
            self.finished = self.last_is_finished();
            self.step_until(target)?;
        }

        debug!(
            target = target.0,
            scene = %self.scenes[self.current].name(),
            replayed = self.replayed_steps - before,
            "seek"
        );
        Ok(self.finished)
    }

    fn step_until(&mut self, target: FrameIndex) -> WavyteResult<()> {
        while self.frame < target && !self.finished {
            self.progress()?;
            self.replayed_steps += 1;
        }
        Ok(())
    }

    /// Index of the scene a seek to `target` should start replaying from.
    ///
    /// That is the first scene that is not cached or ends after `target`. Targets inside the
    /// transition-in of that scene start one scene earlier, so the outgoing scene is replayed too.
    pub fn find_best_scene(&self, target: FrameIndex) -> usize {
        let last = self.scenes.len() - 1;
        let owner = self
            .scenes
            .iter()
            .position(|s| !s.is_cached() || s.last_frame() > target)
            .unwrap_or(last);
        let scene = &self.scenes[owner];
        if owner > 0
            && scene.is_cached()
            && target.0 < scene.first_frame().0 + scene.transition_duration()
        {
            owner - 1
        } else {
            owner
        }
    }

    /// Current and, inside a transition window, outgoing scene, borrowed for drawing.
    pub fn scenes_for_render(&mut self) -> (&mut Scene, Option<&mut Scene>) {
        match self.previous {
            Some(p) if p < self.current => {
                let (head, tail) = self.scenes.split_at_mut(self.current);
                (&mut tail[0], Some(&mut head[p]))
            }
            _ => (&mut self.scenes[self.current], None),
        }
    }

    /// Apply new scene settings to every scene. Changed settings invalidate their caches.
    pub fn configure(&mut self, settings: &SceneSettings) {
        for scene in &mut self.scenes {
            scene.configure(settings);
        }
        self.settings = settings.clone();
    }

    /// Swap the script of the scene called `name`. Returns `false` when no such scene exists.
    pub fn reload(&mut self, name: &str, factory: Arc<dyn ScriptFactory>) -> bool {
        match self.scenes.iter_mut().find(|s| s.name() == name) {
            Some(scene) => {
                scene.reload(factory);
                true
            }
            None => false,
        }
    }

    /// Global frame.
    pub fn frame(&self) -> FrameIndex {
        self.frame
    }

    /// Total timeline length in frames, as of the last recalculation.
    pub fn duration(&self) -> u64 {
        self.duration
    }

    /// `true` once the last scene completed.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Scene owning the current frame.
    pub fn current_scene(&self) -> &Scene {
        &self.scenes[self.current]
    }

    /// Index of [`Self::current_scene`].
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Outgoing scene, only while the current frame is inside a transition window.
    pub fn previous_scene(&self) -> Option<&Scene> {
        self.previous.map(|p| &self.scenes[p])
    }

    /// All scenes in timeline order.
    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    /// Look up a scene by name.
    pub fn find_scene_by_name(&self, name: &str) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.name() == name)
    }

    /// Offset of the current frame from the current scene's first frame.
    pub fn local_frame(&self) -> u64 {
        self.frame
            .0
            .saturating_sub(self.scenes[self.current].start_frame().0)
    }

    /// Settings the scenes were configured with.
    pub fn settings(&self) -> &SceneSettings {
        &self.settings
    }

    /// Frame rate of the timeline.
    pub fn fps(&self) -> Fps {
        self.settings.fps
    }

    /// Change the frame rate. Invalidates every scene cache when it differs.
    pub fn set_fps(&mut self, fps: Fps) {
        let mut settings = self.settings.clone();
        settings.fps = fps;
        self.configure(&settings);
    }

    /// Playback speed multiplier.
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Set the playback speed multiplier.
    pub fn set_speed(&mut self, speed: f64) {
        self.speed = speed;
    }

    /// Who is driving the timeline.
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Record who is driving the timeline.
    pub fn set_state(&mut self, state: PlaybackState) {
        self.state = state;
    }

    /// Total number of frames stepped by seeks so far.
    pub fn replayed_steps(&self) -> u64 {
        self.replayed_steps
    }
}

#[cfg(test)]
#[path = "../../tests/unit/playback/manager.rs"]
mod tests;
