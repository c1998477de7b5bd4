use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::export::{ExportContext, Exporter, ExporterRegistry, FrameAcks, FrameStatus};
use crate::foundation::cancel::CancellationToken;
use crate::foundation::clock::Clock;
use crate::foundation::error::{WavyteError, WavyteResult};
use crate::foundation::signal::{EventDispatcher, ValueDispatcher};
use crate::playback::manager::{PlaybackManager, PlaybackState};
use crate::project::{Project, ProjectSettings, RenderSettings};
use crate::render::stage::Stage;
use crate::renderer::estimator::{TimeEstimate, TimeEstimator};
use crate::scene::scene::SceneDescription;

/// Frames an exporter may hold unacknowledged before the renderer waits.
pub const MAX_FRAMES_IN_FLIGHT: usize = 16;

/// Poll interval while waiting for acknowledgments.
pub const BACKPRESSURE_RETRY: Duration = Duration::from_millis(5);

/// Minimum time between two cooperative yields to the host.
pub const HOST_YIELD_INTERVAL: Duration = Duration::from_millis(33);

/// Lifecycle of a [`Renderer`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RendererState {
    /// Idle, ready to render.
    #[default]
    Initial,
    /// A render is running.
    Working,
    /// An abort was requested; the running render stops at its next frame boundary.
    Aborting,
}

/// Outcome of one render.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderResult {
    /// Every frame of the range was exported.
    Success,
    /// The render failed; see [`Renderer::last_error`].
    Error,
    /// The render was aborted.
    Aborted,
}

/// Counters of the last render.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Frames handed to the exporter.
    pub frames_exported: u64,
    /// Cooperative yields to the host.
    pub host_yields: u64,
    /// Backpressure polls while the exporter was saturated.
    pub backpressure_waits: u64,
}

struct Shared {
    state: RendererState,
    token: CancellationToken,
}

/// Clonable handle that aborts the render running on its [`Renderer`].
#[derive(Clone)]
pub struct AbortHandle {
    shared: Arc<Mutex<Shared>>,
}

impl std::fmt::Debug for AbortHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbortHandle")
            .field("state", &self.state())
            .finish()
    }
}

impl AbortHandle {
    /// Request an abort. Only a working renderer can be aborted; returns whether it was.
    pub fn abort(&self) -> bool {
        let mut shared = self.lock();
        if shared.state != RendererState::Working {
            return false;
        }
        shared.token.cancel();
        shared.state = RendererState::Aborting;
        true
    }

    /// Current renderer state.
    pub fn state(&self) -> RendererState {
        self.lock().state
    }

    fn begin(&self) -> Option<CancellationToken> {
        let mut shared = self.lock();
        if shared.state != RendererState::Initial {
            return None;
        }
        shared.token = CancellationToken::new();
        shared.state = RendererState::Working;
        Some(shared.token.clone())
    }

    fn finish(&self) {
        self.lock().state = RendererState::Initial;
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Batch driver that exports a frame range of a project.
///
/// Every run builds fresh scenes, so renders never observe preview state.
pub struct Renderer {
    scenes: Vec<SceneDescription>,
    settings: ProjectSettings,
    registry: ExporterRegistry,
    clock: Arc<dyn Clock>,
    stage: Stage,
    estimator: TimeEstimator,
    handle: AbortHandle,
    state: ValueDispatcher<RendererState>,
    results: EventDispatcher<RenderResult>,
    yield_hook: Option<Box<dyn FnMut() + Send>>,
    stats: RenderStats,
    last_error: Option<String>,
}

impl Renderer {
    /// Create a renderer for `project`, resolving exporters through `registry`.
    pub fn new(project: &Project, registry: ExporterRegistry, clock: Arc<dyn Clock>) -> Self {
        Self {
            scenes: project.scenes.clone(),
            settings: project.settings.clone(),
            registry,
            stage: Stage::new(project.settings.stage.clone()),
            estimator: TimeEstimator::new(clock.clone()),
            clock,
            handle: AbortHandle {
                shared: Arc::new(Mutex::new(Shared {
                    state: RendererState::Initial,
                    token: CancellationToken::new(),
                })),
            },
            state: ValueDispatcher::new(RendererState::Initial),
            results: EventDispatcher::new(),
            yield_hook: None,
            stats: RenderStats::default(),
            last_error: None,
        }
    }

    /// Handle for aborting from another thread or from inside an exporter.
    pub fn abort_handle(&self) -> AbortHandle {
        self.handle.clone()
    }

    /// Abort the running render. Returns `false` when nothing is running.
    pub fn abort(&self) -> bool {
        self.handle.abort()
    }

    /// Called at every cooperative yield instead of [`std::thread::yield_now`].
    pub fn set_yield_hook(&mut self, hook: impl FnMut() + Send + 'static) {
        self.yield_hook = Some(Box::new(hook));
    }

    /// Render with `settings`. Failures are logged and reported as [`RenderResult::Error`].
    pub fn render(&mut self, settings: &RenderSettings) -> RenderResult {
        let Some(token) = self.handle.begin() else {
            warn!("render requested while another render is running");
            return RenderResult::Error;
        };
        self.state.set(RendererState::Working);
        self.stats = RenderStats::default();
        self.last_error = None;

        let result = match self.run(settings, &token) {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, name = %settings.name, "render failed");
                self.last_error = Some(e.to_string());
                RenderResult::Error
            }
        };

        if self.handle.state() == RendererState::Aborting {
            self.state.set(RendererState::Aborting);
        }
        self.handle.finish();
        self.estimator.reset(0.0);
        self.state.set(RendererState::Initial);
        debug!(
            ?result,
            frames = self.stats.frames_exported,
            host_yields = self.stats.host_yields,
            backpressure_waits = self.stats.backpressure_waits,
            "render finished"
        );
        self.results.dispatch(&result);
        result
    }

    #[tracing::instrument(skip_all, fields(name = %settings.name, exporter = %settings.exporter.name))]
    fn run(
        &mut self,
        settings: &RenderSettings,
        token: &CancellationToken,
    ) -> WavyteResult<RenderResult> {
        settings.validate()?;
        let mut exporter = self
            .registry
            .create(&settings.exporter.name, &settings.exporter.options)?;

        let outcome = self.export_with(exporter.as_mut(), settings, token);
        let result = match &outcome {
            Ok(result) => *result,
            Err(_) => RenderResult::Error,
        };
        let stopped = exporter.stop(result);

        match (outcome, stopped) {
            (Err(e), Err(stop_err)) => {
                warn!(error = %stop_err, "exporter stop failed after a render error");
                Err(e)
            }
            (Err(e), Ok(())) | (Ok(_), Err(e)) => Err(e),
            (Ok(result), Ok(())) => Ok(result),
        }
    }

    fn export_with(
        &mut self,
        exporter: &mut dyn Exporter,
        settings: &RenderSettings,
        token: &CancellationToken,
    ) -> WavyteResult<RenderResult> {
        let settings = match exporter.configuration(settings)? {
            Some(overridden) => {
                overridden.validate()?;
                overridden
            }
            None => settings.clone(),
        };

        let stage_settings = settings.stage_settings(&self.settings.stage);
        stage_settings.validate()?;
        self.stage.configure(&stage_settings);

        let mut playback =
            PlaybackManager::new(&self.scenes, &self.settings.render_scene_settings(&settings))?;
        playback.set_state(PlaybackState::Rendering);
        playback.recalculate()?;

        let (from, to) = settings.frame_range(playback.duration());
        if from > to {
            return Err(WavyteError::validation(format!(
                "render range is empty: {} > {}",
                from.0, to.0
            )));
        }
        playback.seek(from)?;

        let mut acks = FrameAcks::new();
        let cx = ExportContext {
            settings: &settings,
            from,
            to,
            size: stage_settings.surface_desc().physical(),
            fps: settings.fps,
            acks: acks.sender(),
        };
        let total = cx.frame_count() as f64;
        exporter.start(&cx)?;

        self.estimator.reset(1.0 / total);
        let mut last_yield = self.clock.now();

        if !self.export_frame(exporter, &mut playback, &mut acks, token)? {
            return Ok(RenderResult::Aborted);
        }
        self.estimator.update(self.stats.frames_exported as f64 / total);

        while !token.is_cancelled() && playback.frame() < to && !playback.is_finished() {
            playback.progress()?;
            if !self.export_frame(exporter, &mut playback, &mut acks, token)? {
                break;
            }
            self.estimator.update(self.stats.frames_exported as f64 / total);

            let now = self.clock.now();
            if now.saturating_sub(last_yield) >= HOST_YIELD_INTERVAL {
                self.yield_to_host();
                last_yield = now;
            }
        }

        if token.is_cancelled() {
            return Ok(RenderResult::Aborted);
        }
        Ok(RenderResult::Success)
    }

    /// Render the current frame and hand it to the exporter. Returns `false` when the render was
    /// aborted while waiting for the exporter.
    fn export_frame(
        &mut self,
        exporter: &mut dyn Exporter,
        playback: &mut PlaybackManager,
        acks: &mut FrameAcks,
        token: &CancellationToken,
    ) -> WavyteResult<bool> {
        acks.drain();
        while acks.in_flight() >= MAX_FRAMES_IN_FLIGHT {
            if token.is_cancelled() {
                return Ok(false);
            }
            self.clock.sleep(BACKPRESSURE_RETRY);
            self.stats.backpressure_waits += 1;
            acks.drain();
        }

        let frame = playback.frame();
        let scene_frame = playback.local_frame();
        let scene_name = playback.current_scene().name().to_owned();
        let (current, previous) = playback.scenes_for_render();
        self.stage.render(current, previous)?;

        let status = exporter.handle_frame(
            self.stage.final_surface(),
            frame,
            scene_frame,
            &scene_name,
            token,
        )?;
        if status == FrameStatus::Pending {
            acks.track(frame);
        }
        self.stats.frames_exported += 1;
        Ok(true)
    }

    fn yield_to_host(&mut self) {
        self.stats.host_yields += 1;
        match self.yield_hook.as_mut() {
            Some(hook) => hook(),
            None => std::thread::yield_now(),
        }
    }

    /// Current state.
    pub fn state(&self) -> RendererState {
        self.handle.state()
    }

    /// State changes: `Initial`, `Working`, optionally `Aborting`, then `Initial` again per run.
    pub fn state_signal(&mut self) -> &mut ValueDispatcher<RendererState> {
        &mut self.state
    }

    /// One event per finished render.
    pub fn results(&mut self) -> &mut EventDispatcher<RenderResult> {
        &mut self.results
    }

    /// Time estimate of the running render.
    pub fn estimate(&self) -> TimeEstimate {
        self.estimator.estimate()
    }

    /// Counters of the last render.
    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    /// Message of the error that ended the last render, if it failed.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Exporter registry in use.
    pub fn registry_mut(&mut self) -> &mut ExporterRegistry {
        &mut self.registry
    }
}

#[cfg(test)]
#[path = "../../tests/unit/renderer/renderer.rs"]
mod tests;
