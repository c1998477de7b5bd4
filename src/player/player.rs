use std::time::Duration;

use tracing::{debug, error};

use crate::foundation::core::FrameIndex;
use crate::foundation::error::{WavyteError, WavyteResult};
use crate::foundation::signal::{EventDispatcher, ValueDispatcher};
use crate::playback::manager::{PlaybackManager, PlaybackState};
use crate::player::audio::AudioClock;
use crate::player::host::{FrameHost, RequestId};
use crate::project::{Project, seconds_to_frames, validate_range};
use crate::render::stage::{Stage, StageSettings};

/// Maximum tolerated lag of the animation behind the audio clock, in seconds.
pub const MAX_AUDIO_DESYNC: f64 = 0.2;

/// Frames of audio pre-roll applied when resynchronizing after a seek.
pub const AUDIO_PREROLL_FRAMES: i64 = -3;

/// Extra frames per second added to the target rate when throttling host callbacks.
pub const THROTTLE_GUARD_FPS: f64 = 5.0;

/// Player controls. Always replaced as a whole.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlayerState {
    /// Playback is paused.
    pub paused: bool,
    /// Restart at the range start instead of pausing at its end.
    pub looping: bool,
    /// Audio is muted.
    pub muted: bool,
    /// Speed multiplier.
    pub speed: f64,
}

/// What a single update did.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlayerStep {
    /// An explicit or out-of-range seek.
    Seek,
    /// A corrective seek to the audio clock.
    DriftSeek,
    /// One frame forward.
    Progress,
    /// Waiting for the audio clock to catch up.
    Waiting,
    /// Paused; nothing advanced.
    Paused,
    /// At the range end with nothing to do.
    Idle,
}

struct Prepared {
    state: PlayerState,
    seek: Option<FrameIndex>,
    render: bool,
}

/// Real-time driver of one project.
///
/// The host calls [`Player::on_frame`] for every request the player makes. Each accepted callback
/// runs at most one update; `on_frame` takes `&mut self`, so updates never overlap.
pub struct Player {
    playback: PlaybackManager,
    stage: Stage,
    audio: Box<dyn AudioClock>,
    host: Box<dyn FrameHost>,

    state: ValueDispatcher<PlayerState>,
    frame: ValueDispatcher<FrameIndex>,
    duration: ValueDispatcher<u64>,
    rendered: EventDispatcher<FrameIndex>,

    range: Option<[f64; 2]>,
    active: bool,
    pending: Option<RequestId>,
    last_update_at: Option<Duration>,

    requested_seek: Option<FrameIndex>,
    requested_render: bool,
    requested_recalculation: bool,

    update_count: u64,
    last_step: Option<PlayerStep>,
}

impl Player {
    /// Build a player with its own scenes at the preview settings of `project`.
    ///
    /// The player is inactive and paused; the first update recalculates the timeline.
    pub fn new(
        project: &Project,
        host: Box<dyn FrameHost>,
        audio: Box<dyn AudioClock>,
    ) -> WavyteResult<Self> {
        let settings = &project.settings;
        settings.validate()?;
        let playback =
            PlaybackManager::new(&project.scenes, &settings.preview_scene_settings())?;
        let stage = Stage::new(StageSettings {
            resolution_scale: settings.preview.resolution_scale,
            ..settings.stage.clone()
        });
        let state = PlayerState {
            paused: true,
            looping: settings.player.looping,
            muted: settings.player.muted,
            speed: settings.player.speed,
        };
        let mut player = Self {
            playback,
            stage,
            audio,
            host,
            state: ValueDispatcher::new(state),
            frame: ValueDispatcher::new(FrameIndex(0)),
            duration: ValueDispatcher::new(0),
            rendered: EventDispatcher::new(),
            range: settings.player.range,
            active: false,
            pending: None,
            last_update_at: None,
            requested_seek: None,
            requested_render: false,
            requested_recalculation: true,
            update_count: 0,
            last_step: None,
        };
        player.playback.set_speed(state.speed);
        player.audio.set_muted(state.muted);
        Ok(player)
    }

    /// Host callback for request `id`, fired at host time `now`.
    ///
    /// Stale ids are ignored. Callbacks arriving sooner than the throttle interval only
    /// re-request. Update errors are logged and returned; the player then stays idle until the
    /// next control call.
    pub fn on_frame(&mut self, id: RequestId, now: Duration) -> WavyteResult<()> {
        if self.pending != Some(id) {
            return Ok(());
        }
        self.pending = None;

        let rate = self.playback.fps().as_f64() * self.state.get().speed + THROTTLE_GUARD_FPS;
        let interval = Duration::from_secs_f64(1.0 / rate);
        if let Some(last) = self.last_update_at
            && now.saturating_sub(last) < interval
        {
            self.request();
            return Ok(());
        }
        self.last_update_at = Some(now);

        let result = self.run();
        if let Err(e) = &result {
            error!(error = %e, frame = self.playback.frame().0, "player update failed");
        }
        result
    }

    fn prepare(&mut self) -> WavyteResult<Prepared> {
        let mut state = self.state.get();
        let mut seek = self.requested_seek.take();
        let render = std::mem::take(&mut self.requested_render);

        if self.requested_recalculation {
            self.requested_recalculation = false;
            let intended = seek.unwrap_or(self.playback.frame());
            if let Err(e) = self.playback.recalculate() {
                self.requested_seek = Some(intended);
                return Err(e);
            }
            self.duration.set(self.playback.duration());
            seek = Some(intended);
        }

        let (start, end) = self.range_frames();
        if (!state.looping && self.reached_end() && !state.paused && seek.is_none())
            || start == end
        {
            state.paused = true;
            self.state.set(state);
        }
        if state.looping
            && start != end
            && (seek.is_some_and(|s| s > end) || (self.reached_end() && !state.paused))
        {
            seek = Some(start);
        }

        let fps = self.playback.fps();
        let audio_paused = state.paused
            || self.reached_end()
            || !self
                .audio
                .is_in_range(fps.frames_to_secs(self.playback.frame().0));
        if self.audio.set_paused(audio_paused) {
            self.sync_audio(AUDIO_PREROLL_FRAMES);
        }
        self.audio.set_muted(state.muted);

        Ok(Prepared {
            state,
            seek,
            render,
        })
    }

    fn run(&mut self) -> WavyteResult<()> {
        self.update_count += 1;
        let Prepared {
            mut state,
            seek,
            render,
        } = self.prepare()?;

        let was_paused = self.playback.state() == PlaybackState::Paused;
        self.playback.set_state(if state.paused {
            PlaybackState::Paused
        } else {
            PlaybackState::Playing
        });

        let fps = self.playback.fps();
        let frame = self.playback.frame();
        let (_, end) = self.range_frames();
        let animation_time = fps.frames_to_secs(frame.0);
        let normal_speed = (state.speed - 1.0).abs() < f64::EPSILON;
        // Past the end of the track the audio clock stands still and must not hold the animation.
        let audio_clock = (normal_speed
            && self.audio.is_ready()
            && self.audio.is_in_range(animation_time))
        .then(|| self.audio.time());

        let step = if seek.is_some() || !self.is_in_range(frame) {
            let target = self.clamp_to_range(seek.unwrap_or(frame));
            self.playback.seek(target)?;
            self.sync_audio(AUDIO_PREROLL_FRAMES);
            PlayerStep::Seek
        } else if state.paused || audio_clock.is_some_and(|audio| animation_time > audio) {
            if render || (state.paused && !was_paused) {
                self.render()?;
            }
            self.last_step = Some(if state.paused {
                PlayerStep::Paused
            } else {
                PlayerStep::Waiting
            });
            self.request();
            return Ok(());
        } else if let Some(audio) =
            audio_clock.filter(|audio| animation_time < audio - MAX_AUDIO_DESYNC)
        {
            let target = FrameIndex(fps.secs_to_frames_floor(audio));
            debug!(
                animation = animation_time,
                audio, "animation fell behind the audio clock"
            );
            self.playback.seek(self.clamp_to_range(target))?;
            PlayerStep::DriftSeek
        } else if frame < end {
            self.playback.progress()?;
            if !normal_speed {
                self.sync_audio(0);
            }
            PlayerStep::Progress
        } else {
            PlayerStep::Idle
        };

        if !state.paused
            && self
                .playback
                .current_scene()
                .is_waiting_for_input(self.playback.frame())
        {
            state.paused = true;
            self.state.set(state);
        }

        self.render()?;
        self.frame.set(self.playback.frame());
        self.last_step = Some(step);
        self.request();
        Ok(())
    }

    fn render(&mut self) -> WavyteResult<()> {
        let (current, previous) = self.playback.scenes_for_render();
        self.stage.render(current, previous)?;
        self.rendered.dispatch(&self.playback.frame());
        Ok(())
    }

    fn sync_audio(&mut self, frame_offset: i64) {
        let frame = self.playback.frame().0 as i64 + frame_offset;
        let secs = self.playback.fps().frames_to_secs(frame.max(0) as u64);
        self.audio.set_time(secs);
    }

    fn request(&mut self) {
        if !self.active || self.pending.is_some() {
            return;
        }
        self.pending = Some(self.host.request_frame());
    }

    fn range_frames(&self) -> (FrameIndex, FrameIndex) {
        seconds_to_frames(
            self.range,
            self.playback.fps(),
            self.playback.duration(),
        )
    }

    fn reached_end(&self) -> bool {
        self.playback.is_finished() || self.playback.frame() >= self.range_frames().1
    }

    fn is_in_range(&self, frame: FrameIndex) -> bool {
        let (start, end) = self.range_frames();
        start <= frame && frame <= end
    }

    fn clamp_to_range(&self, frame: FrameIndex) -> FrameIndex {
        let (start, end) = self.range_frames();
        frame.clamp(start, end)
    }

    fn update_state(&mut self, f: impl FnOnce(&mut PlayerState)) {
        let mut state = self.state.get();
        f(&mut state);
        self.state.set(state);
        self.request();
    }

    /// Start or stop playback. Playing from the end of a non-looping range restarts it.
    pub fn toggle_playback(&mut self) {
        let state = self.state.get();
        if state.paused && self.reached_end() && !state.looping {
            self.request_seek(self.range_frames().0);
        }
        self.update_state(|s| s.paused = !s.paused);
    }

    /// Flip looping.
    pub fn toggle_loop(&mut self) {
        self.update_state(|s| s.looping = !s.looping);
    }

    /// Flip audio muting.
    pub fn toggle_audio(&mut self) {
        self.update_state(|s| s.muted = !s.muted);
    }

    /// Change the playback speed.
    pub fn set_speed(&mut self, speed: f64) -> WavyteResult<()> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(WavyteError::validation("player speed must be finite and > 0"));
        }
        self.playback.set_speed(speed);
        self.update_state(|s| s.speed = speed);
        Ok(())
    }

    /// Offset of the audio track relative to the timeline, in seconds.
    pub fn set_audio_offset(&mut self, secs: f64) {
        self.audio.set_offset(secs);
        self.request_seek(self.playback.frame());
    }

    /// Seek on the next update. The target is clamped to the scrub range.
    pub fn request_seek(&mut self, frame: FrameIndex) {
        self.requested_seek = Some(self.clamp_to_range(frame));
        self.request();
    }

    /// Step one frame back on the next update.
    pub fn request_previous_frame(&mut self) {
        let f = self.playback.frame().0.saturating_sub(1);
        self.request_seek(FrameIndex(f));
    }

    /// Step one frame forward on the next update.
    pub fn request_next_frame(&mut self) {
        self.request_seek(self.playback.frame().next());
    }

    /// Jump to the start of the timeline on the next update.
    pub fn request_reset(&mut self) {
        self.request_seek(FrameIndex(0));
    }

    /// Render the current frame again on the next update, even while paused.
    pub fn request_render(&mut self) {
        self.requested_render = true;
        self.request();
    }

    /// Recalculate the timeline on the next update, then return to the current frame.
    pub fn request_recalculation(&mut self) {
        self.requested_recalculation = true;
        self.request();
    }

    /// Restrict playback to `[start, end]` seconds; `None` is the whole timeline.
    pub fn set_range(&mut self, range: Option<[f64; 2]>) -> WavyteResult<()> {
        validate_range(range, "player range")?;
        self.range = range;
        self.request();
        Ok(())
    }

    /// Start requesting host frames.
    pub fn activate(&mut self) {
        self.active = true;
        self.request();
    }

    /// Stop requesting host frames and withdraw the pending request.
    ///
    /// An update that is already running completes.
    pub fn deactivate(&mut self) {
        self.active = false;
        if let Some(id) = self.pending.take() {
            self.host.cancel(id);
        }
    }

    /// Current controls.
    pub fn state(&self) -> PlayerState {
        self.state.get()
    }

    /// Timeline being played.
    pub fn playback(&self) -> &PlaybackManager {
        &self.playback
    }

    /// Compositor holding the last rendered frame.
    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    /// Apply new stage settings; only changed surfaces are reallocated.
    pub fn configure_stage(&mut self, settings: &StageSettings) {
        self.stage.configure(settings);
        self.request_render();
    }

    /// Active scrub range in frames, inclusive.
    pub fn range(&self) -> (FrameIndex, FrameIndex) {
        self.range_frames()
    }

    /// Control changes.
    pub fn state_signal(&mut self) -> &mut ValueDispatcher<PlayerState> {
        &mut self.state
    }

    /// Frame changes after every update.
    pub fn frame_signal(&mut self) -> &mut ValueDispatcher<FrameIndex> {
        &mut self.frame
    }

    /// Timeline length after every recalculation.
    pub fn duration_signal(&mut self) -> &mut ValueDispatcher<u64> {
        &mut self.duration
    }

    /// Fired after every render of the stage.
    pub fn render_signal(&mut self) -> &mut EventDispatcher<FrameIndex> {
        &mut self.rendered
    }

    /// Host request the player is waiting for.
    pub fn pending_request(&self) -> Option<RequestId> {
        self.pending
    }

    /// Seek that the next update will perform.
    pub fn pending_seek(&self) -> Option<FrameIndex> {
        self.requested_seek
    }

    /// Number of updates run so far.
    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    /// What the last update did.
    pub fn last_step(&self) -> Option<PlayerStep> {
        self.last_step
    }
}

#[cfg(test)]
#[path = "../../tests/unit/player/player.rs"]
mod tests;
