/// External audio clock the player keeps the animation in sync with.
///
/// Times are in seconds on the project timeline.
pub trait AudioClock: Send {
    /// Current playback position.
    fn time(&self) -> f64;

    /// Move the playback position.
    fn set_time(&mut self, secs: f64);

    /// Pause or resume. Returns `true` when playback actually started.
    fn set_paused(&mut self, paused: bool) -> bool;

    /// Whether audio is loaded and can be used as a clock.
    fn is_ready(&self) -> bool;

    /// Whether `secs` lies inside the audio track.
    fn is_in_range(&self, secs: f64) -> bool;

    /// Mute or unmute.
    fn set_muted(&mut self, muted: bool);

    /// Offset of the audio track relative to the timeline.
    fn set_offset(&mut self, secs: f64);
}

/// Audio clock for projects without sound. Never ready, so it never drives the animation.
#[derive(Clone, Copy, Debug, Default)]
pub struct Silence;

impl AudioClock for Silence {
    fn time(&self) -> f64 {
        0.0
    }

    fn set_time(&mut self, _secs: f64) {}

    fn set_paused(&mut self, _paused: bool) -> bool {
        false
    }

    fn is_ready(&self) -> bool {
        false
    }

    fn is_in_range(&self, _secs: f64) -> bool {
        false
    }

    fn set_muted(&mut self, _muted: bool) {}

    fn set_offset(&mut self, _secs: f64) {}
}
