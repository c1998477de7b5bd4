//! Real-time interactive playback driven by host display-frame callbacks.

pub(crate) mod audio;
pub(crate) mod host;
#[allow(clippy::module_inception)]
pub(crate) mod player;
