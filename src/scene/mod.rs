//! Scenes: cooperative scripts, their lifecycle and their duration cache.

pub(crate) mod context;
#[allow(clippy::module_inception)]
pub(crate) mod scene;
pub(crate) mod script;
pub(crate) mod transition;
pub(crate) mod view;
