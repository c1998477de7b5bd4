//! Batch export driver and progress estimation.

pub(crate) mod estimator;
#[allow(clippy::module_inception)]
pub(crate) mod renderer;
