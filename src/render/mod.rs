//! Drawing surfaces, pixel compositing and the three-surface stage.

pub(crate) mod composite;
pub(crate) mod stage;
pub(crate) mod surface;
