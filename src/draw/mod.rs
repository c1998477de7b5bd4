//! Minimal built-in drawables. Real projects plug their own [`crate::Drawable`] implementations.

pub(crate) mod shapes;
