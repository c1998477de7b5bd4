//! Global frame clock over many scenes.

pub(crate) mod manager;
