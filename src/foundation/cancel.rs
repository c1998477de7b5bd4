//! Cooperative cancellation shared between a render and its exporters.
//!
//! Cancelling never interrupts work; holders check [`CancellationToken::is_cancelled`] at their
//! next step boundary. Only the synchronous half of the token is used, so no runtime is needed.

pub use tokio_util::sync::CancellationToken;
