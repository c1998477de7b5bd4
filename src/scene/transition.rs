/// Lifecycle state of a scene run.
///
/// The order is `Initial < AfterTransitionIn < CanTransitionOut < Finished`. A fresh run starts in
/// `AfterTransitionIn`; a script that animates its entrance steps back to `Initial` once, right
/// after reset, and forward again when the entrance is over.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SceneState {
    /// Transition-in in progress; the outgoing scene is still drawn.
    Initial,
    /// Transition-in is over (or there was none).
    #[default]
    AfterTransitionIn,
    /// The scene allows its successor to start.
    CanTransitionOut,
    /// The script completed.
    Finished,
}

/// Direction of a wipe transition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WipeDir {
    /// Reveal from the left edge.
    #[default]
    LeftToRight,
    /// Reveal from the right edge.
    RightToLeft,
    /// Reveal from the top edge.
    TopToBottom,
    /// Reveal from the bottom edge.
    BottomToTop,
}

/// How the stage combines the outgoing and incoming scene during a transition.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransitionStyle {
    /// Draw both scenes as layers; the scripts animate their own content.
    #[default]
    Layered,
    /// Blend from outgoing to incoming by the transition progress.
    Crossfade,
    /// Reveal the incoming scene along an edge.
    Wipe {
        /// Reveal direction.
        #[serde(default)]
        dir: WipeDir,
        /// Soft edge width as a fraction of the wipe axis, `0..=1`.
        #[serde(default)]
        soft_edge: f32,
    },
}

/// Transition parameters published by the incoming scene's script.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Transition {
    /// Blend style.
    pub style: TransitionStyle,
    /// Draw the outgoing scene above the incoming one.
    pub previous_on_top: bool,
    /// Blend progress in `0..=1`; ignored by [`TransitionStyle::Layered`].
    pub progress: f32,
}
