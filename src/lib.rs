//! Timeline scheduling core of a programmatic animation engine.
//!
//! Author-written scene scripts are turned into a deterministic, seekable and exportable stream
//! of frames:
//!
//! - A [`Scene`] drives one cooperative [`Script`] through its lifecycle and memoizes its length
//! - A [`PlaybackManager`] runs an ordered list of scenes on one global frame clock
//! - A [`Player`] drives playback in real time against an [`AudioClock`]
//! - A [`Renderer`] exports a frame range through an [`Exporter`]
//! - A [`Stage`] composites the current and outgoing scenes into the final frame
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod draw;
mod export;
mod foundation;
mod playback;
mod player;
mod project;
mod render;
mod renderer;
mod scene;

pub use crate::foundation::cancel::CancellationToken;
pub use crate::foundation::clock::{Clock, ManualClock, SystemClock};
pub use crate::foundation::core::{
    Canvas, Fps, FrameIndex, FrameRange, Rect, Rgba8Premul, Size, Vec2,
};
pub use crate::foundation::error::{WavyteError, WavyteResult};
pub use crate::foundation::random::Rng64;
pub use crate::foundation::signal::{EventDispatcher, SubscriptionId, ValueDispatcher};

pub use crate::draw::shapes::{Image, ImageLoader, Rectangle};
pub use crate::render::stage::{Stage, StageSettings};
pub use crate::render::surface::{ColorSpace, Surface, SurfaceDesc};

pub use crate::scene::context::{SceneContext, Slide};
pub use crate::scene::scene::{
    MAX_RENDER_ATTEMPTS, Scene, SceneCache, SceneDescription, SceneInfo, SceneSettings,
};
pub use crate::scene::script::{
    Deferred, FnScript, Frames, ImageData, ResourceValue, Resume, Script, ScriptFactory, Step,
    Yielded, action, await_resource, factory, frames, script_fn, sequence, wait_frames,
};
pub use crate::scene::transition::{SceneState, Transition, TransitionStyle, WipeDir};
pub use crate::scene::view::{DrawContext, Drawable, ResourceCache, View};

pub use crate::playback::manager::{PlaybackManager, PlaybackState};
pub use crate::player::audio::{AudioClock, Silence};
pub use crate::player::host::{FrameHost, ManualHost, RequestId};
pub use crate::player::player::{
    AUDIO_PREROLL_FRAMES, MAX_AUDIO_DESYNC, Player, PlayerState, PlayerStep, THROTTLE_GUARD_FPS,
};

pub use crate::export::ffmpeg::{FfmpegExporter, FfmpegOptions, is_ffmpeg_on_path};
pub use crate::export::image_sequence::{ImageSequenceExporter, ImageSequenceOptions};
pub use crate::export::memory::{Capture, CapturedFrame, InMemoryExporter};
pub use crate::export::{
    AckSender, ExportContext, Exporter, ExporterFactory, ExporterMeta, ExporterRegistry,
    FrameStatus,
};
pub use crate::project::{
    ExporterSettings, PlayerSettings, PreviewSettings, Project, ProjectSettings, RenderSettings,
};
pub use crate::renderer::estimator::{TimeEstimate, TimeEstimator};
pub use crate::renderer::renderer::{
    AbortHandle, BACKPRESSURE_RETRY, HOST_YIELD_INTERVAL, MAX_FRAMES_IN_FLIGHT, RenderResult,
    RenderStats, Renderer, RendererState,
};
