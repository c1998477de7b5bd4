//! Cooperative script model.
//!
//! A script is an explicit resumable state machine. The scene drives it with [`Script::resume`]
//! and interprets what it yields: frame boundaries, deferred resources to wait for, nested
//! sub-scripts (push-down), or arbitrary values it does not recognize.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use crate::foundation::error::WavyteResult;
use crate::scene::context::SceneContext;
use crate::scene::scene::SceneInfo;

/// Decoded image in premultiplied RGBA8.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageData {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Premultiplied RGBA8, row-major, tightly packed.
    pub rgba8_premul: Arc<Vec<u8>>,
}

/// Value produced by resolving a [`Deferred`].
#[derive(Clone, Debug, PartialEq)]
pub enum ResourceValue {
    /// Completion without a payload.
    Unit,
    /// Structured data.
    Json(serde_json::Value),
    /// Raw bytes.
    Bytes(Arc<Vec<u8>>),
    /// Decoded image.
    Image(ImageData),
}

type Resolver = Box<dyn FnOnce() -> WavyteResult<ResourceValue> + Send>;

/// A pending asynchronous result.
///
/// Resolving blocks the current step until the value is available; only one step of one scene
/// is ever waiting at a time.
pub struct Deferred {
    label: String,
    resolve: Resolver,
}

impl Deferred {
    /// Wrap a resolver closure.
    pub fn new(
        label: impl Into<String>,
        resolve: impl FnOnce() -> WavyteResult<ResourceValue> + Send + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            resolve: Box::new(resolve),
        }
    }

    /// An already-resolved value.
    pub fn ready(label: impl Into<String>, value: ResourceValue) -> Self {
        Self::new(label, move || Ok(value))
    }

    /// Diagnostic label (usually the resource key).
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Wait for the value.
    pub fn resolve(self) -> WavyteResult<ResourceValue> {
        (self.resolve)()
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Input fed back into a script when it is resumed.
#[derive(Debug)]
pub enum Resume {
    /// First resume of a fresh script.
    Start,
    /// A new frame started.
    Next,
    /// The deferred value the script waited for.
    Resolved(ResourceValue),
    /// The deferred value failed to resolve; the failure was already logged.
    Failed(String),
    /// A nested script yielded by this script completed.
    Completed,
    /// An unrecognized yielded value, passed back unchanged.
    Value(serde_json::Value),
}

/// Something a script hands to its driver.
pub enum Yielded {
    /// End of the current logical step (one frame).
    Frame,
    /// Wait for an asynchronous result.
    Deferred(Deferred),
    /// Run a sub-script to completion before resuming.
    Nested(Box<dyn Script>),
    /// A value the driver does not understand.
    Value(serde_json::Value),
}

impl fmt::Debug for Yielded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Frame => f.write_str("Frame"),
            Self::Deferred(d) => f.debug_tuple("Deferred").field(d).finish(),
            Self::Nested(_) => f.write_str("Nested(..)"),
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
        }
    }
}

/// Result of one resume.
#[derive(Debug)]
pub enum Step {
    /// The script suspended with a value.
    Yield(Yielded),
    /// The script ran to completion.
    Complete,
}

/// An author-written cooperative script.
pub trait Script: Send {
    /// Run until the next suspension point.
    fn resume(&mut self, cx: &mut SceneContext<'_>, input: Resume) -> WavyteResult<Step>;
}

/// Creates a fresh run of a scene's script.
pub trait ScriptFactory: Send + Sync {
    /// Build a new script instance for `info`.
    fn create(&self, info: &SceneInfo) -> WavyteResult<Box<dyn Script>>;
}

impl<F> ScriptFactory for F
where
    F: Fn(&SceneInfo) -> WavyteResult<Box<dyn Script>> + Send + Sync,
{
    fn create(&self, info: &SceneInfo) -> WavyteResult<Box<dyn Script>> {
        self(info)
    }
}

/// Script backed by a closure.
pub struct FnScript<F>(F);

impl<F> Script for FnScript<F>
where
    F: FnMut(&mut SceneContext<'_>, Resume) -> WavyteResult<Step> + Send,
{
    fn resume(&mut self, cx: &mut SceneContext<'_>, input: Resume) -> WavyteResult<Step> {
        (self.0)(cx, input)
    }
}

/// Box a closure as a script.
pub fn script_fn<F>(f: F) -> Box<dyn Script>
where
    F: FnMut(&mut SceneContext<'_>, Resume) -> WavyteResult<Step> + Send + 'static,
{
    Box::new(FnScript(f))
}

/// Yields `count` frames, calling `each(cx, i)` before frame `i`.
pub struct Frames<F> {
    count: u64,
    done: u64,
    each: F,
}

impl<F> Script for Frames<F>
where
    F: FnMut(&mut SceneContext<'_>, u64) -> WavyteResult<()> + Send,
{
    fn resume(&mut self, cx: &mut SceneContext<'_>, _input: Resume) -> WavyteResult<Step> {
        if self.done >= self.count {
            return Ok(Step::Complete);
        }
        (self.each)(cx, self.done)?;
        self.done += 1;
        Ok(Step::Yield(Yielded::Frame))
    }
}

/// `count` frames with a per-frame callback.
pub fn frames<F>(count: u64, each: F) -> Box<dyn Script>
where
    F: FnMut(&mut SceneContext<'_>, u64) -> WavyteResult<()> + Send + 'static,
{
    Box::new(Frames {
        count,
        done: 0,
        each,
    })
}

/// `count` empty frames.
pub fn wait_frames(count: u64) -> Box<dyn Script> {
    frames(count, |_, _| Ok(()))
}

struct Action<F>(Option<F>);

impl<F> Script for Action<F>
where
    F: FnOnce(&mut SceneContext<'_>) -> WavyteResult<()> + Send,
{
    fn resume(&mut self, cx: &mut SceneContext<'_>, _input: Resume) -> WavyteResult<Step> {
        if let Some(f) = self.0.take() {
            f(cx)?;
        }
        Ok(Step::Complete)
    }
}

/// Run `f` once without consuming a frame.
pub fn action<F>(f: F) -> Box<dyn Script>
where
    F: FnOnce(&mut SceneContext<'_>) -> WavyteResult<()> + Send + 'static,
{
    Box::new(Action(Some(f)))
}

struct Sequence {
    children: VecDeque<Box<dyn Script>>,
}

impl Script for Sequence {
    fn resume(&mut self, _cx: &mut SceneContext<'_>, _input: Resume) -> WavyteResult<Step> {
        Ok(match self.children.pop_front() {
            Some(child) => Step::Yield(Yielded::Nested(child)),
            None => Step::Complete,
        })
    }
}

/// Run `children` one after another.
pub fn sequence(children: Vec<Box<dyn Script>>) -> Box<dyn Script> {
    Box::new(Sequence {
        children: children.into(),
    })
}

struct AwaitResource<F> {
    deferred: Option<Deferred>,
    then: Option<F>,
}

impl<F> Script for AwaitResource<F>
where
    F: FnOnce(&mut SceneContext<'_>, Result<ResourceValue, String>) -> WavyteResult<()> + Send,
{
    fn resume(&mut self, cx: &mut SceneContext<'_>, input: Resume) -> WavyteResult<Step> {
        if let Some(d) = self.deferred.take() {
            return Ok(Step::Yield(Yielded::Deferred(d)));
        }
        let value = match input {
            Resume::Resolved(v) => Ok(v),
            Resume::Failed(msg) => Err(msg),
            other => Err(format!("unexpected resume input {other:?}")),
        };
        if let Some(then) = self.then.take() {
            then(cx, value)?;
        }
        Ok(Step::Complete)
    }
}

/// Wait for `deferred`, then hand the outcome to `then` within the same step.
pub fn await_resource<F>(deferred: Deferred, then: F) -> Box<dyn Script>
where
    F: FnOnce(&mut SceneContext<'_>, Result<ResourceValue, String>) -> WavyteResult<()>
        + Send
        + 'static,
{
    Box::new(AwaitResource {
        deferred: Some(deferred),
        then: Some(then),
    })
}

/// Wrap a closure as a [`ScriptFactory`].
pub fn factory<F>(f: F) -> Arc<dyn ScriptFactory>
where
    F: Fn(&SceneInfo) -> WavyteResult<Box<dyn Script>> + Send + Sync + 'static,
{
    Arc::new(f)
}
