//! Exporter contract and the built-in exporters.
//!
//! The [`crate::Renderer`] hands every rendered frame to one [`Exporter`]. Exporters that finish
//! a frame synchronously return [`FrameStatus::Done`]; exporters that hand the frame to a worker
//! return [`FrameStatus::Pending`] and acknowledge it later through the [`AckSender`] in their
//! [`ExportContext`]. The renderer keeps a bounded number of frames unacknowledged.

pub(crate) mod ffmpeg;
pub(crate) mod image_sequence;
pub(crate) mod memory;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::mpsc;

use crate::foundation::cancel::CancellationToken;
use crate::foundation::core::{Canvas, Fps, FrameIndex};
use crate::foundation::error::{WavyteError, WavyteResult};
use crate::project::RenderSettings;
use crate::render::surface::Surface;
use crate::renderer::renderer::RenderResult;

/// Static description of an exporter.
#[derive(Clone, Debug, PartialEq)]
pub struct ExporterMeta {
    /// Registry id.
    pub id: String,
    /// Human readable name.
    pub display_name: String,
    /// JSON schema of the accepted options object.
    pub options_schema: serde_json::Value,
}

/// What an exporter learns about the run before the first frame.
#[derive(Clone, Debug)]
pub struct ExportContext<'a> {
    /// Effective render settings, after [`Exporter::configuration`] overrides.
    pub settings: &'a RenderSettings,
    /// First exported frame.
    pub from: FrameIndex,
    /// Last exported frame (inclusive).
    pub to: FrameIndex,
    /// Physical frame size in pixels.
    pub size: Canvas,
    /// Export frame rate.
    pub fps: Fps,
    /// Channel for acknowledging frames returned as [`FrameStatus::Pending`].
    pub acks: AckSender,
}

impl ExportContext<'_> {
    /// Number of frames the run will export when it is not aborted.
    pub fn frame_count(&self) -> u64 {
        self.to.0 - self.from.0 + 1
    }
}

/// Outcome of [`Exporter::handle_frame`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    /// The frame is fully handled.
    Done,
    /// The frame will be acknowledged later through [`AckSender::ack`].
    Pending,
}

/// Consumer of rendered frames.
///
/// `start` is called once before the first frame and `stop` exactly once after the exporter was
/// created, whatever the run outcome. Frames arrive in strictly increasing order.
pub trait Exporter: Send {
    /// Static description.
    fn meta(&self) -> ExporterMeta;

    /// Optionally override the render settings before the run starts.
    fn configuration(&self, _settings: &RenderSettings) -> WavyteResult<Option<RenderSettings>> {
        Ok(None)
    }

    /// Called once before the first frame.
    fn start(&mut self, _cx: &ExportContext<'_>) -> WavyteResult<()> {
        Ok(())
    }

    /// Consume one frame. `surface` is only valid for the duration of the call.
    fn handle_frame(
        &mut self,
        surface: &Surface,
        frame: FrameIndex,
        scene_frame: u64,
        scene_name: &str,
        token: &CancellationToken,
    ) -> WavyteResult<FrameStatus>;

    /// Called once when the run ends.
    fn stop(&mut self, _result: RenderResult) -> WavyteResult<()> {
        Ok(())
    }
}

/// Sending half of the frame acknowledgment channel.
#[derive(Clone, Debug)]
pub struct AckSender(mpsc::Sender<FrameIndex>);

impl AckSender {
    /// Acknowledge `frame`. Returns `false` once the run is over.
    pub fn ack(&self, frame: FrameIndex) -> bool {
        self.0.send(frame).is_ok()
    }
}

/// Frames handed to an exporter that have not been acknowledged yet.
pub(crate) struct FrameAcks {
    tx: mpsc::Sender<FrameIndex>,
    rx: mpsc::Receiver<FrameIndex>,
    in_flight: BTreeSet<u64>,
}

impl FrameAcks {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            tx,
            rx,
            in_flight: BTreeSet::new(),
        }
    }

    pub(crate) fn sender(&self) -> AckSender {
        AckSender(self.tx.clone())
    }

    pub(crate) fn track(&mut self, frame: FrameIndex) {
        self.in_flight.insert(frame.0);
    }

    /// Apply every acknowledgment received so far. Returns how many frames were released.
    pub(crate) fn drain(&mut self) -> usize {
        let mut released = 0;
        while let Ok(frame) = self.rx.try_recv() {
            if self.in_flight.remove(&frame.0) {
                released += 1;
            }
        }
        released
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

/// Builds an exporter from its JSON options.
pub type ExporterFactory =
    Box<dyn Fn(&serde_json::Value) -> WavyteResult<Box<dyn Exporter>> + Send + Sync>;

/// Exporters available to the renderer, by id.
pub struct ExporterRegistry {
    factories: BTreeMap<String, ExporterFactory>,
}

impl Default for ExporterRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for ExporterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExporterRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}

impl ExporterRegistry {
    /// A registry with nothing registered.
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// A registry holding the image sequence and ffmpeg exporters.
    pub fn with_builtins() -> Self {
        let mut reg = Self::empty();
        reg.register(image_sequence::ID, |opts| {
            Ok(Box::new(image_sequence::ImageSequenceExporter::from_options(opts)?))
        });
        reg.register(ffmpeg::ID, |opts| {
            Ok(Box::new(ffmpeg::FfmpegExporter::from_options(opts)?))
        });
        reg
    }

    /// Register `factory` under `id`, replacing any previous registration.
    pub fn register(
        &mut self,
        id: impl Into<String>,
        factory: impl Fn(&serde_json::Value) -> WavyteResult<Box<dyn Exporter>> + Send + Sync + 'static,
    ) {
        self.factories.insert(id.into(), Box::new(factory));
    }

    /// Registered ids in sorted order.
    pub fn ids(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Instantiate the exporter registered under `id`.
    pub fn create(&self, id: &str, options: &serde_json::Value) -> WavyteResult<Box<dyn Exporter>> {
        let Some(factory) = self.factories.get(id) else {
            return Err(WavyteError::export(format!(
                "unknown exporter '{id}' (available: {})",
                self.ids().join(", ")
            )));
        };
        factory(options)
    }
}

/// Parse exporter options, treating `null` as an empty object.
pub(crate) fn parse_options<T>(id: &str, options: &serde_json::Value) -> WavyteResult<T>
where
    T: serde::de::DeserializeOwned,
{
    let options = if options.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        options.clone()
    };
    serde_json::from_value(options)
        .map_err(|e| WavyteError::validation(format!("{id} exporter options: {e}")))
}

#[cfg(test)]
#[path = "../../tests/unit/export/mod.rs"]
mod tests;
