use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::export::{ExportContext, Exporter, ExporterMeta, FrameStatus};
use crate::foundation::cancel::CancellationToken;
use crate::foundation::core::{Canvas, FrameIndex};
use crate::foundation::error::WavyteResult;
use crate::render::surface::Surface;
use crate::renderer::renderer::RenderResult;

pub(crate) const ID: &str = "in-memory";

/// One frame as seen by [`InMemoryExporter`].
#[derive(Clone, Debug, PartialEq)]
pub struct CapturedFrame {
    /// Global frame.
    pub frame: FrameIndex,
    /// Frame within its scene.
    pub scene_frame: u64,
    /// Scene that produced the frame.
    pub scene_name: String,
    /// Premultiplied RGBA8 pixels, when pixel capture is enabled.
    pub pixels: Option<Vec<u8>>,
}

/// Everything an [`InMemoryExporter`] recorded.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Capture {
    /// `(from, to, size)` of every `start` call.
    pub starts: Vec<(FrameIndex, FrameIndex, Canvas)>,
    /// Frames in the order they arrived.
    pub frames: Vec<CapturedFrame>,
    /// Results passed to `stop`.
    pub stops: Vec<RenderResult>,
}

/// Exporter that records frames in memory. Clones share the same [`Capture`].
#[derive(Clone, Debug, Default)]
pub struct InMemoryExporter {
    capture: Arc<Mutex<Capture>>,
    keep_pixels: bool,
}

impl InMemoryExporter {
    /// Record frame metadata only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Also copy the pixels of every frame.
    pub fn with_pixels() -> Self {
        Self {
            keep_pixels: true,
            ..Self::default()
        }
    }

    /// Snapshot of what was recorded so far.
    pub fn capture(&self) -> Capture {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Capture> {
        self.capture.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Exporter for InMemoryExporter {
    fn meta(&self) -> ExporterMeta {
        ExporterMeta {
            id: ID.to_owned(),
            display_name: "In memory".to_owned(),
            options_schema: serde_json::json!({ "type": "object" }),
        }
    }

    fn start(&mut self, cx: &ExportContext<'_>) -> WavyteResult<()> {
        self.lock().starts.push((cx.from, cx.to, cx.size));
        Ok(())
    }

    fn handle_frame(
        &mut self,
        surface: &Surface,
        frame: FrameIndex,
        scene_frame: u64,
        scene_name: &str,
        _token: &CancellationToken,
    ) -> WavyteResult<FrameStatus> {
        let pixels = self.keep_pixels.then(|| surface.data().to_vec());
        self.lock().frames.push(CapturedFrame {
            frame,
            scene_frame,
            scene_name: scene_name.to_owned(),
            pixels,
        });
        Ok(FrameStatus::Done)
    }

    fn stop(&mut self, result: RenderResult) -> WavyteResult<()> {
        self.lock().stops.push(result);
        Ok(())
    }
}
