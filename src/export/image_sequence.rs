use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread::JoinHandle;

use anyhow::Context as _;

use crate::export::{AckSender, ExportContext, Exporter, ExporterMeta, FrameStatus, parse_options};
use crate::foundation::cancel::CancellationToken;
use crate::foundation::core::FrameIndex;
use crate::foundation::error::{WavyteError, WavyteResult};
use crate::render::surface::Surface;
use crate::renderer::renderer::RenderResult;

pub(crate) const ID: &str = "image-sequence";

/// Options accepted by [`ImageSequenceExporter`].
#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImageSequenceOptions {
    /// Root directory; frames land in `<out_dir>/<render name>/`.
    pub out_dir: PathBuf,
    /// Zero padding of the frame number in file names.
    pub digits: usize,
    /// Frames buffered between the renderer and the writer thread.
    pub queue: usize,
}

impl Default for ImageSequenceOptions {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("output"),
            digits: 6,
            queue: 4,
        }
    }
}

struct Job {
    frame: FrameIndex,
    path: PathBuf,
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

struct Worker {
    tx: mpsc::SyncSender<Job>,
    handle: JoinHandle<WavyteResult<u64>>,
}

/// Writes one PNG per frame from a background thread.
///
/// Frames are acknowledged from the writer thread once the file is on disk.
pub struct ImageSequenceExporter {
    opts: ImageSequenceOptions,
    dir: Option<PathBuf>,
    worker: Option<Worker>,
}

impl ImageSequenceExporter {
    /// Create an exporter with explicit options.
    pub fn new(opts: ImageSequenceOptions) -> Self {
        Self {
            opts,
            dir: None,
            worker: None,
        }
    }

    /// Create an exporter from registry options.
    pub fn from_options(options: &serde_json::Value) -> WavyteResult<Self> {
        let opts: ImageSequenceOptions = parse_options(ID, options)?;
        if opts.queue == 0 {
            return Err(WavyteError::validation(
                "image-sequence exporter queue must be > 0",
            ));
        }
        Ok(Self::new(opts))
    }

    /// Directory frames are written to, once started.
    pub fn output_dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    fn frame_path(&self, dir: &Path, frame: FrameIndex) -> PathBuf {
        dir.join(format!("{:0width$}.png", frame.0, width = self.opts.digits))
    }

    fn finish_worker(&mut self) -> WavyteResult<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        drop(worker.tx);
        let written = worker
            .handle
            .join()
            .map_err(|_| WavyteError::export("image-sequence writer thread panicked"))??;
        tracing::debug!(written, "image sequence writer finished");
        Ok(())
    }
}

impl Exporter for ImageSequenceExporter {
    fn meta(&self) -> ExporterMeta {
        ExporterMeta {
            id: ID.to_owned(),
            display_name: "Image sequence (PNG)".to_owned(),
            options_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "out_dir": { "type": "string" },
                    "digits": { "type": "integer", "minimum": 0 },
                    "queue": { "type": "integer", "minimum": 1 }
                },
                "additionalProperties": false
            }),
        }
    }

    fn start(&mut self, cx: &ExportContext<'_>) -> WavyteResult<()> {
        let dir = self.opts.out_dir.join(&cx.settings.name);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create output directory '{}'", dir.display()))?;

        let (tx, rx) = mpsc::sync_channel::<Job>(self.opts.queue);
        let acks = cx.acks.clone();
        let handle = std::thread::spawn(move || write_frames(rx, acks));
        self.worker = Some(Worker { tx, handle });
        self.dir = Some(dir);
        Ok(())
    }

    fn handle_frame(
        &mut self,
        surface: &Surface,
        frame: FrameIndex,
        _scene_frame: u64,
        _scene_name: &str,
        _token: &CancellationToken,
    ) -> WavyteResult<FrameStatus> {
        let Some(dir) = self.dir.as_deref() else {
            return Err(WavyteError::export("image-sequence exporter not started"));
        };
        let path = self.frame_path(dir, frame);
        let Some(worker) = self.worker.as_ref() else {
            return Err(WavyteError::export("image-sequence exporter not started"));
        };

        let mut rgba = surface.data().to_vec();
        unpremultiply_in_place(&mut rgba);
        let job = Job {
            frame,
            path,
            width: surface.width(),
            height: surface.height(),
            rgba,
        };
        if worker.tx.send(job).is_err() {
            // The writer only exits early on an IO error; `stop` reports it.
            return Err(WavyteError::export("image-sequence writer stopped"));
        }
        Ok(FrameStatus::Pending)
    }

    fn stop(&mut self, result: RenderResult) -> WavyteResult<()> {
        tracing::debug!(?result, "stopping image sequence exporter");
        self.finish_worker()
    }
}

impl Drop for ImageSequenceExporter {
    fn drop(&mut self) {
        if let Err(e) = self.finish_worker() {
            tracing::warn!(error = %e, "image sequence writer failed during drop");
        }
    }
}

fn write_frames(rx: mpsc::Receiver<Job>, acks: AckSender) -> WavyteResult<u64> {
    let mut written = 0u64;
    for job in rx {
        image::save_buffer_with_format(
            &job.path,
            &job.rgba,
            job.width,
            job.height,
            image::ColorType::Rgba8,
            image::ImageFormat::Png,
        )
        .with_context(|| format!("failed to write '{}'", job.path.display()))?;
        written += 1;
        acks.ack(job.frame);
    }
    Ok(written)
}

pub(crate) fn unpremultiply_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = u16::from(px[3]);
        if a == 0 {
            px[..3].fill(0);
            continue;
        }
        for c in &mut px[..3] {
            *c = ((u16::from(*c) * 255 + a / 2) / a).min(255) as u8;
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/export/image_sequence.rs"]
mod tests;
