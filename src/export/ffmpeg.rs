use std::io::{Read, Write as _};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::JoinHandle;

use crate::export::{ExportContext, Exporter, ExporterMeta, FrameStatus, parse_options};
use crate::foundation::cancel::CancellationToken;
use crate::foundation::core::{Fps, FrameIndex};
use crate::foundation::error::{WavyteError, WavyteResult};
use crate::foundation::math::mul_div255_u16;
use crate::render::surface::Surface;
use crate::renderer::renderer::RenderResult;

pub(crate) const ID: &str = "ffmpeg";

/// Options accepted by [`FfmpegExporter`].
#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FfmpegOptions {
    /// Output file; defaults to `output/<render name>.mp4`.
    pub out_path: Option<PathBuf>,
    /// Overwrite the output file if it already exists.
    pub overwrite: bool,
    /// Straight-alpha RGBA8 colour transparent pixels are flattened over.
    pub background: [u8; 4],
}

impl Default for FfmpegOptions {
    fn default() -> Self {
        Self {
            out_path: None,
            overwrite: true,
            background: [0, 0, 0, 255],
        }
    }
}

struct Encoder {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
}

/// Streams frames into a system `ffmpeg` process producing an H.264 MP4.
pub struct FfmpegExporter {
    opts: FfmpegOptions,
    out_path: Option<PathBuf>,
    encoder: Option<Encoder>,
    scratch: Vec<u8>,
    last_frame: Option<FrameIndex>,
}

impl FfmpegExporter {
    /// Create an exporter with explicit options.
    pub fn new(opts: FfmpegOptions) -> Self {
        Self {
            opts,
            out_path: None,
            encoder: None,
            scratch: Vec::new(),
            last_frame: None,
        }
    }

    /// Create an exporter from registry options.
    pub fn from_options(options: &serde_json::Value) -> WavyteResult<Self> {
        Ok(Self::new(parse_options(ID, options)?))
    }

    /// File being written, once started.
    pub fn out_path(&self) -> Option<&Path> {
        self.out_path.as_deref()
    }

    fn finish(&mut self) -> WavyteResult<()> {
        let Some(mut enc) = self.encoder.take() else {
            return Ok(());
        };
        drop(enc.stdin.take());
        let status = enc
            .child
            .wait()
            .map_err(|e| WavyteError::export(format!("failed to wait for ffmpeg to finish: {e}")))?;
        let stderr_bytes = match enc.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| WavyteError::export("ffmpeg stderr drain thread panicked"))?
                .map_err(|e| WavyteError::export(format!("ffmpeg stderr read failed: {e}")))?,
            None => Vec::new(),
        };
        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            return Err(WavyteError::export(format!(
                "ffmpeg exited with status {status}: {}",
                stderr.trim()
            )));
        }
        Ok(())
    }
}

impl Exporter for FfmpegExporter {
    fn meta(&self) -> ExporterMeta {
        ExporterMeta {
            id: ID.to_owned(),
            display_name: "MP4 (ffmpeg)".to_owned(),
            options_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "out_path": { "type": "string" },
                    "overwrite": { "type": "boolean" },
                    "background": {
                        "type": "array",
                        "items": { "type": "integer", "minimum": 0, "maximum": 255 },
                        "minItems": 4,
                        "maxItems": 4
                    }
                },
                "additionalProperties": false
            }),
        }
    }

    fn start(&mut self, cx: &ExportContext<'_>) -> WavyteResult<()> {
        let (width, height) = (cx.size.width, cx.size.height);
        if width == 0 || height == 0 {
            return Err(WavyteError::validation(
                "ffmpeg exporter width/height must be non-zero",
            ));
        }
        if !width.is_multiple_of(2) || !height.is_multiple_of(2) {
            return Err(WavyteError::validation(
                "ffmpeg exporter width/height must be even (required for yuv420p mp4 output)",
            ));
        }

        let out_path = self
            .opts
            .out_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("output").join(format!("{}.mp4", cx.settings.name)));
        ensure_parent_dir(&out_path)?;
        if !self.opts.overwrite && out_path.exists() {
            return Err(WavyteError::validation(format!(
                "output file '{}' already exists",
                out_path.display()
            )));
        }
        if !is_ffmpeg_on_path() {
            return Err(WavyteError::export(
                "ffmpeg is required for MP4 export, but was not found on PATH",
            ));
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .arg(if self.opts.overwrite { "-y" } else { "-n" });
        // Frames are flattened to opaque RGBA before they reach stdin.
        cmd.args([
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{width}x{height}"),
        ]);
        push_input_fps(&mut cmd, cx.fps);
        cmd.args(["-i", "pipe:0"]).args([
            "-an",
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
        ]);
        cmd.arg(&out_path);

        let mut child = cmd.spawn().map_err(|e| {
            WavyteError::export(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| WavyteError::export("failed to open ffmpeg stdin"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| WavyteError::export("failed to open ffmpeg stderr"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut bytes = Vec::new();
            stderr.read_to_end(&mut bytes)?;
            Ok(bytes)
        });

        self.scratch = vec![0u8; width as usize * height as usize * 4];
        self.encoder = Some(Encoder {
            child,
            stdin: Some(stdin),
            stderr_drain: Some(stderr_drain),
        });
        self.out_path = Some(out_path);
        self.last_frame = None;
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
        if let Some(last) = self.last_frame
            && frame.0 <= last.0
        {
            return Err(WavyteError::export(
                "ffmpeg exporter received out-of-order frame index",
            ));
        }
        self.last_frame = Some(frame);

        if surface.data().len() != self.scratch.len() {
            return Err(WavyteError::validation(format!(
                "frame size mismatch: got {}x{}",
                surface.width(),
                surface.height()
            )));
        }
        flatten_premul_over_bg(&mut self.scratch, surface.data(), self.opts.background);

        let Some(stdin) = self.encoder.as_mut().and_then(|e| e.stdin.as_mut()) else {
            return Err(WavyteError::export("ffmpeg exporter not started"));
        };
        stdin.write_all(&self.scratch).map_err(|e| {
            WavyteError::export(format!("failed to write frame to ffmpeg stdin: {e}"))
        })?;
        Ok(FrameStatus::Done)
    }

    fn stop(&mut self, result: RenderResult) -> WavyteResult<()> {
        tracing::debug!(?result, "closing ffmpeg");
        self.finish()
    }
}

fn push_input_fps(cmd: &mut Command, fps: Fps) {
    // rawvideo input takes its rate from `-r` placed before `-i`.
    cmd.args(["-r", &format!("{}/{}", fps.num, fps.den)]);
}

/// Flatten premultiplied RGBA8 over a straight-alpha background into opaque RGBA8.
pub(crate) fn flatten_premul_over_bg(dst: &mut [u8], src_premul: &[u8], bg_rgba: [u8; 4]) {
    let bg_r = u16::from(bg_rgba[0]);
    let bg_g = u16::from(bg_rgba[1]);
    let bg_b = u16::from(bg_rgba[2]);

    for (d, s) in dst.chunks_exact_mut(4).zip(src_premul.chunks_exact(4)) {
        let a = u16::from(s[3]);
        if a == 255 {
            d.copy_from_slice(s);
            continue;
        }
        let inv = 255 - a;
        d[0] = (u16::from(s[0]) + mul_div255_u16(bg_r, inv)).min(255) as u8;
        d[1] = (u16::from(s[1]) + mul_div255_u16(bg_g, inv)).min(255) as u8;
        d[2] = (u16::from(s[2]) + mul_div255_u16(bg_b, inv)).min(255) as u8;
        d[3] = 255;
    }
}

fn ensure_parent_dir(path: &Path) -> WavyteResult<()> {
    if let Some(parent) = path.parent() {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
