use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use wavyte_playback::{
    ExporterRegistry, PlaybackManager, Project, ProjectSettings, Rect, Rectangle, RenderResult,
    Renderer, Rgba8Premul, SceneContext, SceneDescription, SystemClock, TransitionStyle, action,
    factory, frames, sequence,
};

#[derive(Parser, Debug)]
#[command(name = "wavyte-playback", version)]
struct Cli {
    /// Log scheduler diagnostics.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Export the demo project.
    Render(RenderArgs),
    /// Print the demo timeline.
    Info(InfoArgs),
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Project settings JSON.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Output directory.
    #[arg(long)]
    out: PathBuf,

    /// Exporter id, overriding `rendering.exporter.name`.
    #[arg(long)]
    exporter: Option<String>,

    /// Abort the render after this many seconds.
    #[arg(long)]
    timeout: Option<f64>,
}

#[derive(Parser, Debug)]
struct InfoArgs {
    /// Project settings JSON.
    #[arg(long)]
    settings: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let outcome = match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Info(args) => cmd_info(args).map(|()| RenderResult::Success),
    };
    match outcome {
        Ok(RenderResult::Success) => ExitCode::SUCCESS,
        Ok(RenderResult::Aborted) => {
            eprintln!("aborted");
            ExitCode::from(130)
        }
        Ok(RenderResult::Error) => ExitCode::from(1),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn load_settings(path: Option<&Path>) -> anyhow::Result<ProjectSettings> {
    match path {
        Some(path) => ProjectSettings::from_path(path)
            .with_context(|| format!("load project settings '{}'", path.display())),
        None => Ok(ProjectSettings::default()),
    }
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<RenderResult> {
    let mut settings = load_settings(args.settings.as_deref())?;
    if let Some(id) = args.exporter {
        settings.rendering.exporter.name = id;
    }
    point_exporter_at(&mut settings, &args.out)?;

    let project = demo_project(settings)?;
    let mut renderer = Renderer::new(
        &project,
        ExporterRegistry::with_builtins(),
        Arc::new(SystemClock::new()),
    );

    if let Some(secs) = args.timeout {
        let timeout = Duration::try_from_secs_f64(secs)
            .with_context(|| format!("invalid --timeout {secs}"))?;
        let handle = renderer.abort_handle();
        std::thread::spawn(move || {
            std::thread::sleep(timeout);
            handle.abort();
        });
    }

    let result = renderer.render(&project.settings.rendering);
    let stats = renderer.stats();
    match result {
        RenderResult::Error => {
            if let Some(e) = renderer.last_error() {
                eprintln!("error: {e}");
            }
        }
        _ => eprintln!(
            "exported {} frames to {}",
            stats.frames_exported,
            args.out.display()
        ),
    }
    Ok(result)
}

/// Direct the built-in exporters' output into `out`.
fn point_exporter_at(settings: &mut ProjectSettings, out: &Path) -> anyhow::Result<()> {
    let exporter = &mut settings.rendering.exporter;
    let (key, value) = match exporter.name.as_str() {
        "image-sequence" => ("out_dir", out.to_path_buf()),
        "ffmpeg" => (
            "out_path",
            out.join(format!("{}.mp4", settings.rendering.name)),
        ),
        _ => return Ok(()),
    };
    if exporter.options.is_null() {
        exporter.options = serde_json::json!({});
    }
    let Some(options) = exporter.options.as_object_mut() else {
        anyhow::bail!("rendering.exporter.options must be an object");
    };
    options.insert(key.to_owned(), serde_json::to_value(value)?);
    Ok(())
}

fn cmd_info(args: InfoArgs) -> anyhow::Result<()> {
    let settings = load_settings(args.settings.as_deref())?;
    let project = demo_project(settings)?;
    let mut playback = PlaybackManager::new(
        &project.scenes,
        &project.settings.preview_scene_settings(),
    )?;
    playback.recalculate()?;

    let fps = playback.fps();
    println!(
        "{}: {} frames at {}/{} fps ({:.2}s)",
        project.name,
        playback.duration(),
        fps.num,
        fps.den,
        fps.frames_to_secs(playback.duration())
    );
    for scene in playback.scenes() {
        println!(
            "  {:<8} [{:>4}, {:>4})  transition {} frames",
            scene.name(),
            scene.first_frame().0,
            scene.last_frame().0,
            scene.transition_duration()
        );
    }
    Ok(())
}

fn moving_box(cx: &mut SceneContext<'_>, t: f64, color: Rgba8Premul) {
    let size = cx.size();
    let (w, h) = (f64::from(size.width), f64::from(size.height));
    let side = h / 4.0;
    let x = (w - side) * t;
    cx.view().insert(
        "box",
        Rectangle::new(Rect::new(x, (h - side) / 2.0, x + side, (h + side) / 2.0), color),
    );
}

/// Three scenes of 30, 45 and 20 frames; the middle one crossfades in over 10 frames.
fn demo_project(settings: ProjectSettings) -> anyhow::Result<Project> {
    let intro = SceneDescription::new(
        "intro",
        factory(|_| {
            Ok(frames(30, |cx, i| {
                moving_box(cx, i as f64 / 29.0, Rgba8Premul::opaque(230, 60, 90));
                Ok(())
            }))
        }),
    );
    let middle = SceneDescription::new(
        "middle",
        factory(|_| {
            Ok(sequence(vec![
                action(|cx| {
                    cx.use_transition(TransitionStyle::Crossfade, false);
                    Ok(())
                }),
                frames(10, |cx, i| {
                    cx.set_transition_progress((i + 1) as f32 / 10.0);
                    moving_box(cx, 0.0, Rgba8Premul::opaque(60, 170, 230));
                    Ok(())
                }),
                action(|cx| {
                    cx.finish_transition();
                    Ok(())
                }),
                frames(35, |cx, i| {
                    moving_box(cx, i as f64 / 34.0, Rgba8Premul::opaque(60, 170, 230));
                    Ok(())
                }),
            ]))
        }),
    );
    let outro = SceneDescription::new(
        "outro",
        factory(|_| {
            Ok(frames(20, |cx, i| {
                let fade = (255 - i * 12) as u8;
                moving_box(cx, 1.0, Rgba8Premul::from_straight_rgba(250, 200, 60, fade));
                Ok(())
            }))
        }),
    );
    Project::new("demo", settings, vec![intro, middle, outro]).context("build demo project")
}
