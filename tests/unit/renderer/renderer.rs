use super::*;
use crate::export::memory::InMemoryExporter;
use crate::export::{AckSender, ExporterMeta};
use crate::foundation::clock::ManualClock;
use crate::foundation::core::{Canvas, FrameIndex};
use crate::render::stage::StageSettings;
use crate::render::surface::Surface;
use crate::scene::script::{factory, frames};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

fn plain(name: &str, len: u64) -> SceneDescription {
    SceneDescription::new(name, factory(move |_| Ok(frames(len, |_, _| Ok(())))))
}

fn project() -> Project {
    let settings = ProjectSettings {
        stage: StageSettings {
            size: Canvas {
                width: 4,
                height: 4,
            },
            ..StageSettings::default()
        },
        ..ProjectSettings::default()
    };
    Project::new(
        "demo",
        settings,
        vec![plain("a", 30), plain("b", 45), plain("c", 20)],
    )
    .unwrap()
}

fn settings_for(exporter: &str) -> RenderSettings {
    RenderSettings {
        exporter: crate::project::ExporterSettings {
            name: exporter.to_owned(),
            ..Default::default()
        },
        ..RenderSettings::default()
    }
}

fn with_memory() -> (Renderer, InMemoryExporter) {
    let exporter = InMemoryExporter::new();
    let mut registry = ExporterRegistry::empty();
    let e = exporter.clone();
    registry.register("in-memory", move |_| Ok(Box::new(e.clone())));
    let renderer = Renderer::new(&project(), registry, Arc::new(ManualClock::new()));
    (renderer, exporter)
}

#[derive(Default)]
struct Recorder {
    stops: Arc<Mutex<Vec<RenderResult>>>,
    frames: Arc<AtomicUsize>,
    abort_at: Option<(u64, Option<AbortHandle>)>,
    saw_cancel: Arc<AtomicBool>,
    fail_start: bool,
    range: Option<[f64; 2]>,
}

impl Exporter for Recorder {
    fn meta(&self) -> ExporterMeta {
        ExporterMeta {
            id: "recorder".to_owned(),
            display_name: "Recorder".to_owned(),
            options_schema: serde_json::json!({}),
        }
    }

    fn configuration(&self, settings: &RenderSettings) -> WavyteResult<Option<RenderSettings>> {
        Ok(self.range.map(|range| RenderSettings {
            range: Some(range),
            ..settings.clone()
        }))
    }

    fn start(&mut self, _cx: &ExportContext<'_>) -> WavyteResult<()> {
        if self.fail_start {
            return Err(WavyteError::export("disk full"));
        }
        Ok(())
    }

    fn handle_frame(
        &mut self,
        _surface: &Surface,
        frame: FrameIndex,
        _scene_frame: u64,
        _scene_name: &str,
        token: &CancellationToken,
    ) -> WavyteResult<FrameStatus> {
        self.frames.fetch_add(1, Ordering::SeqCst);
        if let Some((at, Some(handle))) = &self.abort_at
            && frame.0 == *at
        {
            assert!(!token.is_cancelled());
            assert!(handle.abort());
            self.saw_cancel.store(token.is_cancelled(), Ordering::SeqCst);
        }
        Ok(FrameStatus::Done)
    }

    fn stop(&mut self, result: RenderResult) -> WavyteResult<()> {
        self.stops.lock().unwrap().push(result);
        Ok(())
    }
}

#[test]
fn a_full_render_exports_every_frame_in_order() {
    let (mut renderer, exporter) = with_memory();
    let results = Arc::new(Mutex::new(Vec::new()));
    let r = results.clone();
    renderer.results().subscribe(move |res| r.lock().unwrap().push(*res));

    assert_eq!(renderer.render(&settings_for("in-memory")), RenderResult::Success);

    let capture = exporter.capture();
    assert_eq!(
        capture.starts,
        vec![(FrameIndex(0), FrameIndex(95), Canvas { width: 4, height: 4 })]
    );
    let indices: Vec<u64> = capture.frames.iter().map(|f| f.frame.0).collect();
    assert_eq!(indices, (0..=95).collect::<Vec<_>>());
    assert_eq!(capture.frames[30].scene_name, "b");
    assert_eq!(capture.frames[30].scene_frame, 0);
    assert_eq!(capture.frames[80].scene_name, "c");
    assert_eq!(capture.frames[80].scene_frame, 5);
    assert_eq!(capture.stops, vec![RenderResult::Success]);

    assert_eq!(renderer.stats().frames_exported, 96);
    assert_eq!(renderer.state(), RendererState::Initial);
    assert_eq!(*results.lock().unwrap(), vec![RenderResult::Success]);
}

#[test]
fn a_range_exports_its_inclusive_frames() {
    let (mut renderer, exporter) = with_memory();
    let settings = RenderSettings {
        range: Some([1.0, 2.0]),
        ..settings_for("in-memory")
    };
    assert_eq!(renderer.render(&settings), RenderResult::Success);
    let capture = exporter.capture();
    assert_eq!(capture.frames.first().map(|f| f.frame), Some(FrameIndex(30)));
    assert_eq!(capture.frames.last().map(|f| f.frame), Some(FrameIndex(60)));
    assert_eq!(capture.frames.len(), 31);
}

#[test]
fn an_unknown_exporter_fails_the_render() {
    let (mut renderer, exporter) = with_memory();
    assert_eq!(renderer.render(&settings_for("gif")), RenderResult::Error);
    let err = renderer.last_error().unwrap();
    assert!(err.starts_with("export error: unknown exporter 'gif'"), "{err}");
    assert!(exporter.capture().stops.is_empty());
    assert_eq!(renderer.state(), RendererState::Initial);
}

#[test]
fn abort_from_inside_the_exporter_stops_once() {
    let stops = Arc::new(Mutex::new(Vec::new()));
    let frames = Arc::new(AtomicUsize::new(0));
    let handle_slot: Arc<Mutex<Option<AbortHandle>>> = Arc::new(Mutex::new(None));
    let saw_cancel = Arc::new(AtomicBool::new(false));

    let mut registry = ExporterRegistry::empty();
    let (s, f, h, c) = (
        stops.clone(),
        frames.clone(),
        handle_slot.clone(),
        saw_cancel.clone(),
    );
    registry.register("recorder", move |_| {
        Ok(Box::new(Recorder {
            stops: s.clone(),
            frames: f.clone(),
            abort_at: Some((10, h.lock().unwrap().clone())),
            saw_cancel: c.clone(),
            ..Recorder::default()
        }))
    });
    let mut renderer = Renderer::new(&project(), registry, Arc::new(ManualClock::new()));
    *handle_slot.lock().unwrap() = Some(renderer.abort_handle());

    let states = Arc::new(Mutex::new(Vec::new()));
    let st = states.clone();
    renderer
        .state_signal()
        .subscribe(move |s| st.lock().unwrap().push(*s));

    assert!(!renderer.abort(), "nothing to abort while idle");
    assert_eq!(renderer.render(&settings_for("recorder")), RenderResult::Aborted);
    assert_eq!(frames.load(Ordering::SeqCst), 11);
    assert!(saw_cancel.load(Ordering::SeqCst), "the exporter's token is the aborted one");
    assert_eq!(*stops.lock().unwrap(), vec![RenderResult::Aborted]);
    assert!(renderer.last_error().is_none());
    assert_eq!(
        *states.lock().unwrap(),
        vec![
            RendererState::Initial,
            RendererState::Working,
            RendererState::Aborting,
            RendererState::Initial
        ]
    );
    assert!(!renderer.abort());
}

#[test]
fn a_failing_start_still_stops_the_exporter() {
    let stops = Arc::new(Mutex::new(Vec::new()));
    let mut registry = ExporterRegistry::empty();
    let s = stops.clone();
    registry.register("recorder", move |_| {
        Ok(Box::new(Recorder {
            stops: s.clone(),
            fail_start: true,
            ..Recorder::default()
        }))
    });
    let mut renderer = Renderer::new(&project(), registry, Arc::new(ManualClock::new()));
    assert_eq!(renderer.render(&settings_for("recorder")), RenderResult::Error);
    assert_eq!(*stops.lock().unwrap(), vec![RenderResult::Error]);
    assert_eq!(renderer.last_error(), Some("export error: disk full"));
}

#[test]
fn exporter_configuration_overrides_the_range() {
    let frames = Arc::new(AtomicUsize::new(0));
    let mut registry = ExporterRegistry::empty();
    let f = frames.clone();
    registry.register("recorder", move |_| {
        Ok(Box::new(Recorder {
            frames: f.clone(),
            range: Some([0.0, 1.0]),
            ..Recorder::default()
        }))
    });
    let mut renderer = Renderer::new(&project(), registry, Arc::new(ManualClock::new()));
    assert_eq!(renderer.render(&settings_for("recorder")), RenderResult::Success);
    assert_eq!(frames.load(Ordering::SeqCst), 31);
}

// Holds every frame until the renderer sleeps; each sleep acknowledges the oldest one.
struct Lagging {
    queue: Arc<Mutex<VecDeque<FrameIndex>>>,
    acks: Arc<Mutex<Option<AckSender>>>,
    peak: Arc<AtomicUsize>,
}

impl Exporter for Lagging {
    fn meta(&self) -> ExporterMeta {
        ExporterMeta {
            id: "lagging".to_owned(),
            display_name: "Lagging".to_owned(),
            options_schema: serde_json::json!({}),
        }
    }

    fn start(&mut self, cx: &ExportContext<'_>) -> WavyteResult<()> {
        *self.acks.lock().unwrap() = Some(cx.acks.clone());
        Ok(())
    }

    fn handle_frame(
        &mut self,
        _surface: &Surface,
        frame: FrameIndex,
        _scene_frame: u64,
        _scene_name: &str,
        _token: &CancellationToken,
    ) -> WavyteResult<FrameStatus> {
        let mut q = self.queue.lock().unwrap();
        q.push_back(frame);
        self.peak.fetch_max(q.len(), Ordering::SeqCst);
        Ok(FrameStatus::Pending)
    }
}

struct AckingClock {
    inner: ManualClock,
    queue: Arc<Mutex<VecDeque<FrameIndex>>>,
    acks: Arc<Mutex<Option<AckSender>>>,
}

impl Clock for AckingClock {
    fn now(&self) -> Duration {
        self.inner.now()
    }

    fn sleep(&self, dur: Duration) {
        self.inner.advance(dur);
        if let Some(frame) = self.queue.lock().unwrap().pop_front()
            && let Some(acks) = self.acks.lock().unwrap().as_ref()
        {
            acks.ack(frame);
        }
    }
}

#[test]
fn backpressure_bounds_unacknowledged_frames() {
    let queue = Arc::new(Mutex::new(VecDeque::new()));
    let acks = Arc::new(Mutex::new(None));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut registry = ExporterRegistry::empty();
    let (q, a, p) = (queue.clone(), acks.clone(), peak.clone());
    registry.register("lagging", move |_| {
        Ok(Box::new(Lagging {
            queue: q.clone(),
            acks: a.clone(),
            peak: p.clone(),
        }))
    });
    let clock = AckingClock {
        inner: ManualClock::new(),
        queue,
        acks,
    };
    let mut renderer = Renderer::new(&project(), registry, Arc::new(clock));

    assert_eq!(renderer.render(&settings_for("lagging")), RenderResult::Success);
    assert_eq!(peak.load(Ordering::SeqCst), MAX_FRAMES_IN_FLIGHT);
    let stats = renderer.stats();
    assert_eq!(stats.frames_exported, 96);
    assert_eq!(stats.backpressure_waits, 96 - MAX_FRAMES_IN_FLIGHT as u64);
}

// Advances the shared clock by 10 ms per frame.
struct Slow(ManualClock);

impl Exporter for Slow {
    fn meta(&self) -> ExporterMeta {
        ExporterMeta {
            id: "slow".to_owned(),
            display_name: "Slow".to_owned(),
            options_schema: serde_json::json!({}),
        }
    }

    fn handle_frame(
        &mut self,
        _surface: &Surface,
        _frame: FrameIndex,
        _scene_frame: u64,
        _scene_name: &str,
        _token: &CancellationToken,
    ) -> WavyteResult<FrameStatus> {
        self.0.advance(Duration::from_millis(10));
        Ok(FrameStatus::Done)
    }
}

#[test]
fn long_renders_yield_to_the_host_periodically() {
    let clock = ManualClock::new();
    let mut registry = ExporterRegistry::empty();
    let c = clock.clone();
    registry.register("slow", move |_| Ok(Box::new(Slow(c.clone()))));
    let mut renderer = Renderer::new(&project(), registry, Arc::new(clock.clone()));
    let yields = Arc::new(AtomicUsize::new(0));
    let y = yields.clone();
    renderer.set_yield_hook(move || {
        y.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(renderer.render(&settings_for("slow")), RenderResult::Success);
    assert_eq!(clock.now(), Duration::from_millis(960));
    assert_eq!(yields.load(Ordering::SeqCst), 24);
    assert_eq!(renderer.stats().host_yields, 24);
}

#[test]
fn the_estimate_tracks_completion() {
    let clock = ManualClock::new();
    let mut registry = ExporterRegistry::empty();
    let c = clock.clone();
    registry.register("slow", move |_| Ok(Box::new(Slow(c.clone()))));
    let mut renderer = Renderer::new(&project(), registry, Arc::new(clock.clone()));
    let settings = RenderSettings {
        range: Some([0.0, 1.0]),
        ..settings_for("slow")
    };
    assert_eq!(renderer.render(&settings), RenderResult::Success);
    // Estimates are reset once the render is over.
    let e = renderer.estimate();
    assert_eq!(e.completion, 0.0);
    assert_eq!(e.elapsed, Duration::ZERO);
}
