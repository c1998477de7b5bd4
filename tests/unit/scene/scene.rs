use super::*;
use crate::draw::shapes::Rectangle;
use crate::foundation::core::{Rect, Rgba8Premul};
use crate::render::surface::{ColorSpace, SurfaceDesc};
use crate::scene::script::{
    Deferred, ResourceValue, action, await_resource, factory, frames, script_fn, sequence,
};
use crate::scene::transition::TransitionStyle;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

fn settings() -> SceneSettings {
    SceneSettings {
        size: Canvas {
            width: 8,
            height: 8,
        },
        ..SceneSettings::default()
    }
}

fn counting_scene(len: u64, creations: Arc<AtomicUsize>) -> Scene {
    let desc = SceneDescription::new(
        "counted",
        factory(move |_| {
            creations.fetch_add(1, Ordering::SeqCst);
            Ok(frames(len, |_, _| Ok(())))
        }),
    );
    Scene::new(&desc, &settings())
}

fn recalc(scene: &mut Scene, start: u64) -> Vec<u64> {
    let mut seen = Vec::new();
    scene
        .recalculate(FrameIndex(start), &mut |f| seen.push(f.0))
        .unwrap();
    seen
}

#[test]
fn recalculate_discovers_duration_and_reports_every_frame() {
    let mut scene = counting_scene(30, Arc::new(AtomicUsize::new(0)));
    let seen = recalc(&mut scene, 0);
    assert!(scene.is_cached());
    assert_eq!(scene.duration(), 30);
    assert_eq!(scene.first_frame(), FrameIndex(0));
    assert_eq!(scene.last_frame(), FrameIndex(30));
    assert_eq!(scene.transition_duration(), 0);
    assert_eq!(seen, (1..=30).collect::<Vec<_>>());
}

#[test]
fn recalculate_twice_reuses_cache_without_running_the_script() {
    let creations = Arc::new(AtomicUsize::new(0));
    let mut scene = counting_scene(12, creations.clone());
    recalc(&mut scene, 0);
    let first = scene.cache();
    recalc(&mut scene, 0);
    assert_eq!(scene.cache(), first);
    assert_eq!(creations.load(Ordering::SeqCst), 1);

    // A cached scene can be re-anchored at another start frame.
    let seen = recalc(&mut scene, 100);
    assert_eq!(seen, vec![112]);
    assert_eq!(scene.first_frame(), FrameIndex(100));
    assert_eq!(scene.last_frame(), FrameIndex(112));
    assert_eq!(creations.load(Ordering::SeqCst), 1);
}

#[test]
fn reload_and_settings_changes_invalidate_the_cache() {
    let mut scene = counting_scene(5, Arc::new(AtomicUsize::new(0)));
    recalc(&mut scene, 0);

    scene.configure(&settings());
    assert!(scene.is_cached(), "identical settings keep the cache");

    let mut s = settings();
    s.fps = Fps::new(60, 1).unwrap();
    scene.configure(&s);
    assert!(!scene.is_cached());

    recalc(&mut scene, 0);
    scene.reload(factory(|_| Ok(frames(7, |_, _| Ok(())))));
    assert!(!scene.is_cached());
    recalc(&mut scene, 0);
    assert_eq!(scene.duration(), 7);
}

#[test]
fn stepping_duration_times_allows_transition_out() {
    let mut scene = counting_scene(9, Arc::new(AtomicUsize::new(0)));
    recalc(&mut scene, 0);
    scene.reset(FrameIndex(0), None).unwrap();
    for _ in 0..scene.duration() - 1 {
        scene.next().unwrap();
        assert!(!scene.can_transition_out());
    }
    scene.next().unwrap();
    assert!(scene.can_transition_out());
    assert!(scene.is_finished());
}

#[test]
fn transition_duration_is_time_spent_in_initial() {
    let desc = SceneDescription::new(
        "fade-in",
        factory(|_| {
            Ok(sequence(vec![
                action(|cx| {
                    cx.use_transition(TransitionStyle::Crossfade, true);
                    Ok(())
                }),
                frames(6, |cx, i| {
                    cx.set_transition_progress(i as f32 / 6.0);
                    Ok(())
                }),
                action(|cx| {
                    cx.finish_transition();
                    Ok(())
                }),
                frames(10, |_, _| Ok(())),
            ]))
        }),
    );
    let mut scene = Scene::new(&desc, &settings());
    scene.reset(FrameIndex(0), Some("before")).unwrap();
    assert_eq!(scene.state(), SceneState::Initial);
    assert!(scene.previous_on_top());

    recalc(&mut scene, 0);
    assert_eq!(scene.transition_duration(), 6);
    assert_eq!(scene.duration(), 16);
}

#[test]
fn finish_scene_hands_off_before_the_script_completes() {
    let desc = SceneDescription::new(
        "early",
        factory(|_| {
            Ok(sequence(vec![
                frames(4, |_, _| Ok(())),
                action(|cx| {
                    cx.finish_scene();
                    Ok(())
                }),
                frames(20, |_, _| Ok(())),
            ]))
        }),
    );
    let mut scene = Scene::new(&desc, &settings());
    recalc(&mut scene, 0);
    assert_eq!(scene.duration(), 4);
    assert_eq!(scene.state(), SceneState::CanTransitionOut);
}

#[test]
fn out_of_order_transitions_are_ignored() {
    let desc = SceneDescription::new(
        "confused",
        factory(|_| {
            Ok(sequence(vec![
                action(|cx| {
                    cx.finish_transition();
                    Ok(())
                }),
                frames(2, |_, _| Ok(())),
            ]))
        }),
    );
    let mut scene = Scene::new(&desc, &settings());
    scene.reset(FrameIndex(0), None).unwrap();
    assert_eq!(scene.state(), SceneState::AfterTransitionIn);
}

#[test]
fn deferred_values_are_fed_back_into_the_script() {
    let got = Arc::new(Mutex::new(Vec::new()));
    let g = got.clone();
    let desc = SceneDescription::new(
        "async",
        factory(move |_| {
            let ok = g.clone();
            let bad = g.clone();
            Ok(sequence(vec![
                await_resource(
                    Deferred::ready("config", ResourceValue::Json(serde_json::json!(7))),
                    move |_, v| {
                        ok.lock().unwrap().push(v);
                        Ok(())
                    },
                ),
                await_resource(
                    Deferred::new("missing", || Err(WavyteError::resource("404"))),
                    move |_, v| {
                        bad.lock().unwrap().push(v);
                        Ok(())
                    },
                ),
                frames(1, |_, _| Ok(())),
            ]))
        }),
    );
    let mut scene = Scene::new(&desc, &settings());
    scene.reset(FrameIndex(0), None).unwrap();
    let got = got.lock().unwrap();
    assert_eq!(got.len(), 2);
    assert_eq!(got[0], Ok(ResourceValue::Json(serde_json::json!(7))));
    assert!(got[1].as_ref().is_err_and(|e| e.contains("404")));
}

#[test]
fn unrecognized_values_pass_through_unchanged() {
    let echoed = Arc::new(Mutex::new(None));
    let e = echoed.clone();
    let desc = SceneDescription::new(
        "odd",
        factory(move |_| {
            let e = e.clone();
            let mut sent = false;
            Ok(script_fn(move |_, input| {
                if !sent {
                    sent = true;
                    return Ok(Step::Yield(Yielded::Value(serde_json::json!({ "x": 1 }))));
                }
                if let Resume::Value(v) = input {
                    *e.lock().unwrap() = Some(v);
                }
                Ok(Step::Complete)
            }))
        }),
    );
    let mut scene = Scene::new(&desc, &settings());
    scene.reset(FrameIndex(0), None).unwrap();
    assert_eq!(
        *echoed.lock().unwrap(),
        Some(serde_json::json!({ "x": 1 }))
    );
    assert!(scene.is_finished());
}

#[test]
fn script_errors_propagate() {
    let desc = SceneDescription::new(
        "broken",
        factory(|_| {
            Ok(frames(5, |_, i| {
                if i == 3 {
                    Err(WavyteError::script("boom"))
                } else {
                    Ok(())
                }
            }))
        }),
    );
    let mut scene = Scene::new(&desc, &settings());
    let err = scene
        .recalculate(FrameIndex(0), &mut |_| {})
        .unwrap_err();
    assert!(err.to_string().contains("boom"));
    assert!(!scene.is_cached());
}

#[test]
fn never_ending_scripts_hit_the_frame_bound() {
    let desc = SceneDescription::new(
        "forever",
        factory(|_| Ok(script_fn(|_, _| Ok(Step::Yield(Yielded::Frame))))),
    );
    let mut s = settings();
    s.max_frames = 50;
    let mut scene = Scene::new(&desc, &s);
    let err = scene.recalculate(FrameIndex(0), &mut |_| {}).unwrap_err();
    assert!(matches!(err, WavyteError::Script(_)));
}

#[test]
fn reset_reseeds_the_random_source() {
    let draws = Arc::new(Mutex::new(Vec::new()));
    let d = draws.clone();
    let desc = SceneDescription::new(
        "random",
        factory(move |_| {
            let d = d.clone();
            Ok(frames(1, move |cx, _| {
                d.lock().unwrap().push(cx.random().next_u64());
                Ok(())
            }))
        }),
    );
    let mut scene = Scene::new(&desc, &settings());
    scene.reset(FrameIndex(0), None).unwrap();
    scene.reset(FrameIndex(0), None).unwrap();
    let draws = draws.lock().unwrap();
    assert_eq!(draws[0], draws[1]);
    assert_eq!(scene.reset_count(), 2);
}

struct AlwaysPending(Arc<AtomicUsize>);

impl crate::scene::view::Drawable for AlwaysPending {
    fn draw(&self, _surface: &mut Surface, cx: &mut DrawContext<'_>) -> WavyteResult<()> {
        let n = self.0.fetch_add(1, Ordering::SeqCst);
        cx.request(
            format!("res-{n}"),
            Deferred::ready("never-enough", ResourceValue::Unit),
        );
        Ok(())
    }

    fn bounds(&self) -> Rect {
        Rect::ZERO
    }
}

#[test]
fn render_retries_are_bounded() {
    let draws = Arc::new(AtomicUsize::new(0));
    let d = draws.clone();
    let desc = SceneDescription::new(
        "pending",
        factory(move |_| {
            let d = d.clone();
            Ok(frames(1, move |cx, _| {
                cx.view().insert("p", AlwaysPending(d.clone()));
                Ok(())
            }))
        }),
    );
    let mut scene = Scene::new(&desc, &settings());
    scene.reset(FrameIndex(0), None).unwrap();
    let mut surface = Surface::new(SurfaceDesc {
        size: scene.info().size,
        resolution_scale: 1.0,
        color_space: ColorSpace::Srgb,
    });
    scene.render(&mut surface).unwrap();
    assert_eq!(draws.load(Ordering::SeqCst), MAX_RENDER_ATTEMPTS);
}

#[test]
fn render_draws_the_view() {
    let desc = SceneDescription::new(
        "box",
        factory(|_| {
            Ok(frames(1, |cx, _| {
                cx.view().insert(
                    "box",
                    Rectangle::new(Rect::new(0.0, 0.0, 4.0, 4.0), Rgba8Premul::opaque(0, 255, 0)),
                );
                Ok(())
            }))
        }),
    );
    let mut scene = Scene::new(&desc, &settings());
    scene.reset(FrameIndex(0), None).unwrap();
    assert_eq!(
        scene.view().bounds_of("box"),
        Some(Rect::new(0.0, 0.0, 4.0, 4.0))
    );
    let mut surface = Surface::new(SurfaceDesc {
        size: scene.info().size,
        resolution_scale: 1.0,
        color_space: ColorSpace::Srgb,
    });
    scene.render(&mut surface).unwrap();
    assert_eq!(surface.pixel(1, 1), Some(Rgba8Premul::opaque(0, 255, 0)));
    assert_eq!(surface.pixel(6, 6), Some(Rgba8Premul::transparent()));
}
