use super::*;
use crate::foundation::core::Canvas;
use crate::scene::script::{factory, wait_frames};

#[test]
fn empty_json_yields_defaults() {
    let s = ProjectSettings::from_json_str("{}").unwrap();
    assert_eq!(s, ProjectSettings::default());
    assert!(s.validate().is_ok());
    assert!(s.player.looping);
    assert_eq!(s.rendering.exporter.name, "image-sequence");
}

#[test]
fn partial_json_overrides_only_what_it_names() {
    let s = ProjectSettings::from_json_str(
        r#"{
            "seed": 7,
            "stage": { "size": { "width": 640, "height": 360 }, "background": { "r": 0, "g": 0, "b": 0, "a": 255 } },
            "rendering": { "fps": { "num": 60, "den": 1 }, "range": [1.0, 2.5], "exporter": { "name": "ffmpeg", "options": { "crf": 18 } } },
            "player": { "loop": false, "speed": 2.0 }
        }"#,
    )
    .unwrap();
    s.validate().unwrap();
    assert_eq!(s.seed, 7);
    assert_eq!(
        s.stage.size,
        Canvas {
            width: 640,
            height: 360
        }
    );
    assert_eq!(s.stage.resolution_scale, 1.0);
    assert!(!s.player.looping);
    assert_eq!(s.rendering.exporter.options["crf"], 18);
    assert_eq!(
        s.rendering.frame_range(1000),
        (FrameIndex(60), FrameIndex(150))
    );
    assert_eq!(s.rendering.frame_range(100), (FrameIndex(60), FrameIndex(100)));

    let export_stage = s.rendering.stage_settings(&s.stage);
    assert_eq!(export_stage.background, s.stage.background);
    assert_eq!(s.render_scene_settings(&s.rendering).fps.num, 60);
}

#[test]
fn settings_round_trip_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("project.json");
    let s = ProjectSettings {
        seed: 99,
        player: PlayerSettings {
            range: Some([0.5, 1.5]),
            ..PlayerSettings::default()
        },
        ..ProjectSettings::default()
    };
    std::fs::write(&path, s.to_json_string().unwrap()).unwrap();
    assert_eq!(ProjectSettings::from_path(&path).unwrap(), s);
}

#[test]
fn invalid_settings_are_rejected() {
    let mut s = ProjectSettings::default();
    s.stage.size.width = 0;
    assert!(s.validate().is_err());

    let mut s = ProjectSettings::default();
    s.preview.resolution_scale = 0.0;
    assert!(s.validate().is_err());

    let mut s = ProjectSettings::default();
    s.rendering.range = Some([2.0, 1.0]);
    let err = s.validate().unwrap_err();
    assert!(err.to_string().starts_with("validation error: rendering.range"));

    let mut s = ProjectSettings::default();
    s.player.range = Some([0.0, f64::INFINITY]);
    assert!(s.validate().is_err());

    let err = ProjectSettings::from_json_str(r#"{ "rendering": { "fps": { "num": 0, "den": 1 } } }"#)
        .unwrap()
        .validate()
        .unwrap_err();
    assert!(err.to_string().contains("rendering.fps"));

    assert!(matches!(
        ProjectSettings::from_json_str("{ not json"),
        Err(WavyteError::Serde(_))
    ));
    assert!(ProjectSettings::from_path("/definitely/missing/project.json").is_err());
}

#[test]
fn projects_need_unique_scene_names() {
    let scene = |name: &str| SceneDescription::new(name, factory(|_| Ok(wait_frames(1))));
    assert!(Project::new("p", ProjectSettings::default(), vec![]).is_err());
    assert!(
        Project::new(
            "p",
            ProjectSettings::default(),
            vec![scene("a"), scene("a")]
        )
        .is_err()
    );
    let p = Project::new("p", ProjectSettings::default(), vec![scene("a"), scene("b")]).unwrap();
    assert_eq!(p.scenes.len(), 2);
}
