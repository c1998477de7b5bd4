use super::*;

#[test]
fn frame_range_contains_boundaries() {
    let r = FrameRange::new(FrameIndex(2), FrameIndex(5)).unwrap();
    assert!(!r.contains(FrameIndex(1)));
    assert!(r.contains(FrameIndex(2)));
    assert!(r.contains(FrameIndex(4)));
    assert!(!r.contains(FrameIndex(5)));
}

#[test]
fn frame_range_rejects_inverted_bounds() {
    assert!(FrameRange::new(FrameIndex(5), FrameIndex(2)).is_err());
    let empty = FrameRange::new(FrameIndex(3), FrameIndex(3)).unwrap();
    assert_eq!(empty.clamp(FrameIndex(10)), FrameIndex(3));
}

#[test]
fn fps_frames_secs_roundtrip_floor() {
    let fps = Fps::new(30000, 1001).unwrap();
    let secs = fps.frames_to_secs(123);
    assert_eq!(fps.secs_to_frames_floor(secs), 123);
}

#[test]
fn fps_rejects_zero_parts() {
    assert!(Fps::new(0, 1).is_err());
    assert!(Fps::new(30, 0).is_err());
}

#[test]
fn canvas_scaling_never_collapses_to_zero() {
    let c = Canvas {
        width: 1920,
        height: 1080,
    };
    assert_eq!(
        c.scaled(0.5),
        Canvas {
            width: 960,
            height: 540
        }
    );
    assert_eq!(
        c.scaled(0.0),
        Canvas {
            width: 1,
            height: 1
        }
    );
}
