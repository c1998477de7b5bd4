use super::*;
use crate::foundation::core::{Canvas, Rgba8Premul};
use crate::render::surface::{ColorSpace, SurfaceDesc};

fn solid(w: u32, h: u32, c: Rgba8Premul) -> Surface {
    let mut s = Surface::new(SurfaceDesc {
        size: Canvas {
            width: w,
            height: h,
        },
        resolution_scale: 1.0,
        color_space: ColorSpace::Srgb,
    });
    s.fill(c);
    s
}

#[test]
fn over_transparent_src_keeps_dst() {
    assert_eq!(over([1, 2, 3, 255], [0, 0, 0, 0], 1.0), [1, 2, 3, 255]);
    assert_eq!(over([1, 2, 3, 255], [9, 9, 9, 255], 1.0), [9, 9, 9, 255]);
}

#[test]
fn crossfade_endpoints_select_inputs() {
    let a = [200, 0, 0, 255];
    let b = [0, 0, 200, 255];
    assert_eq!(crossfade(a, b, 0.0), a);
    assert_eq!(crossfade(a, b, 1.0), b);
}

#[test]
fn wipe_reveals_incoming_from_the_left() {
    let red = Rgba8Premul::opaque(255, 0, 0);
    let blue = Rgba8Premul::opaque(0, 0, 255);
    let from = solid(4, 1, red);
    let to = solid(4, 1, blue);
    let mut dst = solid(4, 1, Rgba8Premul::transparent());
    wipe_over(&mut dst, &from, &to, 0.5, WipeDir::LeftToRight, 0.0).unwrap();
    assert_eq!(dst.pixel(0, 0), Some(blue));
    assert_eq!(dst.pixel(3, 0), Some(red));
}

#[test]
fn size_mismatch_is_rejected() {
    let a = solid(2, 2, Rgba8Premul::transparent());
    let mut b = solid(3, 2, Rgba8Premul::transparent());
    assert!(layer_over(&mut b, &a).is_err());
}
