use super::*;

fn desc(w: u32, h: u32, scale: f64) -> SurfaceDesc {
    SurfaceDesc {
        size: Canvas {
            width: w,
            height: h,
        },
        resolution_scale: scale,
        color_space: ColorSpace::Srgb,
    }
}

#[test]
fn allocation_uses_physical_size() {
    let s = Surface::new(desc(10, 4, 2.0));
    assert_eq!((s.width(), s.height()), (20, 8));
    assert_eq!(s.data().len(), 20 * 8 * 4);
}

#[test]
fn fill_rect_is_clipped_to_bounds() {
    let mut s = Surface::new(desc(4, 4, 1.0));
    s.fill_rect(Rect::new(2.0, 2.0, 10.0, 10.0), Rgba8Premul::opaque(255, 0, 0));
    assert_eq!(s.pixel(1, 1), Some(Rgba8Premul::transparent()));
    assert_eq!(s.pixel(3, 3), Some(Rgba8Premul::opaque(255, 0, 0)));
    assert_eq!(s.pixel(4, 4), None);
}

#[test]
fn blit_scales_nearest_neighbour() {
    let mut s = Surface::new(desc(4, 4, 1.0));
    let src = [255u8, 255, 255, 255];
    s.blit_rgba(1, 1, &src, Rect::new(0.0, 0.0, 2.0, 2.0)).unwrap();
    assert_eq!(s.pixel(1, 1), Some(Rgba8Premul::opaque(255, 255, 255)));
    assert_eq!(s.pixel(2, 2), Some(Rgba8Premul::transparent()));
    assert!(s.blit_rgba(2, 2, &src, Rect::new(0.0, 0.0, 1.0, 1.0)).is_err());
}
