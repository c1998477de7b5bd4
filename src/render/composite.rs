use crate::foundation::error::{WavyteError, WavyteResult};
use crate::foundation::math::mul_div255_u8;
use crate::render::surface::Surface;
use crate::scene::transition::WipeDir;

pub(crate) type PremulRgba8 = [u8; 4];

pub(crate) fn over(dst: PremulRgba8, src: PremulRgba8, opacity: f32) -> PremulRgba8 {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 || src[3] == 0 {
        return dst;
    }

    let op = ((opacity * 255.0).round() as i32).clamp(0, 255) as u16;
    let sa = mul_div255(u16::from(src[3]), op);
    if sa == 0 {
        return dst;
    }

    let inv = 255u16 - u16::from(sa);

    let mut out = [0u8; 4];
    out[3] = sa.saturating_add(mul_div255(u16::from(dst[3]), inv));

    for i in 0..3 {
        let sc = mul_div255(u16::from(src[i]), op);
        let dc = mul_div255(u16::from(dst[i]), inv);
        out[i] = sc.saturating_add(dc);
    }
    out
}

pub(crate) fn crossfade(a: PremulRgba8, b: PremulRgba8, t: f32) -> PremulRgba8 {
    let t = t.clamp(0.0, 1.0);
    let tt = ((t * 255.0).round() as i32).clamp(0, 255) as u16;
    let it = 255u16 - tt;

    let mut out = [0u8; 4];
    for i in 0..4 {
        let av = mul_div255(u16::from(a[i]), it);
        let bv = mul_div255(u16::from(b[i]), tt);
        out[i] = av.saturating_add(bv);
    }
    out
}

/// Source-over `src` onto `dst`.
pub(crate) fn layer_over(dst: &mut Surface, src: &Surface) -> WavyteResult<()> {
    ensure_same_size(dst, &[src])?;
    for (d, s) in dst.data_mut().chunks_exact_mut(4).zip(src.data().chunks_exact(4)) {
        let out = over([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]], 1.0);
        d.copy_from_slice(&out);
    }
    Ok(())
}

/// Blend `from -> to` by `t` and lay the result over `dst`.
pub(crate) fn crossfade_over(
    dst: &mut Surface,
    from: &Surface,
    to: &Surface,
    t: f32,
) -> WavyteResult<()> {
    ensure_same_size(dst, &[from, to])?;
    for ((d, a), b) in dst
        .data_mut()
        .chunks_exact_mut(4)
        .zip(from.data().chunks_exact(4))
        .zip(to.data().chunks_exact(4))
    {
        let blended = crossfade([a[0], a[1], a[2], a[3]], [b[0], b[1], b[2], b[3]], t);
        let out = over([d[0], d[1], d[2], d[3]], blended, 1.0);
        d.copy_from_slice(&out);
    }
    Ok(())
}

/// Reveal `to` over `from` along `dir` as `t` goes from 0 to 1.
pub(crate) fn wipe_over(
    dst: &mut Surface,
    from: &Surface,
    to: &Surface,
    t: f32,
    dir: WipeDir,
    soft_edge: f32,
) -> WavyteResult<()> {
    ensure_same_size(dst, &[from, to])?;
    let (width, height) = (dst.width(), dst.height());
    let t = t.clamp(0.0, 1.0);
    let soft_edge = soft_edge.clamp(0.0, 1.0);

    let axis_len = match dir {
        WipeDir::LeftToRight | WipeDir::RightToLeft => width as f32,
        WipeDir::TopToBottom | WipeDir::BottomToTop => height as f32,
    };
    let soft_px = soft_edge * axis_len;
    let edge = t * (axis_len + 2.0 * soft_px) - soft_px;

    let a = from.data();
    let b = to.data();
    let out = dst.data_mut();
    for y in 0..height {
        for x in 0..width {
            let pos = match dir {
                WipeDir::LeftToRight => x as f32,
                WipeDir::RightToLeft => (width - 1 - x) as f32,
                WipeDir::TopToBottom => y as f32,
                WipeDir::BottomToTop => (height - 1 - y) as f32,
            };

            // Coverage of the incoming surface at this pixel.
            let m = if soft_px <= 0.0 {
                if pos < edge { 1.0 } else { 0.0 }
            } else {
                1.0 - smoothstep(edge - soft_px, edge + soft_px, pos)
            };

            let i = ((y as usize) * (width as usize) + (x as usize)) * 4;
            let ap = [a[i], a[i + 1], a[i + 2], a[i + 3]];
            let bp = [b[i], b[i + 1], b[i + 2], b[i + 3]];
            let dp = [out[i], out[i + 1], out[i + 2], out[i + 3]];
            let px = over(dp, crossfade(ap, bp, m), 1.0);
            out[i..i + 4].copy_from_slice(&px);
        }
    }
    Ok(())
}

fn ensure_same_size(dst: &Surface, srcs: &[&Surface]) -> WavyteResult<()> {
    for s in srcs {
        if s.width() != dst.width() || s.height() != dst.height() {
            return Err(WavyteError::evaluation(format!(
                "compositing expects equally sized surfaces, got {}x{} and {}x{}",
                dst.width(),
                dst.height(),
                s.width(),
                s.height()
            )));
        }
    }
    Ok(())
}

fn mul_div255(x: u16, y: u16) -> u8 {
    mul_div255_u8(x, y)
}

fn smoothstep(a: f32, b: f32, x: f32) -> f32 {
    if x <= a {
        return 0.0;
    }
    if x >= b {
        return 1.0;
    }
    let t = (x - a) / (b - a);
    (t * t * (3.0 - 2.0 * t)).clamp(0.0, 1.0)
}

#[cfg(test)]
#[path = "../../tests/unit/render/composite.rs"]
mod tests;
