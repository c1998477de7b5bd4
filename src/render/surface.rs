use crate::foundation::core::{Canvas, Rect, Rgba8Premul};
use crate::foundation::error::{WavyteError, WavyteResult};
use crate::render::composite;

/// Colour space a surface is tagged with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorSpace {
    /// Standard sRGB.
    #[default]
    Srgb,
    /// Wide-gamut Display P3.
    DisplayP3,
}

/// Parameters that fully determine a surface allocation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceDesc {
    /// Logical (unscaled) size.
    pub size: Canvas,
    /// Logical-to-physical scale factor.
    pub resolution_scale: f64,
    /// Colour space tag.
    pub color_space: ColorSpace,
}

impl SurfaceDesc {
    /// Physical pixel size.
    pub fn physical(&self) -> Canvas {
        self.size.scaled(self.resolution_scale)
    }
}

/// A CPU drawing surface of premultiplied RGBA8 pixels.
#[derive(Clone, Debug)]
pub struct Surface {
    desc: SurfaceDesc,
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Surface {
    /// Allocate a transparent surface.
    pub fn new(desc: SurfaceDesc) -> Self {
        let px = desc.physical();
        Self {
            desc,
            width: px.width,
            height: px.height,
            data: vec![0u8; px.width as usize * px.height as usize * 4],
        }
    }

    /// Descriptor this surface was allocated with.
    pub fn desc(&self) -> SurfaceDesc {
        self.desc
    }

    /// Physical width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Physical height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Logical-to-physical scale factor.
    pub fn resolution_scale(&self) -> f64 {
        self.desc.resolution_scale
    }

    /// Premultiplied RGBA8 bytes, tightly packed, row-major.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Pixel at `(x, y)`, or `None` outside the surface.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba8Premul> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        Some(Rgba8Premul {
            r: self.data[i],
            g: self.data[i + 1],
            b: self.data[i + 2],
            a: self.data[i + 3],
        })
    }

    /// Reset every pixel to transparent.
    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    /// Overwrite every pixel with `color`.
    pub fn fill(&mut self, color: Rgba8Premul) {
        let c = color.to_array();
        for px in self.data.chunks_exact_mut(4) {
            px.copy_from_slice(&c);
        }
    }

    /// Source-over fill of a rectangle given in physical pixels.
    pub fn fill_rect(&mut self, rect: Rect, color: Rgba8Premul) {
        let Some((x0, y0, x1, y1)) = self.clip(rect) else {
            return;
        };
        let c = color.to_array();
        for y in y0..y1 {
            for x in x0..x1 {
                let i = (y * self.width as usize + x) * 4;
                let dst = [
                    self.data[i],
                    self.data[i + 1],
                    self.data[i + 2],
                    self.data[i + 3],
                ];
                self.data[i..i + 4].copy_from_slice(&composite::over(dst, c, 1.0));
            }
        }
    }

    /// Nearest-neighbour source-over blit of premultiplied pixels into `dst` (physical pixels).
    pub fn blit_rgba(&mut self, src_w: u32, src_h: u32, src: &[u8], dst: Rect) -> WavyteResult<()> {
        if src.len() != src_w as usize * src_h as usize * 4 {
            return Err(WavyteError::validation(
                "blit_rgba source must be width*height*4 bytes",
            ));
        }
        if src_w == 0 || src_h == 0 || dst.width() <= 0.0 || dst.height() <= 0.0 {
            return Ok(());
        }
        let Some((x0, y0, x1, y1)) = self.clip(dst) else {
            return Ok(());
        };
        let sx = f64::from(src_w) / dst.width();
        let sy = f64::from(src_h) / dst.height();
        for y in y0..y1 {
            let v = (((y as f64 + 0.5 - dst.y0) * sy) as u32).min(src_h - 1);
            for x in x0..x1 {
                let u = (((x as f64 + 0.5 - dst.x0) * sx) as u32).min(src_w - 1);
                let si = (v as usize * src_w as usize + u as usize) * 4;
                let di = (y * self.width as usize + x) * 4;
                let s = [src[si], src[si + 1], src[si + 2], src[si + 3]];
                let d = [
                    self.data[di],
                    self.data[di + 1],
                    self.data[di + 2],
                    self.data[di + 3],
                ];
                self.data[di..di + 4].copy_from_slice(&composite::over(d, s, 1.0));
            }
        }
        Ok(())
    }

    fn clip(&self, rect: Rect) -> Option<(usize, usize, usize, usize)> {
        let r = rect.abs();
        let x0 = r.x0.max(0.0).round() as usize;
        let y0 = r.y0.max(0.0).round() as usize;
        let x1 = (r.x1.round().max(0.0) as usize).min(self.width as usize);
        let y1 = (r.y1.round().max(0.0) as usize).min(self.height as usize);
        (x0 < x1 && y0 < y1).then_some((x0, y0, x1, y1))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/surface.rs"]
mod tests;
