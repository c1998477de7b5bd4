use std::sync::Arc;

use crate::foundation::core::{Rect, Rgba8Premul};
use crate::foundation::error::{WavyteError, WavyteResult};
use crate::render::surface::Surface;
use crate::scene::script::{Deferred, ImageData, ResourceValue};
use crate::scene::view::{DrawContext, Drawable};

/// Solid axis-aligned rectangle in logical coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rectangle {
    /// Logical bounds.
    pub rect: Rect,
    /// Fill colour.
    pub fill: Rgba8Premul,
}

impl Rectangle {
    /// Create a rectangle.
    pub fn new(rect: Rect, fill: Rgba8Premul) -> Self {
        Self { rect, fill }
    }
}

impl Drawable for Rectangle {
    fn draw(&self, surface: &mut Surface, cx: &mut DrawContext<'_>) -> WavyteResult<()> {
        surface.fill_rect(cx.to_physical(self.rect), self.fill);
        Ok(())
    }

    fn bounds(&self) -> Rect {
        self.rect
    }
}

/// Loads image pixels on demand.
pub type ImageLoader = Arc<dyn Fn() -> WavyteResult<ImageData> + Send + Sync>;

/// Image drawn from a resource that resolves lazily on first draw.
#[derive(Clone)]
pub struct Image {
    key: String,
    rect: Rect,
    loader: ImageLoader,
}

impl Image {
    /// Image identified by `key`, stretched into `rect`.
    pub fn new(key: impl Into<String>, rect: Rect, loader: ImageLoader) -> Self {
        Self {
            key: key.into(),
            rect,
            loader,
        }
    }

    /// Image decoded from a file on disk through the `image` crate.
    pub fn from_path(path: impl Into<std::path::PathBuf>, rect: Rect) -> Self {
        let path = path.into();
        let key = path.display().to_string();
        let loader: ImageLoader = Arc::new(move || decode_image(&path));
        Self::new(key, rect, loader)
    }
}

impl Drawable for Image {
    fn draw(&self, surface: &mut Surface, cx: &mut DrawContext<'_>) -> WavyteResult<()> {
        match cx.resource(&self.key) {
            Some(ResourceValue::Image(img)) => {
                let dst = cx.to_physical(self.rect);
                surface.blit_rgba(img.width, img.height, &img.rgba8_premul, dst)
            }
            Some(_) => Err(WavyteError::resource(format!(
                "resource '{}' is not an image",
                self.key
            ))),
            None if cx.resource_failed(&self.key) => Ok(()),
            None => {
                let loader = self.loader.clone();
                cx.request(
                    self.key.clone(),
                    Deferred::new(self.key.clone(), move || {
                        loader().map(ResourceValue::Image)
                    }),
                );
                Ok(())
            }
        }
    }

    fn bounds(&self) -> Rect {
        self.rect
    }
}

fn decode_image(path: &std::path::Path) -> WavyteResult<ImageData> {
    use anyhow::Context as _;

    let img = image::open(path)
        .with_context(|| format!("decode image '{}'", path.display()))?
        .to_rgba8();
    let (width, height) = img.dimensions();
    let mut data = img.into_raw();
    for px in data.chunks_exact_mut(4) {
        let p = Rgba8Premul::from_straight_rgba(px[0], px[1], px[2], px[3]);
        px.copy_from_slice(&p.to_array());
    }
    Ok(ImageData {
        width,
        height,
        rgba8_premul: Arc::new(data),
    })
}
