use crate::foundation::core::{Canvas, Rgba8Premul};
use crate::foundation::error::{WavyteError, WavyteResult};
use crate::render::composite::{crossfade_over, layer_over, wipe_over};
use crate::render::surface::{ColorSpace, Surface, SurfaceDesc};
use crate::scene::scene::Scene;
use crate::scene::transition::TransitionStyle;

/// Output parameters of the compositor.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct StageSettings {
    /// Logical size.
    pub size: Canvas,
    /// Logical-to-physical scale factor.
    pub resolution_scale: f64,
    /// Colour space of every surface.
    pub color_space: ColorSpace,
    /// Fill drawn below both scenes; `None` keeps the final surface transparent.
    pub background: Option<Rgba8Premul>,
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            size: Canvas::default(),
            resolution_scale: 1.0,
            color_space: ColorSpace::Srgb,
            background: None,
        }
    }
}

impl StageSettings {
    /// Descriptor shared by the three stage surfaces.
    pub fn surface_desc(&self) -> SurfaceDesc {
        SurfaceDesc {
            size: self.size,
            resolution_scale: self.resolution_scale,
            color_space: self.color_space,
        }
    }

    /// Reject sizes and scales no surface can be allocated for.
    pub fn validate(&self) -> WavyteResult<()> {
        if self.size.width == 0 || self.size.height == 0 {
            return Err(WavyteError::validation("stage size must be non-zero"));
        }
        if !self.resolution_scale.is_finite() || self.resolution_scale <= 0.0 {
            return Err(WavyteError::validation(
                "stage resolution_scale must be finite and > 0",
            ));
        }
        Ok(())
    }
}

/// Three-surface compositor: the incoming scene, the outgoing scene and the composited frame.
pub struct Stage {
    settings: StageSettings,
    current: Surface,
    previous: Surface,
    output: Surface,
    reallocations: u64,
}

impl Stage {
    /// Allocate the surfaces for `settings`.
    pub fn new(settings: StageSettings) -> Self {
        let desc = settings.surface_desc();
        Self {
            current: Surface::new(desc),
            previous: Surface::new(desc),
            output: Surface::new(desc),
            settings,
            reallocations: 0,
        }
    }

    /// Apply new settings. Only surfaces whose descriptor changed are reallocated.
    ///
    /// Returns the number of reallocated surfaces.
    pub fn configure(&mut self, settings: &StageSettings) -> usize {
        let desc = settings.surface_desc();
        let mut n = 0;
        for surface in [&mut self.current, &mut self.previous, &mut self.output] {
            if surface.desc() != desc {
                *surface = Surface::new(desc);
                n += 1;
            }
        }
        self.reallocations += n as u64;
        self.settings = settings.clone();
        n
    }

    /// Draw both scenes and composite them into the final surface.
    pub fn render(&mut self, current: &mut Scene, previous: Option<&mut Scene>) -> WavyteResult<()> {
        let has_previous = match previous {
            Some(prev) => {
                prev.render(&mut self.previous)?;
                true
            }
            None => false,
        };
        current.render(&mut self.current)?;

        self.output.clear();
        if let Some(bg) = self.settings.background {
            self.output.fill(bg);
        }

        if !has_previous {
            return layer_over(&mut self.output, &self.current);
        }

        let transition = current.transition();
        match transition.style {
            TransitionStyle::Layered if transition.previous_on_top => {
                layer_over(&mut self.output, &self.current)?;
                layer_over(&mut self.output, &self.previous)
            }
            TransitionStyle::Layered => {
                layer_over(&mut self.output, &self.previous)?;
                layer_over(&mut self.output, &self.current)
            }
            TransitionStyle::Crossfade => crossfade_over(
                &mut self.output,
                &self.previous,
                &self.current,
                transition.progress,
            ),
            TransitionStyle::Wipe { dir, soft_edge } => wipe_over(
                &mut self.output,
                &self.previous,
                &self.current,
                transition.progress,
                dir,
                soft_edge,
            ),
        }
    }

    /// Current settings.
    pub fn settings(&self) -> &StageSettings {
        &self.settings
    }

    /// Surface the incoming scene was drawn into.
    pub fn current_surface(&self) -> &Surface {
        &self.current
    }

    /// Surface the outgoing scene was drawn into.
    pub fn previous_surface(&self) -> &Surface {
        &self.previous
    }

    /// The composited frame.
    pub fn final_surface(&self) -> &Surface {
        &self.output
    }

    /// Total number of surface reallocations caused by [`Stage::configure`].
    pub fn reallocations(&self) -> u64 {
        self.reallocations
    }
}
