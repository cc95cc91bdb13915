use std::path::PathBuf;

use image::RgbImage;
use tracing::trace;

use crate::config::CaptureRegion;
use crate::error::RenderError;

/// Target the protective overlay is painted onto.
pub trait OverlaySurface {
    /// Paint `image` over the monitored region.
    fn present(&mut self, image: &RgbImage) -> Result<(), RenderError>;
    /// Remove any overlay and restore the normal display.
    fn clear(&mut self) -> Result<(), RenderError>;
}

impl<T: OverlaySurface + ?Sized> OverlaySurface for Box<T> {
    fn present(&mut self, image: &RgbImage) -> Result<(), RenderError> {
        (**self).present(image)
    }

    fn clear(&mut self) -> Result<(), RenderError> {
        (**self).clear()
    }
}

/// Off-screen surface.
///
/// Keeps the last presented image in memory and optionally mirrors it to a
/// PNG file. `clear` is a no-op while nothing is shown.
pub struct HeadlessSurface {
    region: CaptureRegion,
    snapshot: Option<PathBuf>,
    current: Option<RgbImage>,
    presents: u64,
    clears: u64,
}

impl HeadlessSurface {
    pub fn new(region: CaptureRegion) -> Self {
        Self {
            region,
            snapshot: None,
            current: None,
            presents: 0,
            clears: 0,
        }
    }

    /// Also write every presented overlay to `path` as PNG.
    pub fn with_snapshot(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot = Some(path.into());
        self
    }

    /// Overlay currently shown, if any.
    pub fn current(&self) -> Option<&RgbImage> {
        self.current.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    pub fn presents(&self) -> u64 {
        self.presents
    }

    /// Clears that actually removed an overlay.
    pub fn clears(&self) -> u64 {
        self.clears
    }
}

impl OverlaySurface for HeadlessSurface {
    fn present(&mut self, image: &RgbImage) -> Result<(), RenderError> {
        if image.dimensions() != (self.region.width, self.region.height) {
            return Err(RenderError::SizeMismatch {
                width: self.region.width,
                height: self.region.height,
                got_width: image.width(),
                got_height: image.height(),
            });
        }
        if let Some(path) = &self.snapshot {
            image.save(path)?;
        }
        self.current = Some(image.clone());
        self.presents += 1;
        trace!(region = %self.region, "overlay presented");
        Ok(())
    }

    fn clear(&mut self) -> Result<(), RenderError> {
        if self.current.take().is_some() {
            self.clears += 1;
            trace!(region = %self.region, "overlay cleared");
        }
        Ok(())
    }
}
