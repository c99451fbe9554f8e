//! Binds a [`CanvasData`] to the rasterizer that draws it, so a brush can paint straight onto
//! the canvas.

use super::canvas::CanvasData;
use crate::{
    brush::{Brush, StrokeBatch, StrokeSink},
    raster::Rasterizer,
};

pub struct Painter<'a, R: Rasterizer + ?Sized> {
    canvas: &'a mut CanvasData,
    rasterizer: &'a mut R,
    scale_factor: f32,
}
impl<'a, R: Rasterizer + ?Sized> Painter<'a, R> {
    pub fn new(canvas: &'a mut CanvasData, rasterizer: &'a mut R) -> Self {
        Self {
            canvas,
            rasterizer,
            scale_factor: 1.0,
        }
    }
    /// Device pixels per canvas unit for strokes started through this painter.
    #[must_use]
    pub fn with_scale_factor(self, scale_factor: f32) -> Self {
        Self {
            scale_factor,
            ..self
        }
    }
    pub fn canvas(&mut self) -> &mut CanvasData {
        self.canvas
    }
    pub fn rasterizer(&mut self) -> &mut R {
        self.rasterizer
    }
}
impl<R: Rasterizer + ?Sized> StrokeSink for Painter<'_, R> {
    fn scale_factor(&self) -> f32 {
        self.scale_factor
    }
    fn render_segments(&mut self, brush: &Brush, batch: &StrokeBatch<'_>) {
        self.canvas.append(brush, batch, self.rasterizer);
    }
}
