//! A document bound to the GPU renderer that draws it. Brushes paint straight into it, and it
//! presents into a view-sized output texture.

use crate::{
    render_device::RenderContext,
    renderer::{
        frames::FrameError,
        textures::{create_target, read_back, thumbnail, ReadbackError},
        InProgress, Renderer,
    },
    view_transform::ViewTransform,
};
use daub_core::{
    brush::{Brush, StrokeBatch, StrokeSink},
    color::Color,
    commands::CommandError,
    element::ElementID,
    observers::{ObserverPool, RenderObserver},
    raster::Bitmap,
    state::CanvasData,
};
use std::sync::Arc;
use ultraviolet::Vec2;

/// Blur applied before shrinking a frame into a thumbnail, in output pixels.
const THUMBNAIL_BLUR: f32 = 1.0;

pub struct Canvas {
    data: CanvasData,
    renderer: Renderer,
    scale_factor: f32,
    background: Color,
    view: ViewTransform,
    output: wgpu::Texture,
}

impl Canvas {
    /// A blank document of `size`, fit into a `view_size` output.
    ///
    /// # Errors
    /// If the renderer can't be made for this size.
    pub fn new(
        context: Arc<RenderContext>,
        size: [u32; 2],
        view_size: [u32; 2],
    ) -> anyhow::Result<Self> {
        let renderer = Renderer::new(context, size)?;
        Ok(Self::from_parts(
            CanvasData::new(),
            renderer,
            Color::TRANSPARENT,
            view_size,
        ))
    }
    /// Bind already loaded data. Every layer is redrawn.
    #[must_use]
    pub fn from_parts(
        mut data: CanvasData,
        mut renderer: Renderer,
        background: Color,
        view_size: [u32; 2],
    ) -> Self {
        data.redraw_all(&mut renderer);
        let output = create_target(renderer.context().device(), view_size, "canvas output");
        let mut this = Self {
            data,
            renderer,
            scale_factor: 1.0,
            background,
            view: ViewTransform::default(),
            output,
        };
        this.fit_view();
        this
    }
    #[must_use]
    pub fn data(&self) -> &CanvasData {
        &self.data
    }
    pub fn data_mut(&mut self) -> &mut CanvasData {
        &mut self.data
    }
    #[must_use]
    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }
    pub fn renderer_mut(&mut self) -> &mut Renderer {
        &mut self.renderer
    }
    /// Both halves at once, for operations that take the model and its rasterizer.
    pub fn parts(&mut self) -> (&mut CanvasData, &mut Renderer) {
        (&mut self.data, &mut self.renderer)
    }
    /// Notified on every redraw and composite.
    #[must_use]
    pub fn render_observers(&self) -> &ObserverPool<dyn RenderObserver> {
        self.renderer.observers()
    }
    pub fn set_scale_factor(&mut self, scale_factor: f32) {
        self.scale_factor = scale_factor;
    }
    #[must_use]
    pub fn background(&self) -> Color {
        self.background
    }
    pub fn set_background(&mut self, background: Color) {
        self.background = background;
    }
    #[must_use]
    pub fn view(&self) -> &ViewTransform {
        &self.view
    }
    pub fn view_mut(&mut self) -> &mut ViewTransform {
        &mut self.view
    }
    #[must_use]
    pub fn view_size(&self) -> [u32; 2] {
        [self.output.width(), self.output.height()]
    }
    /// Show the whole document, centered.
    pub fn fit_view(&mut self) {
        use daub_core::raster::Rasterizer;
        let [width, height] = self.renderer.canvas_size();
        let [view_width, view_height] = self.view_size();
        #[allow(clippy::cast_precision_loss)]
        {
            self.view = ViewTransform::fit(
                Vec2::new(width as f32, height as f32),
                Vec2::new(view_width as f32, view_height as f32),
            );
        }
    }
    /// Change the output size. The view is refit.
    pub fn resize_view(&mut self, view_size: [u32; 2]) {
        if view_size == self.view_size() {
            return;
        }
        self.output = create_target(
            self.renderer.context().device(),
            view_size,
            "canvas output",
        );
        self.fit_view();
    }
    /// Commit whatever is being drawn.
    pub fn finish(&mut self) -> Option<ElementID> {
        self.data.finish_current_element(&mut self.renderer)
    }
    /// Throw away whatever is being drawn, e.g. when the surface it was drawn on goes away.
    pub fn discard(&mut self) {
        self.data.discard_current_element(&mut self.renderer);
    }
    pub fn undo(&mut self) -> Result<bool, CommandError> {
        self.data.undo(&mut self.renderer)
    }
    pub fn redo(&mut self) -> Result<bool, CommandError> {
        self.data.redo(&mut self.renderer)
    }
    /// Forget undo and redo, e.g. after a save point. Frees the textures only history held.
    pub fn reset_history(&mut self) {
        self.data.reset_history(&mut self.renderer);
    }
    fn in_progress(&self) -> Option<InProgress> {
        let element = self.data.current_element()?;
        element.line_strip_ref()?;
        Some(InProgress {
            layer: self.data.current_layer()?,
            blend: element.blend(),
        })
    }
    /// Composite into the output.
    ///
    /// # Errors
    /// If the GPU falls too far behind.
    pub fn present(&self) -> Result<(), FrameError> {
        self.renderer.render_frame(
            self.data.layers(),
            self.in_progress(),
            self.background,
            &self.view,
            &self.output,
        )
    }
    #[must_use]
    pub fn output(&self) -> &wgpu::Texture {
        &self.output
    }
    /// The last presented frame.
    pub fn frame(&self) -> Result<Bitmap, ReadbackError> {
        read_back(self.renderer.context(), &self.output)
    }
    /// The last presented frame, softened and shrunk to at most `max_side` pixels.
    pub fn thumbnail(&self, max_side: u32) -> Result<Bitmap, ReadbackError> {
        Ok(thumbnail(&self.frame()?, max_side, THUMBNAIL_BLUR))
    }
}

impl StrokeSink for Canvas {
    fn scale_factor(&self) -> f32 {
        self.scale_factor
    }
    fn render_segments(&mut self, brush: &Brush, batch: &StrokeBatch<'_>) {
        self.data.append(brush, batch, &mut self.renderer);
    }
}

#[cfg(test)]
mod test {
    use super::Canvas;
    use daub_core::{
        brush::{Brush, BrushState},
        color::Color,
        observers::{RenderEvent, RenderObserver},
        stroke::Sample,
    };
    use std::sync::Arc;

    #[derive(Default)]
    struct Events(parking_lot::Mutex<Vec<RenderEvent>>);
    impl RenderObserver for Events {
        fn rendered(&self, event: RenderEvent) {
            self.0.lock().push(event);
        }
    }

    fn pen() -> Brush {
        Brush::new(
            "pen",
            BrushState {
                color: Color::new(1.0, 0.0, 0.0, 1.0),
                point_size: 0.1,
                texture_size: 40.0,
                ..BrushState::default()
            },
        )
    }
    fn stroke(brush: &mut Brush, canvas: &mut Canvas, y: f32) {
        brush.render_began(Sample::new(4.0, y, 1.0), canvas);
        for i in 1..=10 {
            brush.render_moved(Sample::new(4.0 + i as f32 * 5.0, y, 1.0), canvas);
        }
        brush.render_ended(Sample::new(56.0, y, 1.0), canvas);
    }

    #[test]
    fn paint_undo_redo() {
        let Some(context) = crate::render_device::test::context() else {
            return;
        };
        let mut canvas = Canvas::new(context, [64, 64], [64, 64]).unwrap();
        let events = Arc::new(Events::default());
        let observer: Arc<dyn RenderObserver> = events.clone();
        canvas.render_observers().add(&observer);

        let layer = canvas.data().current_layer().unwrap();
        stroke(&mut pen(), &mut canvas, 32.0);
        assert!(events.0.lock().contains(&RenderEvent::StrokeUpdated));
        // Still in progress, nothing in the layer yet but visible in the frame.
        assert!(canvas.renderer().layer_bitmap(layer).unwrap().unwrap().is_blank());
        canvas.present().unwrap();
        assert!(!canvas.frame().unwrap().is_blank());

        assert!(canvas.finish().is_some());
        let drawn = canvas.renderer().layer_bitmap(layer).unwrap().unwrap();
        assert!(!drawn.is_blank());
        assert!(events.0.lock().contains(&RenderEvent::LayerRedrawn(layer)));

        assert!(canvas.undo().unwrap());
        assert!(canvas.renderer().layer_bitmap(layer).unwrap().unwrap().is_blank());
        assert!(canvas.redo().unwrap());
        assert_eq!(canvas.renderer().layer_bitmap(layer).unwrap().unwrap(), drawn);
    }
    #[test]
    fn forgotten_strokes_free_their_textures() {
        let Some(context) = crate::render_device::test::context() else {
            return;
        };
        let mut canvas = Canvas::new(context, [64, 64], [32, 32]).unwrap();
        let baseline = canvas.renderer().texture_count();
        stroke(&mut pen(), &mut canvas, 20.0);
        canvas.finish().unwrap();
        stroke(&mut pen(), &mut canvas, 40.0);
        canvas.finish().unwrap();
        assert_eq!(canvas.renderer().texture_count(), baseline + 2);

        canvas.undo().unwrap();
        assert_eq!(canvas.renderer().texture_count(), baseline + 2);
        canvas.reset_history();
        assert_eq!(canvas.renderer().texture_count(), baseline + 1);
    }
    #[test]
    fn discard_leaves_nothing() {
        let Some(context) = crate::render_device::test::context() else {
            return;
        };
        let mut canvas = Canvas::new(context, [64, 64], [32, 32]).unwrap();
        stroke(&mut pen(), &mut canvas, 20.0);
        canvas.discard();
        assert!(canvas.finish().is_none());
        assert!(canvas.renderer().accumulator_bitmap().unwrap().is_blank());

        canvas.set_background(Color::WHITE);
        canvas.present().unwrap();
        let thumb = canvas.thumbnail(8).unwrap();
        assert_eq!(thumb.size(), [8, 8]);
    }
}
