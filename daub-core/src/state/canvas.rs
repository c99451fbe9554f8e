//! # Canvas data
//!
//! The live document: the command-driven [`CanvasState`], the element currently being drawn,
//! the undo history, and everyone watching. Methods that touch pixels take the [`Rasterizer`]
//! to do it with, so the model itself stays GPU-free.

use super::{CanvasState, Layer, LayerID, LayerProperties};
use crate::{
    brush::{Brush, StrokeBatch},
    commands::{Command, CommandError, CommandManager},
    document::SaveCache,
    element::{Element, ElementID, Geometry, LineStrip},
    observers::{DataEvent, DataObserver, ObserverPool},
    raster::{Crop, Lasso, Mask, MaskMode, Rasterizer, TextureID},
};
use hashbrown::HashSet;

/// What an [`CanvasData::append`] did with the batch.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Extended the stroke run already in progress.
    Continued,
    /// Started a new stroke run, finishing whatever was in progress before.
    Began,
}

/// How a finished stroke run is committed to its layer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrokeCommit {
    /// Crop the accumulated pixels into a chartlet.
    #[default]
    Rasterize,
    /// Keep the stroke run itself, so it can be regenerated later.
    KeepStrokes,
}

/// Where a lasso selection goes once lifted.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransformTarget {
    /// On top of the layer it came from.
    SameLayer,
    /// Into a new layer directly above, which becomes current.
    NewLayer,
}

/// The chartlet produced by one of the `prepare_for_transform` family, ready to be moved.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TransformSelection {
    pub layer: LayerID,
    pub element: ElementID,
}

#[derive(Debug)]
pub struct CanvasData {
    state: CanvasState,
    /// Being drawn right now, not yet in any layer.
    current: Option<Element>,
    commands: CommandManager,
    commit: StrokeCommit,
    observers: ObserverPool<dyn DataObserver>,
    /// Chartlet textures this canvas is responsible for freeing.
    owned: HashSet<TextureID>,
    saves: SaveCache,
}
impl Default for CanvasData {
    fn default() -> Self {
        Self::new()
    }
}

impl CanvasData {
    /// A canvas with one empty, selected layer.
    #[must_use]
    pub fn new() -> Self {
        let layer = Layer::new("Layer 1");
        let current = Some(layer.id());
        Self::from_parts(vec![layer], current)
    }
    /// A canvas with no history, e.g. freshly loaded.
    #[must_use]
    /// Chartlet textures in `layers` become the canvas's to free.
    #[must_use]
    pub fn from_parts(layers: Vec<Layer>, current_layer: Option<LayerID>) -> Self {
        let owned = layers
            .iter()
            .flat_map(|layer| layer.elements().iter().filter_map(Element::chartlet_texture))
            .collect();
        Self {
            state: CanvasState::new(layers, current_layer),
            current: None,
            commands: CommandManager::new(),
            commit: StrokeCommit::default(),
            observers: ObserverPool::new(),
            owned,
            saves: SaveCache::default(),
        }
    }
    #[must_use]
    pub fn state(&self) -> &CanvasState {
        &self.state
    }
    #[must_use]
    pub fn layers(&self) -> &[Layer] {
        self.state.layers()
    }
    #[must_use]
    pub fn layer(&self, id: LayerID) -> Option<&Layer> {
        self.state.layer(id)
    }
    #[must_use]
    pub fn current_layer(&self) -> Option<LayerID> {
        self.state.current_layer()
    }
    #[must_use]
    pub fn current_element(&self) -> Option<&Element> {
        self.current.as_ref()
    }
    /// For live edits of an in-progress element, such as a shape being dragged out.
    pub fn current_element_mut(&mut self) -> Option<&mut Element> {
        self.current.as_mut()
    }
    #[must_use]
    pub fn history(&self) -> &CommandManager {
        &self.commands
    }
    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.commands.can_undo()
    }
    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.commands.can_redo()
    }
    #[must_use]
    pub fn observers(&self) -> &ObserverPool<dyn DataObserver> {
        &self.observers
    }
    #[must_use]
    pub fn stroke_commit(&self) -> StrokeCommit {
        self.commit
    }
    pub fn set_stroke_commit(&mut self, commit: StrokeCommit) {
        self.commit = commit;
    }
    /// Make the next save write every blob, whether or not it changed.
    pub fn mark_unsaved(&mut self) {
        self.saves.forget_captured();
    }
    /// Layers to snapshot alongside the bytes kept from the last save.
    pub(crate) fn save_parts(&mut self) -> (&mut [Layer], &mut SaveCache) {
        (self.state.layers_mut(), &mut self.saves)
    }

    /// Feed freshly made stroke geometry in. Consecutive batches from the same brush instance
    /// extend one stroke run; anything else finishes what was in progress first.
    pub fn append<R: Rasterizer + ?Sized>(
        &mut self,
        brush: &Brush,
        batch: &StrokeBatch<'_>,
        rasterizer: &mut R,
    ) -> AppendOutcome {
        let continues = self
            .current
            .as_ref()
            .and_then(Element::line_strip_ref)
            .is_some_and(|strip| strip.brush().brush == brush.id());

        let outcome = if continues {
            if let Some(current) = &mut self.current {
                current.append_stroke(batch);
            }
            AppendOutcome::Continued
        } else {
            self.finish_current_element(rasterizer);
            rasterizer.clear_accumulator();
            self.current = Some(Element::line_strip(LineStrip::new(brush, batch)));
            AppendOutcome::Began
        };
        if let Some(strip) = self.current.as_ref().and_then(Element::line_strip_ref) {
            rasterizer.accumulate(strip.brush(), batch.points);
        }
        outcome
    }
    /// Start drawing a non-stroke element. Finishes whatever was in progress.
    pub fn begin_element<R: Rasterizer + ?Sized>(&mut self, element: Element, rasterizer: &mut R) {
        self.finish_current_element(rasterizer);
        self.current = Some(element);
    }
    /// Drop the in-progress element without committing anything.
    pub fn discard_current_element<R: Rasterizer + ?Sized>(&mut self, rasterizer: &mut R) {
        if let Some(element) = self.current.take() {
            log::debug!("discarding in-progress {}", element.id());
            rasterizer.clear_accumulator();
            self.release_unreferenced(element.chartlet_texture(), rasterizer);
        }
    }
    /// Commit the in-progress element to the current layer as one undoable step.
    /// Returns the id of what was added, `None` if nothing was.
    pub fn finish_current_element<R: Rasterizer + ?Sized>(
        &mut self,
        rasterizer: &mut R,
    ) -> Option<ElementID> {
        let mut element = self.current.take()?;
        let Some(layer) = self.writable_layer() else {
            log::warn!("no writable layer to commit {} to, dropping it", element.id());
            rasterizer.clear_accumulator();
            self.release_unreferenced(element.chartlet_texture(), rasterizer);
            return None;
        };
        if element.line_strip_ref().is_some() {
            element.finish_stroke();
            element = match self.commit {
                StrokeCommit::KeepStrokes => {
                    rasterizer.clear_accumulator();
                    element
                }
                StrokeCommit::Rasterize => {
                    // Nothing drawn, nothing to add.
                    let Crop { texture, bounds } = rasterizer.crop_accumulator()?;
                    self.owned.insert(texture);
                    Element::chartlet(texture, bounds).with_blend(element.blend())
                }
            };
        }
        let id = element.id();
        match self.execute(Command::AddElement { layer, element }, rasterizer) {
            Ok(()) => {
                self.observers.emit(&DataEvent::ElementAdded { layer, element: id });
                Some(id)
            }
            Err(err) => {
                log::warn!("failed to commit element: {err}");
                None
            }
        }
    }
    /// Add a finished element straight onto the current layer.
    pub fn add_element<R: Rasterizer + ?Sized>(
        &mut self,
        element: Element,
        rasterizer: &mut R,
    ) -> Result<ElementID, CommandError> {
        self.begin_element(element, rasterizer);
        self.finish_current_element(rasterizer)
            .ok_or(CommandError::UnknownResource)
    }
    pub fn remove_element<R: Rasterizer + ?Sized>(
        &mut self,
        layer: LayerID,
        element: ElementID,
        rasterizer: &mut R,
    ) -> Result<(), CommandError> {
        let found = self.state.layer(layer).and_then(|layer| {
            let index = layer.elements().iter().position(|e| e.id() == element)?;
            Some((index, layer.elements()[index].clone()))
        });
        let (index, element) = found.ok_or(CommandError::UnknownResource)?;
        self.execute(
            Command::RemoveElement {
                layer,
                index,
                element,
            },
            rasterizer,
        )
    }
    /// Move, scale or rotate an element.
    pub fn transform_element<R: Rasterizer + ?Sized>(
        &mut self,
        layer: LayerID,
        element: ElementID,
        to: Geometry,
        rasterizer: &mut R,
    ) -> Result<(), CommandError> {
        let from = *self
            .state
            .layer(layer)
            .and_then(|layer| layer.element(element))
            .ok_or(CommandError::UnknownResource)?
            .geometry();
        self.execute(
            Command::TransformElement {
                layer,
                element,
                from,
                to,
            },
            rasterizer,
        )
    }
    /// Point a chartlet at different pixels.
    pub fn change_texture<R: Rasterizer + ?Sized>(
        &mut self,
        layer: LayerID,
        element: ElementID,
        to: TextureID,
        rasterizer: &mut R,
    ) -> Result<(), CommandError> {
        let from = self
            .state
            .layer(layer)
            .and_then(|layer| layer.element(element))
            .and_then(Element::chartlet_texture)
            .ok_or(CommandError::UnknownResource)?;
        self.execute(
            Command::ChangeTexture {
                layer,
                element,
                from,
                to,
            },
            rasterizer,
        )
    }

    /// Flatten a whole layer into a single chartlet, ready to be transformed.
    /// `Ok(None)` if the layer has nothing on it.
    pub fn prepare_for_transform<R: Rasterizer + ?Sized>(
        &mut self,
        layer: LayerID,
        rasterizer: &mut R,
    ) -> Result<Option<TransformSelection>, CommandError> {
        self.finish_current_element(rasterizer);
        let source = self.state.layer_mut(layer).ok_or(CommandError::UnknownResource)?;
        // Already a single chartlet, nothing to flatten.
        if let [only] = source.elements() {
            if only.chartlet_texture().is_some() {
                return Ok(Some(TransformSelection {
                    layer,
                    element: only.id(),
                }));
            }
        }
        let Some(crop) = rasterizer.flatten_layer(source, None) else {
            return Ok(None);
        };
        self.owned.insert(crop.texture);
        let chartlet = Element::chartlet(crop.texture, crop.bounds);
        let element = chartlet.id();
        let before = source.elements().to_vec();
        self.execute(
            Command::ReplaceElements {
                layer,
                before,
                after: vec![chartlet],
            },
            rasterizer,
        )?;
        Ok(Some(TransformSelection { layer, element }))
    }
    /// Lift the lassoed part of a layer into a chartlet, leaving the layer as it was.
    /// `Ok(None)` if the lasso holds nothing.
    pub fn prepare_for_transform_with_mask<R: Rasterizer + ?Sized>(
        &mut self,
        layer: LayerID,
        lasso: &Lasso,
        target: TransformTarget,
        rasterizer: &mut R,
    ) -> Result<Option<TransformSelection>, CommandError> {
        self.lift(layer, lasso, target, false, rasterizer)
    }
    /// Cut the lassoed part of a layer out into a chartlet. The layer keeps only what was
    /// outside the lasso. `Ok(None)` if the lasso holds nothing.
    pub fn prepare_for_transform_with_mask_and_cut<R: Rasterizer + ?Sized>(
        &mut self,
        layer: LayerID,
        lasso: &Lasso,
        target: TransformTarget,
        rasterizer: &mut R,
    ) -> Result<Option<TransformSelection>, CommandError> {
        self.lift(layer, lasso, target, true, rasterizer)
    }
    fn lift<R: Rasterizer + ?Sized>(
        &mut self,
        layer: LayerID,
        lasso: &Lasso,
        target: TransformTarget,
        cut: bool,
        rasterizer: &mut R,
    ) -> Result<Option<TransformSelection>, CommandError> {
        self.finish_current_element(rasterizer);
        let index = self
            .state
            .layer_index(layer)
            .ok_or(CommandError::UnknownResource)?;
        let source = self.state.layer_mut(layer).ok_or(CommandError::UnknownResource)?;
        let mask = |mode| Mask { lasso, mode };

        let Some(selected) = rasterizer.flatten_layer(source, Some(mask(MaskMode::Direct))) else {
            return Ok(None);
        };
        self.owned.insert(selected.texture);
        let selection = Element::chartlet(selected.texture, selected.bounds);
        let element = selection.id();

        let mut commands = Vec::new();
        if cut {
            let remainder = rasterizer
                .flatten_layer(source, Some(mask(MaskMode::Inverse)))
                .map(|crop| {
                    self.owned.insert(crop.texture);
                    Element::chartlet(crop.texture, crop.bounds)
                });
            commands.push(Command::ReplaceElements {
                layer,
                before: source.elements().to_vec(),
                after: remainder.into_iter().collect(),
            });
        }
        let name = format!("{} selection", source.name());
        let destination = match target {
            TransformTarget::SameLayer => {
                commands.push(Command::AddElement {
                    layer,
                    element: selection,
                });
                layer
            }
            TransformTarget::NewLayer => {
                let base = Layer::new(name);
                let new =
                    Layer::from_parts(base.id(), base.properties().clone(), vec![selection]);
                let id = new.id();
                commands.push(Command::AddLayer {
                    index: index + 1,
                    layer: new,
                });
                commands.push(Command::SelectLayer {
                    from: self.state.current_layer(),
                    to: Some(id),
                });
                id
            }
        };
        self.execute(Command::Scope(commands), rasterizer)?;
        Ok(Some(TransformSelection {
            layer: destination,
            element,
        }))
    }

    /// Insert an empty layer above the current one, or on top if none is current, and select it.
    pub fn add_layer<R: Rasterizer + ?Sized>(
        &mut self,
        name: impl Into<String>,
        rasterizer: &mut R,
    ) -> Result<LayerID, CommandError> {
        self.finish_current_element(rasterizer);
        let index = self
            .state
            .current_layer()
            .and_then(|current| self.state.layer_index(current))
            .map_or(self.state.layers().len(), |index| index + 1);
        let layer = Layer::new(name);
        let id = layer.id();
        self.execute(
            Command::Scope(vec![
                Command::AddLayer { index, layer },
                Command::SelectLayer {
                    from: self.state.current_layer(),
                    to: Some(id),
                },
            ]),
            rasterizer,
        )?;
        Ok(id)
    }
    /// Remove a layer. If it was current, the layer below it (or above, if none) becomes current.
    pub fn delete_layer<R: Rasterizer + ?Sized>(
        &mut self,
        layer: LayerID,
        rasterizer: &mut R,
    ) -> Result<(), CommandError> {
        self.finish_current_element(rasterizer);
        let index = self
            .state
            .layer_index(layer)
            .ok_or(CommandError::UnknownResource)?;
        let removed = self.state.layers()[index].clone();
        let mut commands = Vec::with_capacity(2);
        if self.state.current_layer() == Some(layer) {
            let layers = self.state.layers();
            let neighbor = index
                .checked_sub(1)
                .or_else(|| (index + 1 < layers.len()).then_some(index + 1))
                .map(|i| layers[i].id());
            commands.push(Command::SelectLayer {
                from: Some(layer),
                to: neighbor,
            });
        }
        commands.push(Command::DeleteLayer {
            index,
            layer: removed,
        });
        self.execute(Command::Scope(commands), rasterizer)
    }
    /// Reorder, `to` being the index after removal from `from`.
    pub fn move_layer<R: Rasterizer + ?Sized>(
        &mut self,
        from: usize,
        to: usize,
        rasterizer: &mut R,
    ) -> Result<(), CommandError> {
        self.execute(Command::MoveLayer { from, to }, rasterizer)
    }
    pub fn set_layer_properties<R: Rasterizer + ?Sized>(
        &mut self,
        layer: LayerID,
        properties: LayerProperties,
        rasterizer: &mut R,
    ) -> Result<(), CommandError> {
        let from = self
            .state
            .layer(layer)
            .ok_or(CommandError::UnknownResource)?
            .properties()
            .clone();
        self.execute(
            Command::SetLayerProperties {
                layer,
                from,
                to: properties,
            },
            rasterizer,
        )
    }
    pub fn select_layer<R: Rasterizer + ?Sized>(
        &mut self,
        layer: Option<LayerID>,
        rasterizer: &mut R,
    ) -> Result<(), CommandError> {
        self.finish_current_element(rasterizer);
        self.execute(
            Command::SelectLayer {
                from: self.state.current_layer(),
                to: layer,
            },
            rasterizer,
        )
    }

    /// Finish what's in progress, then revert the last step. `Ok(false)` if there was
    /// nothing to undo.
    pub fn undo<R: Rasterizer + ?Sized>(&mut self, rasterizer: &mut R) -> Result<bool, CommandError> {
        self.finish_current_element(rasterizer);
        let Some(command) = self.commands.undo(&mut self.state)? else {
            return Ok(false);
        };
        let (touched, layers_changed) = (command.touched_layers(), command.changes_layers());
        self.refresh(&touched, layers_changed, rasterizer);
        Ok(true)
    }
    /// Finish what's in progress, then replay the last undone step. `Ok(false)` if there was
    /// nothing to redo.
    pub fn redo<R: Rasterizer + ?Sized>(&mut self, rasterizer: &mut R) -> Result<bool, CommandError> {
        self.finish_current_element(rasterizer);
        let Some(command) = self.commands.redo(&mut self.state)? else {
            return Ok(false);
        };
        let (touched, layers_changed) = (command.touched_layers(), command.changes_layers());
        self.refresh(&touched, layers_changed, rasterizer);
        Ok(true)
    }
    /// Forget all undo and redo steps, freeing textures only they still referred to.
    pub fn reset_history<R: Rasterizer + ?Sized>(&mut self, rasterizer: &mut R) {
        let mut textures = Vec::new();
        for command in self.commands.reset() {
            command.collect_textures(&mut textures);
        }
        self.release_unreferenced(textures, rasterizer);
        self.observers.emit(&DataEvent::History {
            can_undo: false,
            can_redo: false,
        });
    }
    /// Rebuild every layer's pixels, e.g. after loading.
    pub fn redraw_all<R: Rasterizer + ?Sized>(&mut self, rasterizer: &mut R) {
        for layer in self.state.layers_mut() {
            rasterizer.redraw_layer(layer);
        }
    }

    /// The current layer, if it exists and isn't locked.
    fn writable_layer(&self) -> Option<LayerID> {
        let layer = self.state.layer(self.state.current_layer()?)?;
        (!layer.is_locked()).then(|| layer.id())
    }
    /// Textures carried in by a successful command become owned. Owned ones left
    /// unreachable, by a failed command or by the redo steps it drops, are freed.
    fn execute<R: Rasterizer + ?Sized>(
        &mut self,
        command: Command,
        rasterizer: &mut R,
    ) -> Result<(), CommandError> {
        let touched = command.touched_layers();
        let layers_changed = command.changes_layers();
        let mut textures = Vec::new();
        command.collect_textures(&mut textures);
        match self.commands.execute(&mut self.state, command) {
            Ok(dropped) => {
                self.owned.extend(textures);
                let mut textures = Vec::new();
                for command in &dropped {
                    command.collect_textures(&mut textures);
                }
                self.release_unreferenced(textures, rasterizer);
            }
            Err(err) => {
                self.release_unreferenced(textures, rasterizer);
                return Err(err);
            }
        }
        self.refresh(&touched, layers_changed, rasterizer);
        Ok(())
    }
    /// Free each owned candidate that no layer, in-progress element or history step uses.
    fn release_unreferenced<R: Rasterizer + ?Sized>(
        &mut self,
        candidates: impl IntoIterator<Item = TextureID>,
        rasterizer: &mut R,
    ) {
        let mut candidates: Vec<_> = candidates
            .into_iter()
            .filter(|texture| self.owned.contains(texture))
            .collect();
        if candidates.is_empty() {
            return;
        }
        let mut referenced = Vec::new();
        for command in self.commands.history() {
            command.collect_textures(&mut referenced);
        }
        let referenced: HashSet<TextureID> = referenced
            .into_iter()
            .chain(
                self.state
                    .layers()
                    .iter()
                    .flat_map(|layer| layer.elements().iter().filter_map(Element::chartlet_texture)),
            )
            .chain(self.current.as_ref().and_then(Element::chartlet_texture))
            .collect();
        candidates.retain(|texture| !referenced.contains(texture));
        for texture in candidates {
            if self.owned.remove(&texture) {
                self.saves.forget_texture(texture);
                rasterizer.release_texture(texture);
            }
        }
    }
    /// Redraw what a command touched and tell the observers.
    fn refresh<R: Rasterizer + ?Sized>(
        &mut self,
        touched: &[LayerID],
        layers_changed: bool,
        rasterizer: &mut R,
    ) {
        for &id in touched {
            match self.state.layer_mut(id) {
                Some(layer) => {
                    // The saved snapshot no longer matches.
                    layer.set_snapshot(None);
                    rasterizer.redraw_layer(layer);
                }
                // Deleted.
                None => rasterizer.release_layer(id),
            }
        }
        if !touched.is_empty() {
            self.observers
                .emit(&DataEvent::ElementsChanged(touched.to_vec()));
        }
        if layers_changed {
            self.observers.emit(&DataEvent::LayersChanged);
        }
        self.observers.emit(&DataEvent::History {
            can_undo: self.commands.can_undo(),
            can_redo: self.commands.can_redo(),
        });
    }
}

#[cfg(test)]
mod test {
    use super::{AppendOutcome, CanvasData, StrokeCommit, TransformTarget};
    use crate::brush::{Brush, BrushState, StrokeBatch};
    use crate::color::Color;
    use crate::commands::CommandError;
    use crate::element::{Element, ElementKind, Geometry, Shape, ShapeKind};
    use crate::observers::{DataEvent, DataObserver};
    use crate::raster::{software::SoftwareRasterizer, Lasso};
    use crate::state::Painter;
    use crate::stroke::{emitter::EmitParams, Emitter, Sample, Segment};
    use ultraviolet::Vec2;

    fn brush() -> Brush {
        Brush::new(
            "pen",
            BrushState {
                point_size: 0.1,
                texture_size: 40.0,
                ..BrushState::default()
            },
        )
    }
    fn stroke(brush: &mut Brush, painter: &mut Painter<'_, SoftwareRasterizer>, y: f32) {
        brush.render_began(Sample::new(4.0, y, 1.0), painter);
        for i in 1..=10 {
            brush.render_moved(Sample::new(4.0 + i as f32 * 5.0, y, 1.0), painter);
        }
        brush.render_ended(Sample::new(56.0, y, 1.0), painter);
    }
    fn square(from: f32, to: f32) -> Lasso {
        Lasso::new(vec![
            Vec2::new(from, from),
            Vec2::new(to, from),
            Vec2::new(to, to),
            Vec2::new(from, to),
        ])
        .unwrap()
    }
    fn filled_rect() -> Element {
        Element::shape(
            Shape {
                kind: ShapeKind::Rectangle,
                color: Color::new(0.2, 0.4, 0.6, 1.0),
                stroke_width: None,
            },
            Geometry {
                center: Vec2::new(32.0, 32.0),
                size: Vec2::new(40.0, 40.0),
                rotation: 0.0,
            },
        )
    }

    #[test]
    fn same_brush_continues() {
        let mut canvas = CanvasData::new();
        let mut raster = SoftwareRasterizer::new(64, 64);
        let mut pen = brush();
        let mut marker = brush();

        let mut painter = Painter::new(&mut canvas, &mut raster);
        stroke(&mut pen, &mut painter, 10.0);
        stroke(&mut pen, &mut painter, 20.0);
        let strip = canvas.current_element().and_then(Element::line_strip_ref).unwrap();
        assert_eq!(strip.stroke_count(), 2);
        let layer = canvas.current_layer().unwrap();
        assert!(canvas.layer(layer).unwrap().elements().is_empty());

        // A different brush instance finalizes the run.
        let mut painter = Painter::new(&mut canvas, &mut raster);
        stroke(&mut marker, &mut painter, 40.0);
        let elements = canvas.layer(layer).unwrap().elements();
        assert_eq!(elements.len(), 1);
        assert!(elements[0].chartlet_texture().is_some());
        let strip = canvas.current_element().and_then(Element::line_strip_ref).unwrap();
        assert_eq!(strip.brush().brush, marker.id());
    }
    #[test]
    fn append_outcomes() {
        let mut canvas = CanvasData::new();
        let mut raster = SoftwareRasterizer::new(64, 64);
        let pen = brush();
        let segments = [Segment {
            begin: Vec2::new(10.0, 10.0),
            end: Vec2::new(20.0, 10.0),
            size: 4.0,
            opacity: 1.0,
            flow: 1.0,
            color: None,
        }];
        let points = Emitter::regenerate(
            &EmitParams {
                state: &pen.state,
                scale_factor: 1.0,
                total_length: None,
            },
            1,
            &segments,
        );
        let batch = StrokeBatch {
            seed: 1,
            scale_factor: 1.0,
            segments: &segments,
            points: &points,
        };
        assert_eq!(canvas.append(&pen, &batch, &mut raster), AppendOutcome::Began);
        assert_eq!(canvas.append(&pen, &batch, &mut raster), AppendOutcome::Continued);
        assert_eq!(canvas.append(&brush(), &batch, &mut raster), AppendOutcome::Began);
    }
    #[test]
    fn undo_redo_restores() {
        let mut canvas = CanvasData::new();
        let mut raster = SoftwareRasterizer::new(64, 64);
        let layer = canvas.current_layer().unwrap();
        let empty = canvas.state().clone();
        for y in [10.0, 30.0, 50.0] {
            // Fresh brush each time, so every stroke is its own element.
            let mut pen = brush();
            stroke(&mut pen, &mut Painter::new(&mut canvas, &mut raster), y);
            canvas.finish_current_element(&mut raster).unwrap();
        }
        let drawn = canvas.state().clone();
        let pixels = raster.layer_bitmap(layer).unwrap().clone();
        assert_eq!(drawn.layer(layer).unwrap().elements().len(), 3);

        for _ in 0..3 {
            assert!(canvas.undo(&mut raster).unwrap());
        }
        assert!(!canvas.undo(&mut raster).unwrap());
        assert_eq!(canvas.state(), &empty);
        assert!(raster.layer_bitmap(layer).unwrap().is_blank());

        for _ in 0..3 {
            assert!(canvas.redo(&mut raster).unwrap());
        }
        assert!(!canvas.redo(&mut raster).unwrap());
        assert_eq!(canvas.state(), &drawn);
        assert_eq!(raster.layer_bitmap(layer), Some(&pixels));
    }
    #[test]
    fn undo_finishes_in_progress_first() {
        let mut canvas = CanvasData::new();
        let mut raster = SoftwareRasterizer::new(64, 64);
        let mut pen = brush();
        stroke(&mut pen, &mut Painter::new(&mut canvas, &mut raster), 10.0);
        assert!(canvas.current_element().is_some());
        // The stroke gets committed, then that commit is what's undone.
        assert!(canvas.undo(&mut raster).unwrap());
        assert!(canvas.current_element().is_none());
        assert!(canvas.can_redo());
    }
    #[test]
    fn invisible_stroke_adds_nothing() {
        let mut canvas = CanvasData::new();
        let mut raster = SoftwareRasterizer::new(64, 64);
        let mut ghost = Brush::new(
            "ghost",
            BrushState {
                max_opacity: 0.0,
                ..brush().state
            },
        );
        stroke(&mut ghost, &mut Painter::new(&mut canvas, &mut raster), 10.0);
        assert!(canvas.finish_current_element(&mut raster).is_none());
        assert!(!canvas.can_undo());
    }
    #[test]
    fn keep_strokes_commits_the_run() {
        let mut canvas = CanvasData::new();
        canvas.set_stroke_commit(StrokeCommit::KeepStrokes);
        let mut raster = SoftwareRasterizer::new(64, 64);
        let mut pen = brush();
        stroke(&mut pen, &mut Painter::new(&mut canvas, &mut raster), 10.0);
        canvas.finish_current_element(&mut raster).unwrap();
        let layer = canvas.layer(canvas.current_layer().unwrap()).unwrap();
        let ElementKind::LineStrip(strip) = layer.elements()[0].kind() else {
            panic!("expected the stroke run itself");
        };
        assert!(strip.is_finished());
        assert!(raster.accumulator().is_blank());
        assert!(!raster.layer_bitmap(layer.id()).unwrap().is_blank());
    }
    #[test]
    fn locked_layer_refuses_strokes() {
        let mut canvas = CanvasData::new();
        let mut raster = SoftwareRasterizer::new(64, 64);
        let layer = canvas.current_layer().unwrap();
        let mut properties = canvas.layer(layer).unwrap().properties().clone();
        properties.locked = true;
        canvas
            .set_layer_properties(layer, properties, &mut raster)
            .unwrap();
        let mut pen = brush();
        stroke(&mut pen, &mut Painter::new(&mut canvas, &mut raster), 10.0);
        assert!(canvas.finish_current_element(&mut raster).is_none());
        assert!(canvas.layer(layer).unwrap().elements().is_empty());
    }
    #[test]
    fn lasso_cut_to_new_layer() {
        let mut canvas = CanvasData::new();
        let mut raster = SoftwareRasterizer::new(64, 64);
        let source = canvas.current_layer().unwrap();
        canvas.add_element(filled_rect(), &mut raster).unwrap();
        let before = raster.composite(canvas.layers(), Color::TRANSPARENT);
        let state_before = canvas.state().clone();

        let selection = canvas
            .prepare_for_transform_with_mask_and_cut(
                source,
                &square(20.0, 36.0),
                TransformTarget::NewLayer,
                &mut raster,
            )
            .unwrap()
            .unwrap();
        assert_ne!(selection.layer, source);
        assert_eq!(canvas.current_layer(), Some(selection.layer));
        let layers = canvas.layers();
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[1].id(), selection.layer);

        // Nothing lost, nothing doubled.
        let source_pixels = raster.layer_bitmap(source).unwrap();
        let lifted = raster.layer_bitmap(selection.layer).unwrap();
        assert_eq!(lifted.pixel(25, 25), before.pixel(25, 25));
        assert_eq!(source_pixels.pixel(25, 25)[3], 0);
        assert_eq!(lifted.pixel(15, 15)[3], 0);
        assert_eq!(raster.composite(canvas.layers(), Color::TRANSPARENT), before);

        // One step.
        canvas.undo(&mut raster).unwrap();
        assert_eq!(canvas.state(), &state_before);
        assert!(raster.layer_bitmap(selection.layer).is_none());
    }
    #[test]
    fn lasso_copy_keeps_source() {
        let mut canvas = CanvasData::new();
        let mut raster = SoftwareRasterizer::new(64, 64);
        let source = canvas.current_layer().unwrap();
        canvas.add_element(filled_rect(), &mut raster).unwrap();
        let selection = canvas
            .prepare_for_transform_with_mask(
                source,
                &square(20.0, 36.0),
                TransformTarget::SameLayer,
                &mut raster,
            )
            .unwrap()
            .unwrap();
        assert_eq!(selection.layer, source);
        let layer = canvas.layer(source).unwrap();
        assert_eq!(layer.elements().len(), 2);
        assert_eq!(layer.elements()[1].id(), selection.element);
        // An empty lasso lifts nothing.
        let nothing = canvas
            .prepare_for_transform_with_mask(
                source,
                &square(0.0, 8.0),
                TransformTarget::SameLayer,
                &mut raster,
            )
            .unwrap();
        assert!(nothing.is_none());
    }
    #[test]
    fn flatten_then_move() {
        let mut canvas = CanvasData::new();
        let mut raster = SoftwareRasterizer::new(64, 64);
        let layer = canvas.current_layer().unwrap();
        canvas.add_element(filled_rect(), &mut raster).unwrap();
        let original = raster.layer_bitmap(layer).unwrap().clone();

        let selection = canvas
            .prepare_for_transform(layer, &mut raster)
            .unwrap()
            .unwrap();
        assert_eq!(canvas.layer(layer).unwrap().elements().len(), 1);
        assert_eq!(raster.layer_bitmap(layer), Some(&original));

        let geometry = *canvas
            .layer(layer)
            .unwrap()
            .element(selection.element)
            .unwrap()
            .geometry();
        let moved = Geometry {
            center: geometry.center + Vec2::new(8.0, 0.0),
            ..geometry
        };
        canvas
            .transform_element(layer, selection.element, moved, &mut raster)
            .unwrap();
        let shifted = raster.layer_bitmap(layer).unwrap();
        assert_eq!(shifted.pixel(12, 30), [0; 4]);
        assert_eq!(shifted.pixel(20 + 8, 30), original.pixel(20, 30));
        // Same geometry again is refused.
        assert_eq!(
            canvas.transform_element(layer, selection.element, moved, &mut raster),
            Err(CommandError::NoOp)
        );
        // Flattening a single chartlet reuses it.
        let again = canvas.prepare_for_transform(layer, &mut raster).unwrap();
        assert_eq!(again, Some(selection));
    }
    #[test]
    fn layer_management() {
        let mut canvas = CanvasData::new();
        let mut raster = SoftwareRasterizer::new(16, 16);
        let bottom = canvas.current_layer().unwrap();
        let top = canvas.add_layer("top", &mut raster).unwrap();
        assert_eq!(canvas.current_layer(), Some(top));
        let middle = canvas.add_layer("middle", &mut raster).unwrap();
        let order: Vec<_> = canvas.layers().iter().map(|l| l.id()).collect();
        assert_eq!(order, [bottom, top, middle]);

        canvas.move_layer(2, 1, &mut raster).unwrap();
        canvas.delete_layer(middle, &mut raster).unwrap();
        // Current was deleted, the one below takes over.
        assert_eq!(canvas.current_layer(), Some(bottom));
        assert_eq!(canvas.layers().len(), 2);
        canvas.undo(&mut raster).unwrap();
        assert_eq!(canvas.current_layer(), Some(middle));
        assert_eq!(
            canvas.select_layer(Some(middle), &mut raster),
            Err(CommandError::NoOp)
        );
    }
    #[test]
    fn dropped_history_frees_textures() {
        let mut canvas = CanvasData::new();
        let mut raster = SoftwareRasterizer::new(64, 64);
        let baseline = raster.texture_count();

        let mut pen = brush();
        stroke(&mut pen, &mut Painter::new(&mut canvas, &mut raster), 10.0);
        canvas.finish_current_element(&mut raster).unwrap();
        let layer = canvas.current_layer().unwrap();
        let first = canvas.layer(layer).unwrap().elements()[0]
            .chartlet_texture()
            .unwrap();
        assert_eq!(raster.texture_count(), baseline + 1);

        // Undone but redoable, so still alive.
        canvas.undo(&mut raster).unwrap();
        assert!(raster.texture(first).is_some());

        // A new commit drops the redo step and what only it held.
        let mut marker = brush();
        stroke(&mut marker, &mut Painter::new(&mut canvas, &mut raster), 30.0);
        canvas.finish_current_element(&mut raster).unwrap();
        assert!(raster.texture(first).is_none());
        assert_eq!(raster.texture_count(), baseline + 1);

        // Still on the layer, so it survives forgetting history.
        let second = canvas.layer(layer).unwrap().elements()[0]
            .chartlet_texture()
            .unwrap();
        canvas.reset_history(&mut raster);
        assert!(!canvas.can_undo());
        assert!(raster.texture(second).is_some());
        assert_eq!(raster.texture_count(), baseline + 1);
    }
    #[test]
    fn reset_history_frees_flattened_textures() {
        let mut canvas = CanvasData::new();
        let mut raster = SoftwareRasterizer::new(64, 64);
        let baseline = raster.texture_count();
        let layer = canvas.current_layer().unwrap();
        canvas.add_element(filled_rect(), &mut raster).unwrap();
        let flat = canvas
            .prepare_for_transform(layer, &mut raster)
            .unwrap()
            .unwrap();
        assert_eq!(raster.texture_count(), baseline + 1);

        // Back to the plain rectangle, the flattened chartlet only lives in redo.
        canvas.undo(&mut raster).unwrap();
        assert!(canvas.layer(layer).unwrap().element(flat.element).is_none());
        canvas.reset_history(&mut raster);
        assert!(!canvas.can_redo());
        assert_eq!(raster.texture_count(), baseline);
    }
    #[test]
    fn observers_hear_commits() {
        #[derive(Default)]
        struct Recorder(parking_lot::Mutex<Vec<DataEvent>>);
        impl DataObserver for Recorder {
            fn data_changed(&self, event: &DataEvent) {
                self.0.lock().push(event.clone());
            }
        }
        let mut canvas = CanvasData::new();
        let mut raster = SoftwareRasterizer::new(64, 64);
        let recorder = std::sync::Arc::new(Recorder::default());
        let observer: std::sync::Arc<dyn DataObserver> = recorder.clone();
        canvas.observers().add(&observer);

        let id = canvas.add_element(filled_rect(), &mut raster).unwrap();
        let layer = canvas.current_layer().unwrap();
        let events = recorder.0.lock().clone();
        assert!(events.contains(&DataEvent::ElementAdded { layer, element: id }));
        assert!(events.contains(&DataEvent::History {
            can_undo: true,
            can_redo: false
        }));
    }
}
