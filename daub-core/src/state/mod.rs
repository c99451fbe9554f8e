//! # State
//!
//! [`CanvasState`] is the undoable part of a document: the layer stack and which layer is
//! selected. It only changes through [`Command`]s. [`canvas::CanvasData`] wraps it with the
//! in-progress element, history, and observers.

pub mod canvas;
pub mod layer;
pub mod painter;

pub use canvas::{AppendOutcome, CanvasData, StrokeCommit, TransformSelection, TransformTarget};
pub use layer::{Layer, LayerID, LayerProperties};
pub use painter::Painter;

use crate::commands::{Command, CommandConsumer, CommandError, DoUndo};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CanvasState {
    layers: Vec<Layer>,
    current_layer: Option<LayerID>,
}
impl CanvasState {
    #[must_use]
    pub fn new(layers: Vec<Layer>, current_layer: Option<LayerID>) -> Self {
        Self {
            layers,
            current_layer,
        }
    }
    /// Bottom to top.
    #[must_use]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }
    #[must_use]
    pub fn layer(&self, id: LayerID) -> Option<&Layer> {
        self.layers.iter().find(|layer| layer.id() == id)
    }
    pub(crate) fn layer_mut(&mut self, id: LayerID) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|layer| layer.id() == id)
    }
    #[must_use]
    pub fn layer_index(&self, id: LayerID) -> Option<usize> {
        self.layers.iter().position(|layer| layer.id() == id)
    }
    #[must_use]
    pub fn current_layer(&self) -> Option<LayerID> {
        self.current_layer
    }
    pub(crate) fn layers_mut(&mut self) -> &mut [Layer] {
        &mut self.layers
    }
}

impl CommandConsumer<Command> for CanvasState {
    #[allow(clippy::too_many_lines)]
    fn apply(&mut self, command: DoUndo<'_, Command>) -> Result<(), CommandError> {
        match command {
            DoUndo::Do(Command::AddElement { layer, element }) => {
                let layer = self.layer_mut(*layer).ok_or(CommandError::UnknownResource)?;
                if layer.element(element.id()).is_some() {
                    return Err(CommandError::MismatchedState);
                }
                layer.element_list_mut().push(element.clone());
                Ok(())
            }
            DoUndo::Undo(Command::AddElement { layer, element }) => {
                let layer = self.layer_mut(*layer).ok_or(CommandError::UnknownResource)?;
                let elements = layer.element_list_mut();
                if elements.last().map(crate::element::Element::id) != Some(element.id()) {
                    return Err(CommandError::MismatchedState);
                }
                elements.pop();
                Ok(())
            }
            DoUndo::Do(Command::RemoveElement {
                layer,
                index,
                element,
            }) => {
                let layer = self.layer_mut(*layer).ok_or(CommandError::UnknownResource)?;
                let elements = layer.element_list_mut();
                match elements.get(*index) {
                    Some(found) if found.id() == element.id() => {
                        elements.remove(*index);
                        Ok(())
                    }
                    Some(_) => Err(CommandError::MismatchedState),
                    None => Err(CommandError::UnknownResource),
                }
            }
            DoUndo::Undo(Command::RemoveElement {
                layer,
                index,
                element,
            }) => {
                let layer = self.layer_mut(*layer).ok_or(CommandError::UnknownResource)?;
                if *index > layer.elements().len() || layer.element(element.id()).is_some() {
                    return Err(CommandError::MismatchedState);
                }
                layer.element_list_mut().insert(*index, element.clone());
                Ok(())
            }
            DoUndo::Do(Command::ReplaceElements {
                layer,
                before,
                after,
            })
            | DoUndo::Undo(Command::ReplaceElements {
                layer,
                before: after,
                after: before,
            }) => {
                let layer = self.layer_mut(*layer).ok_or(CommandError::UnknownResource)?;
                let matches = layer.elements().len() == before.len()
                    && layer
                        .elements()
                        .iter()
                        .zip(before)
                        .all(|(a, b)| a.id() == b.id());
                if !matches {
                    return Err(CommandError::MismatchedState);
                }
                *layer.element_list_mut() = after.clone();
                Ok(())
            }
            DoUndo::Do(Command::TransformElement {
                layer,
                element,
                from,
                to,
            })
            | DoUndo::Undo(Command::TransformElement {
                layer,
                element,
                from: to,
                to: from,
            }) => {
                if from == to {
                    return Err(CommandError::NoOp);
                }
                let element = self
                    .layer_mut(*layer)
                    .and_then(|layer| layer.element_mut(*element))
                    .ok_or(CommandError::UnknownResource)?;
                if element.geometry() != from {
                    return Err(CommandError::MismatchedState);
                }
                element.set_geometry(*to);
                Ok(())
            }
            DoUndo::Do(Command::ChangeTexture {
                layer,
                element,
                from,
                to,
            })
            | DoUndo::Undo(Command::ChangeTexture {
                layer,
                element,
                from: to,
                to: from,
            }) => {
                let element = self
                    .layer_mut(*layer)
                    .and_then(|layer| layer.element_mut(*element))
                    .ok_or(CommandError::UnknownResource)?;
                if element.chartlet_texture() != Some(*from) {
                    return Err(CommandError::MismatchedState);
                }
                element.replace_texture(*to);
                Ok(())
            }
            DoUndo::Do(Command::AddLayer { index, layer })
            | DoUndo::Undo(Command::DeleteLayer { index, layer }) => {
                if *index > self.layers.len() {
                    return Err(CommandError::UnknownResource);
                }
                if self.layer(layer.id()).is_some() {
                    return Err(CommandError::MismatchedState);
                }
                self.layers.insert(*index, layer.clone());
                Ok(())
            }
            DoUndo::Undo(Command::AddLayer { index, layer })
            | DoUndo::Do(Command::DeleteLayer { index, layer }) => {
                match self.layers.get(*index) {
                    Some(found) if found.id() == layer.id() => {
                        self.layers.remove(*index);
                        Ok(())
                    }
                    Some(_) => Err(CommandError::MismatchedState),
                    None => Err(CommandError::UnknownResource),
                }
            }
            DoUndo::Do(Command::MoveLayer { from, to })
            | DoUndo::Undo(Command::MoveLayer { from: to, to: from }) => {
                if from == to {
                    return Err(CommandError::NoOp);
                }
                if *from >= self.layers.len() || *to >= self.layers.len() {
                    return Err(CommandError::UnknownResource);
                }
                let layer = self.layers.remove(*from);
                self.layers.insert(*to, layer);
                Ok(())
            }
            DoUndo::Do(Command::SetLayerProperties { layer, from, to })
            | DoUndo::Undo(Command::SetLayerProperties {
                layer,
                from: to,
                to: from,
            }) => {
                if from == to {
                    return Err(CommandError::NoOp);
                }
                let layer = self.layer_mut(*layer).ok_or(CommandError::UnknownResource)?;
                if layer.properties() != from {
                    return Err(CommandError::MismatchedState);
                }
                *layer.properties_mut() = to.clone();
                Ok(())
            }
            DoUndo::Do(Command::SelectLayer { from, to })
            | DoUndo::Undo(Command::SelectLayer { from: to, to: from }) => {
                if from == to {
                    return Err(CommandError::NoOp);
                }
                if self.current_layer != *from {
                    return Err(CommandError::MismatchedState);
                }
                if let Some(to) = to {
                    if self.layer(*to).is_none() {
                        return Err(CommandError::UnknownResource);
                    }
                }
                self.current_layer = *to;
                Ok(())
            }
            DoUndo::Do(Command::Scope(commands)) => {
                for (applied, command) in commands.iter().enumerate() {
                    if let Err(err) = self.apply(DoUndo::Do(command)) {
                        self.rollback(commands[..applied].iter().rev().map(DoUndo::Undo));
                        return Err(err);
                    }
                }
                Ok(())
            }
            DoUndo::Undo(Command::Scope(commands)) => {
                for (applied, command) in commands.iter().rev().enumerate() {
                    if let Err(err) = self.apply(DoUndo::Undo(command)) {
                        let done = &commands[commands.len() - applied..];
                        self.rollback(done.iter().map(DoUndo::Do));
                        return Err(err);
                    }
                }
                Ok(())
            }
        }
    }
}
impl CanvasState {
    /// Put back commands already applied by a scope that then failed partway.
    fn rollback<'c>(&mut self, commands: impl Iterator<Item = DoUndo<'c, Command>>) {
        for command in commands {
            if let Err(err) = self.apply(command) {
                // Each of these just succeeded in the other direction.
                log::error!("scope rollback failed: {err}");
            }
        }
    }
}
