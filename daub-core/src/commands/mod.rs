//! # Commands
//!
//! Commands are the only way the layer and element lists of a canvas change. Each one carries
//! the state it expects to find, so it can be applied forwards or backwards and refuse to run
//! against a document that doesn't match.

pub mod manager;

pub use manager::CommandManager;

use crate::{
    element::{Element, ElementID, Geometry},
    raster::TextureID,
    state::layer::{Layer, LayerID, LayerProperties},
};

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    #[error("command constructed for a state that does not match the current state")]
    MismatchedState,
    #[error("resource referenced by the command is not found")]
    UnknownResource,
    #[error("command makes no changes")]
    NoOp,
}
pub trait CommandConsumer<C> {
    /// Apply a single command. If this generates an error,
    /// the state of `self` should *not* be observably changed.
    fn apply(&mut self, command: DoUndo<'_, C>) -> Result<(), CommandError>;
}

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Element pushed onto the top of a layer.
    AddElement { layer: LayerID, element: Element },
    RemoveElement {
        layer: LayerID,
        index: usize,
        element: Element,
    },
    /// The whole element list of a layer swapped out, for flattening.
    ReplaceElements {
        layer: LayerID,
        before: Vec<Element>,
        after: Vec<Element>,
    },
    TransformElement {
        layer: LayerID,
        element: ElementID,
        from: Geometry,
        to: Geometry,
    },
    ChangeTexture {
        layer: LayerID,
        element: ElementID,
        from: TextureID,
        to: TextureID,
    },
    AddLayer { index: usize, layer: Layer },
    DeleteLayer { index: usize, layer: Layer },
    MoveLayer { from: usize, to: usize },
    SetLayerProperties {
        layer: LayerID,
        from: LayerProperties,
        to: LayerProperties,
    },
    SelectLayer {
        from: Option<LayerID>,
        to: Option<LayerID>,
    },
    /// Many commands as one undo step. Applied in order, undone in reverse.
    Scope(Vec<Command>),
}
impl Command {
    /// Layers whose pixels may differ after applying this command in either direction.
    #[must_use]
    pub fn touched_layers(&self) -> smallvec::SmallVec<[LayerID; 2]> {
        match self {
            Self::AddElement { layer, .. }
            | Self::RemoveElement { layer, .. }
            | Self::ReplaceElements { layer, .. }
            | Self::TransformElement { layer, .. }
            | Self::ChangeTexture { layer, .. } => smallvec::smallvec![*layer],
            Self::AddLayer { layer, .. } | Self::DeleteLayer { layer, .. } => {
                smallvec::smallvec![layer.id()]
            }
            Self::MoveLayer { .. } | Self::SetLayerProperties { .. } | Self::SelectLayer { .. } => {
                smallvec::SmallVec::new()
            }
            Self::Scope(commands) => {
                let mut layers: smallvec::SmallVec<[LayerID; 2]> =
                    commands.iter().flat_map(Self::touched_layers).collect();
                layers.sort_unstable();
                layers.dedup();
                layers
            }
        }
    }
    /// Every texture the elements carried by this command draw from, in either direction.
    pub fn collect_textures(&self, out: &mut Vec<TextureID>) {
        match self {
            Self::AddElement { element, .. } | Self::RemoveElement { element, .. } => {
                out.extend(element.chartlet_texture());
            }
            Self::ReplaceElements { before, after, .. } => {
                out.extend(before.iter().chain(after).filter_map(Element::chartlet_texture));
            }
            Self::ChangeTexture { from, to, .. } => out.extend([*from, *to]),
            Self::AddLayer { layer, .. } | Self::DeleteLayer { layer, .. } => {
                out.extend(layer.elements().iter().filter_map(Element::chartlet_texture));
            }
            Self::TransformElement { .. }
            | Self::MoveLayer { .. }
            | Self::SetLayerProperties { .. }
            | Self::SelectLayer { .. } => (),
            Self::Scope(commands) => {
                for command in commands {
                    command.collect_textures(out);
                }
            }
        }
    }
    /// Whether this changes the layer list, its order, or which layer is selected.
    #[must_use]
    pub fn changes_layers(&self) -> bool {
        match self {
            Self::AddLayer { .. }
            | Self::DeleteLayer { .. }
            | Self::MoveLayer { .. }
            | Self::SetLayerProperties { .. }
            | Self::SelectLayer { .. } => true,
            Self::Scope(commands) => commands.iter().any(Self::changes_layers),
            _ => false,
        }
    }
}

#[derive(PartialEq, Eq, Debug)]
pub enum DoUndo<'c, T> {
    Do(&'c T),
    Undo(&'c T),
}
impl<'c, T> DoUndo<'c, T> {
    /// Apply a closure to the inner type T, maintaining the
    /// Do or Undo status. Returns None if the closure returns None.
    pub fn filter_map<Func, Return>(&self, f: Func) -> Option<DoUndo<'c, Return>>
    where
        Func: FnOnce(&'c T) -> Option<&'c Return>,
        Return: 'c,
    {
        match self {
            Self::Do(c) => Some(DoUndo::Do(f(c)?)),
            Self::Undo(c) => Some(DoUndo::Undo(f(c)?)),
        }
    }
    /// The same command, in the opposite direction.
    #[must_use]
    pub fn inverse(&self) -> Self {
        match self {
            Self::Do(c) => Self::Undo(c),
            Self::Undo(c) => Self::Do(c),
        }
    }
}
