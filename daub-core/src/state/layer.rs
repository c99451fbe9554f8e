//! # Layers
//!
//! A layer is an ordered stack of elements, bottom first. Its pixels live in the rasterizer,
//! keyed by [`LayerID`]; the layer itself only holds the last encoded snapshot for saving.

use crate::{
    blend::Blend,
    element::{Element, ElementID, VertexData},
};

pub type LayerID = crate::id::StableID<Layer>;

/// The user-editable attributes of a layer.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LayerProperties {
    pub name: String,
    pub blend: Blend,
    pub visible: bool,
    pub locked: bool,
}
impl Default for LayerProperties {
    fn default() -> Self {
        Self {
            name: "Layer".into(),
            blend: Blend::default(),
            visible: true,
            locked: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Layer {
    id: LayerID,
    properties: LayerProperties,
    elements: Vec<Element>,
    /// PNG of the composite as of the last save or load.
    snapshot: Option<std::sync::Arc<[u8]>>,
}
impl Layer {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: LayerID::new(),
            properties: LayerProperties {
                name: name.into(),
                ..LayerProperties::default()
            },
            elements: Vec::new(),
            snapshot: None,
        }
    }
    /// Rebuild a layer as it was saved.
    #[must_use]
    pub fn from_parts(id: LayerID, properties: LayerProperties, elements: Vec<Element>) -> Self {
        Self {
            id,
            properties,
            elements,
            snapshot: None,
        }
    }
    #[must_use]
    pub fn id(&self) -> LayerID {
        self.id
    }
    #[must_use]
    pub fn properties(&self) -> &LayerProperties {
        &self.properties
    }
    #[must_use]
    pub fn name(&self) -> &str {
        &self.properties.name
    }
    #[must_use]
    pub fn blend(&self) -> Blend {
        self.properties.blend
    }
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.properties.visible
    }
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.properties.locked
    }
    /// Bottom to top.
    #[must_use]
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }
    /// Bottom to top, each with its vertex data. Stale vertex caches are rebuilt first.
    pub fn drawables(&mut self) -> impl Iterator<Item = (&Element, &VertexData)> + '_ {
        for element in &mut self.elements {
            element.vertices();
        }
        self.elements
            .iter()
            .filter_map(|element| Some((element, element.cached_vertices()?)))
    }
    #[must_use]
    pub fn element(&self, id: ElementID) -> Option<&Element> {
        self.elements.iter().find(|element| element.id() == id)
    }
    #[must_use]
    pub fn snapshot(&self) -> Option<&std::sync::Arc<[u8]>> {
        self.snapshot.as_ref()
    }
    pub fn set_snapshot(&mut self, png: Option<std::sync::Arc<[u8]>>) {
        self.snapshot = png;
    }

    pub(super) fn properties_mut(&mut self) -> &mut LayerProperties {
        &mut self.properties
    }
    pub(super) fn element_list_mut(&mut self) -> &mut Vec<Element> {
        &mut self.elements
    }
    pub(super) fn element_mut(&mut self, id: ElementID) -> Option<&mut Element> {
        self.elements.iter_mut().find(|element| element.id() == id)
    }
}
