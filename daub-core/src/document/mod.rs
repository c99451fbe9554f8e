//! # Documents
//!
//! On disk, a document is a JSON [`DocumentMeta`] plus opaque PNG blobs: one per layer (the
//! layer's last composite) and one per chartlet. Everything goes through a [`BlobStore`], so
//! where and how the bytes live is someone else's business.
//!
//! Saving is split in two. [`DocumentSnapshot::capture`] needs the rasterizer and runs on the
//! painting thread; [`DocumentSnapshot::write`] only needs the store and can run anywhere,
//! typically behind a [`debounce::SaveDebouncer`].
//!
//! Saves are incremental. Each canvas keeps a [`SaveCache`] of encoded bytes: a layer is only
//! re-encoded once it has been redrawn, a chartlet texture only ever once, and only blobs whose
//! bytes differ from the previous capture (or that the store lost) are written.

pub mod debounce;
pub mod store;

pub use store::{BlobKey, BlobStore, FolderStore};

use crate::{
    blend::BlendMode,
    brush::{BrushID, BrushSnapshot, BrushState},
    color::Color,
    element::{Element, ElementID, ElementKind, Geometry, LineStrip, Shape, StrokeRun},
    id::StableID,
    raster::{Rasterizer, TextureID},
    state::{CanvasData, Layer, LayerID, LayerProperties},
    stroke::{EncodedSegment, Segment},
    util::PixelRect,
};
use chrono::{DateTime, Utc};
use hashbrown::{HashMap, HashSet};
use std::sync::Arc;

pub type DocumentID = StableID<DocumentMeta>;

#[derive(thiserror::Error, Debug)]
pub enum PersistError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad document json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no document {0}")]
    NotFound(DocumentID),
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DocumentMeta {
    pub id: DocumentID,
    /// Canvas size in pixels.
    pub size: [u32; 2],
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    /// Whatever produced the document wants to remember. Opaque here.
    #[serde(default)]
    pub generation: serde_json::Map<String, serde_json::Value>,
    pub background: Color,
    #[serde(default)]
    pub default_brush: BrushState,
    /// Bottom to top.
    #[serde(default)]
    pub layers: Vec<LayerMeta>,
    #[serde(default)]
    pub current_layer: Option<LayerID>,
}
impl DocumentMeta {
    #[must_use]
    pub fn new(size: [u32; 2]) -> Self {
        let now = Utc::now();
        Self {
            id: DocumentID::new(),
            size,
            created: now,
            updated: now,
            generation: serde_json::Map::new(),
            background: Color::WHITE,
            default_brush: BrushState::default(),
            layers: Vec::new(),
            current_layer: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LayerMeta {
    pub id: LayerID,
    #[serde(flatten)]
    pub properties: LayerProperties,
    #[serde(default)]
    pub elements: Vec<ElementMeta>,
}

#[derive(Copy, Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GeometryMeta {
    pub center: [f32; 2],
    pub size: [f32; 2],
    #[serde(default)]
    pub rotation: f32,
}
impl From<&Geometry> for GeometryMeta {
    fn from(value: &Geometry) -> Self {
        Self {
            center: value.center.into(),
            size: value.size.into(),
            rotation: value.rotation,
        }
    }
}
impl From<GeometryMeta> for Geometry {
    fn from(value: GeometryMeta) -> Self {
        Self {
            center: value.center.into(),
            size: value.size.into(),
            rotation: value.rotation,
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RunMeta {
    pub seed: u64,
    pub scale_factor: f32,
    pub segments: Vec<EncodedSegment>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementKindMeta {
    /// Pixels in the element's blob.
    Chartlet,
    Shape(Shape),
    LineStrip {
        brush: BrushState,
        runs: Vec<RunMeta>,
        finished: bool,
    },
    Clear,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ElementMeta {
    pub id: ElementID,
    pub geometry: GeometryMeta,
    #[serde(default)]
    pub blend: BlendMode,
    #[serde(flatten)]
    pub kind: ElementKindMeta,
}
impl ElementMeta {
    #[must_use]
    pub fn describe(element: &Element) -> Self {
        let kind = match element.kind() {
            ElementKind::Chartlet(_) => ElementKindMeta::Chartlet,
            ElementKind::Shape(shape) => ElementKindMeta::Shape(*shape),
            ElementKind::Clear => ElementKindMeta::Clear,
            ElementKind::LineStrip(strip) => ElementKindMeta::LineStrip {
                brush: strip.brush().state.clone(),
                runs: strip
                    .runs()
                    .iter()
                    .map(|run| RunMeta {
                        seed: run.seed,
                        scale_factor: run.scale_factor,
                        segments: run.segments.iter().map(Segment::encode).collect(),
                    })
                    .collect(),
                finished: strip.is_finished(),
            },
        };
        Self {
            id: element.id(),
            geometry: element.geometry().into(),
            blend: element.blend(),
            kind,
        }
    }
}

/// Encoded bytes carried from one save to the next.
#[derive(Debug, Default)]
pub struct SaveCache {
    /// Textures never change once made, so neither does their PNG.
    textures: HashMap<TextureID, Arc<[u8]>>,
    /// What the last capture handed out, per key.
    captured: HashMap<BlobKey, Arc<[u8]>>,
}
impl SaveCache {
    /// The next capture treats every blob as changed. For after a failed write.
    pub fn forget_captured(&mut self) {
        self.captured.clear();
    }
    pub(crate) fn forget_texture(&mut self, texture: TextureID) {
        self.textures.remove(&texture);
    }
    /// Bytes known to be in the store already, e.g. just loaded.
    fn remember(&mut self, key: BlobKey, bytes: Arc<[u8]>, texture: Option<TextureID>) {
        if let Some(texture) = texture {
            self.textures.insert(texture, bytes.clone());
        }
        self.captured.insert(key, bytes);
    }
    fn texture_png<R: Rasterizer + ?Sized>(
        &mut self,
        texture: TextureID,
        rasterizer: &mut R,
    ) -> Option<Arc<[u8]>> {
        if let Some(png) = self.textures.get(&texture) {
            return Some(png.clone());
        }
        let png: Arc<[u8]> = rasterizer.encode_texture(texture)?.into();
        self.textures.insert(texture, png.clone());
        Some(png)
    }
    /// Same allocation as last capture means same bytes.
    fn blob(
        &self,
        key: BlobKey,
        bytes: Arc<[u8]>,
        captured: &mut HashMap<BlobKey, Arc<[u8]>>,
    ) -> SnapshotBlob {
        let changed = self
            .captured
            .get(&key)
            .map_or(true, |last| !Arc::ptr_eq(last, &bytes));
        captured.insert(key, bytes.clone());
        SnapshotBlob {
            key,
            bytes,
            changed,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SnapshotBlob {
    pub key: BlobKey,
    pub bytes: Arc<[u8]>,
    /// Differs from what the previous capture produced for this key.
    pub changed: bool,
}

/// Everything one save writes, detached from the canvas and the rasterizer.
#[derive(Clone, Debug)]
pub struct DocumentSnapshot {
    pub meta: DocumentMeta,
    /// Every blob the metadata refers to, changed or not.
    pub blobs: Vec<SnapshotBlob>,
}
impl DocumentSnapshot {
    /// Encode the canvas as it is now. Updates `meta` in place, and each layer's snapshot.
    /// Blobs that fail to encode are logged and left out.
    pub fn capture<R: Rasterizer + ?Sized>(
        meta: &mut DocumentMeta,
        canvas: &mut CanvasData,
        rasterizer: &mut R,
    ) -> Self {
        meta.updated = Utc::now();
        meta.size = rasterizer.canvas_size();
        meta.current_layer = canvas.current_layer();
        meta.layers = canvas
            .layers()
            .iter()
            .map(|layer| LayerMeta {
                id: layer.id(),
                properties: layer.properties().clone(),
                elements: layer.elements().iter().map(ElementMeta::describe).collect(),
            })
            .collect();

        let (layers, saves) = canvas.save_parts();
        let mut captured = HashMap::new();
        let mut blobs = Vec::new();
        for layer in layers {
            // A layer keeps its snapshot until it is redrawn.
            let png = match layer.snapshot() {
                Some(png) => Some(png.clone()),
                None => rasterizer.encode_layer(layer.id()).map(Arc::from),
            };
            match png {
                Some(png) => {
                    layer.set_snapshot(Some(png.clone()));
                    blobs.push(saves.blob(BlobKey::Layer(layer.id()), png, &mut captured));
                }
                None => log::warn!("layer {} has no pixels to save", layer.id()),
            }
            for element in layer.elements() {
                let Some(texture) = element.chartlet_texture() else {
                    continue;
                };
                match saves.texture_png(texture, rasterizer) {
                    Some(png) => {
                        blobs.push(saves.blob(BlobKey::Element(element.id()), png, &mut captured));
                    }
                    None => log::warn!("chartlet {} lost its pixels, not saved", element.id()),
                }
            }
        }
        saves.captured = captured;
        Self {
            meta: meta.clone(),
            blobs,
        }
    }
    /// Write changed blobs and any the store is missing, then the metadata, then drop blobs
    /// nothing refers to anymore. Returns how many blobs were written.
    ///
    /// If this fails, call [`CanvasData::mark_unsaved`] so the next capture writes everything.
    pub fn write<S: BlobStore + ?Sized>(&self, store: &S) -> Result<usize, PersistError> {
        let id = self.meta.id;
        let existing: HashSet<BlobKey> = store.keys(id)?.into_iter().collect();
        let mut written = 0;
        for blob in &self.blobs {
            if blob.changed || !existing.contains(&blob.key) {
                store.put(id, blob.key, &blob.bytes)?;
                written += 1;
            }
        }
        store.write_meta(id, &serde_json::to_vec_pretty(&self.meta)?)?;
        for key in existing {
            if !self.blobs.iter().any(|kept| kept.key == key) {
                log::debug!("removing stale blob {key:?} of {id}");
                store.remove(id, key)?;
            }
        }
        log::info!("saved {id}, wrote {written} of {} blobs", self.blobs.len());
        Ok(written)
    }
}

/// What a load couldn't find. The document loads regardless.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Blobs that were missing or wouldn't decode.
    pub missing: Vec<BlobKey>,
    /// Chartlets dropped for lack of pixels.
    pub dropped_elements: Vec<ElementID>,
}
impl LoadReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.dropped_elements.is_empty()
    }
}

/// Read and decode a blob, recording it as missing if that doesn't work out.
fn fetch<S: BlobStore + ?Sized>(
    store: &S,
    document: DocumentID,
    key: BlobKey,
    report: &mut LoadReport,
) -> Option<Vec<u8>> {
    match store.get(document, key) {
        Ok(Some(bytes)) => Some(bytes),
        Ok(None) => {
            log::warn!("{document} is missing blob {key:?}");
            report.missing.push(key);
            None
        }
        Err(err) => {
            log::warn!("failed to read blob {key:?} of {document}: {err}");
            report.missing.push(key);
            None
        }
    }
}

/// Load a document, uploading its textures through `rasterizer` and drawing every layer.
pub fn load_document<S: BlobStore + ?Sized, R: Rasterizer + ?Sized>(
    store: &S,
    id: DocumentID,
    rasterizer: &mut R,
) -> Result<(DocumentMeta, CanvasData, LoadReport), PersistError> {
    let bytes = store.read_meta(id)?.ok_or(PersistError::NotFound(id))?;
    let meta: DocumentMeta = serde_json::from_slice(&bytes)?;
    if meta.size != rasterizer.canvas_size() {
        log::warn!(
            "{id} is {:?} but the canvas is {:?}",
            meta.size,
            rasterizer.canvas_size()
        );
    }
    let mut report = LoadReport::default();
    let mut loaded = Vec::new();
    let mut layers = Vec::with_capacity(meta.layers.len());
    for layer_meta in &meta.layers {
        let mut elements = Vec::with_capacity(layer_meta.elements.len());
        for element_meta in &layer_meta.elements {
            let geometry = Geometry::from(element_meta.geometry);
            let element = match &element_meta.kind {
                ElementKindMeta::Chartlet => {
                    let key = BlobKey::Element(element_meta.id);
                    let decoded = fetch(store, id, key, &mut report).and_then(|png| {
                        let texture = rasterizer.decode_texture(&png)?;
                        Some((texture, Arc::<[u8]>::from(png)))
                    });
                    let Some((texture, png)) = decoded else {
                        if !report.missing.contains(&key) {
                            report.missing.push(key);
                        }
                        report.dropped_elements.push(element_meta.id);
                        continue;
                    };
                    loaded.push((key, png, Some(texture)));
                    Element::chartlet(texture, PixelRect::default())
                }
                ElementKindMeta::Shape(shape) => Element::shape(*shape, geometry),
                ElementKindMeta::Clear => Element::clear(),
                ElementKindMeta::LineStrip {
                    brush,
                    runs,
                    finished,
                } => {
                    let snapshot = BrushSnapshot {
                        brush: BrushID::default(),
                        state: brush.clone(),
                        texture: None,
                        grain: None,
                    };
                    let runs = runs
                        .iter()
                        .map(|run| StrokeRun {
                            seed: run.seed,
                            scale_factor: run.scale_factor,
                            segments: run.segments.iter().map(Segment::from).collect(),
                        })
                        .collect();
                    Element::line_strip(LineStrip::from_runs(snapshot, runs, *finished))
                }
            };
            elements.push(
                element
                    .with_geometry(geometry)
                    .with_id(element_meta.id)
                    .with_blend(element_meta.blend),
            );
        }
        let mut layer =
            Layer::from_parts(layer_meta.id, layer_meta.properties.clone(), elements);
        let key = BlobKey::Layer(layer.id());
        if let Some(png) = fetch(store, id, key, &mut report) {
            let png: Arc<[u8]> = png.into();
            layer.set_snapshot(Some(png.clone()));
            loaded.push((key, png, None));
        }
        layers.push(layer);
    }
    let current = meta
        .current_layer
        .filter(|current| layers.iter().any(|layer| layer.id() == *current))
        .or_else(|| layers.last().map(Layer::id));
    let mut canvas = CanvasData::from_parts(layers, current);
    let (_, saves) = canvas.save_parts();
    for (key, png, texture) in loaded {
        saves.remember(key, png, texture);
    }
    canvas.redraw_all(rasterizer);
    if !report.is_complete() {
        log::warn!("{id} loaded incomplete: {report:?}");
    }
    Ok((meta, canvas, report))
}
