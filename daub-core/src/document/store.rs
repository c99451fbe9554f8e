//! Where document bytes live.

use super::{DocumentID, PersistError};
use crate::{element::ElementID, state::LayerID};
use std::path::{Path, PathBuf};

/// Names one blob within a document.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BlobKey {
    /// A layer's composite.
    Layer(LayerID),
    /// A chartlet's pixels.
    Element(ElementID),
}

/// Persistence of opaque byte blobs keyed by document and blob. Implementations must not
/// interpret the bytes.
pub trait BlobStore: Send + Sync {
    /// Every document in the store.
    fn documents(&self) -> Result<Vec<DocumentID>, PersistError>;
    /// `Ok(None)` if there's no such document.
    fn read_meta(&self, document: DocumentID) -> Result<Option<Vec<u8>>, PersistError>;
    fn write_meta(&self, document: DocumentID, bytes: &[u8]) -> Result<(), PersistError>;
    /// `Ok(None)` if there's no such blob.
    fn get(&self, document: DocumentID, key: BlobKey) -> Result<Option<Vec<u8>>, PersistError>;
    fn put(&self, document: DocumentID, key: BlobKey, bytes: &[u8]) -> Result<(), PersistError>;
    /// Removing something that isn't there is fine.
    fn remove(&self, document: DocumentID, key: BlobKey) -> Result<(), PersistError>;
    /// Every blob stored for a document.
    fn keys(&self, document: DocumentID) -> Result<Vec<BlobKey>, PersistError>;
}

const META_FILE: &str = "document.json";
const LAYER_DIR: &str = "layers";
const ELEMENT_DIR: &str = "elements";
const BLOB_EXTENSION: &str = "png";

/// A folder per document:
///
/// ```text
/// <root>/<document>/document.json
/// <root>/<document>/layers/<layer>.png
/// <root>/<document>/elements/<element>.png
/// ```
#[derive(Clone, Debug)]
pub struct FolderStore {
    root: PathBuf,
}
impl FolderStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
    fn document_dir(&self, document: DocumentID) -> PathBuf {
        self.root.join(document.to_string())
    }
    fn blob_path(&self, document: DocumentID, key: BlobKey) -> PathBuf {
        let (dir, name) = match key {
            BlobKey::Layer(id) => (LAYER_DIR, id.to_string()),
            BlobKey::Element(id) => (ELEMENT_DIR, id.to_string()),
        };
        self.document_dir(document)
            .join(dir)
            .join(name)
            .with_extension(BLOB_EXTENSION)
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, PersistError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Write to a sibling temp file, then rename over the target, so a crash mid-write never
/// leaves a truncated file behind.
fn write_replacing(path: &Path, bytes: &[u8]) -> Result<(), PersistError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let temp = path.with_extension("partial");
    std::fs::write(&temp, bytes)?;
    std::fs::rename(&temp, path)?;
    Ok(())
}

/// Ids of every `<id>.png` in a directory. Anything else is ignored.
fn stems<T>(dir: &Path) -> Result<Vec<T>, PersistError>
where
    T: std::str::FromStr,
{
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };
    let mut ids = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(BLOB_EXTENSION) {
            continue;
        }
        if let Some(id) = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| stem.parse().ok())
        {
            ids.push(id);
        }
    }
    Ok(ids)
}

impl BlobStore for FolderStore {
    fn documents(&self) -> Result<Vec<DocumentID>, PersistError> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut documents = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let id = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| name.parse::<DocumentID>().ok());
            if let Some(id) = id {
                if path.join(META_FILE).is_file() {
                    documents.push(id);
                }
            }
        }
        documents.sort();
        Ok(documents)
    }
    fn read_meta(&self, document: DocumentID) -> Result<Option<Vec<u8>>, PersistError> {
        read_optional(&self.document_dir(document).join(META_FILE))
    }
    fn write_meta(&self, document: DocumentID, bytes: &[u8]) -> Result<(), PersistError> {
        write_replacing(&self.document_dir(document).join(META_FILE), bytes)
    }
    fn get(&self, document: DocumentID, key: BlobKey) -> Result<Option<Vec<u8>>, PersistError> {
        read_optional(&self.blob_path(document, key))
    }
    fn put(&self, document: DocumentID, key: BlobKey, bytes: &[u8]) -> Result<(), PersistError> {
        write_replacing(&self.blob_path(document, key), bytes)
    }
    fn remove(&self, document: DocumentID, key: BlobKey) -> Result<(), PersistError> {
        match std::fs::remove_file(self.blob_path(document, key)) {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
    fn keys(&self, document: DocumentID) -> Result<Vec<BlobKey>, PersistError> {
        let dir = self.document_dir(document);
        let mut keys: Vec<BlobKey> = stems(&dir.join(LAYER_DIR))?
            .into_iter()
            .map(BlobKey::Layer)
            .collect();
        keys.extend(stems(&dir.join(ELEMENT_DIR))?.into_iter().map(BlobKey::Element));
        Ok(keys)
    }
}

#[cfg(test)]
mod test {
    use super::{BlobKey, BlobStore, FolderStore};
    use crate::document::DocumentID;
    use crate::state::LayerID;

    #[test]
    fn layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = FolderStore::new(dir.path());
        let document = DocumentID::new();
        let layer = LayerID::new();
        assert!(store.documents().unwrap().is_empty());
        assert!(store.read_meta(document).unwrap().is_none());

        store.put(document, BlobKey::Layer(layer), b"pixels").unwrap();
        store.write_meta(document, b"{}").unwrap();
        let expected = dir
            .path()
            .join(document.to_string())
            .join("layers")
            .join(format!("{layer}.png"));
        assert_eq!(std::fs::read(expected).unwrap(), b"pixels");
        assert_eq!(store.documents().unwrap(), [document]);
        assert_eq!(store.keys(document).unwrap(), [BlobKey::Layer(layer)]);

        // Overwrite, then remove twice.
        store.put(document, BlobKey::Layer(layer), b"new").unwrap();
        assert_eq!(
            store.get(document, BlobKey::Layer(layer)).unwrap().as_deref(),
            Some(&b"new"[..])
        );
        store.remove(document, BlobKey::Layer(layer)).unwrap();
        store.remove(document, BlobKey::Layer(layer)).unwrap();
        assert!(store.get(document, BlobKey::Layer(layer)).unwrap().is_none());
        assert!(store.keys(document).unwrap().is_empty());
    }
}
