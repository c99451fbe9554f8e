//! # Observers
//!
//! Fan-out notification that never keeps an observer alive. Pools hold [`Weak`] references;
//! dead entries are pruned before every dispatch.

use crate::{element::ElementID, state::layer::LayerID};
use std::sync::{Arc, Weak};

/// Something about the document changed.
#[derive(Clone, Debug, PartialEq)]
pub enum DataEvent {
    ElementAdded { layer: LayerID, element: ElementID },
    /// Elements of these layers changed in some other way.
    ElementsChanged(Vec<LayerID>),
    /// Layer list, order, properties or selection changed.
    LayersChanged,
    History { can_undo: bool, can_redo: bool },
}

/// Pixels changed.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum RenderEvent {
    /// The in-progress stroke drew more stamps.
    StrokeUpdated,
    LayerRedrawn(LayerID),
    /// The final composite was rebuilt.
    Composited,
}

pub trait DataObserver: Send + Sync {
    fn data_changed(&self, event: &DataEvent);
}
pub trait RenderObserver: Send + Sync {
    fn rendered(&self, event: RenderEvent);
}

pub struct ObserverPool<T: ?Sized> {
    observers: parking_lot::Mutex<Vec<Weak<T>>>,
}
impl<T: ?Sized> Default for ObserverPool<T> {
    fn default() -> Self {
        Self {
            observers: parking_lot::Mutex::new(Vec::new()),
        }
    }
}
impl<T: ?Sized> std::fmt::Debug for ObserverPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObserverPool({} entries)", self.observers.lock().len())
    }
}
impl<T: ?Sized> ObserverPool<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    /// Start notifying `observer`. Adding the same observer twice notifies it twice.
    pub fn add(&self, observer: &Arc<T>) {
        self.observers.lock().push(Arc::downgrade(observer));
    }
    pub fn remove(&self, observer: &Arc<T>) {
        let target = Arc::downgrade(observer);
        self.observers
            .lock()
            .retain(|weak| !Weak::ptr_eq(weak, &target));
    }
    /// Number of observers still alive.
    #[must_use]
    pub fn len(&self) -> usize {
        let mut observers = self.observers.lock();
        observers.retain(|weak| weak.strong_count() > 0);
        observers.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Call `f` on every live observer, in the order they were added.
    ///
    /// The lock is released before any observer runs, so observers may add or remove
    /// themselves from within the callback.
    pub fn notify(&self, mut f: impl FnMut(&T)) {
        let live: Vec<Arc<T>> = {
            let mut observers = self.observers.lock();
            observers.retain(|weak| weak.strong_count() > 0);
            observers.iter().filter_map(Weak::upgrade).collect()
        };
        for observer in &live {
            f(observer);
        }
    }
}
impl ObserverPool<dyn DataObserver> {
    pub fn emit(&self, event: &DataEvent) {
        self.notify(|observer| observer.data_changed(event));
    }
}
impl ObserverPool<dyn RenderObserver> {
    pub fn emit(&self, event: RenderEvent) {
        self.notify(|observer| observer.rendered(event));
    }
}
