//! # IDs
//! Two flavors of identifier live here:
//!
//! * [`DaubID<T>`] - a counter value handed out per namespace `T` for this session only. Cheap
//!   to copy and hash, never written to disk. Brush instances and GPU textures use these.
//! * [`StableID<T>`] - a random UUID, namespaced by `T`. Survives save/load, so layers, elements
//!   and documents use these as their blob keys.

use std::any::TypeId;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::num::NonZeroU64;

/// Next unused value of each namespace. Absent means nothing was handed out yet.
static NEXT: parking_lot::Mutex<BTreeMap<TypeId, NonZeroU64>> =
    parking_lot::const_mutex(BTreeMap::new());

/// Take `count` consecutive values from namespace `T`, returning the first.
///
/// # Panics
/// When the namespace runs out of `u64`s. The counter is left as it was.
fn take<T: 'static>(count: u64) -> NonZeroU64 {
    let mut next = NEXT.lock();
    let first = *next.entry(TypeId::of::<T>()).or_insert(NonZeroU64::MIN);
    let Some(after) = first.checked_add(count) else {
        panic!("{} ran out of ids", std::any::type_name::<T>());
    };
    next.insert(TypeId::of::<T>(), after);
    first
}

/// Session-unique ID within namespace `T`. Values restart every run, so don't persist them.
/// Two namespaces hand out the same numbers, the type keeps them apart.
pub struct DaubID<T: 'static> {
    value: NonZeroU64,
    namespace: PhantomData<fn() -> T>,
}
impl<T: 'static> DaubID<T> {
    fn from_value(value: NonZeroU64) -> Self {
        Self {
            value,
            namespace: PhantomData,
        }
    }
    /// A value never handed out before in this namespace.
    #[must_use]
    pub fn next() -> Self {
        Self::from_value(take::<T>(1))
    }
    /// `count` fresh IDs in one lock, in ascending order. Unused ones are not returned to the pool.
    pub fn reserve(count: usize) -> impl ExactSizeIterator<Item = Self> {
        let first = take::<T>(count as u64);
        // `take` already checked that the whole block fits.
        (0..count).map(move |offset| Self::from_value(first.saturating_add(offset as u64)))
    }
    #[must_use]
    pub fn value(&self) -> u64 {
        self.value.get()
    }
}
impl<T: 'static> Default for DaubID<T> {
    fn default() -> Self {
        Self::next()
    }
}
impl<T: 'static> Clone for DaubID<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T: 'static> Copy for DaubID<T> {}
impl<T: 'static> PartialEq for DaubID<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}
impl<T: 'static> Eq for DaubID<T> {}
impl<T: 'static> std::hash::Hash for DaubID<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}
impl<T: 'static> std::fmt::Display for DaubID<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = std::any::type_name::<T>();
        write!(f, "{}#{}", name.rsplit("::").next().unwrap_or(name), self.value)
    }
}
impl<T: 'static> std::fmt::Debug for DaubID<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

/// A random, persistent identifier namespaced by `T`. Serialized as a plain UUID string,
/// so the namespace is a compile time thing only.
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct StableID<T> {
    uuid: uuid::Uuid,
    #[serde(skip)]
    _phantom: std::marker::PhantomData<fn() -> T>,
}
impl<T> StableID<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::from_uuid(uuid::Uuid::new_v4())
    }
    #[must_use]
    pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self {
            uuid,
            _phantom: std::marker::PhantomData,
        }
    }
    #[must_use]
    pub const fn uuid(&self) -> uuid::Uuid {
        self.uuid
    }
}
impl<T> Default for StableID<T> {
    fn default() -> Self {
        Self::new()
    }
}
impl<T> Clone for StableID<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for StableID<T> {}
impl<T> PartialEq for StableID<T> {
    fn eq(&self, other: &Self) -> bool {
        self.uuid == other.uuid
    }
}
impl<T> Eq for StableID<T> {}
impl<T> PartialOrd for StableID<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<T> Ord for StableID<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.uuid.cmp(&other.uuid)
    }
}
impl<T> std::hash::Hash for StableID<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.uuid.hash(state);
    }
}
impl<T> std::str::FromStr for StableID<T> {
    type Err = uuid::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s).map(Self::from_uuid)
    }
}
impl<T> std::fmt::Display for StableID<T> {
    /// Lowercase hyphenated, this is also the blob file stem.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.uuid.hyphenated())
    }
}
impl<T> std::fmt::Debug for StableID<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = std::any::type_name::<T>();
        write!(
            f,
            "{}({})",
            name.rsplit("::").next().unwrap_or(name),
            self.uuid.hyphenated()
        )
    }
}
