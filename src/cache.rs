use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use thiserror::Error;

/// Shared handle to a cached resource. The cache itself only holds a weak
/// reference unless the entry was pinned, so dropping every handle makes the
/// entry collectable.
pub type ResourceHandle<T> = Rc<RefCell<T>>;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("resource '{0}' not found")]
    NotFound(String),
    #[error("out of memory allocating {0} bytes")]
    OutOfMemory(usize),
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),
    #[error("graphics error: {0}")]
    GraphicsApi(String),
    #[error("no video mode is active")]
    NoVideoMode,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Decode(#[from] image::ImageError),
}

enum Slot<T> {
    Live(Weak<RefCell<T>>),
    /// A previous load of this path failed; further retrieves short-circuit
    /// with `NotFound` until the failures are explicitly cleared.
    Failed,
}

/// Path-keyed resource store. The forward table keeps weak references so an
/// unreferenced resource can be reclaimed; pinned entries additionally hold a
/// strong reference for the lifetime of the cache.
pub struct ResourceCache<T> {
    slots: HashMap<String, Slot<T>>,
    pinned: HashMap<String, ResourceHandle<T>>,
    started: bool,
}

impl<T> Default for ResourceCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ResourceCache<T> {
    pub fn new() -> Self {
        Self { slots: HashMap::new(), pinned: HashMap::new(), started: false }
    }

    pub fn start(&mut self) -> Result<(), ResourceError> {
        if self.started {
            return Err(ResourceError::InvalidArgument("resource cache is already started"));
        }
        self.slots.clear();
        self.pinned.clear();
        self.started = true;
        Ok(())
    }

    /// Clears both tables, releasing every reference the cache holds. Native
    /// data owned by the resources is not freed here; callers that need an
    /// immediate release must free it before stopping.
    pub fn stop(&mut self) {
        self.slots.clear();
        self.pinned.clear();
        self.started = false;
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Looks up `path`, loading it through `load` on a miss. A recorded
    /// failure fails immediately with `NotFound` without invoking `load`
    /// again. `persistent` pins the entry against collection.
    pub fn retrieve<F>(
        &mut self,
        path: &str,
        persistent: bool,
        load: F,
    ) -> Result<ResourceHandle<T>, ResourceError>
    where
        T: Default,
        F: FnOnce(&str, &mut T) -> Result<(), ResourceError>,
    {
        if !self.started {
            return Err(ResourceError::InvalidArgument("resource cache is not started"));
        }
        match self.slots.get(path) {
            Some(Slot::Failed) => return Err(ResourceError::NotFound(path.to_string())),
            Some(Slot::Live(weak)) => {
                if let Some(handle) = weak.upgrade() {
                    if persistent {
                        self.pinned.entry(path.to_string()).or_insert_with(|| Rc::clone(&handle));
                    }
                    return Ok(handle);
                }
                // Collected since the last retrieve; reload below.
            }
            None => {}
        }
        let handle: ResourceHandle<T> = Rc::new(RefCell::new(T::default()));
        if let Err(err) = load(path, &mut *handle.borrow_mut()) {
            self.slots.insert(path.to_string(), Slot::Failed);
            return Err(err);
        }
        self.slots.insert(path.to_string(), Slot::Live(Rc::downgrade(&handle)));
        if persistent {
            self.pinned.insert(path.to_string(), Rc::clone(&handle));
        }
        Ok(handle)
    }

    /// Visits every live entry, skipping failure markers. The live set is
    /// snapshotted first, so a visitor that indirectly adds or removes entries
    /// cannot corrupt the traversal; entries added during the pass are not
    /// visited. The first visitor error aborts the pass and propagates.
    pub fn process<F>(&mut self, mut visitor: F) -> Result<(), ResourceError>
    where
        F: FnMut(&str, &ResourceHandle<T>) -> Result<(), ResourceError>,
    {
        for (path, handle) in self.snapshot() {
            visitor(&path, &handle)?;
        }
        Ok(())
    }

    /// Drops recorded failures so an explicit reload may retry those paths.
    pub fn clear_failures(&mut self) {
        self.slots.retain(|_, slot| matches!(slot, Slot::Live(_)));
    }

    /// Inverse lookup: the path a live handle was loaded from.
    pub fn path_of(&self, handle: &ResourceHandle<T>) -> Option<&str> {
        self.slots.iter().find_map(|(path, slot)| match slot {
            Slot::Live(weak) => weak
                .upgrade()
                .filter(|live| Rc::ptr_eq(live, handle))
                .map(|_| path.as_str()),
            Slot::Failed => None,
        })
    }

    pub fn live_count(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| matches!(slot, Slot::Live(weak) if weak.strong_count() > 0))
            .count()
    }

    fn snapshot(&mut self) -> Vec<(String, ResourceHandle<T>)> {
        self.slots.retain(|_, slot| match slot {
            Slot::Live(weak) => weak.strong_count() > 0,
            Slot::Failed => true,
        });
        self.slots
            .iter()
            .filter_map(|(path, slot)| match slot {
                Slot::Live(weak) => weak.upgrade().map(|handle| (path.clone(), handle)),
                Slot::Failed => None,
            })
            .collect()
    }
}
