//! Weak handle table: script handle id -> native object
//!
//! Scripts address native objects by an integer handle. The table keeps a
//! `Weak` reference so the script side never extends a native object's
//! lifetime; the two memory models are reconciled only by explicit
//! [`HandleTable::remove`] calls when the native object goes away.
//!
//! Handle ids come from a monotonically increasing counter and are never
//! handed out twice, so a stale handle can never resolve to a different
//! object.

use crate::object::ScriptObject;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

#[derive(Default)]
pub struct HandleTable {
    entries: HashMap<i32, Weak<dyn ScriptObject>>,
    next_handle: i32,
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            next_handle: 1,
        }
    }

    /// Resolve or assign the handle for `object`
    ///
    /// Returns the existing handle when the object already has a live entry,
    /// otherwise assigns the next id and records it on the object. Returns
    /// `None` once the id space is used up; ids are never recycled.
    pub fn bind(&mut self, object: &Rc<dyn ScriptObject>) -> Option<i32> {
        let ids = object.ids();
        if let Some(handle) = ids.script_handle() {
            if self.entries.contains_key(&handle) {
                return Some(handle);
            }
        }

        if self.next_handle <= 0 {
            // Default-constructed tables start at 0
            self.next_handle = 1;
        }
        let handle = self.next_handle;
        self.next_handle = handle.checked_add(1)?;

        self.entries.insert(handle, Rc::downgrade(object));
        ids.set_script_handle(Some(handle));
        Some(handle)
    }

    /// Resolve a handle to its native object, if it is still registered and alive
    pub fn resolve(&self, handle: i32) -> Option<Rc<dyn ScriptObject>> {
        self.entries.get(&handle).and_then(Weak::upgrade)
    }

    /// True if `handle` has an entry (the object may already be dropped)
    pub fn contains(&self, handle: i32) -> bool {
        self.entries.contains_key(&handle)
    }

    /// Invalidate a handle
    ///
    /// Clears the object's recorded handle when the object is still alive.
    /// Returns false if the handle was not registered.
    pub fn remove(&mut self, handle: i32) -> bool {
        match self.entries.remove(&handle) {
            Some(weak) => {
                if let Some(object) = weak.upgrade() {
                    if object.ids().script_handle() == Some(handle) {
                        object.ids().set_script_handle(None);
                    }
                }
                true
            }
            None => false,
        }
    }

    /// Drop entries whose native object no longer exists
    ///
    /// Returns the handles that were purged.
    pub fn purge_dead(&mut self) -> Vec<i32> {
        let dead: Vec<i32> = self
            .entries
            .iter()
            .filter(|(_, weak)| weak.strong_count() == 0)
            .map(|(handle, _)| *handle)
            .collect();
        for handle in &dead {
            self.entries.remove(handle);
        }
        dead
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for HandleTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleTable")
            .field("entries", &self.entries.len())
            .field("next_handle", &self.next_handle)
            .finish()
    }
}
