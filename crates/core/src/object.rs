//! Native object identity
//!
//! Native objects live on the native side and are only *referenced* from
//! scripts. Each object carries two identifiers:
//!
//! - a process-unique native id, assigned at construction
//! - a script handle id, assigned lazily the first time the object is pushed
//!   into the engine and cleared again when the handle is removed
//!
//! The bridge never owns native objects. Reference counting stays with the
//! native side (`Rc`), and the handle table only keeps `Weak` back-references.

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

// Native ids start at 1 so that 0 never names a live object
static NEXT_NATIVE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity carried by every object that can be pushed into a script
#[derive(Debug)]
pub struct ObjectIds {
    native_id: u64,
    script_handle: Cell<Option<i32>>,
}

impl ObjectIds {
    /// Allocate a fresh native id with no script handle yet
    pub fn new() -> Self {
        Self {
            native_id: NEXT_NATIVE_ID.fetch_add(1, Ordering::Relaxed),
            script_handle: Cell::new(None),
        }
    }

    /// Process-unique native id
    pub fn native_id(&self) -> u64 {
        self.native_id
    }

    /// Script handle id, if the object has been pushed and not removed since
    pub fn script_handle(&self) -> Option<i32> {
        self.script_handle.get()
    }

    pub(crate) fn set_script_handle(&self, handle: Option<i32>) {
        self.script_handle.set(handle);
    }
}

impl Default for ObjectIds {
    fn default() -> Self {
        Self::new()
    }
}

/// A native object that scripts may reference
///
/// Implementors embed an [`ObjectIds`] and expose it through `ids`. The
/// `as_any` hook lets bindings downcast a resolved object back to its
/// concrete type.
///
/// # Example
///
/// ```rust
/// use lunabridge_core::{ObjectIds, ScriptObject};
/// use std::any::Any;
///
/// struct Sprite {
///     ids: ObjectIds,
///     name: String,
/// }
///
/// impl ScriptObject for Sprite {
///     fn ids(&self) -> &ObjectIds {
///         &self.ids
///     }
///     fn as_any(&self) -> &dyn Any {
///         self
///     }
/// }
/// ```
pub trait ScriptObject: Any {
    fn ids(&self) -> &ObjectIds;

    fn as_any(&self) -> &dyn Any;
}

/// A native object paired with the script type name it is exposed as
#[derive(Clone)]
pub struct ObjectRef {
    pub object: Rc<dyn ScriptObject>,
    pub type_name: String,
}

impl ObjectRef {
    pub fn new(object: Rc<dyn ScriptObject>, type_name: impl Into<String>) -> Self {
        Self {
            object,
            type_name: type_name.into(),
        }
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRef")
            .field("native_id", &self.object.ids().native_id())
            .field("script_handle", &self.object.ids().script_handle())
            .field("type_name", &self.type_name)
            .finish()
    }
}

// PartialEq by identity (Rc pointer comparison)
impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.object, &other.object) && self.type_name == other.type_name
    }
}
