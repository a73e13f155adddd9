//! Lunabridge Core: engine-independent primitives for the scripting bridge
//!
//! This crate holds the pieces of the bridge that do not depend on a
//! particular scripting engine, so they can be tested without one.
//!
//! Key design principles:
//! - TaggedValue: What native code hands to scripts (Int, Dict, Array, objects)
//! - HandleTable: Weak script handle -> native object relation
//! - CallDepth: How deep we are in native -> script transitions
//!
//! # Modules
//!
//! - `value`: Closed `TaggedValue` enum used for marshaling
//! - `object`: Native object identity (`ObjectIds`, `ScriptObject`, `ObjectRef`)
//! - `handles`: Weak handle table with never-reused ids
//! - `depth`: Reentrancy depth counter with a scoped guard

pub mod depth;
pub mod handles;
pub mod object;
pub mod value;

pub use depth::{CallDepth, DepthGuard, reentrancy_violation};
pub use handles::HandleTable;
pub use object::{ObjectIds, ObjectRef, ScriptObject};
pub use value::{TaggedArray, TaggedDict, TaggedValue};
