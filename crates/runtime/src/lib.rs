//! Lunabridge: a native <-> Lua scripting bridge
//!
//! Native code drives an embedded Lua state through a [`Bridge`]:
//!
//! - Values are staged on an evaluation stack with the `push_*` family
//!   (scalars, strings, tagged dictionaries and arrays, native objects)
//! - Scripts run through three calling conventions: source text
//!   ([`Bridge::execute_string`]), a global by name
//!   ([`Bridge::execute_global_function`]) and a registered callable by
//!   handle ([`Bridge::execute_function_by_handle`])
//! - Module bundles (zip archives of chunks) are preloaded with
//!   [`Bridge::load_chunks_from_zip`]
//! - Native bindings reached from scripts can raise assertions back into
//!   the running script with [`Bridge::execute_assert`]
//!
//! Everything is single-threaded: a bridge and its Lua state belong to the
//! thread that created them.
//!
//! # Example
//!
//! ```rust,no_run
//! use lunabridge::Bridge;
//!
//! let bridge = Bridge::create().expect("engine init failed");
//! bridge.execute_string("function add(a, b) return a + b end");
//!
//! let add = bridge.lua().unwrap().globals().get("add").unwrap();
//! let handle = bridge.register_function(add).unwrap();
//! bridge.push_int(2);
//! bridge.push_int(3);
//! assert_eq!(bridge.execute_function_by_handle(handle, 2), 5);
//! ```

pub mod bridge;
pub mod bundle;
pub mod config;
pub mod error;
pub mod file;
pub mod invoke;
pub mod loaders;
pub mod refs;
pub mod stack;

pub use bridge::{Binding, Bridge, BridgeBuilder, Ownership, PlatformLoader};
pub use bundle::{ChunkArchive, ZipChunkArchive, register_chunks};
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use file::{FileUtils, LocalFileUtils};
pub use refs::ObjectProxy;

// Engine-independent types
pub use lunabridge_core::{
    CallDepth, DepthGuard, HandleTable, ObjectIds, ObjectRef, ScriptObject, TaggedArray,
    TaggedDict, TaggedValue,
};

// The engine itself, for bindings and host code
pub use mlua;
