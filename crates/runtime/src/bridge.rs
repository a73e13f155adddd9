//! Bridge lifecycle
//!
//! A [`Bridge`] is the single native-side handle onto one Lua state. It owns
//! the evaluation stack, the call-depth counter and the handle tables, and
//! it is what every calling convention goes through.
//!
//! # Ownership
//!
//! - [`Bridge::create`] builds a fresh Lua state and fully initializes it
//!   (standard libraries, native bindings, module loaders, the bundle
//!   loading global). The bridge owns that state.
//! - [`Bridge::attach`] wraps a state somebody else created and initialized.
//!   Nothing is installed and the state is left alone on teardown. The
//!   bridge only holds a weak reference: once the owner drops the state,
//!   every call through the bridge fails with its usual sentinel.
//!
//! There is at most one live bridge per Lua state. The state keeps a weak
//! link back to it so native bindings running inside a script can find the
//! bridge again with [`Bridge::current`].
//!
//! `Bridge` is a cheap reference-counted handle: clones share the same
//! stack and depth counter.

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::file::{FileUtils, LocalFileUtils};
use lunabridge_core::{CallDepth, HandleTable};
use mlua::{Function, Lua, LuaOptions, StdLib, Value, WeakLua};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use tracing::{debug, error, warn};

/// Whether the bridge created the Lua state or was attached to it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Created by `Bridge::create`; torn down with the bridge
    Owned,
    /// Attached to an externally owned state; never torn down by the bridge
    Attached,
}

// Strong for states the bridge created, weak for attached ones
pub(crate) enum Engine {
    Owned(Lua),
    Attached(WeakLua),
}

impl Engine {
    fn upgrade(&self) -> Option<Lua> {
        match self {
            Engine::Owned(lua) => Some(lua.clone()),
            Engine::Attached(weak) => weak.try_upgrade(),
        }
    }
}

pub(crate) struct BridgeInner {
    // Engine values are released before the state itself (field drop order)
    pub(crate) stack: RefCell<Vec<Value>>,
    pub(crate) objects: RefCell<HandleTable>,
    pub(crate) next_function_ref: Cell<i32>,
    pub(crate) depth: CallDepth,
    pub(crate) config: BridgeConfig,
    pub(crate) files: Rc<dyn FileUtils>,
    pub(crate) ownership: Ownership,
    pub(crate) engine: Engine,
}

impl Drop for BridgeInner {
    fn drop(&mut self) {
        if let Some(lua) = self.engine.upgrade() {
            lua.remove_app_data::<BridgeLink>();
        }
        debug!("bridge released ({:?})", self.ownership);
    }
}

// Stored in the Lua app data; weak so the state does not keep the bridge alive
struct BridgeLink(Weak<BridgeInner>);

#[derive(Clone)]
pub struct Bridge {
    pub(crate) inner: Rc<BridgeInner>,
}

/// Native binding installer run by [`BridgeBuilder::build`]
pub type Binding = Box<dyn FnOnce(&Lua) -> mlua::Result<()>>;

/// Module searcher installed into the loader chain at build time
pub type PlatformLoader = Box<dyn Fn(&Lua, String) -> mlua::Result<Value>>;

/// Step-by-step construction of an owning bridge
///
/// # Example
///
/// ```rust,no_run
/// use lunabridge::{Bridge, BridgeConfig};
///
/// let bridge = Bridge::builder()
///     .config(BridgeConfig::default().with_search_path("scripts"))
///     .binding(|lua| {
///         let greet = lua.create_function(|_, name: String| Ok(format!("hello {}", name)))?;
///         lua.globals().set("greet", greet)
///     })
///     .build()
///     .expect("engine init failed");
/// assert_eq!(bridge.execute_string("assert(greet('x') == 'hello x')"), 1);
/// ```
pub struct BridgeBuilder {
    config: BridgeConfig,
    files: Option<Rc<dyn FileUtils>>,
    bindings: Vec<Binding>,
    platform_loaders: Vec<PlatformLoader>,
}

impl BridgeBuilder {
    fn new() -> Self {
        Self {
            config: BridgeConfig::default(),
            files: None,
            bindings: Vec::new(),
            platform_loaders: Vec::new(),
        }
    }

    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Use custom file utilities instead of `LocalFileUtils`
    pub fn file_utils(mut self, files: Rc<dyn FileUtils>) -> Self {
        self.files = Some(files);
        self
    }

    /// Install native bindings after the standard libraries are open
    pub fn binding<F>(mut self, binding: F) -> Self
    where
        F: FnOnce(&Lua) -> mlua::Result<()> + 'static,
    {
        self.bindings.push(Box::new(binding));
        self
    }

    /// Add a module searcher to the loader chain (position 2)
    pub fn platform_loader<F>(mut self, loader: F) -> Self
    where
        F: Fn(&Lua, String) -> mlua::Result<Value> + 'static,
    {
        self.platform_loaders.push(Box::new(loader));
        self
    }

    /// Create and initialize the Lua state
    pub fn build(self) -> Result<Bridge> {
        // SAFETY: the debug library backs traceback handlers and precompiled
        // bundles are loaded as bytecode; both need the unrestricted state.
        // Bytecode only comes from archives the host application ships.
        let lua = unsafe { Lua::unsafe_new_with(StdLib::ALL, LuaOptions::default()) };

        let files = self
            .files
            .unwrap_or_else(|| Rc::new(LocalFileUtils::from_config(&self.config)));
        let bridge = Bridge::install(
            &lua,
            Engine::Owned(lua.clone()),
            Ownership::Owned,
            self.config,
            files,
        )?;

        crate::refs::install_bindings(&lua, bridge.config())?;
        for binding in self.bindings {
            binding(&lua)?;
        }

        if bridge.inner.config.asset_searcher {
            bridge.add_loader(crate::loaders::asset_searcher(&lua)?)?;
        }
        for loader in self.platform_loaders {
            bridge.add_loader_fn(move |lua, name| loader(lua, name))?;
        }

        let load_chunks = lua.create_function(|lua, zip_name: String| {
            let bridge = Bridge::current(lua).ok_or(BridgeError::Detached)?;
            Ok(bridge.load_chunks_from_zip(&zip_name))
        })?;
        lua.globals()
            .set(bridge.inner.config.bundle_loader_global.as_str(), load_chunks)?;

        let search_paths = bridge.inner.config.search_paths.clone();
        for path in &search_paths {
            bridge.add_search_path(path)?;
        }

        debug!("bridge created");
        Ok(bridge)
    }
}

impl Bridge {
    /// Create an owning bridge with the default configuration
    pub fn create() -> Result<Bridge> {
        Self::builder().build()
    }

    /// Create an owning bridge with `config`
    pub fn create_with(config: BridgeConfig) -> Result<Bridge> {
        Self::builder().config(config).build()
    }

    pub fn builder() -> BridgeBuilder {
        BridgeBuilder::new()
    }

    /// Wrap an already initialized, externally owned Lua state
    ///
    /// The bridge does not keep `lua` alive and never closes it.
    pub fn attach(lua: &Lua) -> Result<Bridge> {
        Self::attach_with(lua, BridgeConfig::default())
    }

    /// Like [`Bridge::attach`] with an explicit configuration
    pub fn attach_with(lua: &Lua, config: BridgeConfig) -> Result<Bridge> {
        let files = Rc::new(LocalFileUtils::from_config(&config));
        Self::install(
            lua,
            Engine::Attached(lua.weak()),
            Ownership::Attached,
            config,
            files,
        )
    }

    fn install(
        lua: &Lua,
        engine: Engine,
        ownership: Ownership,
        config: BridgeConfig,
        files: Rc<dyn FileUtils>,
    ) -> Result<Bridge> {
        if Self::current(lua).is_some() {
            return Err(BridgeError::AlreadyAttached);
        }

        let inner = Rc::new(BridgeInner {
            stack: RefCell::new(Vec::new()),
            objects: RefCell::new(HandleTable::new()),
            next_function_ref: Cell::new(1),
            depth: CallDepth::new(),
            config,
            files,
            ownership,
            engine,
        });
        lua.set_app_data(BridgeLink(Rc::downgrade(&inner)));
        Ok(Bridge { inner })
    }

    /// The live bridge attached to `lua`, if any
    ///
    /// This is how native bindings called from a script get back to the
    /// bridge (to push values, call handles, or raise assertions).
    pub fn current(lua: &Lua) -> Option<Bridge> {
        let link = lua.app_data_ref::<BridgeLink>()?;
        let inner = link.0.upgrade()?;
        Some(Bridge { inner })
    }

    /// Tear the bridge down
    ///
    /// Clears the evaluation stack and sweeps handles of native objects
    /// that are already gone. For an owned state a final full GC cycle
    /// runs so userdata finalizers fire while the host is still around; the
    /// state itself is released once the last handle to it is gone. An
    /// attached state is left untouched.
    pub fn close(self) {
        self.clean();
        self.purge_dead_objects();
        if let Engine::Owned(lua) = &self.inner.engine {
            if let Err(e) = lua.gc_collect() {
                warn!("final collection failed: {}", e);
            }
        }
    }

    /// The Lua state, or `None` once an attached state has been dropped
    pub fn lua(&self) -> Option<Lua> {
        self.inner.engine.upgrade()
    }

    /// True while the Lua state is still alive
    pub fn is_live(&self) -> bool {
        self.lua().is_some()
    }

    /// The Lua state for an operation that reports failure as a `Result`
    pub(crate) fn engine(&self) -> Result<Lua> {
        self.lua().ok_or(BridgeError::EngineClosed)
    }

    /// The Lua state for an operation that reports failure as a sentinel
    pub(crate) fn live_engine(&self) -> Option<Lua> {
        let lua = self.lua();
        if lua.is_none() {
            error!("[LUA ERROR] {}", BridgeError::EngineClosed);
        }
        lua
    }

    pub fn ownership(&self) -> Ownership {
        self.inner.ownership
    }

    pub fn is_owner(&self) -> bool {
        self.inner.ownership == Ownership::Owned
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    pub fn file_utils(&self) -> &dyn FileUtils {
        self.inner.files.as_ref()
    }

    /// Current reentrancy depth (0 at native top level)
    pub fn depth(&self) -> usize {
        self.inner.depth.current()
    }

    /// Look up a global function by name
    pub(crate) fn global_function(&self, name: &str) -> Option<Function> {
        let lua = self.lua()?;
        match lua.globals().get::<Value>(name) {
            Ok(Value::Function(function)) => Some(function),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("ownership", &self.inner.ownership)
            .field("depth", &self.inner.depth.current())
            .field("stack_depth", &self.inner.stack.borrow().len())
            .finish()
    }
}
