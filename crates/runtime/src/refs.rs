//! Cross-language references
//!
//! Two kinds of integer handles cross the boundary:
//!
//! - **Function handles** name script callables that native code wants to
//!   call later (event callbacks and the like). The callables live in a
//!   registry table keyed by handle, so the engine keeps them alive until
//!   [`Bridge::remove_function_handle`] is called.
//! - **Object handles** name native objects. The native side keeps
//!   ownership; the bridge holds a weak entry in its `HandleTable` and the
//!   engine sees an [`ObjectProxy`] userdata carrying only the handle.
//!   Proxies are cached per handle in a weak-valued registry table so the
//!   same object always shows up as the same script value.
//!
//! Scripts reach the function registry through the built-in `bridge`
//! table:
//!
//! ```lua
//! local id = bridge.ref_function(function(dt) print(dt) end)
//! bridge.remove_function(id)
//! bridge.is_valid(sprite)   -- false once the native sprite is gone
//! bridge.depth()            -- current native -> script nesting
//! ```

use crate::bridge::Bridge;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use lunabridge_core::ScriptObject;
use mlua::{AnyUserData, Function, Lua, MetaMethod, Table, UserData, UserDataFields, UserDataMethods, Value};
use std::rc::Rc;
use tracing::{debug, error};

const FUNCTION_REFS: &str = "lunabridge.function_refs";
const OBJECT_PROXIES: &str = "lunabridge.object_proxies";

/// Script-side stand-in for a native object
#[derive(Debug, Clone)]
pub struct ObjectProxy {
    handle: i32,
    type_name: String,
}

impl ObjectProxy {
    pub fn handle(&self) -> i32 {
        self.handle
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }
}

impl UserData for ObjectProxy {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_field_method_get("handle", |_, this| Ok(this.handle));
        fields.add_field_method_get("type_name", |_, this| Ok(this.type_name.clone()));
    }

    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("is_valid", |lua, this, ()| {
            Ok(Bridge::current(lua).is_some_and(|bridge| bridge.object_alive(this.handle)))
        });
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            Ok(format!("{}: handle {}", this.type_name, this.handle))
        });
    }
}

/// Fetch a bridge-private registry table, creating it on first use
fn registry_table(lua: &Lua, key: &str, weak_values: bool) -> mlua::Result<Table> {
    if let Value::Table(table) = lua.named_registry_value::<Value>(key)? {
        return Ok(table);
    }

    let table = if weak_values {
        lua.load("return setmetatable({}, { __mode = 'v' })")
            .set_name("=lunabridge")
            .eval::<Table>()?
    } else {
        lua.create_table()?
    };
    lua.set_named_registry_value(key, table.clone())?;
    Ok(table)
}

impl Bridge {
    /// Register a script callable and return its handle
    ///
    /// Fails with [`BridgeError::HandlesExhausted`] once every id has been
    /// handed out; ids are never recycled.
    pub fn register_function(&self, function: Function) -> Result<i32> {
        let refs = registry_table(&self.engine()?, FUNCTION_REFS, false)?;
        let handle = self.inner.next_function_ref.get();
        let next = handle
            .checked_add(1)
            .ok_or(BridgeError::HandlesExhausted)?;
        self.inner.next_function_ref.set(next);
        refs.raw_set(handle, function)?;
        debug!("registered function handle {}", handle);
        Ok(handle)
    }

    /// The callable behind `handle`, if it is still registered
    pub fn resolve_function(&self, handle: i32) -> Option<Function> {
        let refs = registry_table(&self.lua()?, FUNCTION_REFS, false).ok()?;
        match refs.raw_get::<Value>(handle) {
            Ok(Value::Function(function)) => Some(function),
            _ => None,
        }
    }

    /// Invalidate a function handle
    ///
    /// Returns false if the handle was not registered. Any later use of the
    /// handle fails like an unknown handle.
    pub fn remove_function_handle(&self, handle: i32) -> bool {
        let removed = self.try_remove_function(handle).unwrap_or_else(|e| {
            error!("[LUA ERROR] failed to remove function handle {}: {}", handle, e);
            false
        });
        if removed {
            debug!("removed function handle {}", handle);
        }
        removed
    }

    fn try_remove_function(&self, handle: i32) -> Result<bool> {
        let refs = registry_table(&self.engine()?, FUNCTION_REFS, false)?;
        let existed = !matches!(refs.raw_get::<Value>(handle)?, Value::Nil);
        if existed {
            refs.raw_set(handle, Value::Nil)?;
        }
        Ok(existed)
    }

    /// Resolve or create the proxy for `object`, typed as `type_name`
    pub(crate) fn object_proxy(&self, object: &Rc<dyn ScriptObject>, type_name: &str) -> Result<Value> {
        let lua = self.engine()?;
        let handle = self
            .inner
            .objects
            .borrow_mut()
            .bind(object)
            .ok_or(BridgeError::HandlesExhausted)?;
        let proxies = registry_table(&lua, OBJECT_PROXIES, true)?;

        if let Value::UserData(cached) = proxies.raw_get::<Value>(handle)? {
            let same_type = cached
                .borrow::<ObjectProxy>()
                .map(|proxy| proxy.type_name == type_name)
                .unwrap_or(false);
            if same_type {
                return Ok(Value::UserData(cached));
            }
        }

        let proxy = lua.create_userdata(ObjectProxy {
            handle,
            type_name: type_name.to_string(),
        })?;
        proxies.raw_set(handle, proxy.clone())?;
        Ok(Value::UserData(proxy))
    }

    /// The native object behind a proxy, if it is still registered and alive
    pub fn resolve_object(&self, proxy: &AnyUserData) -> Option<Rc<dyn ScriptObject>> {
        let handle = proxy.borrow::<ObjectProxy>().ok()?.handle;
        self.inner.objects.borrow().resolve(handle)
    }

    /// Invalidate the script handle of a native object
    ///
    /// Call this when the native object is being destroyed. Proxies already
    /// held by scripts stay around but no longer resolve. Returns false if
    /// the object never had a handle.
    pub fn remove_native_object_reference(&self, object: &dyn ScriptObject) -> bool {
        let Some(handle) = object.ids().script_handle() else {
            return false;
        };

        let removed = self.inner.objects.borrow_mut().remove(handle);
        if let Err(e) = self.clear_proxies(&[handle]) {
            error!("[LUA ERROR] failed to drop proxy for handle {}: {}", handle, e);
        }
        debug!(
            "removed object handle {} (native id {})",
            handle,
            object.ids().native_id()
        );
        removed
    }

    /// Drop handles whose native object no longer exists
    ///
    /// Objects that were dropped without a matching
    /// [`Bridge::remove_native_object_reference`] leave dead entries behind;
    /// this sweeps them and their cached proxies. Returns how many were
    /// removed.
    pub fn purge_dead_objects(&self) -> usize {
        let dead = self.inner.objects.borrow_mut().purge_dead();
        if dead.is_empty() {
            return 0;
        }

        if let Err(e) = self.clear_proxies(&dead) {
            error!("[LUA ERROR] failed to drop dead proxies: {}", e);
        }
        debug!("purged {} dead object handles", dead.len());
        dead.len()
    }

    /// Number of object handles currently registered
    pub fn object_handle_count(&self) -> usize {
        self.inner.objects.borrow().len()
    }

    // Nothing to clear once the engine is gone
    fn clear_proxies(&self, handles: &[i32]) -> Result<()> {
        let Some(lua) = self.lua() else {
            return Ok(());
        };
        let proxies = registry_table(&lua, OBJECT_PROXIES, true)?;
        for handle in handles {
            proxies.raw_set(*handle, Value::Nil)?;
        }
        Ok(())
    }

    fn object_alive(&self, handle: i32) -> bool {
        self.inner.objects.borrow().resolve(handle).is_some()
    }
}

/// Install the `bridge` table of built-in native bindings
pub(crate) fn install_bindings(lua: &Lua, config: &BridgeConfig) -> Result<()> {
    let table = lua.create_table()?;

    table.set(
        "ref_function",
        lua.create_function(|lua, function: Function| {
            let bridge = Bridge::current(lua).ok_or(BridgeError::Detached)?;
            Ok(bridge.register_function(function)?)
        })?,
    )?;

    table.set(
        "remove_function",
        lua.create_function(|lua, handle: i32| {
            let bridge = Bridge::current(lua).ok_or(BridgeError::Detached)?;
            Ok(bridge.remove_function_handle(handle))
        })?,
    )?;

    table.set(
        "is_valid",
        lua.create_function(|lua, value: Value| {
            let bridge = Bridge::current(lua).ok_or(BridgeError::Detached)?;
            Ok(match value {
                Value::UserData(proxy) => bridge.resolve_object(&proxy).is_some(),
                _ => false,
            })
        })?,
    )?;

    table.set(
        "depth",
        lua.create_function(|lua, ()| {
            let bridge = Bridge::current(lua).ok_or(BridgeError::Detached)?;
            Ok(bridge.depth())
        })?,
    )?;

    lua.globals().set(config.bindings_global.as_str(), table)?;
    Ok(())
}
