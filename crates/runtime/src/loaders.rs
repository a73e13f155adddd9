//! Module search configuration
//!
//! `require` walks the searcher list in `package.searchers` (called
//! `package.loaders` by older engines). Position 1 is always the preload
//! searcher, so bundles registered through `package.preload` win over
//! everything else; custom searchers go in at position 2, ahead of the
//! engine's path-based ones.
//!
//! Searchers follow the engine protocol: given a module name they return
//! either a loader function or a string explaining why they found nothing.

use crate::bridge::Bridge;
use crate::error::{BridgeError, Result};
use mlua::{Function, Lua, Table, Value};
use std::path::Path;
use tracing::debug;

impl Bridge {
    /// Append `<path>/?.lua` to `package.path`
    pub fn add_search_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let package: Table = self.engine()?.globals().get("package")?;
        let current: String = package.get("path")?;
        let updated = format!("{};{}/?.lua", current, path.as_ref().display());
        package.set("path", updated)?;
        debug!("search path added: {}", path.as_ref().display());
        Ok(())
    }

    /// Insert `searcher` at position 2 of the loader chain
    ///
    /// Existing entries from position 2 up shift one place towards the end.
    /// Adding the same searcher twice installs it twice.
    pub fn add_loader(&self, searcher: Function) -> Result<()> {
        let chain = loader_chain(&self.engine()?)?;

        let len = chain.raw_len() as i64;
        let mut index = len + 1;
        while index > 2 {
            let moved: Value = chain.raw_get(index - 1)?;
            chain.raw_set(index, moved)?;
            index -= 1;
        }
        chain.raw_set(2, searcher)?;

        debug!("searcher installed, chain length {}", chain.raw_len());
        Ok(())
    }

    /// Insert a native searcher at position 2 of the loader chain
    pub fn add_loader_fn<F>(&self, searcher: F) -> Result<()>
    where
        F: Fn(&Lua, String) -> mlua::Result<Value> + 'static,
    {
        let function = self
            .engine()?
            .create_function(move |lua, name: String| searcher(lua, name))?;
        self.add_loader(function)
    }
}

/// The searcher list (`package.searchers`, or `package.loaders` on older
/// engines)
pub(crate) fn loader_chain(lua: &Lua) -> Result<Table> {
    let package: Table = lua.globals().get("package")?;
    for key in ["searchers", "loaders"] {
        if let Value::Table(chain) = package.get::<Value>(key)? {
            return Ok(chain);
        }
    }
    Err(BridgeError::Runtime(
        "package has no searchers table".to_string(),
    ))
}

/// Searcher resolving `a.b` to `a/b.lua` through the bridge's file utilities
///
/// For hosts whose scripts live in packaged storage that the engine's own
/// path searcher cannot read.
pub(crate) fn asset_searcher(lua: &Lua) -> mlua::Result<Function> {
    lua.create_function(|lua, name: String| {
        let bridge = Bridge::current(lua).ok_or(BridgeError::Detached)?;
        let relative = format!("{}.lua", module_path(&name));
        let path = bridge.file_utils().full_path_for(&relative);

        let source = match bridge.file_utils().read_file(&path) {
            Ok(source) => source,
            Err(_) => {
                return Ok(Value::String(
                    lua.create_string(format!("\n\tno asset '{}'", relative))?,
                ));
            }
        };

        let loader = lua
            .load(source)
            .set_name(format!("@{}", relative))
            .into_function()?;
        debug!("asset searcher found {}", path.display());
        Ok(Value::Function(loader))
    })
}

/// `a.b.c` (or `a.b.c.lua`) to `a/b/c`
fn module_path(name: &str) -> String {
    let name = name.strip_suffix(".lua").unwrap_or(name);
    name.replace('.', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_path() {
        assert_eq!(module_path("game"), "game");
        assert_eq!(module_path("game.scenes.title"), "game/scenes/title");
        assert_eq!(module_path("game.util.lua"), "game/util");
    }

    #[test]
    fn test_loader_chain_prefers_searchers() {
        let lua = Lua::new();
        let chain = loader_chain(&lua).unwrap();
        let searchers: Table = lua.load("return package.searchers").eval().unwrap();
        assert_eq!(chain, searchers);
    }

    #[test]
    fn test_loader_chain_falls_back_to_loaders() {
        let lua = Lua::new();
        lua.load("package.loaders = package.searchers; package.searchers = nil")
            .exec()
            .unwrap();
        let chain = loader_chain(&lua).unwrap();
        assert!(chain.raw_len() >= 2);
    }
}
