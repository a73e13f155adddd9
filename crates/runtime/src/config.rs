//! Bridge configuration
//!
//! Everything has a default, so `BridgeConfig::default()` is a working
//! configuration. Values can come from a TOML file and then be overridden
//! from the environment.
//!
//! ## Configuration (Environment Variables)
//!
//! | Variable | Description |
//! |----------|-------------|
//! | `LUNABRIDGE_SEARCH_PATH` | Extra module directories (platform path-list syntax), appended |
//! | `LUNABRIDGE_WRITABLE_PATH` | Writable directory used for staged archives |
//! | `LUNABRIDGE_STAGE_ARCHIVES` | `1`/`true` to copy archives to a temp file before opening |
//!
//! ## Example
//!
//! ```toml
//! traceback_handler = "__G__TRACKBACK__"
//! search_paths = ["scripts", "scripts/lib"]
//! resource_roots = ["assets"]
//! stage_archives = false
//! ```

use crate::error::{BridgeError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Global consulted by `execute_function` as an error handler
pub const DEFAULT_TRACEBACK_HANDLER: &str = "__G__TRACKBACK__";

/// Global that scripts call to preload a module bundle
pub const DEFAULT_BUNDLE_LOADER_GLOBAL: &str = "LuaLoadChunksFromZip";

/// Table holding the built-in native bindings
pub const DEFAULT_BINDINGS_GLOBAL: &str = "bridge";

/// File name used when an archive has to be staged before opening
pub const DEFAULT_STAGING_FILE_NAME: &str = "load_chunks.tmp";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Name of the global traceback handler spliced under handle calls
    pub traceback_handler: String,

    /// Name of the global bundle-loading function installed by `create`
    pub bundle_loader_global: String,

    /// Name of the global table holding the built-in native bindings
    pub bindings_global: String,

    /// Copy archives to a writable temp file before opening them
    ///
    /// Needed where archives live in packaged, non-seekable storage.
    pub stage_archives: bool,

    /// File name of the staged copy under `writable_path`
    pub staging_file_name: String,

    /// Run a full GC cycle after each `execute_string`
    pub collect_after_execute: bool,

    /// Install the filesystem-backed module searcher at `create`
    pub asset_searcher: bool,

    /// Directories appended to `package.path` at `create`
    pub search_paths: Vec<PathBuf>,

    /// Roots consulted by `LocalFileUtils` when resolving relative names
    pub resource_roots: Vec<PathBuf>,

    /// Writable directory (defaults to the system temp dir)
    pub writable_path: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let packaged = cfg!(target_os = "android");
        Self {
            traceback_handler: DEFAULT_TRACEBACK_HANDLER.to_string(),
            bundle_loader_global: DEFAULT_BUNDLE_LOADER_GLOBAL.to_string(),
            bindings_global: DEFAULT_BINDINGS_GLOBAL.to_string(),
            stage_archives: packaged,
            staging_file_name: DEFAULT_STAGING_FILE_NAME.to_string(),
            collect_after_execute: true,
            asset_searcher: packaged,
            search_paths: Vec::new(),
            resource_roots: Vec::new(),
            writable_path: None,
        }
    }
}

impl BridgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| BridgeError::Config(format!("Failed to parse bridge config: {}", e)))
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Apply `LUNABRIDGE_*` environment overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(paths) = std::env::var_os("LUNABRIDGE_SEARCH_PATH") {
            self.search_paths
                .extend(std::env::split_paths(&paths).filter(|p| !p.as_os_str().is_empty()));
        }

        if let Some(path) = std::env::var_os("LUNABRIDGE_WRITABLE_PATH")
            .filter(|p| !p.is_empty())
        {
            self.writable_path = Some(PathBuf::from(path));
        }

        if let Some(stage) = std::env::var("LUNABRIDGE_STAGE_ARCHIVES")
            .ok()
            .and_then(|s| parse_flag(&s))
        {
            self.stage_archives = stage;
        }

        self
    }

    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    pub fn with_resource_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.resource_roots.push(root.into());
        self
    }

    pub fn with_writable_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.writable_path = Some(path.into());
        self
    }

    pub fn with_staged_archives(mut self, stage: bool) -> Self {
        self.stage_archives = stage;
        self
    }

    pub fn with_asset_searcher(mut self, enabled: bool) -> Self {
        self.asset_searcher = enabled;
        self
    }

    /// Writable directory, falling back to the system temp dir
    pub fn writable_dir(&self) -> PathBuf {
        self.writable_path
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
