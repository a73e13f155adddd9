//! Precompiled module bundles
//!
//! A bundle is a zip archive whose entries are Lua chunks, source or
//! bytecode. Loading a bundle compiles every non-empty entry and registers
//! it in `package.preload` under the entry's exact name, so a later
//! `require(name)` runs it without touching the filesystem.
//!
//! Scripts reach this through the `LuaLoadChunksFromZip(name)` global:
//!
//! ```lua
//! if LuaLoadChunksFromZip("game.zip") then
//!     local title = require("scenes.title")
//! end
//! ```
//!
//! Where archives sit in storage that cannot be opened in place (packaged
//! assets), `stage_archives` copies the archive to a temp file under the
//! writable directory first; the copy is deleted when loading finishes.

use crate::bridge::Bridge;
use crate::error::{BridgeError, Result};
use mlua::{Lua, MultiValue, Table, Value};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Read access to the entries of a chunk archive
pub trait ChunkArchive {
    /// Entry names in archive order
    fn entry_names(&self) -> Vec<String>;

    /// Full contents of one entry
    fn read_entry(&mut self, name: &str) -> io::Result<Vec<u8>>;
}

/// A zip file on disk
pub struct ZipChunkArchive {
    path: PathBuf,
    archive: zip::ZipArchive<File>,
}

impl ZipChunkArchive {
    pub fn open(path: &Path) -> Result<Self> {
        let unavailable = |reason: String| BridgeError::ArchiveUnavailable {
            path: path.to_path_buf(),
            reason,
        };

        let file = File::open(path).map_err(|e| unavailable(e.to_string()))?;
        let archive = zip::ZipArchive::new(file).map_err(|e| unavailable(e.to_string()))?;
        Ok(Self {
            path: path.to_path_buf(),
            archive,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archive.is_empty()
    }
}

impl ChunkArchive for ZipChunkArchive {
    fn entry_names(&self) -> Vec<String> {
        // file_names() walks a hash map; archive order comes from the index
        (0..self.archive.len())
            .filter_map(|i| self.archive.name_for_index(i).map(str::to_string))
            .collect()
    }

    fn read_entry(&mut self, name: &str) -> io::Result<Vec<u8>> {
        let mut entry = self.archive.by_name(name).map_err(io::Error::other)?;
        // The declared size comes from the archive and is not trusted
        let mut buffer = Vec::new();
        entry.read_to_end(&mut buffer)?;
        Ok(buffer)
    }
}

/// Compile every non-empty entry of `archive` into `package.preload`
///
/// Each preloaded loader runs its chunk and returns the chunk's first
/// result. An entry that cannot be read or fails to compile is logged and
/// skipped. Returns the number of chunks registered.
pub fn register_chunks(lua: &Lua, archive: &mut dyn ChunkArchive) -> Result<usize> {
    let package: Table = lua.globals().get("package")?;
    let preload: Table = package.get("preload")?;
    let mut registered = 0;

    for name in archive.entry_names() {
        let bytes = match archive.read_entry(&name) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("chunk {} could not be read: {}", name, e);
                continue;
            }
        };
        if bytes.is_empty() {
            continue;
        }

        let chunk = match lua.load(bytes).set_name(name.as_str()).into_function() {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("chunk {} failed to compile: {}", name, e);
                continue;
            }
        };

        let loader = lua.create_function(move |_, _args: MultiValue| chunk.call::<Value>(()))?;
        preload.set(name.as_str(), loader)?;
        registered += 1;
        debug!("chunk {}", name);
    }

    Ok(registered)
}

// Temp copy of an archive; removed on drop
struct StagedCopy {
    path: PathBuf,
}

impl StagedCopy {
    fn create(source: &[u8], path: PathBuf) -> io::Result<Self> {
        fs::write(&path, source)?;
        Ok(Self { path })
    }
}

impl Drop for StagedCopy {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("failed to remove staged archive {}: {}", self.path.display(), e);
        }
    }
}

impl Bridge {
    /// Preload every chunk of the bundle `zip_name`
    ///
    /// `zip_name` is resolved through the file utilities. Returns false
    /// when the archive cannot be opened (or staged), with `package.preload`
    /// left as it was; true otherwise, even if some entries were skipped.
    pub fn load_chunks_from_zip(&self, zip_name: &str) -> bool {
        match self.try_load_chunks(zip_name) {
            Ok(count) => {
                info!("loaded {} chunks from {}", count, zip_name);
                true
            }
            Err(e) => {
                warn!("cannot load chunks from {}: {}", zip_name, e);
                false
            }
        }
    }

    fn try_load_chunks(&self, zip_name: &str) -> Result<usize> {
        let lua = self.engine()?;
        let files = self.file_utils();
        let path = files.full_path_for(zip_name);

        // Declared before the archive so the copy outlives the open file
        let mut staged: Option<StagedCopy> = None;
        let open_path = if self.inner.config.stage_archives {
            let staged_path = files
                .writable_path()
                .join(&self.inner.config.staging_file_name);
            let bytes = files
                .read_file(&path)
                .map_err(|e| BridgeError::ArchiveUnavailable {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
            let copy = StagedCopy::create(&bytes, staged_path).map_err(|e| {
                BridgeError::ArchiveUnavailable {
                    path: path.clone(),
                    reason: format!("staging failed: {}", e),
                }
            })?;
            debug!("staged {} at {}", path.display(), copy.path.display());
            staged.insert(copy).path.clone()
        } else {
            path
        };

        let mut archive = ZipChunkArchive::open(&open_path)?;
        debug!("load zip file: {}", archive.path().display());
        register_chunks(&lua, &mut archive)
    }
}
