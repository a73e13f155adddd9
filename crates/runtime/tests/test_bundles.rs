//! Integration tests for module bundle loading
//!
//! Bundles are written on the fly with `zip::ZipWriter` into a temp
//! directory and loaded through the `LuaLoadChunksFromZip` global, as a
//! script would.

use lunabridge::mlua::Function;
use lunabridge::{Bridge, BridgeConfig, ChunkArchive, ZipChunkArchive};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::tempdir;
use zip::write::SimpleFileOptions;

fn write_bundle(path: &Path, entries: &[(&str, &str)]) {
    let entries: Vec<(&str, &[u8])> = entries
        .iter()
        .map(|(name, source)| (*name, source.as_bytes()))
        .collect();
    write_raw_bundle(path, &entries);
}

fn write_raw_bundle(path: &Path, entries: &[(&str, &[u8])]) {
    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    for (name, contents) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(contents).unwrap();
    }
    zip.finish().unwrap();
}

fn preload_count(bridge: &Bridge) -> i64 {
    bridge
        .lua()
        .unwrap()
        .load("local n = 0 for _ in pairs(package.preload) do n = n + 1 end return n")
        .eval()
        .unwrap()
}

#[test]
fn test_missing_archive_returns_false() {
    let bridge = Bridge::create().unwrap();
    let before = preload_count(&bridge);

    let loaded: bool = bridge
        .lua()
        .unwrap()
        .load("return LuaLoadChunksFromZip('no/such/bundle.zip')")
        .eval()
        .unwrap();
    assert!(!loaded);
    assert_eq!(preload_count(&bridge), before);
}

#[test]
fn test_not_a_zip_returns_false() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fake.zip");
    std::fs::write(&path, "definitely not a zip").unwrap();

    let bridge = Bridge::create().unwrap();
    assert!(!bridge.load_chunks_from_zip(path.to_str().unwrap()));
}

#[test]
fn test_empty_entries_are_skipped() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("game.zip");
    write_bundle(
        &path,
        &[
            ("empty", ""),
            ("scenes.title", "return { name = 'title' }"),
        ],
    );

    let bridge = Bridge::create().unwrap();
    let before = preload_count(&bridge);
    assert!(bridge.load_chunks_from_zip(path.to_str().unwrap()));
    assert_eq!(preload_count(&bridge), before + 1);

    assert_eq!(
        bridge.execute_string(
            r#"
            assert(package.preload["empty"] == nil)
            local title = require("scenes.title")
            assert(title.name == "title")
            assert(require("scenes.title") == title)
            "#
        ),
        1
    );
}

#[test]
fn test_chunks_run_only_on_require() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("lazy.zip");
    write_bundle(&path, &[("lazy", "lazy_ran = true return 1")]);

    let bridge = Bridge::create().unwrap();
    assert!(bridge.load_chunks_from_zip(path.to_str().unwrap()));
    assert_eq!(bridge.execute_string("assert(lazy_ran == nil) require('lazy') assert(lazy_ran)"), 1);
}

#[test]
fn test_precompiled_chunks() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("compiled.zip");

    let bridge = Bridge::create().unwrap();
    let compiled: Function = bridge
        .lua()
        .unwrap()
        .load("return 'from bytecode'")
        .into_function()
        .unwrap();
    let bytecode = compiled.dump(true);
    write_raw_bundle(&path, &[("compiled", bytecode.as_slice())]);

    assert!(bridge.load_chunks_from_zip(path.to_str().unwrap()));
    let value: String = bridge.lua().unwrap().load("return require('compiled')").eval().unwrap();
    assert_eq!(value, "from bytecode");
}

#[test]
fn test_broken_chunk_is_skipped() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("mixed.zip");
    write_bundle(&path, &[("broken", "return +"), ("good", "return 'good'")]);

    let bridge = Bridge::create().unwrap();
    assert!(bridge.load_chunks_from_zip(path.to_str().unwrap()));
    assert_eq!(
        bridge.execute_string("assert(package.preload.broken == nil) assert(require('good') == 'good')"),
        1
    );
}

#[test]
fn test_unreadable_entry_is_skipped() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("damaged.zip");

    let stored = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
    zip.start_file("good", stored).unwrap();
    zip.write_all(b"return 'good payload'").unwrap();
    zip.start_file("bad", stored).unwrap();
    zip.write_all(b"return 'bad payload'").unwrap();
    zip.finish().unwrap();

    // Stored data sits verbatim in the file; one changed byte breaks the CRC
    let mut bytes = std::fs::read(&path).unwrap();
    let needle = b"bad payload";
    let at = bytes
        .windows(needle.len())
        .position(|window| window == needle)
        .unwrap();
    bytes[at] = b'c';
    std::fs::write(&path, &bytes).unwrap();

    let bridge = Bridge::create().unwrap();
    let before = preload_count(&bridge);
    assert!(bridge.load_chunks_from_zip(path.to_str().unwrap()));
    assert_eq!(preload_count(&bridge), before + 1);
    assert_eq!(
        bridge.execute_string(
            "assert(require('good') == 'good payload') assert(package.preload.bad == nil)"
        ),
        1
    );
}

#[test]
fn test_bundle_resolved_through_resource_roots() {
    let dir = tempdir().unwrap();
    write_bundle(&dir.path().join("game.zip"), &[("util", "return 7")]);

    let bridge = Bridge::create_with(BridgeConfig::default().with_resource_root(dir.path())).unwrap();
    assert_eq!(
        bridge.execute_string("assert(LuaLoadChunksFromZip('game.zip')) assert(require('util') == 7)"),
        1
    );
}

#[test]
fn test_staged_archives_are_cleaned_up() {
    let assets = tempdir().unwrap();
    let writable = tempdir().unwrap();
    write_bundle(&assets.path().join("game.zip"), &[("staged", "return 'staged'")]);

    let config = BridgeConfig::default()
        .with_resource_root(assets.path())
        .with_writable_path(writable.path())
        .with_staged_archives(true);
    let staging_file: PathBuf = writable.path().join(&config.staging_file_name);
    let bridge = Bridge::create_with(config).unwrap();

    assert!(bridge.load_chunks_from_zip("game.zip"));
    assert!(!staging_file.exists());
    let value: String = bridge.lua().unwrap().load("return require('staged')").eval().unwrap();
    assert_eq!(value, "staged");

    assert!(!bridge.load_chunks_from_zip("missing.zip"));
    assert!(!staging_file.exists());
}

#[test]
fn test_failed_staging_leaves_preload_alone() {
    let assets = tempdir().unwrap();
    let writable = tempdir().unwrap();
    write_bundle(&assets.path().join("game.zip"), &[("staged", "return 'staged'")]);

    let config = BridgeConfig::default()
        .with_resource_root(assets.path())
        .with_writable_path(writable.path().join("missing").join("dir"))
        .with_staged_archives(true);
    let bridge = Bridge::create_with(config).unwrap();
    let before = preload_count(&bridge);

    assert!(!bridge.load_chunks_from_zip("game.zip"));
    assert_eq!(preload_count(&bridge), before);
    assert_eq!(bridge.execute_string("assert(package.preload.staged == nil)"), 1);
}

#[test]
fn test_zip_archive_lists_entries_in_order() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ordered.zip");
    write_bundle(&path, &[("b", "return 2"), ("a", "return 1"), ("c", "")]);

    let mut archive = ZipChunkArchive::open(&path).unwrap();
    assert_eq!(archive.len(), 3);
    assert_eq!(archive.entry_names(), vec!["b", "a", "c"]);
    assert_eq!(archive.read_entry("a").unwrap(), b"return 1".to_vec());
    assert!(archive.read_entry("c").unwrap().is_empty());
    assert!(archive.read_entry("zzz").is_err());
}
