//! Script discovery
//!
//! A directory that contains `init.lua` is a single script unit: only its
//! `init.lua` is loaded and the directory is not searched further (the entry
//! file pulls in the rest with `require`). Every other `.lua` file is loaded
//! on its own. Entries are visited in sorted order so load order is stable.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::HostError;

pub const ENTRY_FILE: &str = "init.lua";

/// List the files to load from `root`, in load order
pub fn discover_scripts(root: &Path) -> Result<Vec<PathBuf>, HostError> {
    if !root.is_dir() {
        return Err(HostError::MissingScriptDir(root.to_path_buf()));
    }

    let mut scripts = Vec::new();
    visit(root, &mut scripts)?;

    debug!(
        target: "scripting",
        "Found {} script(s) in {}",
        scripts.len(),
        root.display()
    );
    Ok(scripts)
}

fn visit(dir: &Path, scripts: &mut Vec<PathBuf>) -> Result<(), HostError> {
    let entry_file = dir.join(ENTRY_FILE);
    if entry_file.is_file() {
        scripts.push(entry_file);
        return Ok(());
    }

    let io_err = |source| HostError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = fs::read_dir(dir)
        .map_err(io_err)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_err)?;
    entries.sort();

    for path in entries {
        if path.is_dir() {
            visit(&path, scripts)?;
        } else if path.extension().and_then(|s| s.to_str()) == Some("lua") {
            scripts.push(path);
        }
    }
    Ok(())
}

/// `package.path` entries that make modules under `root` requirable
pub fn package_path_entries(root: &Path) -> String {
    let root = root.display();
    format!("{root}/?.lua;{root}/?/init.lua")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, rel: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "-- test").unwrap();
    }

    #[test]
    fn test_entry_file_directories_load_as_one() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "b_single.lua");
        touch(tmp.path(), "a_bundle/init.lua");
        touch(tmp.path(), "a_bundle/helpers.lua");
        touch(tmp.path(), "nested/deep/thing.lua");
        touch(tmp.path(), "notes.txt");

        let found = discover_scripts(tmp.path()).unwrap();
        let rel: Vec<_> = found
            .iter()
            .map(|p| p.strip_prefix(tmp.path()).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();

        assert_eq!(
            rel,
            vec!["a_bundle/init.lua", "b_single.lua", "nested/deep/thing.lua"]
        );
    }

    #[test]
    fn test_root_with_entry_file() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "init.lua");
        touch(tmp.path(), "other.lua");

        let found = discover_scripts(tmp.path()).unwrap();
        assert_eq!(found, vec![tmp.path().join("init.lua")]);
    }

    #[test]
    fn test_missing_dir() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        assert!(matches!(
            discover_scripts(&missing),
            Err(HostError::MissingScriptDir(_))
        ));
    }

    #[test]
    fn test_package_path_entries() {
        let entries = package_path_entries(Path::new("/srv/lua"));
        assert_eq!(entries, "/srv/lua/?.lua;/srv/lua/?/init.lua");
    }
}
