//! On-disk helpers shared by every store.
//!
//! Writes go to a sibling `.tmp` file and are renamed into place, so a crash
//! leaves either the old file or the new one. Loads never fail: unreadable
//! or corrupt files degrade to the default value with a warning.

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// Atomically replace `path` with `bytes`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("tmp");
    {
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    std::fs::rename(&tmp_path, path)
}

/// Serialize `value` as pretty JSON and write it atomically.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let bytes = serde_json::to_vec_pretty(value).map_err(std::io::Error::other)?;
    write_atomic(path, &bytes)
}

/// Load JSON from `path`, or `T::default()` if missing or corrupt.
pub(crate) fn load_json_or_default<T: DeserializeOwned + Default>(path: &Path, what: &str) -> T {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No {what} file yet, starting empty");
            return T::default();
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read {what}, starting empty");
            return T::default();
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Corrupt {what}, starting empty");
            T::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn atomic_write_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"two");
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn missing_file_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let loaded: HashMap<String, u32> = load_json_or_default(&dir.path().join("nope.json"), "test");
        assert!(loaded.is_empty());
    }

    #[test]
    fn corrupt_file_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        let loaded: HashMap<String, u32> = load_json_or_default(&path, "test");
        assert!(loaded.is_empty());
    }

    #[test]
    fn json_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.json");
        let mut map = HashMap::new();
        map.insert("a".to_string(), 1u32);
        write_json_atomic(&path, &map).unwrap();
        let loaded: HashMap<String, u32> = load_json_or_default(&path, "test");
        assert_eq!(loaded.get("a"), Some(&1));
    }
}
