//! The indirection size store: a JSON-backed record of the largest
//! indirection section ever produced for each `.text.<lib>`.

use std::collections::BTreeMap;
use std::path::Path;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::Result;

const DEFAULT_RESERVATION: u64 = 0x1000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// Keys are `.text.<lib>`, values hex-encoded byte counts (`"0x1000"`)
pub struct IndirectionSizeStore {
    #[serde(flatten)]
    sizes: BTreeMap<String, String>,
}

impl IndirectionSizeStore {
    /// Load from `path`; a missing file is treated as an empty store with a
    /// logged warning rather than an error.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!("indirection size store {} not found, starting empty", path.display());
                Ok(Self::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// The reserved size for `key` (e.g. `.text.libhello`), defaulting to one
    /// page when the key has never been recorded.
    pub fn reserved(&self, key: &str) -> u64 {
        self.sizes
            .get(key)
            .and_then(|hex| u64::from_str_radix(hex.trim_start_matches("0x"), 16).ok())
            .unwrap_or(DEFAULT_RESERVATION)
            .max(DEFAULT_RESERVATION)
    }

    /// Record a freshly observed indirection-section length for `key`,
    /// adopting it only if it exceeds the size already on record.
    pub fn observe(&mut self, key: &str, length: u64) {
        let current = self
            .sizes
            .get(key)
            .and_then(|hex| u64::from_str_radix(hex.trim_start_matches("0x"), 16).ok())
            .unwrap_or(0);
        if length > current {
            self.sizes.insert(key.to_string(), format!("0x{length:x}"));
        }
    }

    /// Write the store to `path` atomically: serialize to a temp file in the
    /// same directory, then rename over the destination.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.sizes)?;
        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_empty_store_with_default_reservation() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndirectionSizeStore::load(&dir.path().join("missing.json")).unwrap();
        assert_eq!(store.reserved(".text.libhello"), DEFAULT_RESERVATION);
    }

    #[test]
    fn observe_is_monotonically_non_decreasing() {
        let mut store = IndirectionSizeStore::default();
        store.observe(".text.libhello", 0x2000);
        store.observe(".text.libhello", 0x1000);
        assert_eq!(store.reserved(".text.libhello"), 0x2000);
    }

    #[test]
    fn save_then_load_round_trips_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sizes.json");

        let mut store = IndirectionSizeStore::default();
        store.observe(".text.libhello", 0x1800);
        store.save(&path).unwrap();

        let loaded = IndirectionSizeStore::load(&path).unwrap();
        assert_eq!(loaded.reserved(".text.libhello"), 0x1800);
    }
}
