//! On-disk cache for negotiated schema metadata.
//!
//! Sessions may persist the handshake's proto bundle between process runs:
//! the cached version counter rides along in the next handshake request, and
//! the server can answer without re-sending schemas it knows the client
//! already holds. Entirely optional — a missing or corrupt cache file just
//! degrades to version 0.

use std::path::Path;

use crate::error::Result;
use crate::handshake::ProtoBundle;

/// Loader/writer for the schema metadata cache file (JSON).
pub struct ProtoCache;

impl ProtoCache {
    /// Load a cached bundle. Absence is normal; corruption is logged and
    /// treated as absence.
    pub fn load(path: &Path) -> Option<ProtoBundle> {
        let raw = match std::fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("failed to read proto cache {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_slice(&raw) {
            Ok(bundle) => Some(bundle),
            Err(e) => {
                tracing::warn!("ignoring corrupt proto cache {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Persist a freshly negotiated bundle, replacing any previous cache.
    pub fn store(path: &Path, bundle: &ProtoBundle) -> Result<()> {
        let raw = serde_json::to_vec(bundle)?;
        std::fs::write(path, raw)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("pylon-proto-cache-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_store_then_load_roundtrip() {
        let path = temp_path("roundtrip");
        let bundle = ProtoBundle {
            version: 9,
            client: json!({"chat.send": {}}),
            server: json!({"onChat": {}}),
        };

        ProtoCache::store(&path, &bundle).unwrap();
        let loaded = ProtoCache::load(&path).unwrap();
        assert_eq!(loaded, bundle);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_missing_file_loads_as_none() {
        assert!(ProtoCache::load(&temp_path("missing")).is_none());
    }

    #[test]
    fn test_corrupt_file_loads_as_none() {
        let path = temp_path("corrupt");
        std::fs::write(&path, b"{ not json").unwrap();
        assert!(ProtoCache::load(&path).is_none());
        let _ = std::fs::remove_file(&path);
    }
}
