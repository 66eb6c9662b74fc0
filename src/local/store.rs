use crate::error::{AcpError, AcpResult};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;

const POLICY_SEQUENCE_KEY: &str = "policy_sequence";

/// Separator between key segments. Object ids are opaque to the engine, so a
/// control character is used instead of a printable delimiter.
pub const KEY_SEPARATOR: char = '\u{1f}';

/// Joins key segments into a tree key.
pub fn key(segments: &[&str]) -> String {
    let mut out = String::new();
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            out.push(KEY_SEPARATOR);
        }
        out.push_str(segment);
    }
    out
}

/// Key prefix matching every key that starts with `segments`.
pub fn key_prefix(segments: &[&str]) -> String {
    let mut out = key(segments);
    out.push(KEY_SEPARATOR);
    out
}

/// Sled-backed storage for one ACP instance.
///
/// Policies, objects and relationship tuples live in separate trees so that
/// registration and relationship writes can run as multi-tree transactions.
#[derive(Clone)]
pub struct AcpStore {
    db: sled::Db,
    pub(crate) policies_tree: sled::Tree,
    pub(crate) objects_tree: sled::Tree,
    pub(crate) relationships_tree: sled::Tree,
    pub(crate) meta_tree: sled::Tree,
}

impl AcpStore {
    /// Opens a persistent store rooted at `path`.
    pub fn open(path: &Path) -> AcpResult<Self> {
        Self::new(sled::open(path)?)
    }

    /// Opens a store that is discarded when dropped.
    pub fn open_temporary() -> AcpResult<Self> {
        Self::new(sled::Config::new().temporary(true).open()?)
    }

    fn new(db: sled::Db) -> AcpResult<Self> {
        let policies_tree = db.open_tree("policies")?;
        let objects_tree = db.open_tree("objects")?;
        let relationships_tree = db.open_tree("relationships")?;
        let meta_tree = db.open_tree("meta")?;

        Ok(Self {
            db,
            policies_tree,
            objects_tree,
            relationships_tree,
            meta_tree,
        })
    }

    /// Stores a serializable item in a specific tree
    pub fn store_in_tree<T: Serialize>(
        &self,
        tree: &sled::Tree,
        key: &str,
        item: &T,
    ) -> AcpResult<()> {
        let bytes = serde_json::to_vec(item)?;
        tree.insert(key.as_bytes(), bytes)?;
        Ok(())
    }

    /// Retrieves a deserializable item from a specific tree
    pub fn get_from_tree<T: DeserializeOwned>(
        &self,
        tree: &sled::Tree,
        key: &str,
    ) -> AcpResult<Option<T>> {
        match tree.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Keys in `tree` starting with `prefix`
    pub fn keys_with_prefix(&self, tree: &sled::Tree, prefix: &str) -> AcpResult<Vec<String>> {
        let mut keys = Vec::new();
        for result in tree.scan_prefix(prefix.as_bytes()) {
            let (key, _) = result?;
            keys.push(String::from_utf8_lossy(&key).to_string());
        }
        Ok(keys)
    }

    /// Bumps and returns the per-store policy sequence. The first policy gets 1.
    pub fn next_policy_sequence(&self) -> AcpResult<u64> {
        let updated = self
            .meta_tree
            .update_and_fetch(POLICY_SEQUENCE_KEY, |old| {
                let current = old.map(decode_u64).unwrap_or(0);
                Some((current + 1).to_be_bytes().to_vec())
            })?
            .ok_or_else(|| AcpError::store("policy sequence counter vanished"))?;
        Ok(decode_u64(&updated))
    }

    /// Flushes all dirty buffers to disk
    pub fn flush(&self) -> AcpResult<()> {
        self.db.flush()?;
        Ok(())
    }

    pub fn was_recovered(&self) -> bool {
        self.db.was_recovered()
    }
}

fn decode_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    let len = bytes.len().min(8);
    buf[8 - len..].copy_from_slice(&bytes[bytes.len() - len..]);
    u64::from_be_bytes(buf)
}
