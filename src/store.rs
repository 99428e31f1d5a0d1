//! Profile persistence.
//!
//! The engine treats stored state as opaque blobs under well-known keys; the
//! store owns no schema. The sled-backed store is the production path, the
//! in-memory store backs tests and ephemeral sessions.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use sled::{Db, Tree};

/// Key for the learned preference profile.
pub const PROFILE_KEY: &str = "user_preferences";
/// Key for the session context.
pub const SESSION_KEY: &str = "current_context";

pub trait ProfileStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// sled-backed store, one tree for all engine state.
#[derive(Clone)]
pub struct SledStore {
    #[allow(unused)]
    db: Db,
    tree: Tree,
}

impl SledStore {
    pub fn open(path: &Path) -> Result<Self> {
        let db = sled::open(path)?;
        let tree = db.open_tree(bincode::serialize("profiles")?)?;
        Ok(Self { db, tree })
    }
}

impl ProfileStore for SledStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.tree.get(key)?.map(|v| v.to_vec()))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.tree.insert(key, value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.tree.remove(key)?;
        Ok(())
    }
}

/// In-memory store. Clones share the same map, which lets tests hand the
/// "same" storage to a re-created tracker.
#[derive(Clone, Default)]
pub struct MemoryStore {
    map: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProfileStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let map = self
            .map
            .lock()
            .map_err(|_| anyhow::anyhow!("store lock poisoned"))?;
        Ok(map.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut map = self
            .map
            .lock()
            .map_err(|_| anyhow::anyhow!("store lock poisoned"))?;
        map.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut map = self
            .map
            .lock()
            .map_err(|_| anyhow::anyhow!("store lock poisoned"))?;
        map.remove(key);
        Ok(())
    }
}
