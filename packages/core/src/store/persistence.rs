//! Persistence Seam
//!
//! The store itself is memory-resident; durability is delegated through
//! the [`PersistenceAdapter`] trait so the engine stays agnostic about
//! where snapshots live. `NodeStore::load_from` hydrates from an adapter
//! at startup and `NodeStore::flush_to` writes a consistent snapshot on
//! demand.
//!
//! [`JsonFileAdapter`] is the bundled implementation: one pretty-printed
//! JSON array per store, written atomically via a sibling temp file and
//! rename.

use crate::models::Node;
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};

/// Snapshot source and sink for a store's full node set
pub trait PersistenceAdapter: Send + Sync {
    /// Load every persisted node. An empty backing store yields an empty
    /// vector, not an error.
    fn load(&self) -> anyhow::Result<Vec<Node>>;

    /// Persist a full snapshot, replacing whatever was stored before
    fn flush(&self, nodes: &[Node]) -> anyhow::Result<()>;
}

/// File-backed adapter storing the node set as a JSON array
#[derive(Debug, Clone)]
pub struct JsonFileAdapter {
    path: PathBuf,
}

impl JsonFileAdapter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PersistenceAdapter for JsonFileAdapter {
    fn load(&self) -> anyhow::Result<Vec<Node>> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "no snapshot file, starting empty");
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("reading snapshot from {}", self.path.display()))?;
        let nodes: Vec<Node> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing snapshot at {}", self.path.display()))?;
        tracing::info!(
            path = %self.path.display(),
            count = nodes.len(),
            "loaded snapshot"
        );
        Ok(nodes)
    }

    fn flush(&self, nodes: &[Node]) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(nodes).context("serializing snapshot")?;

        // Write-then-rename keeps a crash mid-flush from truncating the
        // previous snapshot.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .with_context(|| format!("writing snapshot to {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing snapshot at {}", self.path.display()))?;
        tracing::info!(
            path = %self.path.display(),
            count = nodes.len(),
            "flushed snapshot"
        );
        Ok(())
    }
}
