//! Backend - store / clock / config の束
//!
//! JobNode も StatusCollection もここを経由して store にアクセスします。
//! NotificationBus は持たない（observer から参照されても循環しない）。

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, warn};

use super::config::HierarchyConfig;
use super::keys::Keys;
use crate::domain::{HierarchyError, Jid, Result};
use crate::ports::{Clock, Command, KeyValueStore};

/// How a subtree walk treats data that violates the tree invariants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WalkMode {
    /// Cycles, shared nodes, dangling children and excess depth are errors.
    Strict,
    /// Skip what cannot be walked (used for cleanup of expiring trees).
    Lenient,
}

/// One visited node and its (de-duplicated) children.
#[derive(Debug, Clone)]
pub(crate) struct TreeEntry {
    pub jid: Jid,
    pub children: Vec<Jid>,
}

#[derive(Clone)]
pub struct Backend {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    config: Arc<HierarchyConfig>,
    keys: Keys,
}

impl Backend {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: HierarchyConfig,
    ) -> Self {
        let keys = Keys::new(config.key_prefix.clone());
        Self {
            store,
            clock,
            config: Arc::new(config),
            keys,
        }
    }

    pub fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn config(&self) -> &HierarchyConfig {
        &self.config
    }

    pub fn keys(&self) -> &Keys {
        &self.keys
    }

    pub(crate) fn shared_store(&self) -> Arc<dyn KeyValueStore> {
        Arc::clone(&self.store)
    }

    pub async fn job_exists(&self, jid: &Jid) -> Result<bool> {
        Ok(self.store.exists(&self.keys.job(jid)).await?)
    }

    /// Breadth-first walk of the subtree rooted at `root`, root first.
    ///
    /// One store round trip per node (plus one existence check per child in
    /// strict mode); not a snapshot.
    pub(crate) async fn subtree(&self, root: &Jid, mode: WalkMode) -> Result<Vec<TreeEntry>> {
        let max_depth = self.config.max_tree_depth;
        let mut visited = HashSet::from([root.clone()]);
        let mut queue = VecDeque::from([(root.clone(), 0usize)]);
        let mut entries = Vec::new();

        while let Some((jid, depth)) = queue.pop_front() {
            let mut children: Vec<Jid> = Vec::new();
            for child in self.store.lrange(&self.keys.children(&jid)).await? {
                let child = Jid::new(child);
                // duplicate edge under the same parent
                if children.contains(&child) {
                    continue;
                }
                if !visited.insert(child.clone()) {
                    match mode {
                        WalkMode::Strict => {
                            return Err(HierarchyError::StructuralAnomaly(format!(
                                "job {child} is reachable twice below {root}"
                            )));
                        }
                        WalkMode::Lenient => continue,
                    }
                }
                if mode == WalkMode::Strict && !self.job_exists(&child).await? {
                    return Err(HierarchyError::StructuralAnomaly(format!(
                        "job {jid} lists missing child {child}"
                    )));
                }
                children.push(child);
            }

            if depth >= max_depth && !children.is_empty() {
                match mode {
                    WalkMode::Strict => {
                        return Err(HierarchyError::StructuralAnomaly(format!(
                            "tree below {root} is deeper than {max_depth}"
                        )));
                    }
                    WalkMode::Lenient => {
                        warn!(root = %root, jid = %jid, "walk depth limit reached");
                        children.clear();
                    }
                }
            }

            queue.extend(children.iter().map(|child| (child.clone(), depth + 1)));
            entries.push(TreeEntry { jid, children });
        }
        Ok(entries)
    }

    /// Delete every job record and children list of a tree in one batch.
    ///
    /// Returns the number of nodes walked.
    pub async fn delete_tree(&self, root: &Jid) -> Result<usize> {
        let entries = self.subtree(root, WalkMode::Lenient).await?;
        let keys = entries
            .iter()
            .flat_map(|entry| [self.keys.job(&entry.jid), self.keys.children(&entry.jid)])
            .collect();
        self.store.atomic(vec![Command::Del { keys }]).await?;
        debug!(root = %root, nodes = entries.len(), "deleted tree");
        Ok(entries.len())
    }
}
