use std::collections::HashSet;

use agent_provider::RunMessage;

use crate::error::SessionStoreError;
use crate::schema::SessionEntry;
use crate::store::SessionStore;

impl SessionStore {
    /// Returns the entry chain ending at `target_leaf` (or the current leaf), root first.
    pub fn replay_leaf(
        &self,
        target_leaf: Option<&str>,
    ) -> Result<Vec<SessionEntry>, SessionStoreError> {
        let Some(leaf_id) = target_leaf.or(self.current_leaf_id.as_deref()) else {
            return Ok(Vec::new());
        };

        let mut index = *self.index_by_id.get(leaf_id).ok_or_else(|| {
            SessionStoreError::UnknownLeafId {
                path: self.path.clone(),
                leaf_id: leaf_id.to_string(),
            }
        })?;

        let mut visited = HashSet::new();
        let mut chain = Vec::new();
        loop {
            let entry = &self.entries[index];
            if !visited.insert(entry.id.as_str()) {
                return Err(SessionStoreError::ReplayCycle {
                    path: self.path.clone(),
                    leaf_id: leaf_id.to_string(),
                });
            }
            chain.push(entry.clone());

            let Some(parent_id) = entry.parent_id.as_deref() else {
                break;
            };
            index = *self.index_by_id.get(parent_id).ok_or_else(|| {
                SessionStoreError::UnknownLeafId {
                    path: self.path.clone(),
                    leaf_id: parent_id.to_string(),
                }
            })?;
        }

        chain.reverse();
        Ok(chain)
    }

    /// Model-facing conversation along the current leaf chain.
    pub fn replay_messages(&self) -> Result<Vec<RunMessage>, SessionStoreError> {
        Ok(self
            .replay_leaf(None)?
            .iter()
            .filter_map(|entry| entry.kind.to_run_message())
            .collect())
    }
}
