//! Document store abstraction and the in-memory reference store.
//!
//! Real providers sit behind [`DocumentStore`]; the engine only needs point
//! reads, full scans, and an atomic batch apply. [`MemoryStore`] backs the
//! test suites and doubles as the reference semantics for version guards and
//! savepoints.

use std::collections::BTreeMap;

use async_trait::async_trait;
use clinic_core::error::CoreError;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{fields, Document};

/// Version expectation carried with a write. Compared against the stored
/// document's row version before anything in the batch is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionGuard {
    /// Entity type is not versioned; apply unconditionally.
    None,
    /// The stored row version must equal this value (`None` = row absent or
    /// never versioned).
    Expect(Option<Uuid>),
}

/// One write in an atomic batch.
#[derive(Debug, Clone)]
pub enum WriteOp {
    Put {
        entity_type: &'static str,
        entity_id: String,
        document: Document,
        guard: VersionGuard,
    },
    Delete {
        entity_type: &'static str,
        entity_id: String,
        guard: VersionGuard,
    },
}

impl WriteOp {
    pub fn entity_type(&self) -> &'static str {
        match self {
            WriteOp::Put { entity_type, .. } | WriteOp::Delete { entity_type, .. } => entity_type,
        }
    }

    pub fn entity_id(&self) -> &str {
        match self {
            WriteOp::Put { entity_id, .. } | WriteOp::Delete { entity_id, .. } => entity_id,
        }
    }

    fn guard(&self) -> &VersionGuard {
        match self {
            WriteOp::Put { guard, .. } | WriteOp::Delete { guard, .. } => guard,
        }
    }
}

/// Minimal contract the commit pipeline needs from a persistence provider.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, entity_type: &str, entity_id: &str)
        -> Result<Option<Document>, CoreError>;

    async fn scan(&self, entity_type: &str) -> Result<Vec<Document>, CoreError>;

    /// Apply the whole batch atomically: every version guard is validated
    /// before anything is written, and a guard failure leaves the store
    /// untouched. Returns the number of rows affected.
    async fn apply(&self, batch: Vec<WriteOp>) -> Result<u64, CoreError>;
}

type Collection = BTreeMap<String, Document>;
type Collections = BTreeMap<String, Collection>;

#[derive(Default)]
struct StoreState {
    collections: Collections,
    /// Named savepoint stack, innermost last.
    savepoints: Vec<(String, Collections)>,
}

/// In-memory document store. Single-writer per batch; a batch either fully
/// applies or fully fails.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a named savepoint. Savepoints nest; rolling back to an outer
    /// name discards the inner ones.
    pub async fn savepoint(&self, name: &str) {
        let mut state = self.state.write().await;
        let snapshot = state.collections.clone();
        state.savepoints.push((name.to_string(), snapshot));
        tracing::debug!(savepoint = name, "Savepoint recorded");
    }

    /// Restore the store to the named savepoint. The savepoint itself stays
    /// defined so the caller may roll back to it again.
    pub async fn rollback_to(&self, name: &str) -> Result<(), CoreError> {
        let mut state = self.state.write().await;
        let position = state
            .savepoints
            .iter()
            .rposition(|(n, _)| n == name)
            .ok_or_else(|| {
                CoreError::StoreError(anyhow::anyhow!("unknown savepoint: {name}"))
            })?;
        let snapshot = state.savepoints[position].1.clone();
        state.collections = snapshot;
        state.savepoints.truncate(position + 1);
        tracing::debug!(savepoint = name, "Rolled back to savepoint");
        Ok(())
    }

    /// Drop the named savepoint (and any nested inside it) without restoring.
    pub async fn release(&self, name: &str) -> Result<(), CoreError> {
        let mut state = self.state.write().await;
        let position = state
            .savepoints
            .iter()
            .rposition(|(n, _)| n == name)
            .ok_or_else(|| {
                CoreError::StoreError(anyhow::anyhow!("unknown savepoint: {name}"))
            })?;
        state.savepoints.truncate(position);
        Ok(())
    }
}

fn stored_version(document: Option<&Document>) -> Option<Uuid> {
    document
        .and_then(|doc| doc.get(fields::ROW_VERSION))
        .and_then(|value| match value {
            Value::String(raw) => Uuid::parse_str(raw).ok(),
            _ => None,
        })
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Option<Document>, CoreError> {
        let state = self.state.read().await;
        Ok(state
            .collections
            .get(entity_type)
            .and_then(|collection| collection.get(entity_id))
            .cloned())
    }

    async fn scan(&self, entity_type: &str) -> Result<Vec<Document>, CoreError> {
        let state = self.state.read().await;
        Ok(state
            .collections
            .get(entity_type)
            .map(|collection| collection.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn apply(&self, batch: Vec<WriteOp>) -> Result<u64, CoreError> {
        let mut state = self.state.write().await;

        // Validate every guard before mutating anything, so a conflict on the
        // last op cannot leave earlier ops applied.
        for op in &batch {
            if let VersionGuard::Expect(expected) = op.guard() {
                let stored = state
                    .collections
                    .get(op.entity_type())
                    .and_then(|collection| collection.get(op.entity_id()));
                if stored_version(stored) != *expected {
                    return Err(CoreError::ConcurrencyConflict {
                        entity_type: op.entity_type(),
                        entity_id: op.entity_id().to_string(),
                    });
                }
            }
        }

        let mut affected = 0u64;
        for op in batch {
            match op {
                WriteOp::Put {
                    entity_type,
                    entity_id,
                    document,
                    ..
                } => {
                    state
                        .collections
                        .entry(entity_type.to_string())
                        .or_default()
                        .insert(entity_id, document);
                    affected += 1;
                }
                WriteOp::Delete {
                    entity_type,
                    entity_id,
                    ..
                } => {
                    let removed = state
                        .collections
                        .get_mut(entity_type)
                        .and_then(|collection| collection.remove(&entity_id));
                    if removed.is_some() {
                        affected += 1;
                    }
                }
            }
        }

        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(version: Option<Uuid>) -> Document {
        let mut doc = Document::new();
        doc.insert("name".to_string(), Value::String("x".to_string()));
        if let Some(version) = version {
            doc.insert(
                fields::ROW_VERSION.to_string(),
                Value::String(version.to_string()),
            );
        }
        doc
    }

    #[tokio::test]
    async fn guard_failure_leaves_the_batch_unapplied() {
        let store = MemoryStore::new();
        let version = Uuid::new_v4();
        store
            .apply(vec![WriteOp::Put {
                entity_type: "rows",
                entity_id: "1".to_string(),
                document: doc(Some(version)),
                guard: VersionGuard::None,
            }])
            .await
            .unwrap();

        let result = store
            .apply(vec![
                WriteOp::Put {
                    entity_type: "rows",
                    entity_id: "2".to_string(),
                    document: doc(None),
                    guard: VersionGuard::None,
                },
                WriteOp::Put {
                    entity_type: "rows",
                    entity_id: "1".to_string(),
                    document: doc(Some(Uuid::new_v4())),
                    guard: VersionGuard::Expect(Some(Uuid::new_v4())),
                },
            ])
            .await;

        assert!(matches!(result, Err(CoreError::ConcurrencyConflict { .. })));
        // The first op of the failed batch must not be visible.
        assert!(store.get("rows", "2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn savepoints_nest_and_roll_back_by_name() {
        let store = MemoryStore::new();
        store.savepoint("outer").await;
        store
            .apply(vec![WriteOp::Put {
                entity_type: "rows",
                entity_id: "1".to_string(),
                document: doc(None),
                guard: VersionGuard::None,
            }])
            .await
            .unwrap();

        store.savepoint("inner").await;
        store
            .apply(vec![WriteOp::Put {
                entity_type: "rows",
                entity_id: "2".to_string(),
                document: doc(None),
                guard: VersionGuard::None,
            }])
            .await
            .unwrap();

        store.rollback_to("inner").await.unwrap();
        assert!(store.get("rows", "1").await.unwrap().is_some());
        assert!(store.get("rows", "2").await.unwrap().is_none());

        store.rollback_to("outer").await.unwrap();
        assert!(store.get("rows", "1").await.unwrap().is_none());

        assert!(store.rollback_to("gone").await.is_err());
    }
}
