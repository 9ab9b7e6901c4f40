//! Remote mutation contract

use crate::error::Result;
use crate::store::RelationRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Acknowledgement of a remote delete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedId {
    pub id: i64,
}

/// Authoritative scalar snapshot of an entity returned by an update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteEntity {
    pub id: i64,
    #[serde(default)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

/// Operations that make a change authoritative.
///
/// Retries, batching, and timeouts belong to the implementation; the cache
/// treats every `Err` as a failed mutation and rolls back.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Create a relation record (a thanks) from `author_id` on `parent_id`
    async fn create_relation_record(&self, parent_id: i64, author_id: i64) -> Result<RelationRecord>;

    async fn delete_relation_record(&self, record_id: i64) -> Result<DeletedId>;

    async fn update_entity_field(
        &self,
        entity_id: i64,
        field: &str,
        value: serde_json::Value,
    ) -> Result<RemoteEntity>;

    async fn delete_entity(&self, entity_id: i64) -> Result<DeletedId>;
}
