//! Durable key/value state
//!
//! Every record is one JSON value under a composite key:
//! `community/<id>`, `modules/<course_id>` and `subscribers/<course_id>`.

use async_trait::async_trait;
use chrono::Local;
use sea_orm::{
    sea_query::OnConflict, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

use super::entities::state_entries;
use super::types::{ChannelId, CommunityId, CommunityRecord, CourseId};
use crate::error::StoreError;

const COMMUNITY_PREFIX: &str = "community/";
const MODULES_PREFIX: &str = "modules/";
const SUBSCRIBERS_PREFIX: &str = "subscribers/";

/// Composite key of a persisted record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKey {
    Community(CommunityId),
    Modules(CourseId),
    Subscribers(CourseId),
}

impl StateKey {
    pub fn encode(&self) -> String {
        match self {
            StateKey::Community(id) => format!("{}{}", COMMUNITY_PREFIX, id),
            StateKey::Modules(id) => format!("{}{}", MODULES_PREFIX, id),
            StateKey::Subscribers(id) => format!("{}{}", SUBSCRIBERS_PREFIX, id),
        }
    }

    pub fn decode(key: &str) -> Option<Self> {
        if let Some(rest) = key.strip_prefix(COMMUNITY_PREFIX) {
            return rest.parse().ok().map(|id| StateKey::Community(CommunityId(id)));
        }
        if let Some(rest) = key.strip_prefix(MODULES_PREFIX) {
            return rest.parse().ok().map(StateKey::Modules);
        }
        if let Some(rest) = key.strip_prefix(SUBSCRIBERS_PREFIX) {
            return rest.parse().ok().map(StateKey::Subscribers);
        }
        None
    }
}

/// Raw storage operations by string key
#[async_trait]
pub trait StoreBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;
    async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError>;
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
    /// Keys starting with `prefix`, sorted
    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// `state_entries` table through sea-orm
pub struct SqliteBackend {
    db: DatabaseConnection,
}

impl SqliteBackend {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.db.ping().await.map_err(StoreError::from)
    }
}

#[async_trait]
impl StoreBackend for SqliteBackend {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let entry = state_entries::Entity::find_by_id(key.to_string())
            .one(&self.db)
            .await?;
        Ok(entry.map(|e| e.value))
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
        let entry = state_entries::ActiveModel {
            key: Set(key.to_string()),
            value: Set(value),
            updated_at: Set(Local::now().naive_local()),
        };

        // INSERT ... ON CONFLICT(key) DO UPDATE, one statement per record
        state_entries::Entity::insert(entry)
            .on_conflict(
                OnConflict::column(state_entries::Column::Key)
                    .update_columns([
                        state_entries::Column::Value,
                        state_entries::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        state_entries::Entity::delete_by_id(key.to_string())
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let keys = state_entries::Entity::find()
            .select_only()
            .column(state_entries::Column::Key)
            .filter(state_entries::Column::Key.starts_with(prefix))
            .order_by_asc(state_entries::Column::Key)
            .into_tuple::<String>()
            .all(&self.db)
            .await?;
        Ok(keys)
    }
}

/// Typed access to the persisted records
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn StoreBackend>,
}

impl Store {
    pub fn new(backend: Arc<dyn StoreBackend>) -> Self {
        Self { backend }
    }

    async fn load<T: DeserializeOwned>(&self, key: StateKey) -> Result<Option<T>, StoreError> {
        let key = key.encode();
        match self.backend.get(&key).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|source| StoreError::Malformed { key, source }),
            None => Ok(None),
        }
    }

    async fn save<T: Serialize>(&self, key: StateKey, value: &T) -> Result<(), StoreError> {
        let key = key.encode();
        let value = serde_json::to_value(value)
            .map_err(|source| StoreError::Malformed { key: key.clone(), source })?;
        self.backend.set(&key, value).await
    }

    // ==================== Communities ====================

    pub async fn load_community(
        &self,
        id: CommunityId,
    ) -> Result<Option<CommunityRecord>, StoreError> {
        self.load(StateKey::Community(id)).await
    }

    pub async fn save_community(
        &self,
        id: CommunityId,
        record: &CommunityRecord,
    ) -> Result<(), StoreError> {
        self.save(StateKey::Community(id), record).await
    }

    /// Every persisted community record
    pub async fn communities(&self) -> Result<Vec<(CommunityId, CommunityRecord)>, StoreError> {
        let mut result = Vec::new();
        for key in self.backend.keys(COMMUNITY_PREFIX).await? {
            let Some(StateKey::Community(id)) = StateKey::decode(&key) else {
                tracing::warn!("Ignoring unrecognised key {}", key);
                continue;
            };
            if let Some(record) = self.load_community(id).await? {
                result.push((id, record));
            }
        }
        Ok(result)
    }

    // ==================== Entity state ====================

    pub async fn load_modules(&self, course: CourseId) -> Result<Option<Vec<String>>, StoreError> {
        self.load(StateKey::Modules(course)).await
    }

    pub async fn save_modules(&self, course: CourseId, modules: &[String]) -> Result<(), StoreError> {
        self.save(StateKey::Modules(course), &modules).await
    }

    pub async fn load_subscribers(&self, course: CourseId) -> Result<Vec<ChannelId>, StoreError> {
        Ok(self
            .load(StateKey::Subscribers(course))
            .await?
            .unwrap_or_default())
    }

    pub async fn save_subscribers(
        &self,
        course: CourseId,
        channels: &[ChannelId],
    ) -> Result<(), StoreError> {
        self.save(StateKey::Subscribers(course), &channels).await
    }

    /// Drop the module snapshot and subscriber list of an entity
    pub async fn discard_entity(&self, course: CourseId) -> Result<(), StoreError> {
        self.backend
            .delete(&StateKey::Subscribers(course).encode())
            .await?;
        self.backend.delete(&StateKey::Modules(course).encode()).await
    }

    /// Entities that have a subscriber list
    pub async fn subscribed_courses(&self) -> Result<Vec<CourseId>, StoreError> {
        Ok(self
            .backend
            .keys(SUBSCRIBERS_PREFIX)
            .await?
            .iter()
            .filter_map(|key| match StateKey::decode(key) {
                Some(StateKey::Subscribers(id)) => Some(id),
                _ => None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::CourseEntity;
    use migration::MigratorTrait;

    async fn sqlite_store() -> Store {
        let db = sea_orm::Database::connect("sqlite::memory:").await.unwrap();
        migration::Migrator::up(&db, None).await.unwrap();
        Store::new(Arc::new(SqliteBackend::new(db)))
    }

    #[test]
    fn test_state_key_codec() {
        let keys = [
            StateKey::Community(CommunityId(-1001)),
            StateKey::Modules(CourseId(42)),
            StateKey::Subscribers(CourseId(7)),
        ];
        for key in keys {
            assert_eq!(StateKey::decode(&key.encode()), Some(key));
        }
        assert_eq!(StateKey::Community(CommunityId(-1001)).encode(), "community/-1001");
        assert!(StateKey::decode("modules/abc").is_none());
        assert!(StateKey::decode("other/1").is_none());
    }

    #[tokio::test]
    async fn test_community_round_trip_on_sqlite() {
        let store = sqlite_store().await;
        let id = CommunityId(-1001);
        assert!(store.load_community(id).await.unwrap().is_none());

        let mut record = CommunityRecord::default();
        record.insert_entity(
            CourseEntity {
                id: CourseId(42),
                name: "CPSC 221".into(),
                url: "https://canvas.example.edu/courses/42".into(),
            },
            "2024-01-01 00:00:00".into(),
        );
        record.add_channel(ChannelId(-1001));
        store.save_community(id, &record).await.unwrap();

        // Overwrite goes through the upsert path
        record.last_seen.insert(CourseId(42), "2024-01-03 10:00:00".into());
        store.save_community(id, &record).await.unwrap();

        let loaded = store.load_community(id).await.unwrap().unwrap();
        assert_eq!(loaded, record);

        let all = store.communities().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].0, id);
    }

    #[tokio::test]
    async fn test_entity_state_listing_and_discard() {
        let store = sqlite_store().await;

        store
            .save_subscribers(CourseId(1), &[ChannelId(10)])
            .await
            .unwrap();
        store
            .save_subscribers(CourseId(2), &[ChannelId(20), ChannelId(21)])
            .await
            .unwrap();
        store
            .save_modules(CourseId(1), &["m1".to_string(), "m2".to_string()])
            .await
            .unwrap();

        assert_eq!(
            store.subscribed_courses().await.unwrap(),
            vec![CourseId(1), CourseId(2)]
        );
        assert_eq!(
            store.load_modules(CourseId(1)).await.unwrap(),
            Some(vec!["m1".to_string(), "m2".to_string()])
        );

        store.discard_entity(CourseId(1)).await.unwrap();
        assert!(store.load_modules(CourseId(1)).await.unwrap().is_none());
        assert!(store.load_subscribers(CourseId(1)).await.unwrap().is_empty());
        assert_eq!(store.subscribed_courses().await.unwrap(), vec![CourseId(2)]);
    }

    #[tokio::test]
    async fn test_state_survives_reconnect() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("state.db").display());

        {
            let db = crate::db::establish_connection(&url).await.unwrap();
            migration::Migrator::up(&db, None).await.unwrap();
            let store = Store::new(Arc::new(SqliteBackend::new(db.clone())));
            store
                .save_modules(CourseId(3), &["m1".to_string()])
                .await
                .unwrap();
            db.close().await.unwrap();
        }

        let db = crate::db::establish_connection(&url).await.unwrap();
        migration::Migrator::up(&db, None).await.unwrap();
        let store = Store::new(Arc::new(SqliteBackend::new(db)));
        assert_eq!(
            store.load_modules(CourseId(3)).await.unwrap(),
            Some(vec!["m1".to_string()])
        );
    }

    #[tokio::test]
    async fn test_malformed_record_is_reported() {
        let db = sea_orm::Database::connect("sqlite::memory:").await.unwrap();
        migration::Migrator::up(&db, None).await.unwrap();
        let backend = Arc::new(SqliteBackend::new(db));
        backend
            .set("community/5", serde_json::json!({"entities": "nope"}))
            .await
            .unwrap();

        let store = Store::new(backend);
        let err = store.load_community(CommunityId(5)).await.unwrap_err();
        assert!(matches!(err, StoreError::Malformed { .. }));
    }
}
