use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database,
    bson::{Bson, Document, doc},
    options::IndexOptions,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{MongoPlayerDocument, MongoSessionDocument, doc_id, filter_document},
};
use crate::dao::{
    models::{PlayerEntity, SessionEntity, SessionStatus},
    score_store::{GroupKey, PlayerFilter, PlayerSort, ScoreAggregates, ScoreStore},
    storage::StorageResult,
};

const PLAYER_COLLECTION_NAME: &str = "players";
const SESSION_COLLECTION_NAME: &str = "sessions";

#[derive(Clone)]
pub struct MongoScoreStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoScoreStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    /// Create the indexes rank queries rely on. The composite
    /// (region, game_mode, score desc) index is what keeps filtered rank
    /// lookups off full collection scans.
    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;
        let players = database.collection::<Document>(PLAYER_COLLECTION_NAME);

        let leaderboard_index = mongodb::IndexModel::builder()
            .keys(doc! {"region": 1, "game_mode": 1, "score": -1})
            .options(
                IndexOptions::builder()
                    .name(Some("leaderboard_slice_idx".to_owned()))
                    .build(),
            )
            .build();
        players
            .create_index(leaderboard_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: PLAYER_COLLECTION_NAME,
                index: "region,game_mode,score",
                source,
            })?;

        let name_index = mongodb::IndexModel::builder()
            .keys(doc! {"name": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("player_name_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        players
            .create_index(name_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: PLAYER_COLLECTION_NAME,
                index: "name",
                source,
            })?;

        let recency_index = mongodb::IndexModel::builder()
            .keys(doc! {"last_active": -1})
            .options(
                IndexOptions::builder()
                    .name(Some("player_recency_idx".to_owned()))
                    .build(),
            )
            .build();
        players
            .create_index(recency_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: PLAYER_COLLECTION_NAME,
                index: "last_active",
                source,
            })?;

        let sessions = database.collection::<Document>(SESSION_COLLECTION_NAME);
        let status_index = mongodb::IndexModel::builder()
            .keys(doc! {"status": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("session_status_idx".to_owned()))
                    .build(),
            )
            .build();
        sessions
            .create_index(status_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: SESSION_COLLECTION_NAME,
                index: "status",
                source,
            })?;

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn player_collection(&self) -> Collection<MongoPlayerDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoPlayerDocument>(PLAYER_COLLECTION_NAME)
    }

    async fn session_collection(&self) -> Collection<MongoSessionDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoSessionDocument>(SESSION_COLLECTION_NAME)
    }

    async fn upsert_player(&self, player: PlayerEntity) -> MongoResult<()> {
        let id = player.id;
        let document: MongoPlayerDocument = player.into();
        let collection = self.player_collection().await;
        collection
            .replace_one(doc_id(id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SavePlayer { id, source })?;
        Ok(())
    }

    async fn find_player(&self, id: Uuid) -> MongoResult<Option<PlayerEntity>> {
        let collection = self.player_collection().await;
        let document = collection
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadPlayer { id, source })?;
        Ok(document.map(Into::into))
    }

    async fn find_player_by_name(&self, name: String) -> MongoResult<Option<PlayerEntity>> {
        let collection = self.player_collection().await;
        let document = collection
            .find_one(doc! {"name": &name})
            .await
            .map_err(|source| MongoDaoError::LoadPlayerByName { name, source })?;
        Ok(document.map(Into::into))
    }

    async fn count_players(&self, filter: PlayerFilter) -> MongoResult<u64> {
        let collection = self.player_collection().await;
        collection
            .count_documents(filter_document(&filter))
            .await
            .map_err(|source| MongoDaoError::CountPlayers { source })
    }

    async fn find_players_sorted(
        &self,
        filter: PlayerFilter,
        sort: PlayerSort,
        skip: u64,
        limit: u64,
    ) -> MongoResult<Vec<PlayerEntity>> {
        let sort_document = match sort {
            PlayerSort::ScoreDesc => doc! {"score": -1, "last_active": -1},
            PlayerSort::RecencyDesc => doc! {"last_active": -1, "score": -1},
        };

        let collection = self.player_collection().await;
        let documents: Vec<MongoPlayerDocument> = collection
            .find(filter_document(&filter))
            .sort(sort_document)
            .skip(skip)
            .limit(limit as i64)
            .await
            .map_err(|source| MongoDaoError::QueryPlayers { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::QueryPlayers { source })?;

        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn aggregate_players(
        &self,
        filter: PlayerFilter,
        group: GroupKey,
    ) -> MongoResult<Vec<(String, u64)>> {
        let group_field = match group {
            GroupKey::Region => "$region",
            GroupKey::GameMode => "$game_mode",
        };
        let pipeline = vec![
            doc! {"$match": filter_document(&filter)},
            doc! {"$group": {"_id": group_field, "count": {"$sum": 1}}},
            doc! {"$sort": {"count": -1}},
        ];

        let collection = self.player_collection().await;
        let documents: Vec<Document> = collection
            .aggregate(pipeline)
            .await
            .map_err(|source| MongoDaoError::Aggregate { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Aggregate { source })?;

        documents
            .into_iter()
            .map(|document| {
                let label = document
                    .get_str("_id")
                    .map_err(|_| MongoDaoError::MalformedAggregate {
                        detail: "group label is not a string".into(),
                    })?
                    .to_owned();
                let count = bson_as_u64(document.get("count")).ok_or_else(|| {
                    MongoDaoError::MalformedAggregate {
                        detail: format!("count missing for group `{label}`"),
                    }
                })?;
                Ok((label, count))
            })
            .collect()
    }

    async fn score_aggregates(&self, filter: PlayerFilter) -> MongoResult<ScoreAggregates> {
        let pipeline = vec![
            doc! {"$match": filter_document(&filter)},
            doc! {"$group": {
                "_id": Bson::Null,
                "count": {"$sum": 1},
                "online": {"$sum": {"$cond": ["$online", 1, 0]}},
                "average_score": {"$avg": "$score"},
                "min_score": {"$min": "$score"},
                "max_score": {"$max": "$score"},
            }},
        ];

        let collection = self.player_collection().await;
        let documents: Vec<Document> = collection
            .aggregate(pipeline)
            .await
            .map_err(|source| MongoDaoError::Aggregate { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Aggregate { source })?;

        // No matching players collapses to the zeroed aggregate.
        let Some(document) = documents.into_iter().next() else {
            return Ok(ScoreAggregates::default());
        };

        Ok(ScoreAggregates {
            count: bson_as_u64(document.get("count")).unwrap_or(0),
            online: bson_as_u64(document.get("online")).unwrap_or(0),
            average_score: bson_as_f64(document.get("average_score")).unwrap_or(0.0),
            min_score: bson_as_u64(document.get("min_score")).unwrap_or(0) as u32,
            max_score: bson_as_u64(document.get("max_score")).unwrap_or(0) as u32,
        })
    }

    async fn save_session(&self, session: SessionEntity) -> MongoResult<()> {
        let id = session.id;
        let document: MongoSessionDocument = session.into();
        let collection = self.session_collection().await;
        collection
            .replace_one(doc_id(id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveSession { id, source })?;
        Ok(())
    }

    async fn find_session(&self, id: Uuid) -> MongoResult<Option<SessionEntity>> {
        let collection = self.session_collection().await;
        let document = collection
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadSession { id, source })?;
        Ok(document.map(Into::into))
    }

    async fn list_sessions(
        &self,
        status: Option<SessionStatus>,
    ) -> MongoResult<Vec<SessionEntity>> {
        let query = match status {
            Some(SessionStatus::Waiting) => doc! {"status": "waiting"},
            Some(SessionStatus::Active) => doc! {"status": "active"},
            Some(SessionStatus::Completed) => doc! {"status": "completed"},
            Some(SessionStatus::Abandoned) => doc! {"status": "abandoned"},
            None => doc! {},
        };

        let collection = self.session_collection().await;
        let documents: Vec<MongoSessionDocument> = collection
            .find(query)
            .sort(doc! {"created_at": 1})
            .await
            .map_err(|source| MongoDaoError::ListSessions { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListSessions { source })?;

        Ok(documents.into_iter().map(Into::into).collect())
    }
}

/// Integral aggregation results come back as Int32 or Int64 depending on
/// magnitude.
fn bson_as_u64(value: Option<&Bson>) -> Option<u64> {
    match value {
        Some(Bson::Int32(v)) => u64::try_from(*v).ok(),
        Some(Bson::Int64(v)) => u64::try_from(*v).ok(),
        Some(Bson::Double(v)) if *v >= 0.0 => Some(*v as u64),
        _ => None,
    }
}

fn bson_as_f64(value: Option<&Bson>) -> Option<f64> {
    match value {
        Some(Bson::Int32(v)) => Some(f64::from(*v)),
        Some(Bson::Int64(v)) => Some(*v as f64),
        Some(Bson::Double(v)) => Some(*v),
        _ => None,
    }
}

impl ScoreStore for MongoScoreStore {
    fn upsert_player(&self, player: PlayerEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.upsert_player(player).await.map_err(Into::into) })
    }

    fn find_player(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_player(id).await.map_err(Into::into) })
    }

    fn find_player_by_name(
        &self,
        name: String,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_player_by_name(name).await.map_err(Into::into) })
    }

    fn count_players(&self, filter: PlayerFilter) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move { store.count_players(filter).await.map_err(Into::into) })
    }

    fn find_players_sorted(
        &self,
        filter: PlayerFilter,
        sort: PlayerSort,
        skip: u64,
        limit: u64,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_players_sorted(filter, sort, skip, limit)
                .await
                .map_err(Into::into)
        })
    }

    fn aggregate_players(
        &self,
        filter: PlayerFilter,
        group: GroupKey,
    ) -> BoxFuture<'static, StorageResult<Vec<(String, u64)>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .aggregate_players(filter, group)
                .await
                .map_err(Into::into)
        })
    }

    fn score_aggregates(
        &self,
        filter: PlayerFilter,
    ) -> BoxFuture<'static, StorageResult<ScoreAggregates>> {
        let store = self.clone();
        Box::pin(async move { store.score_aggregates(filter).await.map_err(Into::into) })
    }

    fn save_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_session(session).await.map_err(Into::into) })
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_session(id).await.map_err(Into::into) })
    }

    fn list_sessions(
        &self,
        status: Option<SessionStatus>,
    ) -> BoxFuture<'static, StorageResult<Vec<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_sessions(status).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
