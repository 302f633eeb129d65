use std::sync::Arc;

use futures::future::BoxFuture;
use mongodb::{Client, Collection, Database, bson::doc};
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{MongoProgressDocument, MongoSettingsDocument},
};
use crate::dao::{
    models::{PROFILE_ID, ParentSettingsEntity, ProgressEntity},
    progress_store::ProgressBackend,
    storage::StorageResult,
};

const PROGRESS_COLLECTION_NAME: &str = "progress";
const SETTINGS_COLLECTION_NAME: &str = "parent_settings";

#[derive(Clone)]
pub struct MongoProgressStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    // Kept so the connection pool lives as long as the database handle.
    #[allow(dead_code)]
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

impl MongoProgressStore {
    /// Establish a connection to MongoDB.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        Ok(Self { inner })
    }

    async fn progress_collection(&self) -> Collection<MongoProgressDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoProgressDocument>(PROGRESS_COLLECTION_NAME)
    }

    async fn settings_collection(&self) -> Collection<MongoSettingsDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoSettingsDocument>(SETTINGS_COLLECTION_NAME)
    }
}

impl ProgressBackend for MongoProgressStore {
    fn load_progress(&self) -> BoxFuture<'static, StorageResult<Option<ProgressEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let document = store
                .progress_collection()
                .await
                .find_one(doc! { "_id": PROFILE_ID })
                .await
                .map_err(|source| MongoDaoError::LoadDocument {
                    collection: PROGRESS_COLLECTION_NAME,
                    id: PROFILE_ID.to_owned(),
                    source,
                })?;
            Ok(document.map(|doc| doc.progress))
        })
    }

    fn save_progress(&self, progress: ProgressEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let document = MongoProgressDocument {
                id: PROFILE_ID.to_owned(),
                progress,
            };
            store
                .progress_collection()
                .await
                .replace_one(doc! { "_id": PROFILE_ID }, &document)
                .upsert(true)
                .await
                .map_err(|source| MongoDaoError::SaveDocument {
                    collection: PROGRESS_COLLECTION_NAME,
                    id: PROFILE_ID.to_owned(),
                    source,
                })?;
            Ok(())
        })
    }

    fn load_settings(&self) -> BoxFuture<'static, StorageResult<Option<ParentSettingsEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let document = store
                .settings_collection()
                .await
                .find_one(doc! { "_id": PROFILE_ID })
                .await
                .map_err(|source| MongoDaoError::LoadDocument {
                    collection: SETTINGS_COLLECTION_NAME,
                    id: PROFILE_ID.to_owned(),
                    source,
                })?;
            Ok(document.map(|doc| doc.settings))
        })
    }

    fn save_settings(
        &self,
        settings: ParentSettingsEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let document = MongoSettingsDocument {
                id: PROFILE_ID.to_owned(),
                settings,
            };
            store
                .settings_collection()
                .await
                .replace_one(doc! { "_id": PROFILE_ID }, &document)
                .upsert(true)
                .await
                .map_err(|source| MongoDaoError::SaveDocument {
                    collection: SETTINGS_COLLECTION_NAME,
                    id: PROFILE_ID.to_owned(),
                    source,
                })?;
            Ok(())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.reconnect().await.map_err(Into::into) })
    }
}
